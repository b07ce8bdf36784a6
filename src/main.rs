use std::env;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use glam::{Vec2, Vec3};
use log::{info, warn};

use crystal_iso::{
    Graphics3D, GridId, Level, LightKind, LightRef, MaterialHandle, MoveOutcome, RecordingDevice,
    Rect, SpriteRef, View,
};

const SCREEN_WIDTH: u32 = 640;
const SCREEN_HEIGHT: u32 = 480;
const LIGHT_OFFSET: Vec3 = Vec3::new(0.0, 3.0, 0.0);

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse()?;
    let mut level = Level::load(&options.path)?;

    println!(
        "Loaded level with {} grids ({} materials, {} lights, {} sprites)",
        level.world.grids().len(),
        level.engine.material_count(),
        level.lights.len(),
        level.sprites.len()
    );
    for grid in level.world.grids() {
        let bounds = grid.bounds();
        println!(
            " - grid {} {}x{} from ({:.0}, {:.0}) to ({:.0}, {:.0}), {} sprites",
            grid.id().index(),
            grid.width(),
            grid.height(),
            bounds.min.x,
            bounds.min.z,
            bounds.max.x,
            bounds.max.z,
            grid.sprite_count()
        );
    }

    if options.summary_only {
        print_final_state(&level);
        return Ok(());
    }

    let player = spawn_player(&mut level)?;
    let rect = Rect::new(0, 0, SCREEN_WIDTH as i32, SCREEN_HEIGHT as i32);
    let mut view = level
        .engine
        .create_view(rect)
        .context("failed to create view")?;
    let mut device = RecordingDevice::new(SCREEN_WIDTH, SCREEN_HEIGHT);

    for frame in 0..options.frames {
        if let Some((sprite, light)) = &player {
            if frame > 0 && options.walk != Vec3::ZERO {
                walk(&mut level, sprite, light, options.walk)?;
            }
            let pos = sprite.read().position();
            light.write().set_position(pos + LIGHT_OFFSET);
            follow(&mut view, pos);
        }
        device.clear();
        view.draw(&mut level.world, &mut device);
        println!(
            "Frame {frame}: {} polygons, {} material switches, {} bytes",
            device.draws().len(),
            device.material_switches(),
            device.bytes_submitted()
        );
    }
    info!(
        "rendered {} frame(s) on a {}x{} device",
        options.frames,
        device.width(),
        device.height()
    );

    print_final_state(&level);
    Ok(())
}

/// Puts a sprite with a dynamic light above it at the level's start
/// position, using the first material.
fn spawn_player(level: &mut Level) -> Result<Option<(SpriteRef, LightRef)>> {
    let Some(start) = level.start else {
        return Ok(None);
    };
    if level.engine.material_count() == 0 {
        warn!("level has a start position but no materials; no player");
        return Ok(None);
    }
    let mut sprite = level.engine.create_front_sprite(start, 1.0, 2.0);
    sprite.set_material(MaterialHandle::new(0));
    let sprite = sprite.shared();
    let Some(grid) = level.world.add_sprite(&sprite) else {
        return Err(anyhow!("start position {start:?} is outside every grid"));
    };

    let mut light = level.engine.create_light();
    light.set_kind(LightKind::Dynamic);
    light.set_position(start + LIGHT_OFFSET);
    light.set_color(Vec3::new(1.0, 0.9, 0.7));
    let light = light.shared();
    level.world.set_light_grid(&light, Some(grid))?;

    sprite
        .write()
        .set_grid_change_listener(Arc::new(|_: &SpriteRef, grid: GridId| {
            info!("player entered grid {}", grid.index());
        }));
    level.sprites.push(sprite.clone());
    level.lights.push(light.clone());
    Ok(Some((sprite, light)))
}

/// Moves the player one step; its light changes grid along with it.
fn walk(level: &mut Level, sprite: &SpriteRef, light: &LightRef, step: Vec3) -> Result<()> {
    match level.world.move_sprite_by(sprite, step) {
        Ok(MoveOutcome::ChangedGrid { to, .. }) => {
            level.world.set_light_grid(light, Some(to))?;
            println!("Player moved to grid {}", to.index());
        }
        Ok(_) => {}
        Err(err) => println!("Player blocked: {err}"),
    }
    Ok(())
}

fn follow(view: &mut View, pos: Vec3) {
    let rect = view.rect();
    let center = Vec2::new(
        (rect.xmin + rect.xmax) as f32 / 2.0,
        (rect.ymin + rect.ymax) as f32 / 2.0,
    );
    view.set_scroll(pos, center);
}

fn print_final_state(level: &Level) {
    println!("Final grid states:");
    for grid in level.world.grids() {
        println!(
            " - grid {}: {} sprites, {} static lights, {} dynamic lights",
            grid.id().index(),
            grid.sprite_count(),
            grid.static_lights().len(),
            grid.dynamic_lights().len()
        );
    }
    if let Some(sprite) = level.sprites.last() {
        let pos = sprite.read().position();
        println!("Last sprite at ({:.2}, {:.2}, {:.2})", pos.x, pos.y, pos.z);
    }
}

struct CliOptions {
    path: String,
    frames: usize,
    walk: Vec3,
    summary_only: bool,
}

impl CliOptions {
    fn parse() -> Result<Self> {
        let mut args = env::args().skip(1);
        let Some(path) = args.next() else {
            return Err(anyhow!(
                "Usage: crystal-iso <level.xml> [--frames N] [--walk X,Y,Z] [--summary-only]"
            ));
        };
        let mut frames = 1;
        let mut walk = Vec3::ZERO;
        let mut summary_only = false;
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--frames" => {
                    let value = args.next().ok_or_else(|| anyhow!("--frames needs a count"))?;
                    frames = value
                        .parse()
                        .with_context(|| format!("invalid frame count: {value}"))?;
                }
                "--walk" => {
                    let value = args.next().ok_or_else(|| anyhow!("--walk needs X,Y,Z"))?;
                    walk = parse_step(&value)?;
                }
                "--summary-only" => summary_only = true,
                other => {
                    return Err(anyhow!(
                        "Unknown argument: {other}. Expected --frames, --walk or --summary-only"
                    ));
                }
            }
        }
        Ok(Self {
            path,
            frames,
            walk,
            summary_only,
        })
    }
}

fn parse_step(value: &str) -> Result<Vec3> {
    let parts = value
        .split(',')
        .map(|part| part.trim().parse::<f32>())
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("invalid step: {value}"))?;
    match parts.as_slice() {
        [x, y, z] => Ok(Vec3::new(*x, *y, *z)),
        _ => Err(anyhow!("expected X,Y,Z, got {value}")),
    }
}
