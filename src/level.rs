use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use glam::Vec3;
use log::{debug, info};
use roxmltree::{Document, Node};

use crate::config::EngineConfig;
use crate::device::{MaterialHandle, MixMode};
use crate::engine::IsoEngine;
use crate::light::{Attenuation, LightKind, LightRef};
use crate::sprite::{Sprite, SpriteRef};
use crate::world::{GridId, World};

/// A world built from a level file, with the handles the caller keeps
/// alive.
#[derive(Debug)]
pub struct Level {
    pub engine: IsoEngine,
    pub world: World,
    pub lights: Vec<LightRef>,
    pub sprites: Vec<SpriteRef>,
    pub start: Option<Vec3>,
}

impl Level {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let xml = fs::read_to_string(path)
            .with_context(|| format!("failed to read level {}", path.display()))?;
        Self::from_xml(&xml).with_context(|| format!("failed to load level {}", path.display()))
    }

    /// Parses a level document:
    ///
    /// ```xml
    /// <world>
    ///   <materials><material name="floor" file="/lib/std/stone4.gif"/></materials>
    ///   <grids>
    ///     <grid>
    ///       <size>20 10</size> <space>0 0 -1 10</space> <mult>2 2</mult>
    ///       <light dynamic="false"><position>3 2 6</position><radius>5</radius></light>
    ///       <tile2d material="floor"><start>0 0 0</start><end>20 0 10</end></tile2d>
    ///     </grid>
    ///   </grids>
    ///   <start><position>10 0 5</position></start>
    /// </world>
    /// ```
    ///
    /// `size` counts cells along `x` then `z`.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let document = Document::parse(xml).context("invalid level XML")?;
        let root = document.root_element();
        if !root.has_tag_name("world") {
            bail!("expected <world> root element, found <{}>", root.tag_name().name());
        }

        let config = match child(&root, "config") {
            Some(node) => parse_config(&node).context("invalid <config>")?,
            None => EngineConfig::default(),
        };
        let mut level = Level {
            engine: IsoEngine::new(config),
            world: World::new(),
            lights: Vec::new(),
            sprites: Vec::new(),
            start: None,
        };

        for node in children(&root, "materials").flat_map(|list| list.children()) {
            if !node.has_tag_name("material") {
                continue;
            }
            let name = required_attr(&node, "name")?;
            let file = node.attribute("file").unwrap_or_default();
            level.engine.create_material(name, file);
        }

        for (index, node) in children(&root, "grids")
            .flat_map(|list| list.children())
            .filter(|n| n.has_tag_name("grid"))
            .enumerate()
        {
            level
                .parse_grid(&node)
                .with_context(|| format!("invalid grid #{index}"))?;
        }

        for node in root.children().filter(|n| n.has_tag_name("sprite")) {
            level.parse_sprite(&node)?;
        }

        if let Some(start) = child(&root, "start") {
            level.start = Some(parse_vec3(required_text(&start, "position")?)?);
        }

        info!(
            "loaded level: {} materials, {} grids, {} lights, {} sprites",
            level.engine.material_count(),
            level.world.grids().len(),
            level.lights.len(),
            level.sprites.len()
        );
        Ok(level)
    }

    fn parse_grid(&mut self, node: &Node<'_, '_>) -> Result<()> {
        let size = parse_numbers(required_text(node, "size")?, 2)?;
        // cells along x are the grid height, cells along z its width
        let (along_x, along_z) = (as_count(size[0])?, as_count(size[1])?);
        let id = self.world.create_grid(along_z, along_x)?;

        if let Some(space) = optional_text(node, "space") {
            let space = parse_numbers(space, 4)?;
            self.world
                .grid_mut(id)?
                .set_space(space[0] as i32, space[1] as i32, space[2], space[3]);
        }
        if let Some(mult) = optional_text(node, "mult") {
            let mult = parse_numbers(mult, 2)?;
            self.world
                .grid_mut(id)?
                .set_ground_mult(as_count(mult[0])?, as_count(mult[1])?)?;
        }

        for item in node.children().filter(Node::is_element) {
            match item.tag_name().name() {
                "light" => self.parse_light(&item, id).context("invalid <light>")?,
                "tile2d" => self.parse_tile(&item, id).context("invalid <tile2d>")?,
                _ => {}
            }
        }
        Ok(())
    }

    fn parse_light(&mut self, node: &Node<'_, '_>, grid: GridId) -> Result<()> {
        let mut light = self.engine.create_light();
        if let Some(position) = optional_text(node, "position") {
            light.set_position(parse_vec3(position)?);
        }
        if let Some(radius) = optional_text(node, "radius") {
            light.set_radius(parse_f32(radius)?);
        }
        if let Some(color) = optional_text(node, "color") {
            light.set_color(parse_vec3(color)?);
        }
        if let Some(attenuation) = optional_text(node, "attenuation") {
            light.set_attenuation(attenuation.parse::<Attenuation>()?);
        }
        if parse_flag(node.attribute("dynamic"))? {
            light.set_kind(LightKind::Dynamic);
        }
        let light = light.shared();
        self.world.set_light_grid(&light, Some(grid))?;
        self.lights.push(light);
        Ok(())
    }

    /// Tiles a floor (`start.y == end.y`), an x wall (`start.x == end.x`)
    /// or a z wall (`start.z == end.z`) with unit sprites and raises the
    /// heightmap under them.
    fn parse_tile(&mut self, node: &Node<'_, '_>, grid: GridId) -> Result<()> {
        let material = self.material(node)?;
        let start = parse_vec3(required_text(node, "start")?)?;
        let end = parse_vec3(required_text(node, "end")?)?;

        let bounds = self.world.grid(grid)?.bounds();
        for (label, point) in [("start", start), ("end", end)] {
            let inside = point.x >= bounds.min.x
                && point.x <= bounds.max.x
                && point.z >= bounds.min.z
                && point.z <= bounds.max.z
                && point.y >= bounds.min.y
                && point.y <= bounds.max.y;
            if !inside {
                bail!("{label} {point:?} is not inside the current grid");
            }
        }

        let range = |from: f32, to: f32| (from.floor() as i32)..(to.ceil() as i32);
        let mut placed = 0;
        if start.y == end.y {
            let y = start.y.floor();
            for z in range(start.z, end.z) {
                for x in range(start.x, end.x) {
                    let pos = Vec3::new(x as f32, y, z as f32);
                    self.place(Sprite::floor(pos, 1.0, 1.0), material);
                    self.raise_ground(grid, x, z, y)?;
                    placed += 1;
                }
            }
        } else if start.x == end.x {
            let x = start.x.floor() as i32;
            for z in range(start.z, end.z) {
                let mut top = start.y.floor();
                for y in range(start.y, end.y) {
                    let pos = Vec3::new(x as f32, y as f32, z as f32);
                    self.place(Sprite::x_wall(pos, 1.0, 1.0), material);
                    top = (y + 1) as f32;
                    placed += 1;
                }
                self.raise_ground(grid, x, z, top)?;
            }
        } else if start.z == end.z {
            let z = start.z.floor() as i32;
            for x in range(start.x, end.x) {
                let mut top = start.y.floor();
                for y in range(start.y, end.y) {
                    let pos = Vec3::new(x as f32, y as f32, z as f32);
                    self.place(Sprite::z_wall(pos, 1.0, 1.0), material);
                    top = (y + 1) as f32;
                    placed += 1;
                }
                self.raise_ground(grid, x, z, top)?;
            }
        } else {
            bail!("tiles must be flat in x, y or z: {start:?} to {end:?}");
        }
        debug!("tiled {placed} sprites from {start:?} to {end:?}");
        Ok(())
    }

    fn parse_sprite(&mut self, node: &Node<'_, '_>) -> Result<()> {
        let material = self.material(node)?;
        let position = parse_vec3(required_text(node, "position")?)?;
        let size = match optional_text(node, "size") {
            Some(size) => parse_numbers(size, 2)?,
            None => vec![1.0, 1.0],
        };
        let (w, h) = (size[0], size[1]);
        let mut sprite = match node.attribute("kind").unwrap_or("front") {
            "floor" => Sprite::floor(position, w, h),
            "front" => Sprite::front(position, w, h),
            "xwall" => Sprite::x_wall(position, w, h),
            "zwall" => Sprite::z_wall(position, w, h),
            other => bail!("unknown sprite kind: {other}"),
        };
        if let Some(mix) = node.attribute("mix") {
            sprite.set_mix_mode(mix.parse::<MixMode>()?);
        }
        self.place(sprite, material);
        Ok(())
    }

    fn material(&self, node: &Node<'_, '_>) -> Result<MaterialHandle> {
        let name = required_attr(node, "material")?;
        self.engine
            .find_material(name)
            .ok_or_else(|| anyhow!("cannot find a material called {name}"))
    }

    fn place(&mut self, mut sprite: Sprite, material: MaterialHandle) {
        sprite.set_material(material);
        let sprite = sprite.shared();
        if self.world.add_sprite(&sprite).is_none() {
            debug!("sprite at {:?} is outside every grid", sprite.read().position());
        }
        self.sprites.push(sprite);
    }

    /// Sets every ground sample of the cell at world (`x`, `z`) to `height`.
    /// Cells past the grid edge are left alone.
    fn raise_ground(&mut self, grid: GridId, x: i32, z: i32, height: f32) -> Result<()> {
        let grid = self.world.grid_mut(grid)?;
        let (min_z, min_x) = grid.grid_offset();
        let (cell_x, cell_y) = (z - min_z, x - min_x);
        if cell_x < 0
            || cell_y < 0
            || cell_x as usize >= grid.width()
            || cell_y as usize >= grid.height()
        {
            return Ok(());
        }
        let (mult_x, mult_y) = grid.ground_mult();
        let ground = grid.ground_mut();
        for sub_y in 0..mult_y as i32 {
            for sub_x in 0..mult_x as i32 {
                ground.set_cell_ground(cell_x, cell_y, sub_x, sub_y, height)?;
            }
        }
        Ok(())
    }
}

fn parse_config(node: &Node<'_, '_>) -> Result<EngineConfig> {
    let mut config = EngineConfig::default();
    let lighting = &mut config.lighting;
    let view = &mut config.view;
    for (tag, slot) in [
        ("cutoff", &mut lighting.cutoff),
        ("unbounded_radius", &mut lighting.unbounded_radius),
        ("sample_spread", &mut lighting.sample_spread),
        ("x_skew", &mut view.x_skew),
        ("z_skew", &mut view.z_skew),
        ("min_height", &mut view.min_height),
        ("max_height", &mut view.max_height),
        ("camera_depth", &mut view.camera_depth),
    ] {
        if let Some(text) = optional_text(node, tag) {
            *slot = parse_f32(text).with_context(|| format!("invalid <{tag}>"))?;
        }
    }
    if let Some(scale) = optional_text(node, "scale") {
        view.scale = Some(parse_f32(scale).context("invalid <scale>")?);
    }
    Ok(config)
}

fn child<'a, 'input>(node: &Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.has_tag_name(tag))
}

fn children<'a, 'input: 'a>(
    node: &Node<'a, 'input>,
    tag: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children().filter(move |n| n.has_tag_name(tag))
}

fn required_text(node: &Node<'_, '_>, tag: &str) -> Result<String> {
    optional_text(node, tag).ok_or_else(|| anyhow!("<{tag}> tag is missing"))
}

fn optional_text(node: &Node<'_, '_>, tag: &str) -> Option<String> {
    child(node, tag)
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| text.to_string())
}

fn required_attr<'a>(node: &Node<'a, '_>, name: &str) -> Result<&'a str> {
    node.attribute(name)
        .ok_or_else(|| anyhow!("<{}> is missing the {name} attribute", node.tag_name().name()))
}

/// Numbers separated by whitespace or commas; exactly `count` of them.
fn parse_numbers(value: String, count: usize) -> Result<Vec<f32>> {
    let numbers = value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<f32>()
                .map_err(|err| anyhow!("failed to parse {part:?} in {value:?}: {err}"))
        })
        .collect::<Result<Vec<_>>>()?;
    if numbers.len() != count {
        bail!("expected {count} numbers, got {value:?}");
    }
    Ok(numbers)
}

fn parse_vec3(value: String) -> Result<Vec3> {
    let n = parse_numbers(value, 3)?;
    Ok(Vec3::new(n[0], n[1], n[2]))
}

fn parse_f32(value: String) -> Result<f32> {
    value
        .parse::<f32>()
        .map_err(|err| anyhow!("failed to parse float {value:?}: {err}"))
}

fn parse_flag(value: Option<&str>) -> Result<bool> {
    match value.map(str::trim) {
        None | Some("false") | Some("0") | Some("no") => Ok(false),
        Some("true") | Some("1") | Some("yes") => Ok(true),
        Some(other) => bail!("invalid flag value: {other}"),
    }
}

fn as_count(value: f32) -> Result<usize> {
    if value < 1.0 || value.fract() != 0.0 {
        bail!("expected a positive whole number, got {value}");
    }
    Ok(value as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
    <world>
        <config><cutoff>0.25</cutoff><scale>20</scale></config>
        <materials>
            <material name="floor" file="/lib/std/stone4.gif"/>
            <material name="wall" file="/lib/std/mystone2.gif"/>
        </materials>
        <grids>
            <grid>
                <size>4 6</size>
                <space>0 0 -1 10</space>
                <mult>2 2</mult>
                <light dynamic="true">
                    <position>2 3 2</position>
                    <radius>4</radius>
                    <color>0 0.4 1</color>
                    <attenuation>linear</attenuation>
                </light>
                <tile2d material="floor"><start>0 0 0</start><end>4 0 6</end></tile2d>
                <tile2d material="wall"><start>2 0 3</start><end>2 2 5</end></tile2d>
            </grid>
        </grids>
        <sprite kind="front" material="wall" mix="add">
            <position>1.5 0 1.5</position>
            <size>1 2</size>
        </sprite>
        <start><position>1.5 0 1.5</position></start>
    </world>
    "#;

    #[test]
    fn loads_grids_tiles_and_lights() {
        let level = Level::from_xml(SAMPLE).unwrap();
        assert_eq!(level.engine.config().lighting.cutoff, 0.25);
        assert_eq!(level.engine.config().view.scale, Some(20.0));
        assert_eq!(level.engine.material_count(), 2);

        let grid = &level.world.grids()[0];
        assert_eq!((grid.width(), grid.height()), (6, 4));
        assert_eq!(grid.ground_mult(), (2, 2));
        // 24 floor tiles, 2x2 wall tiles, 1 front sprite
        assert_eq!(level.sprites.len(), 24 + 4 + 1);
        assert_eq!(grid.sprite_count(), 29);

        assert_eq!(level.lights.len(), 1);
        assert_eq!(grid.dynamic_lights().len(), 1);
        let light = level.lights[0].read();
        assert_eq!(light.attenuation(), Attenuation::Linear);
        assert_eq!(light.color(), Vec3::new(0.0, 0.4, 1.0));

        // the wall raised the heightmap in its cells
        assert_eq!(grid.ground().cell_ground(3, 2, 1, 1).unwrap(), 2.0);
        assert_eq!(grid.ground().cell_ground(0, 0, 0, 0).unwrap(), 0.0);
        assert_eq!(level.start, Some(Vec3::new(1.5, 0.0, 1.5)));
    }

    #[test]
    fn unknown_material_is_an_error() {
        let bad = r#"<world><grids><grid><size>2 2</size>
            <tile2d material="lava"><start>0 0 0</start><end>2 0 2</end></tile2d>
            </grid></grids></world>"#;
        let err = Level::from_xml(bad).unwrap_err();
        assert!(format!("{err:#}").contains("lava"));
    }

    #[test]
    fn tile_outside_grid_is_an_error() {
        let bad = r#"<world>
            <materials><material name="floor" file="a.gif"/></materials>
            <grids><grid><size>2 2</size>
            <tile2d material="floor"><start>0 0 0</start><end>5 0 2</end></tile2d>
            </grid></grids></world>"#;
        let err = Level::from_xml(bad).unwrap_err();
        assert!(format!("{err:#}").contains("not inside the current grid"));
    }

    #[test]
    fn malformed_vectors_are_reported() {
        assert!(parse_vec3("1 2".to_string()).is_err());
        assert!(parse_vec3("1,2,x".to_string()).is_err());
        assert_eq!(parse_vec3("1, 2, 3".to_string()).unwrap(), Vec3::new(1.0, 2.0, 3.0));
        assert!(Level::from_xml("<scene/>").is_err());
    }
}
