use std::sync::Arc;

use glam::Vec3;
use log::{debug, info};

use crate::cell::Cell;
use crate::device::Graphics3D;
use crate::error::{IsoError, IsoResult};
use crate::geometry::Aabb;
use crate::ground::GroundMap;
use crate::light::{LightKind, LightRef};
use crate::mesh::LightSample;
use crate::render_view::{RenderPass, RenderView};
use crate::sprite::SpriteRef;
use crate::world::GridId;

/// How far inside the box a position must stay to move within the grid.
const MOVE_EPSILON: f32 = 1.0e-4;

const DEFAULT_MIN_Y: f32 = -1.0;
const DEFAULT_MAX_Y: f32 = 10.0;

/// A rectangular part of the world split into 1x1 cells.
///
/// `width` counts cells along world `z`, `height` along world `x`. Cell
/// (`cx`, `cy`) covers `z` in `[min_z + cx, min_z + cx + 1)` and `x` in
/// `[min_x + cy, min_x + cy + 1)`.
#[derive(Debug)]
pub struct Grid {
    id: GridId,
    width: usize,
    height: usize,
    min_x: i32,
    min_z: i32,
    bounds: Aabb,
    cells: Vec<Option<Cell>>,
    ground: GroundMap,
    static_lights: Vec<LightRef>,
    dynamic_lights: Vec<LightRef>,
    recalc_static: bool,
}

impl Grid {
    pub(crate) fn new(id: GridId, width: usize, height: usize) -> Self {
        let mut grid = Self {
            id,
            width,
            height,
            min_x: 0,
            min_z: 0,
            bounds: Aabb::default(),
            cells: std::iter::repeat_with(|| None).take(width * height).collect(),
            ground: GroundMap::new(width, height, 1, 1),
            static_lights: Vec::new(),
            dynamic_lights: Vec::new(),
            recalc_static: false,
        };
        grid.set_space(0, 0, DEFAULT_MIN_Y, DEFAULT_MAX_Y);
        grid
    }

    pub fn id(&self) -> GridId {
        self.id
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Places the grid in the world. Call before adding sprites.
    ///
    /// Registered lights see the ground at its new place on the next relight.
    pub fn set_space(&mut self, min_x: i32, min_z: i32, min_y: f32, max_y: f32) {
        self.min_x = min_x;
        self.min_z = min_z;
        self.bounds = Aabb::new(
            Vec3::new(min_x as f32, min_y, min_z as f32),
            Vec3::new(
                (min_x + self.height as i32) as f32,
                max_y,
                (min_z + self.width as i32) as f32,
            ),
        );
        self.ground.set_origin(min_x as f32, min_z as f32);
        self.ground_changed();
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn contains(&self, pos: Vec3) -> bool {
        self.bounds.contains(pos)
    }

    /// World `(min_z, min_x)` of cell (0, 0).
    pub fn grid_offset(&self) -> (i32, i32) {
        (self.min_z, self.min_x)
    }

    /// Cell coordinates of a world position, clamped to the grid.
    pub fn cell_coords(&self, pos: Vec3) -> (usize, usize) {
        let cx = (pos.z.floor() as i32 - self.min_z).clamp(0, self.width as i32 - 1);
        let cy = (pos.x.floor() as i32 - self.min_x).clamp(0, self.height as i32 - 1);
        (cx.max(0) as usize, cy.max(0) as usize)
    }

    pub fn cell(&self, cx: usize, cy: usize) -> Option<&Cell> {
        if cx >= self.width || cy >= self.height {
            return None;
        }
        self.cells[cy * self.width + cx].as_ref()
    }

    /// Half-open range of cell `x` indices overlapping world `z` in
    /// `[z_lo, z_hi]`.
    pub fn cell_range_x(&self, z_lo: f32, z_hi: f32) -> (usize, usize) {
        let lo = (z_lo.floor() as i32 - self.min_z).clamp(0, self.width as i32);
        let hi = (z_hi.floor() as i32 - self.min_z + 1).clamp(0, self.width as i32);
        (lo as usize, hi as usize)
    }

    /// Half-open range of cell `y` indices overlapping world `x` in
    /// `[x_lo, x_hi]`.
    pub fn cell_range_y(&self, x_lo: f32, x_hi: f32) -> (usize, usize) {
        let lo = (x_lo.floor() as i32 - self.min_x).clamp(0, self.height as i32);
        let hi = (x_hi.floor() as i32 - self.min_x + 1).clamp(0, self.height as i32);
        (lo as usize, hi as usize)
    }

    /// Number of live sprites in the grid.
    pub fn sprite_count(&self) -> usize {
        let mut count = 0;
        self.for_each_sprite(|_| count += 1);
        count
    }

    pub fn for_each_sprite(&self, mut func: impl FnMut(&SpriteRef)) {
        for cell in self.cells.iter().flatten() {
            cell.traverse(&mut func);
        }
    }

    /// Replaces the heightmap with a flat one of the new resolution.
    pub fn set_ground_mult(&mut self, mult_x: usize, mult_y: usize) -> IsoResult<()> {
        if mult_x == 0 || mult_y == 0 {
            return Err(IsoError::InvalidArgument(format!(
                "ground multiplier must be positive, got {mult_x}x{mult_y}"
            )));
        }
        self.ground = GroundMap::new(self.width, self.height, mult_x, mult_y);
        self.ground.set_origin(self.min_x as f32, self.min_z as f32);
        self.recalc_static = true;
        self.ground_changed();
        Ok(())
    }

    pub fn ground_mult(&self) -> (usize, usize) {
        self.ground.mult()
    }

    pub fn ground(&self) -> &GroundMap {
        &self.ground
    }

    /// Heightmap edits take effect on light visibility at the next relight.
    pub fn ground_mut(&mut self) -> &mut GroundMap {
        self.recalc_static = true;
        self.ground_changed();
        &mut self.ground
    }

    /// Drops every registered light's visibility map and, with static
    /// lights present, schedules a relight.
    fn ground_changed(&mut self) {
        if !self.static_lights.is_empty() {
            self.recalc_static = true;
        }
        for light in self.static_lights.iter().chain(&self.dynamic_lights) {
            light.write().invalidate_vis();
        }
    }

    pub fn ground_hit_beam(&self, src: Vec3, dest: Vec3) -> bool {
        self.ground.hit_beam(src, dest)
    }

    pub fn set_all_light(&self, color: Vec3) {
        self.for_each_sprite(|sprite| sprite.write().set_all_colors(color));
    }

    pub fn set_all_static_light(&self, color: Vec3) {
        self.for_each_sprite(|sprite| sprite.write().set_all_static_colors(color));
    }

    pub fn static_lights(&self) -> &[LightRef] {
        &self.static_lights
    }

    pub fn dynamic_lights(&self) -> &[LightRef] {
        &self.dynamic_lights
    }

    /// Registers a light in the list matching its kind. Static lights mark
    /// the grid for a full relight.
    pub fn register_light(&mut self, light: &LightRef) {
        if self.has_light(light) {
            return;
        }
        let dynamic = {
            let mut guard = light.write();
            guard.set_grid(Some(self.id));
            guard.is_dynamic()
        };
        if dynamic {
            self.dynamic_lights.push(Arc::clone(light));
        } else {
            self.static_lights.push(Arc::clone(light));
            self.recalc_static = true;
        }
        debug!(
            "registered {} light in grid {}",
            if dynamic { "dynamic" } else { "static" },
            self.id.index()
        );
    }

    /// Returns false if the light was not registered here.
    pub fn unregister_light(&mut self, light: &LightRef) -> bool {
        let before = self.static_lights.len();
        self.static_lights.retain(|l| !Arc::ptr_eq(l, light));
        let was_static = self.static_lights.len() != before;
        let before = self.dynamic_lights.len();
        self.dynamic_lights.retain(|l| !Arc::ptr_eq(l, light));
        let was_dynamic = self.dynamic_lights.len() != before;
        if !(was_static || was_dynamic) {
            return false;
        }
        if was_static {
            self.recalc_static = true;
        }
        let mut guard = light.write();
        if guard.grid() == Some(self.id) {
            guard.set_grid(None);
        }
        debug!("unregistered light from grid {}", self.id.index());
        true
    }

    fn has_light(&self, light: &LightRef) -> bool {
        self.static_lights
            .iter()
            .chain(&self.dynamic_lights)
            .any(|l| Arc::ptr_eq(l, light))
    }

    /// Lights reaching `pos`, for objects that light themselves.
    pub fn lights_at(&self, pos: Vec3) -> Vec<LightSample> {
        self.static_lights
            .iter()
            .chain(&self.dynamic_lights)
            .filter_map(|light| light.write().sample(self, pos))
            .collect()
    }

    pub fn add_sprite(&mut self, sprite: &SpriteRef) {
        let pos = sprite.read().position();
        self.add_sprite_at(sprite, pos);
    }

    /// Inserts `sprite` in the cell under `pos` and lights it with the
    /// static lights, unless a full relight is already pending.
    pub fn add_sprite_at(&mut self, sprite: &SpriteRef, pos: Vec3) {
        let (cx, cy) = self.cell_coords(pos);
        let index = cy * self.width + cx;
        self.cells[index]
            .get_or_insert_with(Cell::new)
            .add_sprite(sprite, pos);

        sprite.write().set_grid(Some(self.id));
        if self.recalc_static || self.static_lights.is_empty() {
            return;
        }
        sprite.write().set_all_static_colors(Vec3::ZERO);
        for light in &self.static_lights {
            let mut light = light.write();
            light.shine_sprite(&mut sprite.write(), self, LightKind::Static);
        }
        sprite.write().reset_all_colors();
    }

    /// Removes `sprite`, which must have been added at `pos`.
    pub fn remove_sprite_at(&mut self, sprite: &SpriteRef, pos: Vec3) -> IsoResult<()> {
        let (cx, cy) = self.cell_coords(pos);
        let index = cy * self.width + cx;
        let cell = self.cells[index]
            .as_mut()
            .ok_or(IsoError::SpriteNotFound)?;
        cell.remove_sprite(sprite, pos)?;
        if cell.is_empty() {
            self.cells[index] = None;
        }
        let mut guard = sprite.write();
        if guard.grid() == Some(self.id) {
            guard.set_grid(None);
        }
        Ok(())
    }

    /// Removes `sprite` using its current position.
    pub fn remove_sprite(&mut self, sprite: &SpriteRef) -> IsoResult<()> {
        let pos = sprite.read().position();
        self.remove_sprite_at(sprite, pos)
    }

    /// True if `pos` is far enough inside the grid to move there without
    /// changing grids.
    pub fn contains_strict(&self, pos: Vec3) -> bool {
        self.bounds.contains_strict(pos, MOVE_EPSILON)
    }

    /// Moves `sprite` from `old` to `new` inside this grid.
    pub fn relocate_sprite(&mut self, sprite: &SpriteRef, old: Vec3, new: Vec3) -> IsoResult<()> {
        self.remove_sprite_at(sprite, old)?;
        sprite.write().force_position(new);
        self.add_sprite_at(sprite, new);
        Ok(())
    }

    pub fn needs_static_relight(&self) -> bool {
        self.recalc_static || self.static_lights.iter().any(|l| l.read().changed())
    }

    /// Clears every color in the grid and shines all static lights again.
    pub fn recalc_static_light(&mut self) {
        self.recalc_static = false;
        let grid: &Grid = self;
        grid.for_each_sprite(|sprite| {
            let mut sprite = sprite.write();
            sprite.set_all_static_colors(Vec3::ZERO);
            sprite.set_all_colors(Vec3::ZERO);
        });
        for light in &grid.static_lights {
            let mut light = light.write();
            light.shine_grid(grid, LightKind::Static);
            light.clear_changed();
        }
        info!(
            "relit grid {} with {} static lights",
            grid.id.index(),
            grid.static_lights.len()
        );
    }

    /// Draws the grid for the current pass of `rview`.
    pub fn draw(&mut self, rview: &mut RenderView, g3d: &mut dyn Graphics3D) {
        match rview.pass() {
            RenderPass::Pre => self.prepare(rview),
            RenderPass::Main | RenderPass::Fg => self.draw_cells(rview, g3d),
            RenderPass::Bg | RenderPass::Post => {}
        }
    }

    fn prepare(&mut self, rview: &mut RenderView) {
        rview.lower_min_z(self.bounds.min.z - self.bounds.max.x - 1.0);
        self.sweep_cells();
        if self.needs_static_relight() {
            self.recalc_static_light();
        }
        let grid: &Grid = self;
        grid.for_each_sprite(|sprite| sprite.write().reset_all_colors());
        for light in &grid.dynamic_lights {
            light.write().shine_grid(grid, LightKind::Dynamic);
        }
        grid.for_each_sprite(|sprite| {
            if !sprite.read().is_mesh() {
                return;
            }
            let pos = sprite.read().position();
            let samples = grid.lights_at(pos);
            sprite.write().update_mesh_lighting(&samples);
        });
    }

    /// Prunes dropped sprites and frees cells left empty.
    fn sweep_cells(&mut self) {
        let mut dropped = 0;
        for slot in &mut self.cells {
            let empty = match slot {
                Some(cell) => {
                    dropped += cell.prune();
                    cell.is_empty()
                }
                None => false,
            };
            if empty {
                *slot = None;
            }
        }
        if dropped > 0 {
            debug!("grid {} dropped {dropped} dead sprite nodes", self.id.index());
        }
    }

    /// Visits the cells inside the precalculated window, farthest depth
    /// row first.
    fn draw_cells(&self, rview: &mut RenderView, g3d: &mut dyn Graphics3D) {
        let precalc = *rview.precalc();
        let (width, height) = (self.width as i32, self.height as i32);
        for line in 0..precalc.scan_h {
            for pass in 0..2 {
                let (z, x) = precalc.row_start(line, pass);
                let (bz, bx) = (z - self.min_z, x - self.min_x);
                let lo = 0.max(-bz).max(-bx);
                let hi = precalc.scan_w.min(width - bz).min(height - bx);
                for i in lo..hi {
                    let index = (bx + i) as usize * self.width + (bz + i) as usize;
                    if let Some(cell) = &self.cells[index] {
                        cell.draw(rview, g3d);
                    }
                }
            }
        }
    }
}
