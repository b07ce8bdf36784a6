use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Error};
use glam::Vec3;
use log::debug;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::config::LightingConfig;
use crate::grid::Grid;
use crate::mesh::LightSample;
use crate::sprite::Sprite;
use crate::world::GridId;

/// Shared handle to a light.
pub type LightRef = Arc<RwLock<Light>>;

/// How light brightness fades with distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Attenuation {
    /// `1`
    None,
    /// `(radius - distance) / radius`, zero beyond the radius.
    Linear,
    /// `radius / distance`
    Inverse,
    /// `(radius / distance)^2`
    #[default]
    Realistic,
}

impl Attenuation {
    /// Attenuation factor for a light of `radius` at `distance`.
    pub fn factor(self, radius: f32, distance: f32) -> f32 {
        let distance = distance.max(f32::EPSILON);
        match self {
            Attenuation::None => 1.0,
            Attenuation::Linear => {
                if radius <= 0.0 || distance >= radius {
                    0.0
                } else {
                    (radius - distance) / radius
                }
            }
            Attenuation::Inverse => radius / distance,
            Attenuation::Realistic => {
                let ratio = radius / distance;
                ratio * ratio
            }
        }
    }

    /// Level file index: 0 none, 1 linear, 2 inverse, 3 realistic.
    pub fn from_index(index: u32) -> Option<Self> {
        match index {
            0 => Some(Attenuation::None),
            1 => Some(Attenuation::Linear),
            2 => Some(Attenuation::Inverse),
            3 => Some(Attenuation::Realistic),
            _ => None,
        }
    }
}

impl FromStr for Attenuation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(index) = s.parse::<u32>() {
            return Attenuation::from_index(index)
                .ok_or_else(|| anyhow!("attenuation index out of range: {index}"));
        }
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Attenuation::None),
            "linear" => Ok(Attenuation::Linear),
            "inverse" => Ok(Attenuation::Inverse),
            "realistic" => Ok(Attenuation::Realistic),
            other => Err(anyhow!("unknown attenuation: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LightKind {
    /// Shone once and cached in the sprites' static colors.
    #[default]
    Static,
    /// Shone again every frame.
    Dynamic,
}

/// A point light shining on the sprites of one grid.
#[derive(Debug, Clone)]
pub struct Light {
    position: Vec3,
    color: Vec3,
    radius: f32,
    attenuation: Attenuation,
    kind: LightKind,
    grid: Option<GridId>,
    config: LightingConfig,
    vis: Vec<f32>,
    vis_width: usize,
    vis_height: usize,
    recalc_vis: bool,
    changed: bool,
}

impl Default for Light {
    fn default() -> Self {
        Self::new(LightingConfig::default())
    }
}

impl Light {
    pub fn new(config: LightingConfig) -> Self {
        Self {
            position: Vec3::ZERO,
            color: Vec3::ONE,
            radius: 5.0,
            attenuation: Attenuation::default(),
            kind: LightKind::Static,
            grid: None,
            config,
            vis: Vec::new(),
            vis_width: 0,
            vis_height: 0,
            recalc_vis: true,
            changed: false,
        }
    }

    pub fn shared(self) -> LightRef {
        Arc::new(RwLock::new(self))
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn set_position(&mut self, position: Vec3) {
        if position != self.position {
            self.position = position;
            self.recalc_vis = true;
            self.changed = true;
        }
    }

    pub fn color(&self) -> Vec3 {
        self.color
    }

    pub fn set_color(&mut self, color: Vec3) {
        self.color = color;
        self.changed = true;
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn set_radius(&mut self, radius: f32) {
        if radius != self.radius {
            self.radius = radius;
            self.recalc_vis = true;
            self.changed = true;
        }
    }

    pub fn attenuation(&self) -> Attenuation {
        self.attenuation
    }

    pub fn set_attenuation(&mut self, attenuation: Attenuation) {
        if attenuation != self.attenuation {
            self.attenuation = attenuation;
            // the search window depends on the attenuation
            self.recalc_vis = true;
            self.changed = true;
        }
    }

    pub fn kind(&self) -> LightKind {
        self.kind
    }

    pub fn is_dynamic(&self) -> bool {
        self.kind == LightKind::Dynamic
    }

    /// Changes the light kind.
    ///
    /// A grid keeps shining a registered light into the colors of the list
    /// it was registered in until it is registered again;
    /// [`crate::World::set_light_kind`] changes the kind and moves the light
    /// to the matching list in one step.
    pub fn set_kind(&mut self, kind: LightKind) {
        self.kind = kind;
    }

    pub fn grid(&self) -> Option<GridId> {
        self.grid
    }

    pub(crate) fn set_grid(&mut self, grid: Option<GridId>) {
        if grid != self.grid {
            self.grid = grid;
            self.recalc_vis = true;
        }
    }

    pub fn config(&self) -> &LightingConfig {
        &self.config
    }

    /// True if visibility must be recomputed before shining.
    pub fn needs_vis(&self) -> bool {
        self.recalc_vis
    }

    pub(crate) fn invalidate_vis(&mut self) {
        self.recalc_vis = true;
    }

    pub(crate) fn changed(&self) -> bool {
        self.changed
    }

    pub(crate) fn clear_changed(&mut self) {
        self.changed = false;
    }

    pub fn attenuation_factor(&self, distance: f32) -> f32 {
        self.attenuation.factor(self.radius, distance)
    }

    /// Distance beyond which the light is ignored.
    pub fn max_radius(&self) -> f32 {
        let cutoff = self.config.cutoff.clamp(f32::EPSILON, 1.0);
        match self.attenuation {
            Attenuation::None => self.config.unbounded_radius,
            Attenuation::Linear => self.radius,
            Attenuation::Inverse => self.radius / cutoff,
            Attenuation::Realistic => self.radius / cutoff.sqrt(),
        }
    }

    /// Visibility of the light from ground sample (`x`, `y`), `0` outside
    /// the computed map.
    pub fn visibility(&self, x: i32, y: i32) -> f32 {
        if x < 0 || y < 0 || x as usize >= self.vis_width || y as usize >= self.vis_height {
            return 0.0;
        }
        self.vis[y as usize * self.vis_width + x as usize]
    }

    /// Inclusive window of ground samples within `max_radius` of the light.
    fn ground_window(&self, grid: &Grid) -> Option<(usize, usize, usize, usize)> {
        let ground = grid.ground();
        let (mult_x, mult_y) = ground.mult();
        let (cx, cy) = ground.map_coords(self.position);
        let reach = self.max_radius();
        let clamp = |v: f32, len: usize| v.clamp(0.0, len as f32 - 1.0) as usize;
        let (w, h) = (ground.width(), ground.height());
        if w == 0 || h == 0 {
            return None;
        }
        let x_lo = cx - reach * mult_x as f32;
        let x_hi = cx + reach * mult_x as f32;
        let y_lo = cy - reach * mult_y as f32;
        let y_hi = cy + reach * mult_y as f32;
        if x_hi < 0.0 || y_hi < 0.0 || x_lo >= w as f32 || y_lo >= h as f32 {
            return None;
        }
        Some((
            clamp(x_lo.floor(), w),
            clamp(x_hi.floor(), w),
            clamp(y_lo.floor(), h),
            clamp(y_hi.floor(), h),
        ))
    }

    /// Recomputes the visibility map against the grid's heightmap.
    ///
    /// Every ground sample within reach is tested with five beams (center
    /// and four offset corners, all at the sample's ground height) and gets
    /// the fraction that reached it.
    pub fn calc_vis(&mut self, grid: &Grid) {
        let ground = grid.ground();
        self.vis_width = ground.width();
        self.vis_height = ground.height();
        self.vis.clear();
        self.vis.resize(self.vis_width * self.vis_height, 0.0);
        self.recalc_vis = false;

        let Some((x_lo, x_hi, y_lo, y_hi)) = self.ground_window(grid) else {
            debug!("light at {:?} does not reach grid {:?}", self.position, grid.id());
            return;
        };
        let (mult_x, mult_y) = ground.mult();
        let spread_x = self.config.sample_spread / mult_y as f32;
        let spread_z = self.config.sample_spread / mult_x as f32;
        let reach = self.max_radius();
        let offsets = [
            Vec3::ZERO,
            Vec3::new(-spread_x, 0.0, -spread_z),
            Vec3::new(spread_x, 0.0, -spread_z),
            Vec3::new(-spread_x, 0.0, spread_z),
            Vec3::new(spread_x, 0.0, spread_z),
        ];

        for y in y_lo..=y_hi {
            for x in x_lo..=x_hi {
                let center = ground.sample_center(x, y);
                if (center - self.position).length() > reach {
                    continue;
                }
                let hits = offsets
                    .iter()
                    .filter(|&&offset| ground.hit_beam(self.position, center + offset))
                    .count();
                self.vis[y * self.vis_width + x] = hits as f32 / offsets.len() as f32;
            }
        }
    }

    fn ensure_vis(&mut self, grid: &Grid) {
        if self.recalc_vis
            || self.vis_width != grid.ground().width()
            || self.vis_height != grid.ground().height()
        {
            self.calc_vis(grid);
        }
    }

    /// Visibility at a world point: the sample under it averaged with its
    /// four neighbors.
    fn blurred_visibility(&self, grid: &Grid, world: Vec3) -> f32 {
        let (mx, my) = grid.ground().map_coords(world);
        let (x, y) = (mx.floor() as i32, my.floor() as i32);
        let mut sum = 0.0;
        let mut count = 0;
        for (dx, dy) in [(0, 0), (-1, 0), (1, 0), (0, -1), (0, 1)] {
            let (sx, sy) = (x + dx, y + dy);
            if sx < 0 || sy < 0 || sx as usize >= self.vis_width || sy as usize >= self.vis_height {
                continue;
            }
            sum += self.visibility(sx, sy);
            count += 1;
        }
        if count == 0 {
            0.0
        } else {
            sum / count as f32
        }
    }

    /// Adds this light's contribution to every vertex of `sprite`, into the
    /// static colors for [`LightKind::Static`] and the frame colors
    /// otherwise.
    pub fn shine_sprite(&mut self, sprite: &mut Sprite, grid: &Grid, target: LightKind) {
        self.ensure_vis(grid);
        self.shine_cached(sprite, grid, target);
    }

    fn shine_cached(&self, sprite: &mut Sprite, grid: &Grid, target: LightKind) {
        let origin = sprite.position();
        let dynamic = target == LightKind::Dynamic;
        for i in 0..sprite.vertex_count() {
            let Some(offset) = sprite.vertex_position(i) else {
                continue;
            };
            let world = origin + offset;
            let visibility = self.blurred_visibility(grid, world);
            if visibility <= 0.0 {
                continue;
            }
            let distance = (world - self.position).length();
            let contribution = self.color * visibility * self.attenuation_factor(distance);
            if dynamic {
                sprite.add_to_vertex_color(i, contribution);
            } else {
                sprite.add_to_vertex_static_color(i, contribution);
            }
        }
    }

    /// Shines on every sprite in the cells within reach.
    pub fn shine_grid(&mut self, grid: &Grid, target: LightKind) {
        self.ensure_vis(grid);
        let reach = self.max_radius();
        let (x_lo, x_hi) = grid.cell_range_x(self.position.z - reach, self.position.z + reach);
        let (y_lo, y_hi) = grid.cell_range_y(self.position.x - reach, self.position.x + reach);
        for cy in y_lo..y_hi {
            for cx in x_lo..x_hi {
                if let Some(cell) = grid.cell(cx, cy) {
                    cell.traverse(|sprite| {
                        self.shine_cached(&mut sprite.write(), grid, target)
                    });
                }
            }
        }
    }

    /// This light as seen from `world`, for mesh lighting. `None` when out
    /// of reach or hidden.
    pub fn sample(&mut self, grid: &Grid, world: Vec3) -> Option<LightSample> {
        if (world - self.position).length() > self.max_radius() {
            return None;
        }
        self.ensure_vis(grid);
        let visibility = self.blurred_visibility(grid, world);
        (visibility > 0.0).then_some(LightSample {
            position: self.position,
            color: self.color,
            radius: self.radius,
            attenuation: self.attenuation,
            visibility,
        })
    }
}
