use glam::Vec3;

use crate::error::{IsoError, IsoResult};

/// Height field sampled `multx` by `multy` times per grid cell.
///
/// The map's `x` index runs along world `z` and its `y` index along world
/// `x`, matching the cell layout of the grid that owns it.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundMap {
    width: usize,
    height: usize,
    mult_x: usize,
    mult_y: usize,
    min_x: f32,
    min_z: f32,
    values: Vec<f32>,
}

impl GroundMap {
    /// Creates a flat map for a grid of `grid_width` by `grid_height` cells.
    pub fn new(grid_width: usize, grid_height: usize, mult_x: usize, mult_y: usize) -> Self {
        let mult_x = mult_x.max(1);
        let mult_y = mult_y.max(1);
        let width = grid_width * mult_x;
        let height = grid_height * mult_y;
        Self {
            width,
            height,
            mult_x,
            mult_y,
            min_x: 0.0,
            min_z: 0.0,
            values: vec![0.0; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn mult(&self) -> (usize, usize) {
        (self.mult_x, self.mult_y)
    }

    /// World `x`/`z` of the map's first sample corner.
    pub fn origin(&self) -> (f32, f32) {
        (self.min_x, self.min_z)
    }

    pub fn set_origin(&mut self, min_x: f32, min_z: f32) {
        self.min_x = min_x;
        self.min_z = min_z;
    }

    fn index(&self, x: i32, y: i32) -> IsoResult<usize> {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return Err(IsoError::GroundIndex {
                x,
                y,
                width: self.width,
                height: self.height,
            });
        }
        Ok(y as usize * self.width + x as usize)
    }

    pub fn ground(&self, x: i32, y: i32) -> IsoResult<f32> {
        self.index(x, y).map(|i| self.values[i])
    }

    pub fn set_ground(&mut self, x: i32, y: i32, value: f32) -> IsoResult<()> {
        let i = self.index(x, y)?;
        self.values[i] = value;
        Ok(())
    }

    /// Height of sub sample (`sub_x`, `sub_y`) of grid cell (`cell_x`, `cell_y`).
    pub fn cell_ground(&self, cell_x: i32, cell_y: i32, sub_x: i32, sub_y: i32) -> IsoResult<f32> {
        self.check_sub(sub_x, sub_y)?;
        self.ground(
            cell_x * self.mult_x as i32 + sub_x,
            cell_y * self.mult_y as i32 + sub_y,
        )
    }

    pub fn set_cell_ground(
        &mut self,
        cell_x: i32,
        cell_y: i32,
        sub_x: i32,
        sub_y: i32,
        value: f32,
    ) -> IsoResult<()> {
        self.check_sub(sub_x, sub_y)?;
        self.set_ground(
            cell_x * self.mult_x as i32 + sub_x,
            cell_y * self.mult_y as i32 + sub_y,
            value,
        )
    }

    fn check_sub(&self, sub_x: i32, sub_y: i32) -> IsoResult<()> {
        if sub_x < 0 || sub_y < 0 || sub_x as usize >= self.mult_x || sub_y as usize >= self.mult_y {
            return Err(IsoError::InvalidArgument(format!(
                "ground sub index ({sub_x}, {sub_y}) outside {}x{} multiplier",
                self.mult_x, self.mult_y
            )));
        }
        Ok(())
    }

    /// Continuous map coordinates of a world point.
    pub fn map_coords(&self, world: Vec3) -> (f32, f32) {
        (
            (world.z - self.min_z) * self.mult_x as f32,
            (world.x - self.min_x) * self.mult_y as f32,
        )
    }

    /// World point at the center of map sample (`x`, `y`), on the ground.
    pub fn sample_center(&self, x: usize, y: usize) -> Vec3 {
        let height = self.values[y * self.width + x];
        Vec3::new(
            self.min_x + (y as f32 + 0.5) / self.mult_y as f32,
            height,
            self.min_z + (x as f32 + 0.5) / self.mult_x as f32,
        )
    }

    /// Height under a world point, if the point lies over the map.
    pub fn ground_at(&self, world: Vec3) -> Option<f32> {
        let (mx, my) = self.map_coords(world);
        if mx < 0.0 || my < 0.0 {
            return None;
        }
        self.ground(mx as i32, my as i32).ok()
    }

    /// True if the segment from `src` to `dest` never dips to or below the
    /// ground. Stepping is approximate: two samples per map cell of travel,
    /// endpoints excluded, samples outside the map are passable.
    pub fn hit_beam(&self, src: Vec3, dest: Vec3) -> bool {
        let Some((start, end)) = self.clip_segment(src, dest) else {
            return true;
        };
        let delta = end - start;
        let scaled_x = delta.z * self.mult_x as f32;
        let scaled_y = delta.x * self.mult_y as f32;
        let steps = (2.0 * (scaled_x * scaled_x + scaled_y * scaled_y).sqrt()).round() as i32;
        if steps <= 0 {
            return true;
        }
        let step = delta / steps as f32;
        let mut pos = start;
        for _ in 1..steps {
            pos += step;
            let (mx, my) = self.map_coords(pos);
            if mx < 0.0 || my < 0.0 {
                continue;
            }
            if let Ok(ground) = self.ground(mx as i32, my as i32) {
                if pos.y <= ground {
                    return false;
                }
            }
        }
        true
    }

    /// Clips a segment to the map's footprint, vertically unbounded.
    /// Returns `None` when the segment misses the footprint entirely.
    fn clip_segment(&self, src: Vec3, dest: Vec3) -> Option<(Vec3, Vec3)> {
        let max_x = self.min_x + (self.height / self.mult_y) as f32;
        let max_z = self.min_z + (self.width / self.mult_x) as f32;
        let inside = |p: Vec3| p.x >= self.min_x && p.x <= max_x && p.z >= self.min_z && p.z <= max_z;
        if inside(src) && inside(dest) {
            return Some((src, dest));
        }

        let delta = dest - src;
        let mut t0 = 0.0f32;
        let mut t1 = 1.0f32;
        for (p, q) in [
            (-delta.x, src.x - self.min_x),
            (delta.x, max_x - src.x),
            (-delta.z, src.z - self.min_z),
            (delta.z, max_z - src.z),
        ] {
            if p == 0.0 {
                if q < 0.0 {
                    return None;
                }
                continue;
            }
            let t = q / p;
            if p < 0.0 {
                t0 = t0.max(t);
            } else {
                t1 = t1.min(t);
            }
            if t0 > t1 {
                return None;
            }
        }
        Some((src + delta * t0, src + delta * t1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_length_beam_is_unobstructed() {
        let mut map = GroundMap::new(4, 4, 2, 2);
        map.set_ground(3, 3, 100.0).unwrap();
        let p = Vec3::new(1.7, -5.0, 1.7);
        assert!(map.hit_beam(p, p));
    }

    #[test]
    fn wall_blocks_beam() {
        let mut map = GroundMap::new(8, 8, 1, 1);
        // wall along world x = 4 (map row 4)
        for x in 0..8 {
            map.set_ground(x, 4, 5.0).unwrap();
        }
        let src = Vec3::new(1.5, 2.0, 3.5);
        let dest = Vec3::new(7.5, 0.0, 3.5);
        assert!(!map.hit_beam(src, dest));
        let above = Vec3::new(1.5, 9.0, 3.5);
        assert!(map.hit_beam(above, Vec3::new(7.5, 8.0, 3.5)));
    }

    #[test]
    fn flat_ground_is_visible_from_above() {
        let map = GroundMap::new(4, 4, 2, 2);
        assert!(map.hit_beam(Vec3::new(2.0, 5.0, 2.0), Vec3::new(0.25, 0.0, 3.75)));
    }

    #[test]
    fn beam_outside_footprint_is_clear() {
        let mut map = GroundMap::new(2, 2, 1, 1);
        map.set_ground(0, 0, 50.0).unwrap();
        assert!(map.hit_beam(Vec3::new(-5.0, 0.0, -5.0), Vec3::new(-1.0, 0.0, 10.0)));
    }

    #[test]
    fn out_of_range_access_is_an_error() {
        let mut map = GroundMap::new(2, 3, 2, 1);
        assert_eq!(map.width(), 4);
        assert_eq!(map.height(), 3);
        assert!(matches!(
            map.set_ground(4, 0, 1.0),
            Err(IsoError::GroundIndex { x: 4, .. })
        ));
        assert!(map.ground(-1, 0).is_err());
        map.set_cell_ground(1, 2, 1, 0, 3.0).unwrap();
        assert_eq!(map.ground(3, 2).unwrap(), 3.0);
        assert!(map.cell_ground(0, 0, 2, 0).is_err());
    }

    #[test]
    fn ground_at_follows_origin() {
        let mut map = GroundMap::new(2, 2, 1, 1);
        map.set_origin(10.0, 20.0);
        map.set_ground(1, 0, 2.5).unwrap();
        assert_eq!(map.ground_at(Vec3::new(10.5, 0.0, 21.5)), Some(2.5));
        assert_eq!(map.ground_at(Vec3::new(9.5, 0.0, 21.5)), None);
    }
}
