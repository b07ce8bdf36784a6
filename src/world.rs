use glam::Vec3;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::device::Graphics3D;
use crate::error::{IsoError, IsoResult};
use crate::grid::Grid;
use crate::light::{LightKind, LightRef};
use crate::render_view::RenderView;
use crate::sprite::SpriteRef;

/// Index of a grid inside its world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridId(usize);

impl GridId {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

/// Notified when a sprite moves into another grid.
pub trait GridChangeListener: Send + Sync {
    fn grid_changed(&self, sprite: &SpriteRef, new_grid: GridId);
}

impl<F> GridChangeListener for F
where
    F: Fn(&SpriteRef, GridId) + Send + Sync,
{
    fn grid_changed(&self, sprite: &SpriteRef, new_grid: GridId) {
        self(sprite, new_grid)
    }
}

/// Result of a successful [`World::move_sprite`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The target equals the current position.
    Unchanged,
    /// Moved within its grid.
    Moved,
    /// Handed over to another grid.
    ChangedGrid { from: GridId, to: GridId },
    /// The sprite is not in any grid; only its position changed.
    Detached,
}

/// The isometric world: a set of grids.
#[derive(Debug, Default)]
pub struct World {
    grids: Vec<Grid>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty grid of `width` cells along `z` and `height` along
    /// `x`, placed at the origin. Use [`Grid::set_space`] to move it.
    pub fn create_grid(&mut self, width: usize, height: usize) -> IsoResult<GridId> {
        if width == 0 || height == 0 {
            return Err(IsoError::InvalidArgument(format!(
                "grid size must be positive, got {width}x{height}"
            )));
        }
        let id = GridId::new(self.grids.len());
        self.grids.push(Grid::new(id, width, height));
        debug!("created {width}x{height} grid {}", id.index());
        Ok(id)
    }

    pub fn grid(&self, id: GridId) -> IsoResult<&Grid> {
        self.grids
            .get(id.index())
            .ok_or(IsoError::UnknownGrid(id.index()))
    }

    pub fn grid_mut(&mut self, id: GridId) -> IsoResult<&mut Grid> {
        self.grids
            .get_mut(id.index())
            .ok_or(IsoError::UnknownGrid(id.index()))
    }

    pub fn grids(&self) -> &[Grid] {
        &self.grids
    }

    /// First grid whose box contains `pos`.
    pub fn find_grid(&self, pos: Vec3) -> Option<GridId> {
        self.grids.iter().find(|g| g.contains(pos)).map(Grid::id)
    }

    /// Adds `sprite` to the grid containing its position. Does nothing and
    /// returns `None` when no grid contains it, or when the grid it claims
    /// to be in does not hold it at its position.
    pub fn add_sprite(&mut self, sprite: &SpriteRef) -> Option<GridId> {
        let (pos, current) = {
            let sprite = sprite.read();
            (sprite.position(), sprite.grid())
        };
        let Some(id) = self.find_grid(pos) else {
            debug!("no grid contains {pos:?}; sprite not added");
            return None;
        };
        if let Some(current) = current {
            if let Ok(grid) = self.grid_mut(current) {
                // already placed somewhere, take it out first
                if let Err(err) = grid.remove_sprite_at(sprite, pos) {
                    warn!(
                        "sprite at {pos:?} not found in grid {}: {err}; not added",
                        current.index()
                    );
                    return None;
                }
            }
        }
        self.grids[id.index()].add_sprite_at(sprite, pos);
        Some(id)
    }

    pub fn remove_sprite(&mut self, sprite: &SpriteRef) -> IsoResult<()> {
        let id = sprite.read().grid().ok_or(IsoError::SpriteNotFound)?;
        self.grid_mut(id)?.remove_sprite(sprite)
    }

    /// Moves `sprite` to `new_pos`, re-indexing it in its grid or handing it
    /// to the grid that contains the target.
    ///
    /// Fails with [`IsoError::OutOfBounds`] when no grid contains the
    /// target; the sprite then keeps its position and cell.
    pub fn move_sprite(&mut self, sprite: &SpriteRef, new_pos: Vec3) -> IsoResult<MoveOutcome> {
        let (old_pos, current) = {
            let sprite = sprite.read();
            (sprite.position(), sprite.grid())
        };
        if new_pos == old_pos {
            return Ok(MoveOutcome::Unchanged);
        }
        let Some(from) = current else {
            sprite.write().force_position(new_pos);
            return Ok(MoveOutcome::Detached);
        };

        let grid = self.grid_mut(from)?;
        if grid.contains_strict(new_pos) {
            grid.relocate_sprite(sprite, old_pos, new_pos)?;
            return Ok(MoveOutcome::Moved);
        }

        let Some(to) = self.find_grid(new_pos) else {
            warn!("blocked move from {old_pos:?} to {new_pos:?}: outside every grid");
            return Err(IsoError::out_of_bounds(new_pos));
        };
        if to == from {
            self.grids[from.index()].relocate_sprite(sprite, old_pos, new_pos)?;
            return Ok(MoveOutcome::Moved);
        }

        self.grids[from.index()].remove_sprite_at(sprite, old_pos)?;
        sprite.write().force_position(new_pos);
        self.grids[to.index()].add_sprite_at(sprite, new_pos);
        info!(
            "sprite moved from grid {} to grid {}",
            from.index(),
            to.index()
        );

        let listener = sprite.read().grid_change_listener();
        if let Some(listener) = listener {
            listener.grid_changed(sprite, to);
        }
        Ok(MoveOutcome::ChangedGrid { from, to })
    }

    pub fn move_sprite_by(&mut self, sprite: &SpriteRef, delta: Vec3) -> IsoResult<MoveOutcome> {
        let pos = sprite.read().position();
        self.move_sprite(sprite, pos + delta)
    }

    /// Registers `light` with grid `id`, or with none, leaving the grid it
    /// was registered with before.
    pub fn set_light_grid(&mut self, light: &LightRef, id: Option<GridId>) -> IsoResult<()> {
        if let Some(id) = id {
            self.grid(id)?;
        }
        let current = light.read().grid();
        if let Some(current) = current {
            if let Ok(grid) = self.grid_mut(current) {
                grid.unregister_light(light);
            }
        }
        if let Some(id) = id {
            self.grid_mut(id)?.register_light(light);
        }
        Ok(())
    }

    /// Changes the kind of `light` and moves it to the matching list of the
    /// grid it is registered with.
    pub fn set_light_kind(&mut self, light: &LightRef, kind: LightKind) -> IsoResult<()> {
        let current = {
            let mut guard = light.write();
            guard.set_kind(kind);
            guard.grid()
        };
        if let Some(id) = current {
            let grid = self.grid_mut(id)?;
            grid.unregister_light(light);
            grid.register_light(light);
        }
        Ok(())
    }

    /// Draws every grid for the current pass.
    pub fn draw(&mut self, rview: &mut RenderView, g3d: &mut dyn Graphics3D) {
        for grid in &mut self.grids {
            grid.draw(rview, g3d);
        }
    }
}
