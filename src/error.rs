use thiserror::Error;

/// Errors reported by the isometric engine core.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IsoError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("no grid contains position ({x}, {y}, {z})")]
    OutOfBounds { x: f32, y: f32, z: f32 },
    #[error("ground index ({x}, {y}) outside {width}x{height} map")]
    GroundIndex {
        x: i32,
        y: i32,
        width: usize,
        height: usize,
    },
    #[error("sprite not found at the given position")]
    SpriteNotFound,
    #[error("sprite belongs to a grid; move it through the world")]
    SpriteAttached,
    #[error("sprite has no material")]
    MissingMaterial,
    #[error("unknown grid id {0}")]
    UnknownGrid(usize),
}

pub type IsoResult<T> = Result<T, IsoError>;

impl IsoError {
    pub(crate) fn out_of_bounds(pos: glam::Vec3) -> Self {
        Self::OutOfBounds {
            x: pos.x,
            y: pos.y,
            z: pos.z,
        }
    }
}
