//! Core of the Crystal isometric world engine, rewritten in Rust.
//!
//! A [`World`] is a set of rectangular [`Grid`]s. Every grid cell keeps its
//! sprites ordered by height, every grid carries a [`GroundMap`] used for
//! light visibility, and a [`View`] draws the whole thing back to front
//! through any [`Graphics3D`] implementation. No windowing or GPU code lives
//! here; [`RecordingDevice`] captures the draw calls for tools and tests.

pub mod camera;
pub mod cell;
pub mod clip;
pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod grid;
pub mod ground;
pub mod level;
pub mod light;
pub mod mesh;
pub mod render_view;
pub mod sprite;
pub mod view;
pub mod world;

pub use camera::FakeCamera;
pub use cell::Cell;
pub use clip::{BoxClipper, ClipOrigin, ClippedPolygon, Clipper2D};
pub use config::{EngineConfig, LightingConfig, ViewConfig};
pub use device::{
    DrawCall, FxVertex, Graphics3D, MaterialHandle, MixMode, PolygonFx, RecordingDevice,
};
pub use engine::{IsoEngine, MaterialInfo};
pub use error::{IsoError, IsoResult};
pub use geometry::{Aabb, Rect};
pub use grid::Grid;
pub use ground::GroundMap;
pub use level::Level;
pub use light::{Attenuation, Light, LightKind, LightRef};
pub use mesh::{
    LightSample, MeshObject, MeshRenderContext, MeshSprite, MeshTransform, TriangleMesh,
    ZBufMode,
};
pub use render_view::{PrecalcGrid, RenderPass, RenderView};
pub use sprite::{Sprite, SpriteRef, SpriteShape, SpriteVertex};
pub use view::{Projection, View};
pub use world::{GridChangeListener, GridId, MoveOutcome, World};
