use std::fmt;
use std::sync::Arc;

use glam::{Vec2, Vec3};
use log::debug;
use parking_lot::RwLock;

use crate::clip::{ClipOrigin, Clipper2D};
use crate::device::{FxVertex, Graphics3D, MaterialHandle, MixMode, PolygonFx};
use crate::error::{IsoError, IsoResult};
use crate::mesh::{LightSample, MeshSprite};
use crate::render_view::{RenderPass, RenderView};
use crate::world::{GridChangeListener, GridId};

/// Shared handle to a sprite. The caller owns sprites; grids only keep
/// weak references to them.
pub type SpriteRef = Arc<RwLock<Sprite>>;

/// One polygon corner with its texture coordinates and lighting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpriteVertex {
    /// Offset from the sprite position.
    pub position: Vec3,
    pub u: f32,
    pub v: f32,
    /// Color used for drawing: static baseline plus dynamic lights.
    pub color: Vec3,
    /// Baseline from static lights.
    pub static_color: Vec3,
}

/// What a sprite draws.
pub enum SpriteShape {
    Polygon(Vec<SpriteVertex>),
    Mesh(MeshSprite),
}

impl fmt::Debug for SpriteShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpriteShape::Polygon(vertices) => f.debug_tuple("Polygon").field(vertices).finish(),
            SpriteShape::Mesh(mesh) => f.debug_tuple("Mesh").field(mesh).finish(),
        }
    }
}

/// A drawable object placed in the isometric world.
pub struct Sprite {
    position: Vec3,
    shape: SpriteShape,
    material: Option<MaterialHandle>,
    mix_mode: MixMode,
    grid: Option<GridId>,
    listener: Option<Arc<dyn GridChangeListener>>,
}

impl fmt::Debug for Sprite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sprite")
            .field("position", &self.position)
            .field("shape", &self.shape)
            .field("material", &self.material)
            .field("mix_mode", &self.mix_mode)
            .field("grid", &self.grid)
            .finish_non_exhaustive()
    }
}

impl Default for Sprite {
    fn default() -> Self {
        Self::new()
    }
}

impl Sprite {
    /// Creates an empty polygon sprite at the origin.
    pub fn new() -> Self {
        Self::with_shape(SpriteShape::Polygon(Vec::new()))
    }

    pub fn with_mesh(mesh: MeshSprite) -> Self {
        Self::with_shape(SpriteShape::Mesh(mesh))
    }

    fn with_shape(shape: SpriteShape) -> Self {
        Self {
            position: Vec3::ZERO,
            shape,
            material: None,
            mix_mode: MixMode::Copy,
            grid: None,
            listener: None,
        }
    }

    /// Horizontal tile covering `h` along x and `w` along z.
    pub fn floor(pos: Vec3, w: f32, h: f32) -> Self {
        Self::quad(
            pos,
            [
                (Vec3::new(0.0, 0.0, 0.0), 0.0, 0.0),
                (Vec3::new(0.0, 0.0, w), 1.0, 0.0),
                (Vec3::new(h, 0.0, w), 1.0, 1.0),
                (Vec3::new(h, 0.0, 0.0), 0.0, 1.0),
            ],
        )
    }

    /// Upright sprite facing the viewer, centered on `pos`.
    pub fn front(pos: Vec3, w: f32, h: f32) -> Self {
        let a = w * 0.25;
        Self::quad(
            pos,
            [
                (Vec3::new(-a, 0.0, -a), 0.0, 1.0),
                (Vec3::new(a, 0.0, a), 1.0, 1.0),
                (Vec3::new(a, h, a), 1.0, 0.0),
                (Vec3::new(-a, h, -a), 0.0, 0.0),
            ],
        )
    }

    /// Upright wall running along x.
    pub fn x_wall(pos: Vec3, w: f32, h: f32) -> Self {
        Self::quad(
            pos,
            [
                (Vec3::new(0.0, 0.0, 0.0), 0.0, 1.0),
                (Vec3::new(w, 0.0, 0.0), 1.0, 1.0),
                (Vec3::new(w, h, 0.0), 1.0, 0.0),
                (Vec3::new(0.0, h, 0.0), 0.0, 0.0),
            ],
        )
    }

    /// Upright wall running along z.
    pub fn z_wall(pos: Vec3, w: f32, h: f32) -> Self {
        Self::quad(
            pos,
            [
                (Vec3::new(0.0, 0.0, 0.0), 0.0, 1.0),
                (Vec3::new(0.0, 0.0, w), 1.0, 1.0),
                (Vec3::new(0.0, h, w), 1.0, 0.0),
                (Vec3::new(0.0, h, 0.0), 0.0, 0.0),
            ],
        )
    }

    fn quad(pos: Vec3, corners: [(Vec3, f32, f32); 4]) -> Self {
        let mut sprite = Self::new();
        for (coord, u, v) in corners {
            sprite.add_vertex(coord, u, v);
        }
        sprite.position = pos;
        sprite
    }

    /// Wraps the sprite in a shared handle.
    pub fn shared(self) -> SpriteRef {
        Arc::new(RwLock::new(self))
    }

    pub fn shape(&self) -> &SpriteShape {
        &self.shape
    }

    pub fn is_mesh(&self) -> bool {
        matches!(self.shape, SpriteShape::Mesh(_))
    }

    /// Number of lit polygon vertices; mesh sprites have none.
    pub fn vertex_count(&self) -> usize {
        self.vertices().len()
    }

    pub fn vertices(&self) -> &[SpriteVertex] {
        match &self.shape {
            SpriteShape::Polygon(vertices) => vertices,
            SpriteShape::Mesh(_) => &[],
        }
    }

    fn vertices_mut(&mut self) -> &mut [SpriteVertex] {
        match &mut self.shape {
            SpriteShape::Polygon(vertices) => vertices,
            SpriteShape::Mesh(_) => &mut [],
        }
    }

    /// Appends a white vertex. Ignored for mesh sprites.
    pub fn add_vertex(&mut self, coord: Vec3, u: f32, v: f32) {
        match &mut self.shape {
            SpriteShape::Polygon(vertices) => vertices.push(SpriteVertex {
                position: coord,
                u,
                v,
                color: Vec3::ONE,
                static_color: Vec3::ONE,
            }),
            SpriteShape::Mesh(_) => debug!("ignoring vertex added to a mesh sprite"),
        }
    }

    pub fn vertex_position(&self, i: usize) -> Option<Vec3> {
        self.vertices().get(i).map(|v| v.position)
    }

    pub fn vertex_color(&self, i: usize) -> Option<Vec3> {
        self.vertices().get(i).map(|v| v.color)
    }

    pub fn vertex_static_color(&self, i: usize) -> Option<Vec3> {
        self.vertices().get(i).map(|v| v.static_color)
    }

    pub fn set_all_colors(&mut self, color: Vec3) {
        let color = clamp_color(color);
        for vertex in self.vertices_mut() {
            vertex.color = color;
        }
    }

    /// Adds to the drawing color of vertex `i`, clamped to `[0, 1]`.
    pub fn add_to_vertex_color(&mut self, i: usize, color: Vec3) {
        if let Some(vertex) = self.vertices_mut().get_mut(i) {
            vertex.color = clamp_color(vertex.color + color);
        }
    }

    /// Restores every drawing color to its static baseline.
    pub fn reset_all_colors(&mut self) {
        for vertex in self.vertices_mut() {
            vertex.color = vertex.static_color;
        }
    }

    pub fn set_all_static_colors(&mut self, color: Vec3) {
        let color = clamp_color(color);
        for vertex in self.vertices_mut() {
            vertex.static_color = color;
        }
    }

    /// Adds to the static color of vertex `i`, clamped to `[0, 1]`.
    pub fn add_to_vertex_static_color(&mut self, i: usize, color: Vec3) {
        if let Some(vertex) = self.vertices_mut().get_mut(i) {
            vertex.static_color = clamp_color(vertex.static_color + color);
        }
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Moves a sprite that is not part of any grid. Sprites in a world
    /// move through [`crate::World::move_sprite`].
    pub fn set_position(&mut self, pos: Vec3) -> IsoResult<()> {
        if self.grid.is_some() {
            return Err(IsoError::SpriteAttached);
        }
        self.position = pos;
        Ok(())
    }

    /// Overwrites the position without touching grid bookkeeping.
    pub(crate) fn force_position(&mut self, pos: Vec3) {
        self.position = pos;
    }

    pub fn material(&self) -> Option<MaterialHandle> {
        self.material
    }

    pub fn set_material(&mut self, material: MaterialHandle) {
        self.material = Some(material);
    }

    pub fn mix_mode(&self) -> MixMode {
        self.mix_mode
    }

    pub fn set_mix_mode(&mut self, mode: MixMode) {
        self.mix_mode = mode;
    }

    /// Grid the sprite currently lives in.
    pub fn grid(&self) -> Option<GridId> {
        self.grid
    }

    pub(crate) fn set_grid(&mut self, grid: Option<GridId>) {
        self.grid = grid;
    }

    pub fn set_grid_change_listener(&mut self, listener: Arc<dyn GridChangeListener>) {
        self.listener = Some(listener);
    }

    pub fn grid_change_listener(&self) -> Option<Arc<dyn GridChangeListener>> {
        self.listener.clone()
    }

    /// Hands the lights reaching this sprite to its mesh, if it has one.
    pub(crate) fn update_mesh_lighting(&mut self, lights: &[LightSample]) {
        let position = self.position;
        if let SpriteShape::Mesh(mesh) = &mut self.shape {
            mesh.update_lighting(position, lights);
        }
    }

    /// Draws the sprite for the current pass.
    ///
    /// Polygon sprites are projected, clipped and, in the main pass, queued
    /// in their material's bucket. A polygon sprite without a material
    /// fails with [`IsoError::MissingMaterial`] and draws nothing.
    pub fn draw(&mut self, rview: &mut RenderView, g3d: &mut dyn Graphics3D) -> IsoResult<()> {
        let position = self.position;
        let mix = self.mix_mode;
        match &mut self.shape {
            SpriteShape::Polygon(vertices) => {
                let material = self.material.ok_or(IsoError::MissingMaterial)?;
                draw_polygon(vertices, position, material, mix, rview, g3d);
            }
            SpriteShape::Mesh(mesh) => mesh.draw(position, rview, g3d),
        }
        Ok(())
    }
}

fn clamp_color(color: Vec3) -> Vec3 {
    color.clamp(Vec3::ZERO, Vec3::ONE)
}

/// Attributes interpolated across a clipped polygon.
#[derive(Debug, Clone, Copy, PartialEq)]
struct VertexAttr {
    u: f32,
    v: f32,
    color: Vec3,
    depth: f32,
}

impl VertexAttr {
    fn lerp(&self, other: &VertexAttr, t: f32) -> VertexAttr {
        VertexAttr {
            u: self.u + (other.u - self.u) * t,
            v: self.v + (other.v - self.v) * t,
            color: self.color.lerp(other.color, t),
            depth: self.depth + (other.depth - self.depth) * t,
        }
    }

    fn to_fx(self, screen: Vec2) -> FxVertex {
        FxVertex {
            x: screen.x,
            y: screen.y,
            inv_z: 1.0 / self.depth,
            u: self.u,
            v: self.v,
            r: self.color.x,
            g: self.color.y,
            b: self.color.z,
        }
    }
}

fn draw_polygon(
    vertices: &[SpriteVertex],
    position: Vec3,
    material: MaterialHandle,
    mix: MixMode,
    rview: &mut RenderView,
    g3d: &mut dyn Graphics3D,
) {
    if vertices.len() < 3 {
        return;
    }
    let projection = *rview.projection();
    let min_z = rview.min_z();
    let mut screen = Vec::with_capacity(vertices.len());
    let mut attrs = Vec::with_capacity(vertices.len());
    for vertex in vertices {
        let projected = projection.w2s_depth(position + vertex.position);
        screen.push(Vec2::new(projected.x, projected.y));
        attrs.push(VertexAttr {
            u: vertex.u,
            v: vertex.v,
            color: vertex.color,
            depth: (projected.z - min_z).max(1.0),
        });
    }

    let Some(clipped) = rview.clipper().clip(&screen) else {
        return;
    };
    let polygon = PolygonFx {
        vertices: clipped
            .points
            .iter()
            .zip(&clipped.origins)
            .map(|(&point, origin)| {
                let attr = match *origin {
                    ClipOrigin::Original(i) => attrs[i],
                    ClipOrigin::OnEdge { from, to, t } => attrs[from].lerp(&attrs[to], t),
                    ClipOrigin::Inside => interpolate_inside(point, &screen, &attrs),
                };
                attr.to_fx(point)
            })
            .collect(),
    };

    if rview.pass() == RenderPass::Main {
        rview.add_polygon(material, &polygon, mix, g3d);
    } else {
        g3d.draw_polygon(&polygon, material, mix);
    }
}

/// Attributes at a point inside the polygon: interpolate along the two
/// edges crossing the point's scanline, then across between them.
fn interpolate_inside(point: Vec2, screen: &[Vec2], attrs: &[VertexAttr]) -> VertexAttr {
    let mut crossings: Vec<(f32, VertexAttr)> = Vec::with_capacity(2);
    for from in 0..screen.len() {
        let to = (from + 1) % screen.len();
        let (a, b) = (screen[from], screen[to]);
        if a.y == b.y {
            continue;
        }
        let (lo, hi) = if a.y < b.y { (a.y, b.y) } else { (b.y, a.y) };
        if point.y < lo || point.y > hi {
            continue;
        }
        let t = (point.y - a.y) / (b.y - a.y);
        crossings.push((a.x + (b.x - a.x) * t, attrs[from].lerp(&attrs[to], t)));
        if crossings.len() == 2 {
            break;
        }
    }

    match crossings.as_slice() {
        [(xa, left), (xb, right)] => {
            let span = xb - xa;
            let s = if span.abs() <= f32::EPSILON {
                0.0
            } else {
                ((point.x - xa) / span).clamp(0.0, 1.0)
            };
            left.lerp(right, s)
        }
        [(_, only)] => *only,
        _ => nearest_attr(point, screen, attrs),
    }
}

fn nearest_attr(point: Vec2, screen: &[Vec2], attrs: &[VertexAttr]) -> VertexAttr {
    screen
        .iter()
        .zip(attrs)
        .min_by(|(a, _), (b, _)| a.distance_squared(point).total_cmp(&b.distance_squared(point)))
        .map(|(_, attr)| *attr)
        .unwrap_or(VertexAttr {
            u: 0.0,
            v: 0.0,
            color: Vec3::ONE,
            depth: 1.0,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::RecordingDevice;
    use crate::geometry::Rect;
    use crate::render_view::PrecalcGrid;
    use crate::view::Projection;

    fn render_view(clip: Rect, buckets: usize) -> RenderView {
        let mut rview = RenderView::new(buckets);
        rview.begin_frame(clip, Projection::default(), PrecalcGrid::default(), 8.0);
        rview.set_min_z(-100.0);
        rview
    }

    #[test]
    fn add_vertex_keeps_attributes_together() {
        let mut sprite = Sprite::new();
        sprite.add_vertex(Vec3::new(1.0, 2.0, 3.0), 0.25, 0.75);
        sprite.add_vertex(Vec3::ZERO, 1.0, 1.0);
        assert_eq!(sprite.vertex_count(), 2);
        assert_eq!(sprite.vertex_position(0), Some(Vec3::new(1.0, 2.0, 3.0)));
        assert_eq!(sprite.vertex_color(1), Some(Vec3::ONE));
        assert_eq!(sprite.vertex_static_color(1), Some(Vec3::ONE));
        assert_eq!(sprite.vertex_color(2), None);
    }

    #[test]
    fn colors_stay_clamped() {
        let mut sprite = Sprite::floor(Vec3::ZERO, 1.0, 1.0);
        sprite.set_all_colors(Vec3::ZERO);
        for step in 0..10 {
            let delta = if step % 3 == 0 {
                Vec3::new(-0.7, 0.4, 0.9)
            } else {
                Vec3::new(0.3, -0.2, 0.6)
            };
            sprite.add_to_vertex_color(0, delta);
            let color = sprite.vertex_color(0).unwrap();
            assert!(color.cmpge(Vec3::ZERO).all() && color.cmple(Vec3::ONE).all());
        }
        sprite.add_to_vertex_static_color(1, Vec3::splat(3.0));
        assert_eq!(sprite.vertex_static_color(1), Some(Vec3::ONE));
    }

    #[test]
    fn reset_restores_static_baseline() {
        let mut sprite = Sprite::floor(Vec3::ZERO, 1.0, 1.0);
        sprite.set_all_static_colors(Vec3::new(0.2, 0.3, 0.4));
        sprite.add_to_vertex_color(0, Vec3::ONE);
        sprite.reset_all_colors();
        assert_eq!(sprite.vertex_color(0), Some(Vec3::new(0.2, 0.3, 0.4)));
    }

    #[test]
    fn attached_sprite_cannot_be_moved_directly() {
        let mut sprite = Sprite::new();
        sprite.set_position(Vec3::ONE).unwrap();
        sprite.set_grid(Some(GridId::new(0)));
        assert_eq!(sprite.set_position(Vec3::ZERO), Err(IsoError::SpriteAttached));
        assert_eq!(sprite.position(), Vec3::ONE);
    }

    #[test]
    fn missing_material_is_reported() {
        let mut sprite = Sprite::floor(Vec3::ZERO, 1.0, 1.0);
        let mut rview = render_view(Rect::new(-100, -100, 100, 100), 0);
        let mut device = RecordingDevice::new(200, 200);
        assert_eq!(
            sprite.draw(&mut rview, &mut device),
            Err(IsoError::MissingMaterial)
        );
        assert!(device.draws().is_empty());
    }

    #[test]
    fn main_pass_defers_to_bucket() {
        let mut sprite = Sprite::floor(Vec3::ZERO, 1.0, 1.0);
        sprite.set_material(MaterialHandle::new(0));
        let mut rview = render_view(Rect::new(-100, -100, 100, 100), 1);
        let mut device = RecordingDevice::new(200, 200);
        rview.set_pass(RenderPass::Main);
        sprite.draw(&mut rview, &mut device).unwrap();
        assert!(device.draws().is_empty());
        rview.draw_buckets(&mut device);
        assert_eq!(device.draws().len(), 1);

        rview.set_pass(RenderPass::Fg);
        sprite.draw(&mut rview, &mut device).unwrap();
        assert_eq!(device.draws().len(), 2);
    }

    #[test]
    fn clipped_corner_interpolates_attributes() {
        // floor tile projects to a diamond; clip through its middle
        let mut sprite = Sprite::floor(Vec3::ZERO, 2.0, 2.0);
        sprite.set_material(MaterialHandle::new(3));
        sprite.set_all_colors(Vec3::ZERO);
        sprite.add_to_vertex_color(2, Vec3::ONE);
        let mut rview = render_view(Rect::new(1, 0, 10, 10), 0);
        rview.set_pass(RenderPass::Fg);
        let mut device = RecordingDevice::new(20, 20);
        sprite.draw(&mut rview, &mut device).unwrap();

        let draw = &device.draws()[0];
        assert!(draw.vertices.len() >= 3);
        for vertex in &draw.vertices {
            assert!(vertex.x >= 1.0 - 1e-3 && vertex.x <= 10.0 + 1e-3);
            assert!(vertex.u >= 0.0 && vertex.u <= 1.0);
            assert!(vertex.r >= 0.0 && vertex.r <= 1.0);
            assert!(vertex.inv_z > 0.0);
        }
        // the clip corner (1, 0) lies inside the diamond, a quarter of the
        // way from the dark near corner to the lit far one
        let corner = draw
            .vertices
            .iter()
            .find(|v| (v.x - 1.0).abs() < 1e-3 && v.y.abs() < 1e-3)
            .expect("clip corner present");
        assert!((corner.r - 0.25).abs() < 1e-3);
    }
}
