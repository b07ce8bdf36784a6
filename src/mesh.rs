use std::fmt;

use glam::{Mat3, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::camera::FakeCamera;
use crate::device::{FxVertex, Graphics3D, MaterialHandle, MixMode, PolygonFx};
use crate::geometry::Rect;
use crate::light::Attenuation;
use crate::render_view::{RenderPass, RenderView};

/// A light as seen from one spot in a grid, handed to mesh objects that do
/// their own lighting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightSample {
    pub position: Vec3,
    pub color: Vec3,
    pub radius: f32,
    pub attenuation: Attenuation,
    /// Visibility of the light at the sampled spot, `[0, 1]`.
    pub visibility: f32,
}

impl LightSample {
    /// Light received at `point`.
    pub fn intensity_at(&self, point: Vec3) -> Vec3 {
        let distance = (self.position - point).length();
        self.color * self.attenuation.factor(self.radius, distance) * self.visibility
    }
}

/// Placement of a mesh: the sprite position plus the mesh rotation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshTransform {
    pub position: Vec3,
    pub rotation: Mat3,
}

impl MeshTransform {
    pub fn apply(&self, local: Vec3) -> Vec3 {
        self.position + self.rotation * local
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ZBufMode {
    None,
    Fill,
    Test,
    #[default]
    Use,
}

/// What a mesh object gets to draw with.
pub struct MeshRenderContext<'a> {
    pub camera: FakeCamera,
    pub g3d: &'a mut dyn Graphics3D,
    pub pass: RenderPass,
    pub clip: Rect,
}

/// A 3D mesh drawn through the fake camera.
pub trait MeshObject: Send + Sync {
    /// Returns false when the mesh is certainly not visible.
    fn draw_test(&mut self, ctx: &MeshRenderContext<'_>, transform: &MeshTransform) -> bool;

    fn update_lighting(&mut self, lights: &[LightSample], transform: &MeshTransform);

    /// Returns true if anything was drawn.
    fn draw(
        &mut self,
        ctx: &mut MeshRenderContext<'_>,
        transform: &MeshTransform,
        zbuf: ZBufMode,
    ) -> bool;
}

/// Adapts a [`MeshObject`] so it can live in an isometric grid.
pub struct MeshSprite {
    mesh: Box<dyn MeshObject>,
    transform: Mat3,
    zbuf: ZBufMode,
}

impl fmt::Debug for MeshSprite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeshSprite")
            .field("transform", &self.transform)
            .field("zbuf", &self.zbuf)
            .finish_non_exhaustive()
    }
}

impl MeshSprite {
    pub fn new(mesh: Box<dyn MeshObject>) -> Self {
        Self {
            mesh,
            transform: Mat3::IDENTITY,
            zbuf: ZBufMode::default(),
        }
    }

    pub fn mesh(&self) -> &dyn MeshObject {
        self.mesh.as_ref()
    }

    pub fn set_mesh(&mut self, mesh: Box<dyn MeshObject>) {
        self.mesh = mesh;
    }

    pub fn transform(&self) -> Mat3 {
        self.transform
    }

    pub fn set_transform(&mut self, transform: Mat3) {
        self.transform = transform;
    }

    pub fn zbuf_mode(&self) -> ZBufMode {
        self.zbuf
    }

    pub fn set_zbuf_mode(&mut self, mode: ZBufMode) {
        self.zbuf = mode;
    }

    fn placement(&self, position: Vec3) -> MeshTransform {
        MeshTransform {
            position,
            rotation: self.transform,
        }
    }

    pub(crate) fn update_lighting(&mut self, position: Vec3, lights: &[LightSample]) {
        let transform = self.placement(position);
        self.mesh.update_lighting(lights, &transform);
    }

    /// Draws the mesh with a camera solved around `position`. The device
    /// perspective settings are restored afterwards.
    pub(crate) fn draw(&mut self, position: Vec3, rview: &mut RenderView, g3d: &mut dyn Graphics3D) {
        let camera = *rview.fake_camera(position);
        let saved_center = g3d.perspective_center();
        let saved_aspect = g3d.perspective_aspect();
        g3d.set_perspective_center(camera.shift());
        g3d.set_perspective_aspect(camera.fov());

        let transform = self.placement(position);
        let mut ctx = MeshRenderContext {
            camera,
            g3d: &mut *g3d,
            pass: rview.pass(),
            clip: rview.clip_rect(),
        };
        if self.mesh.draw_test(&ctx, &transform) {
            self.mesh.draw(&mut ctx, &transform, self.zbuf);
        }

        g3d.set_perspective_center(saved_center);
        g3d.set_perspective_aspect(saved_aspect);
    }
}

/// Plain triangle mesh with per-vertex lighting.
#[derive(Debug, Clone, PartialEq)]
pub struct TriangleMesh {
    vertices: Vec<Vec3>,
    triangles: Vec<[usize; 3]>,
    colors: Vec<Vec3>,
    ambient: Vec3,
    material: MaterialHandle,
    mix: MixMode,
}

impl TriangleMesh {
    pub fn new(material: MaterialHandle) -> Self {
        Self {
            vertices: Vec::new(),
            triangles: Vec::new(),
            colors: Vec::new(),
            ambient: Vec3::ZERO,
            material,
            mix: MixMode::Copy,
        }
    }

    /// Unit pyramid standing on its base, apex up.
    pub fn pyramid(material: MaterialHandle, size: f32) -> Self {
        let h = size * 0.5;
        let mut mesh = Self::new(material);
        for corner in [
            Vec3::new(-h, 0.0, -h),
            Vec3::new(h, 0.0, -h),
            Vec3::new(h, 0.0, h),
            Vec3::new(-h, 0.0, h),
            Vec3::new(0.0, size, 0.0),
        ] {
            mesh.add_vertex(corner);
        }
        for triangle in [[0, 1, 4], [1, 2, 4], [2, 3, 4], [3, 0, 4]] {
            mesh.add_triangle(triangle);
        }
        mesh
    }

    pub fn add_vertex(&mut self, local: Vec3) -> usize {
        self.vertices.push(local);
        self.colors.push(Vec3::ONE);
        self.vertices.len() - 1
    }

    /// Adds a triangle; ignored if an index is out of range.
    pub fn add_triangle(&mut self, triangle: [usize; 3]) {
        if triangle.iter().all(|&i| i < self.vertices.len()) {
            self.triangles.push(triangle);
        }
    }

    pub fn set_ambient(&mut self, ambient: Vec3) {
        self.ambient = ambient;
    }

    pub fn set_mix_mode(&mut self, mix: MixMode) {
        self.mix = mix;
    }

    pub fn colors(&self) -> &[Vec3] {
        &self.colors
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    fn screen_bounds(&self, camera: &FakeCamera, transform: &MeshTransform) -> Option<(Vec2, Vec2)> {
        let mut projected = self
            .vertices
            .iter()
            .filter_map(|&v| camera.project(transform.apply(v)));
        let first = projected.next()?;
        Some(projected.fold((first, first), |(lo, hi), p| (lo.min(p), hi.max(p))))
    }
}

impl MeshObject for TriangleMesh {
    fn draw_test(&mut self, ctx: &MeshRenderContext<'_>, transform: &MeshTransform) -> bool {
        let Some((lo, hi)) = self.screen_bounds(&ctx.camera, transform) else {
            return false;
        };
        hi.x >= ctx.clip.xmin as f32
            && lo.x <= ctx.clip.xmax as f32
            && hi.y >= ctx.clip.ymin as f32
            && lo.y <= ctx.clip.ymax as f32
    }

    fn update_lighting(&mut self, lights: &[LightSample], transform: &MeshTransform) {
        for (color, &local) in self.colors.iter_mut().zip(&self.vertices) {
            let world = transform.apply(local);
            let lit: Vec3 = lights.iter().map(|light| light.intensity_at(world)).sum();
            *color = (self.ambient + lit).clamp(Vec3::ZERO, Vec3::ONE);
        }
    }

    fn draw(
        &mut self,
        ctx: &mut MeshRenderContext<'_>,
        transform: &MeshTransform,
        _zbuf: ZBufMode,
    ) -> bool {
        let mut drawn = false;
        let mut polygon = PolygonFx::default();
        for triangle in &self.triangles {
            polygon.vertices.clear();
            for &i in triangle {
                let world = transform.apply(self.vertices[i]);
                let cam = ctx.camera.world_to_camera(world);
                let Some(screen) = ctx.camera.project(world) else {
                    break;
                };
                let color = self.colors[i];
                polygon.vertices.push(FxVertex {
                    x: screen.x,
                    y: screen.y,
                    inv_z: 1.0 / cam.z,
                    u: 0.0,
                    v: 0.0,
                    r: color.x,
                    g: color.y,
                    b: color.z,
                });
            }
            if polygon.vertices.len() == 3 {
                ctx.g3d.draw_polygon(&polygon, self.material, self.mix);
                drawn = true;
            }
        }
        drawn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::RecordingDevice;
    use crate::render_view::PrecalcGrid;
    use crate::view::Projection;

    fn render_view() -> RenderView {
        let mut rview = RenderView::new(0);
        let projection = Projection::default();
        rview.begin_frame(
            Rect::new(-200, -200, 200, 200),
            projection,
            PrecalcGrid::default(),
            8.0,
        );
        rview.set_pass(RenderPass::Main);
        rview
    }

    #[test]
    fn mesh_draw_restores_perspective() {
        let mut sprite = MeshSprite::new(Box::new(TriangleMesh::pyramid(MaterialHandle::new(2), 1.0)));
        let mut rview = render_view();
        let mut device = RecordingDevice::new(400, 400);
        device.set_perspective_center(Vec2::new(7.0, 9.0));
        device.set_perspective_aspect(123.0);

        sprite.draw(Vec3::new(1.0, 0.0, 1.0), &mut rview, &mut device);

        assert_eq!(device.draws().len(), 4);
        assert!(device.draws().iter().all(|d| d.material == MaterialHandle::new(2)));
        assert_eq!(device.perspective_center(), Vec2::new(7.0, 9.0));
        assert_eq!(device.perspective_aspect(), 123.0);
    }

    #[test]
    fn offscreen_mesh_is_skipped() {
        let mut sprite = MeshSprite::new(Box::new(TriangleMesh::pyramid(MaterialHandle::new(0), 1.0)));
        let mut rview = render_view();
        let mut device = RecordingDevice::new(400, 400);
        sprite.draw(Vec3::new(0.0, 0.0, 500.0), &mut rview, &mut device);
        assert!(device.draws().is_empty());
    }

    #[test]
    fn lighting_sums_samples() {
        let mut mesh = TriangleMesh::new(MaterialHandle::new(0));
        mesh.add_vertex(Vec3::ZERO);
        mesh.set_ambient(Vec3::splat(0.1));
        let light = LightSample {
            position: Vec3::new(0.0, 1.0, 0.0),
            color: Vec3::new(0.5, 0.25, 0.0),
            radius: 1.0,
            attenuation: Attenuation::None,
            visibility: 1.0,
        };
        let transform = MeshTransform {
            position: Vec3::ZERO,
            rotation: Mat3::IDENTITY,
        };
        mesh.update_lighting(&[light, light], &transform);
        assert!((mesh.colors()[0] - Vec3::new(1.0, 0.6, 0.1)).length() < 1e-5);
    }
}
