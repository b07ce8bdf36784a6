use glam::{Vec2, Vec3};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::camera::FakeCamera;
use crate::config::ViewConfig;
use crate::device::Graphics3D;
use crate::error::{IsoError, IsoResult};
use crate::geometry::Rect;
use crate::render_view::{PrecalcGrid, RenderPass, RenderView};
use crate::world::World;

/// Affine world to screen mapping.
///
/// Each axis vector is the screen displacement for one world unit along
/// that axis. Screen `y` grows upwards. The `y` axis is purely vertical.
///
/// ```text
///  +y
///  |     ./+z
///  |   ./
///  | ./
///  |/
///   \.
///     \.
///       \+x
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    x_axis: Vec2,
    y_axis: Vec2,
    z_axis: Vec2,
    scroll: Vec2,
}

impl Default for Projection {
    fn default() -> Self {
        Self {
            x_axis: Vec2::new(1.0, -0.5),
            y_axis: Vec2::new(0.0, 1.0),
            z_axis: Vec2::new(1.0, 0.5),
            scroll: Vec2::ZERO,
        }
    }
}

impl Projection {
    pub fn x_axis(&self) -> Vec2 {
        self.x_axis
    }

    pub fn y_axis(&self) -> Vec2 {
        self.y_axis
    }

    pub fn z_axis(&self) -> Vec2 {
        self.z_axis
    }

    pub fn scroll(&self) -> Vec2 {
        self.scroll
    }

    pub fn w2s(&self, world: Vec3) -> Vec2 {
        self.scroll
            + self.x_axis * world.x
            + Vec2::new(0.0, self.y_axis.y * world.y)
            + self.z_axis * world.z
    }

    /// Depth used for z-buffering; grows with distance from the viewer.
    pub fn depth(world: Vec3) -> f32 {
        world.z - world.x
    }

    /// Screen position with the depth in `z`.
    pub fn w2s_depth(&self, world: Vec3) -> Vec3 {
        self.w2s(world).extend(Self::depth(world))
    }

    /// Inverse of [`Projection::w2s`] on the ground plane; result has `y == 0`.
    pub fn s2w(&self, screen: Vec2) -> Vec3 {
        let d = screen - self.scroll;
        let det = self.x_axis.perp_dot(self.z_axis);
        let x = d.perp_dot(self.z_axis) / det;
        let z = self.x_axis.perp_dot(d) / det;
        Vec3::new(x, 0.0, z)
    }

    /// Depth rows covered by one world unit of height.
    pub fn cells_per_y(&self) -> f32 {
        2.0 * self.y_axis.y / (self.z_axis.y - self.x_axis.y)
    }
}

/// A view on an isometric world, drawn into a rectangle of the screen.
#[derive(Debug)]
pub struct View {
    rect: Rect,
    projection: Projection,
    config: ViewConfig,
    render_view: RenderView,
}

impl View {
    pub fn new(rect: Rect, config: &ViewConfig, bucket_count: usize) -> IsoResult<Self> {
        let scale = config
            .scale
            .unwrap_or_else(|| rect.height() as f32 / 16.0)
            .max(1.0);
        let mut view = Self {
            rect,
            projection: Projection::default(),
            config: *config,
            render_view: RenderView::new(bucket_count),
        };
        view.set_axes(scale, scale, scale, config.z_skew, config.x_skew)?;
        view.set_scroll(Vec3::ZERO, view.rect_center());
        Ok(view)
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn set_rect(&mut self, rect: Rect) {
        self.rect = rect;
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn render_view(&self) -> &RenderView {
        &self.render_view
    }

    pub fn set_bucket_count(&mut self, count: usize) {
        self.render_view.set_bucket_count(count);
    }

    fn rect_center(&self) -> Vec2 {
        Vec2::new(
            (self.rect.xmin + self.rect.xmax) as f32 / 2.0,
            (self.rect.ymin + self.rect.ymax) as f32 / 2.0,
        )
    }

    /// Sets the axes from pixel scales and skews (vertical change per
    /// horizontal change; 0.5 is the classic 2:1 look). The world point at
    /// the view center stays in place.
    pub fn set_axes(
        &mut self,
        x_scale: f32,
        y_scale: f32,
        z_scale: f32,
        z_skew: f32,
        x_skew: f32,
    ) -> IsoResult<()> {
        for (name, value) in [
            ("x scale", x_scale),
            ("y scale", y_scale),
            ("z scale", z_scale),
            ("z skew", z_skew),
            ("x skew", x_skew),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(IsoError::InvalidArgument(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        let center = self.view_scroll();
        self.projection.x_axis = Vec2::new(x_scale, -x_scale * x_skew);
        self.projection.y_axis = Vec2::new(0.0, y_scale);
        self.projection.z_axis = Vec2::new(z_scale, z_scale * z_skew);
        self.set_scroll(center, self.rect_center());
        Ok(())
    }

    pub fn scroll(&self) -> Vec2 {
        self.projection.scroll
    }

    /// World position shown at the center of the view.
    pub fn view_scroll(&self) -> Vec3 {
        self.projection.s2w(self.rect_center())
    }

    /// Scrolls so that `world` is shown at screen position `coord`.
    pub fn set_scroll(&mut self, world: Vec3, coord: Vec2) {
        self.projection.scroll = Vec2::ZERO;
        self.projection.scroll = coord - self.projection.w2s(world);
    }

    /// Moves the viewed spot by `delta` in world space.
    pub fn move_scroll(&mut self, delta: Vec3) {
        let origin = self.projection.scroll;
        self.projection.scroll = Vec2::ZERO;
        self.projection.scroll = origin - self.projection.w2s(delta);
    }

    pub fn w2s(&self, world: Vec3) -> Vec2 {
        self.projection.w2s(world)
    }

    pub fn w2s_depth(&self, world: Vec3) -> Vec3 {
        self.projection.w2s_depth(world)
    }

    pub fn s2w(&self, screen: Vec2) -> Vec3 {
        self.projection.s2w(screen)
    }

    /// Computes the window of cells that can show up inside the view.
    ///
    /// The screen rectangle is widened by the configured height range
    /// (sprites at height `h` appear `h * yscale` higher than their cell),
    /// inverse projected, and turned into a range of depth rows
    /// (`z - x`) and row positions (`z + x`).
    pub fn precalc(&self) -> PrecalcGrid {
        let y_scale = self.projection.y_axis.y;
        let low = self.rect.ymin as f32 - self.config.max_height.max(0.0) * y_scale;
        let high = self.rect.ymax as f32 - self.config.min_height.min(0.0) * y_scale;
        let corners = [
            Vec2::new(self.rect.xmin as f32, low),
            Vec2::new(self.rect.xmax as f32, low),
            Vec2::new(self.rect.xmin as f32, high),
            Vec2::new(self.rect.xmax as f32, high),
        ];

        let mut d_range = (f32::MAX, f32::MIN);
        let mut s_range = (f32::MAX, f32::MIN);
        for corner in corners {
            let world = self.projection.s2w(corner);
            let d = world.z - world.x;
            let s = world.z + world.x;
            d_range = (d_range.0.min(d), d_range.1.max(d));
            s_range = (s_range.0.min(s), s_range.1.max(s));
        }
        let d_min = d_range.0.floor() as i32 - 1;
        let d_max = d_range.1.ceil() as i32 + 1;
        let s_min = s_range.0.floor() as i32 - 1;
        let s_max = s_range.1.ceil() as i32 + 1;

        PrecalcGrid::from_ranges(d_min, d_max, s_min, s_max, self.projection.cells_per_y())
    }

    /// Draws the world: all five passes, flushing buckets after each one.
    pub fn draw(&mut self, world: &mut World, g3d: &mut dyn Graphics3D) {
        let precalc = self.precalc();
        debug!(
            "drawing view: {} rows x {} columns from ({}, {})",
            precalc.scan_h, precalc.scan_w, precalc.start_x, precalc.start_z
        );
        let rview = &mut self.render_view;
        rview.begin_frame(
            self.rect,
            self.projection,
            precalc,
            self.config.camera_depth,
        );
        g3d.set_clip_rect(self.rect);
        for pass in RenderPass::ALL {
            rview.set_pass(pass);
            world.draw(rview, g3d);
            rview.draw_buckets(g3d);
        }
    }

    /// Camera approximating this view around `center`, for mesh rendering.
    pub fn fake_camera(&self, center: Vec3) -> FakeCamera {
        FakeCamera::new(
            &self.projection,
            center,
            self.rect.height() as f32,
            self.config.camera_depth,
        )
    }
}
