use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::camera::FakeCamera;
use crate::clip::BoxClipper;
use crate::device::{Graphics3D, MaterialHandle, MixMode, PolygonFx};
use crate::geometry::Rect;
use crate::view::Projection;

/// Render passes, executed once per frame in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RenderPass {
    /// Pre-rendering calculations (lighting).
    Pre,
    /// Background.
    Bg,
    /// Opaque sprites, depth buffered.
    Main,
    /// Blended sprites.
    Fg,
    /// Post drawing.
    Post,
}

impl RenderPass {
    pub const ALL: [RenderPass; 5] = [
        RenderPass::Pre,
        RenderPass::Bg,
        RenderPass::Main,
        RenderPass::Fg,
        RenderPass::Post,
    ];
}

/// Window of cells that can be visible, in isometric scan order.
///
/// Scanning starts at the farthest depth row (`z - x` largest) at world
/// cell (`start_x`, `start_z`). Each of the `scan_h` lines covers two depth
/// rows: pass 0 starts at `(start_z - line, start_x + line)` and pass 1 one
/// cell further along `x`. Every row then steps `scan_w` times by
/// `(+1, +1)` in `(z, x)`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PrecalcGrid {
    pub start_x: i32,
    pub start_z: i32,
    pub scan_w: i32,
    pub scan_h: i32,
    pub cells_per_y: f32,
}

impl PrecalcGrid {
    /// Builds the scan window covering depth rows `d_min..=d_max` and row
    /// positions (`z + x`) `s_min..=s_max`.
    pub fn from_ranges(d_min: i32, d_max: i32, s_min: i32, s_max: i32, cells_per_y: f32) -> Self {
        let s0 = s_min - (s_min - d_max).rem_euclid(2);
        Self {
            start_x: (s0 - d_max) / 2,
            start_z: (s0 + d_max) / 2,
            scan_w: (s_max - s0) / 2 + 1,
            scan_h: (d_max - d_min).max(0) / 2 + 1,
            cells_per_y,
        }
    }

    /// First cell (`z`, `x`) of the row for `line` and `pass`.
    pub fn row_start(&self, line: i32, pass: i32) -> (i32, i32) {
        (self.start_z - line, self.start_x + line + pass)
    }

    /// True if world cell (`z`, `x`) is part of the scan.
    pub fn covers(&self, z: i32, x: i32) -> bool {
        let k = (self.start_z - self.start_x) - (z - x);
        if k < 0 {
            return false;
        }
        let (line, pass) = (k / 2, k % 2);
        if line >= self.scan_h {
            return false;
        }
        let offset = (z + x) - (self.start_z + self.start_x + pass);
        offset >= 0 && offset / 2 < self.scan_w
    }
}

#[derive(Debug, Clone)]
struct BucketNode {
    polygon: PolygonFx,
    mix: MixMode,
    next: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    head: Option<usize>,
    tail: Option<usize>,
}

/// Per-frame rendering state shared by everything drawn in a view.
#[derive(Debug)]
pub struct RenderView {
    pass: RenderPass,
    clip: Rect,
    projection: Projection,
    precalc: PrecalcGrid,
    min_z: f32,
    camera: FakeCamera,
    camera_depth: f32,
    buckets: Vec<Bucket>,
    nodes: Vec<BucketNode>,
    free: Option<usize>,
    pending: usize,
}

impl RenderView {
    pub fn new(bucket_count: usize) -> Self {
        Self {
            pass: RenderPass::Pre,
            clip: Rect::default(),
            projection: Projection::default(),
            precalc: PrecalcGrid::default(),
            min_z: f32::MAX,
            camera: FakeCamera::default(),
            camera_depth: 8.0,
            buckets: vec![Bucket::default(); bucket_count],
            nodes: Vec::new(),
            free: None,
            pending: 0,
        }
    }

    /// Resets frame state before the first pass.
    pub fn begin_frame(
        &mut self,
        clip: Rect,
        projection: Projection,
        precalc: PrecalcGrid,
        camera_depth: f32,
    ) {
        self.clip = clip;
        self.projection = projection;
        self.precalc = precalc;
        self.camera_depth = camera_depth;
        self.min_z = f32::MAX;
        self.pass = RenderPass::Pre;
    }

    pub fn pass(&self) -> RenderPass {
        self.pass
    }

    pub fn set_pass(&mut self, pass: RenderPass) {
        self.pass = pass;
    }

    pub fn clip_rect(&self) -> Rect {
        self.clip
    }

    pub fn clipper(&self) -> BoxClipper {
        BoxClipper::new(self.clip)
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn precalc(&self) -> &PrecalcGrid {
        &self.precalc
    }

    /// Lower bound on the depth of anything drawn this frame; depth minus
    /// this value is at least 1.
    pub fn min_z(&self) -> f32 {
        self.min_z
    }

    pub fn set_min_z(&mut self, value: f32) {
        self.min_z = value;
    }

    pub fn lower_min_z(&mut self, value: f32) {
        self.min_z = self.min_z.min(value);
    }

    /// Re-solves the shared fake camera around `center`.
    pub fn fake_camera(&mut self, center: Vec3) -> &FakeCamera {
        let height = self.clip.height() as f32;
        self.camera
            .solve(&self.projection, center, height, self.camera_depth);
        &self.camera
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Resizes the bucket table; pending polygons of dropped buckets are lost.
    pub fn set_bucket_count(&mut self, count: usize) {
        for bucket in self.buckets.iter_mut().skip(count) {
            let mut node = bucket.head.take();
            while let Some(index) = node {
                node = self.nodes[index].next;
                self.nodes[index].next = self.free;
                self.free = Some(index);
                self.pending -= 1;
            }
        }
        self.buckets.resize(count, Bucket::default());
    }

    /// Number of polygons waiting in buckets.
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Queues a polygon in its material's bucket, or draws it right away
    /// when the material has no bucket.
    pub fn add_polygon(
        &mut self,
        material: MaterialHandle,
        polygon: &PolygonFx,
        mix: MixMode,
        g3d: &mut dyn Graphics3D,
    ) {
        let bucket = material.index();
        if bucket >= self.buckets.len() {
            g3d.draw_polygon(polygon, material, mix);
            return;
        }

        let index = match self.free {
            Some(index) => {
                let node = &mut self.nodes[index];
                self.free = node.next;
                node.polygon.vertices.clear();
                node.polygon.vertices.extend_from_slice(&polygon.vertices);
                node.mix = mix;
                node.next = None;
                index
            }
            None => {
                self.nodes.push(BucketNode {
                    polygon: polygon.clone(),
                    mix,
                    next: None,
                });
                self.nodes.len() - 1
            }
        };

        let slot = &mut self.buckets[bucket];
        match slot.tail {
            Some(tail) => self.nodes[tail].next = Some(index),
            None => slot.head = Some(index),
        }
        slot.tail = Some(index);
        self.pending += 1;
    }

    /// Flushes every bucket, one run of draws per material, and recycles
    /// the nodes.
    pub fn draw_buckets(&mut self, g3d: &mut dyn Graphics3D) {
        if self.pending == 0 {
            return;
        }
        for bucket in 0..self.buckets.len() {
            let material = MaterialHandle::new(bucket as u32);
            let mut node = self.buckets[bucket].head.take();
            self.buckets[bucket].tail = None;
            while let Some(index) = node {
                let entry = &mut self.nodes[index];
                g3d.draw_polygon(&entry.polygon, material, entry.mix);
                node = entry.next;
                entry.next = self.free;
                self.free = Some(index);
            }
        }
        self.pending = 0;
    }
}
