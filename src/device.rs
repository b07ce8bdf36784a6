use std::str::FromStr;

use anyhow::{anyhow, Error};
use bytemuck::{Pod, Zeroable};
use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::geometry::Rect;

/// Opaque material token. Materials created by the engine use their list
/// index, which doubles as the render bucket index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MaterialHandle(u32);

impl MaterialHandle {
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// How a polygon is blended into the frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MixMode {
    #[default]
    Copy,
    Add,
    Multiply,
    Multiply2,
    /// Alpha blend, 0 is opaque and 255 fully transparent.
    Alpha(u8),
    Transparent,
}

impl MixMode {
    pub fn is_opaque(self) -> bool {
        matches!(self, MixMode::Copy)
    }
}

impl FromStr for MixMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        if let Some(alpha) = lower.strip_prefix("alpha") {
            let alpha = alpha.trim_start_matches([' ', ':', '(']).trim_end_matches(')');
            let value = alpha
                .trim()
                .parse::<u8>()
                .map_err(|err| anyhow!("invalid alpha value in {s:?}: {err}"))?;
            return Ok(MixMode::Alpha(value));
        }
        match lower.as_str() {
            "copy" => Ok(MixMode::Copy),
            "add" => Ok(MixMode::Add),
            "multiply" => Ok(MixMode::Multiply),
            "multiply2" => Ok(MixMode::Multiply2),
            "transparent" => Ok(MixMode::Transparent),
            other => Err(anyhow!("unknown mix mode: {other}")),
        }
    }
}

/// Screen space vertex handed to the device.
///
/// `inv_z` is `1 / depth` with depth growing away from the viewer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct FxVertex {
    pub x: f32,
    pub y: f32,
    pub inv_z: f32,
    pub u: f32,
    pub v: f32,
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl FxVertex {
    pub fn screen(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }
}

/// Textured, colored polygon with per-vertex depth.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PolygonFx {
    pub vertices: Vec<FxVertex>,
}

impl PolygonFx {
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }
}

/// The slice of a 3D renderer the isometric engine draws through.
pub trait Graphics3D {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn set_clip_rect(&mut self, rect: Rect);
    fn draw_polygon(&mut self, polygon: &PolygonFx, material: MaterialHandle, mix: MixMode);
    fn perspective_center(&self) -> Vec2;
    fn set_perspective_center(&mut self, center: Vec2);
    fn perspective_aspect(&self) -> f32;
    fn set_perspective_aspect(&mut self, aspect: f32);
}

/// A polygon submission captured by [`RecordingDevice`].
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub material: MaterialHandle,
    pub mix: MixMode,
    pub vertices: Vec<FxVertex>,
}

impl DrawCall {
    /// Average screen position of the polygon.
    pub fn centroid(&self) -> Vec2 {
        if self.vertices.is_empty() {
            return Vec2::ZERO;
        }
        let sum: Vec2 = self.vertices.iter().map(FxVertex::screen).sum();
        sum / self.vertices.len() as f32
    }
}

/// Headless device that records everything drawn through it.
#[derive(Debug, Clone)]
pub struct RecordingDevice {
    width: u32,
    height: u32,
    clip: Rect,
    center: Vec2,
    aspect: f32,
    draws: Vec<DrawCall>,
    bytes: usize,
}

impl RecordingDevice {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            clip: Rect::new(0, 0, width as i32, height as i32),
            center: Vec2::new(width as f32 / 2.0, height as f32 / 2.0),
            aspect: height as f32,
            draws: Vec::new(),
            bytes: 0,
        }
    }

    pub fn draws(&self) -> &[DrawCall] {
        &self.draws
    }

    pub fn clip_rect(&self) -> Rect {
        self.clip
    }

    /// Total vertex bytes submitted since the last clear.
    pub fn bytes_submitted(&self) -> usize {
        self.bytes
    }

    /// Number of material switches a real device would have performed.
    pub fn material_switches(&self) -> usize {
        self.draws
            .windows(2)
            .filter(|pair| pair[0].material != pair[1].material)
            .count()
            + usize::from(!self.draws.is_empty())
    }

    pub fn clear(&mut self) {
        self.draws.clear();
        self.bytes = 0;
    }
}

impl Graphics3D for RecordingDevice {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn set_clip_rect(&mut self, rect: Rect) {
        self.clip = rect;
    }

    fn draw_polygon(&mut self, polygon: &PolygonFx, material: MaterialHandle, mix: MixMode) {
        self.bytes += polygon.as_bytes().len();
        self.draws.push(DrawCall {
            material,
            mix,
            vertices: polygon.vertices.clone(),
        });
    }

    fn perspective_center(&self) -> Vec2 {
        self.center
    }

    fn set_perspective_center(&mut self, center: Vec2) {
        self.center = center;
    }

    fn perspective_aspect(&self) -> f32 {
        self.aspect
    }

    fn set_perspective_aspect(&mut self, aspect: f32) {
        self.aspect = aspect;
    }
}
