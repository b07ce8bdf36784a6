use glam::Vec3;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::device::MaterialHandle;
use crate::error::IsoResult;
use crate::geometry::Rect;
use crate::light::Light;
use crate::mesh::{MeshObject, MeshSprite};
use crate::sprite::Sprite;
use crate::view::View;
use crate::world::World;

/// A named material. The texture file is only recorded, never loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialInfo {
    pub name: String,
    pub file: String,
}

/// Entry point: holds the configuration and the material list, and
/// creates worlds, views, lights and sprites.
#[derive(Debug, Clone, Default)]
pub struct IsoEngine {
    config: EngineConfig,
    materials: Vec<MaterialInfo>,
}

impl IsoEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            materials: Vec::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Adds a material; its handle is its index in the list, which is also
    /// its render bucket.
    pub fn create_material(&mut self, name: &str, file: &str) -> MaterialHandle {
        let handle = MaterialHandle::new(self.materials.len() as u32);
        self.materials.push(MaterialInfo {
            name: name.to_string(),
            file: file.to_string(),
        });
        debug!("material {name} -> bucket {}", handle.index());
        handle
    }

    pub fn find_material(&self, name: &str) -> Option<MaterialHandle> {
        self.materials
            .iter()
            .position(|m| m.name == name)
            .map(|i| MaterialHandle::new(i as u32))
    }

    pub fn material(&self, handle: MaterialHandle) -> Option<&MaterialInfo> {
        self.materials.get(handle.index())
    }

    pub fn material_count(&self) -> usize {
        self.materials.len()
    }

    pub fn create_world(&self) -> World {
        World::new()
    }

    /// A view with one render bucket per material created so far.
    pub fn create_view(&self, rect: Rect) -> IsoResult<View> {
        View::new(rect, &self.config.view, self.materials.len())
    }

    pub fn create_light(&self) -> Light {
        Light::new(self.config.lighting)
    }

    pub fn create_sprite(&self) -> Sprite {
        Sprite::new()
    }

    pub fn create_mesh_sprite(&self, mesh: Box<dyn MeshObject>) -> Sprite {
        Sprite::with_mesh(MeshSprite::new(mesh))
    }

    pub fn create_floor_sprite(&self, pos: Vec3, w: f32, h: f32) -> Sprite {
        Sprite::floor(pos, w, h)
    }

    pub fn create_front_sprite(&self, pos: Vec3, w: f32, h: f32) -> Sprite {
        Sprite::front(pos, w, h)
    }

    pub fn create_x_wall_sprite(&self, pos: Vec3, w: f32, h: f32) -> Sprite {
        Sprite::x_wall(pos, w, h)
    }

    pub fn create_z_wall_sprite(&self, pos: Vec3, w: f32, h: f32) -> Sprite {
        Sprite::z_wall(pos, w, h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LightingConfig;

    #[test]
    fn materials_are_indexed_in_order() {
        let mut engine = IsoEngine::default();
        let floor = engine.create_material("floor", "/lib/std/stone4.gif");
        let wall = engine.create_material("wall", "/lib/std/mystone2.gif");
        assert_eq!(floor.index(), 0);
        assert_eq!(wall.index(), 1);
        assert_eq!(engine.find_material("wall"), Some(wall));
        assert_eq!(engine.find_material("grass"), None);
        assert_eq!(engine.material(floor).unwrap().file, "/lib/std/stone4.gif");

        let view = engine.create_view(Rect::new(0, 0, 320, 240)).unwrap();
        assert_eq!(view.render_view().bucket_count(), 2);
    }

    #[test]
    fn lights_inherit_lighting_config() {
        let config = EngineConfig {
            lighting: LightingConfig {
                cutoff: 0.25,
                ..LightingConfig::default()
            },
            ..EngineConfig::default()
        };
        let engine = IsoEngine::new(config);
        assert_eq!(engine.create_light().config().cutoff, 0.25);
    }

    #[test]
    fn wall_shapes_are_upright() {
        let engine = IsoEngine::default();
        let x_wall = engine.create_x_wall_sprite(Vec3::ZERO, 2.0, 3.0);
        let z_wall = engine.create_z_wall_sprite(Vec3::ZERO, 2.0, 3.0);
        assert_eq!(x_wall.vertex_position(2), Some(Vec3::new(2.0, 3.0, 0.0)));
        assert_eq!(z_wall.vertex_position(2), Some(Vec3::new(0.0, 3.0, 2.0)));
        assert_eq!(engine.create_floor_sprite(Vec3::ZERO, 1.0, 1.0).vertex_count(), 4);
    }
}
