use std::sync::{Arc, Weak};

use glam::Vec3;
use log::warn;
use parking_lot::RwLock;

use crate::device::Graphics3D;
use crate::error::{IsoError, IsoResult};
use crate::render_view::{RenderPass, RenderView};
use crate::sprite::{Sprite, SpriteRef};

#[derive(Debug)]
struct Node {
    sprite: Weak<RwLock<Sprite>>,
    key: f32,
    left: Option<Box<Node>>,
    right: Option<Box<Node>>,
}

/// Sprites standing on one grid square, ordered bottom to top.
///
/// The tree is keyed on the sprite height at insertion time; equal keys go
/// right, so sprites of the same height draw in insertion order. The cell
/// does not own its sprites: nodes of dropped sprites are skipped and swept
/// out on the next insertion or [`Cell::prune`].
#[derive(Debug, Default)]
pub struct Cell {
    root: Option<Box<Node>>,
}

impl Cell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live sprites.
    pub fn len(&self) -> usize {
        let mut count = 0;
        self.traverse(|_| count += 1);
        count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops the nodes of sprites that no longer exist, keeping the order
    /// of the others. Returns how many were dropped.
    pub fn prune(&mut self) -> usize {
        prune_dead(&mut self.root)
    }

    pub fn add_sprite(&mut self, sprite: &SpriteRef, pos: Vec3) {
        self.prune();
        let key = pos.y;
        let mut slot = &mut self.root;
        while let Some(node) = slot {
            slot = if key < node.key {
                &mut node.left
            } else {
                &mut node.right
            };
        }
        *slot = Some(Box::new(Node {
            sprite: Arc::downgrade(sprite),
            key,
            left: None,
            right: None,
        }));
    }

    /// Removes `sprite`, which must have been added at height `pos.y`.
    ///
    /// Only the key path is searched. The tree is left untouched when the
    /// sprite is not on it.
    pub fn remove_sprite(&mut self, sprite: &SpriteRef, pos: Vec3) -> IsoResult<()> {
        let key = pos.y;
        let target = Arc::as_ptr(sprite);
        let mut slot = &mut self.root;
        loop {
            let go_left = match slot.as_deref() {
                None => return Err(IsoError::SpriteNotFound),
                Some(node) if node.sprite.as_ptr() == target => break,
                Some(node) => key < node.key,
            };
            match slot {
                Some(node) => {
                    slot = if go_left {
                        &mut node.left
                    } else {
                        &mut node.right
                    };
                }
                None => return Err(IsoError::SpriteNotFound),
            }
        }

        if let Some(node) = slot.take() {
            *slot = unlink(node);
        }
        Ok(())
    }

    /// Visits every live sprite in drawing order.
    pub fn traverse(&self, mut func: impl FnMut(&SpriteRef)) {
        let mut stack: Vec<&Node> = Vec::new();
        let mut current = self.root.as_deref();
        while current.is_some() || !stack.is_empty() {
            while let Some(node) = current {
                stack.push(node);
                current = node.left.as_deref();
            }
            if let Some(node) = stack.pop() {
                if let Some(sprite) = node.sprite.upgrade() {
                    func(&sprite);
                }
                current = node.right.as_deref();
            }
        }
    }

    pub fn sprites(&self) -> Vec<SpriteRef> {
        let mut sprites = Vec::new();
        self.traverse(|sprite| sprites.push(Arc::clone(sprite)));
        sprites
    }

    /// Draws the sprites belonging to the current pass: opaque ones in the
    /// main pass, blended ones in the foreground pass.
    pub fn draw(&self, rview: &mut RenderView, g3d: &mut dyn Graphics3D) {
        let pass = rview.pass();
        if !matches!(pass, RenderPass::Main | RenderPass::Fg) {
            return;
        }
        self.traverse(|sprite| {
            let mut sprite = sprite.write();
            let opaque = sprite.mix_mode().is_opaque();
            if opaque != (pass == RenderPass::Main) {
                return;
            }
            if let Err(err) = sprite.draw(rview, g3d) {
                warn!("skipping sprite at {:?}: {err}", sprite.position());
            }
        });
    }
}

/// Replaces `node` by the subtree of its children, in order.
fn unlink(mut node: Box<Node>) -> Option<Box<Node>> {
    match (node.left.take(), node.right.take()) {
        (None, None) => None,
        (Some(child), None) | (None, Some(child)) => Some(child),
        (Some(left), Some(right)) => {
            let (mut successor, rest) = take_min(right);
            successor.left = Some(left);
            successor.right = rest;
            Some(successor)
        }
    }
}

fn prune_dead(slot: &mut Option<Box<Node>>) -> usize {
    let Some(node) = slot.as_mut() else {
        return 0;
    };
    let mut removed = prune_dead(&mut node.left) + prune_dead(&mut node.right);
    if node.sprite.strong_count() == 0 {
        if let Some(node) = slot.take() {
            *slot = unlink(node);
            removed += 1;
        }
    }
    removed
}

/// Detaches the leftmost node, returning it and what is left of the tree.
fn take_min(mut root: Box<Node>) -> (Box<Node>, Option<Box<Node>>) {
    match root.left.take() {
        None => {
            let rest = root.right.take();
            (root, rest)
        }
        Some(left) => {
            let (min, rest) = take_min(left);
            root.left = rest;
            (min, Some(root))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{MaterialHandle, MixMode, RecordingDevice};
    use crate::geometry::Rect;
    use crate::render_view::PrecalcGrid;
    use crate::view::Projection;

    fn sprite_at(y: f32) -> SpriteRef {
        let mut sprite = Sprite::floor(Vec3::new(0.5, y, 0.5), 0.5, 0.5);
        sprite.set_material(MaterialHandle::new(0));
        sprite.shared()
    }

    fn node_count(cell: &Cell) -> usize {
        fn count(node: &Option<Box<Node>>) -> usize {
            node.as_ref()
                .map_or(0, |n| 1 + count(&n.left) + count(&n.right))
        }
        count(&cell.root)
    }

    fn heights(cell: &Cell) -> Vec<f32> {
        cell.sprites().iter().map(|s| s.read().position().y).collect()
    }

    #[test]
    fn traversal_is_sorted_with_ties_in_insertion_order() {
        let mut cell = Cell::new();
        let sprites: Vec<SpriteRef> = [2.0, 0.0, 1.0, 1.0, 3.0, 0.5]
            .into_iter()
            .map(sprite_at)
            .collect();
        for sprite in &sprites {
            let pos = sprite.read().position();
            cell.add_sprite(sprite, pos);
        }
        assert_eq!(heights(&cell), vec![0.0, 0.5, 1.0, 1.0, 2.0, 3.0]);

        let order = cell.sprites();
        assert!(Arc::ptr_eq(&order[2], &sprites[2]));
        assert!(Arc::ptr_eq(&order[3], &sprites[3]));
    }

    #[test]
    fn add_then_remove_restores_contents() {
        let mut cell = Cell::new();
        let base: Vec<SpriteRef> = [1.0, 0.0, 2.0].into_iter().map(sprite_at).collect();
        for sprite in &base {
            let pos = sprite.read().position();
            cell.add_sprite(sprite, pos);
        }
        let before = heights(&cell);

        let extra = sprite_at(1.5);
        cell.add_sprite(&extra, Vec3::new(0.5, 1.5, 0.5));
        assert_eq!(cell.len(), 4);
        cell.remove_sprite(&extra, Vec3::new(0.5, 1.5, 0.5)).unwrap();
        assert_eq!(heights(&cell), before);
        assert_eq!(cell.len(), 3);
    }

    #[test]
    fn removing_inner_node_keeps_order() {
        let mut cell = Cell::new();
        let sprites: Vec<SpriteRef> = [5.0, 2.0, 8.0, 1.0, 3.0, 7.0, 9.0, 6.0]
            .into_iter()
            .map(sprite_at)
            .collect();
        for sprite in &sprites {
            let pos = sprite.read().position();
            cell.add_sprite(sprite, pos);
        }
        cell.remove_sprite(&sprites[0], Vec3::new(0.5, 5.0, 0.5)).unwrap();
        assert_eq!(heights(&cell), vec![1.0, 2.0, 3.0, 6.0, 7.0, 8.0, 9.0]);
        cell.remove_sprite(&sprites[1], Vec3::new(0.5, 2.0, 0.5)).unwrap();
        assert_eq!(heights(&cell), vec![1.0, 3.0, 6.0, 7.0, 8.0, 9.0]);
    }

    #[test]
    fn wrong_key_reports_not_found() {
        let mut cell = Cell::new();
        let a = sprite_at(1.0);
        let b = sprite_at(4.0);
        cell.add_sprite(&a, Vec3::new(0.5, 1.0, 0.5));
        cell.add_sprite(&b, Vec3::new(0.5, 4.0, 0.5));
        assert_eq!(
            cell.remove_sprite(&b, Vec3::new(0.5, 0.0, 0.5)),
            Err(IsoError::SpriteNotFound)
        );
        let stranger = sprite_at(1.0);
        assert_eq!(
            cell.remove_sprite(&stranger, Vec3::new(0.5, 1.0, 0.5)),
            Err(IsoError::SpriteNotFound)
        );
        assert_eq!(cell.len(), 2);
        assert_eq!(heights(&cell), vec![1.0, 4.0]);
    }

    #[test]
    fn dropped_sprites_are_skipped() {
        let mut cell = Cell::new();
        let kept = sprite_at(0.0);
        cell.add_sprite(&kept, Vec3::new(0.5, 0.0, 0.5));
        {
            let gone = sprite_at(1.0);
            cell.add_sprite(&gone, Vec3::new(0.5, 1.0, 0.5));
        }
        assert_eq!(cell.sprites().len(), 1);
        assert_eq!(cell.len(), 1);
        assert!(!cell.is_empty());
        assert_eq!(cell.prune(), 1);
        assert_eq!(node_count(&cell), 1);
    }

    #[test]
    fn dead_nodes_do_not_pile_up() {
        let mut cell = Cell::new();
        let kept: Vec<SpriteRef> = [3.0, 1.0, 5.0].into_iter().map(sprite_at).collect();
        for sprite in &kept {
            let pos = sprite.read().position();
            cell.add_sprite(sprite, pos);
        }
        for i in 0..1000 {
            let y = (i % 7) as f32;
            let gone = sprite_at(y);
            cell.add_sprite(&gone, Vec3::new(0.5, y, 0.5));
        }
        assert_eq!(cell.len(), 3);
        assert!(node_count(&cell) <= 4);
        assert_eq!(heights(&cell), vec![1.0, 3.0, 5.0]);

        let mut empty = Cell::new();
        for _ in 0..1000 {
            let gone = sprite_at(0.0);
            empty.add_sprite(&gone, Vec3::new(0.5, 0.0, 0.5));
        }
        assert_eq!(empty.len(), 0);
        assert!(empty.is_empty());
        assert_eq!(empty.sprites().len(), 0);
        assert_eq!(empty.prune(), 1);
        assert_eq!(node_count(&empty), 0);
    }

    #[test]
    fn passes_split_opaque_and_blended() {
        let mut cell = Cell::new();
        let opaque = sprite_at(0.0);
        let blended = sprite_at(1.0);
        blended.write().set_mix_mode(MixMode::Add);
        cell.add_sprite(&opaque, Vec3::new(0.5, 0.0, 0.5));
        cell.add_sprite(&blended, Vec3::new(0.5, 1.0, 0.5));

        let mut rview = RenderView::new(0);
        rview.begin_frame(
            Rect::new(-100, -100, 100, 100),
            Projection::default(),
            PrecalcGrid::default(),
            8.0,
        );
        rview.set_min_z(-10.0);
        let mut device = RecordingDevice::new(200, 200);

        rview.set_pass(RenderPass::Main);
        cell.draw(&mut rview, &mut device);
        assert_eq!(device.draws().len(), 1);
        assert_eq!(device.draws()[0].mix, MixMode::Copy);

        rview.set_pass(RenderPass::Fg);
        cell.draw(&mut rview, &mut device);
        assert_eq!(device.draws().len(), 2);
        assert_eq!(device.draws()[1].mix, MixMode::Add);

        rview.set_pass(RenderPass::Bg);
        cell.draw(&mut rview, &mut device);
        assert_eq!(device.draws().len(), 2);
    }
}
