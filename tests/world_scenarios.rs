use std::sync::Arc;

use glam::{Vec2, Vec3};

use crystal_iso::{
    Attenuation, IsoEngine, IsoError, LightKind, MaterialHandle, RecordingDevice, Rect, Sprite,
    SpriteRef, World,
};

fn front_sprite(pos: Vec3, material: u32) -> SpriteRef {
    let mut sprite = Sprite::front(pos, 1.0, 1.0);
    sprite.set_material(MaterialHandle::new(material));
    sprite.shared()
}

fn position_of(device: &RecordingDevice, material: u32) -> Option<usize> {
    device
        .draws()
        .iter()
        .position(|draw| draw.material == MaterialHandle::new(material))
}

#[test]
fn taller_sprites_in_a_cell_draw_later_and_blocked_moves_stay_put() {
    let engine = IsoEngine::default();
    let mut world = engine.create_world();
    let grid = world.create_grid(4, 4).expect("grid");

    // no materials registered, so every polygon reaches the device at once
    let low = front_sprite(Vec3::new(0.5, 0.0, 0.5), 1);
    let middle = front_sprite(Vec3::new(1.5, 1.0, 1.5), 2);
    let high = front_sprite(Vec3::new(0.5, 2.0, 0.5), 3);
    for sprite in [&low, &middle, &high] {
        assert_eq!(world.add_sprite(sprite), Some(grid));
    }
    assert_eq!(
        world.grid(grid).expect("grid").cell(0, 0).map(|c| c.len()),
        Some(2)
    );

    let mut view = engine
        .create_view(Rect::new(0, 0, 640, 480))
        .expect("view");
    view.set_scroll(Vec3::new(1.0, 0.0, 1.0), Vec2::new(320.0, 240.0));
    let mut device = RecordingDevice::new(640, 480);
    view.draw(&mut world, &mut device);

    assert_eq!(device.draws().len(), 3);
    let low_index = position_of(&device, 1).expect("low sprite drawn");
    let high_index = position_of(&device, 3).expect("high sprite drawn");
    assert!(low_index < high_index);
    assert!(position_of(&device, 2).is_some());

    let order_before = world.grid(grid).expect("grid").cell(0, 0).map(|c| c.sprites());
    let err = world
        .move_sprite(&low, Vec3::new(10.0, 0.0, 10.0))
        .expect_err("target is outside every grid");
    assert!(matches!(err, IsoError::OutOfBounds { .. }));
    assert_eq!(low.read().position(), Vec3::new(0.5, 0.0, 0.5));
    assert_eq!(low.read().grid(), Some(grid));

    let order_after = world
        .grid(grid)
        .expect("grid")
        .cell(0, 0)
        .map(|c| c.sprites())
        .expect("cell (0, 0) still populated");
    assert_eq!(order_after.len(), 2);
    assert!(Arc::ptr_eq(&order_after[0], &low));
    assert!(Arc::ptr_eq(&order_after[1], &high));
    let order_before = order_before.expect("cell (0, 0) populated before the move");
    assert!(order_before
        .iter()
        .zip(&order_after)
        .all(|(a, b)| Arc::ptr_eq(a, b)));
}

fn lit_world(kind: LightKind) -> (World, SpriteRef, IsoEngine) {
    let engine = IsoEngine::default();
    let mut world = engine.create_world();
    let grid = world.create_grid(4, 4).expect("grid");

    let mut floor = engine.create_floor_sprite(Vec3::new(2.0, 0.0, 2.0), 1.0, 1.0);
    floor.set_material(MaterialHandle::new(0));
    let floor = floor.shared();
    world.add_sprite(&floor);

    let mut light = engine.create_light();
    light.set_position(Vec3::new(2.0, 5.0, 2.0));
    light.set_radius(4.0);
    light.set_attenuation(Attenuation::Realistic);
    light.set_color(Vec3::new(1.0, 0.5, 0.25));
    light.set_kind(kind);
    let light = light.shared();
    world.set_light_grid(&light, Some(grid)).expect("light grid");
    (world, floor, engine)
}

fn assert_close(actual: Option<Vec3>, expected: Vec3) {
    let actual = actual.expect("vertex exists");
    assert!(
        (actual - expected).length() < 1e-3,
        "expected {expected:?}, got {actual:?}"
    );
}

#[test]
fn static_light_reaches_the_floor_below_it() {
    let (mut world, floor, engine) = lit_world(LightKind::Static);
    let mut view = engine
        .create_view(Rect::new(0, 0, 320, 240))
        .expect("view");
    let mut device = RecordingDevice::new(320, 240);
    view.draw(&mut world, &mut device);

    let expected = Vec3::new(1.0, 0.5, 0.25) * 0.64;
    assert_close(floor.read().vertex_static_color(0), expected);
    assert_close(floor.read().vertex_color(0), expected);
}

#[test]
fn dynamic_light_is_applied_every_frame() {
    let (mut world, floor, engine) = lit_world(LightKind::Dynamic);
    let grid = world.grids()[0].id();
    world
        .grid(grid)
        .expect("grid")
        .set_all_static_light(Vec3::ZERO);

    let mut view = engine
        .create_view(Rect::new(0, 0, 320, 240))
        .expect("view");
    let mut device = RecordingDevice::new(320, 240);
    for _ in 0..3 {
        view.draw(&mut world, &mut device);
    }

    assert_close(
        floor.read().vertex_color(0),
        Vec3::new(1.0, 0.5, 0.25) * 0.64,
    );
    assert_close(floor.read().vertex_static_color(0), Vec3::ZERO);
}
