use glam::{IVec2, Vec3};
use gloam::level::{Direction, Level, Tile, TileEdge};
use gloam::renderer::draw_set::{derive, push_door_transforms};
use gloam::renderer::geometry::TileGeometryKind;
use gloam::renderer::queue::{InstancedDrawCall, LevelDrawSet};

const DOOR_OFFSET: f32 = 0.45;

/// Reference layout: 5×5, all floor, walls around the border.
fn bordered_level() -> Level {
    let mut level = Level::new(5, 5);
    for y in 0..5 {
        for x in 0..5 {
            let mut tile = Tile::default();
            tile.floor = true;
            if y == 0 {
                tile.set_edge(Direction::North, TileEdge::Wall);
            }
            if y == 4 {
                tile.set_edge(Direction::South, TileEdge::Wall);
            }
            if x == 0 {
                tile.set_edge(Direction::West, TileEdge::Wall);
            }
            if x == 4 {
                tile.set_edge(Direction::East, TileEdge::Wall);
            }
            *level.tilemap.tile_at_mut(IVec2::new(x, y)).unwrap() = tile;
        }
    }
    level.tilemap.rebuild_wall_joints();
    level
}

fn translation(transform: &glam::Mat4) -> Vec3 {
    transform.w_axis.truncate()
}

#[test]
fn five_by_five_window_from_center_facing_north() {
    let level = bordered_level();
    let mut set = LevelDrawSet::new();
    derive(
        &level.tilemap,
        &level.door,
        IVec2::new(2, 2),
        Direction::North,
        DOOR_OFFSET,
        &mut set,
    );

    // Window: five columns (x 0..=4) by four in-grid rows (y 0..=3); the row
    // behind the far wall is off-grid and clipped.
    assert_eq!(set.call(TileGeometryKind::Floor).total(), 20);
    // Border walls in the window: 5 north + 4 west + 4 east.
    assert_eq!(set.call(TileGeometryKind::Wall).total(), 13);
    // Of the four derived corner joints only (0,0) lies inside the window.
    assert_eq!(set.call(TileGeometryKind::WallJoint).total(), 1);
    assert_eq!(set.call(TileGeometryKind::Hole).total(), 0);
    assert_eq!(set.call(TileGeometryKind::DoorFrame).total(), 0);

    // Every floor transform sits on a tile center inside the grid.
    for transform in set.call(TileGeometryKind::Floor).transforms() {
        let p = translation(transform);
        assert!(p.x >= 0.0 && p.x <= 4.0);
        assert!(p.z >= 0.0 && p.z <= 3.0);
        assert_eq!(p.y, 0.0);
    }
}

#[test]
fn rotating_the_pov_rotates_the_window() {
    let level = bordered_level();
    let mut set = LevelDrawSet::new();
    derive(
        &level.tilemap,
        &level.door,
        IVec2::new(2, 2),
        Direction::East,
        DOOR_OFFSET,
        &mut set,
    );

    // Facing east the window covers x 1..=4 (clipped at the east border),
    // all five rows: 5 × 4 floors.
    assert_eq!(set.call(TileGeometryKind::Floor).total(), 20);
    for transform in set.call(TileGeometryKind::Floor).transforms() {
        let p = translation(transform);
        assert!(p.x >= 1.0, "window reaches one tile behind the POV only");
    }
}

#[test]
fn derivation_is_deterministic() {
    let level = bordered_level();
    let mut first = LevelDrawSet::new();
    let mut second = LevelDrawSet::new();
    derive(&level.tilemap, &level.door, IVec2::new(2, 2), Direction::North, DOOR_OFFSET, &mut first);
    derive(&level.tilemap, &level.door, IVec2::new(2, 2), Direction::North, DOOR_OFFSET, &mut second);
    for kind in TileGeometryKind::ALL {
        assert_eq!(
            first.call(kind).transforms(),
            second.call(kind).transforms()
        );
    }
}

#[test]
fn door_leaves_swing_apart_as_the_timeline_advances() {
    let mut closed = InstancedDrawCall::new();
    push_door_transforms(&mut closed, IVec2::new(2, 1), Direction::North, -1.0, DOOR_OFFSET);

    let mut open = InstancedDrawCall::new();
    push_door_transforms(&mut open, IVec2::new(2, 1), Direction::North, 1.0, DOOR_OFFSET);

    assert_eq!(closed.static_count(), 2);
    assert_eq!(open.dynamic_count(), 2);

    // Fully open leaves end up rotated a quarter turn from the closed pose;
    // the hinge translation survives, so positions differ too.
    for (a, b) in closed.transforms().iter().zip(open.transforms()) {
        assert_ne!(a, b);
    }
}

#[test]
fn dynamic_overlay_survives_a_static_rebuild() {
    let mut level = bordered_level();
    level.set_edge(IVec2::new(2, 1), Direction::North, TileEdge::Door);
    level.door.set(IVec2::new(2, 1), Direction::North);
    level.door.timeline.advance(0.2);

    let mut set = LevelDrawSet::new();
    derive(
        &level.tilemap,
        &level.door,
        IVec2::new(2, 2),
        Direction::North,
        DOOR_OFFSET,
        &mut set,
    );
    // Static pass skipped the animating doorway entirely.
    assert_eq!(set.call(TileGeometryKind::Door).total(), 0);

    // The per-frame overlay appends the swinging leaves on top.
    push_door_transforms(
        set.call_mut(TileGeometryKind::Door),
        level.door.tile,
        level.door.direction,
        level.door.timeline.value,
        DOOR_OFFSET,
    );
    assert_eq!(set.call(TileGeometryKind::Door).dynamic_count(), 2);
}
