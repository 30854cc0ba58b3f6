// ── Level draw-set derivation ─────────────────────────────────────────────────
//
// Walks a bounded window around the point of view and fills the instanced
// draw-call table with tile transforms.  Occlusion is approximated from edge
// occupancy (a wall at the window boundary cuts off the cells behind it), not
// real frustum math.  The rebuild replaces the static transform arrays
// wholesale even when the triggering edit was a single tile; the window is
// small enough that tracking per-tile deltas would cost more than it saves.
//
// Everything here is pure CPU work over the tilemap so it can be tested
// without a GPU; the renderer owns when it runs (DRAW_SET dirty bit) and
// what happens to the result.

use glam::{IVec2, Mat4, Vec3};

use crate::level::{Direction, DoorState, TileEdge, Tilemap};
use crate::renderer::geometry::TileGeometryKind;
use crate::renderer::queue::{InstancedDrawCall, LevelDrawSet};
use crate::{DRAW_DISTANCE_FORWARD, DRAW_DISTANCE_SIDE};

/// Translation to a tile's center on the grid plane.
pub fn tile_transform(coords: IVec2) -> Mat4 {
    Mat4::from_translation(Vec3::new(coords.x as f32, 0.0, coords.y as f32))
}

/// Rebuild `out` from scratch for the view at `origin` facing `direction`.
///
/// `door_offset` is the tileset's door-leaf hinge offset, used for the static
/// transforms of doors that are not currently animating.  The active door
/// from `door` is skipped here while its animation plays — the per-frame
/// overlay in [`push_door_transforms`] draws it instead.
pub fn derive(
    tilemap: &Tilemap,
    door: &DoorState,
    origin: IVec2,
    direction: Direction,
    door_offset: f32,
    out: &mut LevelDrawSet,
) {
    out.clear();

    if !tilemap.is_valid_tile(origin) {
        return;
    }

    let forward = direction.offset();
    let side = IVec2::new(forward.y, -forward.x);
    let inverted = direction.inverted();

    for side_counter in -DRAW_DISTANCE_SIDE..=DRAW_DISTANCE_SIDE {
        for forward_counter in -1..DRAW_DISTANCE_FORWARD {
            let coords = origin + forward * forward_counter + side * side_counter;
            let transform = tile_transform(coords);

            if tilemap.use_wall_joints && tilemap.wall_joint_at(coords) {
                out.call_mut(TileGeometryKind::WallJoint).push(transform);
            }

            let Some(tile) = tilemap.tile_at(coords) else {
                continue;
            };

            // Edge-occupancy culling at the window boundaries: a closed side
            // edge on the POV row hides the outer column, a closed back edge
            // ahead of the POV ends the forward column.
            if side_counter < -1
                && forward_counter == 0
                && !tile.is_edge_empty(direction.side().inverted())
            {
                continue;
            }
            if side_counter > 1 && forward_counter == 0 && !tile.is_edge_empty(direction.side()) {
                continue;
            }
            if side_counter == 0 && forward_counter >= 1 && !tile.is_edge_empty(inverted) {
                break;
            }

            if tile.floor {
                out.call_mut(TileGeometryKind::Floor).push(transform);
            } else if tile.hole {
                out.call_mut(TileGeometryKind::Hole).push(transform);
            }

            for edge_direction in Direction::ALL {
                if tile.is_edge_empty(edge_direction) {
                    continue;
                }

                let edge_transform = transform * Mat4::from_rotation_y(edge_direction.rotation());

                match tile.edge(edge_direction) {
                    TileEdge::Wall => {
                        out.call_mut(TileGeometryKind::Wall).push(edge_transform);
                    }
                    TileEdge::Door => {
                        out.call_mut(TileGeometryKind::DoorFrame).push(edge_transform);

                        // An animating door (seen from either adjacent tile)
                        // must not also be drawn static, or the leaves would
                        // double up for the duration of the swing.
                        if door.timeline.is_playing() {
                            if coords == door.tile && edge_direction == door.direction {
                                continue;
                            }
                            if coords == origin && edge_direction == inverted {
                                continue;
                            }
                        }

                        push_door_transforms(
                            out.call_mut(TileGeometryKind::Door),
                            coords,
                            edge_direction,
                            -1.0,
                            door_offset,
                        );
                    }
                    TileEdge::Empty => {}
                }
            }
        }
    }
}

/// Build the two door-leaf transforms for the doorway on `tile`'s
/// `direction` edge and push them into `call`.
///
/// `animation_alpha` selects the destination: negative pushes static leaves
/// (closed door), positive pushes the swing pose into the dynamic suffix,
/// and exactly zero pushes nothing.  The `(-1, -1)` door sentinel is
/// rejected here so callers can pass an invalidated door state straight
/// through.
pub fn push_door_transforms(
    call: &mut InstancedDrawCall,
    tile: IVec2,
    direction: Direction,
    animation_alpha: f32,
    door_offset: f32,
) {
    if tile.x + tile.y < 0 {
        return;
    }

    let edge_offset = direction.offset().as_vec2() * 0.5;
    let doorway = Mat4::from_translation(Vec3::new(
        tile.x as f32 + edge_offset.x,
        0.0,
        tile.y as f32 + edge_offset.y,
    ));
    let facing = Mat4::from_rotation_y(direction.inverted().rotation());
    let hinge = Mat4::from_translation(Vec3::new(door_offset, 0.0, 0.0));

    let right = doorway * facing * hinge;
    let left = doorway * Mat4::from_rotation_y(std::f32::consts::PI) * facing * hinge;

    if animation_alpha > 0.0 {
        let swing = animation_alpha * std::f32::consts::FRAC_PI_2;
        call.push_dynamic(left * Mat4::from_rotation_y(swing));
        call.push_dynamic(right * Mat4::from_rotation_y(-swing));
    } else if animation_alpha < 0.0 {
        call.push(left);
        call.push(right);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::{Level, Tile};

    /// 5×5 level, every tile floor, wall edges around the outer border only.
    fn bordered_level() -> Level {
        let mut level = Level::new(5, 5);
        for y in 0..5 {
            for x in 0..5 {
                let coords = IVec2::new(x, y);
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
                *level.tilemap.tile_at_mut(coords).unwrap() = tile;
            }
        }
        level.tilemap.rebuild_wall_joints();
        level
    }

    fn derived(level: &Level, origin: IVec2, direction: Direction) -> LevelDrawSet {
        let mut out = LevelDrawSet::new();
        derive(&level.tilemap, &level.door, origin, direction, 0.45, &mut out);
        out
    }

    fn translation(transform: &Mat4) -> Vec3 {
        transform.w_axis.truncate()
    }

    #[test]
    fn bordered_window_produces_expected_transform_counts() {
        let level = bordered_level();
        let set = derived(&level, IVec2::new(2, 2), Direction::North);

        // Facing north from (2, 2): columns x 0..=4, rows y 0..=3 are in the
        // window (y = -1 is off-grid and clipped).
        assert_eq!(set.call(TileGeometryKind::Floor).total(), 20);

        // Border walls inside the window: 5 north edges on row 0, 4 west
        // edges on column 0, 4 east edges on column 4.
        assert_eq!(set.call(TileGeometryKind::Wall).total(), 13);

        // The only derived corner joint inside the window is the level's
        // north-west corner; the other three sit on x = 5 or y = 5.
        assert_eq!(set.call(TileGeometryKind::WallJoint).total(), 1);

        assert_eq!(set.call(TileGeometryKind::Hole).total(), 0);
        assert_eq!(set.call(TileGeometryKind::DoorFrame).total(), 0);
        assert_eq!(set.call(TileGeometryKind::Door).total(), 0);
    }

    #[test]
    fn floor_transforms_sit_on_tile_centers() {
        let level = bordered_level();
        let set = derived(&level, IVec2::new(2, 2), Direction::North);
        let floors = set.call(TileGeometryKind::Floor);
        assert!(floors
            .transforms()
            .iter()
            .any(|t| translation(t) == Vec3::new(2.0, 0.0, 2.0)));
        assert!(floors
            .transforms()
            .iter()
            .all(|t| { let p = translation(t); p.y == 0.0 && p.x >= 0.0 && p.z >= 0.0 }));
    }

    #[test]
    fn forward_wall_ends_the_center_column() {
        let mut level = bordered_level();
        level.set_edge(IVec2::new(2, 2), Direction::North, TileEdge::Wall);
        let set = derived(&level, IVec2::new(2, 2), Direction::North);

        // (2,1) and (2,0) fall behind the new wall: 18 floors instead of 20.
        // Walls: the new edge on (2,2) is seen, while (2,0)'s border wall
        // disappears with its tile, so the count stays at 13.
        assert_eq!(set.call(TileGeometryKind::Floor).total(), 18);
        assert_eq!(set.call(TileGeometryKind::Wall).total(), 13);
        let floors = set.call(TileGeometryKind::Floor);
        assert!(!floors
            .transforms()
            .iter()
            .any(|t| translation(t) == Vec3::new(2.0, 0.0, 1.0)));
    }

    #[test]
    fn side_wall_on_pov_row_hides_outer_column() {
        let mut level = bordered_level();
        // A wall on the east edge of (3, 2) blocks the side boundary cell
        // (4, 2) but nothing else in that column.
        level.set_edge(IVec2::new(4, 2), Direction::West, TileEdge::Wall);
        let set = derived(&level, IVec2::new(2, 2), Direction::North);
        let floors = set.call(TileGeometryKind::Floor);
        assert!(!floors
            .transforms()
            .iter()
            .any(|t| translation(t) == Vec3::new(4.0, 0.0, 2.0)));
        assert_eq!(floors.total(), 19);
    }

    #[test]
    fn invalid_origin_leaves_the_set_empty() {
        let level = bordered_level();
        let set = derived(&level, IVec2::new(-3, 2), Direction::North);
        assert_eq!(set.call(TileGeometryKind::Floor).total(), 0);
        assert_eq!(set.call(TileGeometryKind::Wall).total(), 0);
    }

    #[test]
    fn closed_door_contributes_frame_and_static_leaves() {
        let mut level = bordered_level();
        level.set_edge(IVec2::new(2, 1), Direction::North, TileEdge::Door);
        let set = derived(&level, IVec2::new(2, 2), Direction::North);

        // The near side of the doorway contributes one frame and two static
        // leaves; the far tile (2, 0) sits behind the closed door and is cut
        // off by the forward-column break, floor included.
        assert_eq!(set.call(TileGeometryKind::DoorFrame).total(), 1);
        assert_eq!(set.call(TileGeometryKind::Door).total(), 2);
        assert_eq!(set.call(TileGeometryKind::Door).dynamic_count(), 0);
        assert_eq!(set.call(TileGeometryKind::Floor).total(), 19);
    }

    #[test]
    fn animating_door_is_skipped_by_the_static_pass() {
        let mut level = bordered_level();
        level.set_edge(IVec2::new(2, 1), Direction::North, TileEdge::Door);
        level.door.set(IVec2::new(2, 1), Direction::North);
        level.door.timeline.advance(0.25);
        let set = derived(&level, IVec2::new(2, 2), Direction::North);

        assert_eq!(set.call(TileGeometryKind::DoorFrame).total(), 1);
        // The animating doorway contributes no static leaves; only the
        // per-frame overlay adds its dynamic pose.
        assert_eq!(set.call(TileGeometryKind::Door).total(), 0);
    }

    #[test]
    fn door_overlay_pushes_dynamic_pair() {
        let mut call = InstancedDrawCall::new();
        push_door_transforms(&mut call, IVec2::new(2, 1), Direction::North, 0.5, 0.45);
        assert_eq!(call.dynamic_count(), 2);
        assert_eq!(call.static_count(), 0);
    }

    #[test]
    fn door_overlay_rejects_invalid_sentinel() {
        let mut call = InstancedDrawCall::new();
        push_door_transforms(&mut call, IVec2::new(-1, -1), Direction::North, 0.5, 0.45);
        assert_eq!(call.total(), 0);
    }

    #[test]
    fn door_overlay_at_alpha_zero_pushes_nothing() {
        let mut call = InstancedDrawCall::new();
        push_door_transforms(&mut call, IVec2::new(2, 1), Direction::North, 0.0, 0.45);
        assert_eq!(call.total(), 0);
    }
}
