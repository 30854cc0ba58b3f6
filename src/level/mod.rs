// ── Level model ───────────────────────────────────────────────────────────────
//
// Tile grid consumed by both gameplay queries and the renderer's draw-set
// derivation.  Out-of-bounds lookups return `None` and every caller treats
// that as "skip this cell".  Render-facing dirty state lives next to the grid
// so tile edits and POV changes can be synced to the GPU incrementally.

use bitflags::bitflags;
use glam::IVec2;
use serde::{Deserialize, Serialize};

use crate::{MAX_LEVEL_HEIGHT, MAX_LEVEL_TILE_COUNT, MAX_LEVEL_WIDTH};

// ── Directions ────────────────────────────────────────────────────────────────

/// One of the four cardinal directions, in clockwise order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    North,
    East,
    South,
    West,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Self {
        Self::ALL[index % 4]
    }

    /// Clockwise neighbor (the "side" direction relative to facing).
    pub fn side(self) -> Self {
        Self::from_index(self.index() + 1)
    }

    pub fn inverted(self) -> Self {
        Self::from_index(self.index() + 2)
    }

    /// Grid step for this direction; north is negative Y.
    pub fn offset(self) -> IVec2 {
        match self {
            Direction::North => IVec2::new(0, -1),
            Direction::East => IVec2::new(1, 0),
            Direction::South => IVec2::new(0, 1),
            Direction::West => IVec2::new(-1, 0),
        }
    }

    /// Rotation around +Y that turns north-facing geometry toward `self`.
    pub fn rotation(self) -> f32 {
        use std::f32::consts::PI;
        match self {
            Direction::North => 0.0,
            Direction::East => -PI * 0.5,
            Direction::South => PI,
            Direction::West => PI * 0.5,
        }
    }
}

// ── Tiles ─────────────────────────────────────────────────────────────────────

/// State of one directional tile edge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TileEdge {
    #[default]
    Empty,
    Wall,
    Door,
}

impl TileEdge {
    pub fn is_empty(self) -> bool {
        self == TileEdge::Empty
    }

    /// Walls and door frames both carry wall posts; joints form against either.
    pub fn is_wall_based(self) -> bool {
        matches!(self, TileEdge::Wall | TileEdge::Door)
    }
}

pub const TILE_FLOOR_BIT: u32 = 1 << 0;
pub const TILE_HOLE_BIT: u32 = 1 << 1;
pub const TILE_VISITED_BIT: u32 = 1 << 2;
pub const TILE_EXPLORED_BIT: u32 = 1 << 3;
/// Edge states start at this bit, two bits per direction in `Direction` order.
pub const TILE_EDGE_SHIFT: u32 = 8;

/// One grid cell.  Edges are symmetric by construction: a wall or door on one
/// tile's edge equals the mirrored edge on the neighbor, enforced by
/// [`Tilemap::validate_edges`], not by the renderer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    pub floor: bool,
    pub hole: bool,
    pub edges: [TileEdge; 4],
    pub visited: bool,
    pub explored: bool,
}

impl Tile {
    pub fn edge(&self, direction: Direction) -> TileEdge {
        self.edges[direction.index()]
    }

    pub fn set_edge(&mut self, direction: Direction, edge: TileEdge) {
        self.edges[direction.index()] = edge;
    }

    pub fn is_edge_empty(&self, direction: Direction) -> bool {
        self.edge(direction).is_empty()
    }

    /// Pack into the one-`u32`-per-tile encoding the map shader reads.  The
    /// bit layout here and in the generated shader prelude must match.
    pub fn packed(&self) -> u32 {
        let mut bits = 0u32;
        if self.floor {
            bits |= TILE_FLOOR_BIT;
        }
        if self.hole {
            bits |= TILE_HOLE_BIT;
        }
        if self.visited {
            bits |= TILE_VISITED_BIT;
        }
        if self.explored {
            bits |= TILE_EXPLORED_BIT;
        }
        for (index, edge) in self.edges.iter().enumerate() {
            bits |= (*edge as u32) << (TILE_EDGE_SHIFT + 2 * index as u32);
        }
        bits
    }
}

// ── Dirty tracking ────────────────────────────────────────────────────────────

bitflags! {
    /// What changed since the renderer last synced this level to the GPU.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct DirtyFlags: u32 {
        /// Everything: full map re-upload wanted.
        const ALL = 1 << 0;
        /// Only the point-of-view sub-field of the map block.
        const POV = 1 << 1;
        /// The 3D instanced draw lists need re-derivation.
        const DRAW_SET = 1 << 2;
        /// A contiguous tile index span changed; see `DirtyState::range`.
        const TILE_RANGE = 1 << 3;
    }
}

/// Dirty bits plus the half-open tile index range `[lo, hi)` that bounds all
/// tile edits since the last sync.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DirtyState {
    pub flags: DirtyFlags,
    pub range: (usize, usize),
}

impl Default for DirtyState {
    fn default() -> Self {
        Self {
            flags: DirtyFlags::POV | DirtyFlags::DRAW_SET,
            range: (0, 0),
        }
    }
}

impl DirtyState {
    /// Record a single tile edit, widening the range to the union of old and
    /// new.  A lone edit keeps the range tight at exactly one tile.
    pub fn mark_tile(&mut self, index: usize) {
        if self.flags.contains(DirtyFlags::TILE_RANGE) {
            self.range = (self.range.0.min(index), self.range.1.max(index + 1));
        } else {
            self.range = (index, index + 1);
        }
        self.flags.insert(DirtyFlags::TILE_RANGE | DirtyFlags::DRAW_SET);
    }

    /// The point of view moved or turned.
    pub fn mark_pov(&mut self) {
        self.flags.insert(DirtyFlags::POV | DirtyFlags::DRAW_SET);
    }

    pub fn mark_all(&mut self) {
        self.flags
            .insert(DirtyFlags::ALL | DirtyFlags::POV | DirtyFlags::DRAW_SET);
    }
}

// ── Door animation state ──────────────────────────────────────────────────────

/// Normalized animation playhead.  Advanced by gameplay; the renderer only
/// reads `value`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Timeline {
    pub value: f32,
    pub speed: f32,
}

impl Timeline {
    pub fn new(value: f32, speed: f32) -> Self {
        Self { value, speed }
    }

    pub fn advance(&mut self, delta_time: f32) {
        self.value = (self.value + delta_time * self.speed).min(1.0);
    }

    pub fn reset(&mut self) {
        self.value = 0.0;
    }

    pub fn finish(&mut self) {
        self.value = 1.0;
    }

    pub fn is_playing(&self) -> bool {
        (0.0..1.0).contains(&self.value)
    }

    pub fn is_finished(&self) -> bool {
        self.value >= 1.0
    }
}

/// The single door transition a level can animate at a time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DoorState {
    pub tile: IVec2,
    pub direction: Direction,
    pub timeline: Timeline,
}

impl Default for DoorState {
    fn default() -> Self {
        Self {
            tile: IVec2::new(-1, -1),
            direction: Direction::North,
            timeline: Timeline::new(1.0, 2.0),
        }
    }
}

impl DoorState {
    pub fn set(&mut self, tile: IVec2, direction: Direction) {
        self.tile = tile;
        self.direction = direction;
        self.timeline.reset();
    }

    /// The invalid sentinel: no door transforms are emitted for it.
    pub fn invalidate(&mut self) {
        self.tile = IVec2::new(-1, -1);
    }
}

// ── Tilemap ───────────────────────────────────────────────────────────────────

/// Fixed-capacity tile grid plus the wall-joint corner bitset.  Joints are
/// derived from adjacent wall edges, never authored directly.
#[derive(Clone, Serialize, Deserialize)]
pub struct Tilemap {
    pub width: u32,
    pub height: u32,
    tiles: Vec<Tile>,
    wall_joints: Vec<bool>,
    pub use_wall_joints: bool,
}

impl Tilemap {
    pub fn new(width: u32, height: u32) -> Self {
        assert!(width as usize <= MAX_LEVEL_WIDTH && height as usize <= MAX_LEVEL_HEIGHT);
        Self {
            width,
            height,
            tiles: vec![Tile::default(); MAX_LEVEL_TILE_COUNT],
            wall_joints: vec![false; (MAX_LEVEL_WIDTH + 1) * (MAX_LEVEL_HEIGHT + 1)],
            use_wall_joints: true,
        }
    }

    pub fn tile_count(&self) -> usize {
        (self.width * self.height) as usize
    }

    pub fn is_valid_tile(&self, coords: IVec2) -> bool {
        coords.x >= 0
            && coords.x < self.width as i32
            && coords.y >= 0
            && coords.y < self.height as i32
    }

    pub fn coords_to_index(&self, coords: IVec2) -> usize {
        (coords.y * self.width as i32 + coords.x) as usize
    }

    pub fn tile(&self, index: usize) -> Option<&Tile> {
        if index < self.tile_count() {
            self.tiles.get(index)
        } else {
            None
        }
    }

    pub fn tile_at(&self, coords: IVec2) -> Option<&Tile> {
        if self.is_valid_tile(coords) {
            self.tiles.get(self.coords_to_index(coords))
        } else {
            None
        }
    }

    pub fn tile_at_mut(&mut self, coords: IVec2) -> Option<&mut Tile> {
        if self.is_valid_tile(coords) {
            let index = self.coords_to_index(coords);
            self.tiles.get_mut(index)
        } else {
            None
        }
    }

    pub fn neighbor_at(&self, coords: IVec2, direction: Direction) -> Option<&Tile> {
        self.tile_at(coords + direction.offset())
    }

    /// Pack the in-use tile prefix for GPU upload.
    pub fn packed_tiles(&self, range: std::ops::Range<usize>) -> Vec<u32> {
        self.tiles[range].iter().map(Tile::packed).collect()
    }

    // ── Wall joints ──────────────────────────────────────────────────────────

    pub fn is_valid_wall_joint(&self, coords: IVec2) -> bool {
        coords.x >= 0
            && coords.x <= self.width as i32
            && coords.y >= 0
            && coords.y <= self.height as i32
    }

    fn wall_joint_index(&self, coords: IVec2) -> usize {
        (coords.y * (self.width as i32 + 1) + coords.x) as usize
    }

    pub fn wall_joint_at(&self, coords: IVec2) -> bool {
        self.is_valid_wall_joint(coords) && self.wall_joints[self.wall_joint_index(coords)]
    }

    pub fn set_wall_joint(&mut self, coords: IVec2, value: bool) {
        if self.is_valid_wall_joint(coords) {
            let index = self.wall_joint_index(coords);
            self.wall_joints[index] = value;
        }
    }

    /// Re-derive the corner bitset: a joint appears wherever one tile carries
    /// two perpendicular wall-based edges meeting at that corner.
    pub fn rebuild_wall_joints(&mut self) {
        self.wall_joints.fill(false);
        for y in 0..self.height as i32 {
            for x in 0..self.width as i32 {
                let coords = IVec2::new(x, y);
                let Some(tile) = self.tile_at(coords) else { continue };
                let north = tile.edge(Direction::North).is_wall_based();
                let east = tile.edge(Direction::East).is_wall_based();
                let south = tile.edge(Direction::South).is_wall_based();
                let west = tile.edge(Direction::West).is_wall_based();
                if north && west {
                    self.set_wall_joint(coords, true);
                }
                if north && east {
                    self.set_wall_joint(coords + IVec2::new(1, 0), true);
                }
                if south && east {
                    self.set_wall_joint(coords + IVec2::new(1, 1), true);
                }
                if south && west {
                    self.set_wall_joint(coords + IVec2::new(0, 1), true);
                }
            }
        }
    }

    // ── Edge symmetry ────────────────────────────────────────────────────────

    /// Enforce the mirrored-edge invariant.  Each shared edge is visited once
    /// (east and south neighbors only, in tile index order) and the
    /// lower-indexed tile's edge wins.  Returns the number of corrections; a
    /// second pass over an unchanged map always returns zero.
    pub fn validate_edges(&mut self) -> usize {
        let mut corrections = 0;
        for y in 0..self.height as i32 {
            for x in 0..self.width as i32 {
                let coords = IVec2::new(x, y);
                for direction in [Direction::East, Direction::South] {
                    let neighbor_coords = coords + direction.offset();
                    if !self.is_valid_tile(neighbor_coords) {
                        continue;
                    }
                    let edge = self.tile_at(coords).map(|t| t.edge(direction)).unwrap_or_default();
                    let mirrored = direction.inverted();
                    let neighbor = self.tile_at_mut(neighbor_coords).unwrap();
                    if neighbor.edge(mirrored) != edge {
                        neighbor.set_edge(mirrored, edge);
                        corrections += 1;
                    }
                }
            }
        }
        corrections
    }

    // ── Editing ──────────────────────────────────────────────────────────────

    /// Dig out a tile: it becomes floor, and every edge is reconciled with
    /// its neighbor (open toward excavated neighbors, walled otherwise).
    /// Returns the indices of every tile that changed.
    pub fn excavate(&mut self, coords: IVec2) -> Vec<usize> {
        let mut touched = Vec::new();
        if !self.is_valid_tile(coords) {
            return touched;
        }
        {
            let tile = self.tile_at_mut(coords).unwrap();
            tile.floor = true;
            tile.hole = false;
        }
        touched.push(self.coords_to_index(coords));

        for direction in Direction::ALL {
            let neighbor_coords = coords + direction.offset();
            let mirrored = direction.inverted();
            let edge = match self.tile_at(neighbor_coords) {
                Some(neighbor) if neighbor.floor => TileEdge::Empty,
                Some(_) => TileEdge::Wall,
                None => TileEdge::Wall,
            };
            self.tile_at_mut(coords).unwrap().set_edge(direction, edge);
            if let Some(neighbor) = self.tile_at_mut(neighbor_coords) {
                neighbor.set_edge(mirrored, edge);
                let index = self.coords_to_index(neighbor_coords);
                touched.push(index);
            }
        }
        touched
    }

    /// Fill a tile back in.  Excavated neighbors gain a wall against it;
    /// solid neighbors share a plain empty edge.
    pub fn cover(&mut self, coords: IVec2) -> Vec<usize> {
        let mut touched = Vec::new();
        if !self.is_valid_tile(coords) {
            return touched;
        }
        {
            let tile = self.tile_at_mut(coords).unwrap();
            tile.floor = false;
            tile.hole = false;
        }
        touched.push(self.coords_to_index(coords));

        for direction in Direction::ALL {
            let neighbor_coords = coords + direction.offset();
            let mirrored = direction.inverted();
            let edge = match self.tile_at(neighbor_coords) {
                Some(neighbor) if neighbor.floor => TileEdge::Wall,
                _ => TileEdge::Empty,
            };
            self.tile_at_mut(coords).unwrap().set_edge(direction, edge);
            if let Some(neighbor) = self.tile_at_mut(neighbor_coords) {
                neighbor.set_edge(mirrored, edge);
                let index = self.coords_to_index(neighbor_coords);
                touched.push(index);
            }
        }
        touched
    }
}

// ── Level ─────────────────────────────────────────────────────────────────────

/// A tilemap plus the render-facing state the renderer syncs and clears:
/// dirty bits and the door animation overlay.
#[derive(Clone, Serialize, Deserialize)]
pub struct Level {
    pub tilemap: Tilemap,
    #[serde(skip)]
    pub dirty: DirtyState,
    #[serde(skip)]
    pub door: DoorState,
}

impl Level {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            tilemap: Tilemap::new(width, height),
            dirty: DirtyState::default(),
            door: DoorState::default(),
        }
    }

    /// Dig out a tile and record every touched tile in the dirty range.
    pub fn excavate(&mut self, coords: IVec2) {
        for index in self.tilemap.excavate(coords) {
            self.dirty.mark_tile(index);
        }
    }

    pub fn cover(&mut self, coords: IVec2) {
        for index in self.tilemap.cover(coords) {
            self.dirty.mark_tile(index);
        }
    }

    /// Set a directional edge and its mirror on the neighbor, keeping the
    /// symmetry invariant intact, and mark both tiles dirty.
    pub fn set_edge(&mut self, coords: IVec2, direction: Direction, edge: TileEdge) {
        if let Some(tile) = self.tilemap.tile_at_mut(coords) {
            tile.set_edge(direction, edge);
            self.dirty.mark_tile(self.tilemap.coords_to_index(coords));
        }
        let neighbor_coords = coords + direction.offset();
        if let Some(neighbor) = self.tilemap.tile_at_mut(neighbor_coords) {
            neighbor.set_edge(direction.inverted(), edge);
            self.dirty.mark_tile(self.tilemap.coords_to_index(neighbor_coords));
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_bounds_queries_return_none() {
        let map = Tilemap::new(4, 4);
        assert!(map.tile_at(IVec2::new(-1, 0)).is_none());
        assert!(map.tile_at(IVec2::new(4, 0)).is_none());
        assert!(map.tile_at(IVec2::new(0, 4)).is_none());
        assert!(map.tile_at(IVec2::new(3, 3)).is_some());
    }

    #[test]
    fn direction_cycles() {
        assert_eq!(Direction::North.side(), Direction::East);
        assert_eq!(Direction::North.inverted(), Direction::South);
        assert_eq!(Direction::West.side(), Direction::North);
        assert_eq!(Direction::West.inverted(), Direction::East);
    }

    #[test]
    fn packed_tile_roundtrips_bits() {
        let mut tile = Tile::default();
        tile.floor = true;
        tile.explored = true;
        tile.set_edge(Direction::East, TileEdge::Door);
        tile.set_edge(Direction::South, TileEdge::Wall);
        let bits = tile.packed();
        assert_ne!(bits & TILE_FLOOR_BIT, 0);
        assert_eq!(bits & TILE_HOLE_BIT, 0);
        assert_ne!(bits & TILE_EXPLORED_BIT, 0);
        assert_eq!((bits >> (TILE_EDGE_SHIFT + 2)) & 0b11, TileEdge::Door as u32);
        assert_eq!((bits >> (TILE_EDGE_SHIFT + 4)) & 0b11, TileEdge::Wall as u32);
        assert_eq!((bits >> TILE_EDGE_SHIFT) & 0b11, TileEdge::Empty as u32);
    }

    #[test]
    fn single_edit_keeps_range_tight() {
        let mut dirty = DirtyState::default();
        dirty.mark_tile(17);
        assert_eq!(dirty.range, (17, 18));
        assert!(dirty.flags.contains(DirtyFlags::TILE_RANGE));
    }

    #[test]
    fn range_widens_to_union_of_edits() {
        let mut dirty = DirtyState::default();
        dirty.mark_tile(9);
        dirty.mark_tile(5);
        dirty.mark_tile(7);
        assert_eq!(dirty.range, (5, 10));
    }

    #[test]
    fn tile_edit_also_dirties_the_draw_set() {
        let mut dirty = DirtyState {
            flags: DirtyFlags::empty(),
            range: (0, 0),
        };
        dirty.mark_tile(3);
        assert!(dirty.flags.contains(DirtyFlags::DRAW_SET));
    }

    #[test]
    fn mirrored_edges_validate_with_zero_corrections() {
        let mut level = Level::new(4, 4);
        level.set_edge(IVec2::new(1, 1), Direction::East, TileEdge::Door);
        assert_eq!(level.tilemap.validate_edges(), 0);
        assert_eq!(
            level.tilemap.tile_at(IVec2::new(2, 1)).unwrap().edge(Direction::West),
            TileEdge::Door
        );
    }

    #[test]
    fn validator_repairs_and_is_idempotent() {
        let mut map = Tilemap::new(4, 4);
        // Break symmetry on purpose: only one side of the shared edge is set.
        map.tile_at_mut(IVec2::new(1, 1))
            .unwrap()
            .set_edge(Direction::East, TileEdge::Wall);
        assert_eq!(map.validate_edges(), 1);
        assert_eq!(
            map.tile_at(IVec2::new(2, 1)).unwrap().edge(Direction::West),
            TileEdge::Wall
        );
        assert_eq!(map.validate_edges(), 0);
    }

    #[test]
    fn excavate_mirrors_edges_on_neighbors() {
        let mut map = Tilemap::new(4, 4);
        map.excavate(IVec2::new(1, 1));
        map.excavate(IVec2::new(2, 1));
        // Both excavated: the shared edge opens from both sides.
        assert_eq!(
            map.tile_at(IVec2::new(1, 1)).unwrap().edge(Direction::East),
            TileEdge::Empty
        );
        assert_eq!(
            map.tile_at(IVec2::new(2, 1)).unwrap().edge(Direction::West),
            TileEdge::Empty
        );
        // Against solid rock: walls both sides.
        assert_eq!(
            map.tile_at(IVec2::new(1, 1)).unwrap().edge(Direction::North),
            TileEdge::Wall
        );
        assert_eq!(
            map.tile_at(IVec2::new(1, 0)).unwrap().edge(Direction::South),
            TileEdge::Wall
        );
        assert_eq!(map.validate_edges(), 0);
    }

    #[test]
    fn excavated_map_touches_neighbors_in_dirty_range() {
        let mut level = Level::new(4, 4);
        level.dirty.flags = DirtyFlags::empty();
        level.excavate(IVec2::new(1, 1));
        let (lo, hi) = level.dirty.range;
        // Touched tiles: (1,1)=5 and its four neighbors 1, 4, 6, 9.
        assert_eq!((lo, hi), (1, 10));
    }

    #[test]
    fn wall_joints_form_at_perpendicular_walls() {
        let mut map = Tilemap::new(3, 3);
        let tile = map.tile_at_mut(IVec2::new(0, 0)).unwrap();
        tile.set_edge(Direction::North, TileEdge::Wall);
        tile.set_edge(Direction::West, TileEdge::Wall);
        map.rebuild_wall_joints();
        assert!(map.wall_joint_at(IVec2::new(0, 0)));
        assert!(!map.wall_joint_at(IVec2::new(1, 0)));
        assert!(!map.wall_joint_at(IVec2::new(1, 1)));
    }

    #[test]
    fn door_state_sentinel_and_timeline() {
        let mut door = DoorState::default();
        assert_eq!(door.tile, IVec2::new(-1, -1));
        assert!(!door.timeline.is_playing());
        door.set(IVec2::new(2, 3), Direction::East);
        assert!(door.timeline.is_playing());
        door.timeline.advance(0.25);
        assert_eq!(door.timeline.value, 0.5);
        door.timeline.advance(10.0);
        assert!(door.timeline.is_finished());
    }
}
