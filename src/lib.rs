pub mod camera;
pub mod level;
pub mod mesh;
pub mod renderer;

/// Maximum level grid dimensions; `level::Tilemap` storage is sized for this
/// and the map shader's tile array must match it exactly.
pub const MAX_LEVEL_WIDTH: usize = 32;
pub const MAX_LEVEL_HEIGHT: usize = 32;
pub const MAX_LEVEL_TILE_COUNT: usize = MAX_LEVEL_WIDTH * MAX_LEVEL_HEIGHT;

/// Logical resolution the scene framebuffer is built around; the window gets
/// the largest integer multiple that fits.
pub const REFERENCE_WIDTH: u32 = 320;
pub const REFERENCE_HEIGHT: u32 = 240;

/// Viewport of the 3D scene inside the reference resolution, centered.
pub const SCENE_WIDTH: u32 = 288;
pub const SCENE_HEIGHT: u32 = 120;

/// Draw-queue capacities. Enqueueing past these is a frame-population bug
/// and asserts.
pub const MAX_QUEUE_2D: usize = 256;
pub const MAX_QUEUE_3D: usize = 64;

/// Transform capacity of a single instanced tile draw call.
pub const MAX_INSTANCES_PER_CALL: usize = 128;

/// Atlas texture edge length in pixels and sprite slot capacity.
pub const ATLAS_SIZE: u32 = 512;
pub const MAX_ATLAS_SPRITES: usize = 64;

/// Minimap icon slots in the map common block.
pub const MAP_ICON_COUNT: usize = 4;

/// Visibility window of the level draw set, in tiles relative to the
/// point of view.
pub const DRAW_DISTANCE_FORWARD: i32 = 4;
pub const DRAW_DISTANCE_SIDE: i32 = 2;
