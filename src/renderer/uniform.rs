use glam::{Mat4, Vec2};

use crate::{MAP_ICON_COUNT, MAX_LEVEL_TILE_COUNT};

// ── UniformBlock ─────────────────────────────────────────────────────────────
//
// A fixed-size GPU-resident parameter block.  The buffer is sized once at
// init from its host-side `repr(C)` layout; writes touch only the requested
// sub-range.  Offsets come from `std::mem::offset_of!` on the layout structs
// below — the host structs and the WGSL declarations must match
// byte-for-byte, and a mismatch is a silent correctness bug, so both sides
// carry their padding explicitly.

pub struct UniformBlock {
    buffer: wgpu::Buffer,
    size: u64,
}

impl UniformBlock {
    pub fn new(device: &wgpu::Device, size: u64, usage: wgpu::BufferUsages, label: &str) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: usage | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self { buffer, size }
    }

    pub fn for_layout<T: bytemuck::Pod>(
        device: &wgpu::Device,
        usage: wgpu::BufferUsages,
        label: &str,
    ) -> Self {
        Self::new(device, std::mem::size_of::<T>() as u64, usage, label)
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Sub-range write at a caller-supplied byte offset.  Offset correctness
    /// is on the caller; only the bounds are checked.
    pub fn write_bytes(&self, queue: &wgpu::Queue, offset: u64, bytes: &[u8]) {
        debug_assert!(offset + bytes.len() as u64 <= self.size);
        queue.write_buffer(&self.buffer, offset, bytes);
    }

    pub fn set_matrix(&self, queue: &wgpu::Queue, offset: u64, value: &Mat4) {
        self.write_bytes(queue, offset, bytemuck::cast_slice(&value.to_cols_array()));
    }

    pub fn set_vector2(&self, queue: &wgpu::Queue, offset: u64, value: Vec2) {
        self.write_bytes(queue, offset, bytemuck::cast_slice(&value.to_array()));
    }

    pub fn set_float(&self, queue: &wgpu::Queue, offset: u64, value: f32) {
        self.write_bytes(queue, offset, bytemuck::bytes_of(&value));
    }
}

// ── Block layouts ────────────────────────────────────────────────────────────

/// Frame globals shared by every program (bind group 0).
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GlobalsLayout {
    pub screen_size: [f32; 2],
    pub time: f32,
    pub _pad: f32,
}

/// Projection and view matrices for the 3D pass.
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraLayout {
    pub projection: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
}

/// UV rect plus pixel size of one minimap icon sprite.
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SpriteLayout {
    pub uv_rect: [f32; 4],
    pub size: [f32; 2],
    pub _pad: [f32; 2],
}

/// Cursor and icon table for the map program.
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MapCommonLayout {
    pub cursor: [f32; 2],
    pub _pad: [f32; 2],
    pub icons: [SpriteLayout; MAP_ICON_COUNT],
}

/// Point-of-view sub-field of [`MapDataLayout`]; written alone when only the
/// POV changed.
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PovLayout {
    pub coords: [f32; 2],
    pub direction: u32,
    pub _pad: u32,
}

/// The level as the map shader sees it: header, POV, then one packed `u32`
/// per tile.  Partial updates write the POV sub-field or a contiguous tile
/// span without touching the rest.
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MapDataLayout {
    pub width: u32,
    pub height: u32,
    pub pov: PovLayout,
    pub _pad: [u32; 2],
    pub tiles: [u32; MAX_LEVEL_TILE_COUNT],
}

pub const MAP_POV_OFFSET: u64 = std::mem::offset_of!(MapDataLayout, pov) as u64;
pub const MAP_TILES_OFFSET: u64 = std::mem::offset_of!(MapDataLayout, tiles) as u64;
pub const CAMERA_VIEW_OFFSET: u64 = std::mem::offset_of!(CameraLayout, view) as u64;
pub const GLOBALS_TIME_OFFSET: u64 = std::mem::offset_of!(GlobalsLayout, time) as u64;
pub const GLOBALS_SCREEN_SIZE_OFFSET: u64 =
    std::mem::offset_of!(GlobalsLayout, screen_size) as u64;
pub const MAP_COMMON_ICONS_OFFSET: u64 = std::mem::offset_of!(MapCommonLayout, icons) as u64;
pub const MAP_COMMON_CURSOR_OFFSET: u64 = std::mem::offset_of!(MapCommonLayout, cursor) as u64;

#[cfg(test)]
mod tests {
    use super::*;

    // The WGSL side declares these offsets with explicit pad fields; keep the
    // host layouts pinned so neither drifts.
    #[test]
    fn map_data_layout_is_stable() {
        assert_eq!(MAP_POV_OFFSET, 8);
        assert_eq!(MAP_TILES_OFFSET, 32);
        assert_eq!(
            std::mem::size_of::<MapDataLayout>(),
            32 + 4 * MAX_LEVEL_TILE_COUNT
        );
    }

    #[test]
    fn globals_layout_is_stable() {
        assert_eq!(GLOBALS_SCREEN_SIZE_OFFSET, 0);
        assert_eq!(GLOBALS_TIME_OFFSET, 8);
        assert_eq!(std::mem::size_of::<GlobalsLayout>(), 16);
    }

    #[test]
    fn camera_layout_is_stable() {
        assert_eq!(CAMERA_VIEW_OFFSET, 64);
        assert_eq!(std::mem::size_of::<CameraLayout>(), 128);
    }

    #[test]
    fn map_common_layout_is_stable() {
        // Uniform-buffer arrays need a 16-byte stride; SpriteLayout provides it.
        assert_eq!(std::mem::size_of::<SpriteLayout>(), 32);
        assert_eq!(MAP_COMMON_ICONS_OFFSET, 16);
    }
}
