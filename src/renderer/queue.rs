use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::renderer::atlas::UvRect;
use crate::renderer::geometry::{GeometryHandle, TileGeometryKind};
use crate::MAX_INSTANCES_PER_CALL;

// ── Entry modes ──────────────────────────────────────────────────────────────

/// Numeric behavior selector inside an uber program, with up to two control
/// vectors whose meaning depends on the mode.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EntryMode {
    pub id: i32,
    pub control_a: Vec4,
    pub control_b: Vec4,
}

impl EntryMode {
    pub fn new(id: i32) -> Self {
        Self { id, ..Default::default() }
    }

    pub fn with_control(id: i32, control_a: Vec4) -> Self {
        Self { id, control_a, ..Default::default() }
    }

    pub fn with_controls(id: i32, control_a: Vec4, control_b: Vec4) -> Self {
        Self { id, control_a, control_b }
    }
}

// ── Entries ──────────────────────────────────────────────────────────────────

/// Which 2D program an entry is drawn with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Program2dKind {
    Hud,
    Uber2d,
    Map,
}

/// One queued 2D draw: a screen-space rect with UVs and a mode.  Transient,
/// lives for exactly one frame, owns no GPU resources.
#[derive(Clone, Copy, Debug)]
pub struct Entry2d {
    pub program: Program2dKind,
    pub position: Vec3,
    pub size: Vec2,
    pub uv_rect: UvRect,
    pub mode: EntryMode,
}

/// One queued 3D draw: either a single mesh transform, or the level's
/// per-tile-kind instanced draw-call table.
#[derive(Clone, Copy, Debug)]
pub enum Entry3d {
    Mesh {
        geometry: GeometryHandle,
        model: Mat4,
        mode: EntryMode,
    },
    Level {
        mode: EntryMode,
    },
}

// ── DrawQueue ────────────────────────────────────────────────────────────────

/// Per-frame append-only list of draw entries with a fixed capacity.
/// Overflow is a frame-population bug and fails fast; `reset` rewinds the
/// queue after the flush that drained it.
pub struct DrawQueue<T> {
    entries: Vec<T>,
    capacity: usize,
}

impl<T> DrawQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn enqueue(&mut self, entry: T) {
        assert!(
            self.entries.len() < self.capacity,
            "draw queue overflow (capacity {})",
            self.capacity
        );
        self.entries.push(entry);
    }

    pub fn reset(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[T] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Instanced draw calls ─────────────────────────────────────────────────────

/// Transform accumulation for one tile geometry kind: a static prefix filled
/// on draw-set rebuild, plus a per-frame dynamic suffix for animating
/// elements, cleared every frame before repopulation.
#[derive(Clone, Debug, Default)]
pub struct InstancedDrawCall {
    transforms: Vec<Mat4>,
    static_count: usize,
    dynamic_count: usize,
}

impl InstancedDrawCall {
    pub fn new() -> Self {
        Self {
            transforms: Vec::with_capacity(MAX_INSTANCES_PER_CALL),
            static_count: 0,
            dynamic_count: 0,
        }
    }

    /// Append a static transform.  Only valid while the dynamic suffix is
    /// empty, i.e. during draw-set rebuild.
    pub fn push(&mut self, transform: Mat4) {
        debug_assert_eq!(self.dynamic_count, 0, "static push after dynamic transforms");
        assert!(
            self.transforms.len() < MAX_INSTANCES_PER_CALL,
            "instanced draw call overflow (capacity {MAX_INSTANCES_PER_CALL})"
        );
        self.transforms.push(transform);
        self.static_count += 1;
    }

    /// Append to the per-frame dynamic suffix.
    pub fn push_dynamic(&mut self, transform: Mat4) {
        assert!(
            self.transforms.len() < MAX_INSTANCES_PER_CALL,
            "instanced draw call overflow (capacity {MAX_INSTANCES_PER_CALL})"
        );
        self.transforms.push(transform);
        self.dynamic_count += 1;
    }

    /// Drop the dynamic suffix; the static prefix survives.
    pub fn reset_dynamic(&mut self) {
        self.transforms.truncate(self.static_count);
        self.dynamic_count = 0;
    }

    /// Drop everything; used when the draw set is rebuilt wholesale.
    pub fn clear(&mut self) {
        self.transforms.clear();
        self.static_count = 0;
        self.dynamic_count = 0;
    }

    pub fn static_count(&self) -> usize {
        self.static_count
    }

    pub fn dynamic_count(&self) -> usize {
        self.dynamic_count
    }

    pub fn total(&self) -> usize {
        self.transforms.len()
    }

    pub fn transforms(&self) -> &[Mat4] {
        &self.transforms
    }
}

/// The level's instanced draw-call table, one call per tile geometry kind.
#[derive(Clone, Debug, Default)]
pub struct LevelDrawSet {
    pub calls: [InstancedDrawCall; TileGeometryKind::COUNT],
}

impl LevelDrawSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call(&self, kind: TileGeometryKind) -> &InstancedDrawCall {
        &self.calls[kind.index()]
    }

    pub fn call_mut(&mut self, kind: TileGeometryKind) -> &mut InstancedDrawCall {
        &mut self.calls[kind.index()]
    }

    pub fn clear(&mut self) {
        for call in &mut self.calls {
            call.clear();
        }
    }
}

// ── GPU instance layouts ─────────────────────────────────────────────────────
//
// Per-draw parameters ride in instance-rate vertex buffers; the numeric mode
// is an instance attribute, which keeps one program per pass with zero
// per-draw bind-group churn.

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Entry2dGpu {
    pub position: [f32; 3],
    pub mode: i32,
    pub size: [f32; 2],
    pub uv_rect: [f32; 4],
    pub control_a: [f32; 4],
    pub control_b: [f32; 4],
}

impl Entry2dGpu {
    const ATTRIBS: [wgpu::VertexAttribute; 6] = wgpu::vertex_attr_array![
        0 => Float32x3,  // position
        1 => Sint32,     // mode
        2 => Float32x2,  // size
        3 => Float32x4,  // uv_rect
        4 => Float32x4,  // control_a
        5 => Float32x4,  // control_b
    ];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Entry2dGpu>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::ATTRIBS,
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Instance3dGpu {
    pub model: [[f32; 4]; 4],
    pub mode: i32,
}

impl Instance3dGpu {
    pub fn new(model: &Mat4, mode: i32) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            mode,
        }
    }

    const ATTRIBS: [wgpu::VertexAttribute; 5] = wgpu::vertex_attr_array![
        3 => Float32x4,  // model column 0
        4 => Float32x4,  // model column 1
        5 => Float32x4,  // model column 2
        6 => Float32x4,  // model column 3
        7 => Sint32,     // mode
    ];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Instance3dGpu>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::ATTRIBS,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_keep_insertion_order() {
        let mut queue: DrawQueue<i32> = DrawQueue::new(8);
        queue.enqueue(10);
        queue.enqueue(20);
        queue.enqueue(30);
        assert_eq!(queue.entries(), &[10, 20, 30]);
    }

    #[test]
    fn reset_rewinds_to_empty() {
        let mut queue: DrawQueue<i32> = DrawQueue::new(4);
        queue.enqueue(1);
        queue.enqueue(2);
        queue.reset();
        assert!(queue.is_empty());
        queue.enqueue(3);
        assert_eq!(queue.entries(), &[3]);
    }

    #[test]
    #[should_panic(expected = "draw queue overflow")]
    fn overflow_fails_fast() {
        let mut queue: DrawQueue<i32> = DrawQueue::new(2);
        queue.enqueue(1);
        queue.enqueue(2);
        queue.enqueue(3);
    }

    #[test]
    fn dynamic_suffix_resets_without_touching_static() {
        let mut call = InstancedDrawCall::new();
        call.push(Mat4::IDENTITY);
        call.push(Mat4::IDENTITY);
        call.push_dynamic(Mat4::from_rotation_y(1.0));
        assert_eq!(call.total(), 3);
        call.reset_dynamic();
        assert_eq!(call.total(), 2);
        assert_eq!(call.static_count(), 2);
        assert_eq!(call.dynamic_count(), 0);
    }

    #[test]
    fn clear_drops_static_and_dynamic() {
        let mut call = InstancedDrawCall::new();
        call.push(Mat4::IDENTITY);
        call.push_dynamic(Mat4::IDENTITY);
        call.clear();
        assert_eq!(call.total(), 0);
        assert_eq!(call.static_count(), 0);
    }

    #[test]
    fn instance_layouts_are_tightly_packed() {
        assert_eq!(std::mem::size_of::<Entry2dGpu>(), 72);
        assert_eq!(std::mem::size_of::<Instance3dGpu>(), 68);
        let layout = Entry2dGpu::layout();
        assert_eq!(layout.attributes[2].offset, 16);
        assert_eq!(layout.attributes[3].offset, 24);
    }
}
