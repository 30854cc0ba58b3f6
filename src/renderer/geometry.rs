use wgpu::util::DeviceExt;

use crate::mesh::{MeshError, RawMesh, MAX_MESH_VERTICES};

// ── Vertex layout ─────────────────────────────────────────────────────────────

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex3d {
    pub position: [f32; 3],
    pub texcoord: [f32; 2],
    pub normal: [f32; 3],
}

impl Vertex3d {
    const ATTRIBS: [wgpu::VertexAttribute; 3] = wgpu::vertex_attr_array![
        0 => Float32x3,  // position
        1 => Float32x2,  // texcoord
        2 => Float32x3,  // normal
    ];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex3d>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}

fn interleave(mesh: &RawMesh) -> Vec<Vertex3d> {
    (0..mesh.vertex_count())
        .map(|i| Vertex3d {
            position: mesh.positions[i].to_array(),
            texcoord: mesh.texcoords[i].to_array(),
            normal: mesh.normals[i].to_array(),
        })
        .collect()
}

// ── GeometryBuffer ────────────────────────────────────────────────────────────

/// Static vertex/index buffer pair built once from a decoded mesh.
pub struct GeometryBuffer {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub element_count: u32,
}

impl GeometryBuffer {
    pub fn from_raw_mesh(device: &wgpu::Device, mesh: &RawMesh, label: &str) -> Self {
        let vertices = interleave(mesh);
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex_buffer,
            index_buffer,
            element_count: mesh.element_count() as u32,
        }
    }
}

/// Opaque index of a renderer-owned [`GeometryBuffer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GeometryHandle(pub(crate) usize);

// ── Tileset geometry ──────────────────────────────────────────────────────────

/// The six tile meshes an instanced level draw is built from, in the order
/// the draw-call table uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TileGeometryKind {
    Floor,
    Hole,
    Wall,
    WallJoint,
    DoorFrame,
    Door,
}

impl TileGeometryKind {
    pub const COUNT: usize = 6;
    pub const ALL: [TileGeometryKind; Self::COUNT] = [
        TileGeometryKind::Floor,
        TileGeometryKind::Hole,
        TileGeometryKind::Wall,
        TileGeometryKind::WallJoint,
        TileGeometryKind::DoorFrame,
        TileGeometryKind::Door,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Index range of one named sub-mesh inside a tileset buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SubGeometry {
    pub index_offset: u32,
    pub index_count: u32,
}

/// One geometry buffer holding all six tile meshes concatenated, addressed
/// per kind by index ranges for instanced draws.
pub struct TilesetGeometry {
    pub buffer: GeometryBuffer,
    pub sub: [SubGeometry; TileGeometryKind::COUNT],
    /// Hinge offset of a door leaf from the doorway center, along local X.
    pub door_offset: f32,
}

impl TilesetGeometry {
    /// Concatenate the six tile meshes (in `TileGeometryKind` order) into one
    /// buffer, rebasing each mesh's indices past the vertices before it.
    pub fn from_meshes(
        device: &wgpu::Device,
        meshes: &[&RawMesh; TileGeometryKind::COUNT],
        door_offset: f32,
        label: &str,
    ) -> Result<Self, MeshError> {
        let mut combined = RawMesh::default();
        let mut sub = [SubGeometry::default(); TileGeometryKind::COUNT];

        for (slot, mesh) in sub.iter_mut().zip(meshes) {
            let vertex_base = combined.vertex_count();
            if vertex_base + mesh.vertex_count() > MAX_MESH_VERTICES {
                return Err(MeshError::TooManyVertices);
            }
            *slot = SubGeometry {
                index_offset: combined.element_count() as u32,
                index_count: mesh.element_count() as u32,
            };
            combined
                .indices
                .extend(mesh.indices.iter().map(|&i| i + vertex_base as u16));
            combined.positions.extend_from_slice(&mesh.positions);
            combined.texcoords.extend_from_slice(&mesh.texcoords);
            combined.normals.extend_from_slice(&mesh.normals);
        }

        Ok(Self {
            buffer: GeometryBuffer::from_raw_mesh(device, &combined, label),
            sub,
            door_offset,
        })
    }

    pub fn sub_geometry(&self, kind: TileGeometryKind) -> SubGeometry {
        self.sub[kind.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex3d_stride_matches_attribute_spans() {
        assert_eq!(std::mem::size_of::<Vertex3d>(), 32);
        let layout = Vertex3d::layout();
        assert_eq!(layout.array_stride, 32);
        assert_eq!(layout.attributes[1].offset, 12);
        assert_eq!(layout.attributes[2].offset, 20);
    }

    #[test]
    fn tile_geometry_kinds_index_the_draw_table() {
        for (i, kind) in TileGeometryKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }
}
