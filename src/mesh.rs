// ── Mesh and image ingestion ──────────────────────────────────────────────────
//
// Decoded asset payloads on their way to the GPU.  `RawMesh` ingests
// triangulated OBJ data and deduplicates vertices by their
// (position, texcoord, normal) index triple; `RawImage` decodes PNG bytes to
// RGBA8.  Neither type touches the filesystem — callers hand in byte buffers.

use std::collections::HashMap;

use glam::{Vec2, Vec3};
use thiserror::Error;

/// Hard limit imposed by the 16-bit index buffers the renderer uses.
pub const MAX_MESH_VERTICES: usize = 65536;

#[derive(Debug, Error)]
pub enum MeshError {
    #[error("mesh data is not valid UTF-8")]
    NotText,
    #[error("malformed record on line {line}: {record}")]
    Malformed { line: usize, record: String },
    #[error("face corner on line {line} references a missing attribute")]
    IndexOutOfRange { line: usize },
    #[error("mesh has more than {MAX_MESH_VERTICES} unique vertices")]
    TooManyVertices,
}

/// A deduplicated triangle mesh ready for GPU upload.
///
/// `positions`, `texcoords` and `normals` run in lockstep: element `i` of
/// each belongs to vertex `i`.  Every index is guaranteed to be smaller than
/// the vertex count, and the vertex count never exceeds
/// [`MAX_MESH_VERTICES`].
#[derive(Clone, Debug, Default)]
pub struct RawMesh {
    pub positions: Vec<Vec3>,
    pub texcoords: Vec<Vec2>,
    pub normals: Vec<Vec3>,
    pub indices: Vec<u16>,
}

impl RawMesh {
    /// Ingest a triangulated OBJ payload.
    ///
    /// Only `v`, `vt`, `vn` and `f` records are consumed; everything else is
    /// skipped.  Face corners must carry all three attributes
    /// (`position/texcoord/normal`).  A corner triple seen before reuses its
    /// vertex; a new triple appends one.
    pub fn from_obj(bytes: &[u8]) -> Result<Self, MeshError> {
        let text = std::str::from_utf8(bytes).map_err(|_| MeshError::NotText)?;

        let mut positions: Vec<Vec3> = Vec::new();
        let mut texcoords: Vec<Vec2> = Vec::new();
        let mut normals: Vec<Vec3> = Vec::new();

        let mut mesh = RawMesh::default();
        let mut seen: HashMap<(u32, u32, u32), u16> = HashMap::new();

        for (line_index, line) in text.lines().enumerate() {
            let line_number = line_index + 1;
            let mut fields = line.split_whitespace();
            let Some(token) = fields.next() else { continue };

            let malformed = || MeshError::Malformed {
                line: line_number,
                record: line.trim().to_string(),
            };

            match token {
                "v" => positions.push(parse_vec3(&mut fields).ok_or_else(malformed)?),
                "vt" => texcoords.push(parse_vec2(&mut fields).ok_or_else(malformed)?),
                "vn" => normals.push(parse_vec3(&mut fields).ok_or_else(malformed)?),
                "f" => {
                    for _ in 0..3 {
                        let corner = fields.next().ok_or_else(malformed)?;
                        let triple = parse_corner(corner).ok_or_else(malformed)?;

                        let (pi, ti, ni) = triple;
                        if pi as usize >= positions.len()
                            || ti as usize >= texcoords.len()
                            || ni as usize >= normals.len()
                        {
                            return Err(MeshError::IndexOutOfRange { line: line_number });
                        }

                        if let Some(&index) = seen.get(&triple) {
                            mesh.indices.push(index);
                        } else {
                            if mesh.positions.len() >= MAX_MESH_VERTICES {
                                return Err(MeshError::TooManyVertices);
                            }
                            let index = mesh.positions.len() as u16;
                            mesh.positions.push(positions[pi as usize]);
                            mesh.texcoords.push(texcoords[ti as usize]);
                            mesh.normals.push(normals[ni as usize]);
                            seen.insert(triple, index);
                            mesh.indices.push(index);
                        }
                    }
                    if fields.next().is_some() {
                        return Err(malformed());
                    }
                }
                _ => {}
            }
        }

        Ok(mesh)
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn element_count(&self) -> usize {
        self.indices.len()
    }
}

fn parse_vec2<'a>(fields: &mut impl Iterator<Item = &'a str>) -> Option<Vec2> {
    let x = fields.next()?.parse().ok()?;
    let y = fields.next()?.parse().ok()?;
    Some(Vec2::new(x, y))
}

fn parse_vec3<'a>(fields: &mut impl Iterator<Item = &'a str>) -> Option<Vec3> {
    let x = fields.next()?.parse().ok()?;
    let y = fields.next()?.parse().ok()?;
    let z = fields.next()?.parse().ok()?;
    Some(Vec3::new(x, y, z))
}

/// Parse one `p/t/n` face corner into 0-based attribute indices.
fn parse_corner(corner: &str) -> Option<(u32, u32, u32)> {
    let mut parts = corner.split('/');
    let p: u32 = parts.next()?.parse().ok()?;
    let t: u32 = parts.next()?.parse().ok()?;
    let n: u32 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || p == 0 || t == 0 || n == 0 {
        return None;
    }
    Some((p - 1, t - 1, n - 1))
}

// ── RawImage ──────────────────────────────────────────────────────────────────

/// A decoded image, always 4-channel RGBA8.  The pixel buffer is owned and
/// released when the value drops.
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub pixels: Vec<u8>,
}

impl RawImage {
    /// Decode PNG bytes.  Decode failure is fatal: a missing image leaves no
    /// valid fallback, so this panics instead of limping along.
    pub fn from_png(bytes: &[u8]) -> Self {
        let image = image::load_from_memory(bytes)
            .expect("failed to decode PNG image")
            .to_rgba8();
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            channels: 4,
            pixels: image.into_raw(),
        }
    }

    /// Wrap an already-decoded RGBA8 buffer.
    pub fn from_rgba8(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        assert_eq!(pixels.len(), (width * height * 4) as usize);
        Self {
            width,
            height,
            channels: 4,
            pixels,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
