pub mod atlas;
pub mod draw_set;
pub mod framebuffer;
pub mod geometry;
pub mod program;
pub mod queue;
pub mod uniform;

use bytemuck::Zeroable;
use glam::{IVec2, Mat4, Vec2, Vec3, Vec4};

use crate::level::{Direction, DirtyFlags, Level};
use crate::mesh::{MeshError, RawImage, RawMesh};
use crate::{
    MAP_ICON_COUNT, MAX_INSTANCES_PER_CALL, MAX_QUEUE_2D, MAX_QUEUE_3D, SCENE_HEIGHT, SCENE_WIDTH,
};

use atlas::{TextureAtlas, UvRect};
use framebuffer::SceneFramebuffer;
use geometry::{GeometryBuffer, GeometryHandle, TileGeometryKind, TilesetGeometry};
use program::{
    build_programs, Programs, MAP_MODE_NORMAL, MAP_MODE_WORLD, UBER2D_MODE_BACK_BLUR,
    UBER2D_MODE_DISINTEGRATE, UBER2D_MODE_GLOW, UBER2D_MODE_HAZE, UBER2D_MODE_TEXTURE,
    UBER3D_MODE_BASIC, UBER3D_MODE_LEVEL,
};
use queue::{
    DrawQueue, Entry2d, Entry2dGpu, Entry3d, EntryMode, Instance3dGpu, LevelDrawSet,
    Program2dKind,
};
use uniform::{
    CameraLayout, GlobalsLayout, MapCommonLayout, MapDataLayout, PovLayout, SpriteLayout,
    UniformBlock, CAMERA_VIEW_OFFSET, GLOBALS_SCREEN_SIZE_OFFSET, GLOBALS_TIME_OFFSET,
    MAP_COMMON_CURSOR_OFFSET, MAP_COMMON_ICONS_OFFSET, MAP_POV_OFFSET, MAP_TILES_OFFSET,
};

/// Instance-buffer capacities.  2D entries can fan out into several
/// instances (back-blur echoes); the 3D budget covers a full queue of single
/// draws plus every instanced tile call.
const MAX_2D_INSTANCES: usize = MAX_QUEUE_2D * 4;
const MAX_3D_INSTANCES: usize = MAX_QUEUE_3D + TileGeometryKind::COUNT * MAX_INSTANCES_PER_CALL;

const SCENE_CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.0028,
    g: 0.0566,
    b: 0.07,
    a: 1.0,
};

// ── Handles ──────────────────────────────────────────────────────────────────

/// The three atlases the renderer owns: shared UI/icon sprites, 2D scene
/// sprites, and 3D surface textures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AtlasKind {
    Common,
    Primary2d,
    Primary3d,
}

impl AtlasKind {
    fn index(self) -> usize {
        self as usize
    }
}

/// Non-owning sprite reference: which atlas, which slot.  Never outlives the
/// renderer that owns the atlas.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpriteHandle {
    pub atlas: AtlasKind,
    pub index: usize,
}

/// Map-space point of view: smooth coordinates plus facing.
#[derive(Clone, Copy, Debug)]
pub struct Pov {
    pub coords: Vec2,
    pub direction: Direction,
}

// ── Flush command lists ──────────────────────────────────────────────────────

enum Draw3dCmd {
    Mesh { geometry: usize, first: u32 },
    LevelCall { kind: usize, first: u32, count: u32 },
}

struct Draw2dCmd {
    program: Program2dKind,
    first: u32,
    count: u32,
}

// ── Renderer ─────────────────────────────────────────────────────────────────

/// The rendering core: owns every GPU resource, accumulates draw entries
/// during the frame, and drains them in one `flush` — 3D pass, then 2D pass,
/// then the post-process blit to the caller's target.
///
/// Single-threaded and synchronous throughout: every operation is a direct
/// call into wgpu on the calling thread, and a flush always runs to
/// completion once started.
pub struct Renderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    programs: Programs,
    framebuffer: SceneFramebuffer,

    globals_block: UniformBlock,
    camera_block: UniformBlock,
    map_data_block: UniformBlock,
    map_common_block: UniformBlock,
    globals_bind_group: wgpu::BindGroup,
    camera_bind_group: wgpu::BindGroup,
    map_bind_group: wgpu::BindGroup,
    post_bind_group: wgpu::BindGroup,

    atlases: [TextureAtlas; 3],
    atlas_bind_group_2d: wgpu::BindGroup,
    atlas_bind_group_3d: wgpu::BindGroup,

    geometries: Vec<GeometryBuffer>,
    tileset: Option<TilesetGeometry>,
    level_draw: LevelDrawSet,

    queue_2d: DrawQueue<Entry2d>,
    queue_3d: DrawQueue<Entry3d>,

    instances_2d: wgpu::Buffer,
    instances_3d: wgpu::Buffer,
    // Per-frame scratch, rebuilt from the queues at every flush.
    scratch_2d: Vec<Entry2dGpu>,
    scratch_3d: Vec<Instance3dGpu>,
}

impl Renderer {
    /// Create every GPU resource once.  `surface_format` is the format of
    /// the target view later passed to [`flush`](Self::flush); the window
    /// and surface themselves stay outside this crate.
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        surface_format: wgpu::TextureFormat,
        window_width: u32,
        window_height: u32,
    ) -> Self {
        let programs = build_programs(&device, surface_format);
        let framebuffer = SceneFramebuffer::new(&device, window_width, window_height);

        let globals_block = UniformBlock::for_layout::<GlobalsLayout>(
            &device,
            wgpu::BufferUsages::UNIFORM,
            "globals_block",
        );
        let camera_block = UniformBlock::for_layout::<CameraLayout>(
            &device,
            wgpu::BufferUsages::UNIFORM,
            "camera_block",
        );
        let map_data_block = UniformBlock::for_layout::<MapDataLayout>(
            &device,
            wgpu::BufferUsages::STORAGE,
            "map_data_block",
        );
        let map_common_block = UniformBlock::for_layout::<MapCommonLayout>(
            &device,
            wgpu::BufferUsages::UNIFORM,
            "map_common_block",
        );

        let globals_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("globals_bg"),
            layout: &programs.globals_bgl,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: globals_block.buffer().as_entire_binding(),
            }],
        });
        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("camera_bg"),
            layout: &programs.camera_bgl,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_block.buffer().as_entire_binding(),
            }],
        });
        let map_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("map_bg"),
            layout: &programs.map_bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: map_data_block.buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: map_common_block.buffer().as_entire_binding(),
                },
            ],
        });

        let atlases = [
            TextureAtlas::new(&device, "atlas_common"),
            TextureAtlas::new(&device, "atlas_primary_2d"),
            TextureAtlas::new(&device, "atlas_primary_3d"),
        ];
        let atlas_bind_group_2d =
            create_atlas_bind_group(&device, &programs, &atlases[0], &atlases[1], "atlas_bg_2d");
        let atlas_bind_group_3d =
            create_atlas_bind_group(&device, &programs, &atlases[0], &atlases[2], "atlas_bg_3d");

        let post_bind_group = create_post_bind_group(&device, &programs, &framebuffer);

        let instances_2d = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("instances_2d"),
            size: (MAX_2D_INSTANCES * std::mem::size_of::<Entry2dGpu>()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let instances_3d = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("instances_3d"),
            size: (MAX_3D_INSTANCES * std::mem::size_of::<Instance3dGpu>()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            device,
            queue,
            programs,
            framebuffer,
            globals_block,
            camera_block,
            map_data_block,
            map_common_block,
            globals_bind_group,
            camera_bind_group,
            map_bind_group,
            post_bind_group,
            atlases,
            atlas_bind_group_2d,
            atlas_bind_group_3d,
            geometries: Vec::new(),
            tileset: None,
            level_draw: LevelDrawSet::new(),
            queue_2d: DrawQueue::new(MAX_QUEUE_2D),
            queue_3d: DrawQueue::new(MAX_QUEUE_3D),
            instances_2d,
            instances_3d,
            scratch_2d: Vec::with_capacity(MAX_2D_INSTANCES),
            scratch_3d: Vec::with_capacity(MAX_3D_INSTANCES),
        }
    }

    /// Recreate the size-dependent targets after an explicit window resize.
    pub fn resize(&mut self, window_width: u32, window_height: u32) {
        self.framebuffer
            .resize(&self.device, window_width, window_height);
        self.post_bind_group =
            create_post_bind_group(&self.device, &self.programs, &self.framebuffer);
    }

    // ── Resource building ────────────────────────────────────────────────────

    pub fn add_sprite(&mut self, atlas: AtlasKind, image: RawImage) -> SpriteHandle {
        let index = self.atlases[atlas.index()].add_sprite(image);
        SpriteHandle { atlas, index }
    }

    /// Pack and upload one atlas.  Call once per atlas after all of its
    /// sprites are added.
    pub fn build_atlas(&mut self, atlas: AtlasKind) {
        self.atlases[atlas.index()].build(&self.queue);
    }

    pub fn create_geometry(&mut self, mesh: &RawMesh) -> GeometryHandle {
        self.geometries
            .push(GeometryBuffer::from_raw_mesh(&self.device, mesh, "geometry"));
        GeometryHandle(self.geometries.len() - 1)
    }

    /// Build the level tileset from its six meshes, in
    /// [`TileGeometryKind`] order.
    pub fn create_tileset(
        &mut self,
        meshes: &[&RawMesh; TileGeometryKind::COUNT],
        door_offset: f32,
    ) -> Result<(), MeshError> {
        self.tileset = Some(TilesetGeometry::from_meshes(
            &self.device,
            meshes,
            door_offset,
            "tileset",
        )?);
        Ok(())
    }

    fn resolve_sprite(&self, handle: SpriteHandle) -> Option<(UvRect, Vec2)> {
        let sprite = self.atlases[handle.atlas.index()].sprite(handle.index)?;
        let uv_rect = sprite.uv_rect()?;
        Some((uv_rect, sprite.size.as_vec2()))
    }

    // ── Uniform state ────────────────────────────────────────────────────────

    pub fn set_time(&self, time: f32) {
        self.globals_block
            .set_float(&self.queue, GLOBALS_TIME_OFFSET, time);
    }

    pub fn upload_camera(&self, camera: &crate::camera::Camera) {
        self.camera_block.set_matrix(&self.queue, 0, camera.projection());
        self.camera_block
            .set_matrix(&self.queue, CAMERA_VIEW_OFFSET, camera.view());
    }

    pub fn set_map_cursor(&self, cursor: Vec2) {
        self.map_common_block
            .set_vector2(&self.queue, MAP_COMMON_CURSOR_OFFSET, cursor);
    }

    /// Write the minimap icon table.  Unpacked sprites leave their slot
    /// zeroed; the shader falls back to a plain marker.
    pub fn set_map_icons(&self, handles: &[SpriteHandle; MAP_ICON_COUNT]) {
        let mut icons = [SpriteLayout::zeroed(); MAP_ICON_COUNT];
        for (icon, handle) in icons.iter_mut().zip(handles) {
            if let Some((uv_rect, size)) = self.resolve_sprite(*handle) {
                icon.uv_rect = [uv_rect.min.x, uv_rect.min.y, uv_rect.max.x, uv_rect.max.y];
                icon.size = size.to_array();
            }
        }
        self.map_common_block.write_bytes(
            &self.queue,
            MAP_COMMON_ICONS_OFFSET,
            bytemuck::cast_slice(&icons),
        );
    }

    /// Wholesale upload of the map data block: header, POV, and the whole
    /// in-use tile prefix.  Clears every map dirty bit.
    pub fn upload_map_data(&self, level: &mut Level, pov: Pov) {
        let tilemap = &level.tilemap;
        let header = [tilemap.width, tilemap.height];
        self.map_data_block
            .write_bytes(&self.queue, 0, bytemuck::cast_slice(&header));
        self.write_pov(pov);
        let packed = tilemap.packed_tiles(0..tilemap.tile_count());
        if !packed.is_empty() {
            self.map_data_block.write_bytes(
                &self.queue,
                MAP_TILES_OFFSET,
                bytemuck::cast_slice(&packed),
            );
        }
        level
            .dirty
            .flags
            .remove(DirtyFlags::ALL | DirtyFlags::POV | DirtyFlags::TILE_RANGE);
    }

    fn write_pov(&self, pov: Pov) {
        let layout = PovLayout {
            coords: pov.coords.to_array(),
            direction: pov.direction.index() as u32,
            _pad: 0,
        };
        self.map_data_block
            .write_bytes(&self.queue, MAP_POV_OFFSET, bytemuck::bytes_of(&layout));
    }

    // ── Draw entry points ────────────────────────────────────────────────────

    pub fn draw_hud(&mut self, position: Vec3, size: Vec2, mode: i32) {
        self.queue_2d.enqueue(Entry2d {
            program: Program2dKind::Hud,
            position,
            size,
            uv_rect: UvRect {
                min: Vec2::ZERO,
                max: Vec2::ONE,
            },
            mode: EntryMode::new(mode),
        });
    }

    pub fn draw_2d(&mut self, position: Vec3, sprite: SpriteHandle) {
        self.draw_2d_ex(position, sprite, EntryMode::new(UBER2D_MODE_TEXTURE));
    }

    pub fn draw_2d_ex(&mut self, position: Vec3, sprite: SpriteHandle, mode: EntryMode) {
        let Some((uv_rect, size)) = self.resolve_sprite(sprite) else {
            log::debug!("skipping draw of unpacked sprite {sprite:?}");
            return;
        };
        self.queue_2d.enqueue(Entry2d {
            program: Program2dKind::Uber2d,
            position,
            size,
            uv_rect,
            mode,
        });
    }

    pub fn draw_2d_haze(
        &mut self,
        position: Vec3,
        sprite: SpriteHandle,
        x_intensity: f32,
        y_intensity: f32,
        speed: f32,
    ) {
        self.draw_2d_ex(
            position,
            sprite,
            EntryMode::with_control(
                UBER2D_MODE_HAZE,
                Vec4::new(x_intensity, y_intensity, speed, 0.0),
            ),
        );
    }

    pub fn draw_2d_back_blur(
        &mut self,
        position: Vec3,
        sprite: SpriteHandle,
        count: f32,
        speed: f32,
        step: f32,
    ) {
        self.draw_2d_ex(
            position,
            sprite,
            EntryMode::with_control(UBER2D_MODE_BACK_BLUR, Vec4::new(count, speed, step, 0.0)),
        );
    }

    pub fn draw_2d_glow(&mut self, position: Vec3, sprite: SpriteHandle, color: Vec3, intensity: f32) {
        self.draw_2d_ex(
            position,
            sprite,
            EntryMode::with_control(UBER2D_MODE_GLOW, color.extend(intensity)),
        );
    }

    pub fn draw_2d_disintegrate(
        &mut self,
        position: Vec3,
        sprite: SpriteHandle,
        noise: SpriteHandle,
        progress: f32,
    ) {
        let Some((noise_uv, _)) = self.resolve_sprite(noise) else {
            log::debug!("skipping disintegrate draw with unpacked noise sprite");
            return;
        };
        self.draw_2d_ex(
            position,
            sprite,
            EntryMode::with_controls(
                UBER2D_MODE_DISINTEGRATE,
                Vec4::new(progress, 0.0, 0.0, 0.0),
                Vec4::new(noise_uv.min.x, noise_uv.min.y, noise_uv.max.x, noise_uv.max.y),
            ),
        );
    }

    pub fn draw_3d(&mut self, position: Vec3, geometry: GeometryHandle) {
        self.queue_3d.enqueue(Entry3d::Mesh {
            geometry,
            model: Mat4::from_translation(position),
            mode: EntryMode::new(UBER3D_MODE_BASIC),
        });
    }

    /// Enqueue the level's instanced draw set, re-deriving it first if the
    /// level is draw-set dirty.  The door overlay is recomputed every frame
    /// from the current timeline value so an animating door never freezes on
    /// the cached set.
    pub fn draw_3d_level(&mut self, level: &mut Level, origin: IVec2, direction: Direction) {
        let Some(tileset) = &self.tileset else {
            log::warn!("draw_3d_level without a tileset");
            return;
        };
        let door_offset = tileset.door_offset;

        self.level_draw
            .call_mut(TileGeometryKind::Door)
            .reset_dynamic();

        if level.dirty.flags.contains(DirtyFlags::DRAW_SET) {
            if !level.tilemap.is_valid_tile(origin) {
                return;
            }
            draw_set::derive(
                &level.tilemap,
                &level.door,
                origin,
                direction,
                door_offset,
                &mut self.level_draw,
            );
            level.dirty.flags.remove(DirtyFlags::DRAW_SET);
            log::debug!("regenerated level draw set at {origin} facing {direction:?}");
        }

        draw_set::push_door_transforms(
            self.level_draw.call_mut(TileGeometryKind::Door),
            level.door.tile,
            level.door.direction,
            level.door.timeline.value,
            door_offset,
        );

        self.queue_3d.enqueue(Entry3d::Level {
            mode: EntryMode::new(UBER3D_MODE_LEVEL),
        });
    }

    /// Sync the level's dirty map state to the GPU, then enqueue the minimap
    /// quad.  POV and tile-range writes each touch only their sub-range, so
    /// per-frame traffic is bounded by what actually changed.
    pub fn draw_map(&mut self, level: &mut Level, position: Vec3, size: Vec2, pov: Pov) {
        if level.dirty.flags.contains(DirtyFlags::POV) {
            self.write_pov(pov);
            level.dirty.flags.remove(DirtyFlags::POV);
            log::trace!(
                "map sync: pov ({:.2}, {:.2}) facing {:?}",
                pov.coords.x,
                pov.coords.y,
                pov.direction
            );
        }

        if level.dirty.flags.contains(DirtyFlags::TILE_RANGE) {
            let (lo, hi) = level.dirty.range;
            let hi = hi.min(level.tilemap.tile_count());
            if lo < hi {
                let packed = level.tilemap.packed_tiles(lo..hi);
                self.map_data_block.write_bytes(
                    &self.queue,
                    MAP_TILES_OFFSET + (lo * std::mem::size_of::<u32>()) as u64,
                    bytemuck::cast_slice(&packed),
                );
            }
            level.dirty.flags.remove(DirtyFlags::TILE_RANGE);
            log::debug!("map sync: tiles {lo}..{hi}");
        }

        self.queue_2d.enqueue(Entry2d {
            program: Program2dKind::Map,
            position,
            size,
            uv_rect: UvRect {
                min: Vec2::ZERO,
                max: Vec2::ONE,
            },
            mode: EntryMode::new(MAP_MODE_NORMAL),
        });
    }

    /// Enqueue the world-map variant of the map quad; no dirty sync, the
    /// caller is expected to have uploaded the level it wants shown.
    pub fn draw_world_map(&mut self, position: Vec3, size: Vec2) {
        self.queue_2d.enqueue(Entry2d {
            program: Program2dKind::Map,
            position,
            size,
            uv_rect: UvRect {
                min: Vec2::ZERO,
                max: Vec2::ONE,
            },
            mode: EntryMode::new(MAP_MODE_WORLD),
        });
    }

    // ── Flush ────────────────────────────────────────────────────────────────

    /// Drain both queues into GPU work: the 3D pass, then the 2D pass, both
    /// into the scene framebuffer, then the post-process blit into `target`.
    /// Entries are submitted in insertion order within each pass, and the
    /// queues rewind to empty afterwards.
    pub fn flush(&mut self, target: &wgpu::TextureView, window_width: u32, window_height: u32) {
        self.globals_block.set_vector2(
            &self.queue,
            GLOBALS_SCREEN_SIZE_OFFSET,
            Vec2::new(self.framebuffer.width as f32, self.framebuffer.height as f32),
        );

        let cmds_3d = self.fill_scratch_3d();
        let cmds_2d = self.fill_scratch_2d();

        if !self.scratch_3d.is_empty() {
            self.queue
                .write_buffer(&self.instances_3d, 0, bytemuck::cast_slice(&self.scratch_3d));
        }
        if !self.scratch_2d.is_empty() {
            self.queue
                .write_buffer(&self.instances_2d, 0, bytemuck::cast_slice(&self.scratch_2d));
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("flush_encoder"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("scene_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.framebuffer.color_view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(SCENE_CLEAR_COLOR),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.framebuffer.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            // 3D section: centered scene viewport, depth on.
            if !cmds_3d.is_empty() {
                if let Some(pipeline) = &self.programs.uber3d {
                    let offset_x = self.framebuffer.width.saturating_sub(SCENE_WIDTH) / 2;
                    let offset_y = self.framebuffer.height.saturating_sub(SCENE_HEIGHT) / 2;
                    pass.set_viewport(
                        offset_x as f32,
                        offset_y as f32,
                        SCENE_WIDTH.min(self.framebuffer.width) as f32,
                        SCENE_HEIGHT.min(self.framebuffer.height) as f32,
                        0.0,
                        1.0,
                    );
                    pass.set_pipeline(pipeline);
                    pass.set_bind_group(0, &self.globals_bind_group, &[]);
                    pass.set_bind_group(1, &self.atlas_bind_group_3d, &[]);
                    pass.set_bind_group(2, &self.camera_bind_group, &[]);
                    pass.set_vertex_buffer(1, self.instances_3d.slice(..));

                    for cmd in &cmds_3d {
                        match *cmd {
                            Draw3dCmd::Mesh { geometry, first } => {
                                let Some(buffer) = self.geometries.get(geometry) else {
                                    continue;
                                };
                                pass.set_vertex_buffer(0, buffer.vertex_buffer.slice(..));
                                pass.set_index_buffer(
                                    buffer.index_buffer.slice(..),
                                    wgpu::IndexFormat::Uint16,
                                );
                                pass.draw_indexed(0..buffer.element_count, 0, first..first + 1);
                            }
                            Draw3dCmd::LevelCall { kind, first, count } => {
                                let Some(tileset) = &self.tileset else { continue };
                                pass.set_vertex_buffer(
                                    0,
                                    tileset.buffer.vertex_buffer.slice(..),
                                );
                                pass.set_index_buffer(
                                    tileset.buffer.index_buffer.slice(..),
                                    wgpu::IndexFormat::Uint16,
                                );
                                let sub = tileset.sub[kind];
                                pass.draw_indexed(
                                    sub.index_offset..sub.index_offset + sub.index_count,
                                    0,
                                    first..first + count,
                                );
                            }
                        }
                    }
                }
            }

            // 2D section: full framebuffer viewport, alpha blend, no depth.
            if !cmds_2d.is_empty() {
                pass.set_viewport(
                    0.0,
                    0.0,
                    self.framebuffer.width as f32,
                    self.framebuffer.height as f32,
                    0.0,
                    1.0,
                );
                pass.set_bind_group(0, &self.globals_bind_group, &[]);
                pass.set_bind_group(1, &self.atlas_bind_group_2d, &[]);
                pass.set_vertex_buffer(0, self.instances_2d.slice(..));

                for cmd in &cmds_2d {
                    let pipeline = match cmd.program {
                        Program2dKind::Hud => &self.programs.hud,
                        Program2dKind::Uber2d => &self.programs.uber2d,
                        Program2dKind::Map => &self.programs.map,
                    };
                    let Some(pipeline) = pipeline else { continue };
                    pass.set_pipeline(pipeline);
                    if cmd.program == Program2dKind::Map {
                        pass.set_bind_group(2, &self.map_bind_group, &[]);
                    }
                    pass.draw(0..6, cmd.first..cmd.first + cmd.count);
                }
            }
        }

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("post_process_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            if let Some(pipeline) = &self.programs.post {
                let (blit_width, blit_height) =
                    self.framebuffer.blit_size(window_width, window_height);
                pass.set_viewport(0.0, 0.0, blit_width as f32, blit_height as f32, 0.0, 1.0);
                pass.set_pipeline(pipeline);
                pass.set_bind_group(0, &self.post_bind_group, &[]);
                pass.draw(0..3, 0..1);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));

        self.queue_2d.reset();
        self.queue_3d.reset();
    }

    fn fill_scratch_3d(&mut self) -> Vec<Draw3dCmd> {
        self.scratch_3d.clear();
        let mut cmds = Vec::with_capacity(self.queue_3d.len());

        for entry in self.queue_3d.entries() {
            match entry {
                Entry3d::Mesh { geometry, model, mode } => {
                    let first = self.scratch_3d.len() as u32;
                    self.scratch_3d.push(Instance3dGpu::new(model, mode.id));
                    cmds.push(Draw3dCmd::Mesh {
                        geometry: geometry.0,
                        first,
                    });
                }
                Entry3d::Level { mode } => {
                    for (kind, call) in self.level_draw.calls.iter().enumerate() {
                        if call.total() == 0 {
                            continue;
                        }
                        let first = self.scratch_3d.len() as u32;
                        for transform in call.transforms() {
                            self.scratch_3d.push(Instance3dGpu::new(transform, mode.id));
                        }
                        cmds.push(Draw3dCmd::LevelCall {
                            kind,
                            first,
                            count: call.total() as u32,
                        });
                    }
                }
            }
        }

        assert!(
            self.scratch_3d.len() <= MAX_3D_INSTANCES,
            "3d instance buffer overflow"
        );
        cmds
    }

    fn fill_scratch_2d(&mut self) -> Vec<Draw2dCmd> {
        self.scratch_2d.clear();
        let mut cmds = Vec::with_capacity(self.queue_2d.len());

        for entry in self.queue_2d.entries() {
            let base = Entry2dGpu {
                position: entry.position.to_array(),
                mode: entry.mode.id,
                size: entry.size.to_array(),
                uv_rect: [
                    entry.uv_rect.min.x,
                    entry.uv_rect.min.y,
                    entry.uv_rect.max.x,
                    entry.uv_rect.max.y,
                ],
                control_a: entry.mode.control_a.to_array(),
                control_b: entry.mode.control_b.to_array(),
            };

            if entry.program == Program2dKind::Uber2d && entry.mode.id == UBER2D_MODE_BACK_BLUR {
                // Echoes first (farthest to nearest), then the sprite itself
                // on top as a plain texture draw.
                let echo_count = entry.mode.control_a.x.max(0.0) as u32;
                if echo_count > 0 {
                    let first = self.scratch_2d.len() as u32;
                    for echo in (1..=echo_count).rev() {
                        let mut gpu = base;
                        gpu.control_b[0] = echo as f32;
                        self.scratch_2d.push(gpu);
                    }
                    cmds.push(Draw2dCmd {
                        program: entry.program,
                        first,
                        count: echo_count,
                    });
                }
                let first = self.scratch_2d.len() as u32;
                let mut top = base;
                top.mode = UBER2D_MODE_TEXTURE;
                self.scratch_2d.push(top);
                cmds.push(Draw2dCmd {
                    program: entry.program,
                    first,
                    count: 1,
                });
            } else {
                let first = self.scratch_2d.len() as u32;
                self.scratch_2d.push(base);
                cmds.push(Draw2dCmd {
                    program: entry.program,
                    first,
                    count: 1,
                });
            }
        }

        assert!(
            self.scratch_2d.len() <= MAX_2D_INSTANCES,
            "2d instance buffer overflow"
        );
        cmds
    }
}

fn create_atlas_bind_group(
    device: &wgpu::Device,
    programs: &Programs,
    common: &TextureAtlas,
    primary: &TextureAtlas,
    label: &str,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout: &programs.atlas_bgl,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&common.texture_view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(&common.sampler),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::TextureView(&primary.texture_view),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: wgpu::BindingResource::Sampler(&primary.sampler),
            },
        ],
    })
}

fn create_post_bind_group(
    device: &wgpu::Device,
    programs: &Programs,
    framebuffer: &SceneFramebuffer,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("post_bg"),
        layout: &programs.post_bgl,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&framebuffer.color_view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(&framebuffer.sampler),
            },
        ],
    })
}
