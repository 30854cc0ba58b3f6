// ── Uber programs ─────────────────────────────────────────────────────────────
//
// Five shader programs, each switched internally by a numeric mode instead of
// by swapping programs.  The mode tables below are the single source of
// truth: `shader_prelude` renders them into WGSL constants prepended to every
// module, so the host and shader values cannot drift.
//
// A program that fails validation is logged with the full backend diagnostic
// and left unusable (`None`); the flush skips its entries, so a broken shader
// shows up as missing visuals, never as a crash.

use crate::level::{
    TILE_EDGE_SHIFT, TILE_EXPLORED_BIT, TILE_FLOOR_BIT, TILE_HOLE_BIT, TILE_VISITED_BIT,
};
use crate::renderer::framebuffer::{COLOR_FORMAT, DEPTH_FORMAT};
use crate::renderer::geometry::Vertex3d;
use crate::renderer::queue::{Entry2dGpu, Instance3dGpu};
use crate::{MAP_ICON_COUNT, MAX_LEVEL_TILE_COUNT, MAX_LEVEL_WIDTH};

// ── Mode tables ──────────────────────────────────────────────────────────────

pub const UBER2D_MODE_TEXTURE: i32 = 0;
pub const UBER2D_MODE_HAZE: i32 = 1;
pub const UBER2D_MODE_BACK_BLUR: i32 = 2;
pub const UBER2D_MODE_GLOW: i32 = 3;
pub const UBER2D_MODE_DISINTEGRATE: i32 = 4;
pub const UBER2D_MODE_DISINTEGRATE_PLASMA: i32 = 5;

pub const UBER3D_MODE_BASIC: i32 = 0;
pub const UBER3D_MODE_LEVEL: i32 = 1;

pub const HUD_MODE_BORDER_DASHED: i32 = 0;
pub const HUD_MODE_BUTTON: i32 = 1;
pub const HUD_MODE_MAP_FRAME: i32 = 2;

pub const MAP_MODE_NORMAL: i32 = 0;
pub const MAP_MODE_WORLD: i32 = 1;

/// WGSL constants + the frame-globals declaration shared by every module.
fn shader_prelude() -> String {
    format!(
        "\
const UBER2D_MODE_TEXTURE: i32 = {UBER2D_MODE_TEXTURE};
const UBER2D_MODE_HAZE: i32 = {UBER2D_MODE_HAZE};
const UBER2D_MODE_BACK_BLUR: i32 = {UBER2D_MODE_BACK_BLUR};
const UBER2D_MODE_GLOW: i32 = {UBER2D_MODE_GLOW};
const UBER2D_MODE_DISINTEGRATE: i32 = {UBER2D_MODE_DISINTEGRATE};
const UBER2D_MODE_DISINTEGRATE_PLASMA: i32 = {UBER2D_MODE_DISINTEGRATE_PLASMA};
const UBER3D_MODE_BASIC: i32 = {UBER3D_MODE_BASIC};
const UBER3D_MODE_LEVEL: i32 = {UBER3D_MODE_LEVEL};
const HUD_MODE_BORDER_DASHED: i32 = {HUD_MODE_BORDER_DASHED};
const HUD_MODE_BUTTON: i32 = {HUD_MODE_BUTTON};
const HUD_MODE_MAP_FRAME: i32 = {HUD_MODE_MAP_FRAME};
const MAP_MODE_NORMAL: i32 = {MAP_MODE_NORMAL};
const MAP_MODE_WORLD: i32 = {MAP_MODE_WORLD};
const TILE_FLOOR_BIT: u32 = {TILE_FLOOR_BIT}u;
const TILE_HOLE_BIT: u32 = {TILE_HOLE_BIT}u;
const TILE_VISITED_BIT: u32 = {TILE_VISITED_BIT}u;
const TILE_EXPLORED_BIT: u32 = {TILE_EXPLORED_BIT}u;
const TILE_EDGE_SHIFT: u32 = {TILE_EDGE_SHIFT}u;
const MAX_LEVEL_WIDTH: u32 = {MAX_LEVEL_WIDTH}u;
const MAX_LEVEL_TILE_COUNT: u32 = {MAX_LEVEL_TILE_COUNT}u;
const MAP_ICON_COUNT: u32 = {MAP_ICON_COUNT}u;

struct Globals {{
    screen_size: vec2<f32>,
    time: f32,
    _pad: f32,
}}
"
    )
}

// ── Program construction ─────────────────────────────────────────────────────

/// Bind group layouts shared across the programs, plus the five pipelines.
/// Group indices are permanent binding points: 0 = globals everywhere,
/// 1 = atlases, 2 = per-family blocks (camera or map).
pub struct Programs {
    pub globals_bgl: wgpu::BindGroupLayout,
    pub atlas_bgl: wgpu::BindGroupLayout,
    pub camera_bgl: wgpu::BindGroupLayout,
    pub map_bgl: wgpu::BindGroupLayout,
    pub post_bgl: wgpu::BindGroupLayout,
    pub hud: Option<wgpu::RenderPipeline>,
    pub uber2d: Option<wgpu::RenderPipeline>,
    pub uber3d: Option<wgpu::RenderPipeline>,
    pub map: Option<wgpu::RenderPipeline>,
    pub post: Option<wgpu::RenderPipeline>,
}

/// Build a shader module and pipeline inside a validation error scope.
/// On failure the diagnostic is logged and `None` is returned.
fn create_program(
    device: &wgpu::Device,
    label: &str,
    source: String,
    build: impl FnOnce(&wgpu::ShaderModule) -> wgpu::RenderPipeline,
) -> Option<wgpu::RenderPipeline> {
    let error_scope = device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    let pipeline = build(&module);
    match pollster::block_on(error_scope.pop()) {
        None => Some(pipeline),
        Some(error) => {
            log::error!("program '{label}' failed to build:\n{error}");
            None
        }
    }
}

fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn sampler_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    }
}

/// Depth state for the 2D programs: the main pass carries a depth
/// attachment, so every pipeline in it must declare one, but 2D draws
/// neither test nor write.
fn depth_disabled() -> wgpu::DepthStencilState {
    wgpu::DepthStencilState {
        format: DEPTH_FORMAT,
        depth_write_enabled: false,
        depth_compare: wgpu::CompareFunction::Always,
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState::default(),
    }
}

pub fn build_programs(device: &wgpu::Device, surface_format: wgpu::TextureFormat) -> Programs {
    let globals_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("globals_bgl"),
        entries: &[uniform_entry(
            0,
            wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
        )],
    });

    // Two texture units: the common atlas and the pass's primary atlas.
    let atlas_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("atlas_bgl"),
        entries: &[
            texture_entry(0),
            sampler_entry(1),
            texture_entry(2),
            sampler_entry(3),
        ],
    });

    let camera_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("camera_bgl"),
        entries: &[uniform_entry(0, wgpu::ShaderStages::VERTEX)],
    });

    let map_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("map_bgl"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            uniform_entry(1, wgpu::ShaderStages::FRAGMENT),
        ],
    });

    let post_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("post_bgl"),
        entries: &[texture_entry(0), sampler_entry(1)],
    });

    let prelude = shader_prelude();
    let with_prelude = |body: &str| format!("{prelude}\n{body}");

    let layout_2d = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("layout_2d"),
        bind_group_layouts: &[&globals_bgl, &atlas_bgl],
        ..Default::default()
    });

    let layout_map = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("layout_map"),
        bind_group_layouts: &[&globals_bgl, &atlas_bgl, &map_bgl],
        ..Default::default()
    });

    let layout_3d = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("layout_3d"),
        bind_group_layouts: &[&globals_bgl, &atlas_bgl, &camera_bgl],
        ..Default::default()
    });

    let layout_post = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("layout_post"),
        bind_group_layouts: &[&post_bgl],
        ..Default::default()
    });

    let pipeline_2d = |module: &wgpu::ShaderModule, label: &str, layout: &wgpu::PipelineLayout| {
        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(label),
            layout: Some(layout),
            vertex: wgpu::VertexState {
                module,
                entry_point: Some("vs_main"),
                buffers: &[Entry2dGpu::layout()],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: COLOR_FORMAT,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: Some(depth_disabled()),
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        })
    };

    let hud = create_program(
        device,
        "hud",
        with_prelude(include_str!("shaders/hud.wgsl")),
        |module| pipeline_2d(module, "hud_pipeline", &layout_2d),
    );

    let uber2d = create_program(
        device,
        "uber2d",
        with_prelude(include_str!("shaders/uber2d.wgsl")),
        |module| pipeline_2d(module, "uber2d_pipeline", &layout_2d),
    );

    let map = create_program(
        device,
        "map",
        with_prelude(include_str!("shaders/map.wgsl")),
        |module| pipeline_2d(module, "map_pipeline", &layout_map),
    );

    let uber3d = create_program(
        device,
        "uber3d",
        with_prelude(include_str!("shaders/uber3d.wgsl")),
        |module| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("uber3d_pipeline"),
                layout: Some(&layout_3d),
                vertex: wgpu::VertexState {
                    module,
                    entry_point: Some("vs_main"),
                    buffers: &[Vertex3d::layout(), Instance3dGpu::layout()],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: COLOR_FORMAT,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: Some(wgpu::Face::Back),
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            })
        },
    );

    let post = create_program(
        device,
        "post_process",
        with_prelude(include_str!("shaders/post_process.wgsl")),
        |module| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("post_process_pipeline"),
                layout: Some(&layout_post),
                vertex: wgpu::VertexState {
                    module,
                    entry_point: Some("vs_main"),
                    buffers: &[], // corners generated from vertex_index
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: surface_format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            })
        },
    );

    Programs {
        globals_bgl,
        atlas_bgl,
        camera_bgl,
        map_bgl,
        post_bgl,
        hud,
        uber2d,
        uber3d,
        map,
        post,
    }
}
