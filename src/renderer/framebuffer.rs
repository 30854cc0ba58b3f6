use crate::{REFERENCE_HEIGHT, REFERENCE_WIDTH};

pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

// ── Integer-scale fit (pure) ──────────────────────────────────────────────────

/// Framebuffer dimensions and blit scale for a window.
///
/// The scene renders at the reference resolution scaled up by the largest
/// integer factor that fits the window; leftover window space is covered by
/// widening the framebuffer itself (slack divided back down by the scale,
/// plus one pixel of rounding headroom) so the scaled blit always reaches the
/// window edges.  Windows smaller than the reference resolution get the
/// plain reference size at scale 1.
pub fn framebuffer_size(window_width: u32, window_height: u32) -> (u32, u32, u32) {
    let mut width = REFERENCE_WIDTH;
    let mut height = REFERENCE_HEIGHT;

    let scale = (window_width / REFERENCE_WIDTH).min(window_height / REFERENCE_HEIGHT);
    if scale >= 1 {
        width += (window_width - scale * REFERENCE_WIDTH) / scale + 1;
        height += (window_height - scale * REFERENCE_HEIGHT) / scale + 1;
    }

    (width, height, scale.max(1))
}

// ── SceneFramebuffer ─────────────────────────────────────────────────────────

/// Offscreen color + depth target the 3D and 2D passes render into, blitted
/// to the window at an integer scale by the post-process pass.  Created once
/// at init; recreated only on explicit window resize.
pub struct SceneFramebuffer {
    pub color_view: wgpu::TextureView,
    pub depth_view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
    pub width: u32,
    pub height: u32,
    pub scale: u32,
}

impl SceneFramebuffer {
    pub fn new(device: &wgpu::Device, window_width: u32, window_height: u32) -> Self {
        let (width, height, scale) = framebuffer_size(window_width, window_height);
        let (color_view, depth_view) = create_targets(device, width, height);
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("scene_framebuffer_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        Self {
            color_view,
            depth_view,
            sampler,
            width,
            height,
            scale,
        }
    }

    pub fn resize(&mut self, device: &wgpu::Device, window_width: u32, window_height: u32) {
        let (width, height, scale) = framebuffer_size(window_width, window_height);
        let (color_view, depth_view) = create_targets(device, width, height);
        self.color_view = color_view;
        self.depth_view = depth_view;
        self.width = width;
        self.height = height;
        self.scale = scale;
    }

    /// Window-space size of the scaled blit, clamped to the window so the
    /// viewport stays inside the target (the clamp crops at most the one
    /// pixel of rounding headroom).
    pub fn blit_size(&self, window_width: u32, window_height: u32) -> (u32, u32) {
        (
            (self.width * self.scale).min(window_width),
            (self.height * self.scale).min(window_height),
        )
    }
}

fn create_targets(
    device: &wgpu::Device,
    width: u32,
    height: u32,
) -> (wgpu::TextureView, wgpu::TextureView) {
    let color = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("scene_framebuffer_color"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: COLOR_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    let depth = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("scene_framebuffer_depth"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    (
        color.create_view(&wgpu::TextureViewDescriptor::default()),
        depth.create_view(&wgpu::TextureViewDescriptor::default()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_multiple_window_adds_only_rounding_headroom() {
        let (w, h, scale) = framebuffer_size(1280, 720);
        assert_eq!(scale, 3);
        // 1280 = 3×320 + 320 slack → 320/3 = 106 extra columns + 1.
        assert_eq!(w, 320 + 106 + 1);
        assert_eq!(h, 240 + 0 + 1);
    }

    #[test]
    fn window_smaller_than_reference_clamps_to_scale_one() {
        let (w, h, scale) = framebuffer_size(200, 100);
        assert_eq!((w, h, scale), (REFERENCE_WIDTH, REFERENCE_HEIGHT, 1));
    }

    #[test]
    fn reference_sized_window_is_identity() {
        let (w, h, scale) = framebuffer_size(REFERENCE_WIDTH, REFERENCE_HEIGHT);
        assert_eq!((w, h, scale), (REFERENCE_WIDTH + 1, REFERENCE_HEIGHT + 1, 1));
    }

    #[test]
    fn scaled_blit_always_covers_the_window() {
        for &(ww, wh) in &[(640, 480), (1280, 720), (1920, 1080), (333, 257)] {
            let (w, h, scale) = framebuffer_size(ww, wh);
            assert!(w * scale >= ww, "{ww}x{wh}");
            assert!(h * scale >= wh, "{ww}x{wh}");
        }
    }
}
