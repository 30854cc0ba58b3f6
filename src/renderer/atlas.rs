use glam::{UVec2, Vec2};

use crate::mesh::RawImage;
use crate::{ATLAS_SIZE, MAX_ATLAS_SPRITES};

// ── Shelf packing (pure, GPU-free) ───────────────────────────────────────────

/// Pixel rectangle assigned to one packed sprite.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PackedRect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

/// Deterministic shelf pack of `sizes` into a square atlas of `atlas_size`.
///
/// Sprites are placed tallest-first (stable: equal heights keep insertion
/// order) on left-to-right shelves; a sprite that would overrun the atlas
/// width starts a new shelf at `y += tallest_on_shelf`.  When a sprite would
/// overrun the atlas *height*, packing stops: that sprite and every one
/// after it in placement order get `None`.  Capacity exhaustion is absorbed
/// silently, not reported — callers must not draw unpacked sprites.
///
/// The result is indexed by insertion order, one slot per input size.
pub fn pack(sizes: &[(u32, u32)], atlas_size: u32) -> Vec<Option<PackedRect>> {
    let mut order: Vec<usize> = (0..sizes.len()).collect();
    // sort_by_key is stable, so equal heights stay in insertion order.
    order.sort_by_key(|&i| std::cmp::Reverse(sizes[i].1));

    let mut rects: Vec<Option<PackedRect>> = vec![None; sizes.len()];
    let mut cursor_x = 0u32;
    let mut cursor_y = 0u32;
    let mut shelf_height = 0u32;

    for &index in &order {
        let (w, h) = sizes[index];
        if w > atlas_size {
            log::warn!("sprite {index} is wider ({w}px) than the atlas ({atlas_size}px); skipping");
            continue;
        }
        if cursor_x + w > atlas_size {
            cursor_y += shelf_height;
            cursor_x = 0;
            shelf_height = 0;
        }
        if cursor_y + h > atlas_size {
            break;
        }
        rects[index] = Some(PackedRect { x: cursor_x, y: cursor_y, w, h });
        cursor_x += w;
        shelf_height = shelf_height.max(h);
    }

    rects
}

// ── Sprites ──────────────────────────────────────────────────────────────────

/// Normalized UV rectangle inside an atlas texture.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UvRect {
    pub min: Vec2,
    pub max: Vec2,
}

/// One sprite slot: its pixel size, the source image held until the build
/// uploads it, and the UV rect that only exists after a successful pack.
pub struct Sprite {
    pub size: UVec2,
    image: Option<RawImage>,
    uv_rect: Option<UvRect>,
}

impl Sprite {
    pub fn uv_rect(&self) -> Option<UvRect> {
        self.uv_rect
    }
}

// ── TextureAtlas ─────────────────────────────────────────────────────────────

/// One shared texture holding many packed sub-images.
///
/// Sprites are reserved with [`add_sprite`](Self::add_sprite) and placed by a
/// single [`build`](Self::build) pass, which uploads each packed image into
/// its sub-region of the texture.  Slots past [`MAX_ATLAS_SPRITES`], and any
/// sprite added after the build, are accepted but never packed: their
/// handles resolve to no UV rect and draw nothing.
pub struct TextureAtlas {
    texture: wgpu::Texture,
    pub texture_view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
    sprites: Vec<Sprite>,
    built: bool,
}

impl TextureAtlas {
    pub fn new(device: &wgpu::Device, label: &str) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: ATLAS_SIZE,
                height: ATLAS_SIZE,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let texture_view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Self {
            texture,
            texture_view,
            sampler,
            sprites: Vec::with_capacity(MAX_ATLAS_SPRITES),
            built: false,
        }
    }

    /// Reserve a slot for `image` and return its index.  The image is owned
    /// by the slot until the build uploads (or discards) it.
    pub fn add_sprite(&mut self, image: RawImage) -> usize {
        if self.built {
            log::warn!("sprite added after atlas build; it will not be packed");
        } else if self.sprites.len() >= MAX_ATLAS_SPRITES {
            log::warn!(
                "atlas sprite capacity ({MAX_ATLAS_SPRITES}) exceeded; sprite will not be packed"
            );
        }
        self.sprites.push(Sprite {
            size: UVec2::new(image.width, image.height),
            image: Some(image),
            uv_rect: None,
        });
        self.sprites.len() - 1
    }

    /// Pack all reserved sprites and upload each packed image into its
    /// sub-region of the atlas texture.  Source images are released here,
    /// packed or not; unpacked sprites keep no UV rect.
    pub fn build(&mut self, queue: &wgpu::Queue) {
        let considered = self.sprites.len().min(MAX_ATLAS_SPRITES);
        let sizes: Vec<(u32, u32)> = self.sprites[..considered]
            .iter()
            .map(|s| (s.size.x, s.size.y))
            .collect();
        let rects = pack(&sizes, ATLAS_SIZE);

        for (sprite, rect) in self.sprites.iter_mut().zip(rects) {
            let image = sprite.image.take();
            let Some(rect) = rect else { continue };

            let scale = 1.0 / ATLAS_SIZE as f32;
            sprite.uv_rect = Some(UvRect {
                min: Vec2::new(rect.x as f32, rect.y as f32) * scale,
                max: Vec2::new((rect.x + rect.w) as f32, (rect.y + rect.h) as f32) * scale,
            });

            if let Some(image) = image {
                queue.write_texture(
                    wgpu::TexelCopyTextureInfo {
                        texture: &self.texture,
                        mip_level: 0,
                        origin: wgpu::Origin3d { x: rect.x, y: rect.y, z: 0 },
                        aspect: wgpu::TextureAspect::All,
                    },
                    &image.pixels,
                    wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(4 * rect.w),
                        rows_per_image: Some(rect.h),
                    },
                    wgpu::Extent3d {
                        width: rect.w,
                        height: rect.h,
                        depth_or_array_layers: 1,
                    },
                );
            }
        }

        // Anything past the considered prefix also gives up its image.
        for sprite in &mut self.sprites[considered..] {
            sprite.image = None;
        }

        self.built = true;
    }

    pub fn sprite(&self, index: usize) -> Option<&Sprite> {
        self.sprites.get(index)
    }

    pub fn sprite_count(&self) -> usize {
        self.sprites.len()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn overlaps(a: &PackedRect, b: &PackedRect) -> bool {
        a.x < b.x + b.w && b.x < a.x + a.w && a.y < b.y + b.h && b.y < a.y + a.h
    }

    #[test]
    fn single_sprite_lands_at_origin() {
        let rects = pack(&[(16, 24)], 512);
        assert_eq!(rects[0], Some(PackedRect { x: 0, y: 0, w: 16, h: 24 }));
    }

    #[test]
    fn pack_is_deterministic() {
        let sizes = [(16, 24), (32, 8), (100, 100), (16, 24), (200, 50)];
        assert_eq!(pack(&sizes, 512), pack(&sizes, 512));
    }

    #[test]
    fn equal_heights_keep_insertion_order() {
        let sizes = [(10, 20), (30, 20), (20, 20)];
        let rects = pack(&sizes, 512);
        let xs: Vec<u32> = rects.iter().map(|r| r.unwrap().x).collect();
        assert_eq!(xs, vec![0, 10, 40]);
    }

    #[test]
    fn taller_sprites_pack_first() {
        let sizes = [(32, 16), (32, 64)];
        let rects = pack(&sizes, 512);
        assert_eq!(rects[1].unwrap().x, 0, "tallest placed first");
        assert_eq!(rects[0].unwrap().x, 32, "shorter follows on the shelf");
    }

    #[test]
    fn width_overflow_starts_a_new_shelf() {
        let sizes = [(200, 32), (200, 32), (200, 32)];
        let rects = pack(&sizes, 512);
        assert_eq!(rects[0].unwrap().y, 0);
        assert_eq!(rects[1].unwrap().y, 0);
        let wrapped = rects[2].unwrap();
        assert_eq!(wrapped.x, 0);
        assert_eq!(wrapped.y, 32, "new shelf starts below the tallest sprite");
    }

    #[test]
    fn no_two_packed_sprites_overlap() {
        let sizes: Vec<(u32, u32)> = (0..40).map(|i| (20 + (i % 7) * 9, 10 + (i % 5) * 13)).collect();
        let rects = pack(&sizes, 256);
        let packed: Vec<PackedRect> = rects.into_iter().flatten().collect();
        for i in 0..packed.len() {
            for j in (i + 1)..packed.len() {
                assert!(!overlaps(&packed[i], &packed[j]), "{:?} vs {:?}", packed[i], packed[j]);
            }
        }
    }

    #[test]
    fn packed_sprites_stay_inside_the_atlas() {
        let sizes: Vec<(u32, u32)> = (0..30).map(|i| (60, 20 + (i % 3) * 20)).collect();
        let rects = pack(&sizes, 128);
        for rect in rects.into_iter().flatten() {
            assert!(rect.x + rect.w <= 128);
            assert!(rect.y + rect.h <= 128);
        }
    }

    #[test]
    fn height_exhaustion_leaves_later_sprites_unpacked() {
        // Each sprite fills a whole shelf; only four 32px shelves fit in 128.
        let sizes: Vec<(u32, u32)> = (0..6).map(|_| (128, 32)).collect();
        let rects = pack(&sizes, 128);
        assert!(rects[..4].iter().all(Option::is_some));
        assert!(rects[4..].iter().all(Option::is_none), "overflow absorbed silently");
    }

    #[test]
    fn oversized_sprite_is_skipped_without_stopping_the_pack() {
        let rects = pack(&[(600, 48), (16, 24)], 512);
        assert!(rects[0].is_none());
        assert!(rects[1].is_some());
    }
}
