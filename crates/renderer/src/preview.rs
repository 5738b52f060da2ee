//! CPU rasteriser for layer stacks.
//!
//! Evaluates the same fields as the fragment programs and folds them over the
//! base colour with [`BlendMode::composite`], so a stack can be previewed
//! without a GPU.

use glam::Vec2;
use image::{Rgba, RgbaImage};
use layerstack::LayerConfig;
use tracing::debug;

use crate::effect::{clamp_strength, BlendMode, EffectParams};
use crate::field::fragment_uv;
use crate::probe::FallbackPanel;
use crate::registry::ShaderRegistry;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreviewOptions {
    pub width: u32,
    pub height: u32,
    /// Seconds since mount.
    pub time: f32,
    pub motion_reduced: bool,
}

impl Default for PreviewOptions {
    fn default() -> Self {
        Self {
            width: 640,
            height: 360,
            time: 0.0,
            motion_reduced: false,
        }
    }
}

struct ResolvedLayer {
    params: EffectParams,
    blend: BlendMode,
    strength: f32,
}

fn resolve(registry: &ShaderRegistry, layers: &[LayerConfig]) -> Vec<ResolvedLayer> {
    layers
        .iter()
        .filter(|layer| layer.enabled)
        .filter_map(|layer| {
            let Some(definition) = registry.lookup(&layer.shader) else {
                debug!(key = %layer.shader, "no shader registered for layer; skipping in preview");
                return None;
            };
            Some(ResolvedLayer {
                params: definition
                    .defaults
                    .with_overrides(&layer.params, &definition.key),
                blend: definition.blend,
                strength: clamp_strength(layer.strength),
            })
        })
        .collect()
}

fn to_byte(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Renders `layers` in list order over the base colour.
pub fn render_preview(
    registry: &ShaderRegistry,
    layers: &[LayerConfig],
    options: &PreviewOptions,
) -> RgbaImage {
    let resolved = resolve(registry, layers);
    let base = FallbackPanel::BACKGROUND.map(|c| f32::from(c) / 255.0);
    let resolution = Vec2::new(options.width as f32, options.height as f32);
    let time = if options.motion_reduced {
        0.0
    } else {
        options.time.max(0.0)
    };
    debug!(
        layers = resolved.len(),
        width = options.width,
        height = options.height,
        time,
        "rendering cpu preview"
    );

    RgbaImage::from_fn(options.width, options.height, |x, y| {
        // Image rows run top-down; fragment coordinates start bottom-left.
        let frag = Vec2::new(x as f32 + 0.5, resolution.y - (y as f32 + 0.5));
        let uv = fragment_uv(frag, resolution);
        let rgb = resolved.iter().fold(base, |dst, layer| {
            let src = layer
                .params
                .shade(uv, time, layer.strength, options.motion_reduced);
            layer.blend.composite(dst, src)
        });
        Rgba([to_byte(rgb[0]), to_byte(rgb[1]), to_byte(rgb[2]), 255])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> PreviewOptions {
        PreviewOptions {
            width: 64,
            height: 36,
            time: 1.5,
            motion_reduced: false,
        }
    }

    #[test]
    fn empty_stack_is_base_colour() {
        let registry = ShaderRegistry::builtin();
        let image = render_preview(&registry, &[], &small());
        assert_eq!(image.dimensions(), (64, 36));
        assert!(image.pixels().all(|p| p.0 == [0x11, 0x11, 0x11, 255]));
    }

    #[test]
    fn unknown_and_disabled_layers_draw_nothing() {
        let registry = ShaderRegistry::builtin();
        let layers = vec![
            LayerConfig::new("does.not.exist", 1.0),
            LayerConfig::new("elemental.fog.mystic", 1.0).enabled(false),
        ];
        let image = render_preview(&registry, &layers, &small());
        assert!(image.pixels().all(|p| p.0 == [0x11, 0x11, 0x11, 255]));
    }

    #[test]
    fn additive_fog_only_brightens() {
        let registry = ShaderRegistry::builtin();
        let layers = vec![LayerConfig::new("elemental.fog.mystic", 1.0)];
        let image = render_preview(&registry, &layers, &small());
        assert!(image
            .pixels()
            .all(|p| p.0[..3].iter().all(|&c| c >= 0x11)));
        assert!(image.pixels().any(|p| p.0[2] > 0x11));
    }

    #[test]
    fn vignette_darkens_toward_corners() {
        let registry = ShaderRegistry::builtin();
        let layers = vec![LayerConfig::new("ritual.vignette.sacral", 1.0)];
        let options = PreviewOptions {
            width: 64,
            height: 64,
            time: 0.0,
            motion_reduced: true,
        };
        let image = render_preview(&registry, &layers, &options);
        let luma = |x: u32, y: u32| -> u32 {
            image.get_pixel(x, y).0[..3].iter().map(|&c| u32::from(c)).sum()
        };
        assert_ne!(luma(32, 32), luma(0, 0));
    }

    #[test]
    fn zero_strength_runes_leave_base() {
        let registry = ShaderRegistry::builtin();
        let layers = vec![LayerConfig::new("runic-glow", 0.0)];
        let image = render_preview(&registry, &layers, &small());
        assert!(image.pixels().all(|p| p.0 == [0x11, 0x11, 0x11, 255]));
    }

    #[test]
    fn reduced_motion_ignores_time() {
        let registry = ShaderRegistry::builtin();
        let layers = vec![
            LayerConfig::new("elemental.fog.mystic", 0.8),
            LayerConfig::new("architectural.runic-glow.medium", 0.6),
        ];
        let early = PreviewOptions {
            time: 0.0,
            motion_reduced: true,
            ..small()
        };
        let late = PreviewOptions {
            time: 42.0,
            ..early
        };
        assert_eq!(
            render_preview(&registry, &layers, &early),
            render_preview(&registry, &layers, &late)
        );
    }
}
