use bytemuck::{Pod, Zeroable};

use crate::clock::FrameUniforms;
use crate::effect::EffectParams;

/// Per-layer uniform block. Mirrors the std140 `LayerParams` block declared
/// in every fragment program as three `vec4`s.
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayerUniforms {
    pub resolution: [f32; 2],
    pub time: f32,
    pub strength: f32,
    pub tint: [f32; 3],
    /// 1.0 when reduced motion is requested, 0.0 otherwise.
    pub motion_reduced: f32,
    /// Effect specific slots; see [`EffectParams::packed`].
    pub params: [f32; 4],
}

unsafe impl Zeroable for LayerUniforms {}
unsafe impl Pod for LayerUniforms {}

impl LayerUniforms {
    /// Uniforms for a freshly created instance: time starts at zero.
    pub fn new(params: &EffectParams, strength: f32, viewport: (u32, u32)) -> Self {
        Self {
            resolution: [viewport.0 as f32, viewport.1 as f32],
            time: 0.0,
            strength,
            tint: params.tint(),
            motion_reduced: 0.0,
            params: params.packed(),
        }
    }

    pub fn apply_frame(&mut self, frame: &FrameUniforms) {
        self.resolution = frame.resolution;
        self.time = frame.time;
        self.motion_reduced = if frame.motion_reduced { 1.0 } else { 0.0 };
    }

    pub fn is_motion_reduced(&self) -> bool {
        self.motion_reduced > 0.5
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::{EffectParams, FogParams};

    #[test]
    fn block_is_three_vec4s() {
        assert_eq!(std::mem::size_of::<LayerUniforms>(), 48);
        assert_eq!(std::mem::align_of::<LayerUniforms>(), 16);
    }

    #[test]
    fn frame_updates_only_touch_frame_fields() {
        let params = EffectParams::MysticFog(FogParams {
            tint: [0.8, 0.9, 1.0],
            depth: 0.8,
        });
        let mut uniforms = LayerUniforms::new(&params, 0.6, (640, 480));
        assert_eq!(uniforms.time, 0.0);

        uniforms.apply_frame(&FrameUniforms {
            time: 2.5,
            resolution: [800.0, 600.0],
            motion_reduced: true,
        });

        assert_eq!(uniforms.time, 2.5);
        assert_eq!(uniforms.resolution, [800.0, 600.0]);
        assert!(uniforms.is_motion_reduced());
        assert_eq!(uniforms.strength, 0.6);
        assert_eq!(uniforms.tint, [0.8, 0.9, 1.0]);
        assert_eq!(uniforms.params[0], 0.8);
        assert_eq!(uniforms.as_bytes().len(), 48);
    }
}
