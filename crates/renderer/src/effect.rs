//! Known effect kinds, their typed parameters and blend modes.

use std::collections::BTreeMap;
use std::fmt;

use glam::{Vec2, Vec3};
use layerstack::ParamValue;
use tracing::{debug, warn};

use crate::field;

/// Time multiplier applied to the fog's noise drift.
pub const FOG_DRIFT: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EffectKind {
    MysticFog,
    RunicGlow,
    SacralVignette,
}

impl EffectKind {
    pub const ALL: [EffectKind; 3] = [
        EffectKind::MysticFog,
        EffectKind::RunicGlow,
        EffectKind::SacralVignette,
    ];

    pub fn label(self) -> &'static str {
        match self {
            EffectKind::MysticFog => "mystic-fog",
            EffectKind::RunicGlow => "runic-glow",
            EffectKind::SacralVignette => "sacral-vignette",
        }
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

/// How a layer's output combines with what is already in the framebuffer.
///
/// Colours below are straight (not premultiplied); `s` is the layer colour,
/// `a` its alpha and `d` the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendMode {
    /// `d + s * a`
    Additive,
    /// `s * a + d * (1 - a)`
    Normal,
    /// `s * (1 - d) + d`
    Screen,
    /// `s * d + d * (1 - a)`
    Multiply,
}

impl BlendMode {
    pub fn label(self) -> &'static str {
        match self {
            BlendMode::Additive => "additive",
            BlendMode::Normal => "normal",
            BlendMode::Screen => "screen",
            BlendMode::Multiply => "multiply",
        }
    }

    /// CPU evaluation of the blend equation, clamped to displayable range.
    pub fn composite(self, dst: [f32; 3], src: [f32; 4]) -> [f32; 3] {
        let alpha = src[3].clamp(0.0, 1.0);
        let mut out = [0.0; 3];
        for channel in 0..3 {
            let s = src[channel];
            let d = dst[channel];
            let value = match self {
                BlendMode::Additive => d + s * alpha,
                BlendMode::Normal => s * alpha + d * (1.0 - alpha),
                BlendMode::Screen => s * (1.0 - d) + d,
                BlendMode::Multiply => s * d + d * (1.0 - alpha),
            };
            out[channel] = value.clamp(0.0, 1.0);
        }
        out
    }
}

impl fmt::Display for BlendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FogParams {
    pub tint: [f32; 3],
    pub depth: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunicParams {
    pub tint: [f32; 3],
    pub pulse_speed: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VignetteParams {
    pub tint: [f32; 3],
    pub border_width: f32,
}

/// Parameters for one layer, typed per effect kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EffectParams {
    MysticFog(FogParams),
    RunicGlow(RunicParams),
    SacralVignette(VignetteParams),
}

#[derive(Debug, PartialEq)]
enum OverrideError {
    Unknown,
    Type { expected: &'static str },
    NotFinite,
    Reserved,
}

impl EffectParams {
    pub fn kind(&self) -> EffectKind {
        match self {
            EffectParams::MysticFog(_) => EffectKind::MysticFog,
            EffectParams::RunicGlow(_) => EffectKind::RunicGlow,
            EffectParams::SacralVignette(_) => EffectKind::SacralVignette,
        }
    }

    pub fn tint(&self) -> [f32; 3] {
        match self {
            EffectParams::MysticFog(p) => p.tint,
            EffectParams::RunicGlow(p) => p.tint,
            EffectParams::SacralVignette(p) => p.tint,
        }
    }

    /// Effect specific uniform slots, read as `u_params` by the programs.
    pub fn packed(&self) -> [f32; 4] {
        match self {
            EffectParams::MysticFog(p) => [p.depth, 0.0, 0.0, 0.0],
            EffectParams::RunicGlow(p) => [p.pulse_speed, 0.0, 0.0, 0.0],
            EffectParams::SacralVignette(p) => [p.border_width, 0.0, 0.0, 0.0],
        }
    }

    /// Applies per-layer overrides on top of these defaults.
    ///
    /// Names match with or without a `u_` prefix. Anything that does not fit
    /// is logged and skipped; the default stays in place.
    pub fn with_overrides(mut self, overrides: &BTreeMap<String, ParamValue>, layer: &str) -> Self {
        for (name, value) in overrides {
            let bare = name.strip_prefix("u_").unwrap_or(name);
            match self.apply(bare, value) {
                Ok(()) => {}
                Err(OverrideError::Reserved) => {
                    debug!(layer, param = %name, "parameter is driven by the engine; override ignored");
                }
                Err(OverrideError::Unknown) => {
                    warn!(layer, param = %name, "unknown shader parameter; ignoring");
                }
                Err(OverrideError::Type { expected }) => {
                    warn!(
                        layer,
                        param = %name,
                        expected,
                        found = value.type_name(),
                        "shader parameter has the wrong type; ignoring"
                    );
                }
                Err(OverrideError::NotFinite) => {
                    warn!(layer, param = %name, "shader parameter is not finite; ignoring");
                }
            }
        }
        self
    }

    fn apply(&mut self, name: &str, value: &ParamValue) -> Result<(), OverrideError> {
        if matches!(name, "strength" | "time" | "resolution" | "motion_reduced") {
            return Err(OverrideError::Reserved);
        }
        match (self, name) {
            (EffectParams::MysticFog(p), "tint") => p.tint = vec3(value)?,
            (EffectParams::RunicGlow(p), "tint") => p.tint = vec3(value)?,
            (EffectParams::SacralVignette(p), "tint") => p.tint = vec3(value)?,
            (EffectParams::MysticFog(p), "depth") => p.depth = float(value, 0.0, 1.0)?,
            (EffectParams::RunicGlow(p), "pulse_speed") => {
                p.pulse_speed = float(value, 0.1, 3.0)?
            }
            (EffectParams::SacralVignette(p), "border_width") => {
                p.border_width = float(value, 0.1, 0.8)?
            }
            _ => return Err(OverrideError::Unknown),
        }
        Ok(())
    }

    /// Straight RGBA output of the effect at `uv`, matching its fragment
    /// program.
    pub fn shade(&self, uv: Vec2, time: f32, strength: f32, motion_reduced: bool) -> [f32; 4] {
        let tint = Vec3::from_array(self.tint());
        let (color, alpha) = match self {
            EffectParams::MysticFog(p) => {
                let drift = if motion_reduced { 0.0 } else { time * FOG_DRIFT };
                let sample = field::fog(uv, drift, strength, !motion_reduced);
                let density = sample.density * p.depth;
                (tint * (density + sample.particles * 0.2), density * 0.8)
            }
            EffectParams::RunicGlow(p) => {
                let phase_time = if motion_reduced { 0.0 } else { time * p.pulse_speed };
                let rune = field::runic_glyph(uv, phase_time);
                let energy = rune.glyph * rune.flow * strength;
                let halo = (1.0 - field::smoothstep(0.0, 0.1, rune.radius)) * energy * 0.3;
                (tint * (energy + halo), energy * 0.7)
            }
            EffectParams::SacralVignette(p) => {
                let time = if motion_reduced { 0.0 } else { time };
                let falloff = field::vignette(uv, strength);
                let energy = field::sacred_pattern(uv, time)
                    * field::border_mask(uv, p.border_width)
                    * strength;
                (tint * 0.3 * falloff + tint * energy, falloff + energy * 0.8)
            }
        };
        [color.x, color.y, color.z, alpha.clamp(0.0, 1.0)]
    }
}

fn vec3(value: &ParamValue) -> Result<[f32; 3], OverrideError> {
    let triple = value
        .as_vec3()
        .ok_or(OverrideError::Type { expected: "vec3" })?;
    if triple.iter().all(|c| c.is_finite()) {
        Ok(triple.map(|c| c.clamp(0.0, 1.0)))
    } else {
        Err(OverrideError::NotFinite)
    }
}

fn float(value: &ParamValue, min: f32, max: f32) -> Result<f32, OverrideError> {
    let number = value
        .as_float()
        .ok_or(OverrideError::Type { expected: "float" })?;
    if number.is_finite() {
        Ok(number.clamp(min, max))
    } else {
        Err(OverrideError::NotFinite)
    }
}

/// Clamps a layer strength into `[0, 1]`; NaN collapses to zero.
pub fn clamp_strength(strength: f32) -> f32 {
    if strength.is_nan() {
        0.0
    } else {
        strength.clamp(0.0, 1.0)
    }
}
