//! GLSL sources for the built-in mythic layers.
//!
//! Every fragment program is assembled from three pieces:
//!
//! 1. [`HEADER`] declares the `LayerParams` uniform block (laid out exactly
//!    like [`crate::LayerUniforms`]) and maps its fields to `u_*` names.
//! 2. [`LIBRARY`] carries the shared noise, hash and cell helpers; the Rust
//!    twins live in [`crate::field`].
//! 3. The effect body, which writes straight RGBA to `outColor`.

use crate::effect::{BlendMode, EffectKind, EffectParams, FogParams, RunicParams, VignetteParams};
use crate::registry::ShaderDefinition;

/// Full-screen triangle; three vertices, no vertex buffers.
pub const VERTEX_PROGRAM: &str = r"#version 450
layout(location = 0) out vec2 v_uv;

const vec2 positions[3] = vec2[3](
    vec2(-1.0, -3.0),
    vec2(3.0, 1.0),
    vec2(-1.0, 1.0)
);

void main() {
    vec2 pos = positions[gl_VertexIndex];
    v_uv = pos * 0.5 + vec2(0.5, 0.5);
    gl_Position = vec4(pos, 0.0, 1.0);
}
";

const HEADER: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 outColor;

// Packed as vec4s so std140 leaves no room for padding surprises.
layout(std140, set = 0, binding = 0) uniform LayerParams {
    vec4 frame;   // resolution.xy, time, strength
    vec4 tint;    // rgb tint, motion reduced flag
    vec4 params;  // effect specific
} ubo;

#define u_resolution ubo.frame.xy
#define u_time ubo.frame.z
#define u_strength ubo.frame.w
#define u_tint ubo.tint.rgb
#define u_motion_reduced (ubo.tint.a > 0.5)
#define u_params ubo.params
";

const LIBRARY: &str = r"
vec2 mythic_uv() {
    vec2 frag = vec2(gl_FragCoord.x, u_resolution.y - gl_FragCoord.y);
    return frag / max(u_resolution, vec2(1.0));
}

float mythic_hash(vec2 p) {
    return fract(sin(dot(p, vec2(127.1, 311.7))) * 43758.5453123);
}

vec3 mythic_mod289(vec3 x) { return x - floor(x * (1.0 / 289.0)) * 289.0; }
vec4 mythic_mod289(vec4 x) { return x - floor(x * (1.0 / 289.0)) * 289.0; }
vec4 mythic_permute(vec4 x) { return mythic_mod289(((x * 34.0) + 1.0) * x); }
vec4 mythic_inv_sqrt(vec4 r) { return 1.79284291400159 - 0.85373472095314 * r; }

float mythic_simplex(vec3 v) {
    const vec2 C = vec2(1.0 / 6.0, 1.0 / 3.0);
    const vec4 D = vec4(0.0, 0.5, 1.0, 2.0);

    vec3 i = floor(v + dot(v, C.yyy));
    vec3 x0 = v - i + dot(i, C.xxx);

    vec3 g = step(x0.yzx, x0.xyz);
    vec3 l = 1.0 - g;
    vec3 i1 = min(g.xyz, l.zxy);
    vec3 i2 = max(g.xyz, l.zxy);

    vec3 x1 = x0 - i1 + C.xxx;
    vec3 x2 = x0 - i2 + C.yyy;
    vec3 x3 = x0 - D.yyy;

    i = mythic_mod289(i);
    vec4 p = mythic_permute(mythic_permute(mythic_permute(
                i.z + vec4(0.0, i1.z, i2.z, 1.0))
              + i.y + vec4(0.0, i1.y, i2.y, 1.0))
              + i.x + vec4(0.0, i1.x, i2.x, 1.0));

    float n_ = 0.142857142857;
    vec3 ns = n_ * D.wyz - D.xzx;

    vec4 j = p - 49.0 * floor(p * ns.z * ns.z);
    vec4 x_ = floor(j * ns.z);
    vec4 y_ = floor(j - 7.0 * x_);
    vec4 x = x_ * ns.x + ns.yyyy;
    vec4 y = y_ * ns.x + ns.yyyy;
    vec4 h = 1.0 - abs(x) - abs(y);

    vec4 b0 = vec4(x.xy, y.xy);
    vec4 b1 = vec4(x.zw, y.zw);
    vec4 s0 = floor(b0) * 2.0 + 1.0;
    vec4 s1 = floor(b1) * 2.0 + 1.0;
    vec4 sh = -step(h, vec4(0.0));

    vec4 a0 = b0.xzyw + s0.xzyw * sh.xxyy;
    vec4 a1 = b1.xzyw + s1.xzyw * sh.zzww;

    vec3 p0 = vec3(a0.xy, h.x);
    vec3 p1 = vec3(a0.zw, h.y);
    vec3 p2 = vec3(a1.xy, h.z);
    vec3 p3 = vec3(a1.zw, h.w);

    vec4 norm = mythic_inv_sqrt(vec4(dot(p0, p0), dot(p1, p1), dot(p2, p2), dot(p3, p3)));
    p0 *= norm.x;
    p1 *= norm.y;
    p2 *= norm.z;
    p3 *= norm.w;

    vec4 m = max(0.5 - vec4(dot(x0, x0), dot(x1, x1), dot(x2, x2), dot(x3, x3)), 0.0);
    m = m * m;
    return 95.0 * dot(m * m, vec4(dot(p0, x0), dot(p1, x1), dot(p2, x2), dot(p3, x3)));
}

// xy: owning cell id, zw: offset from p to the cell's feature point.
vec4 mythic_nearest_cell(vec2 p) {
    vec2 cell = floor(p);
    vec2 local = p - cell;
    float best = 1e9;
    vec4 result = vec4(cell, 0.0, 0.0);
    for (int j = -1; j <= 1; j++) {
        for (int i = -1; i <= 1; i++) {
            vec2 neighbour = vec2(float(i), float(j));
            vec2 id = cell + neighbour;
            vec2 jitter = vec2(mythic_hash(id), mythic_hash(id + 0.5));
            vec2 offset = neighbour + jitter - local;
            float d = dot(offset, offset);
            if (d < best) {
                best = d;
                result = vec4(id, offset);
            }
        }
    }
    return result;
}
";

const FOG_BODY: &str = r"
void main() {
    vec2 uv = mythic_uv();
    float t = u_motion_reduced ? 0.0 : u_time * 0.1;

    float n1 = mythic_simplex(vec3(uv * 3.0, t));
    float n2 = mythic_simplex(vec3(uv * 6.0, t * 1.5 + 10.0));
    float n3 = mythic_simplex(vec3(uv * 12.0, t * 2.0 + 20.0));

    float fog = smoothstep(0.3, 0.7, n1 * u_strength)
        + smoothstep(0.4, 0.8, n2 * u_strength * 0.7) * 0.6
        + smoothstep(0.5, 0.9, n3 * u_strength * 0.4) * 0.3;
    fog *= u_params.x;

    float particles = 0.0;
    if (!u_motion_reduced) {
        particles = smoothstep(0.85, 0.95, n1 + n2 * 0.5);
    }

    outColor = vec4(u_tint * (fog + particles * 0.2), clamp(fog * 0.8, 0.0, 1.0));
}
";

const RUNIC_BODY: &str = r"
float stroke(float d, float width) {
    return 1.0 - smoothstep(0.0, width, d);
}

void main() {
    vec2 uv = mythic_uv();
    vec4 nearest = mythic_nearest_cell(uv * 8.0);
    vec2 cell = nearest.xy;
    vec2 local = -nearest.zw;

    float glyph = stroke(abs(local.x), 0.02) * step(0.1, mythic_hash(cell));
    glyph += stroke(abs(local.y), 0.02) * step(0.3, mythic_hash(cell + 10.0));
    float diagonals = stroke(abs(local.x - local.y), 0.03) + stroke(abs(local.x + local.y), 0.03);
    glyph += diagonals * step(0.6, mythic_hash(cell + 20.0));
    float radius = length(local);
    glyph += (1.0 - smoothstep(0.13, 0.15, radius)) * step(0.8, mythic_hash(cell + 30.0));

    float t = u_motion_reduced ? 0.0 : u_time * u_params.x;
    float flow = sin(t + mythic_hash(cell) * 6.28318530718) * 0.5 + 0.5;
    float energy = glyph * flow * u_strength;
    float halo = (1.0 - smoothstep(0.0, 0.1, radius)) * energy * 0.3;

    outColor = vec4(u_tint * (energy + halo), clamp(energy * 0.7, 0.0, 1.0));
}
";

const VIGNETTE_BODY: &str = r"
float sacred_pattern(vec2 uv, float t) {
    vec2 st = uv * 2.0 - 1.0;
    float radius = length(st);

    float star = 0.0;
    for (int i = 0; i < 8; i++) {
        float angle = float(i) * 0.785398163397;
        vec2 direction = vec2(cos(angle), sin(angle));
        star += 1.0 - smoothstep(0.0, 0.02, abs(dot(st, direction) - radius * 0.7));
    }

    float rings = 0.0;
    for (int i = 1; i <= 3; i++) {
        rings += 1.0 - smoothstep(0.0, 0.01, abs(radius - float(i) * 0.2));
    }

    float wave = sin(t + radius * 8.0) * 0.5 + 0.5;
    return (star + rings) * wave;
}

void main() {
    vec2 uv = mythic_uv();
    float dist = distance(uv, vec2(0.5));

    float falloff = (smoothstep(0.3, 0.8, dist)
        + smoothstep(0.2, 0.7, dist) * 0.5
        + smoothstep(0.1, 0.6, dist) * 0.25) * u_strength;

    float t = u_motion_reduced ? 0.0 : u_time;
    float border = smoothstep(u_params.x, u_params.x + 0.1, dist);
    float energy = sacred_pattern(uv, t) * border * u_strength;

    vec3 color = u_tint * 0.3 * falloff + u_tint * energy;
    outColor = vec4(color, clamp(falloff + energy * 0.8, 0.0, 1.0));
}
";

/// Complete fragment program for a built-in effect.
pub fn fragment_program(kind: EffectKind) -> String {
    let body = match kind {
        EffectKind::MysticFog => FOG_BODY,
        EffectKind::RunicGlow => RUNIC_BODY,
        EffectKind::SacralVignette => VIGNETTE_BODY,
    };
    format!("{HEADER}{LIBRARY}\n#line 1\n{body}")
}

/// The shipped effects with their defaults, in registration order.
pub fn builtin_definitions() -> Vec<ShaderDefinition> {
    vec![
        ShaderDefinition::builtin(
            "elemental.fog.mystic",
            &["mystic-fog", "fog"],
            "Mystic Fog",
            BlendMode::Additive,
            EffectParams::MysticFog(FogParams {
                tint: [0.8, 0.9, 1.0],
                depth: 0.8,
            }),
            0.6,
        ),
        ShaderDefinition::builtin(
            "architectural.runic-glow.medium",
            &["runic-glow", "runes"],
            "Runic Glow",
            BlendMode::Additive,
            EffectParams::RunicGlow(RunicParams {
                tint: [1.0, 0.8, 0.4],
                pulse_speed: 1.0,
            }),
            0.5,
        ),
        ShaderDefinition::builtin(
            "ritual.vignette.sacral",
            &["sacral-vignette", "vignette"],
            "Sacral Vignette",
            BlendMode::Normal,
            EffectParams::SacralVignette(VignetteParams {
                tint: [0.9, 0.6, 0.8],
                border_width: 0.4,
            }),
            0.4,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_program_declares_the_uniform_block_once() {
        for kind in EffectKind::ALL {
            let source = fragment_program(kind);
            assert!(source.starts_with("#version 450"), "{kind}");
            assert_eq!(source.matches("uniform LayerParams").count(), 1, "{kind}");
            assert_eq!(source.matches("void main()").count(), 1, "{kind}");
            assert!(source.contains("outColor ="), "{kind}");
        }
    }

    #[test]
    fn reduced_motion_is_honoured_by_every_program() {
        for kind in EffectKind::ALL {
            let source = fragment_program(kind);
            let body = source.split("#line 1").nth(1).unwrap_or_default();
            assert!(body.contains("u_motion_reduced"), "{kind} ignores reduced motion");
        }
    }

    #[test]
    fn builtins_cover_every_kind() {
        let definitions = builtin_definitions();
        let kinds: Vec<_> = definitions.iter().map(|d| d.kind()).collect();
        assert_eq!(kinds, EffectKind::ALL.to_vec());
        for definition in &definitions {
            assert_eq!(definition.vertex_program, VERTEX_PROGRAM);
            assert_eq!(definition.fragment_program, fragment_program(definition.kind()));
        }
    }
}
