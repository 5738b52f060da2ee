//! Procedural fields evaluated by every mythic layer.
//!
//! These functions are the CPU twin of the GLSL library in
//! [`crate::shaders`]: the preview rasteriser and the tests call them
//! directly, the GPU programs carry the same arithmetic. Everything here is
//! pure and allocation free so it can run per pixel.

use std::f32::consts::{FRAC_PI_4, TAU};

use glam::{Vec2, Vec3};

/// Grid density used by the runic glyph field (cells per unit of uv).
pub const RUNE_GRID: f32 = 8.0;

/// Hermite interpolation with GLSL semantics, including reversed edges.
///
/// Equal edges degrade to a step so callers never divide by zero.
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let span = edge1 - edge0;
    if span.abs() <= f32::EPSILON {
        return if x < edge0 { 0.0 } else { 1.0 };
    }
    let t = ((x - edge0) / span).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

fn step(edge: f32, x: f32) -> f32 {
    if x < edge {
        0.0
    } else {
        1.0
    }
}

fn fract(x: f32) -> f32 {
    x - x.floor()
}

/// Deterministic pseudo-random value in `[0, 1)` for a 2D cell coordinate.
pub fn hash21(p: Vec2) -> f32 {
    fract((p.dot(Vec2::new(127.1, 311.7))).sin() * 43_758.547)
}

/// Maps a fragment coordinate (bottom-left origin) into normalised uv space.
pub fn fragment_uv(frag_coord: Vec2, resolution: Vec2) -> Vec2 {
    frag_coord / resolution.max(Vec2::ONE)
}

fn mod289(x: f32) -> f32 {
    x - (x * (1.0 / 289.0)).floor() * 289.0
}

fn permute(x: f32) -> f32 {
    mod289((x * 34.0 + 1.0) * x)
}

fn taylor_inv_sqrt(r: f32) -> f32 {
    1.792_842_9 - 0.853_734_7 * r
}

/// Squared radius of each simplex corner's kernel. Kept at 0.5 so kernels
/// vanish before the neighbouring simplex takes over.
const KERNEL_RADIUS_SQ: f32 = 0.5;
const NOISE_SCALE: f32 = 95.0;

/// Three dimensional simplex noise in roughly `[-1, 1]`.
///
/// Continuous in all inputs; the third axis is used as time by the fog.
pub fn simplex3(v: Vec3) -> f32 {
    const SKEW: f32 = 1.0 / 3.0;
    const UNSKEW: f32 = 1.0 / 6.0;

    let base = (v + Vec3::splat(v.dot(Vec3::splat(SKEW)))).floor();
    let x0 = v - base + Vec3::splat(base.dot(Vec3::splat(UNSKEW)));

    let g = Vec3::new(step(x0.y, x0.x), step(x0.z, x0.y), step(x0.x, x0.z));
    let l = Vec3::ONE - g;
    let l_rotated = Vec3::new(l.z, l.x, l.y);
    let i1 = g.min(l_rotated);
    let i2 = g.max(l_rotated);

    let corners = [
        x0,
        x0 - i1 + Vec3::splat(UNSKEW),
        x0 - i2 + Vec3::splat(SKEW),
        x0 - Vec3::splat(0.5),
    ];
    let offsets = [Vec3::ZERO, i1, i2, Vec3::ONE];
    let cell = Vec3::new(mod289(base.x), mod289(base.y), mod289(base.z));

    let mut total = 0.0;
    for (corner, offset) in corners.iter().zip(offsets.iter()) {
        let falloff = (KERNEL_RADIUS_SQ - corner.dot(*corner)).max(0.0);
        if falloff == 0.0 {
            continue;
        }
        let hashed = permute(
            permute(permute(cell.z + offset.z) + cell.y + offset.y) + cell.x + offset.x,
        );
        let falloff = falloff * falloff;
        total += falloff * falloff * corner_gradient(hashed).dot(*corner);
    }
    NOISE_SCALE * total
}

fn corner_gradient(hashed: f32) -> Vec3 {
    const N: f32 = 1.0 / 7.0;
    let ns = Vec3::new(2.0 * N, 0.5 * N - 1.0, N);

    let j = hashed - 49.0 * (hashed * ns.z * ns.z).floor();
    let x_ = (j * ns.z).floor();
    let y_ = (j - 7.0 * x_).floor();
    let x = x_ * ns.x + ns.y;
    let y = y_ * ns.x + ns.y;
    let h = 1.0 - x.abs() - y.abs();

    let sh = if h <= 0.0 { -1.0 } else { 0.0 };
    let gradient = Vec3::new(
        x + (x.floor() * 2.0 + 1.0) * sh,
        y + (y.floor() * 2.0 + 1.0) * sh,
        h,
    );
    gradient * taylor_inv_sqrt(gradient.dot(gradient))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FogSample {
    /// Layered fog density, `0..~1.9` before depth scaling.
    pub density: f32,
    /// Bright particle mask; zero when animation is suppressed.
    pub particles: f32,
}

/// Three octaves of drifting fog at the given drift time.
pub fn fog(uv: Vec2, time: f32, strength: f32, animate: bool) -> FogSample {
    let n1 = simplex3(Vec3::new(uv.x * 3.0, uv.y * 3.0, time));
    let n2 = simplex3(Vec3::new(uv.x * 6.0, uv.y * 6.0, time * 1.5 + 10.0));
    let n3 = simplex3(Vec3::new(uv.x * 12.0, uv.y * 12.0, time * 2.0 + 20.0));

    let density = smoothstep(0.3, 0.7, n1 * strength)
        + smoothstep(0.4, 0.8, n2 * strength * 0.7) * 0.6
        + smoothstep(0.5, 0.9, n3 * strength * 0.4) * 0.3;

    let particles = if animate {
        smoothstep(0.85, 0.95, n1 + n2 * 0.5)
    } else {
        0.0
    };

    FogSample { density, particles }
}

/// Nearest jittered feature point around `p`.
///
/// Returns the owning cell id and the offset from `p` to its feature point.
pub fn nearest_cell(p: Vec2) -> (Vec2, Vec2) {
    let cell = p.floor();
    let local = p - cell;

    let mut best_distance = f32::MAX;
    let mut best_cell = cell;
    let mut best_offset = Vec2::ZERO;
    for j in -1..=1 {
        for i in -1..=1 {
            let neighbour = Vec2::new(i as f32, j as f32);
            let id = cell + neighbour;
            let jitter = Vec2::new(hash21(id), hash21(id + Vec2::splat(0.5)));
            let offset = neighbour + jitter - local;
            let distance = offset.length_squared();
            if distance < best_distance {
                best_distance = distance;
                best_cell = id;
                best_offset = offset;
            }
        }
    }
    (best_cell, best_offset)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuneSample {
    /// Stroke coverage of the glyph owning this point.
    pub glyph: f32,
    /// Per-cell breathing factor in `[0, 1]`.
    pub flow: f32,
    /// Distance from the point to its cell's feature point.
    pub radius: f32,
}

/// Glyph coverage for the runic grid. `phase_time` is elapsed time already
/// multiplied by the pulse speed.
pub fn runic_glyph(uv: Vec2, phase_time: f32) -> RuneSample {
    let (cell, offset) = nearest_cell(uv * RUNE_GRID);
    let local = -offset;

    let stroke = |distance: f32, width: f32| 1.0 - smoothstep(0.0, width, distance);

    let mut glyph = stroke(local.x.abs(), 0.02) * step(0.1, hash21(cell));
    glyph += stroke(local.y.abs(), 0.02) * step(0.3, hash21(cell + Vec2::splat(10.0)));
    let diagonals = stroke((local.x - local.y).abs(), 0.03) + stroke((local.x + local.y).abs(), 0.03);
    glyph += diagonals * step(0.6, hash21(cell + Vec2::splat(20.0)));
    let radius = local.length();
    glyph += (1.0 - smoothstep(0.13, 0.15, radius)) * step(0.8, hash21(cell + Vec2::splat(30.0)));

    let phase = hash21(cell) * TAU;
    let flow = (phase_time + phase).sin() * 0.5 + 0.5;

    RuneSample {
        glyph,
        flow,
        radius,
    }
}

/// Eight-pointed star plus concentric rings, rippling outward with `time`.
pub fn sacred_pattern(uv: Vec2, time: f32) -> f32 {
    let st = uv * 2.0 - Vec2::ONE;
    let radius = st.length();

    let mut star = 0.0;
    for i in 0..8 {
        let direction = Vec2::from_angle(i as f32 * FRAC_PI_4);
        star += 1.0 - smoothstep(0.0, 0.02, (st.dot(direction) - radius * 0.7).abs());
    }

    let mut rings = 0.0;
    for i in 1..=3 {
        rings += 1.0 - smoothstep(0.0, 0.01, (radius - i as f32 * 0.2).abs());
    }

    let wave = (time + radius * 8.0).sin() * 0.5 + 0.5;
    (star + rings) * wave
}

/// Layered radial darkening toward the edges, scaled by strength.
pub fn vignette(uv: Vec2, strength: f32) -> f32 {
    let distance = uv.distance(Vec2::splat(0.5));
    (smoothstep(0.3, 0.8, distance)
        + smoothstep(0.2, 0.7, distance) * 0.5
        + smoothstep(0.1, 0.6, distance) * 0.25)
        * strength
}

/// Mask that keeps the sacred pattern outside the clear centre.
pub fn border_mask(uv: Vec2, border_width: f32) -> f32 {
    let distance = uv.distance(Vec2::splat(0.5));
    smoothstep(border_width, border_width + 0.1, distance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn smoothstep_matches_glsl_for_reversed_edges() {
        assert_eq!(smoothstep(0.0, 1.0, -1.0), 0.0);
        assert_eq!(smoothstep(0.0, 1.0, 2.0), 1.0);
        assert!((smoothstep(0.0, 1.0, 0.5) - 0.5).abs() < 1e-6);
        for x in [0.0, 0.005, 0.01, 0.015, 0.02] {
            let reversed = smoothstep(0.02, 0.0, x);
            let flipped = 1.0 - smoothstep(0.0, 0.02, x);
            assert!((reversed - flipped).abs() < 1e-5, "x = {x}");
        }
        assert_eq!(smoothstep(0.5, 0.5, 0.4), 0.0);
        assert_eq!(smoothstep(0.5, 0.5, 0.6), 1.0);
    }

    #[test]
    fn hash_is_deterministic_and_in_unit_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..512 {
            let p = Vec2::new(rng.gen_range(-64.0..64.0), rng.gen_range(-64.0..64.0)).floor();
            let value = hash21(p);
            assert!((0.0..1.0).contains(&value), "hash {value} at {p}");
            assert_eq!(value, hash21(p));
        }
    }

    #[test]
    fn simplex_stays_bounded() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..4096 {
            let p = Vec3::new(
                rng.gen_range(-50.0..50.0),
                rng.gen_range(-50.0..50.0),
                rng.gen_range(-50.0..50.0),
            );
            let value = simplex3(p);
            assert!(value.is_finite());
            assert!(value.abs() <= 1.5, "noise {value} at {p}");
        }
    }

    #[test]
    fn simplex_is_continuous() {
        let mut rng = StdRng::seed_from_u64(1234);
        for _ in 0..4096 {
            let p = Vec3::new(
                rng.gen_range(-20.0..20.0),
                rng.gen_range(-20.0..20.0),
                rng.gen_range(0.0..20.0),
            );
            let nudge = Vec3::new(
                rng.gen_range(-1e-4..1e-4),
                rng.gen_range(-1e-4..1e-4),
                rng.gen_range(-1e-4..1e-4),
            );
            let delta = (simplex3(p) - simplex3(p + nudge)).abs();
            assert!(delta < 0.01, "jump of {delta} near {p}");
        }
    }

    #[test]
    fn fog_drifts_smoothly_over_time() {
        let mut rng = StdRng::seed_from_u64(99);
        for _ in 0..1024 {
            let uv = Vec2::new(rng.gen_range(0.0..1.0), rng.gen_range(0.0..1.0));
            let t = rng.gen_range(0.0..100.0);
            let a = fog(uv, t, 1.0, false).density;
            let b = fog(uv, t + 1e-4, 1.0, false).density;
            assert!((a - b).abs() < 0.05, "fog jumped from {a} to {b}");
        }
    }

    #[test]
    fn fog_without_animation_has_no_particles() {
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..256 {
            let uv = Vec2::new(rng.gen_range(0.0..1.0), rng.gen_range(0.0..1.0));
            assert_eq!(fog(uv, 0.0, 1.0, false).particles, 0.0);
        }
    }

    #[test]
    fn zero_strength_fog_is_empty() {
        let sample = fog(Vec2::new(0.3, 0.7), 4.0, 0.0, false);
        assert_eq!(sample.density, 0.0);
    }

    #[test]
    fn nearest_cell_beats_every_neighbour() {
        let mut rng = StdRng::seed_from_u64(21);
        for _ in 0..256 {
            let p = Vec2::new(rng.gen_range(-10.0..10.0), rng.gen_range(-10.0..10.0));
            let (cell, offset) = nearest_cell(p);
            let jitter = Vec2::new(hash21(cell), hash21(cell + Vec2::splat(0.5)));
            assert!(((cell + jitter - p) - offset).length() < 1e-4);
            let base = p.floor();
            for j in -1..=1 {
                for i in -1..=1 {
                    let id = base + Vec2::new(i as f32, j as f32);
                    let other = id + Vec2::new(hash21(id), hash21(id + Vec2::splat(0.5)));
                    assert!(offset.length() <= (other - p).length() + 1e-5);
                }
            }
        }
    }

    #[test]
    fn rune_flow_is_a_unit_breath() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..256 {
            let uv = Vec2::new(rng.gen_range(0.0..1.0), rng.gen_range(0.0..1.0));
            let sample = runic_glyph(uv, rng.gen_range(0.0..50.0));
            assert!((0.0..=1.0).contains(&sample.flow));
            assert!(sample.glyph >= 0.0);
        }
    }

    #[test]
    fn sacred_pattern_traces_rings() {
        // A point on the first ring (radius 0.2 in [-1, 1] space) at peak wave.
        let uv = Vec2::new(0.5 + 0.1, 0.5);
        let wave_peak = std::f32::consts::FRAC_PI_2 - 0.2 * 8.0;
        assert!(sacred_pattern(uv, wave_peak) >= 1.0);
    }

    #[test]
    fn vignette_darkens_edges_not_centre() {
        assert_eq!(vignette(Vec2::splat(0.5), 1.0), 0.0);
        let corner = vignette(Vec2::ZERO, 1.0);
        assert!(corner > 1.0, "corner vignette {corner}");
        assert_eq!(border_mask(Vec2::splat(0.5), 0.4), 0.0);
        assert_eq!(border_mask(Vec2::ZERO, 0.4), 1.0);
    }

    #[test]
    fn fragment_uv_guards_zero_resolution() {
        let uv = fragment_uv(Vec2::new(0.5, 0.5), Vec2::ZERO);
        assert_eq!(uv, Vec2::new(0.5, 0.5));
    }
}
