use rayon::prelude::*;

use crate::config::Params;
use crate::grid::Grid;
use crate::rng::{hash2, seed_u32};

const SALT_TERRAIN: u64 = 0x7E44_A1BE_D001_0001;

#[inline]
fn smootherstep(t: f32) -> f32 {
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// 2D gradient noise. 16 evenly-spaced unit gradients avoid the directional
/// bias of 4-gradient Perlin.
#[inline]
pub fn gradient_noise(x: f32, y: f32, seed: u32) -> f32 {
    let ix = x.floor() as i32;
    let iy = y.floor() as i32;
    let fx = x - ix as f32;
    let fy = y - iy as f32;
    let sx = smootherstep(fx);
    let sy = smootherstep(fy);

    #[inline]
    fn grad(hash: u32, dx: f32, dy: f32) -> f32 {
        match hash & 15 {
            0 => dx,
            1 => 0.924 * dx + 0.383 * dy,
            2 => 0.707 * (dx + dy),
            3 => 0.383 * dx + 0.924 * dy,
            4 => dy,
            5 => -0.383 * dx + 0.924 * dy,
            6 => 0.707 * (-dx + dy),
            7 => -0.924 * dx + 0.383 * dy,
            8 => -dx,
            9 => -0.924 * dx - 0.383 * dy,
            10 => 0.707 * (-dx - dy),
            11 => -0.383 * dx - 0.924 * dy,
            12 => -dy,
            13 => 0.383 * dx - 0.924 * dy,
            14 => 0.707 * (dx - dy),
            _ => 0.924 * dx - 0.383 * dy,
        }
    }

    let v00 = grad(hash2(ix, iy, seed), fx, fy);
    let v10 = grad(hash2(ix + 1, iy, seed), fx - 1.0, fy);
    let v01 = grad(hash2(ix, iy + 1, seed), fx, fy - 1.0);
    let v11 = grad(hash2(ix + 1, iy + 1, seed), fx - 1.0, fy - 1.0);

    let a = lerp(v00, v10, sx);
    let b = lerp(v01, v11, sx);
    // Scale to approximately [-1, 1] (raw range is ~[-0.7, 0.7])
    lerp(a, b, sy) * 1.414
}

/// Fractal Brownian Motion. `gain` is the per-octave amplitude factor
/// (persistence), `lac` the frequency factor (lacunarity). Normalized so the
/// result stays in roughly [-1, 1] regardless of octave count.
pub fn fbm(x: f32, y: f32, seed: u32, octaves: u32, lac: f32, gain: f32) -> f32 {
    let mut sum = 0.0;
    let mut amp = 1.0;
    let mut freq = 1.0;
    let mut norm = 0.0;
    for i in 0..octaves {
        sum += gradient_noise(x * freq, y * freq, seed.wrapping_add(i)) * amp;
        norm += amp;
        amp *= gain;
        freq *= lac;
    }
    if norm > 0.0 { sum / norm } else { 0.0 }
}

/// Synthesize the initial DEM: fractal noise sampled at `cell / scale`,
/// scaled to `vscale` and shifted by `offset`. The seed randomizes the
/// lattice hash directly, so no coordinate base offset is needed (a large
/// one would eat the fractional precision of f32 coordinates). The raster
/// side is `mapsize + 1`.
pub fn initial_dem(seed: u64, params: &Params) -> Grid<f32> {
    let side = params.mapsize + 1;
    let octaves = (params.mapsize as f32).log2().ceil() as u32 + 1;
    let noise_seed = seed_u32(seed, SALT_TERRAIN);

    let mut dem = Grid::<f32>::new(side, side);
    let scale = params.scale.max(1e-6);
    let vscale = params.vscale;
    let offset = params.offset;
    let lac = params.lacunarity;
    let gain = params.persistence;

    dem.data.par_chunks_mut(side).enumerate().for_each(|(y, row)| {
        let ny = y as f32 / scale;
        for (x, cell) in row.iter_mut().enumerate() {
            let nx = x as f32 / scale;
            *cell = fbm(nx, ny, noise_seed, octaves, lac, gain) * vscale + offset;
        }
    });

    dem
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fbm_is_bounded() {
        for i in 0..200 {
            let v = fbm(i as f32 * 0.37, i as f32 * 0.11, 5, 8, 2.0, 0.6);
            assert!(v.abs() <= 1.5, "fbm out of range: {v}");
        }
    }

    #[test]
    fn initial_dem_is_deterministic_per_seed() {
        let params = Params {
            mapsize: 16,
            ..Params::default()
        };
        let a = initial_dem(1234, &params);
        let b = initial_dem(1234, &params);
        let c = initial_dem(4321, &params);
        assert_eq!(a.data, b.data);
        assert_ne!(a.data, c.data);
        assert_eq!(a.w, 17);
        assert_eq!(a.h, 17);
        assert!(a.data.iter().all(|v| v.is_finite()));
    }
}
