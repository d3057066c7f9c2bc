use rayon::prelude::*;

use crate::grid::{DIR_NONE, Grid, dir_delta};
use crate::model::Coeff;

// River erosion as upstream advection of elevations: an erosion wave moves
// up every stream at speed v = K * flux^m, so a cell takes on the elevation
// the wave carried from downstream.

/// Per-cell crossing time of the erosion wave, tau = 1 / (K * flux^m).
/// Zero flux (or zero K) makes the wave infinitely slow; those cells are
/// never advected.
fn crossing_times(rivers: &Grid<u32>, k: &Coeff, m: &Coeff) -> Grid<f32> {
    let w = rivers.w;
    let mut tau = Grid::<f32>::new(w, rivers.h);
    tau.data.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        for (x, t) in row.iter_mut().enumerate() {
            let flux = rivers.get(x, y) as f32;
            let speed = k.at(x, y) * flux.powf(m.at(x, y));
            *t = if speed > 0.0 { 1.0 / speed } else { f32::INFINITY };
        }
    });
    tau
}

/// Advect elevations upstream along the flow network for a duration `t`.
///
/// For every cell the walk follows `dirs` downstream, spending each visited
/// cell's crossing time, until the remaining budget fits inside one cell;
/// the advected elevation is interpolated between the last two cells of the
/// walk. Border cells are trapped (treated as direction 0), so they and any
/// walk reaching them keep their own elevation. Returns a new DEM; the
/// caller decides how to compose it with the current one.
pub fn advect(
    base_elev: &Grid<f32>,
    dirs: &Grid<u8>,
    rivers: &Grid<u32>,
    t: f32,
    k: &Coeff,
    m: &Coeff,
    sea_level: f32,
) -> Grid<f32> {
    let w = base_elev.w;
    let h = base_elev.h;
    let tau = crossing_times(rivers, k, m);

    let mut base = base_elev.clone();
    for v in base.data.iter_mut() {
        *v = v.max(sea_level);
    }

    let mut out = Grid::<f32>::new(w, h);
    out.data.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        for (x, cell) in row.iter_mut().enumerate() {
            let (mut x0, mut y0) = (x, y);
            let (mut x1, mut y1) = (x, y);
            let mut remaining = t;
            loop {
                let d = if base.on_border(x0, y0) {
                    DIR_NONE
                } else {
                    dirs.get(x0, y0)
                };
                if d == DIR_NONE {
                    remaining = 0.0;
                    break;
                }
                let (dx, dy) = dir_delta(d);
                x1 = (x0 as i32 + dx) as usize;
                y1 = (y0 as i32 + dy) as usize;

                let cross = tau.get(x0, y0);
                if remaining <= cross {
                    break;
                }
                remaining -= cross;
                x0 = x1;
                y0 = y1;
            }

            let cross = tau.get(x0, y0);
            // An infinite (or degenerate) crossing time pins the lookup
            // point on the cell itself; never divide by it.
            let c = if cross.is_finite() && cross > 0.0 {
                remaining / cross
            } else {
                0.0
            };
            *cell = c * base.get(x1, y1) + (1.0 - c) * base.get(x0, y0);
        }
    });

    out
}

pub const DIFF_MAX: f32 = 1.0;

/// Hillslope diffusion as sub-stepped discrete Laplacian updates,
/// dem += (d * t / N) * L dem with the 5-point quarter stencil. Neighbor
/// lookups reflect at the grid edge, so the operator redistributes material
/// without creating or destroying any.
pub fn diffuse_laplacian(dem: &mut Grid<f32>, t: f32, d: &Coeff) {
    let dmax = d.max_value();
    if !(t > 0.0) || !(dmax > 0.0) {
        return;
    }
    let nsub = ((t * dmax) / DIFF_MAX) as usize + 1;
    let dt = t / nsub as f32;

    let w = dem.w;
    let h = dem.h;
    let mut prev = dem.data.clone();
    for _ in 0..nsub {
        prev.copy_from_slice(&dem.data);
        let prev_ref = &prev;
        dem.data.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
            let yn = if y > 0 { y - 1 } else { 0 };
            let ys = if y + 1 < h { y + 1 } else { h - 1 };
            for (x, cell) in row.iter_mut().enumerate() {
                let xw = if x > 0 { x - 1 } else { 0 };
                let xe = if x + 1 < w { x + 1 } else { w - 1 };
                let z = prev_ref[y * w + x];
                let lap = 0.25
                    * (prev_ref[yn * w + x]
                        + prev_ref[ys * w + x]
                        + prev_ref[y * w + xw]
                        + prev_ref[y * w + xe])
                    - z;
                *cell = z + lap * d.at(x, y) * dt;
            }
        });
    }
}

/// Hillslope diffusion as a Gaussian blur of sigma = d * sqrt(t), the
/// closed-form solution of the heat equation for a uniform coefficient.
pub fn diffuse_gaussian(dem: &mut Grid<f32>, t: f32, d: f32) {
    if t > 0.0 && d > 0.0 {
        gaussian_blur(dem, d * t.sqrt());
    }
}

/// Reflect an out-of-range index back into [0, n).
#[inline]
fn reflect(mut i: i64, n: i64) -> usize {
    loop {
        if i < 0 {
            i = -i - 1;
        } else if i >= n {
            i = 2 * n - 1 - i;
        } else {
            return i as usize;
        }
    }
}

/// Separable Gaussian blur with reflecting boundaries, radius 3 sigma.
pub fn gaussian_blur(grid: &mut Grid<f32>, sigma: f32) {
    let radius = (sigma * 3.0).ceil() as usize;
    if radius == 0 {
        return;
    }

    let kernel: Vec<f32> = (0..=radius)
        .map(|i| (-(i as f32 * i as f32) / (2.0 * sigma * sigma)).exp())
        .collect();
    let sum: f32 = kernel[0] + 2.0 * kernel[1..].iter().sum::<f32>();
    let kernel: Vec<f32> = kernel.iter().map(|k| k / sum).collect();

    let w = grid.w;
    let h = grid.h;

    // Horizontal pass
    let src = grid.data.clone();
    grid.data.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        let line = &src[y * w..(y + 1) * w];
        for (x, cell) in row.iter_mut().enumerate() {
            let mut s = line[x] * kernel[0];
            for (r, k) in kernel.iter().enumerate().skip(1) {
                s += line[reflect(x as i64 - r as i64, w as i64)] * k;
                s += line[reflect(x as i64 + r as i64, w as i64)] * k;
            }
            *cell = s;
        }
    });

    // Vertical pass
    let src = grid.data.clone();
    grid.data.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        for (x, cell) in row.iter_mut().enumerate() {
            let mut s = src[y * w + x] * kernel[0];
            for (r, k) in kernel.iter().enumerate().skip(1) {
                s += src[reflect(y as i64 - r as i64, h as i64) * w + x] * k;
                s += src[reflect(y as i64 + r as i64, h as i64) * w + x] * k;
            }
            *cell = s;
        }
    });
}
