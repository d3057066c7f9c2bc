use rayon::prelude::*;

use crate::grid::Grid;

// Diagnostic rendering of the generated layers. The composite view mirrors
// the classic map style: elevation ramp for dry ground, depth-shaded blue
// wherever the lake surface (or the sea) stands above the terrain.

const GROUND_LOW: [u8; 4] = [88, 139, 65, 255];
const GROUND_MID: [u8; 4] = [168, 183, 108, 255];
const GROUND_HIGH: [u8; 4] = [205, 190, 145, 255];
const GROUND_PEAK: [u8; 4] = [240, 240, 236, 255];
const WATER_SHALLOW: [u8; 4] = [70, 120, 165, 255];
const WATER_DEEP: [u8; 4] = [18, 40, 80, 255];
const RIVER_BLUE: [u8; 4] = [15, 40, 140, 255];
const RIVER_LAND_LOW: [u8; 4] = [160, 170, 140, 255];
const RIVER_LAND_HIGH: [u8; 4] = [205, 200, 180, 255];

#[inline]
fn lerp_color(a: [u8; 4], b: [u8; 4], t: f32) -> [u8; 4] {
    let t = t.clamp(0.0, 1.0);
    [
        (a[0] as f32 + (b[0] as f32 - a[0] as f32) * t).round() as u8,
        (a[1] as f32 + (b[1] as f32 - a[1] as f32) * t).round() as u8,
        (a[2] as f32 + (b[2] as f32 - a[2] as f32) * t).round() as u8,
        255,
    ]
}

/// Composite map: elevation-ramped ground with depth-shaded standing water.
pub fn render_map(dem: &Grid<f32>, lakes: &Grid<f32>, sea_level: f32) -> Vec<u8> {
    let w = dem.w;
    let h = dem.h;

    let mut max_elev = f32::MIN;
    let mut max_depth: f32 = 1.0;
    for i in 0..w * h {
        max_elev = max_elev.max(dem.data[i]);
        max_depth = max_depth.max(lakes.data[i].max(sea_level) - dem.data[i]);
    }
    let elev_range = (max_elev - sea_level).max(1.0);

    let mut rgba = vec![0u8; w * h * 4];
    rgba.par_chunks_mut(w * 4).enumerate().for_each(|(y, row)| {
        for x in 0..w {
            let z = dem.get(x, y);
            let depth = lakes.get(x, y).max(sea_level) - z;
            let color = if depth > 0.0 {
                lerp_color(WATER_SHALLOW, WATER_DEEP, depth / max_depth)
            } else {
                let t = ((z - sea_level) / elev_range).clamp(0.0, 1.0);
                if t < 0.35 {
                    lerp_color(GROUND_LOW, GROUND_MID, t / 0.35)
                } else if t < 0.7 {
                    lerp_color(GROUND_MID, GROUND_HIGH, (t - 0.35) / 0.35)
                } else {
                    lerp_color(GROUND_HIGH, GROUND_PEAK, (t - 0.7) / 0.3)
                }
            };
            row[x * 4..x * 4 + 4].copy_from_slice(&color);
        }
    });

    rgba
}

/// Grayscale elevation, normalized to the DEM's own range.
pub fn render_heightmap(dem: &Grid<f32>) -> Vec<u8> {
    let min_z = dem.data.iter().cloned().fold(f32::INFINITY, f32::min);
    let max_z = dem.data.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let range = (max_z - min_z).max(1e-6);

    let w = dem.w;
    let h = dem.h;
    let mut rgba = vec![0u8; w * h * 4];
    for i in 0..w * h {
        let t = (dem.data[i] - min_z) / range;
        let v = (t * 255.0).clamp(0.0, 255.0) as u8;
        rgba[i * 4..i * 4 + 4].copy_from_slice(&[v, v, v, 255]);
    }
    rgba
}

/// Drainage overlay on muted terrain; river darkness scales with the log of
/// the discharge, and trickles below `min_flux` are left out.
pub fn render_rivers(dem: &Grid<f32>, rivers: &Grid<u32>, min_flux: u32) -> Vec<u8> {
    let w = dem.w;
    let h = dem.h;

    let max_elev = dem.data.iter().cloned().fold(f32::NEG_INFINITY, f32::max).max(1.0);
    let max_flow = rivers.data.iter().cloned().max().unwrap_or(1).max(2) as f32;
    let log_max = max_flow.ln();

    let mut rgba = vec![0u8; w * h * 4];
    rgba.par_chunks_mut(w * 4).enumerate().for_each(|(y, row)| {
        for x in 0..w {
            let z = dem.get(x, y);
            let flux = rivers.get(x, y);

            let base = lerp_color(
                RIVER_LAND_LOW,
                RIVER_LAND_HIGH,
                (z / max_elev).clamp(0.0, 1.0),
            );
            let color = if flux >= min_flux.max(2) {
                let intensity = ((flux as f32).ln() / log_max).clamp(0.0, 1.0);
                lerp_color(base, RIVER_BLUE, 0.6 + 0.4 * intensity)
            } else {
                base
            };
            row[x * 4..x * 4 + 4].copy_from_slice(&color);
        }
    });

    rgba
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_separates_water_from_land() {
        let dem = Grid::from_vec(2, 1, vec![10.0, 50.0]);
        let lakes = Grid::from_vec(2, 1, vec![30.0, 50.0]);
        let rgba = render_map(&dem, &lakes, 0.0);
        assert_eq!(rgba.len(), 8);
        // First cell is flooded (blue dominates), second is dry ground.
        assert!(rgba[2] > rgba[0]);
        assert!(rgba[4 + 1] >= rgba[4 + 2]);
    }

    #[test]
    fn heightmap_spans_the_gray_range() {
        let dem = Grid::from_vec(2, 1, vec![-5.0, 20.0]);
        let rgba = render_heightmap(&dem);
        assert_eq!(&rgba[0..3], &[0, 0, 0]);
        assert_eq!(&rgba[4..7], &[255, 255, 255]);
    }
}
