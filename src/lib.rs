pub mod config;
pub mod erosion;
pub mod flow;
pub mod grid;
pub mod model;
pub mod noise;
pub mod render;
pub mod rng;
pub mod save;
pub mod twist;

use std::time::Instant;

use config::Params;
use grid::Grid;
use model::EvolutionModel;

/// Output bundle of one full generation run.
pub struct TerrainMap {
    pub dem: Grid<f32>,
    pub lakes: Grid<f32>,
    pub dirs: Grid<u8>,
    pub rivers: Grid<u32>,
    pub offset_x: Grid<f32>,
    pub offset_y: Grid<f32>,
}

pub struct Timing {
    pub name: &'static str,
    pub ms: f64,
}

/// Run the whole pipeline: noise DEM, landscape evolution (diffusion, flow,
/// river advection, isostasy per iteration), a final flow solve, and the
/// river-tension twist.
pub fn generate(params: &Params) -> (TerrainMap, Vec<Timing>) {
    let mut timings = Vec::new();
    let total_start = Instant::now();

    let t = Instant::now();
    let dem = noise::initial_dem(params.seed, params);
    timings.push(Timing {
        name: "noise",
        ms: t.elapsed().as_secs_f64() * 1000.0,
    });

    let t = Instant::now();
    let mut model = EvolutionModel::new(dem, params);
    timings.push(Timing {
        name: "model_init",
        ms: t.elapsed().as_secs_f64() * 1000.0,
    });

    let dt = params.time / params.niter as f32;
    let mut diffusion_ms = 0.0;
    let mut flow_ms = 0.0;
    let mut advection_ms = 0.0;
    let mut isostasy_ms = 0.0;

    for i in 0..params.niter {
        if params.sea_level_variations != 0.0 {
            let elapsed = dt * i as f32;
            let period = params.sea_level_variations_time.max(f32::EPSILON);
            model.sea_level = params.sea_level
                + (std::f32::consts::TAU * elapsed / period).sin() * params.sea_level_variations;
        }

        let t = Instant::now();
        model.diffusion(dt);
        diffusion_ms += t.elapsed().as_secs_f64() * 1000.0;

        let t = Instant::now();
        model.calculate_flow();
        flow_ms += t.elapsed().as_secs_f64() * 1000.0;

        let t = Instant::now();
        model.advection(dt);
        advection_ms += t.elapsed().as_secs_f64() * 1000.0;

        let t = Instant::now();
        model.adjust_isostasy(1.0);
        isostasy_ms += t.elapsed().as_secs_f64() * 1000.0;
    }

    // Expose flow state consistent with the final DEM.
    let t = Instant::now();
    model.calculate_flow();
    flow_ms += t.elapsed().as_secs_f64() * 1000.0;

    timings.push(Timing { name: "diffusion", ms: diffusion_ms });
    timings.push(Timing { name: "flow", ms: flow_ms });
    timings.push(Timing { name: "advection", ms: advection_ms });
    timings.push(Timing { name: "isostasy", ms: isostasy_ms });

    let t = Instant::now();
    let (bounds_h, bounds_v) = twist::make_bounds(&model.dirs, &model.rivers);
    let fixed = twist::fixed_vertices(&model.dirs);
    let (offset_x, offset_y) = twist::twist(&bounds_h, &bounds_v, &fixed, 0.1, 5);
    timings.push(Timing {
        name: "twist",
        ms: t.elapsed().as_secs_f64() * 1000.0,
    });

    timings.push(Timing {
        name: "TOTAL",
        ms: total_start.elapsed().as_secs_f64() * 1000.0,
    });

    let map = TerrainMap {
        dem: model.dem,
        lakes: model.lakes,
        dirs: model.dirs,
        rivers: model.rivers,
        offset_x,
        offset_y,
    };

    (map, timings)
}
