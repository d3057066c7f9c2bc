use anyhow::Context;

use rivergen::config::{self, Params};
use rivergen::save;

fn main() -> anyhow::Result<()> {
    let cli = config::parse_cli(std::env::args().skip(1));

    let mut settings = config::read_config_file(&cli.config_path)?;
    for (key, value) in cli.overrides {
        settings.insert(key, value);
    }
    let params = Params::from_settings(&settings)?;

    let side = params.mapsize + 1;
    eprintln!(
        "Generating {side}x{side} grid: seed={}, K={}, m={}, d={}, {} iterations ({:?})",
        params.seed, params.k, params.m, params.d, params.niter, params.flow_method
    );

    let (map, timings) = rivergen::generate(&params);

    eprintln!("\nTimings:");
    for t in &timings {
        eprintln!("  {:12} {:10.1} ms", t.name, t.ms);
    }

    std::fs::create_dir_all(&cli.output_dir)
        .with_context(|| format!("cannot create output directory {}", cli.output_dir.display()))?;

    save::write_layer(&cli.output_dir, "dem", &save::encode_elevation(&map.dem))?;
    save::write_layer(&cli.output_dir, "lakes", &save::encode_elevation(&map.lakes))?;
    save::write_layer(&cli.output_dir, "dirs", &save::encode_dirs(&map.dirs))?;
    save::write_layer(&cli.output_dir, "rivers", &save::encode_rivers(&map.rivers))?;
    save::write_layer(&cli.output_dir, "offset_x", &save::encode_offsets(&map.offset_x))?;
    save::write_layer(&cli.output_dir, "offset_y", &save::encode_offsets(&map.offset_y))?;
    save::write_size(&cli.output_dir, side, side)?;

    print_stats(&map, params.sea_level);
    eprintln!("Grid is ready in {}", cli.output_dir.display());

    Ok(())
}

/// Post-run summary in the spirit of the classic map stats: how much of the
/// surface is land, how much of the land is lake, and the elevation span.
fn print_stats(map: &rivergen::TerrainMap, sea_level: f32) {
    let n = map.dem.data.len() as f64;
    let mut land = 0u64;
    let mut lake = 0u64;
    let mut min_z = f32::INFINITY;
    let mut max_z = f32::NEG_INFINITY;

    for i in 0..map.dem.data.len() {
        let z = map.dem.data[i];
        let surf = map.lakes.data[i].max(z);
        min_z = min_z.min(z);
        max_z = max_z.max(z);
        if surf >= sea_level {
            land += 1;
            if map.lakes.data[i] > z {
                lake += 1;
            }
        }
    }

    eprintln!(
        "\nLand: {:.1}%  Lakes: {:.1}%  Elevation: {:.0}..{:.0}",
        land as f64 / n * 100.0,
        lake as f64 / n * 100.0,
        min_z,
        max_z
    );
}
