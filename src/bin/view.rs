use std::path::PathBuf;

use anyhow::Context;

use rivergen::render;
use rivergen::save;

/// Standalone viewer: renders PNG previews from a saved output directory.
/// Usage: view [data_dir] [out_dir] [sea_level]
fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let data_dir = PathBuf::from(args.first().map(String::as_str).unwrap_or("river_data"));
    let out_dir = args.get(1).map(PathBuf::from).unwrap_or_else(|| data_dir.clone());
    let sea_level: f32 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(0.0);

    let (h, w) = save::read_size(&data_dir)?;
    let dem = save::decode_elevation(&save::read_layer(&data_dir, "dem", w * h * 2)?, w, h);
    let lakes = save::decode_elevation(&save::read_layer(&data_dir, "lakes", w * h * 2)?, w, h);
    let rivers = save::decode_rivers(&save::read_layer(&data_dir, "rivers", w * h * 4)?, w, h);

    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("cannot create {}", out_dir.display()))?;

    let write = |name: &str, rgba: &[u8]| -> anyhow::Result<()> {
        let path = out_dir.join(name);
        image::save_buffer(&path, rgba, w as u32, h as u32, image::ColorType::Rgba8)
            .with_context(|| format!("cannot write {}", path.display()))?;
        eprintln!("Saved {}", path.display());
        Ok(())
    };

    write("map.png", &render::render_map(&dem, &lakes, sea_level))?;
    write("heightmap.png", &render::render_heightmap(&dem))?;
    write(
        "rivers.png",
        &render::render_rivers(&dem, &rivers, (w / 4) as u32),
    )?;

    Ok(())
}
