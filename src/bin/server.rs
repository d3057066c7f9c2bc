use std::net::SocketAddr;

use axum::{Json, Router, routing::post};
use base64::Engine;
use image::ImageEncoder;
use image::codecs::png::PngEncoder;
use serde::{Deserialize, Serialize};
use tower_http::services::ServeDir;

use rivergen::config::Params;
use rivergen::render;

#[derive(Deserialize)]
struct GenerateRequest {
    seed: Option<u64>,
    mapsize: Option<usize>,
    // Noise
    scale: Option<f32>,
    vscale: Option<f32>,
    offset: Option<f32>,
    persistence: Option<f32>,
    lacunarity: Option<f32>,
    // Evolution
    k: Option<f32>,
    m: Option<f32>,
    d: Option<f32>,
    sea_level: Option<f32>,
    flex_radius: Option<f32>,
    flow_method: Option<String>,
    time: Option<f32>,
    niter: Option<usize>,
}

#[derive(Serialize)]
struct GenerateResponse {
    layers: Vec<Layer>,
    timings: Vec<TimingEntry>,
    size: usize,
}

#[derive(Serialize)]
struct Layer {
    name: String,
    data_url: String,
}

#[derive(Serialize)]
struct TimingEntry {
    name: String,
    ms: f64,
}

fn encode_png(rgba: &[u8], w: usize, h: usize) -> String {
    let mut buf = Vec::new();
    let encoder = PngEncoder::new(&mut buf);
    encoder
        .write_image(rgba, w as u32, h as u32, image::ExtendedColorType::Rgba8)
        .expect("PNG encode failed");
    let b64 = base64::engine::general_purpose::STANDARD.encode(&buf);
    format!("data:image/png;base64,{}", b64)
}

async fn generate_handler(Json(req): Json<GenerateRequest>) -> Json<GenerateResponse> {
    let defaults = Params::default();
    let flow_method = req
        .flow_method
        .and_then(|s| s.parse().ok())
        .unwrap_or(defaults.flow_method);

    let params = Params {
        mapsize: req.mapsize.unwrap_or(256).max(1),
        seed: req.seed.unwrap_or(defaults.seed),
        scale: req.scale.unwrap_or(defaults.scale),
        vscale: req.vscale.unwrap_or(defaults.vscale),
        offset: req.offset.unwrap_or(defaults.offset),
        persistence: req.persistence.unwrap_or(defaults.persistence),
        lacunarity: req.lacunarity.unwrap_or(defaults.lacunarity),
        k: req.k.unwrap_or(defaults.k),
        m: req.m.unwrap_or(defaults.m),
        d: req.d.unwrap_or(defaults.d),
        sea_level: req.sea_level.unwrap_or(defaults.sea_level),
        flex_radius: req.flex_radius.unwrap_or(defaults.flex_radius),
        flow_method,
        time: req.time.unwrap_or(defaults.time),
        niter: req.niter.unwrap_or(defaults.niter).max(1),
        ..defaults
    };

    let response = tokio::task::spawn_blocking(move || {
        let side = params.mapsize + 1;
        let (map, timings) = rivergen::generate(&params);

        let layers = vec![
            Layer {
                name: "map".into(),
                data_url: encode_png(
                    &render::render_map(&map.dem, &map.lakes, params.sea_level),
                    side,
                    side,
                ),
            },
            Layer {
                name: "heightmap".into(),
                data_url: encode_png(&render::render_heightmap(&map.dem), side, side),
            },
            Layer {
                name: "rivers".into(),
                data_url: encode_png(
                    &render::render_rivers(&map.dem, &map.rivers, side as u32 / 4),
                    side,
                    side,
                ),
            },
        ];

        let timing_entries = timings
            .iter()
            .map(|t| TimingEntry {
                name: t.name.to_string(),
                ms: t.ms,
            })
            .collect();

        GenerateResponse {
            layers,
            timings: timing_entries,
            size: side,
        }
    })
    .await
    .expect("generation task panicked");

    Json(response)
}

#[tokio::main]
async fn main() {
    let frontend = ServeDir::new("frontend");

    let app = Router::new()
        .route("/api/generate", post(generate_handler))
        .fallback_service(frontend);

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    eprintln!("rivergen server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
