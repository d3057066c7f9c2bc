use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::flow::FlowMethod;

/// All tunable parameters, read from a `key = value` config file with
/// command-line overrides.
#[derive(Clone, Debug)]
pub struct Params {
    /// Grid edge length N; every raster is (N+1) x (N+1).
    pub mapsize: usize,
    pub seed: u64,

    // Initial terrain noise
    pub scale: f32,
    pub vscale: f32,
    pub offset: f32,
    pub persistence: f32,
    pub lacunarity: f32,

    // Landscape evolution
    pub k: f32,
    pub m: f32,
    pub d: f32,
    pub sea_level: f32,
    pub sea_level_variations: f32,
    pub sea_level_variations_time: f32,
    pub flex_radius: f32,
    pub flow_method: FlowMethod,
    pub time: f32,
    pub niter: usize,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            mapsize: 1000,
            seed: 42,
            scale: 400.0,
            vscale: 300.0,
            offset: 0.0,
            persistence: 0.6,
            lacunarity: 2.0,
            k: 0.5,
            m: 0.5,
            d: 0.5,
            sea_level: 0.0,
            sea_level_variations: 0.0,
            sea_level_variations_time: 1.0,
            flex_radius: 20.0,
            flow_method: FlowMethod::Semirandom,
            time: 10.0,
            niter: 10,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid value for `{key}`: {value:?}")]
    BadValue { key: String, value: String },
    #[error("`{key}` must be positive")]
    NonPositive { key: &'static str },
}

/// Parse `key = value` settings text. The first `=` splits; both sides are
/// trimmed; lines without `=` are ignored.
pub fn parse_settings(text: &str) -> HashMap<String, String> {
    let mut settings = HashMap::new();
    for line in text.lines() {
        if let Some((key, value)) = line.split_once('=') {
            settings.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    settings
}

/// Read a config file. A missing file yields empty settings; any other I/O
/// failure is an input error.
pub fn read_config_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    if !path.is_file() {
        return Ok(HashMap::new());
    }
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_settings(&text))
}

/// Command-line surface: two positional arguments (config path, output
/// directory) and `--key value` / `--key=value` overrides. `--config` and
/// `--output` address the paths; every other flag becomes an override that
/// prevails over the config file.
#[derive(Clone, Debug)]
pub struct CliArgs {
    pub config_path: PathBuf,
    pub output_dir: PathBuf,
    pub overrides: Vec<(String, String)>,
}

pub fn parse_cli<I: Iterator<Item = String>>(args: I) -> CliArgs {
    let mut config_path = PathBuf::from("terrain.conf");
    let mut output_dir = PathBuf::from("river_data");
    let mut overrides = Vec::new();

    let args: Vec<String> = args.collect();
    let mut i = 0;
    let mut positional = 0;
    while i < args.len() {
        let arg = &args[i];
        if let Some(name) = arg.strip_prefix("--") {
            let (key, value) = match name.split_once('=') {
                Some((k, v)) => {
                    i += 1;
                    (k.to_string(), Some(v.to_string()))
                }
                None if i + 1 < args.len() => {
                    i += 2;
                    (name.to_string(), Some(args[i - 1].clone()))
                }
                None => {
                    i += 1;
                    (name.to_string(), None)
                }
            };
            if let Some(value) = value {
                match key.as_str() {
                    "config" => config_path = PathBuf::from(value),
                    "output" => output_dir = PathBuf::from(value),
                    _ => overrides.push((key, value)),
                }
            }
        } else {
            positional += 1;
            match positional {
                1 => config_path = PathBuf::from(arg),
                2 => output_dir = PathBuf::from(arg),
                _ => {}
            }
            i += 1;
        }
    }

    CliArgs {
        config_path,
        output_dir,
        overrides,
    }
}

fn get_f32(
    settings: &HashMap<String, String>,
    key: &str,
    default: f32,
) -> Result<f32, ConfigError> {
    match settings.get(key) {
        None => Ok(default),
        Some(v) => v.parse().map_err(|_| ConfigError::BadValue {
            key: key.to_string(),
            value: v.clone(),
        }),
    }
}

fn get_usize(
    settings: &HashMap<String, String>,
    key: &str,
    default: usize,
) -> Result<usize, ConfigError> {
    match settings.get(key) {
        None => Ok(default),
        Some(v) => v.parse().map_err(|_| ConfigError::BadValue {
            key: key.to_string(),
            value: v.clone(),
        }),
    }
}

fn get_u64(
    settings: &HashMap<String, String>,
    key: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    match settings.get(key) {
        None => Ok(default),
        Some(v) => v.parse().map_err(|_| ConfigError::BadValue {
            key: key.to_string(),
            value: v.clone(),
        }),
    }
}

impl Params {
    /// Build typed parameters from merged settings. Unknown keys are ignored
    /// so arbitrary overrides can flow through the CLI.
    pub fn from_settings(settings: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let defaults = Params::default();

        let flow_method = match settings.get("flow_method") {
            None => defaults.flow_method,
            Some(v) => v.parse().map_err(|_| ConfigError::BadValue {
                key: "flow_method".to_string(),
                value: v.clone(),
            })?,
        };

        let params = Params {
            mapsize: get_usize(settings, "mapsize", defaults.mapsize)?,
            seed: get_u64(settings, "seed", defaults.seed)?,
            scale: get_f32(settings, "scale", defaults.scale)?,
            vscale: get_f32(settings, "vscale", defaults.vscale)?,
            offset: get_f32(settings, "offset", defaults.offset)?,
            persistence: get_f32(settings, "persistence", defaults.persistence)?,
            lacunarity: get_f32(settings, "lacunarity", defaults.lacunarity)?,
            k: get_f32(settings, "K", defaults.k)?,
            m: get_f32(settings, "m", defaults.m)?,
            d: get_f32(settings, "d", defaults.d)?,
            sea_level: get_f32(settings, "sea_level", defaults.sea_level)?,
            sea_level_variations: get_f32(
                settings,
                "sea_level_variations",
                defaults.sea_level_variations,
            )?,
            sea_level_variations_time: get_f32(
                settings,
                "sea_level_variations_time",
                defaults.sea_level_variations_time,
            )?,
            flex_radius: get_f32(settings, "flex_radius", defaults.flex_radius)?,
            flow_method,
            time: get_f32(settings, "time", defaults.time)?,
            niter: get_usize(settings, "niter", defaults.niter)?,
        };

        if params.mapsize == 0 {
            return Err(ConfigError::NonPositive { key: "mapsize" });
        }
        if params.niter == 0 {
            return Err(ConfigError::NonPositive { key: "niter" });
        }
        if !(params.time > 0.0) {
            return Err(ConfigError::NonPositive { key: "time" });
        }

        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_split_on_first_equals() {
        let settings = parse_settings("mapsize = 200\ncomment line\nname = a=b\n  K=1.5");
        assert_eq!(settings.get("mapsize").unwrap(), "200");
        assert_eq!(settings.get("name").unwrap(), "a=b");
        assert_eq!(settings.get("K").unwrap(), "1.5");
        assert_eq!(settings.len(), 3);
    }

    #[test]
    fn cli_overrides_and_positionals() {
        let args = [
            "my.conf",
            "out",
            "--mapsize",
            "64",
            "--K=2.0",
            "--output=elsewhere",
        ];
        let cli = parse_cli(args.iter().map(|s| s.to_string()));
        assert_eq!(cli.config_path, PathBuf::from("my.conf"));
        assert_eq!(cli.output_dir, PathBuf::from("elsewhere"));
        assert_eq!(
            cli.overrides,
            vec![
                ("mapsize".to_string(), "64".to_string()),
                ("K".to_string(), "2.0".to_string())
            ]
        );
    }

    #[test]
    fn params_validation() {
        let mut settings = HashMap::new();
        settings.insert("mapsize".to_string(), "32".to_string());
        settings.insert("flow_method".to_string(), "priority-flood".to_string());
        let params = Params::from_settings(&settings).unwrap();
        assert_eq!(params.mapsize, 32);
        assert_eq!(params.flow_method, FlowMethod::PriorityFlood);
        assert_eq!(params.k, 0.5);

        settings.insert("niter".to_string(), "0".to_string());
        assert!(Params::from_settings(&settings).is_err());

        settings.insert("niter".to_string(), "ten".to_string());
        assert!(Params::from_settings(&settings).is_err());
    }
}
