use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use crate::grid::Grid;

// Raster layers are headerless binary files: elevations as big-endian i16,
// directions as u8, discharge as big-endian u32, vertex offsets as i8
// (displacement * 256). Each file is zlib-compressed iff that makes it
// strictly smaller; readers tell the two apart by the file length.

#[derive(Debug, thiserror::Error)]
pub enum LayerError {
    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{path} holds {got} bytes, expected {want}")]
    Size {
        path: PathBuf,
        got: usize,
        want: usize,
    },
    #[error("malformed size file {path}")]
    SizeFile { path: PathBuf },
}

/// Elevations truncate toward zero into the signed 16-bit range.
pub fn encode_elevation(grid: &Grid<f32>) -> Vec<u8> {
    let mut out = Vec::with_capacity(grid.data.len() * 2);
    for &v in &grid.data {
        out.extend_from_slice(&(v as i16).to_be_bytes());
    }
    out
}

pub fn decode_elevation(bytes: &[u8], w: usize, h: usize) -> Grid<f32> {
    let data = bytes
        .chunks_exact(2)
        .map(|c| i16::from_be_bytes([c[0], c[1]]) as f32)
        .collect();
    Grid::from_vec(w, h, data)
}

pub fn encode_dirs(grid: &Grid<u8>) -> Vec<u8> {
    grid.data.clone()
}

pub fn decode_dirs(bytes: &[u8], w: usize, h: usize) -> Grid<u8> {
    Grid::from_vec(w, h, bytes.to_vec())
}

pub fn encode_rivers(grid: &Grid<u32>) -> Vec<u8> {
    let mut out = Vec::with_capacity(grid.data.len() * 4);
    for &v in &grid.data {
        out.extend_from_slice(&v.to_be_bytes());
    }
    out
}

pub fn decode_rivers(bytes: &[u8], w: usize, h: usize) -> Grid<u32> {
    let data = bytes
        .chunks_exact(4)
        .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    Grid::from_vec(w, h, data)
}

/// Vertex offsets are fractions of a cell: floor(v * 256) clipped to the
/// signed byte range.
pub fn encode_offsets(grid: &Grid<f32>) -> Vec<u8> {
    grid.data
        .iter()
        .map(|&v| ((v * 256.0).floor().clamp(-128.0, 127.0) as i8) as u8)
        .collect()
}

pub fn decode_offsets(bytes: &[u8], w: usize, h: usize) -> Grid<f32> {
    let data = bytes
        .iter()
        .map(|&b| (b as i8) as f32 / 256.0)
        .collect();
    Grid::from_vec(w, h, data)
}

/// Write one raster, compressed iff strictly smaller than the raw bytes.
pub fn write_layer(dir: &Path, name: &str, raw: &[u8]) -> Result<(), LayerError> {
    let path = dir.join(name);
    let write_err = |source| LayerError::Write {
        path: path.clone(),
        source,
    };

    let mut enc = ZlibEncoder::new(Vec::new(), Compression::best());
    enc.write_all(raw).map_err(write_err)?;
    let compressed = enc.finish().map_err(write_err)?;

    let bytes: &[u8] = if compressed.len() < raw.len() {
        &compressed
    } else {
        raw
    };
    std::fs::write(&path, bytes).map_err(write_err)
}

/// Read one raster back, inflating when the on-disk length differs from the
/// expected raw size.
pub fn read_layer(dir: &Path, name: &str, expected: usize) -> Result<Vec<u8>, LayerError> {
    let path = dir.join(name);
    let bytes = std::fs::read(&path).map_err(|source| LayerError::Read {
        path: path.clone(),
        source,
    })?;
    if bytes.len() == expected {
        return Ok(bytes);
    }
    let mut raw = Vec::with_capacity(expected);
    ZlibDecoder::new(&bytes[..])
        .read_to_end(&mut raw)
        .map_err(|source| LayerError::Read {
            path: path.clone(),
            source,
        })?;
    if raw.len() != expected {
        return Err(LayerError::Size {
            path,
            got: raw.len(),
            want: expected,
        });
    }
    Ok(raw)
}

/// The `size` file carries height and width as two decimal lines, never
/// compressed.
pub fn write_size(dir: &Path, h: usize, w: usize) -> Result<(), LayerError> {
    let path = dir.join("size");
    std::fs::write(&path, format!("{h}\n{w}")).map_err(|source| LayerError::Write { path, source })
}

pub fn read_size(dir: &Path) -> Result<(usize, usize), LayerError> {
    let path = dir.join("size");
    let text = std::fs::read_to_string(&path).map_err(|source| LayerError::Read {
        path: path.clone(),
        source,
    })?;
    let mut lines = text.lines();
    let parse = |s: Option<&str>| s.and_then(|v| v.trim().parse::<usize>().ok());
    match (parse(lines.next()), parse(lines.next())) {
        (Some(h), Some(w)) => Ok((h, w)),
        _ => Err(LayerError::SizeFile { path }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("rivergen-save-{tag}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn elevation_truncates_toward_zero() {
        let grid = Grid::from_vec(2, 2, vec![1.9, -1.9, 300.5, -0.2]);
        let bytes = encode_elevation(&grid);
        let back = decode_elevation(&bytes, 2, 2);
        assert_eq!(back.data, vec![1.0, -1.0, 300.0, 0.0]);
    }

    #[test]
    fn offsets_clip_to_signed_byte() {
        let grid = Grid::from_vec(3, 1, vec![0.25, -0.75, 0.4999]);
        let bytes = encode_offsets(&grid);
        assert_eq!(bytes[0] as i8, 64);
        assert_eq!(bytes[1] as i8, -128); // clipped
        assert_eq!(bytes[2] as i8, 127);
    }

    #[test]
    fn layers_round_trip_bitwise() {
        let dir = temp_dir("roundtrip");

        // Compressible payload (all equal) and incompressible-ish payload.
        let rivers = Grid::<u32>::new_with(32, 32, 3);
        let mut dirs = Grid::<u8>::new(32, 32);
        for (i, v) in dirs.data.iter_mut().enumerate() {
            *v = (i % 5) as u8;
        }

        let raw_rivers = encode_rivers(&rivers);
        let raw_dirs = encode_dirs(&dirs);
        write_layer(&dir, "rivers", &raw_rivers).unwrap();
        write_layer(&dir, "dirs", &raw_dirs).unwrap();

        // The uniform raster must actually have been stored compressed.
        let on_disk = std::fs::metadata(dir.join("rivers")).unwrap().len() as usize;
        assert!(on_disk < raw_rivers.len());

        assert_eq!(read_layer(&dir, "rivers", raw_rivers.len()).unwrap(), raw_rivers);
        assert_eq!(read_layer(&dir, "dirs", raw_dirs.len()).unwrap(), raw_dirs);
        assert_eq!(decode_rivers(&raw_rivers, 32, 32).data, rivers.data);
        assert_eq!(decode_dirs(&raw_dirs, 32, 32).data, dirs.data);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn size_file_round_trips() {
        let dir = temp_dir("size");
        write_size(&dir, 33, 33).unwrap();
        assert_eq!(std::fs::read_to_string(dir.join("size")).unwrap(), "33\n33");
        assert_eq!(read_size(&dir).unwrap(), (33, 33));
        std::fs::remove_dir_all(&dir).ok();
    }
}
