//! Read-only access to shader bytecode and texture files.

use std::fs;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("asset `{0}` not found")]
    NotFound(String),
    #[error("failed to read asset `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to decode image `{path}`: {reason}")]
    Decode { path: String, reason: String },
}

/// Synchronous, whole-file reads keyed by a logical path.
pub trait AssetSource {
    fn read(&self, path: &str) -> Result<Vec<u8>, AssetError>;
}

/// Assets stored as plain files under a root directory.
#[derive(Clone, Debug)]
pub struct DirectoryAssets {
    root: PathBuf,
}

impl DirectoryAssets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl AssetSource for DirectoryAssets {
    fn read(&self, path: &str) -> Result<Vec<u8>, AssetError> {
        let full = self.root.join(path);
        fs::read(&full).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                AssetError::NotFound(full.display().to_string())
            } else {
                AssetError::Io {
                    path: full.display().to_string(),
                    source,
                }
            }
        })
    }
}

/// A decoded image with tightly packed RGBA8 rows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RgbaImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RgbaImage {
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let offset = ((y * self.width + x) * 4) as usize;
        let mut pixel = [0; 4];
        pixel.copy_from_slice(&self.pixels[offset..offset + 4]);
        pixel
    }
}

/// Decodes a PNG, expanding grayscale, RGB and palette images to RGBA8.
pub fn decode_png(path: &str, bytes: &[u8]) -> Result<RgbaImage, AssetError> {
    let decode_error = |reason: String| AssetError::Decode {
        path: path.to_string(),
        reason,
    };

    let mut decoder = png::Decoder::new(bytes);
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
    let mut reader = decoder.read_info().map_err(|e| decode_error(e.to_string()))?;

    let mut buffer = vec![0; reader.output_buffer_size()];
    let info = reader
        .next_frame(&mut buffer)
        .map_err(|e| decode_error(e.to_string()))?;
    buffer.truncate(info.buffer_size());

    let pixels = match info.color_type {
        png::ColorType::Rgba => buffer,
        png::ColorType::Rgb => buffer
            .chunks_exact(3)
            .flat_map(|p| [p[0], p[1], p[2], 255])
            .collect(),
        png::ColorType::GrayscaleAlpha => buffer
            .chunks_exact(2)
            .flat_map(|p| [p[0], p[0], p[0], p[1]])
            .collect(),
        png::ColorType::Grayscale => buffer.iter().flat_map(|&g| [g, g, g, 255]).collect(),
        other => return Err(decode_error(format!("unsupported color type {:?}", other))),
    };

    Ok(RgbaImage {
        width: info.width,
        height: info.height,
        pixels,
    })
}
