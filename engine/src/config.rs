//! Runtime knobs of the renderer.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("frames in flight must be at least 1")]
    NoFramesInFlight,
    #[error("at least one texture is required")]
    NoTextures,
    #[error("upload timeout must be non-zero")]
    ZeroUploadTimeout,
}

#[derive(Clone, Debug)]
pub struct RendererConfig {
    /// Directory the shader bytecode and textures are read from.
    pub asset_root: PathBuf,
    /// Logical paths of the textures bound to the fragment shader, in binding order.
    pub textures: Vec<String>,
    /// Number of semaphore/fence slots. One serializes host and device on every frame.
    pub frames_in_flight: usize,
    pub clear_color: [f32; 4],
    /// Nanoseconds to wait for a presentable image.
    pub acquire_timeout: u64,
    /// Nanoseconds to wait for a frame's fence.
    pub fence_timeout: u64,
    /// Nanoseconds to wait for the one-shot texture upload.
    pub upload_timeout: u64,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            asset_root: PathBuf::from("assets"),
            textures: vec!["sample_tex.png".to_string()],
            frames_in_flight: 1,
            clear_color: [0.0, 0.34, 0.90, 1.0],
            acquire_timeout: u64::MAX,
            fence_timeout: u64::MAX,
            upload_timeout: 100_000_000,
        }
    }
}

impl RendererConfig {
    pub fn with_asset_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.asset_root = root.into();
        self
    }

    pub fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.frames_in_flight = frames;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frames_in_flight == 0 {
            return Err(ConfigError::NoFramesInFlight);
        }
        if self.textures.is_empty() {
            return Err(ConfigError::NoTextures);
        }
        if self.upload_timeout == 0 {
            return Err(ConfigError::ZeroUploadTimeout);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_single_buffered_and_valid() {
        let config = RendererConfig::default();
        assert_eq!(config.frames_in_flight, 1);
        assert_eq!(config.textures, vec!["sample_tex.png".to_string()]);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn zero_frames_in_flight_is_rejected() {
        let config = RendererConfig::default().with_frames_in_flight(0);
        assert_eq!(config.validate(), Err(ConfigError::NoFramesInFlight));
    }

    #[test]
    fn empty_texture_list_is_rejected() {
        let mut config = RendererConfig::default();
        config.textures.clear();
        assert_eq!(config.validate(), Err(ConfigError::NoTextures));
    }

    #[test]
    fn asset_root_can_be_overridden() {
        let config = RendererConfig::default().with_asset_root("/tmp/assets");
        assert_eq!(config.asset_root, PathBuf::from("/tmp/assets"));
    }
}
