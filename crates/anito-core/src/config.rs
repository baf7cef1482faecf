// SPDX-License-Identifier: CEPL-1.0
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_CONFIG_PATH: &str = "anito.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppCfg {
    pub window: WindowCfg,
    pub render: RenderCfg,
    pub mesh: MeshCfg,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WindowCfg {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct RenderCfg {
    pub clear_color: [f32; 4],
    pub vsync_mode: VsyncMode,
    pub image_count: u32,
    pub validation: bool,
    pub min_api_version: [u32; 2],
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct MeshCfg {
    pub model: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VsyncMode {
    #[default]
    Fifo,
    Mailbox,
    Immediate,
}

impl Default for WindowCfg {
    fn default() -> Self {
        WindowCfg {
            title: "Anito3D Benchmark Sandbox".to_owned(),
            width: 1280,
            height: 720,
        }
    }
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            clear_color: default_clear(),
            vsync_mode: VsyncMode::Fifo,
            image_count: 2,
            validation: cfg!(debug_assertions),
            min_api_version: [1, 3],
        }
    }
}

fn default_clear() -> [f32; 4] {
    [0.3, 0.3, 0.3, 1.0]
}

impl AppCfg {
    pub fn from_toml(src: &str) -> Result<Self, toml::de::Error> {
        let mut cfg: AppCfg = toml::from_str(src)?;
        cfg.render.image_count = cfg.render.image_count.max(2);
        Ok(cfg)
    }
}

pub fn load_config(path: &Path) -> Result<AppCfg, ConfigError> {
    let src = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_owned(),
        source,
    })?;
    AppCfg::from_toml(&src).map_err(|source| ConfigError::Parse {
        path: path.to_owned(),
        source,
    })
}

/// Missing file means defaults; a malformed file is reported and also
/// falls back to defaults.
pub fn load_config_or_default(path: &Path) -> AppCfg {
    match load_config(path) {
        Ok(cfg) => {
            info!("config loaded from {}", path.display());
            cfg
        }
        Err(ConfigError::Io { .. }) => AppCfg::default(),
        Err(e) => {
            warn!("{e}; using defaults");
            AppCfg::default()
        }
    }
}
