use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chunker_core::{ChunkFormat, ChunkStoreConfig};
use clap::Args;
use serde::Deserialize;
use ulid::Ulid;

/// location of the config file, relative to $HOME
const CONFIG_PATH: &str = ".config/chunker/config.toml";

const TEMP_DIR_ENV: &str = "CHUNKER_TEMP_DIR";
const MAX_CHUNK_SIZE_ENV: &str = "CHUNKER_MAX_CHUNK_SIZE";

/// Contents of the config file
#[derive(Deserialize, Default, Debug)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    store: ChunkStoreConfig,
}

/// Command line settings for a chunk store
#[derive(Args, Debug, Default)]
pub struct StoreArgs {
    /// Name of the spool. A unique suffix is appended so that concurrent
    /// runs do not share chunk files.
    #[arg(long)]
    pub name: Option<String>,

    /// Directory for chunk files
    #[arg(long)]
    pub temp_dir: Option<PathBuf>,

    /// Maximum number of records held in memory
    #[arg(long, short)]
    pub max_chunk_size: Option<usize>,

    /// Write chunks without compression
    #[arg(long)]
    pub no_compress: bool,

    /// Write chunks without a frame header
    #[arg(long)]
    pub raw: bool,

    /// Keep chunk files after they have been read
    #[arg(long)]
    pub keep: bool,

    /// Path to a config file. Defaults to $HOME/.config/chunker/config.toml
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl StoreArgs {
    /// Resolve the final store configuration. Command line arguments take
    /// precedence over environment variables, which take precedence over
    /// the config file.
    pub fn resolve(&self) -> Result<ChunkStoreConfig> {
        let config = match &self.config {
            Some(path) => load_config_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => load_config_file(&path)?,
                _ => ChunkStoreConfig::default(),
            },
        };
        let config = apply_env(config, |key| std::env::var(key).ok())?;
        Ok(self.apply(config))
    }

    fn apply(&self, mut config: ChunkStoreConfig) -> ChunkStoreConfig {
        let prefix = self.name.as_deref().unwrap_or(config.name()).to_string();
        config = config.with_name(format!("{}-{}", prefix, Ulid::new().to_string().to_lowercase()));
        if let Some(temp_dir) = &self.temp_dir {
            config = config.with_temp_dir(temp_dir);
        }
        if let Some(max_chunk_size) = self.max_chunk_size {
            config = config.with_max_chunk_size(max_chunk_size);
        }
        if self.no_compress {
            config = config.with_compress(false);
        }
        if self.raw {
            config = config.with_format(ChunkFormat::Raw);
        }
        if self.keep {
            config = config.with_auto_remove(false);
        }
        config
    }
}

fn default_config_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| Path::new(&home).join(CONFIG_PATH))
}

/// Read the `[store]` table of a config file
fn load_config_file(path: &Path) -> Result<ChunkStoreConfig> {
    let file = std::fs::read_to_string(path)
        .with_context(|| format!("unable to read configuration file at {:?}", path))?;
    let contents: ConfigFile = toml::from_str(&file).context("configuration malformed")?;
    Ok(contents.store)
}

/// Override settings with environment variables
fn apply_env<F>(mut config: ChunkStoreConfig, var: F) -> Result<ChunkStoreConfig>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(temp_dir) = var(TEMP_DIR_ENV) {
        config = config.with_temp_dir(temp_dir);
    }
    if let Some(max_chunk_size) = var(MAX_CHUNK_SIZE_ENV) {
        let max_chunk_size = max_chunk_size
            .parse()
            .with_context(|| format!("{MAX_CHUNK_SIZE_ENV} must be a number: {max_chunk_size}"))?;
        config = config.with_max_chunk_size(max_chunk_size);
    }
    Ok(config)
}
