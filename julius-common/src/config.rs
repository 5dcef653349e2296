//! Configuration loading and output folder resolution
//!
//! Resolution order for the output folder:
//! 1. Command-line argument (highest priority)
//! 2. `JULIUS_OUTPUT_DIR` environment variable
//! 3. `output_dir` in the TOML config file
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or unreadable TOML file never stops a run: it is logged and the
//! compiled defaults are used instead.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable overriding the output folder
pub const OUTPUT_DIR_ENV: &str = "JULIUS_OUTPUT_DIR";

/// Environment variable overriding the config file location
pub const CONFIG_PATH_ENV: &str = "JULIUS_CONFIG";

/// Logging section of the TOML config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set (e.g. "info", "julius_engine=debug")
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Optional log file path (stdout when absent)
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_file: None,
        }
    }
}

/// Shared TOML configuration (`~/.config/julius/config.toml`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Folder receiving the output tables
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Compiled defaults used when nothing else is configured
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub output_dir: PathBuf,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        let output_dir = dirs::data_local_dir()
            .map(|d| d.join("julius").join("reports"))
            .unwrap_or_else(|| PathBuf::from("./julius_reports"));

        Self {
            output_dir,
            log_level: default_log_level(),
            log_file: None,
        }
    }
}

/// Default config file path for the platform, honouring `JULIUS_CONFIG`
pub fn default_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    dirs::config_dir().map(|d| d.join("julius").join("config.toml"))
}

/// Load TOML config from `path`
///
/// Missing file → defaults with an info log. Unparseable file → defaults with a
/// warning. Only a read failure on an existing file is reported as an error.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        info!("Config file {} not found, using compiled defaults", path.display());
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    match toml::from_str::<TomlConfig>(&content) {
        Ok(config) => {
            debug!("Loaded config from {}", path.display());
            Ok(config)
        }
        Err(e) => {
            warn!(
                "Config file {} could not be parsed ({}), using compiled defaults",
                path.display(),
                e
            );
            Ok(TomlConfig::default())
        }
    }
}

/// Write TOML config atomically (temp file + rename)
///
/// On unix the file is created with 0600 permissions.
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    std::fs::write(&temp_path, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o600))?;
    }

    if let Err(e) = std::fs::rename(&temp_path, path) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(Error::Io(e));
    }

    Ok(())
}

/// Resolves the output folder using CLI → ENV → TOML → default priority
pub struct OutputFolderResolver {
    cli_arg: Option<PathBuf>,
    toml_config: TomlConfig,
}

impl OutputFolderResolver {
    pub fn new(cli_arg: Option<PathBuf>, toml_config: TomlConfig) -> Self {
        Self {
            cli_arg,
            toml_config,
        }
    }

    pub fn resolve(&self) -> PathBuf {
        // Priority 1: Command-line argument
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(OUTPUT_DIR_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        // Priority 3: TOML config file
        if let Some(path) = &self.toml_config.output_dir {
            return path.clone();
        }

        // Priority 4: OS-dependent compiled default
        CompiledDefaults::for_current_platform().output_dir
    }
}

/// Create the output folder if missing
pub fn ensure_directory_exists(path: &Path) -> Result<()> {
    if path.exists() {
        if !path.is_dir() {
            return Err(Error::InvalidInput(format!(
                "Output path exists but is not a directory: {}",
                path.display()
            )));
        }
        return Ok(());
    }

    std::fs::create_dir_all(path)?;
    info!("Created output folder: {}", path.display());
    Ok(())
}
