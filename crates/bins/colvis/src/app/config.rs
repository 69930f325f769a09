use crate::app::ColvisError;
use base::settings::{SettingsOptions, SettingsPreset};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the user configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "colvis.toml";

/// Output directory used when the user doesn't set one, relative to the
/// working directory.
pub const DEFAULT_OUTPUT_DIR: &str = "Saved/CollisionVis";

/// Collision visualiser configuration.
#[derive(Debug)]
pub struct Config {
    /// Current working directory (where the user started the program).
    /// Used in case [`UserConfig::output_dir`] is not defined.
    pub(crate) cwd: PathBuf,

    /// User-defined configuration.
    pub(crate) user: UserConfig,
}

/// Options configured by user.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    /// Path to the user-defined output directory.
    /// If not set, [`DEFAULT_OUTPUT_DIR`] is used.
    pub output_dir: Option<PathBuf>,

    /// Scene traced when the command doesn't name one.
    pub scene: Option<PathBuf>,

    /// Preset applied over the query options of `settings`.
    pub preset: Option<SettingsPreset>,

    /// Visualisation settings.
    pub settings: SettingsOptions,
}

impl UserConfig {
    /// Load [`UserConfig`] from a .toml file.
    ///
    /// Relative paths are resolved against the directory of the file.
    pub fn load(path: &Path) -> Result<Self, ColvisError> {
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let string = std::fs::read_to_string(path).map_err(|err| {
            ColvisError::from_io_error(
                err,
                format!("Failed to read user configuration file: {}", path.display()),
            )
        })?;
        let mut config = Self::parse(&string).map_err(|err| {
            ColvisError::new(
                format!(
                    "Failed to parse user configuration file: {}",
                    path.display()
                ),
                Some(Box::new(err)),
            )
        })?;
        config.output_dir = config.output_dir.map(|dir| resolve_path(base, &dir));
        config.scene = config.scene.map(|scene| resolve_path(base, &scene));
        log::info!("    - User output directory: {:?}", config.output_dir);
        log::info!("    - User scene: {:?}", config.scene);
        log::info!("    - Preset: {:?}", config.preset);
        log::info!("    - Visualisation: {}", config.settings.vis_type);
        log::info!("    - Sampling: {}", config.settings.sampling);
        Ok(config)
    }

    /// Parses [`UserConfig`] from a TOML string.
    pub fn parse(string: &str) -> Result<Self, toml::de::Error> { toml::from_str(string) }
}

impl Config {
    /// Loads the configuration.
    ///
    /// This function accepts a file path to the user-defined configuration
    /// file. If it's not set, the function tries to load `colvis.toml` from
    /// the current working directory. If the file doesn't exist neither, the
    /// default configuration is used.
    ///
    /// # Arguments
    ///
    /// * `filepath` - Path to the user configuration file.
    pub fn load(filepath: Option<&Path>) -> Result<Self, ColvisError> {
        log::info!("Loading configurations...");
        let cwd = std::env::current_dir().map_err(|err| {
            ColvisError::from_io_error(err, "Failed to get the current working directory")
        })?;
        let user = match filepath {
            Some(path) => UserConfig::load(path)?,
            None => {
                let path = cwd.join(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    UserConfig::load(&path)?
                } else {
                    log::info!("    - No user configuration found, using defaults");
                    UserConfig::default()
                }
            },
        };
        Ok(Self { cwd, user })
    }

    /// Directory where the results are written.
    pub fn output_dir(&self) -> PathBuf {
        self.user
            .output_dir
            .clone()
            .unwrap_or_else(|| self.cwd.join(DEFAULT_OUTPUT_DIR))
    }

    /// Scene configured by the user, if any.
    pub fn scene(&self) -> Option<&Path> { self.user.scene.as_deref() }

    /// Visualisation settings with the preset applied.
    pub fn settings(&self) -> SettingsOptions {
        let mut options = self.user.settings.clone();
        if let Some(preset) = self.user.preset {
            preset.apply(&mut options);
        }
        options
    }
}

/// Resolves `path` against `base` unless it is absolute.
pub(crate) fn resolve_path(base: &Path, path: &Path) -> PathBuf {
    log::trace!("Resolving path: base={}, path={}", base.display(), path.display());
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
