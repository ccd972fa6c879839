//! Layered plugin-configuration resolution.
//!
//! A conversion request names a plugin (a document template such as `cv` or
//! `recipe`). Up to seven configuration layers can contribute to the final
//! config for that plugin, lowest to highest precedence:
//!
//! 1. The plugin's own base config (`<plugin>/<plugin>.config.yaml`)
//! 2. XDG per-plugin override file (`<config_dir>/<name>/<name>.config.yaml`)
//! 3. Inline block under the plugin's name in the XDG main config
//! 4. Project override file named by `plugins.<name>` in the project config
//! 5. Inline block under the plugin's name in the project config
//! 6. Global settings (`global_pdf_options`, `math`) merged *underneath*
//!    the plugin's own `pdf_options` / `math`
//! 7. Local overrides from front matter or a sibling `<stem>.config.yaml`
//!
//! # Architecture
//!
//! - [`PluginRegistryBuilder`]: discovers plugins (bundled, installed
//!   manifest, XDG `plugins:` map, project `plugins:` map)
//! - [`PluginConfigLoader`]: applies the four override layers
//! - [`ConfigResolver`]: orchestrates both, merges globals and local
//!   overrides, validates assets, memoizes per request
//!
//! Everything here is best-effort: a broken *optional* layer degrades to an
//! empty contribution with a warning. Only an unresolvable plugin spec or a
//! missing handler script is fatal, surfaced as [`ResolveError`].

pub mod loader;
pub mod main_config;
pub mod merge;
pub mod registry;
pub mod resolver;
pub mod types;

pub use loader::{OverrideOutcome, PluginConfigLoader};
pub use main_config::{LoadedMainConfig, MainConfig, MainConfigLoader};
pub use registry::{PluginDetails, PluginRegistryBuilder, RegistryEntry, RegistrySource};
pub use resolver::{ConfigFileSources, ConfigResolver, EffectiveConfig, LocalOverrides};
pub use types::{ConfigLayer, MarginOptions, MathConfig, PdfOptions, PluginConfigData};

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Fatal resolution failures.
///
/// Everything else in this module (malformed override layers, missing CSS
/// files, broken registry sources) is absorbed with a warning; these cross
/// the component boundary and abort the single conversion request.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("plugin spec '{spec}' is neither a registered plugin, nor a file, nor a directory")]
    UnknownSpec { spec: String },

    #[error("plugin '{name}' not found at registered path {}", path.display())]
    NotFoundAtRegisteredPath { name: String, path: PathBuf },

    #[error("no *.config.yaml found in plugin directory {}", dir.display())]
    NoConfigInDir { dir: PathBuf },

    #[error("ambiguous plugin directory {}: found {count} *.config.yaml candidates", dir.display())]
    AmbiguousConfigInDir { dir: PathBuf, count: usize },

    #[error("Handler script '{}' not found", path.display())]
    HandlerScriptMissing { path: PathBuf },
}

/// Filesystem roots for every configuration source.
///
/// Constructed once in `main` (or directly by tests); passed by reference to
/// the registry builder, loader and resolver. No process-wide singletons.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    /// Directory of plugins shipped with the tool (`plugins/<name>/...`).
    pub bundled_plugins_root: PathBuf,
    /// Main config shipped next to the bundled plugins, used when the user
    /// has no XDG or project config.
    pub bundled_main_config: PathBuf,
    /// XDG config dir; holds `config.yaml` and per-plugin override dirs.
    pub xdg_config_dir: PathBuf,
    /// Root the installer writes collections into; holds `plugins.yaml`.
    pub collections_root: PathBuf,
    /// Project config file from `--config`, if given.
    pub project_config: Option<PathBuf>,
}

impl ConfigPaths {
    /// Resolve all roots from the environment.
    ///
    /// Each root has an env override so tests and sandboxed installs can
    /// relocate it: `MDPRESS_BUNDLED_PLUGINS`, `MDPRESS_CONFIG_DIR`,
    /// `MDPRESS_COLLECTIONS_ROOT`.
    pub fn from_env(project_config: Option<PathBuf>) -> Self {
        let bundled_plugins_root = std::env::var_os("MDPRESS_BUNDLED_PLUGINS")
            .map_or_else(default_bundled_root, PathBuf::from);

        let bundled_main_config = bundled_plugins_root
            .parent()
            .unwrap_or(Path::new("."))
            .join("config.example.yaml");

        let xdg_config_dir = std::env::var_os("MDPRESS_CONFIG_DIR").map_or_else(
            || {
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("mdpress")
            },
            PathBuf::from,
        );

        let collections_root = std::env::var_os("MDPRESS_COLLECTIONS_ROOT").map_or_else(
            || {
                dirs::data_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("mdpress")
                    .join("collections")
            },
            PathBuf::from,
        );

        Self {
            bundled_plugins_root,
            bundled_main_config,
            xdg_config_dir,
            collections_root,
            project_config,
        }
    }

    /// Path of the XDG main config file (may not exist).
    #[must_use]
    pub fn xdg_main_config(&self) -> PathBuf {
        self.xdg_config_dir.join("config.yaml")
    }

    /// Path of the installed-plugins manifest (may not exist).
    #[must_use]
    pub fn installed_manifest(&self) -> PathBuf {
        self.collections_root.join("plugins.yaml")
    }
}

/// Bundled plugins when no env override is set: `plugins/` next to the
/// executable, falling back to the source tree for `cargo run` / tests.
fn default_bundled_root() -> PathBuf {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let candidate = dir.join("plugins");
            if candidate.is_dir() {
                return candidate;
            }
        }
    }
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("plugins")
}

/// Resolve a path value found in a config file.
///
/// Absolute paths pass through, `~/` expands against the home directory,
/// anything else resolves relative to the directory of the file that
/// declared it.
#[must_use]
pub fn resolve_path_value(value: &str, declaring_dir: &Path) -> PathBuf {
    let expanded = expand_tilde(value);
    if expanded.is_absolute() {
        expanded
    } else {
        declaring_dir.join(expanded)
    }
}

/// Expand a leading `~/` against the home directory.
#[must_use]
pub fn expand_tilde(value: &str) -> PathBuf {
    if let Some(rest) = value.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(value)
}

/// Find the single plugin config file inside a plugin directory.
///
/// Convention: `<dirname>.config.yaml` wins if present; otherwise there must
/// be exactly one `*.config.yaml` in the directory. Zero or several
/// candidates is a discovery error.
pub fn find_config_in_dir(dir: &Path) -> Result<PathBuf, ResolveError> {
    if let Some(name) = dir.file_name().and_then(|n| n.to_str()) {
        let preferred = dir.join(format!("{name}.config.yaml"));
        if preferred.is_file() {
            return Ok(preferred);
        }
    }

    let mut candidates: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|_| ResolveError::NoConfigInDir { dir: dir.to_path_buf() })?
        .filter_map(std::result::Result::ok)
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(".config.yaml"))
        })
        .collect();

    match candidates.len() {
        0 => Err(ResolveError::NoConfigInDir { dir: dir.to_path_buf() }),
        1 => Ok(candidates.remove(0)),
        n => Err(ResolveError::AmbiguousConfigInDir { dir: dir.to_path_buf(), count: n }),
    }
}
