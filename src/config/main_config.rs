//! Process-wide ("main") configuration.
//!
//! Three files can carry main-level settings: the project config passed via
//! `--config`, the XDG user config, and the defaults bundled with the tool.
//! The *primary* config is the highest-precedence one that exists
//! (project > XDG > bundled > built-in factory defaults); the XDG and
//! project configs are additionally consulted individually by the override
//! layers and the registry builder, so each is loaded and cached on its own.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_yml::Mapping;
use tokio::sync::OnceCell;
use tracing::warn;

use super::types::{MathConfig, PdfOptions};
use super::ConfigPaths;

/// Parsed main config file.
///
/// Inline per-plugin override blocks (a top-level key named after a plugin)
/// and any other unrecognized keys land in `rest`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MainConfig {
    #[serde(default, skip_serializing_if = "PdfOptions::is_default_shape")]
    pub global_pdf_options: PdfOptions,

    #[serde(default, skip_serializing_if = "MathConfig::is_default_shape")]
    pub math: MathConfig,

    /// Parameters substituted into every document.
    #[serde(default, skip_serializing_if = "Mapping::is_empty")]
    pub params: Mapping,

    /// Plugin registrations: name → config path (file or plugin directory),
    /// relative paths resolve against this file's directory.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub plugins: BTreeMap<String, String>,

    #[serde(flatten)]
    pub rest: Mapping,
}

impl MainConfig {
    /// Inline override block for `plugin_name`, if this file embeds one.
    #[must_use]
    pub fn inline_block(&self, plugin_name: &str) -> Option<&Mapping> {
        self.rest.get(plugin_name).and_then(serde_yml::Value::as_mapping)
    }
}

/// A main config plus where it came from, for diagnostic display.
#[derive(Debug, Clone)]
pub struct LoadedMainConfig {
    pub config: MainConfig,
    /// `None` for built-in factory defaults.
    pub path: Option<PathBuf>,
    pub load_reason: &'static str,
}

impl LoadedMainConfig {
    fn factory_defaults() -> Self {
        Self { config: MainConfig::default(), path: None, load_reason: "factory defaults" }
    }

    /// Directory containing the config file; used to resolve relative paths
    /// declared inside it.
    #[must_use]
    pub fn dir(&self) -> PathBuf {
        self.path
            .as_deref()
            .and_then(Path::parent)
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
    }
}

/// Loads and caches the main configs. Each file is read at most once per
/// loader instance; concurrent first calls share the same in-flight load.
#[derive(Debug)]
pub struct MainConfigLoader {
    paths: ConfigPaths,
    factory_defaults_only: bool,
    primary: OnceCell<LoadedMainConfig>,
    xdg: OnceCell<LoadedMainConfig>,
    project: OnceCell<Option<LoadedMainConfig>>,
}

impl MainConfigLoader {
    #[must_use]
    pub fn new(paths: ConfigPaths, factory_defaults_only: bool) -> Self {
        Self {
            paths,
            factory_defaults_only,
            primary: OnceCell::new(),
            xdg: OnceCell::new(),
            project: OnceCell::new(),
        }
    }

    /// The single authoritative main config for this run.
    pub async fn primary(&self) -> &LoadedMainConfig {
        self.primary.get_or_init(|| self.load_primary()).await
    }

    /// The XDG main config; empty defaults when the file is absent.
    pub async fn xdg(&self) -> &LoadedMainConfig {
        self.xdg
            .get_or_init(|| async {
                let path = self.paths.xdg_main_config();
                LoadedMainConfig {
                    config: read_or_degrade(&path).await,
                    path: Some(path),
                    load_reason: "XDG config",
                }
            })
            .await
    }

    /// The project config named by `--config`, if one was given.
    pub async fn project_manifest(&self) -> Option<&LoadedMainConfig> {
        self.project
            .get_or_init(|| async {
                let path = self.paths.project_config.clone()?;
                Some(LoadedMainConfig {
                    config: read_or_degrade(&path).await,
                    path: Some(path),
                    load_reason: "project (--config)",
                })
            })
            .await
            .as_ref()
    }

    async fn load_primary(&self) -> LoadedMainConfig {
        if self.factory_defaults_only {
            return LoadedMainConfig::factory_defaults();
        }

        if let Some(project) = &self.paths.project_config {
            return LoadedMainConfig {
                config: read_or_degrade(project).await,
                path: Some(project.clone()),
                load_reason: "project (--config)",
            };
        }

        let xdg = self.paths.xdg_main_config();
        if xdg.is_file() {
            return LoadedMainConfig {
                config: read_or_degrade(&xdg).await,
                path: Some(xdg),
                load_reason: "XDG config",
            };
        }

        let bundled = &self.paths.bundled_main_config;
        if bundled.is_file() {
            return LoadedMainConfig {
                config: read_or_degrade(bundled).await,
                path: Some(bundled.clone()),
                load_reason: "bundled defaults",
            };
        }

        LoadedMainConfig::factory_defaults()
    }
}

/// Read and parse a main config file. A missing or malformed file degrades
/// to empty defaults with a warning; it is never fatal.
async fn read_or_degrade(path: &Path) -> MainConfig {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) => {
            warn!("Could not read config {}: {e}", path.display());
            return MainConfig::default();
        }
    };

    match serde_yml::from_str(&text) {
        Ok(config) => config,
        Err(e) => {
            warn!("Invalid YAML in {}: {e}", path.display());
            MainConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths_in(dir: &Path) -> ConfigPaths {
        ConfigPaths {
            bundled_plugins_root: dir.join("bundled"),
            bundled_main_config: dir.join("config.example.yaml"),
            xdg_config_dir: dir.join("xdg"),
            collections_root: dir.join("collections"),
            project_config: None,
        }
    }

    #[tokio::test]
    async fn falls_back_to_factory_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loader = MainConfigLoader::new(paths_in(dir.path()), false);

        let primary = loader.primary().await;
        assert_eq!(primary.load_reason, "factory defaults");
        assert!(primary.path.is_none());
        assert!(primary.config.plugins.is_empty());
    }

    #[tokio::test]
    async fn project_config_beats_xdg() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("xdg")).unwrap();
        std::fs::write(dir.path().join("xdg/config.yaml"), "params: {source: xdg}").unwrap();
        let project = dir.path().join("project.yaml");
        std::fs::write(&project, "params: {source: project}").unwrap();

        let mut paths = paths_in(dir.path());
        paths.project_config = Some(project.clone());
        let loader = MainConfigLoader::new(paths, false);

        let primary = loader.primary().await;
        assert_eq!(primary.load_reason, "project (--config)");
        assert_eq!(primary.path.as_deref(), Some(project.as_path()));
        assert_eq!(primary.config.params.get("source").unwrap().as_str(), Some("project"));
    }

    #[tokio::test]
    async fn xdg_config_beats_bundled() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("xdg")).unwrap();
        std::fs::write(dir.path().join("xdg/config.yaml"), "params: {source: xdg}").unwrap();
        std::fs::write(dir.path().join("config.example.yaml"), "params: {source: bundled}")
            .unwrap();

        let loader = MainConfigLoader::new(paths_in(dir.path()), false);
        assert_eq!(loader.primary().await.load_reason, "XDG config");
    }

    #[tokio::test]
    async fn factory_defaults_only_ignores_files() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("project.yaml");
        std::fs::write(&project, "params: {source: project}").unwrap();

        let mut paths = paths_in(dir.path());
        paths.project_config = Some(project);
        let loader = MainConfigLoader::new(paths, true);

        assert_eq!(loader.primary().await.load_reason, "factory defaults");
    }

    #[tokio::test]
    async fn malformed_config_degrades_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("xdg")).unwrap();
        std::fs::write(dir.path().join("xdg/config.yaml"), ": not [valid yaml").unwrap();

        let loader = MainConfigLoader::new(paths_in(dir.path()), false);
        let primary = loader.primary().await;
        assert_eq!(primary.load_reason, "XDG config");
        assert!(primary.config.params.is_empty());
    }

    #[test]
    fn inline_block_lookup() {
        let config: MainConfig =
            serde_yml::from_str("cv:\n  pdf_options:\n    format: Letter\nplugins:\n  cv: /x/cv")
                .unwrap();
        assert!(config.inline_block("cv").is_some());
        assert!(config.inline_block("recipe").is_none());
        assert_eq!(config.plugins.get("cv").map(String::as_str), Some("/x/cv"));
    }
}
