//! Plugin discovery across the four registration sources.
//!
//! Sources are overlaid lowest to highest precedence:
//! Bundled < Installed < XDG global < Project. A later source silently
//! replaces a same-named entry from an earlier one — a project config can
//! shadow a bundled plugin of the same name without any conflict warning.
//! This is deliberate (it is how local template tweaks are expected to
//! work) but worth knowing when a plugin "mysteriously" changes behavior.
//!
//! Discovery is best-effort: a missing or malformed source file, or a
//! registration pointing at an empty/ambiguous directory, degrades to a
//! warning and the offending entry (or source) is skipped. Registrations
//! pointing at a nonexistent *file* are kept — existence is checked at
//! resolution time, not here, so the registry build never has to stat every
//! entry on every run.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use super::main_config::MainConfigLoader;
use super::types::PluginConfigData;
use super::{find_config_in_dir, resolve_path_value, ConfigPaths};

/// Where a registry entry was declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrySource {
    Bundled,
    Installed,
    XdgGlobal,
    ProjectManifest,
}

impl fmt::Display for RegistrySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bundled => write!(f, "Bundled"),
            Self::Installed => write!(f, "Installed"),
            Self::XdgGlobal => write!(f, "XDG"),
            Self::ProjectManifest => write!(f, "Project"),
        }
    }
}

/// One registered plugin. At most one entry per name survives the overlay.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub plugin_name: String,
    /// The plugin's base config file.
    pub config_path: PathBuf,
    /// The file whose contents declared this registration.
    pub defined_in: PathBuf,
    pub source: RegistrySource,
}

/// Read-only listing row for `mdpress plugin list`.
#[derive(Debug, Clone)]
pub struct PluginDetails {
    pub name: String,
    pub description: String,
    pub status: String,
    pub config_path: PathBuf,
}

/// Installed-plugins manifest (`plugins.yaml`), written by the installer.
/// This component only reads it.
#[derive(Debug, Default, Deserialize)]
struct InstalledManifest {
    #[serde(default)]
    plugins: BTreeMap<String, ManifestEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ManifestEntry {
    /// Shorthand: just the config path.
    Path(String),
    Detailed {
        config: String,
        #[serde(default = "default_true")]
        enabled: bool,
    },
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Default)]
struct RegistryData {
    entries: BTreeMap<String, RegistryEntry>,
    /// Installed but disabled: listed as available, never registered.
    disabled_installed: BTreeMap<String, PathBuf>,
}

/// Builds the merged plugin registry. `build` is idempotent and cached;
/// concurrent first calls share one in-flight build.
#[derive(Debug)]
pub struct PluginRegistryBuilder {
    paths: ConfigPaths,
    built: OnceCell<RegistryData>,
}

impl PluginRegistryBuilder {
    #[must_use]
    pub fn new(paths: ConfigPaths) -> Self {
        Self { paths, built: OnceCell::new() }
    }

    /// The merged name → entry registry.
    pub async fn build(
        &self,
        main: &MainConfigLoader,
    ) -> &BTreeMap<String, RegistryEntry> {
        &self.data(main).await.entries
    }

    /// Listing view: every registered plugin plus installed-but-disabled
    /// ones, with descriptions read from their config files. Never mutates
    /// the registry.
    pub async fn plugin_details(&self, main: &MainConfigLoader) -> Vec<PluginDetails> {
        let data = self.data(main).await;
        let mut details = Vec::with_capacity(data.entries.len() + data.disabled_installed.len());

        for entry in data.entries.values() {
            let status = match entry.source {
                RegistrySource::Installed => "Enabled (Installed)".to_string(),
                source => format!("Registered ({source})"),
            };
            details.push(PluginDetails {
                name: entry.plugin_name.clone(),
                description: read_description(&entry.config_path).await,
                status,
                config_path: entry.config_path.clone(),
            });
        }

        for (name, config_path) in &data.disabled_installed {
            if data.entries.contains_key(name) {
                continue;
            }
            details.push(PluginDetails {
                name: name.clone(),
                description: read_description(config_path).await,
                status: "Available (Installed)".to_string(),
                config_path: config_path.clone(),
            });
        }

        details.sort_by(|a, b| a.name.cmp(&b.name));
        details
    }

    async fn data(&self, main: &MainConfigLoader) -> &RegistryData {
        self.built.get_or_init(|| self.build_once(main)).await
    }

    async fn build_once(&self, main: &MainConfigLoader) -> RegistryData {
        let mut data = RegistryData::default();

        self.scan_bundled(&mut data).await;
        self.read_installed_manifest(&mut data).await;

        let xdg = main.xdg().await;
        overlay_config_registrations(
            &mut data,
            &xdg.config.plugins,
            xdg.path.as_deref(),
            RegistrySource::XdgGlobal,
        );

        if let Some(project) = main.project_manifest().await {
            overlay_config_registrations(
                &mut data,
                &project.config.plugins,
                project.path.as_deref(),
                RegistrySource::ProjectManifest,
            );
        }

        debug!("Plugin registry built: {} plugins", data.entries.len());
        data
    }

    /// Lowest-precedence source: every `<dir>/<dir>.config.yaml` under the
    /// bundled plugins root.
    async fn scan_bundled(&self, data: &mut RegistryData) {
        let root = &self.paths.bundled_plugins_root;
        let mut dir = match tokio::fs::read_dir(root).await {
            Ok(dir) => dir,
            Err(e) => {
                warn!("Cannot scan bundled plugins at {}: {e}", root.display());
                return;
            }
        };

        while let Ok(Some(entry)) = dir.next_entry().await {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(String::from) else {
                continue;
            };
            match find_config_in_dir(&path) {
                Ok(config_path) => {
                    data.entries.insert(
                        name.clone(),
                        RegistryEntry {
                            plugin_name: name,
                            defined_in: config_path.clone(),
                            config_path,
                            source: RegistrySource::Bundled,
                        },
                    );
                }
                Err(e) => warn!("Skipping bundled plugin dir {}: {e}", path.display()),
            }
        }
    }

    /// Second source: the installer's `plugins.yaml`. Unlike the config-file
    /// sources, manifest entries are existence-checked here; the manifest
    /// routinely outlives removed collections.
    async fn read_installed_manifest(&self, data: &mut RegistryData) {
        let manifest_path = self.paths.installed_manifest();
        let text = match tokio::fs::read_to_string(&manifest_path).await {
            Ok(text) => text,
            Err(_) => {
                debug!("No installed-plugins manifest at {}", manifest_path.display());
                return;
            }
        };

        let manifest: InstalledManifest = match serde_yml::from_str(&text) {
            Ok(m) => m,
            Err(e) => {
                warn!("Invalid YAML in {}: {e}", manifest_path.display());
                return;
            }
        };

        let manifest_dir = manifest_path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

        for (name, entry) in manifest.plugins {
            let (value, enabled) = match &entry {
                ManifestEntry::Path(p) => (p.as_str(), true),
                ManifestEntry::Detailed { config, enabled } => (config.as_str(), *enabled),
            };
            let config_path = match registration_target(value, &manifest_dir) {
                Ok(p) => p,
                Err(reason) => {
                    warn!("Skipping installed plugin '{name}': {reason}");
                    continue;
                }
            };
            if !config_path.is_file() {
                warn!(
                    "Skipping installed plugin '{name}': config {} does not exist",
                    config_path.display()
                );
                continue;
            }
            if enabled {
                data.entries.insert(
                    name.clone(),
                    RegistryEntry {
                        plugin_name: name,
                        config_path,
                        defined_in: manifest_path.clone(),
                        source: RegistrySource::Installed,
                    },
                );
            } else {
                data.disabled_installed.insert(name, config_path);
            }
        }
    }
}

/// Overlay `plugins:` registrations from a main config file.
fn overlay_config_registrations(
    data: &mut RegistryData,
    registrations: &BTreeMap<String, String>,
    declared_in: Option<&Path>,
    source: RegistrySource,
) {
    let Some(declared_in) = declared_in else {
        return;
    };
    let declaring_dir = declared_in.parent().unwrap_or(Path::new("."));

    for (name, value) in registrations {
        match registration_target(value, declaring_dir) {
            Ok(config_path) => {
                data.entries.insert(
                    name.clone(),
                    RegistryEntry {
                        plugin_name: name.clone(),
                        config_path,
                        defined_in: declared_in.to_path_buf(),
                        source,
                    },
                );
            }
            Err(reason) => {
                warn!(
                    "Skipping plugin '{name}' registered in {}: {reason}",
                    declared_in.display()
                );
            }
        }
    }
}

/// Resolve a registration value to a config-file path.
///
/// Directory values mean "the single `*.config.yaml` inside"; that lookup
/// can fail (discovery error). File values are passed through unverified —
/// the resolver checks existence when the plugin is actually used.
fn registration_target(value: &str, declaring_dir: &Path) -> Result<PathBuf, String> {
    let resolved = resolve_path_value(value, declaring_dir);
    if resolved.is_dir() {
        find_config_in_dir(&resolved).map_err(|e| e.to_string())
    } else {
        Ok(resolved)
    }
}

/// Description from a plugin's config file, empty when unreadable.
async fn read_description(config_path: &Path) -> String {
    let Ok(text) = tokio::fs::read_to_string(config_path).await else {
        warn!("Cannot read plugin config {}", config_path.display());
        return String::new();
    };
    match serde_yml::from_str::<PluginConfigData>(&text) {
        Ok(data) => data.description.unwrap_or_default(),
        Err(e) => {
            warn!("Invalid YAML in {}: {e}", config_path.display());
            String::new()
        }
    }
}
