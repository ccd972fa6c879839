//! Application of the four optional override layers onto a plugin's base
//! config.
//!
//! Layer order is fixed and precedence-significant:
//!
//! 1. XDG per-plugin file `<config_dir>/<name>/<name>.config.yaml`
//! 2. Inline block under the plugin's name in the XDG main config
//! 3. Project override file named by `plugins.<name>` in the project config
//! 4. Inline block under the plugin's name in the project config
//!
//! A missing convention-based layer (1, 2, 4) is skipped silently; layer 3
//! warns when its file is missing, because that path was stated explicitly
//! by the user. Malformed YAML anywhere degrades to an empty contribution.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_yml::{Mapping, Value};
use tracing::{debug, warn};

use super::main_config::LoadedMainConfig;
use super::merge::merge_plugin_config;
use super::types::{ConfigLayer, PluginConfigData};
use super::{resolve_path_value, ConfigPaths};

/// Result of folding the base layer and every present override layer.
#[derive(Debug, Clone)]
pub struct OverrideOutcome {
    pub data: PluginConfigData,
    /// Accumulated CSS contribution, ordered by layer application.
    pub css: Vec<PathBuf>,
    /// Every file/block that actually contributed, for
    /// `mdpress config --plugin` display and the watcher's dependency list.
    pub contributing: Vec<PathBuf>,
}

/// Applies override layers. One instance per resolver; the application
/// counter makes cache behavior observable in tests.
#[derive(Debug)]
pub struct PluginConfigLoader {
    xdg_config_dir: PathBuf,
    factory_defaults_only: bool,
    applications: AtomicUsize,
}

impl PluginConfigLoader {
    #[must_use]
    pub fn new(paths: &ConfigPaths, factory_defaults_only: bool) -> Self {
        Self {
            xdg_config_dir: paths.xdg_config_dir.clone(),
            factory_defaults_only,
            applications: AtomicUsize::new(0),
        }
    }

    /// How many times override-layer application has run. A cache hit in the
    /// resolver must not increase this.
    pub fn applications(&self) -> usize {
        self.applications.load(Ordering::Relaxed)
    }

    /// Fold the override layers onto `base`, in fixed order.
    ///
    /// With `factory_defaults_only` the base layer is returned unchanged —
    /// the reproducible "clean room" mode.
    pub async fn apply_override_layers(
        &self,
        plugin_name: &str,
        base: ConfigLayer,
        xdg_main: &LoadedMainConfig,
        project_main: Option<&LoadedMainConfig>,
    ) -> OverrideOutcome {
        self.applications.fetch_add(1, Ordering::Relaxed);

        let mut outcome = OverrideOutcome {
            css: base.resolved_css.clone(),
            contributing: vec![base.origin.clone()],
            data: base.data,
        };

        if self.factory_defaults_only {
            debug!("Factory-defaults mode: skipping override layers for '{plugin_name}'");
            return outcome;
        }

        // 1. XDG per-plugin override file (convention-based probe).
        let xdg_file = self
            .xdg_config_dir
            .join(plugin_name)
            .join(format!("{plugin_name}.config.yaml"));
        if let Some(layer) = load_layer_file(&xdg_file, false).await {
            apply_layer(&mut outcome, layer);
        }

        // 2. Inline block in the XDG main config.
        if let Some(layer) = inline_layer(xdg_main, plugin_name) {
            apply_layer(&mut outcome, layer);
        }

        if let Some(project) = project_main {
            // 3. Project override file, explicitly named under `plugins:`.
            if let Some(value) = project.config.plugins.get(plugin_name) {
                match project_override_path(value, &project.dir()) {
                    Ok(path) => {
                        if let Some(layer) = load_layer_file(&path, true).await {
                            apply_layer(&mut outcome, layer);
                        }
                    }
                    Err(e) => warn!("Project override for '{plugin_name}' skipped: {e}"),
                }
            }

            // 4. Inline block in the project config.
            if let Some(layer) = inline_layer(project, plugin_name) {
                apply_layer(&mut outcome, layer);
            }
        }

        outcome
    }
}

/// Merge one layer onto the accumulator. CSS appends unless the layer opts
/// out of inheritance, in which case its list replaces the accumulated one.
fn apply_layer(outcome: &mut OverrideOutcome, layer: ConfigLayer) {
    outcome.data = merge_plugin_config(&outcome.data, &layer.data);
    if layer.sets_css() {
        if layer.inherit_css {
            outcome.css.extend(layer.resolved_css);
        } else {
            outcome.css = layer.resolved_css;
        }
    }
    outcome.contributing.push(layer.origin);
}

/// Resolve the `plugins.<name>` value of a project config to an override
/// file. Directory values mean "the single `*.config.yaml` inside".
fn project_override_path(value: &str, project_dir: &Path) -> Result<PathBuf, String> {
    let resolved = resolve_path_value(value, project_dir);
    if resolved.is_dir() {
        super::find_config_in_dir(&resolved).map_err(|e| e.to_string())
    } else {
        Ok(resolved)
    }
}

/// Load one override file as a layer.
///
/// Returns `None` when the file is missing (silent for convention-based
/// probes, warned when `warn_if_missing` — the path came from explicit
/// configuration) or when its YAML is malformed (always warned).
async fn load_layer_file(path: &Path, warn_if_missing: bool) -> Option<ConfigLayer> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(_) => {
            if warn_if_missing {
                warn!("Configured override file {} does not exist, skipping", path.display());
            }
            return None;
        }
    };

    match serde_yml::from_str::<PluginConfigData>(&text) {
        Ok(data) => Some(ConfigLayer::new(data, path.to_path_buf())),
        Err(e) => {
            warn!("Invalid YAML in override {}: {e}", path.display());
            None
        }
    }
}

/// Build a layer from an inline block embedded in a main config file. CSS
/// paths in the block resolve against the main config's directory.
fn inline_layer(main: &LoadedMainConfig, plugin_name: &str) -> Option<ConfigLayer> {
    let block: &Mapping = main.config.inline_block(plugin_name)?;
    let origin = main.path.clone()?;

    match serde_yml::from_value::<PluginConfigData>(Value::Mapping(block.clone())) {
        Ok(data) => Some(ConfigLayer::new(data, origin)),
        Err(e) => {
            warn!(
                "Invalid inline '{plugin_name}' block in {}: {e}",
                origin.display()
            );
            None
        }
    }
}
