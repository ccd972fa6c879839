//! Top-level orchestration: one plugin spec + optional local overrides in,
//! one fully merged, asset-checked, memoized [`EffectiveConfig`] out.
//!
//! Merge order, lowest to highest precedence: plugin base config → the four
//! override layers ([`super::loader`]) → local overrides from front matter
//! or a sibling config file. Global `global_pdf_options` / `math` / `params`
//! sit *underneath* the plugin's own values. Results are cached per
//! `(spec, overrides)` pair for the resolver's lifetime, so watch-mode
//! rebuilds do not re-read every layer from disk.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_yml::{Mapping, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::loader::PluginConfigLoader;
use super::main_config::{MainConfig, MainConfigLoader};
use super::merge::{merge_mappings, merge_math, merge_pdf_options, merge_plugin_config};
use super::registry::{PluginDetails, PluginRegistryBuilder};
use super::types::{ConfigLayer, PluginConfigData};
use super::{expand_tilde, find_config_in_dir, resolve_path_value, ConfigPaths, ResolveError};

/// Highest-precedence configuration, supplied by the caller per document
/// (Markdown front matter, or a sibling `<stem>.config.yaml`).
#[derive(Debug, Clone, Default)]
pub struct LocalOverrides {
    pub data: Mapping,
    /// Directory relative CSS paths in the overrides resolve against
    /// (normally the document's directory).
    pub origin_dir: Option<PathBuf>,
}

/// Every file that fed one resolution, for `mdpress config --plugin` and
/// for a file watcher's dependency list.
#[derive(Debug, Clone, Default)]
pub struct ConfigFileSources {
    pub main_config_path: Option<PathBuf>,
    /// Base config plus every override layer that contributed, in
    /// application order.
    pub plugin_config_paths: Vec<PathBuf>,
    /// Final CSS list (deduplicated, existence-checked).
    pub css_files: Vec<PathBuf>,
}

/// The final configuration driving one conversion.
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    pub plugin_name: String,
    /// Fully merged plugin config; `css_files` holds the final absolute,
    /// deduplicated, existence-checked list.
    pub plugin_config: PluginConfigData,
    pub plugin_base_path: PathBuf,
    pub handler_script_path: PathBuf,
    pub global_config: MainConfig,
    pub sources: ConfigFileSources,
}

/// Orchestrates registry, loader and main config into effective configs.
///
/// Two states per instance: uninitialized, and initialized after the first
/// resolution lazily loads the registry and main config (guarded by
/// `OnceCell`s inside the collaborators — concurrent first calls share one
/// in-flight load). Not re-initializable; construct a new resolver for a
/// new process lifetime.
#[derive(Debug)]
pub struct ConfigResolver {
    main: MainConfigLoader,
    registry: PluginRegistryBuilder,
    loader: PluginConfigLoader,
    cache: Mutex<HashMap<(String, String), Arc<EffectiveConfig>>>,
    last_sources: std::sync::Mutex<Option<ConfigFileSources>>,
}

impl ConfigResolver {
    #[must_use]
    pub fn new(paths: ConfigPaths, factory_defaults_only: bool) -> Self {
        Self {
            main: MainConfigLoader::new(paths.clone(), factory_defaults_only),
            loader: PluginConfigLoader::new(&paths, factory_defaults_only),
            registry: PluginRegistryBuilder::new(paths),
            cache: Mutex::new(HashMap::new()),
            last_sources: std::sync::Mutex::new(None),
        }
    }

    /// The main-config collaborator (diagnostic display).
    pub fn main_config(&self) -> &MainConfigLoader {
        &self.main
    }

    /// How many times override-layer application has actually run; cache
    /// hits do not increase this.
    pub fn override_applications(&self) -> usize {
        self.loader.applications()
    }

    /// Listing view for `mdpress plugin list`.
    pub async fn plugin_details(&self) -> Vec<PluginDetails> {
        self.registry.plugin_details(&self.main).await
    }

    /// Sources of the most recent resolution (main config path, contributing
    /// plugin config files, final CSS list).
    pub fn config_file_sources(&self) -> Option<ConfigFileSources> {
        self.last_sources.lock().expect("sources mutex poisoned").clone()
    }

    /// Resolve the effective config for `spec` with optional local
    /// overrides.
    ///
    /// `spec` may be a registered plugin name, a path to a plugin directory,
    /// or a path to a `*.config.yaml` file.
    ///
    /// # Errors
    ///
    /// Fails on an unresolvable spec, a registered config file missing from
    /// disk, an ambiguous plugin directory, or a missing handler script.
    /// Broken optional layers and missing CSS assets only warn.
    pub async fn get_effective_config(
        &self,
        spec: &str,
        overrides: Option<&LocalOverrides>,
    ) -> Result<Arc<EffectiveConfig>> {
        let key = (spec.to_string(), overrides_key(overrides));

        if let Some(hit) = self.cache.lock().await.get(&key) {
            debug!("Effective-config cache hit for '{spec}'");
            *self.last_sources.lock().expect("sources mutex poisoned") =
                Some(hit.sources.clone());
            return Ok(Arc::clone(hit));
        }

        let effective = Arc::new(self.resolve(spec, overrides).await?);

        *self.last_sources.lock().expect("sources mutex poisoned") =
            Some(effective.sources.clone());
        self.cache.lock().await.insert(key, Arc::clone(&effective));
        Ok(effective)
    }

    async fn resolve(
        &self,
        spec: &str,
        overrides: Option<&LocalOverrides>,
    ) -> Result<EffectiveConfig> {
        let primary = self.main.primary().await;
        let (plugin_name, config_path) = self.resolve_identity(spec).await?;
        let plugin_base_path = config_path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

        // Layer 0: the plugin's own config. Unlike override layers, a
        // missing or malformed base config is fatal.
        let text = tokio::fs::read_to_string(&config_path)
            .await
            .with_context(|| format!("failed to read plugin config {}", config_path.display()))?;
        let base_data: PluginConfigData = serde_yml::from_str(&text)
            .with_context(|| format!("invalid YAML in plugin config {}", config_path.display()))?;
        let base = ConfigLayer::new(base_data, config_path.clone());

        let xdg = self.main.xdg().await;
        let project = self.main.project_manifest().await;
        let outcome = self
            .loader
            .apply_override_layers(&plugin_name, base, xdg, project)
            .await;

        let mut merged = outcome.data;
        let mut css = outcome.css;

        // Global structured settings sit underneath the plugin's own.
        let global = &primary.config;
        merged.pdf_options = Some(match merged.pdf_options.take() {
            Some(plugin_pdf) => merge_pdf_options(&global.global_pdf_options, &plugin_pdf),
            None => global.global_pdf_options.clone(),
        });
        merged.math = Some(match merged.math.take() {
            Some(plugin_math) => merge_math(&global.math, &plugin_math),
            None => global.math.clone(),
        });
        merged.params = merge_mappings(&global.params, &merged.params);

        // Local overrides win on every key they set; a css_files entry
        // replaces the accumulated list wholesale.
        if let Some(local) = overrides {
            match serde_yml::from_value::<PluginConfigData>(Value::Mapping(local.data.clone())) {
                Ok(local_data) => {
                    let origin_dir = local
                        .origin_dir
                        .clone()
                        .or_else(|| std::env::current_dir().ok())
                        .unwrap_or_else(|| PathBuf::from("."));
                    if let Some(files) = &local_data.css_files {
                        css = files
                            .iter()
                            .filter(|s| !s.trim().is_empty())
                            .map(|s| resolve_path_value(s, &origin_dir))
                            .collect();
                    }
                    merged = merge_plugin_config(&merged, &local_data);
                }
                Err(e) => warn!("Ignoring malformed local overrides: {e}"),
            }
        }

        // Consolidate CSS: first-seen order, unique, existing on disk.
        let mut seen = HashSet::new();
        let mut final_css = Vec::new();
        for path in css {
            if !seen.insert(path.clone()) {
                continue;
            }
            if path.is_file() {
                final_css.push(path);
            } else {
                warn!("CSS file {} not found, dropping it", path.display());
            }
        }
        merged.css_files =
            Some(final_css.iter().map(|p| p.display().to_string()).collect());

        // Missing handler script is fatal: no plugin can render without one.
        let handler_rel = merged
            .handler_script
            .clone()
            .unwrap_or_else(|| "index.js".to_string());
        let handler_script_path = resolve_path_value(&handler_rel, &plugin_base_path);
        if !handler_script_path.is_file() {
            return Err(ResolveError::HandlerScriptMissing { path: handler_script_path }.into());
        }

        let sources = ConfigFileSources {
            main_config_path: primary.path.clone(),
            plugin_config_paths: outcome.contributing,
            css_files: final_css,
        };

        Ok(EffectiveConfig {
            plugin_name,
            plugin_config: merged,
            plugin_base_path,
            handler_script_path,
            global_config: global.clone(),
            sources,
        })
    }

    /// Turn a plugin spec into `(name, base config path)`.
    async fn resolve_identity(&self, spec: &str) -> Result<(String, PathBuf)> {
        let registry = self.registry.build(&self.main).await;

        if let Some(entry) = registry.get(spec) {
            // Entries are not validated at build time; check now.
            if !entry.config_path.is_file() {
                return Err(ResolveError::NotFoundAtRegisteredPath {
                    name: entry.plugin_name.clone(),
                    path: entry.config_path.clone(),
                }
                .into());
            }
            return Ok((entry.plugin_name.clone(), entry.config_path.clone()));
        }

        let path = expand_tilde(spec);
        let path = if path.is_absolute() {
            path
        } else {
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")).join(path)
        };

        if path.is_dir() {
            let config_path = find_config_in_dir(&path)?;
            Ok((plugin_name_from_config(&config_path), config_path))
        } else if path.is_file() {
            Ok((plugin_name_from_config(&path), path))
        } else {
            Err(ResolveError::UnknownSpec { spec: spec.to_string() }.into())
        }
    }
}

/// `cv.config.yaml` → `cv`.
fn plugin_name_from_config(config_path: &Path) -> String {
    config_path
        .file_name()
        .and_then(|n| n.to_str())
        .map_or_else(String::new, |n| {
            n.strip_suffix(".config.yaml").unwrap_or(n).to_string()
        })
}

/// Composite cache key part for the overrides: serialized YAML plus the
/// origin dir, so the same front matter from two documents in different
/// directories never shares a cache slot.
fn overrides_key(overrides: Option<&LocalOverrides>) -> String {
    overrides.map_or_else(String::new, |o| {
        let data = serde_yml::to_string(&o.data).unwrap_or_default();
        let origin = o
            .origin_dir
            .as_deref()
            .map_or_else(String::new, |p| p.display().to_string());
        format!("{origin}\u{0}{data}")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sandbox {
        _dir: tempfile::TempDir,
        root: PathBuf,
        paths: ConfigPaths,
    }

    impl Sandbox {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let root = dir.path().to_path_buf();
            let paths = ConfigPaths {
                bundled_plugins_root: root.join("bundled"),
                bundled_main_config: root.join("config.example.yaml"),
                xdg_config_dir: root.join("xdg"),
                collections_root: root.join("collections"),
                project_config: None,
            };
            std::fs::create_dir_all(&paths.bundled_plugins_root).unwrap();
            std::fs::create_dir_all(&paths.xdg_config_dir).unwrap();
            Self { _dir: dir, root, paths }
        }

        /// Bundled plugin with a config, a handler and one CSS file.
        fn add_plugin(&self, name: &str, config_yaml: &str) -> PathBuf {
            let dir = self.paths.bundled_plugins_root.join(name);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join(format!("{name}.config.yaml")), config_yaml).unwrap();
            std::fs::write(dir.join("index.js"), "// handler\n").unwrap();
            std::fs::write(dir.join(format!("{name}.css")), "body {}\n").unwrap();
            dir
        }

        fn resolver(&self) -> ConfigResolver {
            ConfigResolver::new(self.paths.clone(), false)
        }
    }

    const CV_CONFIG: &str = "\
description: CV template
handler_script: index.js
css_files: [cv.css]
pdf_options:
  scale: 1.0
  format: A4
";

    #[tokio::test]
    async fn resolves_registered_plugin_with_defaults() {
        let sandbox = Sandbox::new();
        let dir = sandbox.add_plugin("cv", CV_CONFIG);
        let resolver = sandbox.resolver();

        let effective = resolver.get_effective_config("cv", None).await.unwrap();
        assert_eq!(effective.plugin_name, "cv");
        assert_eq!(effective.plugin_base_path, dir);
        assert_eq!(effective.handler_script_path, dir.join("index.js"));
        let css = effective.plugin_config.css_files.as_deref().unwrap();
        assert_eq!(css, &[dir.join("cv.css").display().to_string()]);
    }

    #[tokio::test]
    async fn local_override_wins_and_base_keys_survive() {
        let sandbox = Sandbox::new();
        sandbox.add_plugin("cv", CV_CONFIG);
        let resolver = sandbox.resolver();

        let overrides = LocalOverrides {
            data: serde_yml::from_str("pdf_options:\n  scale: 0.9\n").unwrap(),
            origin_dir: Some(sandbox.root.clone()),
        };
        let effective = resolver.get_effective_config("cv", Some(&overrides)).await.unwrap();

        let pdf = effective.plugin_config.pdf_options.as_ref().unwrap();
        assert!((pdf.scale.unwrap() - 0.9).abs() < f64::EPSILON);
        assert_eq!(pdf.format.as_deref(), Some("A4"));
        assert_eq!(effective.plugin_config.handler_script.as_deref(), Some("index.js"));
    }

    #[tokio::test]
    async fn global_margin_merges_key_by_key_under_plugin() {
        let sandbox = Sandbox::new();
        sandbox.add_plugin(
            "cv",
            "handler_script: index.js\npdf_options:\n  margin:\n    top: 0.5in\n",
        );
        std::fs::write(
            sandbox.paths.xdg_main_config(),
            "global_pdf_options:\n  margin:\n    top: 1in\n    bottom: 1in\n",
        )
        .unwrap();
        let resolver = sandbox.resolver();

        let effective = resolver.get_effective_config("cv", None).await.unwrap();
        let margin = effective
            .plugin_config
            .pdf_options
            .as_ref()
            .unwrap()
            .margin
            .as_ref()
            .unwrap();
        assert_eq!(margin.top.as_deref(), Some("0.5in"));
        assert_eq!(margin.bottom.as_deref(), Some("1in"));
    }

    #[tokio::test]
    async fn second_identical_call_hits_the_cache() {
        let sandbox = Sandbox::new();
        sandbox.add_plugin("cv", CV_CONFIG);
        let resolver = sandbox.resolver();

        let first = resolver.get_effective_config("cv", None).await.unwrap();
        let second = resolver.get_effective_config("cv", None).await.unwrap();

        assert_eq!(resolver.override_applications(), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn different_overrides_miss_the_cache() {
        let sandbox = Sandbox::new();
        sandbox.add_plugin("cv", CV_CONFIG);
        let resolver = sandbox.resolver();

        resolver.get_effective_config("cv", None).await.unwrap();
        let overrides = LocalOverrides {
            data: serde_yml::from_str("pdf_options:\n  scale: 0.5\n").unwrap(),
            origin_dir: None,
        };
        resolver.get_effective_config("cv", Some(&overrides)).await.unwrap();

        assert_eq!(resolver.override_applications(), 2);
    }

    #[tokio::test]
    async fn missing_handler_script_is_fatal() {
        let sandbox = Sandbox::new();
        let dir = sandbox.paths.bundled_plugins_root.join("broken");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("broken.config.yaml"), "description: no handler\n").unwrap();
        let resolver = sandbox.resolver();

        let err = resolver.get_effective_config("broken", None).await.unwrap_err();
        assert!(err.to_string().contains("Handler script"));
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn unknown_spec_is_a_resolution_error() {
        let sandbox = Sandbox::new();
        let resolver = sandbox.resolver();

        let err = resolver.get_effective_config("no-such-plugin", None).await.unwrap_err();
        assert!(err
            .to_string()
            .contains("neither a registered plugin, nor a file, nor a directory"));
    }

    #[tokio::test]
    async fn registered_name_with_vanished_config_fails_at_resolution() {
        let sandbox = Sandbox::new();
        std::fs::write(
            sandbox.paths.xdg_main_config(),
            "plugins:\n  ghost: /nowhere/ghost.config.yaml\n",
        )
        .unwrap();
        let resolver = sandbox.resolver();

        let err = resolver.get_effective_config("ghost", None).await.unwrap_err();
        assert!(err.to_string().contains("not found at registered path"));
    }

    #[tokio::test]
    async fn directory_spec_resolves_via_convention() {
        let sandbox = Sandbox::new();
        let dir = sandbox.add_plugin("card", "handler_script: index.js\n");
        let resolver = sandbox.resolver();

        let effective = resolver
            .get_effective_config(&dir.display().to_string(), None)
            .await
            .unwrap();
        assert_eq!(effective.plugin_name, "card");
    }

    #[tokio::test]
    async fn ambiguous_directory_spec_is_an_error_not_a_crash() {
        let sandbox = Sandbox::new();
        let dir = sandbox.root.join("messy");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a.config.yaml"), "description: a\n").unwrap();
        std::fs::write(dir.join("b.config.yaml"), "description: b\n").unwrap();
        let resolver = sandbox.resolver();

        let err = resolver
            .get_effective_config(&dir.display().to_string(), None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ambiguous plugin directory"));
    }

    #[tokio::test]
    async fn css_list_is_unique_and_existence_checked() {
        let sandbox = Sandbox::new();
        let dir = sandbox.add_plugin(
            "cv",
            "handler_script: index.js\ncss_files: [cv.css, cv.css, missing.css]\n",
        );
        let resolver = sandbox.resolver();

        let effective = resolver.get_effective_config("cv", None).await.unwrap();
        let css = effective.plugin_config.css_files.as_deref().unwrap();
        assert_eq!(css, &[dir.join("cv.css").display().to_string()]);
    }

    #[tokio::test]
    async fn local_css_override_replaces_list_wholesale() {
        let sandbox = Sandbox::new();
        sandbox.add_plugin("cv", CV_CONFIG);
        let doc_dir = sandbox.root.join("docs");
        std::fs::create_dir_all(&doc_dir).unwrap();
        std::fs::write(doc_dir.join("custom.css"), "h1 {}\n").unwrap();
        let resolver = sandbox.resolver();

        let overrides = LocalOverrides {
            data: serde_yml::from_str("css_files: [custom.css]\n").unwrap(),
            origin_dir: Some(doc_dir.clone()),
        };
        let effective = resolver.get_effective_config("cv", Some(&overrides)).await.unwrap();
        let css = effective.plugin_config.css_files.as_deref().unwrap();
        assert_eq!(css, &[doc_dir.join("custom.css").display().to_string()]);
    }

    #[tokio::test]
    async fn sources_reflect_last_resolution() {
        let sandbox = Sandbox::new();
        let dir = sandbox.add_plugin("cv", CV_CONFIG);
        let resolver = sandbox.resolver();

        assert!(resolver.config_file_sources().is_none());
        resolver.get_effective_config("cv", None).await.unwrap();

        let sources = resolver.config_file_sources().unwrap();
        assert_eq!(sources.plugin_config_paths, vec![dir.join("cv.config.yaml")]);
        assert_eq!(sources.css_files, vec![dir.join("cv.css")]);
    }

    #[tokio::test]
    async fn factory_defaults_mode_ignores_override_layers() {
        let sandbox = Sandbox::new();
        sandbox.add_plugin("cv", CV_CONFIG);
        let override_dir = sandbox.paths.xdg_config_dir.join("cv");
        std::fs::create_dir_all(&override_dir).unwrap();
        std::fs::write(override_dir.join("cv.config.yaml"), "pdf_options:\n  scale: 0.1\n")
            .unwrap();

        let resolver = ConfigResolver::new(sandbox.paths.clone(), true);
        let effective = resolver.get_effective_config("cv", None).await.unwrap();
        let pdf = effective.plugin_config.pdf_options.as_ref().unwrap();
        assert!((pdf.scale.unwrap() - 1.0).abs() < f64::EPSILON);
    }
}
