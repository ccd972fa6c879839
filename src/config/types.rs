//! Typed configuration shapes shared across the resolution layers.
//!
//! Plugin configs are open-ended (handler templates read arbitrary keys),
//! so every shape keeps a flattened [`Mapping`] of unrecognized keys next to
//! its known fields. Merging is field-wise over these shapes, never a blind
//! recursive object merge — see [`super::merge`].

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_yml::Mapping;

/// One plugin's configuration as read from any single layer, and also the
/// shape of the fully merged result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginConfigData {
    /// Human-readable description shown by `mdpress plugin list`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Handler script path, relative to the plugin base dir. Defaults to
    /// `index.js` when no layer sets it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handler_script: Option<String>,

    /// CSS assets contributed by this layer. Paths resolve against the
    /// layer's own directory, not the plugin's.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub css_files: Option<Vec<String>>,

    /// When `false`, this layer's `css_files` replace the accumulated list
    /// instead of appending to it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inherit_css: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_options: Option<PdfOptions>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub math: Option<MathConfig>,

    /// Template parameters substituted into the document body.
    #[serde(default, skip_serializing_if = "Mapping::is_empty")]
    pub params: Mapping,

    /// Anything else a handler script may want to read.
    #[serde(flatten)]
    pub extra: Mapping,
}

/// Options forwarded to the PDF backend.
///
/// Mirrors the puppeteer-style `page.pdf()` vocabulary most backends accept.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PdfOptions {
    /// Paper format, e.g. `A4`, `Letter`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub landscape: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin: Option<MarginOptions>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub print_background: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefer_css_page_size: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_header_footer: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub header_template: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer_template: Option<String>,

    #[serde(flatten)]
    pub extra: Mapping,
}

/// Page margins. Merged key-by-key: a plugin that only sets `top` keeps the
/// global `bottom`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarginOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bottom: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left: Option<String>,
}

/// Math rendering settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MathConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Rendering engine, e.g. `katex`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,

    #[serde(default, skip_serializing_if = "Mapping::is_empty")]
    pub katex_options: Mapping,
}

impl PdfOptions {
    /// For `skip_serializing_if`: an all-`None` shape adds nothing to a dump.
    #[must_use]
    pub fn is_default_shape(&self) -> bool {
        self.format.is_none()
            && self.landscape.is_none()
            && self.margin.is_none()
            && self.print_background.is_none()
            && self.scale.is_none()
            && self.prefer_css_page_size.is_none()
            && self.display_header_footer.is_none()
            && self.header_template.is_none()
            && self.footer_template.is_none()
            && self.extra.is_empty()
    }
}

impl MathConfig {
    /// For `skip_serializing_if`.
    #[must_use]
    pub fn is_default_shape(&self) -> bool {
        self.enabled.is_none() && self.engine.is_none() && self.katex_options.is_empty()
    }
}

/// One configuration layer, produced once per override source and combined
/// functionally. Never mutated after creation.
#[derive(Debug, Clone)]
pub struct ConfigLayer {
    pub data: PluginConfigData,
    /// This layer's `css_files`, already resolved against its own directory.
    pub resolved_css: Vec<PathBuf>,
    /// Whether the accumulated CSS list survives this layer (`true`) or is
    /// replaced by it (`false`). Only meaningful when the layer sets
    /// `css_files`.
    pub inherit_css: bool,
    /// Where this layer came from, for diagnostics.
    pub origin: PathBuf,
}

impl ConfigLayer {
    /// Build a layer from parsed data, resolving its CSS contribution
    /// against the directory the data was declared in.
    #[must_use]
    pub fn new(data: PluginConfigData, origin: PathBuf) -> Self {
        let declaring_dir = origin
            .parent()
            .map_or_else(|| PathBuf::from("."), std::path::Path::to_path_buf);

        let resolved_css = data
            .css_files
            .as_deref()
            .unwrap_or_default()
            .iter()
            .filter(|s| !s.trim().is_empty())
            .map(|s| super::resolve_path_value(s, &declaring_dir))
            .collect();

        let inherit_css = data.inherit_css.unwrap_or(true);

        Self { data, resolved_css, inherit_css, origin }
    }

    /// True when this layer sets `css_files` at all (even to an empty list,
    /// which with `inherit_css: false` clears the accumulated CSS).
    #[must_use]
    pub fn sets_css(&self) -> bool {
        self.data.css_files.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plugin_config_parses_known_and_extra_keys() {
        let yaml = r"
description: Curriculum vitae template
handler_script: index.js
css_files:
  - cv.css
pdf_options:
  format: A4
  margin:
    top: 1in
custom_section_order: [work, education]
";
        let data: PluginConfigData = serde_yml::from_str(yaml).unwrap();
        assert_eq!(data.description.as_deref(), Some("Curriculum vitae template"));
        assert_eq!(data.handler_script.as_deref(), Some("index.js"));
        assert_eq!(data.css_files.as_deref(), Some(&["cv.css".to_string()][..]));
        let pdf = data.pdf_options.unwrap();
        assert_eq!(pdf.format.as_deref(), Some("A4"));
        assert_eq!(pdf.margin.unwrap().top.as_deref(), Some("1in"));
        assert!(data.extra.contains_key("custom_section_order"));
    }

    #[test]
    fn layer_resolves_css_against_its_own_dir() {
        let data: PluginConfigData =
            serde_yml::from_str("css_files: [style.css, /abs/other.css]").unwrap();
        let layer = ConfigLayer::new(data, PathBuf::from("/plugins/cv/cv.config.yaml"));
        assert_eq!(
            layer.resolved_css,
            vec![PathBuf::from("/plugins/cv/style.css"), PathBuf::from("/abs/other.css")]
        );
        assert!(layer.inherit_css);
        assert!(layer.sets_css());
    }

    #[test]
    fn layer_without_css_contributes_nothing() {
        let data: PluginConfigData = serde_yml::from_str("description: plain").unwrap();
        let layer = ConfigLayer::new(data, PathBuf::from("/x/a.config.yaml"));
        assert!(layer.resolved_css.is_empty());
        assert!(!layer.sets_css());
    }

    #[test]
    fn inherit_css_false_is_captured() {
        let data: PluginConfigData =
            serde_yml::from_str("css_files: []\ninherit_css: false").unwrap();
        let layer = ConfigLayer::new(data, PathBuf::from("/x/a.config.yaml"));
        assert!(!layer.inherit_css);
        assert!(layer.sets_css());
        assert!(layer.resolved_css.is_empty());
    }
}
