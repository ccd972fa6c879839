//! Field-wise merging of the typed configuration shapes.
//!
//! Later (higher-precedence) values win per key. Nested shapes merge
//! recursively through their own dedicated functions so the compiler knows
//! every shape that can be merged; only the flattened free-form mappings go
//! through the small value merge at the bottom.
//!
//! CSS lists are deliberately NOT merged here — their append/replace
//! semantics depend on each layer's `inherit_css` flag and are handled by
//! the loader's accumulator.

use serde_yml::{Mapping, Value};

use super::types::{MarginOptions, MathConfig, PdfOptions, PluginConfigData};

/// Merge one plugin-config layer over another. `over` wins on every key it
/// sets; structured fields merge recursively.
#[must_use]
pub fn merge_plugin_config(base: &PluginConfigData, over: &PluginConfigData) -> PluginConfigData {
    PluginConfigData {
        description: over.description.clone().or_else(|| base.description.clone()),
        handler_script: over.handler_script.clone().or_else(|| base.handler_script.clone()),
        css_files: over.css_files.clone().or_else(|| base.css_files.clone()),
        inherit_css: over.inherit_css.or(base.inherit_css),
        pdf_options: merge_opt(&base.pdf_options, &over.pdf_options, merge_pdf_options),
        math: merge_opt(&base.math, &over.math, merge_math),
        params: merge_mappings(&base.params, &over.params),
        extra: merge_mappings(&base.extra, &over.extra),
    }
}

/// Merge PDF options per key; `margin` merges key-by-key rather than
/// wholesale so a layer that only tightens `top` keeps the inherited
/// `bottom`.
#[must_use]
pub fn merge_pdf_options(base: &PdfOptions, over: &PdfOptions) -> PdfOptions {
    PdfOptions {
        format: over.format.clone().or_else(|| base.format.clone()),
        landscape: over.landscape.or(base.landscape),
        margin: merge_opt(&base.margin, &over.margin, merge_margin),
        print_background: over.print_background.or(base.print_background),
        scale: over.scale.or(base.scale),
        prefer_css_page_size: over.prefer_css_page_size.or(base.prefer_css_page_size),
        display_header_footer: over.display_header_footer.or(base.display_header_footer),
        header_template: over.header_template.clone().or_else(|| base.header_template.clone()),
        footer_template: over.footer_template.clone().or_else(|| base.footer_template.clone()),
        extra: merge_mappings(&base.extra, &over.extra),
    }
}

#[must_use]
pub fn merge_margin(base: &MarginOptions, over: &MarginOptions) -> MarginOptions {
    MarginOptions {
        top: over.top.clone().or_else(|| base.top.clone()),
        right: over.right.clone().or_else(|| base.right.clone()),
        bottom: over.bottom.clone().or_else(|| base.bottom.clone()),
        left: over.left.clone().or_else(|| base.left.clone()),
    }
}

#[must_use]
pub fn merge_math(base: &MathConfig, over: &MathConfig) -> MathConfig {
    MathConfig {
        enabled: over.enabled.or(base.enabled),
        engine: over.engine.clone().or_else(|| base.engine.clone()),
        katex_options: merge_mappings(&base.katex_options, &over.katex_options),
    }
}

fn merge_opt<T: Clone>(
    base: &Option<T>,
    over: &Option<T>,
    merge: impl Fn(&T, &T) -> T,
) -> Option<T> {
    match (base, over) {
        (Some(b), Some(o)) => Some(merge(b, o)),
        (None, Some(o)) => Some(o.clone()),
        (Some(b), None) => Some(b.clone()),
        (None, None) => None,
    }
}

/// Merge two free-form mappings. Nested mappings merge recursively; any
/// other value kind from `over` replaces the base value outright.
#[must_use]
pub fn merge_mappings(base: &Mapping, over: &Mapping) -> Mapping {
    let mut out = base.clone();
    for (key, over_value) in over {
        let merged = match (out.get(key), over_value) {
            (Some(Value::Mapping(b)), Value::Mapping(o)) => Value::Mapping(merge_mappings(b, o)),
            _ => over_value.clone(),
        };
        out.insert(key.clone(), merged);
    }
    out
}
