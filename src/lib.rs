//! `mdpress` - Markdown to PDF with pluggable document templates
//!
//! # Features
//!
//! - **Plugins**: per-document-type templates (CV, recipe, cover letter)
//!   carrying their own YAML config, CSS and handler script
//! - **Layered configuration**: bundled < installed < XDG < project <
//!   document front matter, resolved deterministically per conversion
//! - **Delegated rendering**: PDF output via a system headless browser
//!
//! # Example
//!
//! ```rust,no_run
//! use mdpress::config::{ConfigPaths, ConfigResolver};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let resolver = ConfigResolver::new(ConfigPaths::from_env(None), false);
//!     let effective = resolver.get_effective_config("cv", None).await?;
//!     println!("handler: {}", effective.handler_script_path.display());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod front_matter;
pub mod markdown;
pub mod plugin;
pub mod render;

pub use config::{
    ConfigPaths, ConfigResolver, EffectiveConfig, LocalOverrides, MainConfig, PluginDetails,
};
pub use front_matter::Document;
pub use plugin::{HandlerOutcome, HandlerRunner};
pub use render::PdfRenderer;

/// Version of mdpress
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
