//! PDF rendering via an external headless browser.
//!
//! Rendering is deliberately delegated: a system Chromium/Chrome prints the
//! assembled HTML document with `--headless --print-to-pdf`. Page geometry
//! (`format`, `margin`, `landscape`, `scale`) travels as a generated
//! `@page` CSS block inside the document rather than as CLI flags, which is
//! the only channel the headless CLI reliably supports across versions.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{bail, Context, Result};
use tracing::debug;

use crate::config::PdfOptions;

/// Browser binaries probed in order when `MDPRESS_BROWSER` is unset.
const BROWSER_CANDIDATES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "chrome",
    "brave",
];

/// Prints HTML files to PDF through a headless browser.
pub struct PdfRenderer {
    browser: PathBuf,
}

impl PdfRenderer {
    /// Locate a usable browser binary.
    ///
    /// `MDPRESS_BROWSER` overrides discovery; otherwise the usual Chromium
    /// family names are probed on `PATH`.
    ///
    /// # Errors
    ///
    /// Returns an error when no browser can be found.
    pub fn discover() -> Result<Self> {
        if let Some(explicit) = std::env::var_os("MDPRESS_BROWSER") {
            let path = PathBuf::from(explicit);
            if path.is_file() {
                return Ok(Self { browser: path });
            }
            bail!("MDPRESS_BROWSER points at {}, which does not exist", path.display());
        }

        for candidate in BROWSER_CANDIDATES {
            if let Ok(path) = which::which(candidate) {
                debug!("Using browser {}", path.display());
                return Ok(Self { browser: path });
            }
        }

        bail!(
            "no headless browser found (tried {}); install Chromium or set MDPRESS_BROWSER",
            BROWSER_CANDIDATES.join(", ")
        );
    }

    /// Print `html_path` to `output` as PDF.
    pub async fn render(
        &self,
        html_path: &Path,
        output: &Path,
        options: &PdfOptions,
    ) -> Result<()> {
        let browser = self.browser.clone();
        let mut args: Vec<String> = vec![
            "--headless".to_string(),
            "--disable-gpu".to_string(),
            format!("--print-to-pdf={}", output.display()),
        ];
        if options.display_header_footer != Some(true) {
            args.push("--no-pdf-header-footer".to_string());
        }
        args.push(format!("file://{}", html_path.display()));

        // The browser does blocking process I/O; keep it off the runtime.
        let result = tokio::task::spawn_blocking(move || {
            Command::new(&browser)
                .args(&args)
                .stdout(Stdio::null())
                .stderr(Stdio::piped())
                .output()
                .with_context(|| format!("failed to spawn browser {}", browser.display()))
        })
        .await
        .context("browser task panicked")??;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            bail!("browser exited with {}: {}", result.status, stderr.trim());
        }
        if !output.is_file() {
            bail!("browser reported success but {} was not created", output.display());
        }
        Ok(())
    }
}

/// Generate the `@page` CSS block implementing the PDF options.
#[must_use]
pub fn page_css(options: &PdfOptions) -> String {
    let mut size = options.format.clone().unwrap_or_else(|| "A4".to_string());
    if options.landscape == Some(true) {
        size.push_str(" landscape");
    }

    let mut rules = vec![format!("  size: {size};")];

    if let Some(margin) = &options.margin {
        let mut push = |side: &str, value: &Option<String>| {
            if let Some(v) = value {
                rules.push(format!("  margin-{side}: {v};"));
            }
        };
        push("top", &margin.top);
        push("right", &margin.right);
        push("bottom", &margin.bottom);
        push("left", &margin.left);
    }

    let mut css = format!("@page {{\n{}\n}}\n", rules.join("\n"));

    if let Some(scale) = options.scale {
        if (scale - 1.0).abs() > f64::EPSILON {
            css.push_str(&format!("body {{ zoom: {scale}; }}\n"));
        }
    }
    if options.print_background == Some(true) {
        css.push_str("html { -webkit-print-color-adjust: exact; print-color-adjust: exact; }\n");
    }

    css
}
