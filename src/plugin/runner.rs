//! Runs a plugin's handler script as an external process.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::EffectiveConfig;

/// JSON sent to the handler on stdin.
#[derive(Serialize)]
struct HandlerInput<'a> {
    markdown: &'a str,
    html: &'a str,
    config: serde_json::Value,
    output_path: &'a Path,
}

/// JSON expected from the handler on stdout.
#[derive(Deserialize, Default)]
struct HandlerOutputWire {
    html: Option<String>,
    pdf_path: Option<PathBuf>,
}

/// What the handler did with the document.
#[derive(Debug, Clone)]
pub enum HandlerOutcome {
    /// Handler returned (possibly transformed) HTML; the caller renders it.
    Html(String),
    /// Handler produced the PDF itself.
    Rendered(PathBuf),
}

/// Runs the resolved handler script of one plugin.
///
/// Script extensions `.js`/`.mjs`/`.cjs` run through `node` (located on
/// `PATH`); anything else is executed directly and must be executable. The
/// handler runs with the plugin base dir as its working directory so it can
/// read sibling assets.
pub struct HandlerRunner {
    script: PathBuf,
    working_dir: PathBuf,
    plugin_name: String,
}

impl HandlerRunner {
    /// Build a runner from a resolved configuration. The resolver has
    /// already verified that the script exists.
    #[must_use]
    pub fn new(effective: &EffectiveConfig) -> Self {
        Self {
            script: effective.handler_script_path.clone(),
            working_dir: effective.plugin_base_path.clone(),
            plugin_name: effective.plugin_name.clone(),
        }
    }

    /// Invoke the handler with the document and its effective config.
    ///
    /// # Errors
    ///
    /// Fails when the interpreter is missing, the handler exits non-zero
    /// (its stderr is included in the message), or its output is not the
    /// expected JSON.
    pub async fn run(
        &self,
        markdown: &str,
        html: &str,
        effective: &EffectiveConfig,
        output_path: &Path,
    ) -> Result<HandlerOutcome> {
        let config = serde_json::to_value(&effective.plugin_config)
            .context("plugin config is not JSON-representable")?;
        let input = serde_json::to_string(&HandlerInput {
            markdown,
            html,
            config,
            output_path,
        })?;

        let mut command = self.build_command()?;
        let plugin_name = self.plugin_name.clone();
        let plugin_name_outer = plugin_name.clone();

        // Spawn the handler in a blocking task since it does process I/O.
        let output = tokio::task::spawn_blocking(move || -> Result<HandlerOutputWire> {
            let mut child = command
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
                .with_context(|| format!("failed to spawn handler for '{plugin_name}'"))?;

            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(input.as_bytes())
                    .with_context(|| format!("failed to write to handler '{plugin_name}' stdin"))?;
            }

            let result = child
                .wait_with_output()
                .with_context(|| format!("handler for '{plugin_name}' failed"))?;

            if !result.status.success() {
                let stderr = String::from_utf8_lossy(&result.stderr);
                bail!(
                    "handler for '{plugin_name}' exited with {}: {}",
                    result.status,
                    stderr.trim()
                );
            }

            let stdout = String::from_utf8(result.stdout)
                .with_context(|| format!("handler '{plugin_name}' output is not valid UTF-8"))?;

            serde_json::from_str::<HandlerOutputWire>(&stdout).with_context(|| {
                format!(
                    "handler '{plugin_name}' returned invalid JSON: {}",
                    &stdout[..stdout.len().min(200)]
                )
            })
        })
        .await
        .with_context(|| format!("handler '{plugin_name_outer}' task panicked"))??;

        if let Some(pdf_path) = output.pdf_path {
            if !pdf_path.is_file() {
                bail!(
                    "handler for '{}' claimed to render {} but the file does not exist",
                    self.plugin_name,
                    pdf_path.display()
                );
            }
            return Ok(HandlerOutcome::Rendered(pdf_path));
        }

        match output.html {
            Some(html) => Ok(HandlerOutcome::Html(html)),
            // An empty object means "no changes": keep the input HTML.
            None => Ok(HandlerOutcome::Html(html.to_string())),
        }
    }

    fn build_command(&self) -> Result<Command> {
        let is_js = self
            .script
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| matches!(e, "js" | "mjs" | "cjs"));

        let mut command = if is_js {
            let node = which::which("node")
                .context("handler script needs node, but node was not found on PATH")?;
            let mut c = Command::new(node);
            c.arg(&self.script);
            c
        } else {
            Command::new(&self.script)
        };
        command.current_dir(&self.working_dir);
        Ok(command)
    }
}
