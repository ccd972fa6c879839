//! The `convert` subcommand: one Markdown file in, one PDF out.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_yml::{Mapping, Value};

use mdpress::config::merge::merge_mappings;
use mdpress::config::{ConfigResolver, LocalOverrides};
use mdpress::plugin::{HandlerOutcome, HandlerRunner};
use mdpress::render::{page_css, PdfRenderer};
use mdpress::{front_matter, markdown};

pub async fn cmd_convert(
    resolver: &ConfigResolver,
    input: &Path,
    plugin_flag: Option<&str>,
    output: Option<PathBuf>,
) -> Result<()> {
    let source = tokio::fs::read_to_string(input)
        .await
        .with_context(|| format!("failed to read {}", input.display()))?;
    let document = front_matter::split(&source);

    let input_dir = input.parent().filter(|p| !p.as_os_str().is_empty());
    let overrides = local_overrides(input, &document.front_matter, input_dir).await;

    // Plugin choice: flag beats front matter beats the default template.
    let spec = plugin_flag
        .map(ToString::to_string)
        .or_else(|| {
            document
                .front_matter
                .get("plugin")
                .and_then(Value::as_str)
                .map(ToString::to_string)
        })
        .unwrap_or_else(|| "default".to_string());

    println!("📄 Converting: {}", input.display());

    let effective = resolver.get_effective_config(&spec, Some(&overrides)).await?;
    println!("🔌 Plugin: {}", effective.plugin_name);

    // Substitution params: merged config params (global < plugin layers)
    // under the document's own front matter, plus today's date.
    let mut params = merge_mappings(&effective.plugin_config.params, &document.front_matter);
    if !params.contains_key("date") {
        params.insert(
            Value::String("date".to_string()),
            Value::String(chrono::Local::now().format("%Y-%m-%d").to_string()),
        );
    }

    let body = markdown::substitute_params(&document.body, &params);
    let body_html = markdown::to_html(&body);

    let title = document
        .front_matter
        .get("title")
        .and_then(Value::as_str)
        .map_or_else(|| document_stem(input), ToString::to_string);

    let pdf_options = effective.plugin_config.pdf_options.clone().unwrap_or_default();
    let mut css = page_css(&pdf_options);
    for file in effective.plugin_config.css_files.as_deref().unwrap_or_default() {
        let text = tokio::fs::read_to_string(file)
            .await
            .with_context(|| format!("failed to read CSS {file}"))?;
        css.push_str(&text);
        css.push('\n');
    }

    let html = markdown::wrap_document(&body_html, &title, &css);

    let output_path = match output {
        Some(path) => absolute(&path),
        None => absolute(&input.with_extension("pdf")),
    };

    let runner = HandlerRunner::new(&effective);
    let outcome = runner.run(&document.body, &html, &effective, &output_path).await?;

    let final_html = match outcome {
        HandlerOutcome::Rendered(path) => {
            println!("✅ Created {} (rendered by handler)", path.display());
            return Ok(());
        }
        HandlerOutcome::Html(html) => html,
    };

    // Stage the document in a temp file so the browser loads one file:// URL.
    let staged = std::env::temp_dir().join(format!("mdpress-{}.html", uuid::Uuid::new_v4()));
    tokio::fs::write(&staged, &final_html)
        .await
        .with_context(|| format!("failed to stage HTML at {}", staged.display()))?;

    let renderer = PdfRenderer::discover()?;
    let render_result = renderer.render(&staged, &output_path, &pdf_options).await;
    let _ = tokio::fs::remove_file(&staged).await;
    render_result?;

    let size = tokio::fs::metadata(&output_path).await.map(|m| m.len()).unwrap_or(0);
    println!("✅ Created {} ({size} bytes)", output_path.display());

    Ok(())
}

/// Local overrides: the front matter mapping with a sibling
/// `<stem>.config.yaml` merged on top (the sibling wins).
async fn local_overrides(
    input: &Path,
    front_matter: &Mapping,
    input_dir: Option<&Path>,
) -> LocalOverrides {
    let mut data = front_matter.clone();

    let sibling = input.with_file_name(format!("{}.config.yaml", document_stem(input)));
    if let Ok(text) = tokio::fs::read_to_string(&sibling).await {
        match serde_yml::from_str::<Mapping>(&text) {
            Ok(mapping) => {
                println!("📎 Local config: {}", sibling.display());
                data = merge_mappings(&data, &mapping);
            }
            Err(e) => tracing::warn!("Invalid YAML in {}: {e}", sibling.display()),
        }
    }

    LocalOverrides {
        data,
        origin_dir: input_dir.map(Path::to_path_buf),
    }
}

fn document_stem(input: &Path) -> String {
    input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document")
        .to_string()
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")).join(path)
    }
}
