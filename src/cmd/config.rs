//! The `config` subcommand: show the main config, or the effective config
//! and every file that contributed to it for one plugin.

use anyhow::Result;

use mdpress::config::ConfigResolver;

pub async fn cmd_config(
    resolver: &ConfigResolver,
    plugin: Option<&str>,
    pure: bool,
) -> Result<()> {
    match plugin {
        Some(plugin) => show_plugin_config(resolver, plugin, pure).await,
        None => show_main_config(resolver, pure).await,
    }
}

async fn show_main_config(resolver: &ConfigResolver, pure: bool) -> Result<()> {
    let primary = resolver.main_config().primary().await;

    if !pure {
        println!("# Main configuration");
        match &primary.path {
            Some(path) => println!("#   source: {} ({})", path.display(), primary.load_reason),
            None => println!("#   source: built-in ({})", primary.load_reason),
        }
        println!();
    }

    print!("{}", serde_yml::to_string(&primary.config)?);
    Ok(())
}

async fn show_plugin_config(resolver: &ConfigResolver, plugin: &str, pure: bool) -> Result<()> {
    let effective = resolver.get_effective_config(plugin, None).await?;

    if !pure {
        println!("# Effective configuration for plugin '{}'", effective.plugin_name);
        if let Some(sources) = resolver.config_file_sources() {
            if let Some(main) = &sources.main_config_path {
                println!("#   main config: {}", main.display());
            }
            println!("#   contributing files:");
            for path in &sources.plugin_config_paths {
                println!("#     - {}", path.display());
            }
            if !sources.css_files.is_empty() {
                println!("#   css files:");
                for path in &sources.css_files {
                    println!("#     - {}", path.display());
                }
            }
        }
        println!("#   handler script: {}", effective.handler_script_path.display());
        println!();
    }

    print!("{}", serde_yml::to_string(&effective.plugin_config)?);
    Ok(())
}
