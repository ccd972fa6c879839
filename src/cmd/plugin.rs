//! The `plugin` subcommand: registry listing.

use anyhow::Result;

use mdpress::config::ConfigResolver;

pub async fn cmd_plugin_list(resolver: &ConfigResolver) -> Result<()> {
    let details = resolver.plugin_details().await;

    if details.is_empty() {
        println!("No plugins registered.");
        return Ok(());
    }

    println!("🔌 Available plugins:\n");
    for plugin in &details {
        println!("  {:<18} {:<24} {}", plugin.name, plugin.status, plugin.description);
    }
    println!("\n({} plugins)", details.len());

    Ok(())
}
