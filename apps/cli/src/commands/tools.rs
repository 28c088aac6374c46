//! List the tools models can call.

use anyhow::Result;
use braid_orchestrator::ToolManager;
use colored::Colorize;

use crate::config::BraidConfig;

/// Execute the tools command.
pub async fn execute(config: &BraidConfig) -> Result<()> {
    let manager = ToolManager::new().with_web_tools();

    println!();
    println!("{}", "Built-in tools".cyan().bold());
    for tool in manager.available_tools().await {
        println!("  {} {}", "•".green().bold(), tool.name.white().bold());
        println!("    {}", tool.description);
    }

    if !config.mcp.servers.is_empty() {
        println!();
        println!("{}", "MCP servers".cyan().bold());
        for (name, server) in &config.mcp.servers {
            let status = if server.enabled { "enabled".green() } else { "disabled".yellow() };
            println!("  {} {} ({})", "•".green().bold(), name.white().bold(), status);
            if let Some(command) = &server.command {
                println!("    command: {} {}", command, server.args.join(" "));
            }
            if let Some(allowed) = &server.allowed_tools {
                println!("    tools: {}", allowed.join(", "));
            }
        }
    }
    println!();

    Ok(())
}
