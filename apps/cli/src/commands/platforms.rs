//! List configured platforms.

use anyhow::Result;
use colored::Colorize;

use crate::config::{BraidConfig, token_env_var};

/// Execute the platforms command.
pub fn execute(config: &BraidConfig) -> Result<()> {
    let platforms = config.all_platforms()?;

    if platforms.is_empty() {
        println!(
            "No platforms configured. Add a [platforms.<provider>] table to {}.",
            BraidConfig::default_global_path().display()
        );
        return Ok(());
    }

    println!();
    for platform in platforms {
        let status = if platform.enabled { "enabled".green() } else { "disabled".yellow() };
        let token = if platform.token.is_some() {
            "token set".normal()
        } else {
            format!("no token; set {}", token_env_var(platform.client_type)).yellow()
        };

        println!(
            "  {} {} {} ({})",
            "•".green().bold(),
            platform.client_type.to_string().white().bold(),
            platform.model.yellow(),
            status
        );
        println!("    url: {}", platform.api_url);
        println!("    {}", token);
    }
    println!();

    Ok(())
}
