use agentry_agent::config::{AgentManifest, Severity};
use anyhow::{Context, Result, bail};
use colored::Colorize;
use std::path::Path;

pub fn run_doctor(config: &Path) -> Result<()> {
    let manifest = AgentManifest::load(config)
        .with_context(|| format!("could not load {}", config.display()))?;

    println!(
        "agent: {} v{} ({} skills)",
        manifest.agent.name.bold(),
        manifest.agent.version,
        manifest.skills.len()
    );

    let findings = manifest.validate();
    let mut errors = 0usize;
    for finding in &findings {
        match finding.severity {
            Severity::Error => {
                errors += 1;
                println!("{} {}", "error:".red().bold(), finding.message);
            }
            Severity::Warning => {
                println!("{} {}", "warning:".yellow().bold(), finding.message);
            }
        }
    }

    // Exercise composition so template and card problems surface here
    // rather than at startup.
    match manifest.compose_system_prompt() {
        Ok(prompt) => println!("system prompt: {} chars", prompt.chars().count()),
        Err(error) => {
            errors += 1;
            println!("{} {error}", "error:".red().bold());
        }
    }
    let card = manifest.compose_agent_card();
    println!(
        "agent card: {} skills, {} extensions",
        card.skills.len(),
        card.capabilities.extensions.len()
    );
    println!(
        "effective: {} MCP servers, {} workflows",
        manifest.effective_mcp_servers().len(),
        manifest.effective_workflows().len()
    );

    if errors > 0 {
        bail!("{errors} error(s) found");
    }
    println!("{} manifest is valid", "ok:".green().bold());
    Ok(())
}
