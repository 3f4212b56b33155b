use crate::cli_args::{OutputFormat, PromptMode};
use agentry_agent::config::AgentManifest;
use anyhow::{Context, Result};
use serde_json::json;
use std::path::Path;

pub fn run_print_config(
    config: &Path,
    format: OutputFormat,
    redact: bool,
    prompt_mode: PromptMode,
) -> Result<()> {
    let manifest = AgentManifest::load(config)
        .with_context(|| format!("could not load {}", config.display()))?;

    let manifest_value = if redact {
        manifest.redacted_value()?
    } else {
        serde_json::to_value(&manifest)?
    };

    let prompt = manifest.compose_system_prompt()?;
    let prompt_value = match prompt_mode {
        PromptMode::Full => json!(prompt),
        PromptMode::Summary => {
            let first_line = prompt.lines().find(|line| !line.trim().is_empty());
            json!({
                "firstLine": first_line,
                "chars": prompt.chars().count(),
            })
        }
    };

    let output = json!({
        "manifest": manifest_value,
        "agentCard": manifest.compose_agent_card(),
        "systemPrompt": prompt_value,
        "effectiveMcpServers": manifest.effective_mcp_servers(),
        "effectiveWorkflows": manifest.effective_workflows(),
    });

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&output)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(&output)?),
    }
    Ok(())
}
