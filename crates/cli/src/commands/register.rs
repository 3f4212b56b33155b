use agentry_agent::config::AgentManifest;
use anyhow::{Context, Result, bail};
use colored::Colorize;
use serde_json::json;
use std::path::Path;

/// Assemble and print the registration payload for this agent.
///
/// Submission is out of scope here: the payload is what a wallet-holding
/// registrar would sign and send. The command succeeds only on a valid
/// manifest so broken agents never reach a registry.
pub fn run_register(config: &Path) -> Result<()> {
    let manifest = AgentManifest::load(config)
        .with_context(|| format!("could not load {}", config.display()))?;
    if !manifest.is_valid() {
        bail!("manifest has errors; run `agentry doctor` first");
    }

    let card = manifest.compose_agent_card();
    let payload = json!({
        "agentCard": card,
        "endpoint": manifest.agent.url,
        "skillIds": manifest.skills.iter().map(|s| s.id.clone()).collect::<Vec<_>>(),
    });

    println!("{}", serde_json::to_string_pretty(&payload)?);
    eprintln!(
        "{} payload assembled; submit it with your registrar tooling",
        "ok:".green().bold()
    );
    Ok(())
}
