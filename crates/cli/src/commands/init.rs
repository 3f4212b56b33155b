use anyhow::{Result, bail};
use colored::Colorize;
use std::path::Path;

const MANIFEST_TEMPLATE: &str = r#"# Agentry agent manifest.
# Values may reference environment variables: ${VAR} or ${VAR:-default}.

[agent]
name = "My Agent"
description = "Describe what this agent does"
version = "0.1.0"
url = "${AGENT_URL:-http://localhost:3000/}"

[persona]
# The base system prompt. {{ agent_name }} and {{ date }} are available.
prompt = """
You are {{ agent_name }}, a helpful assistant.
"""
extra_instructions = []

# Each skill attaches MCP tool servers and/or workflows.
[[skill]]
id = "general"
name = "General"
description = "General conversation"
tags = ["chat"]
examples = ["What can you do?"]
workflows = []

# [[skill.mcp_servers]]
# name = "ember"
# protocol = "stdio"
# command = "npx"
# args = ["-y", "ember-mcp"]

# Numeric guardrails; when several skills set the same key the tightest
# (largest) value wins.
[guardrails]

# Per-tool policies: "allow", "ask" or "deny".
[tool_policies]
"#;

pub fn run_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    std::fs::write(path, MANIFEST_TEMPLATE)?;
    println!("{} wrote {}", "ok:".green().bold(), path.display());
    println!("next: edit the manifest, then run `agentry doctor`");
    Ok(())
}
