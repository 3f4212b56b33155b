//! Agent configuration and composition.
//!
//! An agent is declared in a TOML manifest: a base persona plus one or
//! more skills, each attaching MCP servers and/or workflows. This module
//! loads the manifest (with `${VAR}` environment interpolation), composes
//! the agent card and the system prompt, computes the effective MCP and
//! workflow sets, and merges guardrails.

use crate::a2a::{AgentCapabilities, AgentCard, AgentExtension, AgentSkillRef};
use crate::tools::McpServerConfig;
use anyhow::{Context as _, Result, anyhow};
use indexmap::IndexMap;
use minijinja::{Environment, context};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::path::Path;

/// A2A protocol version this runtime speaks.
pub const PROTOCOL_VERSION: &str = "0.3.0";

pub const TOOL_POLICIES_EXTENSION: &str = "urn:agent:tool-policies";
pub const GUARDRAILS_EXTENSION: &str = "urn:agent:guardrails";

/// How numeric guardrails are merged when several skills set the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardrailMerge {
    /// Most restrictive wins: numeric `max`.
    Tightest,
    /// Least restrictive wins: numeric `min`.
    Loosest,
}

/// Per-tool execution policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolPolicy {
    Allow,
    #[default]
    Ask,
    Deny,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSection {
    pub name: String,
    pub description: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_url")]
    pub url: String,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

fn default_url() -> String {
    "http://localhost:3000/".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaSection {
    /// Base system prompt. May use `{{ agent_name }}`, `{{ date }}` and
    /// the skill loop variables.
    pub prompt: String,
    #[serde(default)]
    pub extra_instructions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillSection {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub mcp_servers: Vec<McpServerConfig>,
    /// Workflow plugin ids this skill attaches.
    #[serde(default)]
    pub workflows: Vec<String>,
    #[serde(default)]
    pub guardrails: IndexMap<String, f64>,
}

/// The on-disk agent manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentManifest {
    pub agent: AgentSection,
    pub persona: PersonaSection,
    #[serde(default, rename = "skill")]
    pub skills: Vec<SkillSection>,
    #[serde(default)]
    pub guardrails: IndexMap<String, f64>,
    #[serde(default)]
    pub tool_policies: IndexMap<String, ToolPolicy>,
}

/// One finding produced by manifest validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl AgentManifest {
    /// Load a manifest from disk, interpolating `${VAR}` references.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).with_context(|| {
            format!("failed to read manifest {}", path.as_ref().display())
        })?;
        Self::parse(&content)
    }

    /// Parse manifest TOML, interpolating `${VAR}` references first.
    pub fn parse(content: &str) -> Result<Self> {
        let interpolated = interpolate_env_vars(content)?;
        let manifest: AgentManifest =
            toml::from_str(&interpolated).context("manifest is not valid TOML")?;
        Ok(manifest)
    }

    /// Validate the manifest. Errors make the manifest unusable; warnings
    /// are advisory (surfaced by `agentry doctor`).
    pub fn validate(&self) -> Vec<Finding> {
        let mut findings = Vec::new();
        let error = |message: String| Finding {
            severity: Severity::Error,
            message,
        };
        let warning = |message: String| Finding {
            severity: Severity::Warning,
            message,
        };

        if self.agent.name.trim().is_empty() {
            findings.push(error("agent.name must not be empty".to_string()));
        }
        if self.persona.prompt.trim().is_empty() {
            findings.push(error("persona.prompt must not be empty".to_string()));
        }
        if self.skills.is_empty() {
            findings.push(warning(
                "no skills declared; the agent exposes no tools or workflows".to_string(),
            ));
        }

        let mut skill_ids = HashSet::new();
        for skill in &self.skills {
            if !skill_ids.insert(skill.id.as_str()) {
                findings.push(error(format!("duplicate skill id '{}'", skill.id)));
            }
            for workflow in &skill.workflows {
                if let Err(e) = crate::workflow::canonical_plugin_id(workflow) {
                    findings.push(error(format!(
                        "skill '{}' references invalid workflow id: {e}",
                        skill.id
                    )));
                }
            }
            for server in &skill.mcp_servers {
                if let Err(e) = crate::tools::canonical_namespace(&server.name) {
                    findings.push(error(format!(
                        "skill '{}' has invalid MCP server name: {e}",
                        skill.id
                    )));
                }
            }
        }

        let mut server_names = HashSet::new();
        for server in self.effective_mcp_servers() {
            if !server_names.insert(server.name.clone()) {
                findings.push(warning(format!(
                    "MCP server '{}' attached by multiple skills; one connection is shared",
                    server.name
                )));
            }
        }

        if let Err(e) = validate_prompt_template(&self.persona.prompt) {
            findings.push(error(e.to_string()));
        }

        findings
    }

    pub fn is_valid(&self) -> bool {
        self.validate()
            .iter()
            .all(|finding| finding.severity != Severity::Error)
    }

    /// Union of the MCP servers attached by all skills, first declaration
    /// wins per name.
    pub fn effective_mcp_servers(&self) -> Vec<McpServerConfig> {
        let mut seen = HashSet::new();
        let mut servers = Vec::new();
        for skill in &self.skills {
            for server in &skill.mcp_servers {
                if seen.insert(server.name.clone()) {
                    servers.push(server.clone());
                }
            }
        }
        servers
    }

    /// Union of the workflow ids attached by all skills, canonicalized.
    pub fn effective_workflows(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut workflows = Vec::new();
        for skill in &self.skills {
            for workflow in &skill.workflows {
                let canonical = crate::workflow::canonical_plugin_id(workflow)
                    .unwrap_or_else(|_| workflow.clone());
                if seen.insert(canonical.clone()) {
                    workflows.push(canonical);
                }
            }
        }
        workflows
    }

    /// Merge global and per-skill guardrails under one direction.
    pub fn merged_guardrails(&self, direction: GuardrailMerge) -> IndexMap<String, f64> {
        let mut merged = self.guardrails.clone();
        for skill in &self.skills {
            for (key, value) in &skill.guardrails {
                merged
                    .entry(key.clone())
                    .and_modify(|existing| {
                        *existing = match direction {
                            GuardrailMerge::Tightest => existing.max(*value),
                            GuardrailMerge::Loosest => existing.min(*value),
                        };
                    })
                    .or_insert(*value);
            }
        }
        merged
    }

    /// The discovery document advertised at `/.well-known/agent.json`.
    pub fn compose_agent_card(&self) -> AgentCard {
        let mut extensions = Vec::new();
        if !self.tool_policies.is_empty() {
            extensions.push(AgentExtension {
                uri: TOOL_POLICIES_EXTENSION.to_string(),
                params: serde_json::to_value(&self.tool_policies).ok(),
            });
        }
        let guardrails = self.merged_guardrails(GuardrailMerge::Tightest);
        if !guardrails.is_empty() {
            extensions.push(AgentExtension {
                uri: GUARDRAILS_EXTENSION.to_string(),
                params: serde_json::to_value(&guardrails).ok(),
            });
        }

        AgentCard {
            protocol_version: PROTOCOL_VERSION.to_string(),
            name: self.agent.name.clone(),
            description: self.agent.description.clone(),
            url: self.agent.url.clone(),
            version: self.agent.version.clone(),
            capabilities: AgentCapabilities {
                streaming: true,
                push_notifications: false,
                extensions,
            },
            default_input_modes: vec!["text/plain".to_string()],
            default_output_modes: vec!["text/plain".to_string(), "application/json".to_string()],
            skills: self
                .skills
                .iter()
                .map(|skill| AgentSkillRef {
                    id: skill.id.clone(),
                    name: skill.name.clone(),
                    description: skill.description.clone(),
                    tags: skill.tags.clone(),
                    examples: skill.examples.clone(),
                })
                .collect(),
        }
    }

    /// Render the effective system prompt: persona, then the skill
    /// manifest, then extra instructions.
    pub fn compose_system_prompt(&self) -> Result<String> {
        let env = Environment::new();
        let template = env
            .template_from_str(SYSTEM_PROMPT_TEMPLATE)
            .map_err(|e| anyhow!("system prompt template error: {e}"))?;

        let persona = env
            .template_from_str(&self.persona.prompt)
            .map_err(|e| anyhow!("persona prompt template error: {e}"))?
            .render(context! {
                agent_name => self.agent.name,
                date => time::OffsetDateTime::now_utc()
                    .format(&time::format_description::well_known::Rfc3339)
                    .unwrap_or_default(),
            })
            .map_err(|e| anyhow!("persona prompt render error: {e}"))?;

        template
            .render(context! {
                persona => persona,
                skills => self.skills.iter().map(|skill| json!({
                    "name": skill.name,
                    "description": skill.description,
                    "workflows": skill.workflows,
                })).collect::<Vec<_>>(),
                extra_instructions => self.persona.extra_instructions,
            })
            .map_err(|e| anyhow!("system prompt render error: {e}"))
    }

    /// Serializable view with secret-looking values masked, for
    /// `print-config --redact`.
    pub fn redacted_value(&self) -> Result<Value> {
        let mut value = serde_json::to_value(self)?;
        redact_in_place(&mut value, false);
        Ok(value)
    }
}

const SYSTEM_PROMPT_TEMPLATE: &str = r#"{{ persona }}

{% if skills %}## Skills
{% for skill in skills %}- {{ skill.name }}: {{ skill.description }}
{% endfor %}{% endif %}{% if extra_instructions %}
## Additional instructions
{% for instruction in extra_instructions %}- {{ instruction }}
{% endfor %}{% endif %}"#;

/// Template variables a persona prompt may reference.
const KNOWN_PROMPT_VARS: &[&str] = &["agent_name", "date"];

/// Validate that a persona prompt only references known variables.
/// No-ops for strings without template syntax.
fn validate_prompt_template(content: &str) -> Result<()> {
    if !content.contains("{{") && !content.contains("{%") {
        return Ok(());
    }
    let env = Environment::new();
    let template = env
        .template_from_str(content)
        .map_err(|e| anyhow!("template syntax error in persona prompt: {e}"))?;
    let known: HashSet<&str> = KNOWN_PROMPT_VARS.iter().copied().collect();
    let mut unknown: Vec<_> = template
        .undeclared_variables(true)
        .into_iter()
        .filter(|variable| !known.contains(variable.as_str()))
        .collect();
    if !unknown.is_empty() {
        unknown.sort();
        return Err(anyhow!(
            "unknown template variable(s) in persona prompt: {}. Known: {}",
            unknown.join(", "),
            KNOWN_PROMPT_VARS.join(", "),
        ));
    }
    Ok(())
}

/// Interpolate environment variables in manifest content.
/// Supports `${VAR}` and `${VAR:-default}` syntax.
pub fn interpolate_env_vars(content: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}")
        .context("failed to compile env var regex")?;

    let mut missing = Vec::new();
    let result = re.replace_all(content, |caps: &Captures| {
        let var_name = &caps[1];
        let default = caps.get(2).map(|m| m.as_str());
        match (std::env::var(var_name), default) {
            (Ok(value), _) => value,
            (Err(_), Some(default)) => default.to_string(),
            (Err(_), None) => {
                missing.push(var_name.to_string());
                String::new()
            }
        }
    });

    if !missing.is_empty() {
        return Err(anyhow!(
            "required environment variables not set: {}",
            missing.join(", ")
        ));
    }
    Ok(result.into_owned())
}

const SECRET_KEY_MARKERS: &[&str] = &["token", "secret", "key", "password", "auth"];

fn redact_in_place(value: &mut Value, parent_is_secret: bool) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                let lowered = key.to_ascii_lowercase();
                let is_secret = SECRET_KEY_MARKERS
                    .iter()
                    .any(|marker| lowered.contains(marker));
                redact_in_place(child, is_secret);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                redact_in_place(item, parent_is_secret);
            }
        }
        Value::String(s) if parent_is_secret => {
            *s = "•••".to_string();
        }
        _ => {}
    }
}
