//! Data-driven agent template registry.
//!
//! New agent types are added as template data, not new types: a template
//! maps an id to a role, capability list, tier, and timeout. Selection is
//! first-match per capability, with a per-domain default as the backstop.

use serde::{Deserialize, Serialize};

use crate::agent::Agent;
use crate::tier::Tier;

/// One reusable agent blueprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTemplate {
    /// Template id; doubles as the instantiated agent's id.
    pub id: String,
    /// Role the agent plays.
    pub role: String,
    /// Capabilities the template covers.
    pub capabilities: Vec<String>,
    /// Tier the agent runs at.
    pub tier: Tier,
    /// Per-agent timeout in seconds.
    pub timeout_secs: u64,
    /// Domain this template belongs to ("general" for the catch-all).
    pub domain: String,
}

impl AgentTemplate {
    /// Create a template.
    pub fn new(
        id: impl Into<String>,
        role: impl Into<String>,
        capabilities: Vec<String>,
        tier: Tier,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
            capabilities,
            tier,
            timeout_secs: 60,
            domain: domain.into(),
        }
    }

    /// Builder: set the timeout.
    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Instantiate an agent from the template.
    pub fn instantiate(&self) -> Agent {
        Agent::new(&self.id, &self.role)
            .with_capabilities(self.capabilities.clone())
            .with_tier(self.tier)
            .with_timeout_secs(self.timeout_secs)
    }
}

/// Ordered template registry.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: Vec<AgentTemplate>,
}

impl TemplateRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry seeded with the built-in templates.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for template in builtin_templates() {
            registry.register(template);
        }
        registry
    }

    /// Append a template. Order matters: lookups are first-match.
    pub fn register(&mut self, template: AgentTemplate) {
        self.templates.push(template);
    }

    /// First template covering the given capability.
    pub fn find_for_capability(&self, capability: &str) -> Option<&AgentTemplate> {
        self.templates
            .iter()
            .find(|t| t.capabilities.iter().any(|c| c == capability))
    }

    /// First template registered for the given domain.
    pub fn domain_default(&self, domain: &str) -> Option<&AgentTemplate> {
        self.templates.iter().find(|t| t.domain == domain)
    }

    /// Resolve one template per needed capability: first match, else the
    /// domain default, else the general default. Duplicate resolutions are
    /// kept — the pattern chooser treats them as a debate signal.
    pub fn resolve(&self, capabilities: &[String], domain: &str) -> Vec<AgentTemplate> {
        let mut resolved = Vec::new();
        for capability in capabilities {
            let template = self
                .find_for_capability(capability)
                .or_else(|| self.domain_default(domain))
                .or_else(|| self.domain_default("general"));
            match template {
                Some(template) => resolved.push(template.clone()),
                None => log::warn!("no template covers capability '{}'", capability),
            }
        }
        resolved
    }

    /// Number of registered templates.
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

fn builtin_templates() -> Vec<AgentTemplate> {
    vec![
        AgentTemplate::new(
            "security-analyst",
            "security analyst",
            vec!["threat_analysis".into(), "code_review".into()],
            Tier::Premium,
            "security",
        ),
        AgentTemplate::new(
            "architect",
            "architect",
            vec!["system_design".into(), "tradeoff_analysis".into()],
            Tier::Premium,
            "architecture",
        )
        .with_timeout_secs(120),
        AgentTemplate::new(
            "tech-writer",
            "technical writer",
            vec!["technical_writing".into()],
            Tier::Cheap,
            "documentation",
        ),
        AgentTemplate::new(
            "editor",
            "editor",
            vec!["editorial_review".into()],
            Tier::Premium,
            "documentation",
        ),
        AgentTemplate::new(
            "refactoring-engineer",
            "refactoring engineer",
            vec!["code_analysis".into(), "code_transformation".into()],
            Tier::Capable,
            "refactoring",
        ),
        AgentTemplate::new(
            "test-engineer",
            "test engineer",
            vec!["test_design".into()],
            Tier::Capable,
            "testing",
        ),
        AgentTemplate::new(
            "data-analyst",
            "data analyst",
            vec!["data_analysis".into()],
            Tier::Capable,
            "data",
        ),
        AgentTemplate::new(
            "generalist",
            "generalist",
            vec!["general_reasoning".into()],
            Tier::Cheap,
            "general",
        ),
    ]
}
