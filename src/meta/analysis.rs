//! Task analysis: complexity and domain classification by keyword scoring.

use serde::{Deserialize, Serialize};

/// Coarse task complexity classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    /// Short, single-concern tasks.
    Simple,
    /// The default middle ground.
    Moderate,
    /// Multi-concern or system-level tasks.
    Complex,
}

/// Result of analyzing one task description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAnalysis {
    /// Classified complexity.
    pub complexity: Complexity,
    /// Winning domain, or "general" when nothing matched.
    pub domain: String,
    /// Capabilities the domain calls for.
    pub capabilities: Vec<String>,
}

/// Keywords that push a task toward `Complex`.
const COMPLEX_KEYWORDS: &[&str] = &[
    "architecture",
    "system",
    "integrate",
    "migrate",
    "distributed",
    "end-to-end",
    "redesign",
    "orchestrate",
];

/// Keywords that push a task toward `Simple`.
const SIMPLE_KEYWORDS: &[&str] = &[
    "fix",
    "rename",
    "typo",
    "format",
    "list",
    "lookup",
    "summarize",
];

/// One entry in the domain catalog: name, scoring keywords, and the
/// capabilities the domain calls for.
struct DomainEntry {
    name: &'static str,
    keywords: &'static [&'static str],
    capabilities: &'static [&'static str],
}

/// Domain catalog, in declaration order. Ties resolve to the earlier entry.
const DOMAIN_CATALOG: &[DomainEntry] = &[
    DomainEntry {
        name: "security",
        keywords: &["security", "vulnerability", "exploit", "audit", "threat", "penetration"],
        capabilities: &["threat_analysis", "code_review"],
    },
    DomainEntry {
        name: "architecture",
        keywords: &["architecture", "design", "scalability", "microservice", "api"],
        capabilities: &["system_design", "tradeoff_analysis"],
    },
    DomainEntry {
        name: "documentation",
        keywords: &["document", "documentation", "readme", "explain", "tutorial", "guide"],
        capabilities: &["technical_writing", "editorial_review"],
    },
    DomainEntry {
        name: "refactoring",
        keywords: &["refactor", "cleanup", "restructure", "simplify", "modernize"],
        capabilities: &["code_analysis", "code_transformation"],
    },
    DomainEntry {
        name: "testing",
        keywords: &["test", "coverage", "regression", "qa", "verify"],
        capabilities: &["test_design"],
    },
    DomainEntry {
        name: "data",
        keywords: &["data", "pipeline", "etl", "analytics", "dataset"],
        capabilities: &["data_analysis"],
    },
];

/// Capability assigned when no domain matches.
const GENERAL_CAPABILITY: &str = "general_reasoning";

fn keyword_score(task: &str, keywords: &[&str]) -> usize {
    keywords.iter().filter(|kw| task.contains(*kw)).count()
}

/// Classify a task description.
pub fn analyze_task(task: &str) -> TaskAnalysis {
    let lowered = task.to_lowercase();
    let word_count = lowered.split_whitespace().count();

    let complex_score = keyword_score(&lowered, COMPLEX_KEYWORDS);
    let simple_score = keyword_score(&lowered, SIMPLE_KEYWORDS);
    let complexity = if complex_score >= 2 || word_count > 50 {
        Complexity::Complex
    } else if simple_score > complex_score && word_count < 15 {
        Complexity::Simple
    } else {
        Complexity::Moderate
    };

    // Highest score wins; a tie keeps the earlier entry.
    let mut winner: Option<(&DomainEntry, usize)> = None;
    for entry in DOMAIN_CATALOG {
        let score = keyword_score(&lowered, entry.keywords);
        if score > 0 && winner.map_or(true, |(_, best)| score > best) {
            winner = Some((entry, score));
        }
    }

    let (domain, capabilities) = match winner {
        Some((entry, _)) => (
            entry.name.to_string(),
            entry.capabilities.iter().map(|c| c.to_string()).collect(),
        ),
        None => (
            "general".to_string(),
            vec![GENERAL_CAPABILITY.to_string()],
        ),
    };

    log::debug!(
        "task analysis: complexity={:?} domain={} ({} words)",
        complexity,
        domain,
        word_count
    );
    TaskAnalysis {
        complexity,
        domain,
        capabilities,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_task() {
        let analysis = analyze_task("fix the typo in the header");
        assert_eq!(analysis.complexity, Complexity::Simple);
        assert_eq!(analysis.domain, "general");
        assert_eq!(analysis.capabilities, vec!["general_reasoning"]);
    }

    #[test]
    fn test_complex_task_by_keywords() {
        let analysis =
            analyze_task("redesign the system architecture to integrate the new billing service");
        assert_eq!(analysis.complexity, Complexity::Complex);
        assert_eq!(analysis.domain, "architecture");
    }

    #[test]
    fn test_domain_tie_resolves_to_earlier_entry() {
        // One security keyword and one architecture keyword: security is
        // declared first and keeps the tie.
        let analysis = analyze_task("review the api for a vulnerability");
        assert_eq!(analysis.domain, "security");
    }

    #[test]
    fn test_higher_score_beats_declaration_order() {
        let analysis = analyze_task("write documentation and a tutorial guide for the audit");
        assert_eq!(analysis.domain, "documentation");
    }

    #[test]
    fn test_no_match_falls_back_to_general() {
        let analysis = analyze_task("bake a cake for the office party this week");
        assert_eq!(analysis.domain, "general");
    }
}
