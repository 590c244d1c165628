use maestro_core::{MaestroError, MaestroResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Capability tags carried by the stock agents.
pub const DEFAULT_CAPABILITIES: &[&str] = &[
    "research",
    "search",
    "summarize",
    "analysis",
    "compare",
    "evaluate",
    "writing",
    "editing",
    "formatting",
    "coding",
    "debugging",
    "testing",
];

/// The closed set of capability tags the orchestrator accepts.
///
/// Agents may only advertise, and tasks may only request, tags from this set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilityVocabulary {
    tags: BTreeSet<String>,
}

impl CapabilityVocabulary {
    pub fn new<I, S>(tags: I) -> MaestroResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = BTreeSet::new();
        for tag in tags {
            let tag = tag.into();
            if !is_well_formed(&tag) {
                return Err(MaestroError::Config(format!(
                    "Invalid capability tag '{tag}': use lowercase letters, digits, '_' or '-'"
                )));
            }
            set.insert(tag);
        }
        if set.is_empty() {
            return Err(MaestroError::Config(
                "Capability vocabulary must not be empty".to_string(),
            ));
        }
        Ok(Self { tags: set })
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Reject a single tag outside the vocabulary.
    pub fn check(&self, tag: &str) -> MaestroResult<()> {
        if self.contains(tag) {
            Ok(())
        } else {
            Err(MaestroError::InvalidCapability(format!(
                "unknown capability '{tag}'"
            )))
        }
    }

    /// Validate an agent's advertised capabilities and collapse duplicates.
    pub fn validate_set(&self, tags: &[String]) -> MaestroResult<BTreeSet<String>> {
        if tags.is_empty() {
            return Err(MaestroError::InvalidCapability(
                "an agent must advertise at least one capability".to_string(),
            ));
        }
        let unknown: Vec<&str> = tags
            .iter()
            .map(String::as_str)
            .filter(|t| !self.contains(t))
            .collect();
        if !unknown.is_empty() {
            return Err(MaestroError::InvalidCapability(format!(
                "unknown capabilities: {}",
                unknown.join(", ")
            )));
        }
        Ok(tags.iter().cloned().collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

impl Default for CapabilityVocabulary {
    fn default() -> Self {
        Self {
            tags: DEFAULT_CAPABILITIES.iter().map(|t| t.to_string()).collect(),
        }
    }
}

fn is_well_formed(tag: &str) -> bool {
    !tag.is_empty()
        && tag
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}
