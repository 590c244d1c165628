use crate::types::{AgentKind, AgentProfile};

/// The stock agent pool: one research, analysis, writing and coding agent.
pub fn default_profiles() -> Vec<AgentProfile> {
    vec![
        research_profile(),
        analysis_profile(),
        writing_profile(),
        coding_profile(),
    ]
}

fn research_profile() -> AgentProfile {
    AgentProfile::new(
        "agent_research_1",
        AgentKind::Research,
        "Research Agent 1",
        &["research", "search", "summarize"],
    )
}

fn analysis_profile() -> AgentProfile {
    AgentProfile::new(
        "agent_analysis_1",
        AgentKind::Analysis,
        "Analysis Agent 1",
        &["analysis", "compare", "evaluate"],
    )
}

fn writing_profile() -> AgentProfile {
    AgentProfile::new(
        "agent_writing_1",
        AgentKind::Writing,
        "Writing Agent 1",
        &["writing", "editing", "formatting"],
    )
}

fn coding_profile() -> AgentProfile {
    AgentProfile::new(
        "agent_coding_1",
        AgentKind::Coding,
        "Coding Agent 1",
        &["coding", "debugging", "testing"],
    )
}
