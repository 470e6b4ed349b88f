//! Example agents for a fresh database.

use crate::domain::model::{Agent, NewAgent};
use crate::store::{ConversationStore, StoreResult};

/// The five example agents: two Ollama, two `OpenAI`, one Gemini.
#[must_use]
pub fn example_agents() -> Vec<NewAgent> {
    vec![
        NewAgent::new("Llama 3 Assistant", "ollama", "llama3").with_profile(
            "Fast local Llama 3 model via Ollama",
            "🦙",
            "local",
        ),
        NewAgent::new("GPT-4 Strategist", "openai", "gpt-4").with_profile(
            "OpenAI GPT-4 for complex reasoning",
            "🧠",
            "cloud",
        ),
        NewAgent::new("Gemini Analyst", "gemini", "gemini-pro").with_profile(
            "Google Gemini Pro for analysis",
            "✨",
            "cloud",
        ),
        NewAgent::new("Code Helper", "ollama", "codellama").with_profile(
            "Local coding assistant via Ollama",
            "💻",
            "local",
        ),
        NewAgent::new("GPT-3.5 Turbo", "openai", "gpt-3.5-turbo").with_profile(
            "Fast and efficient OpenAI model",
            "⚡",
            "cloud",
        ),
    ]
}

/// Replace every agent in `store` with [`example_agents`].
///
/// # Errors
/// Returns an error if a store operation fails.
pub async fn seed_agents(store: &dyn ConversationStore) -> StoreResult<Vec<Agent>> {
    let removed = store.clear_agents().await?;
    tracing::info!(removed, "Cleared existing agents");

    let mut created = Vec::new();
    for agent in example_agents() {
        created.push(store.create_agent(agent).await?);
    }
    tracing::info!(count = created.len(), "Seeded agents");
    Ok(created)
}
