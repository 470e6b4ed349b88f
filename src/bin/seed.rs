//! Replace the agents in the configured database with the example set.

use anyhow::Context;
use neural_relay::domain::config::RelayConfig;
use neural_relay::seed::seed_agents;
use neural_relay::start_neural_relay::init_tracing;
use neural_relay::store::SqliteConversationStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = RelayConfig::from_env();
    let path = &config.storage.sqlite_path;
    let store = SqliteConversationStore::open(path)
        .await
        .with_context(|| format!("opening {}", path.display()))?;

    let agents = seed_agents(&store).await.context("seeding agents")?;
    for agent in &agents {
        tracing::info!("{} {} ({}/{})", agent.emoji, agent.name, agent.provider, agent.model);
    }
    Ok(())
}
