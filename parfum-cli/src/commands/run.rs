use crate::config::{AppConfig, StateBackend};
use parfum_core::{
    CommandExtractor, FunnelMachine, MemoryStateStore, Result, SqliteStateStore, StateStore,
    Storage, TelegramGateway,
};
use std::sync::Arc;
use std::time::Duration;

const RETRY_DELAY: Duration = Duration::from_secs(5);
const PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Long-poll the Bot API and feed every update to the funnel until Ctrl-C.
pub async fn handle_run(config: &AppConfig, storage: Arc<Storage>) -> Result<()> {
    let gateway = Arc::new(TelegramGateway::new(
        config.bot_token.clone(),
        config.api_base.clone(),
        config.funnel.io_timeout,
    )?);

    let states: Arc<dyn StateStore> = match config.state_backend {
        StateBackend::Memory => Arc::new(MemoryStateStore::new()),
        StateBackend::Sqlite => Arc::new(SqliteStateStore::new(Arc::clone(&storage))),
    };
    spawn_purge(Arc::clone(&states));

    config.extractor.validate()?;
    let extractor = Arc::new(CommandExtractor::new(
        config.extractor.program.clone(),
        config.extractor.args.clone(),
        config.receipts_dir(),
        config.funnel.io_timeout,
    ));

    let machine = Arc::new(FunnelMachine::new(
        config.funnel.clone(),
        gateway.clone(),
        extractor,
        states,
        storage,
    )?);

    tracing::info!(
        "Bot started: unit cost {}, {} operators, state in {:?}",
        config.funnel.unit_cost,
        config.funnel.operator_ids.len(),
        config.state_backend
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut offset = 0;

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Shutting down");
                break;
            }
            updates = gateway.get_updates(offset, config.poll_timeout()) => {
                let updates = match updates {
                    Ok(updates) => updates,
                    Err(e) => {
                        tracing::warn!("Polling failed, retrying in {}s: {}", RETRY_DELAY.as_secs(), e);
                        tokio::time::sleep(RETRY_DELAY).await;
                        continue;
                    }
                };

                for update in updates {
                    offset = offset.max(update.update_id + 1);
                    let Some(interaction) = update.into_interaction() else {
                        continue;
                    };

                    // Interactions of one user may race here; the conversation
                    // state is last-write-wins.
                    let machine = Arc::clone(&machine);
                    tokio::spawn(async move {
                        let user_id = interaction.user_id;
                        if let Err(e) = machine.handle(interaction).await {
                            tracing::error!("Failed to handle update from user {}: {}", user_id, e);
                        }
                    });
                }
            }
        }
    }

    Ok(())
}

fn spawn_purge(store: Arc<dyn StateStore>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            if let Err(e) = store.purge_expired().await {
                tracing::warn!("Failed to purge expired conversation states: {}", e);
            }
        }
    });
}
