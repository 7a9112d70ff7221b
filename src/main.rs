use droidtour_progress::config::AppConfig;
use droidtour_progress::db;
use droidtour_progress::kafka;
use droidtour_progress::processor::action_processor::ActionProcessor;
use droidtour_progress::processor::progress_engine::{ConfirmationPolicy, ProgressEngine};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load config
    let config = AppConfig::load()?;

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(&config.log_level)
        .init();

    info!("Starting DroidTour progress service...");

    // Init DB
    let pool = db::init_pool(&config.database_url, config.db_max_connections).await?;
    info!("Connected to database");

    let policy = ConfirmationPolicy {
        require_meeting_point_first: config.require_meeting_point_first,
        enforce_stop_order: config.enforce_stop_order,
    };
    info!("Confirmation policy: {:?}", policy);

    let store = Arc::new(db::PgTourStore::new(pool));
    let engine = Arc::new(ProgressEngine::new(
        store,
        policy,
        config.progress_event_capacity,
    ));

    let mut events = engine.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => info!(
                    tour_id = %event.tour_id,
                    completed = event.counts.completed_count,
                    total = event.counts.total,
                    "Progress event: {:?}",
                    event.kind
                ),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Progress event log lagged, skipped {} events", skipped)
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    // Start Kafka
    let processor = Arc::new(ActionProcessor::new(engine));
    kafka::start_kafka_consumer(&config, processor).await?;

    Ok(())
}
