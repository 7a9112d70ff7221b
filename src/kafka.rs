use crate::config::AppConfig;
use crate::processor::action_processor::{ActionOutcome, ActionProcessor};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Consumes guide actions with SASL/SCRAM authentication and a circuit breaker on broker errors.
/// Each message runs on its own task. Tasks touching the same tour run in consumption order.
pub async fn start_kafka_consumer(config: &AppConfig, processor: Arc<ActionProcessor>) -> anyhow::Result<()> {
    info!("Initializing Kafka consumer for topic: {}", config.kafka_topic);

    let mut client_config = ClientConfig::new();
    client_config
        .set("bootstrap.servers", &config.kafka_bootstrap_servers)
        .set("group.id", &config.kafka_group_id)
        .set("auto.offset.reset", &config.kafka_auto_offset_reset)
        // SASL Configuration
        .set("security.protocol", &config.kafka_security_protocol)
        .set("sasl.mechanism", &config.kafka_sasl_mechanism)
        .set("sasl.username", &config.kafka_username)
        .set("sasl.password", &config.kafka_password);

    let consumer: StreamConsumer = client_config.create()?;

    consumer.subscribe(&[&config.kafka_topic])?;
    info!("Subscribed to topic: {}", config.kafka_topic);

    let mut consecutive_failures = 0;
    let max_retries = config.kafka_max_retries;
    let cooldown_duration = Duration::from_secs(config.kafka_circuit_breaker_cooldown);

    loop {
        if consecutive_failures >= max_retries {
            warn!(
                "Circuit breaker tripped ({} consecutive failures)! Sleeping for {} seconds...",
                consecutive_failures,
                config.kafka_circuit_breaker_cooldown
            );
            tokio::time::sleep(cooldown_duration).await;
            consecutive_failures = 0;
            info!("Circuit breaker reset. Resuming consumption.");
        }

        match consumer.recv().await {
            Ok(m) => {
                consecutive_failures = 0;

                let payload = match m.payload() {
                    None => {
                        warn!("Received empty payload from Kafka");
                        continue;
                    }
                    Some(p) => p,
                };

                let Some(message) = ActionProcessor::decode(payload) else {
                    continue;
                };
                // Reserved here, in partition order, before the task is spawned.
                let turn = processor.reserve(&message);
                let processor = processor.clone();
                let partition = m.partition();
                let offset = m.offset();

                // Failed writes are already rolled back by the engine and are not retried.
                tokio::spawn(async move {
                    match processor.apply(message, turn).await {
                        Ok(ActionOutcome::Unchanged) => {
                            info!("Duplicate guide action at {}:{}, nothing to do", partition, offset)
                        }
                        Ok(_) => {}
                        Err(e) => error!(
                            "Error processing guide action at {}:{}: {}",
                            partition, offset, e
                        ),
                    }
                });
            }
            Err(e) => {
                error!("Kafka error: {}. Incrementing failure count ({} / {})", e, consecutive_failures + 1, max_retries);
                consecutive_failures += 1;

                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }
    }
}
