use anyhow::Result;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::str::FromStr;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub kafka_bootstrap_servers: String,
    pub kafka_topic: String,
    pub kafka_group_id: String,
    pub kafka_auto_offset_reset: String,
    pub kafka_sasl_mechanism: String,
    pub kafka_username: String,
    pub kafka_password: String,
    pub kafka_security_protocol: String,
    pub kafka_max_retries: u32,
    pub kafka_circuit_breaker_cooldown: u64,
    pub database_url: String,
    pub db_max_connections: u32,
    pub log_level: String,
    pub require_meeting_point_first: bool,
    pub enforce_stop_order: bool,
    pub progress_event_capacity: usize,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        dotenv().ok();

        let database_url = format!(
            "postgres://{}:{}@{}:{}/{}",
            env_or("DB_USER", "droidtour"),
            env_or("DB_PWD", "droidtour"),
            env_or("DB_HOST", "localhost"),
            env_or("DB_PORT", "5432"),
            env_or("DB_DATABASE", "droidtour"),
        );

        Ok(Self {
            kafka_bootstrap_servers: env_or("KAFKA_BOOTSTRAP_SERVERS", "localhost:9092"),
            kafka_topic: env_or("KAFKA_TOPIC", "droidtour-guide-actions"),
            kafka_group_id: env_or("KAFKA_GROUP_ID", "droidtour-progress"),
            kafka_auto_offset_reset: env_or("KAFKA_AUTO_OFFSET_RESET", "latest"),
            kafka_sasl_mechanism: env_or("KAFKA_SASL_MECHANISM", "SCRAM-SHA-256"),
            kafka_username: env::var("KAFKA_USERNAME").unwrap_or_default(),
            kafka_password: env::var("KAFKA_PASSWORD").unwrap_or_default(),
            kafka_security_protocol: env_or("KAFKA_SECURITY_PROTOCOL", "SASL_PLAINTEXT"),
            kafka_max_retries: env_parse("KAFKA_MAX_RETRIES", 5),
            kafka_circuit_breaker_cooldown: env_parse("KAFKA_CIRCUIT_BREAKER_COOLDOWN", 300),
            database_url,
            db_max_connections: env_parse("DB_MAX_CONNECTIONS", 10),
            log_level: env_or("LOG_LEVEL", "info"),
            require_meeting_point_first: env_flag("REQUIRE_MEETING_POINT_FIRST", false),
            enforce_stop_order: env_flag("ENFORCE_STOP_ORDER", false),
            progress_event_capacity: env_parse("PROGRESS_EVENT_CAPACITY", 256),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Missing or unparsable values fall back to `default`.
fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|v| parse_flag(&v))
        .unwrap_or(default)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
