use serde::{Deserialize, Serialize};
use std::env;

const DEFAULT_EXCHANGE: &str = "matches.completed";
const DEFAULT_QUEUE: &str = "ranking-engine.match-results";

/// Configuration for RabbitMQ connection and messaging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RabbitMqConfig {
    /// RabbitMQ host address
    pub host: String,
    /// RabbitMQ username for authentication
    pub username: String,
    /// RabbitMQ password for authentication
    pub password: String,
    /// Virtual host to use (default: "/")
    pub vhost: String,
    /// Port number (default: 5672)
    pub port: u16,
    /// Fanout exchange the platform publishes completed matches to
    pub exchange: String,
    /// Durable queue this service consumes from
    pub queue: String,
    /// When false the consumer is never started
    pub enabled: bool
}

impl RabbitMqConfig {
    /// Creates a new RabbitMQ configuration from environment variables.
    /// Credentials are only required when the consumer is enabled.
    pub fn from_env() -> Result<Self, env::VarError> {
        let enabled = env::var("RABBITMQ_ENABLED")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let (username, password) = if enabled {
            (env::var("RABBITMQ_USERNAME")?, env::var("RABBITMQ_PASSWORD")?)
        } else {
            (
                env::var("RABBITMQ_USERNAME").unwrap_or_default(),
                env::var("RABBITMQ_PASSWORD").unwrap_or_default()
            )
        };

        Ok(Self {
            host: env::var("RABBITMQ_HOST").unwrap_or_else(|_| "localhost".to_string()),
            username,
            password,
            vhost: env::var("RABBITMQ_VHOST").unwrap_or_else(|_| "/".to_string()),
            port: env::var("RABBITMQ_PORT")
                .unwrap_or_else(|_| "5672".to_string())
                .parse()
                .unwrap_or(5672),
            exchange: env::var("RABBITMQ_EXCHANGE").unwrap_or_else(|_| DEFAULT_EXCHANGE.to_string()),
            queue: env::var("RABBITMQ_QUEUE").unwrap_or_else(|_| DEFAULT_QUEUE.to_string()),
            enabled
        })
    }

    /// Builds the AMQP connection URL from the configuration
    pub fn connection_url(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}/{}",
            self.username,
            self.password,
            self.host,
            self.port,
            self.vhost.replace('/', "%2F")
        )
    }
}

impl Default for RabbitMqConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            username: "admin".to_string(),
            password: "admin".to_string(),
            vhost: "/".to_string(),
            port: 5672,
            exchange: DEFAULT_EXCHANGE.to_string(),
            queue: DEFAULT_QUEUE.to_string(),
            enabled: false
        }
    }
}
