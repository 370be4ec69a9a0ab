pub mod config;
pub mod consumer;


pub use config::RabbitMqConfig;
pub use consumer::{MatchCompletedMessage, MatchResultConsumer, MessagingError};
