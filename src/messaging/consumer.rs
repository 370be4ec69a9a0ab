use crate::{
    error::EngineResult,
    messaging::config::RabbitMqConfig,
    model::{
        ranking_engine::RankingEngine,
        structures::{processing::RatingDelta, sport_type::SportType}
    }
};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use lapin::{
    message::Delivery,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions, BasicRejectOptions,
        ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions
    },
    types::FieldTable,
    Channel, Connection, ConnectionProperties, ExchangeKind
};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

const CONSUMER_TAG: &str = "ranking-engine";
const PREFETCH_COUNT: u16 = 16;
const REQUEUE_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("RabbitMQ error: {0}")]
    ConnectionError(#[from] lapin::Error),

    #[error("Failed to deserialize message: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Consumer not initialized")]
    NotInitialized
}

/// Published by the match service when a match has a winner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchCompletedMessage {
    pub match_id: String,
    pub winner_id: String,
    pub loser_id: String,
    pub sport_type: SportType
}

/// MassTransit message envelope structure
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MassTransitEnvelope<T> {
    message_id: Option<String>,
    correlation_id: Option<String>,
    message: T,
    sent_time: Option<DateTime<Utc>>
}

/// What to tell the broker about a delivery once it has been handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    /// Put back on the queue, the failure may be temporary
    Requeue,
    /// Drop it, retrying cannot help
    Reject
}

/// Accepts both enveloped and bare messages.
pub fn decode(payload: &[u8]) -> Result<MatchCompletedMessage, MessagingError> {
    if let Ok(envelope) = serde_json::from_slice::<MassTransitEnvelope<MatchCompletedMessage>>(payload) {
        return Ok(envelope.message);
    }

    Ok(serde_json::from_slice(payload)?)
}

pub fn disposition(result: &EngineResult<RatingDelta>) -> Disposition {
    match result {
        Ok(_) => Disposition::Ack,
        Err(e) if e.is_retryable() => Disposition::Requeue,
        Err(_) => Disposition::Reject
    }
}

/// Feeds completed matches from RabbitMQ into the rating updater
pub struct MatchResultConsumer {
    connection: Option<Arc<Connection>>,
    channel: Option<Channel>,
    exchange: String,
    queue: String
}

impl MatchResultConsumer {
    pub fn new(exchange: String, queue: String) -> Self {
        Self {
            connection: None,
            channel: None,
            exchange,
            queue
        }
    }

    pub fn from_config(config: &RabbitMqConfig) -> Self {
        Self::new(config.exchange.clone(), config.queue.clone())
    }

    /// Creates and connects a consumer from configuration
    pub async fn connect_from_config(config: &RabbitMqConfig) -> Result<Self, MessagingError> {
        let mut consumer = Self::from_config(config);
        consumer.connect(&config.connection_url()).await?;
        Ok(consumer)
    }

    /// Connects to RabbitMQ and declares the exchange, queue and binding
    pub async fn connect(&mut self, rabbitmq_url: &str) -> Result<(), MessagingError> {
        let connection = Connection::connect(rabbitmq_url, ConnectionProperties::default()).await?;
        let connection = Arc::new(connection);

        let channel = connection.create_channel().await?;

        channel
            .exchange_declare(
                &self.exchange,
                ExchangeKind::Fanout,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default()
            )
            .await?;

        channel
            .queue_declare(
                &self.queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default()
            )
            .await?;

        channel
            .queue_bind(
                &self.queue,
                &self.exchange,
                "",
                QueueBindOptions::default(),
                FieldTable::default()
            )
            .await?;

        channel
            .basic_qos(PREFETCH_COUNT, BasicQosOptions::default())
            .await?;

        self.connection = Some(connection);
        self.channel = Some(channel);

        info!("Connected to RabbitMQ, consuming '{}' bound to '{}'", self.queue, self.exchange);

        Ok(())
    }

    /// Consumes until the broker closes the stream or `shutdown` flips to `true`.
    pub async fn run(&self, engine: Arc<RankingEngine>, mut shutdown: watch::Receiver<bool>) -> Result<(), MessagingError> {
        let channel = self.channel.as_ref().ok_or(MessagingError::NotInitialized)?;
        let mut deliveries = channel
            .basic_consume(
                &self.queue,
                CONSUMER_TAG,
                BasicConsumeOptions::default(),
                FieldTable::default()
            )
            .await?;

        loop {
            tokio::select! {
                delivery = deliveries.next() => match delivery {
                    Some(Ok(delivery)) => self.handle(&engine, delivery).await?,
                    Some(Err(e)) => return Err(e.into()),
                    None => break
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Match result consumer stopped");
        Ok(())
    }

    async fn handle(&self, engine: &RankingEngine, delivery: Delivery) -> Result<(), MessagingError> {
        let action = match decode(&delivery.data) {
            Ok(message) => {
                let result = engine
                    .update_ratings_after_match(&message.winner_id, &message.loser_id, message.sport_type)
                    .await;

                match &result {
                    Ok(delta) => debug!(
                        "Applied match {}: {} {:+.2}, {} {:+.2}",
                        message.match_id, message.winner_id, delta.winner_delta, message.loser_id, delta.loser_delta
                    ),
                    Err(e) => warn!("Match {} not applied: {}", message.match_id, e)
                }

                disposition(&result)
            }
            Err(e) => {
                warn!("Discarding undecodable match result: {}", e);
                Disposition::Reject
            }
        };

        match action {
            Disposition::Ack => delivery.ack(BasicAckOptions::default()).await?,
            Disposition::Requeue => {
                tokio::time::sleep(REQUEUE_DELAY).await;
                delivery
                    .nack(BasicNackOptions {
                        requeue: true,
                        ..Default::default()
                    })
                    .await?
            }
            Disposition::Reject => delivery.reject(BasicRejectOptions { requeue: false }).await?
        };

        Ok(())
    }

    /// Checks if the consumer is connected
    pub fn is_connected(&self) -> bool {
        self.connection.is_some() && self.channel.is_some()
    }

    /// Closes the connection to RabbitMQ
    pub async fn close(&mut self) -> Result<(), MessagingError> {
        if let Some(channel) = self.channel.take() {
            channel.close(200, "Normal shutdown").await?;
        }

        if let Some(connection) = self.connection.take() {
            if let Ok(conn) = Arc::try_unwrap(connection) {
                conn.close(200, "Normal shutdown").await?;
            }
        }

        info!("RabbitMQ connection closed");
        Ok(())
    }
}

impl Drop for MatchResultConsumer {
    fn drop(&mut self) {
        if self.is_connected() {
            warn!("Match result consumer dropped without proper closure");
        }
    }
}
