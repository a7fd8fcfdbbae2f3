//! Broker capabilities and their Kafka implementations.
//!
//! The connectors and the publisher depend on the [`TopicConsumer`] and
//! [`FeedProducer`] traits only; the rdkafka-backed types below are wired in
//! by the binary, and the tests substitute scripted fakes.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::{Message, Offset, TopicPartitionList};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error(transparent)]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("{0}")]
    Other(String),
}

/// One record fetched from a topic. Offsets are carried along so a batch can
/// be committed long after the fetch.
#[derive(Debug, Clone)]
pub struct BrokerMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: String,
    pub payload: Vec<u8>,
}

#[async_trait]
pub trait TopicConsumer: Send + Sync {
    fn topic(&self) -> &str;

    /// Block until the next record arrives.
    async fn fetch(&self) -> Result<BrokerMessage, BrokerError>;

    /// Commit the given records' offsets for the consumer group.
    async fn commit(&self, messages: &[BrokerMessage]) -> Result<(), BrokerError>;
}

#[async_trait]
pub trait FeedProducer: Send + Sync {
    /// Publish a batch; either the whole batch is acknowledged or an error
    /// is returned and the caller keeps the batch for a retry.
    async fn write_messages(&self, messages: Vec<FeedMessage>) -> Result<(), BrokerError>;
}

#[derive(Debug, Clone)]
pub struct FeedMessage {
    pub key: String,
    pub payload: Vec<u8>,
}

/// Connection parameters shared by every consumer and the producer.
#[derive(Debug, Clone)]
pub struct KafkaConfig {
    pub host: String,
    pub group_id: String,
    pub timeout: Duration,
    pub attempts: i32,
}

// ---------------------------------------------------------------------------
// rdkafka-backed implementations
// ---------------------------------------------------------------------------

pub struct KafkaTopicConsumer {
    topic: String,
    consumer: StreamConsumer,
}

impl KafkaTopicConsumer {
    pub fn subscribe(config: &KafkaConfig, topic: &str) -> Result<Self, BrokerError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.host)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("socket.timeout.ms", config.timeout.as_millis().to_string())
            .create()?;
        consumer.subscribe(&[topic])?;
        Ok(Self {
            topic: topic.to_string(),
            consumer,
        })
    }
}

#[async_trait]
impl TopicConsumer for KafkaTopicConsumer {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn fetch(&self) -> Result<BrokerMessage, BrokerError> {
        let message = self.consumer.recv().await?;
        Ok(BrokerMessage {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            key: message
                .key()
                .map(|key| String::from_utf8_lossy(key).into_owned())
                .unwrap_or_default(),
            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        })
    }

    async fn commit(&self, messages: &[BrokerMessage]) -> Result<(), BrokerError> {
        // Commit the highest offset seen per partition, +1 per the group
        // offset convention.
        let mut next_offsets: HashMap<(String, i32), i64> = HashMap::new();
        for message in messages {
            let next = next_offsets
                .entry((message.topic.clone(), message.partition))
                .or_insert(message.offset + 1);
            *next = (*next).max(message.offset + 1);
        }

        let mut list = TopicPartitionList::new();
        for ((topic, partition), offset) in next_offsets {
            list.add_partition_offset(&topic, partition, Offset::Offset(offset))?;
        }
        self.consumer.commit(&list, CommitMode::Sync)?;
        Ok(())
    }
}

pub struct KafkaFeedProducer {
    topic: String,
    producer: FutureProducer,
    timeout: Duration,
}

impl KafkaFeedProducer {
    pub fn connect(config: &KafkaConfig, topic: &str) -> Result<Self, BrokerError> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &config.host)
            // same key → same partition, so per-student feed order holds
            .set("partitioner", "murmur2_random")
            .set("message.timeout.ms", config.timeout.as_millis().to_string());
        if config.attempts > 0 {
            client_config.set("message.send.max.retries", config.attempts.to_string());
        }

        Ok(Self {
            topic: topic.to_string(),
            producer: client_config.create()?,
            timeout: config.timeout,
        })
    }
}

#[async_trait]
impl FeedProducer for KafkaFeedProducer {
    async fn write_messages(&self, messages: Vec<FeedMessage>) -> Result<(), BrokerError> {
        for message in &messages {
            self.producer
                .send(
                    FutureRecord::to(&self.topic)
                        .key(&message.key)
                        .payload(&message.payload),
                    Timeout::After(self.timeout),
                )
                .await
                .map_err(|(error, _)| BrokerError::Kafka(error))?;
        }
        Ok(())
    }
}
