use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use scorebook_events::{
    DISCIPLINES_TOPIC, META_EVENTS_TOPIC, RAW_LESSONS_TOPIC, RAW_SCORES_TOPIC,
    SCORES_CHANGES_FEED_TOPIC,
};
use scorebook_store::writers::{
    default_education_year_policy, DisciplineWriter, EventWriter, LessonTypesWriter, LessonWriter,
    ScoreWriter, YearChangeWriter,
};
use scorebook_store::{
    LessonExistChecker, MaxLessonTracker, RedisStore, ScoresFeedQueue, Store,
};

use crate::broker::{KafkaConfig, KafkaFeedProducer, KafkaTopicConsumer, TopicConsumer};
use crate::config::Config;
use crate::connector::TopicConnector;
use crate::meta_connector::MetaEventsConnector;
use crate::publisher::ScoresFeedPublisher;
use crate::supervisor::{Connector, Supervisor};

const CONSUMER_GROUP: &str = "storage-writer";

/// Build the worker fleet and run it until a shutdown signal. Every error
/// returned from here is a startup error: once the supervisor runs, failures
/// are logged and retried, not propagated.
pub async fn run() -> Result<()> {
    let env_file = Path::new(".env").exists().then(|| Path::new(".env"));
    let config = Config::load(env_file)?;

    let store: Arc<dyn Store> = Arc::new(
        RedisStore::connect(&config.redis_dsn)
            .await
            .context("failed to connect to redis")?,
    );

    let kafka = KafkaConfig {
        host: config.kafka_host.clone(),
        group_id: CONSUMER_GROUP.to_string(),
        timeout: config.kafka_timeout,
        attempts: config.kafka_attempts,
    };

    let (max_lesson, _max_lesson_changes) = MaxLessonTracker::load(Arc::clone(&store))
        .await
        .context("failed to load max lesson id")?;

    let producer = Arc::new(
        KafkaFeedProducer::connect(&kafka, SCORES_CHANGES_FEED_TOPIC)
            .context("failed to create feed producer")?,
    );
    let publisher = Arc::new(ScoresFeedPublisher::new(
        producer,
        LessonExistChecker::new(Arc::clone(&store)),
    ));

    let score_writer: Arc<dyn EventWriter> = Arc::new(ScoreWriter::new(
        Arc::clone(&store),
        Arc::clone(&publisher) as Arc<dyn ScoresFeedQueue>,
    ));
    let lesson_writer: Arc<dyn EventWriter> =
        Arc::new(LessonWriter::new(Arc::clone(&store), max_lesson));
    let discipline_writer: Arc<dyn EventWriter> =
        Arc::new(DisciplineWriter::new(Arc::clone(&store)));

    // Two connectors each for the high-volume topics; their partitions are
    // balanced across the pool by the consumer group.
    let mut connectors: Vec<Arc<dyn Connector>> = Vec::new();
    for _ in 0..2 {
        connectors.push(Arc::new(TopicConnector::new(
            subscribe(&kafka, RAW_SCORES_TOPIC)?,
            Arc::clone(&store),
            Arc::clone(&score_writer),
        )));
    }
    for _ in 0..2 {
        connectors.push(Arc::new(TopicConnector::new(
            subscribe(&kafka, RAW_LESSONS_TOPIC)?,
            Arc::clone(&store),
            Arc::clone(&lesson_writer),
        )));
    }
    connectors.push(Arc::new(TopicConnector::new(
        subscribe(&kafka, DISCIPLINES_TOPIC)?,
        Arc::clone(&store),
        discipline_writer,
    )));
    connectors.push(Arc::new(MetaEventsConnector::new(
        subscribe(&kafka, META_EVENTS_TOPIC)?,
        Arc::new(YearChangeWriter::new(
            Arc::clone(&store),
            default_education_year_policy,
        )),
        Arc::new(LessonTypesWriter::new(Arc::clone(&store))),
    )));

    info!(connectors = connectors.len(), "starting workers");
    Supervisor::new(connectors, publisher).run().await;

    // parting snapshot; the store keeps running without us
    if let Err(e) = store.bgsave().await {
        warn!(error = %e, "final snapshot request failed");
    }
    Ok(())
}

fn subscribe(kafka: &KafkaConfig, topic: &str) -> Result<Arc<dyn TopicConsumer>> {
    let consumer = KafkaTopicConsumer::subscribe(kafka, topic)
        .with_context(|| format!("failed to subscribe to {topic}"))?;
    Ok(Arc::new(consumer))
}
