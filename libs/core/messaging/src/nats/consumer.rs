//! Pull-consumer fetch loop feeding a [`MessageHandler`].

use crate::handler::{dispatch, MessageHandler};
use crate::message::{Disposition, QueueMessage};
use crate::nats::config::NatsConfig;
use crate::QueueError;
use async_nats::header::{HeaderMap, NATS_MESSAGE_ID};
use async_nats::jetstream::consumer::pull::Config as ConsumerConfig;
use async_nats::jetstream::consumer::Consumer;
use async_nats::jetstream::{AckKind, Message};
use futures::StreamExt;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant};
use tracing::{debug, error, info, warn};

pub(crate) type PullConsumer = Consumer<ConsumerConfig>;

/// Fetch and dispatch messages for one topic until shutdown is signalled.
///
/// In-flight messages of the current batch are finished before returning.
pub(crate) async fn run_fetch_loop(
    consumer: PullConsumer,
    topic: String,
    handler: Arc<dyn MessageHandler>,
    config: Arc<NatsConfig>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    info!(
        topic = %topic,
        handler = handler.name(),
        max_concurrent = config.max_concurrent_messages,
        "Starting fetch loop"
    );

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let batch = tokio::select! {
            _ = shutdown_rx.changed() => break,
            batch = fetch_batch(&consumer, &config) => batch,
        };

        match batch {
            Ok(messages) if messages.is_empty() => continue,
            Ok(messages) => {
                process_batch(&messages, &topic, handler.as_ref(), &config).await;
            }
            Err(e) => {
                error!(topic = %topic, error = %e, "Error fetching batch");
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                }
            }
        }
    }

    info!(topic = %topic, "Fetch loop stopped");
}

async fn fetch_batch(
    consumer: &PullConsumer,
    config: &NatsConfig,
) -> Result<Vec<Message>, QueueError> {
    let mut messages = consumer
        .fetch()
        .max_messages(config.batch_size)
        .expires(config.fetch_timeout)
        .messages()
        .await
        .map_err(QueueError::stream)?;

    let mut batch = Vec::with_capacity(config.batch_size);
    while let Some(message) = messages.next().await {
        match message {
            Ok(message) => batch.push(message),
            Err(e) => warn!(error = %e, "Error receiving message"),
        }
    }

    Ok(batch)
}

/// Handle a fetched batch, keeping every unsettled message alive on the
/// broker until its handler has answered.
///
/// Messages waiting for a concurrency slot count as unsettled too, so a
/// slow batch never outlives `ack_wait`.
async fn process_batch(
    messages: &[Message],
    topic: &str,
    handler: &dyn MessageHandler,
    config: &NatsConfig,
) {
    let settled: Vec<AtomicBool> = messages.iter().map(|_| AtomicBool::new(false)).collect();

    let work = futures::stream::iter(messages.iter().zip(&settled)).for_each_concurrent(
        config.max_concurrent_messages,
        |(message, done)| async move {
            process_message(message, topic, handler, config).await;
            done.store(true, Ordering::Release);
        },
    );

    with_progress(messages, &settled, config.progress_interval(), work, |message| async move {
        if let Err(e) = message.ack_with(AckKind::Progress).await {
            debug!(topic = %topic, error = %e, "Failed to extend ack deadline");
        }
    })
    .await;
}

/// Drive `work` to completion, calling `progress` for every item not yet
/// marked in `settled` once per `interval`.
pub(crate) async fn with_progress<'a, T, W, P, F>(
    items: &'a [T],
    settled: &[AtomicBool],
    interval: Duration,
    work: W,
    mut progress: P,
) where
    W: Future<Output = ()>,
    P: FnMut(&'a T) -> F,
    F: Future<Output = ()>,
{
    tokio::pin!(work);
    let mut ticker = interval_at(Instant::now() + interval, interval);

    loop {
        tokio::select! {
            _ = &mut work => return,
            _ = ticker.tick() => {
                for (item, done) in items.iter().zip(settled) {
                    if !done.load(Ordering::Acquire) {
                        progress(item).await;
                    }
                }
            }
        }
    }
}

async fn process_message(
    message: &Message,
    topic: &str,
    handler: &dyn MessageHandler,
    config: &NatsConfig,
) {
    let (sequence, delivered) = match message.info() {
        Ok(info) => (info.stream_sequence, info.delivered),
        Err(e) => {
            warn!(error = %e, "Failed to get message info, using defaults");
            (0, 1)
        }
    };

    let queue_message = QueueMessage {
        topic: topic.to_string(),
        id: message_id(message.headers.as_ref(), sequence),
        body: message.payload.to_vec(),
        redelivery_count: redelivery_count(delivered),
        properties: properties(message.headers.as_ref()),
    };

    if queue_message.is_redelivery() {
        debug!(
            topic = %topic,
            message_id = %queue_message.id,
            redelivery_count = queue_message.redelivery_count,
            "Processing redelivered message"
        );
    }

    let result = match dispatch(handler, std::slice::from_ref(&queue_message)).await {
        Disposition::Acknowledge => message.ack().await,
        Disposition::RetryLater => {
            let delay = config
                .redelivery_backoff
                .delay(queue_message.redelivery_count);
            message.ack_with(AckKind::Nak(Some(delay))).await
        }
    };

    if let Err(e) = result {
        warn!(
            topic = %topic,
            message_id = %queue_message.id,
            error = %e,
            "Failed to acknowledge message"
        );
    }
}

/// Broker delivery count (1 on first delivery) to redelivery count.
pub(crate) fn redelivery_count(delivered: i64) -> u32 {
    u32::try_from(delivered.saturating_sub(1).max(0)).unwrap_or(u32::MAX)
}

/// Publisher-supplied `Nats-Msg-Id`, falling back to the stream sequence.
pub(crate) fn message_id(headers: Option<&HeaderMap>, sequence: u64) -> String {
    headers
        .and_then(|h| h.get(NATS_MESSAGE_ID))
        .map(|v| v.to_string())
        .unwrap_or_else(|| sequence.to_string())
}

/// Flatten message headers to a property map (first value per header).
pub(crate) fn properties(headers: Option<&HeaderMap>) -> HashMap<String, String> {
    let Some(headers) = headers else {
        return HashMap::new();
    };

    headers
        .iter()
        .filter_map(|(name, values)| {
            values
                .first()
                .map(|value| (name.to_string(), value.to_string()))
        })
        .collect()
}

/// Header map carrying `properties`.
pub(crate) fn headers(properties: &HashMap<String, String>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (key, value) in properties {
        headers.insert(key.as_str(), value.as_str());
    }
    headers
}
