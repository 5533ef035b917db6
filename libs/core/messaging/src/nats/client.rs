//! NATS JetStream implementation of [`Publisher`] and [`QueueClient`].

use crate::client::{Publisher, QueueClient};
use crate::error::QueueError;
use crate::handler::MessageHandler;
use crate::nats::config::NatsConfig;
use crate::nats::consumer::{headers, run_fetch_loop};
use async_nats::jetstream::consumer::pull::Config as ConsumerConfig;
use async_nats::jetstream::consumer::AckPolicy;
use async_nats::jetstream::stream::Config as StreamConfig;
use async_nats::jetstream::Context;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

struct Subscription {
    topic: String,
    handler: Arc<dyn MessageHandler>,
}

/// Queue client backed by NATS JetStream.
///
/// Every topic is a subject of the work stream and gets its own durable pull
/// consumer. Broker-side deliveries are unlimited: the handler owns the
/// dead-letter threshold through the redelivery count.
pub struct NatsQueueClient {
    jetstream: Context,
    config: Arc<NatsConfig>,
    subscriptions: Mutex<Vec<Subscription>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
}

impl NatsQueueClient {
    /// Connect to the server named by `config.url`.
    pub async fn connect(config: NatsConfig) -> Result<Self, QueueError> {
        let mut options = async_nats::ConnectOptions::new().name(config.consumer_prefix.as_str());
        if let Some((user, password)) = &config.credentials {
            options = options.user_and_password(user.clone(), password.clone());
        }

        let client = options
            .connect(config.url.as_str())
            .await
            .map_err(|e| QueueError::Connection(e.to_string()))?;

        info!(url = %config.url, "Connected to NATS");

        Ok(Self::from_client(client, config))
    }

    /// Wrap an existing connection.
    pub fn from_client(client: async_nats::Client, config: NatsConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            jetstream: async_nats::jetstream::new(client),
            config: Arc::new(config),
            subscriptions: Mutex::new(Vec::new()),
            workers: Mutex::new(Vec::new()),
            shutdown_tx,
        }
    }

    /// The client configuration.
    pub fn config(&self) -> &NatsConfig {
        &self.config
    }

    /// Ensure the work stream covers `topics` and the DLQ stream covers
    /// their dead-letter subjects.
    pub async fn provision(&self, topics: &[String]) -> Result<(), QueueError> {
        let dead_letters: Vec<String> = topics
            .iter()
            .map(|t| self.config.dead_letter_subject(t))
            .collect();

        self.ensure_stream(&self.config.stream_name, topics, self.config.max_age)
            .await?;
        self.ensure_stream(&self.config.dlq_stream, &dead_letters, self.config.dlq_max_age)
            .await?;
        Ok(())
    }

    async fn ensure_stream(
        &self,
        name: &str,
        subjects: &[String],
        max_age: Duration,
    ) -> Result<(), QueueError> {
        match self.jetstream.get_stream(name).await {
            Ok(mut stream) => {
                let info = stream.info().await.map_err(QueueError::stream)?;
                let mut config = info.config.clone();
                let missing: Vec<String> = subjects
                    .iter()
                    .filter(|s| !config.subjects.contains(*s))
                    .cloned()
                    .collect();

                if missing.is_empty() {
                    debug!(stream = %name, "Stream already exists");
                    return Ok(());
                }

                info!(stream = %name, subjects = ?missing, "Adding subjects to stream");
                config.subjects.extend(missing);
                self.jetstream
                    .update_stream(&config)
                    .await
                    .map_err(QueueError::stream)?;
                Ok(())
            }
            Err(_) => {
                info!(stream = %name, subjects = ?subjects, "Creating stream");
                self.jetstream
                    .create_stream(StreamConfig {
                        name: name.to_string(),
                        subjects: subjects.to_vec(),
                        max_age,
                        ..Default::default()
                    })
                    .await
                    .map_err(QueueError::stream)?;
                Ok(())
            }
        }
    }

    async fn consumer_for(
        &self,
        topic: &str,
    ) -> Result<crate::nats::consumer::PullConsumer, QueueError> {
        let stream = self
            .jetstream
            .get_stream(&self.config.stream_name)
            .await
            .map_err(QueueError::stream)?;

        let durable_name = self.config.durable_name(topic);
        stream
            .get_or_create_consumer(
                &durable_name,
                ConsumerConfig {
                    durable_name: Some(durable_name.clone()),
                    name: Some(durable_name.clone()),
                    ack_policy: AckPolicy::Explicit,
                    ack_wait: self.config.ack_wait,
                    max_deliver: -1,
                    filter_subject: topic.to_string(),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| QueueError::subscribe(topic, e.to_string()))
    }
}

#[async_trait]
impl Publisher for NatsQueueClient {
    async fn publish(
        &self,
        topic: &str,
        body: &[u8],
        properties: &HashMap<String, String>,
    ) -> Result<(), QueueError> {
        let ack = self
            .jetstream
            .publish_with_headers(topic.to_string(), headers(properties), body.to_vec().into())
            .await
            .map_err(|e| QueueError::publish(topic, e.to_string()))?
            .await
            .map_err(|e| QueueError::publish(topic, e.to_string()))?;

        debug!(
            topic = %topic,
            stream = %ack.stream,
            sequence = ack.sequence,
            "Published message"
        );

        Ok(())
    }
}

#[async_trait]
impl QueueClient for NatsQueueClient {
    async fn subscribe(
        &self,
        topic: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), QueueError> {
        if !self.workers.lock().await.is_empty() {
            return Err(QueueError::State(
                "cannot subscribe after start".to_string(),
            ));
        }

        let mut subscriptions = self.subscriptions.lock().await;
        if subscriptions.iter().any(|s| s.topic == topic) {
            warn!(topic = %topic, "Topic already subscribed, ignoring");
            return Ok(());
        }

        subscriptions.push(Subscription {
            topic: topic.to_string(),
            handler,
        });
        Ok(())
    }

    async fn start(&self) -> Result<(), QueueError> {
        let subscriptions = self.subscriptions.lock().await;
        let mut workers = self.workers.lock().await;
        if !workers.is_empty() {
            return Err(QueueError::State("already started".to_string()));
        }

        let topics: Vec<String> = subscriptions.iter().map(|s| s.topic.clone()).collect();
        self.provision(&topics).await?;

        for subscription in subscriptions.iter() {
            let consumer = self.consumer_for(&subscription.topic).await?;
            workers.push(tokio::spawn(run_fetch_loop(
                consumer,
                subscription.topic.clone(),
                subscription.handler.clone(),
                self.config.clone(),
                self.shutdown_tx.subscribe(),
            )));
        }

        info!(
            stream = %self.config.stream_name,
            topics = ?topics,
            "NATS queue client started"
        );
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), QueueError> {
        let _ = self.shutdown_tx.send(true);

        let workers: Vec<JoinHandle<()>> = self.workers.lock().await.drain(..).collect();
        for worker in workers {
            if let Err(e) = worker.await {
                error!(error = %e, "Fetch loop panicked");
            }
        }

        info!("NATS queue client stopped");
        Ok(())
    }
}
