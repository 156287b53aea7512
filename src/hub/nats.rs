use async_nats::{connection::State, Client, ConnectOptions, Event};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::{HubError, PayloadHandler, SyncTransport};

const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

fn reconnect_delay(attempts: usize) -> Duration {
    let exponent = u32::try_from(attempts).unwrap_or(u32::MAX);
    let delay = Duration::from_secs(std::cmp::min(
        MAX_RECONNECT_DELAY.as_secs(),
        2u64.saturating_pow(exponent),
    ));
    debug!(attempts, delay_secs = delay.as_secs(), "Hub reconnect delay");
    delay
}

async fn handle_event(event: Event) {
    match event {
        Event::Connected => info!("🔗 Hub connected"),
        Event::Disconnected => warn!("🔌 Hub disconnected, commands run locally until it is back"),
        Event::ServerError(err) => warn!(error = %err, "Hub server error"),
        Event::ClientError(err) => warn!(error = %err, "Hub client error"),
        Event::SlowConsumer(sid) => warn!(sid, "Hub slow consumer detected"),
        Event::LameDuckMode => warn!("Hub server entering lame duck mode"),
        Event::Closed => info!("Hub connection closed"),
        Event::Draining => info!("Hub connection draining"),
    }
}

/// [`SyncTransport`] over NATS. Topics map to `<prefix>.<topic>` subjects.
pub struct NatsTransport {
    client: Client,
    subject_prefix: String,
    shutdown: CancellationToken,
}

impl NatsTransport {
    /// Starts connecting to `servers`. The first connection is retried in the
    /// background, so this returns before the hub is reachable.
    pub async fn connect(
        servers: &[String],
        subject_prefix: impl Into<String>,
        process_id: &str,
        shutdown: CancellationToken,
    ) -> Result<Self, HubError> {
        info!(servers = ?servers, "Connecting to hub");

        let client = ConnectOptions::new()
            .name(format!("ensemble-music-{}", process_id))
            .retry_on_initial_connect()
            .connection_timeout(CONNECTION_TIMEOUT)
            .reconnect_delay_callback(reconnect_delay)
            .event_callback(|event| async move { handle_event(event).await })
            .connect(servers)
            .await
            .map_err(|e| HubError::Connect(e.to_string()))?;

        Ok(Self {
            client,
            subject_prefix: subject_prefix.into(),
            shutdown,
        })
    }

    fn subject(&self, topic: &str) -> String {
        subject_for(&self.subject_prefix, topic)
    }
}

fn subject_for(prefix: &str, topic: &str) -> String {
    format!("{}.{}", prefix, topic)
}

#[async_trait]
impl SyncTransport for NatsTransport {
    fn is_connected(&self) -> bool {
        matches!(self.client.connection_state(), State::Connected)
    }

    async fn subscribe(&self, topic: &str, handler: PayloadHandler) -> Result<(), HubError> {
        let subject = self.subject(topic);
        debug!("Subscribing to subject: {}", subject);

        let mut subscriber = self
            .client
            .subscribe(subject.clone())
            .await
            .map_err(|e| HubError::Subscribe {
                subject: subject.clone(),
                reason: e.to_string(),
            })?;

        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    message = subscriber.next() => match message {
                        Some(message) => {
                            trace!("Received {} bytes on {}", message.payload.len(), subject);
                            handler(message.payload);
                        }
                        None => {
                            warn!("Subscription to {} ended", subject);
                            break;
                        }
                    }
                }
            }
        });

        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), HubError> {
        let subject = self.subject(topic);
        trace!("Publishing to subject: {}, size: {} bytes", subject, payload.len());

        self.client
            .publish(subject.clone(), payload)
            .await
            .map_err(|e| HubError::Publish {
                subject: subject.clone(),
                reason: e.to_string(),
            })?;

        debug!("Published message to {}", subject);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconnect_delay_backs_off_exponentially() {
        assert_eq!(reconnect_delay(0).as_secs(), 1);
        assert_eq!(reconnect_delay(1).as_secs(), 2);
        assert_eq!(reconnect_delay(4).as_secs(), 16);
    }

    #[test]
    fn reconnect_delay_caps_at_max() {
        assert_eq!(reconnect_delay(5).as_secs(), 30);
        assert_eq!(reconnect_delay(usize::MAX).as_secs(), 30);
    }

    #[test]
    fn subjects_are_prefixed() {
        assert_eq!(subject_for("ensemble", "proceed"), "ensemble.proceed");
    }

    #[tokio::test]
    async fn handles_every_event_variant() {
        use async_nats::{ClientError, ServerError};

        handle_event(Event::Connected).await;
        handle_event(Event::Disconnected).await;
        handle_event(Event::ServerError(ServerError::Other("test".to_string()))).await;
        handle_event(Event::ClientError(ClientError::Other("test".to_string()))).await;
        handle_event(Event::SlowConsumer(7)).await;
        handle_event(Event::LameDuckMode).await;
        handle_event(Event::Closed).await;
        handle_event(Event::Draining).await;
    }
}
