use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use super::schema::{HubResolution, Topic};
use super::{HubError, PayloadHandler, SyncTransport};
use crate::bot::pending::PendingCommandTable;

/// Listens for hub resolutions addressed to this process and settles the
/// matching pending commands.
pub struct HubDispatcher {
    transport: Arc<dyn SyncTransport>,
    pending: Arc<PendingCommandTable>,
    process_id: String,
}

impl HubDispatcher {
    pub fn new(transport: Arc<dyn SyncTransport>, pending: Arc<PendingCommandTable>, process_id: impl Into<String>) -> Self {
        Self {
            transport,
            pending,
            process_id: process_id.into(),
        }
    }

    pub async fn start(&self) -> Result<(), HubError> {
        for topic in [Topic::Proceed, Topic::NoCapacity] {
            let pending = self.pending.clone();
            let process_id = self.process_id.clone();
            let handler: PayloadHandler = Arc::new(move |payload| {
                handle_payload(&pending, &process_id, &payload);
            });
            self.transport.subscribe(topic.as_str(), handler).await?;
        }

        info!(process_id = %self.process_id, "📡 Listening for hub resolutions");
        Ok(())
    }
}

/// Returns whether the payload settled a pending command.
fn handle_payload(pending: &PendingCommandTable, process_id: &str, payload: &[u8]) -> bool {
    let message = match HubResolution::decode(payload) {
        Ok(message) => message,
        Err(e) => {
            warn!("Ignoring malformed hub message: {}", e);
            return false;
        }
    };

    if !message.is_addressed_to(process_id) {
        trace!(correlation_id = %message.correlation_id, "Resolution for another process");
        return false;
    }

    let Some(resolution) = message.resolution() else {
        debug!(topic = message.topic.as_str(), "Not a resolution topic");
        return false;
    };

    pending.resolve(message.correlation_id, resolution)
}
