//! Topic-based broadcast of telemetry samples.
//!
//! Uses [`tokio::sync::broadcast`] channels so that every subscriber
//! receives every sample and a slow subscriber never blocks the control
//! loop: it lags and loses the oldest samples instead.
//!
//! | Topic | Traffic |
//! |---|---|
//! | [`Topic::Admittance`] | Per-tick trace of every admittance switch |
//! | [`Topic::State`] | Downsampled robot state and posture reference |
//! | [`Topic::Supervisor`] | Stack switches and control-norm events |

use tokio::sync::broadcast;
use tracing::warn;
use wbc_types::{TelemetrySample, WbcError};

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Admittance,
    State,
    Supervisor,
}

/// Shared telemetry bus.  Clones share the same channels.
#[derive(Clone, Debug)]
pub struct TelemetryBus {
    admittance: broadcast::Sender<TelemetrySample>,
    state: broadcast::Sender<TelemetrySample>,
    supervisor: broadcast::Sender<TelemetrySample>,
}

impl TelemetryBus {
    /// Create a bus; `capacity` applies to every topic independently.
    pub fn new(capacity: usize) -> Self {
        let (admittance, _) = broadcast::channel(capacity);
        let (state, _) = broadcast::channel(capacity);
        let (supervisor, _) = broadcast::channel(capacity);
        Self {
            admittance,
            state,
            supervisor,
        }
    }

    /// Publish `sample` on `topic`.
    ///
    /// Returns the number of subscribers handed the sample, or
    /// [`WbcError::Channel`] when nobody listens on the topic.
    pub fn publish_to(&self, topic: Topic, sample: TelemetrySample) -> Result<usize, WbcError> {
        self.sender(topic)
            .send(sample)
            .map_err(|_| WbcError::Channel(format!("No subscribers for topic {topic:?}")))
    }

    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.sender(topic).subscribe(),
        }
    }

    /// Subscribe to `topic`, keeping only samples whose source starts with
    /// `prefix`.
    pub fn subscribe_source(&self, topic: Topic, prefix: impl Into<String>) -> TelemetrySubscriber {
        TelemetrySubscriber {
            prefix: prefix.into(),
            receiver: self.sender(topic).subscribe(),
        }
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.sender(topic).receiver_count()
    }

    fn sender(&self, topic: Topic) -> &broadcast::Sender<TelemetrySample> {
        match topic {
            Topic::Admittance => &self.admittance,
            Topic::State => &self.state,
            Topic::Supervisor => &self.supervisor,
        }
    }
}

impl Default for TelemetryBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Receivers
// ────────────────────────────────────────────────────────────────────────────

/// Receiver bound to one [`Topic`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<TelemetrySample>,
}

impl TopicReceiver {
    /// Wait for the next sample.  `Lagged(n)` reports `n` dropped samples;
    /// `Closed` means the bus is gone.
    pub async fn recv(&mut self) -> Result<TelemetrySample, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Next sample if one is already buffered.
    pub fn try_recv(&mut self) -> Result<TelemetrySample, broadcast::error::TryRecvError> {
        self.receiver.try_recv()
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }
}

/// Receiver filtering one topic by sample source.
pub struct TelemetrySubscriber {
    prefix: String,
    receiver: broadcast::Receiver<TelemetrySample>,
}

impl TelemetrySubscriber {
    /// Next matching sample, `None` once the bus is closed.  Lag is logged
    /// and skipped.
    pub async fn recv(&mut self) -> Option<TelemetrySample> {
        loop {
            match self.receiver.recv().await {
                Ok(sample) if sample.source.starts_with(&self.prefix) => return Some(sample),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(prefix = %self.prefix, lagged_by = n, "telemetry subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
