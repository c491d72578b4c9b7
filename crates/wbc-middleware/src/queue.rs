//! Bounded reference queue between the planner feed and the control loop.
//!
//! Producers push samples through a [`ReferenceFeed`] from any task.  The
//! loop owns the [`ReferenceQueue`]: each tick it pumps pending samples into
//! per-channel buffers without blocking, then, once reading has started,
//! delivers at most one sample per channel to every consumer of that channel.
//!
//! # Example
//!
//! ```rust
//! use wbc_middleware::queue::reference_channel;
//! use wbc_types::{SignalRef, SignalValue, ValueType};
//!
//! let (feed, mut queue) = reference_channel(16);
//! queue
//!     .register("/planner/target/position", ValueType::Vector, &[SignalRef::new("feature_des___posture", "errorIN")])
//!     .unwrap();
//! feed.try_send("/planner/target/position", SignalValue::Vector(vec![0.1, 0.2])).unwrap();
//! assert_eq!(queue.pump(), 1);
//! assert_eq!(queue.buffered("/planner/target/position"), 1);
//! ```

use std::collections::{BTreeMap, VecDeque};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use wbc_types::{GraphEngine, SignalRef, SignalValue, Tick, ValueType, WbcError};

/// One planner sample addressed to a resolved channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceSample {
    pub channel: String,
    pub value: SignalValue,
}

/// Create a connected feed/queue pair.  `capacity` bounds both the transport
/// and each per-channel buffer.
pub fn reference_channel(capacity: usize) -> (ReferenceFeed, ReferenceQueue) {
    let capacity = capacity.max(1);
    let (sender, receiver) = mpsc::channel(capacity);
    (
        ReferenceFeed { sender },
        ReferenceQueue {
            receiver,
            channels: BTreeMap::new(),
            capacity,
            read_from: None,
        },
    )
}

// ────────────────────────────────────────────────────────────────────────────
// Producer side
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ReferenceFeed {
    sender: mpsc::Sender<ReferenceSample>,
}

impl ReferenceFeed {
    /// Send a sample, waiting for transport capacity.
    pub async fn send(&self, channel: impl Into<String>, value: SignalValue) -> Result<(), WbcError> {
        let sample = ReferenceSample {
            channel: channel.into(),
            value,
        };
        self.sender
            .send(sample)
            .await
            .map_err(|e| WbcError::Channel(format!("reference queue closed: {e}")))
    }

    /// Send a sample without waiting.  Fails when the transport is full.
    pub fn try_send(&self, channel: impl Into<String>, value: SignalValue) -> Result<(), WbcError> {
        let sample = ReferenceSample {
            channel: channel.into(),
            value,
        };
        self.sender.try_send(sample).map_err(|e| match e {
            mpsc::error::TrySendError::Full(s) => {
                WbcError::Channel(format!("reference queue full, dropped sample for {}", s.channel))
            }
            mpsc::error::TrySendError::Closed(_) => WbcError::Channel("reference queue closed".to_string()),
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Loop side
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct ChannelBuffer {
    value_type: ValueType,
    consumers: Vec<SignalRef>,
    samples: VecDeque<SignalValue>,
    last: Option<SignalValue>,
}

#[derive(Debug)]
pub struct ReferenceQueue {
    receiver: mpsc::Receiver<ReferenceSample>,
    channels: BTreeMap<String, ChannelBuffer>,
    capacity: usize,
    /// First tick at which buffered samples are delivered; `None` while
    /// reading is stopped.
    read_from: Option<Tick>,
}

impl ReferenceQueue {
    /// Declare `channel` and connect `consumers` to it.  Registering a known
    /// channel again appends consumers; its value type must match.
    pub fn register(
        &mut self,
        channel: impl Into<String>,
        value_type: ValueType,
        consumers: &[SignalRef],
    ) -> Result<(), WbcError> {
        let channel = channel.into();
        match self.channels.get_mut(&channel) {
            Some(buffer) if buffer.value_type != value_type => Err(WbcError::Channel(format!(
                "channel {channel} carries {}, cannot register as {value_type}",
                buffer.value_type
            ))),
            Some(buffer) => {
                buffer.consumers.extend_from_slice(consumers);
                Ok(())
            }
            None => {
                self.channels.insert(
                    channel,
                    ChannelBuffer {
                        value_type,
                        consumers: consumers.to_vec(),
                        samples: VecDeque::with_capacity(self.capacity),
                        last: None,
                    },
                );
                Ok(())
            }
        }
    }

    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }

    /// Number of samples waiting on `channel`.
    pub fn buffered(&self, channel: &str) -> usize {
        self.channels.get(channel).map_or(0, |b| b.samples.len())
    }

    /// Last sample delivered on `channel`.
    pub fn last_value(&self, channel: &str) -> Option<&SignalValue> {
        self.channels.get(channel).and_then(|b| b.last.as_ref())
    }

    /// Move every pending sample into its channel buffer without blocking.
    /// Samples for unknown channels or of the wrong type are dropped; a full
    /// buffer drops its oldest sample.  Returns the number of samples kept.
    pub fn pump(&mut self) -> usize {
        let mut kept = 0;
        while let Ok(sample) = self.receiver.try_recv() {
            let Some(buffer) = self.channels.get_mut(&sample.channel) else {
                warn!(channel = %sample.channel, "sample for unknown channel dropped");
                continue;
            };
            if sample.value.value_type() != buffer.value_type {
                warn!(
                    channel = %sample.channel,
                    expected = %buffer.value_type,
                    actual = %sample.value.value_type(),
                    "sample of wrong type dropped"
                );
                continue;
            }
            if buffer.samples.len() >= self.capacity {
                buffer.samples.pop_front();
                warn!(channel = %sample.channel, "channel buffer full, oldest sample dropped");
            }
            buffer.samples.push_back(sample.value);
            kept += 1;
        }
        kept
    }

    /// Start delivering buffered samples from tick `from` on.
    pub fn read_queue(&mut self, from: Tick) {
        debug!(from, "reading reference queue");
        self.read_from = Some(from);
    }

    /// Stop delivering samples.  Buffers keep filling.
    pub fn stop_reading(&mut self) {
        debug!("stopped reading reference queue");
        self.read_from = None;
    }

    pub fn is_reading(&self) -> bool {
        self.read_from.is_some()
    }

    /// Drop every buffered sample, including those still in transit.
    pub fn clear_queues(&mut self) {
        while self.receiver.try_recv().is_ok() {}
        for buffer in self.channels.values_mut() {
            buffer.samples.clear();
        }
        info!(channels = self.channels.len(), "reference queues cleared");
    }

    /// Deliver one sample per channel to its consumers if reading has
    /// started by tick `t`.  Returns the number of channels delivered.
    pub fn drain(&mut self, t: Tick, engine: &mut dyn GraphEngine) -> Result<usize, WbcError> {
        match self.read_from {
            Some(from) if t >= from => {}
            _ => return Ok(0),
        }
        let mut delivered = 0;
        for buffer in self.channels.values_mut() {
            let Some(value) = buffer.samples.pop_front() else {
                continue;
            };
            for consumer in &buffer.consumers {
                engine.set_signal(consumer, value.clone())?;
            }
            buffer.last = Some(value);
            delivered += 1;
        }
        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wbc_types::TaskId;

    #[derive(Default)]
    struct RecordingEngine {
        writes: Vec<(SignalRef, SignalValue)>,
    }

    impl GraphEngine for RecordingEngine {
        fn time(&self) -> Tick {
            0
        }
        fn configuration(&self) -> Vec<f64> {
            Vec::new()
        }
        fn currents(&self) -> Vec<f64> {
            Vec::new()
        }
        fn set_signal(&mut self, signal: &SignalRef, value: SignalValue) -> Result<(), WbcError> {
            self.writes.push((signal.clone(), value));
            Ok(())
        }
        fn recompute_task(&mut self, _: &TaskId, _: Tick) -> Result<(), WbcError> {
            Ok(())
        }
        fn solve(&mut self, _: &str, _: &[TaskId], _: Tick) -> Result<Vec<f64>, WbcError> {
            Ok(Vec::new())
        }
        fn apply_control(&mut self, _: &[f64]) -> Result<(), WbcError> {
            Ok(())
        }
    }

    const POS: &str = "/planner/target/position";
    const COM: &str = "/planner/target/com";

    fn queue(capacity: usize) -> (ReferenceFeed, ReferenceQueue) {
        let (feed, mut queue) = reference_channel(capacity);
        queue
            .register(
                POS,
                ValueType::Vector,
                &[SignalRef::new("a", "errorIN"), SignalRef::new("b", "errorIN")],
            )
            .unwrap();
        queue
            .register(COM, ValueType::Vector3, &[SignalRef::new("com", "errorIN")])
            .unwrap();
        (feed, queue)
    }

    #[test]
    fn drains_one_sample_per_channel_per_tick_to_every_consumer() {
        let (feed, mut q) = queue(8);
        feed.try_send(POS, SignalValue::Vector(vec![1.0])).unwrap();
        feed.try_send(POS, SignalValue::Vector(vec![2.0])).unwrap();
        feed.try_send(COM, SignalValue::Vector3([0.0, 0.0, 0.8])).unwrap();
        assert_eq!(q.pump(), 3);

        let mut engine = RecordingEngine::default();
        q.read_queue(0);
        assert_eq!(q.drain(0, &mut engine).unwrap(), 2);
        assert_eq!(engine.writes.len(), 3);
        assert_eq!(q.last_value(POS), Some(&SignalValue::Vector(vec![1.0])));

        assert_eq!(q.drain(1, &mut engine).unwrap(), 1);
        assert_eq!(q.last_value(POS), Some(&SignalValue::Vector(vec![2.0])));
        assert_eq!(q.drain(2, &mut engine).unwrap(), 0);
    }

    #[test]
    fn nothing_is_delivered_before_the_start_tick_or_when_stopped() {
        let (feed, mut q) = queue(8);
        feed.try_send(POS, SignalValue::Vector(vec![1.0])).unwrap();
        q.pump();
        let mut engine = RecordingEngine::default();

        assert!(!q.is_reading());
        assert_eq!(q.drain(100, &mut engine).unwrap(), 0);

        q.read_queue(10);
        assert_eq!(q.drain(9, &mut engine).unwrap(), 0);
        assert_eq!(q.drain(10, &mut engine).unwrap(), 1);

        feed.try_send(POS, SignalValue::Vector(vec![2.0])).unwrap();
        q.pump();
        q.stop_reading();
        assert_eq!(q.drain(11, &mut engine).unwrap(), 0);
        assert_eq!(q.buffered(POS), 1);
    }

    #[test]
    fn malformed_samples_are_dropped() {
        let (feed, mut q) = queue(8);
        feed.try_send("/unknown", SignalValue::Scalar(1.0)).unwrap();
        feed.try_send(COM, SignalValue::Vector(vec![1.0])).unwrap();
        assert_eq!(q.pump(), 0);
        assert_eq!(q.buffered(COM), 0);
    }

    #[test]
    fn full_buffer_drops_oldest() {
        let (feed, mut q) = queue(2);
        for i in 0..2 {
            feed.try_send(POS, SignalValue::Vector(vec![f64::from(i)])).unwrap();
        }
        q.pump();
        feed.try_send(POS, SignalValue::Vector(vec![2.0])).unwrap();
        q.pump();
        assert_eq!(q.buffered(POS), 2);

        let mut engine = RecordingEngine::default();
        q.read_queue(0);
        q.drain(0, &mut engine).unwrap();
        assert_eq!(q.last_value(POS), Some(&SignalValue::Vector(vec![1.0])));
    }

    #[test]
    fn transport_full_is_reported() {
        let (feed, _q) = queue(1);
        feed.try_send(POS, SignalValue::Vector(vec![0.0])).unwrap();
        assert!(matches!(
            feed.try_send(POS, SignalValue::Vector(vec![0.0])),
            Err(WbcError::Channel(_))
        ));
    }

    #[test]
    fn clear_queues_empties_buffers_and_transport() {
        let (feed, mut q) = queue(8);
        feed.try_send(POS, SignalValue::Vector(vec![1.0])).unwrap();
        q.pump();
        feed.try_send(POS, SignalValue::Vector(vec![2.0])).unwrap();
        q.clear_queues();
        assert_eq!(q.buffered(POS), 0);
        assert_eq!(q.pump(), 0);
    }

    #[test]
    fn register_rejects_type_change_and_merges_consumers() {
        let (_feed, mut q) = queue(8);
        assert!(q.register(POS, ValueType::Scalar, &[]).is_err());
        q.register(POS, ValueType::Vector, &[SignalRef::new("c", "errorIN")])
            .unwrap();
        assert_eq!(q.channels().count(), 2);
    }

    #[tokio::test]
    async fn async_feed_reaches_the_queue() {
        let (feed, mut q) = queue(8);
        let producer = tokio::spawn(async move {
            feed.send(COM, SignalValue::Vector3([0.1, 0.0, 0.9])).await
        });
        producer.await.unwrap().unwrap();
        assert_eq!(q.pump(), 1);
    }
}
