//! `wbc-middleware` – the asynchronous boundary of the controller.
//!
//! The real-time loop never awaits.  Everything produced or consumed at a
//! different pace crosses one of two structures:
//!
//! - [`queue`] – [`ReferenceFeed`][queue::ReferenceFeed] /
//!   [`ReferenceQueue`][queue::ReferenceQueue]: bounded queue of planner
//!   reference samples, drained by the loop at its own pace.
//! - [`bus`] – [`TelemetryBus`][bus::TelemetryBus]: topic-based broadcast of
//!   telemetry samples built on Tokio broadcast channels.

pub mod bus;
pub mod queue;

pub use bus::{TelemetryBus, TelemetrySubscriber, Topic, TopicReceiver};
pub use queue::{ReferenceFeed, ReferenceQueue, ReferenceSample, reference_channel};
