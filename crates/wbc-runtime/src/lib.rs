//! `wbc-runtime` – the real-time side of the whole-body controller.
//!
//! # Modules
//!
//! - [`control_loop`] – [`ControlLoop`][control_loop::ControlLoop]: the
//!   periodic loop driving a [`StackSupervisor`][wbc_supervisor::StackSupervisor],
//!   with a [`ControlHandle`][control_loop::ControlHandle] through which
//!   other tasks activate transitions and steer the reference queue.
//! - [`monitor`] – [`ControlNormMonitor`][monitor::ControlNormMonitor]: edge
//!   detection on the command norm.
//! - [`sim_engine`] – [`SimulatedEngine`][sim_engine::SimulatedEngine]: an
//!   integrator robot with optional contact feedback, for running the loop
//!   without hardware.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: subscriber
//!   setup with optional OTLP span export.

pub mod control_loop;
pub mod monitor;
pub mod sim_engine;
pub mod telemetry;

pub use control_loop::{ControlHandle, ControlLoop, ControlLoopConfig, SupervisorCommand};
pub use monitor::ControlNormMonitor;
pub use sim_engine::SimulatedEngine;
pub use telemetry::{TracerProviderGuard, init_tracing};
