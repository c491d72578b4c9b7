//! `wbc-supervisor` – stack selection and transition arbitration.
//!
//! # Modules
//!
//! - [`stack`] – [`Stack`][stack::Stack]: an ordered list of tasks solved as
//!   one control law.
//! - [`mux`] – [`StackSelector`][mux::StackSelector]: the N-way selector
//!   deciding which stack drives the command output.
//! - [`supervisor`] – [`SupervisorBuilder`][supervisor::SupervisorBuilder] and
//!   [`StackSupervisor`][supervisor::StackSupervisor]: registered
//!   transitions, consistency checks, one-shot pre/post actions, queue
//!   control and the per-tick evaluation.

pub mod mux;
pub mod stack;
pub mod supervisor;

pub use mux::StackSelector;
pub use stack::Stack;
pub use supervisor::{KEEP_POSTURE, KEEP_POSTURE_TASK, RelatchPolicy, StackSupervisor, SupervisorBuilder, SupervisorConfig};
