//! `wbc-control` – low-level control laws of the whole-body controller.
//!
//! # Modules
//!
//! - [`controllers`] – second-order closed-loop position controller and
//!   first-order force controller.
//! - [`switch`] – [`Latch`][switch::Latch] and the per-axis
//!   [`HysteresisSwitch`][switch::HysteresisSwitch] comparator pair.
//! - [`admittance`] – [`AdmittanceSwitch`][admittance::AdmittanceSwitch]:
//!   position control until contact, force control after.
//! - [`selection`] – [`JointSelection`][selection::JointSelection]: reads a
//!   joint group out of full robot vectors and writes its command back.
//! - [`sim`] – [`ContactSimulation`][sim::ContactSimulation]: spring-damper
//!   contact used to close the force loop without hardware.

pub mod admittance;
pub mod controllers;
pub mod selection;
pub mod sim;
pub mod switch;

pub use admittance::{AdmittanceConfig, AdmittanceSwitch, AdmittanceTrace, ControlMode, placeholder_force};
pub use controllers::{FirstOrderController, SecondOrderClosedLoop, settling_time};
pub use selection::JointSelection;
pub use sim::ContactSimulation;
pub use switch::{HysteresisSwitch, Latch, Transition};
