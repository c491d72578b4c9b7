//! `wbc simulate` – one gripper closing on an object through the full
//! supervisor and control loop, with a spring-damper standing in for the
//! object.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use wbc_control::{AdmittanceConfig, ContactSimulation};
use wbc_frames::JointTable;
use wbc_manifold::Manifold;
use wbc_manifold::builders::gripper_admittance;
use wbc_middleware::{TelemetryBus, Topic, TopicReceiver, reference_channel};
use wbc_runtime::{ControlHandle, ControlLoop, SimulatedEngine, SupervisorCommand};
use wbc_supervisor::SupervisorBuilder;
use wbc_types::{GraphEngine, RobotModel, TelemetryPayload, Tick, WbcError};

use crate::config::Config;

pub const TRANSITION: &str = "close_gripper";
const FINGER: &str = "gripper_finger";
/// Finger angle where the object is touched.
const CONTACT_ANGLE: f64 = 1.0;

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationReport {
    pub ticks: u64,
    /// First tick run in force mode.
    pub switched_at: Option<Tick>,
    /// Whether the latch fell back to position mode after switching.
    pub released: bool,
    pub final_force: f64,
    pub final_angle: f64,
}

pub struct GripperSimulation {
    pub control_loop: ControlLoop<SimulatedEngine>,
    pub handle: ControlHandle,
    pub bus: TelemetryBus,
}

/// Two-joint robot whose finger is closed by an admittance task pushing
/// with `desired_force` once in contact.
pub fn build(cfg: &Config, desired_force: f64) -> Result<GripperSimulation, WbcError> {
    let period = cfg.period().as_secs_f64();
    let model = JointTable::new().with_revolute("arm").with_revolute(FINGER);
    let finger = model
        .joint(FINGER)
        .ok_or_else(|| WbcError::UnknownJoint(FINGER.to_string()))?;

    let closed = CONTACT_ANGLE + 10f64.to_radians();
    let admittance = AdmittanceConfig {
        period,
        ..AdmittanceConfig::new("gripper", vec![0.0], vec![closed], vec![desired_force])
    };
    let torque_constant = admittance.torque_constant;
    let close = gripper_admittance(admittance, vec![FINGER.to_string()])?;

    let mut builder = SupervisorBuilder::new(cfg.supervisor_config(), Manifold::new(), Manifold::new(), model.nq())?;
    builder.add_transition(TRANSITION, &close)?;

    let contact = ContactSimulation::new(0.0, CONTACT_ANGLE, closed.signum(), period);
    let engine = SimulatedEngine::new(vec![0.0; model.nq()], period).with_contact(
        finger.idx_q,
        finger.idx_v,
        torque_constant,
        contact,
    )?;
    let (_feed, queue) = reference_channel(cfg.queue_capacity);
    let supervisor = builder.build(engine, &model, queue)?;

    let bus = TelemetryBus::default();
    let (control_loop, handle) = ControlLoop::new(supervisor, cfg.loop_config(), bus.clone());
    Ok(GripperSimulation {
        control_loop,
        handle,
        bus,
    })
}

/// Step the loop `ticks` times as fast as possible, or until `shutdown`.
pub fn run(cfg: &Config, ticks: u64, desired_force: f64, shutdown: Arc<AtomicBool>) -> Result<SimulationReport, WbcError> {
    let GripperSimulation {
        mut control_loop,
        handle,
        bus,
    } = build(cfg, desired_force)?;
    let mut traces = bus.subscribe_to(Topic::Admittance);
    handle.post(SupervisorCommand::Activate {
        name: TRANSITION.to_string(),
        verify: true,
    })?;

    let mut report = SimulationReport {
        ticks: 0,
        switched_at: None,
        released: false,
        final_force: 0.0,
        final_angle: 0.0,
    };
    for _ in 0..ticks {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        control_loop.step()?;
        collect(&mut traces, &mut report);
        report.ticks += 1;
    }
    report.final_angle = control_loop
        .supervisor()
        .engine()
        .configuration()
        .last()
        .copied()
        .unwrap_or_default();
    Ok(report)
}

fn collect(traces: &mut TopicReceiver, report: &mut SimulationReport) {
    while let Ok(sample) = traces.try_recv() {
        let TelemetryPayload::Admittance {
            force_mode,
            measured_force,
            ..
        } = sample.payload
        else {
            continue;
        };
        match (force_mode, report.switched_at) {
            (true, None) => report.switched_at = Some(sample.tick),
            (false, Some(_)) => report.released = true,
            _ => {}
        }
        if let Some(&force) = measured_force.first() {
            report.final_force = force;
        }
    }
}
