//! [`ControlLoop`] – the periodic real-time loop around a
//! [`StackSupervisor`].
//!
//! Each tick:
//!
//! 1. **Commands** – supervisor commands queued through a [`ControlHandle`]
//!    are applied, so an activation always lands between two ticks.
//! 2. **Frames** – every frame-pair route is refreshed from the [`TfEngine`].
//! 3. **Control** – the supervisor delivers references, evaluates the active
//!    stack and its admittance tasks, and the command is applied.
//! 4. **Telemetry** – admittance traces, stack switches, control-norm events
//!    and the downsampled state are published on the [`TelemetryBus`].
//!
//! Nothing in a tick waits on another task: commands and reference samples
//! are polled, and telemetry is broadcast without back-pressure.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use wbc_frames::TfEngine;
use wbc_manifold::{Route, RouteSource};
use wbc_middleware::{TelemetryBus, Topic};
use wbc_supervisor::StackSupervisor;
use wbc_types::{GraphEngine, SignalValue, TelemetryPayload, TelemetrySample, Tick, WbcError};

use crate::monitor::ControlNormMonitor;

const COMMAND_CAPACITY: usize = 32;

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlLoopConfig {
    /// Control period.
    pub period: Duration,
    /// Ticks between two state samples.
    pub state_subsampling: u64,
    /// Norm below which the command counts as at rest.
    pub control_norm_threshold: f64,
    /// Reference channel published next to the state.
    pub posture_channel: String,
}

impl Default for ControlLoopConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(1),
            state_subsampling: 40,
            control_norm_threshold: 1e-2,
            posture_channel: "/planner/target/position".to_string(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Commands
// ────────────────────────────────────────────────────────────────────────────

/// Requests applied by the loop at the next tick boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SupervisorCommand {
    Activate { name: String, verify: bool },
    PreAction(String),
    PostAction { from: String, to: String },
    ReadQueue(i64),
    StopReadingQueue,
    ClearQueues,
}

struct Request {
    command: SupervisorCommand,
    reply: Option<oneshot::Sender<Result<bool, WbcError>>>,
}

/// Cloneable handle submitting [`SupervisorCommand`]s to a running loop.
#[derive(Clone)]
pub struct ControlHandle {
    sender: mpsc::Sender<Request>,
}

impl ControlHandle {
    /// Submit `command` and wait until the loop has applied it.
    ///
    /// The result is the supervisor's: `Ok(false)` for a missing pre/post
    /// action, [`WbcError::UnknownTransition`] for an unknown name.
    pub async fn send(&self, command: SupervisorCommand) -> Result<bool, WbcError> {
        let (reply, outcome) = oneshot::channel();
        self.sender
            .send(Request {
                command,
                reply: Some(reply),
            })
            .await
            .map_err(|_| WbcError::Channel("control loop stopped".to_string()))?;
        outcome
            .await
            .map_err(|_| WbcError::Channel("control loop dropped the command".to_string()))?
    }

    /// Queue `command` without waiting for it.
    pub fn post(&self, command: SupervisorCommand) -> Result<(), WbcError> {
        self.sender
            .try_send(Request {
                command,
                reply: None,
            })
            .map_err(|e| WbcError::Channel(format!("command not queued: {e}")))
    }

    pub async fn activate(&self, name: impl Into<String>, verify: bool) -> Result<(), WbcError> {
        self.send(SupervisorCommand::Activate {
            name: name.into(),
            verify,
        })
        .await
        .map(|_| ())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ControlLoop
// ────────────────────────────────────────────────────────────────────────────

pub struct ControlLoop<E: GraphEngine> {
    supervisor: StackSupervisor<E>,
    config: ControlLoopConfig,
    bus: TelemetryBus,
    frames: TfEngine,
    frame_routes: Vec<Route>,
    commands: mpsc::Receiver<Request>,
    monitor: ControlNormMonitor,
    ticks: u64,
}

impl<E: GraphEngine> ControlLoop<E> {
    pub fn new(
        supervisor: StackSupervisor<E>,
        config: ControlLoopConfig,
        bus: TelemetryBus,
    ) -> (Self, ControlHandle) {
        let (sender, commands) = mpsc::channel(COMMAND_CAPACITY);
        let frame_routes = supervisor.routing().frame_routes().cloned().collect();
        let monitor = ControlNormMonitor::new(config.control_norm_threshold);
        let control_loop = Self {
            supervisor,
            config,
            bus,
            frames: TfEngine::new(),
            frame_routes,
            commands,
            monitor,
            ticks: 0,
        };
        (control_loop, ControlHandle { sender })
    }

    pub fn supervisor(&self) -> &StackSupervisor<E> {
        &self.supervisor
    }

    pub fn supervisor_mut(&mut self) -> &mut StackSupervisor<E> {
        &mut self.supervisor
    }

    /// Frame graph serving frame-pair bindings.
    pub fn frames_mut(&mut self) -> &mut TfEngine {
        &mut self.frames
    }

    /// Ticks run so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    fn apply(&mut self, command: SupervisorCommand) -> Result<bool, WbcError> {
        debug!(command = ?command, "supervisor command");
        match command {
            SupervisorCommand::Activate { name, verify } => self.supervisor.activate(&name, verify).map(|_| true),
            SupervisorCommand::PreAction(name) => self.supervisor.run_pre_action(&name),
            SupervisorCommand::PostAction { from, to } => self.supervisor.run_post_action(&from, &to),
            SupervisorCommand::ReadQueue(lookahead) => {
                self.supervisor.read_queue(lookahead);
                Ok(lookahead >= 0)
            }
            SupervisorCommand::StopReadingQueue => {
                self.supervisor.stop_reading_queue();
                Ok(true)
            }
            SupervisorCommand::ClearQueues => {
                self.supervisor.clear_queues();
                Ok(true)
            }
        }
    }

    fn apply_pending_commands(&mut self) {
        while let Ok(Request { command, reply }) = self.commands.try_recv() {
            let outcome = self.apply(command);
            match reply {
                Some(reply) => {
                    let _ = reply.send(outcome);
                }
                None => {
                    if let Err(e) = outcome {
                        warn!(error = %e, "supervisor command failed");
                    }
                }
            }
        }
    }

    fn relay_frames(&mut self) -> Result<(), WbcError> {
        for route in &self.frame_routes {
            let RouteSource::FramePair { frame0, frame1 } = &route.source else {
                continue;
            };
            let Some(pose) = self.frames.lookup(frame0, frame1) else {
                debug!(channel = %route.channel, "frame pair not available yet");
                continue;
            };
            let matrix = pose.to_matrix();
            for consumer in &route.consumers {
                self.supervisor
                    .engine_mut()
                    .set_signal(consumer, SignalValue::MatrixHomo(matrix))?;
            }
        }
        Ok(())
    }

    fn publish(&self, topic: Topic, sample: TelemetrySample) {
        if self.bus.subscriber_count(topic) > 0 {
            let _ = self.bus.publish_to(topic, sample);
        }
    }

    fn publish_telemetry(&mut self, t: Tick, command: &[f64]) {
        for (name, trace) in self.supervisor.admittance_traces() {
            let payload = trace.to_payload(&name);
            self.publish(
                Topic::Admittance,
                TelemetrySample::new(t, format!("admittance/{name}"), payload),
            );
        }
        if let Some((from, to)) = self.supervisor.take_switch() {
            self.publish(
                Topic::Supervisor,
                TelemetrySample::new(t, "supervisor", TelemetryPayload::StackSwitched { from, to }),
            );
        }
        if let Some(norm) = self.monitor.update(command) {
            debug!(norm, "control norm crossed threshold");
            self.publish(
                Topic::Supervisor,
                TelemetrySample::new(t, "supervisor", TelemetryPayload::ControlNorm(norm)),
            );
        }
        if self.config.state_subsampling > 0 && self.ticks % self.config.state_subsampling == 0 {
            let reference_state = self
                .supervisor
                .queue()
                .last_value(&self.config.posture_channel)
                .and_then(SignalValue::as_vector)
                .map(<[f64]>::to_vec)
                .unwrap_or_default();
            let state = self.supervisor.engine().configuration();
            self.publish(
                Topic::State,
                TelemetrySample::new(t, "state", TelemetryPayload::State { state, reference_state }),
            );
        }
    }

    /// Run one tick and return the applied command.
    pub fn step(&mut self) -> Result<Vec<f64>, WbcError> {
        self.apply_pending_commands();
        self.relay_frames()?;
        let t = self.supervisor.engine().time();
        let command = self.supervisor.tick()?;
        self.supervisor.engine_mut().apply_control(&command)?;
        self.publish_telemetry(t, &command);
        self.ticks += 1;
        Ok(command)
    }

    /// Tick every period until `shutdown` is raised or a tick fails.
    /// Returns the number of ticks run.
    pub async fn run(mut self, shutdown: Arc<AtomicBool>) -> Result<u64, WbcError> {
        let mut interval = tokio::time::interval(self.config.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(period = ?self.config.period, "control loop started");
        while !shutdown.load(Ordering::SeqCst) {
            interval.tick().await;
            if let Err(e) = self.step() {
                error!(error = %e, tick = self.ticks, "control loop stopped");
                return Err(e);
            }
        }
        info!(ticks = self.ticks, "control loop shut down");
        Ok(self.ticks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim_engine::SimulatedEngine;
    use wbc_frames::{JointTable, Transform3D};
    use wbc_manifold::{Manifold, ReferenceBinding, SourceHandler};
    use wbc_middleware::reference_channel;
    use wbc_supervisor::{KEEP_POSTURE, SupervisorBuilder, SupervisorConfig};
    use wbc_types::{SignalRef, ValueType};

    fn model() -> JointTable {
        JointTable::new().with_revolute("shoulder").with_revolute("elbow")
    }

    fn build(transition: &Manifold) -> (ControlLoop<SimulatedEngine>, ControlHandle, TelemetryBus) {
        let mut builder =
            SupervisorBuilder::new(SupervisorConfig::default(), Manifold::new(), Manifold::new(), 2).unwrap();
        builder.add_transition("reach", transition).unwrap();
        let (_feed, queue) = reference_channel(8);
        let engine = SimulatedEngine::new(vec![0.5, -0.5], 1e-3);
        let supervisor = builder.build(engine, &model(), queue).unwrap();
        let bus = TelemetryBus::default();
        let config = ControlLoopConfig {
            state_subsampling: 2,
            ..ControlLoopConfig::default()
        };
        let (control_loop, handle) = ControlLoop::new(supervisor, config, bus.clone());
        (control_loop, handle, bus)
    }

    #[test]
    fn keep_posture_holds_the_initial_configuration() {
        let (mut control_loop, _handle, _bus) = build(&Manifold::new());
        for _ in 0..5 {
            let command = control_loop.step().unwrap();
            assert!(command.iter().all(|c| c.abs() < 1e-12));
        }
        assert_eq!(control_loop.supervisor().engine().applied(), 5);
    }

    #[tokio::test]
    async fn commands_are_applied_at_the_next_tick() {
        let (mut control_loop, handle, bus) = build(&Manifold::new());
        let mut events = bus.subscribe_to(Topic::Supervisor);

        let pending = tokio::spawn(async move { handle.activate("reach", false).await });
        tokio::task::yield_now().await;
        while !pending.is_finished() {
            control_loop.step().unwrap();
            tokio::task::yield_now().await;
        }
        pending.await.unwrap().unwrap();
        assert_eq!(control_loop.supervisor().current(), Some("reach"));

        let mut switched = false;
        while let Ok(sample) = events.try_recv() {
            if let TelemetryPayload::StackSwitched { to, .. } = sample.payload {
                assert_eq!(to, "reach");
                switched = true;
            }
        }
        assert!(switched);
    }

    #[tokio::test]
    async fn unknown_transition_is_reported_to_the_caller() {
        let (mut control_loop, handle, _bus) = build(&Manifold::new());
        let pending = tokio::spawn(async move { handle.activate("fly", false).await });
        tokio::task::yield_now().await;
        while !pending.is_finished() {
            control_loop.step().unwrap();
            tokio::task::yield_now().await;
        }
        assert!(matches!(
            pending.await.unwrap(),
            Err(WbcError::UnknownTransition(_))
        ));
        assert_eq!(control_loop.supervisor().current(), None);
    }

    #[test]
    fn posted_commands_do_not_wait() {
        let (mut control_loop, handle, _bus) = build(&Manifold::new());
        handle.post(SupervisorCommand::ReadQueue(3)).unwrap();
        handle
            .post(SupervisorCommand::Activate {
                name: KEEP_POSTURE.into(),
                verify: true,
            })
            .unwrap();
        control_loop.step().unwrap();
        assert!(control_loop.supervisor().queue().is_reading());
        assert_eq!(control_loop.supervisor().current(), Some(KEEP_POSTURE));
    }

    #[test]
    fn frame_pairs_are_relayed_every_tick() {
        let consumer = SignalRef::new("feature_des___box", "position");
        let transition = Manifold::new().with_binding(
            "box",
            ReferenceBinding::new(
                ValueType::MatrixHomo,
                false,
                SourceHandler::FramePair {
                    frame0: "world".into(),
                    frame1: "box".into(),
                },
            )
            .with_consumer(consumer.clone()),
        )
        .unwrap();
        let (mut control_loop, _handle, _bus) = build(&transition);

        control_loop.step().unwrap();
        assert!(control_loop.supervisor().engine().signal(&consumer).is_none());

        let pose = Transform3D::from_xyz_xyzw([1.0, 2.0, 3.0, 0.0, 0.0, 0.0, 1.0]);
        control_loop.frames_mut().set_transform("world", "box", pose);
        control_loop.step().unwrap();
        assert_eq!(
            control_loop.supervisor().engine().signal(&consumer),
            Some(&SignalValue::MatrixHomo(pose.to_matrix()))
        );
    }

    #[test]
    fn state_is_downsampled_and_norm_events_fire_once() {
        let (mut control_loop, _handle, bus) = build(&Manifold::new());
        let mut state = bus.subscribe_to(Topic::State);
        let mut events = bus.subscribe_to(Topic::Supervisor);
        for _ in 0..6 {
            control_loop.step().unwrap();
        }

        let mut states = 0;
        while let Ok(sample) = state.try_recv() {
            if let TelemetryPayload::State { state, reference_state } = sample.payload {
                assert_eq!(state.len(), 2);
                assert!(reference_state.is_empty());
                states += 1;
            }
        }
        assert_eq!(states, 3);

        let norms = std::iter::from_fn(|| events.try_recv().ok())
            .filter(|s| matches!(s.payload, TelemetryPayload::ControlNorm(_)))
            .count();
        assert_eq!(norms, 1);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let (control_loop, _handle, _bus) = build(&Manifold::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = shutdown.clone();
        let task = tokio::spawn(control_loop.run(flag));
        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.store(true, Ordering::SeqCst);
        let ticks = task.await.unwrap().unwrap();
        assert!(ticks > 0);
    }
}
