//! [`StackSupervisor`] – registered transitions and the active stack.
//!
//! Setup happens in [`SupervisorBuilder`]: every transition stack is the
//! composition `high priority + transition + low priority`, and the
//! distinguished keep-posture stack is created first so that it is selected
//! when the loop starts.  Building wires every binding to the reference queue
//! and instantiates one [`AdmittanceSwitch`] per admittance task.
//!
//! At runtime only the selector index, the admittance latches and the
//! reference values change.  Lookup of an unknown transition is an error;
//! everything else that can go wrong at runtime (inconsistent controls on
//! switch, missing pre/post actions, negative look-ahead) is logged and
//! skipped.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use wbc_control::{AdmittanceSwitch, AdmittanceTrace, JointSelection, placeholder_force};
use wbc_manifold::builders::{posture_keep, posture_position_ref};
use wbc_manifold::{ControlLaw, DEFAULT_BASE_PATH, Manifold, RoutingTable, resolve_routes};
use wbc_middleware::ReferenceQueue;
use wbc_types::{GraphEngine, RobotModel, SignalValue, TaskId, Tick, WbcError};

use crate::mux::StackSelector;
use crate::stack::Stack;

/// Transition name of the keep-posture stack.
pub const KEEP_POSTURE: &str = "keep_posture";

/// Name of the posture task held by the keep-posture stack.
pub const KEEP_POSTURE_TASK: &str = "posture_keep";

/// When the keep-posture reference is re-latched to the measured
/// configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelatchPolicy {
    /// On every activation of keep-posture, including repeated ones.
    #[default]
    EveryActivation,
    /// Only when entering keep-posture from another stack.
    FirstEntry,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SupervisorConfig {
    /// Norm above which two stack outputs are reported inconsistent.
    pub consistency_tolerance: f64,
    /// Ticks between an activation and the first delivered reference.
    pub queue_lookahead: i64,
    pub relatch_policy: RelatchPolicy,
    pub reference_base_path: String,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            consistency_tolerance: 1e-3,
            queue_lookahead: 10,
            relatch_policy: RelatchPolicy::default(),
            reference_base_path: DEFAULT_BASE_PATH.to_string(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Builder
// ────────────────────────────────────────────────────────────────────────────

pub struct SupervisorBuilder {
    config: SupervisorConfig,
    high_priority: Manifold,
    low_priority: Manifold,
    stacks: Vec<Stack>,
    transitions: BTreeMap<String, usize>,
    pre_actions: BTreeMap<String, usize>,
    post_actions: BTreeMap<(String, String), usize>,
    wiring: Manifold,
    admittance: BTreeMap<TaskId, ControlLaw>,
}

impl SupervisorBuilder {
    /// Start with the keep-posture stack over a `dimension`-sized
    /// configuration.  `high_priority` and `low_priority` wrap every stack
    /// added afterward.
    pub fn new(
        config: SupervisorConfig,
        high_priority: Manifold,
        low_priority: Manifold,
        dimension: usize,
    ) -> Result<Self, WbcError> {
        let wiring = high_priority.merge(&low_priority)?;
        let mut keep = Stack::new("sot_keep");
        posture_keep(KEEP_POSTURE_TASK, dimension).push_to(&mut keep);

        let mut builder = Self {
            config,
            high_priority,
            low_priority,
            stacks: Vec::new(),
            transitions: BTreeMap::new(),
            pre_actions: BTreeMap::new(),
            post_actions: BTreeMap::new(),
            wiring,
            admittance: BTreeMap::new(),
        };
        let index = builder.push_stack(keep);
        builder.transitions.insert(KEEP_POSTURE.to_string(), index);
        Ok(builder)
    }

    fn push_stack(&mut self, stack: Stack) -> usize {
        self.stacks.push(stack);
        self.stacks.len() - 1
    }

    /// Compose `hp + manifold + lp` into a new stack named `name`.
    fn compose_stack(&mut self, name: String, manifold: &Manifold) -> Result<usize, WbcError> {
        let full = Manifold::compose([&self.high_priority, manifold, &self.low_priority])?;
        self.wiring.merge_in(manifold)?;
        for task in manifold.tasks() {
            if task.is_admittance() {
                self.admittance.insert(task.id().clone(), task.law.clone());
            }
        }
        let mut stack = Stack::new(name);
        full.push_to(&mut stack);
        debug!(stack = %stack.display(), "stack composed");
        Ok(self.push_stack(stack))
    }

    fn require_transition(&self, name: &str) -> Result<(), WbcError> {
        if self.transitions.contains_key(name) {
            Ok(())
        } else {
            Err(WbcError::UnknownTransition(name.to_string()))
        }
    }

    pub fn add_transition(&mut self, name: &str, manifold: &Manifold) -> Result<&mut Self, WbcError> {
        if self.transitions.contains_key(name) {
            return Err(WbcError::InvalidParameter {
                name: "transition".to_string(),
                details: format!("{name} registered twice"),
            });
        }
        let index = self.compose_stack(format!("sot_{name}"), manifold)?;
        self.transitions.insert(name.to_string(), index);
        Ok(self)
    }

    /// One-shot stack run before transition `name`.
    pub fn add_pre_action(&mut self, name: &str, manifold: &Manifold) -> Result<&mut Self, WbcError> {
        self.require_transition(name)?;
        let index = self.compose_stack(format!("sot_pre_{name}"), manifold)?;
        self.pre_actions.insert(name.to_string(), index);
        Ok(self)
    }

    /// One-shot stack run when leaving transition `from` toward state `to`.
    pub fn add_post_action(&mut self, from: &str, to: &str, manifold: &Manifold) -> Result<&mut Self, WbcError> {
        self.require_transition(from)?;
        let index = self.compose_stack(format!("sot_post_{from}_{to}"), manifold)?;
        self.post_actions.insert((from.to_string(), to.to_string()), index);
        Ok(self)
    }

    /// Every binding of every registered manifold, merged.
    pub fn wiring(&self) -> &Manifold {
        &self.wiring
    }

    /// Wire the bindings into `queue`, build the admittance switches and hand
    /// `engine` to the supervisor.  The keep-posture reference is latched to
    /// the measured configuration.
    pub fn build<E: GraphEngine>(
        self,
        engine: E,
        model: &dyn RobotModel,
        mut queue: ReferenceQueue,
    ) -> Result<StackSupervisor<E>, WbcError> {
        let routing = resolve_routes(&self.wiring, &self.config.reference_base_path);
        for route in routing.topic_routes() {
            queue.register(route.channel.clone(), route.value_type, &route.consumers)?;
        }

        let mut admittance = BTreeMap::new();
        for (id, law) in self.admittance {
            if let ControlLaw::Admittance { config, joints } = law {
                let selection = JointSelection::from_model(model, &joints, config.torque_constant)?;
                let switch = AdmittanceSwitch::new(config)?;
                admittance.insert(id, AdmittanceSlot { switch, selection });
            }
        }

        let selector = StackSelector::new(self.stacks.len());
        let mut supervisor = StackSupervisor {
            config: self.config,
            engine,
            stacks: self.stacks,
            transitions: self.transitions,
            pre_actions: self.pre_actions,
            post_actions: self.post_actions,
            selector,
            current: None,
            one_shot: None,
            queue,
            routing,
            admittance,
            stepped: Vec::new(),
            last_switch: None,
        };
        supervisor.relatch_keep_posture()?;
        info!(
            stacks = supervisor.stacks.len(),
            channels = supervisor.routing.len(),
            "supervisor ready"
        );
        Ok(supervisor)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Supervisor
// ────────────────────────────────────────────────────────────────────────────

struct AdmittanceSlot {
    switch: AdmittanceSwitch,
    selection: JointSelection,
}

/// Stack to restore after a one-shot action has run for one tick.
struct OneShot {
    restore: usize,
    transition: String,
}

pub struct StackSupervisor<E: GraphEngine> {
    config: SupervisorConfig,
    engine: E,
    stacks: Vec<Stack>,
    transitions: BTreeMap<String, usize>,
    pre_actions: BTreeMap<String, usize>,
    post_actions: BTreeMap<(String, String), usize>,
    selector: StackSelector,
    current: Option<String>,
    one_shot: Option<OneShot>,
    queue: ReferenceQueue,
    routing: RoutingTable,
    admittance: BTreeMap<TaskId, AdmittanceSlot>,
    stepped: Vec<TaskId>,
    last_switch: Option<(Option<String>, String)>,
}

impl<E: GraphEngine> StackSupervisor<E> {
    /// Name of the current transition, `None` before the first activation.
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn selector(&self) -> &StackSelector {
        &self.selector
    }

    pub fn routing(&self) -> &RoutingTable {
        &self.routing
    }

    pub fn queue(&self) -> &ReferenceQueue {
        &self.queue
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn stack(&self, transition: &str) -> Option<&Stack> {
        self.transitions.get(transition).map(|&i| &self.stacks[i])
    }

    pub fn transitions(&self) -> impl Iterator<Item = &str> {
        self.transitions.keys().map(String::as_str)
    }

    /// Stack switch recorded since the last call, as `(from, to)`.
    pub fn take_switch(&mut self) -> Option<(Option<String>, String)> {
        self.last_switch.take()
    }

    fn transition_index(&self, name: &str) -> Result<usize, WbcError> {
        self.transitions
            .get(name)
            .copied()
            .ok_or_else(|| WbcError::UnknownTransition(name.to_string()))
    }

    fn relatch_keep_posture(&mut self) -> Result<(), WbcError> {
        let q = self.engine.configuration();
        debug!(dimension = q.len(), "keep posture re-latched");
        self.engine
            .set_signal(&posture_position_ref(KEEP_POSTURE_TASK), SignalValue::Vector(q))
    }

    /// Whether switching from the current stack to `name` keeps the command
    /// continuous within `threshold`.  Both stacks are evaluated at the
    /// current tick; a mismatch is reported, never enforced.
    pub fn is_consistent_with_current(&mut self, name: &str, threshold: f64) -> Result<bool, WbcError> {
        let next = self.transition_index(name)?;
        let Some(current) = self.current.clone() else {
            return Ok(true);
        };
        if current == name {
            return Ok(true);
        }
        let now = self.transition_index(&current)?;
        let t = self.engine.time();
        let current_control = self.stacks[now].control(&mut self.engine, t)?;
        let next_control = self.stacks[next].control(&mut self.engine, t)?;
        if current_control.len() != next_control.len() {
            warn!(
                from = %current,
                to = name,
                from_len = current_control.len(),
                to_len = next_control.len(),
                "control not consistent: sizes differ"
            );
            return Ok(false);
        }
        let error: Vec<f64> = next_control
            .iter()
            .zip(&current_control)
            .map(|(n, c)| n - c)
            .collect();
        let norm = error.iter().map(|e| e * e).sum::<f64>().sqrt();
        if norm > threshold {
            warn!(from = %current, to = name, norm, error = ?error, "control not consistent");
            return Ok(false);
        }
        Ok(true)
    }

    /// Make transition `name` the active stack from the next tick on.
    ///
    /// An unknown name fails and leaves the active stack unchanged.  With
    /// `verify`, an inconsistent switch is logged and carried out anyway.
    pub fn activate(&mut self, name: &str, verify: bool) -> Result<(), WbcError> {
        let index = self.transition_index(name)?;
        if verify && !self.is_consistent_with_current(name, self.config.consistency_tolerance)? {
            warn!(
                from = self.current.as_deref().unwrap_or("-"),
                to = name,
                "stack not consistent with current one"
            );
        }
        self.enter(name)?;
        self.selector.select(index)?;
        self.one_shot = None;
        info!(transition = name, stack = %self.stacks[index].display(), "current stack");
        let previous = self.current.replace(name.to_string());
        self.last_switch = Some((previous, name.to_string()));
        Ok(())
    }

    /// Effects of making `name` current: keep posture re-latches per
    /// [`RelatchPolicy`] and the queue resumes after the look-ahead.  Runs
    /// before `current` is updated.
    fn enter(&mut self, name: &str) -> Result<(), WbcError> {
        if name == KEEP_POSTURE {
            let entering = self.current.as_deref() != Some(KEEP_POSTURE);
            if entering || self.config.relatch_policy == RelatchPolicy::EveryActivation {
                self.relatch_keep_posture()?;
            }
        }
        self.read_queue(self.config.queue_lookahead);
        Ok(())
    }

    fn run_one_shot(&mut self, index: usize, restore: usize, transition: &str) -> Result<(), WbcError> {
        self.selector.select(index)?;
        self.one_shot = Some(OneShot {
            restore,
            transition: transition.to_string(),
        });
        Ok(())
    }

    /// Select the pre-action of `name` for one tick, then `name`'s stack.
    /// Returns `false` when `name` has no pre-action.
    pub fn run_pre_action(&mut self, name: &str) -> Result<bool, WbcError> {
        let Some(&index) = self.pre_actions.get(name) else {
            info!(transition = name, "no pre action");
            return Ok(false);
        };
        let restore = self.transition_index(name)?;
        info!(transition = name, stack = %self.stacks[index].display(), "running pre action");
        self.run_one_shot(index, restore, name)?;
        Ok(true)
    }

    /// Select the post-action of `(from, to)` for one tick, then `from`'s
    /// stack.  Returns `false` when there is none.
    pub fn run_post_action(&mut self, from: &str, to: &str) -> Result<bool, WbcError> {
        let Some(&index) = self.post_actions.get(&(from.to_string(), to.to_string())) else {
            info!(from, to, "no post action");
            return Ok(false);
        };
        let restore = self.transition_index(from)?;
        info!(from, to, stack = %self.stacks[index].display(), "running post action");
        self.run_one_shot(index, restore, from)?;
        Ok(true)
    }

    /// Deliver queued references from `lookahead` ticks after now.  Negative
    /// values are ignored.
    pub fn read_queue(&mut self, lookahead: i64) {
        let Ok(lookahead) = Tick::try_from(lookahead) else {
            warn!(lookahead, "read_queue argument should be >= 0");
            return;
        };
        let t = self.engine.time();
        self.queue.read_queue(t + lookahead);
    }

    pub fn stop_reading_queue(&mut self) {
        self.queue.stop_reading();
    }

    pub fn clear_queues(&mut self) {
        self.queue.clear_queues();
    }

    /// Admittance traces of the switches evaluated on the last tick.
    pub fn admittance_traces(&self) -> Vec<(String, AdmittanceTrace)> {
        self.stepped
            .iter()
            .filter_map(|id| self.admittance.get(id))
            .filter_map(|slot| {
                slot.switch
                    .trace()
                    .map(|trace| (slot.switch.name().to_string(), trace.clone()))
            })
            .collect()
    }

    pub fn admittance_switch(&self, task: &TaskId) -> Option<&AdmittanceSwitch> {
        self.admittance.get(task).map(|slot| &slot.switch)
    }

    /// One control tick: deliver references, evaluate the selected stack and
    /// its admittance tasks, and return the command.  The selector is read
    /// exactly once.
    pub fn tick(&mut self) -> Result<Vec<f64>, WbcError> {
        let t = self.engine.time();
        self.queue.pump();
        self.queue.drain(t, &mut self.engine)?;

        let index = self.selector.current();
        let mut command = self.stacks[index].control(&mut self.engine, t)?;

        self.stepped.clear();
        let admittance_tasks = self.stacks[index].admittance_tasks();
        if !admittance_tasks.is_empty() {
            let q = self.engine.configuration();
            let currents = self.engine.currents();
            for id in admittance_tasks {
                let Some(slot) = self.admittance.get_mut(id) else {
                    continue;
                };
                let position = slot.selection.select_position(&q)?;
                let width = slot.selection.width();
                let force = match slot.selection.measured_force(&currents) {
                    Ok(force) if force.len() == width => force,
                    _ => {
                        warn!(task = %id, "malformed measured force, placeholder used");
                        placeholder_force(width)
                    }
                };
                let output = slot.switch.step(&position, &force)?;
                slot.selection.add_output_to(&output, &mut command)?;
                self.stepped.push(id.clone());
            }
        }

        if let Some(shot) = self.one_shot.take() {
            self.enter(&shot.transition)?;
            self.selector.select(shot.restore)?;
            debug!(transition = %shot.transition, "one-shot action done");
            let previous = self.current.replace(shot.transition.clone());
            if previous.as_deref() != Some(shot.transition.as_str()) {
                self.last_switch = Some((previous, shot.transition));
            }
        }
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wbc_control::AdmittanceConfig;
    use wbc_manifold::builders::{gripper_admittance, posture};
    use wbc_manifold::{Gain, Task};
    use wbc_middleware::{ReferenceFeed, reference_channel};
    use wbc_types::{JointIndex, SignalRef};

    #[derive(Default)]
    struct MockEngine {
        t: Tick,
        q: Vec<f64>,
        currents: Vec<f64>,
        outputs: BTreeMap<String, Vec<f64>>,
        signals: Vec<(SignalRef, SignalValue)>,
        solved: Vec<String>,
    }

    impl GraphEngine for MockEngine {
        fn time(&self) -> Tick {
            self.t
        }
        fn configuration(&self) -> Vec<f64> {
            self.q.clone()
        }
        fn currents(&self) -> Vec<f64> {
            self.currents.clone()
        }
        fn set_signal(&mut self, signal: &SignalRef, value: SignalValue) -> Result<(), WbcError> {
            self.signals.push((signal.clone(), value));
            Ok(())
        }
        fn recompute_task(&mut self, _: &TaskId, _: Tick) -> Result<(), WbcError> {
            Ok(())
        }
        fn solve(&mut self, stack: &str, _: &[TaskId], _: Tick) -> Result<Vec<f64>, WbcError> {
            self.solved.push(stack.to_string());
            Ok(self.outputs.get(stack).cloned().unwrap_or_else(|| vec![0.0; 3]))
        }
        fn apply_control(&mut self, _: &[f64]) -> Result<(), WbcError> {
            Ok(())
        }
    }

    impl MockEngine {
        fn new() -> Self {
            let mut engine = Self {
                q: vec![0.0; 3],
                currents: vec![0.0; 3],
                ..Self::default()
            };
            engine.outputs.insert("sot_keep".into(), vec![0.0; 3]);
            engine.outputs.insert("sot_grasp".into(), vec![1.0; 3]);
            engine.outputs.insert("sot_pre_grasp".into(), vec![2.0; 3]);
            engine.outputs.insert("sot_post_grasp_release".into(), vec![3.0; 3]);
            engine
        }

        fn relatched(&self) -> Vec<&SignalValue> {
            let keep = posture_position_ref(KEEP_POSTURE_TASK);
            self.signals
                .iter()
                .filter(|(signal, _)| *signal == keep)
                .map(|(_, value)| value)
                .collect()
        }
    }

    /// Three dofs, the last one a gripper finger.
    struct ArmModel;

    impl RobotModel for ArmModel {
        fn joint(&self, name: &str) -> Option<JointIndex> {
            match name {
                "shoulder" => Some(JointIndex { idx_q: 0, idx_v: 0, nq: 2, nv: 2 }),
                "finger" => Some(JointIndex { idx_q: 2, idx_v: 2, nq: 1, nv: 1 }),
                _ => None,
            }
        }
        fn nv(&self) -> usize {
            3
        }
        fn joint_names(&self) -> Vec<String> {
            vec!["shoulder".into(), "finger".into()]
        }
    }

    fn single(task: &str) -> Manifold {
        Manifold::new().with_task(Task::new(task, ControlLaw::Posture { dimension: 3 }, Gain::Constant(1.0)))
    }

    fn builder(config: SupervisorConfig) -> SupervisorBuilder {
        let mut builder = SupervisorBuilder::new(config, single("task___hp"), single("task___lp"), 3).unwrap();
        builder.add_transition("grasp", &single("task___grasp")).unwrap();
        builder
            .add_pre_action("grasp", &single("task___pre"))
            .unwrap()
            .add_post_action("grasp", "release", &single("task___post"))
            .unwrap();
        builder
    }

    fn supervisor(config: SupervisorConfig, engine: MockEngine) -> (ReferenceFeed, StackSupervisor<MockEngine>) {
        let (feed, queue) = reference_channel(16);
        let sup = builder(config).build(engine, &ArmModel, queue).unwrap();
        (feed, sup)
    }

    #[test]
    fn transition_stack_is_wrapped_by_priority_levels() {
        let (_feed, sup) = supervisor(SupervisorConfig::default(), MockEngine::new());
        let grasp = sup.stack("grasp").unwrap();
        assert_eq!(grasp.name(), "sot_grasp");
        let names: Vec<&str> = grasp.tasks().iter().map(TaskId::as_str).collect();
        assert_eq!(names, ["task___hp", "task___grasp", "task___lp"]);

        let keep = sup.stack(KEEP_POSTURE).unwrap();
        assert_eq!(keep.tasks(), &[TaskId::new("task___posture_keep")]);
        assert_eq!(sup.selector().current(), 0);
        assert_eq!(sup.current(), None);
    }

    #[test]
    fn duplicate_transition_and_orphan_actions_are_rejected() {
        let mut b = builder(SupervisorConfig::default());
        assert!(matches!(
            b.add_transition("grasp", &single("task___again")),
            Err(WbcError::InvalidParameter { .. })
        ));
        assert!(matches!(
            b.add_pre_action("place", &single("task___x")),
            Err(WbcError::UnknownTransition(_))
        ));
        assert!(matches!(
            b.add_post_action("place", "grasp", &single("task___x")),
            Err(WbcError::UnknownTransition(_))
        ));
    }

    #[test]
    fn activation_takes_effect_on_the_next_tick() {
        let (_feed, mut sup) = supervisor(SupervisorConfig::default(), MockEngine::new());
        assert_eq!(sup.tick().unwrap(), vec![0.0; 3]);

        sup.activate("grasp", false).unwrap();
        assert_eq!(sup.selector().switch_count(), 1);
        assert_eq!(sup.tick().unwrap(), vec![1.0; 3]);
        assert_eq!(sup.engine().solved.last().map(String::as_str), Some("sot_grasp"));
        assert_eq!(sup.current(), Some("grasp"));
        assert_eq!(sup.take_switch(), Some((None, "grasp".to_string())));
        assert_eq!(sup.take_switch(), None);
    }

    #[test]
    fn unknown_transition_leaves_state_unchanged() {
        let (_feed, mut sup) = supervisor(SupervisorConfig::default(), MockEngine::new());
        sup.activate("grasp", false).unwrap();

        let err = sup.activate("place", true).unwrap_err();
        assert!(matches!(err, WbcError::UnknownTransition(ref n) if n == "place"));
        assert_eq!(sup.current(), Some("grasp"));
        assert_eq!(sup.selector().switch_count(), 1);
        assert_eq!(sup.tick().unwrap(), vec![1.0; 3]);
    }

    #[test]
    fn inconsistent_switch_is_reported_but_carried_out() {
        let (_feed, mut sup) = supervisor(SupervisorConfig::default(), MockEngine::new());
        sup.activate(KEEP_POSTURE, false).unwrap();

        assert!(!sup.is_consistent_with_current("grasp", 1e-3).unwrap());
        assert!(sup.is_consistent_with_current("grasp", 10.0).unwrap());
        assert!(sup.is_consistent_with_current(KEEP_POSTURE, 0.0).unwrap());

        sup.activate("grasp", true).unwrap();
        assert_eq!(sup.current(), Some("grasp"));
        assert_eq!(sup.tick().unwrap(), vec![1.0; 3]);
    }

    #[test]
    fn size_mismatch_counts_as_inconsistent() {
        let mut engine = MockEngine::new();
        engine.outputs.insert("sot_grasp".into(), vec![0.0; 4]);
        let (_feed, mut sup) = supervisor(SupervisorConfig::default(), engine);
        sup.activate(KEEP_POSTURE, false).unwrap();
        assert!(!sup.is_consistent_with_current("grasp", f64::MAX).unwrap());
    }

    #[test]
    fn keep_posture_relatches_on_every_activation_by_default() {
        let mut engine = MockEngine::new();
        engine.q = vec![1.0, 2.0, 3.0];
        let (_feed, mut sup) = supervisor(SupervisorConfig::default(), engine);
        assert_eq!(sup.engine().relatched(), [&SignalValue::Vector(vec![1.0, 2.0, 3.0])]);

        sup.engine_mut().q = vec![4.0, 5.0, 6.0];
        sup.activate(KEEP_POSTURE, false).unwrap();
        sup.engine_mut().q = vec![7.0, 8.0, 9.0];
        sup.activate(KEEP_POSTURE, false).unwrap();

        let latched = sup.engine().relatched();
        assert_eq!(latched.len(), 3);
        assert_eq!(latched[2], &SignalValue::Vector(vec![7.0, 8.0, 9.0]));
    }

    #[test]
    fn first_entry_policy_keeps_the_latched_posture() {
        let config = SupervisorConfig {
            relatch_policy: RelatchPolicy::FirstEntry,
            ..SupervisorConfig::default()
        };
        let (_feed, mut sup) = supervisor(config, MockEngine::new());
        sup.activate(KEEP_POSTURE, false).unwrap();
        sup.engine_mut().q = vec![7.0, 8.0, 9.0];
        sup.activate(KEEP_POSTURE, false).unwrap();
        // build + first entry only
        assert_eq!(sup.engine().relatched().len(), 2);

        sup.activate("grasp", false).unwrap();
        sup.activate(KEEP_POSTURE, false).unwrap();
        assert_eq!(sup.engine().relatched().len(), 3);
    }

    #[test]
    fn pre_action_runs_for_one_tick_then_enters_the_transition() {
        let (_feed, mut sup) = supervisor(SupervisorConfig::default(), MockEngine::new());
        sup.activate(KEEP_POSTURE, false).unwrap();
        sup.take_switch();

        assert!(sup.run_pre_action("grasp").unwrap());
        assert_eq!(sup.tick().unwrap(), vec![2.0; 3]);
        assert_eq!(sup.current(), Some("grasp"));
        assert_eq!(
            sup.take_switch(),
            Some((Some(KEEP_POSTURE.to_string()), "grasp".to_string()))
        );
        assert_eq!(sup.tick().unwrap(), vec![1.0; 3]);

        assert!(!sup.run_pre_action(KEEP_POSTURE).unwrap());
        assert_eq!(sup.tick().unwrap(), vec![1.0; 3]);
    }

    #[test]
    fn post_action_returns_to_the_source_stack() {
        let (_feed, mut sup) = supervisor(SupervisorConfig::default(), MockEngine::new());
        sup.activate("grasp", false).unwrap();
        sup.tick().unwrap();

        assert!(sup.run_post_action("grasp", "release").unwrap());
        assert_eq!(sup.tick().unwrap(), vec![3.0; 3]);
        assert_eq!(sup.tick().unwrap(), vec![1.0; 3]);
        assert!(!sup.run_post_action("grasp", "place").unwrap());
    }

    #[test]
    fn pre_action_into_keep_posture_relatches_and_resumes_the_queue() {
        let (_feed, queue) = reference_channel(16);
        let mut b = builder(SupervisorConfig::default());
        b.add_pre_action(KEEP_POSTURE, &single("task___pre_keep")).unwrap();
        let mut sup = b.build(MockEngine::new(), &ArmModel, queue).unwrap();

        sup.activate("grasp", false).unwrap();
        sup.tick().unwrap();
        sup.stop_reading_queue();
        let before = sup.engine().relatched().len();

        sup.engine_mut().q = vec![9.0, 9.0, 9.0];
        assert!(sup.run_pre_action(KEEP_POSTURE).unwrap());
        sup.tick().unwrap();
        assert_eq!(sup.engine().solved.last().map(String::as_str), Some("sot_pre_keep_posture"));
        assert_eq!(sup.current(), Some(KEEP_POSTURE));

        let latched = sup.engine().relatched();
        assert_eq!(latched.len(), before + 1);
        assert_eq!(latched.last(), Some(&&SignalValue::Vector(vec![9.0, 9.0, 9.0])));
        assert!(sup.queue().is_reading());

        sup.tick().unwrap();
        assert_eq!(sup.engine().solved.last().map(String::as_str), Some("sot_keep"));
    }

    #[test]
    fn post_action_resumes_a_stopped_queue() {
        let (_feed, mut sup) = supervisor(SupervisorConfig::default(), MockEngine::new());
        sup.activate("grasp", false).unwrap();
        sup.stop_reading_queue();

        sup.run_post_action("grasp", "release").unwrap();
        assert!(!sup.queue().is_reading());
        sup.tick().unwrap();
        assert!(sup.queue().is_reading());
        assert_eq!(sup.current(), Some("grasp"));
    }

    #[test]
    fn activation_cancels_a_pending_one_shot() {
        let (_feed, mut sup) = supervisor(SupervisorConfig::default(), MockEngine::new());
        sup.run_pre_action("grasp").unwrap();
        sup.activate(KEEP_POSTURE, false).unwrap();
        assert_eq!(sup.tick().unwrap(), vec![0.0; 3]);
        assert_eq!(sup.tick().unwrap(), vec![0.0; 3]);
    }

    #[test]
    fn negative_lookahead_is_ignored() {
        let (_feed, mut sup) = supervisor(SupervisorConfig::default(), MockEngine::new());
        sup.read_queue(-1);
        assert!(!sup.queue().is_reading());
        sup.read_queue(0);
        assert!(sup.queue().is_reading());
        sup.stop_reading_queue();
        assert!(!sup.queue().is_reading());
    }

    #[test]
    fn references_flow_after_the_lookahead() {
        let (feed, queue) = reference_channel(16);
        let mut b = SupervisorBuilder::new(SupervisorConfig::default(), Manifold::new(), Manifold::new(), 3).unwrap();
        b.add_transition("follow", &posture("posture", 3).unwrap()).unwrap();
        let mut sup = b.build(MockEngine::new(), &ArmModel, queue).unwrap();
        assert!(sup.routing().route("posture").is_some());

        feed.try_send("/planner/target/position", SignalValue::Vector(vec![0.5; 3]))
            .unwrap();
        sup.activate("follow", false).unwrap();

        let target = posture_position_ref("posture");
        let delivered = |sup: &StackSupervisor<MockEngine>| {
            sup.engine().signals.iter().filter(|(s, _)| *s == target).count()
        };
        for t in 0..10 {
            sup.engine_mut().t = t;
            sup.tick().unwrap();
        }
        assert_eq!(delivered(&sup), 0);

        sup.engine_mut().t = 10;
        sup.tick().unwrap();
        assert_eq!(delivered(&sup), 1);
    }

    #[test]
    fn admittance_output_is_added_to_the_solver_command() {
        let config = AdmittanceConfig::new("left", vec![0.0], vec![1.0], vec![5.0]);
        let close = gripper_admittance(config, vec!["finger".into()]).unwrap();
        let mut b = SupervisorBuilder::new(SupervisorConfig::default(), Manifold::new(), Manifold::new(), 3).unwrap();
        b.add_transition("grasp", &close).unwrap();
        let (_feed, queue) = reference_channel(4);
        let mut sup = b.build(MockEngine::new(), &ArmModel, queue).unwrap();

        sup.activate("grasp", false).unwrap();
        let command = sup.tick().unwrap();
        assert_eq!(&command[..2], &[1.0, 1.0]);
        assert!((command[2] - 1.1).abs() < 1e-12);

        let traces = sup.admittance_traces();
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].0, "left");
        assert!(!traces[0].1.force_mode);

        sup.engine_mut().currents.clear();
        sup.tick().unwrap();
        assert_eq!(sup.admittance_traces()[0].1.measured_force.len(), 1);

        sup.activate(KEEP_POSTURE, false).unwrap();
        sup.tick().unwrap();
        assert!(sup.admittance_traces().is_empty());
    }
}
