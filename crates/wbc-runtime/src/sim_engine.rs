//! [`SimulatedEngine`] – a stand-in graph engine for running the loop
//! without a robot.
//!
//! The robot is a pure integrator: every applied command is integrated over
//! one period into the configuration.  Solving a stack tracks the posture
//! reference written into the highest-priority posture task that has one,
//! with a proportional gain; joints carrying a [`ContactSimulation`] report
//! the contact torque as their motor current.

use std::collections::BTreeMap;

use tracing::debug;
use wbc_control::ContactSimulation;
use wbc_manifold::SEP;
use wbc_types::{GraphEngine, SignalRef, SignalValue, TaskId, Tick, WbcError};

struct SimulatedContact {
    idx_q: usize,
    idx_v: usize,
    torque_constant: f64,
    contact: ContactSimulation,
}

pub struct SimulatedEngine {
    time: Tick,
    period: f64,
    gain: f64,
    configuration: Vec<f64>,
    currents: Vec<f64>,
    signals: BTreeMap<SignalRef, SignalValue>,
    contacts: Vec<SimulatedContact>,
    applied: u64,
}

impl SimulatedEngine {
    /// Robot at `configuration`, all dofs velocity-controlled.
    pub fn new(configuration: Vec<f64>, period: f64) -> Self {
        let nv = configuration.len();
        Self {
            time: 0,
            period,
            gain: 10.0,
            configuration,
            currents: vec![0.0; nv],
            signals: BTreeMap::new(),
            contacts: Vec::new(),
            applied: 0,
        }
    }

    pub fn with_gain(mut self, gain: f64) -> Self {
        self.gain = gain;
        self
    }

    /// Drive the dof at (`idx_q`, `idx_v`) through `contact`.  The reported
    /// current is the contact torque divided by `torque_constant`.
    pub fn with_contact(
        mut self,
        idx_q: usize,
        idx_v: usize,
        torque_constant: f64,
        contact: ContactSimulation,
    ) -> Result<Self, WbcError> {
        if idx_q >= self.configuration.len() || idx_v >= self.currents.len() {
            return Err(WbcError::InvalidParameter {
                name: "contact".to_string(),
                details: format!("dof ({idx_q}, {idx_v}) outside the robot"),
            });
        }
        self.configuration[idx_q] = contact.position();
        self.contacts.push(SimulatedContact {
            idx_q,
            idx_v,
            torque_constant,
            contact,
        });
        Ok(self)
    }

    pub fn signal(&self, signal: &SignalRef) -> Option<&SignalValue> {
        self.signals.get(signal)
    }

    /// Number of commands applied so far.
    pub fn applied(&self) -> u64 {
        self.applied
    }

    fn posture_reference(&self, task: &TaskId) -> Option<&[f64]> {
        let name = task.as_str().strip_prefix(&format!("task{SEP}"))?;
        let signal = SignalRef::new(format!("feature_des{SEP}{name}"), "errorIN");
        match self.signals.get(&signal) {
            Some(SignalValue::Vector(q)) if q.len() == self.configuration.len() => Some(q),
            _ => None,
        }
    }
}

impl GraphEngine for SimulatedEngine {
    fn time(&self) -> Tick {
        self.time
    }

    fn configuration(&self) -> Vec<f64> {
        self.configuration.clone()
    }

    fn currents(&self) -> Vec<f64> {
        self.currents.clone()
    }

    fn set_signal(&mut self, signal: &SignalRef, value: SignalValue) -> Result<(), WbcError> {
        self.signals.insert(signal.clone(), value);
        Ok(())
    }

    fn recompute_task(&mut self, _task: &TaskId, _t: Tick) -> Result<(), WbcError> {
        Ok(())
    }

    fn solve(&mut self, stack: &str, tasks: &[TaskId], _t: Tick) -> Result<Vec<f64>, WbcError> {
        let command = tasks
            .iter()
            .find_map(|task| self.posture_reference(task))
            .map(|reference| {
                reference
                    .iter()
                    .zip(&self.configuration)
                    .map(|(r, q)| self.gain * (r - q))
                    .collect()
            })
            .unwrap_or_else(|| vec![0.0; self.configuration.len()]);
        debug!(stack, tasks = tasks.len(), "stack solved");
        Ok(command)
    }

    fn apply_control(&mut self, command: &[f64]) -> Result<(), WbcError> {
        if command.len() != self.configuration.len() {
            return Err(WbcError::dimension(
                "applied command",
                self.configuration.len(),
                command.len(),
            ));
        }
        for (q, v) in self.configuration.iter_mut().zip(command) {
            *q += v * self.period;
        }
        for sim in &mut self.contacts {
            let torque = sim.contact.step(command[sim.idx_v]);
            self.configuration[sim.idx_q] = sim.contact.position();
            self.currents[sim.idx_v] = torque / sim.torque_constant;
        }
        self.time += 1;
        self.applied += 1;
        Ok(())
    }
}
