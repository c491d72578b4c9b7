//! [`Stack`] – tasks solved together as one prioritized control law.
//!
//! A stack's control is computed in an explicit order: every solver task is
//! recomputed highest priority first, then the solver runs over the list.
//! Admittance tasks are kept apart; the supervisor evaluates them after the
//! solver and adds their output to the command.

use tracing::warn;
use wbc_manifold::{StackSink, Task};
use wbc_types::{GraphEngine, TaskId, Tick, WbcError};

#[derive(Debug, Clone, PartialEq)]
pub struct Stack {
    name: String,
    tasks: Vec<TaskId>,
    admittance: Vec<TaskId>,
}

impl Stack {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tasks: Vec::new(),
            admittance: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Solver tasks, highest priority first.
    pub fn tasks(&self) -> &[TaskId] {
        &self.tasks
    }

    pub fn admittance_tasks(&self) -> &[TaskId] {
        &self.admittance
    }

    pub fn contains(&self, task: &TaskId) -> bool {
        self.tasks.contains(task) || self.admittance.contains(task)
    }

    /// Evaluate the stack at tick `t` and return its command.
    pub fn control(&self, engine: &mut dyn GraphEngine, t: Tick) -> Result<Vec<f64>, WbcError> {
        for task in &self.tasks {
            engine.recompute_task(task, t)?;
        }
        engine.solve(&self.name, &self.tasks, t)
    }

    /// Multi-line listing, one task per line.
    pub fn display(&self) -> String {
        let mut out = format!("{}:", self.name);
        for (level, task) in self.tasks.iter().enumerate() {
            out.push_str(&format!("\n  {level}: {task}"));
        }
        for task in &self.admittance {
            out.push_str(&format!("\n  +: {task}"));
        }
        out
    }
}

impl StackSink for Stack {
    fn push(&mut self, task: &Task) {
        if self.contains(task.id()) {
            warn!(stack = %self.name, task = %task.id(), "task already in stack, ignored");
            return;
        }
        if task.is_admittance() {
            self.admittance.push(task.id().clone());
        } else {
            self.tasks.push(task.id().clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wbc_control::AdmittanceConfig;
    use wbc_manifold::{ControlLaw, Gain, Manifold};
    use wbc_types::{SignalRef, SignalValue};

    #[derive(Default)]
    struct OrderEngine {
        calls: Vec<String>,
    }

    impl GraphEngine for OrderEngine {
        fn time(&self) -> Tick {
            0
        }
        fn configuration(&self) -> Vec<f64> {
            Vec::new()
        }
        fn currents(&self) -> Vec<f64> {
            Vec::new()
        }
        fn set_signal(&mut self, _: &SignalRef, _: SignalValue) -> Result<(), WbcError> {
            Ok(())
        }
        fn recompute_task(&mut self, task: &TaskId, t: Tick) -> Result<(), WbcError> {
            self.calls.push(format!("{task}@{t}"));
            Ok(())
        }
        fn solve(&mut self, stack: &str, tasks: &[TaskId], _: Tick) -> Result<Vec<f64>, WbcError> {
            self.calls.push(format!("solve {stack} {}", tasks.len()));
            Ok(vec![0.0; 2])
        }
        fn apply_control(&mut self, _: &[f64]) -> Result<(), WbcError> {
            Ok(())
        }
    }

    fn task(id: &str) -> Task {
        Task::new(id, ControlLaw::CenterOfMass, Gain::Constant(1.0))
    }

    #[test]
    fn tasks_are_recomputed_in_priority_order_before_solving() {
        let mut stack = Stack::new("sot_grasp");
        Manifold::new()
            .with_task(task("grasp"))
            .with_task(task("posture"))
            .push_to(&mut stack);

        let mut engine = OrderEngine::default();
        stack.control(&mut engine, 5).unwrap();
        assert_eq!(engine.calls, vec!["grasp@5", "posture@5", "solve sot_grasp 2"]);
    }

    #[test]
    fn duplicates_are_ignored_and_admittance_is_kept_apart() {
        let admittance = Task::new(
            "task___admittance___g",
            ControlLaw::Admittance {
                config: AdmittanceConfig::new("g", vec![0.0], vec![1.0], vec![1.0]),
                joints: vec!["finger".into()],
            },
            Gain::Constant(1.0),
        );
        let mut stack = Stack::new("s");
        stack.push(&task("a"));
        stack.push(&task("a"));
        stack.push(&admittance);

        assert_eq!(stack.tasks(), &[TaskId::new("a")]);
        assert_eq!(stack.admittance_tasks(), &[TaskId::new("task___admittance___g")]);
        assert!(stack.display().contains("0: a"));
        assert!(stack.display().contains("+: task___admittance___g"));
    }
}
