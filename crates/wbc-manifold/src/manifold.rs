//! The [`Manifold`] merge algebra.
//!
//! Merging concatenates task lists, so the order of operands is the solver
//! priority (earlier = higher), and unions the binding maps, concatenating
//! consumer lists of bindings shared by name.  The operation is associative.

use std::collections::BTreeMap;

use wbc_types::{TaskId, WbcError};

use crate::binding::ReferenceBinding;
use crate::task::Task;

/// Receiver of tasks in priority order, typically a solver stack.
pub trait StackSink {
    fn push(&mut self, task: &Task);
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifold {
    tasks: Vec<Task>,
    bindings: BTreeMap<String, ReferenceBinding>,
}

impl Manifold {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    /// Add a binding under the same rule as [`merge_in`](Self::merge_in):
    /// a second binding under an existing name must agree on value type and
    /// handler, and its consumers are appended.
    pub fn with_binding(mut self, name: impl Into<String>, binding: ReferenceBinding) -> Result<Self, WbcError> {
        let name = name.into();
        match self.bindings.get_mut(&name) {
            Some(existing) => {
                existing.check_compatible(&name, &binding)?;
                existing.absorb(&binding);
            }
            None => {
                self.bindings.insert(name, binding);
            }
        }
        Ok(self)
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn tasks_mut(&mut self) -> &mut [Task] {
        &mut self.tasks
    }

    pub fn task_ids(&self) -> Vec<TaskId> {
        self.tasks.iter().map(|t| t.id().clone()).collect()
    }

    pub fn bindings(&self) -> &BTreeMap<String, ReferenceBinding> {
        &self.bindings
    }

    pub fn binding(&self, name: &str) -> Option<&ReferenceBinding> {
        self.bindings.get(name)
    }

    /// `self + other`, leaving both operands untouched.
    pub fn merge(&self, other: &Manifold) -> Result<Manifold, WbcError> {
        let mut merged = self.clone();
        merged.merge_in(other)?;
        Ok(merged)
    }

    /// `self += other`.  On conflict `self` is left unchanged.
    pub fn merge_in(&mut self, other: &Manifold) -> Result<(), WbcError> {
        for (name, binding) in &other.bindings {
            if let Some(existing) = self.bindings.get(name) {
                existing.check_compatible(name, binding)?;
            }
        }
        self.tasks.extend(other.tasks.iter().cloned());
        for (name, binding) in &other.bindings {
            match self.bindings.get_mut(name) {
                Some(existing) => existing.absorb(binding),
                None => {
                    self.bindings.insert(name.clone(), binding.clone());
                }
            }
        }
        Ok(())
    }

    /// Merge `parts` left to right.
    pub fn compose<'a>(parts: impl IntoIterator<Item = &'a Manifold>) -> Result<Manifold, WbcError> {
        let mut acc = Manifold::new();
        for part in parts {
            acc.merge_in(part)?;
        }
        Ok(acc)
    }

    /// Push every task, in order, into `sink`.
    pub fn push_to(&self, sink: &mut dyn StackSink) {
        for task in &self.tasks {
            sink.push(task);
        }
    }
}
