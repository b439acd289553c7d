//! Behavior sequences.
//!
//! A [`Behavior`] is an ordered list of callables composed by concatenation.
//! The compiler flattens every element's entry/exit work and every
//! transition's traversal work into one such sequence, so invocation at
//! runtime is a single in-order walk with no nested dispatch.

use std::fmt;
use std::sync::Arc;

use crate::model::StateChart;
use crate::runtime::{EvaluationError, Instance};

/// Type alias for compiled actions.
///
/// Actions receive the chart (for hooks that resolve model state at
/// runtime), the message being dispatched (absent during initialisation and
/// completion cascades), the instance and the history flag threaded through
/// entry cascades. A returned error aborts the remainder of the sequence and
/// the surrounding evaluation.
pub type ActionFn<M> = Arc<
    dyn Fn(&StateChart<M>, Option<&M>, &mut dyn Instance, bool) -> Result<(), EvaluationError>
        + Send
        + Sync,
>;

/// An ordered, concatenable sequence of actions.
pub struct Behavior<M> {
    actions: Vec<ActionFn<M>>,
}

impl<M> Behavior<M> {
    /// Create an empty behavior.
    pub fn new() -> Self {
        Self {
            actions: Vec::new(),
        }
    }

    /// Append a single action.
    pub fn push<F>(&mut self, action: F)
    where
        F: Fn(&StateChart<M>, Option<&M>, &mut dyn Instance, bool) -> Result<(), EvaluationError>
            + Send
            + Sync
            + 'static,
    {
        self.actions.push(Arc::new(action));
    }

    /// Append every action of another behavior, leaving it untouched.
    pub fn push_behavior(&mut self, other: &Behavior<M>) {
        self.actions.extend(other.actions.iter().cloned());
    }

    /// True if at least one action has been appended.
    pub fn has_actions(&self) -> bool {
        !self.actions.is_empty()
    }

    /// Number of actions in the sequence.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// True if the sequence is empty.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Invoke every action in order.
    ///
    /// There is no short-circuit on success paths; a failing action
    /// propagates immediately and the remaining actions do not run.
    pub fn invoke(
        &self,
        chart: &StateChart<M>,
        message: Option<&M>,
        instance: &mut dyn Instance,
        history: bool,
    ) -> Result<(), EvaluationError> {
        for action in &self.actions {
            action(chart, message, instance, history)?;
        }
        Ok(())
    }
}

impl<M> Default for Behavior<M> {
    fn default() -> Self {
        Self::new()
    }
}

// Manual Clone: Arc'd actions clone without requiring M: Clone.
impl<M> Clone for Behavior<M> {
    fn clone(&self) -> Self {
        Self {
            actions: self.actions.clone(),
        }
    }
}

impl<M> fmt::Debug for Behavior<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Behavior")
            .field("action_count", &self.actions.len())
            .finish()
    }
}
