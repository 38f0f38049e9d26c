//! Candidate generation and chain seeding.

use std::sync::Arc;

use factor_graph::State;

/// Proposes local edits of a state.
///
/// Each returned state should come from [`State::derive`] so that it shares
/// the parent's cached factors and differs by one local change.
pub trait Explorer<I, C>: Send + Sync {
    fn propose(&self, state: &State<I, C>) -> Vec<State<I, C>>;
}

/// Builds the first state of a chain for an instance.
pub trait Initializer<I, C>: Send + Sync {
    fn initial_state(&self, instance: Arc<I>) -> State<I, C>;
}
