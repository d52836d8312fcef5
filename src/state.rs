//! Trial/committed state bookkeeping shared by nodes, materials, sections and elements.

/// Lifecycle every stateful model entity follows during an analysis step.
///
/// Trial values are mutated freely while iterating. Committing promotes them
/// to the committed state and reverting discards them.
pub trait StateMachine {
    /// Promote the trial state to the committed state.
    fn commit_state(&mut self);
    /// Discard the trial state and restore the last committed state.
    fn revert_to_last_commit(&mut self);
    /// Restore the state present before the first commit and reset the commit counter.
    fn revert_to_start(&mut self);
}

/// Value tracked in initial, committed and trial copies.
///
/// # Examples
/// ```
/// use equilibria::state::{StateMachine, TrialState};
///
/// let mut strain = TrialState::new(0.0);
/// strain.set_trial(0.002);
/// strain.revert_to_last_commit();
/// assert_eq!(*strain.trial(), 0.0);
///
/// strain.set_trial(0.002);
/// strain.commit_state();
/// assert_eq!(*strain.committed(), 0.002);
/// assert_eq!(strain.commit_count(), 1);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct TrialState<T: Clone> {
    initial: T,
    committed: T,
    trial: T,
    commits: usize,
}

impl<T: Clone> TrialState<T> {
    /// Create a state whose initial, committed and trial values all equal `initial`.
    #[must_use]
    pub fn new(initial: T) -> Self {
        Self {
            committed: initial.clone(),
            trial: initial.clone(),
            initial,
            commits: 0,
        }
    }

    /// Replace the initial value and reset committed and trial values to it.
    pub fn reset_initial(&mut self, initial: T) {
        self.committed = initial.clone();
        self.trial = initial.clone();
        self.initial = initial;
    }

    /// Current trial value.
    #[must_use]
    pub fn trial(&self) -> &T {
        &self.trial
    }

    /// Mutable access to the trial value.
    pub fn trial_mut(&mut self) -> &mut T {
        &mut self.trial
    }

    /// Overwrite the trial value.
    pub fn set_trial(&mut self, value: T) {
        self.trial = value;
    }

    /// Last committed value.
    #[must_use]
    pub fn committed(&self) -> &T {
        &self.committed
    }

    /// Value the state started from.
    #[must_use]
    pub fn initial(&self) -> &T {
        &self.initial
    }

    /// Number of commits since creation or the last [`StateMachine::revert_to_start`].
    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.commits
    }
}

impl<T: Clone> StateMachine for TrialState<T> {
    fn commit_state(&mut self) {
        self.committed = self.trial.clone();
        self.commits += 1;
    }

    fn revert_to_last_commit(&mut self) {
        self.trial = self.committed.clone();
    }

    fn revert_to_start(&mut self) {
        self.committed = self.initial.clone();
        self.trial = self.initial.clone();
        self.commits = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revert_is_idempotent() {
        let mut state = TrialState::new(vec![0.0, 0.0]);
        state.trial_mut()[1] = 4.0;
        state.commit_state();
        state.set_trial(vec![1.0, 1.0]);
        state.revert_to_last_commit();
        let once = state.clone();
        state.revert_to_last_commit();
        assert_eq!(state, once);
        assert_eq!(state.trial(), &vec![0.0, 4.0]);
    }

    #[test]
    fn revert_to_start_clears_commits() {
        let mut state = TrialState::new(1.0);
        for value in [2.0, 3.0, 4.0] {
            state.set_trial(value);
            state.commit_state();
        }
        assert_eq!(state.commit_count(), 3);
        state.revert_to_start();
        assert_eq!(state.commit_count(), 0);
        assert_eq!(*state.committed(), 1.0);
        assert_eq!(*state.trial(), 1.0);
    }

    #[test]
    fn reset_initial_moves_every_copy() {
        let mut state = TrialState::new(0.0);
        state.reset_initial(0.5);
        state.set_trial(1.0);
        state.revert_to_start();
        assert_eq!(*state.initial(), 0.5);
        assert_eq!(*state.trial(), 0.5);
    }
}
