//! Long-lived evaluator state: a set that can be replaced between sessions.

use std::{
    collections::BTreeSet,
    sync::{Arc, Mutex, MutexGuard},
};

use tracing::info;

use crate::{
    channel::Channel,
    msg::Operation,
    protocol::{Error, Evaluator, Outcome, Party},
};

/// A shared handle to the evaluator's set.
///
/// Updates through any clone of the handle become visible to the next session, never to a
/// session that is already running.
#[derive(Debug, Clone, Default)]
pub struct SetHandle(Arc<Mutex<Vec<u64>>>);

impl SetHandle {
    /// A handle to the given set.
    pub fn new(set: Vec<u64>) -> Self {
        Self(Arc::new(Mutex::new(set)))
    }

    /// Replaces the set, returning the previous one.
    pub fn replace(&self, set: Vec<u64>) -> Vec<u64> {
        std::mem::replace(&mut *self.lock(), set)
    }

    /// A copy of the current set.
    pub fn snapshot(&self) -> Vec<u64> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u64>> {
        // a plain Vec cannot be left in an inconsistent state
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// The evaluator side of a server that answers one session after the other.
#[derive(Debug, Clone, Default)]
pub struct EvaluatorSession {
    set: SetHandle,
    sessions: usize,
}

impl EvaluatorSession {
    /// A session serving the given set.
    pub fn new(set: Vec<u64>) -> Self {
        Self {
            set: SetHandle::new(set),
            sessions: 0,
        }
    }

    /// The handle through which the set can be replaced.
    pub fn handle(&self) -> SetHandle {
        self.set.clone()
    }

    /// The number of sessions that completed successfully.
    pub fn sessions(&self) -> usize {
        self.sessions
    }

    /// Runs a single session with a snapshot of the current set.
    pub async fn serve_once(&mut self, channel: &impl Channel) -> Result<Outcome, Error> {
        let set = self.set.snapshot();
        info!(elements = set.len(), "starting session");
        let outcome = Evaluator::new(set).run(channel).await?;
        self.sessions += 1;
        Ok(outcome)
    }
}

/// Computes the outcome of a session in the clear, for checking the garbled computation.
///
/// The sum is the sum of both sets, the common elements are the intersection of both sets.
pub fn expected_outcome(operation: Operation, alice: &[u64], bob: &[u64]) -> Outcome {
    match operation {
        Operation::Sum => Outcome::Sum(
            alice
                .iter()
                .chain(bob)
                .map(|v| *v as u128)
                .sum(),
        ),
        Operation::Compare => {
            let alice: BTreeSet<u64> = alice.iter().copied().collect();
            Outcome::Common(bob.iter().copied().filter(|v| alice.contains(v)).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_replaces_the_set() {
        let session = EvaluatorSession::new(vec![1, 2]);
        let handle = session.handle();
        assert_eq!(handle.replace(vec![7]), vec![1, 2]);
        assert_eq!(session.handle().snapshot(), vec![7]);
    }

    #[test]
    fn expected_outcomes() {
        assert_eq!(
            expected_outcome(Operation::Sum, &[2, 3], &[4]),
            Outcome::Sum(9)
        );
        assert_eq!(
            expected_outcome(Operation::Compare, &[3, 5], &[5, 2, 5]),
            Outcome::Common(BTreeSet::from([5]))
        );
        assert_eq!(
            expected_outcome(Operation::Compare, &[], &[1]),
            Outcome::Common(BTreeSet::new())
        );
    }
}
