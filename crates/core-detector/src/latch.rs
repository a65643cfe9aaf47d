//! Single-assignment completion latch for one detection attempt.
//!
//! Every competitor (deadline timer, native poll, consensus loop) writes its
//! outcome here. Only the first write moves the state out of `Pending`; the
//! rest are rejected and reported as such so the loser can stand down.

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Pending,
    Succeeded,
    Failed,
}

#[derive(Debug)]
pub struct CompletionLatch {
    state: watch::Sender<AttemptState>,
}

impl Default for CompletionLatch {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionLatch {
    pub fn new() -> Self {
        let (state, _) = watch::channel(AttemptState::Pending);
        Self { state }
    }

    /// Attempt the single transition out of `Pending`. Returns true for the
    /// winning writer only.
    pub fn settle(&self, outcome: AttemptState) -> bool {
        if outcome == AttemptState::Pending {
            return false;
        }
        self.state.send_if_modified(|current| {
            if *current == AttemptState::Pending {
                *current = outcome;
                true
            } else {
                false
            }
        })
    }

    pub fn state(&self) -> AttemptState {
        *self.state.borrow()
    }

    pub fn is_settled(&self) -> bool {
        self.state() != AttemptState::Pending
    }

    /// Resolves with the terminal state.
    pub async fn wait(&self) -> AttemptState {
        let mut rx = self.state.subscribe();
        match rx.wait_for(|state| *state != AttemptState::Pending).await {
            Ok(state) => *state,
            // Unreachable while `self` holds the sender.
            Err(_) => self.state(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn first_writer_wins() {
        let latch = CompletionLatch::new();
        assert_eq!(latch.state(), AttemptState::Pending);
        assert!(latch.settle(AttemptState::Succeeded));
        assert!(!latch.settle(AttemptState::Failed));
        assert!(!latch.settle(AttemptState::Succeeded));
        assert_eq!(latch.state(), AttemptState::Succeeded);
    }

    #[test]
    fn pending_is_not_a_settlement() {
        let latch = CompletionLatch::new();
        assert!(!latch.settle(AttemptState::Pending));
        assert!(!latch.is_settled());
    }

    #[tokio::test]
    async fn wait_sees_settlement_from_other_task() {
        let latch = Arc::new(CompletionLatch::new());
        let writer = {
            let latch = Arc::clone(&latch);
            tokio::spawn(async move {
                tokio::task::yield_now().await;
                latch.settle(AttemptState::Failed)
            })
        };
        assert_eq!(latch.wait().await, AttemptState::Failed);
        assert!(writer.await.unwrap());
        // Already settled: returns immediately.
        assert_eq!(latch.wait().await, AttemptState::Failed);
    }
}
