//! Terminal outcome of a consumer and the future that carries it.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

use crate::error::ConsumerError;

/// How a consumer's drain loop ended.
#[derive(Debug, Clone)]
pub enum ConsumerOutcome {
    /// Stopped on request, after an empty poll or a completed item.
    Stopped,
    /// A callback or store failure ended the loop.
    Failed(Arc<ConsumerError>),
    /// A store call was cancelled (store closed or connection torn down), or the loop
    /// task was dropped before it could report.
    Cancelled,
}

impl ConsumerOutcome {
    pub fn is_stopped(&self) -> bool {
        matches!(self, ConsumerOutcome::Stopped)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ConsumerOutcome::Cancelled)
    }

    pub fn error(&self) -> Option<&ConsumerError> {
        match self {
            ConsumerOutcome::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// `Ok(true)` when stopped, `Ok(false)` when cancelled, the failure otherwise.
    pub fn into_result(self) -> Result<bool, Arc<ConsumerError>> {
        match self {
            ConsumerOutcome::Stopped => Ok(true),
            ConsumerOutcome::Cancelled => Ok(false),
            ConsumerOutcome::Failed(err) => Err(err),
        }
    }
}

/// Resolves once, when the consumer reaches a terminal state.
///
/// Clones observe the same outcome, so the future handed out by `start` and the one
/// handed out by `stop` always agree.
#[derive(Clone)]
pub struct Completion {
    inner: Shared<BoxFuture<'static, ConsumerOutcome>>,
}

impl Completion {
    pub(crate) fn channel() -> (CompletionSender, Completion) {
        let (tx, rx) = oneshot::channel();
        let inner = rx
            .map(|received| received.unwrap_or(ConsumerOutcome::Cancelled))
            .boxed()
            .shared();
        (CompletionSender(tx), Completion { inner })
    }

    /// The outcome, if this completion (or a clone) has already been polled to the end.
    pub fn peek(&self) -> Option<&ConsumerOutcome> {
        self.inner.peek()
    }
}

impl Future for Completion {
    type Output = ConsumerOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.inner).poll(cx)
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("outcome", &self.peek())
            .finish()
    }
}

/// Write half of a [`Completion`]; consumed by the single resolution.
pub(crate) struct CompletionSender(oneshot::Sender<ConsumerOutcome>);

impl CompletionSender {
    pub(crate) fn resolve(self, outcome: ConsumerOutcome) {
        // Nobody holding the completion any more is not an error for the loop.
        let _ = self.0.send(outcome);
    }
}
