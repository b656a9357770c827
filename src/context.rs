//! Cancellable, deadline-bearing call context
//!
//! Every blocking client operation takes a [`CallContext`]. Operations derive
//! a bounded sub-deadline from it and stop as soon as the context is
//! cancelled, whether they are awaiting a response, a connection, or a retry
//! backoff.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tonic::Status;

/// Cancellation token plus an optional absolute deadline
///
/// Contexts form a tree: children created with [`child`](Self::child) or
/// [`with_timeout`](Self::with_timeout) are cancelled when their parent is,
/// never the other way round.
#[derive(Clone, Debug, Default)]
pub struct CallContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    /// Root context with no deadline that is never cancelled on its own
    pub fn background() -> Self {
        Self::default()
    }

    /// Child context that is cancelled together with this one
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Child context whose deadline is at most `timeout` from now
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Child context whose deadline is at most `deadline`
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let mut child = self.child();
        child.deadline = Some(earliest(self.deadline, deadline));
        child
    }

    /// Cancel this context and all of its children
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether this context (or an ancestor) has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Absolute deadline, if one was set
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Underlying cancellation token
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    /// The earlier of this context's deadline and `now + timeout`
    pub fn sub_deadline(&self, timeout: Duration) -> Instant {
        earliest(self.deadline, Instant::now() + timeout)
    }

    /// Drive `fut` under a sub-deadline of `timeout`
    ///
    /// Returns `Cancelled` if the context is cancelled first and
    /// `DeadlineExceeded` if the sub-deadline passes first. Dropping `fut` on
    /// either path cancels whatever it was awaiting.
    pub async fn run<F>(&self, timeout: Duration, fut: F) -> Result<F::Output, Status>
    where
        F: Future,
    {
        self.run_until(self.sub_deadline(timeout), fut).await
    }

    /// Drive `fut` until an absolute `deadline`
    ///
    /// Same as [`run`](Self::run) for callers that already derived their
    /// sub-deadline and share it across several steps.
    pub async fn run_until<F>(&self, deadline: Instant, fut: F) -> Result<F::Output, Status>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(Status::cancelled("context cancelled")),
            _ = tokio::time::sleep_until(deadline) => {
                Err(Status::deadline_exceeded("context deadline exceeded"))
            }
            output = fut => Ok(output),
        }
    }
}

/// Wrap `message` in a request carrying the time left until `deadline`
///
/// The remaining budget travels as the gRPC timeout header so the server
/// works to the same deadline as the caller.
pub(crate) fn request_with_deadline<T>(message: T, deadline: Instant) -> tonic::Request<T> {
    let remaining = deadline
        .saturating_duration_since(Instant::now())
        .max(Duration::from_millis(1));
    let mut request = tonic::Request::new(message);
    request.set_timeout(remaining);
    request
}

fn earliest(current: Option<Instant>, candidate: Instant) -> Instant {
    match current {
        Some(existing) if existing < candidate => existing,
        _ => candidate,
    }
}
