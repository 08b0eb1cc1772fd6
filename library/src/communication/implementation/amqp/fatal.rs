use crate::communication::BlackboxError;
use crate::BoxedError;
use futures::stream::{self, Stream, StreamExt};
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::{oneshot, watch};
use tracing::{debug, error};

/// Reaction to an unexpected termination of the broker connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalAction {
    /// Surface the loss to everything using the gateway
    ///
    /// Consumption streams yield the cause as their last item and end afterwards.
    Escalate,
    /// Abort the process immediately
    Abort,
}

/// Decides how an unexpected connection termination is handled
///
/// The policy is consulted exactly once per connection, on a task of its own. The default
/// policy escalates the loss so that the owner of the gateway decides on the exit strategy.
#[derive(Clone)]
pub struct FatalClosePolicy {
    on_fatal: Arc<dyn Fn(&BlackboxError) -> FatalAction + Send + Sync>,
}

impl FatalClosePolicy {
    /// Creates a policy from a custom decision function
    pub fn new<F>(on_fatal: F) -> Self
    where
        F: Fn(&BlackboxError) -> FatalAction + Send + Sync + 'static,
    {
        Self {
            on_fatal: Arc::new(on_fatal),
        }
    }

    /// Policy which aborts the process as soon as the connection is lost
    pub fn abort() -> Self {
        Self::new(|_| FatalAction::Abort)
    }

    /// Consults the policy for the given cause
    pub fn decide(&self, cause: &BlackboxError) -> FatalAction {
        (self.on_fatal)(cause)
    }
}

impl Default for FatalClosePolicy {
    fn default() -> Self {
        Self::new(|_| FatalAction::Escalate)
    }
}

impl fmt::Debug for FatalClosePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FatalClosePolicy").finish_non_exhaustive()
    }
}

/// One-shot notification slot for the termination of a connection
///
/// The broker client may report more than one error for a dying connection. Only the first
/// one is forwarded, everything after it is dropped.
pub(super) struct FatalCloseNotifier {
    slot: Mutex<Option<oneshot::Sender<BlackboxError>>>,
}

impl FatalCloseNotifier {
    pub(super) fn new() -> (Self, oneshot::Receiver<BlackboxError>) {
        let (tx, rx) = oneshot::channel();
        let notifier = Self {
            slot: Mutex::new(Some(tx)),
        };

        (notifier, rx)
    }

    /// Forwards the cause if no notification has been sent yet and returns whether it was sent
    pub(super) fn notify(&self, cause: BlackboxError) -> bool {
        match self.slot.lock().ok().and_then(|mut slot| slot.take()) {
            Some(tx) => tx.send(cause).is_ok(),
            None => false,
        }
    }

    /// Prevents any further notification, used when the connection is closed deliberately
    pub(super) fn disarm(&self) {
        if let Ok(mut slot) = self.slot.lock() {
            slot.take();
        }
    }
}

/// Spawns the task which waits for a fatal close notification and applies the policy
///
/// The returned receiver holds `Some(cause)` once the loss has been escalated.
pub(super) fn spawn_fatal_close_watcher(
    label: String,
    closed: oneshot::Receiver<BlackboxError>,
    policy: FatalClosePolicy,
) -> watch::Receiver<Option<BlackboxError>> {
    let (tx, rx) = watch::channel(None);

    tokio::spawn(async move {
        let cause = match closed.await {
            Ok(cause) => cause,
            Err(_) => {
                debug!(connection = %label, "Connection released without failure");
                return;
            }
        };

        error!(connection = %label, error = %cause, "Broker connection terminated unexpectedly");

        match policy.decide(&cause) {
            FatalAction::Escalate => {
                tx.send(Some(cause)).ok();
            }
            FatalAction::Abort => {
                error!(connection = %label, "Aborting process due to lost broker connection");
                std::process::abort();
            }
        }
    });

    rx
}

/// Stream which yields the escalated cause once and ends afterwards
///
/// Ends without yielding anything if the watcher goes away without an escalation.
pub(super) fn connection_lost(
    mut lost: watch::Receiver<Option<BlackboxError>>,
) -> impl Stream<Item = BoxedError> {
    stream::once(async move {
        loop {
            let current = lost.borrow().clone();
            if let Some(cause) = current {
                return Some(BoxedError::from(cause));
            }

            if lost.changed().await.is_err() {
                return None;
            }
        }
    })
    .filter_map(futures::future::ready)
}
