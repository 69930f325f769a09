//! Background trace tasks.

use crate::TraceError;
use std::{
    panic::{self, AssertUnwindSafe},
    sync::mpsc::{self, Receiver, TryRecvError},
};

/// Handle of a job running on the rayon thread pool.
///
/// The job's result travels back through a channel; waiting on the handle
/// blocks on the channel, it never spins.
#[derive(Debug)]
pub struct TraceTask<T> {
    receiver: Receiver<T>,
}

impl<T: Send + 'static> TraceTask<T> {
    /// Starts `job` on the rayon thread pool.
    ///
    /// A panicking job doesn't take the process down: the handle reports
    /// [`TraceError::TaskLost`] instead.
    pub fn spawn<F>(job: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let (sender, receiver) = mpsc::sync_channel(1);
        rayon::spawn(move || match panic::catch_unwind(AssertUnwindSafe(job)) {
            Ok(result) => {
                // The receiver may be gone already if the handle was dropped.
                let _ = sender.send(result);
            },
            Err(_) => log::error!("Trace task panicked, its result is lost"),
        });
        Self { receiver }
    }

    /// Blocks until the job is done and returns its result.
    pub fn wait(self) -> Result<T, TraceError> { self.receiver.recv().map_err(|_| TraceError::TaskLost) }

    /// Returns the result if the job is already done, or the handle back
    /// otherwise.
    pub fn try_wait(self) -> Result<Result<T, TraceError>, Self> {
        match self.receiver.try_recv() {
            Ok(result) => Ok(Ok(result)),
            Err(TryRecvError::Disconnected) => Ok(Err(TraceError::TaskLost)),
            Err(TryRecvError::Empty) => Err(self),
        }
    }
}
