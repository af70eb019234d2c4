use std::future::Future;

use crate::error::CdcResult;

/// A background task driving one part of a pipeline.
///
/// Starting a worker consumes it and returns a handle `H` exposing its state `S`.
pub trait Worker<H, S>
where
    H: WorkerHandle<S>,
{
    /// Error returned when the worker cannot be started.
    type Error;

    /// Spawns the worker and returns once it is running.
    fn start(self) -> impl Future<Output = Result<H, Self::Error>> + Send;
}

/// Handle to a running worker.
pub trait WorkerHandle<S> {
    /// Value produced by the worker when it completes.
    type Output;

    /// Returns a snapshot of the worker state.
    ///
    /// The state stays readable after the worker completed.
    fn state(&self) -> S;

    /// Waits for the worker to complete.
    fn wait(self) -> impl Future<Output = CdcResult<Self::Output>> + Send;
}
