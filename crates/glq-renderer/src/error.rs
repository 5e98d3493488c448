use glq_core::CoreError;
use glq_protocol::error::ProtocolError;

use crate::driver::DriverError;
use crate::lifecycle::LifecycleError;

/// Errors returned by the control-plane API. Invalid objects are not errors
/// here: they set a sticky error bit, polled with `get_error`.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("context is lost")]
    ContextLost,

    #[error("context has not been created")]
    NoContext,

    #[error("synchronous command was abandoned by the execution plane")]
    Abandoned,

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("handle table error: {0}")]
    Core(#[from] CoreError),

    #[error("lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("unexpected reply to {0}")]
    UnexpectedReply(&'static str),
}

#[derive(Debug, thiserror::Error)]
pub enum RendererError {
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("failed to spawn render thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// A render job the scheduler refused. The job has been dropped, so the
/// waiting side observes it as abandoned.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("execution plane is not live")]
    NotLive,

    #[error("render thread is gone")]
    Disconnected,
}
