use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    /// `start` was called outside a Tokio runtime.
    #[error("event bus requires a running tokio runtime")]
    NoRuntime,

    #[error("event bus has been stopped")]
    Stopped,

    #[error("event bus drain exceeded {0}ms; dispatcher aborted")]
    ShutdownTimeout(u64),
}
