use glq_protocol::handle::{ResourceKind, VirtualHandle};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("unknown handle: {0:?}")]
    UnknownHandle(VirtualHandle),

    #[error("the null handle cannot be bound")]
    NullHandle,

    #[error("handle {handle:?} is a {actual}, expected a {expected}")]
    KindMismatch {
        handle: VirtualHandle,
        expected: ResourceKind,
        actual: ResourceKind,
    },

    #[error("handle space exhausted")]
    Exhausted,

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
