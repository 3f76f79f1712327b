use thiserror::Error;

/// Error type for bus-level protocol operations.
///
/// `E` is the error type of the adapter's underlying byte transport.
#[derive(Debug, Error)]
pub enum OneWireError<E> {
    /// The underlying byte transport failed.
    #[error("transport error: {0}")]
    Transport(E),
    /// The adapter chip replied with a byte pattern outside the expected set.
    ///
    /// Adapters run a single best-effort resynchronization before surfacing
    /// this, so a healthy chip is usable again on the next call; the failed
    /// call itself is not retried.
    #[error("invalid response from the bus adapter")]
    InvalidResponse,
}

impl<E> From<E> for OneWireError<E> {
    fn from(other: E) -> Self {
        Self::Transport(other)
    }
}
