use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// The optimistic transaction lost the race: a concurrent writer touched
    /// the watched key between the read and the commit.
    #[error("optimistic transaction aborted by a concurrent write")]
    TxAborted,

    #[error(transparent)]
    Redis(#[from] redis::RedisError),
}

/// Errors a writer can surface to its connector. Neither kind commits the
/// message: decode failures and store failures both leave the offset where it
/// was, so the message is redelivered.
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("malformed event payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}
