use thiserror::Error;

#[derive(Error, Debug)]
pub enum SharedError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] bincode::Error),

    #[error("Channel message of {len} bytes exceeds the {max} byte limit")]
    Oversized { len: usize, max: usize },
}
