use thiserror::Error;
use videocore::codec::EncodeError;

#[derive(Debug, Error)]
pub enum SocketError {
    #[error("socket is not connected (state: {state})")]
    NotConnected { state: &'static str },
    #[error("failed to encode request: {0}")]
    Encode(#[from] EncodeError),
    #[error("transport error: {0:#}")]
    Transport(anyhow::Error),
    #[error("socket has shut down")]
    Closed,
}

pub type Result<T> = std::result::Result<T, SocketError>;
