use thiserror::Error;
use videocore::InvalidTransition;

use crate::coordinator::CoordinatorError;
use crate::socket::SocketError;

#[derive(Debug, Error)]
pub enum CallError {
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    #[error("coordinator request failed: {0}")]
    Coordinator(#[from] CoordinatorError),
    #[error("signaling failed: {0}")]
    Socket(#[from] SocketError),
    #[error("no active call")]
    NoActiveCall,
}

pub type Result<T> = std::result::Result<T, CallError>;
