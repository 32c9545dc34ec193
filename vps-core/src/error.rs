use std::fmt::{self, Display, Formatter};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    Validation(String),
    Command(String),
    Timeout(String),
    Dependency(String),
    Crypto(String),
    Io(#[from] std::io::Error),
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            CoreError::Validation(s) => write!(f, "Validation error: {}", s),
            CoreError::Command(s) => write!(f, "Command failed: {}", s),
            CoreError::Timeout(s) => write!(f, "Timed out: {}", s),
            CoreError::Dependency(s) => write!(f, "Dependency not found: {}", s),
            CoreError::Crypto(s) => write!(f, "Crypto error: {}", s),
            CoreError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
