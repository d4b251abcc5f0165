// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Unsupported unit type: {0}")]
    UnsupportedUnit(String),
}
