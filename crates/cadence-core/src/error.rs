use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid recurrence pattern: {0}")]
    InvalidPattern(String),

    #[error("Malformed recurrence rule: {0}")]
    MalformedRule(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
