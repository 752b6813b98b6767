use thiserror::Error;

#[derive(Debug, Error)]
pub enum ThrottleError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("duplicate rule id: {0}")]
    DuplicateRuleId(String),

    #[error("rule at position {0} has an empty id")]
    EmptyRuleId(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type ThrottleResult<T> = Result<T, ThrottleError>;
