#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("task {0} not found")]
    TaskNotFound(String),

    #[error("mode {mode} requires parameter {param}")]
    MissingParameter { mode: &'static str, param: &'static str },

    #[error("parameter {param} must be greater than zero")]
    InvalidParameter { param: &'static str },
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
