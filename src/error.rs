use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Task already registered: {0}")]
    DuplicateTask(String),

    #[error("Registry is closed; tasks cannot be registered after execution started")]
    RegistryClosed,

    #[error("Unknown dependency `{dependency}` required by task `{task}`")]
    UnknownDependency { task: String, dependency: String },

    #[error("Cycle detected among tasks: {}", .tasks.join(", "))]
    CycleDetected { tasks: Vec<String> },

    #[error("Task `{task}` failed: {message}")]
    TaskFailed { task: String, message: String },

    #[error("Task `{task}` panicked: {message}")]
    TaskPanicked { task: String, message: String },

    #[error("Task `{task}` returned {found}, expected a JSON object")]
    InvalidOutput { task: String, found: String },

    #[error("Pipe state must be a JSON object for merging, got {0}")]
    InvalidState(String),

    #[error("Pool size {size} is out of range (1..={max})")]
    InvalidPoolSize { size: usize, max: usize },

    #[error("Task join error: {0}")]
    TaskJoin(String),

    #[error("Invalid run state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}

pub type Result<T> = std::result::Result<T, Error>;
