use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum CoreError {
    /// Bad separator or other setup problem, detected at construction.
    Configuration(String),
    /// A serialized blob that does not match the expected version/structure.
    CorruptData(String),
    InvalidPosition { position: usize, key_count: usize },
    NoMatchingCandidate { position: usize, value: String },
    EmptyKey,
    /// Text dictionary line that could not be parsed (1-based line number).
    Parse { line: usize, message: String },
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::Configuration(msg) => write!(f, "configuration error: {msg}"),
            CoreError::CorruptData(msg) => write!(f, "corrupt data: {msg}"),
            CoreError::InvalidPosition {
                position,
                key_count,
            } => write!(f, "invalid position {position} (key count {key_count})"),
            CoreError::NoMatchingCandidate { position, value } => {
                write!(f, "no candidate '{value}' at position {position}")
            }
            CoreError::EmptyKey => write!(f, "empty reading key"),
            CoreError::Parse { line, message } => write!(f, "line {line}: {message}"),
        }
    }
}

impl std::error::Error for CoreError {}

impl From<bincode::Error> for CoreError {
    fn from(e: bincode::Error) -> Self {
        CoreError::CorruptData(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
