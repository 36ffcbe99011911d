use std::fmt;

#[derive(Debug)]
pub enum ReportError {
    /// The request is structurally unusable (e.g. the primary metric source is missing).
    InvalidShape(String),
    /// More metrics were selected than the engine accepts.
    TooManyMetrics { count: usize, max: usize },
    InvalidConfiguration(String),
    Render(String),
    Io(std::io::Error),
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportError::InvalidShape(message) => write!(f, "invalid report request: {}", message),
            ReportError::TooManyMetrics { count, max } => write!(
                f,
                "too many selected metrics: {} (at most {} allowed)",
                count, max
            ),
            ReportError::InvalidConfiguration(message) => {
                write!(f, "invalid configuration: {}", message)
            }
            ReportError::Render(message) => write!(f, "render error: {}", message),
            ReportError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for ReportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReportError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ReportError {
    fn from(value: std::io::Error) -> Self {
        ReportError::Io(value)
    }
}
