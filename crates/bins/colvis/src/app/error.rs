use std::{
    error::Error,
    fmt::{Display, Formatter},
};

/// Error reported by the command line application.
#[derive(Debug)]
pub struct ColvisError {
    message: String,
    source: Option<Box<dyn Error>>,
}

impl Display for ColvisError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let cause = match &self.source {
            Some(cause) => format!("{}", cause),
            None => String::from("None"),
        };
        write!(f, "Error: {}, caused by {}", self.message, cause)
    }
}

impl Error for ColvisError {}

impl ColvisError {
    /// Creates a new error.
    pub fn new<S>(message: S, source: Option<Box<dyn Error>>) -> Self
    where
        S: Into<String>,
    {
        Self {
            message: message.into(),
            source,
        }
    }

    /// Creates a new error from a [`std::io::Error`].
    pub fn from_io_error<S>(err: std::io::Error, message: S) -> Self
    where
        S: Into<String>,
    {
        Self::new(message, Some(Box::new(err)))
    }

    /// Creates a new error from a [`trace::TraceError`].
    pub fn from_trace_error<S>(err: trace::TraceError, message: S) -> Self
    where
        S: Into<String>,
    {
        Self::new(message, Some(Box::new(err)))
    }

    /// Creates a new error from a [`base::Error`].
    pub fn from_base_error<S>(err: base::Error, message: S) -> Self
    where
        S: Into<String>,
    {
        Self::new(message, Some(Box::new(err)))
    }
}
