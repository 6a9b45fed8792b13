use crate::errors::types::Error;
use std::fmt;

/// Where an error happened: component plus the operation in progress
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// Component where the error occurred (e.g. "keep-alive")
    pub component: String,
    /// Operation that was being performed
    pub operation: String,
    /// Additional context information
    pub details: Option<String>,
}

impl ErrorContext {
    pub fn new<S: Into<String>, T: Into<String>>(component: S, operation: T) -> Self {
        ErrorContext {
            component: component.into(),
            operation: operation.into(),
            details: None,
        }
    }

    pub fn with_details<S: Into<String>>(mut self, details: S) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.component, self.operation)?;
        if let Some(details) = &self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

/// Extension trait for attaching an [`ErrorContext`] to a failed result
pub trait ErrorExt<T> {
    /// Wrap the error, keeping its message and adding the context
    fn context(self, ctx: ErrorContext) -> Result<T, Error>;

    /// Shorthand for [`ErrorExt::context`] with just component and operation
    fn with_context<S: Into<String>, U: Into<String>>(self, component: S, operation: U) -> Result<T, Error>;
}

impl<T> ErrorExt<T> for Result<T, Error> {
    fn context(self, ctx: ErrorContext) -> Result<T, Error> {
        self.map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{} [{}]", msg, ctx)),
            Error::Internal(msg) => Error::Internal(format!("{} [{}]", msg, ctx)),
            other => Error::Internal(format!("{} [{}]", other, ctx)),
        })
    }

    fn with_context<S: Into<String>, U: Into<String>>(self, component: S, operation: U) -> Result<T, Error> {
        self.context(ErrorContext::new(component, operation))
    }
}
