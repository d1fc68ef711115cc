use thiserror::Error;

use crate::SettleError;

const UNSPECIFIED: &str = "unspecified error";

/// Diagnostic payload of a failed rule: a message the user sees verbatim and
/// an optional underlying cause. Never empty.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct FailureCause {
    message: String,
    #[source]
    cause: Option<Box<FailureCause>>,
}

impl FailureCause {
    pub fn new(message: impl Into<String>) -> Result<Self, SettleError> {
        let message = message.into();
        if message.trim().is_empty() {
            return Err(SettleError::EmptyFailureCause);
        }
        Ok(Self { message, cause: None })
    }

    /// Converts an error and its whole `source()` chain. Links with a blank
    /// message are dropped; a chain with nothing left becomes "unspecified error".
    pub fn from_error(err: &anyhow::Error) -> Self {
        let mut messages: Vec<String> = err
            .chain()
            .map(|e| e.to_string())
            .filter(|msg| !msg.trim().is_empty())
            .collect();

        let mut cause: Option<Box<FailureCause>> = None;
        while let Some(message) = messages.pop() {
            cause = Some(Box::new(FailureCause { message, cause }));
        }
        match cause {
            Some(outer) => *outer,
            None => FailureCause {
                message: UNSPECIFIED.to_string(),
                cause: None,
            },
        }
    }

    /// Appends `inner` at the end of this cause's chain.
    pub fn with_cause(mut self, inner: FailureCause) -> Self {
        self.cause = Some(Box::new(match self.cause.take() {
            Some(existing) => existing.with_cause(inner),
            None => inner,
        }));
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&FailureCause> {
        self.cause.as_deref()
    }

    /// This cause followed by every underlying cause, outermost first.
    pub fn chain(&self) -> impl Iterator<Item = &FailureCause> {
        std::iter::successors(Some(self), |c| c.cause())
    }

    pub fn root_cause(&self) -> &FailureCause {
        self.chain().last().unwrap_or(self)
    }
}
