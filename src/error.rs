use std::{sync::Arc, time::Duration};

use crate::util::utf8;

/// The maximum number of codepoints of pattern text carried by an error.
const PATTERN_PREVIEW_LEN: usize = 32;

/// An error that can occur while compiling a pattern or while using a
/// [`Cursor`](crate::Cursor).
///
/// Every error carries the [`ErrorKind`] describing what went wrong, along
/// with enough context to diagnose it without re-running anything: the name
/// of the operation that failed, the capture group index involved (if any),
/// the deadline that was in effect (if any) and a short preview of the
/// pattern text.
///
/// No error is ever retried by this crate. In particular, a timeout is never
/// turned into "no match."
#[derive(Clone, Debug)]
pub struct Error {
    kind: ErrorKind,
    operation: &'static str,
    group: Option<usize>,
    deadline: Option<Duration>,
    pattern: Option<String>,
}

/// The kind of an [`Error`].
///
/// This is non-exhaustive so that new failure modes can be added without a
/// breaking change.
#[non_exhaustive]
#[derive(Clone, Debug)]
pub enum ErrorKind {
    /// The configuration given at compile time was invalid or not supported
    /// by the selected engine. Nothing was compiled.
    Config {
        /// A human readable description of the problem.
        message: String,
    },
    /// The engine rejected the pattern text.
    Syntax {
        /// The engine's description of the problem.
        message: String,
        /// The byte offset into the pattern text at which the problem was
        /// detected, when the engine reports one.
        offset: Option<usize>,
    },
    /// A match accessor (or a replacement routine) was called while the
    /// cursor was not positioned on a match.
    State,
    /// A capture group index outside of `0..=group_count` was given.
    Index {
        /// The index that was given.
        index: usize,
        /// The number of capture groups in the pattern, not counting the
        /// implicit group for the overall match.
        group_count: usize,
    },
    /// A replacement template was malformed.
    Template {
        /// A description of the problem.
        message: &'static str,
        /// The byte offset into the template at which the problem occurs.
        offset: usize,
    },
    /// The engine does not support the requested primitive operation.
    Unsupported {
        /// The primitive that was requested.
        primitive: &'static str,
        /// The name of the engine that was asked.
        engine: &'static str,
    },
    /// A deadline-bounded operation did not finish in time.
    Timeout,
    /// The caller cancelled a deadline-bounded operation while it was
    /// waiting.
    Cancelled,
    /// The engine failed in an unexpected way. The original failure is
    /// available via `std::error::Error::source`.
    Backend {
        /// The underlying failure.
        cause: Arc<dyn std::error::Error + Send + Sync + 'static>,
    },
}

impl Error {
    pub(crate) fn new(operation: &'static str, kind: ErrorKind) -> Error {
        Error { kind, operation, group: None, deadline: None, pattern: None }
    }

    pub(crate) fn config<M: Into<String>>(message: M) -> Error {
        Error::new("compile", ErrorKind::Config { message: message.into() })
    }

    pub(crate) fn syntax<M: Into<String>>(
        message: M,
        offset: Option<usize>,
    ) -> Error {
        let kind = ErrorKind::Syntax { message: message.into(), offset };
        Error::new("compile", kind)
    }

    pub(crate) fn state(operation: &'static str) -> Error {
        Error::new(operation, ErrorKind::State)
    }

    pub(crate) fn index(
        operation: &'static str,
        index: usize,
        group_count: usize,
    ) -> Error {
        Error::new(operation, ErrorKind::Index { index, group_count })
            .with_group(index)
    }

    pub(crate) fn template(message: &'static str, offset: usize) -> Error {
        let kind = ErrorKind::Template { message, offset };
        Error::new("append_replacement", kind)
    }

    pub(crate) fn unsupported(
        operation: &'static str,
        primitive: &'static str,
        engine: &'static str,
    ) -> Error {
        Error::new(operation, ErrorKind::Unsupported { primitive, engine })
    }

    pub(crate) fn timeout(operation: &'static str, deadline: Duration) -> Error {
        Error::new(operation, ErrorKind::Timeout).with_deadline(deadline)
    }

    pub(crate) fn cancelled(
        operation: &'static str,
        deadline: Duration,
    ) -> Error {
        Error::new(operation, ErrorKind::Cancelled).with_deadline(deadline)
    }

    pub(crate) fn backend(
        operation: &'static str,
        cause: Box<dyn std::error::Error + Send + Sync + 'static>,
    ) -> Error {
        Error::new(operation, ErrorKind::Backend { cause: Arc::from(cause) })
    }

    pub(crate) fn with_group(self, group: usize) -> Error {
        Error { group: Some(group), ..self }
    }

    pub(crate) fn with_deadline(self, deadline: Duration) -> Error {
        Error { deadline: Some(deadline), ..self }
    }

    /// Attach a preview of the given pattern text. Errors raised deep inside
    /// a cursor don't know the pattern, so this is usually done on the way
    /// out.
    pub(crate) fn with_pattern(self, pattern: &str) -> Error {
        let pattern = Some(utf8::preview(pattern, PATTERN_PREVIEW_LEN));
        Error { pattern, ..self }
    }

    pub(crate) fn with_operation(self, operation: &'static str) -> Error {
        Error { operation, ..self }
    }

    /// Returns the kind of this error.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Returns the name of the operation that failed, e.g., `find` or
    /// `compile`.
    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Returns the capture group index involved in the failure, if any.
    pub fn group(&self) -> Option<usize> {
        self.group
    }

    /// Returns the deadline that was in effect when the failure occurred, if
    /// the operation was deadline-bounded.
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// Returns a preview of the pattern text, truncated to a small number of
    /// codepoints.
    pub fn pattern(&self) -> Option<&str> {
        self.pattern.as_deref()
    }

    /// Returns true if this error occurred because a deadline elapsed.
    pub fn is_timeout(&self) -> bool {
        matches!(self.kind, ErrorKind::Timeout)
    }

    /// Returns true if this error occurred because the caller cancelled the
    /// operation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self.kind {
            ErrorKind::Backend { ref cause } => Some(&**cause),
            _ => None,
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}: ", self.operation)?;
        match self.kind {
            ErrorKind::Config { ref message } => {
                write!(f, "invalid configuration: {}", message)?
            }
            ErrorKind::Syntax { ref message, offset: Some(offset) } => {
                write!(f, "syntax error at offset {}: {}", offset, message)?
            }
            ErrorKind::Syntax { ref message, offset: None } => {
                write!(f, "syntax error: {}", message)?
            }
            ErrorKind::State => write!(f, "no match available")?,
            ErrorKind::Index { index, group_count } => write!(
                f,
                "no group {} (pattern has {} groups)",
                index, group_count,
            )?,
            ErrorKind::Template { message, offset } => write!(
                f,
                "invalid replacement template at offset {}: {}",
                offset, message,
            )?,
            ErrorKind::Unsupported { primitive, engine } => write!(
                f,
                "engine '{}' does not support '{}'",
                engine, primitive,
            )?,
            ErrorKind::Timeout => write!(f, "match attempt timed out")?,
            ErrorKind::Cancelled => write!(f, "match attempt was cancelled")?,
            ErrorKind::Backend { ref cause } => {
                write!(f, "engine failure: {}", cause)?
            }
        }
        if let Some(group) = self.group {
            write!(f, " [group {}]", group)?;
        }
        if let Some(deadline) = self.deadline {
            write!(f, " [deadline {:?}]", deadline)?;
        }
        if let Some(ref pattern) = self.pattern {
            write!(f, " [pattern {:?}]", pattern)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn display_includes_context() {
        let err = Error::timeout("find", Duration::from_millis(50))
            .with_pattern("(a*)*");
        let msg = err.to_string();
        assert!(msg.starts_with("find: match attempt timed out"), "{}", msg);
        assert!(msg.contains("50ms"), "{}", msg);
        assert!(msg.contains("(a*)*"), "{}", msg);
        assert!(err.is_timeout());
        assert!(!err.is_cancelled());
    }

    #[test]
    fn index_error_records_group() {
        let err = Error::index("group", 7, 2);
        assert_eq!(Some(7), err.group());
        assert!(matches!(
            *err.kind(),
            ErrorKind::Index { index: 7, group_count: 2 }
        ));
    }

    #[test]
    fn pattern_preview_is_bounded() {
        let long = "a".repeat(1000);
        let err = Error::state("start").with_pattern(&long);
        let preview = err.pattern().unwrap();
        assert_eq!(PATTERN_PREVIEW_LEN + 3, preview.len());
        assert!(preview.ends_with("..."));
    }

    #[test]
    fn backend_cause_is_source() {
        let cause: Box<dyn std::error::Error + Send + Sync> =
            "stack overflow".into();
        let err = Error::backend("matches", cause);
        assert_eq!("stack overflow", err.source().unwrap().to_string());
        assert!(err.to_string().contains("engine failure: stack overflow"));
    }
}
