/*!
The contract between the engine-independent [`Cursor`](crate::Cursor) and a
concrete regex engine.

An engine is wrapped by implementing two traits:

* [`Backend`] is the compiled form of a pattern. It is immutable and shared by
every cursor created from the same [`Pattern`](crate::Pattern).
* [`RawCursor`] is the mutable per-input state used to run one match attempt
at a time and to report the capture group bounds of the most recent match.

Adapters are pure translation. They never decide where a search starts, never
check whether a match is available before a group is read and never interpret
replacement templates. All of that lives in the cursor so that every engine
gets precisely the same preconditions and postconditions.

A primitive that an engine cannot provide reports
[`BackendError::Unsupported`]. The cursor surfaces this to the caller as an
[`ErrorKind::Unsupported`](crate::ErrorKind::Unsupported) error and never
substitutes some other operation in its place.

"No match" is never an error. It is `Ok(false)`.
*/

use std::sync::Arc;

use crate::{deadline::CancelToken, util::search::Span};

#[cfg(feature = "backtrack")]
pub(crate) mod backtrack;
#[cfg(feature = "fancy")]
pub(crate) mod fancy;
#[cfg(feature = "meta")]
pub(crate) mod meta;

/// The compiled form of a pattern for one particular engine.
///
/// Implementations must be immutable after construction: cursors on many
/// threads call into the same `Backend` simultaneously.
pub trait Backend: Send + Sync + core::fmt::Debug + 'static {
    /// A short name for this engine, used in error messages and logs.
    fn name(&self) -> &'static str;

    /// The number of explicit capture groups in the pattern. The implicit
    /// group for the overall match is not counted.
    fn group_count(&self) -> usize;

    /// Create the mutable matching state for searching the given input.
    fn create_cursor(&self, haystack: Arc<str>) -> Box<dyn RawCursor>;
}

/// The mutable matching state of an engine bound to one input.
///
/// A `RawCursor` must be `Send` because a deadline-bounded match attempt
/// moves it onto a worker thread for the duration of the attempt.
///
/// Each of the matching primitives receives a [`CancelToken`]. Engines that
/// can abort a search cooperatively should poll it at safe points and return
/// [`BackendError::Aborted`] once it is cancelled. Engines that have no such
/// hook ignore it.
///
/// Every matching primitive replaces the group bounds reported by
/// `group_span`. After a primitive returns `Ok(false)` or an error, the group
/// bounds are unspecified and the cursor won't ask for them.
pub trait RawCursor: Send + core::fmt::Debug {
    /// The input this state is bound to.
    fn haystack(&self) -> &str;

    /// Search for the leftmost match beginning at or after `at`.
    ///
    /// `at` is always on a UTF-8 codepoint boundary and never greater than
    /// the length of the haystack. Look-behind assertions (including `^` and
    /// `\b`) see the haystack before `at`.
    fn find_at(
        &mut self,
        at: usize,
        cancel: &CancelToken,
    ) -> Result<bool, BackendError>;

    /// Attempt to match the entire haystack.
    fn match_whole(&mut self, cancel: &CancelToken)
        -> Result<bool, BackendError>;

    /// Attempt to match a prefix of the haystack.
    fn match_prefix(
        &mut self,
        cancel: &CancelToken,
    ) -> Result<bool, BackendError>;

    /// Return the bounds of the given group in the most recent match, or
    /// `None` if the group did not participate in it.
    ///
    /// Index `0` corresponds to the overall match and must always be
    /// supported. The cursor guarantees `index <= group_count`. Bounds must
    /// lie within the haystack and on codepoint boundaries. The cursor
    /// reports anything else as a failure of the engine.
    fn group_span(&self, index: usize) -> Result<Option<Span>, BackendError>;

    /// Return the text of the given group in the most recent match, or
    /// `None` if the group did not participate in it.
    ///
    /// Engines that can only report group text, and not bounds, should
    /// override this and report `Unsupported` from `group_span` for indices
    /// other than `0`.
    fn group_text(&self, index: usize) -> Result<Option<&str>, BackendError> {
        match self.group_span(index)? {
            None => Ok(None),
            Some(span) => {
                let span = check_span(self.haystack(), span)?;
                Ok(Some(&self.haystack()[span]))
            }
        }
    }

    /// Forget the most recent match.
    fn rewind(&mut self);
}

/// A failure reported by an engine adapter.
#[derive(Debug)]
pub enum BackendError {
    /// The engine cannot provide the named primitive.
    Unsupported(&'static str),
    /// The engine observed a cancelled [`CancelToken`] and stopped.
    Aborted,
    /// The engine failed unexpectedly.
    Failure(Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl BackendError {
    /// Wrap an arbitrary engine failure.
    pub fn failure<E>(err: E) -> BackendError
    where
        E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    {
        BackendError::Failure(err.into())
    }
}

impl std::error::Error for BackendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match *self {
            BackendError::Failure(ref err) => Some(&**err),
            _ => None,
        }
    }
}

impl core::fmt::Display for BackendError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match *self {
            BackendError::Unsupported(primitive) => {
                write!(f, "unsupported primitive '{}'", primitive)
            }
            BackendError::Aborted => write!(f, "search aborted"),
            BackendError::Failure(ref err) => err.fmt(f),
        }
    }
}

/// Returns `span` if it can be used to slice `haystack`. That is, if it is
/// in bounds, not reversed and both of its ends fall on codepoint boundaries.
pub(crate) fn check_span(
    haystack: &str,
    span: Span,
) -> Result<Span, BackendError> {
    if haystack.get(span.range()).is_some() {
        return Ok(span);
    }
    Err(BackendError::failure(format!(
        "engine reported bounds {}..{} that are not valid for an input \
         of length {}",
        span.start,
        span.end,
        haystack.len(),
    )))
}

/// Wraps `source` in a non-capturing group between `prefix` and `suffix`.
///
/// This is how adapters derive anchored forms of a pattern without changing
/// its group numbering. When whitespace is insignificant, the closing paren
/// goes on its own line so that a trailing comment can't swallow it.
pub(crate) fn wrap(
    prefix: &str,
    source: &str,
    suffix: &str,
    ignore_whitespace: bool,
) -> String {
    let mut wrapped =
        String::with_capacity(prefix.len() + source.len() + suffix.len() + 5);
    wrapped.push_str(prefix);
    wrapped.push_str("(?:");
    wrapped.push_str(source);
    if ignore_whitespace {
        wrapped.push('\n');
    }
    wrapped.push(')');
    wrapped.push_str(suffix);
    wrapped
}

/// Collects group bounds for indices `0..=group_count` from a lookup
/// function into `groups`, reusing its allocation.
pub(crate) fn collect_groups<F>(
    groups: &mut Vec<Option<Span>>,
    group_count: usize,
    mut lookup: F,
) where
    F: FnMut(usize) -> Option<Span>,
{
    groups.clear();
    groups.extend((0..=group_count).map(|i| lookup(i)));
}

/// Reads the given group out of a list of collected bounds. The list is empty
/// when the most recent attempt did not match.
pub(crate) fn lookup_group(
    groups: &[Option<Span>],
    index: usize,
) -> Result<Option<Span>, BackendError> {
    match groups.get(index) {
        Some(&span) => Ok(span),
        None if groups.is_empty() => {
            Err(BackendError::failure("no match has been recorded"))
        }
        None => Err(BackendError::failure(format!(
            "group index {} out of range for engine",
            index
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_plain() {
        assert_eq!(r"\A(?:a|b)\z", wrap(r"\A", "a|b", r"\z", false));
    }

    #[test]
    fn wrap_extended() {
        assert_eq!("(?:a # comment\n)$", wrap("", "a # comment", "$", true));
    }

    #[derive(Debug)]
    struct Fixed(Arc<str>, Span);

    impl RawCursor for Fixed {
        fn haystack(&self) -> &str {
            &self.0
        }

        fn find_at(
            &mut self,
            _: usize,
            _: &CancelToken,
        ) -> Result<bool, BackendError> {
            Ok(true)
        }

        fn match_whole(
            &mut self,
            _: &CancelToken,
        ) -> Result<bool, BackendError> {
            Ok(true)
        }

        fn match_prefix(
            &mut self,
            _: &CancelToken,
        ) -> Result<bool, BackendError> {
            Ok(true)
        }

        fn group_span(&self, _: usize) -> Result<Option<Span>, BackendError> {
            Ok(Some(self.1))
        }

        fn rewind(&mut self) {}
    }

    #[test]
    fn spans_are_checked() {
        let hay = "a☃";
        assert!(check_span(hay, Span::from(0..4)).is_ok());
        assert!(check_span(hay, Span::from(4..4)).is_ok());
        assert!(check_span(hay, Span::from(1..2)).is_err());
        assert!(check_span(hay, Span::from(0..5)).is_err());
        assert!(check_span(hay, Span::from(4..1)).is_err());
    }

    #[test]
    fn default_group_text_refuses_bad_bounds() {
        let good = Fixed(Arc::from("a☃"), Span::from(1..4));
        assert_eq!(Some("☃"), good.group_text(0).unwrap());

        let bad = Fixed(Arc::from("a☃"), Span::from(1..2));
        assert!(matches!(bad.group_text(0), Err(BackendError::Failure(_))));
    }

    #[test]
    fn groups_roundtrip_through_lookup() {
        let mut groups = vec![];
        assert!(lookup_group(&groups, 0).is_err());
        collect_groups(&mut groups, 2, |i| {
            if i == 1 {
                None
            } else {
                Some(Span::from(i..i + 1))
            }
        });
        assert_eq!(Some(Span::from(0..1)), lookup_group(&groups, 0).unwrap());
        assert_eq!(None, lookup_group(&groups, 1).unwrap());
        assert_eq!(Some(Span::from(2..3)), lookup_group(&groups, 2).unwrap());
        assert!(lookup_group(&groups, 3).is_err());
    }
}
