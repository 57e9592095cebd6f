use std::{mem, sync::Arc, time::Duration};

use crate::{
    backend::{check_span, BackendError, RawCursor},
    deadline::{self, CancelToken, Outcome},
    error::Error,
    pattern::Pattern,
    util::{interpolate, search::Span, utf8},
};

/// A stateful cursor over one input for one [`Pattern`].
///
/// A cursor is either positioned on a match or it isn't. It starts out
/// unpositioned. Each of [`find`](Cursor::find),
/// [`matches`](Cursor::matches) and [`looking_at`](Cursor::looking_at)
/// positions it on the match it finds, or leaves it unpositioned if it
/// finds none. [`reset`](Cursor::reset) always leaves it unpositioned.
///
/// The match accessors ([`start`](Cursor::start), [`group`](Cursor::group)
/// and friends) may only be called while positioned on a match. Otherwise
/// they return an error of kind [`ErrorKind::State`](crate::ErrorKind::State).
///
/// These rules are enforced here, not by the engine, so they are the same no
/// matter which engine compiled the pattern.
///
/// # Deadlines
///
/// Each matching routine has a `_within` variant that accepts a deadline.
/// A deadline of [`Duration::ZERO`] means "no deadline" and behaves exactly
/// like the unbounded routine. Any other deadline runs the attempt on a
/// worker thread and gives up once the deadline elapses, returning an error
/// of kind [`ErrorKind::Timeout`](crate::ErrorKind::Timeout). The replacement
/// routines run every one of their searches on a single worker, so their
/// deadline covers the whole replacement. A cursor that gives up is always
/// reset. See the [`deadline`](crate::deadline) module for what happens to
/// the abandoned attempt.
///
/// # Example
///
/// This shows how to build a replacement where each match gets a different
/// replacement text, with [`append_replacement`](Cursor::append_replacement)
/// and [`append_tail`](Cursor::append_tail).
///
/// ```
/// use regex_bridge::Pattern;
///
/// let pat = Pattern::new("XX")?;
/// let mut cur = pat.cursor("Today is XX-XX-XX ...");
/// let mut out = String::new();
/// let mut i = 0;
/// while cur.find()? {
///     cur.append_replacement(&mut out, &(i * 10 + i).to_string())?;
///     i += 1;
/// }
/// assert_eq!("Today is 0-11-22 ...", cur.append_tail(&mut out));
///
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct Cursor {
    pattern: Pattern,
    input: Arc<str>,
    raw: Box<dyn RawCursor>,
    state: State,
    /// Where the next call to `find` begins searching. This is `None` once
    /// `find` has failed, or once an empty match has been found at the very
    /// end of the input.
    search_at: Option<usize>,
    /// The end of the input consumed by the replacement routines so far.
    append_at: usize,
    /// Passed to the engine by attempts run on the thread that owns this
    /// cursor. It is only ever cancelled on a cursor lent to a bounded
    /// replacement, which checks it between searches.
    abort: CancelToken,
    /// The caller's token, checked while waiting on bounded attempts.
    cancel: Option<CancelToken>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum State {
    Unmatched,
    Matched(Span),
}

/// A single invocation of one of the engine's matching primitives.
#[derive(Clone, Copy, Debug)]
enum Attempt {
    Find(usize),
    Whole,
    Prefix,
}

impl Attempt {
    fn name(&self) -> &'static str {
        match *self {
            Attempt::Find(_) => "find",
            Attempt::Whole => "matches",
            Attempt::Prefix => "looking_at",
        }
    }

    /// Runs this attempt and returns the bounds of the overall match, after
    /// checking that they can be used to slice `input`.
    fn run(
        self,
        raw: &mut dyn RawCursor,
        input: &str,
        cancel: &CancelToken,
    ) -> Result<Option<Span>, BackendError> {
        let found = match self {
            Attempt::Find(at) => raw.find_at(at, cancel)?,
            Attempt::Whole => raw.match_whole(cancel)?,
            Attempt::Prefix => raw.match_prefix(cancel)?,
        };
        if !found {
            return Ok(None);
        }
        match raw.group_span(0)? {
            Some(span) => Ok(Some(check_span(input, span)?)),
            None => Err(BackendError::failure(
                "engine reported a match without reporting its bounds",
            )),
        }
    }
}

/// Which of the replacement routines is running.
#[derive(Clone, Copy, Debug)]
enum Replace {
    All,
    First,
}

impl Replace {
    fn name(&self) -> &'static str {
        match *self {
            Replace::All => "replace_all",
            Replace::First => "replace_first",
        }
    }
}

/// Stands in for the engine state while it is lent to a worker thread.
///
/// A cursor only holds one of these for the duration of a bounded attempt,
/// and always replaces it before returning to its caller.
#[derive(Debug)]
struct Vacant;

impl Vacant {
    fn lent<T>() -> Result<T, BackendError> {
        Err(BackendError::failure("engine state is lent to a worker thread"))
    }
}

impl RawCursor for Vacant {
    fn haystack(&self) -> &str {
        ""
    }

    fn find_at(
        &mut self,
        _: usize,
        _: &CancelToken,
    ) -> Result<bool, BackendError> {
        Vacant::lent()
    }

    fn match_whole(&mut self, _: &CancelToken) -> Result<bool, BackendError> {
        Vacant::lent()
    }

    fn match_prefix(&mut self, _: &CancelToken) -> Result<bool, BackendError> {
        Vacant::lent()
    }

    fn group_span(&self, _: usize) -> Result<Option<Span>, BackendError> {
        Vacant::lent()
    }

    fn rewind(&mut self) {}
}

impl Cursor {
    pub(crate) fn new(pattern: Pattern, input: Arc<str>) -> Cursor {
        let raw = pattern.create_raw(Arc::clone(&input));
        Cursor {
            pattern,
            input,
            raw,
            state: State::Unmatched,
            search_at: Some(0),
            append_at: 0,
            abort: CancelToken::new(),
            cancel: None,
        }
    }

    /// Returns the pattern this cursor matches with.
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Returns the input this cursor searches.
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Install a token that cancels deadline-bounded attempts while they
    /// wait. Pass `None` to remove a previously installed token.
    ///
    /// Cancelling the token makes a waiting bounded call return an error of
    /// kind [`ErrorKind::Cancelled`](crate::ErrorKind::Cancelled). The token
    /// is left cancelled, so every later bounded call fails the same way
    /// until a new token is installed. Unbounded calls never look at it.
    pub fn set_cancel_token(&mut self, token: Option<CancelToken>) {
        self.cancel = token;
    }

    /// Returns true if this cursor is positioned on a match.
    pub fn is_matched(&self) -> bool {
        matches!(self.state, State::Matched(_))
    }

    /// Returns the number of explicit capture groups in the pattern.
    pub fn group_count(&self) -> usize {
        self.pattern.group_count()
    }

    /// Search for the next match.
    ///
    /// The search begins where the previous match ended, or at the start of
    /// the input if there has been no match since the last reset. If the
    /// previous match was empty, the search begins one codepoint later so
    /// that the same empty match is never reported twice.
    ///
    /// Once `find` returns `false`, it keeps returning `false` until the
    /// cursor is reset.
    pub fn find(&mut self) -> Result<bool, Error> {
        self.find_within(Duration::ZERO)
    }

    /// Like [`find`](Cursor::find), but gives up after `deadline`.
    pub fn find_within(&mut self, deadline: Duration) -> Result<bool, Error> {
        match self.search_at {
            Some(at) => self.attempt(Attempt::Find(at), deadline),
            None => {
                self.state = State::Unmatched;
                Ok(false)
            }
        }
    }

    /// Attempt to match the entire input.
    pub fn matches(&mut self) -> Result<bool, Error> {
        self.matches_within(Duration::ZERO)
    }

    /// Like [`matches`](Cursor::matches), but gives up after `deadline`.
    pub fn matches_within(
        &mut self,
        deadline: Duration,
    ) -> Result<bool, Error> {
        self.attempt(Attempt::Whole, deadline)
    }

    /// Attempt to match a prefix of the input. Unlike
    /// [`matches`](Cursor::matches), the match need not extend to the end of
    /// the input.
    pub fn looking_at(&mut self) -> Result<bool, Error> {
        self.looking_at_within(Duration::ZERO)
    }

    /// Like [`looking_at`](Cursor::looking_at), but gives up after
    /// `deadline`.
    pub fn looking_at_within(
        &mut self,
        deadline: Duration,
    ) -> Result<bool, Error> {
        self.attempt(Attempt::Prefix, deadline)
    }

    /// Forget any match, rewind searching to the start of the input and
    /// rewind the replacement routines to the start of the input.
    ///
    /// This never fails and calling it twice is the same as calling it once.
    pub fn reset(&mut self) -> &mut Cursor {
        self.state = State::Unmatched;
        self.search_at = Some(0);
        self.append_at = 0;
        self.raw.rewind();
        self
    }

    /// Rebind this cursor to a new input and reset it.
    pub fn reset_with<I: Into<Arc<str>>>(&mut self, input: I) -> &mut Cursor {
        self.input = input.into();
        self.raw = self.pattern.create_raw(Arc::clone(&self.input));
        self.reset()
    }

    /// Returns the bounds of the current match.
    pub fn span(&self) -> Result<Span, Error> {
        self.matched("span")
    }

    /// Returns the start offset of the current match.
    pub fn start(&self) -> Result<usize, Error> {
        Ok(self.matched("start")?.start)
    }

    /// Returns the end offset of the current match.
    pub fn end(&self) -> Result<usize, Error> {
        Ok(self.matched("end")?.end)
    }

    /// Returns the text of the current match.
    pub fn group(&self) -> Result<&str, Error> {
        Ok(&self.input[self.matched("group")?])
    }

    /// Returns the start offset of the given group in the current match, or
    /// `None` if the group did not participate in the match.
    ///
    /// Group `0` is the overall match. The index must be at most
    /// [`group_count`](Cursor::group_count).
    pub fn group_start(&self, index: usize) -> Result<Option<usize>, Error> {
        Ok(self.group_span("group_start", index)?.map(|span| span.start))
    }

    /// Returns the end offset of the given group in the current match, or
    /// `None` if the group did not participate in the match.
    pub fn group_end(&self, index: usize) -> Result<Option<usize>, Error> {
        Ok(self.group_span("group_end", index)?.map(|span| span.end))
    }

    /// Returns the text of the given group in the current match, or `None`
    /// if the group did not participate in the match.
    pub fn group_str(&self, index: usize) -> Result<Option<&str>, Error> {
        let span = self.check_group("group_str", index)?;
        if index == 0 {
            return Ok(Some(&self.input[span]));
        }
        self.raw.group_text(index).map_err(|err| {
            self.convert("group_str", err)
                .with_group(index)
                .with_pattern(self.pattern.as_str())
        })
    }

    /// Append the input between the end of the previously appended region
    /// and the start of the current match to `buf`, followed by the
    /// expansion of `template`.
    ///
    /// In `template`, `$n` is replaced by the text of group `n` and `\c`
    /// inserts the character `c` literally. Digits after `$` are consumed for
    /// as long as they still name a group, so with 12 groups, `$12` is group
    /// 12, but with fewer than 12 it is group 1 followed by `2`. A group that
    /// did not participate expands to nothing. Use
    /// [`quote_replacement`](crate::quote_replacement) to insert arbitrary
    /// text literally.
    ///
    /// If the template is malformed, an error is returned and neither `buf`
    /// nor this cursor are changed.
    pub fn append_replacement(
        &mut self,
        buf: &mut String,
        template: &str,
    ) -> Result<(), Error> {
        const OP: &str = "append_replacement";

        let span = self.matched(OP)?;
        let mut expanded = String::new();
        {
            let (input, raw) = (&*self.input, &*self.raw);
            let engine = self.pattern.engine_name();
            interpolate::string(
                template,
                self.group_count(),
                |index, dst| {
                    let text = if index == 0 {
                        Some(&input[span])
                    } else {
                        raw.group_text(index).map_err(|err| {
                            convert(OP, engine, err).with_group(index)
                        })?
                    };
                    if let Some(text) = text {
                        dst.push_str(text);
                    }
                    Ok(())
                },
                &mut expanded,
            )
            .map_err(|err| err.with_pattern(self.pattern.as_str()))?;
        }
        // A match can only precede the appended region if the caller mixed
        // in 'matches' or 'looking_at' without resetting. In that case none
        // of the input is copied, which keeps the append position monotonic.
        if self.append_at < span.start {
            buf.push_str(&self.input[self.append_at..span.start]);
        }
        buf.push_str(&expanded);
        self.append_at = self.append_at.max(span.end);
        Ok(())
    }

    /// Append the rest of the input, following the last region appended by
    /// [`append_replacement`](Cursor::append_replacement), to `buf`. The
    /// entire contents of `buf` are returned.
    ///
    /// This may be called whether or not the cursor is positioned on a match.
    pub fn append_tail<'b>(&self, buf: &'b mut String) -> &'b str {
        buf.push_str(&self.input[self.append_at..]);
        buf.as_str()
    }

    /// Reset this cursor and replace every match with the expansion of
    /// `template`.
    pub fn replace_all(&mut self, template: &str) -> Result<String, Error> {
        self.replace_all_within(template, Duration::ZERO)
    }

    /// Like [`replace_all`](Cursor::replace_all), but gives up once
    /// `deadline` has elapsed. The deadline covers the entire replacement,
    /// not each individual search.
    pub fn replace_all_within(
        &mut self,
        template: &str,
        deadline: Duration,
    ) -> Result<String, Error> {
        self.replace_within(Replace::All, template, deadline)
    }

    /// Reset this cursor and replace the first match with the expansion of
    /// `template`. If there is no match, the input is returned unchanged.
    pub fn replace_first(&mut self, template: &str) -> Result<String, Error> {
        self.replace_first_within(template, Duration::ZERO)
    }

    /// Like [`replace_first`](Cursor::replace_first), but gives up after
    /// `deadline`.
    pub fn replace_first_within(
        &mut self,
        template: &str,
        deadline: Duration,
    ) -> Result<String, Error> {
        self.replace_within(Replace::First, template, deadline)
    }
}

impl Cursor {
    fn attempt(
        &mut self,
        attempt: Attempt,
        deadline: Duration,
    ) -> Result<bool, Error> {
        let result = if deadline == Duration::ZERO {
            attempt
                .run(&mut *self.raw, &self.input, &self.abort)
                .map_err(|err| self.convert(attempt.name(), err))
        } else {
            self.bounded(attempt, deadline)
        };
        match result {
            Ok(Some(span)) => {
                self.state = State::Matched(span);
                self.search_at = if span.is_empty() {
                    utf8::next_boundary(&self.input, span.end)
                } else {
                    Some(span.end)
                };
                Ok(true)
            }
            Ok(None) => {
                self.state = State::Unmatched;
                if let Attempt::Find(_) = attempt {
                    self.search_at = None;
                }
                Ok(false)
            }
            Err(err) => {
                self.state = State::Unmatched;
                Err(err.with_pattern(self.pattern.as_str()))
            }
        }
    }

    /// Run one attempt on a worker thread.
    ///
    /// The worker borrows this cursor's engine state and gives it back if it
    /// finishes in time.
    fn bounded(
        &mut self,
        attempt: Attempt,
        deadline: Duration,
    ) -> Result<Option<Span>, Error> {
        let op = attempt.name();
        let raw = mem::replace(&mut self.raw, Box::new(Vacant));
        let input = Arc::clone(&self.input);
        let grace = self.pattern.get_config().get_cancel_grace();
        let outcome = deadline::run_bounded(
            raw,
            deadline,
            self.cancel.as_ref(),
            grace,
            move |raw, cancel| attempt.run(&mut **raw, &input, cancel),
        );
        let (raw, result) = self.settle(op, deadline, outcome)?;
        self.raw = raw;
        result.map_err(|err| self.convert(op, err).with_deadline(deadline))
    }

    fn replace_within(
        &mut self,
        how: Replace,
        template: &str,
        deadline: Duration,
    ) -> Result<String, Error> {
        self.reset();
        let result = if deadline == Duration::ZERO {
            self.replace(how, template)
        } else {
            self.replace_bounded(how, template, deadline)
        };
        result.map_err(|err| err.with_operation(how.name()))
    }

    /// Run a whole replacement on a worker thread.
    ///
    /// The worker gets a cursor holding this cursor's engine state, and runs
    /// every search of the replacement with it. If the worker finishes in
    /// time, its state is copied back.
    fn replace_bounded(
        &mut self,
        how: Replace,
        template: &str,
        deadline: Duration,
    ) -> Result<String, Error> {
        let op = how.name();
        let template = template.to_string();
        let lent = self.lend();
        let grace = self.pattern.get_config().get_cancel_grace();
        let outcome = deadline::run_bounded(
            lent,
            deadline,
            self.cancel.as_ref(),
            grace,
            move |cur: &mut Cursor, cancel: &CancelToken| {
                cur.abort = cancel.clone();
                cur.replace(how, &template)
            },
        );
        let (lent, result) = self
            .settle(op, deadline, outcome)
            .map_err(|err| err.with_pattern(self.pattern.as_str()))?;
        self.restore(lent);
        result.map_err(|err| err.with_deadline(deadline))
    }

    /// The replacement loop. It starts wherever this cursor is and stops
    /// early if `abort` is cancelled between two searches.
    fn replace(
        &mut self,
        how: Replace,
        template: &str,
    ) -> Result<String, Error> {
        let mut buf = String::with_capacity(self.input.len());
        loop {
            if self.abort.is_cancelled() {
                return Err(self
                    .convert(how.name(), BackendError::Aborted)
                    .with_pattern(self.pattern.as_str()));
            }
            if !self.find()? {
                break;
            }
            self.append_replacement(&mut buf, template)?;
            if let Replace::First = how {
                break;
            }
        }
        self.append_tail(&mut buf);
        Ok(buf)
    }

    /// Unpacks the outcome of a bounded attempt.
    ///
    /// If the attempt was abandoned, the state it was given is gone for
    /// good. This cursor then gets fresh engine state and is reset.
    fn settle<S, T>(
        &mut self,
        op: &'static str,
        deadline: Duration,
        outcome: Outcome<S, T>,
    ) -> Result<(S, T), Error> {
        let err = match outcome {
            Outcome::Finished(state, result) => return Ok((state, result)),
            Outcome::TimedOut => {
                debug!("{} timed out after {:?}", op, deadline);
                Error::timeout(op, deadline)
            }
            Outcome::Cancelled => {
                debug!("{} was cancelled by the caller", op);
                Error::cancelled(op, deadline)
            }
            Outcome::Failed(err) => {
                self.convert(op, err).with_deadline(deadline)
            }
        };
        self.raw = self.pattern.create_raw(Arc::clone(&self.input));
        self.reset();
        Err(err)
    }

    /// Moves this cursor's matching state into a new cursor over the same
    /// input, leaving vacant engine state behind.
    fn lend(&mut self) -> Cursor {
        Cursor {
            pattern: self.pattern.clone(),
            input: Arc::clone(&self.input),
            raw: mem::replace(&mut self.raw, Box::new(Vacant)),
            state: self.state,
            search_at: self.search_at,
            append_at: self.append_at,
            abort: CancelToken::new(),
            cancel: None,
        }
    }

    /// Takes back the matching state of a cursor made by `lend`.
    fn restore(&mut self, lent: Cursor) {
        self.raw = lent.raw;
        self.state = lent.state;
        self.search_at = lent.search_at;
        self.append_at = lent.append_at;
    }

    fn matched(&self, op: &'static str) -> Result<Span, Error> {
        match self.state {
            State::Matched(span) => Ok(span),
            State::Unmatched => {
                Err(Error::state(op).with_pattern(self.pattern.as_str()))
            }
        }
    }

    /// Checks that the cursor is on a match and that `index` names a group.
    /// Returns the span of the overall match.
    fn check_group(&self, op: &'static str, index: usize) -> Result<Span, Error> {
        let span = self.matched(op)?;
        if index > self.group_count() {
            return Err(Error::index(op, index, self.group_count())
                .with_pattern(self.pattern.as_str()));
        }
        Ok(span)
    }

    fn group_span(
        &self,
        op: &'static str,
        index: usize,
    ) -> Result<Option<Span>, Error> {
        let span = self.check_group(op, index)?;
        if index == 0 {
            return Ok(Some(span));
        }
        self.raw
            .group_span(index)
            .and_then(|found| {
                found.map(|span| check_span(&self.input, span)).transpose()
            })
            .map_err(|err| {
                self.convert(op, err)
                    .with_group(index)
                    .with_pattern(self.pattern.as_str())
            })
    }

    fn convert(&self, op: &'static str, err: BackendError) -> Error {
        convert(op, self.pattern.engine_name(), err)
    }
}

fn convert(op: &'static str, engine: &'static str, err: BackendError) -> Error {
    match err {
        BackendError::Unsupported(primitive) => {
            Error::unsupported(op, primitive, engine)
        }
        BackendError::Aborted => {
            Error::backend(op, "engine aborted an uncancelled search".into())
        }
        BackendError::Failure(cause) => Error::backend(op, cause),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempt_names() {
        assert_eq!("find", Attempt::Find(3).name());
        assert_eq!("matches", Attempt::Whole.name());
        assert_eq!("looking_at", Attempt::Prefix.name());
        assert_eq!("replace_all", Replace::All.name());
        assert_eq!("replace_first", Replace::First.name());
    }

    #[cfg(feature = "meta")]
    #[test]
    fn lent_state_comes_back() {
        let pat = Pattern::new("b").unwrap();
        let mut cur = pat.cursor("abcb");
        assert!(cur.find().unwrap());

        let mut lent = cur.lend();
        assert!(cur.find().is_err());
        assert!(!cur.is_matched());
        assert!(lent.find().unwrap());
        assert_eq!(3, lent.start().unwrap());

        cur.restore(lent);
        assert_eq!(3, cur.start().unwrap());
        assert!(!cur.find().unwrap());
    }
}
