/*!
An adapter for `regress`, a backtracking engine for ECMAScript regex syntax.

`regress` places no bound on the work a search may do, so a pattern like
`(a*)*` takes exponential time on an input like `aaaa...!`. It also has no
abort hook. Deadline-bounded searches with this engine can time out, but the
abandoned worker keeps running until the search completes on its own.

ECMAScript has no `\A` or `\z`, so the anchored forms used for prefix and
whole-input matching are written as look-arounds that can only succeed at the
ends of the input.
*/

use std::sync::Arc;

use regress::Regex;

use crate::{
    backend::{
        collect_groups, lookup_group, wrap, Backend, BackendError, RawCursor,
    },
    deadline::CancelToken,
    error::Error,
    pattern::{Config, Flags},
    util::search::Span,
};

/// Only succeeds at the start of the input.
const AT_START: &str = r"(?<![\s\S])";
/// Only succeeds at the end of the input.
const AT_END: &str = r"(?![\s\S])";

#[derive(Debug)]
pub(crate) struct BacktrackBackend(Arc<BacktrackBackendI>);

#[derive(Debug)]
struct BacktrackBackendI {
    find: Regex,
    prefix: Regex,
    whole: Regex,
    group_count: usize,
}

impl BacktrackBackend {
    pub(crate) fn new(
        source: &str,
        config: &Config,
    ) -> Result<BacktrackBackend, Error> {
        let flags = config.get_flags();
        if flags.is_ignore_whitespace() {
            return Err(Error::config(
                "the backtrack engine does not support ignoring whitespace",
            ));
        }
        let rflags = engine_flags(flags);
        let compile = |body: &str| {
            Regex::with_flags(body, rflags)
                .map_err(|err| Error::syntax(err.text, None))
        };
        let find = compile(source)?;
        let prefix = compile(&wrap(AT_START, source, "", false))?;
        let whole = compile(&wrap(AT_START, source, AT_END, false))?;
        let group_count = count_groups(source, rflags)?;
        Ok(BacktrackBackend(Arc::new(BacktrackBackendI {
            find,
            prefix,
            whole,
            group_count,
        })))
    }
}

impl Backend for BacktrackBackend {
    fn name(&self) -> &'static str {
        "backtrack"
    }

    fn group_count(&self) -> usize {
        self.0.group_count
    }

    fn create_cursor(&self, haystack: Arc<str>) -> Box<dyn RawCursor> {
        Box::new(BacktrackCursor {
            re: Arc::clone(&self.0),
            haystack,
            groups: vec![],
        })
    }
}

#[derive(Debug)]
struct BacktrackCursor {
    re: Arc<BacktrackBackendI>,
    haystack: Arc<str>,
    groups: Vec<Option<Span>>,
}

impl BacktrackCursor {
    fn record(&mut self, m: Option<regress::Match>) -> bool {
        self.groups.clear();
        let m = match m {
            None => return false,
            Some(m) => m,
        };
        collect_groups(&mut self.groups, self.re.group_count, |i| {
            m.group(i).map(Span::from)
        });
        true
    }
}

impl RawCursor for BacktrackCursor {
    fn haystack(&self) -> &str {
        &self.haystack
    }

    fn find_at(
        &mut self,
        at: usize,
        _: &CancelToken,
    ) -> Result<bool, BackendError> {
        let m = self.re.find.find_from(&self.haystack, at).next();
        Ok(self.record(m))
    }

    fn match_whole(&mut self, _: &CancelToken) -> Result<bool, BackendError> {
        let m = self.re.whole.find(&self.haystack);
        Ok(self.record(m))
    }

    fn match_prefix(
        &mut self,
        _: &CancelToken,
    ) -> Result<bool, BackendError> {
        let m = self.re.prefix.find(&self.haystack);
        Ok(self.record(m))
    }

    fn group_span(&self, index: usize) -> Result<Option<Span>, BackendError> {
        lookup_group(&self.groups, index)
    }

    fn rewind(&mut self) {
        self.groups.clear();
    }
}

fn engine_flags(flags: Flags) -> regress::Flags {
    let mut rflags = regress::Flags::default();
    rflags.icase = flags.is_case_insensitive();
    rflags.multiline = flags.is_multi_line();
    rflags.dot_all = flags.is_dot_matches_new_line();
    rflags.unicode = flags.is_unicode();
    rflags
}

/// `regress` doesn't expose the number of capture groups in a compiled
/// regex, but every match reports all of them. So count them on a match that
/// always succeeds: the pattern as one alternative and nothing as the other.
fn count_groups(source: &str, rflags: regress::Flags) -> Result<usize, Error> {
    let probe = format!("{}|", wrap("", source, "", false));
    let re = Regex::with_flags(&probe, rflags)
        .map_err(|err| Error::syntax(err.text, None))?;
    match re.find("") {
        Some(m) => Ok(m.captures.len()),
        None => Err(Error::config("could not determine capture group count")),
    }
}
