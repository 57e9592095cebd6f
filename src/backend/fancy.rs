/*!
An adapter for `fancy-regex`.

`fancy-regex` supports look-around and backreferences by backtracking, with
a configurable bound on the number of backtracking steps. Exceeding the bound
is reported as an engine failure, not as "no match." The engine has no abort
hook, so cancellation tokens are ignored and an abandoned attempt runs until
the backtracking bound stops it.

Prefix and whole-input matches use separately compiled regexes wrapped in
`\A` and `\z`. Wrapping happens inside a non-capturing group, so group
numbering is the same for all three.
*/

use std::sync::Arc;

use fancy_regex::{Regex, RegexBuilder};

use crate::{
    backend::{
        collect_groups, lookup_group, wrap, Backend, BackendError, RawCursor,
    },
    deadline::CancelToken,
    error::Error,
    pattern::{Config, Flags},
    util::search::Span,
};

#[derive(Debug)]
pub(crate) struct FancyBackend(Arc<FancyBackendI>);

#[derive(Debug)]
struct FancyBackendI {
    find: Regex,
    prefix: Regex,
    whole: Regex,
    group_count: usize,
}

impl FancyBackend {
    pub(crate) fn new(
        source: &str,
        config: &Config,
    ) -> Result<FancyBackend, Error> {
        let flags = config.get_flags();
        if !flags.is_unicode() {
            return Err(Error::config(
                "the fancy engine cannot disable Unicode mode",
            ));
        }
        let leading = inline_flags(flags);
        let ix = flags.is_ignore_whitespace();
        let compile = |body: &str| -> Result<Regex, Error> {
            let full = format!("{}{}", leading, body);
            let mut builder = RegexBuilder::new(&full);
            builder
                .case_insensitive(flags.is_case_insensitive())
                .backtrack_limit(config.get_backtrack_limit());
            if let Some(limit) = config.get_size_limit() {
                builder.delegate_size_limit(limit);
            }
            builder.build().map_err(|err| build_error(err, leading.len()))
        };
        let find = compile(source)?;
        let prefix = compile(&wrap(r"\A", source, "", ix))?;
        let whole = compile(&wrap(r"\A", source, r"\z", ix))?;
        let group_count = find.captures_len().saturating_sub(1);
        Ok(FancyBackend(Arc::new(FancyBackendI {
            find,
            prefix,
            whole,
            group_count,
        })))
    }
}

impl Backend for FancyBackend {
    fn name(&self) -> &'static str {
        "fancy"
    }

    fn group_count(&self) -> usize {
        self.0.group_count
    }

    fn create_cursor(&self, haystack: Arc<str>) -> Box<dyn RawCursor> {
        Box::new(FancyCursor {
            re: Arc::clone(&self.0),
            haystack,
            groups: vec![],
        })
    }
}

#[derive(Debug)]
struct FancyCursor {
    re: Arc<FancyBackendI>,
    haystack: Arc<str>,
    groups: Vec<Option<Span>>,
}

#[derive(Clone, Copy, Debug)]
enum Which {
    Find,
    Prefix,
    Whole,
}

impl FancyCursor {
    fn search(&mut self, which: Which, at: usize) -> Result<bool, BackendError> {
        self.groups.clear();
        let re = match which {
            Which::Find => &self.re.find,
            Which::Prefix => &self.re.prefix,
            Which::Whole => &self.re.whole,
        };
        let caps = match re.captures_from_pos(&self.haystack, at) {
            Ok(Some(caps)) => caps,
            Ok(None) => return Ok(false),
            Err(err) => return Err(BackendError::failure(err)),
        };
        collect_groups(&mut self.groups, self.re.group_count, |i| {
            caps.get(i).map(|m| Span::from(m.start()..m.end()))
        });
        Ok(true)
    }
}

impl RawCursor for FancyCursor {
    fn haystack(&self) -> &str {
        &self.haystack
    }

    fn find_at(
        &mut self,
        at: usize,
        _: &CancelToken,
    ) -> Result<bool, BackendError> {
        self.search(Which::Find, at)
    }

    fn match_whole(&mut self, _: &CancelToken) -> Result<bool, BackendError> {
        self.search(Which::Whole, 0)
    }

    fn match_prefix(
        &mut self,
        _: &CancelToken,
    ) -> Result<bool, BackendError> {
        self.search(Which::Prefix, 0)
    }

    fn group_span(&self, index: usize) -> Result<Option<Span>, BackendError> {
        lookup_group(&self.groups, index)
    }

    fn rewind(&mut self) {
        self.groups.clear();
    }
}

/// Returns an inline flag group for the flags the builder can't set itself,
/// or an empty string if there are none.
fn inline_flags(flags: Flags) -> String {
    let mut letters = String::new();
    if flags.is_multi_line() {
        letters.push('m');
    }
    if flags.is_dot_matches_new_line() {
        letters.push('s');
    }
    if flags.is_ignore_whitespace() {
        letters.push('x');
    }
    if letters.is_empty() {
        return letters;
    }
    format!("(?{})", letters)
}

fn build_error(err: fancy_regex::Error, leading: usize) -> Error {
    match err {
        fancy_regex::Error::ParseError(pos, kind) => {
            Error::syntax(kind.to_string(), Some(pos.saturating_sub(leading)))
        }
        fancy_regex::Error::CompileError(kind) => {
            Error::syntax(kind.to_string(), None)
        }
        err => Error::backend("compile", Box::new(err)),
    }
}
