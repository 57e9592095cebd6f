/*!
An adapter for `regex-automata`'s meta regex engine.

The meta engine never backtracks, so it never needs a deadline to terminate
in reasonable time and it has no abort hook. Cancellation tokens are ignored.

Two regexes are compiled per pattern. The first is the pattern itself and is
used for unanchored searches and for prefix matches (via an anchored search).
The second is the pattern followed by `\z` and is used for whole-input
matches. An anchored search with the first regex alone isn't enough for the
latter, since leftmost-first semantics may prefer a shorter match: `a|ab`
matches `a` in `ab` even though `ab` matches the entire input.
*/

use std::sync::Arc;

use regex_automata::{
    meta,
    util::{captures::Captures, syntax},
    Anchored, Input,
};

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
pub(crate) struct MetaBackend(Arc<MetaBackendI>);

#[derive(Debug)]
struct MetaBackendI {
    find: meta::Regex,
    whole: meta::Regex,
    group_count: usize,
}

impl MetaBackend {
    pub(crate) fn new(
        source: &str,
        config: &Config,
    ) -> Result<MetaBackend, Error> {
        let flags = config.get_flags();
        let syntaxc = syntax_config(flags);
        let metac = meta::Config::new().nfa_size_limit(config.get_size_limit());
        let find = meta::Regex::builder()
            .syntax(syntaxc)
            .configure(metac.clone())
            .build(source)
            .map_err(build_error)?;
        let whole_source =
            wrap("", source, r"\z", flags.is_ignore_whitespace());
        let whole = meta::Regex::builder()
            .syntax(syntaxc)
            .configure(metac)
            .build(&whole_source)
            .map_err(build_error)?;
        let group_count = find.captures_len().saturating_sub(1);
        Ok(MetaBackend(Arc::new(MetaBackendI { find, whole, group_count })))
    }
}

impl Backend for MetaBackend {
    fn name(&self) -> &'static str {
        "meta"
    }

    fn group_count(&self) -> usize {
        self.0.group_count
    }

    fn create_cursor(&self, haystack: Arc<str>) -> Box<dyn RawCursor> {
        let re = &self.0;
        Box::new(MetaCursor {
            find_cache: re.find.create_cache(),
            whole_cache: re.whole.create_cache(),
            find_caps: re.find.create_captures(),
            whole_caps: re.whole.create_captures(),
            groups: vec![],
            re: Arc::clone(re),
            haystack,
        })
    }
}

#[derive(Debug)]
struct MetaCursor {
    re: Arc<MetaBackendI>,
    haystack: Arc<str>,
    find_cache: meta::Cache,
    whole_cache: meta::Cache,
    find_caps: Captures,
    whole_caps: Captures,
    groups: Vec<Option<Span>>,
}

impl MetaCursor {
    fn record(&mut self, whole: bool) -> bool {
        let caps = if whole { &self.whole_caps } else { &self.find_caps };
        if !caps.is_match() {
            self.groups.clear();
            return false;
        }
        collect_groups(&mut self.groups, self.re.group_count, |i| {
            caps.get_group(i).map(Span::from)
        });
        true
    }
}

impl RawCursor for MetaCursor {
    fn haystack(&self) -> &str {
        &self.haystack
    }

    fn find_at(
        &mut self,
        at: usize,
        _: &CancelToken,
    ) -> Result<bool, BackendError> {
        let input = Input::new(&*self.haystack).range(at..);
        self.re.find.search_captures_with(
            &mut self.find_cache,
            &input,
            &mut self.find_caps,
        );
        Ok(self.record(false))
    }

    fn match_whole(&mut self, _: &CancelToken) -> Result<bool, BackendError> {
        let input = Input::new(&*self.haystack).anchored(Anchored::Yes);
        self.re.whole.search_captures_with(
            &mut self.whole_cache,
            &input,
            &mut self.whole_caps,
        );
        Ok(self.record(true))
    }

    fn match_prefix(
        &mut self,
        _: &CancelToken,
    ) -> Result<bool, BackendError> {
        let input = Input::new(&*self.haystack).anchored(Anchored::Yes);
        self.re.find.search_captures_with(
            &mut self.find_cache,
            &input,
            &mut self.find_caps,
        );
        Ok(self.record(false))
    }

    fn group_span(&self, index: usize) -> Result<Option<Span>, BackendError> {
        lookup_group(&self.groups, index)
    }

    fn rewind(&mut self) {
        self.groups.clear();
    }
}

fn syntax_config(flags: Flags) -> syntax::Config {
    syntax::Config::new()
        .case_insensitive(flags.is_case_insensitive())
        .multi_line(flags.is_multi_line())
        .dot_matches_new_line(flags.is_dot_matches_new_line())
        .ignore_whitespace(flags.is_ignore_whitespace())
        .unicode(flags.is_unicode())
}

fn build_error(err: meta::BuildError) -> Error {
    if let Some(serr) = err.syntax_error() {
        let (message, offset) = match *serr {
            regex_syntax::Error::Parse(ref e) => {
                (e.kind().to_string(), Some(e.span().start.offset))
            }
            regex_syntax::Error::Translate(ref e)
                if *e.kind() == regex_syntax::hir::ErrorKind::InvalidUtf8 =>
            {
                // Only reachable with Unicode mode off, where '.' and
                // friends match arbitrary bytes.
                return Error::config(format!(
                    "pattern can match invalid UTF-8 at offset {} unless \
                     the unicode flag is enabled",
                    e.span().start.offset,
                ));
            }
            regex_syntax::Error::Translate(ref e) => {
                (e.kind().to_string(), Some(e.span().start.offset))
            }
            _ => (serr.to_string(), None),
        };
        return Error::syntax(message, offset);
    }
    if let Some(limit) = err.size_limit() {
        return Error::config(format!(
            "compiled pattern exceeds the size limit of {} bytes",
            limit
        ));
    }
    Error::backend("compile", Box::new(err))
}
