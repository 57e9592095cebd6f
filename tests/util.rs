use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    thread::{self, ThreadId},
    time::{Duration, Instant},
};

use regex_bridge::{
    backend::{Backend, BackendError, RawCursor},
    CancelToken, Config, Engine, Flags, Pattern, Span,
};

/// Returns a configuration for every engine enabled in this build.
pub fn engines() -> Vec<Config> {
    let mut configs = vec![];
    #[cfg(feature = "meta")]
    configs.push(Config::new().engine(Engine::Meta));
    #[cfg(feature = "fancy")]
    configs.push(Config::new().engine(Engine::Fancy));
    #[cfg(feature = "backtrack")]
    configs.push(Config::new().engine(Engine::Backtrack));
    configs
}

/// Compiles `source` once for every enabled engine.
pub fn patterns(source: &str) -> Vec<Pattern> {
    engines()
        .into_iter()
        .map(|config| {
            Pattern::builder()
                .configure(config)
                .build(source)
                .unwrap_or_else(|err| panic!("{:?} failed: {}", source, err))
        })
        .collect()
}

/// Collects the span of every match `find` reports, starting from a reset
/// cursor.
pub fn find_all(pat: &Pattern, input: &str) -> Vec<(usize, usize)> {
    let mut cur = pat.cursor(input);
    let mut spans = vec![];
    while cur.find().unwrap() {
        let span = cur.span().unwrap();
        spans.push((span.start, span.end));
    }
    spans
}

/// How a scripted primitive spends its time before answering.
#[derive(Clone, Copy, Debug)]
pub enum Spin {
    /// Answers immediately.
    Never,
    /// Sleeps for the given duration, checking its token every millisecond.
    Cooperative(Duration),
    /// Sleeps for the given duration without ever checking its token.
    Stubborn(Duration),
}

/// A fake engine that matches a literal needle and reports it as both the
/// overall match and group 1.
///
/// It can be told to refuse some primitives, to take its time answering, to
/// report group text but not group bounds and to report made up bounds.
#[derive(Clone, Debug)]
pub struct Scripted {
    needle: String,
    unsupported: Vec<&'static str>,
    spin: Spin,
    text_only: bool,
    report: Option<(usize, Span)>,
    aborted: Arc<AtomicUsize>,
    threads: Arc<Mutex<HashSet<ThreadId>>>,
}

impl Scripted {
    pub fn new(needle: &str) -> Scripted {
        Scripted {
            needle: needle.to_string(),
            unsupported: vec![],
            spin: Spin::Never,
            text_only: false,
            report: None,
            aborted: Arc::new(AtomicUsize::new(0)),
            threads: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn unsupported(mut self, primitive: &'static str) -> Scripted {
        self.unsupported.push(primitive);
        self
    }

    pub fn spin(mut self, spin: Spin) -> Scripted {
        self.spin = spin;
        self
    }

    pub fn text_only(mut self, yes: bool) -> Scripted {
        self.text_only = yes;
        self
    }

    /// Report `span` as the bounds of every group from `index` on, no
    /// matter where the needle was found.
    pub fn reporting(mut self, index: usize, span: Span) -> Scripted {
        self.report = Some((index, span));
        self
    }

    /// Returns the set of threads that any primitive has run on.
    pub fn threads(&self) -> Arc<Mutex<HashSet<ThreadId>>> {
        Arc::clone(&self.threads)
    }

    /// Returns a counter of how many attempts have observed a cancelled
    /// token and stopped.
    pub fn aborted(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.aborted)
    }

    pub fn into_pattern(self) -> Pattern {
        let needle = self.needle.clone();
        Pattern::from_backend(&needle, Flags::new(), Arc::new(self))
    }
}

impl Backend for Scripted {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn group_count(&self) -> usize {
        1
    }

    fn create_cursor(&self, haystack: Arc<str>) -> Box<dyn RawCursor> {
        Box::new(ScriptedCursor {
            script: self.clone(),
            haystack,
            last: None,
        })
    }
}

#[derive(Debug)]
struct ScriptedCursor {
    script: Scripted,
    haystack: Arc<str>,
    last: Option<Span>,
}

impl ScriptedCursor {
    fn begin(
        &mut self,
        primitive: &'static str,
        cancel: &CancelToken,
    ) -> Result<(), BackendError> {
        self.last = None;
        self.script.threads.lock().unwrap().insert(thread::current().id());
        if self.script.unsupported.contains(&primitive) {
            return Err(BackendError::Unsupported(primitive));
        }
        let (total, cooperative) = match self.script.spin {
            Spin::Never => return Ok(()),
            Spin::Cooperative(total) => (total, true),
            Spin::Stubborn(total) => (total, false),
        };
        let start = Instant::now();
        while start.elapsed() < total {
            if cooperative && cancel.is_cancelled() {
                self.script.aborted.fetch_add(1, Ordering::SeqCst);
                return Err(BackendError::Aborted);
            }
            thread::sleep(Duration::from_millis(1));
        }
        Ok(())
    }

    fn found(&mut self, start: Option<usize>) -> bool {
        self.last = start.map(|s| Span::from(s..s + self.script.needle.len()));
        self.last.is_some()
    }

    fn reported(&self, index: usize) -> Result<Option<Span>, BackendError> {
        match (self.last, self.script.report) {
            (Some(_), Some((from, span))) if from <= index && index <= 1 => {
                Ok(Some(span))
            }
            (Some(span), _) if index <= 1 => Ok(Some(span)),
            _ => Err(BackendError::failure("no such group")),
        }
    }
}

impl RawCursor for ScriptedCursor {
    fn haystack(&self) -> &str {
        &self.haystack
    }

    fn find_at(
        &mut self,
        at: usize,
        cancel: &CancelToken,
    ) -> Result<bool, BackendError> {
        self.begin("find_at", cancel)?;
        let start = self.haystack[at..].find(&self.script.needle);
        Ok(self.found(start.map(|i| at + i)))
    }

    fn match_whole(
        &mut self,
        cancel: &CancelToken,
    ) -> Result<bool, BackendError> {
        self.begin("match_whole", cancel)?;
        let yes = *self.haystack == *self.script.needle;
        Ok(self.found(if yes { Some(0) } else { None }))
    }

    fn match_prefix(
        &mut self,
        cancel: &CancelToken,
    ) -> Result<bool, BackendError> {
        self.begin("match_prefix", cancel)?;
        let yes = self.haystack.starts_with(&self.script.needle);
        Ok(self.found(if yes { Some(0) } else { None }))
    }

    fn group_span(&self, index: usize) -> Result<Option<Span>, BackendError> {
        if index > 0 && self.script.text_only {
            return Err(BackendError::Unsupported("group_span"));
        }
        self.reported(index)
    }

    fn group_text(&self, index: usize) -> Result<Option<&str>, BackendError> {
        match self.reported(index)? {
            None => Ok(None),
            Some(span) => match self.haystack.get(span.range()) {
                Some(text) => Ok(Some(text)),
                None => Err(BackendError::failure("bounds out of range")),
            },
        }
    }

    fn rewind(&mut self) {
        self.last = None;
    }
}
