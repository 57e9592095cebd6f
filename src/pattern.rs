use std::{sync::Arc, time::Duration};

use crate::{
    backend::{Backend, RawCursor},
    cursor::Cursor,
    error::Error,
};

/// A compiled pattern.
///
/// A `Pattern` is immutable and cheap to clone: clones share the compiled
/// engine state. It may be used from many threads at once, and each thread
/// may run its own [`Cursor`] over its own input with no synchronization.
///
/// # Example
///
/// ```
/// use regex_bridge::Pattern;
///
/// let pat = Pattern::new(r"(\w+)@(\w+)")?;
/// let mut cur = pat.cursor("mail alice@example now");
/// assert!(cur.find()?);
/// assert_eq!("alice@example", cur.group()?);
/// assert_eq!(Some("example"), cur.group_str(2)?);
///
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone, Debug)]
pub struct Pattern(Arc<PatternI>);

#[derive(Debug)]
struct PatternI {
    source: String,
    config: Config,
    backend: Arc<dyn Backend>,
    group_count: usize,
}

impl Pattern {
    /// Compile the given pattern with the default configuration and engine.
    pub fn new(source: &str) -> Result<Pattern, Error> {
        Pattern::builder().build(source)
    }

    /// Compile the given pattern with the given flags and the default engine.
    pub fn with_flags(source: &str, flags: Flags) -> Result<Pattern, Error> {
        Pattern::builder().configure(Config::new().flags(flags)).build(source)
    }

    /// Wrap an engine that was compiled outside of this crate.
    ///
    /// `source` and `flags` are only recorded for diagnostics. The engine is
    /// assumed to already honor them.
    pub fn from_backend(
        source: &str,
        flags: Flags,
        backend: Arc<dyn Backend>,
    ) -> Pattern {
        let config = Config::new().flags(flags);
        Pattern::from_parts(source, config, backend)
    }

    /// Return a default configuration for building a pattern.
    pub fn config() -> Config {
        Config::new()
    }

    /// Return a builder for compiling patterns with a custom configuration.
    pub fn builder() -> Builder {
        Builder::new()
    }

    fn from_parts(
        source: &str,
        config: Config,
        backend: Arc<dyn Backend>,
    ) -> Pattern {
        let group_count = backend.group_count();
        Pattern(Arc::new(PatternI {
            source: source.to_string(),
            config,
            backend,
            group_count,
        }))
    }

    /// Create a cursor over the given input.
    pub fn cursor<I: Into<Arc<str>>>(&self, input: I) -> Cursor {
        Cursor::new(self.clone(), input.into())
    }

    /// Returns true if this pattern matches anywhere in `input`.
    pub fn is_match(&self, input: &str) -> Result<bool, Error> {
        self.cursor(input).find()
    }

    /// Replace every match in `input` with the expansion of `template`.
    ///
    /// See [`Cursor::append_replacement`] for the template syntax.
    pub fn replace_all(
        &self,
        input: &str,
        template: &str,
    ) -> Result<String, Error> {
        self.cursor(input).replace_all(template)
    }

    /// Replace the first match in `input` with the expansion of `template`.
    /// If there is no match, `input` is returned unchanged.
    pub fn replace_first(
        &self,
        input: &str,
        template: &str,
    ) -> Result<String, Error> {
        self.cursor(input).replace_first(template)
    }

    /// Returns the pattern text this was compiled from.
    pub fn as_str(&self) -> &str {
        &self.0.source
    }

    /// Returns the flags this was compiled with.
    pub fn flags(&self) -> Flags {
        self.0.config.get_flags()
    }

    /// Returns the configuration this was compiled with.
    pub fn get_config(&self) -> &Config {
        &self.0.config
    }

    /// Returns the name of the engine executing this pattern.
    pub fn engine_name(&self) -> &'static str {
        self.0.backend.name()
    }

    /// Returns the number of explicit capture groups in this pattern. The
    /// implicit group for the overall match is not counted, so a pattern
    /// without any parentheses returns `0`. Valid group indices are
    /// `0..=group_count()`.
    pub fn group_count(&self) -> usize {
        self.0.group_count
    }

    pub(crate) fn create_raw(&self, haystack: Arc<str>) -> Box<dyn RawCursor> {
        self.0.backend.create_cursor(haystack)
    }
}

/// The regex engines that ship with this crate.
///
/// Each is behind a Cargo feature of the same name, all enabled by default.
/// Semantics legitimately differ between engines (for example, in what
/// syntax they accept and in how they treat Unicode classes). The one thing
/// they have in common is the [`Cursor`] contract.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Engine {
    /// `regex-automata`'s meta regex engine. Searches run in linear time,
    /// but look-around and backreferences are not supported.
    ///
    /// Since inputs are always valid UTF-8, turning [`Flags::unicode`] off
    /// restricts the syntax this engine accepts: anything that could match
    /// a lone byte outside of ASCII, like `.` or `[^a]`, is refused with a
    /// configuration error.
    #[cfg(feature = "meta")]
    Meta,
    /// `fancy-regex`, which supports look-around and backreferences by
    /// backtracking. Its backtracking is bounded by
    /// [`Config::backtrack_limit`].
    #[cfg(feature = "fancy")]
    Fancy,
    /// `regress`, a classical backtracker for ECMAScript syntax. It has no
    /// bound on its running time, so searches with untrusted patterns or
    /// inputs should use a deadline.
    ///
    /// It also has no abort hook. A search that misses its deadline is
    /// abandoned on a detached thread that keeps running until the search
    /// ends on its own, and nothing caps how many such threads can
    /// accumulate when timeouts repeat. See the [`deadline`](crate::deadline)
    /// module.
    #[cfg(feature = "backtrack")]
    Backtrack,
}

impl Engine {
    /// The engine used when none is configured, which is the first enabled
    /// engine in the order Meta, Fancy, Backtrack.
    pub fn default_engine() -> Option<Engine> {
        #[cfg(feature = "meta")]
        let engine = Some(Engine::Meta);
        #[cfg(all(not(feature = "meta"), feature = "fancy"))]
        let engine = Some(Engine::Fancy);
        #[cfg(all(
            not(feature = "meta"),
            not(feature = "fancy"),
            feature = "backtrack"
        ))]
        let engine = Some(Engine::Backtrack);
        #[cfg(not(any(feature = "meta", feature = "fancy", feature = "backtrack")))]
        let engine = None;
        engine
    }
}

/// A set of pattern flags.
///
/// Flags are independent of any engine, but not every engine supports every
/// flag. Asking an engine for a flag it can't honor fails at compile time
/// with a configuration error. It is never silently ignored.
///
/// The default set has only [`Flags::unicode`] enabled.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Flags {
    bools: u8,
}

impl Flags {
    const ALL_BITS: u8 = 0b1_1111;

    /// Return the default set of flags.
    pub fn new() -> Flags {
        Flags::default()
    }

    /// Return an empty set of flags. Notably, this disables Unicode mode.
    pub fn empty() -> Flags {
        Flags { bools: 0 }
    }

    /// Build a set of flags from its raw bit representation, as returned by
    /// [`Flags::bits`]. Unknown bits are rejected.
    pub fn from_bits(bits: u8) -> Option<Flags> {
        if bits & !Flags::ALL_BITS != 0 {
            return None;
        }
        Some(Flags { bools: bits })
    }

    /// Returns the raw bit representation of these flags.
    pub fn bits(&self) -> u8 {
        self.bools
    }

    define_bool!(0, is_case_insensitive, case_insensitive);
    define_bool!(1, is_multi_line, multi_line);
    define_bool!(2, is_dot_matches_new_line, dot_matches_new_line);
    define_bool!(3, is_ignore_whitespace, ignore_whitespace);
    define_bool!(4, is_unicode, unicode);
}

impl Default for Flags {
    fn default() -> Flags {
        Flags { bools: 0 }.unicode(true)
    }
}

/// The configuration used for compiling a pattern.
///
/// As with other configuration types in this crate, every knob is optional
/// so that an explicitly set value can be told apart from a default. This
/// makes it possible to combine configurations without defaults overwriting
/// explicit choices.
#[derive(Clone, Debug, Default)]
pub struct Config {
    engine: Option<Engine>,
    flags: Option<Flags>,
    size_limit: Option<Option<usize>>,
    backtrack_limit: Option<usize>,
    cancel_grace: Option<Duration>,
}

impl Config {
    /// Return a new default configuration.
    pub fn new() -> Config {
        Config::default()
    }

    /// Choose which engine compiles and executes the pattern.
    pub fn engine(self, engine: Engine) -> Config {
        Config { engine: Some(engine), ..self }
    }

    /// Set the flags to compile the pattern with.
    pub fn flags(self, flags: Flags) -> Config {
        Config { flags: Some(flags), ..self }
    }

    /// Set a limit, in bytes, on the size of the compiled pattern. `None`
    /// means no limit.
    ///
    /// This is only honored by engines that can enforce it
    /// ([`Engine::Meta`]). Others ignore it.
    pub fn size_limit(self, limit: Option<usize>) -> Config {
        Config { size_limit: Some(limit), ..self }
    }

    /// Set the maximum number of backtracking steps a single search may take
    /// before the engine gives up with an error.
    ///
    /// This is only honored by [`Engine::Fancy`]. It must be positive.
    pub fn backtrack_limit(self, limit: usize) -> Config {
        Config { backtrack_limit: Some(limit), ..self }
    }

    /// Set how long a deadline-bounded search waits for its worker to
    /// acknowledge cancellation before abandoning it.
    pub fn cancel_grace(self, grace: Duration) -> Config {
        Config { cancel_grace: Some(grace), ..self }
    }

    /// Returns the configured engine, falling back to
    /// [`Engine::default_engine`].
    pub fn get_engine(&self) -> Option<Engine> {
        self.engine.or_else(Engine::default_engine)
    }

    /// Returns the configured flags. By default only
    /// [`Flags::unicode`] is enabled.
    pub fn get_flags(&self) -> Flags {
        self.flags.unwrap_or_default()
    }

    /// Returns the configured size limit. The default is `Some(10 MiB)`.
    pub fn get_size_limit(&self) -> Option<usize> {
        self.size_limit.unwrap_or(Some(10 * (1 << 20)))
    }

    /// Returns the configured backtrack limit. The default is `1_000_000`.
    pub fn get_backtrack_limit(&self) -> usize {
        self.backtrack_limit.unwrap_or(1_000_000)
    }

    /// Returns the configured cancellation grace period. The default is
    /// 10 milliseconds.
    pub fn get_cancel_grace(&self) -> Duration {
        self.cancel_grace.unwrap_or(Duration::from_millis(10))
    }

    /// Overwrite the default configuration such that the options in `o` are
    /// always used. If an option in `o` is not set, then the corresponding
    /// option in `self` is used. If it's not set in `self` either, then it
    /// remains not set.
    pub(crate) fn overwrite(&self, o: Config) -> Config {
        Config {
            engine: o.engine.or(self.engine),
            flags: o.flags.or(self.flags),
            size_limit: o.size_limit.or(self.size_limit),
            backtrack_limit: o.backtrack_limit.or(self.backtrack_limit),
            cancel_grace: o.cancel_grace.or(self.cancel_grace),
        }
    }
}

/// A builder for compiling a [`Pattern`] from a configuration.
#[derive(Clone, Debug)]
pub struct Builder {
    config: Config,
}

impl Builder {
    /// Create a new builder with a default configuration.
    pub fn new() -> Builder {
        Builder { config: Config::default() }
    }

    /// Apply the given configuration. Options set in `config` replace the
    /// corresponding options already in this builder.
    pub fn configure(&mut self, config: Config) -> &mut Builder {
        self.config = self.config.overwrite(config);
        self
    }

    /// Compile the given pattern text.
    pub fn build(&self, source: &str) -> Result<Pattern, Error> {
        self.build_backend(source)
            .map(|backend| {
                Pattern::from_parts(source, self.config.clone(), backend)
            })
            .map_err(|err| err.with_pattern(source))
    }

    fn build_backend(&self, source: &str) -> Result<Arc<dyn Backend>, Error> {
        let config = &self.config;
        let engine = config.get_engine().ok_or_else(|| {
            Error::config("no regex engine is enabled in this build")
        })?;
        if config.backtrack_limit == Some(0) {
            return Err(Error::config("backtrack limit must be positive"));
        }
        let backend: Arc<dyn Backend> = match engine {
            #[cfg(feature = "meta")]
            Engine::Meta => {
                Arc::new(crate::backend::meta::MetaBackend::new(
                    source, config,
                )?)
            }
            #[cfg(feature = "fancy")]
            Engine::Fancy => {
                Arc::new(crate::backend::fancy::FancyBackend::new(
                    source, config,
                )?)
            }
            #[cfg(feature = "backtrack")]
            Engine::Backtrack => {
                Arc::new(crate::backend::backtrack::BacktrackBackend::new(
                    source, config,
                )?)
            }
        };
        debug!(
            "compiled pattern with {} engine ({} groups)",
            backend.name(),
            backend.group_count(),
        );
        Ok(backend)
    }
}

impl Default for Builder {
    fn default() -> Builder {
        Builder::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_bits() {
        let flags = Flags::new();
        assert!(flags.is_unicode());
        assert!(!flags.is_case_insensitive());

        let flags = flags.case_insensitive(true).multi_line(true);
        assert!(flags.is_case_insensitive());
        assert!(flags.is_multi_line());
        assert!(!flags.is_dot_matches_new_line());
        assert_eq!(Some(flags), Flags::from_bits(flags.bits()));

        let flags = flags.case_insensitive(false);
        assert!(!flags.is_case_insensitive());
        assert!(flags.is_multi_line());
    }

    #[test]
    fn unknown_flag_bits_rejected() {
        assert!(Flags::from_bits(0b10_0000).is_none());
        assert_eq!(Some(Flags::empty()), Flags::from_bits(0));
    }

    #[test]
    fn config_defaults() {
        let config = Config::new();
        assert_eq!(Flags::new().unicode(true), config.get_flags());
        assert_eq!(Some(10 * (1 << 20)), config.get_size_limit());
        assert_eq!(1_000_000, config.get_backtrack_limit());
        assert_eq!(Duration::from_millis(10), config.get_cancel_grace());
    }

    #[test]
    fn config_overwrite_keeps_explicit_values() {
        let base = Config::new().backtrack_limit(5).flags(Flags::empty());
        let merged = base.overwrite(Config::new().backtrack_limit(7));
        assert_eq!(7, merged.get_backtrack_limit());
        assert_eq!(Flags::empty(), merged.get_flags());
        assert_eq!(Duration::from_millis(10), merged.get_cancel_grace());
    }

    #[test]
    fn zero_backtrack_limit_is_a_config_error() {
        let err = Pattern::builder()
            .configure(Config::new().backtrack_limit(0))
            .build("a")
            .unwrap_err();
        assert!(matches!(*err.kind(), crate::ErrorKind::Config { .. }));
        assert_eq!(Some("a"), err.pattern());
    }
}
