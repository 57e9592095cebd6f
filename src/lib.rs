/*!
This crate provides one find/match/replace API over several independently
implemented regex engines, and a way to bound any single match attempt by a
wall-clock deadline.

The deadline matters because some of the engines that can be wrapped use
backtracking, and a backtracking engine can take exponential time on
adversarial inputs. With a deadline, such a search fails with a timeout error
instead of hanging.

# Overview

* A [`Pattern`] is a compiled regex. It is immutable and can be shared freely
between threads.
* A [`Cursor`] is created from a pattern and an input. It tracks the most
recent match, exposes its capture groups and drives replacement.
* The [`backend`] module defines the contract an engine must implement to be
used by a cursor. Three engines ship with this crate, selected with
[`Engine`]: `regex-automata`'s meta engine, `fancy-regex` and `regress`.
* The [`deadline`] module runs one match attempt on a worker thread and gives
up on it once its deadline elapses.

# Example: replacement with group references

```
use regex_bridge::Pattern;

let pat = Pattern::new(r"(\d{4})-(\d{2})-(\d{2})")?;
let out = pat.replace_all("on 2024-03-14 and 2025-01-02", "$3/$2/$1")?;
assert_eq!("on 14/03/2024 and 02/01/2025", out);

# Ok::<(), Box<dyn std::error::Error>>(())
```

# Example: a deadline on a catastrophic search

```no_run
use std::time::Duration;

use regex_bridge::{Config, Engine, Pattern};

let pat = Pattern::builder()
    .configure(Config::new().engine(Engine::Backtrack))
    .build("(a*)*")?;
let input = format!("{}!", "a".repeat(40));
let mut cur = pat.cursor(input);
let err = cur.matches_within(Duration::from_millis(100)).unwrap_err();
assert!(err.is_timeout());
// A cursor that timed out is always reset.
assert!(!cur.is_matched());

# Ok::<(), Box<dyn std::error::Error>>(())
```

# Crate features

* **logging** - Emits `log` messages when patterns are compiled and when
bounded attempts time out, are cancelled or are abandoned.
* **meta** - Enables [`Engine::Meta`].
* **fancy** - Enables [`Engine::Fancy`].
* **backtrack** - Enables [`Engine::Backtrack`].

All of them are enabled by default.
*/

#![deny(missing_debug_implementations)]

#[cfg(not(any(
    target_pointer_width = "16",
    target_pointer_width = "32",
    target_pointer_width = "64"
)))]
compile_error!("regex-bridge currently not supported on non-{16,32,64}");

pub use crate::{
    cursor::Cursor,
    deadline::CancelToken,
    error::{Error, ErrorKind},
    pattern::{Builder, Config, Engine, Flags, Pattern},
    util::{interpolate::quote_replacement, search::Span},
};

#[macro_use]
mod macros;

pub mod backend;
mod cursor;
pub mod deadline;
mod error;
mod pattern;
mod util;
