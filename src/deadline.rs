/*!
Deadline-bounded execution of a match attempt.

A bounded attempt moves the state it needs onto a dedicated worker thread and
races it against a timer. For a single search that state is the engine's
[`RawCursor`](crate::backend::RawCursor). For a replacement it is a whole
cursor, so that every search of the replacement runs on the same worker.
There are three ways this can end:

* The worker finishes in time. Its result (including any failure) is handed
back exactly as if the attempt had been run directly, along with the state it
was given so that group bounds can be read afterwards.
* The deadline elapses first.
* The caller's [`CancelToken`] is cancelled while waiting.

In the latter two cases the attempt is abandoned. Rust has no way to safely
kill a thread, so abandonment is cooperative first: the attempt's own token is
cancelled, which engines with an abort hook observe and return from promptly.
The executor gives the worker a short grace period to do so. If the engine has
no abort hook (or doesn't notice in time), the worker is detached and keeps
running until the engine returns on its own. A detached worker owns nothing
but its moved state and a shared reference to the immutable input, so it
cannot corrupt anything visible to the caller, but it does keep consuming a
CPU until the engine gives up. Nothing limits how many detached workers may
exist at once, so repeatedly timing out on an engine without an abort hook
can pile up threads that each spin until their search ends, possibly never.
Callers of such engines should keep this in mind when choosing inputs to
search under a deadline.

Either way, the state given to the worker is never returned after an
abandoned attempt. The cursor always continues with fresh state.
*/

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc,
    },
    thread,
    time::{Duration, Instant},
};

use crate::backend::BackendError;

/// How often a waiting caller checks its own cancellation token.
///
/// This is only used when the caller has installed a token. Otherwise, the
/// caller simply sleeps until the worker reports back or the deadline
/// elapses.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// A flag used to request that a match attempt stop early.
///
/// Cloning a token produces a handle to the same flag, so a token may be
/// installed on a [`Cursor`](crate::Cursor) and cancelled from some other
/// thread. Once cancelled, a token stays cancelled.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a new token that is not cancelled.
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    /// Cancel this token and every clone of it.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Returns true if this token has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// The result of running an attempt under a deadline.
pub(crate) enum Outcome<S, T> {
    /// The worker finished in time. The state it was given comes back with
    /// the result.
    Finished(S, T),
    /// The deadline elapsed before the worker finished.
    TimedOut,
    /// The caller's token was cancelled before the worker finished.
    Cancelled,
    /// The worker could not be started or died without reporting back.
    Failed(BackendError),
}

/// Why an in-flight attempt is being abandoned.
#[derive(Clone, Copy, Debug)]
enum Abandon {
    TimedOut,
    Cancelled,
}

/// Run `attempt` against `state` on a worker thread, waiting at most
/// `deadline` for it to finish.
///
/// `grace` is how long to wait for the worker to acknowledge cancellation
/// before detaching it.
pub(crate) fn run_bounded<S, T, F>(
    state: S,
    deadline: Duration,
    caller: Option<&CancelToken>,
    grace: Duration,
    attempt: F,
) -> Outcome<S, T>
where
    S: Send + 'static,
    T: Send + 'static,
    F: FnOnce(&mut S, &CancelToken) -> T + Send + 'static,
{
    if caller.map_or(false, |c| c.is_cancelled()) {
        debug!("caller cancelled before bounded attempt started");
        return Outcome::Cancelled;
    }
    // A rendezvous slot of size 1 means the worker never blocks on send,
    // even if nobody is listening anymore.
    let (tx, rx) = mpsc::sync_channel(1);
    let token = CancelToken::new();
    let worker_token = token.clone();
    let spawned = thread::Builder::new()
        .name("regex-bridge-deadline".to_string())
        .spawn(move || {
            let mut state = state;
            let result = attempt(&mut state, &worker_token);
            let _ = tx.send((state, result));
        });
    let handle = match spawned {
        Ok(handle) => handle,
        Err(err) => return Outcome::Failed(BackendError::failure(err)),
    };
    trace!("spawned bounded attempt worker with deadline {:?}", deadline);

    let start = Instant::now();
    loop {
        let elapsed = start.elapsed();
        if elapsed >= deadline {
            return abandon(Abandon::TimedOut, &token, &rx, handle, grace);
        }
        let mut wait = deadline - elapsed;
        if caller.is_some() {
            wait = wait.min(CANCEL_POLL_INTERVAL);
        }
        match rx.recv_timeout(wait) {
            Ok((state, result)) => {
                // The worker has already sent its only message, so this
                // join is immediate.
                let _ = handle.join();
                return Outcome::Finished(state, result);
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if caller.map_or(false, |c| c.is_cancelled()) {
                    return abandon(
                        Abandon::Cancelled,
                        &token,
                        &rx,
                        handle,
                        grace,
                    );
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                let msg = match handle.join() {
                    Err(_) => "match attempt worker panicked",
                    Ok(()) => "match attempt worker exited without a result",
                };
                return Outcome::Failed(BackendError::failure(msg));
            }
        }
    }
}

fn abandon<S, T>(
    why: Abandon,
    token: &CancelToken,
    rx: &mpsc::Receiver<(S, T)>,
    handle: thread::JoinHandle<()>,
    grace: Duration,
) -> Outcome<S, T> {
    token.cancel();
    match rx.recv_timeout(grace) {
        // Whatever the worker produced is discarded, even if it raced to a
        // real result, since the caller has already been told it's too late.
        Ok(_) | Err(mpsc::RecvTimeoutError::Disconnected) => {
            let _ = handle.join();
            debug!("bounded attempt stopped after {:?}", why);
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            // Dropping the handle detaches the thread.
            drop(handle);
            debug!(
                "bounded attempt did not stop within {:?} after {:?}, \
                 abandoning its worker thread",
                grace, why,
            );
        }
    }
    match why {
        Abandon::TimedOut => Outcome::TimedOut,
        Abandon::Cancelled => Outcome::Cancelled,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::{backend::RawCursor, util::search::Span};

    use super::*;

    /// A raw cursor whose only primitive spins until told to stop, or until
    /// an iteration budget runs out.
    #[derive(Debug)]
    struct Spinner {
        haystack: Arc<str>,
        spins: u64,
        cooperative: bool,
    }

    impl RawCursor for Spinner {
        fn haystack(&self) -> &str {
            &self.haystack
        }

        fn find_at(
            &mut self,
            _at: usize,
            cancel: &CancelToken,
        ) -> Result<bool, BackendError> {
            for _ in 0..self.spins {
                if self.cooperative && cancel.is_cancelled() {
                    return Err(BackendError::Aborted);
                }
                thread::sleep(Duration::from_millis(1));
            }
            Ok(true)
        }

        fn match_whole(
            &mut self,
            _: &CancelToken,
        ) -> Result<bool, BackendError> {
            Err(BackendError::Unsupported("match_whole"))
        }

        fn match_prefix(
            &mut self,
            _: &CancelToken,
        ) -> Result<bool, BackendError> {
            panic!("boom")
        }

        fn group_span(
            &self,
            _: usize,
        ) -> Result<Option<Span>, BackendError> {
            Ok(None)
        }

        fn rewind(&mut self) {}
    }

    fn spinner(spins: u64, cooperative: bool) -> Box<dyn RawCursor> {
        Box::new(Spinner { haystack: Arc::from("abc"), spins, cooperative })
    }

    const GRACE: Duration = Duration::from_millis(50);

    #[test]
    fn finishes_in_time() {
        let outcome = run_bounded(
            spinner(1, true),
            Duration::from_secs(5),
            None,
            GRACE,
            |raw, cancel| raw.find_at(0, cancel),
        );
        match outcome {
            Outcome::Finished(raw, Ok(true)) => {
                assert_eq!("abc", raw.haystack())
            }
            _ => panic!("expected a finished attempt"),
        }
    }

    #[test]
    fn state_comes_back_with_its_changes() {
        let outcome = run_bounded(
            vec![1, 2],
            Duration::from_secs(5),
            None,
            GRACE,
            |nums: &mut Vec<i32>, _: &CancelToken| {
                nums.push(3);
                nums.len()
            },
        );
        match outcome {
            Outcome::Finished(nums, len) => {
                assert_eq!(vec![1, 2, 3], nums);
                assert_eq!(3, len);
            }
            _ => panic!("expected a finished attempt"),
        }
    }

    #[test]
    fn failure_is_propagated() {
        let outcome = run_bounded(
            spinner(1, true),
            Duration::from_secs(5),
            None,
            GRACE,
            |raw, cancel| raw.match_whole(cancel),
        );
        assert!(matches!(
            outcome,
            Outcome::Finished(_, Err(BackendError::Unsupported("match_whole")))
        ));
    }

    #[test]
    fn times_out() {
        let start = Instant::now();
        let outcome = run_bounded(
            spinner(10_000, true),
            Duration::from_millis(20),
            None,
            GRACE,
            |raw, cancel| raw.find_at(0, cancel),
        );
        assert!(matches!(outcome, Outcome::TimedOut));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn times_out_without_cooperation() {
        let start = Instant::now();
        let outcome = run_bounded(
            spinner(10_000, false),
            Duration::from_millis(20),
            None,
            GRACE,
            |raw, cancel| raw.find_at(0, cancel),
        );
        assert!(matches!(outcome, Outcome::TimedOut));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn caller_cancellation() {
        let caller = CancelToken::new();
        let remote = caller.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.cancel();
        });
        let outcome = run_bounded(
            spinner(10_000, true),
            Duration::from_secs(30),
            Some(&caller),
            GRACE,
            |raw, cancel| raw.find_at(0, cancel),
        );
        canceller.join().unwrap();
        assert!(matches!(outcome, Outcome::Cancelled));
        // The caller's signal is preserved.
        assert!(caller.is_cancelled());
    }

    #[test]
    fn already_cancelled_caller() {
        let caller = CancelToken::new();
        caller.cancel();
        let outcome = run_bounded(
            spinner(1, true),
            Duration::from_secs(5),
            Some(&caller),
            GRACE,
            |raw, cancel| raw.find_at(0, cancel),
        );
        assert!(matches!(outcome, Outcome::Cancelled));
    }

    #[test]
    fn worker_panic_is_a_failure() {
        let outcome = run_bounded(
            spinner(1, true),
            Duration::from_secs(5),
            None,
            GRACE,
            |raw, cancel| raw.match_prefix(cancel),
        );
        assert!(matches!(outcome, Outcome::Failed(BackendError::Failure(_))));
    }
}
