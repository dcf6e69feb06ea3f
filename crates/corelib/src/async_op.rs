//! Callback-to-computation bridge.
//!
//! The external feed library reports completion of every network operation
//! through a single Node-style callback. [`AsyncOp`] turns such an operation
//! into a value that can be started any number of times with explicit error
//! and success continuations, cancelled, composed, or awaited.
//!
//! # Guarantees
//!
//! For every call to [`AsyncOp::run`]:
//!
//! 1. The wrapped operation is invoked exactly once.
//! 2. Absent cancellation, exactly one of `on_error` / `on_success` fires,
//!    and it fires at most once.
//! 3. [`Canceler::cancel`] never invokes a continuation itself. Cancelling a
//!    pending run suppresses both continuations and forwards a best-effort
//!    abort to the wrapped operation; cancelling a settled run is a no-op.
//!
//! Completions that arrive after cancellation are dropped and logged at
//! debug level.
//!
//! # Example
//!
//! ```rust
//! use corelib::AsyncOp;
//!
//! let op = AsyncOp::from_callback(|done| done(Ok(21)));
//! let doubled = op.map(|n| n * 2);
//! let _canceler = doubled.run(|err| panic!("{err}"), |n| assert_eq!(n, 42));
//! ```

use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Node-style completion callback handed to a wrapped operation.
pub type Callback<T> = Box<dyn FnOnce(Result<T>) + Send + 'static>;

/// Best-effort abort request returned by a cancelable operation.
pub type AbortHook = Box<dyn FnOnce() + Send + 'static>;

type Start<T> = dyn Fn(Callback<T>) -> Option<AbortHook> + Send + Sync;

/// A reusable, cancelable asynchronous computation yielding `T`.
///
/// Cloning is cheap; clones share the wrapped operation but every
/// [`run`](Self::run) starts a fresh invocation of it.
pub struct AsyncOp<T> {
    start: Arc<Start<T>>,
}

impl<T> Clone for AsyncOp<T> {
    fn clone(&self) -> Self {
        Self {
            start: Arc::clone(&self.start),
        }
    }
}

impl<T> std::fmt::Debug for AsyncOp<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncOp").finish_non_exhaustive()
    }
}

impl<T: Send + 'static> AsyncOp<T> {
    /// Wrap an operation that reports its outcome through one callback.
    pub fn from_callback<F>(op: F) -> Self
    where
        F: Fn(Callback<T>) + Send + Sync + 'static,
    {
        Self::from_cancelable(move |done| {
            op(done);
            None
        })
    }

    /// Wrap an operation that can also be asked to abort.
    ///
    /// The returned hook is called at most once, only if the run is
    /// cancelled before it settles.
    pub fn from_cancelable<F>(op: F) -> Self
    where
        F: Fn(Callback<T>) -> Option<AbortHook> + Send + Sync + 'static,
    {
        Self { start: Arc::new(op) }
    }

    /// An operation that immediately succeeds with `value`.
    pub fn ok(value: T) -> Self
    where
        T: Clone + Sync,
    {
        Self::from_callback(move |done| done(Ok(value.clone())))
    }

    /// An operation that immediately fails with `error`.
    pub fn err(error: Error) -> Self {
        Self::from_callback(move |done| done(Err(error.clone())))
    }

    /// An operation that fails with `error` once `after` has elapsed.
    ///
    /// Needs a Tokio runtime at run time; without one the timer is not armed
    /// and the operation never settles.
    pub fn fail_after(after: Duration, error: Error) -> Self {
        Self::from_cancelable(move |done| match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let error = error.clone();
                let timer = runtime.spawn(async move {
                    tokio::time::sleep(after).await;
                    done(Err(error));
                });
                Some(Box::new(move || timer.abort()) as AbortHook)
            }
            Err(_) => {
                tracing::warn!(?after, "no Tokio runtime available, timer not armed");
                None
            }
        })
    }

    /// Start the operation.
    ///
    /// Exactly one continuation fires unless the returned [`Canceler`] is
    /// used first. Continuations may run synchronously inside this call when
    /// the wrapped operation completes immediately.
    pub fn run<OnErr, OnOk>(&self, on_error: OnErr, on_success: OnOk) -> Canceler
    where
        OnErr: FnOnce(Error) + Send + 'static,
        OnOk: FnOnce(T) + Send + 'static,
    {
        let slot = Arc::new(Slot::new(Box::new(on_error), Box::new(on_success)));
        let completion = Arc::clone(&slot);
        let abort = (self.start)(Box::new(move |result| completion.settle(result)));
        if let Some(hook) = abort {
            slot.arm(hook);
        }
        Canceler {
            target: slot as Arc<dyn CancelTarget>,
        }
    }

    /// Transform the success value.
    pub fn map<U, F>(self, f: F) -> AsyncOp<U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        AsyncOp::from_cancelable(move |done: Callback<U>| {
            let f = Arc::clone(&f);
            let done = Once::new(done);
            let on_ok = Arc::clone(&done);
            let canceler = self.run(
                move |err| {
                    done.fire(Err(err));
                },
                move |value| {
                    on_ok.fire(Ok(f(value)));
                },
            );
            abort_with(canceler)
        })
    }

    /// Transform the error.
    pub fn map_err<F>(self, f: F) -> AsyncOp<T>
    where
        F: Fn(Error) -> Error + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        AsyncOp::from_cancelable(move |done: Callback<T>| {
            let f = Arc::clone(&f);
            let done = Once::new(done);
            let on_ok = Arc::clone(&done);
            let canceler = self.run(
                move |err| {
                    done.fire(Err(f(err)));
                },
                move |value| {
                    on_ok.fire(Ok(value));
                },
            );
            abort_with(canceler)
        })
    }

    /// Run `next` with the success value, sequencing the two operations.
    ///
    /// An error from either stage settles the combined operation; cancelling
    /// it cancels whichever stage is in flight.
    pub fn and_then<U, F>(self, next: F) -> AsyncOp<U>
    where
        U: Send + 'static,
        F: Fn(T) -> AsyncOp<U> + Send + Sync + 'static,
    {
        let next = Arc::new(next);
        AsyncOp::from_cancelable(move |done: Callback<U>| {
            let next = Arc::clone(&next);
            let done = Once::new(done);
            let stages = Arc::new(CancelSet::default());

            let on_error = {
                let done = Arc::clone(&done);
                move |err: Error| {
                    done.fire(Err(err));
                }
            };
            let on_success = {
                let stages = Arc::clone(&stages);
                move |value: T| {
                    let failed = Arc::clone(&done);
                    let second = next(value).run(
                        move |err| {
                            failed.fire(Err(err));
                        },
                        move |value| {
                            done.fire(Ok(value));
                        },
                    );
                    stages.add(second);
                }
            };

            stages.add(self.run(on_error, on_success));
            Some(Box::new(move || stages.cancel_all()) as AbortHook)
        })
    }

    /// Run every operation concurrently and collect the results in order.
    ///
    /// The first error settles the combined operation and cancels the
    /// operations still pending.
    pub fn all(ops: Vec<AsyncOp<T>>) -> AsyncOp<Vec<T>> {
        let ops = Arc::new(ops);
        AsyncOp::from_cancelable(move |done: Callback<Vec<T>>| {
            if ops.is_empty() {
                done(Ok(Vec::new()));
                return None;
            }

            let done = Once::new(done);
            let members = Arc::new(CancelSet::default());
            let results: Arc<Mutex<Vec<Option<T>>>> =
                Arc::new(Mutex::new((0..ops.len()).map(|_| None).collect()));
            let remaining = Arc::new(AtomicUsize::new(ops.len()));

            for (index, op) in ops.iter().enumerate() {
                if members.is_cancelled() {
                    break;
                }
                let failed = Arc::clone(&done);
                let finished = Arc::clone(&done);
                let siblings = Arc::clone(&members);
                let results = Arc::clone(&results);
                let remaining = Arc::clone(&remaining);

                let canceler = op.run(
                    move |err| {
                        if failed.fire(Err(err)) {
                            siblings.cancel_all();
                        }
                    },
                    move |value| {
                        results.lock()[index] = Some(value);
                        if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                            let values: Vec<T> = results.lock().drain(..).flatten().collect();
                            finished.fire(Ok(values));
                        }
                    },
                );
                members.add(canceler);
            }

            Some(Box::new(move || members.cancel_all()) as AbortHook)
        })
    }

    /// Run every operation concurrently; the first to settle wins and the
    /// rest are cancelled.
    pub fn race(ops: Vec<AsyncOp<T>>) -> AsyncOp<T> {
        let ops = Arc::new(ops);
        AsyncOp::from_cancelable(move |done: Callback<T>| {
            if ops.is_empty() {
                done(Err(Error::CancelledOrClosed(
                    "race started without contenders".to_string(),
                )));
                return None;
            }

            let done = Once::new(done);
            let members = Arc::new(CancelSet::default());

            for op in ops.iter() {
                if members.is_cancelled() {
                    break;
                }
                let lost = Arc::clone(&done);
                let won = Arc::clone(&done);
                let on_err_members = Arc::clone(&members);
                let on_ok_members = Arc::clone(&members);

                let canceler = op.run(
                    move |err| {
                        if lost.fire(Err(err)) {
                            on_err_members.cancel_all();
                        }
                    },
                    move |value| {
                        if won.fire(Ok(value)) {
                            on_ok_members.cancel_all();
                        }
                    },
                );
                members.add(canceler);
            }

            Some(Box::new(move || members.cancel_all()) as AbortHook)
        })
    }

    /// Fail with `error` if the operation has not settled within `after`.
    pub fn timeout(self, after: Duration, error: Error) -> AsyncOp<T> {
        AsyncOp::race(vec![self, AsyncOp::fail_after(after, error)])
    }

    /// Start the operation and await its outcome.
    ///
    /// Dropping the returned future before it resolves cancels the run.
    pub fn into_future(self) -> impl Future<Output = Result<T>> + Send {
        async move {
            let (tx, rx) = oneshot::channel();
            let tx = Arc::new(Mutex::new(Some(tx)));
            let tx_err = Arc::clone(&tx);

            let canceler = self.run(
                move |err| {
                    if let Some(tx) = tx_err.lock().take() {
                        let _ = tx.send(Err(err));
                    }
                },
                move |value| {
                    if let Some(tx) = tx.lock().take() {
                        let _ = tx.send(Ok(value));
                    }
                },
            );
            let _guard = canceler.cancel_on_drop();

            rx.await.unwrap_or_else(|_| {
                Err(Error::CancelledOrClosed(
                    "operation dropped its completion".to_string(),
                ))
            })
        }
    }
}

/// Handle returned by [`AsyncOp::run`].
///
/// Cloneable; every clone refers to the same run.
#[derive(Clone)]
pub struct Canceler {
    target: Arc<dyn CancelTarget>,
}

impl Canceler {
    /// Request cancellation. Idempotent; no-op once the run has settled.
    pub fn cancel(&self) {
        self.target.cancel();
    }

    /// Whether the run has neither settled nor been cancelled.
    pub fn is_pending(&self) -> bool {
        self.target.is_pending()
    }

    /// Cancel the run when the returned guard is dropped.
    pub fn cancel_on_drop(self) -> CancelGuard {
        CancelGuard(self)
    }
}

impl std::fmt::Debug for Canceler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Canceler")
            .field("pending", &self.is_pending())
            .finish()
    }
}

/// Cancels its run on drop. See [`Canceler::cancel_on_drop`].
#[derive(Debug)]
pub struct CancelGuard(Canceler);

impl Drop for CancelGuard {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

trait CancelTarget: Send + Sync {
    fn cancel(&self);
    fn is_pending(&self) -> bool;
}

const PENDING: u8 = 0;
const SETTLED: u8 = 1;
const CANCELLED: u8 = 2;

struct Continuations<T> {
    on_error: Box<dyn FnOnce(Error) + Send>,
    on_success: Box<dyn FnOnce(T) + Send>,
}

/// Per-run settlement state. The state byte decides the single winner
/// between completion and cancellation.
struct Slot<T> {
    state: AtomicU8,
    continuations: Mutex<Option<Continuations<T>>>,
    abort: Mutex<Option<AbortHook>>,
}

impl<T> Slot<T> {
    fn new(
        on_error: Box<dyn FnOnce(Error) + Send>,
        on_success: Box<dyn FnOnce(T) + Send>,
    ) -> Self {
        Self {
            state: AtomicU8::new(PENDING),
            continuations: Mutex::new(Some(Continuations {
                on_error,
                on_success,
            })),
            abort: Mutex::new(None),
        }
    }

    fn arm(&self, hook: AbortHook) {
        if self.state.load(Ordering::Acquire) == PENDING {
            *self.abort.lock() = Some(hook);
        }
    }

    fn settle(&self, result: Result<T>) {
        if self
            .state
            .compare_exchange(PENDING, SETTLED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            match result {
                Ok(_) => tracing::debug!("dropping success delivered after cancellation"),
                Err(err) => {
                    tracing::debug!(error = %err, "dropping error delivered after cancellation")
                }
            }
            return;
        }

        drop(self.abort.lock().take());
        let continuations = self.continuations.lock().take();
        if let Some(Continuations {
            on_error,
            on_success,
        }) = continuations
        {
            match result {
                Ok(value) => on_success(value),
                Err(err) => on_error(err),
            }
        }
    }
}

impl<T> CancelTarget for Slot<T> {
    fn cancel(&self) {
        if self
            .state
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        drop(self.continuations.lock().take());
        let hook = self.abort.lock().take();
        if let Some(hook) = hook {
            hook();
        }
    }

    fn is_pending(&self) -> bool {
        self.state.load(Ordering::Acquire) == PENDING
    }
}

/// A callback shared between several continuations; only the first
/// `fire` reaches it.
struct Once<T>(Mutex<Option<Callback<T>>>);

impl<T> Once<T> {
    fn new(callback: Callback<T>) -> Arc<Self> {
        Arc::new(Self(Mutex::new(Some(callback))))
    }

    fn fire(&self, result: Result<T>) -> bool {
        let callback = self.0.lock().take();
        match callback {
            Some(callback) => {
                callback(result);
                true
            }
            None => false,
        }
    }
}

/// Cancelers of the sub-runs of a composed operation.
#[derive(Default)]
struct CancelSet {
    cancelled: AtomicBool,
    members: Mutex<Vec<Canceler>>,
}

impl CancelSet {
    fn add(&self, canceler: Canceler) {
        if !canceler.is_pending() {
            return;
        }
        self.members.lock().push(canceler);
        // A concurrent cancel_all may have drained before the push.
        if self.is_cancelled() {
            self.cancel_all();
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn cancel_all(&self) {
        self.cancelled.store(true, Ordering::Release);
        let members = std::mem::take(&mut *self.members.lock());
        for member in members {
            member.cancel();
        }
    }
}

fn abort_with(canceler: Canceler) -> Option<AbortHook> {
    Some(Box::new(move || canceler.cancel()))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// An operation whose completion the test triggers by hand.
    fn manual<T: Send + 'static>() -> (
        AsyncOp<T>,
        Arc<Mutex<Vec<Callback<T>>>>,
        Arc<AtomicUsize>,
    ) {
        let pending: Arc<Mutex<Vec<Callback<T>>>> = Arc::new(Mutex::new(Vec::new()));
        let aborts = Arc::new(AtomicUsize::new(0));
        let stash = Arc::clone(&pending);
        let abort_count = Arc::clone(&aborts);
        let op = AsyncOp::from_cancelable(move |done| {
            stash.lock().push(done);
            let abort_count = Arc::clone(&abort_count);
            Some(Box::new(move || {
                abort_count.fetch_add(1, Ordering::SeqCst);
            }) as AbortHook)
        });
        (op, pending, aborts)
    }

    fn counters() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
        (Arc::new(AtomicUsize::new(0)), Arc::new(AtomicUsize::new(0)))
    }

    fn run_counting<T: Send + 'static>(
        op: &AsyncOp<T>,
        errors: &Arc<AtomicUsize>,
        successes: &Arc<AtomicUsize>,
    ) -> Canceler {
        let errors = Arc::clone(errors);
        let successes = Arc::clone(successes);
        op.run(
            move |_| {
                errors.fetch_add(1, Ordering::SeqCst);
            },
            move |_| {
                successes.fetch_add(1, Ordering::SeqCst);
            },
        )
    }

    #[test]
    fn test_success_fires_once() {
        let (errors, successes) = counters();
        let op = AsyncOp::from_callback(|done| done(Ok(7u32)));
        let canceler = run_counting(&op, &errors, &successes);

        assert_eq!(successes.load(Ordering::SeqCst), 1);
        assert_eq!(errors.load(Ordering::SeqCst), 0);
        assert!(!canceler.is_pending());
    }

    #[test]
    fn test_error_fires_once() {
        let (errors, successes) = counters();
        let op: AsyncOp<u32> = AsyncOp::err(Error::Publish("disk full".into()));
        run_counting(&op, &errors, &successes);

        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(successes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_deferred_completion() {
        let (op, pending, _) = manual::<&'static str>();
        let (errors, successes) = counters();
        let canceler = run_counting(&op, &errors, &successes);

        assert!(canceler.is_pending());
        assert_eq!(successes.load(Ordering::SeqCst), 0);

        let done = pending.lock().pop().unwrap();
        done(Ok("entry"));
        assert_eq!(successes.load(Ordering::SeqCst), 1);
        assert!(!canceler.is_pending());
    }

    #[test]
    fn test_cancel_suppresses_continuations() {
        let (op, pending, aborts) = manual::<u32>();
        let (errors, successes) = counters();
        let canceler = run_counting(&op, &errors, &successes);

        canceler.cancel();
        // The cancel call itself never settles the run.
        assert_eq!(errors.load(Ordering::SeqCst), 0);
        assert_eq!(successes.load(Ordering::SeqCst), 0);
        assert_eq!(aborts.load(Ordering::SeqCst), 1);

        // A late completion from the library is dropped.
        let done = pending.lock().pop().unwrap();
        done(Ok(1));
        assert_eq!(successes.load(Ordering::SeqCst), 0);
        assert_eq!(errors.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let (op, _pending, aborts) = manual::<u32>();
        let canceler = op.run(|_| {}, |_| {});
        canceler.cancel();
        canceler.cancel();
        canceler.clone().cancel();
        assert_eq!(aborts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancel_after_settle_is_noop() {
        let (op, pending, aborts) = manual::<u32>();
        let (errors, successes) = counters();
        let canceler = run_counting(&op, &errors, &successes);

        let done = pending.lock().pop().unwrap();
        done(Err(Error::Connection("refused".into())));
        canceler.cancel();

        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(aborts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_run_is_reusable() {
        let invocations = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&invocations);
        let op = AsyncOp::from_callback(move |done| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            done(Ok(n));
        });

        let seen = Arc::new(Mutex::new(Vec::new()));
        for _ in 0..3 {
            let seen = Arc::clone(&seen);
            op.run(|_| {}, move |n| seen.lock().push(n));
        }
        assert_eq!(invocations.load(Ordering::SeqCst), 3);
        assert_eq!(*seen.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_and_then_sequences() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let first_log = Arc::clone(&order);
        let first = AsyncOp::from_callback(move |done| {
            first_log.lock().push("first");
            done(Ok(2u32));
        });
        let second_log = Arc::clone(&order);
        let chained = first.and_then(move |n| {
            let log = Arc::clone(&second_log);
            AsyncOp::from_callback(move |done| {
                log.lock().push("second");
                done(Ok(n * 10));
            })
        });

        let result = Arc::new(Mutex::new(None));
        let out = Arc::clone(&result);
        chained.run(|e| panic!("{e}"), move |n| *out.lock() = Some(n));

        assert_eq!(*result.lock(), Some(20));
        assert_eq!(*order.lock(), vec!["first", "second"]);
    }

    #[test]
    fn test_map_err_rewrites_failure_only() {
        let failed = AsyncOp::<u32>::err(Error::Connection("refused".to_string()))
            .map_err(|e| Error::Publish(format!("while linking: {e}")));
        let result = Arc::new(Mutex::new(None));
        let out = Arc::clone(&result);
        failed.run(move |e| *out.lock() = Some(e), |n| panic!("unexpected {n}"));
        assert!(matches!(
            result.lock().take(),
            Some(Error::Publish(m)) if m.contains("refused")
        ));

        let passed = AsyncOp::ok(7u32).map_err(|_| Error::NoNodes);
        let value = Arc::new(Mutex::new(None));
        let out = Arc::clone(&value);
        passed.run(|e| panic!("{e}"), move |n| *out.lock() = Some(n));
        assert_eq!(*value.lock(), Some(7));
    }

    #[test]
    fn test_and_then_short_circuits_on_error() {
        let started = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&started);
        let chained = AsyncOp::<u32>::err(Error::Connection("down".into())).and_then(move |_| {
            flag.store(true, Ordering::SeqCst);
            AsyncOp::ok(1u32)
        });

        let (errors, successes) = counters();
        run_counting(&chained, &errors, &successes);
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(successes.load(Ordering::SeqCst), 0);
        assert!(!started.load(Ordering::SeqCst));
    }

    #[test]
    fn test_and_then_cancel_reaches_second_stage() {
        let (second, _pending, aborts) = manual::<u32>();
        let chained = AsyncOp::ok(1u32).and_then(move |_| second.clone());
        let (errors, successes) = counters();
        let canceler = run_counting(&chained, &errors, &successes);

        canceler.cancel();
        assert_eq!(aborts.load(Ordering::SeqCst), 1);
        assert_eq!(errors.load(Ordering::SeqCst) + successes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_all_collects_in_order() {
        let (slow, pending, _) = manual::<u32>();
        let combined = AsyncOp::all(vec![slow, AsyncOp::ok(2), AsyncOp::ok(3)]);
        let result = Arc::new(Mutex::new(None));
        let out = Arc::clone(&result);
        combined.run(|e| panic!("{e}"), move |v| *out.lock() = Some(v));

        assert!(result.lock().is_none());
        let done = pending.lock().pop().unwrap();
        done(Ok(1));
        assert_eq!(*result.lock(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_all_first_error_cancels_rest() {
        let (slow, _pending, aborts) = manual::<u32>();
        let combined = AsyncOp::all(vec![slow, AsyncOp::err(Error::Publish("bad".into()))]);
        let (errors, successes) = counters();
        run_counting(&combined, &errors, &successes);

        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(successes.load(Ordering::SeqCst), 0);
        assert_eq!(aborts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_all_empty_succeeds() {
        let result = Arc::new(Mutex::new(None));
        let out = Arc::clone(&result);
        AsyncOp::<u32>::all(Vec::new()).run(|e| panic!("{e}"), move |v| *out.lock() = Some(v));
        assert_eq!(*result.lock(), Some(Vec::new()));
    }

    #[test]
    fn test_race_first_wins() {
        let (slow, _pending, aborts) = manual::<u32>();
        let raced = AsyncOp::race(vec![slow, AsyncOp::ok(9)]);
        let result = Arc::new(Mutex::new(None));
        let out = Arc::clone(&result);
        raced.run(|e| panic!("{e}"), move |v| *out.lock() = Some(v));

        assert_eq!(*result.lock(), Some(9));
        assert_eq!(aborts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_into_future_resolves() {
        let value = AsyncOp::ok(5u32).map(|n| n + 1).into_future().await;
        assert_eq!(value, Ok(6));
    }

    #[tokio::test]
    async fn test_timeout_fires() {
        let (never, _pending, aborts) = manual::<u32>();
        let result = never
            .timeout(Duration::from_millis(20), Error::Connection("timed out".into()))
            .into_future()
            .await;
        assert_eq!(result, Err(Error::Connection("timed out".into())));
        assert_eq!(aborts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dropping_future_cancels() {
        let (never, _pending, aborts) = manual::<u32>();
        let fut = never.into_future();
        let outcome = tokio::time::timeout(Duration::from_millis(10), fut).await;
        assert!(outcome.is_err());
        assert_eq!(aborts.load(Ordering::SeqCst), 1);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn exactly_one_continuation(
                outcomes in proptest::collection::vec(any::<bool>(), 1..16),
            ) {
                for succeed in outcomes {
                    let op = AsyncOp::from_callback(move |done| {
                        if succeed {
                            done(Ok(()))
                        } else {
                            done(Err(Error::Publish("rejected".into())))
                        }
                    });
                    let (errors, successes) = counters();
                    run_counting(&op, &errors, &successes);
                    prop_assert_eq!(
                        errors.load(Ordering::SeqCst) + successes.load(Ordering::SeqCst),
                        1
                    );
                    prop_assert_eq!(successes.load(Ordering::SeqCst) == 1, succeed);
                }
            }
        }
    }
}
