//! A promise that doubles as its own resolver.
//!
//! Every clone of a [`CallablePromise`] shares one settlement cell, so any
//! clone may be called to settle it, awaited to read it, or asked for its
//! [`State`]. Consumers are all woken once the value lands; the state tag
//! follows when the first of them gets polled.
use crate::{Error, Promise, State};
use futures::{FutureExt, TryFutureExt};
use std::{
    convert::Infallible,
    fmt,
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    task::{Context, Poll, Waker},
};
use tracing::{debug, trace};

/// A promise that is resolved by calling it.
///
/// # Examples
///
/// ```
/// use callable_promise::{CallablePromise, State};
/// use futures::executor::block_on;
/// use std::thread;
///
/// let done = CallablePromise::<String, String>::new();
/// let resolve = done.resolver();
/// let task = thread::spawn(move || resolve("🍓".into()));
///
/// assert_eq!(block_on(done.clone()), Ok("🍓".to_string()));
/// assert_eq!(done.state(), State::Fulfilled);
/// task.join().expect("The resolving thread has panicked");
/// ```
pub struct CallablePromise<T, E = Infallible> {
    promise: Arc<Mutex<Inner<T, E>>>,
}

struct Inner<T, E> {
    outcome: Option<Result<T, E>>,
    state: State,
    wakers: Vec<Waker>,
}

impl<T, E> Inner<T, E> {
    /// Catch `state` up with the stored outcome. Leaves the outcome alone.
    fn observe(&mut self) {
        if self.state.is_settled() {
            return;
        }
        self.state = match self.outcome {
            Some(Ok(_)) => State::Fulfilled,
            Some(Err(_)) => State::Rejected,
            None => return,
        };
        trace!(state = %self.state, "callable promise settlement observed");
    }
}

/// Creates a pending promise that can only be fulfilled.
///
/// ```
/// use callable_promise::{callable_promise, State};
/// use futures::executor::block_on;
///
/// let done = callable_promise::<u32>();
/// assert_eq!(done.state(), State::Pending);
/// done.call(21);
/// assert_eq!(block_on(done.then(|x| x * 2)), Ok(42));
/// ```
pub fn callable_promise<T>() -> CallablePromise<T> {
    CallablePromise::new()
}

impl<T, E> CallablePromise<T, E> {
    pub fn new() -> Self {
        Self {
            promise: Arc::new(Mutex::new(Inner {
                outcome: None,
                state: State::Pending,
                wakers: vec![],
            })),
        }
    }

    /// Resolve the promise with `value`. Does nothing once settled.
    pub fn call(&self, value: T) {
        let _ = self.settle(Ok(value));
    }

    /// Settlement tag as of the last time a consumer polled the promise.
    ///
    /// Reading this right after [`CallablePromise::call`] still gives
    /// [`State::Pending`]; the tag advances when the settlement is picked up
    /// by a waiting consumer.
    pub fn state(&self) -> State {
        self.lock().state
    }

    /// A plain function that resolves this promise.
    pub fn resolver(&self) -> impl Fn(T) + Clone + Send + Sync + 'static
    where
        T: Send + 'static,
        E: Send + 'static,
    {
        let promise = self.clone();
        move |value| promise.call(value)
    }

    /// A plain function that rejects this promise.
    pub fn rejecter(&self) -> impl Fn(E) + Clone + Send + Sync + 'static
    where
        T: Send + 'static,
        E: Send + 'static,
    {
        let promise = self.clone();
        move |err| {
            let _ = promise.settle(Err(err));
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T, E>> {
        self.promise.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn settle(&self, outcome: Result<T, E>) -> Result<(), Error> {
        let wakers = {
            let mut promise = self.lock();
            if promise.outcome.is_some() {
                debug!("ignoring settlement of an already settled callable promise");
                return Err(Error::AlreadySettled);
            }
            trace!(
                fulfilled = outcome.is_ok(),
                waiting = promise.wakers.len(),
                "callable promise settled"
            );
            promise.outcome = Some(outcome);
            std::mem::take(&mut promise.wakers)
        };
        for waker in wakers {
            waker.wake()
        }
        Ok(())
    }
}

impl<E> CallablePromise<(), E> {
    /// Resolve a promise that carries no value.
    pub fn complete(&self) {
        self.call(())
    }
}

impl<T: Clone, E: Clone> CallablePromise<T, E> {
    /// Map the fulfilled value. Rejections pass through untouched.
    pub fn then<U, F>(&self, on_fulfilled: F) -> impl Future<Output = Result<U, E>>
    where
        F: FnOnce(T) -> U,
    {
        self.clone().map(move |outcome| outcome.map(on_fulfilled))
    }

    pub fn then_or_else<U, F, G>(&self, on_fulfilled: F, on_rejected: G) -> impl Future<Output = U>
    where
        F: FnOnce(T) -> U,
        G: FnOnce(E) -> U,
    {
        self.clone().map(move |outcome| match outcome {
            Ok(value) => on_fulfilled(value),
            Err(err) => on_rejected(err),
        })
    }

    /// Recover from a rejection with a fallback value.
    pub fn catch<F>(&self, on_rejected: F) -> impl Future<Output = T>
    where
        F: FnOnce(E) -> T,
    {
        self.clone()
            .map(move |outcome| outcome.unwrap_or_else(on_rejected))
    }

    /// Chain a continuation that is itself asynchronous.
    pub fn and_then<U, Fut, F>(&self, on_fulfilled: F) -> impl Future<Output = Result<U, E>>
    where
        F: FnOnce(T) -> Fut,
        Fut: Future<Output = Result<U, E>>,
    {
        TryFutureExt::and_then(self.clone(), on_fulfilled)
    }
}

impl<T: Clone> CallablePromise<T, Infallible> {
    /// The fulfilled value, for promises that cannot be rejected.
    pub fn value(&self) -> impl Future<Output = T> {
        self.clone().map(|outcome| match outcome {
            Ok(value) => value,
            Err(never) => match never {},
        })
    }
}

impl<T, E> Promise<T> for CallablePromise<T, E> {
    type Error = E;

    fn try_resolve(&self, value: T) -> Result<(), Error> {
        self.settle(Ok(value))
    }

    fn try_reject(&self, err: E) -> Result<(), Error> {
        self.settle(Err(err))
    }

    fn state(&self) -> State {
        CallablePromise::state(self)
    }
}

impl<T: Clone, E: Clone> Future for CallablePromise<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut promise = self.lock();
        match promise.outcome.clone() {
            Some(outcome) => {
                promise.observe();
                Poll::Ready(outcome)
            }
            None => {
                if !promise.wakers.iter().any(|w| w.will_wake(cx.waker())) {
                    promise.wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}

impl<T, E> Clone for CallablePromise<T, E> {
    fn clone(&self) -> Self {
        Self {
            promise: self.promise.clone(),
        }
    }
}

impl<T, E> Default for CallablePromise<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> fmt::Debug for CallablePromise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallablePromise")
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{callable_promise, CallablePromise};
    use crate::{Error, Promise, State};
    use futures::executor::block_on;
    use std::{future, thread, time::Duration};

    #[test]
    fn test_state_waits_for_a_consumer() {
        let done = callable_promise::<&str>();
        done.call("hello");
        assert_eq!(done.state(), State::Pending);
        assert_eq!(block_on(done.value()), "hello");
        assert_eq!(done.state(), State::Fulfilled);
    }

    #[test]
    fn test_try_resolve_twice() {
        let done = callable_promise::<i32>();
        assert_eq!(done.try_resolve(1), Ok(()));
        assert_eq!(done.try_resolve(2), Err(Error::AlreadySettled));
        assert_eq!(block_on(done.value()), 1);
    }

    #[test]
    fn test_reject_after_resolve_is_ignored() {
        let done = CallablePromise::<i32, String>::new();
        done.call(7);
        assert_eq!(done.try_reject("late".into()), Err(Error::AlreadySettled));
        assert_eq!(block_on(done.clone()), Ok(7));
        assert_eq!(done.state(), State::Fulfilled);
    }

    #[test]
    fn test_promise_reject() {
        let done = CallablePromise::<i32, String>::new();
        let failed = done.clone();
        let task = thread::spawn(move || failed.reject("reject!!".into()));
        assert_eq!(block_on(done.clone()), Err("reject!!".to_string()));
        assert_eq!(done.state(), State::Rejected);
        task.join().expect("The rejecting thread has panicked");
    }

    #[test]
    fn test_catch_recovers() {
        let done = CallablePromise::<i32, String>::new();
        (done.rejecter())("💥".into());
        assert_eq!(block_on(done.catch(|err| err.len() as i32)), 4);
        assert_eq!(done.state(), State::Rejected);
    }

    #[test]
    fn test_then_or_else() {
        let ok = CallablePromise::<i32, String>::new();
        let bad = CallablePromise::<i32, String>::new();
        ok.call(3);
        bad.reject("nope".into());
        let describe = |p: &CallablePromise<i32, String>| {
            block_on(p.then_or_else(|v| format!("got {v}"), |e| format!("failed: {e}")))
        };
        assert_eq!(describe(&ok), "got 3");
        assert_eq!(describe(&bad), "failed: nope");
    }

    #[test]
    fn test_then_propagates_rejection() {
        let done = CallablePromise::<i32, &str>::new();
        done.reject("broken");
        assert_eq!(block_on(done.then(|x| x + 1)), Err("broken"));
    }

    #[test]
    fn test_and_then_flattens() {
        let done = CallablePromise::<i32, String>::new();
        let inner = CallablePromise::<String, String>::new();
        done.call(5);
        inner.call("five".into());
        let chained = done.and_then({
            let inner = inner.clone();
            move |n| inner.then(move |s| format!("{n} is {s}"))
        });
        assert_eq!(block_on(chained), Ok("5 is five".to_string()));

        let failed = done.and_then(|_| future::ready(Err::<(), _>("inner".to_string())));
        assert_eq!(block_on(failed), Err("inner".to_string()));
    }

    #[test]
    fn test_two_consumers_resolve() {
        let done = callable_promise::<String>();
        let (a, b) = (done.clone(), done.clone());
        let task1 = thread::spawn(move || block_on(a.value()));
        let task2 = thread::spawn(move || block_on(b.then(|s| s.len())));
        thread::sleep(Duration::from_millis(20));
        done.call(String::from("🍓"));
        assert_eq!(task1.join().expect("The task1 thread has panicked"), "🍓");
        assert_eq!(task2.join().expect("The task2 thread has panicked"), Ok(4));
        assert_eq!(done.state(), State::Fulfilled);
    }

    #[test]
    fn test_debug_shows_state_only() {
        struct Opaque;
        let done = callable_promise::<Opaque>();
        assert_eq!(format!("{done:?}"), "CallablePromise { state: Pending }");
    }
}
