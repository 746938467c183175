//! A promise that is resolved by calling it.
//!
//! [`CallablePromise`] folds the "create a promise, keep its resolver
//! around" dance into one handle: call it to settle, await it to read the
//! value, or ask it for its [`State`] without blocking.
//!
//! ```
//! use callable_promise::callable_promise;
//! use futures::executor::block_on;
//!
//! let done = callable_promise::<i32>();
//! done.call(42);
//! assert_eq!(block_on(done.value()), 42);
//! ```
use std::fmt;

pub mod callable;

pub use callable::{callable_promise, CallablePromise};

/// Settlement tag of a promise. Advances once and never goes back.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    #[default]
    Pending = 0,
    Fulfilled = 1,
    Rejected = 2,
}

impl State {
    pub fn is_pending(self) -> bool {
        self == State::Pending
    }

    pub fn is_settled(self) -> bool {
        !self.is_pending()
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            State::Pending => "pending",
            State::Fulfilled => "fulfilled",
            State::Rejected => "rejected",
        })
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("promise has already been settled")]
    AlreadySettled,
}

/// The settling side of a promise.
///
/// Settlement happens at most once. Later calls to [`Promise::resolve`] or
/// [`Promise::reject`] are ignored; use the `try_` variants to find out.
pub trait Promise<T> {
    type Error;

    fn resolve(&self, value: T) {
        let _ = self.try_resolve(value);
    }

    fn reject(&self, err: Self::Error) {
        let _ = self.try_reject(err);
    }

    fn try_resolve(&self, value: T) -> Result<(), Error>;

    fn try_reject(&self, err: Self::Error) -> Result<(), Error>;

    /// Current settlement tag, read without waiting.
    fn state(&self) -> State;
}
