//! Exactly-once materialization of a batch.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use log::{debug, warn};

use crate::error::OpenerError;

type Job<T> = Box<dyn FnOnce() -> Result<T, OpenerError> + Send>;

/// The terminal result of a job, replayed to every caller.
enum Outcome<T> {
    Loaded(T),
    Failed(OpenerError),
    /// A panic whose payload was a string, re-raised with the same message.
    Panicked(String),
}

impl<T: Clone> Outcome<T> {
    fn replay(&self) -> Replay<T> {
        match self {
            Outcome::Loaded(value) => Replay::Value(Ok(value.clone())),
            Outcome::Failed(e) => Replay::Value(Err(e.clone())),
            Outcome::Panicked(msg) => Replay::Panic(msg.clone()),
        }
    }

    fn from_panic(payload: Box<dyn Any + Send>) -> Outcome<T> {
        match payload.downcast::<String>() {
            Ok(msg) => Outcome::Panicked(*msg),
            Err(payload) => match payload.downcast::<&'static str>() {
                Ok(msg) => Outcome::Panicked(msg.to_string()),
                Err(_) => Outcome::Failed(OpenerError::Unexpected("Unexpected error".to_string())),
            },
        }
    }
}

enum State<T> {
    Pending(Job<T>),
    Running,
    Done(Outcome<T>),
}

/// Holds the deferred rewrite-and-load job of one batch.
///
/// The first thread to call [`ContainerHolder::materialize`] runs the job on
/// its own stack; every other caller blocks until it finishes and then gets
/// the same result. Waiting cannot be cancelled: a `Thread::unpark` aimed at
/// a waiting thread does not end the wait, and the park token is still set
/// when `materialize` returns.
pub struct ContainerHolder<T> {
    label: String,
    state: Mutex<State<T>>,
    done: Condvar,
}

impl<T> fmt::Debug for ContainerHolder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerHolder").field("label", &self.label).finish_non_exhaustive()
    }
}

impl<T: Clone> ContainerHolder<T> {
    pub fn new(
        label: impl Into<String>,
        job: impl FnOnce() -> Result<T, OpenerError> + Send + 'static,
    ) -> ContainerHolder<T> {
        ContainerHolder {
            label: label.into(),
            state: Mutex::new(State::Pending(Box::new(job))),
            done: Condvar::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Runs the job if nobody has yet, otherwise waits for its outcome.
    ///
    /// # Panics
    ///
    /// Re-raises a panic of the job, with the same message, on every caller.
    pub fn materialize(&self) -> Result<T, OpenerError> {
        let mut state = self.lock();
        let job = loop {
            match std::mem::replace(&mut *state, State::Running) {
                State::Pending(job) => break job,
                State::Running => {
                    state = self.wait(state);
                }
                State::Done(outcome) => {
                    let result = outcome.replay();
                    *state = State::Done(outcome);
                    drop(state);
                    return result.into_result();
                }
            }
        };
        drop(state);

        debug!("materializing {}", self.label);
        let outcome = match panic::catch_unwind(AssertUnwindSafe(job)) {
            Ok(Ok(value)) => Outcome::Loaded(value),
            Ok(Err(e)) => {
                warn!("{} failed: {}", self.label, e);
                Outcome::Failed(e)
            }
            Err(payload) => {
                warn!("{} panicked", self.label);
                Outcome::from_panic(payload)
            }
        };

        let mut state = self.lock();
        let result = outcome.replay();
        *state = State::Done(outcome);
        self.done.notify_all();
        drop(state);
        result.into_result()
    }

    pub fn is_materialized(&self) -> bool {
        matches!(*self.lock(), State::Done(_))
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, state: MutexGuard<'a, State<T>>) -> MutexGuard<'a, State<T>> {
        self.done
            .wait_while(state, |s| matches!(s, State::Running))
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// A replayed outcome. A panic is raised only after the lock is released.
enum Replay<T> {
    Value(Result<T, OpenerError>),
    Panic(String),
}

impl<T> Replay<T> {
    fn into_result(self) -> Result<T, OpenerError> {
        match self {
            Replay::Value(result) => result,
            Replay::Panic(msg) => panic::resume_unwind(Box::new(msg)),
        }
    }
}
