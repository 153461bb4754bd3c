//! Initialize-once device/context handle.
//!
//! Whichever caller arrives first runs the acquisition sequence; every
//! concurrent caller blocks until it finishes and then observes the same
//! cached outcome. Initialization is never retried: a failure is fatal for
//! the backend for the process lifetime.

use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};

use thiserror::Error;

/// Device initialization failure, carrying the backend's message verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("device initialization failed for backend {backend}: {message}")]
pub struct DeviceInitError {
    pub backend: String,
    pub message: String,
}

impl DeviceInitError {
    pub fn new(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            message: message.into(),
        }
    }
}

/// Observable lifecycle of a device handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Uninitialized,
    Initializing,
    Ready,
    Fatal,
}

enum Slot<T> {
    Uninitialized,
    Initializing,
    Ready(Arc<T>),
    Fatal(DeviceInitError),
}

/// Process-scoped handle owning one backend's opaque device connection.
pub struct DeviceHandle<T> {
    slot: Mutex<Slot<T>>,
    ready: Condvar,
}

impl<T> DeviceHandle<T> {
    pub const fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::Uninitialized),
            ready: Condvar::new(),
        }
    }

    pub fn state(&self) -> DeviceState {
        match &*self.slot.lock().expect("device handle poisoned") {
            Slot::Uninitialized => DeviceState::Uninitialized,
            Slot::Initializing => DeviceState::Initializing,
            Slot::Ready(_) => DeviceState::Ready,
            Slot::Fatal(_) => DeviceState::Fatal,
        }
    }

    /// Returns the connection, running `init` at most once per process.
    ///
    /// The first caller becomes the initializer; everyone else blocks and
    /// then observes the identical `Ready` or `Fatal` outcome. The wait is
    /// unbounded with no timeout, acceptable because initialization happens
    /// once per process lifetime.
    pub fn get_or_init<F>(&self, init: F) -> Result<Arc<T>, DeviceInitError>
    where
        F: FnOnce() -> Result<T, DeviceInitError>,
    {
        let mut guard = self.slot.lock().expect("device handle poisoned");
        loop {
            match &*guard {
                Slot::Ready(connection) => return Ok(Arc::clone(connection)),
                Slot::Fatal(err) => return Err(err.clone()),
                Slot::Initializing => {
                    guard = self.ready.wait(guard).expect("device handle poisoned");
                }
                Slot::Uninitialized => break,
            }
        }
        *guard = Slot::Initializing;
        drop(guard);

        let outcome = init();

        let mut guard = self.slot.lock().expect("device handle poisoned");
        let result = match outcome {
            Ok(connection) => {
                let connection = Arc::new(connection);
                *guard = Slot::Ready(Arc::clone(&connection));
                Ok(connection)
            }
            Err(err) => {
                *guard = Slot::Fatal(err.clone());
                Err(err)
            }
        };
        drop(guard);
        self.ready.notify_all();
        result
    }

    /// Explicit shutdown hook: releases a `Ready` connection and returns the
    /// handle to `Uninitialized`. A `Fatal` handle stays fatal.
    pub fn teardown(&self) -> Option<Arc<T>> {
        let mut guard = self.slot.lock().expect("device handle poisoned");
        match &*guard {
            Slot::Ready(_) => {
                let previous = std::mem::replace(&mut *guard, Slot::Uninitialized);
                match previous {
                    Slot::Ready(connection) => Some(connection),
                    _ => unreachable!(),
                }
            }
            _ => None,
        }
    }
}

impl<T> Default for DeviceHandle<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Collapses a request-with-callback native primitive into a synchronous
/// call: submit the request, block the calling execution context until the
/// callback fires. No cancellation, no timeout.
pub fn block_on_callback<T, F>(submit: F) -> T
where
    T: Send + 'static,
    F: FnOnce(Box<dyn FnOnce(T) + Send>),
{
    let (sender, receiver) = mpsc::channel();
    submit(Box::new(move |value| {
        let _ = sender.send(value);
    }));
    receiver
        .recv()
        .expect("native completion callback dropped without firing")
}
