//! Single-threaded dispatcher
//!
//! Every method invocation and every connection event of a server runs on
//! one dedicated worker thread, fed by a job queue. Session threads hand
//! their invocation over and block until it has run, so a service never
//! sees two calls at once no matter how many clients are connected.
//!
//! # Execution Model
//!
//! - [`Dispatcher::invoke`] queues a closure and waits for its result
//! - [`Dispatcher::post`] queues a closure and returns immediately
//! - jobs run in submission order, one at a time
//! - a panicking job is contained; `invoke` turns it into a `Remote` error
//!   and the worker keeps going
//!
//! A job that never returns blocks the worker, and with it every session
//! waiting on the same dispatcher. There is no per-call timeout.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};

use tcpipc_common::{Result, TcpipcError};
use tracing::{debug, error};

use crate::config::DEFAULT_DISPATCHER_NAME;

type Job = Box<dyn FnOnce() + Send>;

/// Handle to a dispatcher worker thread.
///
/// Clones share the same worker, which lets several servers use one
/// serialization point.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    name: String,
    worker_id: ThreadId,
    sender: Mutex<Option<Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Starts a dispatcher with the default thread name.
    pub fn new() -> Result<Self> {
        Self::named(DEFAULT_DISPATCHER_NAME)
    }

    /// Starts a dispatcher whose worker thread is called `name`.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the worker thread cannot be spawned.
    pub fn named(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let (sender, receiver) = mpsc::channel::<Job>();

        let thread_name = name.clone();
        let worker = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                for job in receiver {
                    job();
                }
                debug!("Dispatcher '{}' drained its queue and stopped", thread_name);
            })
            .map_err(|e| {
                TcpipcError::Configuration(format!(
                    "cannot spawn dispatcher thread '{}': {}",
                    name, e
                ))
            })?;

        debug!("Dispatcher '{}' started", name);

        Ok(Self {
            inner: Arc::new(DispatcherInner {
                worker_id: worker.thread().id(),
                name,
                sender: Mutex::new(Some(sender)),
                worker: Mutex::new(Some(worker)),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Whether the current thread is this dispatcher's worker.
    pub fn is_dispatcher_thread(&self) -> bool {
        thread::current().id() == self.inner.worker_id
    }

    /// Runs `job` on the worker thread and waits for its result.
    ///
    /// Called from the worker thread itself, the job runs inline instead of
    /// being queued behind the caller.
    ///
    /// # Errors
    ///
    /// - `Remote` carrying the panic message if `job` panics
    /// - `Connection` if the dispatcher has been shut down
    pub fn invoke<T, F>(&self, job: F) -> Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if self.is_dispatcher_thread() {
            return panic::catch_unwind(AssertUnwindSafe(job))
                .map_err(|payload| TcpipcError::Remote(panic_message(payload.as_ref())));
        }

        let (done, outcome) = mpsc::sync_channel(1);
        self.enqueue(Box::new(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(job));
            let _ = done.send(result);
        }))?;

        match outcome.recv() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(payload)) => Err(TcpipcError::Remote(panic_message(payload.as_ref()))),
            Err(_) => Err(self.stopped()),
        }
    }

    /// Queues `job` without waiting for it.
    ///
    /// A panic inside `job` is logged and otherwise ignored.
    pub fn post<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let name = self.inner.name.clone();
        self.enqueue(Box::new(move || {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
                error!(
                    "Posted job on dispatcher '{}' panicked: {}",
                    name,
                    panic_message(payload.as_ref())
                );
            }
        }))
    }

    /// Stops accepting jobs, lets the worker finish the ones already
    /// queued, and joins it. Later submissions fail with `Connection`.
    ///
    /// Safe to call more than once and from any clone.
    pub fn shutdown(&self) {
        let sender = self
            .inner
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if sender.is_none() {
            return;
        }
        drop(sender);

        let worker = self
            .inner
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            if self.is_dispatcher_thread() {
                // joining ourselves would deadlock; the loop ends once the queue drains
                return;
            }
            if worker.join().is_err() {
                error!("Dispatcher '{}' worker panicked", self.inner.name);
            }
        }
        debug!("Dispatcher '{}' shut down", self.inner.name);
    }

    fn enqueue(&self, job: Job) -> Result<()> {
        let sender = self
            .inner
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match sender.as_ref() {
            Some(sender) => sender.send(job).map_err(|_| self.stopped()),
            None => Err(self.stopped()),
        }
    }

    fn stopped(&self) -> TcpipcError {
        TcpipcError::Connection(format!("dispatcher '{}' is shut down", self.inner.name))
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("name", &self.inner.name)
            .field("running", &self.is_running())
            .finish()
    }
}

/// Extracts the text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "method panicked".to_string()
    }
}
