//! A single logical thread of execution for one signaling session.
//!
//! Everything that touches channel or room state runs as a task on a
//! [`SerializedExecutor`]: tasks run strictly in submission order and never
//! concurrently, so the state they share needs no further synchronization.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use log::{debug, warn};
use tokio::sync::{Mutex, mpsc};

type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

enum Command {
    Run(Task),
    Stop,
}

tokio::task_local! {
    static EXECUTOR_ID: u64;
}

static NEXT_EXECUTOR_ID: AtomicU64 = AtomicU64::new(1);

pub struct SerializedExecutor {
    id: u64,
    commands_tx: mpsc::UnboundedSender<Command>,
    commands_rx: Mutex<Option<mpsc::UnboundedReceiver<Command>>>,
    stopped: AtomicBool,
}

impl SerializedExecutor {
    pub fn new() -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        Self {
            id: NEXT_EXECUTOR_ID.fetch_add(1, Ordering::Relaxed),
            commands_tx,
            commands_rx: Mutex::new(Some(commands_rx)),
            stopped: AtomicBool::new(false),
        }
    }

    /// Spawns the drain loop. Tasks submitted before the start request are
    /// held in the queue and run once the loop is up.
    pub fn request_start(&self) {
        let Ok(mut guard) = self.commands_rx.try_lock() else {
            warn!(target: "Executor", "request_start() raced with another start");
            return;
        };
        let Some(mut commands_rx) = guard.take() else {
            warn!(target: "Executor", "request_start() called on a started executor");
            return;
        };
        let id = self.id;
        tokio::spawn(EXECUTOR_ID.scope(id, async move {
            debug!(target: "Executor", "executor {id} started");
            while let Some(command) = commands_rx.recv().await {
                match command {
                    Command::Run(task) => task.await,
                    Command::Stop => break,
                }
            }
            debug!(target: "Executor", "executor {id} stopped");
        }));
    }

    /// Queues `task` behind everything submitted before it and returns
    /// immediately. Returns false if the executor was stopped and the task
    /// dropped.
    pub fn submit(&self, task: impl Future<Output = ()> + Send + 'static) -> bool {
        if self.stopped.load(Ordering::Acquire) {
            warn!(target: "Executor", "submit() after stop, dropping task");
            return false;
        }
        if self.commands_tx.send(Command::Run(Box::pin(task))).is_err() {
            warn!(target: "Executor", "executor loop is gone, dropping task");
            return false;
        }
        true
    }

    /// Stops the drain loop once every task queued so far has run. Later
    /// submissions are dropped.
    pub fn request_stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.commands_tx.send(Command::Stop);
    }

    /// True when called from a task running on this executor.
    pub fn is_on_executor(&self) -> bool {
        EXECUTOR_ID.try_with(|id| *id == self.id).unwrap_or(false)
    }

    /// Debug-build check that the caller is a task on this executor. State
    /// is confined to the executor, so calling from anywhere else is a
    /// programming error, not a recoverable condition.
    #[track_caller]
    pub fn assert_on_executor(&self) {
        debug_assert!(
            self.is_on_executor(),
            "not called from a task on the owning SerializedExecutor"
        );
    }
}

impl Default for SerializedExecutor {
    fn default() -> Self {
        Self::new()
    }
}
