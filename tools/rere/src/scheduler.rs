use crate::errors::RereError;
use crate::logging::append_run_log;
use crate::runner::command_token;
use crate::runtime::Terminal;
use crate::types::Mode;
use serde_json::json;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};

/// Counting semaphore bounding how many commands run at once.
pub struct AdmissionGate {
    capacity: usize,
    in_use: Mutex<usize>,
    released: Condvar,
}

/// One unit of gate capacity. Dropping it releases the unit, including
/// during a panic unwind.
pub struct Permit<'a> {
    gate: &'a AdmissionGate,
}

impl AdmissionGate {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            in_use: Mutex::new(0),
            released: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn acquire(&self) -> Permit<'_> {
        let mut in_use = self.in_use.lock().expect("admission gate lock poisoned");
        while *in_use >= self.capacity {
            in_use = self
                .released
                .wait(in_use)
                .expect("admission gate lock poisoned");
        }
        *in_use += 1;
        Permit { gate: self }
    }

    pub fn in_use(&self) -> usize {
        *self.in_use.lock().expect("admission gate lock poisoned")
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        // Recover the guard from a poisoned lock so capacity is never lost.
        let mut in_use = match self.gate.in_use.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *in_use = in_use.saturating_sub(1);
        drop(in_use);
        self.gate.released.notify_one();
    }
}

/// Label shown in the progress notice for a dispatched command.
pub fn dispatch_label(mode: Mode, command_line: &str) -> &str {
    match mode {
        Mode::Capture => command_token(command_line),
        Mode::Replay => command_line,
    }
}

fn notify_dispatch(terminal: &dyn Terminal, mode: Mode, index: usize, command_line: &str) {
    let label = dispatch_label(mode, command_line);
    let _ = terminal.write_line(&format!("{}: {label}", mode.notice_label()));
    append_run_log(
        "debug",
        "scheduler.dispatch",
        json!({ "mode": mode.as_str(), "index": index, "command": command_line }),
    );
}

/// Runs `task` once per command and returns the results in command order.
///
/// `jobs == 0` runs sequentially on the calling thread. Otherwise up to
/// `jobs` worker threads pull command indices from a shared cursor, and the
/// gate admits at most `jobs` tasks at a time. Workers report
/// `(index, value)` to a single collector, so completion order never
/// affects the returned order.
pub fn run_all<T, F>(
    commands: &[String],
    jobs: usize,
    mode: Mode,
    terminal: &dyn Terminal,
    task: F,
) -> Result<Vec<T>, RereError>
where
    T: Send,
    F: Fn(usize, &str) -> T + Sync,
{
    if jobs == 0 {
        let mut results = Vec::with_capacity(commands.len());
        for (index, command) in commands.iter().enumerate() {
            notify_dispatch(terminal, mode, index, command);
            results.push(task(index, command));
        }
        return Ok(results);
    }

    let gate = AdmissionGate::new(jobs);
    let cursor = AtomicUsize::new(0);
    let panicked = AtomicUsize::new(0);
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<(usize, T)>();
    let task = &task;
    let gate = &gate;
    let cursor = &cursor;
    let panicked = &panicked;

    std::thread::scope(|scope| {
        let workers = jobs.min(commands.len());
        let mut handles = Vec::with_capacity(workers);
        let mut spawn_error = None;
        for worker in 0..workers {
            let tx = tx.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("rere-worker-{worker}"))
                .spawn_scoped(scope, move || loop {
                    let index = cursor.fetch_add(1, Ordering::SeqCst);
                    let Some(command) = commands.get(index) else {
                        break;
                    };
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                        let _permit = gate.acquire();
                        notify_dispatch(terminal, mode, index, command);
                        task(index, command)
                    }));
                    match outcome {
                        Ok(value) => {
                            let _ = tx.send((index, value));
                        }
                        Err(_) => {
                            panicked.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(error) => {
                    spawn_error = Some(error.to_string());
                    break;
                }
            }
        }
        drop(tx);

        if let Some(error) = &spawn_error {
            append_run_log(
                "warn",
                "scheduler.spawn_failed",
                json!({ "requested": workers, "started": handles.len(), "error": error }),
            );
        }
        if handles.is_empty() && !commands.is_empty() {
            return Err(RereError::Process(format!(
                "failed to start worker thread: {}",
                spawn_error.unwrap_or_default()
            )));
        }

        let mut slots = (0..commands.len()).map(|_| None).collect::<Vec<Option<T>>>();
        while let Some((index, value)) = rx.blocking_recv() {
            slots[index] = Some(value);
        }

        let crashed = handles
            .into_iter()
            .map(|handle| handle.join())
            .filter(Result::is_err)
            .count();
        let panicked = panicked.load(Ordering::SeqCst) + crashed;
        if panicked > 0 {
            return Err(RereError::Process(format!(
                "{panicked} command task(s) panicked"
            )));
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or_else(|| {
                    RereError::Process(format!("no result collected for command {index}"))
                })
            })
            .collect()
    })
}
