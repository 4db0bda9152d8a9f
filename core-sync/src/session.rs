//! # Scan Session (progress reporter)
//!
//! Holds the four append-only sequences a supervising controller watches:
//! active tasks, failed tasks, results and main logs. Every mutation pushes
//! the full updated sequence onto the [`EventBus`], so each emission is an
//! authoritative snapshot rather than a delta. Task and main logs are also
//! mirrored to `tracing`.

use core_runtime::events::{
    ControlMessage, CoreEvent, EventBus, LogLine, ResultEntry, ScanCounts, ScanEvent,
    ScanSnapshot, ScanTask, TaskResult,
};
use core_runtime::logging::LogLevel;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, trace, warn};

/// Message logged when the controller asks the process to exit.
pub const TERMINATION_MESSAGE: &str = "Scan process terminated.";

#[derive(Default)]
struct SessionState {
    snapshot: ScanSnapshot,
    counts: ScanCounts,
}

/// What the caller should do after a control message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlOutcome {
    /// The snapshot was published; keep running.
    Snapshot(ScanSnapshot),
    /// End the process with a non-zero status.
    Terminate,
}

pub struct ScanSession {
    bus: EventBus,
    state: Mutex<SessionState>,
}

fn mirror(level: LogLevel, scope: &str, message: &str) {
    match level {
        LogLevel::Trace => trace!(scope, "{}", message),
        LogLevel::Debug => debug!(scope, "{}", message),
        LogLevel::Info => info!(scope, "{}", message),
        LogLevel::Warn => warn!(scope, "{}", message),
        LogLevel::Error => error!(scope, "{}", message),
    }
}

impl ScanSession {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: ScanEvent) {
        self.bus.emit(CoreEvent::Scan(event)).ok();
    }

    /// Start tracking a task. A code that is already active is left as is.
    pub fn add_task(&self, code: &str) {
        let tasks = {
            let mut state = self.lock();
            if state.snapshot.tasks.iter().any(|task| task.code == code) {
                debug!(code, "Task already active");
                return;
            }
            state.snapshot.tasks.push(ScanTask::new(code));
            state.snapshot.tasks.clone()
        };
        self.emit(ScanEvent::Tasks { tasks });
    }

    /// Append a log line to an active task.
    pub fn add_log_for_task(&self, code: &str, log: LogLine) {
        mirror(log.level, &format!("RJ{}", code), &log.message);

        let tasks = {
            let mut state = self.lock();
            match state.snapshot.tasks.iter_mut().find(|task| task.code == code) {
                Some(task) => task.logs.push(log),
                None => return,
            }
            state.snapshot.tasks.clone()
        };
        self.emit(ScanEvent::Tasks { tasks });
    }

    /// Record a result on an active task without removing it.
    pub fn set_task_result(&self, code: &str, result: TaskResult) {
        let mut state = self.lock();
        if let Some(task) = state.snapshot.tasks.iter_mut().find(|task| task.code == code) {
            task.result = Some(result);
        }
    }

    /// Move a task out of the active set. Failed tasks are kept in the
    /// failed-task history.
    pub fn remove_task(&self, code: &str) {
        let (tasks, failed_tasks) = {
            let mut state = self.lock();
            let Some(index) = state.snapshot.tasks.iter().position(|task| task.code == code)
            else {
                return;
            };
            let task = state.snapshot.tasks.remove(index);
            let failed = if task.result == Some(TaskResult::Failed) {
                state.snapshot.failed_tasks.push(task);
                Some(state.snapshot.failed_tasks.clone())
            } else {
                None
            };
            (state.snapshot.tasks.clone(), failed)
        };

        self.emit(ScanEvent::Tasks { tasks });
        if let Some(failed_tasks) = failed_tasks {
            self.emit(ScanEvent::FailedTasks { failed_tasks });
        }
    }

    pub fn add_result(&self, code: &str, result: TaskResult, count: u32) {
        let results = {
            let mut state = self.lock();
            state.snapshot.results.push(ResultEntry {
                code: code.to_string(),
                result,
                count,
            });
            state.snapshot.results.clone()
        };
        self.emit(ScanEvent::Results { results });
    }

    pub fn add_main_log(&self, log: LogLine) {
        mirror(log.level, "main", &log.message);

        let main_logs = {
            let mut state = self.lock();
            state.snapshot.main_logs.push(log);
            state.snapshot.main_logs.clone()
        };
        self.emit(ScanEvent::MainLogs { main_logs });
    }

    pub fn main_info(&self, message: impl Into<String>) {
        self.add_main_log(LogLine::info(message));
    }

    pub fn main_error(&self, message: impl Into<String>) {
        self.add_main_log(LogLine::error(message));
    }

    pub fn task_info(&self, code: &str, message: impl Into<String>) {
        self.add_log_for_task(code, LogLine::info(message));
    }

    pub fn task_error(&self, code: &str, message: impl Into<String>) {
        self.add_log_for_task(code, LogLine::error(message));
    }

    /// Bump the aggregate counter for `result` and return its new value.
    pub fn record(&self, result: TaskResult) -> u32 {
        self.lock().counts.record(result)
    }

    /// Add `n` to the aggregate counter for `result`.
    pub fn record_many(&self, result: TaskResult, n: u32) {
        let mut state = self.lock();
        for _ in 0..n {
            state.counts.record(result);
        }
    }

    /// Settle a task: count it and, if it is being tracked, log the outcome,
    /// move it to history and append a result entry.
    ///
    /// Items that never opened a task (e.g. skipped ones) are only counted.
    pub fn complete_task(&self, code: &str, result: TaskResult) -> u32 {
        let count = self.record(result);
        let tracked = self
            .lock()
            .snapshot
            .tasks
            .iter()
            .any(|task| task.code == code);
        if !tracked {
            return count;
        }

        let message = match result {
            TaskResult::Added => format!("Added successfully. Added: {}", count),
            TaskResult::Updated => format!("Updated successfully. Updated: {}", count),
            TaskResult::Skipped => format!("Skipped. Skipped: {}", count),
            TaskResult::Failed => format!("Processing failed. Failed: {}", count),
        };
        if result == TaskResult::Failed {
            self.task_error(code, message);
        } else {
            self.task_info(code, message);
        }

        self.set_task_result(code, result);
        self.remove_task(code);
        self.add_result(code, result, count);
        count
    }

    pub fn counts(&self) -> ScanCounts {
        self.lock().counts
    }

    pub fn snapshot(&self) -> ScanSnapshot {
        self.lock().snapshot.clone()
    }

    /// Publish the terminal summary.
    pub fn finish(&self, message: impl Into<String>) {
        let message = message.into();
        let counts = self.counts();
        info!(?counts, "{}", message);
        self.emit(ScanEvent::Finished { message, counts });
    }

    /// React to a controller request.
    pub fn handle_control(&self, message: ControlMessage) -> ControlOutcome {
        match message {
            ControlMessage::InitState => {
                let snapshot = self.snapshot();
                self.emit(ScanEvent::InitState {
                    snapshot: snapshot.clone(),
                });
                ControlOutcome::Snapshot(snapshot)
            }
            ControlMessage::Exit => {
                self.main_error(TERMINATION_MESSAGE);
                ControlOutcome::Terminate
            }
        }
    }
}
