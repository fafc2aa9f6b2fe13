/*
 * telemetry.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Mailsweep, a bulk mailbox retrieval tool.
 *
 * Mailsweep is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Mailsweep is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Mailsweep.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Diagnostic sink for task execution. Passed in through `ScrapeConfig`; has no effect on results.

use std::sync::Mutex;

use crate::session::SessionId;
use crate::worker::Task;

/// Receives one event per task a worker executes.
pub trait Telemetry: Send + Sync {
    fn task_started(&self, worker: usize, session: SessionId, task: &Task);

    fn task_failed(&self, _worker: usize, _session: SessionId, _task: &Task, _error: &crate::ScrapeError) {}
}

/// Default sink: structured `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl Telemetry for TracingTelemetry {
    fn task_started(&self, worker: usize, session: SessionId, task: &Task) {
        match task {
            Task::ListMessageIds(mailbox) => {
                tracing::info!(worker, session, op = "list_message_ids", mailbox = %mailbox);
            }
            Task::FetchMessage(mailbox, id) => {
                tracing::info!(worker, session, op = "fetch_message", mailbox = %mailbox, id = %id);
            }
        }
    }

    fn task_failed(&self, worker: usize, session: SessionId, task: &Task, error: &crate::ScrapeError) {
        tracing::warn!(
            worker,
            session,
            op = task.name(),
            mailbox = %task.mailbox(),
            error = %error,
            "task failed"
        );
    }
}

/// One recorded task start.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskEvent {
    pub worker: usize,
    pub session: SessionId,
    pub task: Task,
}

/// Keeps every event in memory. For tests and for callers that want a run log.
#[derive(Debug, Default)]
pub struct RecordingTelemetry {
    events: Mutex<Vec<TaskEvent>>,
}

impl RecordingTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TaskEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl Telemetry for RecordingTelemetry {
    fn task_started(&self, worker: usize, session: SessionId, task: &Task) {
        if let Ok(mut events) = self.events.lock() {
            events.push(TaskEvent {
                worker,
                session,
                task: task.clone(),
            });
        }
    }
}
