/*
 * worker.rs
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

//! Bounded fan-out/fan-in over pooled sessions.
//!
//! `run` hands every task to one of W workers (tokio tasks) pulling from a shared queue.
//! Each worker leases a session per task, executes it, releases the session and reports
//! the result with the task's index, so results come back in submission order whatever
//! order they completed in. The first failure ends the run; workers still busy finish
//! their current call and then stop taking tasks.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

use crate::error::{Result, ScrapeError};
use crate::message::{Mailbox, MessageId, RawMessage};
use crate::pool::SessionPool;
use crate::session::MailSession;
use crate::telemetry::{Telemetry, TracingTelemetry};

/// One unit of work against a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    ListMessageIds(Mailbox),
    FetchMessage(Mailbox, MessageId),
}

impl Task {
    pub fn name(&self) -> &'static str {
        match self {
            Task::ListMessageIds(_) => "list_message_ids",
            Task::FetchMessage(..) => "fetch_message",
        }
    }

    pub fn mailbox(&self) -> &Mailbox {
        match self {
            Task::ListMessageIds(mailbox) | Task::FetchMessage(mailbox, _) => mailbox,
        }
    }
}

/// Result of one task; the variant always matches the task's.
#[derive(Debug)]
pub enum TaskOutput {
    MessageIds(Mailbox, Vec<MessageId>),
    Message(RawMessage),
}

impl TaskOutput {
    pub fn into_message_ids(self) -> Result<(Mailbox, Vec<MessageId>)> {
        match self {
            TaskOutput::MessageIds(mailbox, ids) => Ok((mailbox, ids)),
            TaskOutput::Message(m) => Err(ScrapeError::Protocol(format!(
                "expected message ids, got message {} from {}",
                m.id(),
                m.mailbox()
            ))),
        }
    }

    pub fn into_message(self) -> Result<RawMessage> {
        match self {
            TaskOutput::Message(m) => Ok(m),
            TaskOutput::MessageIds(mailbox, _) => Err(ScrapeError::Protocol(format!(
                "expected a message, got message ids for {}",
                mailbox
            ))),
        }
    }
}

/// min(pool size, 2 x available parallelism), at least 1.
pub fn default_worker_count(pool_size: usize) -> usize {
    let parallelism = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    pool_size.min(2 * parallelism).max(1)
}

async fn execute<S: MailSession>(session: &mut S, task: &Task) -> Result<TaskOutput> {
    match task {
        Task::ListMessageIds(mailbox) => {
            let (mailbox, ids) = session.list_message_ids(mailbox).await?;
            Ok(TaskOutput::MessageIds(mailbox, ids))
        }
        Task::FetchMessage(mailbox, id) => session.fetch_message(mailbox, id).await.map(TaskOutput::Message),
    }
}

type Queue = Arc<Mutex<VecDeque<(usize, Task)>>>;

pub struct WorkerPool<S: MailSession> {
    pool: Arc<SessionPool<S>>,
    workers: usize,
    telemetry: Arc<dyn Telemetry>,
}

impl<S: MailSession> WorkerPool<S> {
    pub fn new(pool: Arc<SessionPool<S>>) -> Self {
        let workers = default_worker_count(pool.capacity());
        Self {
            pool,
            workers,
            telemetry: Arc::new(TracingTelemetry),
        }
    }

    /// Explicit worker count. More workers than sessions could exhaust the pool, so it is refused here.
    pub fn with_workers(pool: Arc<SessionPool<S>>, workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(ScrapeError::Config("worker count must be at least 1".into()));
        }
        if workers > pool.capacity() {
            return Err(ScrapeError::PoolExhausted {
                capacity: pool.capacity(),
            });
        }
        Ok(Self {
            pool,
            workers,
            telemetry: Arc::new(TracingTelemetry),
        })
    }

    pub fn telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }


    /// Execute `tasks`; the output at index i belongs to `tasks[i]`.
    pub async fn run(&self, tasks: Vec<Task>) -> Result<Vec<TaskOutput>> {
        let total = tasks.len();
        if total == 0 {
            return Ok(Vec::new());
        }
        let queue: Queue = Arc::new(Mutex::new(tasks.into_iter().enumerate().collect()));
        let stop = Arc::new(AtomicBool::new(false));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let spawned = self.workers.min(total);
        tracing::debug!(tasks = total, workers = spawned, "dispatching");
        for worker in 0..spawned {
            tokio::spawn(worker_loop(
                worker,
                Arc::clone(&self.pool),
                Arc::clone(&queue),
                Arc::clone(&stop),
                tx.clone(),
                Arc::clone(&self.telemetry),
            ));
        }
        drop(tx);

        let mut slots: Vec<Option<TaskOutput>> = (0..total).map(|_| None).collect();
        while let Some((index, result)) = rx.recv().await {
            match result {
                Ok(output) => slots[index] = Some(output),
                Err(e) => {
                    stop.store(true, Ordering::Release);
                    return Err(e);
                }
            }
        }
        // Channel closed with slots missing: a worker died mid-task.
        let done = slots.iter().filter(|s| s.is_some()).count();
        slots.into_iter().collect::<Option<Vec<_>>>().ok_or_else(|| {
            ScrapeError::Worker(format!("workers exited after {} of {} tasks", done, total))
        })
    }
}

async fn worker_loop<S: MailSession>(
    worker: usize,
    pool: Arc<SessionPool<S>>,
    queue: Queue,
    stop: Arc<AtomicBool>,
    tx: mpsc::UnboundedSender<(usize, Result<TaskOutput>)>,
    telemetry: Arc<dyn Telemetry>,
) {
    loop {
        if stop.load(Ordering::Acquire) {
            break;
        }
        let next = queue.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
        let Some((index, task)) = next else {
            break;
        };
        let result = match pool.acquire() {
            Ok(mut lease) => {
                let session = lease.id();
                telemetry.task_started(worker, session, &task);
                let result = execute(&mut *lease, &task).await;
                if let Err(e) = &result {
                    telemetry.task_failed(worker, session, &task, e);
                }
                pool.release(lease);
                result
            }
            Err(e) => Err(e),
        };
        let failed = result.is_err();
        if tx.send((index, result)).is_err() || failed {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeConnector, FakeServer, FakeSession};
    use crate::telemetry::RecordingTelemetry;
    use std::time::Duration;

    async fn pool(server: &FakeServer, size: usize) -> Arc<SessionPool<FakeSession>> {
        let connector = FakeConnector::new(server.clone());
        Arc::new(SessionPool::connect(size, &connector).await.unwrap())
    }

    fn fetch_tasks(mailbox: &str, ids: impl IntoIterator<Item = u32>) -> Vec<Task> {
        ids.into_iter()
            .map(|id| Task::FetchMessage(Mailbox::from(mailbox), MessageId::from(id)))
            .collect()
    }

    #[test]
    fn worker_count_is_bounded_by_pool() {
        assert_eq!(default_worker_count(1), 1);
        assert!(default_worker_count(10_000) <= 10_000);
        assert!(default_worker_count(10_000) >= 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn empty_task_list() {
        let server = FakeServer::new();
        let workers = WorkerPool::new(pool(&server, 2).await);
        assert!(workers.run(Vec::new()).await.unwrap().is_empty());
        assert_eq!(server.calls(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn results_follow_submission_order() {
        // Earlier messages are slower, so completion order is the reverse of submission order.
        let mut server = FakeServer::new().mailbox("INBOX", 1..=12);
        for id in 1..=12u32 {
            server = server.slow("INBOX", id, Duration::from_millis(5 * (13 - id) as u64));
        }
        let workers = WorkerPool::with_workers(pool(&server, 3).await, 3).unwrap();
        let outputs = workers.run(fetch_tasks("INBOX", 1..=12)).await.unwrap();
        let ids: Vec<String> = outputs
            .into_iter()
            .map(|o| o.into_message().unwrap().id().to_string())
            .collect();
        let expected: Vec<String> = (1..=12).map(|i| i.to_string()).collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn leases_never_exceed_pool_size() {
        let server = FakeServer::new()
            .mailbox("INBOX", 1..=40)
            .delay(Duration::from_millis(3));
        let pool = pool(&server, 4).await;
        let workers = WorkerPool::with_workers(Arc::clone(&pool), 4).unwrap();
        let outputs = workers.run(fetch_tasks("INBOX", 1..=40)).await.unwrap();
        assert_eq!(outputs.len(), 40);
        assert!(server.max_active() <= 4);
        assert_eq!(server.overlaps(), 0);
        assert_eq!(pool.available(), 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn more_workers_than_sessions_is_refused() {
        let server = FakeServer::new();
        let result = WorkerPool::with_workers(pool(&server, 2).await, 3);
        assert!(matches!(result, Err(ScrapeError::PoolExhausted { capacity: 2 })));
        let result = WorkerPool::with_workers(pool(&server, 2).await, 0);
        assert!(matches!(result, Err(ScrapeError::Config(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn first_failure_aborts_run() {
        let server = FakeServer::new()
            .mailbox("INBOX", 1..=6)
            .fail_fetch("INBOX", 4);
        let workers = WorkerPool::with_workers(pool(&server, 2).await, 2).unwrap();
        let err = workers.run(fetch_tasks("INBOX", 1..=6)).await.unwrap_err();
        assert!(matches!(err, ScrapeError::Fetch { ref mailbox, .. } if mailbox == "INBOX"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn list_tasks_return_ids_per_mailbox() {
        let server = FakeServer::new().mailbox("INBOX", [1, 2]).mailbox("Sent", [3]);
        let telemetry = Arc::new(RecordingTelemetry::new());
        let workers = WorkerPool::new(pool(&server, 2).await).telemetry(telemetry.clone());
        let tasks = vec![
            Task::ListMessageIds(Mailbox::from("INBOX")),
            Task::ListMessageIds(Mailbox::from("Sent")),
        ];
        let outputs = workers.run(tasks.clone()).await.unwrap();
        let pairs: Vec<_> = outputs
            .into_iter()
            .map(|o| o.into_message_ids().unwrap())
            .collect();
        assert_eq!(pairs[0], (Mailbox::from("INBOX"), vec![MessageId::from(1), MessageId::from(2)]));
        assert_eq!(pairs[1], (Mailbox::from("Sent"), vec![MessageId::from(3)]));

        let events = telemetry.events();
        assert_eq!(events.len(), 2);
        let mut seen: Vec<_> = events.iter().map(|e| e.task.mailbox().as_str()).collect();
        seen.sort();
        assert_eq!(seen, ["INBOX", "Sent"]);
        for event in events {
            assert!(tasks.contains(&event.task));
            assert!(event.session < 2);
            assert!(event.worker < workers.workers());
        }
    }

    #[test]
    fn mismatched_output_is_protocol_error() {
        let output = TaskOutput::MessageIds(Mailbox::from("INBOX"), vec![]);
        assert!(matches!(output.into_message(), Err(ScrapeError::Protocol(_))));
    }
}
