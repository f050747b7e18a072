//! Background runtime for scheduled jobs.
//!
//! Rebuilds and reconciliation sweeps are submitted by an external scheduler
//! and run on a small, bounded pool of named worker threads, so request-time
//! reads never wait on them.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::access::Caller;
use crate::config::RuntimeConfig;
use crate::engine::{CacheEngine, Job, JobOutcome};
use crate::error::{CacheError, CacheResult, ExecutionError};

const QUEUE_NAME: &str = "maintenance";

enum Task {
    Run {
        caller: Caller,
        job: Job,
        reply: Sender<CacheResult<JobOutcome>>,
    },

    #[cfg(test)]
    Sleep {
        duration: Duration,
        reply: Sender<()>,
    },
}

struct WorkerPool {
    tx: Sender<Task>,
    workers: Vec<JoinHandle<()>>,
    queue_capacity: usize,
}

impl WorkerPool {
    fn start(workers: usize, queue_capacity: usize, engine: &Arc<CacheEngine>) -> CacheResult<Self> {
        let workers = workers.max(1);
        let queue_capacity = queue_capacity.max(1);
        let (tx, rx) = bounded::<Task>(queue_capacity);

        let mut handles = Vec::with_capacity(workers);
        for idx in 0..workers {
            let rx: Receiver<Task> = rx.clone();
            let engine = Arc::clone(engine);
            let handle = thread::Builder::new()
                .name(format!("courtcache-{QUEUE_NAME}-{idx}"))
                .spawn(move || loop {
                    match rx.recv() {
                        Ok(Task::Run { caller, job, reply }) => {
                            let result = engine.run(&caller, &job);
                            if let Err(err) = &result {
                                tracing::warn!(job = job.name(), error = %err, "job failed");
                            }
                            let _ = reply.send(result);
                        }
                        Err(_) => break,

                        #[cfg(test)]
                        Ok(Task::Sleep { duration, reply }) => {
                            thread::sleep(duration);
                            let _ = reply.send(());
                        }
                    }
                })
                .map_err(|e| CacheError::internal(format!("failed to spawn worker: {e}")))?;
            handles.push(handle);
        }

        Ok(Self {
            tx,
            workers: handles,
            queue_capacity,
        })
    }

    fn try_submit(&self, task: Task) -> CacheResult<()> {
        match self.tx.try_send(task) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(CacheError::Execution(ExecutionError::QueueFull {
                queue: QUEUE_NAME.to_string(),
                capacity: self.queue_capacity,
            })),
            Err(TrySendError::Disconnected(_)) => Err(CacheError::Execution(ExecutionError::Disconnected {
                queue: QUEUE_NAME.to_string(),
            })),
        }
    }

    fn shutdown(self) {
        // Close the channel: workers drain queued jobs then exit.
        drop(self.tx);
        for handle in self.workers {
            let _ = handle.join();
        }
    }
}

/// Handle returned by [`JobRuntime::submit`].
pub struct JobHandle {
    name: &'static str,
    rx: Receiver<CacheResult<JobOutcome>>,
}

impl JobHandle {
    /// Name of the submitted job.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Waits for the job to finish.
    ///
    /// # Errors
    ///
    /// The job's own error, or `Disconnected` if the worker went away.
    pub fn join(self) -> CacheResult<JobOutcome> {
        self.rx.recv().map_err(|_| {
            CacheError::Execution(ExecutionError::Disconnected {
                queue: QUEUE_NAME.to_string(),
            })
        })?
    }

    /// Waits for the job to finish, up to `timeout`.
    ///
    /// # Errors
    ///
    /// The job's own error, `Timeout`, or `Disconnected`.
    pub fn join_timeout(self, timeout: Duration) -> CacheResult<JobOutcome> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            crossbeam_channel::RecvTimeoutError::Timeout => CacheError::Execution(ExecutionError::Timeout {
                duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
            crossbeam_channel::RecvTimeoutError::Disconnected => {
                CacheError::Execution(ExecutionError::Disconnected {
                    queue: QUEUE_NAME.to_string(),
                })
            }
        })?
    }
}

/// Bounded worker pool executing scheduled jobs against an engine.
pub struct JobRuntime {
    engine: Arc<CacheEngine>,
    pool: WorkerPool,
}

impl JobRuntime {
    /// Start the runtime using the engine's runtime configuration.
    ///
    /// # Errors
    ///
    /// `Internal` if a worker thread cannot be spawned.
    pub fn start(engine: CacheEngine) -> CacheResult<Self> {
        let config = engine.config().runtime.clone();
        Self::with_config(engine, &config)
    }

    /// Start the runtime with an explicit configuration.
    ///
    /// # Errors
    ///
    /// `Internal` if a worker thread cannot be spawned.
    pub fn with_config(engine: CacheEngine, config: &RuntimeConfig) -> CacheResult<Self> {
        let engine = Arc::new(engine);
        let pool = WorkerPool::start(config.workers, config.queue_capacity, &engine)?;
        Ok(Self { engine, pool })
    }

    /// Queue a job, run on behalf of `caller`, without waiting for it.
    ///
    /// # Errors
    ///
    /// `QueueFull` when the queue is at capacity (the scheduler retries
    /// later), or `Disconnected`.
    pub fn submit(&self, caller: Caller, job: Job) -> CacheResult<JobHandle> {
        let name = job.name();
        let (tx, rx) = bounded::<CacheResult<JobOutcome>>(1);
        self.pool.try_submit(Task::Run {
            caller,
            job,
            reply: tx,
        })?;
        Ok(JobHandle { name, rx })
    }

    /// Queue a job and wait for its outcome.
    ///
    /// # Errors
    ///
    /// Same as [`JobRuntime::submit`] and [`JobHandle::join`].
    pub fn run(&self, caller: Caller, job: Job) -> CacheResult<JobOutcome> {
        self.submit(caller, job)?.join()
    }

    /// The engine jobs run against. Reads go straight through it.
    #[must_use]
    pub fn engine(&self) -> &CacheEngine {
        &self.engine
    }

    #[cfg(test)]
    fn submit_sleep(&self, duration: Duration) -> CacheResult<Receiver<()>> {
        let (tx, rx) = bounded::<()>(1);
        self.pool.try_submit(Task::Sleep { duration, reply: tx })?;
        Ok(rx)
    }
}

impl Drop for JobRuntime {
    fn drop(&mut self) {
        let pool = std::mem::replace(
            &mut self.pool,
            WorkerPool {
                tx: bounded::<Task>(1).0,
                workers: Vec::new(),
                queue_capacity: 1,
            },
        );
        pool.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::NaiveDate;

    use crate::config::CoreConfig;
    use crate::entity::EntityId;
    use crate::fact::{FactRecord, InMemoryFactStore};

    fn engine() -> (CacheEngine, EntityId) {
        let facts = Arc::new(InMemoryFactStore::new());
        let id = EntityId::new();
        facts
            .append(FactRecord::new(id, NaiveDate::from_ymd_opt(2024, 8, 1).unwrap()))
            .unwrap();
        (CacheEngine::in_memory(CoreConfig::default(), facts).unwrap(), id)
    }

    #[test]
    fn reads_do_not_wait_on_busy_workers() {
        let (engine, id) = engine();
        let runtime = JobRuntime::with_config(
            engine,
            &RuntimeConfig {
                workers: 1,
                queue_capacity: 4,
            },
        )
        .unwrap();

        let sleep = runtime.submit_sleep(Duration::from_millis(200)).unwrap();

        let started = std::time::Instant::now();
        let summary = runtime
            .engine()
            .aggregates()
            .get_summary(&Caller::public(), id, 5)
            .unwrap();
        assert!(summary.is_empty());
        assert!(started.elapsed() < Duration::from_millis(100));

        sleep.recv_timeout(Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn full_queue_is_reported() {
        let (engine, _) = engine();
        let runtime = JobRuntime::with_config(
            engine,
            &RuntimeConfig {
                workers: 1,
                queue_capacity: 1,
            },
        )
        .unwrap();

        // Occupy the worker, then fill the single queue slot.
        let busy = runtime.submit_sleep(Duration::from_millis(300)).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        let queued = runtime.submit_sleep(Duration::from_millis(1)).unwrap();

        let err = runtime
            .submit(Caller::service("cron"), Job::ReconcileCompleteness)
            .err()
            .unwrap();
        assert!(err.is_retryable());
        assert!(matches!(err, CacheError::Execution(ExecutionError::QueueFull { capacity: 1, .. })));

        busy.recv_timeout(Duration::from_secs(1)).unwrap();
        queued.recv_timeout(Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn join_reports_disconnected_when_reply_sender_dropped() {
        let (tx, rx) = bounded::<CacheResult<JobOutcome>>(1);
        drop(tx);

        let handle = JobHandle {
            name: "rebuild_aggregates",
            rx,
        };
        let err = handle.join().unwrap_err();
        let CacheError::Execution(ExecutionError::Disconnected { queue }) = err else {
            panic!("expected Disconnected, got {err:?}");
        };
        assert_eq!(queue, QUEUE_NAME);
    }

    #[test]
    fn join_timeout_reports_timeout() {
        let (_tx, rx) = bounded::<CacheResult<JobOutcome>>(1);
        let handle = JobHandle {
            name: "reconcile_completeness",
            rx,
        };
        let err = handle.join_timeout(Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, CacheError::Execution(ExecutionError::Timeout { duration_ms: 10 })));
    }
}
