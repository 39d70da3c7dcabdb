//! Minute-granularity job scheduler.
//!
//! A cursor advances one minute at a time; every job whose schedule matches
//! the cursor runs once. One-time jobs are removed after they run and are the
//! only jobs persisted across restarts.

mod job;
mod tab;

pub use job::{CronError, CronJob, CronSpec, DeferredCommand, JobAction, JobId, Schedule, TIME_FORMAT};
pub use tab::CronTab;

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime, Timelike};
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};

use crate::db::KvStore;
use crate::message::Jid;
use crate::util::panic_message;

const STORE_KEY: &str = "cron.onetime";
const STORE_VERSION: u32 = 1;

/// Executes a fired job. Implemented by the bot, faked in tests.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run_job(
        &self,
        job: &CronJob,
    ) -> Result<Option<String>, Box<dyn std::error::Error + Send + Sync>>;
}

#[derive(Serialize, Deserialize)]
struct StoredJobs {
    version: u32,
    jobs: Vec<CronJob>,
}

pub fn truncate_to_minute(dt: NaiveDateTime) -> NaiveDateTime {
    dt.with_second(0)
        .and_then(|d| d.with_nanosecond(0))
        .unwrap_or(dt)
}

pub fn now_minute() -> NaiveDateTime {
    truncate_to_minute(Local::now().naive_local())
}

/// Clears the running flag when the loop exits, however it exits.
struct RunningFlag<'a>(&'a AtomicBool);

impl Drop for RunningFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct Cron {
    table: Mutex<CronTab>,
    store: Option<Arc<dyn KvStore>>,
    poll_interval: Duration,
    running: AtomicBool,
    stop_requested: AtomicBool,
}

impl Cron {
    pub fn new(store: Option<Arc<dyn KvStore>>) -> Self {
        Self {
            table: Mutex::new(CronTab::new()),
            store,
            poll_interval: Duration::from_secs(1),
            running: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
        }
    }

    /// How often the wait for the next minute re-checks the stop flag.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn add_recurring(
        &self,
        name: &str,
        action: JobAction,
        spec: &CronSpec,
        owner: Option<Jid>,
    ) -> Result<(), CronError> {
        let schedule = Schedule::recurring(spec)?;
        log::debug!(
            "Registering cron job \"{}\" ({}) to run at \"{}\"",
            name,
            action.describe(),
            schedule
        );
        self.table.lock().unwrap().add(CronJob {
            name: JobId::Named(name.to_string()),
            action,
            schedule,
            owner,
        })
    }

    pub fn add_onetime(&self, action: JobAction, at: NaiveDateTime, owner: Option<Jid>) -> JobId {
        let id = {
            let mut table = self.table.lock().unwrap();
            let id = table.next_id();
            let job = CronJob {
                name: id.clone(),
                action,
                schedule: Schedule::OneTime {
                    at: truncate_to_minute(at),
                },
                owner,
            };
            // next_id() is unused by construction
            let _ = table.add(job);
            id
        };
        log::info!("Scheduled one-time job {} at {}", id, at.format(TIME_FORMAT));
        self.sync();
        id
    }

    pub fn remove(&self, name: &JobId) -> Option<CronJob> {
        let removed = self.table.lock().unwrap().remove(name);
        if removed.as_ref().map(|j| j.is_onetime()).unwrap_or(false) {
            self.sync();
        }
        removed
    }

    /// Drop a one-time job after it ran, unless it was deleted meanwhile and
    /// its id handed to a new job.
    fn remove_fired(&self, job: &CronJob) {
        let removed = self.table.lock().unwrap().remove_if_same(job);
        if removed.is_some() {
            self.sync();
        }
    }

    pub fn get(&self, name: &JobId) -> Option<CronJob> {
        self.table.lock().unwrap().get(name).cloned()
    }

    pub fn contains(&self, name: &JobId) -> bool {
        self.table.lock().unwrap().contains(name)
    }

    pub fn jobs(&self) -> Vec<CronJob> {
        self.table.lock().unwrap().all()
    }

    pub fn len(&self) -> usize {
        self.table.lock().unwrap().len()
    }

    /// Remove jobs of one plugin, or every recurring job when `plugin` is
    /// `None`. Pending one-time jobs survive a plain reset.
    pub fn reset(&self, plugin: Option<&str>) {
        let removed = match plugin {
            Some(name) => {
                log::info!("Removing cron jobs of plugin {}", name);
                self.table.lock().unwrap().remove_plugin(name)
            }
            None => {
                log::info!("Reinitializing crontab");
                self.table.lock().unwrap().clear_recurring()
            }
        };
        log::debug!("Removed {} cron job(s)", removed);
    }

    /// One line per job, for logs and the job listing command.
    pub fn display_cronjobs(&self) -> Vec<String> {
        self.jobs()
            .iter()
            .map(|job| {
                let owner = job.action.plugin().unwrap_or("bot");
                format!("{} [{}]: {}", job.name, owner, job.schedule)
            })
            .collect()
    }

    /// Restore persisted one-time jobs. Called once at startup.
    pub fn load(&self) {
        let store = match &self.store {
            Some(s) => s,
            None => return,
        };

        let raw = match store.get(STORE_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return,
            Err(e) => {
                log::error!("Could not load cron jobs from persistent DB: {}", e);
                return;
            }
        };

        let stored: StoredJobs = match serde_json::from_str(&raw) {
            Ok(s) => s,
            Err(e) => {
                log::error!("Could not parse persisted cron jobs: {}", e);
                return;
            }
        };

        if stored.version != STORE_VERSION {
            log::warn!(
                "Ignoring persisted cron jobs with unsupported version {}",
                stored.version
            );
            return;
        }

        let mut table = self.table.lock().unwrap();
        let mut loaded = 0;
        for job in stored.jobs.into_iter().filter(|j| j.is_onetime()) {
            match table.add(job) {
                Ok(()) => loaded += 1,
                Err(e) => log::warn!("Skipping persisted job: {}", e),
            }
        }
        log::info!("Loaded {} one-time job(s) from persistent DB", loaded);
    }

    /// Write the current set of one-time jobs to the store.
    pub fn sync(&self) {
        let store = match &self.store {
            Some(s) => s,
            None => return,
        };

        let stored = StoredJobs {
            version: STORE_VERSION,
            jobs: self.table.lock().unwrap().onetime_jobs(),
        };

        if let Err(e) = Self::persist(store.as_ref(), &stored) {
            log::error!("Could not persist cron jobs: {}", e);
        }
    }

    fn persist(
        store: &dyn KvStore,
        stored: &StoredJobs,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let json = serde_json::to_string(stored)?;
        store.set(STORE_KEY, &json)?;
        store.sync()
    }

    fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run every job matching `cursor`. Returns how many ran.
    pub async fn tick(&self, cursor: NaiveDateTime, runner: &dyn JobRunner) -> usize {
        let due = self.table.lock().unwrap().due(cursor);
        let mut ran = 0;

        for job in due {
            if self.stop_requested() {
                break;
            }
            // Deleted by a user while earlier jobs were running
            if !self.contains(&job.name) {
                continue;
            }

            log::info!(
                "Running cron job \"{}\" ({}) with schedule \"{}\"",
                job.name,
                job.action.describe(),
                job.schedule
            );
            match AssertUnwindSafe(runner.run_job(&job)).catch_unwind().await {
                Ok(Ok(Some(out))) => log::debug!("Cron job \"{}\" output: \"{}\"", job.name, out),
                Ok(Ok(None)) => {}
                Ok(Err(e)) => log::error!("Cron job \"{}\" failed: {}", job.name, e),
                Err(panic) => log::error!(
                    "Cron job \"{}\" panicked: {}",
                    job.name,
                    panic_message(&*panic)
                ),
            }
            ran += 1;

            if job.is_onetime() {
                self.remove_fired(&job);
            }
        }

        ran
    }

    /// Scheduler loop. Returns once [`Cron::stop`] has been requested.
    pub async fn run(self: Arc<Self>, runner: Arc<dyn JobRunner>) {
        log::info!("Starting cron");
        self.running.store(true, Ordering::SeqCst);
        let _running = RunningFlag(&self.running);

        let mut cursor = now_minute();
        while !self.stop_requested() {
            self.tick(cursor, runner.as_ref()).await;
            cursor += chrono::Duration::minutes(1);

            while !self.stop_requested() && Local::now().naive_local() < cursor {
                tokio::time::sleep(self.poll_interval).await;
            }
        }

        log::info!("Cron stopped");
    }

    /// Ask the loop to exit and wait until it has. No job starts after this
    /// returns.
    pub async fn stop(&self) {
        log::info!("Stopping cron");
        self.stop_requested.store(true, Ordering::SeqCst);
        while self.is_running() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}
