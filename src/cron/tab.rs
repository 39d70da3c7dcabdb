use std::collections::BTreeMap;

use chrono::NaiveDateTime;

use super::job::{CronError, CronJob, JobId};

/// The job table, keyed by unique job name.
#[derive(Debug, Default)]
pub struct CronTab {
    jobs: BTreeMap<JobId, CronJob>,
}

impl CronTab {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, job: CronJob) -> Result<(), CronError> {
        if self.jobs.contains_key(&job.name) {
            return Err(CronError::Duplicate(job.name));
        }
        self.jobs.insert(job.name.clone(), job);
        Ok(())
    }

    pub fn remove(&mut self, name: &JobId) -> Option<CronJob> {
        self.jobs.remove(name)
    }

    /// Remove `job` only if the table still holds that exact job under its
    /// name; a job re-added under a reused id is left alone.
    pub fn remove_if_same(&mut self, job: &CronJob) -> Option<CronJob> {
        if self.jobs.get(&job.name) != Some(job) {
            return None;
        }
        self.jobs.remove(&job.name)
    }

    pub fn get(&self, name: &JobId) -> Option<&CronJob> {
        self.jobs.get(name)
    }

    pub fn contains(&self, name: &JobId) -> bool {
        self.jobs.contains_key(name)
    }

    /// Highest numeric id plus one, starting at 1.
    pub fn next_id(&self) -> JobId {
        let max = self
            .jobs
            .keys()
            .filter_map(|id| match id {
                JobId::Seq(n) => Some(*n),
                JobId::Named(_) => None,
            })
            .max()
            .unwrap_or(0);
        JobId::Seq(max + 1)
    }

    /// Jobs matching `dt`, copied out so the table can change while they run.
    pub fn due(&self, dt: NaiveDateTime) -> Vec<CronJob> {
        self.jobs
            .values()
            .filter(|job| job.schedule.matches(dt))
            .cloned()
            .collect()
    }

    pub fn onetime_jobs(&self) -> Vec<CronJob> {
        self.jobs.values().filter(|j| j.is_onetime()).cloned().collect()
    }

    pub fn all(&self) -> Vec<CronJob> {
        self.jobs.values().cloned().collect()
    }

    /// Drop recurring jobs, keep pending one-time jobs.
    pub fn clear_recurring(&mut self) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|_, job| job.is_onetime());
        before - self.jobs.len()
    }

    pub fn remove_plugin(&mut self, plugin: &str) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|_, job| job.action.plugin() != Some(plugin));
        before - self.jobs.len()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }
}
