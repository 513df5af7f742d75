// crates/jobs/src/registry.rs
//! In-memory table of job id -> status.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::Utc;

use crate::types::{JobId, JobStatus};

/// Authoritative, thread-safe store of every job's status.
///
/// Readers copy the record out under the shared lock; writers hold the
/// exclusive lock only for the mutation itself. No method awaits or does I/O
/// while holding the lock.
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, JobStatus>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the record for `status.id`.
    pub fn put(&self, status: JobStatus) {
        self.write().insert(status.id, status);
    }

    /// Owned copy of the current record, if any.
    pub fn get(&self, id: &JobId) -> Option<JobStatus> {
        self.read().get(id).cloned()
    }

    /// Apply `f` to the record under the write lock.
    ///
    /// Returns `None` when the id is unknown (e.g. already swept).
    pub fn mutate<F, R>(&self, id: &JobId, f: F) -> Option<R>
    where
        F: FnOnce(&mut JobStatus) -> R,
    {
        self.write().get_mut(id).map(f)
    }

    /// Remove terminal records whose `start_time` is older than `older_than`.
    ///
    /// Pending and processing jobs are never removed. Returns how many records
    /// were dropped.
    pub fn sweep(&self, older_than: Duration) -> usize {
        let threshold = chrono::Duration::from_std(older_than)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age));
        let Some(threshold) = threshold else {
            // Age reaches before the representable range; nothing is that old.
            return 0;
        };

        let mut jobs = self.write();
        let before = jobs.len();
        jobs.retain(|_, status| !(status.is_terminal() && status.start_time < threshold));
        before - jobs.len()
    }

    /// Snapshots of every job that has not reached a terminal state.
    pub fn active(&self) -> Vec<JobStatus> {
        self.read()
            .values()
            .filter(|status| !status.is_terminal())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<JobId, JobStatus>> {
        self.jobs.read().unwrap_or_else(|e: PoisonError<_>| {
            tracing::error!("RwLock poisoned reading jobs map, recovering");
            e.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<JobId, JobStatus>> {
        self.jobs.write().unwrap_or_else(|e: PoisonError<_>| {
            tracing::error!("RwLock poisoned writing jobs map, recovering");
            e.into_inner()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::JobState;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn aged(state: JobState, age: chrono::Duration) -> JobStatus {
        let mut status = JobStatus::pending(JobId::new());
        status.start_time = Utc::now() - age;
        status.state = state;
        status
    }

    #[test]
    fn test_put_and_get() {
        let registry = JobRegistry::new();
        let status = JobStatus::pending(JobId::new());
        registry.put(status.clone());

        assert_eq!(registry.get(&status.id), Some(status));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_get_unknown_id() {
        let registry = JobRegistry::new();
        assert!(registry.get(&JobId::new()).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_put_overwrites() {
        let registry = JobRegistry::new();
        let mut status = JobStatus::pending(JobId::new());
        registry.put(status.clone());

        status.mark_processing();
        registry.put(status.clone());

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(&status.id).unwrap().state, JobState::Processing);
    }

    #[test]
    fn test_snapshots_do_not_alias() {
        let registry = JobRegistry::new();
        let id = JobId::new();
        registry.put(JobStatus::pending(id));

        let mut first = registry.get(&id).unwrap();
        first.progress = 99;
        first.error = Some("edited by caller".into());

        registry.mutate(&id, |s| s.apply_progress(10, None));
        let second = registry.get(&id).unwrap();

        assert_eq!(second.progress, 10);
        assert!(second.error.is_none());
        assert_eq!(first.progress, 99);
    }

    #[test]
    fn test_mutate_unknown_id() {
        let registry = JobRegistry::new();
        assert_eq!(registry.mutate(&JobId::new(), |s| s.mark_processing()), None);
    }

    #[test]
    fn test_sweep_only_old_terminal_records() {
        let registry = JobRegistry::new();
        let hour = chrono::Duration::hours(1);
        let old_done = aged(JobState::Completed, hour * 2);
        let old_failed = aged(JobState::Failed, hour * 2);
        let old_running = aged(JobState::Processing, hour * 2);
        let old_pending = aged(JobState::Pending, hour * 2);
        let fresh_done = aged(JobState::Completed, chrono::Duration::seconds(5));

        for s in [&old_done, &old_failed, &old_running, &old_pending, &fresh_done] {
            registry.put(s.clone());
        }

        let removed = registry.sweep(Duration::from_secs(3600));

        assert_eq!(removed, 2);
        assert!(registry.get(&old_done.id).is_none());
        assert!(registry.get(&old_failed.id).is_none());
        assert!(registry.get(&old_running.id).is_some());
        assert!(registry.get(&old_pending.id).is_some());
        assert!(registry.get(&fresh_done.id).is_some());
    }

    #[test]
    fn test_sweep_with_huge_age_removes_nothing() {
        let registry = JobRegistry::new();
        registry.put(aged(JobState::Completed, chrono::Duration::days(365)));
        assert_eq!(registry.sweep(Duration::MAX), 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_active_filters_terminal() {
        let registry = JobRegistry::new();
        let running = aged(JobState::Processing, chrono::Duration::zero());
        registry.put(running.clone());
        registry.put(aged(JobState::Failed, chrono::Duration::zero()));

        let active = registry.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, running.id);
    }

    #[test]
    fn test_concurrent_writers_and_readers() {
        let registry = Arc::new(JobRegistry::new());
        let id = JobId::new();
        let mut status = JobStatus::pending(id);
        status.mark_processing();
        registry.put(status);

        let handles: Vec<_> = (0..8u8)
            .map(|n| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        registry.mutate(&id, |s| s.apply_progress(n * 10, None));
                        let snap = registry.get(&id).unwrap();
                        assert!(snap.progress <= 100);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.get(&id).unwrap().state, JobState::Processing);
    }
}
