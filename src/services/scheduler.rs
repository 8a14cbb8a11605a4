//! Lifecycle Scheduler: periodic background jobs guarded by a cluster-wide lease.

use std::{
    future::Future,
    sync::Arc,
    time::{Duration, SystemTime},
};

use tokio::{
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, info, warn};

use crate::{
    dao::{game_store::GameStore, lock::DistributedLock},
    state::{
        SharedState,
        game::{GameId, GameStatus},
    },
};

/// Lock key and job name of the stale game sweep.
pub const GAME_EXPIRY_JOB: &str = "game-expiry";

/// A named job run every `interval`, at most once at a time across the fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodicJob {
    /// Lock key and log name.
    pub name: &'static str,
    /// Pause between two runs.
    pub interval: Duration,
    /// Lease length; a crashed holder blocks others for at most this long.
    pub lock_ttl: Duration,
}

/// Games moved to a terminal status by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Podium games marked completed.
    pub completed: u64,
    /// Other games marked expired.
    pub expired: u64,
}

/// Run `work` once if the job's lock can be taken. Returns whether it ran.
pub async fn run_once<F, Fut>(job: &PeriodicJob, lock: &dyn DistributedLock, work: F) -> bool
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = ()>,
{
    match lock.try_acquire(job.name, job.lock_ttl).await {
        Ok(true) => {}
        Ok(false) => {
            debug!(job = job.name, "lock held by another instance; skipping run");
            return false;
        }
        Err(err) => {
            warn!(job = job.name, error = %err, "failed to acquire job lock; skipping run");
            return false;
        }
    }

    work().await;

    if let Err(err) = lock.release(job.name).await {
        // the lease still expires on its own
        warn!(job = job.name, error = %err, "failed to release job lock");
    }
    true
}

/// Drive `work` every `job.interval` forever.
pub async fn run_periodic<F, Fut>(job: PeriodicJob, lock: Arc<dyn DistributedLock>, mut work: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut ticker = interval(job.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(job = job.name, interval_secs = job.interval.as_secs(), "periodic job started");
    loop {
        ticker.tick().await;
        run_once(&job, lock.as_ref(), &mut work).await;
    }
}

/// Finalize games left untouched for longer than `stale_after`.
///
/// Podium games become `Completed`; games stuck anywhere else but quit become
/// `Expired`. Failures are logged and left to the next sweep.
pub async fn sweep_stale_games(
    store: &dyn GameStore,
    now: SystemTime,
    stale_after: Duration,
) -> SweepReport {
    let before = now.checked_sub(stale_after).unwrap_or(SystemTime::UNIX_EPOCH);

    let completed = match store.find_stale_podium_games(before).await {
        Ok(ids) => finalize(store, ids, GameStatus::Completed, before, now).await,
        Err(err) => {
            warn!(error = %err, "failed to query stale podium games");
            0
        }
    };
    let expired = match store.find_stale_active_games(before).await {
        Ok(ids) => finalize(store, ids, GameStatus::Expired, before, now).await,
        Err(err) => {
            warn!(error = %err, "failed to query stale active games");
            0
        }
    };

    let report = SweepReport { completed, expired };
    if report != SweepReport::default() {
        info!(completed, expired, "stale games finalized");
    } else {
        debug!("no stale games");
    }
    report
}

async fn finalize(
    store: &dyn GameStore,
    ids: Vec<GameId>,
    status: GameStatus,
    before: SystemTime,
    now: SystemTime,
) -> u64 {
    if ids.is_empty() {
        return 0;
    }
    let candidates = ids.len();
    match store.update_game_statuses(ids, status, before, now).await {
        Ok(updated) => updated,
        Err(err) => {
            warn!(status = status.as_str(), candidates, error = %err, "failed to finalize stale games");
            0
        }
    }
}

/// Spawn the `game-expiry` sweep on the configured interval.
pub fn spawn_expiry_job(state: SharedState) -> JoinHandle<()> {
    let lifecycle = state.config().lifecycle.clone();
    let job = PeriodicJob {
        name: GAME_EXPIRY_JOB,
        interval: lifecycle.expiry_sweep_interval,
        lock_ttl: lifecycle.lock_ttl,
    };
    let lock = Arc::clone(state.lock());
    tokio::spawn(run_periodic(job, lock, move || {
        let state = state.clone();
        async move {
            sweep_stale_games(state.store().as_ref(), state.now(), lifecycle.stale_after).await;
        }
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::dao::lock::InMemoryLock;

    const JOB: PeriodicJob = PeriodicJob {
        name: "test-job",
        interval: Duration::from_secs(60),
        lock_ttl: Duration::from_secs(30),
    };

    #[tokio::test]
    async fn run_once_releases_the_lock_afterwards() {
        let lock = InMemoryLock::new();
        let runs = AtomicUsize::new(0);

        assert!(run_once(&JOB, &lock, || async { runs.fetch_add(1, Ordering::SeqCst); }).await);
        assert!(run_once(&JOB, &lock, || async { runs.fetch_add(1, Ordering::SeqCst); }).await);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn run_once_skips_while_another_instance_holds_the_lock() {
        let holder = InMemoryLock::new();
        let contender = InMemoryLock::shared_with(&holder);
        assert!(holder.try_acquire(JOB.name, JOB.lock_ttl).await.unwrap());

        let ran = run_once(&JOB, &contender, || async {
            panic!("work must not run without the lock");
        })
        .await;
        assert!(!ran);
    }
}
