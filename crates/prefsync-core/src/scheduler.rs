//! Single background timer thread for deferred and periodic jobs.
//!
//! The thread runs a current-thread tokio runtime that waits on a command
//! channel and two timers:
//!
//! - a one-shot flush deadline. Arming it again replaces the pending
//!   deadline rather than adding a second one.
//! - an optional fixed-interval sync tick.
//!
//! Jobs are delivered to a [`JobRunner`] held weakly, so the scheduler never
//! keeps its owner alive. Once the runner is gone the thread exits.

use std::future;
use std::sync::{Arc, OnceLock, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::SyncResult;

/// Work the timer thread hands to its runner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Job {
    /// The flush armed with this generation number has come due.
    Flush { generation: u64 },
    /// The periodic sync interval has elapsed.
    Sync,
}

/// Receiver of scheduled jobs. Runs on the timer thread.
pub trait JobRunner: Send + Sync {
    fn run_job(&self, job: Job);
}

/// Cap for timer deadlines; far enough out to mean "never".
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

type RunnerSlot = Arc<OnceLock<Weak<dyn JobRunner>>>;

enum Command {
    ArmFlush { generation: u64, after: Duration },
    CancelFlush,
    StartSync { every: Duration },
    Shutdown,
}

/// Handle to the timer thread. Dropping it stops the thread.
pub struct Scheduler {
    commands: mpsc::UnboundedSender<Command>,
    runner: RunnerSlot,
    thread: Option<JoinHandle<()>>,
}

impl Scheduler {
    /// Start the timer thread. Jobs that come due before a runner is
    /// [bound](Self::bind) are skipped.
    pub fn spawn() -> SyncResult<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let runner: RunnerSlot = Arc::new(OnceLock::new());
        let slot = Arc::clone(&runner);

        let thread = thread::Builder::new()
            .name("prefsync-timer".into())
            .spawn(move || runtime.block_on(run_loop(rx, slot)))?;

        info!("scheduler started");
        Ok(Self {
            commands: tx,
            runner,
            thread: Some(thread),
        })
    }

    /// Attach the job runner. Only the first call has an effect; returns
    /// whether this call bound it.
    pub fn bind(&self, runner: Weak<dyn JobRunner>) -> bool {
        self.runner.set(runner).is_ok()
    }

    /// Schedule the flush job `after` from now, replacing any pending one.
    pub fn arm_flush(&self, generation: u64, after: Duration) {
        self.send(Command::ArmFlush { generation, after });
    }

    /// Drop the pending flush job, if any.
    pub fn cancel_flush(&self) {
        self.send(Command::CancelFlush);
    }

    /// Run the sync job every `every`, first after one full period.
    /// Replaces any earlier interval.
    pub fn start_sync(&self, every: Duration) {
        self.send(Command::StartSync { every });
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            warn!("scheduler thread has exited; command dropped");
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        let Some(thread) = self.thread.take() else {
            return;
        };
        // A job can drop the last owner from the timer thread itself; joining
        // there would wait on ourselves.
        if thread.thread().id() == thread::current().id() {
            return;
        }
        if thread.join().is_err() {
            warn!("scheduler thread panicked");
        }
    }
}

async fn run_loop(mut commands: mpsc::UnboundedReceiver<Command>, runner: RunnerSlot) {
    let mut flush: Option<(Instant, u64)> = None;
    let mut sync: Option<Interval> = None;

    loop {
        let flush_at = flush.map(|(at, _)| at);
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::ArmFlush { generation, after }) => {
                    flush = Some((deadline(after), generation));
                }
                Some(Command::CancelFlush) => flush = None,
                Some(Command::StartSync { every }) => {
                    let every = every.min(FAR_FUTURE);
                    let mut interval = time::interval_at(deadline(every), every);
                    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    sync = Some(interval);
                }
                Some(Command::Shutdown) | None => break,
            },
            _ = sleep_until(flush_at), if flush_at.is_some() => {
                if let Some((_, generation)) = flush.take() {
                    if !dispatch(&runner, Job::Flush { generation }) {
                        break;
                    }
                }
            }
            _ = tick(&mut sync), if sync.is_some() => {
                if !dispatch(&runner, Job::Sync) {
                    break;
                }
            }
        }
    }
    debug!("scheduler loop exited");
}

/// `after` from now, saturating instead of overflowing the clock.
fn deadline(after: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(after)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

async fn sleep_until(at: Option<Instant>) {
    match at {
        Some(at) => time::sleep_until(at).await,
        None => future::pending().await,
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => future::pending().await,
    }
}

/// Run `job`. Returns `false` once the runner has been dropped.
fn dispatch(runner: &OnceLock<Weak<dyn JobRunner>>, job: Job) -> bool {
    let Some(weak) = runner.get() else {
        debug!(?job, "no runner bound; job skipped");
        return true;
    };
    match weak.upgrade() {
        Some(runner) => {
            runner.run_job(job);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Instant as StdInstant;

    #[derive(Default)]
    struct Recorder {
        jobs: Mutex<Vec<(Job, StdInstant)>>,
    }

    impl JobRunner for Recorder {
        fn run_job(&self, job: Job) {
            self.jobs.lock().unwrap().push((job, StdInstant::now()));
        }
    }

    impl Recorder {
        fn jobs(&self) -> Vec<Job> {
            self.jobs.lock().unwrap().iter().map(|(j, _)| *j).collect()
        }
    }

    fn bound() -> (Scheduler, Arc<Recorder>) {
        let scheduler = Scheduler::spawn().unwrap();
        let recorder = Arc::new(Recorder::default());
        let weak: Weak<dyn JobRunner> = Arc::downgrade(&recorder) as Weak<dyn JobRunner>;
        assert!(scheduler.bind(weak));
        (scheduler, recorder)
    }

    #[test]
    fn flush_fires_once_after_delay() {
        let (scheduler, recorder) = bound();
        let start = StdInstant::now();
        scheduler.arm_flush(1, Duration::from_millis(50));

        thread::sleep(Duration::from_millis(250));
        let jobs = recorder.jobs.lock().unwrap().clone();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].0, Job::Flush { generation: 1 });
        assert!(jobs[0].1.duration_since(start) >= Duration::from_millis(50));
    }

    #[test]
    fn rearming_replaces_pending_flush() {
        let (scheduler, recorder) = bound();
        scheduler.arm_flush(1, Duration::from_millis(80));
        scheduler.arm_flush(2, Duration::from_millis(40));

        thread::sleep(Duration::from_millis(300));
        assert_eq!(recorder.jobs(), vec![Job::Flush { generation: 2 }]);
    }

    #[test]
    fn cancelled_flush_never_fires() {
        let (scheduler, recorder) = bound();
        scheduler.arm_flush(1, Duration::from_millis(60));
        scheduler.cancel_flush();

        thread::sleep(Duration::from_millis(200));
        assert!(recorder.jobs().is_empty());
    }

    #[test]
    fn periodic_sync_repeats() {
        let (scheduler, recorder) = bound();
        scheduler.start_sync(Duration::from_millis(30));

        thread::sleep(Duration::from_millis(250));
        // Restarting replaces the old interval rather than adding one.
        scheduler.start_sync(Duration::from_secs(3600));
        let count = recorder.jobs().iter().filter(|j| **j == Job::Sync).count();
        assert!(count >= 3, "expected at least 3 syncs, got {count}");

        thread::sleep(Duration::from_millis(50));
        let settled = recorder.jobs().len();
        thread::sleep(Duration::from_millis(150));
        assert_eq!(recorder.jobs().len(), settled);
    }

    #[test]
    fn unbound_jobs_are_skipped() {
        let scheduler = Scheduler::spawn().unwrap();
        scheduler.arm_flush(1, Duration::from_millis(10));
        thread::sleep(Duration::from_millis(80));

        let recorder = Arc::new(Recorder::default());
        let weak: Weak<dyn JobRunner> = Arc::downgrade(&recorder) as Weak<dyn JobRunner>;
        scheduler.bind(weak);
        thread::sleep(Duration::from_millis(50));
        assert!(recorder.jobs().is_empty());
    }

    #[test]
    fn oversized_delays_do_not_panic() {
        let (scheduler, recorder) = bound();
        scheduler.arm_flush(1, Duration::MAX);
        scheduler.start_sync(Duration::MAX);
        scheduler.arm_flush(2, Duration::from_millis(20));

        thread::sleep(Duration::from_millis(150));
        assert_eq!(recorder.jobs(), vec![Job::Flush { generation: 2 }]);
        assert!(!scheduler.thread.as_ref().unwrap().is_finished());
    }

    #[test]
    fn second_bind_is_ignored() {
        let (scheduler, _recorder) = bound();
        let other = Arc::new(Recorder::default());
        let weak: Weak<dyn JobRunner> = Arc::downgrade(&other) as Weak<dyn JobRunner>;
        assert!(!scheduler.bind(weak));
    }

    #[test]
    fn thread_exits_when_runner_is_gone() {
        let (scheduler, recorder) = bound();
        drop(recorder);
        scheduler.arm_flush(1, Duration::from_millis(10));
        thread::sleep(Duration::from_millis(80));
        assert!(scheduler.thread.as_ref().unwrap().is_finished());
    }

    #[test]
    fn drop_stops_thread() {
        let (scheduler, _recorder) = bound();
        scheduler.start_sync(Duration::from_millis(10));
        let started = StdInstant::now();
        drop(scheduler);
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
