use std::path::PathBuf;
use std::process::{Child, Command};
use std::thread;
use std::time::Duration;

use log::{error, info, warn};

use crate::error::Error;
use crate::work_loader::PageRange;

// Every worker gets a fresh browser session so page ranges never share state.
pub const FRESH_SESSION_FLAG: &str = "--fresh-session";

const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct JobManager {
    program: String,
    leading_args: Vec<String>,
    work_dir: PathBuf,
    max_workers: Option<usize>,
}

// Handle returned by launching; the child is still running (or never started).
pub struct LaunchedWorker {
    pub range: PageRange,
    pub output_file: String,
    handle: LaunchHandle,
}

enum LaunchHandle {
    Running(Child),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct WorkerOutcome {
    pub range: PageRange,
    pub output_file: String,
    pub result: WorkerResult,
}

#[derive(Debug, Clone)]
pub enum WorkerResult {
    // Exit code of the worker; None when it was terminated by a signal.
    Exited(Option<i32>),
    LaunchFailed(String),
    WaitFailed(String),
}

impl WorkerOutcome {
    pub fn launched(&self) -> bool {
        !matches!(self.result, WorkerResult::LaunchFailed(_))
    }

    pub fn clean_exit(&self) -> bool {
        matches!(self.result, WorkerResult::Exited(Some(0)))
    }

    pub fn describe(&self) -> String {
        match &self.result {
            WorkerResult::Exited(Some(code)) => format!("exit {}", code),
            WorkerResult::Exited(None) => "killed by signal".to_string(),
            WorkerResult::LaunchFailed(reason) => reason.clone(),
            WorkerResult::WaitFailed(reason) => format!("wait failed: {}", reason),
        }
    }
}

impl JobManager {
    // worker_cmd is the scraper invocation, e.g. "python3 scripts/scrape_shop.py".
    // The range, output file and session flags are appended per task.
    pub fn new<P: Into<PathBuf>>(worker_cmd: &str, work_dir: P, max_workers: Option<usize>) -> Self {
        let mut tokens = worker_cmd.split_whitespace().map(String::from);
        let program = tokens.next().unwrap_or_default();
        JobManager {
            program,
            leading_args: tokens.collect(),
            work_dir: work_dir.into(),
            max_workers,
        }
    }

    fn command_for(&self, range: &PageRange) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading_args)
            .arg("-p")
            .arg(range.page_arg())
            .arg("-o")
            .arg(range.output_filename())
            .arg(FRESH_SESSION_FLAG)
            .current_dir(&self.work_dir);
        cmd
    }

    // Launches and waits for every range, honoring the concurrency cap if one
    // was configured. Outcomes come back in work-list order.
    pub fn run_all(&self, ranges: &[PageRange]) -> Vec<WorkerOutcome> {
        match self.max_workers {
            None => Self::wait_all(self.launch_all(ranges)),
            Some(limit) => self.run_bounded(ranges, limit.max(1)),
        }
    }

    // Fan-out: one process per range, all at once. Spawning never blocks on a
    // worker; a failed spawn is logged and the rest still launch. Launching
    // everything simultaneously is a known scalability limit of this design.
    pub fn launch_all(&self, ranges: &[PageRange]) -> Vec<LaunchedWorker> {
        let mut workers = Vec::with_capacity(ranges.len());
        for range in ranges {
            let output_file = range.output_filename();
            let handle = match self.command_for(range).spawn() {
                Ok(child) => {
                    info!("Launched worker for pages {} -> {}", range, output_file);
                    LaunchHandle::Running(child)
                }
                Err(e) => {
                    let err = Error::Launch {
                        range: range.to_string(),
                        source: e,
                    };
                    error!("{}", err);
                    LaunchHandle::Failed(err.to_string())
                }
            };
            workers.push(LaunchedWorker {
                range: *range,
                output_file,
                handle,
            });
        }
        workers
    }

    // Fan-in: blocks until every launched worker has terminated. No timeout is
    // imposed; a worker that never exits stalls the pipeline.
    pub fn wait_all(workers: Vec<LaunchedWorker>) -> Vec<WorkerOutcome> {
        let running = workers
            .iter()
            .filter(|w| matches!(w.handle, LaunchHandle::Running(_)))
            .count();
        info!("Waiting for {} workers to finish...", running);

        let mut outcomes = Vec::with_capacity(workers.len());
        for worker in workers {
            let result = match worker.handle {
                LaunchHandle::Running(mut child) => match child.wait() {
                    Ok(status) => WorkerResult::Exited(status.code()),
                    Err(e) => {
                        error!("Could not wait on worker for pages {}: {}", worker.range, e);
                        WorkerResult::WaitFailed(e.to_string())
                    }
                },
                LaunchHandle::Failed(reason) => WorkerResult::LaunchFailed(reason),
            };
            let outcome = WorkerOutcome {
                range: worker.range,
                output_file: worker.output_file,
                result,
            };
            if outcome.launched() && !outcome.clean_exit() {
                warn!("Worker for pages {}: {}", outcome.range, outcome.describe());
            }
            outcomes.push(outcome);
        }
        info!("All workers finished.");
        outcomes
    }

    // Capped variant: keeps at most `limit` workers alive, refilling slots as
    // workers exit. The barrier contract is unchanged, only admission differs.
    fn run_bounded(&self, ranges: &[PageRange], limit: usize) -> Vec<WorkerOutcome> {
        info!(
            "Running {} tasks with at most {} concurrent workers",
            ranges.len(),
            limit
        );

        let mut outcomes: Vec<Option<WorkerOutcome>> = ranges.iter().map(|_| None).collect();
        let mut active: Vec<(usize, Child)> = Vec::new();

        for (idx, range) in ranges.iter().enumerate() {
            while active.len() >= limit {
                Self::reap_finished(&mut active, &mut outcomes, ranges);
                if active.len() >= limit {
                    thread::sleep(POLL_INTERVAL);
                }
            }

            match self.command_for(range).spawn() {
                Ok(child) => {
                    info!("Launched worker for pages {} -> {}", range, range.output_filename());
                    active.push((idx, child));
                }
                Err(e) => {
                    let err = Error::Launch {
                        range: range.to_string(),
                        source: e,
                    };
                    error!("{}", err);
                    outcomes[idx] = Some(WorkerOutcome {
                        range: *range,
                        output_file: range.output_filename(),
                        result: WorkerResult::LaunchFailed(err.to_string()),
                    });
                }
            }
        }

        // Everything is launched; drain the remainder with blocking waits.
        for (idx, mut child) in active {
            let result = match child.wait() {
                Ok(status) => WorkerResult::Exited(status.code()),
                Err(e) => WorkerResult::WaitFailed(e.to_string()),
            };
            outcomes[idx] = Some(WorkerOutcome {
                range: ranges[idx],
                output_file: ranges[idx].output_filename(),
                result,
            });
        }

        info!("All workers finished.");
        outcomes
            .into_iter()
            .map(|o| o.expect("every task resolves to an outcome"))
            .collect()
    }

    fn reap_finished(
        active: &mut Vec<(usize, Child)>,
        outcomes: &mut [Option<WorkerOutcome>],
        ranges: &[PageRange],
    ) {
        let mut i = 0;
        while i < active.len() {
            let result = match active[i].1.try_wait() {
                Ok(Some(status)) => Some(WorkerResult::Exited(status.code())),
                Ok(None) => None,
                Err(e) => Some(WorkerResult::WaitFailed(e.to_string())),
            };
            match result {
                Some(result) => {
                    let (idx, _) = active.swap_remove(i);
                    outcomes[idx] = Some(WorkerOutcome {
                        range: ranges[idx],
                        output_file: ranges[idx].output_filename(),
                        result,
                    });
                }
                None => i += 1,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn ranges(n: u32) -> Vec<PageRange> {
        (0..n)
            .map(|i| PageRange {
                min: i * 50 + 1,
                max: (i + 1) * 50,
            })
            .collect()
    }

    #[test]
    fn runs_one_worker_per_range_with_distinct_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let manager = JobManager::new("true", dir.path(), None);
        let outcomes = manager.run_all(&ranges(3));

        assert_eq!(outcomes.len(), 3);
        let mut files: Vec<&str> = outcomes.iter().map(|o| o.output_file.as_str()).collect();
        files.sort();
        files.dedup();
        assert_eq!(files.len(), 3);
        assert!(outcomes.iter().all(|o| o.clean_exit()));
    }

    #[test]
    fn captures_nonzero_exit_status() {
        let dir = tempfile::tempdir().unwrap();
        let manager = JobManager::new("false", dir.path(), None);
        let outcomes = manager.run_all(&ranges(1));

        assert!(outcomes[0].launched());
        assert!(!outcomes[0].clean_exit());
        assert!(matches!(outcomes[0].result, WorkerResult::Exited(Some(1))));
    }

    #[test]
    fn launch_failure_does_not_stop_remaining_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let manager = JobManager::new("no-such-binary-for-sure", dir.path(), None);
        let outcomes = manager.run_all(&ranges(2));

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes
            .iter()
            .all(|o| matches!(o.result, WorkerResult::LaunchFailed(_))));
    }

    #[test]
    fn barrier_blocks_until_all_workers_exit() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("slow_worker.sh");
        std::fs::write(&script, "sleep 0.3\n").unwrap();
        let manager = JobManager::new(&format!("sh {}", script.display()), dir.path(), None);

        let start = Instant::now();
        let outcomes = manager.run_all(&ranges(2));
        let elapsed = start.elapsed();

        assert!(outcomes.iter().all(|o| o.clean_exit()));
        assert!(
            elapsed >= Duration::from_millis(250),
            "barrier released early: {:?}",
            elapsed
        );
    }

    #[test]
    fn bounded_mode_completes_every_task() {
        let dir = tempfile::tempdir().unwrap();
        let manager = JobManager::new("true", dir.path(), Some(1));
        let outcomes = manager.run_all(&ranges(4));

        assert_eq!(outcomes.len(), 4);
        assert!(outcomes.iter().all(|o| o.clean_exit()));
        // Work-list order is preserved.
        assert_eq!(outcomes[0].range, PageRange { min: 1, max: 50 });
        assert_eq!(outcomes[3].range, PageRange { min: 151, max: 200 });
    }
}
