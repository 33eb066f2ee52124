use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use log::{error, info, warn};
use uuid::Uuid;

use crate::archiver;
use crate::deduplicator::{DedupKey, Deduplicator};
use crate::error::Result;
use crate::job_manager::{JobManager, WorkerResult};
use crate::output_collector;
use crate::work_loader;

pub struct PipelineConfig {
    pub work_list: PathBuf,
    // Scraper invocation; range/output/session flags are appended per task.
    pub worker_cmd: String,
    // Directory the workers write their output files into.
    pub work_dir: PathBuf,
    // Persistent storage the raw outputs are moved to.
    pub data_dir: PathBuf,
    // None = launch every task at once.
    pub max_workers: Option<usize>,
    // Overlapping ranges abort the run instead of logging a warning.
    pub strict_ranges: bool,
    pub dedup_key: DedupKey,
    pub summary_file: Option<PathBuf>,
}

#[derive(Clone, serde::Serialize)]
pub struct TaskReport {
    pub range: String,
    pub output_file: String,
    pub worker: String,
    pub worker_ok: bool,
    pub status: String, // "archived", "dedup_failed", "archive_failed", "missing_output", "launch_failed"
    pub worker_exit: Option<i32>,
    pub deduped_file: Option<String>,
    pub archived_to: Option<String>,
    pub unique_rows: Option<usize>,
    pub error: Option<String>,
}

#[derive(Clone, serde::Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub tasks: Vec<TaskReport>,
    pub stale_outputs: Vec<String>,
}

impl RunSummary {
    pub fn all_ok(&self) -> bool {
        self.tasks
            .iter()
            .all(|t| t.worker_ok && t.status == "archived")
    }

    fn save(&self, path: &Path) {
        let json = match serde_json::to_string_pretty(self) {
            Ok(j) => j,
            Err(e) => {
                error!("Failed to serialize run summary: {}", e);
                return;
            }
        };
        if let Err(e) = fs::write(path, json) {
            error!("Failed to write run summary to {:?}: {}", path, e);
        } else {
            info!("Run summary written to {:?}", path);
        }
    }
}

pub fn run(config: &PipelineConfig) -> Result<RunSummary> {
    let run_id = Uuid::new_v4().to_string();
    let started_at = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    info!("Starting harvest run {}", run_id);

    // 1. Read the work list. Any malformed line aborts before a single
    // launch: a partially-launched batch with an unknown total is unsafe.
    let ranges = work_loader::load_ranges(&config.work_list)?;
    if ranges.is_empty() {
        warn!("Work list is empty; nothing to do.");
    }

    // 2. Range sanity check.
    match work_loader::validate_disjoint(&ranges) {
        Ok(()) => {}
        Err(e) if config.strict_ranges => return Err(e),
        Err(e) => warn!("{} (continuing; overlapping outputs may diverge)", e),
    }

    // 3. Fan out one worker per range and wait for all of them.
    let manager = JobManager::new(&config.worker_cmd, &config.work_dir, config.max_workers);
    let outcomes = manager.run_all(&ranges);

    // 4. Resolve the output files this run actually produced.
    let expected: Vec<String> = outcomes
        .iter()
        .filter(|o| o.launched())
        .map(|o| o.output_file.clone())
        .collect();
    let collected = output_collector::collect(&config.work_dir, &expected)?;
    let present: HashSet<String> = collected
        .present
        .iter()
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .collect();

    // 5. Dedup then archive, one file at a time. A failure only skips that
    // file; everything else still gets processed.
    let dedup = Deduplicator::new(config.dedup_key);
    let mut tasks = Vec::with_capacity(outcomes.len());
    for outcome in &outcomes {
        let mut report = TaskReport {
            range: outcome.range.to_string(),
            output_file: outcome.output_file.clone(),
            worker: outcome.describe(),
            worker_ok: outcome.clean_exit(),
            status: String::new(),
            worker_exit: match &outcome.result {
                WorkerResult::Exited(code) => *code,
                _ => None,
            },
            deduped_file: None,
            archived_to: None,
            unique_rows: None,
            error: None,
        };

        if !outcome.launched() {
            report.status = "launch_failed".to_string();
            report.error = Some(outcome.describe());
            tasks.push(report);
            continue;
        }
        if !present.contains(&outcome.output_file) {
            report.status = "missing_output".to_string();
            tasks.push(report);
            continue;
        }

        let src = config.work_dir.join(&outcome.output_file);
        let deduped_name = outcome.range.deduped_filename();
        match dedup.dedup_file(&src, &config.work_dir.join(&deduped_name)) {
            Ok(rows) => {
                report.deduped_file = Some(deduped_name);
                report.unique_rows = Some(rows);
                match archiver::archive(&src, &config.data_dir) {
                    Ok(dest) => {
                        report.status = "archived".to_string();
                        report.archived_to = Some(dest.display().to_string());
                    }
                    Err(e) => {
                        error!("{}", e);
                        report.status = "archive_failed".to_string();
                        report.error = Some(e.to_string());
                    }
                }
            }
            Err(e) => {
                error!("{}", e);
                report.status = "dedup_failed".to_string();
                report.error = Some(e.to_string());
            }
        }
        tasks.push(report);
    }

    let summary = RunSummary {
        run_id,
        started_at,
        finished_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        tasks,
        stale_outputs: collected.stale,
    };

    // 6. End-of-run summary.
    let archived = summary.tasks.iter().filter(|t| t.status == "archived").count();
    info!(
        "Run {} finished: {} / {} files archived",
        summary.run_id,
        archived,
        summary.tasks.len()
    );
    for task in &summary.tasks {
        if task.status == "archived" && task.worker_ok {
            info!(
                "  pages {}: archived ({} unique rows, deduped copy {})",
                task.range,
                task.unique_rows.unwrap_or(0),
                task.deduped_file.as_deref().unwrap_or("-")
            );
        } else {
            warn!(
                "  pages {}: {} (worker: {}){}",
                task.range,
                task.status,
                task.worker,
                task.error
                    .as_deref()
                    .map(|e| format!(" - {}", e))
                    .unwrap_or_default()
            );
        }
    }

    if let Some(path) = &config.summary_file {
        summary.save(path);
    }

    Ok(summary)
}
