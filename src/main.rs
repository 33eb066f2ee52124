use std::path::PathBuf;
use std::process::exit;

use clap::Parser;
use log::{error, info};

use product_harvester_lib::{logger, pipeline, DedupKey, PipelineConfig};

#[derive(Parser)]
#[command(name = "product-harvester")]
#[command(about = "Partitions a product harvest into page-range jobs, runs them in parallel, then dedups and archives the output")]
struct Cli {
    /// Work list file, one "<min>,<max>" page range per line
    #[arg(long, default_value = "page_ranges.csv")]
    work_list: PathBuf,

    /// Scraper invocation; "-p <range> -o <file> --fresh-session" is appended
    #[arg(long, default_value = "python3 scripts/scrape_shop.py")]
    worker: String,

    /// Directory the workers write their output into
    #[arg(long, default_value = ".")]
    work_dir: PathBuf,

    /// Persistent storage for the raw output files
    #[arg(long, default_value = "../data")]
    data_dir: PathBuf,

    /// Cap on concurrent workers (default: launch everything at once)
    #[arg(long)]
    max_workers: Option<usize>,

    /// Abort when work-list ranges overlap instead of warning
    #[arg(long)]
    strict_ranges: bool,

    /// Duplicate identity: "full" (whole row) or "name" (normalized name column)
    #[arg(long, default_value = "full")]
    dedup_key: String,

    /// Where to write the JSON run summary
    #[arg(long, default_value = "run_summary.json")]
    summary_file: PathBuf,
}

fn main() {
    logger::init();
    let cli = Cli::parse();

    let dedup_key = match cli.dedup_key.as_str() {
        "full" => DedupKey::FullRecord,
        "name" => DedupKey::NormalizedName,
        other => {
            error!("Unknown dedup key {:?} (expected 'full' or 'name')", other);
            exit(2);
        }
    };

    let config = PipelineConfig {
        work_list: cli.work_list,
        worker_cmd: cli.worker,
        work_dir: cli.work_dir,
        data_dir: cli.data_dir,
        max_workers: cli.max_workers,
        strict_ranges: cli.strict_ranges,
        dedup_key,
        summary_file: Some(cli.summary_file),
    };

    match pipeline::run(&config) {
        Ok(summary) if summary.all_ok() => {
            info!("All {} tasks archived cleanly.", summary.tasks.len());
        }
        Ok(_) => {
            // Everything processable was processed; the failures are in the
            // summary and the exit code reflects them.
            exit(1);
        }
        Err(e) => {
            error!("{}", e);
            exit(1);
        }
    }
}
