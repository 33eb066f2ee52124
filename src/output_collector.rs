use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{info, warn};
use regex::Regex;

// Raw worker output: products_<min>-<max>.csv. Deduped files deliberately
// don't match, so a second run never re-processes them.
const OUTPUT_PATTERN: &str = r"^products_\d+-\d+\.csv$";

#[derive(Debug)]
pub struct CollectedOutputs {
    // Expected files that exist, in work-list order.
    pub present: Vec<PathBuf>,
    // Expected files the workers never produced.
    pub missing: Vec<String>,
    // Pattern-matching files in the directory that no task of this run
    // claimed, lexicographic. Leftovers from earlier runs; not processed.
    pub stale: Vec<String>,
}

// Resolves this run's output files. The filename list carried forward from
// launch is authoritative; the directory scan only validates it, flagging
// stale files instead of picking them up.
pub fn collect<P: AsRef<Path>>(work_dir: P, expected: &[String]) -> io::Result<CollectedOutputs> {
    let work_dir = work_dir.as_ref();

    let mut present = Vec::new();
    let mut missing = Vec::new();
    for name in expected {
        let path = work_dir.join(name);
        if path.is_file() {
            present.push(path);
        } else {
            warn!("Expected output {} was never produced", name);
            missing.push(name.clone());
        }
    }

    let expected_set: HashSet<&str> = expected.iter().map(String::as_str).collect();
    let stale: Vec<String> = scan_dir(work_dir)?
        .into_iter()
        .filter(|name| !expected_set.contains(name.as_str()))
        .collect();
    for name in &stale {
        warn!("Ignoring stale output file {} from an earlier run", name);
    }

    info!(
        "Collected {} output files ({} missing, {} stale)",
        present.len(),
        missing.len(),
        stale.len()
    );
    Ok(CollectedOutputs {
        present,
        missing,
        stale,
    })
}

// Lists every file in the directory matching the output naming convention,
// sorted lexicographically so the result is deterministic.
pub fn scan_dir<P: AsRef<Path>>(work_dir: P) -> io::Result<Vec<String>> {
    let pattern = Regex::new(OUTPUT_PATTERN).unwrap();

    let mut matches = Vec::new();
    for entry in fs::read_dir(work_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if pattern.is_match(&name) {
            matches.push(name);
        }
    }
    matches.sort();
    Ok(matches)
}
