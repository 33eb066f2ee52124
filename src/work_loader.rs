use std::fmt;
use std::fs;
use std::path::Path;

use log::info;

use crate::error::{Error, Result};

// One unit of scraping work: an inclusive page range handed to a single worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub min: u32,
    pub max: u32,
}

impl PageRange {
    pub fn output_filename(&self) -> String {
        format!("products_{}-{}.csv", self.min, self.max)
    }

    pub fn deduped_filename(&self) -> String {
        format!("products_deduped_{}-{}.csv", self.min, self.max)
    }

    // Value for the worker's -p flag.
    pub fn page_arg(&self) -> String {
        format!("{}-{}", self.min, self.max)
    }

    pub fn overlaps(&self, other: &PageRange) -> bool {
        self.min <= other.max && other.min <= self.max
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

// Reads the work list: one range per line, "<min>,<max>". Blank and
// whitespace-only lines are skipped. Anything else that does not parse as
// exactly two comma-separated integers aborts the whole run, since a batch
// with an unknown total is unsafe to launch.
pub fn load_ranges<P: AsRef<Path>>(path: P) -> Result<Vec<PageRange>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;

    let mut ranges = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        ranges.push(parse_line(line, idx + 1)?);
    }

    info!("Loaded {} page ranges from {:?}", ranges.len(), path);
    Ok(ranges)
}

fn parse_line(line: &str, line_no: usize) -> Result<PageRange> {
    let malformed = || Error::MalformedTask {
        line: line_no,
        content: line.to_string(),
    };

    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() != 2 {
        return Err(malformed());
    }

    let min: u32 = fields[0].trim().parse().map_err(|_| malformed())?;
    let max: u32 = fields[1].trim().parse().map_err(|_| malformed())?;

    // An inverted range can never name a page.
    if min > max {
        return Err(malformed());
    }

    Ok(PageRange { min, max })
}

// Fails on the first pair of overlapping (or duplicate) ranges. Two tasks
// covering the same pages would write divergent outputs for the same data.
pub fn validate_disjoint(ranges: &[PageRange]) -> Result<()> {
    for (i, a) in ranges.iter().enumerate() {
        for b in &ranges[i + 1..] {
            if a.overlaps(b) {
                return Err(Error::RangeConflict {
                    first: a.to_string(),
                    second: b.to_string(),
                });
            }
        }
    }
    Ok(())
}
