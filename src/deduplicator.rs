use std::collections::HashSet;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use log::{info, warn};
use regex::Regex;

use crate::error::{Error, Result};

// How two records are decided to be the same product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupKey {
    // Exact match on every field.
    FullRecord,
    // Normalized `name` column: lowercased, punctuation and repeated
    // whitespace collapsed. Needs a header row naming that column.
    NormalizedName,
}

pub struct Deduplicator {
    key: DedupKey,
    name_cleaner: Regex,
}

impl Deduplicator {
    pub fn new(key: DedupKey) -> Self {
        Deduplicator {
            key,
            name_cleaner: Regex::new(r"[^a-z0-9]+").unwrap(),
        }
    }

    // Writes a copy of `src` to `dst` keeping only the first occurrence per
    // identity key. The source file is never touched. Returns rows written.
    pub fn dedup_file(&self, src: &Path, dst: &Path) -> Result<usize> {
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(src)
            .map_err(|e| dedup_io(src, e))?;

        let mut rows: Vec<StringRecord> = Vec::new();
        for record in reader.records() {
            rows.push(record.map_err(|e| dedup_io(src, e))?);
        }

        let kept = match self.key {
            DedupKey::FullRecord => keep_first_by(&rows, full_record_key),
            DedupKey::NormalizedName => self.keep_first_by_name(src, &rows),
        };

        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(dst)
            .map_err(|e| dedup_io(dst, e))?;
        for row in &kept {
            writer.write_record(*row).map_err(|e| dedup_io(dst, e))?;
        }
        writer.flush().map_err(|e| dedup_io(dst, e))?;

        info!(
            "Deduped {:?}: {} rows in, {} rows out",
            src,
            rows.len(),
            kept.len()
        );
        Ok(kept.len())
    }

    // First row must be a header containing a `name` column; rows whose
    // normalized name is empty cannot be keyed and are always kept. Falls
    // back to full-record identity when no name column exists.
    fn keep_first_by_name<'a>(&self, src: &Path, rows: &'a [StringRecord]) -> Vec<&'a StringRecord> {
        let name_idx = rows.first().and_then(|header| {
            header
                .iter()
                .position(|field| field.trim().eq_ignore_ascii_case("name"))
        });

        let name_idx = match name_idx {
            Some(idx) => idx,
            None => {
                warn!(
                    "{:?} has no 'name' column; falling back to full-record identity",
                    src
                );
                return keep_first_by(rows, full_record_key);
            }
        };

        let mut seen = HashSet::new();
        let mut kept = vec![&rows[0]];
        for row in &rows[1..] {
            let key = self.normalize_name(row.get(name_idx).unwrap_or(""));
            if key.is_empty() || seen.insert(key) {
                kept.push(row);
            }
        }
        kept
    }

    fn normalize_name(&self, raw: &str) -> String {
        let lowered = raw.to_lowercase();
        self.name_cleaner
            .replace_all(&lowered, " ")
            .trim()
            .to_string()
    }
}

fn keep_first_by<'a>(
    rows: &'a [StringRecord],
    key_fn: fn(&StringRecord) -> String,
) -> Vec<&'a StringRecord> {
    let mut seen = HashSet::new();
    let mut kept = Vec::new();
    for row in rows {
        if seen.insert(key_fn(row)) {
            kept.push(row);
        }
    }
    kept
}

fn full_record_key(record: &StringRecord) -> String {
    // Unit separator keeps ("a,b", "c") distinct from ("a", "b,c").
    record.iter().collect::<Vec<_>>().join("\u{1f}")
}

fn dedup_io(path: &Path, e: impl ToString) -> Error {
    Error::DedupIo {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_csv(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn removes_full_row_duplicates_preserving_first_occurrence_order() {
        let dir = tempfile::tempdir().unwrap();
        let src = write_csv(dir.path(), "in.csv", "A,B,C\nA,B,C\nX,Y,Z\n");
        let dst = dir.path().join("out.csv");

        let written = Deduplicator::new(DedupKey::FullRecord)
            .dedup_file(&src, &dst)
            .unwrap();

        assert_eq!(written, 2);
        assert_eq!(fs::read_to_string(&dst).unwrap(), "A,B,C\nX,Y,Z\n");
    }

    #[test]
    fn keeps_interleaved_distinct_rows_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let src = write_csv(dir.path(), "in.csv", "a,1\nb,2\na,1\nc,3\nb,2\n");
        let dst = dir.path().join("out.csv");

        Deduplicator::new(DedupKey::FullRecord)
            .dedup_file(&src, &dst)
            .unwrap();

        assert_eq!(fs::read_to_string(&dst).unwrap(), "a,1\nb,2\nc,3\n");
    }

    #[test]
    fn is_idempotent_on_its_own_output() {
        let dir = tempfile::tempdir().unwrap();
        let src = write_csv(dir.path(), "in.csv", "A,B\nA,B\nC,D\n");
        let first = dir.path().join("first.csv");
        let second = dir.path().join("second.csv");

        let dedup = Deduplicator::new(DedupKey::FullRecord);
        dedup.dedup_file(&src, &first).unwrap();
        dedup.dedup_file(&first, &second).unwrap();

        assert_eq!(
            fs::read_to_string(&first).unwrap(),
            fs::read_to_string(&second).unwrap()
        );
    }

    #[test]
    fn never_mutates_the_source_file() {
        let dir = tempfile::tempdir().unwrap();
        let content = "A,B\nA,B\n";
        let src = write_csv(dir.path(), "in.csv", content);
        let dst = dir.path().join("out.csv");

        Deduplicator::new(DedupKey::FullRecord)
            .dedup_file(&src, &dst)
            .unwrap();

        assert_eq!(fs::read_to_string(&src).unwrap(), content);
    }

    #[test]
    fn name_key_collapses_cosmetic_variants() {
        let dir = tempfile::tempdir().unwrap();
        let src = write_csv(
            dir.path(),
            "in.csv",
            "id,name,price\n1,Coke 1.5L,10.00\n2,coke  1-5l,12.00\n3,Pepsi,9.00\n",
        );
        let dst = dir.path().join("out.csv");

        Deduplicator::new(DedupKey::NormalizedName)
            .dedup_file(&src, &dst)
            .unwrap();

        assert_eq!(
            fs::read_to_string(&dst).unwrap(),
            "id,name,price\n1,Coke 1.5L,10.00\n3,Pepsi,9.00\n"
        );
    }

    #[test]
    fn name_key_keeps_rows_without_a_name() {
        let dir = tempfile::tempdir().unwrap();
        let src = write_csv(
            dir.path(),
            "in.csv",
            "id,name,price\n1,,10.00\n2,,12.00\n",
        );
        let dst = dir.path().join("out.csv");

        Deduplicator::new(DedupKey::NormalizedName)
            .dedup_file(&src, &dst)
            .unwrap();

        assert_eq!(
            fs::read_to_string(&dst).unwrap(),
            "id,name,price\n1,,10.00\n2,,12.00\n"
        );
    }

    #[test]
    fn name_key_without_name_column_falls_back_to_full_record() {
        let dir = tempfile::tempdir().unwrap();
        let src = write_csv(dir.path(), "in.csv", "a,b\na,b\nc,d\n");
        let dst = dir.path().join("out.csv");

        Deduplicator::new(DedupKey::NormalizedName)
            .dedup_file(&src, &dst)
            .unwrap();

        assert_eq!(fs::read_to_string(&dst).unwrap(), "a,b\nc,d\n");
    }

    #[test]
    fn unreadable_source_reports_dedup_error() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("does_not_exist.csv");
        let dst = dir.path().join("out.csv");

        let result = Deduplicator::new(DedupKey::FullRecord).dedup_file(&src, &dst);
        assert!(matches!(result, Err(Error::DedupIo { .. })));
    }
}
