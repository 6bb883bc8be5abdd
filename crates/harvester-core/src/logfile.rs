use std::path::{Path, PathBuf};

use chrono::NaiveDate;

/// Pick a log file path for a run that does not clobber an earlier one.
///
/// The base name is `<dir>/<stem>_<date>.log`. If that file exists, `_1`,
/// `_2`, ... is appended to the stem until a free path is found.
#[must_use]
pub fn build_log_path(dir: &Path, stem: &str, date: NaiveDate) -> PathBuf {
    let base = format!("{stem}_{}", date.format("%Y-%m-%d"));
    let mut path = dir.join(format!("{base}.log"));
    let mut counter = 1u32;
    while path.exists() {
        path = dir.join(format!("{base}_{counter}.log"));
        counter += 1;
    }
    path
}
