use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SelectError {
    #[error("failed to read log directory '{}': {source}", path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Outcome of comparing a directory snapshot with the persisted watermark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Files to process, in order.
    Pending(Vec<PathBuf>),
    /// The watermark names a file that is no longer in the directory.
    WatermarkNotFound {
        watermark: PathBuf,
        /// Files ordered strictly after the watermark's name. `None` when the
        /// watermark's name carries no rotation timestamp to order by.
        newer: Option<Vec<PathBuf>>,
        /// Every eligible file.
        all: Vec<PathBuf>,
    },
}

fn rotated_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^gatekeeper_(\d{4})_(\d{2})_(\d{2})_(\d{2})_(\d{2})\.log$")
            .expect("rotated log name pattern is valid")
    })
}

/// Sort key of a rotated gatekeeper log: the rotation time encoded in its
/// name, with the name itself breaking ties.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RotationKey {
    pub rotated_at: NaiveDateTime,
    pub name: String,
}

impl RotationKey {
    /// Parse `gatekeeper_YYYY_MM_DD_HH_MM.log`. Any other name yields `None`.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        let caps = rotated_name_regex().captures(name)?;
        let num = |i: usize| caps.get(i)?.as_str().parse::<u32>().ok();

        let year = i32::try_from(num(1)?).ok()?;
        let rotated_at = NaiveDate::from_ymd_opt(year, num(2)?, num(3)?)?
            .and_hms_opt(num(4)?, num(5)?, 0)?;

        Some(Self {
            rotated_at,
            name: name.to_string(),
        })
    }
}

/// List regular files in `dir`. Nothing is filtered by name here.
pub fn list_dir(dir: &Path) -> Result<Vec<PathBuf>, SelectError> {
    let read_err = |source| SelectError::ReadDir {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(read_err)? {
        let entry = entry.map_err(read_err)?;
        if entry.file_type().map_err(read_err)?.is_file() {
            entries.push(entry.path());
        }
    }
    Ok(entries)
}

/// Decide which rotated files still need processing.
///
/// Only names following the rotation convention are considered, ordered by
/// [`RotationKey`]. The newest file is always left out because gatekeeper is
/// still appending to it. With no watermark everything else is pending;
/// otherwise only the files after the watermark are.
pub fn select(entries: &[PathBuf], watermark: Option<&Path>) -> Selection {
    let mut rotated: Vec<(RotationKey, &PathBuf)> = entries
        .iter()
        .filter_map(|p| RotationKey::from_path(p).map(|k| (k, p)))
        .collect();
    rotated.sort();

    // Drop the file currently being written.
    rotated.pop();

    let all: Vec<PathBuf> = rotated.iter().map(|(_, p)| (*p).clone()).collect();

    let Some(watermark) = watermark else {
        return Selection::Pending(all);
    };

    if let Some(pos) = rotated.iter().position(|(_, p)| p.as_path() == watermark) {
        return Selection::Pending(all[pos + 1..].to_vec());
    }

    // The newest entry was popped above, so the watermark can still name it.
    // That only happens if gatekeeper never rotated past it; nothing is ready.
    if entries.iter().any(|p| p.as_path() == watermark) {
        return Selection::Pending(Vec::new());
    }

    let newer = RotationKey::from_path(watermark).map(|mark| {
        rotated
            .iter()
            .filter(|(k, _)| *k > mark)
            .map(|(_, p)| (*p).clone())
            .collect()
    });

    Selection::WatermarkNotFound {
        watermark: watermark.to_path_buf(),
        newer,
        all,
    }
}
