// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Segment files of a partition log.
//
// Each partition owns a directory `p-{pid}` holding append-only segment
// files named `plog-{offset:016}.log`, where the number is the first offset
// the segment may contain. Segments are rotated when they exceed the
// configured maximum size.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{PLogError, PLogResult};
use crate::ids::PartitionId;

/// Default maximum segment size in bytes (64 MiB).
pub const DEFAULT_MAX_SEGMENT_SIZE: u64 = 64 * 1024 * 1024;

pub const SEGMENT_EXTENSION: &str = "log";
pub const SEGMENT_PREFIX: &str = "plog-";

/// Metadata about a single segment file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentInfo {
    pub path: PathBuf,
    /// Every entry in this segment has an offset >= this value.
    pub start_offset: u64,
    pub file_size: u64,
}

impl PartialOrd for SegmentInfo {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SegmentInfo {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.start_offset.cmp(&other.start_offset)
    }
}

/// Directory of one partition's log under the log root.
pub fn partition_dir(root: &Path, pid: PartitionId) -> PathBuf {
    root.join(format!("p-{}", pid.0))
}

/// `plog-0000000000000001.log`
pub fn segment_filename(start_offset: u64) -> String {
    format!("{SEGMENT_PREFIX}{start_offset:016}.{SEGMENT_EXTENSION}")
}

pub fn segment_path(dir: &Path, start_offset: u64) -> PathBuf {
    dir.join(segment_filename(start_offset))
}

/// Parse the starting offset out of a segment file name.
pub fn parse_segment_filename(name: &str) -> Option<u64> {
    let stripped = name.strip_prefix(SEGMENT_PREFIX)?;
    let num_str = stripped.strip_suffix(&format!(".{SEGMENT_EXTENSION}"))?;
    num_str.parse::<u64>().ok()
}

/// List the segments of a partition directory, ordered by start offset.
///
/// Non-segment files in the directory are ignored.
pub fn list_segments(dir: &Path) -> PLogResult<Vec<SegmentInfo>> {
    if !dir.is_dir() {
        return Err(PLogError::DirectoryNotFound(dir.display().to_string()));
    }

    let mut segments = Vec::new();
    for dir_entry in fs::read_dir(dir)? {
        let dir_entry = dir_entry?;
        let name = dir_entry.file_name();
        if let Some(start_offset) = parse_segment_filename(&name.to_string_lossy()) {
            segments.push(SegmentInfo {
                path: dir_entry.path(),
                start_offset,
                file_size: dir_entry.metadata()?.len(),
            });
        }
    }
    segments.sort();

    debug!(count = segments.len(), dir = %dir.display(), "Discovered PLog segments");
    Ok(segments)
}
