// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Append-only writer for one partition's log directory.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::entry;
use crate::error::{PLogError, PLogResult};
use crate::event::PLogEvent;
use crate::ids::Offset;
use crate::reader::scan_segment;
use crate::segment::{list_segments, segment_path, SegmentInfo, DEFAULT_MAX_SEGMENT_SIZE};

// ---------------------------------------------------------------------------
// SyncMode
// ---------------------------------------------------------------------------

/// Controls how aggressively the writer calls `fsync`.
#[derive(Debug, Clone)]
pub enum SyncMode {
    /// `fsync` after every append. Acknowledged events survive a crash.
    Fsync,

    /// `fsync` at most once per interval. Events written since the last
    /// sync may be lost on crash.
    Periodic(Duration),

    /// Never `fsync` explicitly; rely on the OS page cache.
    Async,
}

// ---------------------------------------------------------------------------
// PLogWriter
// ---------------------------------------------------------------------------

/// Appends committed events to a partition directory.
///
/// Offsets are assigned by the sequencer, not by the writer; the writer only
/// refuses an event whose offset does not move past the last one written.
pub struct PLogWriter {
    dir: PathBuf,
    current_file: File,
    current_segment: SegmentInfo,
    last_offset: Offset,
    max_segment_size: u64,
    sync_mode: SyncMode,
    last_sync: Instant,
}

impl PLogWriter {
    /// Open a partition directory, creating it when missing, and resume
    /// after the last valid entry.
    pub fn open(dir: impl AsRef<Path>, sync_mode: SyncMode) -> PLogResult<Self> {
        Self::open_with_max_size(dir, sync_mode, DEFAULT_MAX_SEGMENT_SIZE)
    }

    /// Like [`PLogWriter::open`] with a custom segment size. Mostly useful
    /// to force rotation in tests.
    pub fn open_with_max_size(
        dir: impl AsRef<Path>,
        sync_mode: SyncMode,
        max_segment_size: u64,
    ) -> PLogResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
            info!(dir = %dir.display(), "Created PLog directory");
        }

        let segments = list_segments(&dir)?;
        let (current_segment, current_file, last_offset) = match segments.last() {
            None => {
                let start = Offset::FIRST.0;
                let path = segment_path(&dir, start);
                let file = File::create(&path)?;
                info!(dir = %dir.display(), "Initialized fresh PLog");
                (
                    SegmentInfo {
                        path,
                        start_offset: start,
                        file_size: 0,
                    },
                    file,
                    Offset::NULL,
                )
            }
            Some(last) => {
                let (events, valid_len) = scan_segment(&last.path)?;
                let last_offset = events
                    .iter()
                    .map(|event| event.offset)
                    .max()
                    .unwrap_or(Offset(last.start_offset.saturating_sub(1)));

                // New entries must follow the last readable one, not a torn
                // write the reader would stop at.
                if valid_len < last.file_size {
                    let file = OpenOptions::new().write(true).open(&last.path)?;
                    file.set_len(valid_len)?;
                    file.sync_all()?;
                    warn!(
                        segment = %last.path.display(),
                        dropped_bytes = last.file_size - valid_len,
                        "Truncated torn PLog tail"
                    );
                }

                let file = OpenOptions::new().append(true).open(&last.path)?;
                info!(
                    segment = %last.path.display(),
                    last_offset = last_offset.0,
                    "Resuming PLog"
                );
                let segment = SegmentInfo {
                    file_size: valid_len,
                    ..last.clone()
                };
                (segment, file, last_offset)
            }
        };

        Ok(Self {
            dir,
            current_file,
            current_segment,
            last_offset,
            max_segment_size,
            sync_mode,
            last_sync: Instant::now(),
        })
    }

    /// Append a committed event. Its offset must be greater than the last
    /// offset written.
    pub fn append(&mut self, event: &PLogEvent) -> PLogResult<Offset> {
        if event.offset <= self.last_offset {
            return Err(PLogError::OffsetRegression {
                offset: event.offset,
                last: self.last_offset,
            });
        }

        let bytes = entry::encode(event)?;
        if self.current_segment.file_size > 0
            && self.current_segment.file_size + bytes.len() as u64 > self.max_segment_size
        {
            self.rotate(event.offset)?;
        }

        self.current_file.write_all(&bytes)?;
        self.current_segment.file_size += bytes.len() as u64;
        self.last_offset = event.offset;
        self.maybe_sync()?;

        debug!(
            offset = event.offset.0,
            workspace = event.workspace.0,
            "Appended PLog event"
        );
        Ok(event.offset)
    }

    /// Force an immediate `fsync` regardless of the sync mode.
    pub fn sync(&mut self) -> PLogResult<()> {
        self.current_file.sync_all()?;
        self.last_sync = Instant::now();
        Ok(())
    }

    /// The last offset written, [`Offset::NULL`] for an empty log.
    pub fn last_offset(&self) -> Offset {
        self.last_offset
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn current_segment(&self) -> &SegmentInfo {
        &self.current_segment
    }

    fn rotate(&mut self, start_offset: Offset) -> PLogResult<()> {
        self.sync()?;

        let path = segment_path(&self.dir, start_offset.0);
        let file = File::create(&path)?;
        info!(
            old_segment = %self.current_segment.path.display(),
            new_segment = %path.display(),
            start_offset = start_offset.0,
            "Rotated PLog segment"
        );

        self.current_file = file;
        self.current_segment = SegmentInfo {
            path,
            start_offset: start_offset.0,
            file_size: 0,
        };
        Ok(())
    }

    fn maybe_sync(&mut self) -> PLogResult<()> {
        match &self.sync_mode {
            SyncMode::Fsync => self.sync()?,
            SyncMode::Periodic(interval) => {
                if self.last_sync.elapsed() >= *interval {
                    self.sync()?;
                }
            }
            SyncMode::Async => {}
        }
        Ok(())
    }
}
