// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Binary encoding of partition log entries.
//
// On-disk format (all integers little-endian):
//   [4 bytes: entry_length (u32)]   -- length of everything after this field
//   [4 bytes: crc32 checksum]       -- CRC32 of all bytes after this field
//   [8 bytes: offset (u64)]
//   [8 bytes: timestamp (i64)]      -- Unix milliseconds UTC
//   [8 bytes: workspace (u64)]
//   [8 bytes: wlog_offset (u64)]
//   [4 bytes: body_len (u32)]
//   [N bytes: body]                 -- JSON {cuds, arg_objects}

use chrono::{TimeZone, Utc};
use crc32fast::Hasher as Crc32Hasher;
use serde::{Deserialize, Serialize};

use crate::error::{PLogError, PLogResult};
use crate::event::{ArgObject, Cud, PLogEvent};
use crate::ids::{Offset, WorkspaceId};

/// Maximum allowed entry size: 64 MiB. Any entry declaring a larger size
/// is treated as corrupted.
pub const MAX_ENTRY_SIZE: u32 = 64 * 1024 * 1024;

/// Size of the fixed-length entry header prefix (entry_length + crc32).
pub const HEADER_PREFIX_SIZE: usize = 4 + 4;

/// Size of the fixed fields after the CRC.
pub const FIXED_FIELDS_SIZE: usize = 8 + 8 + 8 + 8;

#[derive(Serialize, Deserialize)]
struct EntryBody {
    #[serde(default)]
    cuds: Vec<Cud>,
    #[serde(default)]
    arg_objects: Vec<ArgObject>,
}

/// Encode an event, including its length prefix and CRC.
pub fn encode(event: &PLogEvent) -> PLogResult<Vec<u8>> {
    let body = serde_json::to_vec(&EntryBody {
        cuds: event.cuds.clone(),
        arg_objects: event.arg_objects.clone(),
    })?;

    let mut inner = Vec::with_capacity(FIXED_FIELDS_SIZE + 4 + body.len());
    inner.extend_from_slice(&event.offset.0.to_le_bytes());
    inner.extend_from_slice(&event.timestamp.timestamp_millis().to_le_bytes());
    inner.extend_from_slice(&event.workspace.0.to_le_bytes());
    inner.extend_from_slice(&event.wlog_offset.0.to_le_bytes());
    inner.extend_from_slice(&(body.len() as u32).to_le_bytes());
    inner.extend_from_slice(&body);

    let entry_length = (4 + inner.len()) as u32;
    if entry_length > MAX_ENTRY_SIZE {
        return Err(PLogError::EntryTooLarge {
            length: entry_length,
            max_length: MAX_ENTRY_SIZE,
        });
    }

    let mut buffer = Vec::with_capacity(4 + entry_length as usize);
    buffer.extend_from_slice(&entry_length.to_le_bytes());
    buffer.extend_from_slice(&compute_crc32(&inner).to_le_bytes());
    buffer.extend_from_slice(&inner);
    Ok(buffer)
}

/// Decode an entry from the bytes that follow its length field (i.e.
/// starting at the CRC).
pub fn decode(data: &[u8], entry_length: u32) -> PLogResult<PLogEvent> {
    let entry_length = entry_length as usize;
    if data.len() < entry_length || entry_length < 4 {
        return Err(PLogError::UnexpectedEof(data.len() as u64));
    }
    let data = &data[..entry_length];

    let stored_crc = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    let inner = &data[4..];
    let computed_crc = compute_crc32(inner);
    if stored_crc != computed_crc {
        let mut cursor = Cursor::new(inner);
        return Err(PLogError::CrcMismatch {
            offset: cursor.u64().unwrap_or(0),
            expected: stored_crc,
            actual: computed_crc,
        });
    }

    let mut cursor = Cursor::new(inner);
    let offset = Offset(cursor.u64()?);
    let millis = cursor.i64()?;
    let workspace = WorkspaceId(cursor.u64()?);
    let wlog_offset = Offset(cursor.u64()?);
    let body_len = cursor.u32()? as usize;
    let body: EntryBody = serde_json::from_slice(cursor.bytes(body_len)?)?;

    Ok(PLogEvent {
        offset,
        timestamp: Utc
            .timestamp_millis_opt(millis)
            .single()
            .unwrap_or_else(Utc::now),
        workspace,
        wlog_offset,
        cuds: body.cuds,
        arg_objects: body.arg_objects,
    })
}

/// Compute a CRC32 checksum over the given byte slice using the IEEE
/// polynomial (same as zlib/gzip).
pub fn compute_crc32(data: &[u8]) -> u32 {
    let mut hasher = Crc32Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn bytes(&mut self, len: usize) -> PLogResult<&'a [u8]> {
        let end = self.pos + len;
        let slice = self
            .data
            .get(self.pos..end)
            .ok_or(PLogError::UnexpectedEof(self.pos as u64))?;
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> PLogResult<[u8; N]> {
        let at = self.pos as u64;
        self.bytes(N)?
            .try_into()
            .map_err(|_| PLogError::UnexpectedEof(at))
    }

    fn u32(&mut self) -> PLogResult<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> PLogResult<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn i64(&mut self) -> PLogResult<i64> {
        Ok(i64::from_le_bytes(self.array()?))
    }
}
