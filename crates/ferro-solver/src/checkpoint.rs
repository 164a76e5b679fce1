//! Checkpoint records: opaque solver state written through byte streams.
//!
//! Each record is a length-prefixed JSON block carrying a schema version and
//! the writing solver's kind tag. Restoring checks both, so stale streams
//! and mismatched solvers fail loudly instead of resuming with garbage. The
//! payload layout is solver-specific and not stable across versions.

use std::io::{Read, Write};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SolverError};

/// Bumped whenever any solver changes its persisted layout.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct Record {
    schema_version: u32,
    kind: String,
    payload: serde_json::Value,
}

/// Append one state record to the stream.
pub fn write_record<T: Serialize>(w: &mut dyn Write, kind: &str, payload: &T) -> Result<()> {
    let record = Record {
        schema_version: SCHEMA_VERSION,
        kind: kind.to_string(),
        payload: serde_json::to_value(payload)?,
    };
    let bytes = serde_json::to_vec(&record)?;
    w.write_all(&(bytes.len() as u64).to_le_bytes())?;
    w.write_all(&bytes)?;
    Ok(())
}

/// Read the next record, verifying schema and kind tag.
pub fn read_record<T: DeserializeOwned>(r: &mut dyn Read, kind: &str) -> Result<T> {
    let mut len_bytes = [0u8; 8];
    r.read_exact(&mut len_bytes)?;
    let len = u64::from_le_bytes(len_bytes) as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;

    let record: Record = serde_json::from_slice(&buf)?;
    if record.schema_version != SCHEMA_VERSION {
        return Err(SolverError::CheckpointSchema {
            expected: SCHEMA_VERSION,
            got: record.schema_version,
        });
    }
    if record.kind != kind {
        return Err(SolverError::CheckpointKind {
            expected: kind.to_string(),
            got: record.kind,
        });
    }
    Ok(serde_json::from_value(record.payload)?)
}
