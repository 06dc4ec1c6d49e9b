//! Frozen wire constants of the OSD container format.
//!
//! # Identity rules
//! Every key string below is written verbatim into files and matched
//! verbatim on read.  The values are permanent: a key is NEVER renamed,
//! even if the field it carries becomes obsolete, because files written
//! a decade ago must still parse.  Parsers MUST reject unknown format
//! versions outright — there is no best-effort mode.
//!
//! # Framing
//! Header lines and version ≤3 descriptor lines are framed as a
//! big-endian u16 byte length followed by UTF-8 text ending in `\n`.
//! Version 4 descriptor lines are framed as a big-endian u32 byte
//! length instead, because a descriptor embedding many per-record
//! property blobs can exceed the 16-bit limit.

use serde::{Serialize, Serializer};

use crate::error::{OsdError, Result};

// ── Header line keys ─────────────────────────────────────────────────────────

pub const FILE_VERSION: &str = "DataExplorer version : ";
/// Written by pre-rename builds; still accepted on read.
pub const LEGACY_FILE_VERSION: &str = "OpenSerialData version : ";
pub const CREATION_TIME_STAMP: &str = "Created : ";
pub const FILE_COMMENT: &str = "FileComment : ";
pub const DEVICE_NAME: &str = "DeviceName : ";
pub const CHANNEL_CONFIG_TYPE: &str = "Channel/Configuration Type : ";
pub const OBJECT_KEY: &str = "ObjectKey : ";
pub const RECORD_SET_SIZE: &str = "NumberRecordSets : ";

/// Header keys matched by the whitelist parse, in no particular order.
/// `RECORD_SET_SIZE` terminates the header.
pub const HEADER_KEYS: &[&str] = &[
    CREATION_TIME_STAMP,
    FILE_COMMENT,
    DEVICE_NAME,
    OBJECT_KEY,
    CHANNEL_CONFIG_TYPE,
    RECORD_SET_SIZE,
];

// ── Descriptor line keys ─────────────────────────────────────────────────────

pub const RECORD_SET_NAME: &str = "RecordSetName : ";
pub const CHANNEL_CONFIG_NAME: &str = "Channel/Configuration Name: ";
pub const RECORD_SET_COMMENT: &str = "RecordSetComment : ";
pub const RECORD_SET_PROPERTIES: &str = "RecordSetProperties : ";
pub const RECORDS_PROPERTIES: &str = "RecordProperties : ";
pub const RECORD_DATA_SIZE: &str = "RecordDataSize : ";
pub const RECORD_SET_DATA_POINTER: &str = "RecordSetDataPointer : ";

/// Separates the fields of one descriptor line.  A private constant,
/// not a printable delimiter character.
pub const DATA_DELIMITER: &str = "||::||";
/// Separates key=value pairs inside a serialized property blob.
pub const PROPERTY_DELIMITER: &str = "|-|";
/// Terminates one record's serialized property blob.
pub const PROPERTY_END_MARKER: &str = "|:-:|";

/// Record-set property key: average time step in ms, `-1` for variable.
pub const TIME_STEP_MS: &str = "timeStep_ms";
/// Record-set property key: capture start, epoch milliseconds.
pub const START_TIME_STAMP: &str = "startTimeStamp";

/// Record property keys (serialized per record, in this order).
pub const RECORD_NAME: &str = "_name";
pub const RECORD_UNIT: &str = "_unit";
pub const RECORD_SYMBOL: &str = "_symbol";
pub const RECORD_IS_ACTIVE: &str = "_isActive";

// ── Limits and widths ────────────────────────────────────────────────────────

/// Record-set names longer than this are truncated, never rejected.
pub const MAX_RECORD_SET_NAME_LENGTH: usize = 40;
/// Sample count and data pointer are space-padded to this width so that
/// injecting the pointer does not change the descriptor's own length.
pub const POINTER_FIELD_WIDTH: usize = 10;
/// Every persisted sample value and timestamp is one big-endian i32.
pub const BYTES_PER_POINT: u64 = 4;
/// u16 length prefix of a framed UTF line.
pub const UTF_FRAME_OVERHEAD: u64 = 2;
/// u32 length prefix of a version-4 descriptor line.
pub const INT_FRAME_OVERHEAD: u64 = 4;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ── Format version ───────────────────────────────────────────────────────────

/// The container wire version, fixed for a whole file.
///
/// Versions 1–3 differ only in content (v1 has no object key, v3 added
/// the start timestamp to the record-set properties); version 4 changes
/// the descriptor line framing to a 32-bit length prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FormatVersion {
    V1,
    V2,
    V3,
    V4,
}

impl FormatVersion {
    pub fn from_digit(digit: u32) -> Result<Self> {
        match digit {
            1 => Ok(FormatVersion::V1),
            2 => Ok(FormatVersion::V2),
            3 => Ok(FormatVersion::V3),
            4 => Ok(FormatVersion::V4),
            other => Err(OsdError::UnsupportedFormatVersion(other.to_string())),
        }
    }

    pub fn as_digit(self) -> u32 {
        match self {
            FormatVersion::V1 => 1,
            FormatVersion::V2 => 2,
            FormatVersion::V3 => 3,
            FormatVersion::V4 => 4,
        }
    }

    /// Version 4 frames descriptor lines with a u32 length prefix.
    pub fn uses_int_framed_descriptors(self) -> bool {
        self == FormatVersion::V4
    }

    /// The object-key header line exists from version 2 on.
    pub fn has_object_key(self) -> bool {
        self >= FormatVersion::V2
    }

    /// Frame overhead of one descriptor line under this version.
    pub fn descriptor_frame_overhead(self) -> u64 {
        if self.uses_int_framed_descriptors() {
            INT_FRAME_OVERHEAD
        } else {
            UTF_FRAME_OVERHEAD
        }
    }
}

impl Serialize for FormatVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.as_digit())
    }
}

impl std::fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_digit())
    }
}

/// Truncate a record-set name to [`MAX_RECORD_SET_NAME_LENGTH`] characters.
/// Applied identically on write and on read so both sides agree on keys.
pub fn truncate_name(name: &str) -> &str {
    match name.char_indices().nth(MAX_RECORD_SET_NAME_LENGTH) {
        Some((idx, _)) => &name[..idx],
        None => name,
    }
}
