//! Data model: the persisted container/descriptor shapes and the
//! in-memory record-set graph they are built from.
//!
//! Descriptor types ([`Container`], [`RecordSetDescriptor`],
//! [`RecordDescriptor`]) are constructed fresh on every read and write
//! pass and discarded afterwards; nothing is cached across files.  The
//! runtime types ([`Channel`], [`RecordSet`], [`Record`]) are owned by
//! the caller and outlive individual passes.

use std::path::PathBuf;

use serde::Serialize;

use crate::error::{OsdError, Result};
use crate::format::{self, FormatVersion};

// ── Property blobs ───────────────────────────────────────────────────────────
//
// Render/zoom state and per-record display metadata travel as opaque
// `key=value|-|key=value` blobs.  The core only understands the few keys
// it needs (time step, start timestamp, record identity) and carries the
// rest verbatim.

/// Look up `key` in a `key=value|-|...` blob.
pub fn property_value<'a>(blob: &'a str, key: &str) -> Option<&'a str> {
    blob.split(format::PROPERTY_DELIMITER).find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == key).then_some(v)
    })
}

/// Replace or append `key=value` in a blob, preserving every other pair.
pub fn upsert_property(blob: &str, key: &str, value: &str) -> String {
    let mut pairs: Vec<String> = blob
        .split(format::PROPERTY_DELIMITER)
        .filter(|p| !p.is_empty() && p.split_once('=').map(|(k, _)| k) != Some(key))
        .map(str::to_string)
        .collect();
    pairs.push(format!("{key}={value}"));
    pairs.join(format::PROPERTY_DELIMITER)
}

// ── Channel configuration type ───────────────────────────────────────────────

/// Whether a file groups record sets of a single outlet or of several
/// device configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChannelConfigType {
    Outlet,
    Config,
}

impl ChannelConfigType {
    pub fn as_wire_name(self) -> &'static str {
        match self {
            ChannelConfigType::Outlet => "TYPE_OUTLET",
            ChannelConfigType::Config => "TYPE_CONFIG",
        }
    }

    pub fn from_wire_name(name: &str) -> Result<Self> {
        match name.trim() {
            "TYPE_OUTLET" => Ok(ChannelConfigType::Outlet),
            "TYPE_CONFIG" => Ok(ChannelConfigType::Config),
            other => Err(OsdError::MalformedDescriptor(format!(
                "unknown channel configuration type '{other}'"
            ))),
        }
    }
}

// ── Persisted shapes ─────────────────────────────────────────────────────────

/// The parsed file header — everything before the descriptor block.
#[derive(Debug, Clone, Serialize)]
pub struct Container {
    pub version: FormatVersion,
    /// Creation timestamp as stored, `yyyy-mm-dd hh:mm:ss`.
    pub created: String,
    pub file_comment: String,
    pub device_name: String,
    pub channel_config_type: ChannelConfigType,
    /// Free-text grouping tag, empty when absent (version 1 files).
    pub object_key: String,
    pub record_set_count: usize,
}

/// Serialized metadata of one measurement channel within a record set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDescriptor {
    pub name: String,
    pub unit: String,
    pub symbol: String,
    /// Active records contribute a column to the raw sample block;
    /// calculated-only records are reconstructed post-load and store
    /// no bytes.
    pub is_active: bool,
    /// Display/scale metadata carried verbatim.
    pub extra: String,
}

impl RecordDescriptor {
    /// Parse one `_name=…|-|_unit=…|-|…` blob (end marker already stripped).
    pub fn from_blob(blob: &str) -> Result<Self> {
        let name = property_value(blob, format::RECORD_NAME)
            .ok_or_else(|| {
                OsdError::MalformedDescriptor("record properties without _name".to_string())
            })?
            .to_string();
        let unit = property_value(blob, format::RECORD_UNIT).unwrap_or("").to_string();
        let symbol = property_value(blob, format::RECORD_SYMBOL).unwrap_or("").to_string();
        let is_active = property_value(blob, format::RECORD_IS_ACTIVE)
            .map(|v| v.trim() == "true")
            .unwrap_or(true);
        let known = [
            format::RECORD_NAME,
            format::RECORD_UNIT,
            format::RECORD_SYMBOL,
            format::RECORD_IS_ACTIVE,
        ];
        let extra = blob
            .split(format::PROPERTY_DELIMITER)
            .filter(|pair| {
                !pair.is_empty()
                    && !known
                        .iter()
                        .any(|k| pair.split_once('=').map(|(key, _)| key) == Some(*k))
            })
            .collect::<Vec<_>>()
            .join(format::PROPERTY_DELIMITER);
        Ok(Self { name, unit, symbol, is_active, extra })
    }

    /// Serialize to the persisted blob, terminated by the end marker.
    pub fn to_blob(&self) -> String {
        let mut blob = format!(
            "{}={}{d}{}={}{d}{}={}{d}{}={}",
            format::RECORD_NAME,
            self.name,
            format::RECORD_UNIT,
            self.unit,
            format::RECORD_SYMBOL,
            self.symbol,
            format::RECORD_IS_ACTIVE,
            self.is_active,
            d = format::PROPERTY_DELIMITER,
        );
        if !self.extra.is_empty() {
            blob.push_str(format::PROPERTY_DELIMITER);
            blob.push_str(&self.extra);
        }
        blob.push_str(format::PROPERTY_END_MARKER);
        blob
    }
}

/// Serialized metadata of one record set: its shape and the location of
/// its sample block within the decompressed stream.
#[derive(Debug, Clone)]
pub struct RecordSetDescriptor {
    /// Already truncated to the maximum name length.
    pub name: String,
    /// The channel label as stored — unreliable free text, see resolver.
    pub channel_config_label: String,
    pub comment: String,
    /// Opaque render/zoom state; also carries `timeStep_ms`.
    pub properties: String,
    pub records: Vec<RecordDescriptor>,
    pub sample_count: usize,
    /// Absolute byte offset of the sample block in the decompressed stream.
    pub data_pointer: u64,
}

impl RecordSetDescriptor {
    pub fn active_record_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_active).count()
    }

    /// `timeStep_ms` from the properties blob; negative or absent means
    /// variable time steps (each row carries its own timestamp).
    pub fn time_step_ms(&self) -> Option<f64> {
        property_value(&self.properties, format::TIME_STEP_MS)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|ms| *ms >= 0.0)
    }

    pub fn has_constant_time_step(&self) -> bool {
        self.time_step_ms().is_some()
    }

    /// Bytes of one sample row: K active values, plus the leading
    /// timestamp under variable time steps.
    pub fn row_byte_size(&self) -> u64 {
        let columns = self.active_record_count() as u64
            + if self.has_constant_time_step() { 0 } else { 1 };
        columns * format::BYTES_PER_POINT
    }

    pub fn data_byte_size(&self) -> u64 {
        self.row_byte_size() * self.sample_count as u64
    }
}

// ── Runtime record-set graph ─────────────────────────────────────────────────

/// Location of a record set's raw bytes in its source file, kept so the
/// body can be fetched lazily long after the descriptor pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileDataRef {
    pub data_pointer: u64,
    pub sample_count: usize,
    pub byte_size: u64,
}

/// One measurement channel of a record set, with its decoded points.
/// Values are fixed-point: the physical value scaled by 1000.
#[derive(Debug, Clone)]
pub struct Record {
    pub name: String,
    pub unit: String,
    pub symbol: String,
    pub is_active: bool,
    pub extra: String,
    pub points: Vec<i32>,
}

impl Record {
    pub fn new(name: impl Into<String>, unit: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
            symbol: symbol.into(),
            is_active: true,
            extra: String::new(),
            points: Vec::new(),
        }
    }

    pub fn calculated(name: impl Into<String>, unit: impl Into<String>) -> Self {
        Self { is_active: false, ..Self::new(name, unit, "") }
    }

    pub fn from_descriptor(desc: &RecordDescriptor) -> Self {
        Self {
            name: desc.name.clone(),
            unit: desc.unit.clone(),
            symbol: desc.symbol.clone(),
            is_active: desc.is_active,
            extra: desc.extra.clone(),
            points: Vec::new(),
        }
    }

    pub fn descriptor(&self) -> RecordDescriptor {
        RecordDescriptor {
            name: self.name.clone(),
            unit: self.unit.clone(),
            symbol: self.symbol.clone(),
            is_active: self.is_active,
            extra: self.extra.clone(),
        }
    }
}

/// One named time-series capture session.
#[derive(Debug, Clone)]
pub struct RecordSet {
    pub name: String,
    pub channel_number: usize,
    /// Bare configuration name, written as `"<number> : <name>"`.
    pub channel_config_name: String,
    pub comment: String,
    /// Opaque render/zoom state; `timeStep_ms` lives here too.
    pub properties: String,
    pub records: Vec<Record>,
    /// Per-row timestamps in ms; used only under variable time steps.
    pub timestamps_ms: Vec<i32>,
    /// Raw record sets persist device units verbatim; non-raw sets are
    /// reverse-translated back to raw units on write.
    pub is_raw: bool,
    /// Set when the body was not materialized and can be loaded later.
    pub file_ref: Option<FileDataRef>,
}

impl RecordSet {
    pub fn new(
        name: &str,
        channel_number: usize,
        channel_config_name: impl Into<String>,
    ) -> Self {
        Self {
            name: format::truncate_name(name).to_string(),
            channel_number,
            channel_config_name: channel_config_name.into(),
            comment: String::new(),
            // variable time step unless told otherwise
            properties: format!("{}=-1", format::TIME_STEP_MS),
            records: Vec::new(),
            timestamps_ms: Vec::new(),
            is_raw: true,
            file_ref: None,
        }
    }

    /// Build the runtime shell for a parsed descriptor; points stay empty.
    pub fn from_descriptor(
        desc: &RecordSetDescriptor,
        channel_number: usize,
        channel_config_name: impl Into<String>,
    ) -> Self {
        let mut set = Self::new(&desc.name, channel_number, channel_config_name);
        set.comment = desc.comment.clone();
        set.properties = desc.properties.clone();
        set.records = desc.records.iter().map(Record::from_descriptor).collect();
        set.set_file_data_pointer_and_size(desc.data_pointer, desc.sample_count, desc.data_byte_size());
        set
    }

    pub fn add_record(&mut self, record: Record) {
        self.records.push(record);
    }

    pub fn get(&self, name: &str) -> Option<&Record> {
        self.records.iter().find(|r| r.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Record> {
        self.records.iter_mut().find(|r| r.name == name)
    }

    pub fn active_records(&self) -> impl Iterator<Item = &Record> {
        self.records.iter().filter(|r| r.is_active)
    }

    pub fn active_record_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_active).count()
    }

    pub fn time_step_ms(&self) -> Option<f64> {
        property_value(&self.properties, format::TIME_STEP_MS)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|ms| *ms >= 0.0)
    }

    pub fn is_time_step_constant(&self) -> bool {
        self.time_step_ms().is_some()
    }

    pub fn set_time_step_ms(&mut self, time_step_ms: f64) {
        self.properties =
            upsert_property(&self.properties, format::TIME_STEP_MS, &time_step_ms.to_string());
    }

    pub fn set_start_time_stamp_ms(&mut self, epoch_ms: i64) {
        self.properties =
            upsert_property(&self.properties, format::START_TIME_STAMP, &epoch_ms.to_string());
    }

    pub fn start_time_stamp_ms(&self) -> Option<i64> {
        property_value(&self.properties, format::START_TIME_STAMP)
            .and_then(|v| v.trim().parse::<i64>().ok())
    }

    /// Append one decoded row.  `values` must cover every active record
    /// in declaration order; `timestamp_ms` only under variable steps.
    pub fn push_row(&mut self, timestamp_ms: Option<i32>, values: &[i32]) -> Result<()> {
        if values.len() != self.active_record_count() {
            return Err(OsdError::MalformedDescriptor(format!(
                "row of {} values for {} active records in record set '{}'",
                values.len(),
                self.active_record_count(),
                self.name
            )));
        }
        if let Some(ts) = timestamp_ms {
            self.timestamps_ms.push(ts);
        }
        let mut columns = values.iter();
        for record in self.records.iter_mut().filter(|r| r.is_active) {
            // push_row checked the column count up front
            record.points.push(*columns.next().expect("column count verified"));
        }
        Ok(())
    }

    /// Number of in-memory rows.
    pub fn sample_count(&self) -> usize {
        self.active_records()
            .next()
            .map(|r| r.points.len())
            .unwrap_or(self.timestamps_ms.len())
    }

    /// Sample count to persist: in-memory rows, or the file reference's
    /// count when the body was never materialized.
    pub fn persisted_sample_count(&self) -> usize {
        if self.has_data() {
            self.sample_count()
        } else {
            self.file_ref.map(|r| r.sample_count).unwrap_or(0)
        }
    }

    pub fn has_data(&self) -> bool {
        self.sample_count() > 0
    }

    pub fn set_file_data_pointer_and_size(
        &mut self,
        data_pointer: u64,
        sample_count: usize,
        byte_size: u64,
    ) {
        self.file_ref = Some(FileDataRef { data_pointer, sample_count, byte_size });
    }

    /// Snapshot the persisted shape of this record set.  The data
    /// pointer is left at zero; the writer injects it during layout.
    pub fn descriptor(&self) -> RecordSetDescriptor {
        RecordSetDescriptor {
            name: self.name.clone(),
            channel_config_label: format!("{} : {}", self.channel_number, self.channel_config_name),
            comment: self.comment.clone(),
            properties: self.properties.clone(),
            records: self.records.iter().map(Record::descriptor).collect(),
            sample_count: self.persisted_sample_count(),
            data_pointer: 0,
        }
    }
}

/// A runtime channel with the record sets loaded into it, the unit the
/// writer persists as one file.
#[derive(Debug, Clone)]
pub struct Channel {
    pub number: usize,
    pub name: String,
    pub channel_type: ChannelConfigType,
    pub file_comment: String,
    pub object_key: String,
    /// Source file of lazily-referenced record sets, used to force-load
    /// their bodies before a write pass.
    pub origin_path: Option<PathBuf>,
    pub record_sets: Vec<RecordSet>,
}

impl Channel {
    pub fn new(number: usize, name: impl Into<String>, channel_type: ChannelConfigType) -> Self {
        Self {
            number,
            name: name.into(),
            channel_type,
            file_comment: String::new(),
            object_key: String::new(),
            origin_path: None,
            record_sets: Vec::new(),
        }
    }

    pub fn create_record_set(&mut self, name: &str) -> &mut RecordSet {
        let set = RecordSet::new(name, self.number, self.name.clone());
        self.record_sets.push(set);
        self.record_sets.last_mut().expect("just pushed")
    }

    pub fn get(&self, name: &str) -> Option<&RecordSet> {
        let name = format::truncate_name(name);
        self.record_sets.iter().find(|s| s.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut RecordSet> {
        let name = format::truncate_name(name);
        self.record_sets.iter_mut().find(|s| s.name == name)
    }
}

// ── Device capability ────────────────────────────────────────────────────────

/// Translation between raw device units and physical values, supplied
/// by the caller.  The core only invokes it when writing non-raw record
/// sets (reverse translation back to device units).
pub trait Device {
    fn name(&self) -> &str;

    /// Raw device value to physical value.
    fn translate(&self, _record: &Record, value: f64) -> f64 {
        value
    }

    /// Physical value back to raw device value.
    fn reverse_translate(&self, _record: &Record, value: f64) -> f64 {
        value
    }
}

/// Identity device: raw and physical units coincide.
#[derive(Debug, Clone)]
pub struct GenericDevice {
    pub name: String,
}

impl GenericDevice {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Device for GenericDevice {
    fn name(&self) -> &str {
        &self.name
    }
}
