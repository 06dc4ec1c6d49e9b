//! Read passes over a container file.
//!
//! # Phases
//! A full read runs in three phases over one linear stream: parse the
//! header and every descriptor, classify each descriptor against the
//! best-fit selector (or a caller-selected channel), then walk the
//! sample blocks in file order, decoding the wanted ones and deferring
//! the rest to a single coalesced skip.  Unwanted record sets still come
//! back as shells carrying a file reference, so their bodies can be
//! fetched later through [`load_record_set_data`].

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use tracing::{debug, warn};

use crate::descriptor;
use crate::error::{OsdError, Result};
use crate::format::{self, FormatVersion};
use crate::framer::{self, CountingReader};
use crate::model::{Container, RecordSet, RecordSetDescriptor};
use crate::points;
use crate::progress::{NoProgress, ProgressSink, ProgressTicker};
use crate::resolve::ResolutionContext;
use crate::select::BestFitSelector;
use crate::skip::LazySkipReader;

/// What a device-name or object-key check disagreed about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub kind: MismatchKind,
    pub expected: String,
    pub found: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MismatchKind {
    DeviceName,
    ObjectKey,
}

/// Caller knobs for one read pass.
pub struct ReadOptions {
    /// Materialize exactly this record set; overrides every other rule.
    pub target_record_set: Option<String>,
    /// Channel the best-fit selector prefers when no target is named.
    pub preferred_channel: usize,
    /// Take the very first record set regardless of channel.
    pub first_choice: bool,
    /// Channel table labels are resolved against; empty means every
    /// label synthesizes its channel.
    pub channels: ResolutionContext,
    /// When set, a differing header device name triggers confirmation.
    pub expected_device_name: Option<String>,
    /// When set, a differing header object key triggers confirmation.
    pub expected_object_key: Option<String>,
    /// Decides whether to proceed past a mismatch.  Without a callback
    /// mismatches are logged and the read continues.
    pub confirm: Option<Box<dyn FnMut(&Mismatch) -> bool>>,
    pub progress: Box<dyn ProgressSink>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            target_record_set: None,
            preferred_channel: 1,
            first_choice: false,
            channels: ResolutionContext::new(),
            expected_device_name: None,
            expected_object_key: None,
            confirm: None,
            progress: Box::new(NoProgress),
        }
    }
}

/// One decoded record set plus where it came from.
#[derive(Debug)]
pub struct ReadOutcome {
    pub container: Container,
    /// Every record set of the file, in file order.  Materialized sets
    /// carry points; the rest carry only their file reference.
    pub record_sets: Vec<RecordSet>,
    /// Channel table after resolution, including synthetic channels.
    pub channels: ResolutionContext,
    /// Index into `record_sets` of the actively materialized set.
    pub active: Option<usize>,
}

impl ReadOutcome {
    pub fn active_record_set(&self) -> Option<&RecordSet> {
        self.active.map(|i| &self.record_sets[i])
    }
}

enum Selection {
    BestFit(BestFitSelector),
    Channel(usize),
}

/// Read a container, materializing the single best-fit record set.
pub fn read(path: &Path, options: ReadOptions) -> Result<ReadOutcome> {
    let selector = BestFitSelector::new(
        options.target_record_set.as_deref(),
        options.preferred_channel,
        options.first_choice,
    );
    read_with_selection(path, options, |_| Selection::BestFit(selector))
}

/// Read a container, materializing exactly the named record set.
pub fn read_record_set(path: &Path, name: &str) -> Result<ReadOutcome> {
    let options = ReadOptions {
        target_record_set: Some(name.to_string()),
        ..Default::default()
    };
    read(path, options)
}

/// Selective read variant: materialize EVERY record set whose resolved
/// channel equals `channel_number`, for cross-file aggregation.
pub fn read_channel(
    path: &Path,
    channel_number: usize,
    options: ReadOptions,
) -> Result<ReadOutcome> {
    read_with_selection(path, options, |_| Selection::Channel(channel_number))
}

fn read_with_selection(
    path: &Path,
    mut options: ReadOptions,
    make_selection: impl FnOnce(&Container) -> Selection,
) -> Result<ReadOutcome> {
    let mut reader = framer::open(path)?;
    let container = descriptor::parse_header(&mut reader)?;
    confirm_header(&container, &mut options)?;

    let descriptors = descriptor::parse_record_set_descriptors(
        &mut reader,
        container.record_set_count,
        container.version,
    )?;

    // Classification pass: resolve every label, then decide winners,
    // before a single body byte is consumed.
    let mut channels = options.channels;
    let resolved: Vec<usize> = descriptors
        .iter()
        .map(|d| {
            channels
                .resolve(&d.channel_config_label, container.channel_config_type)
                .channel_number
        })
        .collect();

    let mut selection = make_selection(&container);
    let wanted: Vec<bool> = match &mut selection {
        Selection::BestFit(selector) => {
            for (desc, channel) in descriptors.iter().zip(&resolved) {
                selector.observe(*channel, &desc.name);
            }
            descriptors
                .iter()
                .zip(&resolved)
                .map(|(d, ch)| selector.is_match(*ch, &d.name))
                .collect()
        }
        Selection::Channel(number) => resolved.iter().map(|ch| ch == number).collect(),
    };

    // Decode pass, in file order.
    let total_rows: u64 = descriptors
        .iter()
        .zip(&wanted)
        .filter(|(_, w)| **w)
        .map(|(d, _)| d.sample_count as u64)
        .sum();
    let mut ticker = ProgressTicker::new(options.progress.as_mut(), total_rows);
    let mut skipper = LazySkipReader::new();
    let mut record_sets = Vec::with_capacity(descriptors.len());
    let mut active = None;

    for ((desc, channel), wanted) in descriptors.iter().zip(&resolved).zip(&wanted) {
        let channel_name = channels
            .get(*channel)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| desc.channel_config_label.clone());
        let mut set = RecordSet::from_descriptor(desc, *channel, channel_name);

        if *wanted {
            materialize(&mut reader, &mut skipper, desc, &mut set, &mut ticker)?;
            if active.is_none() {
                active = Some(record_sets.len());
            }
            debug!(name = %set.name, channel, "record set materialized");
        } else {
            skipper.defer(desc.data_pointer);
        }
        record_sets.push(set);
    }

    Ok(ReadOutcome { container, record_sets, channels, active })
}

fn materialize<R: Read>(
    reader: &mut CountingReader<R>,
    skipper: &mut LazySkipReader,
    desc: &RecordSetDescriptor,
    set: &mut RecordSet,
    ticker: &mut ProgressTicker<'_>,
) -> Result<()> {
    if reader.offset() > desc.data_pointer {
        return Err(OsdError::MalformedDescriptor(format!(
            "data pointer {} of record set '{}' is behind stream offset {}",
            desc.data_pointer,
            desc.name,
            reader.offset()
        )));
    }
    if reader.offset() < desc.data_pointer {
        skipper.defer(reader.offset());
    }
    skipper.catch_up(reader, desc.data_pointer)?;
    points::read_sample_block(reader, set, ticker)
}

fn confirm_header(container: &Container, options: &mut ReadOptions) -> Result<()> {
    let mut mismatches = Vec::new();
    if let Some(expected) = &options.expected_device_name {
        if expected != &container.device_name {
            mismatches.push(Mismatch {
                kind: MismatchKind::DeviceName,
                expected: expected.clone(),
                found: container.device_name.clone(),
            });
        }
    }
    if let Some(expected) = &options.expected_object_key {
        if container.version.has_object_key() && expected != &container.object_key {
            mismatches.push(Mismatch {
                kind: MismatchKind::ObjectKey,
                expected: expected.clone(),
                found: container.object_key.clone(),
            });
        }
    }
    for mismatch in &mismatches {
        match options.confirm.as_mut() {
            Some(confirm) => {
                if !confirm(mismatch) {
                    return Err(OsdError::Aborted);
                }
            }
            None => warn!(kind = ?mismatch.kind, expected = %mismatch.expected,
                found = %mismatch.found, "header mismatch, continuing"),
        }
    }
    Ok(())
}

/// Fetch the body of a lazily-referenced record set from its source
/// file.  A no-op when the set already holds points.
pub fn load_record_set_data(
    path: &Path,
    set: &mut RecordSet,
    progress: &mut dyn ProgressSink,
) -> Result<()> {
    if set.has_data() {
        return Ok(());
    }
    let Some(file_ref) = set.file_ref else {
        return Ok(());
    };
    let mut reader = framer::open(path)?;
    let mut skipper = LazySkipReader::new();
    skipper.defer(reader.offset());
    skipper.catch_up(&mut reader, file_ref.data_pointer)?;
    let mut ticker = ProgressTicker::new(progress, file_ref.sample_count as u64);
    points::read_sample_block(&mut reader, set, &mut ticker)
}

/// Header-only inspection: the version and header fields plus one
/// numbered `"<i> RecordSetName"` entry per record set.  Sample blocks
/// are never touched.
pub fn get_header(path: &Path) -> Result<BTreeMap<String, String>> {
    let mut reader = framer::open(path)?;
    let container = descriptor::parse_header(&mut reader)?;

    let mut header = BTreeMap::new();
    header.insert(trim_key(format::FILE_VERSION), container.version.to_string());
    header.insert(trim_key(format::CREATION_TIME_STAMP), container.created.clone());
    header.insert(trim_key(format::FILE_COMMENT), container.file_comment.clone());
    header.insert(trim_key(format::DEVICE_NAME), container.device_name.clone());
    header.insert(
        trim_key(format::CHANNEL_CONFIG_TYPE),
        container.channel_config_type.as_wire_name().to_string(),
    );
    if container.version.has_object_key() {
        header.insert(trim_key(format::OBJECT_KEY), container.object_key.clone());
    }
    header.insert(trim_key(format::RECORD_SET_SIZE), container.record_set_count.to_string());

    for index in 1..=container.record_set_count {
        let name = read_record_set_name(&mut reader, container.version)?;
        header.insert(format!("{index} {}", trim_key(format::RECORD_SET_NAME)), name);
    }
    Ok(header)
}

fn read_record_set_name<R: Read>(
    reader: &mut CountingReader<R>,
    version: FormatVersion,
) -> Result<String> {
    let line = descriptor::read_descriptor_line(reader, version)?;
    line.split(format::DATA_DELIMITER)
        .find_map(|field| field.strip_prefix(format::RECORD_SET_NAME))
        .map(str::to_string)
        .ok_or_else(|| {
            OsdError::MalformedDescriptor("descriptor line without record set name".to_string())
        })
}

fn trim_key(key: &str) -> String {
    key.trim_end_matches(' ').trim_end_matches(':').trim_end().to_string()
}
