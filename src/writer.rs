//! Write pass: persist one channel's record sets as a container file.
//!
//! # Layout passes
//! Each descriptor embeds the absolute offset of its OWN sample block,
//! and that offset depends on the serialized size of every line written
//! before it.  The writer therefore lays the file out in three passes:
//! size every descriptor body (A), inject fixed-width data pointers
//! while accumulating block sizes (B), then emit lines and blocks (C).
//! The pointer field is space-padded so injection never changes a
//! body's already-counted length.

use std::io::Write;
use std::path::Path;

use chrono::Local;
use tracing::debug;

use crate::descriptor;
use crate::error::{OsdError, Result};
use crate::format::{self, FormatVersion};
use crate::framer::ContainerSink;
use crate::model::{Channel, Device};
use crate::points;
use crate::progress::{NoProgress, ProgressSink, ProgressTicker};
use crate::reader;

pub struct WriteOptions {
    pub version: FormatVersion,
    /// Wrap the stream in a single-entry zip archive.
    pub zip: bool,
    /// Creation timestamp to persist; current local time when absent.
    pub created: Option<String>,
    pub progress: Box<dyn ProgressSink>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            version: FormatVersion::V4,
            zip: false,
            created: None,
            progress: Box::new(NoProgress),
        }
    }
}

/// Persist `channel` to `path`.  Record sets still referencing an
/// earlier file are force-loaded first; skipping that would emit their
/// descriptors with no bytes behind them.
pub fn write(
    path: &Path,
    channel: &mut Channel,
    device: &dyn Device,
    mut options: WriteOptions,
) -> Result<()> {
    force_load_lazy_sets(channel, options.progress.as_mut())?;

    let header_lines = header_lines(channel, device, &options);
    let descriptors: Vec<_> = channel.record_sets.iter().map(|s| s.descriptor()).collect();
    let bodies: Vec<String> = descriptors.iter().map(descriptor::descriptor_body).collect();

    // Pass A: the pointer of the first block is the total size of the
    // header plus every framed descriptor line.
    let mut file_pointer: u64 = header_lines
        .iter()
        .map(|l| descriptor::framed_line_len(l, format::UTF_FRAME_OVERHEAD))
        .sum();
    let frame_overhead = options.version.descriptor_frame_overhead();
    for body in &bodies {
        let text_len = body.len() as u64 + descriptor::pointer_field_len();
        if !options.version.uses_int_framed_descriptors()
            && text_len + 1 > u64::from(u16::MAX)
        {
            return Err(OsdError::DescriptorTooLong { len: (text_len + 1) as usize });
        }
        file_pointer += frame_overhead + text_len + 1;
    }

    // Pass B: inject pointers, advancing by each block's byte size.
    let mut lines = Vec::with_capacity(bodies.len());
    for (body, set) in bodies.iter().zip(&channel.record_sets) {
        lines.push(descriptor::descriptor_line(body, file_pointer));
        debug!(name = %set.name, data_pointer = file_pointer, "record set laid out");
        file_pointer += points::block_byte_size(set);
    }

    // Pass C: emission.
    let total_rows: u64 = channel.record_sets.iter().map(|s| s.sample_count() as u64).sum();
    let mut sink = ContainerSink::create(path, options.zip)?;
    for line in &header_lines {
        descriptor::write_utf_line(&mut sink, line)?;
    }
    for line in &lines {
        descriptor::write_descriptor_line(&mut sink, line, options.version)?;
    }
    let mut ticker = ProgressTicker::new(options.progress.as_mut(), total_rows);
    for set in &channel.record_sets {
        points::write_sample_block(&mut sink, set, device, &mut ticker)?;
    }
    sink.flush()?;
    sink.finish()
}

fn force_load_lazy_sets(channel: &mut Channel, progress: &mut dyn ProgressSink) -> Result<()> {
    let origin = channel.origin_path.clone();
    for set in &mut channel.record_sets {
        if set.has_data() || set.file_ref.is_none() {
            continue;
        }
        let Some(origin) = origin.as_deref() else {
            return Err(OsdError::MalformedDescriptor(format!(
                "record set '{}' holds no sample data and its source file is unknown",
                set.name
            )));
        };
        reader::load_record_set_data(origin, set, progress)?;
    }
    Ok(())
}

fn header_lines(channel: &Channel, device: &dyn Device, options: &WriteOptions) -> Vec<String> {
    let created = options
        .created
        .clone()
        .unwrap_or_else(|| Local::now().format(format::TIMESTAMP_FORMAT).to_string());

    let mut lines = vec![
        format!("{}{}", format::FILE_VERSION, options.version),
        format!("{}{}", format::CREATION_TIME_STAMP, created),
        format!("{}{}", format::FILE_COMMENT, channel.file_comment),
        format!("{}{}", format::DEVICE_NAME, device.name()),
        format!("{}{}", format::CHANNEL_CONFIG_TYPE, channel.channel_type.as_wire_name()),
    ];
    if options.version.has_object_key() {
        lines.push(format!("{}{}", format::OBJECT_KEY, channel.object_key));
    }
    lines.push(format!("{}{}", format::RECORD_SET_SIZE, channel.record_sets.len()));
    lines
}
