//! Sample block codec: the packed big-endian i32 matrix of one record
//! set.
//!
//! A block is `sampleCount` rows.  Under variable time steps each row
//! leads with its timestamp in ms; then come the values of every ACTIVE
//! record in declaration order.  Values are fixed-point (physical value
//! scaled by 1000), stored verbatim for raw record sets.

use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{OsdError, Result};
use crate::format::BYTES_PER_POINT;
use crate::model::{Device, RecordSet};
use crate::progress::ProgressTicker;

/// Decode one sample block into `set`, which must carry the descriptor
/// shape (records declared, sample count in its file reference).
pub fn read_sample_block<R: Read + ?Sized>(
    reader: &mut R,
    set: &mut RecordSet,
    progress: &mut ProgressTicker<'_>,
) -> Result<()> {
    let sample_count = set.file_ref.map(|r| r.sample_count).unwrap_or(0);
    let active = set.active_record_count();
    let variable = !set.is_time_step_constant();

    set.timestamps_ms.reserve(sample_count);
    for record in set.records.iter_mut().filter(|r| r.is_active) {
        record.points.reserve(sample_count);
    }

    let mut row = vec![0i32; active];
    for _ in 0..sample_count {
        let timestamp = if variable {
            Some(read_point(reader, set)?)
        } else {
            None
        };
        for value in row.iter_mut() {
            *value = read_point(reader, set)?;
        }
        set.push_row(timestamp, &row)?;
        progress.advance(1);
    }
    Ok(())
}

fn read_point<R: Read + ?Sized>(reader: &mut R, set: &RecordSet) -> Result<i32> {
    reader.read_i32::<BigEndian>().map_err(|e| {
        OsdError::from_read(e, &format!("sample block of record set '{}'", set.name))
    })
}

/// Encode one sample block.  Non-raw record sets hold calibrated values
/// and are converted back to raw device units through the device's
/// reverse translation.
pub fn write_sample_block<W: Write + ?Sized>(
    writer: &mut W,
    set: &RecordSet,
    device: &dyn Device,
    progress: &mut ProgressTicker<'_>,
) -> Result<()> {
    let variable = !set.is_time_step_constant();
    let active: Vec<_> = set.active_records().collect();

    for row in 0..set.sample_count() {
        if variable {
            writer.write_i32::<BigEndian>(*set.timestamps_ms.get(row).unwrap_or(&0))?;
        }
        for record in &active {
            let point = record.points[row];
            let raw = if set.is_raw {
                point
            } else {
                (device.reverse_translate(record, point as f64 / 1000.0) * 1000.0).round() as i32
            };
            writer.write_i32::<BigEndian>(raw)?;
        }
        progress.advance(1);
    }
    Ok(())
}

/// On-wire byte count of `set`'s sample block.
pub fn block_byte_size(set: &RecordSet) -> u64 {
    let columns = set.active_record_count() as u64
        + if set.is_time_step_constant() { 0 } else { 1 };
    columns * BYTES_PER_POINT * set.persisted_sample_count() as u64
}
