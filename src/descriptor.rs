//! Descriptor codec — the key-value line format of the file header and
//! of each record-set descriptor, across the four wire versions.
//!
//! # Framing
//! Versions 1–3 frame every line as `[u16 big-endian byte length][UTF-8
//! bytes]`, the text always ending in `\n` (stripped on read).  Version
//! 4 keeps that framing for header lines but frames each record-set
//! descriptor line as `[u32 big-endian byte length][raw UTF-8 bytes]`,
//! because a descriptor embedding every record's serialized properties
//! can exceed 64KB once many channels exist.

use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{OsdError, Result};
use crate::format::{self, FormatVersion};
use crate::model::{ChannelConfigType, Container, RecordDescriptor, RecordSetDescriptor};

// ── Line framing ─────────────────────────────────────────────────────────────

/// Read one u16-length-prefixed UTF-8 line; the trailing `\n` is stripped.
pub fn read_utf_line<R: Read + ?Sized>(reader: &mut R) -> Result<String> {
    let len = reader
        .read_u16::<BigEndian>()
        .map_err(|e| OsdError::from_read(e, "line length prefix"))? as usize;
    read_line_payload(reader, len)
}

/// Read one u32-length-prefixed raw UTF-8 line (version-4 descriptors).
pub fn read_int_line<R: Read + ?Sized>(reader: &mut R) -> Result<String> {
    let len = reader
        .read_u32::<BigEndian>()
        .map_err(|e| OsdError::from_read(e, "descriptor length prefix"))? as usize;
    read_line_payload(reader, len)
}

fn read_line_payload<R: Read + ?Sized>(reader: &mut R, len: usize) -> Result<String> {
    let mut buf = vec![0u8; len];
    reader
        .read_exact(&mut buf)
        .map_err(|e| OsdError::from_read(e, "framed line body"))?;
    let mut line = String::from_utf8(buf)?;
    if line.ends_with('\n') {
        line.pop();
    }
    Ok(line)
}

/// Write one u16-length-prefixed line; `\n` is appended on the wire.
pub fn write_utf_line<W: Write + ?Sized>(writer: &mut W, line: &str) -> Result<()> {
    let len = line.len() + 1;
    let prefix = u16::try_from(len).map_err(|_| OsdError::DescriptorTooLong { len })?;
    writer.write_u16::<BigEndian>(prefix)?;
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\n")?;
    Ok(())
}

/// Write one u32-length-prefixed line (version-4 descriptors).
pub fn write_int_line<W: Write + ?Sized>(writer: &mut W, line: &str) -> Result<()> {
    writer.write_u32::<BigEndian>((line.len() + 1) as u32)?;
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\n")?;
    Ok(())
}

pub fn read_descriptor_line<R: Read + ?Sized>(
    reader: &mut R,
    version: FormatVersion,
) -> Result<String> {
    if version.uses_int_framed_descriptors() {
        read_int_line(reader)
    } else {
        read_utf_line(reader)
    }
}

pub fn write_descriptor_line<W: Write + ?Sized>(
    writer: &mut W,
    line: &str,
    version: FormatVersion,
) -> Result<()> {
    if version.uses_int_framed_descriptors() {
        write_int_line(writer, line)
    } else {
        write_utf_line(writer, line)
    }
}

/// On-wire byte count of a line under the given frame overhead
/// (length prefix + text + newline).  The writer's pointer arithmetic
/// depends on this being exact.
pub fn framed_line_len(line: &str, frame_overhead: u64) -> u64 {
    frame_overhead + line.len() as u64 + 1
}

// ── Header ───────────────────────────────────────────────────────────────────

/// Parse the fixed header: the version line, then whitelisted key lines
/// until `NumberRecordSets` terminates the header.  The cursor is left
/// at the first descriptor line.
pub fn parse_header<R: Read + ?Sized>(reader: &mut R) -> Result<Container> {
    let line = read_utf_line(reader)?;
    let digits = line
        .strip_prefix(format::FILE_VERSION)
        .or_else(|| line.strip_prefix(format::LEGACY_FILE_VERSION))
        .ok_or_else(|| OsdError::UnsupportedFormatVersion(preview(&line)))?;
    let version = digits
        .trim()
        .parse::<u32>()
        .map_err(|_| OsdError::UnsupportedFormatVersion(digits.trim().to_string()))
        .and_then(FormatVersion::from_digit)?;

    let mut created = String::new();
    let mut file_comment = String::new();
    let mut device_name = String::new();
    let mut object_key = String::new();
    let mut channel_config_type = None;
    let mut record_set_count = None;

    // Tolerate unknown lines, but only a bounded number of them so a
    // stray binary stream cannot keep us looping.
    let mut remaining = format::HEADER_KEYS.len() + 1;
    while record_set_count.is_none() && remaining > 0 {
        remaining -= 1;
        let line = read_utf_line(reader)?;
        if let Some(v) = line.strip_prefix(format::CREATION_TIME_STAMP) {
            created = v.trim().to_string();
        } else if let Some(v) = line.strip_prefix(format::FILE_COMMENT) {
            file_comment = v.to_string();
        } else if let Some(v) = line.strip_prefix(format::DEVICE_NAME) {
            device_name = v.to_string();
        } else if let Some(v) = line.strip_prefix(format::OBJECT_KEY) {
            object_key = v.to_string();
        } else if let Some(v) = line.strip_prefix(format::CHANNEL_CONFIG_TYPE) {
            channel_config_type = Some(ChannelConfigType::from_wire_name(v)?);
        } else if let Some(v) = line.strip_prefix(format::RECORD_SET_SIZE) {
            let count = v.trim().parse::<usize>().map_err(|_| {
                OsdError::MalformedDescriptor(format!("unparsable record set count '{}'", v.trim()))
            })?;
            record_set_count = Some(count);
        }
    }

    let record_set_count = record_set_count.ok_or_else(|| {
        OsdError::MalformedDescriptor("header ends without NumberRecordSets".to_string())
    })?;
    let channel_config_type = channel_config_type.ok_or_else(|| {
        OsdError::MalformedDescriptor("header without Channel/Configuration Type".to_string())
    })?;

    Ok(Container {
        version,
        created,
        file_comment,
        device_name,
        channel_config_type,
        object_key,
        record_set_count,
    })
}

fn preview(line: &str) -> String {
    line.chars().take(40).collect()
}

// ── Record-set descriptors ───────────────────────────────────────────────────

/// Read exactly `count` descriptor lines (version-dependent framing)
/// and parse each into its key map.
pub fn parse_record_set_descriptors<R: Read + ?Sized>(
    reader: &mut R,
    count: usize,
    version: FormatVersion,
) -> Result<Vec<RecordSetDescriptor>> {
    let mut descriptors = Vec::with_capacity(count);
    for _ in 0..count {
        let line = read_descriptor_line(reader, version)?;
        descriptors.push(parse_descriptor_line(&line)?);
    }
    Ok(descriptors)
}

/// Split one descriptor line on the field delimiter into the descriptor
/// shape.  Unknown fields are carried over silently; missing required
/// fields are an error.
pub fn parse_descriptor_line(line: &str) -> Result<RecordSetDescriptor> {
    let mut name = None;
    let mut channel_config_label = None;
    let mut comment = String::new();
    let mut properties = String::new();
    let mut records = Vec::new();
    let mut sample_count = None;
    let mut data_pointer = None;

    for field in line.split(format::DATA_DELIMITER) {
        if let Some(v) = field.strip_prefix(format::RECORD_SET_NAME) {
            name = Some(format::truncate_name(v).to_string());
        } else if let Some(v) = field.strip_prefix(format::CHANNEL_CONFIG_NAME) {
            channel_config_label = Some(v.trim().to_string());
        } else if let Some(v) = field.strip_prefix(format::RECORD_SET_COMMENT) {
            comment = v.to_string();
        } else if let Some(v) = field.strip_prefix(format::RECORD_SET_PROPERTIES) {
            properties = v.to_string();
        } else if let Some(v) = field.strip_prefix(format::RECORDS_PROPERTIES) {
            records = parse_record_blobs(v)?;
        } else if let Some(v) = field.strip_prefix(format::RECORD_DATA_SIZE) {
            let count = v.trim().parse::<usize>().map_err(|_| {
                OsdError::MalformedDescriptor(format!("unparsable sample count '{}'", v.trim()))
            })?;
            sample_count = Some(count);
        } else if let Some(v) = field.strip_prefix(format::RECORD_SET_DATA_POINTER) {
            let pointer = v.trim().parse::<u64>().map_err(|_| {
                OsdError::MalformedDescriptor(format!("unparsable data pointer '{}'", v.trim()))
            })?;
            data_pointer = Some(pointer);
        }
    }

    Ok(RecordSetDescriptor {
        name: require(name, format::RECORD_SET_NAME)?,
        channel_config_label: require(channel_config_label, format::CHANNEL_CONFIG_NAME)?,
        comment,
        properties,
        records,
        sample_count: require(sample_count, format::RECORD_DATA_SIZE)?,
        data_pointer: require(data_pointer, format::RECORD_SET_DATA_POINTER)?,
    })
}

fn require<T>(value: Option<T>, key: &str) -> Result<T> {
    value.ok_or_else(|| {
        OsdError::MalformedDescriptor(format!("descriptor without required key '{}'", key.trim()))
    })
}

/// The records field is a concatenation of one end-marker-terminated
/// blob per record, each (except the first, whose prefix the field
/// split already consumed) introduced by the `RecordProperties : ` key.
fn parse_record_blobs(field: &str) -> Result<Vec<RecordDescriptor>> {
    field
        .split(format::PROPERTY_END_MARKER)
        .map(|blob| blob.strip_prefix(format::RECORDS_PROPERTIES).unwrap_or(blob))
        .filter(|blob| !blob.is_empty())
        .map(RecordDescriptor::from_blob)
        .collect()
}

/// Serialize everything up to and including the sample-count field.
/// The data pointer is appended separately (see the writer's layout
/// passes), space-padded to a fixed width so this body's length is
/// final.
pub fn descriptor_body(desc: &RecordSetDescriptor) -> String {
    let mut body = String::with_capacity(256);
    body.push_str(format::RECORD_SET_NAME);
    body.push_str(format::truncate_name(&desc.name));
    body.push_str(format::DATA_DELIMITER);
    body.push_str(format::CHANNEL_CONFIG_NAME);
    body.push_str(&desc.channel_config_label);
    body.push_str(format::DATA_DELIMITER);
    body.push_str(format::RECORD_SET_COMMENT);
    body.push_str(&desc.comment);
    body.push_str(format::DATA_DELIMITER);
    body.push_str(format::RECORD_SET_PROPERTIES);
    body.push_str(&desc.properties);
    body.push_str(format::DATA_DELIMITER);
    for record in &desc.records {
        body.push_str(format::RECORDS_PROPERTIES);
        body.push_str(&record.to_blob());
    }
    body.push_str(format::DATA_DELIMITER);
    body.push_str(format::RECORD_DATA_SIZE);
    body.push_str(&padded(desc.sample_count as u64));
    body.push_str(format::DATA_DELIMITER);
    body
}

/// Complete a descriptor line by appending the injected data pointer.
pub fn descriptor_line(body: &str, data_pointer: u64) -> String {
    format!("{body}{}{}", format::RECORD_SET_DATA_POINTER, padded(data_pointer))
}

/// Fixed on-wire length of the pointer field, part of pass-A sizing.
pub fn pointer_field_len() -> u64 {
    (format::RECORD_SET_DATA_POINTER.len() + format::POINTER_FIELD_WIDTH) as u64
}

fn padded(value: u64) -> String {
    format!("{:>width$}", value, width = format::POINTER_FIELD_WIDTH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_descriptor() -> RecordSetDescriptor {
        RecordSetDescriptor {
            name: "1) Laden".to_string(),
            channel_config_label: "1 : Ausgang".to_string(),
            comment: "charge cycle".to_string(),
            properties: "timeStep_ms=1000|-|startTimeStamp=1217845600000".to_string(),
            records: vec![
                RecordDescriptor {
                    name: "Spannung".to_string(),
                    unit: "V".to_string(),
                    symbol: "U".to_string(),
                    is_active: true,
                    extra: String::new(),
                },
                RecordDescriptor {
                    name: "Leistung".to_string(),
                    unit: "W".to_string(),
                    symbol: "P".to_string(),
                    is_active: false,
                    extra: "_color=0,0,255".to_string(),
                },
            ],
            sample_count: 360,
            data_pointer: 0,
        }
    }

    #[test]
    fn utf_line_round_trip() {
        let mut buf = Vec::new();
        write_utf_line(&mut buf, "DeviceName : AkkuMaster C4").unwrap();
        assert_eq!(buf[0], 0, "high length byte");
        let line = read_utf_line(&mut Cursor::new(buf)).unwrap();
        assert_eq!(line, "DeviceName : AkkuMaster C4");
    }

    #[test]
    fn int_line_handles_oversized_content() {
        let big = "x".repeat(80_000);
        let mut buf = Vec::new();
        write_int_line(&mut buf, &big).unwrap();
        assert_eq!(read_int_line(&mut Cursor::new(buf)).unwrap(), big);
    }

    #[test]
    fn utf_line_rejects_oversized_content() {
        let big = "x".repeat(80_000);
        let mut buf = Vec::new();
        assert!(matches!(
            write_utf_line(&mut buf, &big),
            Err(OsdError::DescriptorTooLong { .. })
        ));
    }

    #[test]
    fn framed_len_matches_written_bytes() {
        let line = "RecordSetName : test";
        let mut buf = Vec::new();
        write_utf_line(&mut buf, line).unwrap();
        assert_eq!(buf.len() as u64, framed_line_len(line, crate::format::UTF_FRAME_OVERHEAD));

        buf.clear();
        write_int_line(&mut buf, line).unwrap();
        assert_eq!(buf.len() as u64, framed_line_len(line, crate::format::INT_FRAME_OVERHEAD));
    }

    #[test]
    fn descriptor_line_round_trips() {
        let desc = sample_descriptor();
        let line = descriptor_line(&descriptor_body(&desc), 4242);
        let parsed = parse_descriptor_line(&line).unwrap();

        assert_eq!(parsed.name, desc.name);
        assert_eq!(parsed.channel_config_label, desc.channel_config_label);
        assert_eq!(parsed.comment, desc.comment);
        assert_eq!(parsed.properties, desc.properties);
        assert_eq!(parsed.records, desc.records);
        assert_eq!(parsed.sample_count, 360);
        assert_eq!(parsed.data_pointer, 4242);
        assert_eq!(parsed.time_step_ms(), Some(1000.0));
    }

    #[test]
    fn pointer_injection_keeps_body_length_fixed() {
        let body = descriptor_body(&sample_descriptor());
        let short = descriptor_line(&body, 7);
        let long = descriptor_line(&body, 1_234_567_890);
        assert_eq!(short.len(), long.len());
    }

    #[test]
    fn missing_required_key_is_malformed() {
        let line = format!(
            "{}charging{}{}       100",
            crate::format::RECORD_SET_NAME,
            crate::format::DATA_DELIMITER,
            crate::format::RECORD_DATA_SIZE,
        );
        assert!(matches!(
            parse_descriptor_line(&line),
            Err(OsdError::MalformedDescriptor(_))
        ));
    }

    #[test]
    fn header_requires_known_version() {
        let mut buf = Vec::new();
        write_utf_line(&mut buf, "DataExplorer version : 9").unwrap();
        assert!(matches!(
            parse_header(&mut Cursor::new(buf)),
            Err(OsdError::UnsupportedFormatVersion(_))
        ));

        let mut buf = Vec::new();
        write_utf_line(&mut buf, "some other file").unwrap();
        assert!(matches!(
            parse_header(&mut Cursor::new(buf)),
            Err(OsdError::UnsupportedFormatVersion(_))
        ));
    }

    #[test]
    fn header_parse_collects_whitelisted_keys() {
        let mut buf = Vec::new();
        write_utf_line(&mut buf, "DataExplorer version : 2").unwrap();
        write_utf_line(&mut buf, "Created : 2011-06-01 09:30:00").unwrap();
        write_utf_line(&mut buf, "FileComment : first flight").unwrap();
        write_utf_line(&mut buf, "DeviceName : Picolario").unwrap();
        write_utf_line(&mut buf, "Channel/Configuration Type : TYPE_OUTLET").unwrap();
        write_utf_line(&mut buf, "ObjectKey : glider-1").unwrap();
        write_utf_line(&mut buf, "NumberRecordSets : 3").unwrap();

        let header = parse_header(&mut Cursor::new(buf)).unwrap();
        assert_eq!(header.version, FormatVersion::V2);
        assert_eq!(header.created, "2011-06-01 09:30:00");
        assert_eq!(header.file_comment, "first flight");
        assert_eq!(header.device_name, "Picolario");
        assert_eq!(header.channel_config_type, ChannelConfigType::Outlet);
        assert_eq!(header.object_key, "glider-1");
        assert_eq!(header.record_set_count, 3);
    }
}
