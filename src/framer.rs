//! Container envelope handling: transparent zip wrapping on both ends.
//!
//! A container file is either the framed stream itself or a zip archive
//! holding that stream as its single deflated entry.  The distinction is
//! made by sniffing the first four bytes; every descriptor offset and
//! data pointer refers to the DECOMPRESSED stream, so the rest of the
//! crate never sees the envelope.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::error::{OsdError, Result};

const ZIP_LOCAL_HEADER_SIG: u32 = 0x0403_4b50;
const ZIP_CENTRAL_HEADER_SIG: u32 = 0x0201_4b50;
const ZIP_END_OF_CENTRAL_SIG: u32 = 0x0605_4b50;
const ZIP_METHOD_STORED: u16 = 0;
const ZIP_METHOD_DEFLATED: u16 = 8;

// ── Reading ──────────────────────────────────────────────────────────────────

/// A reader that tracks its absolute offset within the decompressed
/// stream, so descriptor data pointers can be checked and skipped to.
pub struct CountingReader<R> {
    inner: R,
    offset: u64,
}

impl<R: Read> CountingReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, offset: 0 }
    }

    /// Bytes consumed so far, an offset into the decompressed stream.
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.offset += n as u64;
        Ok(n)
    }
}

/// Open a container file, unwrapping a zip envelope when present.
pub fn open(path: &Path) -> Result<CountingReader<Box<dyn Read>>> {
    let mut file = File::open(path)?;
    let mut magic = [0u8; 4];
    let sniffed = read_up_to(&mut file, &mut magic)?;
    file.seek(SeekFrom::Start(0))?;

    if sniffed == 4 && magic == [0x50, 0x4b, 0x03, 0x04] {
        let reader = open_zip_entry(file)?;
        Ok(CountingReader::new(reader))
    } else {
        Ok(CountingReader::new(Box::new(BufReader::new(file))))
    }
}

fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Position past the first local file header and return a decompressing
/// reader over that entry's data.  Only the first entry is consulted; a
/// container archive holds exactly one.
fn open_zip_entry(file: File) -> Result<Box<dyn Read>> {
    let mut reader = BufReader::new(file);
    let sig = reader.read_u32::<LittleEndian>()?;
    if sig != ZIP_LOCAL_HEADER_SIG {
        return Err(OsdError::MalformedDescriptor(
            "zip envelope without local file header".to_string(),
        ));
    }
    let _version = reader.read_u16::<LittleEndian>()?;
    let _flags = reader.read_u16::<LittleEndian>()?;
    let method = reader.read_u16::<LittleEndian>()?;
    let _mod_time = reader.read_u16::<LittleEndian>()?;
    let _mod_date = reader.read_u16::<LittleEndian>()?;
    let _crc = reader.read_u32::<LittleEndian>()?;
    let compressed_size = reader.read_u32::<LittleEndian>()? as u64;
    let _uncompressed_size = reader.read_u32::<LittleEndian>()?;
    let name_len = reader.read_u16::<LittleEndian>()? as u64;
    let extra_len = reader.read_u16::<LittleEndian>()? as u64;
    io::copy(&mut reader.by_ref().take(name_len + extra_len), &mut io::sink())?;

    match method {
        ZIP_METHOD_DEFLATED => Ok(Box::new(DeflateDecoder::new(reader))),
        ZIP_METHOD_STORED => Ok(Box::new(reader.take(compressed_size))),
        other => Err(OsdError::MalformedDescriptor(format!(
            "unsupported zip compression method {other}"
        ))),
    }
}

// ── Writing ──────────────────────────────────────────────────────────────────

/// Output side of the envelope.  Flat containers stream straight to the
/// file; zip containers buffer the payload so the local header can carry
/// real sizes and CRC up front.
pub enum ContainerSink {
    Flat(BufWriter<File>),
    Zip { file: File, entry_name: String, payload: Vec<u8> },
}

impl ContainerSink {
    pub fn create(path: &Path, zip: bool) -> Result<Self> {
        let file = File::create(path)?;
        if zip {
            let entry_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "data.osd".to_string());
            Ok(ContainerSink::Zip { file, entry_name, payload: Vec::new() })
        } else {
            Ok(ContainerSink::Flat(BufWriter::new(file)))
        }
    }

    /// Flush the envelope.  For zip sinks this writes the whole archive;
    /// nothing hits the disk before this call.
    pub fn finish(self) -> Result<()> {
        match self {
            ContainerSink::Flat(mut writer) => {
                writer.flush()?;
                Ok(())
            }
            ContainerSink::Zip { file, entry_name, payload } => {
                write_zip_archive(file, &entry_name, &payload)
            }
        }
    }
}

impl Write for ContainerSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            ContainerSink::Flat(writer) => writer.write(buf),
            ContainerSink::Zip { payload, .. } => {
                payload.extend_from_slice(buf);
                Ok(buf.len())
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            ContainerSink::Flat(writer) => writer.flush(),
            ContainerSink::Zip { .. } => Ok(()),
        }
    }
}

fn write_zip_archive(file: File, entry_name: &str, payload: &[u8]) -> Result<()> {
    let crc = crc32fast::hash(payload);
    let mut deflated = Vec::with_capacity(payload.len() / 2);
    let mut encoder = DeflateEncoder::new(&mut deflated, Compression::default());
    encoder.write_all(payload)?;
    encoder.finish()?;

    let (dos_time, dos_date) = dos_timestamp();
    let name = entry_name.as_bytes();
    let mut out = BufWriter::new(file);

    out.write_u32::<LittleEndian>(ZIP_LOCAL_HEADER_SIG)?;
    out.write_u16::<LittleEndian>(20)?; // version needed to extract
    out.write_u16::<LittleEndian>(0)?; // flags
    out.write_u16::<LittleEndian>(ZIP_METHOD_DEFLATED)?;
    out.write_u16::<LittleEndian>(dos_time)?;
    out.write_u16::<LittleEndian>(dos_date)?;
    out.write_u32::<LittleEndian>(crc)?;
    out.write_u32::<LittleEndian>(deflated.len() as u32)?;
    out.write_u32::<LittleEndian>(payload.len() as u32)?;
    out.write_u16::<LittleEndian>(name.len() as u16)?;
    out.write_u16::<LittleEndian>(0)?; // extra length
    out.write_all(name)?;
    out.write_all(&deflated)?;

    let central_offset = (30 + name.len() + deflated.len()) as u32;
    out.write_u32::<LittleEndian>(ZIP_CENTRAL_HEADER_SIG)?;
    out.write_u16::<LittleEndian>(20)?; // version made by
    out.write_u16::<LittleEndian>(20)?; // version needed
    out.write_u16::<LittleEndian>(0)?;
    out.write_u16::<LittleEndian>(ZIP_METHOD_DEFLATED)?;
    out.write_u16::<LittleEndian>(dos_time)?;
    out.write_u16::<LittleEndian>(dos_date)?;
    out.write_u32::<LittleEndian>(crc)?;
    out.write_u32::<LittleEndian>(deflated.len() as u32)?;
    out.write_u32::<LittleEndian>(payload.len() as u32)?;
    out.write_u16::<LittleEndian>(name.len() as u16)?;
    out.write_u16::<LittleEndian>(0)?; // extra length
    out.write_u16::<LittleEndian>(0)?; // comment length
    out.write_u16::<LittleEndian>(0)?; // disk number
    out.write_u16::<LittleEndian>(0)?; // internal attributes
    out.write_u32::<LittleEndian>(0)?; // external attributes
    out.write_u32::<LittleEndian>(0)?; // local header offset
    out.write_all(name)?;

    let central_size = (46 + name.len()) as u32;
    out.write_u32::<LittleEndian>(ZIP_END_OF_CENTRAL_SIG)?;
    out.write_u16::<LittleEndian>(0)?; // disk number
    out.write_u16::<LittleEndian>(0)?; // central directory disk
    out.write_u16::<LittleEndian>(1)?; // entries on this disk
    out.write_u16::<LittleEndian>(1)?; // total entries
    out.write_u32::<LittleEndian>(central_size)?;
    out.write_u32::<LittleEndian>(central_offset)?;
    out.write_u16::<LittleEndian>(0)?; // comment length
    out.flush()?;
    Ok(())
}

/// MS-DOS timestamp pair of the current local time, for the zip entry.
fn dos_timestamp() -> (u16, u16) {
    use chrono::{Datelike, Local, Timelike};
    let now = Local::now();
    let time =
        ((now.hour() as u16) << 11) | ((now.minute() as u16) << 5) | (now.second() as u16 / 2);
    let year = (now.year() - 1980).clamp(0, 127) as u16;
    let date = (year << 9) | ((now.month() as u16) << 5) | (now.day() as u16);
    (time, date)
}
