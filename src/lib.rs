//! Reader and writer for the OSD multi-channel measurement container
//! format: versioned key-value descriptors, optional zip wrapping, and
//! packed big-endian fixed-point sample blocks with lazy selective
//! decoding.

pub mod descriptor;
pub mod error;
pub mod format;
pub mod framer;
pub mod model;
pub mod points;
pub mod progress;
pub mod reader;
pub mod resolve;
pub mod select;
pub mod skip;
pub mod writer;

pub use error::{OsdError, Result};
pub use format::FormatVersion;
pub use model::{
    Channel, ChannelConfigType, Container, Device, FileDataRef, GenericDevice, Record,
    RecordDescriptor, RecordSet, RecordSetDescriptor,
};
pub use progress::{NoProgress, ProgressSink};
pub use reader::{
    get_header, load_record_set_data, read, read_channel, read_record_set, Mismatch,
    MismatchKind, ReadOptions, ReadOutcome,
};
pub use resolve::{ChannelInfo, Resolution, ResolutionContext};
pub use writer::{write, WriteOptions};
