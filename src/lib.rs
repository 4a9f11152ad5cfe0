pub mod crc;
pub mod crypto;
pub mod codec;
pub mod record;
pub mod filter;
pub mod scan;
pub mod header;
pub mod frame;
pub mod error;
pub mod sink;
pub mod io_stream;
pub mod archive;

pub use archive::{list, pack, unpack, unpack_with_sink, verify, EntryInfo, PackOptions, UnpackSummary, VerifyReport};
pub use codec::CompressionMode;
pub use crypto::CipherMode;
pub use error::{ArchiveError, Result, Warning};
pub use filter::FilterOptions;
pub use io_stream::{ArchiveReader, ArchiveWriter, Entry, PackSummary};
pub use record::{FileAttributes, FileRecord, FileType};
pub use scan::scan;
pub use sink::{FsMetadataSink, MetadataSink, NoopMetadataSink};
