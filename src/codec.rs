//! Magic-byte sniffing for compressed streams.
//!
//! Backup archives and stored objects are "optionally compressed"; the engine
//! never trusts file extensions and instead sniffs the leading bytes to pick
//! a decoder. Unknown magic falls through to a plain byte stream.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];
const XZ_MAGIC: [u8; 6] = [0xfd, b'7', b'z', b'X', b'Z', 0x00];

/// Open `path` and return a reader that yields its decompressed bytes.
///
/// Gzip, zstd, and xz containers are recognized by magic bytes; anything else
/// is returned verbatim.
pub fn open_decoded(path: &Path) -> io::Result<Box<dyn Read>> {
    let mut file = File::open(path)?;
    let mut magic = [0u8; 6];
    let n = file.read(&mut magic)?;
    file.seek(SeekFrom::Start(0))?;

    let reader = BufReader::new(file);
    let decoded: Box<dyn Read> = if magic[..n].starts_with(&GZIP_MAGIC) {
        Box::new(flate2::read::GzDecoder::new(reader))
    } else if magic[..n].starts_with(&ZSTD_MAGIC) {
        Box::new(zstd::stream::Decoder::new(reader)?)
    } else if magic[..n].starts_with(&XZ_MAGIC) {
        Box::new(xz2::read::XzDecoder::new(reader))
    } else {
        Box::new(reader)
    };
    Ok(decoded)
}
