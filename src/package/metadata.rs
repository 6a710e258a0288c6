//! Structured package lists shipped inside installer images
//!
//! Live images carry `LiveOS/.packages.json.gz`: a JSON array of
//! `{name, version, release, arch}` records, usually gzip-compressed.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tracing::debug;

use crate::error::MetadataError;
use crate::package::Package;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

const METADATA_CANDIDATES: &[&str] = &["LiveOS/.packages.json.gz", "LiveOS/.packages.json"];

/// Locates the package list below a mounted image root
pub fn image_metadata_path(image_root: &Path) -> Result<PathBuf, MetadataError> {
    METADATA_CANDIDATES
        .iter()
        .map(|candidate| image_root.join(candidate))
        .find(|path| path.is_file())
        .ok_or_else(|| MetadataError::NotFound(image_root.join(METADATA_CANDIDATES[0])))
}

/// Reads a package list, transparently decompressing gzip input
pub fn read_package_list(path: &Path) -> Result<Vec<Package>, MetadataError> {
    debug!("Reading packages from {:?}", path);

    let mut reader = BufReader::new(File::open(path)?);
    let mut magic = [0u8; 2];
    let read = reader.read(&mut magic)?;

    // Re-chain the sniffed bytes in front of the rest of the stream.
    let stream = (&magic[..read]).chain(reader);
    let packages = if read == GZIP_MAGIC.len() && magic == GZIP_MAGIC {
        serde_json::from_reader(GzDecoder::new(stream))?
    } else {
        serde_json::from_reader(stream)?
    };

    Ok(packages)
}
