//! Baseline JPEG serialization of captured frames

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

use crate::error::{Result, SnapshotError};

/// Quality libjpeg applies when none is set
pub const DEFAULT_QUALITY: u8 = 75;

/// `<dir>/snapshot_YYYYMMDD_HHMMSS.jpg`.
///
/// Second resolution: two snapshots taken within the same second share a
/// name.
pub fn snapshot_path<Tz>(dir: &Path, at: &DateTime<Tz>) -> PathBuf
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    dir.join(format!("snapshot_{}.jpg", at.format("%Y%m%d_%H%M%S")))
}

/// Write `image` to `path` as a baseline JPEG, replacing any existing file
pub fn encode(image: &RgbImage, path: &Path, quality: u8) -> Result<()> {
    let write_err = |source| SnapshotError::Write {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(path).map_err(write_err)?;
    let mut writer = BufWriter::new(file);

    JpegEncoder::new_with_quality(&mut writer, quality)
        .encode_image(image)
        .map_err(|source| SnapshotError::Encode {
            path: path.to_path_buf(),
            source,
        })?;

    writer.flush().map_err(write_err)
}
