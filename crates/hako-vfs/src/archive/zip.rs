//! Zip archives.

use std::io::{Cursor, Read, Write};
use std::time::SystemTime;

use chrono::{DateTime, Datelike, Timelike, Utc};
use hako_types::NodeId;
use ::zip::write::FileOptions;
use ::zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::{Archiver, Extractor, collect_entries};
use crate::error::VfsResult;
use crate::mount::MountPoint;
use crate::node::Node;

#[derive(Debug, Default, Clone, Copy)]
pub struct ZipArchiver;

/// Zip timestamps are calendar fields with 1980 as the floor.
fn zip_time(at: SystemTime) -> ::zip::DateTime {
    let at: DateTime<Utc> = at.into();
    ::zip::DateTime::from_date_and_time(
        at.year().clamp(1980, 2107) as u16,
        at.month() as u8,
        at.day() as u8,
        at.hour() as u8,
        at.minute() as u8,
        at.second() as u8,
    )
    .unwrap_or_default()
}

impl Archiver for ZipArchiver {
    fn compress(
        &self,
        mount: &MountPoint,
        folder: NodeId,
        out: &mut dyn Write,
        filter: &dyn Fn(&Node) -> bool,
    ) -> VfsResult<()> {
        let entries = collect_entries(mount, folder, filter)?;
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for entry in &entries {
            if entry.is_dir {
                let options = FileOptions::default()
                    .compression_method(CompressionMethod::Stored)
                    .last_modified_time(::zip::DateTime::default());
                zip.add_directory(entry.name.as_str(), options)?;
            } else {
                let options = FileOptions::default()
                    .compression_method(CompressionMethod::Deflated)
                    .last_modified_time(zip_time(entry.modified_at));
                zip.start_file(entry.name.as_str(), options)?;
                zip.write_all(entry.content)?;
            }
        }
        let buffer = zip.finish()?.into_inner();
        out.write_all(&buffer)?;
        tracing::debug!(entries = entries.len(), bytes = buffer.len(), "zipped folder");
        Ok(())
    }

    fn extract(
        &self,
        mount: &mut MountPoint,
        folder: NodeId,
        input: &mut dyn Read,
        overwrite: bool,
        strip: usize,
    ) -> VfsResult<()> {
        let mut buffer = Vec::new();
        input.read_to_end(&mut buffer)?;
        let mut archive = ZipArchive::new(Cursor::new(buffer))?;

        let mut extractor = Extractor::new(mount, folder, overwrite, strip)?;
        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            let name = file.name().to_string();
            let is_dir = file.is_dir();
            let mut data = Vec::new();
            if !is_dir {
                file.read_to_end(&mut data)?;
            }
            extractor.entry(&name, is_dir, data)?;
        }
        extractor.finish();
        Ok(())
    }
}
