//! Tar archives (GNU format, so names longer than 100 bytes survive).

use std::io::{self, Read, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use ::tar::{Archive, Builder, EntryType, Header};
use hako_types::NodeId;

use super::{Archiver, Extractor, collect_entries};
use crate::error::VfsResult;
use crate::mount::MountPoint;
use crate::node::Node;

#[derive(Debug, Default, Clone, Copy)]
pub struct TarArchiver;

fn unix_seconds(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

impl Archiver for TarArchiver {
    fn compress(
        &self,
        mount: &MountPoint,
        folder: NodeId,
        out: &mut dyn Write,
        filter: &dyn Fn(&Node) -> bool,
    ) -> VfsResult<()> {
        let entries = collect_entries(mount, folder, filter)?;
        let mut builder = Builder::new(out);
        for entry in &entries {
            let mut header = Header::new_gnu();
            if entry.is_dir {
                header.set_entry_type(EntryType::Directory);
                header.set_mode(0o755);
                header.set_size(0);
                header.set_mtime(0);
                builder.append_data(&mut header, &entry.name, io::empty())?;
            } else {
                header.set_entry_type(EntryType::Regular);
                header.set_mode(0o644);
                header.set_size(entry.content.len() as u64);
                header.set_mtime(unix_seconds(entry.modified_at));
                builder.append_data(&mut header, &entry.name, entry.content)?;
            }
        }
        builder.finish()?;
        tracing::debug!(entries = entries.len(), "tarred folder");
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
        let mut archive = Archive::new(input);
        let mut extractor = Extractor::new(mount, folder, overwrite, strip)?;
        for entry in archive.entries()? {
            let mut entry = entry?;
            let kind = entry.header().entry_type();
            let name = entry.path()?.to_string_lossy().into_owned();
            if kind.is_dir() {
                extractor.entry(&name, true, Vec::new())?;
            } else if kind.is_file() {
                let mut data = Vec::new();
                entry.read_to_end(&mut data)?;
                extractor.entry(&name, false, data)?;
            } else {
                tracing::debug!(entry = %name, ?kind, "skipping unsupported tar entry");
            }
        }
        extractor.finish();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::Path;

    #[test]
    fn test_long_names_survive() {
        let mut m = MountPoint::builder().build();
        let root = m.root();
        let p = m.create_folder(root, "p").unwrap();
        let long = "x".repeat(150);
        m.create_file(p, &long, b"deep".to_vec()).unwrap();

        let bytes = m.tar(p, |_| true).unwrap();
        let q = m.create_folder(root, "q").unwrap();
        m.untar(q, bytes.as_slice(), false, 0).unwrap();

        let copy = m
            .get_by_path(&Path::of(&format!("/q/{long}")).unwrap())
            .unwrap();
        assert_eq!(m.get_content(copy).unwrap(), b"deep");
    }

    #[test]
    fn test_unix_seconds() {
        assert_eq!(unix_seconds(UNIX_EPOCH), 0);
    }
}
