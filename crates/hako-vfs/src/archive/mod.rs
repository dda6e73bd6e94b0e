//! Zip and tar import/export of folders.
//!
//! Export walks the folder in pre-order and writes one entry per node below
//! it: folders as `name/` with a zero timestamp, files with their content
//! and modification time. Entry names are relative to the exported folder.
//!
//! Import handles entries one at a time. With `strip = n`, entries at depth
//! `n` or shallower are skipped and the first `n` segments of the rest are
//! dropped, so `strip = 1` unpacks `top/a/b` as `a/b`.
//!
//! Neither direction is safe against concurrent mutation of the same
//! subtree. [`crate::Workspace`] holds an exclusive path lock around both.

mod tar;
mod zip;

use std::io::{Read, Write};
use std::time::SystemTime;

use hako_types::{NodeId, Permission};

use crate::error::{VfsError, VfsResult};
use crate::flows::VfsFlow;
use crate::mount::MountPoint;
use crate::node::Node;
use crate::ops::check_name;
use crate::path::Path;
use crate::types::NodeKind;

pub use self::tar::TarArchiver;
pub use self::zip::ZipArchiver;

/// Supported archive formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ArchiveFormat {
    Zip,
    Tar,
}

impl ArchiveFormat {
    /// Guess the format from a file name's extension.
    pub fn from_extension(path: &std::path::Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.parse().ok())
    }
}

/// Serializes a folder to an archive and back.
pub trait Archiver {
    /// Write every node below `folder` accepted by `filter` to `out`.
    fn compress(
        &self,
        mount: &MountPoint,
        folder: NodeId,
        out: &mut dyn Write,
        filter: &dyn Fn(&Node) -> bool,
    ) -> VfsResult<()>;

    /// Read entries from `input` into `folder`.
    fn extract(
        &self,
        mount: &mut MountPoint,
        folder: NodeId,
        input: &mut dyn Read,
        overwrite: bool,
        strip: usize,
    ) -> VfsResult<()>;
}

pub fn archiver_for(format: ArchiveFormat) -> Box<dyn Archiver> {
    match format {
        ArchiveFormat::Zip => Box::new(ZipArchiver),
        ArchiveFormat::Tar => Box::new(TarArchiver),
    }
}

// ============================================================================
// Shared export/import plumbing
// ============================================================================

/// One node to write, borrowed from the tree.
pub(crate) struct OutEntry<'a> {
    /// Relative name; folders end in `/`.
    pub(crate) name: String,
    pub(crate) is_dir: bool,
    pub(crate) content: &'a [u8],
    pub(crate) modified_at: SystemTime,
}

/// Entries for everything strictly below `folder`, in pre-order.
pub(crate) fn collect_entries<'a>(
    mount: &'a MountPoint,
    folder: NodeId,
    filter: &dyn Fn(&Node) -> bool,
) -> VfsResult<Vec<OutEntry<'a>>> {
    let folder_node = mount.require_folder(folder, "archive")?;
    let base = mount.path_of(folder_node.id())?;
    let mut entries = Vec::new();
    for node in mount.walk(folder)?.skip(1) {
        if !filter(node) {
            continue;
        }
        let relative = mount
            .path_of(node.id())?
            .relative_to(&base)
            .ok_or_else(|| VfsError::server("walk left the archived folder"))?;
        let is_dir = node.is_folder();
        entries.push(OutEntry {
            name: if is_dir {
                format!("{relative}/")
            } else {
                relative.to_string()
            },
            is_dir,
            content: &node.content,
            modified_at: node.modified_at(),
        });
    }
    Ok(entries)
}

/// Applies archive entries to a folder.
pub(crate) struct Extractor<'m> {
    mount: &'m mut MountPoint,
    folder: NodeId,
    overwrite: bool,
    strip: usize,
}

impl<'m> Extractor<'m> {
    /// Checks that `folder` is a writable folder.
    pub(crate) fn new(
        mount: &'m mut MountPoint,
        folder: NodeId,
        overwrite: bool,
        strip: usize,
    ) -> VfsResult<Self> {
        mount.require_folder(folder, "extract")?;
        mount.require(folder, Permission::Write, true, "extract into")?;
        Ok(Self {
            mount,
            folder,
            overwrite,
            strip,
        })
    }

    pub(crate) fn entry(&mut self, raw_name: &str, is_dir: bool, data: Vec<u8>) -> VfsResult<()> {
        let relative = Path::of(raw_name)?;
        if relative.len() <= self.strip {
            tracing::trace!(entry = raw_name, strip = self.strip, "skipping stripped entry");
            return Ok(());
        }
        let relative = relative.sub_path(self.strip);
        if is_dir {
            self.ensure_folders(relative.elements())?;
            return Ok(());
        }

        let (dirs, name) = relative.elements().split_at(relative.len() - 1);
        let name = &name[0];
        check_name(name)?;
        let parent = self.ensure_folders(dirs)?;

        let existing = self.mount.node(parent)?.children().get(name.as_str()).copied();
        match existing {
            None => {
                let id = self
                    .mount
                    .insert_node(parent, name, NodeKind::File, data)?;
                self.emit_created(id, false)
            }
            Some(id) => {
                let node = self.mount.node(id)?;
                let path = self.mount.path_of(id)?;
                if node.is_folder() {
                    return Err(VfsError::conflict(format!(
                        "{path} exists and is a folder"
                    )));
                }
                if node.is_locked() {
                    return Err(VfsError::forbidden(format!(
                        "unable to overwrite {path}: item is locked"
                    )));
                }
                if !self.overwrite {
                    return Err(VfsError::conflict(format!("{path} already exists")));
                }
                let node = self.mount.node_mut(id)?;
                node.content = data;
                node.touch();
                self.mount.index_update(id);
                self.mount.emit(VfsFlow::ContentUpdated {
                    workspace_id: self.mount.workspace_id(),
                    path,
                });
                Ok(())
            }
        }
    }

    /// Walk `names` below the target folder, creating missing folders.
    fn ensure_folders(&mut self, names: &[String]) -> VfsResult<NodeId> {
        let mut current = self.folder;
        for name in names {
            check_name(name)?;
            let next = self.mount.node(current)?.children().get(name.as_str()).copied();
            current = match next {
                Some(id) if self.mount.node(id)?.is_folder() => id,
                Some(id) => {
                    return Err(VfsError::conflict(format!(
                        "{} exists and is a file",
                        self.mount.path_of(id)?
                    )));
                }
                None => {
                    let id = self
                        .mount
                        .insert_node(current, name, NodeKind::Folder, Vec::new())?;
                    self.emit_created(id, true)?;
                    id
                }
            };
        }
        Ok(current)
    }

    fn emit_created(&self, id: NodeId, is_folder: bool) -> VfsResult<()> {
        self.mount.emit(VfsFlow::Created {
            workspace_id: self.mount.workspace_id(),
            path: self.mount.path_of(id)?,
            is_folder,
        });
        Ok(())
    }

    pub(crate) fn finish(self) {
        self.mount.index_add(self.folder);
    }
}

// ============================================================================
// MountPoint entry points
// ============================================================================

impl MountPoint {
    /// Zip every node below `folder` that passes `filter`.
    pub fn zip(&self, folder: NodeId, filter: impl Fn(&Node) -> bool) -> VfsResult<Vec<u8>> {
        let mut out = Vec::new();
        ZipArchiver.compress(self, folder, &mut out, &filter)?;
        Ok(out)
    }

    /// Unpack a zip archive into `folder`.
    pub fn unzip(
        &mut self,
        folder: NodeId,
        mut input: impl Read,
        overwrite: bool,
        strip: usize,
    ) -> VfsResult<()> {
        ZipArchiver.extract(self, folder, &mut input, overwrite, strip)
    }

    /// Tar every node below `folder` that passes `filter`.
    pub fn tar(&self, folder: NodeId, filter: impl Fn(&Node) -> bool) -> VfsResult<Vec<u8>> {
        let mut out = Vec::new();
        TarArchiver.compress(self, folder, &mut out, &filter)?;
        Ok(out)
    }

    /// Unpack a tar archive into `folder`.
    pub fn untar(
        &mut self,
        folder: NodeId,
        mut input: impl Read,
        overwrite: bool,
        strip: usize,
    ) -> VfsResult<()> {
        TarArchiver.extract(self, folder, &mut input, overwrite, strip)
    }

    /// Export the whole of `folder` in `format`.
    pub fn export_archive(&self, folder: NodeId, format: ArchiveFormat) -> VfsResult<Vec<u8>> {
        let mut out = Vec::new();
        archiver_for(format).compress(self, folder, &mut out, &|_| true)?;
        Ok(out)
    }

    pub fn import_archive(
        &mut self,
        folder: NodeId,
        format: ArchiveFormat,
        mut input: impl Read,
        overwrite: bool,
        strip: usize,
    ) -> VfsResult<()> {
        archiver_for(format).extract(self, folder, &mut input, overwrite, strip)
    }
}
