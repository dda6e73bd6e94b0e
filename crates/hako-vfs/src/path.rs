//! Normalized tree paths.
//!
//! A [`Path`] is an immutable list of name segments plus an absolute flag.
//! `.` and empty segments are dropped while parsing, `..` pops the previous
//! segment, and popping past the root is an error. The canonical string and
//! the hash are computed once at construction, so paths are cheap to use as
//! map keys (the lock table is keyed by them).
//!
//! Equality, ordering and hashing look at the segments only.

use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{VfsError, VfsResult};

/// Immutable, normalized path.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Path {
    elements: Arc<[String]>,
    absolute: bool,
    repr: Arc<str>,
    hash: u64,
}

impl Path {
    /// Parse and normalize a raw path string.
    ///
    /// A leading `/` makes the path absolute.
    pub fn of(raw: &str) -> VfsResult<Self> {
        let mut elements = Vec::new();
        push_normalized(&mut elements, raw, raw)?;
        Ok(Self::from_parts(elements, raw.starts_with('/')))
    }

    /// The absolute root, `/`.
    pub fn root() -> Self {
        Self::from_parts(Vec::new(), true)
    }

    pub(crate) fn from_parts(elements: Vec<String>, absolute: bool) -> Self {
        let joined = elements.join("/");
        let repr: Arc<str> = if absolute {
            format!("/{joined}").into()
        } else {
            joined.into()
        };
        let mut hasher = DefaultHasher::new();
        elements.hash(&mut hasher);
        Self {
            elements: elements.into(),
            absolute,
            repr,
            hash: hasher.finish(),
        }
    }

    /// Append a relative path string and renormalize.
    ///
    /// `..` in `relative` may climb into this path's own segments, but not
    /// past its root.
    pub fn new_path(&self, relative: &str) -> VfsResult<Self> {
        let mut elements = self.elements.to_vec();
        let full = format!("{}/{}", self.repr, relative);
        push_normalized(&mut elements, relative, &full)?;
        Ok(Self::from_parts(elements, self.absolute))
    }

    /// Append the segments of an already normalized path.
    pub fn join(&self, other: &Path) -> Self {
        let mut elements = self.elements.to_vec();
        elements.extend(other.elements.iter().cloned());
        Self::from_parts(elements, self.absolute)
    }

    /// Segments from `begin` to the end. The result is relative unless
    /// `begin == 0`.
    pub fn sub_path(&self, begin: usize) -> Self {
        self.sub_path_range(begin, self.len())
    }

    /// Segments `begin..end`, clamped to the path length.
    pub fn sub_path_range(&self, begin: usize, end: usize) -> Self {
        let end = end.min(self.len());
        let begin = begin.min(end);
        Self::from_parts(
            self.elements[begin..end].to_vec(),
            self.absolute && begin == 0,
        )
    }

    /// The remainder of this path below `prefix`, as a relative path.
    ///
    /// Returns `None` if `prefix` is not this path or one of its ancestors.
    pub fn relative_to(&self, prefix: &Path) -> Option<Self> {
        if self.starts_with(prefix) {
            Some(Self::from_parts(
                self.elements[prefix.len()..].to_vec(),
                false,
            ))
        } else {
            None
        }
    }

    /// Parent path; `None` for the root or an empty relative path.
    pub fn parent(&self) -> Option<Self> {
        if self.elements.is_empty() {
            return None;
        }
        Some(self.sub_path_range(0, self.len() - 1))
    }

    /// Last segment; `None` for the root.
    pub fn name(&self) -> Option<&str> {
        self.elements.last().map(String::as_str)
    }

    pub fn elements(&self) -> &[String] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn element(&self, index: usize) -> Option<&str> {
        self.elements.get(index).map(String::as_str)
    }

    /// True iff `parent` is a strict segment-wise prefix of this path.
    pub fn is_child(&self, parent: &Path) -> bool {
        self.len() > parent.len() && self.starts_with(parent)
    }

    /// True iff `prefix` equals this path or is one of its ancestors.
    pub fn starts_with(&self, prefix: &Path) -> bool {
        prefix.len() <= self.len() && self.elements[..prefix.len()] == prefix.elements[..]
    }

    pub fn is_root(&self) -> bool {
        self.absolute && self.elements.is_empty()
    }

    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    pub fn as_str(&self) -> &str {
        &self.repr
    }
}

fn push_normalized(elements: &mut Vec<String>, raw: &str, whole: &str) -> VfsResult<()> {
    for segment in raw.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if elements.pop().is_none() {
                    return Err(VfsError::invalid_path(format!(
                        "{whole}: normalizes past the root"
                    )));
                }
            }
            name => elements.push(name.to_string()),
        }
    }
    Ok(())
}

impl PartialEq for Path {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.elements == other.elements
    }
}

impl Eq for Path {}

impl Hash for Path {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl Ord for Path {
    fn cmp(&self, other: &Self) -> Ordering {
        self.elements.cmp(&other.elements)
    }
}

impl PartialOrd for Path {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr)
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Path({})", self.repr)
    }
}

impl FromStr for Path {
    type Err = VfsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::of(s)
    }
}

impl TryFrom<String> for Path {
    type Error = VfsError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::of(&s)
    }
}

impl From<Path> for String {
    fn from(p: Path) -> String {
        p.repr.to_string()
    }
}
