//! Secret path addressing
//!
//! A KV v2 mount exposes two parallel address spaces: `<mount>/metadata/...`
//! for enumerating keys and `<mount>/data/...` for reading and writing
//! payloads. Everything that turns a logical path into a store address
//! lives here, so the walker and transfer code never format raw addresses.
//!
//! Container and leaf paths are separate types. A listing address can only
//! be built from a [`ContainerPath`] and a data address only from a
//! [`LeafPath`].

use crate::error::PathError;
use std::fmt;

/// Mount used when none is configured
pub const DEFAULT_MOUNT: &str = "secret";

const METADATA_SPACE: &str = "metadata";
const DATA_SPACE: &str = "data";

/// Name of a secrets engine mount (e.g., "secret", "kv-prod")
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Mount(String);

impl Mount {
    pub fn new(name: &str) -> Result<Self, PathError> {
        let trimmed = name.trim().trim_matches('/');
        if trimmed.is_empty() {
            return Err(PathError::EmptyMount);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Mount {
    fn default() -> Self {
        Self(DEFAULT_MOUNT.to_string())
    }
}

impl fmt::Display for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn validate_segment(segment: &str) -> Result<(), PathError> {
    if segment.is_empty() || segment == "." || segment == ".." || segment.contains('/') {
        return Err(PathError::InvalidSegment(segment.to_string()));
    }
    Ok(())
}

/// A path that can have children (a "directory" in the secret tree)
///
/// The empty path is the root of the mount.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerPath {
    segments: Vec<String>,
}

impl ContainerPath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a user-supplied path as a container.
    ///
    /// Leading, trailing and repeated separators are ignored, so `app`,
    /// `app/` and `/app/` are the same path.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let mut segments = Vec::new();
        for segment in raw.trim().split('/').filter(|s| !s.is_empty()) {
            validate_segment(segment)?;
            segments.push(segment.to_string());
        }
        Ok(Self { segments })
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Extend this path by one container segment
    pub fn container(&self, name: &str) -> Result<ContainerPath, PathError> {
        validate_segment(name)?;
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Ok(Self { segments })
    }

    /// Extend this path by one leaf segment
    pub fn leaf(&self, name: &str) -> Result<LeafPath, PathError> {
        LeafPath::new(self.clone(), name)
    }

    /// Resolve a listed child entry relative to this container
    pub fn child(&self, entry: &ChildEntry) -> Result<ChildPath, PathError> {
        if entry.is_container {
            self.container(&entry.name).map(ChildPath::Container)
        } else {
            self.leaf(&entry.name).map(ChildPath::Leaf)
        }
    }

    /// Path relative to the mount, with a trailing separator unless root
    pub fn relative(&self) -> String {
        if self.segments.is_empty() {
            return String::new();
        }
        format!("{}/", self.segments.join("/"))
    }
}

impl fmt::Display for ContainerPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            f.write_str("/")
        } else {
            f.write_str(&self.relative())
        }
    }
}

/// A path holding exactly one secret payload
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LeafPath {
    parent: ContainerPath,
    name: String,
}

impl LeafPath {
    pub fn new(parent: ContainerPath, name: &str) -> Result<Self, PathError> {
        if name.is_empty() {
            return Err(PathError::EmptyLeaf);
        }
        validate_segment(name)?;
        Ok(Self {
            parent,
            name: name.to_string(),
        })
    }

    /// Parse a user-supplied leaf path; a trailing separator is ignored
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let mut container = ContainerPath::parse(raw)?;
        match container.segments.pop() {
            Some(name) => Self::new(container, &name),
            None => Err(PathError::EmptyLeaf),
        }
    }

    pub fn parent(&self) -> &ContainerPath {
        &self.parent
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path relative to the mount (e.g., "app/db")
    pub fn relative(&self) -> String {
        format!("{}{}", self.parent.relative(), self.name)
    }
}

impl fmt::Display for LeafPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.parent.relative(), self.name)
    }
}

/// A resolved child of a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildPath {
    Container(ContainerPath),
    Leaf(LeafPath),
}

/// One key returned by a listing call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildEntry {
    /// Segment name without the container marker
    pub name: String,
    /// Whether the key was returned with a trailing `/`
    pub is_container: bool,
}

impl ChildEntry {
    /// Parse a raw listing key; a trailing `/` marks a container
    pub fn parse(raw: &str) -> Self {
        match raw.strip_suffix('/') {
            Some(name) => Self::container(name),
            None => Self::leaf(raw),
        }
    }

    pub fn container(name: &str) -> Self {
        Self {
            name: name.to_string(),
            is_container: true,
        }
    }

    pub fn leaf(name: &str) -> Self {
        Self {
            name: name.to_string(),
            is_container: false,
        }
    }
}

/// Address in the listing (metadata) space of a mount
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListingAddress {
    mount: String,
    path: String,
}

impl ListingAddress {
    pub fn mount(&self) -> &str {
        &self.mount
    }

    /// Container path relative to the mount ("" for root, else ends in `/`)
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Unescaped path segments, ending with an empty segment for the
    /// trailing `/`
    pub fn segments(&self) -> impl Iterator<Item = &str> + '_ {
        self.mount
            .split('/')
            .chain(std::iter::once(METADATA_SPACE))
            .chain(self.path.split('/'))
    }
}

impl fmt::Display for ListingAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.mount, METADATA_SPACE, self.path)
    }
}

/// Address in the data space of a mount
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataAddress {
    mount: String,
    path: String,
}

impl DataAddress {
    pub fn mount(&self) -> &str {
        &self.mount
    }

    /// Leaf path relative to the mount
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Unescaped path segments; a segment may hold any character but `/`
    pub fn segments(&self) -> impl Iterator<Item = &str> + '_ {
        self.mount
            .split('/')
            .chain(std::iter::once(DATA_SPACE))
            .chain(self.path.split('/'))
    }
}

impl fmt::Display for DataAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.mount, DATA_SPACE, self.path)
    }
}

/// A mount under which logical paths resolve to store addresses
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Namespace {
    mount: Mount,
}

impl Namespace {
    pub fn new(mount: Mount) -> Self {
        Self { mount }
    }

    pub fn mount(&self) -> &Mount {
        &self.mount
    }

    /// Address used to enumerate the immediate children of `path`
    pub fn listing_address(&self, path: &ContainerPath) -> ListingAddress {
        ListingAddress {
            mount: self.mount.as_str().to_string(),
            path: path.relative(),
        }
    }

    /// Address used to fetch the current payload of `path`
    pub fn read_address(&self, path: &LeafPath) -> DataAddress {
        self.data_address(path)
    }

    /// Address used to store a payload at `path`
    pub fn write_address(&self, path: &LeafPath) -> DataAddress {
        self.data_address(path)
    }

    fn data_address(&self, path: &LeafPath) -> DataAddress {
        DataAddress {
            mount: self.mount.as_str().to_string(),
            path: path.relative(),
        }
    }
}
