// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Data files and file locations.
//!
//! A [`DataFile`] is a globally-unique id plus a size; it carries no
//! content. A [`FileLocation`] names where a file lives: a storage service,
//! a path prefix on that service, and the file itself. Locations are
//! values, not resources.

use crate::names::ServiceName;
use std::fmt;
use std::sync::Arc;

#[derive(Debug)]
struct DataFileInner {
    id: String,
    size: u64,
}

/// An immutable simulated file. Cheap to clone; identity is the id.
#[derive(Debug, Clone)]
pub struct DataFile(Arc<DataFileInner>);

impl DataFile {
    /// Create a file with an explicit, globally-unique id.
    pub fn new(id: impl Into<String>, size: u64) -> Self {
        Self(Arc::new(DataFileInner { id: id.into(), size }))
    }

    /// Create a file with a generated unique id.
    pub fn generate(size: u64) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), size)
    }

    pub fn id(&self) -> &str {
        &self.0.id
    }

    pub fn size(&self) -> u64 {
        self.0.size
    }
}

impl PartialEq for DataFile {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for DataFile {}

impl std::hash::Hash for DataFile {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Display for DataFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.id)
    }
}

/// Where a file lives (or is to live): storage service + path prefix + file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileLocation {
    service: ServiceName,
    prefix: String,
    file: DataFile,
}

impl FileLocation {
    pub fn new(service: impl Into<ServiceName>, prefix: impl Into<String>, file: DataFile) -> Self {
        Self { service: service.into(), prefix: prefix.into(), file }
    }

    pub fn service(&self) -> &ServiceName {
        &self.service
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn file(&self) -> &DataFile {
        &self.file
    }

    /// Full path of the file on its storage service.
    pub fn path(&self) -> String {
        let prefix = self.prefix.trim_end_matches('/');
        format!("{}/{}", prefix, self.file.id())
    }

    /// Same place, different file. Used when a striped sub-file inherits
    /// its parent's location.
    pub fn with_file(&self, file: DataFile) -> Self {
        Self { service: self.service.clone(), prefix: self.prefix.clone(), file }
    }
}

impl fmt::Display for FileLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.service, self.path())
    }
}

#[cfg(test)]
#[path = "data_tests.rs"]
mod tests;
