//! Filesystem collaborator: turns locators into path specs and opens them.

pub mod filter;

use log::{debug, warn};
use std::fs::{File, Metadata};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use walkdir::WalkDir;

use crate::{FileEntry, PathSpec};
use filter::should_include;

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("cannot resolve {locator}: {source}")]
    Io {
        locator: String,
        #[source]
        source: io::Error,
    },
    #[error("cannot walk {locator}: {source}")]
    Walk {
        locator: String,
        #[source]
        source: walkdir::Error,
    },
}

/// What the engine needs from a filesystem.
pub trait FileSystem: Send + Sync {
    /// Expand a locator into the path specs to schedule. Directories expand to their files.
    fn resolve(&self, locator: &str) -> Result<Vec<PathSpec>, ResolveError>;
    fn open_entry(&self, spec: &PathSpec) -> io::Result<FileEntry>;
    fn open_stream(&self, spec: &PathSpec) -> io::Result<Box<dyn Read + Send>>;
}

/// Host filesystem. Only `OS` path specs can be opened.
#[derive(Clone, Debug, Default)]
pub struct OsFileSystem {
    exclude: Vec<String>,
    follow_links: bool,
}

impl OsFileSystem {
    pub fn new(exclude: Vec<String>, follow_links: bool) -> Self {
        Self {
            exclude,
            follow_links,
        }
    }

    fn host_path(spec: &PathSpec) -> io::Result<PathBuf> {
        spec.os_path().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::Unsupported,
                format!("not a host file: {spec}"),
            )
        })
    }

    fn walk(&self, root: &Path, locator: &str) -> Result<Vec<PathSpec>, ResolveError> {
        let mut specs = Vec::new();
        for entry_result in WalkDir::new(root)
            .follow_links(self.follow_links)
            .sort_by_file_name()
        {
            match entry_result {
                Ok(entry) => {
                    let path = entry.path();
                    if entry.file_type().is_dir() || !should_include(path, root, &self.exclude) {
                        continue;
                    }
                    specs.push(PathSpec::os(path));
                }
                // The root itself is unreadable: nothing to schedule.
                Err(err) if err.depth() == 0 => {
                    return Err(ResolveError::Walk {
                        locator: locator.to_string(),
                        source: err,
                    });
                }
                Err(err) => warn!("Permission denied or error accessing path: {}", err),
            }
        }
        debug!("{}: {} files", locator, specs.len());
        Ok(specs)
    }
}

fn to_micros(t: io::Result<SystemTime>) -> Option<i64> {
    let t = t.ok()?;
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_micros()).ok(),
        Err(e) => i64::try_from(e.duration().as_micros()).ok().map(|m| -m),
    }
}

#[cfg(unix)]
fn changed_micros(meta: &Metadata) -> Option<i64> {
    use std::os::unix::fs::MetadataExt;
    Some(meta.ctime() * 1_000_000 + meta.ctime_nsec() / 1_000)
}

#[cfg(not(unix))]
fn changed_micros(_meta: &Metadata) -> Option<i64> {
    None
}

impl FileSystem for OsFileSystem {
    fn resolve(&self, locator: &str) -> Result<Vec<PathSpec>, ResolveError> {
        let path = Path::new(locator);
        let meta = std::fs::metadata(path).map_err(|source| ResolveError::Io {
            locator: locator.to_string(),
            source,
        })?;
        if meta.is_dir() {
            self.walk(path, locator)
        } else {
            Ok(vec![PathSpec::os(path)])
        }
    }

    fn open_entry(&self, spec: &PathSpec) -> io::Result<FileEntry> {
        let path = Self::host_path(spec)?;
        let meta = std::fs::metadata(&path)?;
        let name = spec.file_name().unwrap_or_default().to_string();
        Ok(FileEntry {
            path_spec: spec.clone(),
            name,
            size: meta.len(),
            is_file: meta.is_file(),
            created: to_micros(meta.created()),
            accessed: to_micros(meta.accessed()),
            modified: to_micros(meta.modified()),
            changed: changed_micros(&meta),
        })
    }

    fn open_stream(&self, spec: &PathSpec) -> io::Result<Box<dyn Read + Send>> {
        let path = Self::host_path(spec)?;
        Ok(Box::new(File::open(path)?))
    }
}
