//! Turns a request selector into an open, read-only file inside the served root.
//!
//! Requests name a selector type and a path relative to the root,
//! `X/some/path`. Directory requests are served from the directory's
//! `.cache` listing rather than the directory itself. Every path is checked
//! for `..` and absolute components before it is opened; this sits on top of
//! the chroot the bootstrap performs, it does not replace it.

use crate::gopher::selector::Selector;
use nix::errno::Errno;
use std::ffi::OsStr;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::os::unix::ffi::OsStrExt;
use std::path::{Component, Path, PathBuf};

/// Name of the listing file every served directory carries.
pub const DIRECTORY_INDEX: &str = ".cache";

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("invalid selector type '{0}'")]
    InvalidSelector(char),
    #[error("{0}: path escapes the served root")]
    Traversal(String),
    #[error("{0}: not listed in its directory")]
    Unlisted(String),
    #[error("{path}: {source}")]
    Open {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl ResolveError {
    /// The OS error a client is told about.
    pub fn errno(&self) -> Errno {
        match self {
            ResolveError::InvalidSelector(_) | ResolveError::Unlisted(_) => Errno::EINVAL,
            ResolveError::Traversal(_) => Errno::EACCES,
            ResolveError::Open { source, .. } => source
                .raw_os_error()
                .map(Errno::from_raw)
                .unwrap_or(Errno::EIO),
        }
    }
}

#[derive(Debug)]
pub struct Resolved {
    pub file: File,
    pub selector: Selector,
    /// Path that was opened, relative to the root.
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Resolver {
    root: PathBuf,
    strict: bool,
}

impl Resolver {
    /// `root` is `.` once the process sits inside its chroot.
    pub fn new(root: impl Into<PathBuf>, strict: bool) -> Self {
        Self {
            root: root.into(),
            strict,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a raw selector line. Names are bytes, the way the file
    /// system stores them.
    pub fn resolve(&self, line: impl AsRef<[u8]>) -> Result<Resolved, ResolveError> {
        let line = line.as_ref();
        let name = line.strip_prefix(b"/").unwrap_or(line);

        if name.is_empty() {
            return self.open_typed(Selector::Directory, b"");
        }

        if let [kind, b'/', path @ ..] = name {
            let kind = char::from(*kind);
            let selector = Selector::from_char(kind).ok_or(ResolveError::InvalidSelector(kind))?;
            return self.open_typed(selector, path);
        }

        if self.strict {
            return Err(ResolveError::InvalidSelector(char::from(name[0])));
        }
        self.open_implicit(name)
    }

    /// Opens `path` for a selector that has already been split off.
    pub fn open_typed(
        &self,
        selector: Selector,
        path: impl AsRef<[u8]>,
    ) -> Result<Resolved, ResolveError> {
        let path = path.as_ref();
        let path = Path::new(OsStr::from_bytes(path.strip_prefix(b"/").unwrap_or(path)));
        let relative = match selector {
            Selector::Directory => path.join(DIRECTORY_INDEX),
            _ => path.to_path_buf(),
        };

        let file = self.open_contained(&relative)?;
        if selector != Selector::Directory && file.metadata().is_ok_and(|m| m.is_dir()) {
            return Err(ResolveError::Open {
                path: relative.display().to_string(),
                source: io::Error::from_raw_os_error(Errno::EISDIR as i32),
            });
        }

        Ok(Resolved {
            file,
            selector,
            path: relative,
        })
    }

    /// A path without a selector prefix: directories are served as listings,
    /// files take their type from the parent directory's listing.
    fn open_implicit(&self, name: &[u8]) -> Result<Resolved, ResolveError> {
        let relative = PathBuf::from(OsStr::from_bytes(name));
        let file = self.open_contained(&relative)?;
        let meta = file.metadata().map_err(|source| ResolveError::Open {
            path: relative.display().to_string(),
            source,
        })?;

        if meta.is_dir() {
            return self.open_typed(Selector::Directory, name);
        }

        let listing = match relative.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.join(DIRECTORY_INDEX),
            _ => PathBuf::from(DIRECTORY_INDEX),
        };
        let index = self.open_contained(&listing)?;
        let selector = find_listed_type(index, name)?
            .ok_or_else(|| ResolveError::Unlisted(relative.display().to_string()))?;

        Ok(Resolved {
            file,
            selector,
            path: relative,
        })
    }

    fn open_contained(&self, relative: &Path) -> Result<File, ResolveError> {
        if !is_contained(relative) {
            return Err(ResolveError::Traversal(relative.display().to_string()));
        }
        let full = self.root.join(relative);
        File::open(&full).map_err(|source| ResolveError::Open {
            path: relative.display().to_string(),
            source,
        })
    }
}

/// True when the path stays below the root: no `..`, no root, no prefix.
pub fn is_contained(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Searches a listing for `name` and returns the type it is listed with.
fn find_listed_type(index: File, name: &[u8]) -> Result<Option<Selector>, ResolveError> {
    let reader = BufReader::new(index);
    for line in reader.split(b'\n') {
        let line = line.map_err(|source| ResolveError::Open {
            path: DIRECTORY_INDEX.to_string(),
            source,
        })?;
        let mut fields = line.split(|&b| b == b'\t');
        let (Some(display), Some(target)) = (fields.next(), fields.next()) else {
            continue;
        };
        // Listed selectors look like `X/path`.
        if target.get(2..) == Some(name) {
            return Ok(display.first().map(|&b| char::from(b)).and_then(Selector::from_char));
        }
    }
    Ok(None)
}
