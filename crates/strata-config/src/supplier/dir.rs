//! Directory supplier.

use std::ffi::OsStr;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use super::factory::{format_or, required_string};
use super::file::read_file;
use super::{description_type, BoxFuture, Snapshot, Supplier, SupplierCreator, SupplierFactory};
use crate::{ConfigError, ConfigResult, ParserFactory, Partial, Value};

/// Supplier merging every file of one format found in a directory.
///
/// Entries are visited in file name order. A file is loaded when its
/// extension equals the format; later files override earlier ones on
/// conflicting paths. Subdirectories are descended into only when
/// `recursive` is set, and their files merge into the same tree. Symbolic
/// links are followed only to matching files, never into directories.
#[derive(Debug)]
pub struct DirSupplier {
    snapshot: Snapshot,
}

impl DirSupplier {
    /// Load the directory.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Io` if the directory or one of its files cannot be
    /// read, and the parser error of the first file that cannot be decoded.
    pub fn new(
        path: impl AsRef<Path>,
        format: &str,
        recursive: bool,
        parsers: &ParserFactory,
    ) -> ConfigResult<Self> {
        let mut partial = Partial::new();
        load_dir(path.as_ref(), format, recursive, parsers, &mut partial)?;
        Ok(Self {
            snapshot: Snapshot::new(partial),
        })
    }
}

fn load_dir(
    dir: &Path,
    format: &str,
    recursive: bool,
    parsers: &ParserFactory,
    into: &mut Partial,
) -> ConfigResult<()> {
    let mut entries = fs::read_dir(dir)
        .and_then(|entries| entries.collect::<Result<Vec<_>, _>>())
        .map_err(|e| ConfigError::io(dir, e))?;
    entries.sort_by_key(fs::DirEntry::file_name);

    for entry in entries {
        let path = entry.path();
        // file_type does not follow symlinks, so a linked directory is
        // never descended into and a link cycle cannot recurse
        let file_type = entry.file_type().map_err(|e| ConfigError::io(&path, e))?;

        if file_type.is_dir() {
            if recursive {
                load_dir(&path, format, recursive, parsers, into)?;
            }
            continue;
        }

        let matches = path
            .extension()
            .and_then(OsStr::to_str)
            .is_some_and(|ext| ext.eq_ignore_ascii_case(format));
        if !matches {
            continue;
        }

        if file_type.is_symlink() && !fs::metadata(&path).is_ok_and(|target| target.is_file()) {
            debug!(path = %path.display(), "skipping link that does not resolve to a file");
            continue;
        }

        debug!(path = %path.display(), "loading configuration file");
        into.merge(&read_file(&path, format, parsers)?);
    }

    Ok(())
}

impl Supplier for DirSupplier {
    fn get(&self, path: &str) -> ConfigResult<Value> {
        self.snapshot.get(path)
    }

    fn get_or(&self, path: &str, default: Value) -> ConfigResult<Value> {
        self.snapshot.get_or(path, default)
    }

    fn has(&self, path: &str) -> bool {
        self.snapshot.has(path)
    }
}

/// Creates [`DirSupplier`]s from `type: dir` descriptions.
#[derive(Debug, Clone)]
pub struct DirSupplierCreator {
    parsers: Arc<ParserFactory>,
    default_format: String,
}

impl DirSupplierCreator {
    /// Create a creator using the parsers and the format used when a
    /// description declares none.
    pub fn new(parsers: Arc<ParserFactory>, default_format: &str) -> Self {
        Self {
            parsers,
            default_format: default_format.to_string(),
        }
    }
}

impl SupplierCreator for DirSupplierCreator {
    fn accept(&self, description: &Partial) -> bool {
        description_type(description).as_deref() == Some("dir")
    }

    fn create<'a>(
        &'a self,
        description: &'a Partial,
        _factory: &'a SupplierFactory,
    ) -> BoxFuture<'a, ConfigResult<Box<dyn Supplier>>> {
        Box::pin(async move {
            let path = required_string(description, "path")?;
            let format = format_or(description, &self.default_format)?;
            let recursive = description
                .bool_or("recursive", false)
                .map_err(|_| ConfigError::invalid_supplier("field \"recursive\" must be a bool"))?;

            let parsers = self.parsers.clone();
            let supplier = tokio::task::spawn_blocking(move || {
                DirSupplier::new(&path, &format, recursive, &parsers)
            })
            .await??;
            Ok(Box::new(supplier) as Box<dyn Supplier>)
        })
    }
}
