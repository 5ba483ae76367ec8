//! File suppliers.

use std::fs::{self, File};
use std::io::{BufReader, Cursor};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::Mutex;
use tracing::{debug, info};

use super::factory::{format_or, required_string};
use super::{
    description_type, BoxFuture, ObservableSupplier, Snapshot, Supplier, SupplierCreator,
    SupplierFactory,
};
use crate::{ConfigError, ConfigResult, ParserFactory, Partial, Value};

/// Open and parse one file.
pub(crate) fn read_file(path: &Path, format: &str, parsers: &ParserFactory) -> ConfigResult<Partial> {
    let file = File::open(path).map_err(|e| ConfigError::io(path, e))?;
    parsers.parse(format, Box::new(BufReader::new(file)))
}

/// Read one file without blocking the runtime, then parse its bytes.
async fn load_file(path: &Path, format: &str, parsers: &ParserFactory) -> ConfigResult<Partial> {
    let content = tokio::fs::read(path)
        .await
        .map_err(|e| ConfigError::io(path, e))?;
    parsers.parse(format, Box::new(Cursor::new(content)))
}

fn modified_time(path: &Path) -> ConfigResult<SystemTime> {
    fs::metadata(path)
        .and_then(|metadata| metadata.modified())
        .map_err(|e| ConfigError::io(path, e))
}

async fn load_modified_time(path: &Path) -> ConfigResult<SystemTime> {
    tokio::fs::metadata(path)
        .await
        .and_then(|metadata| metadata.modified())
        .map_err(|e| ConfigError::io(path, e))
}

/// Supplier parsing one file at construction.
///
/// # Example
///
/// ```no_run
/// use strata_config::{FileSupplier, ParserFactory, Supplier};
///
/// # fn main() -> Result<(), strata_config::ConfigError> {
/// let supplier = FileSupplier::new("config/app.yaml", "yaml", &ParserFactory::default())?;
/// let port = supplier.get("server.port")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct FileSupplier {
    snapshot: Snapshot,
}

impl FileSupplier {
    /// Open the file and parse it in the given format.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Io` if the file cannot be opened, and the parser
    /// error if it cannot be decoded.
    pub fn new(
        path: impl AsRef<Path>,
        format: &str,
        parsers: &ParserFactory,
    ) -> ConfigResult<Self> {
        let partial = read_file(path.as_ref(), format, parsers)?;
        Ok(Self {
            snapshot: Snapshot::new(partial),
        })
    }

    /// Same as [`FileSupplier::new`], reading through `tokio::fs`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Io` if the file cannot be read, and the parser
    /// error if it cannot be decoded.
    pub async fn open(
        path: impl AsRef<Path>,
        format: &str,
        parsers: &ParserFactory,
    ) -> ConfigResult<Self> {
        let partial = load_file(path.as_ref(), format, parsers).await?;
        Ok(Self {
            snapshot: Snapshot::new(partial),
        })
    }
}

impl Supplier for FileSupplier {
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

/// Supplier re-parsing its file whenever the modification time changes.
///
/// Reloads are serialized: the recorded modification time stays locked from
/// the stat to the swap, so two overlapping reloads cannot install an older
/// read over a newer one. Readers only wait on the snapshot.
pub struct ObservableFileSupplier {
    path: PathBuf,
    format: String,
    parsers: Arc<ParserFactory>,
    modified: Mutex<SystemTime>,
    snapshot: Snapshot,
}

impl ObservableFileSupplier {
    /// Open the file, record its modification time and parse it.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Io` if the file cannot be stat'ed or opened, and
    /// the parser error if it cannot be decoded.
    pub fn new(
        path: impl Into<PathBuf>,
        format: &str,
        parsers: Arc<ParserFactory>,
    ) -> ConfigResult<Self> {
        let path = path.into();
        let modified = modified_time(&path)?;
        let partial = read_file(&path, format, &parsers)?;

        Ok(Self {
            path,
            format: format.to_string(),
            parsers,
            modified: Mutex::new(modified),
            snapshot: Snapshot::new(partial),
        })
    }

    /// Same as [`ObservableFileSupplier::new`], reading through `tokio::fs`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Io` if the file cannot be stat'ed or read, and
    /// the parser error if it cannot be decoded.
    pub async fn open(
        path: impl Into<PathBuf>,
        format: &str,
        parsers: Arc<ParserFactory>,
    ) -> ConfigResult<Self> {
        let path = path.into();
        let modified = load_modified_time(&path).await?;
        let partial = load_file(&path, format, &parsers).await?;

        Ok(Self {
            path,
            format: format.to_string(),
            parsers,
            modified: Mutex::new(modified),
            snapshot: Snapshot::new(partial),
        })
    }

    /// Path of the observed file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn refresh(&self) -> ConfigResult<bool> {
        let mut current = self.modified.lock().await;
        let modified = load_modified_time(&self.path).await?;
        if *current == modified {
            return Ok(false);
        }

        let partial = load_file(&self.path, &self.format, &self.parsers).await?;
        self.snapshot.replace(partial);
        *current = modified;

        info!(path = %self.path.display(), "configuration file reloaded");
        Ok(true)
    }
}

impl std::fmt::Debug for ObservableFileSupplier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut debug = f.debug_struct("ObservableFileSupplier");
        debug.field("path", &self.path).field("format", &self.format);
        match self.modified.try_lock() {
            Ok(modified) => debug.field("modified", &*modified),
            Err(_) => debug.field("modified", &"<reloading>"),
        };
        debug.finish_non_exhaustive()
    }
}

impl Supplier for ObservableFileSupplier {
    fn get(&self, path: &str) -> ConfigResult<Value> {
        self.snapshot.get(path)
    }

    fn get_or(&self, path: &str, default: Value) -> ConfigResult<Value> {
        self.snapshot.get_or(path, default)
    }

    fn has(&self, path: &str) -> bool {
        self.snapshot.has(path)
    }

    fn as_observable(&self) -> Option<&dyn ObservableSupplier> {
        Some(self)
    }
}

impl ObservableSupplier for ObservableFileSupplier {
    fn reload(&self) -> BoxFuture<'_, ConfigResult<bool>> {
        Box::pin(self.refresh())
    }
}

/// Creates [`FileSupplier`]s from `type: file` descriptions.
#[derive(Debug, Clone)]
pub struct FileSupplierCreator {
    parsers: Arc<ParserFactory>,
    default_format: String,
}

impl FileSupplierCreator {
    /// Create a creator using the parsers and the format used when a
    /// description declares none.
    pub fn new(parsers: Arc<ParserFactory>, default_format: &str) -> Self {
        Self {
            parsers,
            default_format: default_format.to_string(),
        }
    }
}

impl SupplierCreator for FileSupplierCreator {
    fn accept(&self, description: &Partial) -> bool {
        description_type(description).as_deref() == Some("file")
    }

    fn create<'a>(
        &'a self,
        description: &'a Partial,
        _factory: &'a SupplierFactory,
    ) -> BoxFuture<'a, ConfigResult<Box<dyn Supplier>>> {
        Box::pin(async move {
            let path = required_string(description, "path")?;
            let format = format_or(description, &self.default_format)?;
            debug!(path = %path, format = %format, "creating file supplier");

            let supplier = FileSupplier::open(&path, &format, &self.parsers).await?;
            Ok(Box::new(supplier) as Box<dyn Supplier>)
        })
    }
}

/// Creates [`ObservableFileSupplier`]s from `type: observable_file` descriptions.
#[derive(Debug, Clone)]
pub struct ObservableFileSupplierCreator {
    parsers: Arc<ParserFactory>,
    default_format: String,
}

impl ObservableFileSupplierCreator {
    /// Create a creator using the parsers and the format used when a
    /// description declares none.
    pub fn new(parsers: Arc<ParserFactory>, default_format: &str) -> Self {
        Self {
            parsers,
            default_format: default_format.to_string(),
        }
    }
}

impl SupplierCreator for ObservableFileSupplierCreator {
    fn accept(&self, description: &Partial) -> bool {
        description_type(description).as_deref() == Some("observable_file")
    }

    fn create<'a>(
        &'a self,
        description: &'a Partial,
        _factory: &'a SupplierFactory,
    ) -> BoxFuture<'a, ConfigResult<Box<dyn Supplier>>> {
        Box::pin(async move {
            let path = required_string(description, "path")?;
            let format = format_or(description, &self.default_format)?;
            debug!(path = %path, format = %format, "creating observable file supplier");

            let supplier = ObservableFileSupplier::open(path, &format, self.parsers.clone()).await?;
            Ok(Box::new(supplier) as Box<dyn Supplier>)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn set_modified(path: &Path, time: SystemTime) {
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(time)
            .unwrap();
    }

    #[test]
    fn test_file_supplier_parses_once() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "config.yaml", "node: v1\n");

        let supplier = FileSupplier::new(&path, "yaml", &ParserFactory::default()).unwrap();
        fs::write(&path, "node: v2\n").unwrap();

        assert_eq!(supplier.get("node").unwrap(), Value::from("v1"));
        assert!(supplier.as_observable().is_none());
    }

    #[test]
    fn test_file_supplier_missing_file() {
        let err = FileSupplier::new("/nonexistent/config.yaml", "yaml", &ParserFactory::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_file_supplier_unknown_format() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "config.ini", "a=1");

        let err = FileSupplier::new(&path, "ini", &ParserFactory::default()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFormat { .. }));
    }

    #[tokio::test]
    async fn test_observable_file_unchanged_mtime() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "config.json", r#"{"node": "v1"}"#);
        let supplier =
            ObservableFileSupplier::new(&path, "json", Arc::new(ParserFactory::default())).unwrap();
        let before = supplier.get("").unwrap();

        assert!(!supplier.reload().await.unwrap());
        assert!(!supplier.reload().await.unwrap());
        assert_eq!(supplier.get("").unwrap(), before);
    }

    #[tokio::test]
    async fn test_observable_file_reloads_on_mtime_change() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "config.json", r#"{"node": "v1"}"#);
        let supplier =
            ObservableFileSupplier::new(&path, "json", Arc::new(ParserFactory::default())).unwrap();

        fs::write(&path, r#"{"node": "v2"}"#).unwrap();
        set_modified(&path, SystemTime::now() + Duration::from_secs(60));

        let observable = supplier.as_observable().unwrap();
        assert!(observable.reload().await.unwrap());
        assert_eq!(supplier.get("node").unwrap(), Value::from("v2"));
        assert!(!observable.reload().await.unwrap());
    }

    #[tokio::test]
    async fn test_observable_file_parse_error_keeps_state() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "config.json", r#"{"node": "v1"}"#);
        let supplier =
            ObservableFileSupplier::new(&path, "json", Arc::new(ParserFactory::default())).unwrap();

        fs::write(&path, "{broken").unwrap();
        set_modified(&path, SystemTime::now() + Duration::from_secs(60));

        assert!(supplier.reload().await.is_err());
        assert_eq!(supplier.get("node").unwrap(), Value::from("v1"));

        fs::write(&path, r#"{"node": "v3"}"#).unwrap();
        set_modified(&path, SystemTime::now() + Duration::from_secs(120));
        assert!(supplier.reload().await.unwrap());
        assert_eq!(supplier.get("node").unwrap(), Value::from("v3"));
    }

    #[tokio::test]
    async fn test_observable_file_removed() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "config.json", r#"{"node": "v1"}"#);
        let supplier =
            ObservableFileSupplier::new(&path, "json", Arc::new(ParserFactory::default())).unwrap();

        fs::remove_file(&path).unwrap();

        assert!(matches!(supplier.reload().await, Err(ConfigError::Io { .. })));
        assert_eq!(supplier.get("node").unwrap(), Value::from("v1"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_overlapping_reloads_apply_once() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "config.json", r#"{"node": "v1"}"#);
        let supplier = Arc::new(
            ObservableFileSupplier::new(&path, "json", Arc::new(ParserFactory::default())).unwrap(),
        );

        fs::write(&path, r#"{"node": "v2"}"#).unwrap();
        set_modified(&path, SystemTime::now() + Duration::from_secs(60));

        let reloads: Vec<_> = (0..8)
            .map(|_| {
                let supplier = supplier.clone();
                tokio::spawn(async move { supplier.reload().await.unwrap() })
            })
            .collect();

        let mut applied = 0;
        for reload in reloads {
            if reload.await.unwrap() {
                applied += 1;
            }
        }
        assert_eq!(applied, 1);
        assert_eq!(supplier.get("node").unwrap(), Value::from("v2"));
    }

    #[tokio::test]
    async fn test_async_open_matches_new() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "config.yaml", "node: v1\nlist: [1, 2]\n");
        let parsers = Arc::new(ParserFactory::default());

        let eager = FileSupplier::new(&path, "yaml", &parsers).unwrap();
        let opened = FileSupplier::open(&path, "yaml", &parsers).await.unwrap();
        assert_eq!(opened.get("").unwrap(), eager.get("").unwrap());

        let observable = ObservableFileSupplier::open(&path, "yaml", parsers).await.unwrap();
        assert_eq!(observable.get("").unwrap(), eager.get("").unwrap());
        assert!(!observable.reload().await.unwrap());

        let err = FileSupplier::open("/nonexistent/config.yaml", "yaml", &ParserFactory::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[tokio::test]
    async fn test_file_creators() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "config.yaml", "node: v1\n");
        let parsers = Arc::new(ParserFactory::default());
        let factory = SupplierFactory::new();

        let mut description = Partial::new();
        description
            .set("type", "file")
            .unwrap()
            .set("path", path.to_str().unwrap())
            .unwrap();

        let creator = FileSupplierCreator::new(parsers.clone(), "yaml");
        assert!(creator.accept(&description));
        let supplier = creator.create(&description, &factory).await.unwrap();
        assert_eq!(supplier.get("node").unwrap(), Value::from("v1"));

        description.set("type", "observable_file").unwrap();
        let creator = ObservableFileSupplierCreator::new(parsers, "yaml");
        assert!(creator.accept(&description));
        let supplier = creator.create(&description, &factory).await.unwrap();
        assert!(supplier.as_observable().is_some());
    }

    #[tokio::test]
    async fn test_file_creator_requires_path() {
        let mut description = Partial::new();
        description.set("type", "file").unwrap();

        let creator = FileSupplierCreator::new(Arc::new(ParserFactory::default()), "yaml");
        let err = creator
            .create(&description, &SupplierFactory::new())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::InvalidSupplier { .. }));
    }
}
