//! Size-based rotating log file.
//!
//! # Responsibilities
//! - Append to the configured file, creating it (and its directory) lazily
//! - Rotate when a write would push the file past the size limit
//! - Gzip rotated files and prune them by count and age, off the write path
//!
//! # Design Decisions
//! - Rotated files are named `<stem>-<timestamp><ext>` so they sort by age
//! - Housekeeping failures never fail the write that triggered them
//! - Never logs through `tracing`: this writer sits underneath the sink

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;

use chrono::{DateTime, Duration, Local, NaiveDateTime, TimeZone, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::config::LogConfig;

const MEGABYTE: u64 = 1024 * 1024;
const DEFAULT_MAX_SIZE_MB: u64 = 100;
const BACKUP_TIME_FORMAT: &str = "%Y-%m-%dT%H-%M-%S%.3f";
const COMPRESS_SUFFIX: &str = ".gz";
const MAX_NAME_ATTEMPTS: usize = 1000;

/// A writer that can be told to start a fresh file.
pub trait RotatingWriter: Write + Send {
    /// Close the current file, move it aside and open a new one.
    fn rotate(&mut self) -> io::Result<()>;
}

/// Rotation limits for a [`RotatingFile`].
#[derive(Debug, Clone)]
pub struct RotationPolicy {
    /// Bytes written before the file is rotated.
    pub max_size_bytes: u64,
    /// Rotated files to keep (0 keeps all).
    pub max_backups: usize,
    /// Days a rotated file is kept (0 keeps forever).
    pub max_age_days: u64,
    /// Gzip rotated files.
    pub compress: bool,
    /// Use local time in rotated file names.
    pub local_time: bool,
}

impl From<&LogConfig> for RotationPolicy {
    fn from(config: &LogConfig) -> Self {
        let size_mb = if config.size_limit_mb == 0 {
            DEFAULT_MAX_SIZE_MB
        } else {
            config.size_limit_mb
        };
        Self {
            max_size_bytes: size_mb.saturating_mul(MEGABYTE),
            max_backups: config.backup_count,
            max_age_days: config.max_age_days,
            compress: true,
            local_time: true,
        }
    }
}

/// Rotating file writer.
///
/// Rotation itself only renames and reopens. Compression and pruning of
/// rotated files run on a background housekeeping thread.
pub struct RotatingFile {
    backups: BackupSet,
    file: Option<File>,
    size: u64,
    housekeeping: Option<mpsc::Sender<Housekeeping>>,
}

impl RotatingFile {
    /// Create a writer for `path`. Nothing is opened until the first write.
    pub fn new(path: impl Into<PathBuf>, policy: RotationPolicy) -> Self {
        Self {
            backups: BackupSet {
                path: path.into(),
                policy,
            },
            file: None,
            size: 0,
            housekeeping: None,
        }
    }

    /// Path of the active file.
    pub fn path(&self) -> &Path {
        &self.backups.path
    }

    /// Rotated files next to the active one, newest first.
    pub fn backups(&self) -> io::Result<Vec<PathBuf>> {
        self.backups.list()
    }

    /// Block until housekeeping requested so far has finished.
    pub fn wait_for_housekeeping(&self) {
        let Some(tx) = &self.housekeeping else {
            return;
        };
        let (done_tx, done_rx) = mpsc::channel();
        if tx.send(Housekeeping::Notify(done_tx)).is_ok() {
            let _ = done_rx.recv();
        }
    }

    fn policy(&self) -> &RotationPolicy {
        &self.backups.policy
    }

    fn open_existing_or_new(&mut self, write_len: u64) -> io::Result<()> {
        let existing = match fs::metadata(self.path()) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return self.open_new(),
            Err(e) => return Err(e),
        };

        if existing + write_len > self.policy().max_size_bytes {
            return self.rotate();
        }

        match OpenOptions::new().append(true).open(self.path()) {
            Ok(file) => {
                self.file = Some(file);
                self.size = existing;
                Ok(())
            }
            // Unreadable leftovers are moved aside rather than blocking the sink.
            Err(_) => self.open_new(),
        }
    }

    fn open_new(&mut self) -> io::Result<()> {
        let path = self.path().to_path_buf();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }

        if path.exists() {
            fs::rename(&path, self.backups.free_name())?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        self.file = Some(file);
        self.size = 0;
        Ok(())
    }

    /// Queue compression and pruning on the housekeeping thread.
    fn request_housekeeping(&mut self) {
        if let Some(tx) = &self.housekeeping {
            if tx.send(Housekeeping::Mill).is_ok() {
                return;
            }
        }

        let (tx, rx) = mpsc::channel();
        let worker = self.backups.clone();
        let spawned = thread::Builder::new()
            .name("log-housekeeping".to_string())
            .spawn(move || worker.serve(rx));
        match spawned {
            Ok(_) => {
                let _ = tx.send(Housekeeping::Mill);
                self.housekeeping = Some(tx);
            }
            // No thread available: mill inline, best effort.
            Err(_) => {
                let _ = self.backups.mill();
            }
        }
    }
}

enum Housekeeping {
    Mill,
    Notify(mpsc::Sender<()>),
}

/// Rotated files belonging to one active log file.
#[derive(Debug, Clone)]
struct BackupSet {
    path: PathBuf,
    policy: RotationPolicy,
}

impl BackupSet {
    fn serve(self, requests: mpsc::Receiver<Housekeeping>) {
        for request in requests {
            match request {
                Housekeeping::Mill => {
                    let _ = self.mill();
                }
                Housekeeping::Notify(done) => {
                    let _ = done.send(());
                }
            }
        }
    }

    fn now(&self) -> NaiveDateTime {
        if self.policy.local_time {
            Local::now().naive_local()
        } else {
            Utc::now().naive_utc()
        }
    }

    fn name_parts(&self) -> (String, String) {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = self
            .path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        (stem, ext)
    }

    fn name_at(&self, at: &NaiveDateTime) -> PathBuf {
        let (stem, ext) = self.name_parts();
        let stamp = at.format(BACKUP_TIME_FORMAT);
        self.path.with_file_name(format!("{stem}-{stamp}{ext}"))
    }

    /// Backup name for a rotation happening now, stepped forward a millisecond
    /// at a time past names already taken (compressed or not).
    fn free_name(&self) -> PathBuf {
        let mut at = self.now();
        let mut candidate = self.name_at(&at);
        for _ in 0..MAX_NAME_ATTEMPTS {
            if !candidate.exists() && !compressed_path(&candidate).exists() {
                break;
            }
            match Duration::try_milliseconds(1).and_then(|step| at.checked_add_signed(step)) {
                Some(next) => at = next,
                None => break,
            }
            candidate = self.name_at(&at);
        }
        candidate
    }

    fn parse_time(&self, file_name: &str) -> Option<DateTime<Utc>> {
        let (stem, ext) = self.name_parts();
        let rest = file_name.strip_prefix(&format!("{stem}-"))?;
        let rest = rest.strip_suffix(COMPRESS_SUFFIX).unwrap_or(rest);
        let stamp = rest.strip_suffix(ext.as_str())?;
        let naive = NaiveDateTime::parse_from_str(stamp, BACKUP_TIME_FORMAT).ok()?;
        if self.policy.local_time {
            Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|t| t.with_timezone(&Utc))
        } else {
            Some(Utc.from_utc_datetime(&naive))
        }
    }

    fn list(&self) -> io::Result<Vec<PathBuf>> {
        let dir = match self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            Some(dir) => dir.to_path_buf(),
            None => PathBuf::from("."),
        };

        let mut found = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(stamp) = self.parse_time(&name) {
                found.push((stamp, entry.path()));
            }
        }
        found.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(found.into_iter().map(|(_, path)| path).collect())
    }

    /// Prune and compress rotated files according to the policy.
    fn mill(&self) -> io::Result<()> {
        let mut backups = self.list()?;

        if self.policy.max_backups > 0 && backups.len() > self.policy.max_backups {
            for stale in backups.split_off(self.policy.max_backups) {
                fs::remove_file(stale)?;
            }
        }

        let cutoff = match self.policy.max_age_days {
            0 => None,
            days => i64::try_from(days)
                .ok()
                .and_then(Duration::try_days)
                .and_then(|age| Utc::now().checked_sub_signed(age)),
        };
        if let Some(cutoff) = cutoff {
            let mut kept = Vec::with_capacity(backups.len());
            for path in backups {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                match self.parse_time(&name) {
                    Some(stamp) if stamp < cutoff => fs::remove_file(&path)?,
                    _ => kept.push(path),
                }
            }
            backups = kept;
        }

        if self.policy.compress {
            for path in backups {
                let compressed = path.to_string_lossy().ends_with(COMPRESS_SUFFIX);
                if !compressed {
                    compress_file(&path)?;
                }
            }
        }

        Ok(())
    }
}

fn compressed_path(src: &Path) -> PathBuf {
    let mut dst = src.as_os_str().to_owned();
    dst.push(COMPRESS_SUFFIX);
    PathBuf::from(dst)
}

fn compress_file(src: &Path) -> io::Result<()> {
    let mut input = File::open(src)?;
    let output = File::create(compressed_path(src))?;
    let mut encoder = GzEncoder::new(output, Compression::default());
    io::copy(&mut input, &mut encoder)?;
    encoder.finish()?;

    fs::remove_file(src)
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let len = buf.len() as u64;
        if len > self.policy().max_size_bytes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "write length {} exceeds maximum file size {}",
                    len,
                    self.policy().max_size_bytes
                ),
            ));
        }

        if self.file.is_none() {
            self.open_existing_or_new(len)?;
        } else if self.size + len > self.policy().max_size_bytes {
            self.rotate()?;
        }

        let file = match self.file.as_mut() {
            Some(file) => file,
            None => return Err(io::Error::new(io::ErrorKind::NotFound, "log file not open")),
        };
        let written = file.write(buf)?;
        self.size += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl RotatingWriter for RotatingFile {
    fn rotate(&mut self) -> io::Result<()> {
        self.file = None;
        self.open_new()?;
        self.request_housekeeping();
        Ok(())
    }
}
