// Copyright 2025 Rotolog Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Plain file sinks: open-mode policy, buffered I/O sizing and the fsync
//! throttle.

use std::fs;
use std::fs::File;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use anyhow::Context;
use jiff::Zoned;
use jiff::fmt::strtime;
use jiff::tz::TimeZone;

use crate::error::ConfigError;
use crate::filter::SinkCore;
use crate::record::Record;
use crate::sink::Sink;
use crate::stream::Destination;
use crate::stream::EventNotifier;
use crate::stream::StreamSink;

const OPEN_RETRY_ATTEMPTS: u32 = 3;
const OPEN_RETRY_DELAY: Duration = Duration::from_millis(20);

/// How the log file is opened.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OpenMode {
    /// Truncate the file on open.
    Write,
    /// Keep existing contents and append.
    #[default]
    Append,
}

/// One-time decoration appended to the filename at construction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum FilenameAppend {
    /// Keep the filename as given.
    #[default]
    None,
    /// Append the process-start date, `YYYYMMDD`.
    StartDate,
    /// Append the process-start date and time, `YYYYMMDD_HHMMSS`.
    StartDateTime,
    /// Append a custom `strftime` pattern evaluated at process start.
    CustomPattern(String),
}

/// Immutable file-sink policy.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use rotolog::file::FileSinkConfig;
/// use rotolog::file::OpenMode;
///
/// let config = FileSinkConfig::builder()
///     .open_mode(OpenMode::Append)
///     .fsync_enabled(true)
///     .min_fsync_interval(Duration::from_secs(1))
///     .build()
///     .unwrap();
/// ```
#[derive(Clone, Debug)]
pub struct FileSinkConfig {
    open_mode: OpenMode,
    write_buffer_size: usize,
    fsync_enabled: bool,
    min_fsync_interval: Duration,
    filename_append: FilenameAppend,
    timezone: TimeZone,
}

impl Default for FileSinkConfig {
    fn default() -> Self {
        FileSinkConfig {
            open_mode: OpenMode::Append,
            write_buffer_size: 0,
            fsync_enabled: false,
            min_fsync_interval: Duration::ZERO,
            filename_append: FilenameAppend::None,
            timezone: TimeZone::system(),
        }
    }
}

impl FileSinkConfig {
    /// Creates a new [`FileSinkConfigBuilder`].
    #[must_use]
    pub fn builder() -> FileSinkConfigBuilder {
        FileSinkConfigBuilder {
            config: FileSinkConfig::default(),
        }
    }

    /// The configured open mode.
    pub fn open_mode(&self) -> OpenMode {
        self.open_mode
    }

    /// The configured write-buffer size, 0 meaning the platform default.
    pub fn write_buffer_size(&self) -> usize {
        self.write_buffer_size
    }

    /// Whether flushes perform a durable sync.
    pub fn fsync_enabled(&self) -> bool {
        self.fsync_enabled
    }

    /// The minimum interval between durable syncs.
    pub fn min_fsync_interval(&self) -> Duration {
        self.min_fsync_interval
    }

    /// The timezone used for any date computation.
    pub fn timezone(&self) -> &TimeZone {
        &self.timezone
    }

    pub(crate) fn filename_append(&self) -> &FilenameAppend {
        &self.filename_append
    }
}

/// A builder for configuring [`FileSinkConfig`].
#[derive(Debug)]
pub struct FileSinkConfigBuilder {
    config: FileSinkConfig,
}

impl FileSinkConfigBuilder {
    /// Sets the open mode.
    #[must_use]
    pub fn open_mode(mut self, open_mode: OpenMode) -> Self {
        self.config.open_mode = open_mode;
        self
    }

    /// Sets the write-buffer size in bytes, 0 meaning the default.
    #[must_use]
    pub fn write_buffer_size(mut self, size: usize) -> Self {
        self.config.write_buffer_size = size;
        self
    }

    /// Enables or disables durable syncs on flush.
    #[must_use]
    pub fn fsync_enabled(mut self, enabled: bool) -> Self {
        self.config.fsync_enabled = enabled;
        self
    }

    /// Sets the minimum interval between durable syncs.
    ///
    /// A flush inside the interval still flushes the write buffer but skips
    /// the sync, trading durability for reduced disk wear.
    #[must_use]
    pub fn min_fsync_interval(mut self, interval: Duration) -> Self {
        self.config.min_fsync_interval = interval;
        self
    }

    /// Sets the one-time filename decoration.
    #[must_use]
    pub fn filename_append(mut self, append: FilenameAppend) -> Self {
        self.config.filename_append = append;
        self
    }

    /// Sets the timezone used for any date computation.
    #[must_use]
    pub fn timezone(mut self, timezone: TimeZone) -> Self {
        self.config.timezone = timezone;
        self
    }

    /// Validates and builds the [`FileSinkConfig`].
    pub fn build(self) -> Result<FileSinkConfig, ConfigError> {
        if !self.config.fsync_enabled && !self.config.min_fsync_interval.is_zero() {
            return Err(ConfigError::FsyncIntervalWithoutFsync);
        }
        Ok(self.config)
    }
}

/// Computes the decorated filename per the configured one-time append option.
fn decorate_filename(path: &Path, config: &FileSinkConfig) -> anyhow::Result<PathBuf> {
    let pattern = match config.filename_append() {
        FilenameAppend::None => return Ok(path.to_path_buf()),
        FilenameAppend::StartDate => "%Y%m%d",
        FilenameAppend::StartDateTime => "%Y%m%d_%H%M%S",
        FilenameAppend::CustomPattern(pattern) => pattern.as_str(),
    };
    let now = Zoned::now().with_time_zone(config.timezone().clone());
    let stamp = strtime::format(pattern, &now)
        .with_context(|| format!("invalid filename-append pattern `{pattern}`"))?;
    Ok(append_to_filename(path, &stamp))
}

/// Inserts `part` between the file stem and extension: `<stem>.<part><ext>`.
pub(crate) fn append_to_filename(path: &Path, part: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut name = format!("{stem}.{part}");
    if let Some(ext) = path.extension() {
        name.push('.');
        name.push_str(&ext.to_string_lossy());
    }
    path.with_file_name(name)
}

fn open_with_retry(path: &Path, mode: OpenMode) -> anyhow::Result<File> {
    let mut options = OpenOptions::new();
    options.create(true);
    match mode {
        OpenMode::Write => options.write(true).truncate(true),
        OpenMode::Append => options.append(true),
    };

    // Transient contention, e.g. an anti-virus scanner holding the file,
    // clears quickly; retry a fixed small number of times before escalating.
    let mut result = options.open(path);
    for _ in 1..OPEN_RETRY_ATTEMPTS {
        if result.is_ok() {
            break;
        }
        thread::sleep(OPEN_RETRY_DELAY);
        result = options.open(path);
    }
    result.with_context(|| format!("failed to open log file {}", path.display()))
}

/// A sink that writes to a single file on disk.
///
/// Adds file-specific policy on top of [`StreamSink`]: buffered I/O sizing,
/// a throttled fsync on flush, one-time filename decoration, and a
/// self-healing re-open if the file vanishes while the program runs.
#[derive(Debug)]
pub struct FileSink {
    stream: StreamSink,
    config: FileSinkConfig,
    path: PathBuf,
    current_size: u64,
    last_fsync: Option<Instant>,
}

impl FileSink {
    /// Creates a file sink and opens the file per the configured mode.
    pub fn new(path: impl AsRef<Path>, config: FileSinkConfig) -> anyhow::Result<FileSink> {
        Self::with_notifier(path, config, EventNotifier::default())
    }

    /// Creates a file sink with lifecycle hooks and opens the file.
    pub fn with_notifier(
        path: impl AsRef<Path>,
        config: FileSinkConfig,
        notifier: EventNotifier,
    ) -> anyhow::Result<FileSink> {
        let mut sink = Self::closed(path, config, notifier)?;
        sink.open(sink.config.open_mode())?;
        Ok(sink)
    }

    /// Creates the sink without opening the file.
    ///
    /// The rotation layer opens the file itself after startup recovery and a
    /// possible pre-rotation.
    pub(crate) fn closed(
        path: impl AsRef<Path>,
        config: FileSinkConfig,
        notifier: EventNotifier,
    ) -> anyhow::Result<FileSink> {
        let decorated = decorate_filename(path.as_ref(), &config)?;
        let destination = Destination::from_path(&decorated)?;
        let path = match &destination {
            Destination::Path(path) => path.clone(),
            _ => unreachable!("file destinations always resolve to a path"),
        };
        let stream = StreamSink::from_destination(destination, notifier);
        Ok(FileSink {
            stream,
            config,
            path,
            current_size: 0,
            last_fsync: None,
        })
    }

    /// The resolved path of the live file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes written to the live file since it was last opened.
    pub(crate) fn current_size(&self) -> u64 {
        self.current_size
    }

    /// The live file's size on disk.
    pub(crate) fn disk_size(&self) -> anyhow::Result<u64> {
        fs::metadata(&self.path)
            .map(|meta| meta.len())
            .with_context(|| format!("failed to query size of {}", self.path.display()))
    }

    /// Opens the file, bracketed by the open hooks.
    pub(crate) fn open(&mut self, mode: OpenMode) -> anyhow::Result<()> {
        self.stream.notifier_mut().notify_before_open(&self.path);
        let mut file = open_with_retry(&self.path, mode)?;

        self.current_size = match mode {
            OpenMode::Write => 0,
            OpenMode::Append => file
                .metadata()
                .with_context(|| format!("failed to query size of {}", self.path.display()))?
                .len(),
        };

        let path = self.path.clone();
        self.stream.notifier_mut().notify_after_open(&path, &mut file);
        self.stream
            .install_handle(file, self.config.write_buffer_size());
        Ok(())
    }

    /// Closes the file, bracketed by the close hooks. Idempotent.
    pub(crate) fn close(&mut self) -> anyhow::Result<()> {
        if !self.stream.is_open() {
            return Ok(());
        }
        self.stream.notifier_mut().notify_before_close(&self.path);
        if let Some(mut writer) = self.stream.take_handle() {
            writer
                .flush()
                .with_context(|| format!("failed to flush {} on close", self.path.display()))?;
        }
        self.stream.notifier_mut().notify_after_close(&self.path);
        Ok(())
    }

    /// Flushes the write buffer and forces a durable sync, ignoring the
    /// throttle. A rotation must not lose buffered bytes.
    pub(crate) fn flush_and_sync(&mut self) -> anyhow::Result<()> {
        self.stream.flush_target()?;
        if let Some(writer) = self.stream.handle_mut() {
            writer
                .get_ref()
                .sync_all()
                .with_context(|| format!("failed to sync {}", self.path.display()))?;
            self.last_fsync = Some(Instant::now());
        }
        Ok(())
    }

    pub(crate) fn write_statement(&mut self, bytes: &[u8]) -> anyhow::Result<()> {
        let written = self.stream.write_bytes(bytes)?;
        self.current_size += written as u64;
        Ok(())
    }

    fn fsync_due(&self) -> bool {
        self.last_fsync
            .is_none_or(|at| at.elapsed() >= self.config.min_fsync_interval())
    }

    /// Re-opens a fresh file at the same path after external deletion.
    fn heal(&mut self) -> anyhow::Result<()> {
        self.close()?;
        self.open(OpenMode::Write)
    }
}

impl Sink for FileSink {
    fn core(&self) -> &SinkCore {
        self.stream.core()
    }

    fn core_mut(&mut self) -> &mut SinkCore {
        self.stream.core_mut()
    }

    fn write_log(&mut self, record: &Record) -> anyhow::Result<()> {
        self.write_statement(record.statement())
    }

    fn flush_sink(&mut self) -> anyhow::Result<()> {
        self.stream.flush_target()?;

        if self.config.fsync_enabled() && self.fsync_due() {
            if let Some(writer) = self.stream.handle_mut() {
                writer
                    .get_ref()
                    .sync_all()
                    .with_context(|| format!("failed to sync {}", self.path.display()))?;
                self.last_fsync = Some(Instant::now());
            }
        }

        // A user or external process may delete the live file while the
        // program runs; keep logging alive with a fresh file at the same
        // path.
        if self.stream.is_open() && !self.path.exists() {
            self.heal()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use tempfile::TempDir;

    use super::*;

    fn write_record(sink: &mut FileSink, payload: &str) {
        let record = Record::builder().message(payload).build();
        sink.write_log(&record).unwrap();
    }

    #[test]
    fn test_append_mode_keeps_existing_contents() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("app.log");
        fs::write(&path, "before\n").unwrap();

        let config = FileSinkConfig::builder()
            .open_mode(OpenMode::Append)
            .build()
            .unwrap();
        let mut sink = FileSink::new(&path, config).unwrap();
        write_record(&mut sink, "after\n");
        sink.flush_sink().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "before\nafter\n");
        assert_eq!(sink.current_size(), "before\nafter\n".len() as u64);
    }

    #[test]
    fn test_write_mode_truncates_existing_contents() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("app.log");
        fs::write(&path, "stale").unwrap();

        let config = FileSinkConfig::builder()
            .open_mode(OpenMode::Write)
            .build()
            .unwrap();
        let mut sink = FileSink::new(&path, config).unwrap();
        write_record(&mut sink, "fresh");
        sink.flush_sink().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "fresh");
    }

    #[test]
    fn test_close_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("app.log");
        let mut sink = FileSink::new(&path, FileSinkConfig::default()).unwrap();

        sink.close().unwrap();
        sink.close().unwrap();
    }

    #[test]
    fn test_flush_reopens_after_external_deletion() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("app.log");
        let mut sink = FileSink::new(&path, FileSinkConfig::default()).unwrap();

        write_record(&mut sink, "first\n");
        sink.flush_sink().unwrap();
        fs::remove_file(&path).unwrap();

        sink.flush_sink().unwrap();
        assert!(path.exists());

        write_record(&mut sink, "second\n");
        sink.flush_sink().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second\n");
    }

    #[test]
    fn test_fsync_interval_without_fsync_is_rejected() {
        let err = FileSinkConfig::builder()
            .min_fsync_interval(Duration::from_secs(1))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::FsyncIntervalWithoutFsync));
    }

    #[test]
    fn test_filename_decoration_with_custom_pattern() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("app.log");
        let config = FileSinkConfig::builder()
            .filename_append(FilenameAppend::CustomPattern("%Y".to_string()))
            .build()
            .unwrap();
        let sink = FileSink::new(&path, config).unwrap();

        let year = Zoned::now().year().to_string();
        let expected = format!("app.{year}.log");
        assert_eq!(sink.path().file_name().unwrap(), expected.as_str());
    }

    #[test]
    fn test_open_and_close_hooks_fire_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("app.log");

        let calls = Arc::new(AtomicUsize::new(0));
        let step = |expected: usize, calls: &Arc<AtomicUsize>| {
            let calls = calls.clone();
            move |_: &Path| {
                assert_eq!(calls.fetch_add(1, Ordering::SeqCst), expected);
            }
        };
        let after_open = {
            let calls = calls.clone();
            move |_: &Path, _: &mut File| {
                assert_eq!(calls.fetch_add(1, Ordering::SeqCst), 1);
            }
        };
        let notifier = EventNotifier::new()
            .on_before_open(step(0, &calls))
            .on_after_open(after_open)
            .on_before_close(step(2, &calls))
            .on_after_close(step(3, &calls));

        let mut sink = FileSink::with_notifier(&path, FileSinkConfig::default(), notifier).unwrap();
        sink.close().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_before_write_hook_transforms_bytes() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("app.log");
        let notifier = EventNotifier::new().on_before_write(|bytes| {
            let mut framed = vec![b'['];
            framed.extend_from_slice(bytes);
            framed.push(b']');
            framed
        });

        let mut sink = FileSink::with_notifier(&path, FileSinkConfig::default(), notifier).unwrap();
        write_record(&mut sink, "payload");
        sink.flush_sink().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "[payload]");
        assert_eq!(sink.current_size(), "[payload]".len() as u64);
    }
}
