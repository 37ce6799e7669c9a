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

//! The rotating file sink: trigger evaluation, generational rename, startup
//! recovery.

use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use jiff::Timestamp;
use jiff::fmt::strtime;

use crate::error::ConfigError;
use crate::file::FileSink;
use crate::file::FileSinkConfig;
use crate::file::OpenMode;
use crate::filter::SinkCore;
use crate::record::Record;
use crate::rotating::clock::Clock;
use crate::rotating::ledger::FileInfo;
use crate::rotating::ledger::Ledger;
use crate::rotating::ledger::NamingScheme;
use crate::rotating::ledger::parse_filename;
use crate::rotating::rotation::RotationFrequency;
use crate::sink::Sink;
use crate::stream::EventNotifier;

/// The smallest accepted size-based rotation trigger, in bytes.
pub const MIN_ROTATION_SIZE: u64 = 512;

const RENAME_RETRY_DELAY: Duration = Duration::from_millis(20);

/// Rotation policy layered over [`FileSinkConfig`].
///
/// # Examples
///
/// ```
/// use rotolog::rotating::NamingScheme;
/// use rotolog::rotating::RotatingFileSinkConfig;
///
/// let config = RotatingFileSinkConfig::builder()
///     .max_file_size(64 * 1024 * 1024)
///     .rotation_daily(0, 0)
///     .max_backup_files(7)
///     .naming_scheme(NamingScheme::Date)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone, Debug)]
pub struct RotatingFileSinkConfig {
    file: FileSinkConfig,
    max_file_size: u64,
    frequency: RotationFrequency,
    max_backup_files: usize,
    overwrite_rolled_files: bool,
    remove_old_files: bool,
    naming_scheme: NamingScheme,
    rotate_on_open: bool,
}

impl Default for RotatingFileSinkConfig {
    fn default() -> Self {
        RotatingFileSinkConfig {
            file: FileSinkConfig::default(),
            max_file_size: 0,
            frequency: RotationFrequency::Disabled,
            max_backup_files: usize::MAX,
            overwrite_rolled_files: true,
            remove_old_files: false,
            naming_scheme: NamingScheme::Index,
            rotate_on_open: false,
        }
    }
}

impl RotatingFileSinkConfig {
    /// Creates a new [`RotatingFileSinkConfigBuilder`].
    #[must_use]
    pub fn builder() -> RotatingFileSinkConfigBuilder {
        RotatingFileSinkConfigBuilder {
            config: RotatingFileSinkConfig::default(),
        }
    }

    /// The underlying file-sink policy.
    pub fn file(&self) -> &FileSinkConfig {
        &self.file
    }

    /// The size-based trigger, 0 meaning disabled.
    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// The time-based trigger.
    pub fn frequency(&self) -> RotationFrequency {
        self.frequency
    }

    /// The maximum number of rotated generations kept on disk.
    pub fn max_backup_files(&self) -> usize {
        self.max_backup_files
    }

    /// Whether reaching the backup limit evicts the oldest generation.
    ///
    /// When disabled, a rotation that would exceed the limit is skipped and
    /// the live file keeps growing instead.
    pub fn overwrite_rolled_files(&self) -> bool {
        self.overwrite_rolled_files
    }

    /// Whether startup in write mode removes generations from earlier runs.
    pub fn remove_old_files(&self) -> bool {
        self.remove_old_files
    }

    /// The rule for naming rotated generations.
    pub fn naming_scheme(&self) -> NamingScheme {
        self.naming_scheme
    }

    /// Whether a non-empty file found at startup is rotated before the first
    /// write.
    pub fn rotate_on_open(&self) -> bool {
        self.rotate_on_open
    }
}

/// A builder for configuring [`RotatingFileSinkConfig`].
#[derive(Debug)]
pub struct RotatingFileSinkConfigBuilder {
    config: RotatingFileSinkConfig,
}

impl RotatingFileSinkConfigBuilder {
    /// Sets the underlying file-sink policy.
    #[must_use]
    pub fn file(mut self, file: FileSinkConfig) -> Self {
        self.config.file = file;
        self
    }

    /// Sets the size-based trigger in bytes, 0 meaning disabled.
    #[must_use]
    pub fn max_file_size(mut self, size: u64) -> Self {
        self.config.max_file_size = size;
        self
    }

    /// Rotates every `interval` minutes. Replaces any previously configured
    /// time trigger.
    #[must_use]
    pub fn rotation_minutely(mut self, interval: u32) -> Self {
        self.config.frequency = RotationFrequency::Minutely { interval };
        self
    }

    /// Rotates every `interval` hours. Replaces any previously configured
    /// time trigger.
    #[must_use]
    pub fn rotation_hourly(mut self, interval: u32) -> Self {
        self.config.frequency = RotationFrequency::Hourly { interval };
        self
    }

    /// Rotates daily at `hour`:`minute` in the sink's timezone. Replaces any
    /// previously configured time trigger.
    #[must_use]
    pub fn rotation_daily(mut self, hour: u8, minute: u8) -> Self {
        self.config.frequency = RotationFrequency::Daily { hour, minute };
        self
    }

    /// Sets the maximum number of rotated generations kept on disk.
    #[must_use]
    pub fn max_backup_files(mut self, count: usize) -> Self {
        self.config.max_backup_files = count;
        self
    }

    /// Sets whether reaching the backup limit evicts the oldest generation.
    #[must_use]
    pub fn overwrite_rolled_files(mut self, overwrite: bool) -> Self {
        self.config.overwrite_rolled_files = overwrite;
        self
    }

    /// Sets whether startup in write mode removes generations from earlier
    /// runs.
    #[must_use]
    pub fn remove_old_files(mut self, remove: bool) -> Self {
        self.config.remove_old_files = remove;
        self
    }

    /// Sets the rule for naming rotated generations.
    #[must_use]
    pub fn naming_scheme(mut self, scheme: NamingScheme) -> Self {
        self.config.naming_scheme = scheme;
        self
    }

    /// Rotates a non-empty file found at startup before the first write.
    #[must_use]
    pub fn rotate_on_open(mut self, rotate: bool) -> Self {
        self.config.rotate_on_open = rotate;
        self
    }

    /// Validates and builds the [`RotatingFileSinkConfig`].
    pub fn build(self) -> Result<RotatingFileSinkConfig, ConfigError> {
        let config = self.config;
        if config.max_file_size != 0 && config.max_file_size < MIN_ROTATION_SIZE {
            return Err(ConfigError::MaxFileSizeTooSmall {
                min: MIN_ROTATION_SIZE,
                got: config.max_file_size,
            });
        }
        config.frequency.validate()?;
        Ok(config)
    }
}

fn rename_with_retry(from: &Path, to: &Path) -> anyhow::Result<()> {
    // One bounded retry tolerates a transient external lock on the file.
    if fs::rename(from, to).is_err() {
        thread::sleep(RENAME_RETRY_DELAY);
        fs::rename(from, to).with_context(|| {
            format!("failed to rename {} to {}", from.display(), to.display())
        })?;
    }
    Ok(())
}

/// The name an existing generation takes when a new rotation happens.
///
/// Under the index scheme every generation's index increments. Under a date
/// scheme the just-closed live file adopts the rotation's suffix at index 0,
/// generations already carrying that suffix increment their index, and
/// generations from an earlier date keep their name (they cannot collide).
fn next_generation(entry: &FileInfo, scheme: NamingScheme, new_suffix: Option<&str>) -> FileInfo {
    match scheme {
        NamingScheme::Index => FileInfo {
            suffix: None,
            index: entry.index + 1,
        },
        NamingScheme::Date | NamingScheme::DateTime => match entry.suffix.as_deref() {
            None => FileInfo {
                suffix: new_suffix.map(str::to_string),
                index: entry.index,
            },
            Some(suffix) if Some(suffix) == new_suffix => FileInfo {
                suffix: entry.suffix.clone(),
                index: entry.index + 1,
            },
            Some(_) => entry.clone(),
        },
    }
}

fn scan_directory(base: &Path) -> anyhow::Result<Vec<String>> {
    let dir = base
        .parent()
        .with_context(|| format!("log file {} has no parent directory", base.display()))?;
    let entries = fs::read_dir(dir)
        .with_context(|| format!("failed to read log directory {}", dir.display()))?;

    let mut names = Vec::new();
    for entry in entries {
        let Ok(entry) = entry else { continue };
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    Ok(names)
}

fn remove_stale_files(
    base: &Path,
    scheme: NamingScheme,
    today: Option<&str>,
) -> anyhow::Result<()> {
    for name in scan_directory(base)? {
        let Some(info) = parse_filename(base, &name, scheme) else {
            continue;
        };
        if info.is_live() {
            // The write-mode open truncates the live file itself.
            continue;
        }
        if let Some(suffix) = info.suffix.as_deref() {
            // Generations from a previous day belong to that day's rotation
            // and are not in conflict.
            if Some(suffix) != today {
                continue;
            }
        }
        let path = info.path(base);
        fs::remove_file(&path)
            .with_context(|| format!("failed to remove old log file {}", path.display()))?;
    }
    Ok(())
}

/// A file sink that rotates the live file by elapsed time or accumulated
/// size, renaming older generations per the configured naming scheme.
///
/// # Examples
///
/// ```no_run
/// use rotolog::rotating::RotatingFileSink;
/// use rotolog::rotating::RotatingFileSinkConfig;
///
/// let config = RotatingFileSinkConfig::builder()
///     .max_file_size(1024 * 1024)
///     .max_backup_files(5)
///     .build()
///     .unwrap();
/// let sink = RotatingFileSink::new("logs/app.log", config).unwrap();
/// ```
#[derive(Debug)]
pub struct RotatingFileSink {
    file: FileSink,
    config: RotatingFileSinkConfig,
    ledger: Ledger,
    next_rotation_at: Option<Timestamp>,
    open_at: Timestamp,
    clock: Clock,
}

impl RotatingFileSink {
    /// Creates the sink, runs startup recovery, and opens the live file.
    pub fn new(
        path: impl AsRef<Path>,
        config: RotatingFileSinkConfig,
    ) -> anyhow::Result<RotatingFileSink> {
        Self::create(path, config, EventNotifier::default(), Clock::System)
    }

    /// Creates the sink with lifecycle hooks.
    pub fn with_notifier(
        path: impl AsRef<Path>,
        config: RotatingFileSinkConfig,
        notifier: EventNotifier,
    ) -> anyhow::Result<RotatingFileSink> {
        Self::create(path, config, notifier, Clock::System)
    }

    fn create(
        path: impl AsRef<Path>,
        config: RotatingFileSinkConfig,
        notifier: EventNotifier,
        clock: Clock,
    ) -> anyhow::Result<RotatingFileSink> {
        let file = FileSink::closed(path, config.file().clone(), notifier)?;
        let base = file.path().to_path_buf();
        let now = clock.now();
        let scheme = config.naming_scheme();

        // Startup recovery and cleanup. Date-time suffixes never collide
        // across restarts, so that scheme needs neither.
        let mut ledger = Ledger::new();
        if !matches!(scheme, NamingScheme::DateTime) {
            match config.file().open_mode() {
                OpenMode::Write => {
                    if config.remove_old_files() {
                        let today = suffix_for(scheme, now, &config)?;
                        remove_stale_files(&base, scheme, today.as_deref())?;
                    }
                }
                OpenMode::Append => {
                    ledger = Ledger::recover(&base, scan_directory(&base)?, scheme);
                }
            }
        }

        let zoned = now.to_zoned(config.file().timezone().clone());
        let next_rotation_at = config.frequency().first_rotation(&zoned)?;

        let mut sink = RotatingFileSink {
            file,
            config,
            ledger,
            next_rotation_at,
            open_at: now,
            clock,
        };
        if !sink.ledger.front_is_live() {
            sink.ledger.push_live();
        }

        let existing_size = fs::metadata(&base).map(|meta| meta.len()).unwrap_or(0);
        if sink.config.rotate_on_open() && existing_size > 0 {
            sink.rotate()?;
        } else {
            sink.file.open(sink.config.file().open_mode())?;
        }
        Ok(sink)
    }

    /// The resolved path of the live file.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    fn rotation_suffix(&self) -> anyhow::Result<Option<String>> {
        suffix_for(self.config.naming_scheme(), self.open_at, &self.config)
    }

    /// Closes the live file, renames generations oldest first, and reopens a
    /// fresh live file.
    fn rotate(&mut self) -> anyhow::Result<()> {
        // A rotation never loses the newest message, but with eviction
        // disabled it may decline to bound disk usage.
        if !self.config.overwrite_rolled_files()
            && self.ledger.backup_count() >= self.config.max_backup_files()
        {
            return Ok(());
        }

        // The configured fsync policy does not apply here: a rotation must
        // not lose buffered bytes.
        self.file.flush_and_sync()?;
        if self.file.disk_size()? == 0 {
            // Never rotate away an empty file, e.g. under a full disk.
            return Ok(());
        }
        self.file.close()?;

        let base = self.file.path().to_path_buf();
        let scheme = self.config.naming_scheme();
        let new_suffix = self.rotation_suffix()?;

        // Oldest first: no rename may overwrite a file before that file's
        // own rename has completed.
        for entry in self.ledger.iter_mut_oldest_first() {
            let renamed = next_generation(entry, scheme, new_suffix.as_deref());
            if renamed == *entry {
                continue;
            }
            rename_with_retry(&entry.path(&base), &renamed.path(&base))?;
            *entry = renamed;
        }

        if self.ledger.len() > self.config.max_backup_files() {
            if let Some(oldest) = self.ledger.pop_oldest() {
                let path = oldest.path(&base);
                fs::remove_file(&path).with_context(|| {
                    format!("failed to remove oldest log file {}", path.display())
                })?;
            }
        }

        self.ledger.push_live();
        self.file.open(OpenMode::Write)?;
        self.open_at = self.clock.now();
        Ok(())
    }

    #[cfg(test)]
    fn clock_mut(&mut self) -> &mut Clock {
        &mut self.clock
    }
}

fn suffix_for(
    scheme: NamingScheme,
    at: Timestamp,
    config: &RotatingFileSinkConfig,
) -> anyhow::Result<Option<String>> {
    let Some(format) = scheme.suffix_format() else {
        return Ok(None);
    };
    let zoned = at.to_zoned(config.file().timezone().clone());
    let suffix = strtime::format(format, &zoned).context("failed to format rotation suffix")?;
    Ok(Some(suffix))
}

impl Sink for RotatingFileSink {
    fn core(&self) -> &SinkCore {
        self.file.core()
    }

    fn core_mut(&mut self) -> &mut SinkCore {
        self.file.core_mut()
    }

    fn write_log(&mut self, record: &Record) -> anyhow::Result<()> {
        let mut time_triggered = false;
        if let Some(at) = self.next_rotation_at {
            if record.timestamp() >= at {
                self.rotate()?;
                // Advance from the previous trigger time, not from now, so
                // consecutive triggers never drift.
                self.next_rotation_at = self.config.frequency().next_rotation(at);
                time_triggered = true;
            }
        }

        if !time_triggered && self.config.max_file_size() > 0 {
            let pending = record.statement().len() as u64;
            if self.file.current_size() + pending > self.config.max_file_size() {
                self.rotate()?;
            }
        }

        self.file.write_log(record)
    }

    fn flush_sink(&mut self) -> anyhow::Result<()> {
        self.file.flush_sink()
    }
}
