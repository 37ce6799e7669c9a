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

//! Stream sinks: destination resolution and the retry-safe write primitive.

use std::fmt;
use std::fs;
use std::fs::File;
use std::io;
use std::io::BufWriter;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;

use crate::filter::SinkCore;
use crate::record::Record;
use crate::sink::Sink;

/// Reserved destination name for the standard output stream.
pub const STDOUT_NAME: &str = ":stdout";
/// Reserved destination name for the standard error stream.
pub const STDERR_NAME: &str = ":stderr";
/// Reserved destination name for a sink that discards every record.
pub const DISCARD_NAME: &str = ":discard";

/// A logical destination resolved once at construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Destination {
    /// The standard output stream.
    Stdout,
    /// The standard error stream.
    Stderr,
    /// Accept every record, perform no I/O.
    Discard,
    /// A real file path with a canonicalized parent directory.
    Path(PathBuf),
}

impl Destination {
    /// Resolves a logical destination name.
    ///
    /// Names other than the reserved tokens are treated as file paths:
    /// missing parent directories are created and the parent is
    /// canonicalized. Failure to canonicalize is a construction-time fatal
    /// error, not a runtime-retry condition.
    pub fn resolve(name: &str) -> anyhow::Result<Destination> {
        match name {
            STDOUT_NAME => Ok(Destination::Stdout),
            STDERR_NAME => Ok(Destination::Stderr),
            DISCARD_NAME => Ok(Destination::Discard),
            path => Destination::from_path(path),
        }
    }

    /// Resolves a real file path, creating and canonicalizing its parent.
    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Destination> {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .with_context(|| format!("destination `{}` has no file name", path.display()))?;
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create log directory {}", parent.display()))?;
        let parent = parent
            .canonicalize()
            .with_context(|| format!("failed to canonicalize log directory {}", parent.display()))?;
        Ok(Destination::Path(parent.join(filename)))
    }
}

/// Callbacks fired around a sink's file lifecycle.
///
/// All hooks are optional. The before-write hook may transform the rendered
/// bytes before they reach the destination, e.g. to wrap them in a binary
/// envelope; the after-open hook receives the raw handle, e.g. to write a
/// header for structured formats.
#[derive(Default)]
pub struct EventNotifier {
    before_open: Option<Box<dyn FnMut(&Path) + Send>>,
    after_open: Option<Box<dyn FnMut(&Path, &mut File) + Send>>,
    before_close: Option<Box<dyn FnMut(&Path) + Send>>,
    after_close: Option<Box<dyn FnMut(&Path) + Send>>,
    before_write: Option<Box<dyn FnMut(&[u8]) -> Vec<u8> + Send>>,
}

impl fmt::Debug for EventNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventNotifier")
            .field("before_open", &self.before_open.is_some())
            .field("after_open", &self.after_open.is_some())
            .field("before_close", &self.before_close.is_some())
            .field("after_close", &self.after_close.is_some())
            .field("before_write", &self.before_write.is_some())
            .finish()
    }
}

impl EventNotifier {
    /// Creates an empty notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the hook fired before a file is opened.
    pub fn on_before_open(mut self, hook: impl FnMut(&Path) + Send + 'static) -> Self {
        self.before_open = Some(Box::new(hook));
        self
    }

    /// Sets the hook fired after a file is opened, with the open handle.
    pub fn on_after_open(mut self, hook: impl FnMut(&Path, &mut File) + Send + 'static) -> Self {
        self.after_open = Some(Box::new(hook));
        self
    }

    /// Sets the hook fired before a file is closed.
    pub fn on_before_close(mut self, hook: impl FnMut(&Path) + Send + 'static) -> Self {
        self.before_close = Some(Box::new(hook));
        self
    }

    /// Sets the hook fired after a file is closed.
    pub fn on_after_close(mut self, hook: impl FnMut(&Path) + Send + 'static) -> Self {
        self.after_close = Some(Box::new(hook));
        self
    }

    /// Sets the hook that transforms rendered bytes before each write.
    pub fn on_before_write(mut self, hook: impl FnMut(&[u8]) -> Vec<u8> + Send + 'static) -> Self {
        self.before_write = Some(Box::new(hook));
        self
    }

    pub(crate) fn notify_before_open(&mut self, path: &Path) {
        if let Some(hook) = &mut self.before_open {
            hook(path);
        }
    }

    pub(crate) fn notify_after_open(&mut self, path: &Path, file: &mut File) {
        if let Some(hook) = &mut self.after_open {
            hook(path, file);
        }
    }

    pub(crate) fn notify_before_close(&mut self, path: &Path) {
        if let Some(hook) = &mut self.before_close {
            hook(path);
        }
    }

    pub(crate) fn notify_after_close(&mut self, path: &Path) {
        if let Some(hook) = &mut self.after_close {
            hook(path);
        }
    }
}

/// Writes the whole buffer, tolerating short and interrupted writes.
///
/// A write that makes no progress without reporting an error is escalated as
/// a stall rather than looping forever.
fn write_all_retrying(writer: &mut impl Write, mut bytes: &[u8]) -> io::Result<()> {
    while !bytes.is_empty() {
        match writer.write(bytes) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "writer made no progress",
                ));
            }
            Ok(n) => bytes = &bytes[n..],
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

#[derive(Debug)]
enum StreamTarget {
    Discard,
    Stdout(io::Stdout),
    Stderr(io::Stderr),
    Handle(BufWriter<File>),
}

/// A sink that writes rendered bytes to a resolved destination.
///
/// Standard-stream and discard destinations are ready immediately. A path
/// destination starts without a handle; [`FileSink`](crate::file::FileSink)
/// installs one when it opens the file.
#[derive(Debug)]
pub struct StreamSink {
    core: SinkCore,
    destination: Destination,
    target: Option<StreamTarget>,
    bytes_written: u64,
    dirty: bool,
    notifier: EventNotifier,
}

impl StreamSink {
    /// Creates a stream sink for a logical destination name.
    pub fn new(name: &str) -> anyhow::Result<StreamSink> {
        let destination = Destination::resolve(name)?;
        Ok(Self::from_destination(destination, EventNotifier::default()))
    }

    pub(crate) fn from_destination(destination: Destination, notifier: EventNotifier) -> StreamSink {
        let target = match destination {
            Destination::Stdout => Some(StreamTarget::Stdout(io::stdout())),
            Destination::Stderr => Some(StreamTarget::Stderr(io::stderr())),
            Destination::Discard => Some(StreamTarget::Discard),
            Destination::Path(_) => None,
        };
        StreamSink {
            core: SinkCore::new(),
            destination,
            target,
            bytes_written: 0,
            dirty: false,
            notifier,
        }
    }

    /// The resolved destination of this sink.
    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    /// Cumulative bytes written since construction.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub(crate) fn notifier_mut(&mut self) -> &mut EventNotifier {
        &mut self.notifier
    }

    pub(crate) fn core(&self) -> &SinkCore {
        &self.core
    }

    pub(crate) fn core_mut(&mut self) -> &mut SinkCore {
        &mut self.core
    }

    pub(crate) fn is_open(&self) -> bool {
        self.target.is_some()
    }

    pub(crate) fn install_handle(&mut self, file: File, buffer_size: usize) {
        let writer = if buffer_size == 0 {
            BufWriter::new(file)
        } else {
            BufWriter::with_capacity(buffer_size, file)
        };
        self.target = Some(StreamTarget::Handle(writer));
        self.dirty = false;
    }

    pub(crate) fn take_handle(&mut self) -> Option<BufWriter<File>> {
        match self.target.take() {
            Some(StreamTarget::Handle(writer)) => {
                self.dirty = false;
                Some(writer)
            }
            other => {
                self.target = other;
                None
            }
        }
    }

    pub(crate) fn handle_mut(&mut self) -> Option<&mut BufWriter<File>> {
        match &mut self.target {
            Some(StreamTarget::Handle(writer)) => Some(writer),
            _ => None,
        }
    }

    /// Writes rendered bytes through the before-write hook to the target.
    ///
    /// Returns the number of bytes committed to the destination.
    pub(crate) fn write_bytes(&mut self, bytes: &[u8]) -> anyhow::Result<usize> {
        if matches!(self.destination, Destination::Discard) {
            return Ok(0);
        }
        if let Some(hook) = &mut self.notifier.before_write {
            let transformed = hook(bytes);
            self.write_raw(&transformed)?;
            Ok(transformed.len())
        } else {
            self.write_raw(bytes)?;
            Ok(bytes.len())
        }
    }

    fn write_raw(&mut self, bytes: &[u8]) -> anyhow::Result<()> {
        let target = self
            .target
            .as_mut()
            .context("sink has no open destination")?;
        match target {
            StreamTarget::Discard => return Ok(()),
            StreamTarget::Stdout(out) => write_all_retrying(out, bytes),
            StreamTarget::Stderr(err) => write_all_retrying(err, bytes),
            StreamTarget::Handle(writer) => write_all_retrying(writer, bytes),
        }
        .context("failed to write log record")?;
        self.bytes_written += bytes.len() as u64;
        self.dirty = true;
        Ok(())
    }

    /// Flushes the target if an unflushed write occurred.
    ///
    /// A sink whose handle was invalidated by a prior error, or that never
    /// wrote since the last flush, performs no I/O here.
    pub(crate) fn flush_target(&mut self) -> anyhow::Result<()> {
        if !self.dirty {
            return Ok(());
        }
        match &mut self.target {
            None | Some(StreamTarget::Discard) => return Ok(()),
            Some(StreamTarget::Stdout(out)) => out.flush(),
            Some(StreamTarget::Stderr(err)) => err.flush(),
            Some(StreamTarget::Handle(writer)) => writer.flush(),
        }
        .context("failed to flush sink")?;
        self.dirty = false;
        Ok(())
    }
}

impl Sink for StreamSink {
    fn core(&self) -> &SinkCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SinkCore {
        &mut self.core
    }

    fn write_log(&mut self, record: &Record) -> anyhow::Result<()> {
        self.write_bytes(record.statement())?;
        Ok(())
    }

    fn flush_sink(&mut self) -> anyhow::Result<()> {
        self.flush_target()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ShortWriter {
        written: Vec<u8>,
        interruptions: usize,
    }

    impl Write for ShortWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.interruptions > 0 {
                self.interruptions -= 1;
                return Err(io::Error::new(io::ErrorKind::Interrupted, "interrupted"));
            }
            // Commit at most two bytes per call to force short writes.
            let n = buf.len().min(2);
            self.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct StalledWriter;

    impl Write for StalledWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_all_retrying_tolerates_short_and_interrupted_writes() {
        let mut writer = ShortWriter {
            written: Vec::new(),
            interruptions: 2,
        };
        write_all_retrying(&mut writer, b"hello world").unwrap();
        assert_eq!(writer.written, b"hello world");
    }

    #[test]
    fn test_write_all_retrying_escalates_a_stall() {
        let err = write_all_retrying(&mut StalledWriter, b"data").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WriteZero);
    }

    #[test]
    fn test_discard_sink_performs_no_io_and_never_raises() {
        let mut sink = StreamSink::new(DISCARD_NAME).unwrap();
        let record = Record::builder().message("dropped").build();
        sink.write_log(&record).unwrap();
        sink.flush_sink().unwrap();
        assert_eq!(sink.bytes_written(), 0);
    }

    #[test]
    fn test_reserved_names_resolve_to_streams() {
        assert_eq!(
            Destination::resolve(STDOUT_NAME).unwrap(),
            Destination::Stdout
        );
        assert_eq!(
            Destination::resolve(STDERR_NAME).unwrap(),
            Destination::Stderr
        );
        assert_eq!(
            Destination::resolve(DISCARD_NAME).unwrap(),
            Destination::Discard
        );
    }

    #[test]
    fn test_path_destination_creates_parent_directories() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let nested = temp_dir.path().join("a/b/app.log");
        let destination = Destination::from_path(&nested).unwrap();
        match destination {
            Destination::Path(path) => {
                assert!(path.parent().unwrap().is_dir());
                assert_eq!(path.file_name().unwrap(), "app.log");
            }
            other => panic!("expected a path destination, got {other:?}"),
        }
    }

    #[test]
    fn test_flush_without_pending_writes_is_a_no_op() {
        let mut sink = StreamSink::new(STDOUT_NAME).unwrap();
        sink.flush_sink().unwrap();
        sink.flush_sink().unwrap();
    }
}
