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

//! Rotolog is the file-sink engine of an asynchronous logging backend: sinks
//! that take already-rendered log statements and move them onto disk or the
//! standard streams, with buffering, rotation and recovery handled here.
//!
//! # Overview
//!
//! A [`Sink`] is a configured destination with a level threshold and a filter
//! chain. The hot-path methods are called exclusively by one backend worker
//! thread, which is why sinks take `&mut self` and need no locks; producer
//! threads reconfigure a sink through its shared filter handle. Three sink
//! families build on each other: [`stream::StreamSink`] writes to a resolved
//! destination, [`file::FileSink`] adds file policy such as the open mode and
//! a throttled fsync, and [`rotating::RotatingFileSink`] adds size- and
//! time-triggered rotation with generational renames.
//!
//! # Examples
//!
//! A size-rotated file sink keeping five backups:
//!
//! ```no_run
//! use rotolog::Sink;
//! use rotolog::record::Record;
//! use rotolog::rotating::RotatingFileSink;
//! use rotolog::rotating::RotatingFileSinkConfig;
//!
//! let config = RotatingFileSinkConfig::builder()
//!     .max_file_size(16 * 1024 * 1024)
//!     .max_backup_files(5)
//!     .build()?;
//! let mut sink = RotatingFileSink::new("logs/app.log", config)?;
//!
//! let record = Record::builder().message("hello\n").build();
//! if sink.apply_filters(&record) {
//!     sink.write_log(&record)?;
//! }
//! sink.flush_sink()?;
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod error;
pub mod file;
pub mod filter;
pub mod record;
pub mod rotating;
pub mod sink;
pub mod stream;

pub use error::ConfigError;
pub use filter::Filter;
pub use sink::Sink;
