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

//! The sink contract shared by all log destinations.

use std::fmt;
use std::sync::Arc;

use log::LevelFilter;

use crate::error::ConfigError;
use crate::filter::Filter;
use crate::filter::FilterSet;
use crate::filter::SinkCore;
use crate::record::Record;

/// A configured log destination with a level threshold and filter chain.
///
/// The hot-path methods `write_log`, `flush_sink` and `run_periodic_tasks`
/// are invoked exclusively and sequentially by one backend worker thread,
/// which owns the sink. This is a hard precondition of the whole crate and
/// the reason none of the file, rename or rotation logic needs locks.
/// Configuration goes through the shared [`FilterSet`] handle returned by
/// [`filter_handle`](Sink::filter_handle) and may happen from any thread.
pub trait Sink: fmt::Debug + Send + 'static {
    /// The worker-thread state backing the provided methods.
    fn core(&self) -> &SinkCore;

    /// Mutable access to the worker-thread state.
    fn core_mut(&mut self) -> &mut SinkCore;

    /// Writes one accepted, already-rendered record to the destination.
    fn write_log(&mut self, record: &Record) -> anyhow::Result<()>;

    /// Flushes buffered bytes to the destination.
    fn flush_sink(&mut self) -> anyhow::Result<()>;

    /// Runs idle-time maintenance.
    ///
    /// Default to a no-op.
    fn run_periodic_tasks(&mut self) {}

    /// Sets the level threshold. Callable from any thread.
    fn set_level_filter(&self, level: LevelFilter) {
        self.core().filter_set().set_level_filter(level);
    }

    /// The current level threshold.
    fn level_filter(&self) -> LevelFilter {
        self.core().filter_set().level_filter()
    }

    /// Appends a filter, rejecting duplicate names. Callable from any thread.
    fn add_filter(&self, filter: Filter) -> Result<(), ConfigError> {
        self.core().filter_set().add_filter(filter)
    }

    /// Evaluates the level gate and filter chain against a record.
    ///
    /// Called only by the backend worker thread, before `write_log`.
    fn apply_filters(&mut self, record: &Record) -> bool {
        self.core_mut().apply_filters(record)
    }

    /// A cloneable handle for producer threads to reconfigure this sink.
    fn filter_handle(&self) -> Arc<FilterSet> {
        self.core().filter_set().clone()
    }
}

impl<T: Sink> From<T> for Box<dyn Sink> {
    fn from(value: T) -> Self {
        Box::new(value)
    }
}
