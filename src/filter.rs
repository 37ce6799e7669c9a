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

//! Filters for rendered log records and their cross-thread publication.
//!
//! A sink's filter chain has two sides. [`FilterSet`] is the canonical,
//! lock-protected side that producer threads publish changes to.
//! [`SinkCore`] is the worker-thread side: it keeps a local snapshot of the
//! chain and refreshes it lazily, so the hot path never takes the lock
//! unless a change was published.

use std::fmt::Debug;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use log::LevelFilter;

use crate::error::ConfigError;
use crate::record::Record;

/// A named predicate that a record must pass before a sink writes it.
///
/// ```
/// use rotolog::filter::Filter;
///
/// let filter = Filter::new("no_chatty", |record| record.logger_name() != "chatty");
/// ```
pub struct Filter {
    name: String,
    predicate: Box<dyn Fn(&Record) -> bool + Send + Sync + 'static>,
}

impl Debug for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Filter {{ name: {} }}", self.name)
    }
}

impl Filter {
    /// Creates a new named filter from a predicate.
    pub fn new(
        name: impl Into<String>,
        predicate: impl Fn(&Record) -> bool + Send + Sync + 'static,
    ) -> Self {
        Filter {
            name: name.into(),
            predicate: Box::new(predicate),
        }
    }

    /// The registered name of this filter.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn matches(&self, record: &Record) -> bool {
        (self.predicate)(record)
    }
}

fn encode_level(level: LevelFilter) -> usize {
    level as usize
}

fn decode_level(value: usize) -> LevelFilter {
    match value {
        0 => LevelFilter::Off,
        1 => LevelFilter::Error,
        2 => LevelFilter::Warn,
        3 => LevelFilter::Info,
        4 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// The shared side of a sink's level threshold and filter chain.
///
/// Cheap to clone through an `Arc`; any thread may reconfigure a sink through
/// its handle while the worker thread keeps writing.
#[derive(Debug)]
pub struct FilterSet {
    level: AtomicUsize,
    filters: Mutex<Vec<Arc<Filter>>>,
    dirty: AtomicBool,
}

impl Default for FilterSet {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterSet {
    /// Creates an empty filter set accepting all levels.
    pub fn new() -> Self {
        FilterSet {
            level: AtomicUsize::new(encode_level(LevelFilter::Trace)),
            filters: Mutex::new(Vec::new()),
            dirty: AtomicBool::new(false),
        }
    }

    /// Sets the level threshold, observable by the worker thread on its next
    /// evaluation.
    pub fn set_level_filter(&self, level: LevelFilter) {
        self.level.store(encode_level(level), Ordering::Release);
    }

    /// The current level threshold.
    pub fn level_filter(&self) -> LevelFilter {
        decode_level(self.level.load(Ordering::Acquire))
    }

    /// Appends a filter to the chain.
    ///
    /// Rejects a filter whose name duplicates an already registered one.
    pub fn add_filter(&self, filter: Filter) -> Result<(), ConfigError> {
        let mut filters = self.filters.lock().unwrap_or_else(PoisonError::into_inner);
        if filters.iter().any(|f| f.name() == filter.name()) {
            return Err(ConfigError::DuplicateFilter(filter.name().to_string()));
        }
        filters.push(Arc::new(filter));
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    fn snapshot_into(&self, cache: &mut Vec<Arc<Filter>>) {
        let filters = self.filters.lock().unwrap_or_else(PoisonError::into_inner);
        cache.clear();
        cache.extend(filters.iter().cloned());
    }
}

/// The worker-thread side of a sink: the level gate plus a cached snapshot of
/// the published filter chain.
///
/// Owned exclusively by the sink instance; only the backend worker thread
/// reads or rebuilds the snapshot.
#[derive(Debug)]
pub struct SinkCore {
    shared: Arc<FilterSet>,
    cached: Vec<Arc<Filter>>,
}

impl Default for SinkCore {
    fn default() -> Self {
        Self::new()
    }
}

impl SinkCore {
    /// Creates a core with a fresh, empty filter set.
    pub fn new() -> Self {
        SinkCore {
            shared: Arc::new(FilterSet::new()),
            cached: Vec::new(),
        }
    }

    /// The shared filter set backing this core.
    pub fn filter_set(&self) -> &Arc<FilterSet> {
        &self.shared
    }

    /// Evaluates the level gate and the filter chain against a record.
    ///
    /// Rejection by level takes no lock. The snapshot is refreshed only when
    /// producers have published changes since the last call; evaluation is a
    /// logical AND over the chain, short-circuiting on the first rejection.
    pub fn apply_filters(&mut self, record: &Record) -> bool {
        if record.level() > self.shared.level_filter() {
            return false;
        }
        if self.shared.dirty.swap(false, Ordering::Acquire) {
            self.shared.snapshot_into(&mut self.cached);
        }
        self.cached.iter().all(|filter| filter.matches(record))
    }
}
