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

//! Errors raised synchronously at configuration time, before any I/O.

/// An invalid sink configuration value.
///
/// These are surfaced to the caller that supplied the value. Runtime I/O
/// failures are reported as [`anyhow::Error`] from the sink operations
/// themselves.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The size-based rotation trigger is below the supported minimum.
    #[error("max file size must be 0 (disabled) or at least {min} bytes, got {got}")]
    MaxFileSizeTooSmall {
        /// The smallest accepted trigger size.
        min: u64,
        /// The configured value.
        got: u64,
    },

    /// The time-based rotation interval is zero.
    #[error("rotation interval must be at least 1")]
    InvalidRotationInterval,

    /// The daily rotation time is not a valid hour and minute of day.
    #[error("invalid daily rotation time {hour:02}:{minute:02}")]
    InvalidDailyTime {
        /// The configured hour, expected 0..=23.
        hour: u8,
        /// The configured minute, expected 0..=59.
        minute: u8,
    },

    /// A minimum fsync interval was configured while fsync is disabled.
    #[error("minimum fsync interval requires fsync to be enabled")]
    FsyncIntervalWithoutFsync,

    /// A filter with the same name is already registered on the sink.
    #[error("a filter named `{0}` is already registered")]
    DuplicateFilter(String),
}
