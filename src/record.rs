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

//! The rendered log record handed to sinks by the backend worker thread.

use jiff::Timestamp;
use log::Level;

/// An already-rendered log record.
///
/// Formatting happens upstream of this crate: `message` carries the rendered
/// user message and `statement` carries the full rendered statement bytes as
/// they should reach the destination. Sinks write `statement` and never
/// re-format.
#[derive(Clone, Debug)]
pub struct Record<'a> {
    timestamp: Timestamp,
    thread_id: u64,
    thread_name: &'a str,
    process_id: u32,
    logger_name: &'a str,
    level: Level,
    named_args: &'a [(&'a str, &'a str)],
    message: &'a str,
    statement: &'a [u8],
}

impl<'a> Record<'a> {
    /// Returns a new builder.
    pub fn builder() -> RecordBuilder<'a> {
        RecordBuilder::default()
    }

    /// The wall-clock time the record was produced.
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// The id of the thread that produced the record.
    pub fn thread_id(&self) -> u64 {
        self.thread_id
    }

    /// The name of the thread that produced the record.
    pub fn thread_name(&self) -> &'a str {
        self.thread_name
    }

    /// The id of the producing process.
    pub fn process_id(&self) -> u32 {
        self.process_id
    }

    /// The name of the logger the record was issued through.
    pub fn logger_name(&self) -> &'a str {
        self.logger_name
    }

    /// The verbosity level of the record.
    pub fn level(&self) -> Level {
        self.level
    }

    /// The short name of the record's level.
    pub fn level_name(&self) -> &'static str {
        self.level.as_str()
    }

    /// The numeric code of the record's level.
    pub fn level_code(&self) -> u8 {
        self.level as u8
    }

    /// Structured key-value pairs captured at the call site, if any.
    pub fn named_args(&self) -> &'a [(&'a str, &'a str)] {
        self.named_args
    }

    /// The rendered user message.
    pub fn message(&self) -> &'a str {
        self.message
    }

    /// The full rendered statement as it should reach the destination.
    pub fn statement(&self) -> &'a [u8] {
        self.statement
    }
}

/// Builder for [`Record`].
#[derive(Debug)]
pub struct RecordBuilder<'a> {
    timestamp: Timestamp,
    thread_id: u64,
    thread_name: &'a str,
    process_id: u32,
    logger_name: &'a str,
    level: Level,
    named_args: &'a [(&'a str, &'a str)],
    message: &'a str,
    statement: Option<&'a [u8]>,
}

impl Default for RecordBuilder<'_> {
    fn default() -> Self {
        Self {
            timestamp: Timestamp::now(),
            thread_id: 0,
            thread_name: "",
            process_id: 0,
            logger_name: "",
            level: Level::Info,
            named_args: &[],
            message: "",
            statement: None,
        }
    }
}

impl<'a> RecordBuilder<'a> {
    /// Sets the record's wall-clock time.
    pub fn timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Sets the record's wall-clock time from nanoseconds since the epoch.
    pub fn timestamp_ns(mut self, nanos: i64) -> Self {
        self.timestamp = Timestamp::from_nanosecond(nanos as i128)
            .unwrap_or(Timestamp::UNIX_EPOCH);
        self
    }

    /// Sets the producing thread id.
    pub fn thread_id(mut self, thread_id: u64) -> Self {
        self.thread_id = thread_id;
        self
    }

    /// Sets the producing thread name.
    pub fn thread_name(mut self, thread_name: &'a str) -> Self {
        self.thread_name = thread_name;
        self
    }

    /// Sets the producing process id.
    pub fn process_id(mut self, process_id: u32) -> Self {
        self.process_id = process_id;
        self
    }

    /// Sets the logger name.
    pub fn logger_name(mut self, logger_name: &'a str) -> Self {
        self.logger_name = logger_name;
        self
    }

    /// Sets the verbosity level.
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Sets the structured key-value pairs.
    pub fn named_args(mut self, named_args: &'a [(&'a str, &'a str)]) -> Self {
        self.named_args = named_args;
        self
    }

    /// Sets the rendered user message.
    pub fn message(mut self, message: &'a str) -> Self {
        self.message = message;
        self
    }

    /// Sets the rendered statement bytes.
    ///
    /// Defaults to the message bytes when unset.
    pub fn statement(mut self, statement: &'a [u8]) -> Self {
        self.statement = Some(statement);
        self
    }

    /// Builds the [`Record`].
    pub fn build(self) -> Record<'a> {
        Record {
            timestamp: self.timestamp,
            thread_id: self.thread_id,
            thread_name: self.thread_name,
            process_id: self.process_id,
            logger_name: self.logger_name,
            level: self.level,
            named_args: self.named_args,
            message: self.message,
            statement: self.statement.unwrap_or(self.message.as_bytes()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_defaults_to_message() {
        let record = Record::builder().message("hello").build();
        assert_eq!(record.statement(), b"hello");
        assert_eq!(record.level(), Level::Info);
    }

    #[test]
    fn test_level_name_and_code() {
        let record = Record::builder().level(Level::Warn).build();
        assert_eq!(record.level_name(), "WARN");
        assert_eq!(record.level_code(), Level::Warn as u8);
    }
}
