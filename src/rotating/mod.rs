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

//! File rotation: size and time triggers, generational renames, and startup
//! recovery of previously rotated files.

mod clock;
mod ledger;
mod rolling;
mod rotation;

pub use ledger::NamingScheme;
pub use rolling::MIN_ROTATION_SIZE;
pub use rolling::RotatingFileSink;
pub use rolling::RotatingFileSinkConfig;
pub use rolling::RotatingFileSinkConfigBuilder;
pub use rotation::RotationFrequency;
