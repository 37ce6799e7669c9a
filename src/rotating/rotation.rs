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

//! Time-based rotation triggers.

use anyhow::Context;
use jiff::SignedDuration;
use jiff::Timestamp;
use jiff::Zoned;
use jiff::civil::Time;

use crate::error::ConfigError;

/// When a time-based rotation fires.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RotationFrequency {
    /// Time-based rotation disabled.
    #[default]
    Disabled,
    /// Every `interval` minutes, aligned to minute boundaries.
    Minutely {
        /// Minutes between rotations, at least 1.
        interval: u32,
    },
    /// Every `interval` hours, aligned to hour boundaries.
    Hourly {
        /// Hours between rotations, at least 1.
        interval: u32,
    },
    /// Once a day at `hour`:`minute` in the sink's timezone.
    Daily {
        /// Hour of day, 0..=23.
        hour: u8,
        /// Minute of hour, 0..=59.
        minute: u8,
    },
}

impl RotationFrequency {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            RotationFrequency::Disabled => Ok(()),
            RotationFrequency::Minutely { interval } | RotationFrequency::Hourly { interval } => {
                if interval == 0 {
                    Err(ConfigError::InvalidRotationInterval)
                } else {
                    Ok(())
                }
            }
            RotationFrequency::Daily { hour, minute } => {
                if hour > 23 || minute > 59 {
                    Err(ConfigError::InvalidDailyTime { hour, minute })
                } else {
                    Ok(())
                }
            }
        }
    }

    /// The absolute timestamp of the first rotation at or after `now`.
    ///
    /// Minutely and hourly rotations are aligned to the enclosing boundary,
    /// then advanced by the configured interval. Daily rotations fire at the
    /// configured time of day in `now`'s timezone, today or tomorrow if the
    /// time has already passed.
    pub(crate) fn first_rotation(&self, now: &Zoned) -> anyhow::Result<Option<Timestamp>> {
        let next = match *self {
            RotationFrequency::Disabled => return Ok(None),
            RotationFrequency::Minutely { interval } => {
                let floor = now
                    .with()
                    .second(0)
                    .subsec_nanosecond(0)
                    .build()
                    .context("failed to truncate to the minute boundary")?;
                floor.timestamp() + SignedDuration::from_mins(i64::from(interval))
            }
            RotationFrequency::Hourly { interval } => {
                let floor = now
                    .with()
                    .minute(0)
                    .second(0)
                    .subsec_nanosecond(0)
                    .build()
                    .context("failed to truncate to the hour boundary")?;
                floor.timestamp() + SignedDuration::from_hours(i64::from(interval))
            }
            RotationFrequency::Daily { hour, minute } => {
                let at = Time::new(i8::try_from(hour)?, i8::try_from(minute)?, 0, 0)
                    .context("invalid daily rotation time")?;
                let today = now
                    .with()
                    .time(at)
                    .build()
                    .context("failed to compute the daily rotation time")?;
                if today.timestamp() > now.timestamp() {
                    today.timestamp()
                } else {
                    today
                        .tomorrow()
                        .context("failed to compute tomorrow's rotation time")?
                        .timestamp()
                }
            }
        };
        Ok(Some(next))
    }

    /// The rotation after a trigger at `previous`.
    ///
    /// Advances by exactly one interval from the previous trigger time, not
    /// from the current time, so consecutive triggers never drift.
    pub(crate) fn next_rotation(&self, previous: Timestamp) -> Option<Timestamp> {
        let step = match *self {
            RotationFrequency::Disabled => return None,
            RotationFrequency::Minutely { interval } => {
                SignedDuration::from_mins(i64::from(interval))
            }
            RotationFrequency::Hourly { interval } => {
                SignedDuration::from_hours(i64::from(interval))
            }
            RotationFrequency::Daily { .. } => SignedDuration::from_hours(24),
        };
        Some(previous + step)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn zoned(s: &str) -> Zoned {
        Zoned::from_str(s).unwrap()
    }

    fn ts(s: &str) -> Timestamp {
        Timestamp::from_str(s).unwrap()
    }

    #[test]
    fn test_first_rotation_boundaries() {
        let now = zoned("2024-08-10T17:12:52[UTC]");

        assert_eq!(
            RotationFrequency::Minutely { interval: 1 }
                .first_rotation(&now)
                .unwrap(),
            Some(ts("2024-08-10T17:13:00Z"))
        );
        assert_eq!(
            RotationFrequency::Hourly { interval: 1 }
                .first_rotation(&now)
                .unwrap(),
            Some(ts("2024-08-10T18:00:00Z"))
        );
        assert_eq!(
            RotationFrequency::Disabled.first_rotation(&now).unwrap(),
            None
        );
    }

    #[test]
    fn test_first_rotation_with_larger_intervals() {
        let now = zoned("2024-08-10T17:12:52[UTC]");

        assert_eq!(
            RotationFrequency::Minutely { interval: 5 }
                .first_rotation(&now)
                .unwrap(),
            Some(ts("2024-08-10T17:17:00Z"))
        );
        assert_eq!(
            RotationFrequency::Hourly { interval: 6 }
                .first_rotation(&now)
                .unwrap(),
            Some(ts("2024-08-10T23:00:00Z"))
        );
    }

    #[test]
    fn test_daily_rotation_today_or_tomorrow() {
        let morning = zoned("2024-08-10T08:00:00[UTC]");
        let evening = zoned("2024-08-10T22:00:00[UTC]");
        let daily = RotationFrequency::Daily { hour: 9, minute: 30 };

        assert_eq!(
            daily.first_rotation(&morning).unwrap(),
            Some(ts("2024-08-10T09:30:00Z"))
        );
        assert_eq!(
            daily.first_rotation(&evening).unwrap(),
            Some(ts("2024-08-11T09:30:00Z"))
        );
    }

    #[test]
    fn test_next_rotation_never_drifts() {
        let now = zoned("2024-08-10T00:00:29[UTC]");
        let frequency = RotationFrequency::Minutely { interval: 3 };

        let mut at = frequency.first_rotation(&now).unwrap().unwrap();
        for step in 1..=100 {
            at = frequency.next_rotation(at).unwrap();
            let expected = ts("2024-08-10T00:03:00Z")
                + SignedDuration::from_mins(3 * step);
            assert_eq!(at, expected);
        }
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(matches!(
            RotationFrequency::Minutely { interval: 0 }.validate(),
            Err(ConfigError::InvalidRotationInterval)
        ));
        assert!(matches!(
            RotationFrequency::Daily { hour: 24, minute: 0 }.validate(),
            Err(ConfigError::InvalidDailyTime { .. })
        ));
        assert!(RotationFrequency::Daily { hour: 23, minute: 59 }.validate().is_ok());
    }
}
