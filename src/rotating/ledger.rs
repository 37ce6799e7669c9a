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

//! The rotation ledger: which generations of the log file exist on disk.
//!
//! Rotated filenames follow `<stem>[.<suffix>][.<index>]<ext>` where
//! `<suffix>` is a date or date-time string and `<index>` is a positive
//! integer omitted when zero. Filename computation and parsing are pure so
//! startup recovery is testable from synthetic name lists.

use std::collections::VecDeque;
use std::path::Path;
use std::path::PathBuf;

/// How rotated generations are named.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NamingScheme {
    /// `<stem>.<index><ext>`, indices incremented on every rotation.
    #[default]
    Index,
    /// `<stem>.<YYYYMMDD>[.<index>]<ext>`.
    Date,
    /// `<stem>.<YYYYMMDD_HHMMSS>[.<index>]<ext>`.
    DateTime,
}

impl NamingScheme {
    pub(crate) fn suffix_format(&self) -> Option<&'static str> {
        match self {
            NamingScheme::Index => None,
            NamingScheme::Date => Some("%Y%m%d"),
            NamingScheme::DateTime => Some("%Y%m%d_%H%M%S"),
        }
    }
}

/// One known generation of the rotating file.
///
/// Index 0 with no suffix denotes the live file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct FileInfo {
    pub(crate) suffix: Option<String>,
    pub(crate) index: u32,
}

impl FileInfo {
    pub(crate) fn live() -> FileInfo {
        FileInfo {
            suffix: None,
            index: 0,
        }
    }

    pub(crate) fn is_live(&self) -> bool {
        self.suffix.is_none() && self.index == 0
    }

    /// The on-disk path of this generation next to `base`.
    pub(crate) fn path(&self, base: &Path) -> PathBuf {
        let (stem, ext) = split_base(base);
        let mut name = stem;
        if let Some(suffix) = &self.suffix {
            name.push('.');
            name.push_str(suffix);
        }
        if self.index > 0 {
            name.push('.');
            name.push_str(&self.index.to_string());
        }
        name.push_str(&ext);
        base.with_file_name(name)
    }
}

fn split_base(base: &Path) -> (String, String) {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = base
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    (stem, ext)
}

fn is_valid_suffix(suffix: &str, scheme: NamingScheme) -> bool {
    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    match scheme {
        NamingScheme::Index => false,
        NamingScheme::Date => suffix.len() == 8 && all_digits(suffix),
        NamingScheme::DateTime => match suffix.split_once('_') {
            Some((date, time)) => {
                date.len() == 8 && all_digits(date) && time.len() == 6 && all_digits(time)
            }
            None => false,
        },
    }
}

/// Parses a directory entry name into a generation of `base`.
///
/// Returns `None` for names that do not belong to this log's generations;
/// recovery skips them rather than treating them as fatal.
pub(crate) fn parse_filename(base: &Path, name: &str, scheme: NamingScheme) -> Option<FileInfo> {
    let (stem, ext) = split_base(base);
    let rest = name.strip_prefix(stem.as_str())?;
    let rest = rest.strip_suffix(ext.as_str())?;
    if rest.is_empty() {
        return Some(FileInfo::live());
    }
    let rest = rest.strip_prefix('.')?;

    match scheme {
        NamingScheme::Index => {
            let index = rest.parse::<u32>().ok().filter(|index| *index > 0)?;
            Some(FileInfo {
                suffix: None,
                index,
            })
        }
        NamingScheme::Date | NamingScheme::DateTime => {
            let (suffix, index) = match rest.rsplit_once('.') {
                Some((suffix, index)) => {
                    (suffix, index.parse::<u32>().ok().filter(|index| *index > 0)?)
                }
                None => (rest, 0),
            };
            if !is_valid_suffix(suffix, scheme) {
                return None;
            }
            Some(FileInfo {
                suffix: Some(suffix.to_string()),
                index,
            })
        }
    }
}

/// The sink's memory of which generations exist on disk, newest first.
///
/// The front entry always denotes the live file and the back the oldest
/// generation; the rename walk depends on that order.
#[derive(Debug, Default)]
pub(crate) struct Ledger {
    entries: VecDeque<FileInfo>,
}

impl Ledger {
    pub(crate) fn new() -> Ledger {
        Ledger {
            entries: VecDeque::new(),
        }
    }

    /// Rebuilds a ledger from the names found in the log directory.
    ///
    /// Entries are sorted ascending by index, newest date first within an
    /// index, so the front is the live file and the back the oldest
    /// generation.
    pub(crate) fn recover(
        base: &Path,
        names: impl IntoIterator<Item = String>,
        scheme: NamingScheme,
    ) -> Ledger {
        let mut entries: Vec<FileInfo> = names
            .into_iter()
            .filter_map(|name| parse_filename(base, &name, scheme))
            .collect();
        entries.sort_by(|a, b| {
            a.index
                .cmp(&b.index)
                .then_with(|| match (&a.suffix, &b.suffix) {
                    (None, None) => std::cmp::Ordering::Equal,
                    (None, Some(_)) => std::cmp::Ordering::Less,
                    (Some(_), None) => std::cmp::Ordering::Greater,
                    (Some(a), Some(b)) => b.cmp(a),
                })
        });
        Ledger {
            entries: entries.into(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Rotated generations, excluding the live entry.
    pub(crate) fn backup_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| !entry.is_live())
            .count()
    }

    pub(crate) fn front_is_live(&self) -> bool {
        self.entries.front().is_some_and(FileInfo::is_live)
    }

    pub(crate) fn push_live(&mut self) {
        self.entries.push_front(FileInfo::live());
    }

    pub(crate) fn pop_oldest(&mut self) -> Option<FileInfo> {
        self.entries.pop_back()
    }

    /// Entries from the oldest generation to the newest.
    pub(crate) fn iter_mut_oldest_first(&mut self) -> impl Iterator<Item = &mut FileInfo> {
        self.entries.iter_mut().rev()
    }

    #[cfg(test)]
    pub(crate) fn indices(&self) -> Vec<u32> {
        self.entries.iter().map(|entry| entry.index).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> PathBuf {
        PathBuf::from("/var/log/app.log")
    }

    #[test]
    fn test_generation_paths() {
        let live = FileInfo::live();
        assert_eq!(live.path(&base()), PathBuf::from("/var/log/app.log"));

        let indexed = FileInfo {
            suffix: None,
            index: 3,
        };
        assert_eq!(indexed.path(&base()), PathBuf::from("/var/log/app.3.log"));

        let dated = FileInfo {
            suffix: Some("20240810".to_string()),
            index: 0,
        };
        assert_eq!(
            dated.path(&base()),
            PathBuf::from("/var/log/app.20240810.log")
        );

        let dated_indexed = FileInfo {
            suffix: Some("20240810".to_string()),
            index: 2,
        };
        assert_eq!(
            dated_indexed.path(&base()),
            PathBuf::from("/var/log/app.20240810.2.log")
        );
    }

    #[test]
    fn test_parse_skips_foreign_names() {
        let base = base();
        assert!(parse_filename(&base, "other.log", NamingScheme::Index).is_none());
        assert!(parse_filename(&base, "app.log.bak", NamingScheme::Index).is_none());
        assert!(parse_filename(&base, "app.notanumber.log", NamingScheme::Index).is_none());
        assert!(parse_filename(&base, "app.2024.log", NamingScheme::Date).is_none());
        assert!(parse_filename(&base, "app.0.log", NamingScheme::Index).is_none());
    }

    #[test]
    fn test_parse_round_trips_generated_names() {
        let base = base();
        for info in [
            FileInfo::live(),
            FileInfo {
                suffix: None,
                index: 7,
            },
            FileInfo {
                suffix: Some("20240810".to_string()),
                index: 0,
            },
        ] {
            let name = info.path(&base);
            let name = name.file_name().unwrap().to_str().unwrap();
            assert_eq!(
                parse_filename(&base, name, NamingScheme::Date).as_ref(),
                Some(&info),
                "failed to parse back {name}"
            );
        }
    }

    #[test]
    fn test_parse_date_time_suffix() {
        let base = base();
        let parsed = parse_filename(&base, "app.20240810_171252.log", NamingScheme::DateTime);
        assert_eq!(
            parsed,
            Some(FileInfo {
                suffix: Some("20240810_171252".to_string()),
                index: 0,
            })
        );
    }

    #[test]
    fn test_recover_sorts_ascending_by_index() {
        let names = ["app.2.log", "app.log", "app.1.log", "unrelated.txt"]
            .map(String::from);
        let ledger = Ledger::recover(&base(), names, NamingScheme::Index);

        assert_eq!(ledger.indices(), vec![0, 1, 2]);
        assert!(ledger.front_is_live());
        assert_eq!(ledger.backup_count(), 2);
    }

    #[test]
    fn test_recover_orders_same_index_dates_newest_first() {
        let names = [
            "app.20240809.log",
            "app.20240810.log",
            "app.20240810.1.log",
            "app.log",
        ]
        .map(String::from);
        let ledger = Ledger::recover(&base(), names, NamingScheme::Date);

        let order: Vec<_> = {
            let mut ledger = ledger;
            ledger
                .iter_mut_oldest_first()
                .map(|entry| entry.path(Path::new("app.log")))
                .collect()
        };
        assert_eq!(
            order,
            vec![
                PathBuf::from("app.20240810.1.log"),
                PathBuf::from("app.20240809.log"),
                PathBuf::from("app.20240810.log"),
                PathBuf::from("app.log"),
            ]
        );
    }
}
