//! The holiday catalog and the calendar entries derived from it.

use std::path::Path;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::{HolidirError, HolidirResult};

/// Category tag written on every entry this tool creates, and the only
/// marker used to find entries again for removal.
pub const DEFAULT_CATEGORY: &str = "Holiday";

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Holiday {
    pub name: String,
    pub date: NaiveDate,
}

impl Holiday {
    pub fn new(name: impl Into<String>, date: NaiveDate) -> Self {
        Holiday {
            name: name.into(),
            date,
        }
    }

    /// The all-day calendar entry this holiday becomes in every mailbox.
    pub fn draft(&self, category: &str) -> AppointmentDraft {
        let start = self.date.and_time(NaiveTime::MIN);
        let end = start + Duration::days(1);

        AppointmentDraft {
            subject: self.name.clone(),
            start,
            end,
            all_day: true,
            category: category.to_string(),
            reminder: false,
        }
    }
}

/// A calendar entry ready to hand to the calendar service.
///
/// `start` and `end` are local wall-clock times: all-day entries land on
/// the mailbox owner's local midnight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentDraft {
    pub subject: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub all_day: bool,
    pub category: String,
    pub reminder: bool,
}

/// Ordered list of holidays, loaded once per run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HolidayCatalog {
    holidays: Vec<Holiday>,
}

impl HolidayCatalog {
    pub fn new(holidays: Vec<Holiday>) -> Self {
        HolidayCatalog { holidays }
    }

    /// Load a catalog from a `name;date` file.
    pub fn load(path: &Path) -> HolidirResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            HolidirError::Catalog(format!("Could not read {}: {e}", path.display()))
        })?;

        Self::parse(&contents)
    }

    /// Parse `name;date` lines. Blank lines are skipped; there is no header.
    pub fn parse(contents: &str) -> HolidirResult<Self> {
        let mut holidays = Vec::new();

        for (index, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let line_no = index + 1;
            let (name, date) = line.split_once(';').ok_or_else(|| {
                HolidirError::Catalog(format!("line {line_no}: expected 'name;date', got '{line}'"))
            })?;

            let name = name.trim();
            if name.is_empty() {
                return Err(HolidirError::Catalog(format!("line {line_no}: empty holiday name")));
            }

            let date = parse_date(date.trim()).ok_or_else(|| {
                HolidirError::Catalog(format!(
                    "line {line_no}: invalid date '{}' (expected YYYY-MM-DD or M/D/YYYY)",
                    date.trim()
                ))
            })?;

            holidays.push(Holiday::new(name, date));
        }

        Ok(HolidayCatalog { holidays })
    }

    pub fn holidays(&self) -> &[Holiday] {
        &self.holidays
    }

    pub fn len(&self) -> usize {
        self.holidays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holidays.is_empty()
    }

    /// Drafts for every holiday, in catalog order. Identical for every mailbox.
    pub fn drafts(&self, category: &str) -> Vec<AppointmentDraft> {
        self.holidays.iter().map(|h| h.draft(category)).collect()
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_skips_blank_lines_and_trims() {
        let catalog = HolidayCatalog::parse("New Year;2024-01-01\n\n   \n Independence Day ; 7/4/2024 \n").unwrap();

        assert_eq!(
            catalog.holidays(),
            &[
                Holiday::new("New Year", date(2024, 1, 1)),
                Holiday::new("Independence Day", date(2024, 7, 4)),
            ]
        );
    }

    #[test]
    fn test_parse_has_no_header_row() {
        let catalog = HolidayCatalog::parse("Labor Day;2024-09-02").unwrap();
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_parse_reports_line_number_of_bad_date() {
        let err = HolidayCatalog::parse("New Year;2024-01-01\nBroken;2024-13-45\n").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("line 2"), "unexpected message: {msg}");
        assert!(msg.contains("2024-13-45"), "unexpected message: {msg}");
    }

    #[test]
    fn test_parse_rejects_line_without_delimiter() {
        let err = HolidayCatalog::parse("New Year 2024-01-01").unwrap_err();
        assert!(matches!(err, HolidirError::Catalog(_)));
    }

    #[test]
    fn test_draft_is_all_day_without_reminder() {
        let draft = Holiday::new("New Year", date(2024, 1, 1)).draft(DEFAULT_CATEGORY);

        assert_eq!(draft.subject, "New Year");
        assert_eq!(draft.start, date(2024, 1, 1).and_hms_opt(0, 0, 0).unwrap());
        assert_eq!(draft.end - draft.start, Duration::days(1));
        assert!(draft.all_day);
        assert!(!draft.reminder);
        assert_eq!(draft.category, "Holiday");
    }

    #[test]
    fn test_drafts_follow_catalog_order() {
        let catalog = HolidayCatalog::new(vec![
            Holiday::new("New Year", date(2024, 1, 1)),
            Holiday::new("Independence Day", date(2024, 7, 4)),
        ]);

        let subjects: Vec<_> = catalog
            .drafts(DEFAULT_CATEGORY)
            .into_iter()
            .map(|d| d.subject)
            .collect();
        assert_eq!(subjects, vec!["New Year", "Independence Day"]);
    }

    #[test]
    fn test_load_missing_file_is_catalog_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = HolidayCatalog::load(&dir.path().join("holidays.txt")).unwrap_err();
        assert!(matches!(err, HolidirError::Catalog(_)));
    }
}
