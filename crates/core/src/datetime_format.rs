//! Datetime-format tokens and the contiguous-prefix validator
//!
//! A datetime format is a sequence of tokens. Projected onto the
//! hierarchy Year → Month → Day → Hour → Minute → Second → Millisecond,
//! the set of categories a format mentions must be a prefix of either the
//! full chain or the time-only chain {Hour, Minute, Second, Millisecond}.
//! A format that prints years and hours but no month or day would be
//! ambiguous to every backend that has to agree on it, so it is rejected
//! with the first missing category named. Weekday, AM/PM and literal
//! tokens are invisible to the invariant.

use crate::error::{Error, ErrorKind, Result};
use std::fmt;

/// The closed token alphabet for datetime formats.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DateTimeFormatToken {
    /// Four-digit year, zero padded.
    Year4,
    /// Two-digit year of century.
    Year2,
    /// Month number, no padding.
    Month1,
    /// Month number, zero padded to two digits.
    Month2,
    MonthNameShort,
    MonthNameFull,
    Day1,
    Day2,
    WeekdayNameMin,
    WeekdayNameShort,
    WeekdayNameFull,
    Hour24_1,
    Hour24_2,
    Hour12_1,
    Hour12_2,
    Minute1,
    Minute2,
    Second1,
    Second2,
    Millisecond3,
    AmPmUpper,
    AmPmLower,
    /// Verbatim text between fields.
    Literal(String),
}

/// The categories the contiguous-prefix invariant is stated over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DateCategory {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Millisecond,
}

impl fmt::Display for DateCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DateCategory::Year => "Year",
            DateCategory::Month => "Month",
            DateCategory::Day => "Day",
            DateCategory::Hour => "Hour",
            DateCategory::Minute => "Minute",
            DateCategory::Second => "Second",
            DateCategory::Millisecond => "Millisecond",
        };
        f.write_str(name)
    }
}

const FULL_CHAIN: [DateCategory; 7] = [
    DateCategory::Year,
    DateCategory::Month,
    DateCategory::Day,
    DateCategory::Hour,
    DateCategory::Minute,
    DateCategory::Second,
    DateCategory::Millisecond,
];

const TIME_CHAIN: [DateCategory; 4] = [
    DateCategory::Hour,
    DateCategory::Minute,
    DateCategory::Second,
    DateCategory::Millisecond,
];

impl DateTimeFormatToken {
    /// The category a token contributes to the invariant, or `None` for
    /// tokens the invariant ignores. The match is exhaustive over the
    /// alphabet: adding a token forces a decision here.
    pub fn category(&self) -> Option<DateCategory> {
        match self {
            DateTimeFormatToken::Year4 | DateTimeFormatToken::Year2 => Some(DateCategory::Year),
            DateTimeFormatToken::Month1
            | DateTimeFormatToken::Month2
            | DateTimeFormatToken::MonthNameShort
            | DateTimeFormatToken::MonthNameFull => Some(DateCategory::Month),
            DateTimeFormatToken::Day1 | DateTimeFormatToken::Day2 => Some(DateCategory::Day),
            DateTimeFormatToken::Hour24_1
            | DateTimeFormatToken::Hour24_2
            | DateTimeFormatToken::Hour12_1
            | DateTimeFormatToken::Hour12_2 => Some(DateCategory::Hour),
            DateTimeFormatToken::Minute1 | DateTimeFormatToken::Minute2 => {
                Some(DateCategory::Minute)
            }
            DateTimeFormatToken::Second1 | DateTimeFormatToken::Second2 => {
                Some(DateCategory::Second)
            }
            DateTimeFormatToken::Millisecond3 => Some(DateCategory::Millisecond),
            DateTimeFormatToken::WeekdayNameMin
            | DateTimeFormatToken::WeekdayNameShort
            | DateTimeFormatToken::WeekdayNameFull
            | DateTimeFormatToken::AmPmUpper
            | DateTimeFormatToken::AmPmLower
            | DateTimeFormatToken::Literal(_) => None,
        }
    }

    /// Stable token name, as spelled in tooling.
    pub fn name(&self) -> &'static str {
        match self {
            DateTimeFormatToken::Year4 => "year4",
            DateTimeFormatToken::Year2 => "year2",
            DateTimeFormatToken::Month1 => "month1",
            DateTimeFormatToken::Month2 => "month2",
            DateTimeFormatToken::MonthNameShort => "monthNameShort",
            DateTimeFormatToken::MonthNameFull => "monthNameFull",
            DateTimeFormatToken::Day1 => "day1",
            DateTimeFormatToken::Day2 => "day2",
            DateTimeFormatToken::WeekdayNameMin => "weekdayNameMin",
            DateTimeFormatToken::WeekdayNameShort => "weekdayNameShort",
            DateTimeFormatToken::WeekdayNameFull => "weekdayNameFull",
            DateTimeFormatToken::Hour24_1 => "hour24_1",
            DateTimeFormatToken::Hour24_2 => "hour24_2",
            DateTimeFormatToken::Hour12_1 => "hour12_1",
            DateTimeFormatToken::Hour12_2 => "hour12_2",
            DateTimeFormatToken::Minute1 => "minute1",
            DateTimeFormatToken::Minute2 => "minute2",
            DateTimeFormatToken::Second1 => "second1",
            DateTimeFormatToken::Second2 => "second2",
            DateTimeFormatToken::Millisecond3 => "millisecond3",
            DateTimeFormatToken::AmPmUpper => "ampmUpper",
            DateTimeFormatToken::AmPmLower => "ampmLower",
            DateTimeFormatToken::Literal(_) => "literal",
        }
    }

    /// Resolve a token by its tooling name. Unknown names are an error;
    /// `literal` takes its verbatim text.
    pub fn from_name(name: &str, literal: Option<&str>) -> Result<DateTimeFormatToken> {
        Ok(match name {
            "year4" => DateTimeFormatToken::Year4,
            "year2" => DateTimeFormatToken::Year2,
            "month1" => DateTimeFormatToken::Month1,
            "month2" => DateTimeFormatToken::Month2,
            "monthNameShort" => DateTimeFormatToken::MonthNameShort,
            "monthNameFull" => DateTimeFormatToken::MonthNameFull,
            "day1" => DateTimeFormatToken::Day1,
            "day2" => DateTimeFormatToken::Day2,
            "weekdayNameMin" => DateTimeFormatToken::WeekdayNameMin,
            "weekdayNameShort" => DateTimeFormatToken::WeekdayNameShort,
            "weekdayNameFull" => DateTimeFormatToken::WeekdayNameFull,
            "hour24_1" => DateTimeFormatToken::Hour24_1,
            "hour24_2" => DateTimeFormatToken::Hour24_2,
            "hour12_1" => DateTimeFormatToken::Hour12_1,
            "hour12_2" => DateTimeFormatToken::Hour12_2,
            "minute1" => DateTimeFormatToken::Minute1,
            "minute2" => DateTimeFormatToken::Minute2,
            "second1" => DateTimeFormatToken::Second1,
            "second2" => DateTimeFormatToken::Second2,
            "millisecond3" => DateTimeFormatToken::Millisecond3,
            "ampmUpper" => DateTimeFormatToken::AmPmUpper,
            "ampmLower" => DateTimeFormatToken::AmPmLower,
            "literal" => DateTimeFormatToken::Literal(literal.unwrap_or("").to_string()),
            other => {
                return Err(Error::new(
                    ErrorKind::InvalidFormat,
                    format!("unknown datetime format token '{}'", other),
                ));
            }
        })
    }
}

/// Check the contiguous-prefix invariant over a token sequence.
///
/// Accepts iff the present-category set is a prefix of the full chain or
/// of the time-only chain. All-literal formats are trivially valid.
pub fn validate_format(tokens: &[DateTimeFormatToken]) -> Result<()> {
    let mut present = [false; 7];
    for token in tokens {
        if let Some(category) = token.category() {
            present[category as usize] = true;
        }
    }
    if present.iter().all(|p| !p) {
        return Ok(());
    }

    // Anything from the date side forces the full chain; otherwise the
    // time-only chain applies.
    let date_side = present[DateCategory::Year as usize]
        || present[DateCategory::Month as usize]
        || present[DateCategory::Day as usize];
    let chain: &[DateCategory] = if date_side { &FULL_CHAIN } else { &TIME_CHAIN };

    let last = chain
        .iter()
        .rposition(|c| present[*c as usize])
        .expect("present set is non-empty");
    for category in &chain[..last] {
        if !present[*category as usize] {
            return Err(Error::new(
                ErrorKind::InvalidFormat,
                format!("datetime format is missing {}", category),
            ));
        }
    }
    Ok(())
}
