//! Row normalization - turns raw CSV rows into transaction candidates
//!
//! Checks run in a fixed order: direction, then date, then amount. The
//! first failing check decides the skip reason.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::config::{ColumnMappings, DirectionMarkers, ImportProfile, NumberFormat, PartyColumns};
use crate::domain::result::{Error, Result};
use crate::domain::{schema, Direction, DirectionFilter, NewTransaction};

/// A CSV row keyed by header name
pub type RawRow = HashMap<String, String>;

/// Why a row was dropped before reaching the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    BadDate,
    BadAmount,
    FilteredDirection,
    /// The CSV reader could not decode the row at all
    MalformedRow,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::BadDate => "bad_date",
            SkipReason::BadAmount => "bad_amount",
            SkipReason::FilteredDirection => "filtered_direction",
            SkipReason::MalformedRow => "malformed_row",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of normalizing one row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    Candidate(NewTransaction),
    Skip(SkipReason),
}

/// Maps raw rows to candidates according to an import profile
#[derive(Debug, Clone)]
pub struct RecordNormalizer {
    mappings: ColumnMappings,
    date_format: String,
    number_format: NumberFormat,
    filter: DirectionFilter,
    markers: DirectionMarkers,
}

impl RecordNormalizer {
    pub fn new(profile: &ImportProfile) -> Self {
        Self {
            mappings: profile.column_mappings.clone(),
            date_format: profile.date_format.clone(),
            number_format: profile.number_format,
            filter: profile.direction,
            markers: profile.direction_markers.clone(),
        }
    }

    pub fn normalize(&self, row: &RawRow) -> Normalized {
        // An unrecognized marker counts as filtered, whatever the filter says
        let direction = match self.markers.classify(field(row, &self.mappings.direction)) {
            Some(direction) if self.filter.admits(direction) => direction,
            _ => return Normalized::Skip(SkipReason::FilteredDirection),
        };

        let date = match parse_date(field(row, &self.mappings.date), &self.date_format) {
            Ok(date) => date,
            Err(_) => return Normalized::Skip(SkipReason::BadDate),
        };

        let amount = match parse_amount(field(row, &self.mappings.amount), self.number_format) {
            Ok(amount) => amount,
            Err(_) => return Normalized::Skip(SkipReason::BadAmount),
        };

        let currency = self
            .mappings
            .currency
            .as_deref()
            .map(|column| field(row, column))
            .filter(|value| !value.is_empty())
            .map(str::to_string);

        let (sender, receiver) = self.parties(row, direction);

        Normalized::Candidate(NewTransaction {
            date,
            description: field(row, &self.mappings.description).to_string(),
            amount: Some(amount),
            currency,
            sender: sender.to_string(),
            receiver: receiver.to_string(),
        })
    }

    fn parties<'a>(&self, row: &'a RawRow, direction: Direction) -> (&'a str, &'a str) {
        match &self.mappings.parties {
            PartyColumns::Explicit { sender, receiver } => (field(row, sender), field(row, receiver)),
            PartyColumns::Counterparty {
                account,
                counterparty,
            } => {
                let account = field(row, account);
                let counterparty = field(row, counterparty);
                match direction {
                    Direction::Debit => (account, counterparty),
                    Direction::Credit => (counterparty, account),
                }
            }
        }
    }
}

/// Trimmed cell value; absent columns read as empty
fn field<'a>(row: &'a RawRow, column: &str) -> &'a str {
    row.get(column).map(|v| v.trim()).unwrap_or("")
}

/// Parse a date cell with a chrono format string such as `%d.%m.%Y`
pub fn parse_date(value: &str, format: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), format).map_err(|_| Error::parse("date", value))
}

fn amount_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let pattern = format!(
            r"^[+-]?\d{{1,{}}}(\.\d{{1,{}}})?$",
            schema::AMOUNT_INTEGER_DIGITS,
            schema::AMOUNT_SCALE
        );
        Regex::new(&pattern).expect("amount pattern is a valid regex")
    })
}

/// Shape of an amount written in `format`, spaces already removed
///
/// A group separator must be followed by exactly three digits, so a bare
/// `12.50` under `Eu` is not mistaken for twelve hundred fifty.
fn notation_pattern(format: NumberFormat) -> &'static Regex {
    static US: OnceLock<Regex> = OnceLock::new();
    static EU: OnceLock<Regex> = OnceLock::new();
    static EU_SPACE: OnceLock<Regex> = OnceLock::new();

    let (cell, pattern) = match format {
        NumberFormat::Us => (&US, r"^[+-]?(\d{1,3}(,\d{3})+|\d+)(\.\d+)?$"),
        NumberFormat::Eu => (&EU, r"^[+-]?(\d{1,3}(\.\d{3})+|\d+)(,\d+)?$"),
        NumberFormat::EuSpace => (&EU_SPACE, r"^[+-]?\d+(,\d+)?$"),
    };
    cell.get_or_init(|| Regex::new(pattern).expect("notation pattern is a valid regex"))
}

/// Parse an amount cell into a positive magnitude with two decimals
///
/// Whitespace (including non-breaking spaces) is ignored, a leading sign or
/// surrounding parentheses are accepted and dropped. Values that would not
/// fit `DECIMAL(10, 2)` are rejected rather than rounded.
pub fn parse_amount(value: &str, format: NumberFormat) -> Result<Decimal> {
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();

    let unwrapped = compact
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or(&compact);

    if !notation_pattern(format).is_match(unwrapped) {
        return Err(Error::parse("amount", value));
    }

    let canonical = match format {
        NumberFormat::Us => unwrapped.replace(',', ""),
        NumberFormat::Eu => unwrapped.replace('.', "").replace(',', "."),
        NumberFormat::EuSpace => unwrapped.replace(',', "."),
    };

    if !amount_pattern().is_match(&canonical) {
        return Err(Error::parse("amount", value));
    }

    let mut amount = Decimal::from_str(&canonical)
        .map_err(|_| Error::parse("amount", value))?
        .abs();
    amount.rescale(schema::AMOUNT_SCALE);
    Ok(amount)
}
