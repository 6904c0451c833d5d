//! Monthly spending aggregates

use std::fmt;

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};

/// A calendar month, ordered chronologically
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    /// Returns `None` unless `month` is in `1..=12`
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Sum of stored amounts for one month
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlyTotal {
    pub month: YearMonth,
    pub total: Decimal,
}

/// Pick the month with the largest total. Ties go to the earliest month.
pub fn max_spending_month(series: &[MonthlyTotal]) -> Option<MonthlyTotal> {
    series
        .iter()
        .fold(None::<&MonthlyTotal>, |best, candidate| match best {
            Some(current)
                if current.total > candidate.total
                    || (current.total == candidate.total && current.month <= candidate.month) =>
            {
                Some(current)
            }
            _ => Some(candidate),
        })
        .cloned()
}

/// Monthly series plus its maximum, as shown by the report command
#[derive(Debug, Clone, Serialize)]
pub struct SpendingReport {
    /// One entry per month that has at least one transaction, ascending
    pub months: Vec<MonthlyTotal>,
    pub max_month: Option<MonthlyTotal>,
    pub total: Decimal,
}

impl SpendingReport {
    pub fn from_series(mut months: Vec<MonthlyTotal>) -> Self {
        months.sort_by_key(|m| m.month);
        let max_month = max_spending_month(&months);
        let total = months.iter().map(|m| m.total).sum();
        Self {
            months,
            max_month,
            total,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.months.is_empty()
    }
}
