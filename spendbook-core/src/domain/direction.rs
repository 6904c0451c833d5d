//! Debit/credit direction of a statement row

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which way money moved, from the account holder's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Money left the account
    Debit,
    /// Money entered the account
    Credit,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Debit => write!(f, "debit"),
            Direction::Credit => write!(f, "credit"),
        }
    }
}

/// Which directions an import keeps
///
/// Spending reports only make sense over debits, so that is the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DirectionFilter {
    #[default]
    DebitOnly,
    CreditOnly,
    All,
}

impl DirectionFilter {
    pub fn admits(&self, direction: Direction) -> bool {
        match self {
            DirectionFilter::DebitOnly => direction == Direction::Debit,
            DirectionFilter::CreditOnly => direction == Direction::Credit,
            DirectionFilter::All => true,
        }
    }
}

impl FromStr for DirectionFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "debit" | "debit-only" | "debits" => Ok(DirectionFilter::DebitOnly),
            "credit" | "credit-only" | "credits" => Ok(DirectionFilter::CreditOnly),
            "all" | "both" => Ok(DirectionFilter::All),
            other => Err(format!(
                "unknown direction filter '{}' (expected debit, credit or all)",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_keeps_only_debits() {
        let filter = DirectionFilter::default();
        assert!(filter.admits(Direction::Debit));
        assert!(!filter.admits(Direction::Credit));
    }

    #[test]
    fn test_all_filter_keeps_both() {
        assert!(DirectionFilter::All.admits(Direction::Debit));
        assert!(DirectionFilter::All.admits(Direction::Credit));
    }

    #[test]
    fn test_parse_filter() {
        assert_eq!("debit".parse::<DirectionFilter>(), Ok(DirectionFilter::DebitOnly));
        assert_eq!("Credit-Only".parse::<DirectionFilter>(), Ok(DirectionFilter::CreditOnly));
        assert_eq!("all".parse::<DirectionFilter>(), Ok(DirectionFilter::All));
        assert!("sideways".parse::<DirectionFilter>().is_err());
    }

    #[test]
    fn test_filter_serializes_kebab_case() {
        let json = serde_json::to_string(&DirectionFilter::DebitOnly).unwrap();
        assert_eq!(json, "\"debit-only\"");
    }
}
