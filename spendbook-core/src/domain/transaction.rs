//! Transaction domain model

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::result::{Error, Result};

/// Declared schema of the transaction table.
///
/// The storage adapter checks the live table against these lists, and the
/// migration that creates the table spells out the same constraints.
pub mod schema {
    pub const TABLE: &str = "bank_transactions";

    /// Every column the store reads or writes
    pub const COLUMNS: &[&str] = &[
        "id",
        "date",
        "description",
        "amount",
        "currency",
        "sender",
        "receiver",
    ];

    /// Natural key, enforced by a UNIQUE constraint in the database
    pub const NATURAL_KEY: &[&str] = &[
        "date",
        "sender",
        "receiver",
        "description",
        "amount",
        "currency",
    ];

    /// Fields a candidate must carry before it can be inserted
    pub const REQUIRED_FIELDS: &[&str] = &["description", "amount", "sender", "receiver"];

    pub const DEFAULT_CURRENCY: &str = "EUR";

    /// Fractional digits of the stored amount (DECIMAL(10, 2))
    pub const AMOUNT_SCALE: u32 = 2;

    /// Integer digits that fit the stored amount
    pub const AMOUNT_INTEGER_DIGITS: usize = 8;
}

/// A persisted transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Surrogate key assigned by the store
    pub id: i64,
    pub date: NaiveDate,
    pub description: String,
    /// Positive magnitude; direction is not stored
    pub amount: Decimal,
    pub currency: String,
    pub sender: String,
    pub receiver: String,
}

/// A transaction candidate produced by ingestion, not yet persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewTransaction {
    pub date: NaiveDate,
    pub description: String,
    pub amount: Option<Decimal>,
    /// Falls back to [`schema::DEFAULT_CURRENCY`] when absent or empty
    pub currency: Option<String>,
    pub sender: String,
    pub receiver: String,
}

impl NewTransaction {
    /// Check required fields and produce the natural key to insert.
    ///
    /// Every missing or unusable field is reported, in the order of
    /// [`schema::REQUIRED_FIELDS`]. An amount that `DECIMAL(10, 2)` cannot
    /// hold exactly counts as unusable; it is never rounded.
    pub fn validate(&self) -> Result<NaturalKey> {
        let invalid: Vec<&'static str> = schema::REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|field| self.is_invalid(field))
            .collect();

        let amount = match self.amount {
            Some(amount) if invalid.is_empty() => amount,
            _ => return Err(Error::Validation { fields: invalid }),
        };

        let currency = self
            .currency
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(schema::DEFAULT_CURRENCY);

        let mut amount = amount.abs();
        amount.rescale(schema::AMOUNT_SCALE);

        Ok(NaturalKey {
            date: self.date,
            sender: self.sender.trim().to_string(),
            receiver: self.receiver.trim().to_string(),
            description: self.description.trim().to_string(),
            amount,
            currency: currency.to_string(),
        })
    }

    fn is_invalid(&self, field: &str) -> bool {
        match field {
            "description" => self.description.trim().is_empty(),
            "amount" => !self.amount.is_some_and(fits_amount_column),
            "sender" => self.sender.trim().is_empty(),
            "receiver" => self.receiver.trim().is_empty(),
            _ => false,
        }
    }
}

/// Whether `amount` is stored without rounding or overflow
fn fits_amount_column(amount: Decimal) -> bool {
    let limit = Decimal::from(10u64.pow(schema::AMOUNT_INTEGER_DIGITS as u32));
    amount.normalize().scale() <= schema::AMOUNT_SCALE && amount.abs() < limit
}

/// The identity of a transaction: `(date, sender, receiver, description, amount, currency)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct NaturalKey {
    pub date: NaiveDate,
    pub sender: String,
    pub receiver: String,
    pub description: String,
    pub amount: Decimal,
    pub currency: String,
}

/// Result of inserting a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "id", rename_all = "snake_case")]
pub enum InsertOutcome {
    /// A new row was stored under this surrogate id
    Created(i64),
    /// A row with the same natural key is already stored
    AlreadyExists,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn candidate() -> NewTransaction {
        NewTransaction {
            date: NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
            description: "Groceries".to_string(),
            amount: Some(Decimal::from_str("12.5").unwrap()),
            currency: None,
            sender: "EE001".to_string(),
            receiver: "Rimi".to_string(),
        }
    }

    #[test]
    fn test_validate_defaults_currency() {
        let key = candidate().validate().unwrap();
        assert_eq!(key.currency, "EUR");

        let mut blank = candidate();
        blank.currency = Some("  ".to_string());
        assert_eq!(blank.validate().unwrap().currency, "EUR");

        let mut usd = candidate();
        usd.currency = Some("USD".to_string());
        assert_eq!(usd.validate().unwrap().currency, "USD");
    }

    #[test]
    fn test_validate_names_empty_sender() {
        let mut tx = candidate();
        tx.sender = "   ".to_string();

        match tx.validate() {
            Err(Error::Validation { fields }) => assert_eq!(fields, vec!["sender"]),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_reports_every_missing_field_in_order() {
        let mut tx = candidate();
        tx.receiver = String::new();
        tx.description = String::new();
        tx.amount = None;

        match tx.validate() {
            Err(Error::Validation { fields }) => {
                assert_eq!(fields, vec!["description", "amount", "receiver"])
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_stores_magnitude_with_two_decimals() {
        let mut tx = candidate();
        tx.amount = Some(Decimal::from_str("-7.1").unwrap());

        let key = tx.validate().unwrap();
        assert_eq!(key.amount.to_string(), "7.10");
    }

    #[test]
    fn test_validate_rejects_amount_needing_rounding() {
        let mut tx = candidate();
        tx.amount = Some(Decimal::from_str("1.004").unwrap());

        match tx.validate() {
            Err(Error::Validation { fields }) => assert_eq!(fields, vec!["amount"]),
            other => panic!("expected validation error, got {:?}", other),
        }

        // Trailing zeros are not extra precision
        tx.amount = Some(Decimal::from_str("1.500").unwrap());
        assert_eq!(tx.validate().unwrap().amount.to_string(), "1.50");
    }

    #[test]
    fn test_validate_rejects_amount_too_large() {
        let mut tx = candidate();
        tx.amount = Some(Decimal::from(123_456_789));
        assert!(matches!(
            tx.validate(),
            Err(Error::Validation { fields }) if fields == vec!["amount"]
        ));

        tx.amount = Some(Decimal::from_str("-99999999.99").unwrap());
        assert_eq!(tx.validate().unwrap().amount.to_string(), "99999999.99");
    }

    #[test]
    fn test_validate_trims_text_fields() {
        let mut tx = candidate();
        tx.sender = " EE001 ".to_string();
        tx.description = "Groceries\t".to_string();

        let key = tx.validate().unwrap();
        assert_eq!(key.sender, "EE001");
        assert_eq!(key.description, "Groceries");
    }

    #[test]
    fn test_required_fields_are_part_of_schema() {
        for field in schema::REQUIRED_FIELDS {
            assert!(schema::COLUMNS.contains(field));
        }
        for field in schema::NATURAL_KEY {
            assert!(schema::COLUMNS.contains(field));
        }
    }
}
