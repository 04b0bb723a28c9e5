use crate::error::{LoyaltyError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionType {
    Order,
    Withdraw,
}

/// One row of a batch file: `type,login,password,order,amount`.
///
/// `amount` is only meaningful for withdrawals.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct Submission {
    pub r#type: SubmissionType,
    pub login: String,
    pub password: String,
    pub order: String,
    #[serde(default)]
    pub amount: Option<Decimal>,
}

/// Reads submissions from a CSV source.
///
/// Wraps `csv::Reader` and yields `Result<Submission>` lazily, with whitespace
/// trimming and flexible record lengths so a trailing empty `amount` may be
/// omitted on order rows.
pub struct SubmissionReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> SubmissionReader<R> {
    /// Creates a new `SubmissionReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    pub fn submissions(self) -> impl Iterator<Item = Result<Submission>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(LoyaltyError::from))
    }
}
