use crate::domain::ledger::Balance;
use crate::error::{LoyaltyError, Result};
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct BalanceRow<'a> {
    login: &'a str,
    current: String,
    withdrawn: String,
}

/// Writes `login,current,withdrawn` rows.
pub struct BalanceWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> BalanceWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    /// Writes every balance, in the order given, and flushes.
    pub fn write_balances<'a>(
        &mut self,
        balances: impl IntoIterator<Item = (&'a str, Balance)>,
    ) -> Result<()> {
        for (login, balance) in balances {
            self.writer.serialize(BalanceRow {
                login,
                current: balance.current.to_string(),
                withdrawn: balance.withdrawn.to_string(),
            })?;
        }
        self.writer.flush().map_err(LoyaltyError::from)
    }
}
