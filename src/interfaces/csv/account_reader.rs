use crate::domain::account::{Account, Money, UserId};
use crate::error::InputError;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize)]
struct AccountRecord {
    user_id: String,
    balance: Money,
}

/// Reads account seeds (`user_id,balance`) from a CSV source.
///
/// This reader wraps `csv::Reader` and provides an iterator over `Result<Account>`.
/// It handles whitespace trimming and flexible record lengths automatically.
pub struct AccountReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> AccountReader<R> {
    /// Creates a new `AccountReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and deserializes accounts.
    pub fn accounts(self) -> impl Iterator<Item = Result<Account, InputError>> {
        self.reader
            .into_deserialize::<AccountRecord>()
            .enumerate()
            .map(|(index, result)| {
                let record = result?;
                let user_id = UserId::parse(Some(&record.user_id)).map_err(|_| {
                    InputError::InvalidRecord {
                        // Line 1 is the header.
                        line: index + 2,
                        reason: "empty user_id".to_string(),
                    }
                })?;
                Ok(Account::new(user_id, record.balance))
            })
    }
}
