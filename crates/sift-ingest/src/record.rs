use crate::error::ParseError;
use bytes::Bytes;
use core::fmt;
use serde::{Deserialize, Serialize};

/// Number of payload bytes included in log lines.
const PREVIEW_BYTES: usize = 64;

/// One raw message as delivered by a [`StreamSource`](crate::StreamSource).
///
/// `offset` identifies the message within its source so a failed message can
/// be located and reprocessed offline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub offset: u64,
    pub payload: Bytes,
}

impl Message {
    pub fn new(offset: u64, payload: impl Into<Bytes>) -> Self {
        Self {
            offset,
            payload: payload.into(),
        }
    }

    /// A bounded, lossy UTF-8 view of the payload for logging.
    pub fn preview(&self) -> Preview<'_> {
        Preview(&self.payload)
    }
}

/// Display adapter returned by [`Message::preview`].
pub struct Preview<'a>(&'a [u8]);

impl fmt::Display for Preview<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let end = self.0.len().min(PREVIEW_BYTES);
        write!(f, "{}", String::from_utf8_lossy(&self.0[..end]))?;
        if self.0.len() > PREVIEW_BYTES {
            write!(f, "...({} bytes)", self.0.len())?;
        }
        Ok(())
    }
}

/// Wire shape of a message payload.
#[derive(Deserialize)]
struct Transaction {
    id: String,
    account: String,
    amount: f64,
    #[serde(default = "default_currency")]
    currency: String,
    #[serde(default)]
    timestamp: Option<String>,
}

fn default_currency() -> String {
    "USD".to_string()
}

/// A decoded message plus its classification. Immutable once built.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Record {
    pub offset: u64,
    pub id: String,
    pub account: String,
    pub amount: f64,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    pub of_interest: bool,
}

impl Record {
    /// Decodes `message` and classifies it with `classifier`.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] if the payload is not a valid transaction
    /// document or its amount is not finite.
    pub fn parse(message: &Message, classifier: &Classifier) -> Result<Self, ParseError> {
        let txn: Transaction = serde_json::from_slice(&message.payload)?;
        if !txn.amount.is_finite() {
            return Err(ParseError::NonFiniteAmount);
        }

        Ok(Self {
            offset: message.offset,
            of_interest: classifier.is_of_interest(txn.amount),
            id: txn.id,
            account: txn.account,
            amount: txn.amount,
            currency: txn.currency,
            timestamp: txn.timestamp,
        })
    }
}

/// The business rule: an amount strictly above `threshold` is of interest.
///
/// An amount equal to the threshold is not. No tolerance is applied.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Classifier {
    threshold: f64,
}

impl Classifier {
    pub const DEFAULT_THRESHOLD: f64 = 10_000.0;

    pub const fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub const fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn is_of_interest(&self, amount: f64) -> bool {
        amount > self.threshold
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(Self::DEFAULT_THRESHOLD)
    }
}
