//! Year-scoped document numbering.
//!
//! Sequenced numbers have the shape `YYYY-NNNNNNN` (7-digit zero-padded
//! suffix). Sequences reset per calendar year and run independently per
//! document type. Assignment must be one atomic read-increment: two
//! concurrent creations must never observe the same "last number".

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use ledgerkit_core::{Retryable, TenantId, ValueObject};

use crate::document::DocumentType;

/// Largest sequence value representable in the 7-digit suffix.
pub const MAX_SEQUENCE: u32 = 9_999_999;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SequencerError {
    /// Two writers raced on the same `(type, year)` counter. Retryable.
    #[error("sequencing conflict: {0}")]
    Conflict(String),

    /// A number did not parse as `YYYY-NNNNNNN`.
    #[error("invalid document number: {0}")]
    InvalidNumber(String),

    /// The 7-digit sequence space for a year is used up.
    #[error("sequence exhausted for year {year}")]
    Exhausted { year: i32 },
}

impl Retryable for SequencerError {
    fn is_retryable(&self) -> bool {
        matches!(self, SequencerError::Conflict(_))
    }
}

/// A sequenced document number: `YYYY-NNNNNNN`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequencedNumber {
    year: i32,
    sequence: u32,
}

impl SequencedNumber {
    pub fn new(year: i32, sequence: u32) -> Result<Self, SequencerError> {
        if !(1..=MAX_SEQUENCE).contains(&sequence) {
            return Err(SequencerError::InvalidNumber(format!(
                "sequence {sequence} out of range 1..={MAX_SEQUENCE}"
            )));
        }
        if !(0..=9999).contains(&year) {
            return Err(SequencerError::InvalidNumber(format!(
                "year {year} not representable as YYYY"
            )));
        }
        Ok(Self { year, sequence })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }
}

impl ValueObject for SequencedNumber {}

impl core::fmt::Display for SequencedNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:04}-{:07}", self.year, self.sequence)
    }
}

impl FromStr for SequencedNumber {
    type Err = SequencerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, seq) = s
            .split_once('-')
            .ok_or_else(|| SequencerError::InvalidNumber(format!("missing '-' in '{s}'")))?;
        if year.len() != 4 || seq.len() != 7 {
            return Err(SequencerError::InvalidNumber(format!(
                "expected YYYY-NNNNNNN, got '{s}'"
            )));
        }
        let year: i32 = year
            .parse()
            .map_err(|_| SequencerError::InvalidNumber(format!("bad year in '{s}'")))?;
        let sequence: u32 = seq
            .parse()
            .map_err(|_| SequencerError::InvalidNumber(format!("bad sequence in '{s}'")))?;
        Self::new(year, sequence)
    }
}

/// The number a document carries: sequenced, or supplied by an external
/// party (purchase documents only).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentNumber {
    Sequenced(SequencedNumber),
    External(String),
}

impl DocumentNumber {
    pub fn is_sequenced(&self) -> bool {
        matches!(self, DocumentNumber::Sequenced(_))
    }
}

impl core::fmt::Display for DocumentNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DocumentNumber::Sequenced(n) => core::fmt::Display::fmt(n, f),
            DocumentNumber::External(n) => f.write_str(n),
        }
    }
}

/// Atomic read-increment of the `(tenant, type, year)` counter.
///
/// Implementations must guarantee that N concurrent calls for the same key
/// produce N distinct, contiguous numbers: a serialized counter, or an
/// insert-and-retry loop under a uniqueness constraint on `(type, number)`.
pub trait NumberSequencer: Send + Sync {
    fn next_number(
        &self,
        tenant_id: TenantId,
        doc_type: DocumentType,
        year: i32,
    ) -> Result<SequencedNumber, SequencerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_with_seven_digit_padding() {
        let n = SequencedNumber::new(2026, 1).unwrap();
        assert_eq!(n.to_string(), "2026-0000001");

        let n = SequencedNumber::new(2026, 1234567).unwrap();
        assert_eq!(n.to_string(), "2026-1234567");
    }

    #[test]
    fn round_trips_through_parse() {
        let n: SequencedNumber = "2025-0004711".parse().unwrap();
        assert_eq!(n.year(), 2025);
        assert_eq!(n.sequence(), 4711);
        assert_eq!(n.to_string(), "2025-0004711");
    }

    #[test]
    fn rejects_malformed_numbers() {
        assert!("20260000001".parse::<SequencedNumber>().is_err());
        assert!("2026-001".parse::<SequencedNumber>().is_err());
        assert!("26-0000001".parse::<SequencedNumber>().is_err());
        assert!("2026-00000x1".parse::<SequencedNumber>().is_err());
        assert!("2026-0000000".parse::<SequencedNumber>().is_err());
    }

    #[test]
    fn sequence_zero_is_invalid() {
        let err = SequencedNumber::new(2026, 0).unwrap_err();
        assert!(matches!(err, SequencerError::InvalidNumber(_)));
    }

    #[test]
    fn conflict_is_retryable_but_parse_errors_are_not() {
        assert!(SequencerError::Conflict("raced".into()).is_retryable());
        assert!(!SequencerError::InvalidNumber("x".into()).is_retryable());
        assert!(!SequencerError::Exhausted { year: 2026 }.is_retryable());
    }
}
