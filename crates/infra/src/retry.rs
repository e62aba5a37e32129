//! Bounded retry for retryable errors.

use ledgerkit_core::Retryable;

/// Run `op`, retrying up to `budget` additional times while it fails with a
/// retryable error. Terminal errors surface immediately and unmodified.
pub fn with_retries<T, E>(budget: u32, mut op: impl FnMut() -> Result<T, E>) -> Result<T, E>
where
    E: Retryable,
{
    let mut remaining = budget;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && remaining > 0 => {
                remaining -= 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerkit_documents::SequencerError;

    #[test]
    fn retries_retryable_errors_until_budget_exhausted() {
        let mut attempts = 0;
        let result: Result<(), _> = with_retries(2, || {
            attempts += 1;
            Err(SequencerError::Conflict("raced".into()))
        });

        assert!(matches!(result, Err(SequencerError::Conflict(_))));
        assert_eq!(attempts, 3); // initial try + 2 retries
    }

    #[test]
    fn terminal_errors_are_not_retried() {
        let mut attempts = 0;
        let result: Result<(), _> = with_retries(5, || {
            attempts += 1;
            Err(SequencerError::InvalidNumber("bad".into()))
        });

        assert!(matches!(result, Err(SequencerError::InvalidNumber(_))));
        assert_eq!(attempts, 1);
    }

    #[test]
    fn succeeds_after_transient_failures() {
        let mut attempts = 0;
        let result = with_retries(3, || {
            attempts += 1;
            if attempts < 3 {
                Err(SequencerError::Conflict("raced".into()))
            } else {
                Ok(attempts)
            }
        });

        assert_eq!(result.unwrap(), 3);
    }
}
