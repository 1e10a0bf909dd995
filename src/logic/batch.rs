use log::{info, warn};
use std::collections::BTreeMap;
use std::future::Future;

use crate::error::EngineError;
use crate::model::OperationResult;

/// One resolved batch target: the identifier as the client sent it and
/// the entity it resolved to, or why it did not.
pub struct BatchTarget<E> {
    pub key: String,
    pub entity: Result<E, EngineError>,
}

impl<E> BatchTarget<E> {
    pub fn found(key: impl Into<String>, entity: E) -> Self {
        Self {
            key: key.into(),
            entity: Ok(entity),
        }
    }

    pub fn missing(key: impl Into<String>, error: EngineError) -> Self {
        Self {
            key: key.into(),
            entity: Err(error),
        }
    }
}

/// Runs an operation over several entities, isolating failures per item.
pub struct BatchExecutor;

impl BatchExecutor {
    /// Apply `per_item` to every target in order. A failing item records its
    /// message under its key and never stops the remaining items.
    ///
    /// No failures ⇒ success, all failed (with at least one target) ⇒ failure,
    /// otherwise warning. The error map holds exactly one entry per failure.
    pub async fn execute<E, F, Fut>(
        operation: &str,
        targets: Vec<BatchTarget<E>>,
        mut per_item: F,
    ) -> OperationResult
    where
        F: FnMut(E) -> Fut,
        Fut: Future<Output = Result<(), EngineError>>,
    {
        let total = targets.len();
        let mut errors = BTreeMap::new();

        for target in targets {
            let result = match target.entity {
                Ok(entity) => per_item(entity).await,
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                warn!("{} failed for '{}': {}", operation, target.key, e);
                errors.insert(target.key, e.to_string());
            }
        }

        let failed = errors.len();
        let succeeded = total - failed;
        info!(
            "{} processed {} record(s): {} succeeded, {} failed",
            operation, total, succeeded, failed
        );

        Self::classify(operation, total, errors)
    }

    fn classify(operation: &str, total: usize, errors: BTreeMap<String, String>) -> OperationResult {
        let failed = errors.len();
        if failed == 0 {
            OperationResult::success(format!("{} completed: {} record(s)", operation, total))
        } else if failed == total {
            OperationResult::failure(format!("{} failed for all selected records", operation))
                .with_errors(errors)
        } else {
            OperationResult::warning(
                format!(
                    "{} processed. {} succeeded, {} failed",
                    operation,
                    total - failed,
                    failed
                ),
                errors,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OutcomeType;
    use std::cell::RefCell;

    fn targets(n: usize) -> Vec<BatchTarget<usize>> {
        (0..n).map(|i| BatchTarget::found(format!("id-{}", i), i)).collect()
    }

    async fn run(n: usize, failing: &[usize]) -> OperationResult {
        BatchExecutor::execute("Delete", targets(n), |i| {
            let fail = failing.contains(&i);
            async move {
                if fail {
                    Err(EngineError::PreconditionRejected(format!("item {} rejected", i)))
                } else {
                    Ok(())
                }
            }
        })
        .await
    }

    #[tokio::test]
    async fn outcome_tracks_failure_count() {
        for n in 1..=4 {
            for f in 0..=n {
                let failing: Vec<usize> = (0..f).collect();
                let outcome = run(n, &failing).await;
                let expected = if f == 0 {
                    OutcomeType::Success
                } else if f == n {
                    OutcomeType::Failure
                } else {
                    OutcomeType::Warning
                };
                assert_eq!(outcome.outcome_type, expected, "n={} f={}", n, f);
                assert_eq!(outcome.error_count(), f);
            }
        }
    }

    #[tokio::test]
    async fn failures_do_not_stop_siblings() {
        let visited = RefCell::new(Vec::new());
        let outcome = BatchExecutor::execute("Delete", targets(3), |i| {
            visited.borrow_mut().push(i);
            async move {
                if i == 0 {
                    Err(EngineError::validation("first one breaks"))
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert_eq!(*visited.borrow(), vec![0, 1, 2]);
        assert_eq!(outcome.message, "Delete processed. 2 succeeded, 1 failed");
        assert_eq!(
            outcome.errors.unwrap().get("id-0").map(String::as_str),
            Some("first one breaks")
        );
    }

    #[tokio::test]
    async fn unresolved_targets_count_as_failures() {
        let mut all = targets(1);
        all.push(BatchTarget::missing("ghost", EngineError::not_found("ghost not found")));
        let outcome = BatchExecutor::execute("Delete", all, |_| async { Ok(()) }).await;
        assert_eq!(outcome.outcome_type, OutcomeType::Warning);
        assert!(outcome.errors.unwrap().contains_key("ghost"));
    }

    #[tokio::test]
    async fn empty_batch_is_success() {
        let outcome = run(0, &[]).await;
        assert_eq!(outcome.outcome_type, OutcomeType::Success);
        assert_eq!(outcome.message, "Delete completed: 0 record(s)");
    }
}
