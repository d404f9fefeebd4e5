use std::sync::Arc;
use std::time::Duration;

use storage::repository::{AnswerRepository, StorageError};
use tryout_core::model::Answer;

/// Callback invoked when an answer could not be persisted after all retries.
///
/// The in-memory answer is already applied by then; the hook exists so a
/// caller can surface the divergence (banner, log line) or queue its own
/// reconciliation.
pub type SaveErrorHook = Arc<dyn Fn(&Answer, &StorageError) + Send + Sync>;

/// Write-through gateway for answer upserts.
///
/// Local state updates optimistically before this gateway runs; the gateway's
/// only job is to converge the backend, retrying transient failures with a
/// doubling backoff. Exhausted retries are reported, never thrown back into
/// the learner's path.
#[derive(Clone)]
pub struct AnswerGateway {
    answers: Arc<dyn AnswerRepository>,
    max_attempts: u32,
    base_backoff: Duration,
    on_error: Option<SaveErrorHook>,
}

impl AnswerGateway {
    #[must_use]
    pub fn new(answers: Arc<dyn AnswerRepository>) -> Self {
        Self {
            answers,
            max_attempts: 3,
            base_backoff: Duration::from_millis(200),
            on_error: None,
        }
    }

    /// Override the retry budget. `max_attempts` is clamped to at least one
    /// try.
    #[must_use]
    pub fn with_retry(mut self, max_attempts: u32, base_backoff: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.base_backoff = base_backoff;
        self
    }

    #[must_use]
    pub fn with_error_hook(mut self, hook: SaveErrorHook) -> Self {
        self.on_error = Some(hook);
        self
    }

    /// Upsert one answer row, retrying with backoff.
    ///
    /// # Errors
    ///
    /// Returns the last `StorageError` once the retry budget is exhausted.
    /// The error hook has already fired by then.
    pub async fn save(&self, answer: &Answer) -> Result<(), StorageError> {
        let mut backoff = self.base_backoff;
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            match self.answers.upsert_answer(answer).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    tracing::warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        question = %answer.question_id(),
                        error = %err,
                        "answer save failed"
                    );
                    last_error = Some(err);
                    if attempt < self.max_attempts {
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    }
                }
            }
        }

        let err =
            last_error.unwrap_or_else(|| StorageError::Connection("retry budget empty".into()));
        if let Some(hook) = &self.on_error {
            hook(answer, &err);
        }
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tryout_core::model::{AttemptId, QuestionId};

    /// Fails the first `failures` upserts, then stores into an inner repo.
    struct FlakyAnswers {
        failures: AtomicU32,
        saved: Mutex<Vec<Answer>>,
    }

    impl FlakyAnswers {
        fn new(failures: u32) -> Self {
            Self {
                failures: AtomicU32::new(failures),
                saved: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl AnswerRepository for FlakyAnswers {
        async fn upsert_answer(&self, answer: &Answer) -> Result<(), StorageError> {
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(StorageError::Connection("transient".into()));
            }
            self.saved.lock().unwrap().push(answer.clone());
            Ok(())
        }

        async fn answers_for_attempt(
            &self,
            _attempt_id: AttemptId,
        ) -> Result<Vec<Answer>, StorageError> {
            Ok(self.saved.lock().unwrap().clone())
        }
    }

    fn build_answer() -> Answer {
        let mut answer = Answer::blank(AttemptId::new(1), QuestionId::new(1));
        answer.set_text("B");
        answer
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let repo = Arc::new(FlakyAnswers::new(2));
        let gateway = AnswerGateway::new(repo.clone())
            .with_retry(3, Duration::from_millis(1));

        gateway.save(&build_answer()).await.unwrap();
        assert_eq!(repo.saved.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_invoke_the_hook_and_error() {
        let repo = Arc::new(FlakyAnswers::new(10));
        let hook_calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&hook_calls);
        let gateway = AnswerGateway::new(repo)
            .with_retry(2, Duration::from_millis(1))
            .with_error_hook(Arc::new(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            }));

        let err = gateway.save(&build_answer()).await.unwrap_err();
        assert!(matches!(err, StorageError::Connection(_)));
        assert_eq!(hook_calls.load(Ordering::SeqCst), 1);
    }
}
