// src/rotating.rs

use crate::manager::{preview, RotationManager};
use std::future::Future;
use tracing::{debug, warn};

/// Outcome of one wrapped call against a rotating credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome<T> {
    /// The action ran and reported success; a success was recorded.
    Success(T),
    /// The action ran and reported failure; a failure was recorded.
    Failed,
    /// No valid credential was available; the action never ran.
    NoActiveKey,
}

impl<T> CallOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            _ => None,
        }
    }
}

impl RotationManager {
    /// Runs `action` once with the currently active key for `service` and
    /// records the reported outcome against that key.
    ///
    /// Exactly one attempt: no key means `false` immediately, and a failing
    /// action is never retried with another credential.
    pub async fn with_rotating_key<F, Fut>(&self, service: &str, action: F) -> bool
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = bool>,
    {
        let outcome = self
            .call_with_rotating_key(service, |secret| async move {
                action(secret).await.then_some(())
            })
            .await;
        outcome.is_success()
    }

    /// Like [`with_rotating_key`](Self::with_rotating_key) but returns the
    /// action's value. The action reports failure by returning `None`.
    pub async fn call_with_rotating_key<T, F, Fut>(
        &self,
        service: &str,
        action: F,
    ) -> CallOutcome<T>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Option<T>>,
    {
        let Some(secret) = self.get_active_key(service).await else {
            debug!(service, "no active key, call skipped");
            return CallOutcome::NoActiveKey;
        };

        // The secret is the only artifact selection returns, so the key id
        // is recovered by value match before the action can mutate anything.
        let key_id = self.key_id_for_secret(service, &secret).await;
        if key_id.is_none() {
            warn!(
                service,
                secret.preview = %preview(&secret),
                "selected key no longer in pool, outcome will not be recorded"
            );
        }

        match action(secret).await {
            Some(value) => {
                if let Some(id) = &key_id {
                    self.record_success(service, id).await;
                }
                CallOutcome::Success(value)
            }
            None => {
                if let Some(id) = &key_id {
                    self.record_failure(service, id, true).await;
                }
                CallOutcome::Failed
            }
        }
    }
}
