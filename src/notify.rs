//! Notification collaborator seam. Best-effort only: a notification failure
//! never rolls back or delays a consent transition, so the trait is
//! infallible and implementations swallow and log their own errors.

use crate::entities::consent_request;
use async_trait::async_trait;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// A new pending request was created; the candidate should be told.
    async fn consent_requested(&self, request: &consent_request::Model);

    /// A request was granted or denied; the company should be told.
    async fn consent_resolved(&self, request: &consent_request::Model);
}

/// Default notifier: structured log lines only. Real delivery (email, push)
/// lives in an external service behind the same trait.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn consent_requested(&self, request: &consent_request::Model) {
        tracing::info!(
            request_id = %request.id,
            candidate_id = %request.candidate_id,
            company_id = %request.company_id,
            expires_at = request.expires_at,
            "Consent requested; candidate notification queued"
        );
    }

    async fn consent_resolved(&self, request: &consent_request::Model) {
        tracing::info!(
            request_id = %request.id,
            candidate_id = %request.candidate_id,
            company_id = %request.company_id,
            state = %request.state,
            "Consent resolved; company notification queued"
        );
    }
}
