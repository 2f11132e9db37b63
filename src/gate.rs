//! Access Gate: the single enforcement point for company reads of candidate
//! data. Every company-facing profile read goes through `authorize` and,
//! when allowed, projects with exactly the granted fields. No other code
//! path hands `ProfileSnapshot` data to a company.

use crate::errors::ConsentError;
use crate::fields::FieldSet;
use crate::profiles::ProfileDirectory;
use crate::state::ConsentState;
use crate::store::ConsentStore;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    NoConsent,
    Revoked,
    CandidateNotFound,
}

#[derive(Debug, Clone)]
pub enum AccessDecision {
    Allowed { granted_fields: FieldSet },
    Denied { reason: DenyReason },
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessDecision::Allowed { .. })
    }
}

#[derive(Clone)]
pub struct AccessGate {
    store: ConsentStore,
    directory: Arc<dyn ProfileDirectory>,
}

impl AccessGate {
    pub fn new(store: ConsentStore, directory: Arc<dyn ProfileDirectory>) -> Self {
        Self { store, directory }
    }

    /// Decide whether `company_id` may currently read `candidate_id`, and
    /// with which field scope.
    pub async fn authorize(
        &self,
        company_id: &str,
        candidate_id: &str,
    ) -> Result<AccessDecision, ConsentError> {
        if !self.directory.exists(candidate_id).await? {
            return Ok(AccessDecision::Denied {
                reason: DenyReason::CandidateNotFound,
            });
        }

        let Some(latest) = self
            .store
            .latest_resolved_grant(candidate_id, company_id)
            .await?
        else {
            return Ok(AccessDecision::Denied {
                reason: DenyReason::NoConsent,
            });
        };

        if latest.state == ConsentState::Revoked.as_str() {
            return Ok(AccessDecision::Denied {
                reason: DenyReason::Revoked,
            });
        }

        // Stored field names are parsed defensively; a corrupt row denies
        // access instead of leaking anything
        let granted_fields = latest
            .granted_fields
            .as_deref()
            .map(FieldSet::from_storage)
            .transpose()?
            .unwrap_or_default();

        Ok(AccessDecision::Allowed { granted_fields })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiles::DbProfileDirectory;
    use crate::projector::ProfileSnapshot;
    use crate::store::NewConsentRequest;
    use chrono::Utc;
    use sea_orm::Database;
    use sea_orm_migration::MigratorTrait;
    use tempfile::NamedTempFile;

    struct TestEnv {
        gate: AccessGate,
        store: ConsentStore,
        _temp_file: NamedTempFile,
    }

    async fn test_env() -> TestEnv {
        let temp_file = NamedTempFile::new().expect("Failed to create temp file");
        let db_url = format!("sqlite://{}?mode=rwc", temp_file.path().to_str().unwrap());
        let connection = Database::connect(&db_url)
            .await
            .expect("Failed to connect to test database");
        migration::Migrator::up(&connection, None)
            .await
            .expect("Failed to run migrations");

        let directory = DbProfileDirectory::new(connection.clone());
        directory
            .upsert(&ProfileSnapshot {
                candidate_id: "c1".to_string(),
                full_name: "Ada Lovelace".to_string(),
                email: "ada@example.com".to_string(),
                phone: None,
                location: None,
                headline: None,
                about: None,
                education: vec![],
                experience: vec![],
                skills: vec![],
                documents: vec![],
            })
            .await
            .expect("Failed to seed profile");

        let store = ConsentStore::new(connection);
        TestEnv {
            gate: AccessGate::new(store.clone(), Arc::new(directory)),
            store,
            _temp_file: temp_file,
        }
    }

    async fn grant(env: &TestEnv, fields: &[&str], at: i64) -> String {
        let (req, _) = env
            .store
            .create_pending(NewConsentRequest {
                candidate_id: "c1".to_string(),
                company_id: "co1".to_string(),
                requested_fields: FieldSet::all(),
                purpose: None,
                created_at: at,
                expires_at: at + 600,
            })
            .await
            .unwrap();
        env.store
            .resolve(
                &req.id,
                ConsentState::Pending,
                ConsentState::Granted,
                Some(&FieldSet::from_names(fields.iter().copied()).unwrap()),
                at + 1,
            )
            .await
            .unwrap();
        req.id
    }

    #[tokio::test]
    async fn test_no_consent() {
        let env = test_env().await;
        let decision = env.gate.authorize("co1", "c1").await.unwrap();
        match decision {
            AccessDecision::Denied { reason } => assert_eq!(reason, DenyReason::NoConsent),
            other => panic!("unexpected decision: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_candidate() {
        let env = test_env().await;
        let decision = env.gate.authorize("co1", "ghost").await.unwrap();
        match decision {
            AccessDecision::Denied { reason } => {
                assert_eq!(reason, DenyReason::CandidateNotFound)
            }
            other => panic!("unexpected decision: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_allowed_with_granted_scope() {
        let env = test_env().await;
        grant(&env, &["full_name", "skills"], Utc::now().timestamp()).await;

        let decision = env.gate.authorize("co1", "c1").await.unwrap();
        match decision {
            AccessDecision::Allowed { granted_fields } => {
                assert_eq!(granted_fields.to_storage(), "full_name skills");
            }
            other => panic!("unexpected decision: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_revoked_closes_the_gate() {
        let env = test_env().await;
        let now = Utc::now().timestamp();
        let request_id = grant(&env, &["email"], now).await;

        env.store
            .resolve(
                &request_id,
                ConsentState::Granted,
                ConsentState::Revoked,
                None,
                now + 5,
            )
            .await
            .unwrap();

        let decision = env.gate.authorize("co1", "c1").await.unwrap();
        match decision {
            AccessDecision::Denied { reason } => assert_eq!(reason, DenyReason::Revoked),
            other => panic!("unexpected decision: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_newer_grant_supersedes_revocation() {
        let env = test_env().await;
        let now = Utc::now().timestamp();
        let first = grant(&env, &["email"], now).await;
        env.store
            .resolve(&first, ConsentState::Granted, ConsentState::Revoked, None, now + 5)
            .await
            .unwrap();

        grant(&env, &["skills"], now + 10).await;

        let decision = env.gate.authorize("co1", "c1").await.unwrap();
        assert!(decision.is_allowed());
    }

    #[tokio::test]
    async fn test_denied_request_never_opens_gate() {
        let env = test_env().await;
        let now = Utc::now().timestamp();
        let (req, _) = env
            .store
            .create_pending(NewConsentRequest {
                candidate_id: "c1".to_string(),
                company_id: "co1".to_string(),
                requested_fields: FieldSet::all(),
                purpose: None,
                created_at: now,
                expires_at: now + 600,
            })
            .await
            .unwrap();
        env.store
            .resolve(&req.id, ConsentState::Pending, ConsentState::Denied, None, now)
            .await
            .unwrap();

        let decision = env.gate.authorize("co1", "c1").await.unwrap();
        match decision {
            AccessDecision::Denied { reason } => assert_eq!(reason, DenyReason::NoConsent),
            other => panic!("unexpected decision: {other:?}"),
        }
    }
}
