//! Consent token issuance.
//!
//! Companies ask for access here. The issuer validates the requested field
//! set, confirms the candidate exists, and persists a `pending` request
//! carrying a fresh bearer token. If a pending request already exists for
//! the pair it is superseded: the old token is invalidated and a new one
//! issued (documented policy; see DESIGN.md).

use crate::entities::consent_request;
use crate::errors::ConsentError;
use crate::fields::FieldSet;
use crate::profiles::ProfileDirectory;
use crate::store::{ConsentStore, NewConsentRequest};
use chrono::Utc;
use std::sync::Arc;

#[derive(Clone)]
pub struct TokenIssuer {
    store: ConsentStore,
    directory: Arc<dyn ProfileDirectory>,
}

impl TokenIssuer {
    pub fn new(store: ConsentStore, directory: Arc<dyn ProfileDirectory>) -> Self {
        Self { store, directory }
    }

    /// Issue a pending consent request valid for `ttl_secs`.
    pub async fn issue(
        &self,
        candidate_id: &str,
        company_id: &str,
        field_names: &[String],
        purpose: Option<String>,
        ttl_secs: i64,
    ) -> Result<consent_request::Model, ConsentError> {
        if field_names.is_empty() {
            return Err(ConsentError::InvalidFieldSet(
                "at least one field must be requested".to_string(),
            ));
        }
        let requested = match FieldSet::from_names(field_names) {
            Ok(set) => set,
            Err(ConsentError::UnknownField(name)) => {
                return Err(ConsentError::InvalidFieldSet(format!(
                    "unrecognized field {name:?}"
                )))
            }
            Err(e) => return Err(e),
        };

        if !self.directory.exists(candidate_id).await? {
            // Surfaced generically at the HTTP boundary to avoid enumeration
            return Err(ConsentError::CandidateNotFound);
        }

        let now = Utc::now().timestamp();
        let (created, superseded) = self
            .store
            .create_pending(NewConsentRequest {
                candidate_id: candidate_id.to_string(),
                company_id: company_id.to_string(),
                requested_fields: requested,
                purpose,
                created_at: now,
                expires_at: now + ttl_secs,
            })
            .await?;

        if let Some(old) = superseded {
            tracing::info!(
                request_id = %created.id,
                superseded_id = %old.id,
                candidate_id,
                company_id,
                "Superseded pending consent request"
            );
        }

        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiles::DbProfileDirectory;
    use crate::projector::ProfileSnapshot;
    use sea_orm::{Database, DatabaseConnection};
    use sea_orm_migration::MigratorTrait;
    use tempfile::NamedTempFile;

    struct TestEnv {
        issuer: TokenIssuer,
        store: ConsentStore,
        _temp_file: NamedTempFile,
    }

    async fn test_env() -> TestEnv {
        let temp_file = NamedTempFile::new().expect("Failed to create temp file");
        let db_url = format!("sqlite://{}?mode=rwc", temp_file.path().to_str().unwrap());
        let connection: DatabaseConnection = Database::connect(&db_url)
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
            issuer: TokenIssuer::new(store.clone(), Arc::new(directory)),
            store,
            _temp_file: temp_file,
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_issue_creates_pending_request() {
        let env = test_env().await;

        let req = env
            .issuer
            .issue(
                "c1",
                "co1",
                &names(&["full_name", "email", "skills"]),
                Some("Backend role screening".to_string()),
                600,
            )
            .await
            .expect("Issue failed");

        assert_eq!(req.state, "pending");
        assert_eq!(req.requested_fields, "email full_name skills");
        assert_eq!(req.expires_at - req.created_at, 600);
        assert!(req.token.len() >= 43);

        let fetched = env
            .store
            .get_by_token(&req.token, Utc::now().timestamp())
            .await
            .unwrap()
            .expect("Token should resolve");
        assert_eq!(fetched.id, req.id);
    }

    #[tokio::test]
    async fn test_issue_rejects_empty_field_set() {
        let env = test_env().await;
        let err = env
            .issuer
            .issue("c1", "co1", &[], None, 600)
            .await
            .unwrap_err();
        assert!(matches!(err, ConsentError::InvalidFieldSet(_)));
    }

    #[tokio::test]
    async fn test_issue_rejects_unrecognized_field() {
        let env = test_env().await;
        let err = env
            .issuer
            .issue("c1", "co1", &names(&["email", "blood_type"]), None, 600)
            .await
            .unwrap_err();
        match err {
            ConsentError::InvalidFieldSet(msg) => assert!(msg.contains("blood_type")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_issue_unknown_candidate() {
        let env = test_env().await;
        let err = env
            .issuer
            .issue("ghost", "co1", &names(&["email"]), None, 600)
            .await
            .unwrap_err();
        assert!(matches!(err, ConsentError::CandidateNotFound));
        // No state mutation on failure
        assert!(env
            .store
            .get_pending_for("ghost", "co1", Utc::now().timestamp())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_reissue_supersedes_and_invalidates_old_token() {
        let env = test_env().await;
        let now = Utc::now().timestamp();

        let first = env
            .issuer
            .issue("c1", "co1", &names(&["email"]), None, 600)
            .await
            .unwrap();
        let second = env
            .issuer
            .issue("c1", "co1", &names(&["email", "skills"]), None, 600)
            .await
            .unwrap();

        assert_ne!(first.token, second.token);

        let old = env
            .store
            .get_by_token(&first.token, now)
            .await
            .unwrap()
            .expect("Old request kept for audit");
        assert_eq!(old.state, "expired");

        let pending = env
            .store
            .get_pending_for("c1", "co1", now)
            .await
            .unwrap()
            .expect("Exactly one pending request");
        assert_eq!(pending.id, second.id);
    }
}
