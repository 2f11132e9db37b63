//! Profile-management collaborator seam.
//!
//! The consent subsystem never mutates candidate profiles; it only needs to
//! check that a candidate exists (token issuance) and to fetch the full
//! snapshot for projection (after the gate approves). The service binary
//! uses the database-backed implementation; tests substitute their own.

use crate::entities::{self, candidate_profile};
use crate::errors::ConsentError;
use crate::projector::{Education, Experience, ProfileSnapshot, Skill};
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    async fn exists(&self, candidate_id: &str) -> Result<bool, ConsentError>;
    async fn get_snapshot(&self, candidate_id: &str)
        -> Result<Option<ProfileSnapshot>, ConsentError>;
}

#[derive(Clone)]
pub struct DbProfileDirectory {
    db: DatabaseConnection,
}

impl DbProfileDirectory {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Insert or replace a candidate profile. Used by seeding and tests; the
    /// real profile editor lives outside this subsystem.
    pub async fn upsert(&self, snapshot: &ProfileSnapshot) -> Result<(), ConsentError> {
        use entities::candidate_profile::{Column, Entity};

        let now = Utc::now().timestamp();
        let row = candidate_profile::ActiveModel {
            candidate_id: Set(snapshot.candidate_id.clone()),
            full_name: Set(snapshot.full_name.clone()),
            email: Set(snapshot.email.clone()),
            phone: Set(snapshot.phone.clone()),
            location: Set(snapshot.location.clone()),
            headline: Set(snapshot.headline.clone()),
            about: Set(snapshot.about.clone()),
            education: Set(serde_json::to_string(&snapshot.education)?),
            experience: Set(serde_json::to_string(&snapshot.experience)?),
            skills: Set(serde_json::to_string(&snapshot.skills)?),
            documents: Set(serde_json::to_string(&snapshot.documents)?),
            updated_at: Set(now),
        };

        let existing = Entity::find()
            .filter(Column::CandidateId.eq(&snapshot.candidate_id))
            .one(&self.db)
            .await?;
        if existing.is_some() {
            row.update(&self.db).await?;
        } else {
            row.insert(&self.db).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ProfileDirectory for DbProfileDirectory {
    async fn exists(&self, candidate_id: &str) -> Result<bool, ConsentError> {
        use entities::candidate_profile::{Column, Entity};

        let found = Entity::find()
            .filter(Column::CandidateId.eq(candidate_id))
            .one(&self.db)
            .await?;
        Ok(found.is_some())
    }

    async fn get_snapshot(
        &self,
        candidate_id: &str,
    ) -> Result<Option<ProfileSnapshot>, ConsentError> {
        use entities::candidate_profile::{Column, Entity};

        let Some(model) = Entity::find()
            .filter(Column::CandidateId.eq(candidate_id))
            .one(&self.db)
            .await?
        else {
            return Ok(None);
        };

        let education: Vec<Education> = serde_json::from_str(&model.education)?;
        let experience: Vec<Experience> = serde_json::from_str(&model.experience)?;
        let skills: Vec<Skill> = serde_json::from_str(&model.skills)?;
        let documents: Vec<String> = serde_json::from_str(&model.documents)?;

        Ok(Some(ProfileSnapshot {
            candidate_id: model.candidate_id,
            full_name: model.full_name,
            email: model.email,
            phone: model.phone,
            location: model.location,
            headline: model.headline,
            about: model.about,
            education,
            experience,
            skills,
            documents,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::Database;
    use sea_orm_migration::MigratorTrait;
    use tempfile::NamedTempFile;

    async fn test_directory() -> (DbProfileDirectory, NamedTempFile) {
        let temp_file = NamedTempFile::new().expect("Failed to create temp file");
        let db_url = format!("sqlite://{}?mode=rwc", temp_file.path().to_str().unwrap());
        let connection = Database::connect(&db_url)
            .await
            .expect("Failed to connect to test database");
        migration::Migrator::up(&connection, None)
            .await
            .expect("Failed to run migrations");
        (DbProfileDirectory::new(connection), temp_file)
    }

    fn sample_snapshot() -> ProfileSnapshot {
        ProfileSnapshot {
            candidate_id: "c1".to_string(),
            full_name: "Ada Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            phone: Some("+44 20 7946 0000".to_string()),
            location: Some("London".to_string()),
            headline: Some("Backend engineer".to_string()),
            about: None,
            education: vec![Education {
                institution: "University of London".to_string(),
                degree: Some("BSc".to_string()),
                field_of_study: Some("Mathematics".to_string()),
                start_year: Some(2015),
                end_year: Some(2018),
            }],
            experience: vec![],
            skills: vec![Skill {
                name: "Rust".to_string(),
                category: Some("technical".to_string()),
                proficiency: Some("advanced".to_string()),
            }],
            documents: vec!["doc-1".to_string()],
        }
    }

    #[tokio::test]
    async fn test_upsert_and_get_snapshot() {
        let (dir, _guard) = test_directory().await;

        assert!(!dir.exists("c1").await.unwrap());
        dir.upsert(&sample_snapshot()).await.expect("Upsert failed");
        assert!(dir.exists("c1").await.unwrap());

        let snapshot = dir
            .get_snapshot("c1")
            .await
            .expect("Query failed")
            .expect("Snapshot should exist");
        assert_eq!(snapshot.full_name, "Ada Lovelace");
        assert_eq!(snapshot.education.len(), 1);
        assert_eq!(snapshot.skills[0].name, "Rust");
    }

    #[tokio::test]
    async fn test_upsert_replaces() {
        let (dir, _guard) = test_directory().await;

        dir.upsert(&sample_snapshot()).await.unwrap();
        let mut updated = sample_snapshot();
        updated.headline = Some("Staff engineer".to_string());
        dir.upsert(&updated).await.unwrap();

        let snapshot = dir.get_snapshot("c1").await.unwrap().unwrap();
        assert_eq!(snapshot.headline.as_deref(), Some("Staff engineer"));
    }

    #[tokio::test]
    async fn test_missing_candidate() {
        let (dir, _guard) = test_directory().await;
        assert!(dir.get_snapshot("ghost").await.unwrap().is_none());
    }
}
