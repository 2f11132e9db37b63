use consentgate::profiles::DbProfileDirectory;
use consentgate::projector::{Education, Experience, ProfileSnapshot, Skill};
use sea_orm::{Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use tempfile::NamedTempFile;

/// Test database with automatic cleanup
pub struct TestDb {
    connection: DatabaseConnection,
    _temp_file: NamedTempFile,
}

impl TestDb {
    /// Create a new test database with migrations applied
    pub async fn new() -> Self {
        // Create temporary SQLite database file
        let temp_file = NamedTempFile::new().expect("Failed to create temp file");
        let db_path = temp_file.path().to_str().expect("Invalid temp file path");
        let db_url = format!("sqlite://{}?mode=rwc", db_path);

        // Connect to database
        let connection = Database::connect(&db_url)
            .await
            .expect("Failed to connect to test database");

        // Run migrations
        migration::Migrator::up(&connection, None)
            .await
            .expect("Failed to run migrations");

        Self {
            connection,
            _temp_file: temp_file,
        }
    }

    /// Get database connection
    pub fn connection(&self) -> &DatabaseConnection {
        &self.connection
    }
}

/// Store a candidate profile with a representative set of attributes
pub async fn seed_profile(db: &DatabaseConnection, candidate_id: &str) -> ProfileSnapshot {
    let snapshot = ProfileSnapshot {
        candidate_id: candidate_id.to_string(),
        full_name: "Jordan Tester".to_string(),
        email: "jordan@example.com".to_string(),
        phone: Some("+49-30-1234567".to_string()),
        location: Some("Hamburg".to_string()),
        headline: Some("Data engineer".to_string()),
        about: Some("Ten years of pipelines.".to_string()),
        education: vec![Education {
            institution: "Test University".to_string(),
            degree: Some("MSc".to_string()),
            field_of_study: Some("Statistics".to_string()),
            start_year: Some(2010),
            end_year: Some(2012),
        }],
        experience: vec![Experience {
            company_name: "Data Corp".to_string(),
            role: "Senior Engineer".to_string(),
            location: Some("Hamburg".to_string()),
            start_date: Some("2015-03".to_string()),
            end_date: None,
            current: true,
            description: Some("Pipelines and warehouses.".to_string()),
        }],
        skills: vec![
            Skill {
                name: "SQL".to_string(),
                category: Some("Data".to_string()),
                proficiency: Some("expert".to_string()),
            },
            Skill {
                name: "Rust".to_string(),
                category: Some("Languages".to_string()),
                proficiency: Some("intermediate".to_string()),
            },
        ],
        documents: vec!["cv.pdf".to_string(), "references.pdf".to_string()],
    };

    DbProfileDirectory::new(db.clone())
        .upsert(&snapshot)
        .await
        .expect("Failed to seed candidate profile");

    snapshot
}
