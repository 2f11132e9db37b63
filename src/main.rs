use clap::Parser;
use consentgate::notify::LogNotifier;
use consentgate::profiles::{DbProfileDirectory, ProfileDirectory};
use consentgate::projector::{Education, Experience, ProfileSnapshot, Skill};
use consentgate::{gate, issuer, settings, store, web};
use miette::{IntoDiagnostic, Result};
use sea_orm_migration::MigratorTrait;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "consentgate",
    version,
    about = "Consent-gated candidate data access service"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    // load settings
    let settings = settings::Settings::load(&cli.config)?;
    tracing::info!(?settings, "Loaded configuration");

    // init storage (database)
    let db = store::connect(&settings.database).await?;
    migration::Migrator::up(&db, None).await.into_diagnostic()?;

    let store = store::ConsentStore::new(db.clone());
    let directory = DbProfileDirectory::new(db);

    if settings.server.seed_demo_data {
        seed_demo_profile(&directory).await?;
    }

    let directory: Arc<dyn ProfileDirectory> = Arc::new(directory);
    let state = web::AppState {
        issuer: issuer::TokenIssuer::new(store.clone(), directory.clone()),
        gate: gate::AccessGate::new(store.clone(), directory.clone()),
        settings: Arc::new(settings),
        store,
        directory,
        notifier: Arc::new(LogNotifier),
    };

    // start web server
    web::serve(state).await?;
    Ok(())
}

async fn seed_demo_profile(directory: &DbProfileDirectory) -> Result<()> {
    // Check if the demo candidate exists
    if directory
        .get_snapshot("cand-demo")
        .await
        .into_diagnostic()?
        .is_none()
    {
        directory
            .upsert(&ProfileSnapshot {
                candidate_id: "cand-demo".to_string(),
                full_name: "Dana Demo".to_string(),
                email: "dana@example.com".to_string(),
                phone: Some("+1-555-0100".to_string()),
                location: Some("Berlin".to_string()),
                headline: Some("Backend engineer".to_string()),
                about: Some("Demo candidate seeded at startup.".to_string()),
                education: vec![Education {
                    institution: "Example University".to_string(),
                    degree: Some("BSc".to_string()),
                    field_of_study: Some("Computer Science".to_string()),
                    start_year: Some(2015),
                    end_year: Some(2019),
                }],
                experience: vec![Experience {
                    company_name: "Example GmbH".to_string(),
                    role: "Engineer".to_string(),
                    location: Some("Berlin".to_string()),
                    start_date: Some("2019-09".to_string()),
                    end_date: None,
                    current: true,
                    description: None,
                }],
                skills: vec![Skill {
                    name: "Rust".to_string(),
                    category: Some("Languages".to_string()),
                    proficiency: Some("advanced".to_string()),
                }],
                documents: vec!["cv.pdf".to_string()],
            })
            .await
            .into_diagnostic()?;
        tracing::info!("Created demo candidate profile (candidate_id: cand-demo)");
    }
    Ok(())
}
