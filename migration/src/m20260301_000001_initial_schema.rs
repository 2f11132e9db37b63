use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Enable foreign keys for SQLite
        if manager.get_database_backend() == sea_orm::DatabaseBackend::Sqlite {
            manager
                .get_connection()
                .execute_unprepared("PRAGMA foreign_keys = ON")
                .await?;
        }

        // Create consent_requests table. Rows are never deleted; resolved
        // requests double as the audit trail.
        manager
            .create_table(
                Table::create()
                    .table(ConsentRequests::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ConsentRequests::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(string(ConsentRequests::Token))
                    .col(string(ConsentRequests::CandidateId))
                    .col(string(ConsentRequests::CompanyId))
                    .col(string(ConsentRequests::RequestedFields))
                    .col(string_null(ConsentRequests::Purpose))
                    .col(string(ConsentRequests::State))
                    .col(string_null(ConsentRequests::GrantedFields))
                    .col(big_integer(ConsentRequests::CreatedAt))
                    .col(big_integer(ConsentRequests::ExpiresAt))
                    .col(big_integer_null(ConsentRequests::ResolvedAt))
                    .to_owned(),
            )
            .await?;

        // Tokens are bearer capabilities and must never collide
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_consent_requests_token")
                    .table(ConsentRequests::Table)
                    .col(ConsentRequests::Token)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Pair lookups: pending checks and latest-grant queries
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_consent_requests_pair")
                    .table(ConsentRequests::Table)
                    .col(ConsentRequests::CandidateId)
                    .col(ConsentRequests::CompanyId)
                    .to_owned(),
            )
            .await?;

        // At most one live pending request per pair, enforced by the
        // database itself: two issuers racing past the supersede check
        // cannot both commit a pending row. Partial-index syntax is shared
        // by SQLite and Postgres.
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_consent_requests_single_pending \
                 ON consent_requests (candidate_id, company_id) WHERE state = 'pending'",
            )
            .await?;

        // History listings per party
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_consent_requests_company")
                    .table(ConsentRequests::Table)
                    .col(ConsentRequests::CompanyId)
                    .to_owned(),
            )
            .await?;

        // Create candidate_profiles table
        manager
            .create_table(
                Table::create()
                    .table(CandidateProfiles::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CandidateProfiles::CandidateId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(string(CandidateProfiles::FullName))
                    .col(string(CandidateProfiles::Email))
                    .col(string_null(CandidateProfiles::Phone))
                    .col(string_null(CandidateProfiles::Location))
                    .col(string_null(CandidateProfiles::Headline))
                    .col(string_null(CandidateProfiles::About))
                    .col(string(CandidateProfiles::Education))
                    .col(string(CandidateProfiles::Experience))
                    .col(string(CandidateProfiles::Skills))
                    .col(string(CandidateProfiles::Documents))
                    .col(big_integer(CandidateProfiles::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ConsentRequests::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(CandidateProfiles::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ConsentRequests {
    Table,
    Id,
    Token,
    CandidateId,
    CompanyId,
    RequestedFields,
    Purpose,
    State,
    GrantedFields,
    CreatedAt,
    ExpiresAt,
    ResolvedAt,
}

#[derive(DeriveIden)]
enum CandidateProfiles {
    Table,
    CandidateId,
    FullName,
    Email,
    Phone,
    Location,
    Headline,
    About,
    Education,
    Experience,
    Skills,
    Documents,
    UpdatedAt,
}
