use crate::state::ConsentState;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ConsentError {
    #[error("I/O error: {0}")]
    #[diagnostic(code(consentgate::io))]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    #[diagnostic(code(consentgate::config))]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(consentgate::serde))]
    Serde(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    #[diagnostic(code(consentgate::db))]
    Db(#[from] sea_orm::DbErr),

    #[error("Invalid field set: {0}")]
    #[diagnostic(code(consentgate::invalid_field_set))]
    InvalidFieldSet(String),

    #[error("Cannot grant an empty field set")]
    #[diagnostic(code(consentgate::empty_grant))]
    EmptyGrant,

    #[error("Unknown profile field: {0}")]
    #[diagnostic(code(consentgate::unknown_field))]
    UnknownField(String),

    #[error("No transition allowed from state {current}")]
    #[diagnostic(code(consentgate::invalid_transition))]
    InvalidTransition { current: ConsentState },

    #[error("Request already resolved as {current}")]
    #[diagnostic(code(consentgate::already_resolved))]
    AlreadyResolved { current: ConsentState },

    #[error("Consent request not found")]
    #[diagnostic(code(consentgate::not_found))]
    NotFound,

    #[error("Candidate not found")]
    #[diagnostic(code(consentgate::candidate_not_found))]
    CandidateNotFound,
}
