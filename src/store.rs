//! Durable consent-request store, the single source of truth for the state
//! machine in [`crate::state`].
//!
//! The store keeps every request ever created (resolved rows are the audit
//! trail), applies expiry lazily at read time, and guards resolution writes
//! with a compare-and-swap on the current state so concurrent responders
//! cannot both win. Transition legality lives in the state machine; the store
//! only refuses writes that would break the data-model invariants, chiefly
//! `granted_fields ⊆ requested_fields`.

use crate::entities::{self, consent_request};
use crate::errors::ConsentError;
use crate::fields::FieldSet;
use crate::settings::Database as DbCfg;
use crate::state::{effective_state, stored_state, ConsentState};
use base64ct::Encoding;
use rand::RngCore;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, Database, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, Set, SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};

pub async fn connect(cfg: &DbCfg) -> Result<DatabaseConnection, ConsentError> {
    let db = Database::connect(&cfg.url).await?;
    Ok(db)
}

/// URL-safe random identifier (128 bits).
pub fn random_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64ct::Base64UrlUnpadded::encode_string(&bytes)
}

/// Bearer consent token (256 bits). The token is the only credential a
/// candidate needs to act on a request, so it gets twice the entropy of
/// ordinary ids.
pub fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64ct::Base64UrlUnpadded::encode_string(&bytes)
}

/// Input for a new pending request; ids and token are generated by the
/// issuer, timestamps by the caller.
#[derive(Debug, Clone)]
pub struct NewConsentRequest {
    pub candidate_id: String,
    pub company_id: String,
    pub requested_fields: FieldSet,
    pub purpose: Option<String>,
    pub created_at: i64,
    pub expires_at: i64,
}

/// The durable fact derived from an approved, non-revoked request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grant {
    pub request_id: String,
    pub candidate_id: String,
    pub company_id: String,
    pub fields: Vec<String>,
    pub granted_at: i64,
}

#[derive(Clone)]
pub struct ConsentStore {
    db: DatabaseConnection,
}

impl ConsentStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Create a pending request, superseding any live pending request for the
    /// same pair: the old request is expired (its token invalidated) and the
    /// new one inserted in a single transaction, so at most one pending
    /// request per pair exists at any observation point.
    ///
    /// Two issuers can race past the pending check under read-committed
    /// isolation. The partial unique index on pending pairs makes the
    /// loser's insert fail, and one retry supersedes the winner's row.
    pub async fn create_pending(
        &self,
        input: NewConsentRequest,
    ) -> Result<(consent_request::Model, Option<consent_request::Model>), ConsentError> {
        match self.try_create_pending(&input).await {
            Err(ConsentError::Db(err))
                if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) =>
            {
                self.try_create_pending(&input).await
            }
            other => other,
        }
    }

    async fn try_create_pending(
        &self,
        input: &NewConsentRequest,
    ) -> Result<(consent_request::Model, Option<consent_request::Model>), ConsentError> {
        use entities::consent_request::{Column, Entity};

        let txn = self.db.begin().await?;

        let superseded = Entity::find()
            .filter(Column::CandidateId.eq(&input.candidate_id))
            .filter(Column::CompanyId.eq(&input.company_id))
            .filter(Column::State.eq(ConsentState::Pending.as_str()))
            .one(&txn)
            .await?;

        if let Some(old) = &superseded {
            Entity::update_many()
                .col_expr(Column::State, Expr::value(ConsentState::Expired.as_str()))
                .col_expr(Column::ResolvedAt, Expr::value(input.created_at))
                .filter(Column::Id.eq(&old.id))
                .filter(Column::State.eq(ConsentState::Pending.as_str()))
                .exec(&txn)
                .await?;
        }

        let model = consent_request::ActiveModel {
            id: Set(random_id()),
            token: Set(random_token()),
            candidate_id: Set(input.candidate_id.clone()),
            company_id: Set(input.company_id.clone()),
            requested_fields: Set(input.requested_fields.to_storage()),
            purpose: Set(input.purpose.clone()),
            state: Set(ConsentState::Pending.as_str().to_string()),
            granted_fields: Set(None),
            created_at: Set(input.created_at),
            expires_at: Set(input.expires_at),
            resolved_at: Set(None),
        };

        let inserted = model.insert(&txn).await?;
        txn.commit().await?;

        Ok((inserted, superseded))
    }

    /// Look up a request by its bearer token. Fails closed: unknown tokens
    /// return `None`. A stale pending row is flipped to `expired` before it
    /// is returned, so no caller ever observes an actionable request past
    /// its deadline.
    pub async fn get_by_token(
        &self,
        token: &str,
        now: i64,
    ) -> Result<Option<consent_request::Model>, ConsentError> {
        use entities::consent_request::{Column, Entity};

        let Some(model) = Entity::find()
            .filter(Column::Token.eq(token))
            .one(&self.db)
            .await?
        else {
            return Ok(None);
        };

        self.apply_lazy_expiry(model, now).await.map(Some)
    }

    /// The live pending request for a pair, if any.
    pub async fn get_pending_for(
        &self,
        candidate_id: &str,
        company_id: &str,
        now: i64,
    ) -> Result<Option<consent_request::Model>, ConsentError> {
        use entities::consent_request::{Column, Entity};

        let Some(model) = Entity::find()
            .filter(Column::CandidateId.eq(candidate_id))
            .filter(Column::CompanyId.eq(company_id))
            .filter(Column::State.eq(ConsentState::Pending.as_str()))
            .one(&self.db)
            .await?
        else {
            return Ok(None);
        };

        let model = self.apply_lazy_expiry(model, now).await?;
        if model.state == ConsentState::Pending.as_str() {
            Ok(Some(model))
        } else {
            Ok(None)
        }
    }

    async fn apply_lazy_expiry(
        &self,
        model: consent_request::Model,
        now: i64,
    ) -> Result<consent_request::Model, ConsentError> {
        use entities::consent_request::{Column, Entity};

        let stored = stored_state(&model)?;
        if effective_state(stored, model.expires_at, now) == stored {
            return Ok(model);
        }

        // CAS keyed on state: a concurrent resolver may have won, in which
        // case the re-read below reflects whatever it wrote
        Entity::update_many()
            .col_expr(Column::State, Expr::value(ConsentState::Expired.as_str()))
            .filter(Column::Id.eq(&model.id))
            .filter(Column::State.eq(ConsentState::Pending.as_str()))
            .exec(&self.db)
            .await?;

        Entity::find()
            .filter(Column::Id.eq(&model.id))
            .one(&self.db)
            .await?
            .ok_or(ConsentError::NotFound)
    }

    /// Compare-and-swap state transition for one request. The write succeeds
    /// only if the stored state is still `from`; otherwise the current state
    /// is reported as `AlreadyResolved` and nothing changes.
    pub async fn resolve(
        &self,
        id: &str,
        from: ConsentState,
        to: ConsentState,
        granted: Option<&FieldSet>,
        resolved_at: i64,
    ) -> Result<consent_request::Model, ConsentError> {
        use entities::consent_request::{Column, Entity};

        let current = Entity::find()
            .filter(Column::Id.eq(id))
            .one(&self.db)
            .await?
            .ok_or(ConsentError::NotFound)?;

        // Data-model invariant enforced at the write boundary
        if let Some(granted) = granted {
            let requested = FieldSet::from_storage(&current.requested_fields)?;
            if !granted.is_subset(&requested) {
                return Err(ConsentError::InvalidFieldSet(
                    "granted fields exceed the requested fields".to_string(),
                ));
            }
        }

        let mut update = Entity::update_many()
            .col_expr(Column::State, Expr::value(to.as_str()))
            .col_expr(Column::ResolvedAt, Expr::value(resolved_at));
        if let Some(granted) = granted {
            update = update.col_expr(Column::GrantedFields, Expr::value(granted.to_storage()));
        }

        let result = update
            .filter(Column::Id.eq(id))
            .filter(Column::State.eq(from.as_str()))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            let observed = Entity::find()
                .filter(Column::Id.eq(id))
                .one(&self.db)
                .await?
                .ok_or(ConsentError::NotFound)?;
            let current = stored_state(&observed)?;
            return Err(ConsentError::AlreadyResolved { current });
        }

        Entity::find()
            .filter(Column::Id.eq(id))
            .one(&self.db)
            .await?
            .ok_or(ConsentError::NotFound)
    }

    /// The newest grant-bearing request (granted or revoked) for a pair.
    /// Callers that need to distinguish "revoked" from "never granted" use
    /// this; [`ConsentStore::latest_grant`] is the plain contract.
    pub async fn latest_resolved_grant(
        &self,
        candidate_id: &str,
        company_id: &str,
    ) -> Result<Option<consent_request::Model>, ConsentError> {
        use entities::consent_request::{Column, Entity};

        let model = Entity::find()
            .filter(Column::CandidateId.eq(candidate_id))
            .filter(Column::CompanyId.eq(company_id))
            .filter(
                Condition::any()
                    .add(Column::State.eq(ConsentState::Granted.as_str()))
                    .add(Column::State.eq(ConsentState::Revoked.as_str())),
            )
            .order_by_desc(Column::ResolvedAt)
            .order_by_desc(Column::CreatedAt)
            .one(&self.db)
            .await?;

        Ok(model)
    }

    /// The most recent non-revoked grant for a pair, or none.
    pub async fn latest_grant(
        &self,
        candidate_id: &str,
        company_id: &str,
    ) -> Result<Option<Grant>, ConsentError> {
        let Some(model) = self.latest_resolved_grant(candidate_id, company_id).await? else {
            return Ok(None);
        };
        if model.state != ConsentState::Granted.as_str() {
            return Ok(None);
        }

        let fields = model
            .granted_fields
            .as_deref()
            .map(FieldSet::from_storage)
            .transpose()?
            .unwrap_or_default();

        Ok(Some(Grant {
            request_id: model.id,
            candidate_id: model.candidate_id,
            company_id: model.company_id,
            fields: fields.names().into_iter().map(str::to_string).collect(),
            granted_at: model.resolved_at.unwrap_or(model.created_at),
        }))
    }

    /// Newest-first request history for a candidate.
    pub async fn list_for_candidate(
        &self,
        candidate_id: &str,
    ) -> Result<Vec<consent_request::Model>, ConsentError> {
        use entities::consent_request::{Column, Entity};

        Ok(Entity::find()
            .filter(Column::CandidateId.eq(candidate_id))
            .order_by_desc(Column::CreatedAt)
            .all(&self.db)
            .await?)
    }

    /// Newest-first request history for a company.
    pub async fn list_for_company(
        &self,
        company_id: &str,
    ) -> Result<Vec<consent_request::Model>, ConsentError> {
        use entities::consent_request::{Column, Entity};

        Ok(Entity::find()
            .filter(Column::CompanyId.eq(company_id))
            .order_by_desc(Column::CreatedAt)
            .all(&self.db)
            .await?)
    }
}
