//! Consent state machine.
//!
//! States: `pending` (initial), `granted`, `denied`, `expired`, `revoked`.
//! Every state is terminal except `pending`, and `granted` which may still
//! move to `revoked`. Expiry is applied lazily by the store at read time, so
//! by the time a transition runs here a stale pending request already reads
//! as `expired`.
//!
//! Retries are idempotent: repeating an approval with the same field set on
//! an already-granted request (or re-denying a denied one, re-revoking a
//! revoked one) returns the stored request unchanged instead of erroring.

use crate::errors::ConsentError;
use crate::fields::FieldSet;
use crate::store::ConsentStore;
use crate::entities::consent_request;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsentState {
    Pending,
    Granted,
    Denied,
    Expired,
    Revoked,
}

impl ConsentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsentState::Pending => "pending",
            ConsentState::Granted => "granted",
            ConsentState::Denied => "denied",
            ConsentState::Expired => "expired",
            ConsentState::Revoked => "revoked",
        }
    }

    pub fn parse(value: &str) -> Option<ConsentState> {
        match value {
            "pending" => Some(ConsentState::Pending),
            "granted" => Some(ConsentState::Granted),
            "denied" => Some(ConsentState::Denied),
            "expired" => Some(ConsentState::Expired),
            "revoked" => Some(ConsentState::Revoked),
            _ => None,
        }
    }

    /// Whether a request in this state can still be acted on by the candidate.
    pub fn is_actionable(&self) -> bool {
        matches!(self, ConsentState::Pending)
    }
}

impl fmt::Display for ConsentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The state a request is observed in once lazy expiry is accounted for.
pub fn effective_state(state: ConsentState, expires_at: i64, now: i64) -> ConsentState {
    if state == ConsentState::Pending && now > expires_at {
        ConsentState::Expired
    } else {
        state
    }
}

pub(crate) fn stored_state(req: &consent_request::Model) -> Result<ConsentState, ConsentError> {
    ConsentState::parse(&req.state).ok_or_else(|| {
        ConsentError::Db(sea_orm::DbErr::Custom(format!(
            "consent request {} has unrecognized state {:?}",
            req.id, req.state
        )))
    })
}

/// Candidate approves a pending request, granting `field_names` (a subset of
/// what was requested).
pub async fn approve(
    store: &ConsentStore,
    token: &str,
    field_names: &[String],
    now: i64,
) -> Result<consent_request::Model, ConsentError> {
    let fields = FieldSet::from_names(field_names)?;
    if fields.is_empty() {
        // Approval that shares nothing is modeled as denial, not a grant
        return Err(ConsentError::EmptyGrant);
    }

    let req = store
        .get_by_token(token, now)
        .await?
        .ok_or(ConsentError::NotFound)?;

    match stored_state(&req)? {
        ConsentState::Pending => {
            let requested = FieldSet::from_storage(&req.requested_fields)?;
            if !fields.is_subset(&requested) {
                return Err(ConsentError::InvalidFieldSet(format!(
                    "granted fields must be a subset of the requested fields ({})",
                    requested.to_storage()
                )));
            }
            match store
                .resolve(
                    &req.id,
                    ConsentState::Pending,
                    ConsentState::Granted,
                    Some(&fields),
                    now,
                )
                .await
            {
                Ok(updated) => Ok(updated),
                // Lost a write race; if the winner granted the same set this
                // call is still an idempotent success
                Err(ConsentError::AlreadyResolved { .. }) => {
                    let current = store
                        .get_by_token(token, now)
                        .await?
                        .ok_or(ConsentError::NotFound)?;
                    already_granted_with(current, &fields)
                }
                Err(e) => Err(e),
            }
        }
        ConsentState::Granted => already_granted_with(req, &fields),
        ConsentState::Denied => Err(ConsentError::AlreadyResolved {
            current: ConsentState::Denied,
        }),
        current @ (ConsentState::Expired | ConsentState::Revoked) => {
            Err(ConsentError::InvalidTransition { current })
        }
    }
}

fn already_granted_with(
    req: consent_request::Model,
    fields: &FieldSet,
) -> Result<consent_request::Model, ConsentError> {
    let current = stored_state(&req)?;
    if current != ConsentState::Granted {
        return Err(ConsentError::AlreadyResolved { current });
    }
    let existing = req
        .granted_fields
        .as_deref()
        .map(FieldSet::from_storage)
        .transpose()?
        .unwrap_or_default();
    if existing == *fields {
        Ok(req)
    } else {
        Err(ConsentError::AlreadyResolved {
            current: ConsentState::Granted,
        })
    }
}

/// Candidate declines a pending request.
pub async fn deny(
    store: &ConsentStore,
    token: &str,
    now: i64,
) -> Result<consent_request::Model, ConsentError> {
    let req = store
        .get_by_token(token, now)
        .await?
        .ok_or(ConsentError::NotFound)?;

    match stored_state(&req)? {
        ConsentState::Pending => {
            match store
                .resolve(
                    &req.id,
                    ConsentState::Pending,
                    ConsentState::Denied,
                    None,
                    now,
                )
                .await
            {
                Ok(updated) => Ok(updated),
                Err(ConsentError::AlreadyResolved { current: ConsentState::Denied }) => store
                    .get_by_token(token, now)
                    .await?
                    .ok_or(ConsentError::NotFound),
                Err(e) => Err(e),
            }
        }
        ConsentState::Denied => Ok(req),
        ConsentState::Granted => Err(ConsentError::AlreadyResolved {
            current: ConsentState::Granted,
        }),
        current @ (ConsentState::Expired | ConsentState::Revoked) => {
            Err(ConsentError::InvalidTransition { current })
        }
    }
}

/// Candidate withdraws the most recent grant for a company. Operates on the
/// grant, not the original token, and carries no expiry check.
pub async fn revoke(
    store: &ConsentStore,
    candidate_id: &str,
    company_id: &str,
) -> Result<consent_request::Model, ConsentError> {
    let req = store
        .latest_resolved_grant(candidate_id, company_id)
        .await?
        .ok_or(ConsentError::NotFound)?;

    let now = Utc::now().timestamp();
    match stored_state(&req)? {
        ConsentState::Granted => {
            match store
                .resolve(
                    &req.id,
                    ConsentState::Granted,
                    ConsentState::Revoked,
                    None,
                    now,
                )
                .await
            {
                Ok(updated) => Ok(updated),
                Err(ConsentError::AlreadyResolved { current: ConsentState::Revoked }) => store
                    .latest_resolved_grant(candidate_id, company_id)
                    .await?
                    .ok_or(ConsentError::NotFound),
                Err(e) => Err(e),
            }
        }
        ConsentState::Revoked => Ok(req),
        current => Err(ConsentError::InvalidTransition { current }),
    }
}
