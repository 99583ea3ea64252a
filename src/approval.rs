//! Approval payload and the signup-approval state machine.
//!
//! A payload binds a pending account (surrogate id + email) to an issuance
//! time. It travels as an unauthenticated token inside two mailed URLs;
//! which of the two terminal states redemption produces is chosen by the
//! URL path the approver followed, never by token content.

use serde::{Deserialize, Serialize};

use crate::auth::normalize_email;
use crate::model::{AccountRecord, AccountStatus};
use crate::store::{LocalStore, now_ms};
use crate::token::{self, DecodeError};

/// Tokens expire 24 hours after issuance. The boundary is inclusive:
/// a token aged exactly the limit still redeems.
pub const TOKEN_TTL_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, thiserror::Error)]
pub enum ApprovalError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("approval token does not match any issued request")]
    InvalidToken,

    #[error("approval link has expired")]
    ExpiredToken,

    #[error("no account matches this approval token")]
    UnknownUser,

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApprovalAction {
    Approve,
    Reject,
}

impl ApprovalAction {
    pub fn target_status(self) -> AccountStatus {
        match self {
            ApprovalAction::Approve => AccountStatus::Approved,
            ApprovalAction::Reject => AccountStatus::Rejected,
        }
    }

    /// URL path segment the action is reached through.
    pub fn as_str(self) -> &'static str {
        match self {
            ApprovalAction::Approve => "approve",
            ApprovalAction::Reject => "reject",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalPayload {
    pub account_id: i64,
    pub email: String,
    pub issued_at_ms: i64,
}

impl ApprovalPayload {
    pub fn issue(account: &AccountRecord) -> Self {
        Self::issued_at(account, now_ms())
    }

    pub fn issued_at(account: &AccountRecord, issued_at_ms: i64) -> Self {
        Self {
            account_id: account.id,
            email: account.email.clone(),
            issued_at_ms,
        }
    }

    pub fn to_token(&self) -> Result<String, ApprovalError> {
        let text = serde_json::to_string(self).map_err(|e| ApprovalError::Store(e.into()))?;
        Ok(token::encode(&text))
    }

    /// Structural failures (missing field, non-numeric id, not JSON at all)
    /// are `InvalidToken`; only a broken encoding is a `Decode` error.
    pub fn from_token(token: &str) -> Result<Self, ApprovalError> {
        let text = token::decode(token)?;
        serde_json::from_str(&text).map_err(|_| ApprovalError::InvalidToken)
    }
}

/// Redeem a token against the store, moving the named account to the
/// action's terminal status. Fail-closed: nothing is written unless every
/// check passes. Replaying a still-unexpired token re-applies the action
/// (last write wins); the store itself forbids returning to `pending`.
pub fn redeem(
    store: &LocalStore,
    token: &str,
    action: ApprovalAction,
) -> Result<AccountRecord, ApprovalError> {
    redeem_at(store, token, action, now_ms())
}

pub fn redeem_at(
    store: &LocalStore,
    token: &str,
    action: ApprovalAction,
    now_ms: i64,
) -> Result<AccountRecord, ApprovalError> {
    let payload = ApprovalPayload::from_token(token)?;

    let age = now_ms - payload.issued_at_ms;
    if age > TOKEN_TTL_MS {
        return Err(ApprovalError::ExpiredToken);
    }

    let email = normalize_email(&payload.email);
    let account = store
        .find_account_by_email(&email)?
        .ok_or(ApprovalError::UnknownUser)?;

    // A token minted for one record must not move a different record that
    // later claimed the same email. Not a defense against outright forgery
    // (the codec is unauthenticated), only against stale tokens.
    if account.id != payload.account_id {
        return Err(ApprovalError::InvalidToken);
    }

    let updated = store.update_account_status(account.id, action.target_status())?;
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::encode;

    fn store_with_account(dir: &tempfile::TempDir) -> (LocalStore, AccountRecord) {
        let store = LocalStore::init(dir.path(), false).unwrap();
        let account = store.insert_account("ada@example.com", "pw", "Ada").unwrap();
        (store, account)
    }

    #[test]
    fn approve_moves_pending_to_approved() {
        let dir = tempfile::tempdir().unwrap();
        let (store, account) = store_with_account(&dir);
        let token = ApprovalPayload::issue(&account).to_token().unwrap();

        let updated = redeem(&store, &token, ApprovalAction::Approve).unwrap();
        assert_eq!(updated.status, AccountStatus::Approved);
    }

    #[test]
    fn reject_moves_pending_to_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (store, account) = store_with_account(&dir);
        let token = ApprovalPayload::issue(&account).to_token().unwrap();

        let updated = redeem(&store, &token, ApprovalAction::Reject).unwrap();
        assert_eq!(updated.status, AccountStatus::Rejected);
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let dir = tempfile::tempdir().unwrap();
        let (store, account) = store_with_account(&dir);
        let issued = 1_000_000;
        let token = ApprovalPayload::issued_at(&account, issued)
            .to_token()
            .unwrap();

        // One past the limit fails, exactly at the limit passes.
        let err = redeem_at(
            &store,
            &token,
            ApprovalAction::Approve,
            issued + TOKEN_TTL_MS + 1,
        )
        .unwrap_err();
        assert!(matches!(err, ApprovalError::ExpiredToken));
        // Failure wrote nothing.
        assert_eq!(
            store
                .find_account_by_email("ada@example.com")
                .unwrap()
                .unwrap()
                .status,
            AccountStatus::Pending
        );

        let updated = redeem_at(
            &store,
            &token,
            ApprovalAction::Approve,
            issued + TOKEN_TTL_MS,
        )
        .unwrap();
        assert_eq!(updated.status, AccountStatus::Approved);
    }

    #[test]
    fn mismatched_account_id_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (store, account) = store_with_account(&dir);
        let payload = ApprovalPayload {
            account_id: account.id + 1,
            email: account.email.clone(),
            issued_at_ms: now_ms(),
        };
        let token = payload.to_token().unwrap();

        let err = redeem(&store, &token, ApprovalAction::Approve).unwrap_err();
        assert!(matches!(err, ApprovalError::InvalidToken));
        assert_eq!(
            store
                .find_account_by_email("ada@example.com")
                .unwrap()
                .unwrap()
                .status,
            AccountStatus::Pending
        );
    }

    #[test]
    fn unknown_email_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = store_with_account(&dir);
        let payload = ApprovalPayload {
            account_id: 7,
            email: "nobody@example.com".to_string(),
            issued_at_ms: now_ms(),
        };
        let token = payload.to_token().unwrap();

        let err = redeem(&store, &token, ApprovalAction::Approve).unwrap_err();
        assert!(matches!(err, ApprovalError::UnknownUser));
    }

    #[test]
    fn garbage_and_wrong_shape_tokens_are_distinguished() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = store_with_account(&dir);

        let err = redeem(&store, "!!definitely/not/base64!!", ApprovalAction::Approve)
            .unwrap_err();
        assert!(matches!(err, ApprovalError::Decode(_)));

        // Decodes fine, but is not a payload.
        let err = redeem(
            &store,
            &encode("{\"hello\":\"world\"}"),
            ApprovalAction::Approve,
        )
        .unwrap_err();
        assert!(matches!(err, ApprovalError::InvalidToken));
    }

    #[test]
    fn payload_email_is_normalized_before_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let (store, account) = store_with_account(&dir);
        let payload = ApprovalPayload {
            account_id: account.id,
            email: "  ADA@Example.com ".to_string(),
            issued_at_ms: now_ms(),
        };
        let token = payload.to_token().unwrap();

        let updated = redeem(&store, &token, ApprovalAction::Approve).unwrap();
        assert_eq!(updated.status, AccountStatus::Approved);
    }
}
