//! Signup, login, and the remembered session.
//!
//! The store handle and session are threaded through explicitly; there is
//! no ambient "current user" or process-wide database handle, which keeps
//! the approval state machine testable against a scratch directory.

use crate::approval::ApprovalPayload;
use crate::model::{AccountRecord, AccountStatus};
use crate::notify::{ApprovalEmail, DeliveryError, Notifier};
use crate::store::LocalStore;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("an account already exists for {0}")]
    DuplicateUser(String),

    #[error("no account exists for {0}")]
    NotFound(String),

    #[error("invalid password")]
    InvalidCredential,

    #[error("account is awaiting approval")]
    PendingApproval,

    #[error("account has been rejected")]
    Rejected,

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Identity keys are trimmed, lowercased email addresses. Applied at every
/// entry point so `" Ada@X.com "` and `"ada@x.com"` are one account.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

#[derive(Debug)]
pub enum DeliveryOutcome {
    Sent,
    /// No dispatcher configured; the caller shows the URLs itself.
    Skipped,
    /// Delivery failed. Non-fatal: the pending record persists and the
    /// caller must surface this as a warning.
    Failed(DeliveryError),
}

#[derive(Debug)]
pub struct SignupOutcome {
    pub account: AccountRecord,
    pub approve_url: String,
    pub reject_url: String,
    pub delivery: DeliveryOutcome,
}

/// The two redemption URLs for one token. Both carry the same payload;
/// only the path segment decides the action.
pub fn approval_urls(base_url: &str, token: &str) -> (String, String) {
    let base = base_url.trim_end_matches('/');
    (
        format!("{base}/approve/{token}"),
        format!("{base}/reject/{token}"),
    )
}

pub fn signup(
    store: &LocalStore,
    notifier: Option<&dyn Notifier>,
    approver: &str,
    base_url: &str,
    email: &str,
    secret: &str,
    name: &str,
) -> Result<SignupOutcome, AuthError> {
    let email = normalize_email(email);
    if store.find_account_by_email(&email)?.is_some() {
        return Err(AuthError::DuplicateUser(email));
    }

    let account = store.insert_account(&email, secret, name)?;
    let token = ApprovalPayload::issue(&account)
        .to_token()
        .map_err(|e| AuthError::Store(anyhow::anyhow!(e)))?;
    let (approve_url, reject_url) = approval_urls(base_url, &token);

    let delivery = match notifier {
        None => DeliveryOutcome::Skipped,
        Some(notifier) => {
            let mail = ApprovalEmail {
                recipient: approver.to_string(),
                requester_name: account.name.clone(),
                requester_email: account.email.clone(),
                approve_url: approve_url.clone(),
                reject_url: reject_url.clone(),
            };
            match notifier.send_approval_request(&mail) {
                Ok(()) => DeliveryOutcome::Sent,
                Err(err) => DeliveryOutcome::Failed(err),
            }
        }
    };

    Ok(SignupOutcome {
        account,
        approve_url,
        reject_url,
        delivery,
    })
}

pub fn login(
    store: &LocalStore,
    session: &mut Session,
    email: &str,
    secret: &str,
) -> Result<AccountRecord, AuthError> {
    let email = normalize_email(email);
    let Some(account) = store.find_account_by_email(&email)? else {
        return Err(AuthError::NotFound(email));
    };
    if account.secret != secret {
        return Err(AuthError::InvalidCredential);
    }
    match account.status {
        AccountStatus::Pending => Err(AuthError::PendingApproval),
        AccountStatus::Rejected => Err(AuthError::Rejected),
        AccountStatus::Approved => {
            store.write_session(&account)?;
            session.current = Some(account.clone());
            Ok(account)
        }
    }
}

pub fn logout(store: &LocalStore, session: &mut Session) -> anyhow::Result<()> {
    store.clear_session()?;
    session.current = None;
    Ok(())
}

/// The remembered identity, always re-validated against the store before
/// use. A session only ever references an `approved` record.
#[derive(Debug, Default)]
pub struct Session {
    current: Option<AccountRecord>,
}

impl Session {
    /// Revive the remembered identity, if any. A rejected record discards
    /// the snapshot; a pending or missing record leaves the session
    /// cleared without touching the snapshot or surfacing an error.
    pub fn restore(store: &LocalStore) -> anyhow::Result<Self> {
        let Some(snapshot) = store.read_session()? else {
            return Ok(Self::default());
        };
        match store.find_account_by_email(&normalize_email(&snapshot.email))? {
            Some(record) if record.status == AccountStatus::Approved => Ok(Self {
                current: Some(record),
            }),
            Some(record) if record.status == AccountStatus::Rejected => {
                store.clear_session()?;
                Ok(Self::default())
            }
            _ => Ok(Self::default()),
        }
    }

    pub fn current(&self) -> Option<&AccountRecord> {
        self.current.as_ref()
    }
}
