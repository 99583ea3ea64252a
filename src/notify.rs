//! Approval-email dispatch.
//!
//! The core only needs a boolean-ish outcome from delivery; losing the
//! ability to notify the approver must never block account creation, so
//! every caller downgrades [`DeliveryError`] to a reported warning.

use serde::{Deserialize, Serialize};

pub const DEFAULT_ENDPOINT: &str = "https://api.emailjs.com/api/v1.0/email/send";

#[derive(Debug, thiserror::Error)]
#[error("approval email delivery failed: {0}")]
pub struct DeliveryError(pub String);

#[derive(Clone, Debug, Serialize)]
pub struct ApprovalEmail {
    pub recipient: String,
    pub requester_name: String,
    pub requester_email: String,
    pub approve_url: String,
    pub reject_url: String,
}

pub trait Notifier {
    fn send_approval_request(&self, mail: &ApprovalEmail) -> Result<(), DeliveryError>;
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    pub service_id: String,
    pub template_id: String,
    pub public_key: String,

    /// Fixed administrative address both approval URLs are mailed to.
    pub approver_email: String,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

/// Posts the transactional-mail JSON body the hosted template expects.
#[derive(Clone)]
pub struct HttpNotifier {
    client: reqwest::blocking::Client,
    config: NotifyConfig,
}

impl HttpNotifier {
    pub fn new(config: NotifyConfig) -> Result<Self, DeliveryError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent("canteen")
            .build()
            .map_err(|e| DeliveryError(e.to_string()))?;
        Ok(Self { client, config })
    }
}

impl Notifier for HttpNotifier {
    fn send_approval_request(&self, mail: &ApprovalEmail) -> Result<(), DeliveryError> {
        let body = serde_json::json!({
            "service_id": self.config.service_id,
            "template_id": self.config.template_id,
            "user_id": self.config.public_key,
            "template_params": {
                "to_email": mail.recipient,
                "user_name": mail.requester_name,
                "user_email": mail.requester_email,
                "approve_url": mail.approve_url,
                "reject_url": mail.reject_url,
                "date": time::OffsetDateTime::now_utc().date().to_string(),
            },
        });

        self.client
            .post(&self.config.endpoint)
            .json(&body)
            .send()
            .map_err(|e| DeliveryError(e.to_string()))?
            .error_for_status()
            .map_err(|e| DeliveryError(e.to_string()))?;
        Ok(())
    }
}
