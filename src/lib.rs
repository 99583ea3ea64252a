//! Catering back-office records with an email-gated signup workflow.
//!
//! All state lives in a local `.canteen` data directory: account records,
//! the business collections (organizations, food orders, invoices,
//! expenses), a remembered-session snapshot, and delivery configuration.
//! New accounts start `pending`; an approval token is mailed to a fixed
//! approver address and later redeemed against one of two URL paths to
//! move the account to `approved` or `rejected`.

pub mod approval;
pub mod auth;
pub mod model;
pub mod notify;
pub mod store;
pub mod token;
