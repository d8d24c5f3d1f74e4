//! Client for the RadosGW IAM-compatible XML API.
//!
//! Requests are parameter-only POSTs signed with SigV4. Successful bodies are
//! returned raw and decoded by the caller; failures are classified into
//! [`ApiError`]s with stable codes.

mod client;
pub mod error;
mod params;
pub mod xml;

pub use client::{IAM_SERVICE, IamClient, SIGNING_REGION, SIGNING_SERVICE};
pub use error::{ApiError, api_error, classify, is_api_error, is_method_not_allowed, is_not_found};
pub use params::Params;

#[cfg(test)]
pub(crate) use client::tests::{SIGNATURE_PATTERN, test_client};
