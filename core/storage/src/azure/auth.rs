//! Shared Key request signing for the Blob service.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use cloudbridge_common::SecretString;

use crate::provider::{BackendError, BackendResult};

/// Blob service REST version sent with every request.
pub(crate) const API_VERSION: &str = "2021-08-06";

type HmacSha256 = Hmac<Sha256>;

/// Signs requests with a storage account key.
pub(crate) struct SharedKey {
    account: String,
    key: SecretString,
}

impl SharedKey {
    pub(crate) fn new(account: impl Into<String>, key: SecretString) -> Self {
        Self {
            account: account.into(),
            key,
        }
    }

    /// Build the `Authorization` header for a request without a body.
    ///
    /// `path` is the URL path as sent; `query` holds the decoded query
    /// parameters.
    ///
    /// # Errors
    /// - `Service` if the account key is not valid base64
    pub(crate) fn authorization(
        &self,
        method: &str,
        path: &str,
        query: &[(&str, &str)],
        date: &str,
    ) -> BackendResult<String> {
        let key = STANDARD
            .decode(self.key.expose())
            .map_err(BackendError::service)?;
        let mut mac = HmacSha256::new_from_slice(&key)
            .map_err(|_| BackendError::other("account key has an invalid length"))?;
        mac.update(string_to_sign(&self.account, method, path, query, date).as_bytes());

        let signature = STANDARD.encode(mac.finalize().into_bytes());
        Ok(format!("SharedKey {}:{}", self.account, signature))
    }
}

/// `x-ms-date` value for `now`.
pub(crate) fn request_date(now: DateTime<Utc>) -> String {
    now.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn string_to_sign(
    account: &str,
    method: &str,
    path: &str,
    query: &[(&str, &str)],
    date: &str,
) -> String {
    let mut params: Vec<(String, &str)> = query
        .iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), *value))
        .collect();
    params.sort();

    let mut resource = format!("/{}{}", account, path);
    for (name, value) in params {
        resource.push('\n');
        resource.push_str(&name);
        resource.push(':');
        resource.push_str(value);
    }

    // Verb, then eleven standard headers that these requests never set.
    format!(
        "{}{}x-ms-date:{}\nx-ms-version:{}\n{}",
        method,
        "\n".repeat(12),
        date,
        API_VERSION,
        resource
    )
}
