//! Request-signing trust bridge.
//!
//! The external sink holds no credentials for, and no trust relationship
//! with, this pipeline's identity provider. To prove identity without
//! sharing credentials, the signer builds a generic identity-assertion
//! request addressed to the provider's "who is the caller" endpoint and
//! signs it with the caller's short-lived credentials, without ever
//! sending it. The detached signature headers travel with the real sink
//! request;
//! the sink replays an equivalent assertion call to the provider using
//! exactly those headers and matches the confirmed identity against an
//! allow-list, bounded by the provider's clock-skew window.
//!
//! The signature is computed over a fixed empty assertion body, so it
//! authenticates the caller's identity but does not bind to the delivered
//! payload; payload integrity relies on transport-layer encryption.

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Signing scheme tag carried in the `authorization` header.
pub const SIGNING_SCHEME: &str = "ER1-HMAC-SHA256";

/// Header carrying the signing timestamp (`%Y%m%dT%H%M%SZ`).
pub const HEADER_DATE: &str = "x-relay-date";
/// Header carrying the hex SHA-256 of the (empty) assertion body.
pub const HEADER_CONTENT_SHA256: &str = "x-relay-content-sha256";
/// Header carrying the short-lived session token, when present.
pub const HEADER_SESSION_TOKEN: &str = "x-relay-security-token";
/// Standard authorization header.
pub const HEADER_AUTHORIZATION: &str = "authorization";

/// Hex SHA-256 of the empty string: the fixed assertion body digest.
const EMPTY_BODY_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

const DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";
const SIGNED_HEADER_NAMES: &str = "host;x-relay-content-sha256;x-relay-date";

/// Environment variable for the access key id.
pub const ENV_ACCESS_KEY_ID: &str = "EMBEDRELAY_ACCESS_KEY_ID";
/// Environment variable for the secret key.
pub const ENV_SECRET_ACCESS_KEY: &str = "EMBEDRELAY_SECRET_ACCESS_KEY";
/// Environment variable for the optional session token.
pub const ENV_SESSION_TOKEN: &str = "EMBEDRELAY_SESSION_TOKEN";

/// Errors produced while assembling or checking signed headers.
#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    /// Ambient credentials are absent or incomplete.
    #[error("ambient credentials missing: {0}")]
    MissingCredentials(&'static str),

    /// The identity endpoint could not be parsed.
    #[error("invalid identity endpoint: {0}")]
    InvalidEndpoint(String),

    /// A required header was empty after assembly.
    #[error("signed header assembly incomplete: missing {0}")]
    IncompleteHeaders(&'static str),

    /// Verification failed: the signing timestamp is outside the accepted
    /// clock-skew window.
    #[error("signature timestamp outside accepted window")]
    ClockSkewExceeded,

    /// Verification failed: recomputed signature does not match.
    #[error("signature mismatch")]
    SignatureMismatch,
}

/// Short-lived caller credentials.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl Credentials {
    /// Read credentials from the ambient environment.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::MissingCredentials`] when either the access
    /// key id or the secret is absent or empty.
    pub fn from_env() -> Result<Self, SignerError> {
        let access_key_id = std::env::var(ENV_ACCESS_KEY_ID)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or(SignerError::MissingCredentials(ENV_ACCESS_KEY_ID))?;
        let secret_access_key = std::env::var(ENV_SECRET_ACCESS_KEY)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or(SignerError::MissingCredentials(ENV_SECRET_ACCESS_KEY))?;
        let session_token = std::env::var(ENV_SESSION_TOKEN)
            .ok()
            .filter(|v| !v.trim().is_empty());
        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

/// Detached identity-proof headers attached to the real sink request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub date: String,
    pub content_sha256: String,
    pub authorization: String,
    pub session_token: Option<String>,
}

impl SignedHeaders {
    /// Header name/value pairs for attachment to an HTTP request.
    #[must_use]
    pub fn as_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            (HEADER_DATE, self.date.clone()),
            (HEADER_CONTENT_SHA256, self.content_sha256.clone()),
            (HEADER_AUTHORIZATION, self.authorization.clone()),
        ];
        if let Some(token) = &self.session_token {
            pairs.push((HEADER_SESSION_TOKEN, token.clone()));
        }
        pairs
    }
}

/// Signs identity-assertion requests with ambient short-lived credentials.
#[derive(Debug)]
pub struct RequestSigner {
    credentials: Credentials,
    identity_host: String,
    identity_path: String,
}

impl RequestSigner {
    /// Build a signer for the given identity provider endpoint
    /// (e.g. `https://identity.example.com/whoami`).
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::InvalidEndpoint`] when the endpoint has no
    /// parseable host.
    pub fn new(credentials: Credentials, identity_endpoint: &str) -> Result<Self, SignerError> {
        let (host, path) = split_endpoint(identity_endpoint)
            .ok_or_else(|| SignerError::InvalidEndpoint(identity_endpoint.to_string()))?;
        Ok(Self {
            credentials,
            identity_host: host,
            identity_path: path,
        })
    }

    /// Build a signer with credentials read from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::MissingCredentials`] or
    /// [`SignerError::InvalidEndpoint`].
    pub fn from_env(identity_endpoint: &str) -> Result<Self, SignerError> {
        Self::new(Credentials::from_env()?, identity_endpoint)
    }

    /// The access key id these headers will assert.
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.credentials.access_key_id
    }

    /// Produce detached identity-proof headers for a request.
    ///
    /// `method`, `url`, and `body` describe the real sink request and are
    /// accepted for interface completeness; the signature itself covers
    /// the canonical identity-assertion request with a fixed empty body,
    /// not the delivered payload. `correlation_id` is logged for tracing
    /// only and never enters the signature.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::MissingCredentials`] for empty credential
    /// fields or [`SignerError::IncompleteHeaders`] if any required header
    /// is empty after assembly.
    pub fn sign(
        &self,
        method: &str,
        url: &str,
        _body: &[u8],
        correlation_id: &str,
    ) -> Result<SignedHeaders, SignerError> {
        if self.credentials.access_key_id.trim().is_empty() {
            return Err(SignerError::MissingCredentials("access key id"));
        }
        if self.credentials.secret_access_key.trim().is_empty() {
            return Err(SignerError::MissingCredentials("secret access key"));
        }

        let now = Utc::now();
        let headers = self.sign_at(now)?;

        tracing::debug!(
            method,
            url,
            correlation_id,
            identity = %self.credentials.access_key_id,
            "Assembled identity-proof headers"
        );
        Ok(headers)
    }

    /// Deterministic signing core, separated for verification and tests.
    fn sign_at(&self, now: DateTime<Utc>) -> Result<SignedHeaders, SignerError> {
        let date = now.format(DATE_FORMAT).to_string();
        let datestamp = now.format("%Y%m%d").to_string();

        let signature = self.compute_signature(&date, &datestamp);
        let authorization = format!(
            "{SIGNING_SCHEME} Credential={}/{datestamp}, SignedHeaders={SIGNED_HEADER_NAMES}, Signature={signature}",
            self.credentials.access_key_id
        );

        let headers = SignedHeaders {
            date,
            content_sha256: EMPTY_BODY_SHA256.to_string(),
            authorization,
            session_token: self.credentials.session_token.clone(),
        };

        // Explicit completeness checks before the headers leave this module.
        if headers.date.is_empty() {
            return Err(SignerError::IncompleteHeaders("date"));
        }
        if headers.content_sha256.is_empty() {
            return Err(SignerError::IncompleteHeaders("content-sha256"));
        }
        if headers.authorization.is_empty() {
            return Err(SignerError::IncompleteHeaders("authorization"));
        }

        Ok(headers)
    }

    fn compute_signature(&self, date: &str, datestamp: &str) -> String {
        // Canonical form of the never-sent assertion request: a POST to the
        // provider's "who is the caller" path with an empty body.
        let canonical_request = format!(
            "POST\n{}\n\nhost:{}\nx-relay-content-sha256:{}\nx-relay-date:{}\n\n{}\n{}",
            self.identity_path,
            self.identity_host,
            EMPTY_BODY_SHA256,
            date,
            SIGNED_HEADER_NAMES,
            EMPTY_BODY_SHA256,
        );

        let request_digest = hex::encode(Sha256::digest(canonical_request.as_bytes()));
        let string_to_sign = format!("{SIGNING_SCHEME}\n{date}\n{request_digest}");

        let date_key = hmac_sha256(
            format!("ER1{}", self.credentials.secret_access_key).as_bytes(),
            datestamp.as_bytes(),
        );
        let signing_key = hmac_sha256(&date_key, b"er1_identity");
        hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()))
    }

    /// Recompute and check a set of detached headers, enforcing the
    /// clock-skew window. This mirrors what the provider does when the
    /// sink forwards the assertion call; used by tests and local tooling.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::ClockSkewExceeded`] or
    /// [`SignerError::SignatureMismatch`].
    pub fn verify(
        &self,
        headers: &SignedHeaders,
        now: DateTime<Utc>,
        max_skew: Duration,
    ) -> Result<(), SignerError> {
        let signed_at = chrono::NaiveDateTime::parse_from_str(&headers.date, DATE_FORMAT)
            .map_err(|_| SignerError::IncompleteHeaders("date"))?
            .and_utc();
        if (now - signed_at).abs() > max_skew {
            return Err(SignerError::ClockSkewExceeded);
        }

        let expected = self.sign_at(signed_at)?;
        if expected.authorization == headers.authorization
            && expected.content_sha256 == headers.content_sha256
        {
            Ok(())
        } else {
            Err(SignerError::SignatureMismatch)
        }
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Split an http(s) endpoint into (host, path).
fn split_endpoint(endpoint: &str) -> Option<(String, String)> {
    let rest = endpoint
        .strip_prefix("https://")
        .or_else(|| endpoint.strip_prefix("http://"))?;
    if rest.is_empty() {
        return None;
    }
    match rest.split_once('/') {
        Some((host, path)) if !host.is_empty() => Some((host.to_string(), format!("/{path}"))),
        Some(_) => None,
        None => Some((rest.to_string(), "/".to_string())),
    }
}
