// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Identity extraction from the access token.
//!
//! The token is opaque to the pipeline: a [`CredentialResolver`] turns it
//! into a stable identity plus whatever claims it carries. The identity ends
//! up on every shipped record.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{Map, Value};

use crate::error::CredentialError;

pub const DEFAULT_IDENTITY_CLAIM: &str = "sub";

#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub identity: String,
    pub claims: Map<String, Value>,
}

pub trait CredentialResolver: Send + Sync {
    fn resolve(&self, token: &str) -> Result<Credentials, CredentialError>;
}

/// Reads the claim set of a JWT. The signature is not checked here.
#[derive(Debug, Clone)]
pub struct JwtClaimsResolver {
    identity_claim: String,
}

impl Default for JwtClaimsResolver {
    fn default() -> Self {
        Self::new(DEFAULT_IDENTITY_CLAIM)
    }
}

impl JwtClaimsResolver {
    #[must_use]
    pub fn new(identity_claim: impl Into<String>) -> Self {
        Self {
            identity_claim: identity_claim.into(),
        }
    }

    fn claims(token: &str) -> Result<Map<String, Value>, CredentialError> {
        let mut segments = token.split('.');
        let (Some(_header), Some(payload), Some(_signature), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(CredentialError::Malformed(
                "expected three dot-separated segments".to_string(),
            ));
        };

        // some issuers keep the padding
        let decoded = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| CredentialError::Malformed(format!("claims are not base64url: {e}")))?;

        match serde_json::from_slice::<Value>(&decoded) {
            Ok(Value::Object(claims)) => Ok(claims),
            Ok(_) => Err(CredentialError::Malformed(
                "claims are not a JSON object".to_string(),
            )),
            Err(e) => Err(CredentialError::Malformed(format!(
                "claims are not valid JSON: {e}"
            ))),
        }
    }
}

impl CredentialResolver for JwtClaimsResolver {
    fn resolve(&self, token: &str) -> Result<Credentials, CredentialError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(CredentialError::Blank);
        }

        let claims = Self::claims(token)?;
        let identity = match claims.get(&self.identity_claim) {
            Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(CredentialError::MissingClaim(self.identity_claim.clone())),
        };

        Ok(Credentials { identity, claims })
    }
}
