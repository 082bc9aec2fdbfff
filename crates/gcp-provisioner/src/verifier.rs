/*
 * SPDX-FileCopyrightText: Copyright (c) 2021-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
 * SPDX-License-Identifier: LicenseRef-NvidiaProprietary
 *
 * NVIDIA CORPORATION, its affiliates and licensors retain all intellectual
 * property and proprietary rights in and to this material, related
 * documentation and any modifications thereto. Any use, reproduction,
 * disclosure or distribution of this material and related documentation
 * without an express license agreement from NVIDIA CORPORATION or
 * its affiliates is strictly prohibited.
 */

use std::collections as stdcol;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use {jsonwebtoken as jst, serde_json as sj};

use crate::keystore::KeyStore;
use crate::{CLOCK_SKEW_SECS, ProvisionerError};

// Google signs identity tokens with RS256 only
const ACCEPTED_ALGORITHMS: [jst::Algorithm; 1] = [jst::Algorithm::RS256];

/// Claims of a Google instance identity token requested with `format=full`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    pub iss: String,
    #[serde(default, deserialize_with = "one_or_many")]
    pub aud: Vec<String>,
    #[serde(default)]
    pub sub: String,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub google: GoogleClaims,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoogleClaims {
    #[serde(default)]
    pub compute_engine: ComputeEngineClaims,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeEngineClaims {
    #[serde(default)]
    pub instance_id: String,
    #[serde(default)]
    pub instance_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_creation_timestamp: Option<i64>,
    #[serde(default)]
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_number: Option<i64>,
    #[serde(default)]
    pub zone: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub license_id: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

// `aud` may be a single string or an array of strings
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(audience) => vec![audience],
        OneOrMany::Many(audiences) => audiences,
    })
}

/// Verifies a compact identity token and returns its claims.
///
/// The token must be structurally valid, signed with RS256 by a key the key
/// store knows, issued by `expected_issuer` for one of `expected_audiences`,
/// and valid at `now` within [`CLOCK_SKEW_SECS`]. Claims are returned only
/// when every check passes.
pub fn verify(
    token: &str,
    key_store: &impl KeyStore,
    expected_issuer: &str,
    expected_audiences: &[String],
    now: DateTime<Utc>,
) -> Result<IdentityClaims, ProvisionerError> {
    let jwt_header = parse_structure(token)?;

    if !ACCEPTED_ALGORITHMS.contains(&jwt_header.alg) {
        return Err(ProvisionerError::UnsupportedAlgorithm(format!(
            "{:?}",
            jwt_header.alg
        )));
    }

    let kid = jwt_header.kid.ok_or_else(|| {
        ProvisionerError::MalformedToken("No kid found in token header".to_string())
    })?;

    let decoding_key = key_store
        .find_key(&kid)
        .ok_or(ProvisionerError::UnknownKey { kid })?;

    // issuer, audience and time are checked below against the caller's `now`,
    // the library only verifies the signature and decodes the payload
    let mut validation = jst::Validation::new(jwt_header.alg);
    validation.algorithms = ACCEPTED_ALGORITHMS.to_vec();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims = stdcol::HashSet::new();
    validation.leeway = 0;

    let token_data: jst::TokenData<IdentityClaims> =
        jst::decode(token, &decoding_key, &validation).map_err(classify_decode_error)?;
    let claims = token_data.claims;

    if claims.iss != expected_issuer {
        return Err(ProvisionerError::InvalidIssuer {
            expected: expected_issuer.to_string(),
            actual: claims.iss,
        });
    }

    if !claims
        .aud
        .iter()
        .any(|audience| expected_audiences.contains(audience))
    {
        return Err(ProvisionerError::InvalidAudience {
            expected: expected_audiences.to_vec(),
            actual: claims.aud,
        });
    }

    check_validity_window(&claims, now)?;

    Ok(claims)
}

fn parse_structure(token: &str) -> Result<jst::Header, ProvisionerError> {
    let segments: Vec<&str> = token.split('.').collect();
    let [_, payload, _] = segments.as_slice() else {
        return Err(ProvisionerError::MalformedToken(format!(
            "expected 3 segments, found {}",
            segments.len()
        )));
    };

    let jwt_header = jst::decode_header(token)
        .map_err(|e| ProvisionerError::MalformedToken(format!("Error decoding header: {}", e)))?;

    let payload = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| ProvisionerError::MalformedToken(format!("Error decoding payload: {}", e)))?;
    match sj::from_slice::<sj::Value>(&payload) {
        Ok(sj::Value::Object(_)) => Ok(jwt_header),
        Ok(_) => Err(ProvisionerError::MalformedToken(
            "payload is not a JSON object".to_string(),
        )),
        Err(e) => Err(ProvisionerError::MalformedToken(format!(
            "Error parsing payload: {}",
            e
        ))),
    }
}

fn classify_decode_error(err: jst::errors::Error) -> ProvisionerError {
    use jst::errors::ErrorKind;

    match err.kind() {
        ErrorKind::InvalidSignature => ProvisionerError::BadSignature(err.to_string()),
        ErrorKind::InvalidAlgorithm => ProvisionerError::UnsupportedAlgorithm(err.to_string()),
        ErrorKind::InvalidToken
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_)
        | ErrorKind::MissingRequiredClaim(_) => {
            ProvisionerError::MalformedToken(format!("Error decoding token: {}", err))
        }
        _ => ProvisionerError::BadSignature(err.to_string()),
    }
}

fn check_validity_window(
    claims: &IdentityClaims,
    now: DateTime<Utc>,
) -> Result<(), ProvisionerError> {
    let now = now.timestamp();

    if now >= claims.exp.saturating_add(CLOCK_SKEW_SECS) {
        return Err(ProvisionerError::Expired {
            expired_at: claims.exp,
            now,
        });
    }

    for valid_from in [claims.nbf, claims.iat].into_iter().flatten() {
        if now.saturating_add(CLOCK_SKEW_SECS) < valid_from {
            return Err(ProvisionerError::NotYetValid { valid_from, now });
        }
    }

    Ok(())
}
