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

//! Identity-token provisioner for Google Compute Engine instances.
//!
//! A CA consults a [`Gcp`] provisioner to decide whether a signing request
//! backed by an instance identity token may be granted. The token is verified
//! against Google's published key set ([`JwksKeyStore`]), authorized against
//! the provisioner's allow-lists ([`authorize`]), and fingerprinted for
//! trust-on-first-use enforcement. [`IdentityTokenClient`] is the instance-side
//! counterpart that fetches a token from the metadata service.

// these are not visible outside of this crate
mod authorizer;
mod claimer;
mod client;
mod config;
mod constraints;
mod fingerprint;
mod keystore;
mod provisioner;
mod verifier;

// re-exports
pub use authorizer::authorize;
pub use claimer::{Claimer, Claims};
pub use client::IdentityTokenClient;
pub use config::{Defaults, Endpoints, GcpConfig, GlobalConfig};
pub use constraints::{ExtendedKeyUsage, IssuanceConstraint, KeyUsage, ProvisionerExtension};
pub use fingerprint::token_fingerprint;
pub use keystore::{JwksKeyStore, KeySet, KeyStore};
pub use provisioner::{Gcp, Provisioner, ProvisionerType};
pub use verifier::{ComputeEngineClaims, GoogleClaims, IdentityClaims, verify};

/// Issuer of every Google-signed identity token.
pub const GCP_ISSUER: &str = "https://accounts.google.com";

/// Tolerance, in seconds, applied to `exp`, `nbf` and `iat` when comparing
/// against the evaluation instant.
pub const CLOCK_SKEW_SECS: i64 = 30;

/// The instance fields that must be present in an authorized token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstanceField {
    InstanceId,
    InstanceName,
    ProjectId,
    Zone,
}

impl std::fmt::Display for InstanceField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let claim = match self {
            InstanceField::InstanceId => "instance_id",
            InstanceField::InstanceName => "instance_name",
            InstanceField::ProjectId => "project_id",
            InstanceField::Zone => "zone",
        };
        write!(f, "google.compute_engine.{claim}")
    }
}

/// Why an HTTP exchange with Google (key set or metadata service) failed.
#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum HttpFailure {
    #[error("communication error: {0}")]
    Communication(String),
    #[error("returned status code {status} and message {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {0}")]
    Malformed(String),
}

#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProvisionerError {
    #[error("malformed token: {0}")]
    MalformedToken(String),
    #[error("token algorithm {0} is not accepted")]
    UnsupportedAlgorithm(String),
    #[error("no verification key found for kid {kid}")]
    UnknownKey { kid: String },
    #[error("token signature verification failed: {0}")]
    BadSignature(String),
    #[error("invalid token issuer: expected {expected}, got {actual}")]
    InvalidIssuer { expected: String, actual: String },
    #[error("invalid token audience: expected one of {expected:?}, got {actual:?}")]
    InvalidAudience {
        expected: Vec<String>,
        actual: Vec<String>,
    },
    #[error("token expired at {expired_at} (now {now})")]
    Expired { expired_at: i64, now: i64 },
    #[error("token not valid before {valid_from} (now {now})")]
    NotYetValid { valid_from: i64, now: i64 },
    #[error("service account {0} is not allowed")]
    ServiceAccountNotAllowed(String),
    #[error("project id {0} is not allowed")]
    ProjectNotAllowed(String),
    #[error("instance is too old: age {age_secs}s exceeds the {max_secs}s limit")]
    InstanceTooOld { age_secs: i64, max_secs: i64 },
    #[error("token {0} claim cannot be empty")]
    MissingInstanceField(InstanceField),
    #[error("renewal is disabled for provisioner {0}")]
    RenewalDisabled(String),
    #[error("revoke is disabled for provisioner {0}")]
    RevocationDisabled(String),
    #[error("invalid CA URL {url}: {reason}")]
    InvalidCaUrl { url: String, reason: String },
    #[error("identity token request failed: {0}")]
    RequestFailed(HttpFailure),
    #[error("key set fetch failed: {0}")]
    KeySetFetchFailed(HttpFailure),
    #[error("invalid provisioner configuration: {0}")]
    InvalidConfiguration(String),
}

impl From<reqwest::Error> for HttpFailure {
    fn from(value: reqwest::Error) -> HttpFailure {
        HttpFailure::Communication(value.to_string())
    }
}
