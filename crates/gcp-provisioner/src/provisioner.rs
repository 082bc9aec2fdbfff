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

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::authorizer::authorize;
use crate::claimer::Claimer;
use crate::client::IdentityTokenClient;
use crate::config::{GcpConfig, GlobalConfig};
use crate::constraints::IssuanceConstraint;
use crate::fingerprint::token_fingerprint;
use crate::keystore::JwksKeyStore;
use crate::verifier::{IdentityClaims, verify};
use crate::{GCP_ISSUER, ProvisionerError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProvisionerType {
    #[serde(rename = "GCP")]
    Gcp,
}

impl ProvisionerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisionerType::Gcp => "GCP",
        }
    }

    /// Prefix of the provisioner id, `<prefix>/<name>`.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            ProvisionerType::Gcp => "gcp",
        }
    }
}

impl std::fmt::Display for ProvisionerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// what the CA's signing pipeline asks of any provisioner
#[async_trait]
pub trait Provisioner: std::fmt::Debug + Send + Sync + 'static {
    fn id(&self) -> String;
    fn name(&self) -> &str;
    fn provisioner_type(&self) -> ProvisionerType;

    /// The encrypted signing key of token-minting provisioners as
    /// `(kid, key)`. Identity-token provisioners have none.
    fn encrypted_key(&self) -> Option<(&str, &str)> {
        None
    }

    async fn authorize_sign(&self, token: &str)
    -> Result<Vec<IssuanceConstraint>, ProvisionerError>;
    fn authorize_renewal(&self, certificate: &[u8]) -> Result<(), ProvisionerError>;
    fn authorize_revoke(&self, token: &str) -> Result<(), ProvisionerError>;
    async fn token_fingerprint(&self, token: &str) -> Result<String, ProvisionerError>;
}

/// A provisioner granting certificates to Google Compute Engine instances
/// that present a metadata-service identity token.
#[derive(Debug)]
pub struct Gcp {
    config: GcpConfig,
    audiences: Vec<String>,
    claimer: Claimer,
    key_store: JwksKeyStore,
}

impl Gcp {
    /// Validates the configuration, merges its claims over the global ones and
    /// fetches Google's key set.
    #[tracing::instrument(skip_all, fields(provisioner = %config.name))]
    pub async fn new_with_config(
        config: GcpConfig,
        global: &GlobalConfig,
    ) -> Result<Gcp, ProvisionerError> {
        config.validate()?;
        global.validate()?;

        let claimer = Claimer::new(config.claims.as_ref(), &global.claims)?;
        let audiences = global.expected_audiences(&config.provisioner_id());
        let key_store = JwksKeyStore::new_with_config(&config.endpoints).await?;

        Ok(Gcp {
            config,
            audiences,
            claimer,
            key_store,
        })
    }

    pub fn config(&self) -> &GcpConfig {
        &self.config
    }

    /// Audiences accepted in a token's `aud` claim.
    pub fn audiences(&self) -> &[String] {
        &self.audiences
    }

    pub fn claimer(&self) -> &Claimer {
        &self.claimer
    }

    pub fn key_store(&self) -> &JwksKeyStore {
        &self.key_store
    }

    pub fn identity_token_client(&self) -> Result<IdentityTokenClient, ProvisionerError> {
        IdentityTokenClient::new_with_config(self.id(), &self.config.endpoints)
    }

    #[tracing::instrument(skip_all, fields(provisioner = %self.config.provisioner_id()))]
    pub async fn authorize_sign_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<IssuanceConstraint>, ProvisionerError> {
        let claims = self.verify_token(token, now).await?;
        authorize(&claims, &self.config, &self.claimer, now)
            .inspect(|constraints| {
                tracing::debug!(
                    instance_id = %claims.google.compute_engine.instance_id,
                    constraints = constraints.len(),
                    "Authorized sign request"
                )
            })
            .inspect_err(|e| tracing::debug!(error = %e, "Denied sign request"))
    }

    pub async fn token_fingerprint_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<String, ProvisionerError> {
        let claims = self.verify_token(token, now).await?;
        Ok(token_fingerprint(&self.config, &claims, token))
    }

    async fn verify_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<IdentityClaims, ProvisionerError> {
        self.key_store.refresh_if_stale(now).await;
        verify(token, &self.key_store, GCP_ISSUER, &self.audiences, now)
            .inspect_err(|e| tracing::debug!(error = %e, "Token verification failed"))
    }
}

#[async_trait]
impl Provisioner for Gcp {
    fn id(&self) -> String {
        self.config.provisioner_id()
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn provisioner_type(&self) -> ProvisionerType {
        ProvisionerType::Gcp
    }

    async fn authorize_sign(
        &self,
        token: &str,
    ) -> Result<Vec<IssuanceConstraint>, ProvisionerError> {
        self.authorize_sign_at(token, Utc::now()).await
    }

    fn authorize_renewal(&self, _certificate: &[u8]) -> Result<(), ProvisionerError> {
        if self.claimer.is_renewal_disabled() {
            return Err(ProvisionerError::RenewalDisabled(self.id()));
        }
        Ok(())
    }

    // revocation by identity token is not supported for GCP
    fn authorize_revoke(&self, _token: &str) -> Result<(), ProvisionerError> {
        Err(ProvisionerError::RevocationDisabled(self.id()))
    }

    async fn token_fingerprint(&self, token: &str) -> Result<String, ProvisionerError> {
        self.token_fingerprint_at(token, Utc::now()).await
    }
}
