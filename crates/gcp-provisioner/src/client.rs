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

use url::form_urlencoded;

use crate::config::Endpoints;
use crate::{HttpFailure, ProvisionerError};

const SIGN_PATH: &str = "/1.0/sign";
const METADATA_FLAVOR_HEADER: &str = "Metadata-Flavor";
const METADATA_FLAVOR: &str = "Google";

/// Provisioner ids contain '/', which is encoded before it is used as an
/// audience fragment.
pub(crate) fn encode_provisioner_id(provisioner_id: &str) -> String {
    form_urlencoded::byte_serialize(provisioner_id.as_bytes()).collect()
}

/// Fetches identity tokens from the GCE metadata service. Runs on the
/// instance, never on the CA.
#[derive(Clone, Debug)]
pub struct IdentityTokenClient {
    provisioner_id: String,
    identity_url: String,
    http_client: reqwest::Client,
}

impl IdentityTokenClient {
    pub fn new_with_config(
        provisioner_id: impl Into<String>,
        endpoints: &Endpoints,
    ) -> Result<IdentityTokenClient, ProvisionerError> {
        let http_client = reqwest::Client::builder()
            .timeout(endpoints.http_timeout)
            .build()
            .map_err(|e| ProvisionerError::RequestFailed(e.into()))?;

        Ok(IdentityTokenClient {
            provisioner_id: provisioner_id.into(),
            identity_url: endpoints.identity_url.clone(),
            http_client,
        })
    }

    /// The metadata-service URL requesting a full-format token for `audience`.
    pub fn identity_url(&self, audience: &str) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("audience", audience)
            .append_pair("format", "full")
            .append_pair("licenses", "FALSE")
            .finish();
        format!("{}?{}", self.identity_url, query)
    }

    /// The audience a CA at `ca_url` expects for this provisioner,
    /// `<ca_url>/1.0/sign#<encoded provisioner id>`.
    pub fn sign_audience(&self, ca_url: &str) -> Result<String, ProvisionerError> {
        let invalid = |reason: String| ProvisionerError::InvalidCaUrl {
            url: ca_url.to_string(),
            reason,
        };

        let base = url::Url::parse(ca_url).map_err(|e| invalid(e.to_string()))?;
        let mut audience = base.join(SIGN_PATH).map_err(|e| invalid(e.to_string()))?;
        audience.set_fragment(Some(&encode_provisioner_id(&self.provisioner_id)));
        Ok(audience.to_string())
    }

    /// Requests a token for the CA at `ca_url`. The token is returned as
    /// received; the CA verifies it.
    pub async fn request_token(
        &self,
        _subject: &str,
        ca_url: &str,
    ) -> Result<String, ProvisionerError> {
        let audience = self.sign_audience(ca_url)?;

        let identity_response = self
            .http_client
            .get(self.identity_url(&audience))
            .header(METADATA_FLAVOR_HEADER, METADATA_FLAVOR)
            .send()
            .await
            .map_err(|e| ProvisionerError::RequestFailed(e.into()))?;

        let status_code = identity_response.status();
        let response_text = identity_response
            .text()
            .await
            .map_err(|e| ProvisionerError::RequestFailed(e.into()))?;

        if status_code != reqwest::StatusCode::OK {
            return Err(ProvisionerError::RequestFailed(HttpFailure::Status {
                status: status_code.as_u16(),
                body: response_text,
            }));
        }

        Ok(response_text.trim().to_string())
    }
}
