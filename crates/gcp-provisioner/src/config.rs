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

use std::time::Duration;

use chrono::TimeDelta;
use duration_str::deserialize_duration;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::claimer::Claims;
use crate::client::encode_provisioner_id;
use crate::{ProvisionerError, ProvisionerType};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
/// Configuration of a single GCP provisioner, as registered with the CA.
pub struct GcpConfig {
    #[serde(rename = "type", default = "Defaults::provisioner_type")]
    pub provisioner_type: String,
    pub name: String,
    /// Accepted service accounts. Empty accepts any.
    #[serde(default)]
    pub service_accounts: Vec<String>,
    /// Accepted project ids. Empty accepts any.
    #[serde(default)]
    pub project_ids: Vec<String>,
    #[serde(default)]
    pub disable_custom_sans: bool,
    #[serde(default)]
    pub disable_trust_on_first_use: bool,
    /// Maximum instance age for a sign request. Zero means unbounded.
    #[serde(
        default,
        serialize_with = "serialize_signed_duration",
        deserialize_with = "deserialize_signed_duration"
    )]
    pub instance_age: TimeDelta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claims: Option<Claims>,
    #[serde(default)]
    pub endpoints: Endpoints,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Endpoints {
    #[serde(default = "Defaults::certs_url")]
    pub certs_url: String,
    #[serde(default = "Defaults::identity_url")]
    pub identity_url: String,
    #[serde(
        default = "Defaults::http_timeout",
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub http_timeout: Duration,
}

/// CA-wide settings every provisioner is initialized against.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GlobalConfig {
    #[serde(default = "Defaults::global_claims")]
    pub claims: Claims,
    /// The CA's sign endpoints, e.g. `https://ca.example.com/1.0/sign`.
    #[serde(default)]
    pub audiences: Vec<String>,
}

impl Default for GcpConfig {
    fn default() -> GcpConfig {
        GcpConfig {
            provisioner_type: Defaults::provisioner_type(),
            name: Default::default(),
            service_accounts: Default::default(),
            project_ids: Default::default(),
            disable_custom_sans: false,
            disable_trust_on_first_use: false,
            instance_age: TimeDelta::zero(),
            claims: None,
            endpoints: Default::default(),
        }
    }
}

impl Default for Endpoints {
    fn default() -> Endpoints {
        Endpoints {
            certs_url: Defaults::certs_url(),
            identity_url: Defaults::identity_url(),
            http_timeout: Defaults::http_timeout(),
        }
    }
}

impl Default for GlobalConfig {
    fn default() -> GlobalConfig {
        GlobalConfig {
            claims: Defaults::global_claims(),
            audiences: Default::default(),
        }
    }
}

impl GcpConfig {
    /// The CA-wide identifier of this provisioner, `gcp/<name>`.
    pub fn provisioner_id(&self) -> String {
        format!("{}/{}", ProvisionerType::Gcp.id_prefix(), self.name)
    }

    pub fn validate(&self) -> Result<(), ProvisionerError> {
        if !self
            .provisioner_type
            .eq_ignore_ascii_case(ProvisionerType::Gcp.as_str())
        {
            return Err(ProvisionerError::InvalidConfiguration(format!(
                "provisioner type must be {}, got '{}'",
                ProvisionerType::Gcp,
                self.provisioner_type
            )));
        }
        if self.name.is_empty() {
            return Err(ProvisionerError::InvalidConfiguration(
                "provisioner name cannot be empty".to_string(),
            ));
        }
        if self.instance_age < TimeDelta::zero() {
            return Err(ProvisionerError::InvalidConfiguration(format!(
                "instance_age cannot be negative, got {}s",
                self.instance_age.num_seconds()
            )));
        }
        Ok(())
    }
}

impl GlobalConfig {
    pub fn validate(&self) -> Result<(), ProvisionerError> {
        if self.audiences.is_empty() {
            return Err(ProvisionerError::InvalidConfiguration(
                "at least one sign audience is required".to_string(),
            ));
        }
        Ok(())
    }

    /// Audiences a token must name to be accepted by the given provisioner:
    /// each sign audience with the encoded provisioner id as fragment.
    pub fn expected_audiences(&self, provisioner_id: &str) -> Vec<String> {
        let fragment = encode_provisioner_id(provisioner_id);
        self.audiences
            .iter()
            .map(|audience| format!("{audience}#{fragment}"))
            .collect()
    }
}

pub struct Defaults;

impl Defaults {
    pub fn provisioner_type() -> String {
        ProvisionerType::Gcp.as_str().to_string()
    }

    pub fn certs_url() -> String {
        "https://www.googleapis.com/oauth2/v3/certs".to_string()
    }

    pub fn identity_url() -> String {
        "http://metadata/computeMetadata/v1/instance/service-accounts/default/identity".to_string()
    }

    pub fn http_timeout() -> Duration {
        Duration::from_secs(10)
    }

    pub fn global_claims() -> Claims {
        Claims {
            min_tls_cert_duration: Some(Duration::from_secs(5 * 60)),
            max_tls_cert_duration: Some(Duration::from_secs(24 * 60 * 60)),
            default_tls_cert_duration: Some(Duration::from_secs(24 * 60 * 60)),
            disable_renewal: Some(false),
        }
    }
}

pub(crate) fn serialize_duration<S>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format!("{}s", d.as_secs()))
}

pub(crate) fn serialize_option_duration<S>(
    d: &Option<Duration>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match d {
        Some(d) => serialize_duration(d, serializer),
        None => serializer.serialize_none(),
    }
}

fn serialize_signed_duration<S>(d: &TimeDelta, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format!("{}s", d.num_seconds()))
}

// duration_str only understands unsigned durations, so a leading '-' is
// split off here. Negative values must parse so validate() can reject them.
fn deserialize_signed_duration<'de, D>(deserializer: D) -> Result<TimeDelta, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    let s = s.trim();
    let (negative, magnitude) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let duration = duration_str::parse(magnitude).map_err(serde::de::Error::custom)?;
    let delta = TimeDelta::from_std(duration).map_err(serde::de::Error::custom)?;
    Ok(if negative { -delta } else { delta })
}
