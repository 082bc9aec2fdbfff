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

use duration_str::deserialize_option_duration;
use serde::{Deserialize, Serialize};

use crate::ProvisionerError;
use crate::config::serialize_option_duration;

/// Certificate duration and renewal settings. Every field is optional so a
/// provisioner only overrides what it needs to.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_option_duration",
        deserialize_with = "deserialize_option_duration"
    )]
    pub min_tls_cert_duration: Option<Duration>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_option_duration",
        deserialize_with = "deserialize_option_duration"
    )]
    pub max_tls_cert_duration: Option<Duration>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_option_duration",
        deserialize_with = "deserialize_option_duration"
    )]
    pub default_tls_cert_duration: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_renewal: Option<bool>,
}

/// Provisioner claims merged over the CA-wide claims.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Claimer {
    min_tls_cert_duration: Duration,
    max_tls_cert_duration: Duration,
    default_tls_cert_duration: Duration,
    disable_renewal: bool,
}

impl Claimer {
    pub fn new(claims: Option<&Claims>, global: &Claims) -> Result<Claimer, ProvisionerError> {
        let merged = |field: fn(&Claims) -> Option<Duration>, name: &str| {
            claims
                .and_then(field)
                .or_else(|| field(global))
                .ok_or_else(|| {
                    ProvisionerError::InvalidConfiguration(format!("claims: {name} is not set"))
                })
        };

        let claimer = Claimer {
            min_tls_cert_duration: merged(|c| c.min_tls_cert_duration, "min_tls_cert_duration")?,
            max_tls_cert_duration: merged(|c| c.max_tls_cert_duration, "max_tls_cert_duration")?,
            default_tls_cert_duration: merged(
                |c| c.default_tls_cert_duration,
                "default_tls_cert_duration",
            )?,
            disable_renewal: claims
                .and_then(|c| c.disable_renewal)
                .or(global.disable_renewal)
                .unwrap_or(false),
        };
        claimer.validate()?;
        Ok(claimer)
    }

    fn validate(&self) -> Result<(), ProvisionerError> {
        let invalid = |msg: &str| Err(ProvisionerError::InvalidConfiguration(msg.to_string()));

        if self.min_tls_cert_duration.is_zero() {
            return invalid("claims: min_tls_cert_duration must be greater than 0");
        }
        if self.default_tls_cert_duration.is_zero() {
            return invalid("claims: default_tls_cert_duration must be greater than 0");
        }
        if self.max_tls_cert_duration < self.min_tls_cert_duration {
            return invalid(&format!(
                "claims: max_tls_cert_duration {:?} is shorter than min_tls_cert_duration {:?}",
                self.max_tls_cert_duration, self.min_tls_cert_duration
            ));
        }
        if self.default_tls_cert_duration < self.min_tls_cert_duration
            || self.default_tls_cert_duration > self.max_tls_cert_duration
        {
            return invalid(&format!(
                "claims: default_tls_cert_duration {:?} is outside [{:?}, {:?}]",
                self.default_tls_cert_duration,
                self.min_tls_cert_duration,
                self.max_tls_cert_duration
            ));
        }
        Ok(())
    }

    pub fn min_tls_cert_duration(&self) -> Duration {
        self.min_tls_cert_duration
    }

    pub fn max_tls_cert_duration(&self) -> Duration {
        self.max_tls_cert_duration
    }

    pub fn default_tls_cert_duration(&self) -> Duration {
        self.default_tls_cert_duration
    }

    pub fn is_renewal_disabled(&self) -> bool {
        self.disable_renewal
    }
}
