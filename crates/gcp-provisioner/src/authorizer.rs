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

use chrono::{DateTime, TimeDelta, Utc};

use crate::claimer::Claimer;
use crate::config::GcpConfig;
use crate::constraints::{ExtendedKeyUsage, IssuanceConstraint, KeyUsage, ProvisionerExtension};
use crate::verifier::{ComputeEngineClaims, IdentityClaims};
use crate::{InstanceField, ProvisionerError, ProvisionerType};

/// Applies the provisioner's policy to verified claims and returns the
/// constraints for the certificate about to be issued.
///
/// Checks run in order and the first failure is returned: service account,
/// project, instance age, then presence of the instance fields.
pub fn authorize(
    claims: &IdentityClaims,
    config: &GcpConfig,
    claimer: &Claimer,
    now: DateTime<Utc>,
) -> Result<Vec<IssuanceConstraint>, ProvisionerError> {
    let ce = &claims.google.compute_engine;

    if !config.service_accounts.is_empty()
        && !config
            .service_accounts
            .iter()
            .any(|service_account| is_token_service_account(claims, service_account))
    {
        return Err(ProvisionerError::ServiceAccountNotAllowed(
            claims.sub.clone(),
        ));
    }

    if !config.project_ids.is_empty() && !config.project_ids.contains(&ce.project_id) {
        return Err(ProvisionerError::ProjectNotAllowed(ce.project_id.clone()));
    }

    if config.instance_age > TimeDelta::zero() {
        check_instance_age(claims, config.instance_age, now)?;
    }

    for (field, value) in [
        (InstanceField::InstanceId, &ce.instance_id),
        (InstanceField::InstanceName, &ce.instance_name),
        (InstanceField::ProjectId, &ce.project_id),
        (InstanceField::Zone, &ce.zone),
    ] {
        if value.is_empty() {
            return Err(ProvisionerError::MissingInstanceField(field));
        }
    }

    let dns_names = internal_dns_names(ce);
    let mut constraints = vec![
        IssuanceConstraint::DefaultSans {
            common_name: ce.instance_name.clone(),
            dns_names: dns_names.clone(),
        },
        IssuanceConstraint::LeafProfile {
            key_usage: vec![KeyUsage::DigitalSignature, KeyUsage::KeyEncipherment],
            extended_key_usage: vec![ExtendedKeyUsage::ServerAuth, ExtendedKeyUsage::ClientAuth],
            provisioner: ProvisionerExtension {
                provisioner_type: ProvisionerType::Gcp,
                name: config.name.clone(),
                credential_id: claims.sub.clone(),
                key_value_pairs: vec![
                    ("InstanceID".to_string(), ce.instance_id.clone()),
                    ("InstanceName".to_string(), ce.instance_name.clone()),
                ],
            },
        },
        IssuanceConstraint::Validity {
            default: claimer.default_tls_cert_duration(),
            min: claimer.min_tls_cert_duration(),
            max: claimer.max_tls_cert_duration(),
        },
    ];

    if config.disable_custom_sans {
        constraints.push(IssuanceConstraint::EnforceCommonName(
            ce.instance_name.clone(),
        ));
        constraints.push(IssuanceConstraint::EnforceDnsNames(dns_names));
    }

    Ok(constraints)
}

// the email only counts once Google has verified it
fn is_token_service_account(claims: &IdentityClaims, service_account: &str) -> bool {
    claims.sub == service_account
        || (claims.email_verified && claims.email.as_deref() == Some(service_account))
}

// Age is measured from the instance creation timestamp, falling back to the
// token's issued-at time. The bound is exclusive.
fn check_instance_age(
    claims: &IdentityClaims,
    max_age: TimeDelta,
    now: DateTime<Utc>,
) -> Result<(), ProvisionerError> {
    let reference = claims
        .google
        .compute_engine
        .instance_creation_timestamp
        .or(claims.iat)
        .ok_or_else(|| {
            ProvisionerError::MalformedToken(
                "token has neither instance_creation_timestamp nor iat".to_string(),
            )
        })?;

    let age_secs = now.timestamp().saturating_sub(reference);
    let max_secs = max_age.num_seconds();
    if age_secs >= max_secs {
        return Err(ProvisionerError::InstanceTooOld { age_secs, max_secs });
    }
    Ok(())
}

fn internal_dns_names(ce: &ComputeEngineClaims) -> Vec<String> {
    vec![
        format!("{}.c.{}.internal", ce.instance_name, ce.project_id),
        format!(
            "{}.{}.c.{}.internal",
            ce.instance_name, ce.zone, ce.project_id
        ),
    ]
}
