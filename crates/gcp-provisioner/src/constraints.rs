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

use serde::Serialize;

use crate::ProvisionerType;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum KeyUsage {
    DigitalSignature,
    KeyEncipherment,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ExtendedKeyUsage {
    ServerAuth,
    ClientAuth,
}

/// Records which provisioner authorized a certificate and for which credential.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProvisionerExtension {
    pub provisioner_type: ProvisionerType,
    pub name: String,
    pub credential_id: String,
    pub key_value_pairs: Vec<(String, String)>,
}

/// Shapes or restricts the certificate the signing pipeline is about to issue.
/// Returned in a fixed order by [`crate::authorize`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum IssuanceConstraint {
    /// SANs used when the request does not supply its own.
    DefaultSans {
        common_name: String,
        dns_names: Vec<String>,
    },
    LeafProfile {
        key_usage: Vec<KeyUsage>,
        extended_key_usage: Vec<ExtendedKeyUsage>,
        provisioner: ProvisionerExtension,
    },
    Validity {
        default: Duration,
        min: Duration,
        max: Duration,
    },
    /// The certificate common name must equal this value.
    EnforceCommonName(String),
    /// The certificate DNS SANs must be a subset of these names.
    EnforceDnsNames(Vec<String>),
}
