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

use sha2::{Digest, Sha256};

use crate::config::GcpConfig;
use crate::verifier::IdentityClaims;

/// Lowercase hex SHA-256 identifying a verified token for replay detection.
///
/// With trust-on-first-use the digest covers `<provisioner id>.<instance id>`,
/// so every token of one instance maps to the same value. Otherwise it covers
/// the raw token.
pub fn token_fingerprint(config: &GcpConfig, claims: &IdentityClaims, token: &str) -> String {
    let mut hasher = Sha256::new();
    if config.disable_trust_on_first_use {
        hasher.update(token.as_bytes());
    } else {
        hasher.update(config.provisioner_id().as_bytes());
        hasher.update(b".");
        hasher.update(claims.google.compute_engine.instance_id.as_bytes());
    }
    hex::encode(hasher.finalize())
}
