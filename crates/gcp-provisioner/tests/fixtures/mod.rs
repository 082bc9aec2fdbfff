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

mod keys;

use chrono::{DateTime, TimeDelta, Utc};
use gcp_provisioner::{ComputeEngineClaims, GCP_ISSUER, GoogleClaims, IdentityClaims};
use jsonwebtoken as jst;
pub use keys::*;

pub const SERVICE_ACCOUNT: &str = "foo@developer.gserviceaccount.com";

/// Mints an identity token shaped like the ones the metadata service returns.
/// Defaults describe a healthy instance signed with the published key.
#[derive(Clone, Debug)]
pub struct TokenBuilder {
    pub sub: String,
    pub iss: String,
    pub aud: String,
    pub instance_id: String,
    pub instance_name: String,
    pub project_id: String,
    pub zone: String,
    pub issued_at: DateTime<Utc>,
    pub kid: String,
    pub key_pem: &'static str,
}

impl TokenBuilder {
    pub fn new(aud: &str, issued_at: DateTime<Utc>) -> TokenBuilder {
        TokenBuilder {
            sub: SERVICE_ACCOUNT.to_string(),
            iss: GCP_ISSUER.to_string(),
            aud: aud.to_string(),
            instance_id: "instance-id".to_string(),
            instance_name: "instance-name".to_string(),
            project_id: "project-id".to_string(),
            zone: "zone".to_string(),
            issued_at,
            kid: KNOWN_KID.to_string(),
            key_pem: KNOWN_KEY_PEM,
        }
    }

    pub fn sign(&self) -> String {
        let iat = self.issued_at.timestamp();
        let claims = IdentityClaims {
            iss: self.iss.clone(),
            aud: vec![self.aud.clone()],
            sub: self.sub.clone(),
            exp: (self.issued_at + TimeDelta::minutes(5)).timestamp(),
            nbf: Some(iat),
            iat: Some(iat),
            azp: Some(self.sub.clone()),
            email: Some(self.sub.clone()),
            email_verified: true,
            google: GoogleClaims {
                compute_engine: ComputeEngineClaims {
                    instance_id: self.instance_id.clone(),
                    instance_name: self.instance_name.clone(),
                    instance_creation_timestamp: Some(iat),
                    project_id: self.project_id.clone(),
                    project_number: Some(1234567890),
                    zone: self.zone.clone(),
                    license_id: vec![],
                },
            },
        };

        let mut header = jst::Header::new(jst::Algorithm::RS256);
        header.kid = Some(self.kid.clone());
        let key = jst::EncodingKey::from_rsa_pem(self.key_pem.as_bytes())
            .expect("fixture key should parse");

        jst::encode(&header, &claims, &key).expect("fixture token should sign")
    }
}
