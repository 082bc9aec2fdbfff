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
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken as jst;
use reqwest::header::{CACHE_CONTROL, HeaderMap};

use crate::config::Endpoints;
use crate::{HttpFailure, ProvisionerError};

// used when the key set response carries no Cache-Control max-age
const DEFAULT_KEY_SET_MAX_AGE_SECS: i64 = 12 * 60 * 60;
// longer max-age values are capped to this
const MAX_KEY_SET_MAX_AGE_SECS: i64 = 24 * 60 * 60;
// how long a failed refresh keeps the previous set before trying again
const KEY_SET_RETRY_INTERVAL_SECS: i64 = 60;

#[derive(Debug, serde::Deserialize)]
struct Jwk {
    kty: String,
    kid: String,
    #[serde(default)]
    alg: Option<String>,
    n: Option<String>,
    e: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

pub trait KeyStore: Send + Sync {
    fn find_key(&self, kid: &str) -> Option<Arc<jst::DecodingKey>>;
}

/// An immutable snapshot of the published verification keys.
#[derive(Clone)]
pub struct KeySet {
    keys: stdcol::HashMap<String, Arc<jst::DecodingKey>>,
    expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for KeySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySet")
            .field("kids", &self.keys.keys().collect::<Vec<_>>())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl KeySet {
    /// Parses a JWK set document. RSA keys are kept, other key types are
    /// skipped; a document without a single usable key is malformed.
    pub fn from_jwks(document: &str, expires_at: DateTime<Utc>) -> Result<KeySet, HttpFailure> {
        let jwks: Jwks = serde_json::from_str(document)
            .map_err(|e| HttpFailure::Malformed(format!("Error parsing JWKS: {}", e)))?;

        let mut decoding_keys = stdcol::HashMap::<String, Arc<jst::DecodingKey>>::new();

        for jwk in jwks.keys.iter() {
            if jwk.kty != "RSA" {
                tracing::debug!(kid = %jwk.kid, kty = %jwk.kty, "Skipping non-RSA key");
                continue;
            }
            if jwk.alg.as_deref().is_some_and(|alg| alg != "RS256") {
                tracing::debug!(kid = %jwk.kid, alg = ?jwk.alg, "Skipping non-RS256 key");
                continue;
            }

            let n = jwk.n.as_ref().ok_or_else(|| {
                HttpFailure::Malformed(format!("Didn't find modulus of RSA key {}", jwk.kid))
            })?;
            let e = jwk.e.as_ref().ok_or_else(|| {
                HttpFailure::Malformed(format!("Didn't find exponent of RSA key {}", jwk.kid))
            })?;
            let decoding_key = jst::DecodingKey::from_rsa_components(n, e).map_err(|e| {
                HttpFailure::Malformed(format!(
                    "Error creating DecodingKey from RSA components of {}: {}",
                    jwk.kid, e
                ))
            })?;

            if decoding_keys
                .insert(jwk.kid.clone(), Arc::new(decoding_key))
                .is_some()
            {
                return Err(HttpFailure::Malformed(format!(
                    "Duplicate kid {} in JWKS",
                    jwk.kid
                )));
            }
        }

        if decoding_keys.is_empty() {
            return Err(HttpFailure::Malformed(
                "JWKS contains no usable RSA keys".to_string(),
            ));
        }

        Ok(KeySet {
            keys: decoding_keys,
            expires_at,
        })
    }

    pub fn find(&self, kid: &str) -> Option<&Arc<jst::DecodingKey>> {
        self.keys.get(kid)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    fn with_expiry(&self, expires_at: DateTime<Utc>) -> KeySet {
        KeySet {
            keys: self.keys.clone(),
            expires_at,
        }
    }
}

/// Google's signing keys, fetched from the certs endpoint.
///
/// Lookups read the currently installed [`KeySet`] without locking. A refresh
/// builds a complete new set and swaps it in, so a concurrent lookup sees
/// either the old set or the new one.
#[derive(Debug)]
pub struct JwksKeyStore {
    certs_url: String,
    http_client: reqwest::Client,
    current: ArcSwap<KeySet>,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl KeyStore for JwksKeyStore {
    fn find_key(&self, kid: &str) -> Option<Arc<jst::DecodingKey>> {
        self.current.load().find(kid).cloned()
    }
}

impl JwksKeyStore {
    /// Performs the initial fetch. Any failure here is fatal.
    pub async fn new_with_config(endpoints: &Endpoints) -> Result<JwksKeyStore, ProvisionerError> {
        let http_client = reqwest::Client::builder()
            .timeout(endpoints.http_timeout)
            .build()
            .map_err(|e| ProvisionerError::KeySetFetchFailed(e.into()))?;

        let key_set = fetch_key_set(&http_client, &endpoints.certs_url, Utc::now())
            .await
            .map_err(ProvisionerError::KeySetFetchFailed)?;

        tracing::info!(
            url = %endpoints.certs_url,
            keys = key_set.len(),
            expires_at = %key_set.expires_at(),
            "Installed GCP key set"
        );

        Ok(JwksKeyStore {
            certs_url: endpoints.certs_url.clone(),
            http_client,
            current: ArcSwap::from_pointee(key_set),
            refresh_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn snapshot(&self) -> Arc<KeySet> {
        self.current.load_full()
    }

    /// Fetches and installs a new key set, regardless of the current one's age.
    pub async fn refresh(&self, now: DateTime<Utc>) -> Result<(), ProvisionerError> {
        let _guard = self.refresh_lock.lock().await;
        self.fetch_and_install(now)
            .await
            .map_err(ProvisionerError::KeySetFetchFailed)
    }

    /// Refreshes the key set if it has expired. Concurrent callers wait for a
    /// single refresh. On failure the previous set stays installed and the
    /// next attempt is deferred by a short retry interval.
    pub async fn refresh_if_stale(&self, now: DateTime<Utc>) {
        if !self.current.load().is_stale(now) {
            return;
        }

        let _guard = self.refresh_lock.lock().await;
        // another caller may have refreshed while we waited
        if !self.current.load().is_stale(now) {
            return;
        }

        if let Err(err) = self.fetch_and_install(now).await {
            let previous = self.current.load_full();
            tracing::warn!(
                error = %err,
                url = %self.certs_url,
                "Failed to refresh GCP key set, keeping {} previously fetched keys",
                previous.len()
            );
            let retry_at = expiry_after(now, TimeDelta::seconds(KEY_SET_RETRY_INTERVAL_SECS));
            self.current.store(Arc::new(previous.with_expiry(retry_at)));
        }
    }

    async fn fetch_and_install(&self, now: DateTime<Utc>) -> Result<(), HttpFailure> {
        let key_set = fetch_key_set(&self.http_client, &self.certs_url, now).await?;
        tracing::info!(
            url = %self.certs_url,
            keys = key_set.len(),
            expires_at = %key_set.expires_at(),
            "Installed GCP key set"
        );
        self.current.store(Arc::new(key_set));
        Ok(())
    }
}

async fn fetch_key_set(
    http_client: &reqwest::Client,
    certs_url: &str,
    now: DateTime<Utc>,
) -> Result<KeySet, HttpFailure> {
    let jwks_response = http_client.get(certs_url).send().await?;

    let status_code = jwks_response.status();
    let max_age = cache_max_age(jwks_response.headers())
        .unwrap_or(TimeDelta::seconds(DEFAULT_KEY_SET_MAX_AGE_SECS));
    let response_text = jwks_response.text().await?;

    if status_code != reqwest::StatusCode::OK {
        return Err(HttpFailure::Status {
            status: status_code.as_u16(),
            body: response_text,
        });
    }

    KeySet::from_jwks(&response_text, expiry_after(now, max_age))
}

// `now + lifetime`, saturating at `now` when the sum leaves chrono's range
fn expiry_after(now: DateTime<Utc>, lifetime: TimeDelta) -> DateTime<Utc> {
    let fallback = TimeDelta::seconds(DEFAULT_KEY_SET_MAX_AGE_SECS);
    now.checked_add_signed(lifetime)
        .or_else(|| now.checked_add_signed(fallback))
        .unwrap_or(now)
}

fn cache_max_age(headers: &HeaderMap) -> Option<TimeDelta> {
    let cache_control = headers.get(CACHE_CONTROL)?.to_str().ok()?;
    cache_control.split(',').find_map(|directive| {
        let max_age = directive.trim().strip_prefix("max-age=")?;
        let secs = max_age.parse::<i64>().ok()?;
        TimeDelta::try_seconds(secs.clamp(0, MAX_KEY_SET_MAX_AGE_SECS))
    })
}
