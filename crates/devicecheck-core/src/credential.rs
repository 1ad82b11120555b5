//! Provider credentials for the DeviceCheck API
//!
//! Every request to Apple carries `Authorization: Bearer <jwt>` where the JWT
//! is signed with the team's ES256 key:
//!
//! - header: `{"alg": "ES256", "typ": "JWT", "kid": <key_id>}`
//! - claims: `{"iss": <team_id>, "sub": <bundle_id>, "iat": <now>, "exp": <now + lifetime>}`
//!
//! Apple rejects tokens older than twenty minutes, so the minter keeps a
//! single cached credential and replaces it shortly before it lapses.

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{Algorithm, Header};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};

use crate::error::{DeviceCheckError, Result};
use crate::keys::KeyMaterial;

/// Signing algorithm required by Apple
pub const CREDENTIAL_ALGORITHM: Algorithm = Algorithm::ES256;

/// Longest lifetime Apple accepts for a provider token
pub fn max_credential_lifetime() -> Duration {
    Duration::minutes(20)
}

/// Default lifetime of a minted credential
pub fn default_credential_lifetime() -> Duration {
    max_credential_lifetime()
}

/// Credentials are treated as expired this long before `exp`
pub fn default_refresh_margin() -> Duration {
    Duration::seconds(60)
}

/// Claims carried by a provider credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialClaims {
    /// Team identifier
    pub iss: String,
    /// Bundle identifier of the app
    pub sub: String,
    /// Issued at (epoch seconds)
    pub iat: i64,
    /// Expiry (epoch seconds)
    pub exp: i64,
}

/// A signed provider token
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    algorithm: Algorithm,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"[redacted]")
            .field("algorithm", &self.algorithm)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl Credential {
    /// The compact JWT
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Signing algorithm (always ES256)
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// When the credential was issued
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// When the credential expires
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Value for the `Authorization` header
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }

    /// Whether the credential can still be sent at `now`, keeping `margin` in reserve
    pub fn is_fresh_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        now + margin < self.expires_at
    }
}

/// Mints and caches provider credentials
///
/// Holds exactly one credential. The expiry check and the replacement happen
/// under one lock, so concurrent callers see either the previous credential
/// or the new one.
pub struct CredentialMinter {
    key: KeyMaterial,
    bundle_id: String,
    lifetime: Duration,
    refresh_margin: Duration,
    cached: Mutex<Option<Credential>>,
}

impl std::fmt::Debug for CredentialMinter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialMinter")
            .field("key", &self.key)
            .field("bundle_id", &self.bundle_id)
            .field("lifetime", &self.lifetime)
            .field("refresh_margin", &self.refresh_margin)
            .finish()
    }
}

impl CredentialMinter {
    /// Create a minter for `bundle_id` with the default lifetime and refresh margin
    pub fn new(key: KeyMaterial, bundle_id: impl Into<String>) -> Self {
        Self {
            key,
            bundle_id: bundle_id.into(),
            lifetime: default_credential_lifetime(),
            refresh_margin: default_refresh_margin(),
            cached: Mutex::new(None),
        }
    }

    /// Override lifetime and refresh margin
    ///
    /// The lifetime must exceed the margin and must not exceed twenty minutes.
    pub fn with_lifetime(mut self, lifetime: Duration, refresh_margin: Duration) -> Result<Self> {
        if refresh_margin < Duration::zero() {
            return Err(DeviceCheckError::Config(
                "refresh margin must not be negative".into(),
            ));
        }
        if lifetime <= refresh_margin {
            return Err(DeviceCheckError::Config(format!(
                "credential lifetime ({}s) must exceed the refresh margin ({}s)",
                lifetime.num_seconds(),
                refresh_margin.num_seconds()
            )));
        }
        if lifetime > max_credential_lifetime() {
            return Err(DeviceCheckError::Config(format!(
                "credential lifetime is limited to {} seconds",
                max_credential_lifetime().num_seconds()
            )));
        }
        self.lifetime = lifetime;
        self.refresh_margin = refresh_margin;
        Ok(self)
    }

    /// Key material used for signing
    pub fn key(&self) -> &KeyMaterial {
        &self.key
    }

    /// Bundle identifier (the `sub` claim)
    pub fn bundle_id(&self) -> &str {
        &self.bundle_id
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    pub fn refresh_margin(&self) -> Duration {
        self.refresh_margin
    }

    /// Current credential, minting a new one if needed
    pub fn credential(&self) -> Result<Credential> {
        self.credential_at(Utc::now())
    }

    /// Current credential as of `now`
    pub fn credential_at(&self, now: DateTime<Utc>) -> Result<Credential> {
        let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(credential) = cached.as_ref() {
            if credential.is_fresh_at(now, self.refresh_margin) {
                debug!(
                    remaining_secs = (credential.expires_at - now).num_seconds(),
                    "Using cached credential"
                );
                return Ok(credential.clone());
            }
        }

        let fresh = self.mint(now)?;
        *cached = Some(fresh.clone());
        Ok(fresh)
    }

    /// Mint a new credential regardless of the cached one
    pub fn force_refresh(&self) -> Result<Credential> {
        self.force_refresh_at(Utc::now())
    }

    pub fn force_refresh_at(&self, now: DateTime<Utc>) -> Result<Credential> {
        let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        let fresh = self.mint(now)?;
        *cached = Some(fresh.clone());
        Ok(fresh)
    }

    fn mint(&self, now: DateTime<Utc>) -> Result<Credential> {
        // Whole seconds, so the cached timestamps match the signed claims
        let issued_at = Utc
            .timestamp_opt(now.timestamp(), 0)
            .single()
            .ok_or_else(|| DeviceCheckError::Config(format!("invalid timestamp: {}", now)))?;
        let expires_at = issued_at + self.lifetime;

        let claims = CredentialClaims {
            iss: self.key.team_id().to_string(),
            sub: self.bundle_id.clone(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };

        let mut header = Header::new(CREDENTIAL_ALGORITHM);
        header.kid = Some(self.key.key_id().to_string());

        let token = jsonwebtoken::encode(&header, &claims, self.key.encoding_key())?;

        info!(
            kid = %self.key.key_id(),
            iss = %claims.iss,
            sub = %claims.sub,
            exp = %expires_at,
            "Minted DeviceCheck credential"
        );

        Ok(Credential {
            token,
            algorithm: CREDENTIAL_ALGORITHM,
            issued_at,
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{decode, decode_header, DecodingKey, Validation};

    const TEST_KEY: &str = include_str!("../tests/fixtures/AuthKey_TESTKEY01.p8");
    const TEST_PUBLIC_KEY: &str = include_str!("../tests/fixtures/AuthKey_TESTKEY01.pub.pem");

    fn minter() -> CredentialMinter {
        let key = KeyMaterial::from_pem("XX7AN23E0Z", "TESTKEY01", TEST_KEY.as_bytes()).unwrap();
        CredentialMinter::new(key, "com.example.app")
    }

    fn decode_claims(token: &str) -> CredentialClaims {
        let key = DecodingKey::from_ec_pem(TEST_PUBLIC_KEY.as_bytes()).unwrap();
        let mut validation = Validation::new(Algorithm::ES256);
        validation.validate_exp = false;
        decode::<CredentialClaims>(token, &key, &validation).unwrap().claims
    }

    #[test]
    fn test_credential_header_and_claims() {
        let minter = minter();
        let credential = minter.credential().unwrap();

        let header = decode_header(credential.token()).unwrap();
        assert_eq!(header.alg, Algorithm::ES256);
        assert_eq!(header.kid.as_deref(), Some("TESTKEY01"));
        assert_eq!(header.typ.as_deref(), Some("JWT"));

        let claims = decode_claims(credential.token());
        assert_eq!(claims.iss, "XX7AN23E0Z");
        assert_eq!(claims.sub, "com.example.app");
        assert_eq!(claims.iat, credential.issued_at().timestamp());
        assert_eq!(claims.exp, credential.expires_at().timestamp());
        assert_eq!(claims.exp - claims.iat, 20 * 60);
    }

    #[test]
    fn test_cached_within_margin() {
        let minter = minter();
        let now = Utc::now();

        let first = minter.credential_at(now).unwrap();
        let second = minter.credential_at(now + Duration::minutes(10)).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_regenerated_inside_margin() {
        let minter = minter();
        let now = Utc::now();

        let first = minter.credential_at(now).unwrap();
        // 30s before exp is inside the 60s margin
        let later = now + Duration::minutes(20) - Duration::seconds(30);
        let second = minter.credential_at(later).unwrap();

        assert_ne!(first.token(), second.token());
        assert!(second.issued_at() > first.issued_at());
    }

    #[test]
    fn test_regenerated_after_expiry() {
        let minter = minter();
        let now = Utc::now();

        let first = minter.credential_at(now).unwrap();
        let second = minter.credential_at(now + Duration::minutes(25)).unwrap();

        assert_ne!(first.token(), second.token());
        assert!(second.issued_at() > first.issued_at());

        // The replacement is cached in turn
        let third = minter.credential_at(now + Duration::minutes(26)).unwrap();
        assert_eq!(second, third);
    }

    #[test]
    fn test_force_refresh() {
        let minter = minter();
        let first = minter.credential().unwrap();
        let second = minter.force_refresh().unwrap();

        // ECDSA signatures are randomized, so even the same second yields a new token
        assert_ne!(first.token(), second.token());
        assert_eq!(minter.credential().unwrap(), second);
    }

    #[test]
    fn test_lifetime_limits() {
        let lifetime = Duration::minutes(21);
        assert!(matches!(
            minter().with_lifetime(lifetime, default_refresh_margin()),
            Err(DeviceCheckError::Config(_))
        ));

        assert!(matches!(
            minter().with_lifetime(Duration::seconds(30), Duration::seconds(60)),
            Err(DeviceCheckError::Config(_))
        ));

        let minter = minter()
            .with_lifetime(Duration::seconds(500), Duration::seconds(30))
            .unwrap();
        let credential = minter.credential().unwrap();
        assert_eq!(
            (credential.expires_at() - credential.issued_at()).num_seconds(),
            500
        );
    }

    #[test]
    fn test_concurrent_callers_share_credential() {
        let minter = std::sync::Arc::new(minter());
        let now = Utc::now();
        minter.credential_at(now).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let minter = minter.clone();
                std::thread::spawn(move || minter.credential_at(now).unwrap())
            })
            .collect();

        let tokens: Vec<_> = handles
            .into_iter()
            .map(|h| h.join().unwrap().token().to_string())
            .collect();
        assert!(tokens.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_bearer_and_debug() {
        let credential = minter().credential().unwrap();
        assert!(credential.bearer().starts_with("Bearer ey"));
        assert!(!format!("{:?}", credential).contains(credential.token()));
    }
}
