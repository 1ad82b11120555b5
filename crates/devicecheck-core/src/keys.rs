//! Private key loading
//!
//! DeviceCheck requests are authorized with an ES256 key downloaded from the
//! Apple developer portal as `AuthKey_<KEY_ID>.p8`. This module loads that key
//! from disk or from raw PEM and checks that it can actually sign before the
//! client is built.

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{DeviceCheckError, Result};

const PEM_PREFIX: &str = "-----BEGIN";

/// Where the private key comes from
#[derive(Clone, PartialEq, Eq)]
pub enum KeySource {
    /// Path to a `.p8` file
    Path(PathBuf),
    /// PEM-encoded PKCS#8 key
    Pem(Vec<u8>),
}

impl KeySource {
    /// Classify a configuration string as inline PEM or a path
    pub fn detect(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.trim_start().starts_with(PEM_PREFIX) {
            KeySource::Pem(value.into_bytes())
        } else {
            KeySource::Path(PathBuf::from(value))
        }
    }

    /// Read the PEM bytes, resolving relative paths
    pub fn read(&self) -> Result<Vec<u8>> {
        match self {
            KeySource::Pem(pem) => {
                debug!("Using inline private key");
                Ok(pem.clone())
            }
            KeySource::Path(path) => {
                let resolved = resolve_key_path(path).ok_or_else(|| {
                    DeviceCheckError::InvalidKeyMaterial(format!(
                        "private key file not found: {}",
                        path.display()
                    ))
                })?;
                debug!(path = %resolved.display(), "Reading private key file");
                Ok(std::fs::read(resolved)?)
            }
        }
    }
}

impl std::fmt::Debug for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeySource::Path(path) => f.debug_tuple("Path").field(path).finish(),
            KeySource::Pem(_) => f.debug_tuple("Pem").field(&"[redacted]").finish(),
        }
    }
}

impl From<PathBuf> for KeySource {
    fn from(path: PathBuf) -> Self {
        KeySource::Path(path)
    }
}

impl From<&Path> for KeySource {
    fn from(path: &Path) -> Self {
        KeySource::Path(path.to_path_buf())
    }
}

/// Relative paths are tried against the working directory, then next to the executable.
///
/// A path that names an existing file as given always wins, so a key in the
/// working directory shadows one shipped beside the binary.
fn resolve_key_path(path: &Path) -> Option<PathBuf> {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));
    resolve_key_path_from(path, exe_dir.as_deref())
}

fn resolve_key_path_from(path: &Path, exe_dir: Option<&Path>) -> Option<PathBuf> {
    if path.is_file() {
        return Some(path.to_path_buf());
    }
    if path.is_absolute() {
        return None;
    }
    let candidate = exe_dir?.join(path);
    candidate.is_file().then_some(candidate)
}

/// Team, key identifier and the ES256 signing key
///
/// Immutable once loaded. Only the credential minter holds one.
#[derive(Clone)]
pub struct KeyMaterial {
    team_id: String,
    key_id: String,
    encoding_key: EncodingKey,
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("team_id", &self.team_id)
            .field("key_id", &self.key_id)
            .field("encoding_key", &"[redacted]")
            .finish()
    }
}

impl KeyMaterial {
    /// Load key material from PEM bytes
    pub fn from_pem(
        team_id: impl Into<String>,
        key_id: impl Into<String>,
        pem: &[u8],
    ) -> Result<Self> {
        let team_id = team_id.into();
        let key_id = key_id.into();

        if team_id.trim().is_empty() {
            return Err(DeviceCheckError::Config("team_id must not be empty".into()));
        }
        if key_id.trim().is_empty() {
            return Err(DeviceCheckError::Config("key_id must not be empty".into()));
        }

        let encoding_key = EncodingKey::from_ec_pem(pem)?;

        // from_ec_pem only parses; a probe signature proves the key is a usable P-256 key
        jsonwebtoken::encode(
            &Header::new(Algorithm::ES256),
            &serde_json::json!({ "probe": true }),
            &encoding_key,
        )?;

        Ok(Self {
            team_id,
            key_id,
            encoding_key,
        })
    }

    /// Load key material from a `.p8` file
    pub fn from_path(
        team_id: impl Into<String>,
        key_id: impl Into<String>,
        path: impl AsRef<Path>,
    ) -> Result<Self> {
        Self::load(team_id, key_id, &KeySource::from(path.as_ref()))
    }

    /// Load key material from any source
    pub fn load(
        team_id: impl Into<String>,
        key_id: impl Into<String>,
        source: &KeySource,
    ) -> Result<Self> {
        let pem = source.read()?;
        Self::from_pem(team_id, key_id, &pem)
    }

    /// Apple developer team identifier (the `iss` claim)
    pub fn team_id(&self) -> &str {
        &self.team_id
    }

    /// Key identifier (the `kid` header)
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub(crate) fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = include_str!("../tests/fixtures/AuthKey_TESTKEY01.p8");
    const TEST_PUBLIC_KEY: &str = include_str!("../tests/fixtures/AuthKey_TESTKEY01.pub.pem");

    fn fixture_path() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/AuthKey_TESTKEY01.p8")
    }

    #[test]
    fn test_from_pem() {
        let material = KeyMaterial::from_pem("XX7AN23E0Z", "TESTKEY01", TEST_KEY.as_bytes()).unwrap();
        assert_eq!(material.team_id(), "XX7AN23E0Z");
        assert_eq!(material.key_id(), "TESTKEY01");
    }

    #[test]
    fn test_from_path() {
        let material = KeyMaterial::from_path("XX7AN23E0Z", "TESTKEY01", fixture_path()).unwrap();
        assert_eq!(material.key_id(), "TESTKEY01");
    }

    #[test]
    fn test_relative_path_from_working_directory() {
        // cargo runs tests from the crate root
        let relative = Path::new("tests/fixtures/AuthKey_TESTKEY01.p8");
        assert_eq!(
            resolve_key_path_from(relative, None).as_deref(),
            Some(relative)
        );
    }

    #[test]
    fn test_relative_path_falls_back_to_executable_dir() {
        let exe_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures");
        let relative = Path::new("AuthKey_TESTKEY01.p8");

        assert_eq!(
            resolve_key_path_from(relative, Some(exe_dir.as_path())),
            Some(exe_dir.join(relative))
        );
        assert_eq!(
            resolve_key_path_from(Path::new("AuthKey_NOPE.p8"), Some(exe_dir.as_path())),
            None
        );
        assert_eq!(resolve_key_path_from(relative, None), None);
    }

    #[test]
    fn test_garbage_pem_rejected() {
        let err = KeyMaterial::from_pem("XX7AN23E0Z", "TESTKEY01", b"not a key").unwrap_err();
        assert!(matches!(err, DeviceCheckError::InvalidKeyMaterial(_)));
    }

    #[test]
    fn test_public_key_rejected() {
        let err = KeyMaterial::from_pem("XX7AN23E0Z", "TESTKEY01", TEST_PUBLIC_KEY.as_bytes())
            .unwrap_err();
        assert!(matches!(err, DeviceCheckError::InvalidKeyMaterial(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = KeyMaterial::from_path("XX7AN23E0Z", "TESTKEY01", "/nonexistent/AuthKey_NOPE.p8")
            .unwrap_err();
        assert!(matches!(err, DeviceCheckError::InvalidKeyMaterial(_)));
    }

    #[test]
    fn test_empty_identifiers() {
        let err = KeyMaterial::from_pem("", "TESTKEY01", TEST_KEY.as_bytes()).unwrap_err();
        assert!(matches!(err, DeviceCheckError::Config(_)));

        let err = KeyMaterial::from_pem("XX7AN23E0Z", " ", TEST_KEY.as_bytes()).unwrap_err();
        assert!(matches!(err, DeviceCheckError::Config(_)));
    }

    #[test]
    fn test_key_source_detection() {
        assert_eq!(
            KeySource::detect("AuthKey_ABC.p8"),
            KeySource::Path(PathBuf::from("AuthKey_ABC.p8"))
        );
        assert!(matches!(KeySource::detect(TEST_KEY), KeySource::Pem(_)));
    }

    #[test]
    fn test_debug_redacts_key() {
        let material = KeyMaterial::from_pem("XX7AN23E0Z", "TESTKEY01", TEST_KEY.as_bytes()).unwrap();
        let debug = format!("{:?}", material);
        assert!(debug.contains("[redacted]"));
        assert!(!debug.contains("PRIVATE KEY"));

        let debug = format!("{:?}", KeySource::detect(TEST_KEY));
        assert!(!debug.contains("PRIVATE KEY"));
    }
}
