// crates/ota-updates-config/src/config.rs
// ============================================================================
// Module: OTA Updates Configuration
// Description: TOML configuration model, loader, and validation.
// Purpose: Turn an operator config file into validated runtime wiring.
// Dependencies: ota-structured-fields, ota-updates-core, ota-updates-store-sqlite,
//               serde, thiserror, toml
// ============================================================================

//! ## Overview
//! [`OtaUpdatesConfig::load`] resolves the config path (explicit argument,
//! then the `OTA_UPDATES_CONFIG` environment variable, then
//! `ota-updates.toml`), enforces path and size limits, parses TOML, and
//! validates the result. Relative paths inside the file resolve against the
//! directory holding the file.
//!
//! Security posture: config files are operator input but still untrusted in
//! shape; every limit fails closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use ota_structured_fields::BareItem;
use ota_structured_fields::Dictionary;
use ota_structured_fields::serialize_dictionary;
use ota_updates_core::ClientIdentity;
use ota_updates_core::CodeSigningConfiguration;
use ota_updates_core::LauncherConfig;
use ota_updates_core::ScopeKey;
use ota_updates_core::parse_algorithm;
use ota_updates_core::resolve_runtime_version;
use ota_updates_store_sqlite::SqliteStoreConfig;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Default config filename.
const DEFAULT_CONFIG_NAME: &str = "ota-updates.toml";
/// Environment variable override for config path.
const CONFIG_ENV_VAR: &str = "OTA_UPDATES_CONFIG";
/// Maximum allowed config file size in bytes.
const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum allowed certificate file size in bytes.
const MAX_CERTIFICATE_FILE_SIZE: usize = 64 * 1024;
/// Maximum total path length for config-related paths.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// I/O error.
    #[error("config io error: {0}")]
    Io(String),
    /// Parse error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration.
    #[error("config invalid: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Model
// ============================================================================

/// Updates client configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OtaUpdatesConfig {
    /// Client identity settings.
    pub client: ClientConfig,
    /// Storage locations.
    pub storage: StorageConfig,
    /// Optional code-signing settings.
    #[serde(default)]
    pub code_signing: Option<CodeSigningConfig>,
    /// Manifest request settings.
    #[serde(default)]
    pub request: RequestConfig,
    /// Directory relative paths resolve against (not serialized).
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

/// `[client]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Scope key isolating this application's updates.
    pub scope_key: String,
    /// Runtime version; wins over `sdk_version`.
    #[serde(default)]
    pub runtime_version: Option<String>,
    /// SDK version used when no runtime version is configured.
    #[serde(default)]
    pub sdk_version: Option<String>,
}

/// `[storage]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Directory holding downloaded assets.
    pub updates_directory: PathBuf,
    /// Directory holding assets shipped with the application.
    #[serde(default)]
    pub embedded_assets_directory: Option<PathBuf>,
    /// `SQLite` database settings.
    pub database: SqliteStoreConfig,
}

/// `[code_signing]` section.
///
/// # Invariants
/// - Exactly one of `certificate_path` and `certificate_pem` is set.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CodeSigningConfig {
    /// Path to a PEM certificate.
    #[serde(default)]
    pub certificate_path: Option<PathBuf>,
    /// Inline PEM certificate.
    #[serde(default)]
    pub certificate_pem: Option<String>,
    /// Expected key id (defaults to `root`).
    #[serde(default)]
    pub keyid: Option<String>,
    /// Expected algorithm (defaults to `rsa-v1_5-sha256`).
    #[serde(default)]
    pub alg: Option<String>,
    /// Accept manifests without a signature header.
    #[serde(default)]
    pub allow_unsigned_manifests: bool,
}

/// `[request]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestConfig {
    /// Headers describing the client, sent with manifest requests.
    #[serde(default)]
    pub request_headers: BTreeMap<String, String>,
}

// ============================================================================
// SECTION: Loading
// ============================================================================

impl OtaUpdatesConfig {
    /// Loads configuration from disk.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the path is unsafe, the file cannot be
    /// read, exceeds the size limit, is not UTF-8 TOML, or fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved, "config")?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let mut config: Self = toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.base_dir = resolved.parent().map(Path::to_path_buf);
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client.scope_key.trim().is_empty() {
            return Err(ConfigError::Invalid("client.scope_key must not be empty".to_string()));
        }
        self.client_identity()?;
        if self.storage.updates_directory.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("storage.updates_directory must not be empty".to_string()));
        }
        validate_path(&self.storage.updates_directory, "storage.updates_directory")?;
        if let Some(embedded) = &self.storage.embedded_assets_directory {
            validate_path(embedded, "storage.embedded_assets_directory")?;
        }
        if self.storage.database.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("storage.database.path must not be empty".to_string()));
        }
        validate_path(&self.storage.database.path, "storage.database.path")?;
        if let Some(signing) = &self.code_signing {
            signing.validate()?;
        }
        self.request_headers_field()?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Wiring
// ============================================================================

impl OtaUpdatesConfig {
    /// Returns the client identity, applying the runtime-version rule.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when neither a runtime version nor an
    /// SDK version is configured.
    pub fn client_identity(&self) -> Result<ClientIdentity, ConfigError> {
        let runtime_version =
            resolve_runtime_version(self.client.sdk_version.as_deref(), self.client.runtime_version.as_deref())
                .map_err(|err| ConfigError::Invalid(format!("client: {err}")))?;
        Ok(ClientIdentity {
            scope_key: ScopeKey::new(self.client.scope_key.clone()),
            runtime_version,
        })
    }

    /// Returns the `SQLite` store settings with the path resolved.
    #[must_use]
    pub fn database_config(&self) -> SqliteStoreConfig {
        SqliteStoreConfig {
            path: self.resolve(&self.storage.database.path),
            ..self.storage.database.clone()
        }
    }

    /// Returns the launcher settings with paths resolved.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the client identity is invalid.
    pub fn launcher_config(&self) -> Result<LauncherConfig, ConfigError> {
        Ok(LauncherConfig {
            identity: self.client_identity()?,
            updates_directory: self.resolve(&self.storage.updates_directory),
            embedded_assets_directory: self
                .storage
                .embedded_assets_directory
                .as_deref()
                .map(|path| self.resolve(path)),
        })
    }

    /// Builds the code-signing configuration, reading the certificate file
    /// when one is configured.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the certificate cannot be read or is
    /// rejected.
    pub fn code_signing_configuration(&self) -> Result<Option<CodeSigningConfiguration>, ConfigError> {
        let Some(signing) = &self.code_signing else {
            return Ok(None);
        };
        let certificate_pem = match (&signing.certificate_pem, &signing.certificate_path) {
            (Some(pem), _) => pem.clone(),
            (None, Some(path)) => read_certificate(&self.resolve(path))?,
            (None, None) => {
                return Err(ConfigError::Invalid(
                    "code_signing requires certificate_path or certificate_pem".to_string(),
                ));
            }
        };
        CodeSigningConfiguration::new(
            certificate_pem,
            signing.keyid.as_deref(),
            signing.alg.as_deref(),
            signing.allow_unsigned_manifests,
        )
        .map(Some)
        .map_err(|err| ConfigError::Invalid(format!("code_signing: {err}")))
    }

    /// Serializes the request headers as a structured-field dictionary of
    /// strings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a header name is not a valid
    /// dictionary key or a value is not printable ASCII.
    pub fn request_headers_field(&self) -> Result<String, ConfigError> {
        let mut dictionary = Dictionary::new();
        for (name, value) in &self.request.request_headers {
            dictionary.insert(name.clone(), BareItem::string(value.clone()));
        }
        serialize_dictionary(&dictionary).map_err(|err| ConfigError::Invalid(format!("request.request_headers: {err}")))
    }

    /// Resolves a path against the config file directory.
    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl CodeSigningConfig {
    /// Validates the code-signing section.
    fn validate(&self) -> Result<(), ConfigError> {
        match (&self.certificate_path, &self.certificate_pem) {
            (Some(_), Some(_)) => {
                return Err(ConfigError::Invalid(
                    "code_signing accepts only one of certificate_path and certificate_pem".to_string(),
                ));
            }
            (None, None) => {
                return Err(ConfigError::Invalid(
                    "code_signing requires certificate_path or certificate_pem".to_string(),
                ));
            }
            (Some(path), None) => validate_path(path, "code_signing.certificate_path")?,
            (None, Some(_)) => {}
        }
        if self.keyid.as_deref().is_some_and(|keyid| keyid.trim().is_empty()) {
            return Err(ConfigError::Invalid("code_signing.keyid must not be empty".to_string()));
        }
        parse_algorithm(self.alg.as_deref()).map_err(|err| ConfigError::Invalid(format!("code_signing.alg: {err}")))?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from explicit input or environment.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates a path's total length and component lengths.
fn validate_path(path: &Path, label: &str) -> Result<(), ConfigError> {
    if path.to_string_lossy().len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{label} path exceeds max length")));
    }
    for component in path.components() {
        if component.as_os_str().to_string_lossy().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{label} path component too long")));
        }
    }
    Ok(())
}

/// Reads a PEM certificate with a size cap.
fn read_certificate(path: &Path) -> Result<String, ConfigError> {
    let bytes = fs::read(path).map_err(|err| ConfigError::Io(format!("{}: {err}", path.display())))?;
    if bytes.len() > MAX_CERTIFICATE_FILE_SIZE {
        return Err(ConfigError::Invalid("certificate file exceeds size limit".to_string()));
    }
    String::from_utf8(bytes).map_err(|_| ConfigError::Invalid("certificate file must be utf-8".to_string()))
}
