//! Configuration module for adsync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::{
    AttributeName, ConflictPolicy, FieldMapping, LocalField, LocalUserId, MappingDirection,
    MultiValuePolicy, ReservedIdentitySet, Transform,
};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for adsync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub directory: DirectoryConfig,
    pub import: ImportConfig,
    pub export: ExportConfig,
    pub attributes: AttributesConfig,
    pub budget: BudgetConfig,
    pub identity: IdentityConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

/// Directory server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Full LDAP URL; overrides `host`, `port` and `use_ssl` when set.
    pub url: Option<String>,
    /// Domain controller host name.
    pub host: String,
    /// LDAP port (389 for plain/StartTLS, 636 for LDAPS).
    pub port: u16,
    /// Connect with `ldaps://`.
    pub use_ssl: bool,
    /// Upgrade a plain connection with StartTLS.
    pub starttls: bool,
    /// Search base, e.g. `DC=example,DC=com`.
    pub base_dn: String,
    /// Suffix appended to bare account names, e.g. `example.com`.
    pub account_suffix: Option<String>,
    /// Connect and operation timeout in seconds.
    pub timeout_secs: u64,
    /// Entries per page for paged searches; 0 disables paging.
    pub page_size: u32,
}

impl DirectoryConfig {
    /// The LDAP URL to connect to.
    pub fn url(&self) -> String {
        match &self.url {
            Some(url) if !url.trim().is_empty() => url.trim().to_string(),
            _ => {
                let scheme = if self.use_ssl { "ldaps" } else { "ldap" };
                format!("{scheme}://{}:{}", self.host, self.port)
            }
        }
    }
}

/// Directory → local store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Service account used to read the directory.
    pub username: Option<String>,
    /// Name of the environment variable holding the service password.
    pub password_env: Option<String>,
    /// LDAP filter selecting the principals to import.
    pub filter: String,
    /// Create local users for directory principals without a match.
    pub create_users: bool,
}

/// Local store → directory settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Master switch for exporting to the directory.
    pub enabled: bool,
    /// Write with one global account instead of per-run credentials.
    pub use_global_user: bool,
    /// The global account name.
    pub global_user: Option<String>,
    /// Name of the environment variable holding the global account's password.
    pub global_password_env: Option<String>,
}

/// One row of the attribute mapping table as written in YAML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    /// Directory attribute, e.g. `givenName`.
    pub attribute: String,
    /// Local profile field, e.g. `first_name`.
    pub field: String,
    #[serde(default = "default_direction")]
    pub direction: MappingDirection,
    #[serde(default)]
    pub multi_value: MultiValuePolicy,
    #[serde(default)]
    pub transform: Transform,
    #[serde(default)]
    pub required: bool,
}

fn default_direction() -> MappingDirection {
    MappingDirection::Both
}

impl MappingEntry {
    pub fn new(attribute: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            field: field.into(),
            direction: MappingDirection::Both,
            multi_value: MultiValuePolicy::First,
            transform: Transform::None,
            required: false,
        }
    }
}

/// Attribute mapping settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributesConfig {
    /// Whether the directory may overwrite a locally-set value on import.
    pub conflict_policy: ConflictPolicy,
    pub mappings: Vec<MappingEntry>,
}

/// Execution budget settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Minimum execution time a batch asks the platform for.
    pub required_secs: u64,
    /// Seconds kept in reserve before the effective limit when deriving a deadline.
    pub safety_margin_secs: u64,
    /// Explicit wall-clock deadline per batch; overrides the derived one.
    pub deadline_secs: Option<u64>,
}

/// Identity settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Local user ids never touched by synchronization.
    pub reserved_ids: ReservedIdentitySet,
}

/// Local store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path of the SQLite database.
    pub path: PathBuf,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Output format: `text` or `json`.
    pub format: String,
    /// Optional log file; logs go to stderr when unset.
    pub file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/adsync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("adsync")
            .join("config.yaml")
    }

    /// Compiles the raw mapping table into typed [`FieldMapping`]s.
    ///
    /// Every invalid row is reported, not only the first one.
    pub fn field_mappings(&self) -> Result<Vec<FieldMapping>, Vec<ValidationError>> {
        let mut mappings = Vec::with_capacity(self.attributes.mappings.len());
        let mut errors = Vec::new();

        for (index, entry) in self.attributes.mappings.iter().enumerate() {
            let attribute = AttributeName::new(entry.attribute.as_str()).map_err(|e| {
                ValidationError {
                    field: format!("attributes.mappings[{index}].attribute"),
                    message: e.to_string(),
                }
            });
            let field = LocalField::new(entry.field.as_str()).map_err(|e| ValidationError {
                field: format!("attributes.mappings[{index}].field"),
                message: e.to_string(),
            });
            if let MultiValuePolicy::Join { separator } = &entry.multi_value {
                if separator.is_empty() {
                    errors.push(ValidationError {
                        field: format!("attributes.mappings[{index}].multi_value.separator"),
                        message: "must not be empty".into(),
                    });
                }
            }

            match (attribute, field) {
                (Ok(attribute), Ok(field)) => mappings.push(
                    FieldMapping::new(attribute, field)
                        .direction(entry.direction)
                        .multi_value(entry.multi_value.clone())
                        .transform(entry.transform)
                        .required(entry.required),
                ),
                (attribute, field) => {
                    errors.extend(attribute.err());
                    errors.extend(field.err());
                }
            }
        }

        for (index, mapping) in mappings.iter().enumerate() {
            if mapping.direction.imports()
                && mappings[..index]
                    .iter()
                    .any(|m| m.direction.imports() && m.field == mapping.field)
            {
                errors.push(ValidationError {
                    field: "attributes.mappings".into(),
                    message: format!("field '{}' is imported more than once", mapping.field),
                });
            }
            if mapping.direction.exports()
                && mappings[..index]
                    .iter()
                    .any(|m| m.direction.exports() && m.attribute == mapping.attribute)
            {
                errors.push(ValidationError {
                    field: "attributes.mappings".into(),
                    message: format!(
                        "attribute '{}' is exported more than once",
                        mapping.attribute
                    ),
                });
            }
        }

        if errors.is_empty() {
            Ok(mappings)
        } else {
            Err(errors)
        }
    }
}

// ---------------------------------------------------------------------------
// Config::default()
// ---------------------------------------------------------------------------

// Config derives Default because all its fields implement Default.
// (clippy::derivable_impls)

/// Minimum batch execution time: five hours.
pub const DEFAULT_REQUIRED_SECS: u64 = 18_000;

/// Default import filter: enabled and disabled person accounts.
pub const DEFAULT_IMPORT_FILTER: &str = "(&(objectClass=user)(objectCategory=person))";

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".to_string(),
            port: 389,
            use_ssl: false,
            starttls: false,
            base_dn: String::new(),
            account_suffix: None,
            timeout_secs: 10,
            page_size: 500,
        }
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            username: None,
            password_env: Some("ADSYNC_PASSWORD".to_string()),
            filter: DEFAULT_IMPORT_FILTER.to_string(),
            create_users: false,
        }
    }
}

// ExportConfig and IdentityConfig derive Default.
// (clippy::derivable_impls)

impl Default for AttributesConfig {
    fn default() -> Self {
        Self {
            conflict_policy: ConflictPolicy::DirectoryWins,
            mappings: vec![
                MappingEntry::new("givenName", "first_name"),
                MappingEntry::new("sn", "last_name"),
                MappingEntry::new("mail", "email"),
                MappingEntry::new("displayName", "display_name"),
            ],
        }
    }
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            required_secs: DEFAULT_REQUIRED_SECS,
            safety_margin_secs: 60,
            deadline_secs: None,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("adsync")
                .join("adsync.db"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
            file: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"directory.port"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid values for `logging.format`.
const VALID_LOG_FORMATS: &[&str] = &["text", "json"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- directory ---
        let has_url = self
            .directory
            .url
            .as_deref()
            .is_some_and(|u| !u.trim().is_empty());
        if let Some(url) = self.directory.url.as_deref().filter(|_| has_url) {
            let url = url.trim();
            if !url.starts_with("ldap://") && !url.starts_with("ldaps://") {
                errors.push(ValidationError {
                    field: "directory.url".into(),
                    message: format!("must start with ldap:// or ldaps://, got '{url}'"),
                });
            }
        } else {
            if self.directory.host.trim().is_empty() {
                errors.push(ValidationError {
                    field: "directory.host".into(),
                    message: "must not be empty".into(),
                });
            }
            if self.directory.port == 0 {
                errors.push(ValidationError {
                    field: "directory.port".into(),
                    message: "must be greater than 0".into(),
                });
            }
        }
        if self.directory.use_ssl && self.directory.starttls {
            errors.push(ValidationError {
                field: "directory.starttls".into(),
                message: "cannot be combined with use_ssl".into(),
            });
        }
        if self.directory.timeout_secs == 0 {
            errors.push(ValidationError {
                field: "directory.timeout_secs".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- import ---
        let filter = self.import.filter.trim();
        if !(filter.starts_with('(') && filter.ends_with(')')) {
            errors.push(ValidationError {
                field: "import.filter".into(),
                message: format!("must be a parenthesized LDAP filter, got '{filter}'"),
            });
        }

        // --- export ---
        if self.export.enabled && self.export.use_global_user {
            let blank = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());
            if blank(&self.export.global_user) {
                errors.push(ValidationError {
                    field: "export.global_user".into(),
                    message: "required when use_global_user is set".into(),
                });
            }
            if blank(&self.export.global_password_env) {
                errors.push(ValidationError {
                    field: "export.global_password_env".into(),
                    message: "required when use_global_user is set".into(),
                });
            }
        }

        // --- attributes ---
        if let Err(mapping_errors) = self.field_mappings() {
            errors.extend(mapping_errors);
        }

        // --- budget ---
        if self.budget.required_secs == 0 {
            errors.push(ValidationError {
                field: "budget.required_secs".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.budget.safety_margin_secs >= self.budget.required_secs {
            errors.push(ValidationError {
                field: "budget.safety_margin_secs".into(),
                message: format!(
                    "safety_margin_secs ({}) must be less than required_secs ({})",
                    self.budget.safety_margin_secs, self.budget.required_secs
                ),
            });
        }
        if self.budget.deadline_secs == Some(0) {
            errors.push(ValidationError {
                field: "budget.deadline_secs".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- identity ---
        if !self
            .identity
            .reserved_ids
            .contains(ReservedIdentitySet::SUPERUSER)
        {
            errors.push(ValidationError {
                field: "identity.reserved_ids".into(),
                message: format!(
                    "must contain the superuser id {}",
                    ReservedIdentitySet::SUPERUSER
                ),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }
        if !VALID_LOG_FORMATS.contains(&self.logging.format.as_str()) {
            errors.push(ValidationError {
                field: "logging.format".into(),
                message: format!(
                    "invalid format '{}'; valid options: {}",
                    self.logging.format,
                    VALID_LOG_FORMATS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use adsync_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .directory_host("dc01.example.com")
///     .directory_base_dn("DC=example,DC=com")
///     .import_username("svc-sync")
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- directory ---

    pub fn directory_url(mut self, url: impl Into<String>) -> Self {
        self.config.directory.url = Some(url.into());
        self
    }

    pub fn directory_host(mut self, host: impl Into<String>) -> Self {
        self.config.directory.host = host.into();
        self
    }

    pub fn directory_port(mut self, port: u16) -> Self {
        self.config.directory.port = port;
        self
    }

    pub fn directory_use_ssl(mut self, use_ssl: bool) -> Self {
        self.config.directory.use_ssl = use_ssl;
        self
    }

    pub fn directory_starttls(mut self, starttls: bool) -> Self {
        self.config.directory.starttls = starttls;
        self
    }

    pub fn directory_base_dn(mut self, base_dn: impl Into<String>) -> Self {
        self.config.directory.base_dn = base_dn.into();
        self
    }

    pub fn directory_account_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.config.directory.account_suffix = Some(suffix.into());
        self
    }

    pub fn directory_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.directory.timeout_secs = seconds;
        self
    }

    pub fn directory_page_size(mut self, page_size: u32) -> Self {
        self.config.directory.page_size = page_size;
        self
    }

    // --- import ---

    pub fn import_username(mut self, username: impl Into<String>) -> Self {
        self.config.import.username = Some(username.into());
        self
    }

    pub fn import_password_env(mut self, var: impl Into<String>) -> Self {
        self.config.import.password_env = Some(var.into());
        self
    }

    pub fn import_filter(mut self, filter: impl Into<String>) -> Self {
        self.config.import.filter = filter.into();
        self
    }

    pub fn import_create_users(mut self, create: bool) -> Self {
        self.config.import.create_users = create;
        self
    }

    // --- export ---

    pub fn export_enabled(mut self, enabled: bool) -> Self {
        self.config.export.enabled = enabled;
        self
    }

    pub fn export_global_user(
        mut self,
        user: impl Into<String>,
        password_env: impl Into<String>,
    ) -> Self {
        self.config.export.use_global_user = true;
        self.config.export.global_user = Some(user.into());
        self.config.export.global_password_env = Some(password_env.into());
        self
    }

    // --- attributes ---

    pub fn conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.config.attributes.conflict_policy = policy;
        self
    }

    pub fn mappings(mut self, mappings: Vec<MappingEntry>) -> Self {
        self.config.attributes.mappings = mappings;
        self
    }

    pub fn mapping(mut self, mapping: MappingEntry) -> Self {
        self.config.attributes.mappings.push(mapping);
        self
    }

    // --- budget ---

    pub fn budget_required_secs(mut self, seconds: u64) -> Self {
        self.config.budget.required_secs = seconds;
        self
    }

    pub fn budget_safety_margin_secs(mut self, seconds: u64) -> Self {
        self.config.budget.safety_margin_secs = seconds;
        self
    }

    pub fn budget_deadline_secs(mut self, seconds: u64) -> Self {
        self.config.budget.deadline_secs = Some(seconds);
        self
    }

    // --- identity ---

    pub fn reserved_ids(mut self, ids: impl IntoIterator<Item = LocalUserId>) -> Self {
        self.config.identity.reserved_ids = ReservedIdentitySet::new(ids);
        self
    }

    // --- store ---

    pub fn store_path(mut self, path: PathBuf) -> Self {
        self.config.store.path = path;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_format(mut self, format: impl Into<String>) -> Self {
        self.config.logging.format = format.into();
        self
    }

    pub fn logging_file(mut self, file: PathBuf) -> Self {
        self.config.logging.file = Some(file);
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
