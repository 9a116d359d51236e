//! # Dynamic Role Configuration
//!
//! Roles are read once at startup, either from the built-in defaults or from a
//! TOML file named by `BROKER_ROLES_FILE`, and never change at runtime.
//!
//! ```toml
//! [[roles]]
//! name = "readonly"
//! alias = "db"
//! default_ttl = 3600
//! max_ttl = 86400
//! creation_statement = "CREATE ROLE \"{{name}}\" WITH LOGIN PASSWORD '{{password}}';"
//!
//! [roles.connection_info]
//! host = "postgres"
//! port = "5432"
//! database = "devdb"
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::errors::{Error, Result};

use super::settings::TargetDatabaseConfig;

/// Configuration of one dynamic credential role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct RoleConfig {
    /// Role name in the backing store's database engine
    #[validate(length(min = 1, message = "Role name cannot be empty"))]
    pub name: String,

    /// Public name the dashboard uses (`/secrets/{alias}`)
    #[validate(length(min = 1, message = "Role alias cannot be empty"))]
    pub alias: String,

    #[serde(default)]
    pub description: String,

    /// Lifetime of a cached lease
    #[serde(with = "duration_secs")]
    pub default_ttl: Duration,

    #[serde(with = "duration_secs")]
    pub max_ttl: Duration,

    /// SQL template the store runs when creating the database user
    #[serde(default)]
    pub creation_statement: String,

    /// Label reported as `secret_type`, defaults to `dynamic_{name}_credentials`
    #[serde(default)]
    pub secret_type: Option<String>,

    /// Label reported as `rotation`, defaults to `automatic_{ttl}`
    #[serde(default)]
    pub rotation: Option<String>,

    /// Non-secret connection fields merged into the credential data
    #[serde(default)]
    pub connection_info: BTreeMap<String, String>,

    /// Whether freshly issued credentials are tried against the target database
    #[serde(default = "default_true")]
    pub test_connection: bool,
}

fn default_true() -> bool {
    true
}

impl RoleConfig {
    pub fn new(name: impl Into<String>, alias: impl Into<String>, default_ttl: Duration) -> Self {
        let name = name.into();
        Self {
            description: format!("Dynamic database credentials for the '{}' role", name),
            name,
            alias: alias.into(),
            default_ttl,
            max_ttl: default_ttl * 24,
            creation_statement: String::new(),
            secret_type: None,
            rotation: None,
            connection_info: BTreeMap::new(),
            test_connection: true,
        }
    }

    pub fn secret_type(&self) -> String {
        self.secret_type.clone().unwrap_or_else(|| format!("dynamic_{}_credentials", self.name))
    }

    pub fn rotation(&self) -> String {
        self.rotation.clone().unwrap_or_else(|| format!("automatic_{}", humanize(self.default_ttl)))
    }

    /// Whether `name` addresses this role, by backing name or public alias.
    pub fn matches(&self, name: &str) -> bool {
        self.name == name || self.alias == name
    }

    fn validate_ttls(&self) -> Result<()> {
        if self.default_ttl.is_zero() {
            return Err(Error::config(format!(
                "Role '{}' must have a non-zero default_ttl",
                self.name
            )));
        }
        if self.default_ttl > self.max_ttl {
            return Err(Error::config(format!(
                "Role '{}' default_ttl ({}s) exceeds max_ttl ({}s)",
                self.name,
                self.default_ttl.as_secs(),
                self.max_ttl.as_secs()
            )));
        }
        Ok(())
    }
}

/// Render a TTL the way rotation labels read: `1h`, `30m`, `45s`.
fn humanize(ttl: Duration) -> String {
    let secs = ttl.as_secs();
    if secs == 0 {
        format!("{}ms", ttl.as_millis())
    } else if secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

#[derive(Debug, Deserialize)]
struct RolesFile {
    roles: Vec<RoleConfig>,
}

const CREATE_USER_STATEMENT: &str = "CREATE ROLE \"{{name}}\" WITH LOGIN PASSWORD '{{password}}' \
     VALID UNTIL '{{expiration}}';";

/// The two roles the bootstrap script provisions.
pub fn default_roles(target: &TargetDatabaseConfig) -> Vec<RoleConfig> {
    let ttl = Duration::from_secs(3600);

    let mut readonly = RoleConfig::new("readonly", "db", ttl);
    readonly.description = "Read-only database credentials rotated every hour".to_string();
    readonly.secret_type = Some("dynamic_database_credentials".to_string());
    readonly.creation_statement = format!(
        "{} GRANT SELECT ON ALL TABLES IN SCHEMA public TO \"{{{{name}}}}\";",
        CREATE_USER_STATEMENT
    );
    readonly.connection_info = BTreeMap::from([
        ("host".to_string(), target.host.clone()),
        ("port".to_string(), target.port.to_string()),
        ("database".to_string(), target.database.clone()),
    ]);

    let mut admin = RoleConfig::new("admin", "db-admin", ttl);
    admin.description = "Administrative database credentials rotated every hour".to_string();
    admin.secret_type = Some("dynamic_database_admin_credentials".to_string());
    admin.creation_statement = format!(
        "{} GRANT ALL PRIVILEGES ON ALL TABLES IN SCHEMA public TO \"{{{{name}}}}\";",
        CREATE_USER_STATEMENT
    );

    vec![readonly, admin]
}

/// Parse roles from TOML text and validate them.
pub fn parse_roles(contents: &str) -> Result<Vec<RoleConfig>> {
    let file: RolesFile = toml::from_str(contents)?;
    validate_roles(&file.roles)?;
    Ok(file.roles)
}

pub fn load_roles_file(path: &Path) -> Result<Vec<RoleConfig>> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        Error::config(format!("Failed to read roles file '{}': {}", path.display(), e))
    })?;
    parse_roles(&contents)
}

/// Check each role and that no name or alias is claimed twice.
pub fn validate_roles(roles: &[RoleConfig]) -> Result<()> {
    if roles.is_empty() {
        return Err(Error::config("At least one dynamic role must be configured"));
    }

    let mut seen = HashSet::new();
    for role in roles {
        Validate::validate(role)?;
        role.validate_ttls()?;

        for ident in [&role.name, &role.alias] {
            if ident.contains('/') {
                return Err(Error::config(format!(
                    "Role identifier '{}' cannot contain '/'",
                    ident
                )));
            }
        }
        if !seen.insert(role.name.as_str()) {
            return Err(Error::config(format!("Role name '{}' is defined twice", role.name)));
        }
        if role.alias != role.name && !seen.insert(role.alias.as_str()) {
            return Err(Error::config(format!("Role alias '{}' is defined twice", role.alias)));
        }
    }
    Ok(())
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_roles() {
        let roles = default_roles(&TargetDatabaseConfig::default());
        assert_eq!(roles.len(), 2);
        assert!(validate_roles(&roles).is_ok());

        let readonly = &roles[0];
        assert!(readonly.matches("db"));
        assert!(readonly.matches("readonly"));
        assert!(!readonly.matches("admin"));
        assert_eq!(readonly.rotation(), "automatic_1h");
        assert_eq!(readonly.secret_type(), "dynamic_database_credentials");
        assert_eq!(readonly.connection_info.get("database").map(String::as_str), Some("devdb"));

        assert!(roles[1].connection_info.is_empty());
    }

    #[test]
    fn test_parse_roles_file() {
        let roles = parse_roles(
            r#"
            [[roles]]
            name = "reporting"
            alias = "reports"
            default_ttl = 900
            max_ttl = 3600
            test_connection = false
            "#,
        )
        .unwrap();

        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].default_ttl, Duration::from_secs(900));
        assert_eq!(roles[0].rotation(), "automatic_15m");
        assert_eq!(roles[0].secret_type(), "dynamic_reporting_credentials");
        assert!(!roles[0].test_connection);
    }

    #[test]
    fn test_rejects_ttl_above_max() {
        let err = parse_roles(
            r#"
            [[roles]]
            name = "readonly"
            alias = "db"
            default_ttl = 7200
            max_ttl = 3600
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("exceeds max_ttl"));
    }

    #[test]
    fn test_rejects_zero_ttl() {
        let mut role = RoleConfig::new("readonly", "db", Duration::from_secs(60));
        role.default_ttl = Duration::ZERO;
        assert!(validate_roles(&[role]).is_err());
    }

    #[test]
    fn test_rejects_duplicate_aliases() {
        let a = RoleConfig::new("readonly", "db", Duration::from_secs(60));
        let b = RoleConfig::new("admin", "db", Duration::from_secs(60));
        let err = validate_roles(&[a, b]).unwrap_err();
        assert!(err.to_string().contains("defined twice"));
    }

    #[test]
    fn test_rejects_alias_colliding_with_other_role_name() {
        let a = RoleConfig::new("readonly", "db", Duration::from_secs(60));
        let b = RoleConfig::new("admin", "readonly", Duration::from_secs(60));
        assert!(validate_roles(&[a, b]).is_err());
    }

    #[test]
    fn test_rejects_empty_role_list() {
        assert!(validate_roles(&[]).is_err());
    }

    #[test]
    fn test_load_roles_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roles.toml");
        std::fs::write(
            &path,
            "[[roles]]\nname = \"readonly\"\nalias = \"db\"\ndefault_ttl = 60\nmax_ttl = 120\n",
        )
        .unwrap();

        let roles = load_roles_file(&path).unwrap();
        assert_eq!(roles[0].alias, "db");

        assert!(load_roles_file(&dir.path().join("missing.toml")).is_err());
    }
}
