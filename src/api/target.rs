//! Resolution of `/secrets/{name}` to a dynamic role or a static path.

use crate::config::RoleConfig;
use crate::errors::Result;
use crate::services::{validate_identifier, DynamicCredentialService};

/// What a public secret name refers to.
#[derive(Debug, Clone, PartialEq)]
pub enum SecretTarget {
    Dynamic(RoleConfig),
    Static(String),
}

impl SecretTarget {
    /// Roles win over static paths with the same name.
    pub fn resolve(name: &str, dynamic: &DynamicCredentialService) -> Result<Self> {
        if let Some(role) = dynamic.role(name) {
            return Ok(SecretTarget::Dynamic(role.clone()));
        }
        validate_identifier("Secret type", name)?;
        Ok(SecretTarget::Static(name.to_string()))
    }
}
