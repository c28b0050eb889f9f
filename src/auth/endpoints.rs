//! Azure AD authorize/token endpoint resolution.

use crate::error::ConfigError;

/// Azure AD token endpoint generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenVersion {
    /// `oauth2/authorize`, `oauth2/token`
    V1,
    /// `oauth2/v2.0/authorize`, `oauth2/v2.0/token`
    V2,
}

impl TryFrom<u8> for TokenVersion {
    type Error = ConfigError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::V1),
            2 => Ok(Self::V2),
            other => Err(ConfigError::InvalidTokenVersion(other)),
        }
    }
}

impl TokenVersion {
    fn path_prefix(self) -> &'static str {
        match self {
            Self::V1 => "oauth2",
            Self::V2 => "oauth2/v2.0",
        }
    }
}

/// Authorize and token URLs for a single tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AzureAdEndpoints {
    authorize_url: String,
    token_url: String,
}

impl AzureAdEndpoints {
    /// Resolve the endpoints for `tenant_id` on `authority_host`.
    pub fn resolve(
        authority_host: &str,
        tenant_id: &str,
        version: u8,
    ) -> Result<Self, ConfigError> {
        let version = TokenVersion::try_from(version)?;

        if tenant_id.is_empty() {
            return Err(ConfigError::MissingTenant);
        }

        let base = format!(
            "{}/{}/{}",
            authority_host.trim_end_matches('/'),
            tenant_id,
            version.path_prefix()
        );

        Ok(Self {
            authorize_url: format!("{}/authorize", base),
            token_url: format!("{}/token", base),
        })
    }

    pub fn authorize_url(&self) -> &str {
        &self.authorize_url
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }
}
