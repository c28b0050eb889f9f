//! Error types for the Azure AD authenticator.
//!
//! Uses `thiserror` for library-style errors with automatic `Display` and `Error` implementations.

use thiserror::Error;

/// Top-level error type used by the login binary.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Directory lookup error: {0}")]
    Lookup(#[from] LookupError),

    #[error("Provisioning error: {0}")]
    Provision(#[from] ProvisionError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Invalid or incomplete provider configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid token version {0}: expected 1 or 2")]
    InvalidTokenVersion(u8),

    #[error("Token version is not a number: {0:?}")]
    UnparsableTokenVersion(String),

    #[error("Azure AD tenant not configured. Set AAD_TENANT_ID or update config.toml")]
    MissingTenant,

    #[error("Azure AD client_id not configured. Set AAD_CLIENT_ID or update config.toml")]
    MissingClientId,

    #[error("Azure AD client_secret not configured. Set AAD_CLIENT_SECRET or update config.toml")]
    MissingClientSecret,

    #[error("username_claim must not be empty")]
    MissingUsernameClaim,

    #[error("ID token signature verification is not supported; skip_signature_verification must be true")]
    SignatureVerificationUnsupported,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Cannot listen on callback address: {0}")]
    CallbackListener(String),

    #[error("Failed to create HTTP client: {0}")]
    HttpClient(String),
}

/// Errors that abort a login attempt.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Identity error: {0}")]
    Identity(String),

    #[error("OAuth2 authorization failed: {0}")]
    OAuthFailed(String),

    #[error("Invalid authorization code")]
    InvalidAuthCode,

    #[error("State validation failed (possible CSRF attack)")]
    StateValidationFailed,

    #[error("OAuth callback timeout")]
    CallbackTimeout,

    #[error("Local user provisioning failed: {0}")]
    Provision(#[from] ProvisionError),
}

/// Directory (Microsoft Graph) lookup errors. Never fatal to a login on their own.
#[derive(Error, Debug)]
pub enum LookupError {
    #[error("Directory request failed: {0}")]
    Network(String),

    #[error("Invalid directory response: {0}")]
    Protocol(String),

    #[error("Unauthorized (401): application token rejected")]
    Unauthorized,

    #[error("Forbidden (403): Insufficient permissions")]
    Forbidden,

    #[error("Rate limited (429): Too many requests")]
    RateLimited,

    #[error("ID token carries no oid claim")]
    MissingObjectId,
}

impl From<AuthError> for LookupError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Network(e) => Self::Network(e),
            other => Self::Protocol(other.to_string()),
        }
    }
}

/// Local system user provisioning errors.
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Username {0:?} is not a valid system user name")]
    InvalidUsername(String),

    #[error("System user {0:?} does not exist and user creation is disabled")]
    UserMissing(String),

    #[error("User creation command failed for {username:?}: {stderr}")]
    CommandFailed { username: String, stderr: String },

    #[error("No user creation command configured")]
    NoCommand,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AuthError {
    /// Returns true when the failure came from the identity provider rather than
    /// from local configuration or the callback listener.
    pub fn is_provider_failure(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Protocol(_) | Self::OAuthFailed(_)
        )
    }
}

impl AppError {
    /// Returns a user-friendly message for display.
    pub fn user_message(&self) -> &str {
        match self {
            Self::Auth(AuthError::OAuthFailed(_)) => "Sign-in failed. Please try again.",
            Self::Auth(AuthError::StateValidationFailed) => {
                "Security error. Please try signing in again."
            }
            Self::Auth(AuthError::CallbackTimeout) => "Sign-in timed out. Please try again.",
            Self::Auth(AuthError::Network(_)) => "Network error. Check your connection.",
            Self::Auth(AuthError::Protocol(_)) => {
                "Unexpected response from Azure AD. Please try again."
            }
            Self::Auth(AuthError::Identity(_)) => "Your account could not be identified.",
            Self::Auth(AuthError::Config(_)) | Self::Config(_) => {
                "Configuration error. Please check settings."
            }
            Self::Auth(AuthError::Provision(_)) | Self::Provision(_) => {
                "Your local account could not be prepared."
            }
            Self::Lookup(LookupError::Forbidden) => "Insufficient permissions for this operation.",
            Self::Lookup(LookupError::RateLimited) => "Too many requests. Please wait a moment.",
            _ => "An error occurred. Please try again.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages() {
        let err = AppError::Auth(AuthError::OAuthFailed("test".into()));
        assert_eq!(err.user_message(), "Sign-in failed. Please try again.");

        let err = AppError::Auth(AuthError::Config(ConfigError::InvalidTokenVersion(3)));
        assert_eq!(err.user_message(), "Configuration error. Please check settings.");

        let err = AppError::Lookup(LookupError::RateLimited);
        assert_eq!(err.user_message(), "Too many requests. Please wait a moment.");
    }

    #[test]
    fn test_lookup_error_from_auth_error() {
        let err: LookupError = AuthError::Network("connection refused".into()).into();
        assert!(matches!(err, LookupError::Network(_)));

        let err: LookupError = AuthError::Protocol("HTTP 400".into()).into();
        assert!(matches!(err, LookupError::Protocol(msg) if msg.contains("HTTP 400")));
    }

    #[test]
    fn test_provider_failure() {
        assert!(AuthError::Protocol("x".into()).is_provider_failure());
        assert!(!AuthError::Identity("x".into()).is_provider_failure());
        assert!(!AuthError::CallbackTimeout.is_provider_failure());
    }
}
