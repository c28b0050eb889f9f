//! Azure Active Directory login for web-application hosts.
//!
//! Redeems an OAuth2 authorization code for an access token and ID token,
//! decodes the ID token claims into an [`IdentityRecord`], and optionally
//! enriches it from the Microsoft Graph directory.
//!
//! ID token signatures are **not** verified; see [`config::SecurityConfig`].

#![deny(clippy::all)]

pub mod auth;
pub mod config;
pub mod error;
pub mod provision;
pub mod secret;

pub use auth::authenticator::{AuthState, Authenticator, AzureAdAuthenticator, IdentityRecord};
pub use auth::callback_server::CallbackServer;
pub use auth::claims::{Claims, ClaimsDecoder, UnverifiedClaimsDecoder};
pub use auth::endpoints::{AzureAdEndpoints, TokenVersion};
pub use config::Config;
pub use error::{AppError, AuthError, ConfigError, LookupError, ProvisionError};
pub use provision::{LocalAuthenticator, SystemUserProvisioner, UserProvisioner};
