//! Azure AD authentication module.
//!
//! Provides the authorization code exchange, unverified ID token decoding,
//! Microsoft Graph directory lookups, and the local callback listener.

pub mod authenticator;
pub mod callback_server;
pub mod claims;
pub mod endpoints;
pub mod graph;
pub mod oauth;
