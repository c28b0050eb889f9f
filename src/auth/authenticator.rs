//! Azure AD authenticator: authorization code in, identity record out.

use crate::auth::claims::{extract_username, Claims, ClaimsDecoder, UnverifiedClaimsDecoder};
use crate::auth::graph::GraphClient;
use crate::auth::oauth::{build_http_client, parse_callback_url, OAuth2Client, TokenSet};
use crate::config::Config;
use crate::error::{AuthError, ConfigError, LookupError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;

/// The authenticated user as handed to the host's session layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub username: String,
    pub auth_state: AuthState,
}

/// Auxiliary state kept alongside the username.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthState {
    pub access_token: String,
    /// Full decoded ID token claim set.
    pub user: Claims,
    /// Directory profile, present only after a successful enrichment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<Claims>,
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState")
            .field("access_token", &"[REDACTED]")
            .field("user", &self.user)
            .field("directory", &self.directory)
            .finish()
    }
}

/// A login provider the host can drive.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Name shown on the login button.
    fn login_service(&self) -> &str;

    /// Where to send the browser to start a login carrying `state`.
    fn authorize_url(&self, state: &str) -> Result<Url, ConfigError>;

    /// Redeem an authorization code for an identity record.
    async fn authenticate(&self, code: &str) -> Result<IdentityRecord, AuthError>;

    /// Handle the provider redirect: check the provider outcome and the CSRF
    /// state, then authenticate with the contained code.
    async fn authenticate_callback(
        &self,
        callback_url: &str,
        expected_state: &str,
    ) -> Result<IdentityRecord, AuthError> {
        let params = parse_callback_url(callback_url)?;

        if params.state.as_deref() != Some(expected_state) {
            return Err(AuthError::StateValidationFailed);
        }

        self.authenticate(&params.code).await
    }
}

/// Authenticates against a single Azure AD tenant.
pub struct AzureAdAuthenticator {
    login_service: String,
    username_claim: String,
    log_claims: bool,
    enrich_identity: bool,
    directory_scope: String,
    oauth: OAuth2Client,
    graph: GraphClient,
    decoder: Box<dyn ClaimsDecoder>,
}

impl AzureAdAuthenticator {
    /// Build the authenticator. Endpoints and the decoder are resolved here so
    /// configuration errors surface before the first login.
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        let decoder = UnverifiedClaimsDecoder::from_config(config)?;
        Self::with_decoder(config, Box::new(decoder))
    }

    pub fn with_decoder(
        config: &Config,
        decoder: Box<dyn ClaimsDecoder>,
    ) -> Result<Self, ConfigError> {
        if config.provider.username_claim.is_empty() {
            return Err(ConfigError::MissingUsernameClaim);
        }

        let http_client = build_http_client(&config.http)?;
        let oauth = OAuth2Client::with_http_client(config, http_client.clone())?;
        let graph = GraphClient::with_http_client(config, http_client)?;

        Ok(Self {
            login_service: config.provider.login_service.clone(),
            username_claim: config.provider.username_claim.clone(),
            log_claims: config.security.log_claims,
            enrich_identity: config.directory.enrich_identity,
            directory_scope: config.directory.scope.clone(),
            oauth,
            graph,
            decoder,
        })
    }

    pub fn oauth(&self) -> &OAuth2Client {
        &self.oauth
    }

    /// Decode the ID token of `tokens` into an identity record.
    pub fn identity_from_tokens(&self, tokens: &TokenSet) -> Result<IdentityRecord, AuthError> {
        let claims = self.decoder.decode(tokens.id_token.as_str())?;

        if self.log_claims {
            // Relied on for troubleshooting claim mapping. Contains personal data.
            warn!("Decoded ID token claims: {:?}", claims);
        }

        let username = extract_username(&claims, &self.username_claim)?;

        Ok(IdentityRecord {
            username,
            auth_state: AuthState {
                access_token: tokens.access_token.as_str().to_string(),
                user: claims,
                directory: None,
            },
        })
    }

    /// Look up a directory user's profile with an application token.
    pub async fn get_user_attributes(&self, oid: &str) -> Result<Claims, LookupError> {
        let app_token = self
            .oauth
            .client_credentials_token(&self.directory_scope)
            .await?;

        self.graph.get_user(app_token.as_str(), oid).await
    }

    /// Attach the directory profile for the record's `oid` claim.
    pub async fn enrich(&self, record: &mut IdentityRecord) -> Result<(), LookupError> {
        let oid = record
            .auth_state
            .user
            .get("oid")
            .and_then(|v| v.as_str())
            .ok_or(LookupError::MissingObjectId)?
            .to_string();

        let profile = self.get_user_attributes(&oid).await?;
        record.auth_state.directory = Some(profile);
        Ok(())
    }
}

#[async_trait]
impl Authenticator for AzureAdAuthenticator {
    fn login_service(&self) -> &str {
        &self.login_service
    }

    fn authorize_url(&self, state: &str) -> Result<Url, ConfigError> {
        self.oauth.authorize_url(state)
    }

    async fn authenticate(&self, code: &str) -> Result<IdentityRecord, AuthError> {
        let tokens = self.oauth.exchange_code(code).await?;
        let mut record = self.identity_from_tokens(&tokens)?;

        if self.enrich_identity {
            if let Err(e) = self.enrich(&mut record).await {
                warn!("Directory enrichment failed for {}: {}", record.username, e);
            }
        }

        info!("Authenticated {} via {}", record.username, self.login_service);
        Ok(record)
    }
}
