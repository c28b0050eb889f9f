//! OAuth2 client for the Azure AD authorization code and client credentials grants.

use crate::auth::endpoints::AzureAdEndpoints;
use crate::config::{Config, HttpConfig};
use crate::error::{AuthError, ConfigError};
use crate::secret::SecureString;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::Rng;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use std::collections::HashMap;
use url::Url;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=UTF-8";

/// Build the shared HTTP client with request and connect timeouts.
pub fn build_http_client(http: &HttpConfig) -> Result<reqwest::Client, ConfigError> {
    reqwest::Client::builder()
        .timeout(http.timeout())
        .connect_timeout(http.connect_timeout())
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| ConfigError::HttpClient(e.to_string()))
}

/// Generate a random CSRF state value.
fn generate_state() -> String {
    let mut rng = rand::thread_rng();
    let state_bytes: Vec<u8> = (0..16).map(|_| rng.gen()).collect();
    URL_SAFE_NO_PAD.encode(&state_bytes)
}

/// Tokens redeemed for one authorization code.
#[derive(Debug, Clone)]
pub struct TokenSet {
    pub access_token: SecureString,
    pub id_token: SecureString,
}

/// Raw token endpoint response. Required fields are checked by hand so that a
/// missing token is reported separately from invalid JSON.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    id_token: Option<String>,
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    error: Option<String>,
    error_description: Option<String>,
}

/// Query parameters of a successful authorization redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: String,
    pub state: Option<String>,
}

/// OAuth2 client for Azure AD authentication.
pub struct OAuth2Client {
    client_id: String,
    client_secret: SecureString,
    redirect_uri: String,
    scopes: Vec<String>,
    endpoints: AzureAdEndpoints,
    http_client: reqwest::Client,
}

impl OAuth2Client {
    /// Create a new OAuth2 client from configuration.
    ///
    /// Fails when the token version or tenant cannot be resolved to endpoints.
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        let http_client = build_http_client(&config.http)?;
        Self::with_http_client(config, http_client)
    }

    /// Create a client that shares an existing connection pool.
    pub fn with_http_client(
        config: &Config,
        http_client: reqwest::Client,
    ) -> Result<Self, ConfigError> {
        let provider = &config.provider;
        let endpoints = AzureAdEndpoints::resolve(
            &provider.authority_host,
            &provider.tenant_id,
            provider.token_version,
        )?;

        Ok(Self {
            client_id: provider.client_id.clone(),
            client_secret: provider.client_secret.clone(),
            redirect_uri: provider.callback_url.clone(),
            scopes: provider.scopes.clone(),
            endpoints,
            http_client,
        })
    }

    /// Generate the authorization URL for browser-based sign-in.
    ///
    /// Returns the URL and a CSRF state token that must be verified in the callback.
    pub fn generate_auth_url(&self) -> Result<(Url, String), ConfigError> {
        let state = generate_state();
        let url = self.authorize_url(&state)?;
        Ok((url, state))
    }

    /// Authorization URL carrying the given state.
    pub fn authorize_url(&self, state: &str) -> Result<Url, ConfigError> {
        let mut url = Url::parse(self.endpoints.authorize_url())
            .map_err(|e| ConfigError::InvalidUrl(format!("authorize_url: {}", e)))?;

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.client_id)
                .append_pair("response_type", "code")
                .append_pair("redirect_uri", &self.redirect_uri)
                .append_pair("response_mode", "query")
                .append_pair("state", state);

            if !self.scopes.is_empty() {
                query.append_pair("scope", &self.scopes.join(" "));
            }
        }

        Ok(url)
    }

    /// Exchange an authorization code for an access token and ID token.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenSet, AuthError> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];

        let response = self.post_token_request(&params).await?;

        let access_token = response
            .access_token
            .ok_or_else(|| AuthError::Protocol("token response missing access_token".into()))?;
        let id_token = response
            .id_token
            .ok_or_else(|| AuthError::Protocol("token response missing id_token".into()))?;

        Ok(TokenSet {
            access_token: access_token.into(),
            id_token: id_token.into(),
        })
    }

    /// Acquire an application token via the client credentials grant.
    pub async fn client_credentials_token(&self, scope: &str) -> Result<SecureString, AuthError> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "client_credentials"),
            ("scope", scope),
        ];

        tracing::debug!("Requesting application token for {}", scope);

        let response = self.post_token_request(&params).await?;

        response
            .access_token
            .map(SecureString::from)
            .ok_or_else(|| AuthError::Protocol("token response missing access_token".into()))
    }

    async fn post_token_request(
        &self,
        params: &[(&str, &str)],
    ) -> Result<TokenResponse, AuthError> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params)
            .finish();

        let response = self
            .http_client
            .post(self.endpoints.token_url())
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        if !status.is_success() {
            // Log provider error details for debugging (doesn't expose to user)
            let provider_error = serde_json::from_str::<TokenErrorResponse>(&body).ok();
            let code = provider_error
                .as_ref()
                .and_then(|e| e.error.clone())
                .unwrap_or_default();
            let description = provider_error
                .and_then(|e| e.error_description)
                .unwrap_or_default();
            tracing::error!(
                "Token request failed: HTTP {} {} {}",
                status,
                code,
                description
            );
            return Err(AuthError::Protocol(format!(
                "token endpoint returned HTTP {}",
                status.as_u16()
            )));
        }

        serde_json::from_str(&body)
            .map_err(|e| AuthError::Protocol(format!("invalid token response: {}", e)))
    }
}

/// Parse the authorization redirect URL to extract code and state.
pub fn parse_callback_url(url_string: &str) -> Result<CallbackParams, AuthError> {
    let url = Url::parse(url_string).map_err(|_| AuthError::InvalidAuthCode)?;

    let params: HashMap<_, _> = url.query_pairs().collect();

    // Check for error response
    if let Some(error) = params.get("error") {
        let description = params
            .get("error_description")
            .map(|s| s.to_string())
            .unwrap_or_else(|| error.to_string());
        return Err(AuthError::OAuthFailed(description));
    }

    let code = params
        .get("code")
        .filter(|c| !c.is_empty())
        .ok_or(AuthError::InvalidAuthCode)?
        .to_string();

    let state = params.get("state").map(|s| s.to_string());

    Ok(CallbackParams { code, state })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::test_config;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server_uri: &str) -> OAuth2Client {
        OAuth2Client::new(&test_config(server_uri, "http://127.0.0.1:1")).unwrap()
    }

    #[test]
    fn test_state_generation() {
        let a = generate_state();
        let b = generate_state();
        // 16 bytes base64url without padding
        assert_eq!(a.len(), 22);
        assert_ne!(a, b);
    }

    #[test]
    fn test_authorize_url() {
        let client = client_for("https://login.microsoftonline.com");
        let url = client.authorize_url("xyz").unwrap();

        assert!(url
            .as_str()
            .starts_with("https://login.microsoftonline.com/abc/oauth2/authorize?"));

        let params: HashMap<_, _> = url.query_pairs().collect();
        assert_eq!(params["client_id"], "client1");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["redirect_uri"], "http://localhost:28491/callback");
        assert_eq!(params["state"], "xyz");
        assert_eq!(params["scope"], "openid");
    }

    #[test]
    fn test_authorize_url_without_scopes() {
        let mut config = test_config("https://login.microsoftonline.com", "http://127.0.0.1:1");
        config.provider.scopes.clear();
        let client = OAuth2Client::new(&config).unwrap();
        let (url, state) = client.generate_auth_url().unwrap();

        let params: HashMap<_, _> = url.query_pairs().collect();
        assert!(!params.contains_key("scope"));
        assert_eq!(params["state"], state.as_str());
    }

    #[test]
    fn test_new_rejects_invalid_version() {
        let mut config = test_config("https://login.microsoftonline.com", "http://127.0.0.1:1");
        config.provider.token_version = 7;
        assert!(matches!(
            OAuth2Client::new(&config),
            Err(ConfigError::InvalidTokenVersion(7))
        ));
    }

    #[test]
    fn test_parse_callback_success() {
        let url = "http://localhost:28491/callback?code=abc123&state=xyz789";
        let params = parse_callback_url(url).unwrap();
        assert_eq!(params.code, "abc123");
        assert_eq!(params.state.as_deref(), Some("xyz789"));
    }

    #[test]
    fn test_parse_callback_error() {
        let url = "http://localhost:28491/callback?error=access_denied&error_description=User%20cancelled";
        let result = parse_callback_url(url);
        assert!(matches!(result, Err(AuthError::OAuthFailed(d)) if d == "User cancelled"));
    }

    #[test]
    fn test_parse_callback_missing_code() {
        let url = "http://localhost:28491/callback?state=xyz789";
        let result = parse_callback_url(url);
        assert!(matches!(result, Err(AuthError::InvalidAuthCode)));
    }

    #[tokio::test]
    async fn test_exchange_code_posts_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/abc/oauth2/token"))
            .and(header("content-type", FORM_CONTENT_TYPE))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=the-code"))
            .and(body_string_contains("client_id=client1"))
            .and(body_string_contains("client_secret=s3cret"))
            .and(body_string_contains(
                "redirect_uri=http%3A%2F%2Flocalhost%3A28491%2Fcallback",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "A",
                "id_token": "h.p.s",
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tokens = client_for(&server.uri())
            .exchange_code("the-code")
            .await
            .unwrap();
        assert_eq!(tokens.access_token.as_str(), "A");
        assert_eq!(tokens.id_token.as_str(), "h.p.s");
    }

    #[tokio::test]
    async fn test_exchange_code_missing_id_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"access_token": "A"})),
            )
            .mount(&server)
            .await;

        let result = client_for(&server.uri()).exchange_code("c").await;
        assert!(matches!(result, Err(AuthError::Protocol(m)) if m.contains("id_token")));
    }

    #[tokio::test]
    async fn test_exchange_code_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "AADSTS70008: expired"
            })))
            .mount(&server)
            .await;

        let result = client_for(&server.uri()).exchange_code("c").await;
        assert!(matches!(result, Err(AuthError::Protocol(m)) if m.contains("400")));
    }

    #[tokio::test]
    async fn test_exchange_code_network_error() {
        // Nothing listens on port 1
        let result = client_for("http://127.0.0.1:1").exchange_code("c").await;
        assert!(matches!(result, Err(AuthError::Network(_))));
    }

    #[tokio::test]
    async fn test_client_credentials_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/abc/oauth2/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains(
                "scope=https%3A%2F%2Fgraph.microsoft.com%2F.default",
            ))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"access_token": "APP"})),
            )
            .mount(&server)
            .await;

        let token = client_for(&server.uri())
            .client_credentials_token("https://graph.microsoft.com/.default")
            .await
            .unwrap();
        assert_eq!(token.as_str(), "APP");
    }
}
