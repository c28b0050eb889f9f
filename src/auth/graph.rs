//! Microsoft Graph API client for directory user lookups.

use crate::auth::claims::Claims;
use crate::config::Config;
use crate::error::{ConfigError, LookupError};
use tracing::debug;
use url::Url;

/// Microsoft Graph API client.
pub struct GraphClient {
    base_url: Url,
    http_client: reqwest::Client,
}

impl GraphClient {
    /// Create a Graph client for `[directory] graph_base_url`.
    pub fn with_http_client(
        config: &Config,
        http_client: reqwest::Client,
    ) -> Result<Self, ConfigError> {
        let base_url = Url::parse(&config.directory.graph_base_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("graph_base_url: {}", e)))?;

        if base_url.cannot_be_a_base() {
            return Err(ConfigError::InvalidUrl(format!(
                "graph_base_url: {} cannot be a base URL",
                base_url
            )));
        }

        Ok(Self {
            base_url,
            http_client,
        })
    }

    fn user_url(&self, oid: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["users", oid]);
        }
        url
    }

    /// Fetch a directory user's profile by object id, returned verbatim.
    pub async fn get_user(&self, access_token: &str, oid: &str) -> Result<Claims, LookupError> {
        let url = self.user_url(oid);

        debug!("Fetching directory profile from {}", url);

        let response = self
            .http_client
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| LookupError::Network(e.to_string()))?;

        let status = response.status();
        match status.as_u16() {
            200..=299 => response
                .json::<Claims>()
                .await
                .map_err(|e| LookupError::Protocol(e.to_string())),
            401 => Err(LookupError::Unauthorized),
            403 => Err(LookupError::Forbidden),
            429 => Err(LookupError::RateLimited),
            // Don't expose raw API error details - just log status code
            status => Err(LookupError::Protocol(format!("HTTP {}", status))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::oauth::build_http_client;
    use crate::config::tests::test_config;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(graph_base: &str) -> GraphClient {
        let config = test_config("http://127.0.0.1:1", graph_base);
        let http = build_http_client(&config.http).unwrap();
        GraphClient::with_http_client(&config, http).unwrap()
    }

    #[test]
    fn test_user_url() {
        let client = client_for("https://graph.microsoft.com/v1.0");
        assert_eq!(
            client.user_url("0000-1111").as_str(),
            "https://graph.microsoft.com/v1.0/users/0000-1111"
        );

        let client = client_for("https://graph.microsoft.com/v1.0/");
        assert_eq!(
            client.user_url("a/b").as_str(),
            "https://graph.microsoft.com/v1.0/users/a%2Fb"
        );
    }

    #[test]
    fn test_rejects_bad_base_url() {
        let config = test_config("http://127.0.0.1:1", "not a url");
        let http = build_http_client(&config.http).unwrap();
        assert!(matches!(
            GraphClient::with_http_client(&config, http),
            Err(ConfigError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_get_user() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1.0/users/oid-1"))
            .and(header("authorization", "Bearer APP"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "oid-1",
                "displayName": "Alice",
                "jobTitle": "Engineer"
            })))
            .mount(&server)
            .await;

        let profile = client_for(&format!("{}/v1.0", server.uri()))
            .get_user("APP", "oid-1")
            .await
            .unwrap();
        assert_eq!(profile["displayName"], "Alice");
        assert_eq!(profile.len(), 3);
    }

    #[tokio::test]
    async fn test_get_user_status_mapping() {
        for (status, check) in [
            (401u16, "unauthorized"),
            (403, "forbidden"),
            (429, "rate"),
            (500, "protocol"),
        ] {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(status))
                .mount(&server)
                .await;

            let result = client_for(&server.uri()).get_user("t", "oid").await;
            let ok = match (check, result) {
                ("unauthorized", Err(LookupError::Unauthorized)) => true,
                ("forbidden", Err(LookupError::Forbidden)) => true,
                ("rate", Err(LookupError::RateLimited)) => true,
                ("protocol", Err(LookupError::Protocol(_))) => true,
                _ => false,
            };
            assert!(ok, "HTTP {} mapped incorrectly", status);
        }
    }

    #[tokio::test]
    async fn test_get_user_invalid_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let result = client_for(&server.uri()).get_user("t", "oid").await;
        assert!(matches!(result, Err(LookupError::Protocol(_))));
    }
}
