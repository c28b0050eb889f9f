//! Local HTTP callback listener for the authorization redirect.
//!
//! Binds the host and port of the configured callback URL, shows a short page
//! to the user, and hands the full redirect URL back to the caller.

use crate::error::{AuthError, ConfigError};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};
use url::Url;

/// How long a single connection may take to send its request line.
const READ_TIMEOUT: Duration = Duration::from_secs(5);

const MAX_REQUEST_LINE: u64 = 8192;

/// Listener waiting for a single authorization redirect.
pub struct CallbackServer {
    listener: TcpListener,
    origin: String,
    path: String,
}

impl CallbackServer {
    /// Bind to the address named by `callback_url`.
    pub async fn bind(callback_url: &str) -> Result<Self, ConfigError> {
        let url = Url::parse(callback_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("callback_url: {}", e)))?;

        let host = match url.host_str() {
            Some("localhost") | None => "127.0.0.1",
            Some(host) => host,
        };
        let port = url.port_or_known_default().unwrap_or(80);

        let listener = TcpListener::bind((host, port))
            .await
            .map_err(|e| ConfigError::CallbackListener(format!("{}:{}: {}", host, port, e)))?;

        let origin = url.origin().ascii_serialization();
        info!("OAuth callback server listening on {}:{}", host, port);

        Ok(Self {
            listener,
            origin,
            path: url.path().to_string(),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Wait until the redirect arrives and return its full URL.
    pub async fn wait(self, timeout: Duration) -> Result<String, AuthError> {
        tokio::time::timeout(timeout, self.accept_loop())
            .await
            .map_err(|_| AuthError::CallbackTimeout)?
    }

    async fn accept_loop(&self) -> Result<String, AuthError> {
        loop {
            let (stream, peer_addr) = self.listener.accept().await.map_err(|e| {
                error!("Error accepting connection: {}", e);
                AuthError::Network(format!("callback listener: {}", e))
            })?;

            debug!("Connection from {}", peer_addr);
            if let Some(path) = self.handle_connection(stream).await {
                info!("OAuth callback received");
                return Ok(format!("{}{}", self.origin, path));
            }
        }
    }

    /// Returns the request path if this was a redirect for us.
    async fn handle_connection(&self, mut stream: TcpStream) -> Option<String> {
        let mut request_line = String::new();
        let mut reader = BufReader::new(&mut stream).take(MAX_REQUEST_LINE);
        match tokio::time::timeout(READ_TIMEOUT, reader.read_line(&mut request_line)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                debug!("Failed to read request: {}", e);
                return None;
            }
            Err(_) => {
                debug!("Timed out reading request");
                return None;
            }
        }

        let request_line = request_line.trim_end();
        debug!("Received request: {}", request_line);

        let mut parts = request_line.split_whitespace();
        let (Some(method), Some(path)) = (parts.next(), parts.next()) else {
            send_response(&mut stream, 400, "Bad Request", "text/plain", "Bad Request").await;
            return None;
        };

        if method != "GET" {
            send_response(
                &mut stream,
                405,
                "Method Not Allowed",
                "text/plain",
                "Method Not Allowed",
            )
            .await;
            return None;
        }

        let request_path = path.split('?').next().unwrap_or(path);
        if request_path != self.path {
            send_response(&mut stream, 404, "Not Found", "text/plain", "Not Found").await;
            return None;
        }

        let query = Url::parse(&format!("{}{}", self.origin, path)).ok()?;
        let mut pairs = query.query_pairs();

        if pairs.clone().any(|(k, _)| k == "error") {
            let description = pairs
                .clone()
                .find(|(k, _)| k == "error_description")
                .map(|(_, v)| v.into_owned())
                .unwrap_or_else(|| "Authentication was cancelled or failed.".to_string());
            send_html(&mut stream, &result_page(false, &description)).await;
            // Still return the URL so the caller can surface the provider error
            return Some(path.to_string());
        }

        if !pairs.any(|(k, _)| k == "code") {
            send_response(
                &mut stream,
                400,
                "Bad Request",
                "text/plain",
                "Missing authorization code",
            )
            .await;
            return None;
        }

        send_html(&mut stream, &result_page(true, "You have been signed in.")).await;
        Some(path.to_string())
    }
}

fn result_page(success: bool, message: &str) -> String {
    let title = if success {
        "Authentication Successful"
    } else {
        "Authentication Failed"
    };
    let hint = if success {
        "You can close this tab now."
    } else {
        "You can close this tab and try again."
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>{title}</title>
</head>
<body style="font-family: -apple-system, 'Segoe UI', Roboto, sans-serif; text-align: center; padding-top: 4rem;">
    <h1>{title}</h1>
    <p>{message}</p>
    <p>{hint}</p>
</body>
</html>"#,
        title = title,
        message = escape_html(message),
        hint = hint
    )
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

async fn send_html(stream: &mut TcpStream, html: &str) {
    send_response(stream, 200, "OK", "text/html; charset=utf-8", html).await;
}

async fn send_response(
    stream: &mut TcpStream,
    status: u16,
    reason: &str,
    content_type: &str,
    body: &str,
) {
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason,
        content_type,
        body.len(),
        body
    );

    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.flush().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::oauth::parse_callback_url;

    async fn send(addr: SocketAddr, request: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_receives_callback() {
        let server = CallbackServer::bind("http://127.0.0.1:0/callback").await.unwrap();
        let addr = server.local_addr().unwrap();
        let waiter = tokio::spawn(server.wait(Duration::from_secs(10)));

        let response = send(addr, "POST /callback?code=x HTTP/1.1\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.1 405"));

        let response = send(addr, "GET /favicon.ico HTTP/1.1\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.1 404"));

        let response = send(addr, "GET /callback?state=s HTTP/1.1\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.1 400"));

        let response = send(
            addr,
            "GET /callback?code=abc&state=xyz HTTP/1.1\r\nHost: x\r\n\r\n",
        )
        .await;
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("Authentication Successful"));

        let url = waiter.await.unwrap().unwrap();
        let params = parse_callback_url(&url).unwrap();
        assert_eq!(params.code, "abc");
        assert_eq!(params.state.as_deref(), Some("xyz"));
    }

    #[tokio::test]
    async fn test_request_line_split_across_writes() {
        let server = CallbackServer::bind("http://127.0.0.1:0/callback").await.unwrap();
        let addr = server.local_addr().unwrap();
        let waiter = tokio::spawn(server.wait(Duration::from_secs(10)));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"GET /callback?co").await.unwrap();
        stream.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        stream
            .write_all(b"de=abc&state=xyz HTTP/1.1\r\nHost: x\r\n\r\n")
            .await
            .unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"));

        let url = waiter.await.unwrap().unwrap();
        assert_eq!(parse_callback_url(&url).unwrap().code, "abc");
    }

    #[tokio::test]
    async fn test_error_callback_is_returned() {
        let server = CallbackServer::bind("http://localhost:0/callback").await.unwrap();
        let addr = server.local_addr().unwrap();
        let waiter = tokio::spawn(server.wait(Duration::from_secs(10)));

        let response = send(
            addr,
            "GET /callback?error=access_denied&error_description=%3Cb%3Enope HTTP/1.1\r\n\r\n",
        )
        .await;
        assert!(response.contains("Authentication Failed"));
        assert!(response.contains("&lt;b&gt;nope"));

        let url = waiter.await.unwrap().unwrap();
        assert!(matches!(
            parse_callback_url(&url),
            Err(AuthError::OAuthFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_timeout() {
        let server = CallbackServer::bind("http://127.0.0.1:0/callback").await.unwrap();
        let result = server.wait(Duration::from_millis(50)).await;
        assert!(matches!(result, Err(AuthError::CallbackTimeout)));
    }
}
