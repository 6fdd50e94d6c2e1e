//! Loopback callback server for the login dialog's redirect handshake.
//!
//! The login route navigates the dialog to the sign-in broker with a
//! `callback` pointing at this server. The broker redirects back with
//! `access_token`, `account_id` and the `state` nonce as query parameters.

use crate::{AuthError, AuthResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;

/// Default callback port.
pub const DEFAULT_OAUTH_PORT: u16 = 9876;

/// Default time to wait for the redirect, in seconds.
pub const DEFAULT_OAUTH_TIMEOUT_SECS: u64 = 300;

/// Redirect result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthResult {
    pub success: bool,
    pub access_token: Option<String>,
    /// Identity-provider home account id.
    pub account_id: Option<String>,
    pub error: Option<String>,
}

impl OAuthResult {
    pub fn success(access_token: String, account_id: String) -> Self {
        Self {
            success: true,
            access_token: Some(access_token),
            account_id: Some(account_id),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            access_token: None,
            account_id: None,
            error: Some(error.into()),
        }
    }
}

/// Callback server that listens for the broker redirect.
#[derive(Debug, Clone)]
pub struct OAuthCallbackServer {
    port: u16,
    timeout: Duration,
}

impl OAuthCallbackServer {
    /// `port` 0 picks a free port at bind time.
    pub fn new(port: u16, timeout_secs: u64) -> Self {
        Self {
            port,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_OAUTH_PORT, DEFAULT_OAUTH_TIMEOUT_SECS)
    }

    /// Bind the listener and start accepting redirects carrying `expected_state`.
    pub async fn start(&self, expected_state: &str) -> AuthResult<CallbackListener> {
        let addr = format!("127.0.0.1:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| AuthError::OAuth(format!("Failed to bind to {}: {}", addr, e)))?;
        let port = listener.local_addr()?.port();

        info!(port, "OAuth callback server listening");

        let (tx, rx) = oneshot::channel::<OAuthResult>();
        let tx = Arc::new(tokio::sync::Mutex::new(Some(tx)));
        let expected_state = Arc::new(expected_state.to_string());

        let server_handle = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((mut socket, _)) => {
                        let tx = tx.clone();
                        let expected_state = expected_state.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(&mut socket, &expected_state, tx).await
                            {
                                error!("Error handling connection: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Accept error: {}", e);
                        break;
                    }
                }
            }
        });

        Ok(CallbackListener {
            port,
            timeout: self.timeout,
            rx,
            server_handle,
        })
    }
}

/// A bound callback server waiting for one redirect.
pub struct CallbackListener {
    port: u16,
    timeout: Duration,
    rx: oneshot::Receiver<OAuthResult>,
    server_handle: JoinHandle<()>,
}

impl CallbackListener {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn callback_url(&self) -> String {
        format!("http://localhost:{}/callback", self.port)
    }

    /// Sign-in broker URL that redirects back to this listener.
    pub fn auth_url(&self, broker_url: &str, state: &str) -> AuthResult<String> {
        let mut url = Url::parse(broker_url)
            .map_err(|e| AuthError::OAuth(format!("Invalid broker URL {}: {}", broker_url, e)))?;
        url.query_pairs_mut()
            .append_pair("callback", &self.callback_url())
            .append_pair("state", state);
        Ok(url.into())
    }

    /// Wait for the redirect, then shut the server down.
    pub async fn wait(self) -> AuthResult<OAuthResult> {
        let result = match tokio::time::timeout(self.timeout, self.rx).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) => Ok(OAuthResult::failure("Internal error: channel closed")),
            Err(_) => Err(AuthError::Timeout),
        };

        self.server_handle.abort();
        result
    }
}

/// Handle an incoming HTTP connection.
async fn handle_connection(
    socket: &mut tokio::net::TcpStream,
    expected_state: &str,
    tx: Arc<tokio::sync::Mutex<Option<oneshot::Sender<OAuthResult>>>>,
) -> AuthResult<()> {
    let (reader, mut writer) = socket.split();
    let mut reader = BufReader::new(reader);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;

    debug!(request = %request_line.trim(), "Received request");

    // GET /callback?... HTTP/1.1
    let Some(target) = request_line
        .strip_prefix("GET ")
        .and_then(|rest| rest.split_whitespace().next())
    else {
        send_response(&mut writer, 405, "Method Not Allowed", "Method Not Allowed").await?;
        return Ok(());
    };

    let url = Url::parse("http://localhost")
        .and_then(|base| base.join(target))
        .map_err(|e| AuthError::OAuth(format!("Malformed callback request: {}", e)))?;

    if url.path() != "/callback" {
        send_response(&mut writer, 404, "Not Found", "Not Found").await?;
        return Ok(());
    }

    let params: HashMap<String, String> = url.query_pairs().into_owned().collect();

    if params.get("state").map(String::as_str) != Some(expected_state) {
        warn!("Callback state mismatch, ignoring request");
        send_response(&mut writer, 400, "Bad Request", &error_page("Invalid state")).await?;
        return Ok(());
    }

    let result = if let Some(err) = params.get("error") {
        let description = params
            .get("error_description")
            .map(|d| format!("{}: {}", err, d))
            .unwrap_or_else(|| err.clone());
        send_response(&mut writer, 200, "OK", &error_page(&description)).await?;
        OAuthResult::failure(description)
    } else if let (Some(token), Some(account)) = (params.get("access_token"), params.get("account_id")) {
        send_response(&mut writer, 200, "OK", &success_page()).await?;
        OAuthResult::success(token.clone(), account.clone())
    } else {
        send_response(
            &mut writer,
            200,
            "OK",
            &error_page("Missing required parameters"),
        )
        .await?;
        OAuthResult::failure("Missing required parameters")
    };

    if let Some(tx) = tx.lock().await.take() {
        let _ = tx.send(result);
    }

    Ok(())
}

/// Send an HTTP response.
async fn send_response(
    writer: &mut tokio::net::tcp::WriteHalf<'_>,
    status_code: u16,
    status_text: &str,
    body: &str,
) -> AuthResult<()> {
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status_code,
        status_text,
        body.len(),
        body
    );
    writer.write_all(response.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

fn success_page() -> String {
    r#"<!DOCTYPE html>
<html>
<head><title>Sign-in complete</title></head>
<body style="font-family: system-ui; text-align: center; padding: 40px;">
<h1 style="color: #22c55e;">Signed in</h1>
<p style="color: #666;">Returning to the add-in...</p>
</body>
</html>"#
        .to_string()
}

fn error_page(error: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Sign-in failed</title></head>
<body style="font-family: system-ui; text-align: center; padding: 40px;">
<h1 style="color: #ef4444;">Sign-in failed</h1>
<p style="color: #666;">Error: {}</p>
</body>
</html>"#,
        html_escape(error)
    )
}

fn html_escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Send one GET request to a local port and return the raw response.
#[cfg(test)]
pub(crate) async fn send_test_request(port: u16, target: &str) -> String {
    use tokio::io::AsyncReadExt;

    let mut stream = tokio::net::TcpStream::connect(("127.0.0.1", port))
        .await
        .unwrap();
    stream
        .write_all(format!("GET {} HTTP/1.1\r\nHost: localhost\r\n\r\n", target).as_bytes())
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_callback_url_uses_bound_port() {
        let listener = OAuthCallbackServer::new(0, 5).start("s").await.unwrap();
        assert_ne!(listener.port(), 0);
        assert_eq!(
            listener.callback_url(),
            format!("http://localhost:{}/callback", listener.port())
        );
    }

    #[tokio::test]
    async fn test_auth_url_encodes_callback_and_state() {
        let listener = OAuthCallbackServer::new(0, 5).start("nonce-1").await.unwrap();
        let auth_url = listener
            .auth_url("https://addin.example.test/auth/addin", "nonce-1")
            .unwrap();

        let url = Url::parse(&auth_url).unwrap();
        let params: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params.get("callback"), Some(&listener.callback_url()));
        assert_eq!(params.get("state").map(String::as_str), Some("nonce-1"));
        assert!(auth_url.contains("localhost%3A"));
    }

    #[tokio::test]
    async fn test_auth_url_rejects_invalid_broker() {
        let listener = OAuthCallbackServer::new(0, 5).start("s").await.unwrap();
        assert!(matches!(
            listener.auth_url("not a url", "s"),
            Err(AuthError::OAuth(_))
        ));
    }

    #[tokio::test]
    async fn test_successful_redirect() {
        let listener = OAuthCallbackServer::new(0, 5).start("nonce").await.unwrap();
        let port = listener.port();

        let response = send_test_request(
            port,
            "/callback?access_token=tok%2B1&account_id=uid.tid&state=nonce",
        )
        .await;
        assert!(response.starts_with("HTTP/1.1 200 OK"));

        let result = listener.wait().await.unwrap();
        assert_eq!(result, OAuthResult::success("tok+1".into(), "uid.tid".into()));
    }

    #[tokio::test]
    async fn test_error_redirect() {
        let listener = OAuthCallbackServer::new(0, 5).start("nonce").await.unwrap();
        let port = listener.port();

        send_test_request(
            port,
            "/callback?error=access_denied&error_description=User+cancelled&state=nonce",
        )
        .await;

        let result = listener.wait().await.unwrap();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("access_denied: User cancelled"));
    }

    #[tokio::test]
    async fn test_wrong_state_and_paths_are_ignored() {
        let listener = OAuthCallbackServer::new(0, 5).start("nonce").await.unwrap();
        let port = listener.port();

        let response = send_test_request(port, "/favicon.ico").await;
        assert!(response.starts_with("HTTP/1.1 404"));

        let response =
            send_test_request(port, "/callback?access_token=t&account_id=a&state=forged").await;
        assert!(response.starts_with("HTTP/1.1 400"));

        send_test_request(port, "/callback?access_token=t&account_id=a&state=nonce").await;
        assert!(listener.wait().await.unwrap().success);
    }

    #[tokio::test]
    async fn test_missing_parameters() {
        let listener = OAuthCallbackServer::new(0, 5).start("nonce").await.unwrap();
        let port = listener.port();

        send_test_request(port, "/callback?access_token=t&state=nonce").await;

        let result = listener.wait().await.unwrap();
        assert_eq!(result.error.as_deref(), Some("Missing required parameters"));
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let listener = OAuthCallbackServer::new(0, 0).start("nonce").await.unwrap();
        assert!(matches!(listener.wait().await, Err(AuthError::Timeout)));
    }

    #[test]
    fn test_error_page_escapes_markup() {
        let page = error_page("<script>alert(1)</script>");
        assert!(!page.contains("<script>"));
        assert!(page.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_default_constants() {
        assert_eq!(DEFAULT_OAUTH_PORT, 9876);
        assert_eq!(DEFAULT_OAUTH_TIMEOUT_SECS, 300);
    }
}
