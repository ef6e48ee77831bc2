//! OAuth redirect handling.
//!
//! Supabase's implicit flow returns tokens in the URL fragment, which a
//! browser never sends to a server. The local callback server therefore
//! answers `/callback` with a tiny page that re-requests `/callback/relay`
//! with the fragment moved into the query string.

use crate::{AuthError, AuthResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, error, info};
use url::Url;

/// Default OAuth callback port.
pub const DEFAULT_OAUTH_PORT: u16 = 9876;

/// Default time to wait for the browser to come back.
pub const DEFAULT_OAUTH_TIMEOUT: Duration = Duration::from_secs(120);

/// Tokens carried by an OAuth redirect.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: Option<i64>,
    pub expires_at: Option<i64>,
}

impl std::fmt::Debug for OAuthTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthTokens")
            .field("expires_in", &self.expires_in)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl OAuthTokens {
    /// A redirect URL carrying these tokens in its query, as accepted by
    /// [`crate::SessionStore::complete_sign_in`].
    pub fn to_callback_url(&self, base: &str) -> AuthResult<Url> {
        let mut url = Url::parse(base)?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("access_token", &self.access_token)
                .append_pair("refresh_token", &self.refresh_token);
            if let Some(expires_in) = self.expires_in {
                query.append_pair("expires_in", &expires_in.to_string());
            }
            if let Some(expires_at) = self.expires_at {
                query.append_pair("expires_at", &expires_at.to_string());
            }
        }
        Ok(url)
    }
}

/// Extract tokens from a redirect URL, looking at the fragment first and the
/// query second.
pub fn parse_callback_url(url: &Url) -> AuthResult<OAuthTokens> {
    let mut params: HashMap<String, String> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if let Some(fragment) = url.fragment() {
        params.extend(
            url::form_urlencoded::parse(fragment.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned())),
        );
    }
    tokens_from_params(&params)
}

fn tokens_from_params(params: &HashMap<String, String>) -> AuthResult<OAuthTokens> {
    if let Some(err) = params.get("error") {
        let description = params
            .get("error_description")
            .map(String::as_str)
            .unwrap_or("no description");
        return Err(AuthError::OAuth(format!("{}: {}", err, description)));
    }

    match (params.get("access_token"), params.get("refresh_token")) {
        (Some(access), Some(refresh)) if !access.is_empty() && !refresh.is_empty() => {
            Ok(OAuthTokens {
                access_token: access.clone(),
                refresh_token: refresh.clone(),
                expires_in: params.get("expires_in").and_then(|v| v.parse().ok()),
                expires_at: params.get("expires_at").and_then(|v| v.parse().ok()),
            })
        }
        _ => Err(AuthError::OAuth(
            "Missing access_token or refresh_token in redirect".to_string(),
        )),
    }
}

/// Local HTTP server that receives the OAuth redirect.
pub struct OAuthCallbackServer {
    port: u16,
    timeout: Duration,
}

impl OAuthCallbackServer {
    pub fn new(port: u16, timeout: Duration) -> Self {
        Self { port, timeout }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_OAUTH_PORT, DEFAULT_OAUTH_TIMEOUT)
    }

    /// The URL to pass as `redirect_to`.
    pub fn callback_url(&self) -> String {
        format!("http://localhost:{}/callback", self.port)
    }

    /// Bind, wait for one relayed redirect, and shut down.
    ///
    /// The caller opens the browser after this has started listening.
    pub async fn wait_for_callback(&self) -> AuthResult<OAuthTokens> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    pub async fn bind(&self) -> AuthResult<TcpListener> {
        let addr = format!("127.0.0.1:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| AuthError::OAuth(format!("Failed to bind to {}: {}", addr, e)))?;
        info!(port = self.port, "OAuth callback server listening");
        Ok(listener)
    }

    pub async fn serve(&self, listener: TcpListener) -> AuthResult<OAuthTokens> {
        let (tx, rx) = oneshot::channel::<AuthResult<OAuthTokens>>();
        let tx = Arc::new(Mutex::new(Some(tx)));

        let server = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((socket, _)) => {
                        let tx = tx.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(socket, tx).await {
                                error!(error = %e, "OAuth callback connection failed");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "OAuth callback accept failed");
                        break;
                    }
                }
            }
        });

        let result = match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(AuthError::OAuth("Callback channel closed".to_string())),
            Err(_) => Err(AuthError::Timeout),
        };

        server.abort();
        result
    }
}

type ResultSlot = Arc<Mutex<Option<oneshot::Sender<AuthResult<OAuthTokens>>>>>;

async fn handle_connection(mut socket: TcpStream, tx: ResultSlot) -> AuthResult<()> {
    let (reader, mut writer) = socket.split();
    let mut reader = BufReader::new(reader);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;

    // Drain headers so the socket closes cleanly.
    let mut header = String::new();
    loop {
        header.clear();
        let read = reader.read_line(&mut header).await?;
        if read == 0 || header.trim().is_empty() {
            break;
        }
    }

    let mut parts = request_line.split_whitespace();
    let (Some("GET"), Some(target)) = (parts.next(), parts.next()) else {
        write_response(&mut writer, 405, "Method Not Allowed", "Method Not Allowed").await?;
        return Ok(());
    };

    // Base only used to let `Url` parse the request target.
    let url = Url::parse("http://localhost")?.join(target)?;
    debug!(path = %url.path(), "OAuth callback request");

    match url.path() {
        "/callback" => {
            write_response(&mut writer, 200, "OK", RELAY_PAGE).await?;
        }
        "/callback/relay" => {
            let result = parse_callback_url(&url);
            let body = match &result {
                Ok(_) => result_page("Signed in", "You can close this window and return to the terminal."),
                Err(e) => result_page("Sign-in failed", &e.to_string()),
            };
            write_response(&mut writer, 200, "OK", &body).await?;

            if let Some(tx) = tx.lock().await.take() {
                let _ = tx.send(result);
            }
        }
        _ => {
            write_response(&mut writer, 404, "Not Found", "Not Found").await?;
        }
    }

    Ok(())
}

async fn write_response(
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

const RELAY_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Summarizer - Signing in</title></head>
<body style="font-family: system-ui; text-align: center; padding: 50px;">
<p>Completing sign-in...</p>
<script>
  var params = window.location.hash.substring(1) || window.location.search.substring(1);
  window.location.replace('/callback/relay?' + params);
</script>
</body>
</html>"#;

fn result_page(title: &str, message: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Summarizer - {title}</title></head>
<body style="font-family: system-ui; text-align: center; padding: 50px;">
<h1>{title}</h1>
<p>{message}</p>
</body>
</html>"#
    )
}
