//! OAuth 2.0 for the Google Sheets and Forms APIs.
//!
//! `ledger auth` runs the installed-app consent flow: the user opens the consent URL, Google
//! redirects the browser to a one-shot listener on `localhost:3030`, and the authorization code is
//! exchanged (with PKCE) for an access token and a refresh token. Every later invocation loads
//! `token.json` and renews the access token with the refresh token when it is about to expire.

use crate::api::files::{File, SecretFile, TokenFile};
use crate::api::OAUTH_SCOPES;
use crate::{Config, Result};
use anyhow::{anyhow, bail, Context};
use chrono::Utc;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use oauth2::basic::{BasicClient, BasicTokenResponse};
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    PkceCodeChallenge, RedirectUrl, RefreshToken, Scope, TokenResponse, TokenUrl,
};
use std::convert::Infallible;
use std::path::Path;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const OAUTH_CALLBACK_PORT: u16 = 3030;
const CONSENT_TIMEOUT: Duration = Duration::from_secs(300);

type GoogleClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Holds the client credentials and the stored token, and keeps the token fresh.
pub(crate) struct TokenProvider {
    secret: SecretFile,
    token: File<TokenFile>,
}

impl TokenProvider {
    /// Runs the consent flow and saves the resulting token to `token_path`.
    pub(crate) async fn initialize(secret_path: &Path, token_path: &Path) -> Result<Self> {
        let secret = SecretFile::load(secret_path).await?;
        let client = oauth_client(&secret)?;

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let (auth_url, csrf_token) = client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(OAUTH_SCOPES.iter().map(|s| Scope::new(s.to_string())))
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .set_pkce_challenge(pkce_challenge)
            .url();

        info!("Open this URL in your browser to authorize access to your spreadsheet and form:");
        info!("{auth_url}");

        let callback = tokio::time::timeout(CONSENT_TIMEOUT, wait_for_callback())
            .await
            .context("Timed out waiting for the OAuth consent")??;
        if callback.state != *csrf_token.secret() {
            bail!("The OAuth callback carried an unexpected state, the consent was not completed");
        }

        let response = client
            .exchange_code(AuthorizationCode::new(callback.code))
            .set_pkce_verifier(pkce_verifier)
            .request_async(&http_client()?)
            .await
            .context("Unable to exchange the authorization code for a token")?;

        let refresh_token = response
            .refresh_token()
            .map(|t| t.secret().to_string())
            .context("Google did not return a refresh token")?;
        let token_file = TokenFile::new(
            granted_scopes(&response),
            response.access_token().secret().to_string(),
            refresh_token,
            expires_at(&response),
        );
        token_file.validate_scopes()?;

        let token = File::new(token_path, token_file);
        token.save().await?;
        info!("Tokens saved to {}", token_path.display());
        Ok(Self { secret, token })
    }

    /// Loads the client secret and the stored token named in `config`.
    pub(crate) async fn load(config: &Config) -> Result<Self> {
        let secret = SecretFile::load(&config.client_secret_path()).await?;
        let token: File<TokenFile> = File::load(config.token_path())
            .await
            .context("Unable to load the OAuth token, run 'ledger auth' first")?;
        token.data().validate_scopes()?;
        Ok(Self { secret, token })
    }

    /// Exchanges the refresh token for a new access token and saves it.
    pub(crate) async fn refresh(&mut self) -> Result<()> {
        debug!("Refreshing the OAuth access token");
        let client = oauth_client(&self.secret)?;
        let refresh_token = RefreshToken::new(self.token.data().refresh_token().to_string());
        let response = client
            .exchange_refresh_token(&refresh_token)
            .request_async(&http_client()?)
            .await
            .context("Unable to refresh the OAuth token, run 'ledger auth' again")?;

        self.token.data_mut().update(
            response.access_token().secret().to_string(),
            expires_at(&response),
            response.refresh_token().map(|t| t.secret().to_string()),
        );
        self.token.save().await
    }

    /// Returns an access token that is valid for at least a few more minutes.
    pub(crate) async fn token_with_refresh(&mut self) -> Result<&str> {
        if self.token.data().is_expired() {
            self.refresh().await?;
        }
        Ok(self.token.data().access_token())
    }

    pub(crate) fn expires_at(&self) -> chrono::DateTime<Utc> {
        self.token.data().expires_at()
    }
}

fn oauth_client(secret: &SecretFile) -> Result<GoogleClient> {
    let redirect = format!("http://localhost:{OAUTH_CALLBACK_PORT}");
    Ok(BasicClient::new(ClientId::new(secret.client_id().to_string()))
        .set_client_secret(ClientSecret::new(secret.client_secret().to_string()))
        .set_auth_uri(AuthUrl::new(secret.auth_uri().to_string()).context("Invalid auth_uri")?)
        .set_token_uri(TokenUrl::new(secret.token_uri().to_string()).context("Invalid token_uri")?)
        .set_redirect_uri(RedirectUrl::new(redirect).context("Invalid redirect URI")?))
}

/// The token endpoint must not be allowed to redirect.
fn http_client() -> Result<reqwest::Client> {
    reqwest::ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .context("Unable to build the OAuth HTTP client")
}

fn granted_scopes(response: &BasicTokenResponse) -> Vec<String> {
    match response.scopes() {
        Some(scopes) => scopes.iter().map(|s| s.to_string()).collect(),
        None => OAUTH_SCOPES.iter().map(|s| s.to_string()).collect(),
    }
}

fn expires_at(response: &BasicTokenResponse) -> chrono::DateTime<Utc> {
    let lifetime = response
        .expires_in()
        .and_then(|d| chrono::Duration::from_std(d).ok())
        .unwrap_or_else(|| chrono::Duration::hours(1));
    Utc::now() + lifetime
}

#[derive(Debug)]
struct Callback {
    code: String,
    state: String,
}

/// Accepts connections on the callback port until one of them carries the authorization code.
async fn wait_for_callback() -> Result<Callback> {
    let listener = TcpListener::bind(("127.0.0.1", OAUTH_CALLBACK_PORT))
        .await
        .with_context(|| format!("Unable to listen on port {OAUTH_CALLBACK_PORT}"))?;
    debug!("Waiting for the OAuth callback on port {OAUTH_CALLBACK_PORT}");
    let (tx, mut rx) = mpsc::channel::<std::result::Result<Callback, String>>(1);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, _) = accepted.context("Unable to accept the OAuth callback")?;
                let tx = tx.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req| handle_callback(req, tx.clone()));
                    if let Err(e) = http1::Builder::new()
                        .keep_alive(false)
                        .serve_connection(TokioIo::new(stream), service)
                        .await
                    {
                        warn!("OAuth callback connection failed: {e}");
                    }
                });
            }
            Some(received) = rx.recv() => {
                return received.map_err(|e| anyhow!("The OAuth consent failed: {e}"));
            }
        }
    }
}

async fn handle_callback(
    req: Request<Incoming>,
    tx: mpsc::Sender<std::result::Result<Callback, String>>,
) -> std::result::Result<Response<String>, Infallible> {
    let query = req.uri().query().unwrap_or_default();
    let params: std::collections::HashMap<String, String> =
        url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();

    let received = match (params.get("code"), params.get("state"), params.get("error")) {
        (_, _, Some(error)) => Err(error.clone()),
        (Some(code), Some(state), None) => Ok(Callback {
            code: code.clone(),
            state: state.clone(),
        }),
        // Browsers also ask for things like /favicon.ico.
        _ => return Ok(plain(StatusCode::NOT_FOUND, "Not found")),
    };

    let (status, message) = match &received {
        Ok(_) => (
            StatusCode::OK,
            "Authorization complete. You can close this window.",
        ),
        Err(_) => (
            StatusCode::BAD_REQUEST,
            "Authorization failed. Check the terminal for details.",
        ),
    };
    let _ = tx.send(received).await;
    Ok(plain(status, message))
}

fn plain(status: StatusCode, body: &str) -> Response<String> {
    let mut response = Response::new(body.to_string());
    *response.status_mut() = status;
    response
}
