//! Minimal Vault / OpenBao HTTP client.
//!
//! Only the handful of endpoints this tool needs:
//!
//! 1. `POST {addr}/v1/auth/approle/login`  → client token (AppRole only)
//! 2. `GET  {addr}/v1/auth/token/lookup-self` → session verification
//! 3. `GET  {addr}/v1/{path}`  → logical read (KV v2: `{"data": {"data": {...}}}`)
//! 4. `POST {addr}/v1/{path}`  → logical write

use std::time::Duration;

use reqwest::{Client as HttpClient, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use zeroize::Zeroizing;

pub const TOKEN_HEADER: &str = "X-Vault-Token";

#[derive(thiserror::Error, Debug)]
pub enum VaultError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("vault returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("unexpected response: {0}")]
    Decode(String),
}

#[derive(Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    errors: Vec<String>,
}

#[derive(Deserialize)]
struct LoginResponse {
    auth: Option<LoginAuth>,
}

#[derive(Deserialize)]
struct LoginAuth {
    client_token: String,
}

pub struct VaultClient {
    http: HttpClient,
    address: String,
    token: Option<Zeroizing<String>>,
}

impl VaultClient {
    pub fn new(address: &str) -> Result<Self, VaultError> {
        let http = HttpClient::builder()
            .user_agent(format!("sm-ssh-add/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            address: address.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn set_token(&mut self, token: Zeroizing<String>) {
        self.token = Some(token);
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.address, path.trim_start_matches('/'))
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.header(TOKEN_HEADER, token.as_str()),
            None => req,
        }
    }

    /// Exchange an AppRole role-id / secret-id pair for a client token.
    pub async fn approle_login(
        &self,
        role_id: &str,
        secret_id: &str,
    ) -> Result<Zeroizing<String>, VaultError> {
        let resp = self
            .http
            .post(self.url("auth/approle/login"))
            .json(&serde_json::json!({ "role_id": role_id, "secret_id": secret_id }))
            .send()
            .await?;

        if !resp.status().is_success() {
            let err = api_error(resp).await;
            return Err(VaultError::Auth(err.to_string()));
        }

        let login: LoginResponse = resp.json().await?;
        let token = login
            .auth
            .map(|a| a.client_token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| VaultError::Auth("login response carried no client token".into()))?;

        debug!(address = %self.address, "AppRole login succeeded");
        Ok(Zeroizing::new(token))
    }

    /// Verify the current token is accepted.
    pub async fn lookup_self(&self) -> Result<(), VaultError> {
        let resp = self
            .authed(self.http.get(self.url("auth/token/lookup-self")))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }
        Ok(())
    }

    /// Read a logical path.  `Ok(None)` when Vault answers 404.
    pub async fn read(&self, path: &str) -> Result<Option<Value>, VaultError> {
        let resp = self.authed(self.http.get(self.url(path))).send().await?;

        if resp.status() == StatusCode::NOT_FOUND {
            debug!(%path, "vault read: not found");
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| VaultError::Decode(format!("read {path}: {e}")))?;
        Ok(Some(body))
    }

    /// Write `body` to a logical path.
    pub async fn write(&self, path: &str, body: &Value) -> Result<(), VaultError> {
        let resp = self
            .authed(self.http.post(self.url(path)))
            .json(body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }
        debug!(%path, "vault write ok");
        Ok(())
    }
}

/// Turn a non-2xx response into [`VaultError::Api`], preferring Vault's
/// `{"errors": [...]}` body over the raw text.
async fn api_error(resp: Response) -> VaultError {
    let status = resp.status().as_u16();
    let text = resp.text().await.unwrap_or_default();
    let body = match serde_json::from_str::<ErrorResponse>(&text) {
        Ok(parsed) if !parsed.errors.is_empty() => parsed.errors.join("; "),
        _ => text,
    };
    VaultError::Api { status, body }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_address_and_path() {
        let client = VaultClient::new("http://127.0.0.1:8200/").unwrap();
        assert_eq!(client.address(), "http://127.0.0.1:8200");
        assert_eq!(
            client.url("secret/data/ssh/a"),
            "http://127.0.0.1:8200/v1/secret/data/ssh/a"
        );
        assert_eq!(
            client.url("/secret/data/ssh/a"),
            "http://127.0.0.1:8200/v1/secret/data/ssh/a"
        );
    }
}
