//! HashiCorp Vault / OpenBao key-value provider.
//!
//! Keys are stored as KV v2 records with four fields: `private_key`,
//! `public_key`, `require_passphrase` and `comment`.  Callers pass the full
//! logical path, including the `data/` segment of the KV v2 mount
//! (e.g. `secret/data/ssh/github`).

pub mod api;

use serde_json::{Map, Value, json};
use sm_ssh_core::config::VaultSettings;
use sm_ssh_core::prompt::SecretPrompt;
use sm_ssh_core::{KeyMaterial, ProviderError, SecretProvider};
use tracing::{debug, info};
use zeroize::Zeroizing;

pub use api::{VaultClient, VaultError};

/// Shown before asking for an AppRole secret-id interactively.
const SECRET_ID_HINT: &str = "Generate a single-use Secret ID using command similar to below:\n\
     vault write -f auth/approle/role/sm-ssh-add/secret-id";

impl From<VaultError> for ProviderError {
    fn from(e: VaultError) -> Self {
        match e {
            VaultError::Auth(msg) => ProviderError::Connection(msg),
            VaultError::Http(e) => ProviderError::Unavailable(e.to_string()),
            e @ VaultError::Api { .. } => ProviderError::Unavailable(e.to_string()),
            VaultError::Decode(msg) => ProviderError::Other(anyhow::anyhow!(msg)),
        }
    }
}

pub struct VaultProvider {
    client: VaultClient,
}

impl std::fmt::Debug for VaultProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultProvider")
            .field("address", &self.client.address())
            .finish()
    }
}

impl VaultProvider {
    /// Authenticate against Vault and verify the resulting session.
    ///
    /// With `role_id` set, AppRole login is used; the secret-id comes from
    /// `settings.secret_id` or is read through `prompt`.  Otherwise the
    /// static token in `settings.token` is required.
    pub async fn connect(
        settings: &VaultSettings,
        prompt: &dyn SecretPrompt,
    ) -> Result<Self, ProviderError> {
        let address = settings.address.as_deref().ok_or_else(|| {
            ProviderError::Connection("vault address required: set BAO_ADDR or VAULT_ADDR".into())
        })?;

        let mut client = VaultClient::new(address)
            .map_err(|e| ProviderError::Connection(format!("failed to create vault client: {e}")))?;

        let token = match settings.role_id.as_deref() {
            Some(role_id) => {
                let secret_id = match &settings.secret_id {
                    Some(id) => id.clone(),
                    None => read_secret_id(prompt).await?,
                };
                client
                    .approle_login(role_id, &secret_id)
                    .await
                    .map_err(|e| ProviderError::Connection(format!("failed to login with AppRole: {e}")))?
            }
            None => settings.token.clone().ok_or_else(|| {
                ProviderError::Connection(
                    "vault token required: set BAO_TOKEN or VAULT_TOKEN".into(),
                )
            })?,
        };
        client.set_token(token);

        client
            .lookup_self()
            .await
            .map_err(|e| ProviderError::Connection(format!("token verification failed: {e}")))?;

        info!(address = %client.address(), "connected to vault");
        Ok(Self { client })
    }
}

async fn read_secret_id(prompt: &dyn SecretPrompt) -> Result<Zeroizing<String>, ProviderError> {
    prompt.notice(SECRET_ID_HINT).await;
    let secret_id = prompt
        .read_secret("Enter Vault/OpenBao AppRole Secret ID")
        .await
        .map_err(|e| ProviderError::Connection(format!("failed to read secret ID: {e}")))?;
    if secret_id.trim().is_empty() {
        return Err(ProviderError::Connection("secret ID cannot be empty".into()));
    }
    Ok(Zeroizing::new(secret_id.trim().to_string()))
}

#[async_trait::async_trait]
impl SecretProvider for VaultProvider {
    fn kind(&self) -> &str {
        "vault"
    }

    async fn get(&self, path: &str) -> Result<KeyMaterial, ProviderError> {
        if path.is_empty() {
            return Err(ProviderError::InvalidPath);
        }
        let body = self
            .client
            .read(path)
            .await
            .map_err(|e| with_path(path, e))?
            .ok_or_else(|| ProviderError::NotFound {
                path: path.to_string(),
            })?;
        decode_record(path, &body)
    }

    async fn store(&self, path: &str, material: &KeyMaterial) -> Result<(), ProviderError> {
        if path.is_empty() {
            return Err(ProviderError::InvalidPath);
        }
        if !material.is_complete() {
            return Err(ProviderError::InvalidFormat {
                path: path.to_string(),
                reason: "private_key and public_key must not be empty".into(),
            });
        }
        let body = json!({ "data": encode_record(material) });
        self.client
            .write(path, &body)
            .await
            .map_err(|e| with_path(path, e))?;
        debug!(%path, "stored key material");
        Ok(())
    }

    async fn check_exists(&self, path: &str) -> Result<bool, ProviderError> {
        if path.is_empty() {
            return Err(ProviderError::InvalidPath);
        }
        let exists = self
            .client
            .read(path)
            .await
            .map_err(|e| with_path(path, e))?
            .as_ref()
            .and_then(record_fields)
            .is_some_and(|fields| !fields.is_empty());
        Ok(exists)
    }
}

fn with_path(path: &str, e: VaultError) -> ProviderError {
    match ProviderError::from(e) {
        ProviderError::Unavailable(msg) => ProviderError::Unavailable(format!("{path}: {msg}")),
        other => other,
    }
}

// ---------------------------------------------------------------------------
// Record encoding
// ---------------------------------------------------------------------------

fn encode_record(material: &KeyMaterial) -> Value {
    json!({
        "private_key": material.private_key.as_str(),
        "public_key": material.public_key,
        "require_passphrase": material.requires_passphrase,
        "comment": material.comment,
    })
}

/// The KV v2 record: `body.data.data`.
fn record_fields(body: &Value) -> Option<&Map<String, Value>> {
    body.get("data")?.get("data")?.as_object()
}

fn decode_record(path: &str, body: &Value) -> Result<KeyMaterial, ProviderError> {
    let invalid = |reason: String| ProviderError::InvalidFormat {
        path: path.to_string(),
        reason,
    };

    let fields = record_fields(body).ok_or_else(|| invalid("missing data object".into()))?;

    let required = |name: &str| {
        fields
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| invalid(format!("missing or empty {name}")))
    };
    let private_key = required("private_key")?;
    let public_key = required("public_key")?;

    let requires_passphrase = match fields.get("require_passphrase") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => parse_bool(s)
            .ok_or_else(|| invalid(format!("require_passphrase: cannot parse {s:?} as bool")))?,
        Some(other) => {
            return Err(invalid(format!(
                "require_passphrase: expected bool or string, got {other}"
            )));
        }
    };

    let comment = fields
        .get("comment")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Ok(KeyMaterial {
        private_key: Zeroizing::new(private_key.to_string()),
        public_key: public_key.to_string(),
        requires_passphrase,
        comment,
    })
}

/// Accepts the spellings a conventional string-to-bool parser does.
fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}
