//! Ed25519 key-pair generation.

use sm_ssh_core::KeyMaterial;
use ssh_key::rand_core::OsRng;
use ssh_key::{Algorithm, LineEnding, PrivateKey, PublicKey};

#[derive(thiserror::Error, Debug)]
pub enum KeygenError {
    #[error("failed to generate key pair: {0}")]
    Generate(#[source] ssh_key::Error),
    #[error("failed to encrypt private key: {0}")]
    Encrypt(#[source] ssh_key::Error),
    #[error("failed to encode key: {0}")]
    Encode(#[source] ssh_key::Error),
}

/// Generate a fresh Ed25519 key pair.
///
/// A non-empty `passphrase` wraps the private key in OpenSSH's encrypted
/// envelope and sets `requires_passphrase`; the passphrase itself is not kept.
/// Trailing newlines are stripped from `comment` before it is embedded.
pub fn generate(comment: &str, passphrase: &[u8]) -> Result<KeyMaterial, KeygenError> {
    let comment = comment.trim_end_matches(['\r', '\n']);

    let mut key = PrivateKey::random(&mut OsRng, Algorithm::Ed25519).map_err(KeygenError::Generate)?;
    key.set_comment(comment);

    let public_key = authorized_key_line(key.public_key())?;

    let requires_passphrase = !passphrase.is_empty();
    let private_key = if requires_passphrase {
        key.encrypt(&mut OsRng, passphrase)
            .map_err(KeygenError::Encrypt)?
            .to_openssh(LineEnding::LF)
    } else {
        key.to_openssh(LineEnding::LF)
    }
    .map_err(KeygenError::Encode)?;

    Ok(KeyMaterial {
        private_key,
        public_key,
        requires_passphrase,
        comment: comment.to_string(),
    })
}

/// `<algorithm> <base64>[ <comment>]\n`
fn authorized_key_line(public: &PublicKey) -> Result<String, KeygenError> {
    let bare = PublicKey::new(public.key_data().clone(), "");
    let mut line = bare.to_openssh().map_err(KeygenError::Encode)?;
    if !public.comment().is_empty() {
        line.push(' ');
        line.push_str(public.comment());
    }
    line.push('\n');
    Ok(line)
}
