//! SSH key generation and ssh-agent access for sm-ssh-add.
//!
//! - [`keygen`] creates Ed25519 key pairs as [`KeyMaterial`](sm_ssh_core::KeyMaterial),
//!   optionally wrapped in OpenSSH's passphrase envelope.
//! - [`client`] talks to a running agent over `$SSH_AUTH_SOCK`, deduplicating
//!   by SHA-256 fingerprint before adding.

pub mod client;
pub mod keygen;

#[cfg(any(test, feature = "test-util"))]
pub mod memory;

pub use client::{AgentClient, AgentError, AgentKeyRecord};
pub use keygen::{KeygenError, generate};
