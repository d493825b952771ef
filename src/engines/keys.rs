//! SFTP host keys

use ed25519_dalek::SigningKey;
use log::{info, warn};
use rand::RngCore;
use rand::rngs::OsRng;
use russh_keys::key::KeyPair;
use std::path::Path;

const TARGET: &str = "rax_share::engines::sftp";

/// Loads the configured host key, or generates an ephemeral Ed25519 key
/// when none is configured or the file is unusable.
pub fn load_or_generate_host_key(path: Option<&Path>) -> KeyPair {
    match path.filter(|p| !p.as_os_str().is_empty()) {
        Some(path) => match russh_keys::load_secret_key(path, None) {
            Ok(key) => {
                info!(target: TARGET, "Loaded SFTP host key from {}", path.display());
                return key;
            }
            Err(e) => warn!(
                target: TARGET,
                "Cannot use SFTP host key {}: {}; generating an ephemeral key",
                path.display(),
                e
            ),
        },
        None => info!(target: TARGET, "No SFTP host key configured; generating an ephemeral key"),
    }

    generate_ed25519()
}

pub fn generate_ed25519() -> KeyPair {
    let mut seed = [0u8; 32];
    OsRng.fill_bytes(&mut seed);
    KeyPair::Ed25519(SigningKey::from_bytes(&seed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_falls_back_to_ed25519() {
        let dir = tempfile::tempdir().unwrap();
        let key = load_or_generate_host_key(Some(&dir.path().join("absent")));
        assert!(matches!(key, KeyPair::Ed25519(_)));
    }

    #[test]
    fn garbage_key_falls_back_to_ed25519() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("id_bad");
        std::fs::write(&path, b"not a key").unwrap();
        assert!(matches!(
            load_or_generate_host_key(Some(&path)),
            KeyPair::Ed25519(_)
        ));
    }

    #[test]
    fn generated_keys_differ() {
        let (KeyPair::Ed25519(a), KeyPair::Ed25519(b)) = (generate_ed25519(), generate_ed25519())
        else {
            panic!("expected ed25519 keys");
        };
        assert_ne!(a.to_bytes(), b.to_bytes());
    }
}
