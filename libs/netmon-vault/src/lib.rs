// [libs/netmon-vault/src/lib.rs]
/*!
 * =================================================================
 * APARATO: CREDENTIAL VAULT ENGINE (AES-256-GCM)
 * RESPONSABILIDAD: CIFRADO Y DESCIFRADO SIMÉTRICO DE CREDENCIALES Y TARGETS
 * =================================================================
 *
 * The vault never makes a network call and never logs plaintext. It
 * holds a single 32-byte key read from configuration at boot
 * (`NetmonConfig::encryption_key`) and offers three operations:
 * `encrypt`, `decrypt`, and `decrypt_container` — the last one also
 * maps the recovered JSON object onto the typed credential union for
 * the protocol the caller already knows from the owning profile.
 */

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use netmon_protocol::{AuthProtocol, PrivProtocol, Protocol, SecurityLevel, TypedCredential};
use serde_json::Value;
use thiserror::Error;

const NONCE_LEN: usize = 12;

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("invalid encryption key: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),
    #[error("base64 decode failed: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("ciphertext shorter than nonce ({0} bytes)")]
    Truncated(usize),
    #[error("decryption failed: integrity check rejected or wrong key")]
    Decryption,
    #[error("decrypted payload is not valid UTF-8")]
    InvalidUtf8,
    #[error("decrypted payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("decrypted payload missing required field `{0}` for protocol {1:?}")]
    MissingField(&'static str, Protocol),
}

#[derive(Clone)]
pub struct CredentialVault {
    cipher: Aes256Gcm,
}

impl CredentialVault {
    pub fn new(key_bytes: &[u8]) -> Result<Self, VaultError> {
        if key_bytes.len() != 32 {
            return Err(VaultError::InvalidKeyLength(key_bytes.len()));
        }
        let key = Key::<Aes256Gcm>::from_slice(key_bytes);
        Ok(Self { cipher: Aes256Gcm::new(key) })
    }

    /// Encrypts `plaintext`, returning `base64(nonce || ciphertext || tag)`.
    /// A fresh random nonce is drawn on every call, so two calls on the
    /// same input never produce the same output.
    pub fn encrypt(&self, plaintext: &[u8]) -> String {
        let nonce = Aes256Gcm::generate_nonce(&mut aes_gcm::aead::OsRng);
        let sealed = self
            .cipher
            .encrypt(&nonce, plaintext)
            .expect("AES-256-GCM encryption of a bounded, well-formed buffer cannot fail");

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(nonce.as_slice());
        out.extend_from_slice(&sealed);
        BASE64.encode(out)
    }

    /// Inverse of [`encrypt`]. Rejects inputs shorter than the nonce.
    pub fn decrypt(&self, encoded: &str) -> Result<Vec<u8>, VaultError> {
        let raw = BASE64.decode(encoded)?;
        if raw.len() < NONCE_LEN {
            return Err(VaultError::Truncated(raw.len()));
        }
        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| VaultError::Decryption)
    }

    /// Decrypts an at-rest credential container. `stored` may be either
    /// the normal form — a JSON-quoted ciphertext string — or, for
    /// legacy tolerance, the raw ciphertext string with no surrounding
    /// quotes. The decrypted plaintext is a JSON object whose keys are
    /// named per §6 (username, password, domain, private_key, ...); it
    /// is mapped onto the variant matching `protocol`.
    pub fn decrypt_container(
        &self,
        stored: &str,
        protocol: Protocol,
    ) -> Result<TypedCredential, VaultError> {
        let ciphertext_b64 = match serde_json::from_str::<String>(stored) {
            Ok(unquoted) => unquoted,
            Err(_) => stored.to_string(),
        };

        let plaintext = self.decrypt(&ciphertext_b64)?;
        let text = String::from_utf8(plaintext).map_err(|_| VaultError::InvalidUtf8)?;
        let value: Value = serde_json::from_str(&text)?;
        typed_credential_from_value(&value, protocol)
    }
}

fn typed_credential_from_value(value: &Value, protocol: Protocol) -> Result<TypedCredential, VaultError> {
    let field = |name: &'static str| -> Option<String> {
        value.get(name).and_then(Value::as_str).map(str::to_string)
    };
    let required = |name: &'static str| field(name).ok_or(VaultError::MissingField(name, protocol));

    Ok(match protocol {
        Protocol::Ssh => TypedCredential::Ssh {
            username: required("username")?,
            password: field("password"),
            private_key: field("private_key"),
            passphrase: field("passphrase"),
        },
        Protocol::WinRm => TypedCredential::WinRm {
            username: required("username")?,
            password: required("password")?,
            domain: field("domain"),
        },
        Protocol::SnmpV2c => TypedCredential::SnmpV2c { community: required("community")? },
        Protocol::SnmpV3 => TypedCredential::SnmpV3 {
            security_name: required("security_name")?,
            security_level: parse_security_level(&required("security_level")?)?,
            auth_protocol: field("auth_protocol").map(|s| parse_auth_protocol(&s)).transpose()?,
            auth_password: field("auth_password"),
            priv_protocol: field("priv_protocol").map(|s| parse_priv_protocol(&s)).transpose()?,
            priv_password: field("priv_password"),
        },
    })
}

fn parse_security_level(s: &str) -> Result<SecurityLevel, VaultError> {
    Ok(match s {
        "noAuthNoPriv" => SecurityLevel::NoAuthNoPriv,
        "authNoPriv" => SecurityLevel::AuthNoPriv,
        "authPriv" => SecurityLevel::AuthPriv,
        _ => return Err(VaultError::MissingField("security_level", Protocol::SnmpV3)),
    })
}

fn parse_auth_protocol(s: &str) -> Result<AuthProtocol, VaultError> {
    Ok(match s.to_ascii_uppercase().as_str() {
        "MD5" => AuthProtocol::Md5,
        "SHA" => AuthProtocol::Sha,
        "SHA-224" | "SHA224" => AuthProtocol::Sha224,
        "SHA-256" | "SHA256" => AuthProtocol::Sha256,
        "SHA-384" | "SHA384" => AuthProtocol::Sha384,
        "SHA-512" | "SHA512" => AuthProtocol::Sha512,
        _ => return Err(VaultError::MissingField("auth_protocol", Protocol::SnmpV3)),
    })
}

fn parse_priv_protocol(s: &str) -> Result<PrivProtocol, VaultError> {
    Ok(match s.to_ascii_uppercase().as_str() {
        "DES" => PrivProtocol::Des,
        "AES" => PrivProtocol::Aes,
        "AES192" => PrivProtocol::Aes192,
        "AES256" => PrivProtocol::Aes256,
        _ => return Err(VaultError::MissingField("priv_protocol", Protocol::SnmpV3)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vault() -> CredentialVault {
        CredentialVault::new(&[7u8; 32]).unwrap()
    }

    #[test]
    fn round_trips_arbitrary_bytes() {
        let vault = vault();
        let plaintext = b"correct horse battery staple";
        let sealed = vault.encrypt(plaintext);
        let opened = vault.decrypt(&sealed).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn nonce_is_fresh_per_call() {
        let vault = vault();
        let a = vault.encrypt(b"same input");
        let b = vault.encrypt(b"same input");
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_short_ciphertext() {
        let vault = vault();
        let too_short = BASE64.encode([1u8, 2, 3]);
        assert!(matches!(vault.decrypt(&too_short), Err(VaultError::Truncated(_))));
    }

    #[test]
    fn rejects_key_of_wrong_length() {
        assert!(matches!(CredentialVault::new(&[0u8; 16]), Err(VaultError::InvalidKeyLength(16))));
    }

    #[test]
    fn decrypt_container_accepts_json_quoted_and_raw_forms() {
        let vault = vault();
        let sealed = vault.encrypt(br#"{"username":"admin","password":"hunter2"}"#);

        let quoted = serde_json::to_string(&sealed).unwrap();
        let from_quoted = vault.decrypt_container(&quoted, Protocol::Ssh).unwrap();
        let from_raw = vault.decrypt_container(&sealed, Protocol::Ssh).unwrap();

        match (from_quoted, from_raw) {
            (
                TypedCredential::Ssh { username: u1, password: p1, .. },
                TypedCredential::Ssh { username: u2, password: p2, .. },
            ) => {
                assert_eq!(u1, "admin");
                assert_eq!(u2, "admin");
                assert_eq!(p1.as_deref(), Some("hunter2"));
                assert_eq!(p2.as_deref(), Some("hunter2"));
            }
            _ => panic!("expected Ssh variant"),
        }
    }

    #[test]
    fn decrypt_container_rejects_missing_required_field() {
        let vault = vault();
        let sealed = vault.encrypt(br#"{"community":"public"}"#);
        let err = vault.decrypt_container(&sealed, Protocol::Ssh).unwrap_err();
        assert!(matches!(err, VaultError::MissingField("username", Protocol::Ssh)));
    }
}
