// [libs/netmon-protocol/src/credential.rs]
//! Credential domain model and the decrypted union it unseals into.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Protocol a credential profile (and the monitor/discovery profile that
/// reference it) is scoped to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Protocol {
    Ssh,
    #[serde(rename = "winrm")]
    WinRm,
    SnmpV2c,
    SnmpV3,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Ssh => "ssh",
            Protocol::WinRm => "winrm",
            Protocol::SnmpV2c => "snmp-v2c",
            Protocol::SnmpV3 => "snmp-v3",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "ssh" => Some(Protocol::Ssh),
            "winrm" => Some(Protocol::WinRm),
            "snmp-v2c" => Some(Protocol::SnmpV2c),
            "snmp-v3" => Some(Protocol::SnmpV3),
            _ => None,
        }
    }
}

/// At-rest record. `payload_ciphertext` is opaque to every component
/// except the credential vault — it is never logged or returned raw.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialProfile {
    pub id: Uuid,
    pub name: String,
    pub protocol: Protocol,
    pub payload_ciphertext: String,
}

/// SNMPv3 security level, carried as a plain field rather than folded
/// into the auth/priv protocol options so a `noAuthNoPriv` profile can
/// omit both without an awkward `Option<Option<_>>`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SecurityLevel {
    NoAuthNoPriv,
    AuthNoPriv,
    AuthPriv,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuthProtocol {
    Md5,
    Sha,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PrivProtocol {
    Des,
    Aes,
    Aes192,
    Aes256,
}

/// The decrypted union over every protocol's plaintext field set. This is
/// the shape `DecryptContainer` produces and the shape handshake
/// validators and plugin tasks consume — it never leaves the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "kebab-case")]
pub enum TypedCredential {
    Ssh {
        username: String,
        password: Option<String>,
        private_key: Option<String>,
        passphrase: Option<String>,
    },
    #[serde(rename = "winrm")]
    WinRm {
        username: String,
        password: String,
        domain: Option<String>,
    },
    SnmpV2c {
        community: String,
    },
    SnmpV3 {
        security_name: String,
        security_level: SecurityLevel,
        auth_protocol: Option<AuthProtocol>,
        auth_password: Option<String>,
        priv_protocol: Option<PrivProtocol>,
        priv_password: Option<String>,
    },
}

impl TypedCredential {
    pub fn protocol(&self) -> Protocol {
        match self {
            TypedCredential::Ssh { .. } => Protocol::Ssh,
            TypedCredential::WinRm { .. } => Protocol::WinRm,
            TypedCredential::SnmpV2c { .. } => Protocol::SnmpV2c,
            TypedCredential::SnmpV3 { .. } => Protocol::SnmpV3,
        }
    }
}
