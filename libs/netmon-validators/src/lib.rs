// [libs/netmon-validators/src/lib.rs]
/*!
 * =================================================================
 * APARATO: HANDSHAKE VALIDATOR BANK
 * RESPONSABILIDAD: CONEXIÓN, AUTENTICACIÓN Y SONDEO POR PROTOCOLO
 * =================================================================
 *
 * One validator per supported protocol, unified behind [`validate`].
 * Every validator makes exactly one connection attempt, honors the
 * caller's timeout as an absolute wall-clock bound, and never lets an
 * internal error surface as a success — anything other than a clean
 * protocol-level success becomes `HandshakeOutcome::failure`.
 */

mod snmp;
mod ssh;
mod winrm;

use netmon_protocol::{Protocol, TypedCredential};
use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;
use tracing::{instrument, warn};

#[derive(Error, Debug)]
pub enum HandshakeError {
    #[error("validator timed out after {0:?}")]
    Timeout(Duration),
    #[error("credential does not match protocol {0:?}")]
    CredentialMismatch(Protocol),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("authentication rejected: {0}")]
    AuthRejected(String),
}

#[derive(Debug, Clone)]
pub struct HandshakeOutcome {
    pub success: bool,
    pub hostname: Option<String>,
    pub error: Option<String>,
}

impl HandshakeOutcome {
    fn success(hostname: impl Into<String>) -> Self {
        Self { success: true, hostname: Some(hostname.into()), error: None }
    }

    fn failure(error: impl Into<String>) -> Self {
        Self { success: false, hostname: None, error: Some(error.into()) }
    }
}

/// Runs one handshake attempt against `ip:port` using `credentials`,
/// bounded by `timeout`. The returned [`HandshakeOutcome`] is always
/// `Ok` — failures (including a timeout) are reported as `success: false`
/// with `error` populated, never propagated as an exception.
#[instrument(skip(credentials), fields(protocol = ?protocol, %ip, port))]
pub async fn validate(
    protocol: Protocol,
    ip: IpAddr,
    port: u16,
    credentials: &TypedCredential,
    timeout: Duration,
) -> HandshakeOutcome {
    let attempt = run_validator(protocol, ip, port, credentials, timeout);

    match tokio::time::timeout(timeout, attempt).await {
        Ok(outcome) => outcome,
        Err(_) => {
            warn!("handshake attempt exceeded {:?}", timeout);
            HandshakeOutcome::failure(format!("timed out after {:?}", timeout))
        }
    }
}

async fn run_validator(
    protocol: Protocol,
    ip: IpAddr,
    port: u16,
    credentials: &TypedCredential,
    timeout: Duration,
) -> HandshakeOutcome {
    let result = match (protocol, credentials) {
        (Protocol::Ssh, TypedCredential::Ssh { username, password, private_key, passphrase }) => {
            ssh::validate(ip, port, username, password.as_deref(), private_key.as_deref(), passphrase.as_deref(), timeout).await
        }
        (Protocol::WinRm, TypedCredential::WinRm { username, password, domain }) => {
            winrm::validate(ip, port, username, password, domain.as_deref(), timeout).await
        }
        (Protocol::SnmpV2c, TypedCredential::SnmpV2c { community }) => {
            snmp::validate_v2c(ip, port, community, timeout).await
        }
        (Protocol::SnmpV3, TypedCredential::SnmpV3 { security_name, security_level, auth_protocol, auth_password, priv_protocol, priv_password }) => {
            snmp::validate_v3(
                ip,
                port,
                security_name,
                *security_level,
                *auth_protocol,
                auth_password.as_deref(),
                *priv_protocol,
                priv_password.as_deref(),
                timeout,
            )
            .await
        }
        (other, _) => Err(HandshakeError::CredentialMismatch(other)),
    };

    match result {
        Ok(outcome) => outcome,
        Err(err) => HandshakeOutcome::failure(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netmon_protocol::SecurityLevel;

    #[tokio::test]
    async fn credential_protocol_mismatch_never_succeeds() {
        let cred = TypedCredential::SnmpV2c { community: "public".into() };
        let outcome = validate(Protocol::Ssh, "127.0.0.1".parse().unwrap(), 22, &cred, Duration::from_millis(50)).await;
        assert!(!outcome.success);
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn unreachable_host_fails_within_timeout() {
        let cred = TypedCredential::SnmpV3 {
            security_name: "admin".into(),
            security_level: SecurityLevel::NoAuthNoPriv,
            auth_protocol: None,
            auth_password: None,
            priv_protocol: None,
            priv_password: None,
        };
        let outcome = validate(Protocol::SnmpV3, "192.0.2.1".parse().unwrap(), 161, &cred, Duration::from_millis(100)).await;
        assert!(!outcome.success);
    }
}
