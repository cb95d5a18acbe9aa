// [libs/netmon-validators/src/snmp.rs]
//! SNMP handshake: a single sysDescr GET (`1.3.6.1.2.1.1.1.0`). Success is
//! defined as the agent returning at least one variable binding; its
//! value is reported back as the hostname.

use crate::{HandshakeError, HandshakeOutcome};
use netmon_protocol::{AuthProtocol, PrivProtocol, SecurityLevel};
use snmp2::{AuthProtocol as Snmp2AuthProtocol, PrivProtocol as Snmp2PrivProtocol, SyncSession, Value};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

const SYS_DESCR_OID: &[u32] = &[1, 3, 6, 1, 2, 1, 1, 1, 0];

pub async fn validate_v2c(
    ip: IpAddr,
    port: u16,
    community: &str,
    timeout: Duration,
) -> Result<HandshakeOutcome, HandshakeError> {
    let community = community.as_bytes().to_vec();
    tokio::task::spawn_blocking(move || {
        let addr = SocketAddr::new(ip, port);
        let mut session = SyncSession::new(addr, &community, Some(timeout), 0)
            .map_err(|e| HandshakeError::Transport(e.to_string()))?;
        let response = session.get(SYS_DESCR_OID).map_err(|e| HandshakeError::Transport(e.to_string()))?;
        first_varbind_value(response)
    })
    .await
    .map_err(|e| HandshakeError::Transport(format!("blocking task panicked: {}", e)))?
}

#[allow(clippy::too_many_arguments)]
pub async fn validate_v3(
    ip: IpAddr,
    port: u16,
    security_name: &str,
    security_level: SecurityLevel,
    auth_protocol: Option<AuthProtocol>,
    auth_password: Option<&str>,
    priv_protocol: Option<PrivProtocol>,
    priv_password: Option<&str>,
    timeout: Duration,
) -> Result<HandshakeOutcome, HandshakeError> {
    let security_name = security_name.to_string();
    let auth_password = auth_password.map(str::to_string);
    let priv_password = priv_password.map(str::to_string);

    tokio::task::spawn_blocking(move || {
        let addr = SocketAddr::new(ip, port);

        let auth = match (security_level, auth_protocol, auth_password.as_deref()) {
            (SecurityLevel::NoAuthNoPriv, _, _) => None,
            (_, Some(protocol), Some(password)) => Some((map_auth_protocol(protocol), password)),
            _ => return Err(HandshakeError::AuthRejected("authNoPriv/authPriv requires auth protocol and password".into())),
        };

        let privacy = match (security_level, priv_protocol, priv_password.as_deref()) {
            (SecurityLevel::AuthPriv, Some(protocol), Some(password)) => Some((map_priv_protocol(protocol), password)),
            (SecurityLevel::AuthPriv, _, _) => {
                return Err(HandshakeError::AuthRejected("authPriv requires privacy protocol and password".into()))
            }
            _ => None,
        };

        let mut session = SyncSession::new_v3(addr, Some(timeout), 0, &security_name, auth, privacy)
            .map_err(|e| HandshakeError::Transport(e.to_string()))?;
        let response = session.get(SYS_DESCR_OID).map_err(|e| HandshakeError::Transport(e.to_string()))?;
        first_varbind_value(response)
    })
    .await
    .map_err(|e| HandshakeError::Transport(format!("blocking task panicked: {}", e)))?
}

fn first_varbind_value(pdu: snmp2::SnmpPdu) -> Result<HandshakeOutcome, HandshakeError> {
    let mut varbinds = pdu.varbinds;
    match varbinds.next() {
        Some((_oid, Value::OctetString(bytes))) => {
            Ok(HandshakeOutcome::success(String::from_utf8_lossy(bytes).to_string()))
        }
        Some((_oid, other)) => Ok(HandshakeOutcome::success(format!("{:?}", other))),
        None => Err(HandshakeError::Transport("agent returned no variable bindings".into())),
    }
}

fn map_auth_protocol(protocol: AuthProtocol) -> Snmp2AuthProtocol {
    match protocol {
        AuthProtocol::Md5 => Snmp2AuthProtocol::Md5,
        AuthProtocol::Sha => Snmp2AuthProtocol::Sha1,
        AuthProtocol::Sha224 => Snmp2AuthProtocol::Sha224,
        AuthProtocol::Sha256 => Snmp2AuthProtocol::Sha256,
        AuthProtocol::Sha384 => Snmp2AuthProtocol::Sha384,
        AuthProtocol::Sha512 => Snmp2AuthProtocol::Sha512,
    }
}

fn map_priv_protocol(protocol: PrivProtocol) -> Snmp2PrivProtocol {
    match protocol {
        PrivProtocol::Des => Snmp2PrivProtocol::Des,
        PrivProtocol::Aes => Snmp2PrivProtocol::Aes128,
        PrivProtocol::Aes192 => Snmp2PrivProtocol::Aes192,
        PrivProtocol::Aes256 => Snmp2PrivProtocol::Aes256,
    }
}
