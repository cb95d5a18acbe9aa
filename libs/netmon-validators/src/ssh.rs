// [libs/netmon-validators/src/ssh.rs]
//! SSH handshake: TCP connect, version/kex exchange, then authenticate.
//! Host key verification is intentionally disabled — the goal is
//! reachability, not establishing trust in the remote host.

use crate::{HandshakeError, HandshakeOutcome};
use russh::client::{self, Handle, Handler};
use russh_keys::key::{KeyPair, PublicKey};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

struct AcceptAnyServerKey;

#[async_trait::async_trait]
impl Handler for AcceptAnyServerKey {
    type Error = russh::Error;

    async fn check_server_key(&mut self, _server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

pub async fn validate(
    ip: IpAddr,
    port: u16,
    username: &str,
    password: Option<&str>,
    private_key: Option<&str>,
    passphrase: Option<&str>,
    timeout: Duration,
) -> Result<HandshakeOutcome, HandshakeError> {
    if password.is_none() && private_key.is_none() {
        return Err(HandshakeError::CredentialMismatch(netmon_protocol::Protocol::Ssh));
    }

    let config = Arc::new(client::Config {
        inactivity_timeout: Some(timeout),
        ..Default::default()
    });

    let mut session: Handle<AcceptAnyServerKey> = client::connect(config, (ip, port), AcceptAnyServerKey)
        .await
        .map_err(|e| HandshakeError::Transport(e.to_string()))?;

    // Password then public-key, in that order, when both are supplied: a
    // stale or wrong key should not shadow a valid password.
    let authenticated = if let Some(pw) = password {
        let password_ok = session
            .authenticate_password(username, pw)
            .await
            .map_err(|e| HandshakeError::Transport(e.to_string()))?;
        if password_ok {
            true
        } else if let Some(key_pem) = private_key {
            let key_pair = russh_keys::decode_secret_key(key_pem, passphrase)
                .map_err(|e| HandshakeError::AuthRejected(format!("private key rejected: {}", e)))?;
            authenticate_with_key(&mut session, username, key_pair).await?
        } else {
            false
        }
    } else {
        let key_pem = private_key.expect("checked above");
        let key_pair = russh_keys::decode_secret_key(key_pem, passphrase)
            .map_err(|e| HandshakeError::AuthRejected(format!("private key rejected: {}", e)))?;
        authenticate_with_key(&mut session, username, key_pair).await?
    };

    if !authenticated {
        return Err(HandshakeError::AuthRejected("server rejected credentials".into()));
    }

    // `russh` resolves and consumes the remote version banner during the
    // initial key exchange and does not re-expose it on `Handle`; a
    // successful authenticated session is itself the strongest signal
    // a caller can get without re-implementing the banner exchange.
    let _ = session.disconnect(russh::Disconnect::ByApplication, "", "en").await;
    Ok(HandshakeOutcome::success("ssh"))
}

async fn authenticate_with_key(
    session: &mut Handle<AcceptAnyServerKey>,
    username: &str,
    key_pair: KeyPair,
) -> Result<bool, HandshakeError> {
    session
        .authenticate_publickey(username, Arc::new(key_pair))
        .await
        .map_err(|e| HandshakeError::Transport(e.to_string()))
}
