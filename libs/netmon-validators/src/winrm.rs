// [libs/netmon-validators/src/winrm.rs]
//! WinRM handshake over HTTP: open a remote shell, then close it. NTLM is
//! used when a domain is supplied (`DOMAIN\user`); otherwise HTTP Basic.

use crate::{HandshakeError, HandshakeOutcome};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use sspi::{
    builders::EmptyInitializeSecurityContext, AuthIdentity, ClientRequestFlags, CredentialUse,
    DataRepresentation, Ntlm, SecurityBuffer, SecurityBufferType, Sspi, SspiImpl, Username,
};
use std::net::IpAddr;
use std::time::Duration;

const SHELL_CREATE_ENVELOPE: &str = r#"<env:Envelope xmlns:env="http://www.w3.org/2003/05/soap-envelope"><env:Body><rsp:Shell xmlns:rsp="http://schemas.microsoft.com/wbem/wsman/1/windows/shell"/></env:Body></env:Envelope>"#;

pub async fn validate(
    ip: IpAddr,
    port: u16,
    username: &str,
    password: &str,
    domain: Option<&str>,
    timeout: Duration,
) -> Result<HandshakeOutcome, HandshakeError> {
    let url = format!("http://{}:{}/wsman", ip, port);
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| HandshakeError::Transport(e.to_string()))?;

    let response = match domain {
        Some(domain) => ntlm_shell_create(&client, &url, username, password, domain).await?,
        None => client
            .post(&url)
            .basic_auth(username, Some(password))
            .body(SHELL_CREATE_ENVELOPE)
            .send()
            .await
            .map_err(|e| HandshakeError::Transport(e.to_string()))?,
    };

    if !response.status().is_success() {
        return Err(HandshakeError::AuthRejected(format!("HTTP {}", response.status())));
    }

    Ok(HandshakeOutcome::success(format!("{}:{}", ip, port)))
}

/// Negotiate → Challenge → Authenticate, per RFC 4559 over WS-Man. The
/// challenge is recovered from the `WWW-Authenticate` header of the
/// server's 401 response to an unauthenticated probe.
async fn ntlm_shell_create(
    client: &reqwest::Client,
    url: &str,
    username: &str,
    password: &str,
    domain: &str,
) -> Result<reqwest::Response, HandshakeError> {
    let mut ntlm = Ntlm::new();
    let identity = AuthIdentity {
        username: Username::new(username, Some(domain)).map_err(|e| HandshakeError::AuthRejected(e.to_string()))?,
        password: password.to_owned().into(),
    };

    let acquired = ntlm
        .acquire_credentials_handle()
        .with_credential_use(CredentialUse::Outbound)
        .with_auth_data(&identity)
        .execute(&mut ntlm)
        .map_err(|e| HandshakeError::AuthRejected(e.to_string()))?;
    let mut credentials_handle = acquired.credentials_handle;

    let mut negotiate_buffer = vec![SecurityBuffer::new(Vec::new(), SecurityBufferType::Token)];
    let mut builder = EmptyInitializeSecurityContext::new()
        .with_credentials_handle(&mut credentials_handle)
        .with_context_requirements(ClientRequestFlags::empty())
        .with_target_data_representation(DataRepresentation::Native)
        .with_target_name("")
        .with_output(&mut negotiate_buffer);

    ntlm.initialize_security_context_impl(&mut builder)
        .map_err(|e| HandshakeError::AuthRejected(e.to_string()))?;

    let negotiate_token = BASE64.encode(&negotiate_buffer[0].buffer);

    let challenge_response = client
        .post(url)
        .header(AUTHORIZATION, format!("Negotiate {}", negotiate_token))
        .body(SHELL_CREATE_ENVELOPE)
        .send()
        .await
        .map_err(|e| HandshakeError::Transport(e.to_string()))?;

    let challenge_header = challenge_response
        .headers()
        .get(WWW_AUTHENTICATE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Negotiate "))
        .ok_or_else(|| HandshakeError::AuthRejected("server did not return an NTLM challenge".into()))?;

    let challenge_bytes = BASE64
        .decode(challenge_header)
        .map_err(|e| HandshakeError::AuthRejected(format!("malformed NTLM challenge: {}", e)))?;

    let mut input_buffer = vec![SecurityBuffer::new(challenge_bytes, SecurityBufferType::Token)];
    let mut output_buffer = vec![SecurityBuffer::new(Vec::new(), SecurityBufferType::Token)];
    let mut authenticate_builder = EmptyInitializeSecurityContext::new()
        .with_credentials_handle(&mut credentials_handle)
        .with_context_requirements(ClientRequestFlags::empty())
        .with_target_data_representation(DataRepresentation::Native)
        .with_target_name("")
        .with_input(&mut input_buffer)
        .with_output(&mut output_buffer);

    ntlm.initialize_security_context_impl(&mut authenticate_builder)
        .map_err(|e| HandshakeError::AuthRejected(e.to_string()))?;

    let authenticate_token = BASE64.encode(&output_buffer[0].buffer);

    client
        .post(url)
        .header(AUTHORIZATION, format!("Negotiate {}", authenticate_token))
        .body(SHELL_CREATE_ENVELOPE)
        .send()
        .await
        .map_err(|e| HandshakeError::Transport(e.to_string()))
}
