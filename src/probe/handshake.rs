use crate::engine::command::{CommandRunner, Invocation};
use crate::model::TlsVersion;
use std::time::Duration;
use tracing::debug;

/// Port every handshake attempt connects to.
///
/// NOTE: this does not follow the collector's configured port. Existing
/// reports depend on handshakes always hitting 443, so a non-default scan
/// port only affects cipher enumeration.
pub const HANDSHAKE_PORT: u16 = 443;

/// The handshake tool is known to hang; every attempt is cut off after this.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(7);

#[derive(Debug, Clone, Copy)]
pub struct HandshakeRequest<'a> {
    pub host: &'a str,
    pub version: TlsVersion,
    pub sni: bool,
}

pub fn handshake_invocation(program: &str, req: &HandshakeRequest<'_>) -> Invocation {
    let mut invocation = Invocation::new(program)
        .arg("s_client")
        .arg("-connect")
        .arg(format!("{}:{}", req.host, HANDSHAKE_PORT))
        .timeout(HANDSHAKE_TIMEOUT);
    if req.sni {
        invocation = invocation.arg("-servername").arg(req.host);
    }
    invocation.arg(req.version.flag())
}

/// Performs one attempt and returns its trimmed transcript. Failures and
/// timeouts yield whatever text was captured, possibly nothing.
pub async fn attempt_handshake(
    runner: &dyn CommandRunner,
    program: &str,
    req: HandshakeRequest<'_>,
) -> String {
    let invocation = handshake_invocation(program, &req);
    match runner.run(&invocation).await {
        Ok(output) => {
            debug!(
                version = %req.version,
                sni = req.sni,
                status = ?output.status,
                timed_out = output.timed_out,
                bytes = output.stdout.len(),
                "handshake attempt finished"
            );
            output.stdout.trim().to_string()
        }
        Err(err) => {
            debug!(version = %req.version, sni = req.sni, error = %err, "handshake attempt failed");
            String::new()
        }
    }
}

/// Version string from the first `Protocol` line of a transcript.
pub fn negotiated_protocol(transcript: &str) -> Option<&str> {
    let line = transcript.lines().find(|line| line.contains("Protocol"))?;
    line.trim().split(':').nth(1).map(str::trim)
}
