use crate::engine::command::{CommandRunner, Invocation};
use tracing::{info, warn};

/// Runs the cipher enumeration tool once and keeps the TLS-relevant lines.
pub struct CipherSuiteProbe<'a> {
    runner: &'a dyn CommandRunner,
    program: &'a str,
}

impl<'a> CipherSuiteProbe<'a> {
    pub fn new(runner: &'a dyn CommandRunner, program: &'a str) -> Self {
        Self { runner, program }
    }

    pub fn invocation(&self, host: &str, port: u16) -> Invocation {
        Invocation::new(self.program)
            .args(["--script", "ssl-enum-ciphers", "-p"])
            .arg(port.to_string())
            .arg(host)
    }

    /// Never fails: tool errors come back as their diagnostic text.
    pub async fn scan(&self, host: &str, port: u16) -> String {
        info!(host, port, "scanning supported ciphers");
        let invocation = self.invocation(host, port);
        let report = match self.runner.run(&invocation).await {
            Ok(output) if output.success() => filter_cipher_lines(&output.stdout),
            Ok(output) => {
                warn!(status = ?output.status, "cipher enumeration failed");
                output.stderr.trim().to_string()
            }
            Err(err) => {
                warn!(error = %err, "cipher enumeration could not run");
                format!("{err:#}")
            }
        };
        info!(host, "done scanning ciphers");
        report
    }
}

pub fn filter_cipher_lines(stdout: &str) -> String {
    stdout
        .trim()
        .split('\n')
        .filter(|line| line.contains("TLS") || line.contains("ciphers"))
        .collect::<Vec<_>>()
        .join("\n")
}
