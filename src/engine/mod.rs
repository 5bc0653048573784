pub mod command;

use crate::model::{
    Config, ProtocolSupportMap, SanComparison, ScanResult, TargetSpec, TlsReport, TlsVersion,
    ToolPaths,
};
use crate::probe::certificate::certificate_input;
use crate::probe::handshake::negotiated_protocol;
use crate::probe::{attempt_handshake, is_certificate, CipherSuiteProbe, HandshakeRequest, SanExtractor};
use crate::util::now_iso8601;
use command::{CommandRunner, SystemRunner};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Gathers protocol support, SANs and cipher data for a single host.
///
/// Results are held per instance and replaced on every [`collect_all`](Self::collect_all).
pub struct TlsDataCollector {
    host: String,
    port: u16,
    tools: ToolPaths,
    runner: Arc<dyn CommandRunner>,
    versions: [TlsVersion; 3],
    sni_data: Option<ScanResult>,
    non_sni_data: Option<ScanResult>,
    ciphers: String,
}

impl TlsDataCollector {
    pub fn new(target: TargetSpec, tools: ToolPaths, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            host: target.host,
            port: target.port,
            tools,
            runner,
            versions: TlsVersion::ALL,
            sni_data: None,
            non_sni_data: None,
            ciphers: String::new(),
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.target.clone(), cfg.tools.clone(), Arc::new(SystemRunner))
    }

    pub fn ciphers(&self) -> &str {
        &self.ciphers
    }

    pub fn sni_data(&self) -> Option<&ScanResult> {
        self.sni_data.as_ref()
    }

    pub fn non_sni_data(&self) -> Option<&ScanResult> {
        self.non_sni_data.as_ref()
    }

    /// Cipher scan, then SNI handshakes, then plain handshakes. Never fails;
    /// unreachable tools degrade to empty results.
    #[instrument(skip(self), fields(host = %self.host, port = self.port))]
    pub async fn collect_all(&mut self) {
        info!("collecting TLS data");
        self.ciphers = CipherSuiteProbe::new(self.runner.as_ref(), &self.tools.nmap)
            .scan(&self.host, self.port)
            .await;
        self.sni_data = Some(self.extract_ssl_data(true).await);
        self.non_sni_data = Some(self.extract_ssl_data(false).await);
        info!("finished gathering TLS data");
    }

    pub fn are_sans_identical(&self) -> SanComparison {
        let (Some(sni), Some(non_sni)) = (
            self.sni_data.as_ref().and_then(|r| r.sans.as_ref()),
            self.non_sni_data.as_ref().and_then(|r| r.sans.as_ref()),
        ) else {
            return SanComparison::NotCompared;
        };

        if sni.is_empty() && non_sni.is_empty() {
            SanComparison::NotCompared
        } else if sni == non_sni {
            SanComparison::Identical
        } else {
            SanComparison::Different
        }
    }

    pub fn is_certificate(&self, text: &str) -> bool {
        is_certificate(text)
    }

    pub fn report(&self) -> TlsReport {
        TlsReport {
            host: self.host.clone(),
            port: self.port,
            timestamp: now_iso8601(),
            ciphers: self.ciphers.clone(),
            sni: self.sni_data.clone(),
            non_sni: self.non_sni_data.clone(),
            sans_identical: self.are_sans_identical().as_bool(),
        }
    }

    #[instrument(skip(self))]
    async fn extract_ssl_data(&self, sni: bool) -> ScanResult {
        let transcripts = self.run_handshakes(sni).await;
        let mut result = ScanResult {
            protocols: parse_support(&transcripts),
            ..ScanResult::default()
        };

        if let Some(transcript) = transcripts.iter().find(|t| is_certificate(t)) {
            let extractor = SanExtractor::new(self.runner.as_ref(), &self.tools.openssl);
            result.sans = Some(extractor.extract_sans(transcript).await);
            result.certificate = Some(certificate_input(transcript).to_string());
        }

        debug!(
            protocols = ?result.protocols,
            sans = ?result.sans.as_ref().map(|s| s.len()),
            "mode extraction complete"
        );
        result
    }

    /// One attempt per version, all in flight together. Transcripts come back
    /// in version order.
    async fn run_handshakes(&self, sni: bool) -> Vec<String> {
        let attempts = self.versions.iter().map(|&version| {
            attempt_handshake(
                self.runner.as_ref(),
                &self.tools.openssl,
                HandshakeRequest {
                    host: &self.host,
                    version,
                    sni,
                },
            )
        });
        join_all(attempts).await
    }
}

/// Marks every version that a certificate-bearing transcript reports as negotiated.
pub fn parse_support(transcripts: &[String]) -> ProtocolSupportMap {
    let mut support = ProtocolSupportMap::new();
    for transcript in transcripts.iter().filter(|t| is_certificate(t)) {
        let Some(label) = negotiated_protocol(transcript) else {
            continue;
        };
        if support.mark_label(label).is_none() {
            debug!(label, "ignoring unrecognized protocol version");
        }
    }
    support
}
