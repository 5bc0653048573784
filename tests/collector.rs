use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tls_recon::engine::command::{CommandOutput, CommandRunner, Invocation};
use tls_recon::model::{SanComparison, TargetSpec, TlsVersion, ToolPaths};
use tls_recon::TlsDataCollector;
use tokio::sync::Barrier;

const CERT_A: &str = "-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----";
const CERT_B: &str = "-----BEGIN CERTIFICATE-----\nBBBB\n-----END CERTIFICATE-----";

fn transcript(cert: &str, protocol: &str) -> String {
    format!(
        "CONNECTED(00000003)\n---\nServer certificate\n{cert}\n---\nSSL-Session:\n    Protocol  : {protocol}\n    Cipher    : ECDHE-RSA-AES128-SHA\n"
    )
}

fn ok(stdout: impl Into<String>) -> CommandOutput {
    CommandOutput {
        status: Some(0),
        stdout: stdout.into(),
        stderr: String::new(),
        timed_out: false,
    }
}

/// Answers tool invocations from canned output and records every call.
struct ScriptedRunner {
    cipher: CommandOutput,
    /// Keyed by (sni, version flag).
    handshakes: HashMap<(bool, &'static str), CommandOutput>,
    /// Keyed by PEM block piped on stdin.
    decoded: HashMap<&'static str, &'static str>,
    barrier: Barrier,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    fn new(cipher: CommandOutput) -> Self {
        Self {
            cipher,
            handshakes: HashMap::new(),
            decoded: HashMap::new(),
            barrier: Barrier::new(3),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn handshake(mut self, sni: bool, version: TlsVersion, output: CommandOutput) -> Self {
        self.handshakes.insert((sni, version.flag()), output);
        self
    }

    fn decodes(mut self, pem: &'static str, text: &'static str) -> Self {
        self.decoded.insert(pem, text);
        self
    }

    fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, invocation: &Invocation) -> anyhow::Result<CommandOutput> {
        self.calls.lock().unwrap().push(invocation.clone());

        if invocation.program == "nmap" {
            return Ok(self.cipher.clone());
        }

        match invocation.args.first().map(String::as_str) {
            Some("s_client") => {
                // All three attempts of a mode must be in flight together.
                tokio::time::timeout(Duration::from_secs(2), self.barrier.wait())
                    .await
                    .map_err(|_| anyhow::anyhow!("handshake attempts were serialized"))?;
                let sni = invocation.args.iter().any(|a| a == "-servername");
                let flag = invocation.args.last().map(String::as_str).unwrap_or_default();
                Ok(self
                    .handshakes
                    .iter()
                    .find(|((s, f), _)| *s == sni && *f == flag)
                    .map(|(_, out)| out.clone())
                    .unwrap_or_default())
            }
            Some("x509") => {
                let input = String::from_utf8(invocation.stdin.clone().unwrap_or_default())?;
                let text = self.decoded.get(input.as_str()).copied().unwrap_or_default();
                Ok(ok(text))
            }
            other => anyhow::bail!("unexpected invocation {other:?}"),
        }
    }
}

fn collector(runner: Arc<ScriptedRunner>, port: u16) -> TlsDataCollector {
    TlsDataCollector::new(
        TargetSpec {
            host: "example.com".into(),
            port,
        },
        ToolPaths::default(),
        runner,
    )
}

#[tokio::test]
async fn middle_transcript_drives_support_and_sans() {
    let runner = Arc::new(
        ScriptedRunner::new(ok("Nmap scan report\n|   TLSv1.1:\n|     ciphers:\n"))
            .handshake(true, TlsVersion::Tls1_1, ok(transcript(CERT_A, "TLSv1.1")))
            .decodes(CERT_A, "X509v3 Subject Alternative Name:\n    DNS:example.com, DNS:www.example.com"),
    );
    let mut collector = collector(runner.clone(), 443);
    collector.collect_all().await;

    assert_eq!(collector.ciphers(), "|   TLSv1.1:\n|     ciphers:");

    let sni = collector.sni_data().unwrap();
    assert!(!sni.protocols.get(TlsVersion::Tls1));
    assert!(sni.protocols.get(TlsVersion::Tls1_1));
    assert!(!sni.protocols.get(TlsVersion::Tls1_2));
    let sans: Vec<&str> = sni.sans.as_ref().unwrap().iter().map(String::as_str).collect();
    assert_eq!(sans, vec!["example.com", "www.example.com"]);
    assert_eq!(sni.certificate.as_deref(), Some(CERT_A));

    let non_sni = collector.non_sni_data().unwrap();
    assert!(non_sni.protocols.iter().all(|(_, supported)| !supported));
    assert!(non_sni.sans.is_none());
    assert_eq!(collector.are_sans_identical(), SanComparison::NotCompared);

    let inspections: Vec<_> = runner
        .calls()
        .into_iter()
        .filter(|inv| inv.args.first().map(String::as_str) == Some("x509"))
        .collect();
    assert_eq!(inspections.len(), 1);
    assert_eq!(inspections[0].stdin.as_deref(), Some(CERT_A.as_bytes()));
}

#[tokio::test]
async fn first_certificate_in_version_order_wins() {
    let runner = Arc::new(
        ScriptedRunner::new(ok(""))
            .handshake(false, TlsVersion::Tls1, ok(transcript(CERT_A, "TLSv1")))
            .handshake(false, TlsVersion::Tls1_2, ok(transcript(CERT_B, "TLSv1.2")))
            .handshake(true, TlsVersion::Tls1_2, ok(transcript(CERT_B, "TLSv1.2")))
            .decodes(CERT_A, "DNS:a.example")
            .decodes(CERT_B, "DNS:b.example"),
    );
    let mut collector = collector(runner, 443);
    collector.collect_all().await;

    let non_sni = collector.non_sni_data().unwrap();
    assert!(non_sni.protocols.get(TlsVersion::Tls1));
    assert!(!non_sni.protocols.get(TlsVersion::Tls1_1));
    assert!(non_sni.protocols.get(TlsVersion::Tls1_2));
    assert!(non_sni.sans.as_ref().unwrap().contains("a.example"));
    assert_eq!(non_sni.sans.as_ref().unwrap().len(), 1);

    let sni = collector.sni_data().unwrap();
    assert!(sni.sans.as_ref().unwrap().contains("b.example"));
    assert_eq!(collector.are_sans_identical(), SanComparison::Different);
    assert_eq!(collector.report().sans_identical, Some(false));
}

#[tokio::test]
async fn identical_certificates_compare_equal() {
    let runner = Arc::new(
        ScriptedRunner::new(ok(""))
            .handshake(true, TlsVersion::Tls1_2, ok(transcript(CERT_A, "TLSv1.2")))
            .handshake(false, TlsVersion::Tls1_2, ok(transcript(CERT_A, "TLSv1.2")))
            .decodes(CERT_A, "DNS:example.com, DNS:example.com"),
    );
    let mut collector = collector(runner, 443);
    collector.collect_all().await;
    assert_eq!(collector.are_sans_identical(), SanComparison::Identical);
}

#[tokio::test]
async fn phases_run_in_order_and_handshakes_use_port_443() {
    let runner = Arc::new(ScriptedRunner::new(CommandOutput {
        status: Some(1),
        stdout: String::new(),
        stderr: "  Failed to resolve \"example.com\".\n".into(),
        timed_out: false,
    }));
    let mut collector = collector(runner.clone(), 8443);
    collector.collect_all().await;

    assert_eq!(collector.ciphers(), "Failed to resolve \"example.com\".");

    let calls = runner.calls();
    assert_eq!(calls.len(), 7);
    assert_eq!(
        calls[0].command_line(),
        "nmap --script ssl-enum-ciphers -p 8443 example.com"
    );

    for (idx, call) in calls[1..].iter().enumerate() {
        let sni = idx < 3;
        assert_eq!(call.program, "openssl");
        assert!(call.args.contains(&"example.com:443".to_string()));
        assert_eq!(call.args.iter().any(|a| a == "-servername"), sni);
        assert_eq!(call.timeout, Some(Duration::from_secs(7)));
    }

    let sni = collector.sni_data().unwrap();
    assert!(sni.protocols.iter().all(|(_, supported)| !supported));
    assert!(sni.sans.is_none());
}

#[tokio::test]
async fn timed_out_attempts_only_remove_evidence() {
    let partial = CommandOutput {
        status: None,
        stdout: "CONNECTED(00000003)\n-----BEGIN CERTIFICATE-----\nAAAA".into(),
        stderr: String::new(),
        timed_out: true,
    };
    let runner = Arc::new(
        ScriptedRunner::new(ok(""))
            .handshake(true, TlsVersion::Tls1, partial)
            .handshake(true, TlsVersion::Tls1_2, ok(transcript(CERT_B, "TLSv1.2")))
            .decodes(CERT_B, "DNS:b.example"),
    );
    let mut collector = collector(runner, 443);
    collector.collect_all().await;

    let sni = collector.sni_data().unwrap();
    assert!(!sni.protocols.get(TlsVersion::Tls1));
    assert!(sni.protocols.get(TlsVersion::Tls1_2));
    assert!(sni.sans.as_ref().unwrap().contains("b.example"));
}

#[tokio::test]
async fn certificate_accompanies_sans_for_out_of_order_markers() {
    const REVERSED: &str =
        "-----END CERTIFICATE-----\nProtocol  : TLSv1.2\n-----BEGIN CERTIFICATE-----";
    let runner = Arc::new(
        ScriptedRunner::new(ok(""))
            .handshake(true, TlsVersion::Tls1_2, ok(REVERSED))
            .handshake(false, TlsVersion::Tls1_2, ok(REVERSED))
            .decodes(REVERSED, "DNS:a.example"),
    );
    let mut collector = collector(runner, 443);
    collector.collect_all().await;

    for result in [collector.sni_data().unwrap(), collector.non_sni_data().unwrap()] {
        assert!(result.sans.as_ref().unwrap().contains("a.example"));
        assert_eq!(result.sans.is_some(), result.certificate.is_some());
        assert_eq!(result.certificate.as_deref(), Some(REVERSED));
    }
}
