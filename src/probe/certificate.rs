use crate::engine::command::{CommandRunner, Invocation};
use crate::model::SanSet;
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, warn};

pub const BEGIN_MARKER: &str = "-----BEGIN CERTIFICATE-----";
pub const END_MARKER: &str = "-----END CERTIFICATE-----";

pub fn is_certificate(text: &str) -> bool {
    text.contains(BEGIN_MARKER) && text.contains(END_MARKER)
}

/// First complete PEM certificate block, markers included.
pub fn pem_block(text: &str) -> Option<&str> {
    let start = text.find(BEGIN_MARKER)?;
    let end = text[start..].find(END_MARKER)? + start + END_MARKER.len();
    Some(&text[start..end])
}

/// Text handed to the inspection tool: the PEM block, or the whole text when
/// the markers do not form a complete block.
pub fn certificate_input(text: &str) -> &str {
    pem_block(text).unwrap_or(text)
}

fn dns_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"DNS:\S*\b").expect("static SAN pattern is valid"))
}

/// DNS-typed SAN entries in decoded certificate text.
pub fn parse_dns_names(decoded: &str) -> SanSet {
    dns_pattern()
        .find_iter(decoded.trim())
        .map(|m| m.as_str().replacen("DNS:", "", 1))
        .collect()
}

/// Decodes certificates with the inspection tool and collects their SANs.
pub struct SanExtractor<'a> {
    runner: &'a dyn CommandRunner,
    program: &'a str,
}

impl<'a> SanExtractor<'a> {
    pub fn new(runner: &'a dyn CommandRunner, program: &'a str) -> Self {
        Self { runner, program }
    }

    pub fn invocation(&self, certificate_text: &str) -> Invocation {
        Invocation::new(self.program)
            .args(["x509", "-noout", "-text"])
            .stdin(certificate_text.as_bytes().to_vec())
    }

    /// Returns an empty set when the tool fails or lists no DNS names.
    pub async fn extract_sans(&self, certificate_text: &str) -> SanSet {
        let pem = certificate_input(certificate_text);
        if !pem.is_ascii() {
            warn!("certificate text is not ASCII; skipping SAN extraction");
            return SanSet::new();
        }

        match self.runner.run(&self.invocation(pem)).await {
            Ok(output) => {
                if !output.success() {
                    debug!(status = ?output.status, stderr = %output.stderr.trim(), "certificate inspection failed");
                }
                parse_dns_names(&output.stdout)
            }
            Err(err) => {
                warn!(error = %err, "certificate inspection could not run");
                SanSet::new()
            }
        }
    }
}
