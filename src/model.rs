#[cfg(feature = "cli")]
use clap::ValueEnum;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;

pub type SanSet = BTreeSet<String>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetSpec {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolPaths {
    pub nmap: String,
    pub openssl: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            nmap: "nmap".into(),
            openssl: "openssl".into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub target: TargetSpec,
    pub tools: ToolPaths,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub format: OutputFormat,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(ValueEnum))]
pub enum OutputFormat {
    Jsonl,
    Pretty,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Jsonl => write!(f, "jsonl"),
            OutputFormat::Pretty => write!(f, "pretty"),
        }
    }
}

/// Protocol versions probed by the collector, in probing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TlsVersion {
    Tls1,
    Tls1_1,
    Tls1_2,
}

impl TlsVersion {
    pub const ALL: [TlsVersion; 3] = [TlsVersion::Tls1, TlsVersion::Tls1_1, TlsVersion::Tls1_2];

    /// Label as printed by the handshake tool on its `Protocol` line.
    pub fn label(self) -> &'static str {
        match self {
            TlsVersion::Tls1 => "TLSv1",
            TlsVersion::Tls1_1 => "TLSv1.1",
            TlsVersion::Tls1_2 => "TLSv1.2",
        }
    }

    /// Handshake tool flag pinning the negotiation to this version.
    pub fn flag(self) -> &'static str {
        match self {
            TlsVersion::Tls1 => "-tls1",
            TlsVersion::Tls1_1 => "-tls1_1",
            TlsVersion::Tls1_2 => "-tls1_2",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.label() == label)
    }

    fn index(self) -> usize {
        match self {
            TlsVersion::Tls1 => 0,
            TlsVersion::Tls1_1 => 1,
            TlsVersion::Tls1_2 => 2,
        }
    }
}

impl fmt::Display for TlsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-version negotiation outcome. Always carries all three versions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProtocolSupportMap {
    supported: [bool; 3],
}

impl ProtocolSupportMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, version: TlsVersion) -> bool {
        self.supported[version.index()]
    }

    pub fn set(&mut self, version: TlsVersion) {
        self.supported[version.index()] = true;
    }

    /// Marks the version named by `label`. Unknown labels leave the map untouched.
    pub fn mark_label(&mut self, label: &str) -> Option<TlsVersion> {
        let version = TlsVersion::from_label(label)?;
        self.set(version);
        Some(version)
    }

    pub fn iter(&self) -> impl Iterator<Item = (TlsVersion, bool)> + '_ {
        TlsVersion::ALL.into_iter().map(|v| (v, self.get(v)))
    }
}

impl Serialize for ProtocolSupportMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(TlsVersion::ALL.len()))?;
        for (version, supported) in self.iter() {
            map.serialize_entry(version.label(), &supported)?;
        }
        map.end()
    }
}

/// Outcome of one negotiation mode (with or without SNI).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanResult {
    pub protocols: ProtocolSupportMap,
    #[serde(rename = "SANs", skip_serializing_if = "Option::is_none")]
    pub sans: Option<SanSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SanComparison {
    Identical,
    Different,
    NotCompared,
}

impl SanComparison {
    pub fn as_bool(self) -> Option<bool> {
        match self {
            SanComparison::Identical => Some(true),
            SanComparison::Different => Some(false),
            SanComparison::NotCompared => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TlsReport {
    pub host: String,
    pub port: u16,
    pub timestamp: String,
    pub ciphers: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sni: Option<ScanResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub non_sni: Option<ScanResult>,
    pub sans_identical: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_label_leaves_map_untouched() {
        let mut map = ProtocolSupportMap::new();
        assert_eq!(map.mark_label("TLSv1.3"), None);
        assert_eq!(map, ProtocolSupportMap::new());
        assert_eq!(map.mark_label("TLSv1.1"), Some(TlsVersion::Tls1_1));
        assert!(map.get(TlsVersion::Tls1_1));
        assert!(!map.get(TlsVersion::Tls1));
    }

    #[test]
    fn support_map_serializes_by_label() {
        let mut map = ProtocolSupportMap::new();
        map.set(TlsVersion::Tls1_2);
        let json = serde_json::to_value(map).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"TLSv1": false, "TLSv1.1": false, "TLSv1.2": true})
        );
    }

    #[test]
    fn absent_sans_are_omitted() {
        let json = serde_json::to_value(ScanResult::default()).unwrap();
        assert!(json.get("SANs").is_none());
        assert!(json.get("protocols").is_some());
    }
}
