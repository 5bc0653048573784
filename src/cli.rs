use crate::model::{Config, OutputConfig, OutputFormat, TargetSpec, ToolPaths};
use clap::{ArgAction, Parser};

#[derive(Debug, Parser)]
#[command(author, version, about = "TLS protocol, cipher and SAN reconnaissance", long_about = None)]
pub struct Cli {
    /// Host to probe
    #[arg(short = 'H', long = "host", value_name = "HOST")]
    pub host: String,

    /// Port for cipher enumeration (handshakes always use 443)
    #[arg(short = 'p', long = "port", value_name = "PORT", default_value_t = 443)]
    pub port: u16,

    /// Cipher enumeration binary
    #[arg(long = "nmap", value_name = "PATH", default_value = "nmap")]
    pub nmap: String,

    /// Handshake and certificate inspection binary
    #[arg(long = "openssl", value_name = "PATH", default_value = "openssl")]
    pub openssl: String,

    /// Output format
    #[arg(long = "output", default_value_t = OutputFormat::Jsonl)]
    pub output: OutputFormat,

    /// Human-readable output instead of JSONL
    #[arg(long = "pretty", action = ArgAction::SetTrue)]
    pub pretty: bool,
}

impl Cli {
    pub fn into_config(self) -> anyhow::Result<Config> {
        let host = self.host.trim();
        if host.is_empty() {
            anyhow::bail!("--host must not be empty");
        }

        if self.port == 0 {
            anyhow::bail!("port must be greater than zero");
        }

        if self.nmap.is_empty() || self.openssl.is_empty() {
            anyhow::bail!("tool paths must not be empty");
        }

        Ok(Config {
            target: TargetSpec {
                host: host.to_string(),
                port: self.port,
            },
            tools: ToolPaths {
                nmap: self.nmap,
                openssl: self.openssl,
            },
            output: OutputConfig {
                format: if self.pretty {
                    OutputFormat::Pretty
                } else {
                    self.output
                },
            },
        })
    }
}
