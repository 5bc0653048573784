use crate::model::{OutputConfig, OutputFormat, ScanResult, TlsReport};
use anyhow::Context;
use std::io::Write;

pub fn write_report<W: Write>(
    cfg: &OutputConfig,
    report: &TlsReport,
    mut writer: W,
) -> anyhow::Result<()> {
    match cfg.format {
        OutputFormat::Jsonl => {
            let line = serde_json::to_string(report).context("failed to serialize report")?;
            writeln!(writer, "{line}")?;
        }
        OutputFormat::Pretty => write_pretty(&mut writer, report)?,
    }

    writer.flush()?;
    Ok(())
}

fn write_pretty<W: Write>(writer: &mut W, report: &TlsReport) -> anyhow::Result<()> {
    writeln!(writer, "{}:{} @ {}", report.host, report.port, report.timestamp)?;
    writeln!(writer, "  ciphers:")?;
    for line in report.ciphers.lines() {
        writeln!(writer, "    {line}")?;
    }
    write_mode(writer, "sni", report.sni.as_ref())?;
    write_mode(writer, "non-sni", report.non_sni.as_ref())?;
    let verdict = match report.sans_identical {
        Some(true) => "yes",
        Some(false) => "no",
        None => "not compared",
    };
    writeln!(writer, "  SANs identical: {verdict}")?;
    Ok(())
}

fn write_mode<W: Write>(writer: &mut W, name: &str, result: Option<&ScanResult>) -> anyhow::Result<()> {
    let Some(result) = result else {
        writeln!(writer, "  {name}: not collected")?;
        return Ok(());
    };

    writeln!(writer, "  {name}:")?;
    for (version, supported) in result.protocols.iter() {
        writeln!(writer, "    {version}: {}", if supported { "supported" } else { "no" })?;
    }
    match &result.sans {
        Some(sans) => {
            let names: Vec<&str> = sans.iter().map(String::as_str).collect();
            writeln!(writer, "    SANs: {}", names.join(", "))?;
        }
        None => writeln!(writer, "    SANs: none")?,
    }
    Ok(())
}
