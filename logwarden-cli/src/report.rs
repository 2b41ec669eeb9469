//! CLI output payloads -- serializable reports with text rendering
//!
//! Each payload implements `Serialize` for `--output json` and
//! [`Render`](crate::output::Render) for the default text view.

use std::collections::BTreeMap;
use std::io::Write;

use serde::Serialize;

use logwarden_core::types::{AbusePattern, ColumnMetadata};
use logwarden_engine::summary::{StatusCount, SuspiciousIp, TopIp};
use logwarden_engine::{AbuseScan, DetectionReport, LineFailure, SecuritySummary, TimeRange};

use crate::output::Render;

/// Ingestion statistics for the report header.
#[derive(Debug, Serialize)]
pub struct IngestionSummary {
    /// Number of input files.
    pub files: usize,
    /// Successfully parsed lines.
    pub parsed: usize,
    /// Dropped non-blank lines.
    pub skipped: usize,
    /// First ten failed-line samples.
    pub failures: Vec<LineFailure>,
}

/// Full analysis report produced by `logwarden analyze`.
#[derive(Debug, Serialize)]
pub struct AnalyzeReport {
    pub ingestion: IngestionSummary,
    pub time_range: TimeRange,
    pub abuse: AbuseScan,
    pub top_threats: Vec<AbusePattern>,
    pub anomalies: DetectionReport,
    pub security: SecuritySummary,
    pub columns: BTreeMap<String, ColumnMetadata>,
    pub top_ips: Vec<TopIp>,
    pub status_distribution: Vec<StatusCount>,
    pub suspicious_ips: Vec<SuspiciousIp>,
}

impl Render for AnalyzeReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        writeln!(
            w,
            "Ingested {} lines from {} file(s) ({} skipped)",
            self.ingestion.parsed, self.ingestion.files, self.ingestion.skipped
        )?;
        for failure in &self.ingestion.failures {
            writeln!(
                w,
                "  ! {}:{}  {}",
                failure.file, failure.line_no, failure.excerpt
            )?;
        }
        writeln!(
            w,
            "Time range: {} .. {}",
            self.time_range.earliest, self.time_range.latest
        )?;

        writeln!(w, "\nAbuse patterns:")?;
        writeln!(w, "  brute_force:  {}", self.abuse.brute_force.len())?;
        writeln!(w, "  ddos:         {}", self.abuse.ddos.len())?;
        writeln!(w, "  scanning:     {}", self.abuse.scanning.len())?;
        writeln!(w, "  bot_behavior: {}", self.abuse.bot_behavior.len())?;

        if !self.top_threats.is_empty() {
            writeln!(w, "\nTop threats:")?;
            for threat in &self.top_threats {
                writeln!(
                    w,
                    "  [{}] {} ({}, confidence {:.2})",
                    threat.severity, threat.description, threat.pattern_type, threat.confidence
                )?;
            }
        }

        writeln!(
            w,
            "\nAnomaly alerts: {} total ({} critical, {} high, {} medium)",
            self.security.total_alerts,
            self.security.critical_count,
            self.security.high_count,
            self.security.medium_count
        )?;
        for alert in &self.security.top_alerts {
            writeln!(w, "  [{}] {}", alert.severity, alert.description)?;
        }
        if !self.anomalies.degraded.is_empty() {
            writeln!(w, "  (partial result - degraded sub-rules:)")?;
            for degraded in &self.anomalies.degraded {
                writeln!(w, "    - {}: {}", degraded.rule, degraded.reason)?;
            }
        }
        if !self.security.recommendations.is_empty() {
            writeln!(w, "\nRecommendations:")?;
            for rec in &self.security.recommendations {
                writeln!(w, "  - {rec}")?;
            }
        }

        if !self.top_ips.is_empty() {
            writeln!(w, "\nTop IPs:")?;
            for ip in &self.top_ips {
                writeln!(w, "  {:>8}  {}", ip.request_count, ip.ip)?;
            }
        }

        if !self.status_distribution.is_empty() {
            writeln!(w, "\nStatus codes:")?;
            for status in &self.status_distribution {
                writeln!(w, "  {:>8}  {}", status.count, status.status_code)?;
            }
        }

        if !self.suspicious_ips.is_empty() {
            writeln!(w, "\nSuspicious IPs:")?;
            for ip in &self.suspicious_ips {
                writeln!(
                    w,
                    "  {:>8}  {} (errors {}, 404s {}, paths {})",
                    ip.request_count, ip.ip, ip.error_count, ip.not_found_count, ip.unique_paths
                )?;
            }
        }

        writeln!(w, "\nColumns ({} profiled):", self.columns.len())?;
        for (name, meta) in &self.columns {
            writeln!(
                w,
                "  {name:<16} {:?}/{:?} distinct {} nulls {} score {:.2}",
                meta.data_type, meta.analysis_type, meta.cardinality, meta.null_count,
                meta.anomaly_score
            )?;
        }

        Ok(())
    }
}

/// One line result from `logwarden check-format`.
#[derive(Debug, Serialize)]
pub struct LineCheck {
    /// 1-based line number.
    pub line_no: usize,
    /// Whether the line parsed.
    pub ok: bool,
    /// Parsed host/request on success, error on failure.
    pub detail: String,
}

/// Report produced by `logwarden check-format`.
#[derive(Debug, Serialize)]
pub struct CheckFormatReport {
    pub format: String,
    pub file: String,
    pub parsed: usize,
    pub failed: usize,
    pub lines: Vec<LineCheck>,
}

impl Render for CheckFormatReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        writeln!(w, "Testing format '{}' against {}", self.format, self.file)?;
        for line in &self.lines {
            let mark = if line.ok { "✓" } else { "✗" };
            writeln!(w, "{mark} Line {}: {}", line.line_no, line.detail)?;
        }
        writeln!(w, "{} parsed, {} failed", self.parsed, self.failed)?;
        Ok(())
    }
}
