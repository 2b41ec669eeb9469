//! logwarden -- 액세스 로그 남용/이상 탐지 CLI
//!
//! 파일 존재 사전 검사, 설정 로딩, 로깅 초기화를 소유하고
//! 엔진 크레이트의 수집/탐지/프로파일링을 구동합니다.

mod cli;
mod logging;
mod output;
mod report;

use std::path::Path;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::info;

use logwarden_core::config::LogwardenConfig;
use logwarden_core::types::TimeFilter;
use logwarden_engine::{
    AbuseDetector, AnomalyDetector, ColumnProfiler, FileIngester, FormatResolver, summary,
};
use logwarden_store::MemoryStore;

use cli::{AnalyzeArgs, CheckFormatArgs, Cli, Commands};
use output::OutputWriter;
use report::{AnalyzeReport, CheckFormatReport, IngestionSummary, LineCheck};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(&cli.config).await?;
    if let Some(level) = &cli.log_level {
        config.general.log_level = level.clone();
    }
    logging::init_tracing(&config.general)?;

    let writer = OutputWriter::new(cli.output);
    match cli.command {
        Commands::Analyze(args) => run_analyze(args, &config, &writer).await,
        Commands::CheckFormat(args) => run_check_format(args, &config, &writer).await,
    }
}

/// 설정 파일이 있으면 로드하고, 없으면 기본값 + 환경변수를 사용합니다.
async fn load_config(path: &Path) -> Result<LogwardenConfig> {
    if path.exists() {
        let config = LogwardenConfig::load(path)
            .await
            .with_context(|| format!("failed to load config from {}", path.display()))?;
        Ok(config)
    } else {
        let mut config = LogwardenConfig::default();
        config.apply_env_overrides();
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

/// 파일 존재/가독성 사전 검사 — 엔진에 진입하기 전에 실패시킵니다.
fn precheck_files(paths: &[std::path::PathBuf]) -> Result<()> {
    for path in paths {
        if !path.is_file() {
            bail!("log file {} does not exist", path.display());
        }
    }
    Ok(())
}

async fn run_analyze(args: AnalyzeArgs, config: &LogwardenConfig, writer: &OutputWriter) -> Result<()> {
    precheck_files(&args.log_files)?;

    let format = args.format.as_deref().unwrap_or(&config.parser.format);
    let parser = FormatResolver::build(format)
        .map_err(logwarden_core::LogwardenError::from)
        .context("failed to build log parser")?;

    info!(format, files = args.log_files.len(), "starting analysis");

    let batch = FileIngester::new(parser)
        .ingest(&args.log_files)
        .await
        .map_err(logwarden_core::LogwardenError::from)
        .context("ingestion failed")?;

    let ingestion = IngestionSummary {
        files: args.log_files.len(),
        parsed: batch.parsed,
        skipped: batch.skipped,
        failures: batch.failures,
    };

    // 남용 탐지는 레코드 셋 직접, 나머지는 쿼리 경계를 통해
    let abuse_detector = AbuseDetector::with_config(&batch.records, config.abuse.clone());
    let abuse = abuse_detector.analyze_all_patterns();
    let top_threats = abuse_detector.get_top_threats(args.top);

    let window = match (&args.start, &args.end) {
        (Some(start), Some(end)) => Some(TimeFilter {
            start: start.clone(),
            end: end.clone(),
        }),
        _ => None,
    };

    let store = MemoryStore::new(batch.records);
    let anomaly_detector = AnomalyDetector::new(&store);
    let anomalies = anomaly_detector.detect_all_anomalies(window.as_ref());
    let security = anomaly_detector.get_security_summary(window.as_ref());

    let profiler = ColumnProfiler::new(&store);
    let columns = profiler.analyze_all_columns();
    let time_range = profiler.time_range();

    let top_ips = summary::top_ips(&store, 10).unwrap_or_default();
    let status_distribution = summary::status_code_distribution(&store).unwrap_or_default();
    let suspicious_ips =
        summary::suspicious_ips(&store, args.min_suspicious_requests).unwrap_or_default();

    let report = AnalyzeReport {
        ingestion,
        time_range,
        abuse,
        top_threats,
        anomalies,
        security,
        columns,
        top_ips,
        status_distribution,
        suspicious_ips,
    };
    writer.render(&report)
}

async fn run_check_format(
    args: CheckFormatArgs,
    config: &LogwardenConfig,
    writer: &OutputWriter,
) -> Result<()> {
    precheck_files(std::slice::from_ref(&args.log_file))?;

    let format = args.format.as_deref().unwrap_or(&config.parser.format);
    let parser = FormatResolver::build(format)
        .map_err(logwarden_core::LogwardenError::from)
        .context("failed to build log parser")?;

    let bytes = tokio::fs::read(&args.log_file)
        .await
        .with_context(|| format!("failed to read {}", args.log_file.display()))?;
    let text = String::from_utf8_lossy(&bytes);

    let mut lines = Vec::new();
    for (idx, line) in text.lines().take(args.lines).enumerate() {
        match parser.parse_line(line) {
            Ok(record) => lines.push(LineCheck {
                line_no: idx + 1,
                ok: true,
                detail: format!("{} - {}", record.remote_host, record.request_line),
            }),
            Err(e) => lines.push(LineCheck {
                line_no: idx + 1,
                ok: false,
                detail: e.to_string(),
            }),
        }
    }

    let parsed = lines.iter().filter(|l| l.ok).count();
    let report = CheckFormatReport {
        format: format.to_owned(),
        file: args.log_file.display().to_string(),
        parsed,
        failed: lines.len() - parsed,
        lines,
    };
    writer.render(&report)
}
