//! 파일 수집기 -- 라인 파서를 파일 집합 위에서 구동합니다.
//!
//! 파일은 라인 지향 UTF-8 텍스트로 읽으며(손실 디코딩), 성공적으로
//! 파싱된 라인마다 레코드 하나를 만들고 파생 필드를 계산합니다.
//! 파싱에 실패한 라인은 드롭되고 수집은 계속됩니다. 실행(run)당 처음
//! 10개의 비어있지 않은 실패 라인은 진단용으로 개별 보고되며, 이후
//! 실패는 카운트만 됩니다.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use logwarden_core::pipeline::LineParser;
use logwarden_core::types::LogRecord;

use crate::error::EngineError;

/// 실행당 개별 보고되는 실패 라인 샘플 수
pub const FAILURE_SAMPLE_LIMIT: usize = 10;

/// 실패 샘플의 라인 발췌 최대 길이 (문자)
const EXCERPT_LIMIT: usize = 120;

/// 파싱에 실패한 라인 하나의 진단 샘플
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineFailure {
    /// 파일 경로
    pub file: String,
    /// 1부터 시작하는 라인 번호
    pub line_no: usize,
    /// 라인 발췌 (최대 120자)
    pub excerpt: String,
}

/// 수집 결과 — 레코드 셋과 수집 통계
///
/// 레코드 셋은 수집 파이프라인이 소유하며, 탐지기들은 읽기 전용으로
/// 공유합니다.
#[derive(Debug, Default)]
pub struct RecordBatch {
    /// 성공적으로 파싱된 레코드 (파생 필드 포함)
    pub records: Vec<LogRecord>,
    /// 파싱 성공 라인 수
    pub parsed: usize,
    /// 파싱 실패로 드롭된 비어있지 않은 라인 수
    pub skipped: usize,
    /// 처음 10개 실패 라인 샘플
    pub failures: Vec<LineFailure>,
}

/// 파일 수집기
///
/// 구성된 라인 파서를 하나 이상의 파일 위에서 구동합니다.
/// 파일 존재/가독성 사전 검사는 CLI 레이어가 소유합니다.
pub struct FileIngester {
    parser: Box<dyn LineParser>,
}

impl FileIngester {
    /// 구성된 파서로 수집기를 생성합니다.
    pub fn new(parser: Box<dyn LineParser>) -> Self {
        Self { parser }
    }

    /// 파일 목록을 순서대로 수집합니다.
    ///
    /// 모든 입력에서 파싱된 레코드가 0건이면
    /// [`EngineError::NoUsableData`]를 반환합니다. I/O 에러는 그대로
    /// 전파됩니다.
    pub async fn ingest(&self, paths: &[PathBuf]) -> Result<RecordBatch, EngineError> {
        let mut batch = RecordBatch::default();

        for path in paths {
            self.ingest_file(path, &mut batch).await?;
        }

        if batch.records.is_empty() {
            return Err(EngineError::NoUsableData);
        }

        info!(
            files = paths.len(),
            parsed = batch.parsed,
            skipped = batch.skipped,
            "ingestion complete"
        );
        Ok(batch)
    }

    async fn ingest_file(&self, path: &Path, batch: &mut RecordBatch) -> Result<(), EngineError> {
        let bytes = tokio::fs::read(path).await?;
        let text = String::from_utf8_lossy(&bytes);

        let before = batch.parsed;
        for (idx, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }

            match self.parser.parse_line(line) {
                Ok(mut record) => {
                    record.derive_fields();
                    batch.records.push(record);
                    batch.parsed += 1;
                    metrics::counter!("logwarden_lines_parsed_total").increment(1);
                }
                Err(e) => {
                    batch.skipped += 1;
                    metrics::counter!("logwarden_lines_failed_total").increment(1);
                    if batch.failures.len() < FAILURE_SAMPLE_LIMIT {
                        batch.failures.push(LineFailure {
                            file: path.display().to_string(),
                            line_no: idx + 1,
                            excerpt: line.chars().take(EXCERPT_LIMIT).collect(),
                        });
                    }
                    debug!(
                        file = %path.display(),
                        line_no = idx + 1,
                        error = %e,
                        "line dropped"
                    );
                }
            }
        }

        info!(
            file = %path.display(),
            parsed = batch.parsed - before,
            "file ingested"
        );
        Ok(())
    }
}
