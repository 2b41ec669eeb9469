//! 컬럼 프로파일러 -- 컬럼별 기술 메타데이터와 드릴다운 분석
//!
//! 레코드 셋의 각 컬럼에 대해 기수(cardinality), null 수, 샘플 값,
//! 최빈값, 의미 타입 추론, 관심도 점수를 계산합니다. 특정 컬럼의
//! 프로파일링 쿼리가 실패해도 플레이스홀더 메타데이터로 대체되어
//! 하위 소비자에게 계속 보이며, 전체 패스는 실패하지 않습니다.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::warn;

use logwarden_core::error::StoreError;
use logwarden_core::query::{AggregateFn, Column, Predicate, QuerySpec, RecordQuery};
use logwarden_core::types::{AnalysisType, ColumnMetadata, DataType, TimeFilter, ValueCount};

/// 샘플/최빈값 상한
const SAMPLE_LIMIT: usize = 10;

/// 데이터셋의 타임스탬프 범위
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    /// 가장 이른 타임스탬프 (없으면 "Unknown")
    pub earliest: String,
    /// 가장 늦은 타임스탬프 (없으면 "Unknown")
    pub latest: String,
}

impl Default for TimeRange {
    fn default() -> Self {
        Self {
            earliest: "Unknown".to_owned(),
            latest: "Unknown".to_owned(),
        }
    }
}

/// 컬럼 그룹 드릴다운의 버킷 하나
#[derive(Debug, Clone, Serialize)]
pub struct GroupBucket {
    /// 그룹 컬럼별 값
    pub values: BTreeMap<String, String>,
    /// 값 튜플의 빈도
    pub frequency: u64,
    /// 전체 대비 비율 (0-100)
    pub percentage: f64,
}

/// 컬럼 그룹 드릴다운 결과
#[derive(Debug, Serialize)]
pub struct ColumnGroupReport {
    /// 분석한 컬럼명
    pub columns: Vec<String>,
    /// 빈도 내림차순 버킷
    pub groups: Vec<GroupBucket>,
    /// 반환된 버킷 수
    pub total_groups: usize,
    /// 적용된 시간 필터
    pub time_filter: Option<TimeFilter>,
}

/// 컬럼 프로파일러
pub struct ColumnProfiler<'a> {
    store: &'a dyn RecordQuery,
}

impl<'a> ColumnProfiler<'a> {
    /// 스토어 핸들로 프로파일러를 생성합니다.
    pub fn new(store: &'a dyn RecordQuery) -> Self {
        Self { store }
    }

    /// 레코드 셋의 모든 컬럼을 분석합니다.
    ///
    /// 실패한 컬럼은 플레이스홀더 메타데이터로 대체됩니다.
    pub fn analyze_all_columns(&self) -> BTreeMap<String, ColumnMetadata> {
        let mut all = BTreeMap::new();
        for column in self.store.columns() {
            let metadata = match self.analyze_column(column) {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!(column = column.name(), error = %e, "column analysis failed");
                    self.placeholder(column)
                }
            };
            all.insert(column.name().to_owned(), metadata);
        }
        all
    }

    /// 단일 컬럼을 분석합니다.
    pub fn analyze_column(&self, column: Column) -> Result<ColumnMetadata, StoreError> {
        // 기본 통계: 전체 수 / null 수 / 기수
        let basic = self.store.query(
            &QuerySpec::global()
                .aggregate(AggregateFn::Count, "total_count")
                .aggregate(
                    AggregateFn::CountIf(Predicate::NullOrEmpty(column)),
                    "null_count",
                )
                .aggregate(AggregateFn::CountDistinct(column), "cardinality"),
        )?;
        let stats = basic
            .first()
            .ok_or_else(|| StoreError::Query("empty basic stats result".to_owned()))?;
        let total_count = stats.get_u64("total_count");
        let null_count = stats.get_u64("null_count");
        let cardinality = stats.get_u64("cardinality");

        // 고유 샘플 값 (null/빈 값 제외, 최대 10)
        let sample_rows = self.store.query(
            &QuerySpec::grouped(column)
                .filter(Predicate::NotNullOrEmpty(column))
                .limit(SAMPLE_LIMIT),
        )?;
        let sample_values: Vec<String> = sample_rows
            .iter()
            .filter_map(|r| r.get_text(column.name()))
            .collect();

        // 최빈값 (값/빈도/비율, 최대 10)
        let top_rows = self.store.query(
            &QuerySpec::grouped(column)
                .filter(Predicate::NotNullOrEmpty(column))
                .aggregate(AggregateFn::Count, "frequency")
                .percent_of_total("percentage", vec![])
                .order_desc("frequency")
                .limit(SAMPLE_LIMIT),
        )?;
        let most_common: Vec<ValueCount> = top_rows
            .iter()
            .filter_map(|r| {
                r.get_text(column.name()).map(|value| ValueCount {
                    value,
                    frequency: r.get_u64("frequency"),
                    percentage: r.get_f64("percentage"),
                })
            })
            .collect();

        let (analysis_type, min_value, max_value, avg_length) =
            self.classify(column, &sample_values, cardinality, total_count);

        let anomaly_score = anomaly_score(cardinality, total_count, null_count, &most_common);

        Ok(ColumnMetadata {
            name: column.name().to_owned(),
            data_type: infer_data_type(&sample_values),
            cardinality,
            null_count,
            total_count,
            sample_values,
            min_value,
            max_value,
            avg_length,
            most_common,
            anomaly_score,
            analysis_type,
        })
    }

    /// 분석 분류를 결정하고 타입별 추가 통계를 조회합니다.
    ///
    /// 각 후보 분류의 보조 쿼리가 실패하면 다음 후보로 넘어갑니다.
    fn classify(
        &self,
        column: Column,
        samples: &[String],
        cardinality: u64,
        total_count: u64,
    ) -> (AnalysisType, Option<String>, Option<String>, Option<f64>) {
        let name = column.name();

        // 시간형: 이름 기반 판별, min/max 조회
        if name.contains("time") || name.contains("timestamp") {
            if let Ok(rows) = self.store.query(
                &QuerySpec::global()
                    .filter(Predicate::NotNullOrEmpty(column))
                    .aggregate(AggregateFn::Min(column), "min_val")
                    .aggregate(AggregateFn::Max(column), "max_val"),
            ) && let Some(row) = rows.first()
            {
                return (
                    AnalysisType::Temporal,
                    row.get_text("min_val"),
                    row.get_text("max_val"),
                    None,
                );
            }
        }

        // 수치형: 샘플의 80% 이상이 숫자
        let numeric_samples = samples
            .iter()
            .filter(|s| s.trim().parse::<f64>().is_ok())
            .count();
        if !samples.is_empty() && numeric_samples as f64 >= samples.len() as f64 * 0.8 {
            if let Ok(rows) = self.store.query(
                &QuerySpec::global()
                    .filter(Predicate::NotNullOrEmpty(column))
                    .aggregate(AggregateFn::Min(column), "min_val")
                    .aggregate(AggregateFn::Max(column), "max_val")
                    .aggregate(AggregateFn::AvgLength(column), "avg_length"),
            ) && let Some(row) = rows.first()
            {
                return (
                    AnalysisType::Numerical,
                    row.get_text("min_val"),
                    row.get_text("max_val"),
                    row.get("avg_length").and_then(|v| v.as_f64()),
                );
            }
        }

        // 텍스트형: 기수가 전체의 10% 초과
        if cardinality > total_count / 10 && total_count > 0 && cardinality > 0 {
            if let Ok(rows) = self.store.query(
                &QuerySpec::global()
                    .filter(Predicate::NotNullOrEmpty(column))
                    .aggregate(AggregateFn::AvgLength(column), "avg_length"),
            ) && let Some(row) = rows.first()
            {
                return (
                    AnalysisType::Text,
                    None,
                    None,
                    row.get("avg_length").and_then(|v| v.as_f64()),
                );
            }
        }

        (AnalysisType::Categorical, None, None, None)
    }

    /// 분석 실패 컬럼의 플레이스홀더 메타데이터
    ///
    /// 하위 소비자에게 컬럼이 계속 보이도록 전체 수는 최선 노력으로
    /// 조회하고, 실패하면 1로 둡니다.
    fn placeholder(&self, column: Column) -> ColumnMetadata {
        let total_count = self
            .store
            .query(&QuerySpec::global().aggregate(AggregateFn::Count, "total_count"))
            .ok()
            .and_then(|rows| rows.first().map(|r| r.get_u64("total_count")))
            .unwrap_or(1);

        ColumnMetadata {
            name: column.name().to_owned(),
            data_type: DataType::Unknown,
            cardinality: 1,
            null_count: 0,
            total_count,
            sample_values: vec!["(analysis failed)".to_owned()],
            min_value: None,
            max_value: None,
            avg_length: None,
            most_common: vec![],
            anomaly_score: 0.1,
            analysis_type: AnalysisType::Categorical,
        }
    }

    /// 여러 컬럼의 값 튜플을 함께 분석합니다 (드릴다운).
    ///
    /// 전체 값 튜플의 빈도/비율을 빈도 내림차순으로 반환합니다.
    pub fn analyze_column_group(
        &self,
        columns: &[Column],
        window: Option<&TimeFilter>,
        limit: usize,
    ) -> Result<ColumnGroupReport, StoreError> {
        if columns.is_empty() {
            return Ok(ColumnGroupReport {
                columns: vec![],
                groups: vec![],
                total_groups: 0,
                time_filter: window.cloned(),
            });
        }

        let time = window.map(Predicate::from_time_filter).transpose()?;

        let mut spec = QuerySpec::grouped_by(columns.to_vec());
        for column in columns {
            spec = spec.filter(Predicate::NotNullOrEmpty(*column));
        }
        let spec = spec
            .filter_opt(time.clone())
            .aggregate(AggregateFn::Count, "frequency")
            .percent_of_total("percentage", time.into_iter().collect())
            .order_desc("frequency")
            .limit(limit);

        let rows = self.store.query(&spec)?;
        let groups: Vec<GroupBucket> = rows
            .iter()
            .map(|row| GroupBucket {
                values: columns
                    .iter()
                    .filter_map(|c| {
                        row.get_text(c.name()).map(|v| (c.name().to_owned(), v))
                    })
                    .collect(),
                frequency: row.get_u64("frequency"),
                percentage: row.get_f64("percentage"),
            })
            .collect();

        Ok(ColumnGroupReport {
            columns: columns.iter().map(|c| c.name().to_owned()).collect(),
            total_groups: groups.len(),
            groups,
            time_filter: window.cloned(),
        })
    }

    /// 데이터셋의 타임스탬프 범위를 반환합니다.
    ///
    /// 조회에 실패하면 "Unknown"을 담은 기본값을 반환합니다.
    pub fn time_range(&self) -> TimeRange {
        let result = self.store.query(
            &QuerySpec::global()
                .filter(Predicate::NotNullOrEmpty(Column::Timestamp))
                .aggregate(AggregateFn::Min(Column::Timestamp), "earliest")
                .aggregate(AggregateFn::Max(Column::Timestamp), "latest"),
        );

        match result {
            Ok(rows) => rows
                .first()
                .and_then(|row| {
                    Some(TimeRange {
                        earliest: row.get_text("earliest")?,
                        latest: row.get_text("latest")?,
                    })
                })
                .unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "failed to get time range");
                TimeRange::default()
            }
        }
    }
}

/// 샘플 값에서 의미 타입을 추론합니다.
///
/// 우선순위: 전부 점-사분 IPv4 → ip_address; 하나라도 http(s):// 또는
/// `/`로 시작 → url; 하나라도 브라우저 토큰 포함 → user_agent; 전부
/// 숫자 → numeric; 그 외 → string.
fn infer_data_type(samples: &[String]) -> DataType {
    if samples.is_empty() {
        return DataType::Unknown;
    }
    let head: Vec<&String> = samples.iter().take(3).collect();

    if head.iter().all(|v| is_dotted_quad(v)) {
        return DataType::IpAddress;
    }

    if head
        .iter()
        .any(|v| v.starts_with("http://") || v.starts_with("https://") || v.starts_with('/'))
    {
        return DataType::Url;
    }

    if head.iter().any(|v| {
        let lower = v.to_lowercase();
        ["mozilla", "chrome", "safari"]
            .iter()
            .any(|b| lower.contains(b))
    }) {
        return DataType::UserAgent;
    }

    if head.iter().all(|v| v.trim().parse::<f64>().is_ok()) {
        return DataType::Numeric;
    }

    DataType::String
}

fn is_dotted_quad(value: &str) -> bool {
    let parts: Vec<&str> = value.split('.').collect();
    parts.len() == 4 && parts.iter().all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

/// 컬럼 관심도 점수 (0-1, 가산식, 1.0에서 상한)
///
/// - 기수 비율 > 0.5: +0.3
/// - null 비율 > 0.1: +0.2
/// - 최상위 값 점유율 > 80%: +0.3 (심한 편중)
/// - 최상위 값 점유율 < 5%이고 기수 > 100: +0.2 (고기수 균일 분포)
fn anomaly_score(
    cardinality: u64,
    total_count: u64,
    null_count: u64,
    most_common: &[ValueCount],
) -> f64 {
    let mut score = 0.0;
    let total = total_count.max(1) as f64;

    if cardinality as f64 / total > 0.5 {
        score += 0.3;
    }

    if null_count as f64 / total > 0.1 {
        score += 0.2;
    }

    if most_common.len() > 1 {
        let top_percentage = most_common[0].percentage;
        if top_percentage > 80.0 {
            score += 0.3;
        } else if top_percentage < 5.0 && cardinality > 100 {
            score += 0.2;
        }
    }

    f64::min(score, 1.0)
}
