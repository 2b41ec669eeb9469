//! 쿼리 경계 — 레코드 셋에 대한 group-by/집계 질의 계약
//!
//! 탐지기와 프로파일러는 스토어 구현체를 직접 알지 못하고
//! [`RecordQuery`] trait을 통해서만 질의합니다. 질의는 SQL 문자열이 아닌
//! [`QuerySpec`] 기술 객체로 표현되므로 구성상 인젝션이 불가능하며,
//! 임베디드 분석 엔진이든 인메모리 컬럼 테이블이든 구현체를 교체할 수
//! 있습니다.
//!
//! # 사용 예시
//! ```ignore
//! let spec = QuerySpec::grouped(Column::RemoteHost)
//!     .filter(Predicate::NotNullOrEmpty(Column::RemoteHost))
//!     .aggregate(AggregateFn::Count, "request_count")
//!     .percent_of_total("percentage", vec![])
//!     .order_desc("request_count")
//!     .limit(20);
//! let rows = store.query(&spec)?;
//! ```

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::StoreError;
use crate::types::TimeFilter;

/// 레코드 셋의 컬럼
///
/// 원본 10개 필드와 수집 시 파생된 6개 필드를 모두 포함합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    RemoteHost,
    RemoteLogname,
    RemoteUser,
    Timestamp,
    RequestLine,
    StatusCode,
    ResponseSize,
    Referer,
    UserAgent,
    RequestTime,
    Method,
    Path,
    Protocol,
    Hour,
    Date,
    FileExtension,
}

impl Column {
    /// 모든 컬럼 (레코드 셋 스키마 순서)
    pub const ALL: [Column; 16] = [
        Column::RemoteHost,
        Column::RemoteLogname,
        Column::RemoteUser,
        Column::Timestamp,
        Column::RequestLine,
        Column::StatusCode,
        Column::ResponseSize,
        Column::Referer,
        Column::UserAgent,
        Column::RequestTime,
        Column::Method,
        Column::Path,
        Column::Protocol,
        Column::Hour,
        Column::Date,
        Column::FileExtension,
    ];

    /// 컬럼명 문자열
    pub fn name(self) -> &'static str {
        match self {
            Self::RemoteHost => "remote_host",
            Self::RemoteLogname => "remote_logname",
            Self::RemoteUser => "remote_user",
            Self::Timestamp => "timestamp",
            Self::RequestLine => "request_line",
            Self::StatusCode => "status_code",
            Self::ResponseSize => "response_size",
            Self::Referer => "referer",
            Self::UserAgent => "user_agent",
            Self::RequestTime => "request_time",
            Self::Method => "method",
            Self::Path => "path",
            Self::Protocol => "protocol",
            Self::Hour => "hour",
            Self::Date => "date",
            Self::FileExtension => "file_extension",
        }
    }

    /// 컬럼명 문자열에서 컬럼을 찾습니다.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.name() == name)
    }
}

impl std::fmt::Display for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// 쿼리 결과 셀 값
///
/// 숫자 필드가 텍스트로 도착할 수 있으며, 호출자는 타입 getter로
/// 강제 변환(coerce)합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// 값 없음
    Null,
    /// 정수
    Int(i64),
    /// 부동소수
    Float(f64),
    /// 문자열
    Text(String),
}

impl Value {
    /// 정수로 강제 변환합니다. 텍스트는 파싱을 시도합니다.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Float(x) => Some(*x as i64),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Null => None,
        }
    }

    /// 부동소수로 강제 변환합니다. 텍스트는 파싱을 시도합니다.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(x) => Some(*x),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Null => None,
        }
    }

    /// 문자열 표현을 반환합니다. Null은 None입니다.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Int(i) => Some(i.to_string()),
            Self::Float(x) => Some(x.to_string()),
            Self::Text(s) => Some(s.clone()),
        }
    }

    /// Null 여부
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// 정렬용 비교 — 숫자끼리는 수치 비교, 문자열은 사전순,
    /// Null은 항상 최소입니다.
    pub fn compare(&self, other: &Value) -> std::cmp::Ordering {
        use std::cmp::Ordering;
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.total_cmp(&y),
                _ => a
                    .as_text()
                    .unwrap_or_default()
                    .cmp(&b.as_text().unwrap_or_default()),
            },
        }
    }
}

/// 쿼리 결과 행 — 필드명에서 값으로의 매핑
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Row {
    values: BTreeMap<String, Value>,
}

impl Row {
    /// 빈 행을 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 필드를 추가합니다.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    /// 원시 값을 조회합니다.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// 정수로 강제 변환하여 조회합니다. 없거나 변환 불가면 0입니다.
    pub fn get_u64(&self, name: &str) -> u64 {
        self.values
            .get(name)
            .and_then(Value::as_i64)
            .map(|i| i.max(0) as u64)
            .unwrap_or(0)
    }

    /// 정수로 강제 변환하여 조회합니다.
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.values.get(name).and_then(Value::as_i64)
    }

    /// 부동소수로 강제 변환하여 조회합니다. 없거나 변환 불가면 0.0입니다.
    pub fn get_f64(&self, name: &str) -> f64 {
        self.values
            .get(name)
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
    }

    /// 문자열 표현으로 조회합니다.
    pub fn get_text(&self, name: &str) -> Option<String> {
        self.values.get(name).and_then(Value::as_text)
    }

    /// (필드명, 값) 순회
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }
}

/// 행 필터 술어
///
/// 동등/범위/IS-NOT-NULL 계열과 포함 타임스탬프 범위를 표현합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    /// 컬럼 값이 주어진 값과 동등
    Eq(Column, Value),
    /// 컬럼 값 >= 주어진 값 (수치 비교)
    GreaterEq(Column, Value),
    /// 컬럼 값 > 주어진 값 (수치 비교)
    Greater(Column, Value),
    /// 컬럼 값이 null이 아니고 빈 문자열도 아님
    NotNullOrEmpty(Column),
    /// 컬럼 값이 null이거나 빈 문자열 (프로파일러의 null 집계용)
    NullOrEmpty(Column),
    /// 타임스탬프가 [start, end] 범위 안 (양 끝 포함)
    TimestampBetween(NaiveDateTime, NaiveDateTime),
}

impl Predicate {
    /// 시간 필터를 범위 술어로 변환합니다.
    ///
    /// 문자열 형식이 스토어가 이해하는 `%Y-%m-%d %H:%M:%S`가 아니면
    /// [`StoreError::TimeFilter`]를 반환합니다.
    pub fn from_time_filter(filter: &TimeFilter) -> Result<Self, StoreError> {
        let start = parse_filter_timestamp(&filter.start)?;
        let end = parse_filter_timestamp(&filter.end)?;
        Ok(Self::TimestampBetween(start, end))
    }
}

fn parse_filter_timestamp(value: &str) -> Result<NaiveDateTime, StoreError> {
    NaiveDateTime::parse_from_str(value.trim(), "%Y-%m-%d %H:%M:%S").map_err(|_| {
        StoreError::TimeFilter {
            value: value.to_owned(),
        }
    })
}

/// 집계 함수
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AggregateFn {
    /// 그룹 내 행 수
    Count,
    /// 술어를 만족하는 행 수
    CountIf(Predicate),
    /// 고유값 수 (null 제외)
    CountDistinct(Column),
    /// 최솟값 (null 제외)
    Min(Column),
    /// 최댓값 (null 제외)
    Max(Column),
    /// 수치 평균 (null 제외)
    Avg(Column),
    /// 문자열 길이 평균 (null 제외)
    AvgLength(Column),
}

/// 별칭이 붙은 집계
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    /// 집계 함수
    pub func: AggregateFn,
    /// 결과 행에서의 필드명
    pub alias: String,
}

/// 정렬 방향
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDir {
    /// 오름차순
    Asc,
    /// 내림차순
    Desc,
}

/// 정렬 키 (집계 별칭 또는 그룹 컬럼명)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    /// 정렬 대상 필드명
    pub key: String,
    /// 방향
    pub dir: SortDir,
}

/// 전체 대비 비율 계산 지시
///
/// 각 그룹의 행 수를 `predicates`를 만족하는 전체 레코드 수로 나눈
/// 백분율(0-100)을 `alias` 필드로 내보냅니다. 서브쿼리 스타일의
/// "percentage of grand total"에 해당합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PercentOfTotal {
    /// 결과 필드명
    pub alias: String,
    /// 분모를 제한하는 술어 (빈 목록이면 전체 레코드)
    pub predicates: Vec<Predicate>,
}

/// 파라미터화된 쿼리 명세
///
/// SQL 문자열 조립 대신 컬럼/술어/집계 기술 객체로 질의를 표현합니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    /// GROUP BY 컬럼 목록 (비어있으면 전체를 단일 그룹으로 집계)
    pub group_by: Vec<Column>,
    /// WHERE 술어 (AND 결합)
    pub predicates: Vec<Predicate>,
    /// 집계 목록
    pub aggregates: Vec<Aggregate>,
    /// 정렬
    pub order_by: Option<OrderBy>,
    /// 결과 행 수 제한
    pub limit: Option<usize>,
    /// 전체 대비 비율 계산
    pub percent_of_total: Option<PercentOfTotal>,
}

impl QuerySpec {
    /// 그룹 없는(전역 집계) 쿼리를 생성합니다.
    pub fn global() -> Self {
        Self::default()
    }

    /// 단일 컬럼으로 그룹화하는 쿼리를 생성합니다.
    pub fn grouped(column: Column) -> Self {
        Self {
            group_by: vec![column],
            ..Self::default()
        }
    }

    /// 여러 컬럼으로 그룹화하는 쿼리를 생성합니다.
    pub fn grouped_by(columns: Vec<Column>) -> Self {
        Self {
            group_by: columns,
            ..Self::default()
        }
    }

    /// 술어를 추가합니다.
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// 선택적 술어를 추가합니다. None이면 무시됩니다.
    pub fn filter_opt(mut self, predicate: Option<Predicate>) -> Self {
        if let Some(p) = predicate {
            self.predicates.push(p);
        }
        self
    }

    /// 집계를 추가합니다.
    pub fn aggregate(mut self, func: AggregateFn, alias: impl Into<String>) -> Self {
        self.aggregates.push(Aggregate {
            func,
            alias: alias.into(),
        });
        self
    }

    /// 내림차순 정렬을 지정합니다.
    pub fn order_desc(mut self, key: impl Into<String>) -> Self {
        self.order_by = Some(OrderBy {
            key: key.into(),
            dir: SortDir::Desc,
        });
        self
    }

    /// 오름차순 정렬을 지정합니다.
    pub fn order_asc(mut self, key: impl Into<String>) -> Self {
        self.order_by = Some(OrderBy {
            key: key.into(),
            dir: SortDir::Asc,
        });
        self
    }

    /// 결과 행 수를 제한합니다.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// 전체 대비 비율 필드를 추가합니다.
    pub fn percent_of_total(
        mut self,
        alias: impl Into<String>,
        predicates: Vec<Predicate>,
    ) -> Self {
        self.percent_of_total = Some(PercentOfTotal {
            alias: alias.into(),
            predicates,
        });
        self
    }
}

/// 레코드 셋에 대한 질의 능력 — 외부 협력자 경계
///
/// 구현체는 호출을 블로킹 방식으로 처리하며 실패할 수 있습니다.
/// 호출자(탐지 서브 규칙)는 실패를 잡아 빈 결과로 격하해야 합니다.
/// 구현체는 레코드 셋을 읽기 전용으로 취급해야 합니다.
pub trait RecordQuery: Send + Sync {
    /// 쿼리를 실행하고 결과 행을 반환합니다.
    fn query(&self, spec: &QuerySpec) -> Result<Vec<Row>, StoreError>;

    /// 레코드 셋의 전체 레코드 수
    fn record_count(&self) -> usize;

    /// 스토어가 노출하는 컬럼 목록
    fn columns(&self) -> Vec<Column> {
        Column::ALL.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_name_roundtrip() {
        for column in Column::ALL {
            assert_eq!(Column::from_name(column.name()), Some(column));
        }
        assert_eq!(Column::from_name("nonexistent"), None);
    }

    #[test]
    fn value_coercion_from_text() {
        assert_eq!(Value::Text("123".to_owned()).as_i64(), Some(123));
        assert_eq!(Value::Text(" 4.5 ".to_owned()).as_f64(), Some(4.5));
        assert_eq!(Value::Text("abc".to_owned()).as_i64(), None);
        assert_eq!(Value::Null.as_f64(), None);
    }

    #[test]
    fn value_compare_numeric_aware() {
        use std::cmp::Ordering;
        assert_eq!(
            Value::Int(2).compare(&Value::Float(10.0)),
            Ordering::Less
        );
        assert_eq!(
            Value::Text("b".to_owned()).compare(&Value::Text("a".to_owned())),
            Ordering::Greater
        );
        assert_eq!(Value::Null.compare(&Value::Int(0)), Ordering::Less);
    }

    #[test]
    fn row_typed_getters_coerce() {
        let mut row = Row::new();
        row.insert("count", Value::Text("42".to_owned()));
        row.insert("pct", Value::Float(12.5));
        assert_eq!(row.get_u64("count"), 42);
        assert_eq!(row.get_f64("pct"), 12.5);
        assert_eq!(row.get_u64("missing"), 0);
    }

    #[test]
    fn time_filter_conversion() {
        let filter = TimeFilter {
            start: "2024-03-15 00:00:00".to_owned(),
            end: "2024-03-15 23:59:59".to_owned(),
        };
        let predicate = Predicate::from_time_filter(&filter).unwrap();
        assert!(matches!(predicate, Predicate::TimestampBetween(_, _)));
    }

    #[test]
    fn time_filter_rejects_garbage() {
        let filter = TimeFilter {
            start: "not-a-time".to_owned(),
            end: "2024-03-15 23:59:59".to_owned(),
        };
        assert!(matches!(
            Predicate::from_time_filter(&filter),
            Err(StoreError::TimeFilter { .. })
        ));
    }

    #[test]
    fn builder_composes_spec() {
        let spec = QuerySpec::grouped(Column::RemoteHost)
            .filter(Predicate::NotNullOrEmpty(Column::RemoteHost))
            .aggregate(AggregateFn::Count, "request_count")
            .aggregate(
                AggregateFn::CountIf(Predicate::GreaterEq(Column::StatusCode, Value::Int(400))),
                "error_count",
            )
            .percent_of_total("percentage", vec![])
            .order_desc("request_count")
            .limit(20);

        assert_eq!(spec.group_by, vec![Column::RemoteHost]);
        assert_eq!(spec.predicates.len(), 1);
        assert_eq!(spec.aggregates.len(), 2);
        assert_eq!(spec.limit, Some(20));
        assert!(spec.percent_of_total.is_some());
        assert_eq!(
            spec.order_by,
            Some(OrderBy {
                key: "request_count".to_owned(),
                dir: SortDir::Desc,
            })
        );
    }

    #[test]
    fn filter_opt_skips_none() {
        let spec = QuerySpec::global().filter_opt(None);
        assert!(spec.predicates.is_empty());
    }
}
