//! 도메인 타입 — 시스템 전역에서 사용되는 공통 타입
//!
//! 파싱된 로그 레코드와 탐지 결과(finding) 타입을 정의합니다.
//! 모든 finding은 serde로 직렬화 가능하며, 심각도/유형 어휘는
//! 소문자 snake_case 문자열로 왕복(round-trip)됩니다.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, Timelike};
use serde::{Deserialize, Serialize};

/// 파싱된 액세스 로그 레코드
///
/// 한 줄의 로그가 성공적으로 파싱되면 하나의 레코드가 됩니다.
/// `remote_host`, `timestamp`, `status_code`는 필수이며, 이 필드의 파싱에
/// 실패한 라인은 수집 단계에서 드롭되어 레코드 셋에 들어오지 않습니다.
///
/// 파생 필드(`method`, `path`, `protocol`, `hour`, `date`,
/// `file_extension`)는 수집 시 [`LogRecord::derive_fields`]로 채워집니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// 요청 출처 호스트 (IP 또는 호스트명)
    pub remote_host: String,
    /// identd 로그명 (`-`는 없음으로 처리)
    pub remote_logname: Option<String>,
    /// 인증된 사용자명
    pub remote_user: Option<String>,
    /// 요청 시각
    pub timestamp: DateTime<FixedOffset>,
    /// 요청 라인 원문 (예: `GET /index.html HTTP/1.1`)
    pub request_line: String,
    /// HTTP 상태 코드 (소스에 없으면 0)
    pub status_code: u16,
    /// 응답 크기 (바이트, `-`는 없음으로 처리)
    pub response_size: Option<i64>,
    /// Referer 헤더
    pub referer: Option<String>,
    /// User-Agent 헤더
    pub user_agent: Option<String>,
    /// 요청 처리 시간 (초)
    pub request_time: Option<f64>,

    // --- 파생 필드 (수집 시 계산) ---
    /// HTTP 메서드 (request_line의 첫 토큰)
    #[serde(default)]
    pub method: String,
    /// 요청 경로 (request_line의 둘째 토큰)
    #[serde(default)]
    pub path: String,
    /// 프로토콜 (request_line의 셋째 토큰)
    #[serde(default)]
    pub protocol: String,
    /// 요청 시각의 시(hour, 0-23)
    #[serde(default)]
    pub hour: u32,
    /// 요청 날짜
    pub date: NaiveDate,
    /// 경로의 파일 확장자 (없으면 `no_extension`)
    #[serde(default)]
    pub file_extension: String,
}

impl LogRecord {
    /// 10개 원본 필드로 레코드를 생성합니다.
    ///
    /// 파생 필드 중 `hour`/`date`는 즉시 계산되고, 나머지는
    /// [`derive_fields`](Self::derive_fields) 호출 전까지 기본값입니다.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        remote_host: String,
        remote_logname: Option<String>,
        remote_user: Option<String>,
        timestamp: DateTime<FixedOffset>,
        request_line: String,
        status_code: u16,
        response_size: Option<i64>,
        referer: Option<String>,
        user_agent: Option<String>,
        request_time: Option<f64>,
    ) -> Self {
        Self {
            remote_host,
            remote_logname,
            remote_user,
            timestamp,
            request_line,
            status_code,
            response_size,
            referer,
            user_agent,
            request_time,
            method: String::new(),
            path: String::new(),
            protocol: String::new(),
            hour: timestamp.hour(),
            date: timestamp.date_naive(),
            file_extension: "no_extension".to_owned(),
        }
    }

    /// 파생 필드를 계산합니다.
    ///
    /// - `method`/`path`/`protocol`: request_line을 공백 기준 최대 3토큰으로 분할
    /// - `hour`/`date`: timestamp에서 추출
    /// - `file_extension`: path 끝의 `.<영숫자>` 접미사, 없으면 `no_extension`
    pub fn derive_fields(&mut self) {
        let mut parts = self.request_line.splitn(3, char::is_whitespace);
        self.method = parts.next().unwrap_or_default().to_owned();
        self.path = parts.next().unwrap_or_default().to_owned();
        self.protocol = parts.next().unwrap_or_default().to_owned();

        self.hour = self.timestamp.hour();
        self.date = self.timestamp.date_naive();

        self.file_extension = extract_extension(&self.path);
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] \"{}\" {}",
            self.remote_host,
            self.timestamp.format("%d/%b/%Y:%H:%M:%S %z"),
            self.request_line,
            self.status_code,
        )
    }
}

/// path 끝의 파일 확장자를 추출합니다. 없으면 `no_extension`.
fn extract_extension(path: &str) -> String {
    let Some(dot) = path.rfind('.') else {
        return "no_extension".to_owned();
    };
    let ext = &path[dot + 1..];
    if !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        ext.to_owned()
    } else {
        "no_extension".to_owned()
    }
}

/// 심각도 레벨
///
/// `Ord` 구현으로 심각도 비교가 가능합니다 (`Low < Medium < High < Critical`).
/// 직렬화 어휘는 소문자(`"low"` 등)로 고정됩니다.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// 낮은 심각도
    #[default]
    Low,
    /// 중간 심각도
    Medium,
    /// 높은 심각도
    High,
    /// 치명적 — 즉시 대응 필요
    Critical,
}

impl Severity {
    /// 정렬용 순위 (critical=4, high=3, medium=2, low=1)
    pub fn rank(self) -> u8 {
        match self {
            Self::Critical => 4,
            Self::High => 3,
            Self::Medium => 2,
            Self::Low => 1,
        }
    }

    /// 문자열에서 심각도를 파싱합니다. 대소문자를 구분하지 않습니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" | "med" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" | "crit" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// 남용 패턴 유형
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    /// 무차별 대입 (brute force)
    BruteForce,
    /// 분산 서비스 거부
    Ddos,
    /// 디렉토리/취약점 스캐닝
    Scanning,
    /// 자동화 봇 행위
    BotBehavior,
}

impl fmt::Display for PatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BruteForce => write!(f, "brute_force"),
            Self::Ddos => write!(f, "ddos"),
            Self::Scanning => write!(f, "scanning"),
            Self::BotBehavior => write!(f, "bot_behavior"),
        }
    }
}

/// 이상 알림 유형
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    /// 급증 (트래픽/빈도)
    Spike,
    /// 통계적 아웃라이어
    Outlier,
    /// 패턴 이탈
    PatternBreak,
    /// 임계값 초과
    ThresholdBreach,
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spike => write!(f, "spike"),
            Self::Outlier => write!(f, "outlier"),
            Self::PatternBreak => write!(f, "pattern_break"),
            Self::ThresholdBreach => write!(f, "threshold_breach"),
        }
    }
}

/// 규칙별 진단 값 — 문자열 키에 매핑되는 닫힌 유니온
///
/// finding의 `details` 맵과 `AnomalyAlert::value`에 사용됩니다.
/// JSON 직렬화 시 태그 없이 원시 값으로 표현됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DetailValue {
    /// 불리언
    Bool(bool),
    /// 정수
    Int(i64),
    /// 부동소수
    Float(f64),
    /// 문자열
    Text(String),
}

impl DetailValue {
    /// 문자열 표현을 반환합니다.
    pub fn to_display(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(x) => x.to_string(),
            Self::Text(s) => s.clone(),
        }
    }
}

impl From<&str> for DetailValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for DetailValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for DetailValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for DetailValue {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<bool> for DetailValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// 탐지된 남용 패턴 finding
///
/// 단일 탐지 패스에서 매칭 그룹별로 생성되며, 생성 후 불변입니다.
/// 영속화되지 않으며 요청 시마다 재계산됩니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbusePattern {
    /// 패턴 유형
    pub pattern_type: PatternType,
    /// 심각도
    pub severity: Severity,
    /// 사람이 읽을 수 있는 설명
    pub description: String,
    /// 관련 IP 목록 (귀속이 모호하면 빈 목록)
    pub affected_ips: Vec<String>,
    /// 요청 수
    pub request_count: u64,
    /// 휴리스틱 확신도 [0, 1]
    pub confidence: f64,
    /// 규칙별 진단 값
    pub details: BTreeMap<String, DetailValue>,
}

/// 탐지된 이상 알림 finding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyAlert {
    /// 알림 유형
    pub alert_type: AlertType,
    /// 심각도
    pub severity: Severity,
    /// 분석 대상 컬럼명
    pub column: String,
    /// 사람이 읽을 수 있는 설명
    pub description: String,
    /// 알림을 유발한 값 (컬럼 타입에 따름)
    pub value: DetailValue,
    /// 빈도 (요청 수)
    pub frequency: u64,
    /// 전체 대비 비율 (0-100)
    pub percentage: f64,
    /// 기준선 (시간대 스파이크 전용)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline: Option<f64>,
    /// 편차 (시간대 스파이크 전용)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deviation: Option<f64>,
    /// 분석 시간 윈도우
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_window: Option<String>,
    /// 권고 문자열 목록 (비어있을 수 있음)
    #[serde(default)]
    pub recommendations: Vec<String>,
}

/// 컬럼의 추론된 의미 타입
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// IPv4 점-사분 표기
    IpAddress,
    /// URL 또는 경로
    Url,
    /// 브라우저 User-Agent
    UserAgent,
    /// 숫자
    Numeric,
    /// 일반 문자열
    String,
    /// 판별 불가
    #[default]
    Unknown,
}

/// 컬럼의 분석 분류 (의미 타입과 별개)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisType {
    /// 범주형 (기본값)
    #[default]
    Categorical,
    /// 수치형
    Numerical,
    /// 시간형
    Temporal,
    /// 고유값이 많은 텍스트
    Text,
}

/// 컬럼 내 최빈값 하나 (값/빈도/비율)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueCount {
    /// 값의 문자열 표현
    pub value: String,
    /// 출현 빈도
    pub frequency: u64,
    /// 전체 대비 비율 (0-100)
    pub percentage: f64,
}

/// 컬럼별 기술(descriptive) 메타데이터
///
/// 레코드 셋이 바뀌면 전체를 재계산합니다. 증분 갱신은 없습니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMetadata {
    /// 컬럼명
    pub name: String,
    /// 추론된 의미 타입
    pub data_type: DataType,
    /// 고유값 수
    pub cardinality: u64,
    /// null/빈 문자열 수
    pub null_count: u64,
    /// 전체 레코드 수
    pub total_count: u64,
    /// 고유 샘플 값 (최대 10)
    pub sample_values: Vec<String>,
    /// 최솟값 (타입에 따라 선택적)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_value: Option<String>,
    /// 최댓값
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_value: Option<String>,
    /// 평균 문자열 길이
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_length: Option<f64>,
    /// 최빈값 (최대 10)
    pub most_common: Vec<ValueCount>,
    /// 관심도 점수 [0, 1]
    pub anomaly_score: f64,
    /// 분석 분류
    pub analysis_type: AnalysisType,
}

/// 선택적 시간 윈도우 (양 끝 포함)
///
/// `start`/`end`는 스토어의 범위 술어가 이해하는 형식의 타임스탬프
/// 문자열입니다 (`%Y-%m-%d %H:%M:%S`). 없으면 제한 없음을 뜻합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeFilter {
    /// 윈도우 시작 (포함)
    pub start: String,
    /// 윈도우 끝 (포함)
    pub end: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(h: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 3, 15, h, 30, 0)
            .unwrap()
    }

    fn sample_record() -> LogRecord {
        LogRecord::from_parts(
            "192.168.1.10".to_owned(),
            None,
            Some("alice".to_owned()),
            ts(14),
            "GET /static/app.js HTTP/1.1".to_owned(),
            200,
            Some(1234),
            None,
            Some("Mozilla/5.0".to_owned()),
            Some(0.032),
        )
    }

    #[test]
    fn derive_fields_splits_request_line() {
        let mut record = sample_record();
        record.derive_fields();
        assert_eq!(record.method, "GET");
        assert_eq!(record.path, "/static/app.js");
        assert_eq!(record.protocol, "HTTP/1.1");
    }

    #[test]
    fn derive_fields_extracts_hour_and_date() {
        let mut record = sample_record();
        record.derive_fields();
        assert_eq!(record.hour, 14);
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
    }

    #[test]
    fn derive_fields_extracts_extension() {
        let mut record = sample_record();
        record.derive_fields();
        assert_eq!(record.file_extension, "js");
    }

    #[test]
    fn derive_fields_no_extension_sentinel() {
        let mut record = sample_record();
        record.request_line = "GET /api/users HTTP/1.1".to_owned();
        record.derive_fields();
        assert_eq!(record.file_extension, "no_extension");
    }

    #[test]
    fn derive_fields_short_request_line() {
        let mut record = sample_record();
        record.request_line = "GET".to_owned();
        record.derive_fields();
        assert_eq!(record.method, "GET");
        assert_eq!(record.path, "");
        assert_eq!(record.protocol, "");
        assert_eq!(record.file_extension, "no_extension");
    }

    #[test]
    fn extension_rejects_trailing_dot() {
        assert_eq!(extract_extension("/path/file."), "no_extension");
        assert_eq!(extract_extension("/a.b/c"), "no_extension");
        assert_eq!(extract_extension("/x.tar.gz"), "gz");
    }

    #[test]
    fn severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn severity_rank_values() {
        assert_eq!(Severity::Critical.rank(), 4);
        assert_eq!(Severity::High.rank(), 3);
        assert_eq!(Severity::Medium.rank(), 2);
        assert_eq!(Severity::Low.rank(), 1);
    }

    #[test]
    fn severity_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Severity::High).unwrap(), "\"high\"");
        assert_eq!(
            serde_json::to_string(&Severity::Critical).unwrap(),
            "\"critical\""
        );
    }

    #[test]
    fn severity_from_str_loose() {
        assert_eq!(Severity::from_str_loose("HIGH"), Some(Severity::High));
        assert_eq!(Severity::from_str_loose("crit"), Some(Severity::Critical));
        assert_eq!(Severity::from_str_loose("unknown"), None);
    }

    #[test]
    fn pattern_type_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&PatternType::BruteForce).unwrap(),
            "\"brute_force\""
        );
        assert_eq!(
            serde_json::to_string(&PatternType::BotBehavior).unwrap(),
            "\"bot_behavior\""
        );
    }

    #[test]
    fn alert_type_roundtrip() {
        for alert_type in [
            AlertType::Spike,
            AlertType::Outlier,
            AlertType::PatternBreak,
            AlertType::ThresholdBreach,
        ] {
            let json = serde_json::to_string(&alert_type).unwrap();
            let back: AlertType = serde_json::from_str(&json).unwrap();
            assert_eq!(alert_type, back);
        }
    }

    #[test]
    fn detail_value_untagged_serialization() {
        assert_eq!(
            serde_json::to_string(&DetailValue::Int(42)).unwrap(),
            "42"
        );
        assert_eq!(
            serde_json::to_string(&DetailValue::Text("x".to_owned())).unwrap(),
            "\"x\""
        );
        assert_eq!(
            serde_json::to_string(&DetailValue::Bool(true)).unwrap(),
            "true"
        );
    }

    #[test]
    fn abuse_pattern_roundtrip() {
        let pattern = AbusePattern {
            pattern_type: PatternType::Ddos,
            severity: Severity::Critical,
            description: "High volume".to_owned(),
            affected_ips: vec!["10.0.0.1".to_owned()],
            request_count: 6000,
            confidence: 0.95,
            details: BTreeMap::from([
                ("unique_paths".to_owned(), DetailValue::Int(3)),
                ("path_diversity".to_owned(), DetailValue::Float(0.0005)),
            ]),
        };
        let json = serde_json::to_string(&pattern).unwrap();
        let back: AbusePattern = serde_json::from_str(&json).unwrap();
        assert_eq!(back.pattern_type, PatternType::Ddos);
        assert_eq!(back.severity, Severity::Critical);
        assert_eq!(back.request_count, 6000);
        assert_eq!(back.details.len(), 2);
    }

    #[test]
    fn anomaly_alert_roundtrip() {
        let alert = AnomalyAlert {
            alert_type: AlertType::ThresholdBreach,
            severity: Severity::High,
            column: "status_code".to_owned(),
            description: "Status code 404 appears in 25.0% of requests".to_owned(),
            value: DetailValue::Int(404),
            frequency: 2500,
            percentage: 25.0,
            baseline: None,
            deviation: None,
            time_window: None,
            recommendations: vec!["High 404 rate suggests scanning activity".to_owned()],
        };
        let json = serde_json::to_string(&alert).unwrap();
        let back: AnomalyAlert = serde_json::from_str(&json).unwrap();
        assert_eq!(back.alert_type, AlertType::ThresholdBreach);
        assert_eq!(back.value, DetailValue::Int(404));
        assert_eq!(back.recommendations.len(), 1);
    }

    #[test]
    fn column_metadata_optional_fields_omitted() {
        let meta = ColumnMetadata {
            name: "path".to_owned(),
            data_type: DataType::Url,
            cardinality: 120,
            null_count: 0,
            total_count: 500,
            sample_values: vec!["/index.html".to_owned()],
            min_value: None,
            max_value: None,
            avg_length: None,
            most_common: vec![],
            anomaly_score: 0.3,
            analysis_type: AnalysisType::Text,
        };
        let json = serde_json::to_string(&meta).unwrap();
        assert!(!json.contains("min_value"));
        assert!(json.contains("\"data_type\":\"url\""));
    }

    #[test]
    fn record_display_contains_host_and_status() {
        let record = sample_record();
        let text = record.to_string();
        assert!(text.contains("192.168.1.10"));
        assert!(text.contains("200"));
    }
}
