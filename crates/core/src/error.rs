//! 에러 타입 — 도메인별 에러 정의

/// Logwarden 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum LogwardenError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 로그 라인/형식 파싱 에러
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// 쿼리 스토어 에러
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 로그 라인 파싱 에러
///
/// 레코드 수준 파싱 실패는 수집 단계에서 복구되며(라인 드롭),
/// 호출자에게 패닉이나 미처리 에러로 전파되지 않습니다.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// 라인이 구성된 패턴과 매칭되지 않음
    #[error("line does not match the configured format")]
    Unmatched,

    /// 타임스탬프 파싱 실패
    #[error("invalid timestamp: '{value}'")]
    Timestamp { value: String },

    /// 필수 필드 누락
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    /// 전체 수집 실패 — 모든 입력에서 파싱된 레코드가 0건
    #[error("no usable data: zero records parsed across all inputs")]
    NoUsableData,
}

/// 쿼리 스토어 에러
///
/// 탐지 서브 규칙은 이 에러를 잡아 해당 규칙의 기여를 빈 결과로
/// 격하(degrade)시키고 전체 패스를 계속합니다.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// 쿼리 실행 실패
    #[error("query failed: {0}")]
    Query(String),

    /// 쿼리 명세가 유효하지 않음 (지원하지 않는 그룹 키 등)
    #[error("invalid query spec: {0}")]
    InvalidSpec(String),

    /// 시간 필터 문자열 파싱 실패
    #[error("invalid time filter: '{value}' (expected %Y-%m-%d %H:%M:%S)")]
    TimeFilter { value: String },
}
