//! 엔진 에러 타입
//!
//! [`EngineError`]는 형식 컴파일, 수집, 쿼리 경계에서 발생하는 에러를
//! 표현합니다. `From<EngineError> for LogwardenError` 변환이 구현되어
//! 있어 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use logwarden_core::error::{ConfigError, LogwardenError, ParseError, StoreError};

/// 탐지 엔진 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// 형식 스펙 컴파일 실패 (지시자 문자열도, 정규식도 아님)
    ///
    /// 파서 구성 시점에 발생하는 설정 에러이며, 이 시점에는 아직
    /// 레코드가 하나도 처리되지 않았습니다.
    #[error("invalid format spec '{spec}': {reason}")]
    Format {
        /// 컴파일에 실패한 형식 스펙
        spec: String,
        /// 실패 사유
        reason: String,
    },

    /// 전체 수집 실패 — 모든 입력에서 파싱된 레코드가 0건
    #[error("no usable data: zero records parsed across all inputs")]
    NoUsableData,

    /// 쿼리 스토어 에러
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 정규식 컴파일 에러
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl From<EngineError> for LogwardenError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Format { spec, reason } => {
                LogwardenError::Config(ConfigError::InvalidValue {
                    field: "parser.format".to_owned(),
                    reason: format!("'{spec}': {reason}"),
                })
            }
            EngineError::NoUsableData => LogwardenError::Parse(ParseError::NoUsableData),
            EngineError::Store(e) => LogwardenError::Store(e),
            EngineError::Io(e) => LogwardenError::Io(e),
            EngineError::Regex(e) => LogwardenError::Config(ConfigError::InvalidValue {
                field: "parser.format".to_owned(),
                reason: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_error_display_names_spec() {
        let err = EngineError::Format {
            spec: "%q".to_owned(),
            reason: "unsupported directive".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("%q"));
        assert!(msg.contains("unsupported directive"));
    }

    #[test]
    fn converts_to_logwarden_error() {
        let err = EngineError::NoUsableData;
        let top: LogwardenError = err.into();
        assert!(matches!(top, LogwardenError::Parse(_)));
    }

    #[test]
    fn format_error_becomes_config_error() {
        let err = EngineError::Format {
            spec: "(((".to_owned(),
            reason: "bad regex".to_owned(),
        };
        let top: LogwardenError = err.into();
        assert!(matches!(top, LogwardenError::Config(_)));
    }
}
