//! 설정 관리 — logwarden.toml 파싱 및 런타임 설정
//!
//! [`LogwardenConfig`]는 모든 모듈의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`LOGWARDEN_ABUSE_MIN_ATTEMPTS=80` 형식)
//! 3. 설정 파일 (`logwarden.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), logwarden_core::error::LogwardenError> {
//! use logwarden_core::config::LogwardenConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = LogwardenConfig::load("logwarden.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = LogwardenConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, LogwardenError};

/// Logwarden 통합 설정
///
/// `logwarden.toml` 파일의 최상위 구조를 나타냅니다.
/// 각 모듈은 자기 섹션만 읽어 사용합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogwardenConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 파서 설정
    #[serde(default)]
    pub parser: ParserConfig,
    /// 남용 탐지 임계값
    #[serde(default)]
    pub abuse: AbuseConfig,
}

/// 일반 설정 (로깅 등)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 출력 형식 ("json" 또는 "pretty")
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// 파서 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// 로그 형식: 사전 정의 이름(combined 등), Apache LogFormat 지시자
    /// 문자열, 또는 명명 캡처 그룹을 가진 커스텀 정규식
    pub format: String,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            format: "combined".to_owned(),
        }
    }
}

/// 남용 탐지 규칙 임계값
///
/// 기본값은 규칙 설계 당시의 값이며, 배포 환경 트래픽 규모에 맞게
/// 조정할 수 있습니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AbuseConfig {
    /// 무차별 대입: 그룹당 최소 요청 수
    pub min_attempts: u64,
    /// 무차별 대입: 최소 에러 응답 비율 (0, 1]
    pub error_threshold: f64,
    /// DDoS: IP당 최소 요청 수
    pub request_threshold: u64,
    /// DDoS: 최대 고유 경로 수
    pub unique_path_threshold: u64,
    /// 스캐닝: 최소 404 요청 수
    pub min_404_requests: u64,
    /// 스캐닝: 최소 404 경로 다양성 비율 (0, 1]
    pub path_diversity_threshold: f64,
}

impl Default for AbuseConfig {
    fn default() -> Self {
        Self {
            min_attempts: 50,
            error_threshold: 0.8,
            request_threshold: 1000,
            unique_path_threshold: 5,
            min_404_requests: 20,
            path_diversity_threshold: 0.8,
        }
    }
}

impl LogwardenConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, LogwardenError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, LogwardenError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LogwardenError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                LogwardenError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, LogwardenError> {
        toml::from_str(toml_str).map_err(|e| {
            LogwardenError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 네이밍 규칙: `LOGWARDEN_{SECTION}_{FIELD}`
    /// 예: `LOGWARDEN_PARSER_FORMAT=common`
    pub fn apply_env_overrides(&mut self) {
        override_string(&mut self.general.log_level, "LOGWARDEN_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "LOGWARDEN_GENERAL_LOG_FORMAT");

        override_string(&mut self.parser.format, "LOGWARDEN_PARSER_FORMAT");

        override_u64(&mut self.abuse.min_attempts, "LOGWARDEN_ABUSE_MIN_ATTEMPTS");
        override_f64(
            &mut self.abuse.error_threshold,
            "LOGWARDEN_ABUSE_ERROR_THRESHOLD",
        );
        override_u64(
            &mut self.abuse.request_threshold,
            "LOGWARDEN_ABUSE_REQUEST_THRESHOLD",
        );
        override_u64(
            &mut self.abuse.unique_path_threshold,
            "LOGWARDEN_ABUSE_UNIQUE_PATH_THRESHOLD",
        );
        override_u64(
            &mut self.abuse.min_404_requests,
            "LOGWARDEN_ABUSE_MIN_404_REQUESTS",
        );
        override_f64(
            &mut self.abuse.path_diversity_threshold,
            "LOGWARDEN_ABUSE_PATH_DIVERSITY_THRESHOLD",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), LogwardenError> {
        if !matches!(self.general.log_format.as_str(), "json" | "pretty") {
            return Err(invalid(
                "general.log_format",
                "expected 'json' or 'pretty'",
            ));
        }

        if self.parser.format.trim().is_empty() {
            return Err(invalid("parser.format", "must not be empty"));
        }

        if self.abuse.min_attempts == 0 {
            return Err(invalid("abuse.min_attempts", "must be greater than 0"));
        }
        if !(0.0..=1.0).contains(&self.abuse.error_threshold) || self.abuse.error_threshold == 0.0 {
            return Err(invalid("abuse.error_threshold", "must be within (0, 1]"));
        }
        if self.abuse.request_threshold == 0 {
            return Err(invalid("abuse.request_threshold", "must be greater than 0"));
        }
        if self.abuse.min_404_requests == 0 {
            return Err(invalid("abuse.min_404_requests", "must be greater than 0"));
        }
        if !(0.0..=1.0).contains(&self.abuse.path_diversity_threshold)
            || self.abuse.path_diversity_threshold == 0.0
        {
            return Err(invalid(
                "abuse.path_diversity_threshold",
                "must be within (0, 1]",
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> LogwardenError {
    LogwardenError::Config(ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.to_owned(),
    })
}

fn override_string(target: &mut String, key: &str) {
    if let Ok(value) = std::env::var(key) {
        *target = value;
    }
}

fn override_u64(target: &mut u64, key: &str) {
    if let Ok(value) = std::env::var(key) {
        match value.parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(key, value, "ignoring unparsable env override"),
        }
    }
}

fn override_f64(target: &mut f64, key: &str) {
    if let Ok(value) = std::env::var(key) {
        match value.parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(key, value, "ignoring unparsable env override"),
        }
    }
}

/// 설정 빌더
///
/// 테스트와 임베딩 환경에서 파일 없이 설정을 조립할 때 사용합니다.
#[derive(Default)]
pub struct LogwardenConfigBuilder {
    config: LogwardenConfig,
}

impl LogwardenConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 로그 형식 스펙을 설정합니다.
    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.config.parser.format = format.into();
        self
    }

    /// 무차별 대입 최소 요청 수를 설정합니다.
    pub fn min_attempts(mut self, value: u64) -> Self {
        self.config.abuse.min_attempts = value;
        self
    }

    /// 무차별 대입 에러 비율 임계값을 설정합니다.
    pub fn error_threshold(mut self, value: f64) -> Self {
        self.config.abuse.error_threshold = value;
        self
    }

    /// DDoS 요청 수 임계값을 설정합니다.
    pub fn request_threshold(mut self, value: u64) -> Self {
        self.config.abuse.request_threshold = value;
        self
    }

    /// DDoS 고유 경로 수 임계값을 설정합니다.
    pub fn unique_path_threshold(mut self, value: u64) -> Self {
        self.config.abuse.unique_path_threshold = value;
        self
    }

    /// 스캐닝 최소 404 요청 수를 설정합니다.
    pub fn min_404_requests(mut self, value: u64) -> Self {
        self.config.abuse.min_404_requests = value;
        self
    }

    /// 스캐닝 경로 다양성 임계값을 설정합니다.
    pub fn path_diversity_threshold(mut self, value: f64) -> Self {
        self.config.abuse.path_diversity_threshold = value;
        self
    }

    /// 설정을 검증하고 `LogwardenConfig`를 생성합니다.
    pub fn build(self) -> Result<LogwardenConfig, LogwardenError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
