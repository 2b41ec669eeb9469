//! 커스텀 정규식 컴파일러
//!
//! `LogRecord` 필드명과 일치하는 명명 캡처 그룹을 가진 정규식을
//! 라인 파서로 컴파일합니다. 지시자 문자열 컴파일이 실패했을 때의
//! 폴백 전략이기도 합니다.
//!
//! # 인식하는 그룹명
//! `remote_host`, `remote_logname`, `remote_user`, `timestamp`,
//! `request_line`, `status_code`, `response_size`, `referer`,
//! `user_agent`, `request_time`

use regex::Regex;

use logwarden_core::error::{LogwardenError, ParseError};
use logwarden_core::pipeline::{FormatCompiler, LineParser};
use logwarden_core::types::LogRecord;

use super::fields::record_from_captures;
use crate::error::EngineError;

/// 정규식 컴파일러 전략
#[derive(Debug, Default)]
pub struct RegexCompiler;

impl RegexCompiler {
    /// 새 컴파일러를 생성합니다.
    pub fn new() -> Self {
        Self
    }

    /// 정규식 패턴을 파서로 컴파일합니다.
    pub fn compile_pattern(&self, pattern: &str) -> Result<RegexLineParser, EngineError> {
        let regex = Regex::new(pattern).map_err(|e| EngineError::Format {
            spec: pattern.to_owned(),
            reason: format!("invalid regex pattern: {e}"),
        })?;
        Ok(RegexLineParser {
            pattern: pattern.to_owned(),
            regex,
        })
    }
}

impl FormatCompiler for RegexCompiler {
    fn name(&self) -> &str {
        "regex"
    }

    fn compile(&self, spec: &str) -> Result<Box<dyn LineParser>, LogwardenError> {
        let parser = self.compile_pattern(spec)?;
        Ok(Box::new(parser))
    }
}

/// 컴파일된 정규식 라인 파서
#[derive(Debug)]
pub struct RegexLineParser {
    pattern: String,
    regex: Regex,
}

impl RegexLineParser {
    /// 원본 패턴 문자열
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

impl LineParser for RegexLineParser {
    fn format_name(&self) -> &str {
        "regex"
    }

    fn parse_line(&self, line: &str) -> Result<LogRecord, ParseError> {
        let caps = self
            .regex
            .captures(line.trim())
            .ok_or(ParseError::Unmatched)?;
        record_from_captures(&caps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 사전 정의 `combined` 형식과 동등한 정규식
    const COMBINED_REGEX: &str = r#"(?P<remote_host>\S+) (?P<remote_logname>\S+) (?P<remote_user>\S+) \[(?P<timestamp>[^\]]+)\] "(?P<request_line>[^"]*)" (?P<status_code>\d+) (?P<response_size>\S+) "(?P<referer>[^"]*)" "(?P<user_agent>[^"]*)""#;

    #[test]
    fn parses_combined_with_custom_regex() {
        let parser = RegexCompiler::new().compile_pattern(COMBINED_REGEX).unwrap();
        let record = parser
            .parse_line(
                r#"198.51.100.4 - - [25/Dec/1995:10:00:00 +0000] "POST /login HTTP/1.1" 401 128 "-" "curl/8.0""#,
            )
            .unwrap();
        assert_eq!(record.remote_host, "198.51.100.4");
        assert_eq!(record.status_code, 401);
        assert_eq!(record.referer, None);
        assert_eq!(record.user_agent.as_deref(), Some("curl/8.0"));
    }

    #[test]
    fn minimal_regex_with_partial_groups() {
        // timestamp만 있으면 나머지는 기본값으로 채워집니다
        let parser = RegexCompiler::new()
            .compile_pattern(r"\[(?P<timestamp>[^\]]+)\]")
            .unwrap();
        let record = parser.parse_line("[25/Dec/1995:10:00:00 +0000]").unwrap();
        assert_eq!(record.remote_host, "");
        assert_eq!(record.status_code, 0);
    }

    #[test]
    fn missing_timestamp_group_fails_per_record() {
        let parser = RegexCompiler::new()
            .compile_pattern(r"(?P<remote_host>\S+)")
            .unwrap();
        assert!(matches!(
            parser.parse_line("10.0.0.1"),
            Err(ParseError::MissingField { field: "timestamp" })
        ));
    }

    #[test]
    fn invalid_regex_rejected_at_construction() {
        let err = RegexCompiler::new().compile_pattern("([unclosed").unwrap_err();
        assert!(matches!(err, EngineError::Format { .. }));
    }

    #[test]
    fn unmatched_line_reports_failure() {
        let parser = RegexCompiler::new().compile_pattern(COMBINED_REGEX).unwrap();
        assert!(matches!(
            parser.parse_line("completely different"),
            Err(ParseError::Unmatched)
        ));
    }

    #[test]
    fn request_time_group_is_seconds() {
        let parser = RegexCompiler::new()
            .compile_pattern(r"\[(?P<timestamp>[^\]]+)\] (?P<request_time>\d+)")
            .unwrap();
        let record = parser
            .parse_line("[25/Dec/1995:10:00:00 +0000] 3")
            .unwrap();
        assert_eq!(record.request_time, Some(3.0));
    }
}
