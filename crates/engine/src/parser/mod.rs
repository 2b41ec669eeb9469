//! 로그 형식 해석 -- 형식 스펙을 라인 파서로 컴파일합니다.
//!
//! 형식 해석 우선순위:
//! 1. 사전 정의 형식 이름 (`common`, `combined`, `combined_with_time`,
//!    `vhost_combined`) — 대응하는 지시자 템플릿으로 컴파일
//! 2. 지시자 토큰(`%h`, `%t` 등)을 포함하는 문자열 — 지시자 컴파일러로
//!    컴파일하고, 실패하면 정규식으로 폴백
//! 3. 그 외 — 명명 캡처 그룹을 가진 정규식으로 직접 컴파일
//!
//! 두 전략 모두 core의 [`FormatCompiler`] trait 뒤에 있으므로 호출
//! 지점을 건드리지 않고 새 형식 전략을 추가할 수 있습니다.
//!
//! # 사용 예시
//! ```ignore
//! use logwarden_engine::parser::FormatResolver;
//!
//! let parser = FormatResolver::build("combined")?;
//! let record = parser.parse_line(raw_line)?;
//! ```

pub mod directive;
pub mod fields;
pub mod regexfmt;
pub mod timestamp;

pub use directive::{DirectiveCompiler, DirectiveParser, looks_like_directive_string};
pub use regexfmt::{RegexCompiler, RegexLineParser};
pub use timestamp::parse_timestamp;

use logwarden_core::pipeline::LineParser;

use crate::error::EngineError;

/// 사전 정의 형식 이름과 지시자 템플릿
pub const NAMED_FORMATS: [(&str, &str); 4] = [
    ("common", r#"%h %l %u %t "%r" %>s %O"#),
    (
        "combined",
        r#"%h %l %u %t "%r" %>s %O "%{Referer}i" "%{User-Agent}i""#,
    ),
    (
        "combined_with_time",
        r#"%h %l %u %t "%r" %>s %O "%{Referer}i" "%{User-Agent}i" %D"#,
    ),
    (
        "vhost_combined",
        r#"%v:%p %h %l %u %t "%r" %>s %O "%{Referer}i" "%{User-Agent}i""#,
    ),
];

/// 형식 스펙 해석기
///
/// 위의 해석 우선순위에 따라 적절한 컴파일 전략을 선택합니다.
pub struct FormatResolver;

impl FormatResolver {
    /// 형식 스펙에서 파서를 구성합니다.
    ///
    /// 지시자 문자열로도, 정규식으로도 컴파일되지 않으면
    /// [`EngineError::Format`]을 반환합니다 (설정 에러).
    pub fn build(spec: &str) -> Result<Box<dyn LineParser>, EngineError> {
        if let Some(template) = named_format_template(spec) {
            let parser = DirectiveCompiler::new().compile_template(template)?;
            return Ok(Box::new(parser));
        }

        if looks_like_directive_string(spec) {
            match DirectiveCompiler::new().compile_template(spec) {
                Ok(parser) => return Ok(Box::new(parser)),
                Err(directive_err) => {
                    tracing::warn!(
                        spec,
                        error = %directive_err,
                        "directive compile failed, falling back to regex"
                    );
                    return match RegexCompiler::new().compile_pattern(spec) {
                        Ok(parser) => Ok(Box::new(parser)),
                        Err(_) => Err(EngineError::Format {
                            spec: spec.to_owned(),
                            reason: "not a valid directive string nor a valid regex".to_owned(),
                        }),
                    };
                }
            }
        }

        let parser = RegexCompiler::new().compile_pattern(spec)?;
        Ok(Box::new(parser))
    }
}

/// 사전 정의 형식 이름이면 지시자 템플릿을 반환합니다.
pub fn named_format_template(name: &str) -> Option<&'static str> {
    NAMED_FORMATS
        .iter()
        .find(|(known, _)| *known == name)
        .map(|(_, template)| *template)
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMBINED_LINE: &str = r#"203.0.113.7 - - [10/Oct/2000:13:55:36 -0700] "GET /index.html HTTP/1.0" 200 2326 "-" "Mozilla/5.0""#;
    const COMMON_LINE: &str =
        r#"203.0.113.7 - - [10/Oct/2000:13:55:36 -0700] "GET /index.html HTTP/1.0" 200 2326"#;

    #[test]
    fn resolves_all_named_formats() {
        for (name, _) in NAMED_FORMATS {
            assert!(FormatResolver::build(name).is_ok(), "format {name}");
        }
    }

    #[test]
    fn named_combined_parses_combined_line() {
        let parser = FormatResolver::build("combined").unwrap();
        let record = parser.parse_line(COMBINED_LINE).unwrap();
        assert_eq!(record.remote_host, "203.0.113.7");
        assert_eq!(record.status_code, 200);
    }

    #[test]
    fn named_common_parses_common_line() {
        let parser = FormatResolver::build("common").unwrap();
        let record = parser.parse_line(COMMON_LINE).unwrap();
        assert_eq!(record.response_size, Some(2326));
    }

    #[test]
    fn custom_directive_string_resolves_to_directive_parser() {
        let parser = FormatResolver::build(r#"%h %l %u %t "%r" %>s %O"#).unwrap();
        assert_eq!(parser.format_name(), "directive");
    }

    #[test]
    fn custom_regex_resolves_to_regex_parser() {
        let parser =
            FormatResolver::build(r"(?P<remote_host>\S+) \[(?P<timestamp>[^\]]+)\]").unwrap();
        assert_eq!(parser.format_name(), "regex");
    }

    #[test]
    fn broken_directive_falls_back_to_regex() {
        // '%q'는 지시자로 컴파일되지 않지만 '%h'를 포함하므로 지시자처럼
        // 보입니다. 유효한 정규식이기도 하므로 폴백이 성공합니다.
        let parser = FormatResolver::build("%h %q").unwrap();
        assert_eq!(parser.format_name(), "regex");
    }

    #[test]
    fn invalid_both_ways_is_config_error() {
        // '%t ('는 지시자 컴파일도, 정규식 컴파일도 실패합니다
        let err = match FormatResolver::build("%t %q (") {
            Err(e) => e,
            Ok(_) => panic!("expected Format error"),
        };
        assert!(matches!(err, EngineError::Format { .. }));
    }

    #[test]
    fn invalid_regex_is_config_error() {
        let err = match FormatResolver::build("([unclosed") {
            Err(e) => e,
            Ok(_) => panic!("expected Format error"),
        };
        assert!(matches!(err, EngineError::Format { .. }));
    }

    #[test]
    fn required_fields_always_present_on_success() {
        let parser = FormatResolver::build("combined").unwrap();
        let record = parser.parse_line(COMBINED_LINE).unwrap();
        assert!(!record.remote_host.is_empty());
        assert_eq!(record.status_code, 200);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn parse_arbitrary_line_never_panics(line in ".{0,500}") {
                let parser = FormatResolver::build("combined").unwrap();
                let _ = parser.parse_line(&line);
            }

            #[test]
            fn nonmatching_nonblank_lines_report_failure(word in "[a-z]{1,40}") {
                let parser = FormatResolver::build("combined").unwrap();
                prop_assert!(parser.parse_line(&word).is_err());
            }

            #[test]
            fn build_arbitrary_spec_never_panics(spec in ".{0,80}") {
                let _ = FormatResolver::build(&spec);
            }

            #[test]
            fn valid_status_round_trips(status in 100u16..600) {
                let parser = FormatResolver::build("common").unwrap();
                let line = format!(
                    r#"10.0.0.1 - - [25/Dec/1995:10:00:00 +0000] "GET / HTTP/1.0" {status} 512"#
                );
                let record = parser.parse_line(&line).unwrap();
                prop_assert_eq!(record.status_code, status);
            }
        }
    }
}
