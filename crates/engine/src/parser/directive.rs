//! Apache LogFormat 지시자 컴파일러
//!
//! `%h %l %u %t "%r" %>s %O` 같은 지시자 템플릿을 라인 파서로
//! 컴파일합니다. 각 지시자는 내부적으로 명명 캡처 그룹으로 변환되며,
//! 컴파일된 패턴은 구성 시 한 번만 만들어져 캐싱됩니다.
//!
//! # 지원 지시자
//!
//! | 지시자 | 필드 |
//! |---|---|
//! | `%h` | remote_host |
//! | `%l` | remote_logname |
//! | `%u` | remote_user |
//! | `%t` | timestamp (`[...]` 괄호 포함) |
//! | `%r` | request_line |
//! | `%s`, `%>s` | status_code |
//! | `%O`, `%b` | response_size |
//! | `%{Referer}i` | referer |
//! | `%{User-Agent}i` | user_agent |
//! | `%D` | request_time (마이크로초) |
//! | `%T` | request_time (초) |
//! | `%v`, `%p` | 가상호스트/포트 (파싱만 하고 버림) |

use regex::Regex;

use logwarden_core::error::{LogwardenError, ParseError};
use logwarden_core::pipeline::{FormatCompiler, LineParser};
use logwarden_core::types::LogRecord;

use super::fields::record_from_captures;
use crate::error::EngineError;

/// 지시자 존재를 판별할 때 찾는 토큰 목록
const DIRECTIVE_TOKENS: [&str; 12] = [
    "%h", "%l", "%u", "%t", "%r", "%s", "%O", "%i", "%v", "%p", "%D", "%T",
];

/// 문자열이 LogFormat 지시자 문자열로 보이는지 판별합니다.
pub fn looks_like_directive_string(spec: &str) -> bool {
    spec.contains('%') && DIRECTIVE_TOKENS.iter().any(|token| spec.contains(token))
}

/// 지시자 템플릿 컴파일러 전략
#[derive(Debug, Default)]
pub struct DirectiveCompiler;

impl DirectiveCompiler {
    /// 새 컴파일러를 생성합니다.
    pub fn new() -> Self {
        Self
    }

    /// 템플릿을 파서로 컴파일합니다.
    pub fn compile_template(&self, template: &str) -> Result<DirectiveParser, EngineError> {
        let pattern = translate_template(template)?;
        let regex = Regex::new(&pattern).map_err(|e| EngineError::Format {
            spec: template.to_owned(),
            reason: format!("translated pattern failed to compile: {e}"),
        })?;
        Ok(DirectiveParser {
            template: template.to_owned(),
            regex,
        })
    }
}

impl FormatCompiler for DirectiveCompiler {
    fn name(&self) -> &str {
        "directive"
    }

    fn compile(&self, spec: &str) -> Result<Box<dyn LineParser>, LogwardenError> {
        let parser = self.compile_template(spec)?;
        Ok(Box::new(parser))
    }
}

/// 지시자 템플릿에서 컴파일된 라인 파서
///
/// 구성 후 불변이며 여러 라인/파일에 걸쳐 재사용 가능합니다.
#[derive(Debug)]
pub struct DirectiveParser {
    template: String,
    regex: Regex,
}

impl DirectiveParser {
    /// 원본 템플릿 문자열
    pub fn template(&self) -> &str {
        &self.template
    }
}

impl LineParser for DirectiveParser {
    fn format_name(&self) -> &str {
        "directive"
    }

    fn parse_line(&self, line: &str) -> Result<LogRecord, ParseError> {
        let caps = self
            .regex
            .captures(line.trim())
            .ok_or(ParseError::Unmatched)?;
        record_from_captures(&caps)
    }
}

/// 템플릿을 명명 캡처 그룹을 가진 정규식 패턴으로 변환합니다.
fn translate_template(template: &str) -> Result<String, EngineError> {
    let mut pattern = String::with_capacity(template.len() * 4);
    pattern.push('^');

    let mut chars = template.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '%' {
            push_literal(&mut pattern, ch);
            continue;
        }

        match chars.peek().copied() {
            Some('%') => {
                chars.next();
                push_literal(&mut pattern, '%');
            }
            Some('{') => {
                chars.next();
                let mut name = String::new();
                for inner in chars.by_ref() {
                    if inner == '}' {
                        break;
                    }
                    name.push(inner);
                }
                let kind = chars.next().ok_or_else(|| unsupported(template, "%{..}"))?;
                if kind != 'i' {
                    return Err(unsupported(template, &format!("%{{{name}}}{kind}")));
                }
                match name.as_str() {
                    "Referer" => pattern.push_str(r#"(?P<referer>[^"]*)"#),
                    "User-Agent" => pattern.push_str(r#"(?P<user_agent>[^"]*)"#),
                    // 다른 헤더는 파싱만 하고 버립니다
                    _ => pattern.push_str(r#"(?:[^"]*)"#),
                }
            }
            Some('>') => {
                chars.next();
                if chars.next() != Some('s') {
                    return Err(unsupported(template, "%>"));
                }
                pattern.push_str(r"(?P<status_code>\d+)");
            }
            Some('h') => {
                chars.next();
                pattern.push_str(r"(?P<remote_host>\S+)");
            }
            Some('l') => {
                chars.next();
                pattern.push_str(r"(?P<remote_logname>\S+)");
            }
            Some('u') => {
                chars.next();
                pattern.push_str(r"(?P<remote_user>\S+)");
            }
            Some('t') => {
                chars.next();
                pattern.push_str(r"\[(?P<timestamp>[^\]]+)\]");
            }
            Some('r') => {
                chars.next();
                pattern.push_str(r#"(?P<request_line>[^"]*)"#);
            }
            Some('s') => {
                chars.next();
                pattern.push_str(r"(?P<status_code>\d+)");
            }
            Some('O') | Some('b') => {
                chars.next();
                pattern.push_str(r"(?P<response_size>\S+)");
            }
            Some('v') => {
                chars.next();
                pattern.push_str(r"(?:[^\s:]+)");
            }
            Some('p') => {
                chars.next();
                pattern.push_str(r"(?:\d+)");
            }
            Some('D') => {
                chars.next();
                pattern.push_str(r"(?P<request_time_us>\d+)");
            }
            Some('T') => {
                chars.next();
                pattern.push_str(r"(?P<request_time>\d+(?:\.\d+)?)");
            }
            Some(other) => {
                return Err(unsupported(template, &format!("%{other}")));
            }
            None => {
                return Err(unsupported(template, "trailing %"));
            }
        }
    }

    pattern.push('$');
    Ok(pattern)
}

fn push_literal(pattern: &mut String, ch: char) {
    // 공백 리터럴은 유연하게 1개 이상의 공백과 매칭합니다
    if ch == ' ' {
        pattern.push_str(r"\s+");
    } else {
        pattern.push_str(&regex::escape(&ch.to_string()));
    }
}

fn unsupported(template: &str, directive: &str) -> EngineError {
    EngineError::Format {
        spec: template.to_owned(),
        reason: format!("unsupported directive '{directive}'"),
    }
}
