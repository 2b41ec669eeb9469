//! 캡처 그룹에서 레코드로의 필드 강제 변환
//!
//! 지시자 파서와 정규식 파서는 모두 명명 캡처 그룹으로 수렴하며,
//! 이 모듈이 공통 변환 규칙을 적용합니다.
//!
//! # 변환 규칙
//! - 플레이스홀더 `-` (또는 그룹 부재)는 "값 없음"으로 강제 변환되며
//!   타입 변환 에러가 되지 않습니다.
//! - 플레이스홀더 확인 후에도 실패하는 숫자 변환은 "값 없음"입니다.
//! - `status_code`는 그룹이 없으면 0, 있는데 숫자가 아니면 레코드
//!   수준 파싱 실패입니다.

use regex::Captures;

use logwarden_core::error::ParseError;
use logwarden_core::types::LogRecord;

use super::timestamp::parse_timestamp;

/// 로그에서 "값 없음"을 뜻하는 플레이스홀더
pub(crate) const PLACEHOLDER: &str = "-";

/// 명명 캡처 그룹에서 레코드를 조립합니다.
pub(crate) fn record_from_captures(caps: &Captures<'_>) -> Result<LogRecord, ParseError> {
    let group = |name: &str| caps.name(name).map(|m| m.as_str());

    let timestamp_raw = group("timestamp").ok_or(ParseError::MissingField {
        field: "timestamp",
    })?;
    let timestamp = parse_timestamp(timestamp_raw)?;

    let status_code = match group("status_code") {
        None => 0,
        Some(raw) => raw.parse::<u16>().map_err(|_| ParseError::Unmatched)?,
    };

    // %D는 마이크로초, %T와 정규식의 request_time 그룹은 초 단위입니다.
    let request_time = match group("request_time_us") {
        Some(raw) => coerce_float(Some(raw)).map(|us| us / 1_000_000.0),
        None => coerce_float(group("request_time")),
    };

    Ok(LogRecord::from_parts(
        group("remote_host").unwrap_or_default().to_owned(),
        coerce_string(group("remote_logname")),
        coerce_string(group("remote_user")),
        timestamp,
        group("request_line").unwrap_or_default().to_owned(),
        status_code,
        coerce_int(group("response_size")),
        coerce_string(group("referer")),
        coerce_string(group("user_agent")),
        request_time,
    ))
}

/// 플레이스홀더/부재를 None으로 강제 변환합니다.
pub(crate) fn coerce_string(value: Option<&str>) -> Option<String> {
    match value {
        None => None,
        Some(PLACEHOLDER) => None,
        Some(s) => Some(s.to_owned()),
    }
}

/// 정수 강제 변환 — 플레이스홀더와 변환 실패 모두 None입니다.
pub(crate) fn coerce_int(value: Option<&str>) -> Option<i64> {
    match value {
        None | Some(PLACEHOLDER) => None,
        Some(s) => s.parse().ok(),
    }
}

/// 부동소수 강제 변환 — 플레이스홀더와 변환 실패 모두 None입니다.
pub(crate) fn coerce_float(value: Option<&str>) -> Option<f64> {
    match value {
        None | Some(PLACEHOLDER) => None,
        Some(s) => s.parse().ok(),
    }
}
