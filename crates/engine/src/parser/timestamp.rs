//! Apache 타임스탬프 파싱
//!
//! 기본 형식은 `25/Dec/1995:10:00:00 +0000`입니다. 존 오프셋 파싱에
//! 실패하면 앞 20자만으로 오프셋 없이 재시도하며, 이때 +00:00을
//! 가정합니다. 그 외의 실패는 레코드 수준 파싱 실패로 전파됩니다.

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use logwarden_core::error::ParseError;

/// 기본 형식 (존 오프셋 포함)
const PRIMARY_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

/// 폴백 형식 (앞 20자, 존 오프셋 없음)
const FALLBACK_FORMAT: &str = "%d/%b/%Y:%H:%M:%S";

/// Apache 로그 타임스탬프를 파싱합니다.
pub fn parse_timestamp(value: &str) -> Result<DateTime<FixedOffset>, ParseError> {
    let trimmed = value.trim();

    if let Ok(ts) = DateTime::parse_from_str(trimmed, PRIMARY_FORMAT) {
        return Ok(ts);
    }

    // 존 오프셋 없이 재시도: "25/Dec/1995:10:00:00"는 정확히 20자입니다.
    let head: String = trimmed.chars().take(20).collect();
    let naive = NaiveDateTime::parse_from_str(head.trim(), FALLBACK_FORMAT).map_err(|_| {
        ParseError::Timestamp {
            value: value.to_owned(),
        }
    })?;

    let utc = FixedOffset::east_opt(0).ok_or_else(|| ParseError::Timestamp {
        value: value.to_owned(),
    })?;
    naive
        .and_local_timezone(utc)
        .single()
        .ok_or_else(|| ParseError::Timestamp {
            value: value.to_owned(),
        })
}
