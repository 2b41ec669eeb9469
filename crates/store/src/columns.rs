//! 컬럼 값 추출 — 레코드 필드를 쿼리 값으로 변환합니다.

use logwarden_core::query::{Column, Value};
use logwarden_core::types::LogRecord;

/// 레코드에서 컬럼 값을 추출합니다.
///
/// 없는 값(`Option::None`)은 [`Value::Null`]이 됩니다.
/// 타임스탬프는 스토어의 범위 술어와 같은 형식(`%Y-%m-%d %H:%M:%S`)의
/// 텍스트로 노출됩니다.
pub fn column_value(record: &LogRecord, column: Column) -> Value {
    match column {
        Column::RemoteHost => Value::Text(record.remote_host.clone()),
        Column::RemoteLogname => opt_text(record.remote_logname.as_deref()),
        Column::RemoteUser => opt_text(record.remote_user.as_deref()),
        Column::Timestamp => Value::Text(
            record
                .timestamp
                .naive_local()
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
        ),
        Column::RequestLine => Value::Text(record.request_line.clone()),
        Column::StatusCode => Value::Int(i64::from(record.status_code)),
        Column::ResponseSize => record.response_size.map_or(Value::Null, Value::Int),
        Column::Referer => opt_text(record.referer.as_deref()),
        Column::UserAgent => opt_text(record.user_agent.as_deref()),
        Column::RequestTime => record.request_time.map_or(Value::Null, Value::Float),
        Column::Method => Value::Text(record.method.clone()),
        Column::Path => Value::Text(record.path.clone()),
        Column::Protocol => Value::Text(record.protocol.clone()),
        Column::Hour => Value::Int(i64::from(record.hour)),
        Column::Date => Value::Text(record.date.format("%Y-%m-%d").to_string()),
        Column::FileExtension => Value::Text(record.file_extension.clone()),
    }
}

fn opt_text(value: Option<&str>) -> Value {
    match value {
        Some(s) => Value::Text(s.to_owned()),
        None => Value::Null,
    }
}
