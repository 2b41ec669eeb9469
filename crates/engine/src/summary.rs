//! 레코드 셋 요약 쿼리 -- 대시보드/CLI용 간단한 집계
//!
//! 쿼리 경계 위에서 동작하는 얇은 `QuerySpec` 합성 함수들입니다.
//! 어떤 `RecordQuery` 구현체와도 동작합니다.

use serde::Serialize;

use logwarden_core::error::StoreError;
use logwarden_core::query::{AggregateFn, Column, Predicate, QuerySpec, RecordQuery, Value};

/// 요청 수 기준 상위 IP 하나
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopIp {
    /// IP 주소
    pub ip: String,
    /// 요청 수
    pub request_count: u64,
}

/// 상태 코드 분포의 한 항목
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusCount {
    /// HTTP 상태 코드
    pub status_code: u16,
    /// 요청 수
    pub count: u64,
}

/// 시간대별 요청 수
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HourlyCount {
    /// 시(hour, 0-23)
    pub hour: u32,
    /// 요청 수
    pub request_count: u64,
}

/// 의심 IP 요약 한 건
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuspiciousIp {
    /// IP 주소
    pub ip: String,
    /// 요청 수
    pub request_count: u64,
    /// 에러(상태 ≥ 400) 수
    pub error_count: u64,
    /// 404 수
    pub not_found_count: u64,
    /// 고유 경로 수
    pub unique_paths: u64,
}

/// User-Agent 요약 한 건
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentCount {
    /// User-Agent 문자열
    pub user_agent: String,
    /// 요청 수
    pub request_count: u64,
    /// 고유 요청 IP 수
    pub unique_ips: u64,
}

/// 요청 수 기준 상위 IP 목록
pub fn top_ips(store: &dyn RecordQuery, limit: usize) -> Result<Vec<TopIp>, StoreError> {
    let rows = store.query(
        &QuerySpec::grouped(Column::RemoteHost)
            .aggregate(AggregateFn::Count, "request_count")
            .order_desc("request_count")
            .limit(limit),
    )?;
    Ok(rows
        .iter()
        .filter_map(|r| {
            Some(TopIp {
                ip: r.get_text("remote_host")?,
                request_count: r.get_u64("request_count"),
            })
        })
        .collect())
}

/// HTTP 상태 코드 분포 (코드 오름차순)
pub fn status_code_distribution(store: &dyn RecordQuery) -> Result<Vec<StatusCount>, StoreError> {
    let rows = store.query(
        &QuerySpec::grouped(Column::StatusCode)
            .aggregate(AggregateFn::Count, "count")
            .order_asc("status_code"),
    )?;
    Ok(rows
        .iter()
        .map(|r| StatusCount {
            status_code: r.get_i64("status_code").unwrap_or(0) as u16,
            count: r.get_u64("count"),
        })
        .collect())
}

/// 시간대별 요청 수 (시 오름차순)
pub fn hourly_requests(store: &dyn RecordQuery) -> Result<Vec<HourlyCount>, StoreError> {
    let rows = store.query(
        &QuerySpec::grouped(Column::Hour)
            .aggregate(AggregateFn::Count, "request_count")
            .order_asc("hour"),
    )?;
    Ok(rows
        .iter()
        .map(|r| HourlyCount {
            hour: r.get_i64("hour").unwrap_or(0) as u32,
            request_count: r.get_u64("request_count"),
        })
        .collect())
}

/// 요청 수가 `min_requests` 이상인 의심 IP 목록 (요청 수 내림차순)
pub fn suspicious_ips(
    store: &dyn RecordQuery,
    min_requests: u64,
) -> Result<Vec<SuspiciousIp>, StoreError> {
    let rows = store.query(
        &QuerySpec::grouped(Column::RemoteHost)
            .aggregate(AggregateFn::Count, "request_count")
            .aggregate(
                AggregateFn::CountIf(Predicate::GreaterEq(Column::StatusCode, Value::Int(400))),
                "error_count",
            )
            .aggregate(
                AggregateFn::CountIf(Predicate::Eq(Column::StatusCode, Value::Int(404))),
                "not_found_count",
            )
            .aggregate(AggregateFn::CountDistinct(Column::Path), "unique_paths")
            .order_desc("request_count"),
    )?;
    Ok(rows
        .iter()
        .filter(|r| r.get_u64("request_count") >= min_requests)
        .filter_map(|r| {
            Some(SuspiciousIp {
                ip: r.get_text("remote_host")?,
                request_count: r.get_u64("request_count"),
                error_count: r.get_u64("error_count"),
                not_found_count: r.get_u64("not_found_count"),
                unique_paths: r.get_u64("unique_paths"),
            })
        })
        .collect())
}

/// 요청 수 기준 상위 User-Agent 목록
pub fn user_agent_overview(
    store: &dyn RecordQuery,
    limit: usize,
) -> Result<Vec<AgentCount>, StoreError> {
    let rows = store.query(
        &QuerySpec::grouped(Column::UserAgent)
            .filter(Predicate::NotNullOrEmpty(Column::UserAgent))
            .aggregate(AggregateFn::Count, "request_count")
            .aggregate(AggregateFn::CountDistinct(Column::RemoteHost), "unique_ips")
            .order_desc("request_count")
            .limit(limit),
    )?;
    Ok(rows
        .iter()
        .filter_map(|r| {
            Some(AgentCount {
                user_agent: r.get_text("user_agent")?,
                request_count: r.get_u64("request_count"),
                unique_ips: r.get_u64("unique_ips"),
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};
    use logwarden_core::types::LogRecord;
    use logwarden_store::MemoryStore;

    fn record(host: &str, hour: u32, status: u16, path: &str, agent: Option<&str>) -> LogRecord {
        let mut r = LogRecord::from_parts(
            host.to_owned(),
            None,
            None,
            FixedOffset::east_opt(0)
                .unwrap()
                .with_ymd_and_hms(2024, 3, 15, hour, 0, 0)
                .unwrap(),
            format!("GET {path} HTTP/1.1"),
            status,
            None,
            None,
            agent.map(str::to_owned),
            None,
        );
        r.derive_fields();
        r
    }

    fn store() -> MemoryStore {
        let mut records = Vec::new();
        for _ in 0..5 {
            records.push(record("10.0.0.1", 9, 200, "/a", Some("Mozilla/5.0")));
        }
        for i in 0..3 {
            records.push(record("10.0.0.2", 10, 404, &format!("/x{i}"), Some("curl/8.0")));
        }
        MemoryStore::new(records)
    }

    #[test]
    fn top_ips_ordered_and_limited() {
        let store = store();
        let top = top_ips(&store, 1).unwrap();
        assert_eq!(
            top,
            vec![TopIp {
                ip: "10.0.0.1".to_owned(),
                request_count: 5,
            }]
        );
    }

    #[test]
    fn status_distribution_ascending() {
        let store = store();
        let dist = status_code_distribution(&store).unwrap();
        assert_eq!(dist.len(), 2);
        assert_eq!(dist[0].status_code, 200);
        assert_eq!(dist[1].status_code, 404);
        assert_eq!(dist[1].count, 3);
    }

    #[test]
    fn hourly_counts_ascending() {
        let store = store();
        let hourly = hourly_requests(&store).unwrap();
        assert_eq!(hourly[0].hour, 9);
        assert_eq!(hourly[0].request_count, 5);
        assert_eq!(hourly[1].hour, 10);
    }

    #[test]
    fn suspicious_ips_filters_by_min_requests() {
        let store = store();
        let all = suspicious_ips(&store, 1).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].ip, "10.0.0.1");

        let filtered = suspicious_ips(&store, 4).unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].error_count, 0);

        let scanner = &all[1];
        assert_eq!(scanner.not_found_count, 3);
        assert_eq!(scanner.unique_paths, 3);
    }

    #[test]
    fn user_agent_overview_counts_ips() {
        let store = store();
        let agents = user_agent_overview(&store, 10).unwrap();
        assert_eq!(agents.len(), 2);
        assert_eq!(agents[0].user_agent, "Mozilla/5.0");
        assert_eq!(agents[0].unique_ips, 1);
    }
}
