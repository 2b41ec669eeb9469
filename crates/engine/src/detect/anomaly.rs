//! 이상 탐지 규칙 -- 쿼리 경계를 통해 동작하는 여섯 가지 서브 규칙
//!
//! 각 서브 규칙은 [`RecordQuery`]에 하나 이상의 집계 쿼리를 던지고
//! 결과 행을 [`AnomalyAlert`]로 변환합니다. 쿼리 실패는 서브 규칙
//! 단위로 잡혀 "이 규칙은 기여 없음"으로 격하되며, 전체 패스를
//! 중단시키지 않습니다. 어떤 서브 규칙이 격하되었는지는
//! [`DetectionReport::degraded`]에 기록되어 부분 실패를 테스트에서
//! 결정적으로 검증할 수 있습니다.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::warn;

use logwarden_core::error::StoreError;
use logwarden_core::query::{AggregateFn, Column, Predicate, QuerySpec, RecordQuery, Value};
use logwarden_core::types::{AlertType, AnomalyAlert, DetailValue, Severity, TimeFilter};

/// User-Agent 이상 규칙의 봇/공격 지표 목록
const AGENT_INDICATORS: [&str; 11] = [
    "bot", "crawler", "spider", "scraper", "python", "curl", "wget", "scan", "test", "exploit",
    "attack",
];

/// 브라우저로 인정하는 토큰 목록
const BROWSER_TOKENS: [&str; 4] = ["mozilla", "chrome", "safari", "firefox"];

/// 민감 경로 지표 목록
const SUSPICIOUS_PATHS: [&str; 13] = [
    "admin",
    "login",
    "wp-",
    "phpmyadmin",
    "sql",
    "config",
    "backup",
    "test",
    "dev",
    "debug",
    ".env",
    "api/",
    "shell",
];

/// 격하된 서브 규칙 하나의 기록
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DegradedRule {
    /// 서브 규칙 이름
    pub rule: String,
    /// 실패 사유
    pub reason: String,
}

/// 이상 탐지 패스의 결과
///
/// 일부 서브 규칙이 실패해도 구조적으로 유효한 결과가 반환되며,
/// `degraded`가 비어있지 않으면 부분 완료입니다.
#[derive(Debug, Default, Serialize)]
pub struct DetectionReport {
    /// 심각도 순위/빈도 내림차순으로 정렬된 알림
    pub alerts: Vec<AnomalyAlert>,
    /// 격하된 서브 규칙 목록
    pub degraded: Vec<DegradedRule>,
}

impl DetectionReport {
    /// 일부 서브 규칙이 격하되었는지 여부
    pub fn is_partial(&self) -> bool {
        !self.degraded.is_empty()
    }
}

/// 보안 요약 — 심각도/유형별 버킷과 상위 권고
#[derive(Debug, Serialize)]
pub struct SecuritySummary {
    /// 전체 알림 수
    pub total_alerts: usize,
    /// critical 알림 수
    pub critical_count: usize,
    /// high 알림 수
    pub high_count: usize,
    /// medium 알림 수
    pub medium_count: usize,
    /// 알림 유형별 수
    pub alert_types: BTreeMap<String, usize>,
    /// 상위 알림 (최대 10)
    pub top_alerts: Vec<AnomalyAlert>,
    /// 상위 20개 알림에서 중복 제거한 권고 (최대 10)
    pub recommendations: Vec<String>,
    /// 격하된 서브 규칙 목록
    pub degraded: Vec<DegradedRule>,
}

/// 이상 탐지기
///
/// 쿼리 경계 뒤의 스토어 구현체에만 의존합니다.
pub struct AnomalyDetector<'a> {
    store: &'a dyn RecordQuery,
}

impl<'a> AnomalyDetector<'a> {
    /// 스토어 핸들로 탐지기를 생성합니다.
    pub fn new(store: &'a dyn RecordQuery) -> Self {
        Self { store }
    }

    /// 여섯 서브 규칙을 모두 실행하고 결과를 모읍니다.
    ///
    /// 실패한 서브 규칙은 빈 기여로 격하되고 `degraded`에 기록됩니다.
    pub fn detect_all_anomalies(&self, window: Option<&TimeFilter>) -> DetectionReport {
        let mut report = DetectionReport::default();

        let sub_rules: [(&str, Result<Vec<AnomalyAlert>, StoreError>); 6] = [
            ("ip", self.detect_ip_anomalies(window)),
            ("status_code", self.detect_status_anomalies(window)),
            ("user_agent", self.detect_user_agent_anomalies(window)),
            ("path", self.detect_path_anomalies(window)),
            ("temporal", self.detect_temporal_anomalies(window)),
            ("response_size", self.detect_response_size_anomalies(window)),
        ];

        for (name, result) in sub_rules {
            match result {
                Ok(mut alerts) => report.alerts.append(&mut alerts),
                Err(e) => {
                    warn!(rule = name, error = %e, "sub-rule degraded");
                    report.degraded.push(DegradedRule {
                        rule: name.to_owned(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        report.alerts.sort_by(|a, b| {
            b.severity
                .rank()
                .cmp(&a.severity.rank())
                .then_with(|| b.frequency.cmp(&a.frequency))
        });

        report
    }

    /// 보안 요약을 생성합니다.
    pub fn get_security_summary(&self, window: Option<&TimeFilter>) -> SecuritySummary {
        let report = self.detect_all_anomalies(window);
        let alerts = report.alerts;

        let mut alert_types: BTreeMap<String, usize> = BTreeMap::new();
        for alert in &alerts {
            *alert_types.entry(alert.alert_type.to_string()).or_default() += 1;
        }

        // 상위 20개 알림에서 최초 등장 순서를 유지하며 권고를 중복 제거
        let mut recommendations = Vec::new();
        for alert in alerts.iter().take(20) {
            for rec in &alert.recommendations {
                if recommendations.len() >= 10 {
                    break;
                }
                if !recommendations.contains(rec) {
                    recommendations.push(rec.clone());
                }
            }
        }

        SecuritySummary {
            total_alerts: alerts.len(),
            critical_count: count_severity(&alerts, Severity::Critical),
            high_count: count_severity(&alerts, Severity::High),
            medium_count: count_severity(&alerts, Severity::Medium),
            alert_types,
            top_alerts: alerts.into_iter().take(10).collect(),
            recommendations,
            degraded: report.degraded,
        }
    }

    /// IP 기반 이상: 고빈도/고비율 IP를 찾아 에러 비율과 경로 다양성으로
    /// 심각도를 올립니다.
    pub fn detect_ip_anomalies(
        &self,
        window: Option<&TimeFilter>,
    ) -> Result<Vec<AnomalyAlert>, StoreError> {
        let time = time_predicate(window)?;

        let spec = QuerySpec::grouped(Column::RemoteHost)
            .filter(Predicate::NotNullOrEmpty(Column::RemoteHost))
            .filter_opt(time.clone())
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
            .aggregate(AggregateFn::CountDistinct(Column::UserAgent), "unique_agents")
            .percent_of_total("percentage", time.into_iter().collect())
            .order_desc("request_count");

        let rows = self.store.query(&spec)?;
        let mut alerts = Vec::new();

        for row in rows
            .iter()
            .filter(|r| r.get_u64("request_count") > 1000 || r.get_f64("percentage") > 5.0)
            .take(20)
        {
            let ip = row.get_text("remote_host").unwrap_or_default();
            let request_count = row.get_u64("request_count");
            let percentage = row.get_f64("percentage");
            let error_rate = ratio(row.get_u64("error_count"), request_count);
            let path_diversity = ratio(row.get_u64("unique_paths"), request_count);

            let mut severity = Severity::Low;
            let mut recommendations = Vec::new();

            if request_count > 10000 {
                severity = Severity::Critical;
                recommendations.push("Investigate potential DDoS attack".to_owned());
            } else if request_count > 5000 {
                severity = Severity::High;
                recommendations.push("Monitor for sustained high activity".to_owned());
            } else if percentage > 10.0 {
                severity = Severity::Medium;
                recommendations.push("Review traffic patterns from this IP".to_owned());
            }

            if error_rate > 0.5 {
                severity = severity.max(Severity::High);
                recommendations.push("High error rate suggests scanning/brute force".to_owned());
            }

            if path_diversity < 0.1 && request_count > 1000 {
                recommendations.push("Low path diversity indicates focused attack".to_owned());
            }

            alerts.push(AnomalyAlert {
                alert_type: AlertType::Spike,
                severity,
                column: "remote_host".to_owned(),
                description: format!(
                    "IP {ip} generated {request_count} requests ({percentage:.1}% of total)"
                ),
                value: DetailValue::Text(ip),
                frequency: request_count,
                percentage,
                baseline: None,
                deviation: None,
                time_window: None,
                recommendations,
            });
        }

        Ok(alerts)
    }

    /// 상태 코드 이상: 코드별 점유율이 규칙 임계값을 넘을 때만 알림을
    /// 생성합니다.
    pub fn detect_status_anomalies(
        &self,
        window: Option<&TimeFilter>,
    ) -> Result<Vec<AnomalyAlert>, StoreError> {
        let time = time_predicate(window)?;

        let spec = QuerySpec::grouped(Column::StatusCode)
            .filter_opt(time.clone())
            .aggregate(AggregateFn::Count, "frequency")
            .percent_of_total("percentage", time.into_iter().collect())
            .order_desc("frequency");

        let rows = self.store.query(&spec)?;
        let mut alerts = Vec::new();

        for row in &rows {
            let status_code = row.get_i64("status_code").unwrap_or(0);
            let frequency = row.get_u64("frequency");
            let percentage = row.get_f64("percentage");

            let mut severity = Severity::Low;
            let mut recommendations = Vec::new();

            if status_code >= 500 && percentage > 5.0 {
                severity = Severity::Critical;
                recommendations
                    .push("High server error rate - investigate backend issues".to_owned());
            } else if status_code == 404 && percentage > 20.0 {
                severity = Severity::High;
                recommendations.push("High 404 rate suggests scanning activity".to_owned());
            } else if matches!(status_code, 401 | 403) && percentage > 10.0 {
                severity = Severity::Medium;
                recommendations.push("High authentication failure rate".to_owned());
            } else if matches!(status_code, 429 | 503) && percentage > 1.0 {
                severity = Severity::Medium;
                recommendations
                    .push("Rate limiting or service unavailability detected".to_owned());
            }

            if recommendations.is_empty() {
                continue;
            }

            alerts.push(AnomalyAlert {
                alert_type: AlertType::ThresholdBreach,
                severity,
                column: "status_code".to_owned(),
                description: format!(
                    "Status code {status_code} appears in {percentage:.1}% of requests"
                ),
                value: DetailValue::Int(status_code),
                frequency,
                percentage,
                baseline: None,
                deviation: None,
                time_window: None,
                recommendations,
            });
        }

        Ok(alerts)
    }

    /// User-Agent 이상: 고빈도 에이전트의 자동화/봇/비브라우저 징후를
    /// 검사합니다. 나중 조건이 앞의 심각도를 덮어씁니다.
    pub fn detect_user_agent_anomalies(
        &self,
        window: Option<&TimeFilter>,
    ) -> Result<Vec<AnomalyAlert>, StoreError> {
        let time = time_predicate(window)?;

        let mut denominator = vec![Predicate::NotNullOrEmpty(Column::UserAgent)];
        denominator.extend(time.clone());

        let spec = QuerySpec::grouped(Column::UserAgent)
            .filter(Predicate::NotNullOrEmpty(Column::UserAgent))
            .filter_opt(time)
            .aggregate(AggregateFn::Count, "frequency")
            .aggregate(AggregateFn::CountDistinct(Column::RemoteHost), "unique_ips")
            .percent_of_total("percentage", denominator)
            .order_desc("frequency");

        let rows = self.store.query(&spec)?;
        let mut alerts = Vec::new();

        for row in rows
            .iter()
            .filter(|r| r.get_u64("frequency") > 100)
            .take(50)
        {
            let user_agent = row.get_text("user_agent").unwrap_or_default();
            let frequency = row.get_u64("frequency");
            let percentage = row.get_f64("percentage");
            let unique_ips = row.get_u64("unique_ips");

            let lower = user_agent.to_lowercase();
            let is_suspicious_bot = AGENT_INDICATORS.iter().any(|ind| lower.contains(ind));

            let mut severity = Severity::Low;
            let mut recommendations = Vec::new();

            if unique_ips == 1 && frequency > 1000 {
                severity = Severity::Medium;
                recommendations
                    .push("Single IP with high frequency suggests automation".to_owned());
            }

            if is_suspicious_bot && frequency > 500 {
                severity = Severity::Medium;
                recommendations.push("Potential malicious bot activity detected".to_owned());
            }

            if user_agent.chars().count() < 10 || user_agent.matches(' ').count() < 2 {
                severity = Severity::Medium;
                recommendations.push("Unusually short or simple user agent string".to_owned());
            }

            if percentage > 10.0 && !BROWSER_TOKENS.iter().any(|b| lower.contains(b)) {
                severity = Severity::High;
                recommendations.push("High frequency non-browser user agent".to_owned());
            }

            if recommendations.is_empty() {
                continue;
            }

            alerts.push(AnomalyAlert {
                alert_type: AlertType::PatternBreak,
                severity,
                column: "user_agent".to_owned(),
                description: format!(
                    "Suspicious user agent with {frequency} requests ({percentage:.1}%)"
                ),
                value: DetailValue::Text(truncate_value(&user_agent, 100)),
                frequency,
                percentage,
                baseline: None,
                deviation: None,
                time_window: None,
                recommendations,
            });
        }

        Ok(alerts)
    }

    /// 요청 경로 이상: 고빈도 경로의 404 비율, 민감 경로 매칭, IP
    /// 집중도를 검사합니다.
    pub fn detect_path_anomalies(
        &self,
        window: Option<&TimeFilter>,
    ) -> Result<Vec<AnomalyAlert>, StoreError> {
        let time = time_predicate(window)?;

        let mut denominator = vec![Predicate::NotNullOrEmpty(Column::Path)];
        denominator.extend(time.clone());

        let spec = QuerySpec::grouped(Column::Path)
            .filter(Predicate::NotNullOrEmpty(Column::Path))
            .filter_opt(time)
            .aggregate(AggregateFn::Count, "frequency")
            .aggregate(AggregateFn::CountDistinct(Column::RemoteHost), "unique_ips")
            .aggregate(
                AggregateFn::CountIf(Predicate::Eq(Column::StatusCode, Value::Int(404))),
                "not_found_count",
            )
            .percent_of_total("percentage", denominator)
            .order_desc("frequency");

        let rows = self.store.query(&spec)?;
        let mut alerts = Vec::new();

        for row in rows
            .iter()
            .filter(|r| r.get_u64("frequency") > 50)
            .take(100)
        {
            let path = row.get_text("path").unwrap_or_default();
            let frequency = row.get_u64("frequency");
            let percentage = row.get_f64("percentage");
            let unique_ips = row.get_u64("unique_ips");
            let not_found_ratio = ratio(row.get_u64("not_found_count"), frequency);

            let lower = path.to_lowercase();
            let is_suspicious_path = SUSPICIOUS_PATHS.iter().any(|p| lower.contains(p));

            let mut severity = Severity::Low;
            let mut recommendations = Vec::new();

            if not_found_ratio > 0.8 && frequency > 100 {
                severity = Severity::Medium;
                recommendations
                    .push("High 404 rate suggests scanning for vulnerabilities".to_owned());
            }

            if is_suspicious_path && frequency > 200 {
                severity = Severity::High;
                recommendations.push("Potential attack on sensitive endpoint".to_owned());
            }

            if unique_ips < 3 && frequency > 500 {
                if severity != Severity::High {
                    severity = Severity::Medium;
                }
                recommendations
                    .push("Few IPs accessing path frequently - potential attack".to_owned());
            }

            if percentage > 5.0 && (is_suspicious_path || not_found_ratio > 0.5) {
                severity = Severity::High;
                recommendations.push("High percentage of suspicious path requests".to_owned());
            }

            if recommendations.is_empty() {
                continue;
            }

            alerts.push(AnomalyAlert {
                alert_type: AlertType::PatternBreak,
                severity,
                column: "path".to_owned(),
                description: format!(
                    "Suspicious path '{path}' accessed {frequency} times ({percentage:.1}%)"
                ),
                value: DetailValue::Text(path),
                frequency,
                percentage,
                baseline: None,
                deviation: None,
                time_window: None,
                recommendations,
            });
        }

        Ok(alerts)
    }

    /// 시간대 이상: 시간(hour)별 빈도가 평균의 3배를 넘는 시간대를
    /// 찾습니다.
    pub fn detect_temporal_anomalies(
        &self,
        window: Option<&TimeFilter>,
    ) -> Result<Vec<AnomalyAlert>, StoreError> {
        let time = time_predicate(window)?;

        let spec = QuerySpec::grouped(Column::Hour)
            .filter_opt(time)
            .aggregate(AggregateFn::Count, "frequency")
            .order_asc("hour");

        let rows = self.store.query(&spec)?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let total: u64 = rows.iter().map(|r| r.get_u64("frequency")).sum();
        let baseline = total as f64 / rows.len() as f64;
        if baseline <= 0.0 {
            return Ok(Vec::new());
        }

        let mut alerts = Vec::new();
        for row in &rows {
            let hour = row.get_i64("hour").unwrap_or(0);
            let frequency = row.get_u64("frequency");
            let deviation = (frequency as f64 - baseline) / baseline;

            // 편차 2.0 초과 = 평균의 3배 초과
            if deviation <= 2.0 {
                continue;
            }

            alerts.push(AnomalyAlert {
                alert_type: AlertType::Spike,
                severity: if deviation > 5.0 {
                    Severity::High
                } else {
                    Severity::Medium
                },
                column: "timestamp".to_owned(),
                description: format!(
                    "Traffic spike at hour {hour}:00 - {frequency} requests ({:.0}% above average)",
                    deviation * 100.0
                ),
                value: DetailValue::Text(format!("{hour}:00")),
                frequency,
                percentage: frequency as f64 * 100.0 / total as f64,
                baseline: Some(baseline),
                deviation: Some(deviation),
                time_window: None,
                recommendations: vec![
                    "Investigate traffic spike during this hour".to_owned(),
                    "Check for coordinated attacks or unusual events".to_owned(),
                ],
            });
        }

        Ok(alerts)
    }

    /// 응답 크기 이상: 초대형 응답(유출 의심)과 고빈도 소형 응답을
    /// 찾습니다.
    pub fn detect_response_size_anomalies(
        &self,
        window: Option<&TimeFilter>,
    ) -> Result<Vec<AnomalyAlert>, StoreError> {
        let time = time_predicate(window)?;

        let mut denominator = vec![Predicate::NotNullOrEmpty(Column::ResponseSize)];
        denominator.extend(time.clone());

        let spec = QuerySpec::grouped(Column::ResponseSize)
            .filter(Predicate::NotNullOrEmpty(Column::ResponseSize))
            .filter(Predicate::Greater(Column::ResponseSize, Value::Int(0)))
            .filter_opt(time)
            .aggregate(AggregateFn::Count, "frequency")
            .percent_of_total("percentage", denominator)
            .order_desc("response_size");

        let rows = self.store.query(&spec)?;
        let mut alerts = Vec::new();

        for row in rows
            .iter()
            .filter(|r| r.get_u64("frequency") > 100)
            .take(20)
        {
            let response_size = row.get_i64("response_size").unwrap_or(0);
            let frequency = row.get_u64("frequency");
            let percentage = row.get_f64("percentage");

            let mut severity = Severity::Low;
            let mut recommendations = Vec::new();

            if response_size > 10_000_000 && frequency > 10 {
                severity = Severity::High;
                recommendations
                    .push("Large response sizes may indicate data exfiltration".to_owned());
            } else if response_size < 100 && percentage > 20.0 {
                severity = Severity::Medium;
                recommendations
                    .push("Many small responses may indicate errors or blocked requests".to_owned());
            }

            if recommendations.is_empty() {
                continue;
            }

            alerts.push(AnomalyAlert {
                alert_type: AlertType::Outlier,
                severity,
                column: "response_size".to_owned(),
                description: format!(
                    "Unusual response size {response_size} bytes in {frequency} requests ({percentage:.1}%)"
                ),
                value: DetailValue::Int(response_size),
                frequency,
                percentage,
                baseline: None,
                deviation: None,
                time_window: None,
                recommendations,
            });
        }

        Ok(alerts)
    }
}

fn time_predicate(window: Option<&TimeFilter>) -> Result<Option<Predicate>, StoreError> {
    window.map(Predicate::from_time_filter).transpose()
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

fn count_severity(alerts: &[AnomalyAlert], severity: Severity) -> usize {
    alerts.iter().filter(|a| a.severity == severity).count()
}

/// 표시 값을 최대 길이로 자릅니다. 잘리면 말줄임표를 붙입니다.
fn truncate_value(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        value.to_owned()
    } else {
        let mut truncated: String = value.chars().take(max_chars).collect();
        truncated.push_str("...");
        truncated
    }
}
