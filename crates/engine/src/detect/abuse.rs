//! 남용 탐지 규칙 -- 레코드 셋 위에서 직접 동작하는 고정 임계값 규칙
//!
//! 쿼리 엔진 의존 없이 인메모리 레코드 셋을 그룹화하여 네 가지 규칙
//! (무차별 대입, DDoS, 스캐닝, 봇 행위)을 평가합니다. 그룹 순회는
//! 키 정렬 순서(BTreeMap)라서 결과가 결정적입니다.
//!
//! 탐지기는 레코드 셋을 변경하지 않으며, finding은 호출마다 새로
//! 계산됩니다.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::debug;

use logwarden_core::config::AbuseConfig;
use logwarden_core::types::{AbusePattern, DetailValue, LogRecord, PatternType, Severity};

/// User-Agent에서 명시적 봇을 판별하는 지표 목록
const BOT_INDICATORS: [&str; 11] = [
    "bot",
    "crawler",
    "spider",
    "scraper",
    "python",
    "curl",
    "wget",
    "automation",
    "headless",
    "phantom",
    "selenium",
];

/// 봇 행위 결과 목록 상한
const BOT_RESULT_CAP: usize = 10;

/// 규칙 유형별로 묶인 남용 탐지 결과
#[derive(Debug, Default, Serialize)]
pub struct AbuseScan {
    /// 무차별 대입 패턴
    pub brute_force: Vec<AbusePattern>,
    /// DDoS 패턴
    pub ddos: Vec<AbusePattern>,
    /// 스캐닝 패턴
    pub scanning: Vec<AbusePattern>,
    /// 봇 행위 패턴
    pub bot_behavior: Vec<AbusePattern>,
}

impl AbuseScan {
    /// 전체 finding 수
    pub fn total(&self) -> usize {
        self.brute_force.len() + self.ddos.len() + self.scanning.len() + self.bot_behavior.len()
    }

    /// 모든 finding을 평탄화하여 순회합니다.
    pub fn iter(&self) -> impl Iterator<Item = &AbusePattern> {
        self.brute_force
            .iter()
            .chain(&self.ddos)
            .chain(&self.scanning)
            .chain(&self.bot_behavior)
    }
}

/// 남용 탐지기
///
/// 레코드 셋을 읽기 전용으로 빌려 네 가지 고정 임계값 규칙을
/// 평가합니다.
pub struct AbuseDetector<'a> {
    records: &'a [LogRecord],
    config: AbuseConfig,
}

impl<'a> AbuseDetector<'a> {
    /// 기본 임계값으로 탐지기를 생성합니다.
    pub fn new(records: &'a [LogRecord]) -> Self {
        Self {
            records,
            config: AbuseConfig::default(),
        }
    }

    /// 임계값 설정을 지정하여 탐지기를 생성합니다.
    pub fn with_config(records: &'a [LogRecord], config: AbuseConfig) -> Self {
        Self { records, config }
    }

    /// 무차별 대입 공격을 탐지합니다.
    ///
    /// (`remote_host`, `hour`) 그룹별 요청 수와 에러(상태 ≥ 400) 비율을
    /// 계산하여, 요청 수 ≥ `min_attempts`이고 에러 비율 ≥
    /// `error_threshold`인 그룹을 플래그합니다.
    pub fn detect_brute_force(&self) -> Vec<AbusePattern> {
        struct Group {
            total: u64,
            errors: u64,
            paths: BTreeSet<String>,
        }

        let mut groups: BTreeMap<(String, u32), Group> = BTreeMap::new();
        for record in self.records {
            let entry = groups
                .entry((record.remote_host.clone(), record.hour))
                .or_insert_with(|| Group {
                    total: 0,
                    errors: 0,
                    paths: BTreeSet::new(),
                });
            entry.total += 1;
            if record.status_code >= 400 {
                entry.errors += 1;
            }
            entry.paths.insert(record.path.clone());
        }

        let mut patterns = Vec::new();
        for ((host, hour), group) in groups {
            if group.total < self.config.min_attempts {
                continue;
            }
            let error_rate = group.errors as f64 / group.total as f64;
            if error_rate < self.config.error_threshold {
                continue;
            }

            let confidence = ((error_rate - self.config.error_threshold) * 2.0
                + (group.total as f64 / self.config.min_attempts as f64) * 0.3)
                .min(1.0);

            patterns.push(AbusePattern {
                pattern_type: PatternType::BruteForce,
                severity: if confidence > 0.8 {
                    Severity::High
                } else {
                    Severity::Medium
                },
                description: format!(
                    "High error rate ({:.1}%) with {} requests",
                    error_rate * 100.0,
                    group.total
                ),
                affected_ips: vec![host],
                request_count: group.total,
                confidence,
                details: BTreeMap::from([
                    ("error_rate".to_owned(), DetailValue::Float(error_rate)),
                    ("hour".to_owned(), DetailValue::Int(i64::from(hour))),
                    (
                        "unique_paths".to_owned(),
                        DetailValue::Int(group.paths.len() as i64),
                    ),
                ]),
            });
        }

        debug!(found = patterns.len(), "brute force scan complete");
        patterns
    }

    /// DDoS 패턴을 탐지합니다.
    ///
    /// IP별 총 요청 수가 `request_threshold` 이상이면서 고유 경로 수가
    /// `unique_path_threshold` 이하인 그룹 — 대량이지만 경로 다양성이
    /// 낮은 트래픽 — 을 플래그합니다.
    pub fn detect_ddos(&self) -> Vec<AbusePattern> {
        struct Group {
            total: u64,
            success: u64,
            paths: BTreeSet<String>,
            agents: BTreeSet<String>,
        }

        let mut groups: BTreeMap<String, Group> = BTreeMap::new();
        for record in self.records {
            let entry = groups
                .entry(record.remote_host.clone())
                .or_insert_with(|| Group {
                    total: 0,
                    success: 0,
                    paths: BTreeSet::new(),
                    agents: BTreeSet::new(),
                });
            entry.total += 1;
            if record.status_code == 200 {
                entry.success += 1;
            }
            entry.paths.insert(record.path.clone());
            if let Some(agent) = &record.user_agent {
                entry.agents.insert(agent.clone());
            }
        }

        let mut patterns = Vec::new();
        for (host, group) in groups {
            if group.total < self.config.request_threshold
                || group.paths.len() as u64 > self.config.unique_path_threshold
            {
                continue;
            }

            let path_diversity = group.paths.len() as f64 / group.total as f64;
            let success_rate = group.success as f64 / group.total as f64;
            let confidence = ((group.total as f64 / self.config.request_threshold as f64) * 0.5
                + (1.0 - path_diversity) * 0.5)
                .min(1.0);

            patterns.push(AbusePattern {
                pattern_type: PatternType::Ddos,
                severity: if group.total > self.config.request_threshold * 5 {
                    Severity::Critical
                } else {
                    Severity::High
                },
                description: format!(
                    "High volume ({} requests) targeting few paths",
                    group.total
                ),
                affected_ips: vec![host],
                request_count: group.total,
                confidence,
                details: BTreeMap::from([
                    (
                        "unique_paths".to_owned(),
                        DetailValue::Int(group.paths.len() as i64),
                    ),
                    ("success_rate".to_owned(), DetailValue::Float(success_rate)),
                    (
                        "path_diversity".to_owned(),
                        DetailValue::Float(path_diversity),
                    ),
                    (
                        "unique_agents".to_owned(),
                        DetailValue::Int(group.agents.len() as i64),
                    ),
                ]),
            });
        }

        debug!(found = patterns.len(), "ddos scan complete");
        patterns
    }

    /// 디렉토리/취약점 스캐닝 행위를 탐지합니다.
    ///
    /// 404 응답만 대상으로 IP별 404 수와 404 경로 다양성을 계산합니다.
    /// 404 레코드가 하나도 없으면 빈 결과를 반환합니다.
    pub fn detect_scanning(&self) -> Vec<AbusePattern> {
        struct Group {
            not_found: u64,
            paths: BTreeSet<String>,
            agents: BTreeSet<String>,
        }

        let mut groups: BTreeMap<String, Group> = BTreeMap::new();
        for record in self.records.iter().filter(|r| r.status_code == 404) {
            let entry = groups
                .entry(record.remote_host.clone())
                .or_insert_with(|| Group {
                    not_found: 0,
                    paths: BTreeSet::new(),
                    agents: BTreeSet::new(),
                });
            entry.not_found += 1;
            entry.paths.insert(record.path.clone());
            if let Some(agent) = &record.user_agent {
                entry.agents.insert(agent.clone());
            }
        }

        let mut patterns = Vec::new();
        for (host, group) in groups {
            if group.not_found < self.config.min_404_requests {
                continue;
            }
            let diversity = group.paths.len() as f64 / group.not_found as f64;
            if diversity < self.config.path_diversity_threshold {
                continue;
            }

            let confidence = ((diversity - self.config.path_diversity_threshold) * 2.0
                + (group.not_found as f64 / self.config.min_404_requests as f64) * 0.3)
                .min(1.0);

            patterns.push(AbusePattern {
                pattern_type: PatternType::Scanning,
                severity: Severity::Medium,
                description: format!(
                    "High path diversity in 404s ({} unique paths)",
                    group.paths.len()
                ),
                affected_ips: vec![host],
                request_count: group.not_found,
                confidence,
                details: BTreeMap::from([
                    (
                        "unique_404_paths".to_owned(),
                        DetailValue::Int(group.paths.len() as i64),
                    ),
                    (
                        "path_diversity_404".to_owned(),
                        DetailValue::Float(diversity),
                    ),
                    (
                        "unique_agents".to_owned(),
                        DetailValue::Int(group.agents.len() as i64),
                    ),
                ]),
            });
        }

        debug!(found = patterns.len(), "scanning scan complete");
        patterns
    }

    /// 자동화 봇 행위를 탐지합니다.
    ///
    /// User-Agent별로 그룹화하여, 봇 지표 문자열을 포함하는 명시적
    /// 봇이거나 (요청 > 100 AND 단일 IP)인 에이전트를 플래그합니다.
    /// 결과는 그룹 순회 순서(에이전트 키 정렬 순)로 최대 10개입니다.
    pub fn detect_bot_behavior(&self) -> Vec<AbusePattern> {
        struct Group {
            total: u64,
            ips: BTreeSet<String>,
            paths: BTreeSet<String>,
            success: u64,
        }

        let mut groups: BTreeMap<String, Group> = BTreeMap::new();
        for record in self.records {
            let Some(agent) = &record.user_agent else {
                continue;
            };
            let entry = groups.entry(agent.clone()).or_insert_with(|| Group {
                total: 0,
                ips: BTreeSet::new(),
                paths: BTreeSet::new(),
                success: 0,
            });
            entry.total += 1;
            entry.ips.insert(record.remote_host.clone());
            entry.paths.insert(record.path.clone());
            if record.status_code == 200 {
                entry.success += 1;
            }
        }

        let mut patterns = Vec::new();
        for (agent, group) in groups {
            if patterns.len() >= BOT_RESULT_CAP {
                break;
            }

            let lower = agent.to_lowercase();
            let is_explicit_bot = BOT_INDICATORS.iter().any(|ind| lower.contains(ind));
            let high_volume_single_ip = group.total > 100 && group.ips.len() == 1;

            if !is_explicit_bot && !high_volume_single_ip {
                continue;
            }

            patterns.push(AbusePattern {
                pattern_type: PatternType::BotBehavior,
                severity: if is_explicit_bot {
                    Severity::Low
                } else {
                    Severity::Medium
                },
                description: format!("Bot-like user agent with {} requests", group.total),
                // IP 귀속이 모호하므로 비워둡니다 (details에 고유 IP 수 포함)
                affected_ips: vec![],
                request_count: group.total,
                confidence: if is_explicit_bot { 0.9 } else { 0.6 },
                details: BTreeMap::from([
                    ("user_agent".to_owned(), DetailValue::Text(agent)),
                    (
                        "unique_ips".to_owned(),
                        DetailValue::Int(group.ips.len() as i64),
                    ),
                    (
                        "unique_paths".to_owned(),
                        DetailValue::Int(group.paths.len() as i64),
                    ),
                    (
                        "is_explicit_bot".to_owned(),
                        DetailValue::Bool(is_explicit_bot),
                    ),
                ]),
            });
        }

        debug!(found = patterns.len(), "bot behavior scan complete");
        patterns
    }

    /// 네 가지 규칙을 모두 실행하고 유형별로 묶어 반환합니다.
    pub fn analyze_all_patterns(&self) -> AbuseScan {
        AbuseScan {
            brute_force: self.detect_brute_force(),
            ddos: self.detect_ddos(),
            scanning: self.detect_scanning(),
            bot_behavior: self.detect_bot_behavior(),
        }
    }

    /// 모든 규칙의 finding을 평탄화하여 상위 위협을 반환합니다.
    ///
    /// 정렬 기준: 심각도 순위 내림차순, 동률이면 확신도 내림차순.
    pub fn get_top_threats(&self, limit: usize) -> Vec<AbusePattern> {
        let scan = self.analyze_all_patterns();
        let mut all: Vec<AbusePattern> = scan.iter().cloned().collect();
        all.sort_by(|a, b| {
            b.severity
                .rank()
                .cmp(&a.severity.rank())
                .then_with(|| b.confidence.total_cmp(&a.confidence))
        });
        all.truncate(limit);
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};
    use logwarden_core::types::LogRecord;

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
            Some(256),
            None,
            agent.map(str::to_owned),
            None,
        );
        r.derive_fields();
        r
    }

    /// 한 호스트가 한 시간대에 보낸 요청 묶음을 생성합니다.
    fn burst(host: &str, hour: u32, count: usize, errors: usize, paths: usize) -> Vec<LogRecord> {
        (0..count)
            .map(|i| {
                let status = if i < errors { 403 } else { 200 };
                let path = format!("/p{}", i % paths.max(1));
                record(host, hour, status, &path, Some("Mozilla/5.0"))
            })
            .collect()
    }

    #[test]
    fn brute_force_fires_on_heavy_errors() {
        let records = burst("10.0.0.9", 3, 60, 50, 40);
        let detector = AbuseDetector::new(&records);
        let patterns = detector.detect_brute_force();
        assert_eq!(patterns.len(), 1);

        let p = &patterns[0];
        assert_eq!(p.request_count, 60);
        assert_eq!(p.affected_ips, vec!["10.0.0.9".to_owned()]);
        let error_rate = match p.details.get("error_rate") {
            Some(DetailValue::Float(x)) => *x,
            other => panic!("unexpected error_rate detail: {other:?}"),
        };
        assert!((error_rate - 50.0 / 60.0).abs() < 1e-9);
        assert!((0.0..=1.0).contains(&p.confidence));
    }

    #[test]
    fn brute_force_quiet_on_low_error_rate() {
        // 60건 중 10건 에러 (0.167 < 0.8)
        let records = burst("10.0.0.9", 3, 60, 10, 40);
        let detector = AbuseDetector::new(&records);
        assert!(detector.detect_brute_force().is_empty());
    }

    #[test]
    fn brute_force_requires_min_attempts() {
        let records = burst("10.0.0.9", 3, 40, 40, 5);
        let detector = AbuseDetector::new(&records);
        assert!(detector.detect_brute_force().is_empty());
    }

    #[test]
    fn brute_force_groups_by_hour() {
        // 같은 호스트라도 시간대가 다르면 별개 그룹
        let mut records = burst("10.0.0.9", 3, 30, 30, 5);
        records.extend(burst("10.0.0.9", 4, 30, 30, 5));
        let detector = AbuseDetector::new(&records);
        assert!(detector.detect_brute_force().is_empty());
    }

    #[test]
    fn ddos_fires_on_high_volume_few_paths() {
        let records = burst("203.0.113.5", 1, 1200, 0, 3);
        let detector = AbuseDetector::new(&records);
        let patterns = detector.detect_ddos();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].severity, Severity::High);
        assert_eq!(patterns[0].request_count, 1200);
    }

    #[test]
    fn ddos_critical_above_five_times_threshold() {
        let records = burst("203.0.113.5", 1, 5001, 0, 2);
        let detector = AbuseDetector::new(&records);
        let patterns = detector.detect_ddos();
        assert_eq!(patterns[0].severity, Severity::Critical);
    }

    #[test]
    fn ddos_quiet_on_diverse_paths() {
        let records = burst("203.0.113.5", 1, 1200, 0, 50);
        let detector = AbuseDetector::new(&records);
        assert!(detector.detect_ddos().is_empty());
    }

    #[test]
    fn ddos_confidence_monotone_in_volume() {
        // 경로 수를 고정하고 요청 수만 늘리면 확신도는 감소하지 않음
        let mut last = 0.0f64;
        for count in [1000usize, 2000, 4000, 8000] {
            let records = burst("203.0.113.5", 1, count, 0, 3);
            let detector = AbuseDetector::new(&records);
            let patterns = detector.detect_ddos();
            let confidence = patterns[0].confidence;
            assert!(
                confidence >= last,
                "confidence decreased: {last} -> {confidence} at count {count}"
            );
            last = confidence;
        }
    }

    #[test]
    fn scanning_requires_404_records() {
        let records = burst("10.0.0.1", 2, 100, 0, 80);
        let detector = AbuseDetector::new(&records);
        assert!(detector.detect_scanning().is_empty());
    }

    #[test]
    fn scanning_fires_on_diverse_404s() {
        let records: Vec<LogRecord> = (0..30)
            .map(|i| record("10.0.0.7", 2, 404, &format!("/probe{i}"), Some("curl/8.0")))
            .collect();
        let detector = AbuseDetector::new(&records);
        let patterns = detector.detect_scanning();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].severity, Severity::Medium);
        assert_eq!(patterns[0].request_count, 30);
    }

    #[test]
    fn scanning_quiet_on_repeated_404_path() {
        // 404는 많지만 전부 같은 경로 (다양성 낮음)
        let records: Vec<LogRecord> = (0..30)
            .map(|_| record("10.0.0.7", 2, 404, "/favicon.ico", Some("curl/8.0")))
            .collect();
        let detector = AbuseDetector::new(&records);
        assert!(detector.detect_scanning().is_empty());
    }

    #[test]
    fn bot_explicit_indicator_low_severity() {
        let records: Vec<LogRecord> = (0..5)
            .map(|i| record("10.0.0.2", 1, 200, &format!("/p{i}"), Some("Googlebot/2.1")))
            .collect();
        let detector = AbuseDetector::new(&records);
        let patterns = detector.detect_bot_behavior();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].severity, Severity::Low);
        assert_eq!(patterns[0].confidence, 0.9);
        assert_eq!(
            patterns[0].details.get("is_explicit_bot"),
            Some(&DetailValue::Bool(true))
        );
    }

    #[test]
    fn bot_heuristic_single_ip_medium_severity() {
        let records: Vec<LogRecord> = (0..150)
            .map(|i| {
                record(
                    "10.0.0.3",
                    1,
                    200,
                    &format!("/p{i}"),
                    Some("StrangeClient/1.0"),
                )
            })
            .collect();
        let detector = AbuseDetector::new(&records);
        let patterns = detector.detect_bot_behavior();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].severity, Severity::Medium);
        assert_eq!(patterns[0].confidence, 0.6);
    }

    #[test]
    fn bot_results_capped_at_ten() {
        // 15개의 서로 다른 명시적 봇 에이전트
        let mut records = Vec::new();
        for i in 0..15 {
            records.push(record(
                "10.0.0.4",
                1,
                200,
                "/",
                Some(&format!("crawler-{i:02}/1.0")),
            ));
        }
        let detector = AbuseDetector::new(&records);
        assert_eq!(detector.detect_bot_behavior().len(), 10);
    }

    #[test]
    fn bot_ignores_records_without_agent() {
        let records: Vec<LogRecord> = (0..200)
            .map(|i| record("10.0.0.5", 1, 200, &format!("/p{i}"), None))
            .collect();
        let detector = AbuseDetector::new(&records);
        assert!(detector.detect_bot_behavior().is_empty());
    }

    #[test]
    fn analyze_all_groups_by_type() {
        let mut records = burst("10.0.0.9", 3, 60, 55, 40);
        records.extend(burst("203.0.113.5", 1, 1200, 0, 3));
        let detector = AbuseDetector::new(&records);
        let scan = detector.analyze_all_patterns();
        assert_eq!(scan.brute_force.len(), 1);
        assert_eq!(scan.ddos.len(), 1);
        assert!(scan.scanning.is_empty());
        assert_eq!(scan.total(), scan.iter().count());
    }

    #[test]
    fn top_threats_ordered_by_severity_then_confidence() {
        // 네 규칙이 각각 critical/high/medium/low finding을 하나씩 내도록
        // 합성한 레코드 셋
        let mut records = Vec::new();
        // ddos critical: 5001 requests, 2 paths
        records.extend(burst("1.1.1.1", 0, 5001, 0, 2));
        // brute force high: 100 requests all errors (confidence 1.0)
        records.extend(burst("2.2.2.2", 3, 100, 100, 40));
        // scanning medium: 30 diverse 404s
        for i in 0..30 {
            records.push(record("3.3.3.3", 5, 404, &format!("/probe{i}"), Some("Mozilla/5.0")));
        }
        // bot low: explicit bot agent
        records.push(record("4.4.4.4", 7, 200, "/", Some("Googlebot/2.1")));

        let detector = AbuseDetector::new(&records);
        let threats = detector.get_top_threats(10);

        let severities: Vec<Severity> = threats.iter().map(|p| p.severity).collect();
        assert_eq!(
            severities,
            vec![
                Severity::Critical,
                Severity::High,
                Severity::Medium,
                Severity::Low,
            ]
        );
        // 동률일 때는 확신도 내림차순
        for pair in threats.windows(2) {
            if pair[0].severity == pair[1].severity {
                assert!(pair[0].confidence >= pair[1].confidence);
            }
        }
    }

    #[test]
    fn top_threats_respects_limit() {
        let mut records = burst("10.0.0.9", 3, 60, 55, 40);
        records.extend(burst("203.0.113.5", 1, 1200, 0, 3));
        let detector = AbuseDetector::new(&records);
        assert_eq!(detector.get_top_threats(1).len(), 1);
    }

    #[test]
    fn custom_thresholds_apply() {
        let records = burst("10.0.0.9", 3, 30, 30, 5);
        let config = AbuseConfig {
            min_attempts: 20,
            ..AbuseConfig::default()
        };
        let detector = AbuseDetector::with_config(&records, config);
        assert_eq!(detector.detect_brute_force().len(), 1);
    }

    #[test]
    fn empty_record_set_yields_no_findings() {
        let detector = AbuseDetector::new(&[]);
        let scan = detector.analyze_all_patterns();
        assert_eq!(scan.total(), 0);
    }
}
