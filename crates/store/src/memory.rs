//! 인메모리 쿼리 평가기 -- `QuerySpec`을 레코드 셋 위에서 실행합니다.
//!
//! [`MemoryStore`]는 수집이 끝난 레코드 셋을 읽기 전용으로 보관하며,
//! 필터 → 그룹화 → 집계 → 정렬 → 제한 순서로 쿼리를 평가합니다.
//! 그룹 키는 정렬된 순서(BTreeMap)로 순회되므로 결과가 결정적입니다.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use logwarden_core::error::StoreError;
use logwarden_core::query::{
    Aggregate, AggregateFn, Column, Predicate, QuerySpec, RecordQuery, Row, SortDir, Value,
};
use logwarden_core::types::LogRecord;

use crate::columns::column_value;

/// `f64`에 전순서(total order)를 부여하는 래퍼 — 그룹 키 전용
#[derive(Debug, Clone, PartialEq)]
struct FloatKey(f64);

impl Eq for FloatKey {}

impl PartialOrd for FloatKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FloatKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// 그룹화 키 — `Value`와 달리 전순서(Ord)를 가집니다.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum GroupKey {
    Null,
    Int(i64),
    Float(FloatKey),
    Text(String),
}

impl GroupKey {
    fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Int(i) => Self::Int(*i),
            Value::Float(x) => Self::Float(FloatKey(*x)),
            Value::Text(s) => Self::Text(s.clone()),
        }
    }

    fn into_value(self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Int(i) => Value::Int(i),
            Self::Float(FloatKey(x)) => Value::Float(x),
            Self::Text(s) => Value::Text(s),
        }
    }
}

/// 인메모리 레코드 스토어
///
/// 레코드 셋을 공유 읽기 전용(`Arc`)으로 보관합니다. 쿼리는 레코드를
/// 변경하지 않으며, 동시 읽기에 안전합니다.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    records: Arc<[LogRecord]>,
}

impl MemoryStore {
    /// 수집된 레코드 셋으로 스토어를 생성합니다.
    pub fn new(records: Vec<LogRecord>) -> Self {
        Self {
            records: records.into(),
        }
    }

    /// 레코드 셋 슬라이스를 반환합니다.
    ///
    /// 레코드 셋 위에서 직접 동작하는 탐지기(남용 탐지)가 사용합니다.
    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    fn matches_all(&self, record: &LogRecord, predicates: &[Predicate]) -> bool {
        predicates.iter().all(|p| matches_predicate(record, p))
    }
}

impl RecordQuery for MemoryStore {
    fn query(&self, spec: &QuerySpec) -> Result<Vec<Row>, StoreError> {
        let filtered: Vec<&LogRecord> = self
            .records
            .iter()
            .filter(|r| self.matches_all(r, &spec.predicates))
            .collect();

        // 분모는 주 WHERE와 별개의 술어 집합으로 제한됩니다.
        let denominator = spec.percent_of_total.as_ref().map(|pct| {
            self.records
                .iter()
                .filter(|r| self.matches_all(r, &pct.predicates))
                .count()
        });

        let mut rows = if spec.group_by.is_empty() {
            vec![build_row(&filtered, &[], &[], spec, denominator)?]
        } else {
            let mut groups: BTreeMap<Vec<GroupKey>, Vec<&LogRecord>> = BTreeMap::new();
            for record in filtered.iter().copied() {
                let mut key = Vec::with_capacity(spec.group_by.len());
                for column in &spec.group_by {
                    key.push(GroupKey::from_value(&column_value(record, *column)));
                }
                groups.entry(key).or_default().push(record);
            }

            let mut rows = Vec::with_capacity(groups.len());
            for (key, members) in groups {
                rows.push(build_row(
                    &members,
                    &spec.group_by,
                    &key,
                    spec,
                    denominator,
                )?);
            }
            rows
        };

        if let Some(order) = &spec.order_by {
            rows.sort_by(|a, b| {
                let left = a.get(&order.key).cloned().unwrap_or(Value::Null);
                let right = b.get(&order.key).cloned().unwrap_or(Value::Null);
                let cmp = left.compare(&right);
                match order.dir {
                    SortDir::Asc => cmp,
                    SortDir::Desc => cmp.reverse(),
                }
            });
        }

        if let Some(limit) = spec.limit {
            rows.truncate(limit);
        }

        tracing::debug!(
            filtered = filtered.len(),
            rows = rows.len(),
            groups = ?spec.group_by,
            "query evaluated"
        );

        Ok(rows)
    }

    fn record_count(&self) -> usize {
        self.records.len()
    }
}

fn build_row(
    members: &[&LogRecord],
    group_columns: &[Column],
    key: &[GroupKey],
    spec: &QuerySpec,
    denominator: Option<usize>,
) -> Result<Row, StoreError> {
    let mut row = Row::new();

    for (column, part) in group_columns.iter().zip(key.iter()) {
        row.insert(column.name(), part.clone().into_value());
    }

    for aggregate in &spec.aggregates {
        row.insert(aggregate.alias.clone(), eval_aggregate(members, aggregate)?);
    }

    if let Some(pct) = &spec.percent_of_total {
        let denom = denominator.unwrap_or(0);
        let value = if denom == 0 {
            0.0
        } else {
            members.len() as f64 * 100.0 / denom as f64
        };
        row.insert(pct.alias.clone(), Value::Float(value));
    }

    Ok(row)
}

fn eval_aggregate(members: &[&LogRecord], aggregate: &Aggregate) -> Result<Value, StoreError> {
    Ok(match &aggregate.func {
        AggregateFn::Count => Value::Int(members.len() as i64),

        AggregateFn::CountIf(predicate) => Value::Int(
            members
                .iter()
                .filter(|r| matches_predicate(r, predicate))
                .count() as i64,
        ),

        AggregateFn::CountDistinct(column) => {
            let distinct: BTreeSet<String> = members
                .iter()
                .filter_map(|r| column_value(r, *column).as_text())
                .collect();
            Value::Int(distinct.len() as i64)
        }

        AggregateFn::Min(column) => fold_extreme(members, *column, std::cmp::Ordering::Less),
        AggregateFn::Max(column) => fold_extreme(members, *column, std::cmp::Ordering::Greater),

        AggregateFn::Avg(column) => {
            let values: Vec<f64> = members
                .iter()
                .filter_map(|r| column_value(r, *column).as_f64())
                .collect();
            if values.is_empty() {
                Value::Null
            } else {
                Value::Float(values.iter().sum::<f64>() / values.len() as f64)
            }
        }

        AggregateFn::AvgLength(column) => {
            let lengths: Vec<usize> = members
                .iter()
                .filter_map(|r| column_value(r, *column).as_text())
                .map(|s| s.chars().count())
                .collect();
            if lengths.is_empty() {
                Value::Null
            } else {
                Value::Float(lengths.iter().sum::<usize>() as f64 / lengths.len() as f64)
            }
        }
    })
}

fn fold_extreme(members: &[&LogRecord], column: Column, keep: std::cmp::Ordering) -> Value {
    let mut extreme = Value::Null;
    for record in members {
        let value = column_value(record, column);
        if value.is_null() {
            continue;
        }
        if extreme.is_null() || value.compare(&extreme) == keep {
            extreme = value;
        }
    }
    extreme
}

fn matches_predicate(record: &LogRecord, predicate: &Predicate) -> bool {
    match predicate {
        Predicate::Eq(column, expected) => {
            let value = column_value(record, *column);
            !value.is_null()
                && !expected.is_null()
                && value.compare(expected) == std::cmp::Ordering::Equal
        }
        Predicate::GreaterEq(column, bound) => {
            let value = column_value(record, *column);
            !value.is_null() && value.compare(bound) != std::cmp::Ordering::Less
        }
        Predicate::Greater(column, bound) => {
            let value = column_value(record, *column);
            !value.is_null() && value.compare(bound) == std::cmp::Ordering::Greater
        }
        Predicate::NotNullOrEmpty(column) => match column_value(record, *column) {
            Value::Null => false,
            Value::Text(s) => !s.is_empty(),
            _ => true,
        },
        Predicate::NullOrEmpty(column) => match column_value(record, *column) {
            Value::Null => true,
            Value::Text(s) => s.is_empty(),
            _ => false,
        },
        Predicate::TimestampBetween(start, end) => {
            let ts = record.timestamp.naive_local();
            ts >= *start && ts <= *end
        }
    }
}
