//! 탐지 규칙 모듈 -- 남용 탐지와 이상 탐지
//!
//! - [`abuse`]: 레코드 셋 위에서 직접 동작하는 고정 임계값 규칙 4종
//! - [`anomaly`]: 쿼리 경계를 통해 동작하는 서브 규칙 6종과 부분 실패
//!   보고

pub mod abuse;
pub mod anomaly;

pub use abuse::{AbuseDetector, AbuseScan};
pub use anomaly::{AnomalyDetector, DegradedRule, DetectionReport, SecuritySummary};
