//! 분류 규칙 데이터 타입
//!
//! YAML 규칙 파일에서 역직렬화되는 구조체들을 정의합니다.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use zdstats_core::types::Category;

use crate::error::EventPipelineError;

/// 규칙 ID 최대 길이
const MAX_RULE_ID_LEN: usize = 256;

/// 분류 규칙 -- 라인 형태 하나를 (category, type, 필드 추출)로 매핑합니다.
///
/// # YAML 스키마
/// ```yaml
/// id: frag_bfg
/// category: frag
/// type: frag
/// pattern: '^(?P<fraggee>.+?) was splintered by (?P<fragger>.+)''s BFG\.$'
/// fields: [fraggee, fragger]   # 생략 시 모든 named group 추출
/// constants:
///   weapon: bfg
/// status: enabled
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationRule {
    /// 규칙 고유 ID (룰셋 내에서 유일해야 함)
    pub id: String,
    /// 이벤트 카테고리
    pub category: Category,
    /// 이벤트 세부 타입
    #[serde(rename = "type")]
    pub event_type: String,
    /// 라인 전체에 적용할 정규식
    pub pattern: String,
    /// 추출할 named capture group 목록. `None`이면 전부 추출
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
    /// 고정 필드 (캡처 값과 키가 겹치면 캡처 값 우선)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub constants: BTreeMap<String, String>,
    /// 규칙 상태
    #[serde(default)]
    pub status: RuleStatus,
    /// 규칙 설명
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl ClassificationRule {
    /// 정규식 컴파일 전에 확인 가능한 항목을 검증합니다.
    ///
    /// 정규식 문법과 `fields`가 실제 capture group인지는
    /// [`RuleMatcher::compile`](super::matcher::RuleMatcher::compile)에서 검증합니다.
    pub fn validate(&self) -> Result<(), EventPipelineError> {
        if self.id.is_empty() {
            return Err(EventPipelineError::RuleValidation {
                rule_id: "(empty)".to_owned(),
                reason: "rule id must not be empty".to_owned(),
            });
        }

        if self.id.len() > MAX_RULE_ID_LEN {
            return Err(EventPipelineError::RuleValidation {
                rule_id: self.id.clone(),
                reason: format!("rule id must not exceed {MAX_RULE_ID_LEN} characters"),
            });
        }

        if self.event_type.is_empty() {
            return Err(EventPipelineError::RuleValidation {
                rule_id: self.id.clone(),
                reason: "rule type must not be empty".to_owned(),
            });
        }

        if self.pattern.is_empty() {
            return Err(EventPipelineError::RuleValidation {
                rule_id: self.id.clone(),
                reason: "rule pattern must not be empty".to_owned(),
            });
        }

        if let Some(ref fields) = self.fields {
            if fields.iter().any(String::is_empty) {
                return Err(EventPipelineError::RuleValidation {
                    rule_id: self.id.clone(),
                    reason: "field names must not be empty".to_owned(),
                });
            }
        }

        Ok(())
    }
}

/// 규칙 상태
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleStatus {
    /// 활성화 (기본값)
    #[default]
    Enabled,
    /// 비활성화 (매칭 대상에서 제외)
    Disabled,
}

/// 규칙 문서 -- YAML 파일 하나에 대응합니다.
///
/// 규칙 순서가 곧 우선순위입니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleDocument {
    /// 우선순위 순서의 규칙 목록
    #[serde(default)]
    pub rules: Vec<ClassificationRule>,
}
