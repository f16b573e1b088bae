//! 규칙 매칭 로직 -- 정규식 컴파일 및 필드 추출
//!
//! [`RuleMatcher`]는 컴파일된 정규식과 함께 규칙 하나를 보관합니다.
//! 정규식은 규칙 로딩 시 한 번만 컴파일합니다.

use std::collections::BTreeMap;

use regex::Regex;

use zdstats_core::types::CandidateEvent;

use super::types::{ClassificationRule, RuleStatus};
use crate::error::EventPipelineError;

/// 컴파일된 규칙
#[derive(Debug, Clone)]
pub struct RuleMatcher {
    rule: ClassificationRule,
    regex: Regex,
    /// 추출 대상 capture group 이름 (규칙에 명시된 순서)
    fields: Vec<String>,
}

impl RuleMatcher {
    /// 규칙을 검증하고 정규식을 컴파일합니다.
    ///
    /// # Errors
    /// - 규칙 기본 검증 실패
    /// - 정규식 문법 오류
    /// - `fields`에 정규식에 없는 capture group 이름이 있는 경우
    pub fn compile(rule: ClassificationRule) -> Result<Self, EventPipelineError> {
        rule.validate()?;

        let regex = Regex::new(&rule.pattern).map_err(|e| EventPipelineError::RuleValidation {
            rule_id: rule.id.clone(),
            reason: format!("invalid pattern: {e}"),
        })?;

        let group_names: Vec<String> = regex.capture_names().flatten().map(str::to_owned).collect();

        let fields = match rule.fields {
            Some(ref fields) => {
                if let Some(missing) = fields.iter().find(|f| !group_names.contains(f)) {
                    return Err(EventPipelineError::RuleValidation {
                        rule_id: rule.id.clone(),
                        reason: format!("field '{missing}' is not a named group in the pattern"),
                    });
                }
                fields.clone()
            }
            None => group_names,
        };

        Ok(Self {
            rule,
            regex,
            fields,
        })
    }

    /// 원본 규칙
    pub fn rule(&self) -> &ClassificationRule {
        &self.rule
    }

    /// 규칙 ID
    pub fn id(&self) -> &str {
        &self.rule.id
    }

    /// 활성화 여부
    pub fn is_enabled(&self) -> bool {
        self.rule.status == RuleStatus::Enabled
    }

    /// 라인에 규칙을 적용합니다.
    ///
    /// 매칭되면 상수 필드 위에 캡처 값을 덮어써서 후보 이벤트를 만듭니다.
    /// 매칭에 참여하지 않은 optional group은 결과에서 빠집니다.
    pub fn apply(&self, line: &str) -> Option<CandidateEvent> {
        let caps = self.regex.captures(line)?;

        let mut data: BTreeMap<String, String> = self.rule.constants.clone();
        for name in &self.fields {
            if let Some(m) = caps.name(name) {
                data.insert(name.clone(), m.as_str().to_owned());
            }
        }

        Some(CandidateEvent {
            category: self.rule.category,
            event_type: self.rule.event_type.clone(),
            data,
        })
    }
}
