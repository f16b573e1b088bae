//! 분류 규칙 엔진 -- YAML 기반 로그 라인 분류
//!
//! 순서가 있는 규칙 목록을 로드하여 라인 하나를 [`CandidateEvent`]로 분류합니다.
//! 위에서부터 평가하며 처음 매칭된 활성 규칙이 결과를 결정합니다.
//!
//! # 규칙 형식
//! ```yaml
//! rules:
//!   - id: map_change
//!     category: command
//!     type: map_change
//!     pattern: '^MAP: CHANGED to (?P<map>\S+)$'
//!   - id: frag_bfg
//!     category: frag
//!     type: frag
//!     pattern: '^(?P<fraggee>.+?) was splintered by (?P<fragger>.+)''s BFG\.$'
//!     constants:
//!       weapon: bfg
//! ```
//!
//! # 아키텍처
//! - [`RuleSet`]: 컴파일된 규칙 목록, [`LineClassifier`] 구현체
//! - [`loader`]: YAML 파일 로딩 및 유효성 검증
//! - [`matcher`]: 정규식 컴파일 및 필드 추출
//! - [`types`]: 규칙 데이터 구조 정의

pub mod loader;
pub mod matcher;
pub mod types;

pub use loader::RuleLoader;
pub use matcher::RuleMatcher;
pub use types::{ClassificationRule, RuleDocument, RuleStatus};

use std::collections::HashSet;
use std::path::Path;

use zdstats_core::pipeline::LineClassifier;
use zdstats_core::types::CandidateEvent;

use crate::error::EventPipelineError;

/// 내장 ZDaemon 클라이언트 규칙 (YAML 원문)
pub const BUILTIN_RULES_YAML: &str = include_str!("../../rules/zdaemon_client.yml");

/// 내장 규칙의 출처 표기
const BUILTIN_SOURCE: &str = "<builtin:zdaemon_client.yml>";

/// 분류 규칙 집합
///
/// 규칙은 로딩 시 한 번 컴파일되고 이후 읽기 전용입니다.
/// 라인 간 상태가 없으므로 여러 태스크에서 공유해도 됩니다.
///
/// # 사용 예시
/// ```ignore
/// let rules = RuleSet::load("/etc/zdstats/rules").await?;
/// if let Some(candidate) = rules.classify("MAP: CHANGED to MAP02") {
///     // ...
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    matchers: Vec<RuleMatcher>,
}

impl RuleSet {
    /// 빈 규칙 집합을 생성합니다. 모든 라인이 분류되지 않습니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 규칙 목록을 순서대로 컴파일합니다.
    ///
    /// # Errors
    /// - 규칙 검증 또는 정규식 컴파일 실패
    /// - 중복 규칙 ID
    pub fn from_rules(
        rules: impl IntoIterator<Item = ClassificationRule>,
    ) -> Result<Self, EventPipelineError> {
        let mut set = Self::new();
        for rule in rules {
            set.add_rule(rule)?;
        }
        Ok(set)
    }

    /// 내장 ZDaemon 클라이언트 규칙 집합
    pub fn builtin() -> Result<Self, EventPipelineError> {
        Self::from_yaml(BUILTIN_RULES_YAML, BUILTIN_SOURCE)
    }

    /// YAML 문자열에서 규칙 집합을 생성합니다.
    pub fn from_yaml(yaml: &str, source: &str) -> Result<Self, EventPipelineError> {
        Self::from_rules(RuleLoader::parse_yaml(yaml, source)?)
    }

    /// 파일 또는 디렉토리에서 규칙 집합을 로드합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, EventPipelineError> {
        let set = Self::from_rules(RuleLoader::load_path(path.as_ref()).await?)?;
        tracing::info!(
            path = %path.as_ref().display(),
            rules = set.rule_count(),
            enabled = set.enabled_count(),
            "rule set ready"
        );
        Ok(set)
    }

    /// 경로가 주어지면 [`load`](Self::load), 아니면 [`builtin`](Self::builtin)
    pub async fn load_or_builtin(path: Option<&Path>) -> Result<Self, EventPipelineError> {
        match path {
            Some(path) => Self::load(path).await,
            None => {
                let set = Self::builtin()?;
                tracing::info!(rules = set.rule_count(), "using builtin rule set");
                Ok(set)
            }
        }
    }

    /// 규칙을 가장 낮은 우선순위로 추가합니다.
    pub fn add_rule(&mut self, rule: ClassificationRule) -> Result<(), EventPipelineError> {
        if self.matchers.iter().any(|m| m.id() == rule.id) {
            return Err(EventPipelineError::RuleValidation {
                rule_id: rule.id,
                reason: "duplicate rule id".to_owned(),
            });
        }
        self.matchers.push(RuleMatcher::compile(rule)?);
        Ok(())
    }

    /// 현재 로드된 규칙 수를 반환합니다.
    pub fn rule_count(&self) -> usize {
        self.matchers.len()
    }

    /// 활성 규칙 수를 반환합니다.
    pub fn enabled_count(&self) -> usize {
        self.matchers.iter().filter(|m| m.is_enabled()).count()
    }

    /// 우선순위 순서의 규칙 목록
    pub fn rules(&self) -> impl Iterator<Item = &ClassificationRule> {
        self.matchers.iter().map(RuleMatcher::rule)
    }

    /// 라인을 분류합니다. 매칭된 규칙 ID도 함께 반환합니다.
    pub fn classify_with_rule(&self, line: &str) -> Option<(&str, CandidateEvent)> {
        self.matchers
            .iter()
            .filter(|m| m.is_enabled())
            .find_map(|m| m.apply(line).map(|candidate| (m.id(), candidate)))
    }

    /// 라인을 분류합니다. 매칭되는 활성 규칙이 없으면 `None`
    pub fn classify(&self, line: &str) -> Option<CandidateEvent> {
        self.classify_with_rule(line).map(|(_, candidate)| candidate)
    }

    /// 한 번도 참조되지 않을 중복 패턴이 있는지 확인합니다.
    ///
    /// 같은 정규식을 가진 활성 규칙이 둘 이상이면 뒤쪽 규칙 ID 목록을 반환합니다.
    pub fn shadowed_rules(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.matchers
            .iter()
            .filter(|m| m.is_enabled())
            .filter(|m| !seen.insert(m.rule().pattern.as_str()))
            .map(RuleMatcher::id)
            .collect()
    }
}

/// core의 [`LineClassifier`] trait을 RuleSet에 대해 구현합니다.
impl LineClassifier for RuleSet {
    fn name(&self) -> &str {
        "yaml-rule-set"
    }

    fn classify(&self, line: &str) -> Option<CandidateEvent> {
        RuleSet::classify(self, line)
    }
}
