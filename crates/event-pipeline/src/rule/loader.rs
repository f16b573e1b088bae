//! 규칙 파일 로더 -- YAML 규칙 파일을 디스크에서 로드합니다.
//!
//! 규칙 디렉토리 내의 `.yml`/`.yaml` 파일을 파일명 순서로 스캔하고 파싱합니다.
//! 파일 간 순서가 곧 규칙 우선순위이므로 디렉토리 순회 결과를 정렬합니다.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::EventPipelineError;

use super::types::{ClassificationRule, RuleDocument};

/// 규칙 파일 로더 설정
const MAX_RULE_FILE_SIZE: u64 = 10 * 1024 * 1024; // 10MB
const MAX_RULES_COUNT: usize = 10_000;

/// 규칙 파일 로더
pub struct RuleLoader;

impl RuleLoader {
    /// 경로가 디렉토리면 [`load_directory`](Self::load_directory),
    /// 파일이면 [`load_file`](Self::load_file)을 호출합니다.
    pub async fn load_path(
        path: impl AsRef<Path>,
    ) -> Result<Vec<ClassificationRule>, EventPipelineError> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| EventPipelineError::RuleLoad {
                path: path.display().to_string(),
                reason: format!("failed to read metadata: {e}"),
            })?;

        if metadata.is_dir() {
            Self::load_directory(path).await
        } else {
            Self::load_file(path).await
        }
    }

    /// 디렉토리에서 모든 YAML 규칙 파일을 로드합니다.
    ///
    /// `.yml` 또는 `.yaml` 확장자를 가진 파일만 파일명 순서로 처리합니다.
    /// 개별 파일 로딩 실패와 앞선 파일과 겹치는 규칙 ID는 경고 로그를 남기고 건너뜁니다.
    ///
    /// # Errors
    /// - 디렉토리를 읽을 수 없는 경우
    /// - 규칙 수가 `MAX_RULES_COUNT`를 초과하는 경우
    pub async fn load_directory(
        dir: impl AsRef<Path>,
    ) -> Result<Vec<ClassificationRule>, EventPipelineError> {
        let dir = dir.as_ref();

        let paths = Self::yaml_files(dir).await?;

        let mut rules = Vec::new();
        let mut seen_ids = HashSet::new();

        for path in &paths {
            let loaded = match Self::load_file(path).await {
                Ok(loaded) => loaded,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "failed to load rule file, skipping"
                    );
                    continue;
                }
            };

            for rule in loaded {
                // 중복 ID 검사
                if !seen_ids.insert(rule.id.clone()) {
                    tracing::warn!(
                        rule_id = %rule.id,
                        path = %path.display(),
                        "duplicate rule id, skipping"
                    );
                    continue;
                }
                rules.push(rule);
            }

            if rules.len() > MAX_RULES_COUNT {
                return Err(EventPipelineError::RuleLoad {
                    path: dir.display().to_string(),
                    reason: format!("too many rules: max {MAX_RULES_COUNT}"),
                });
            }
        }

        tracing::info!(
            dir = %dir.display(),
            files = paths.len(),
            count = rules.len(),
            "loaded classification rules"
        );

        Ok(rules)
    }

    /// 경로에서 로드될 규칙 파일 목록을 로드 순서대로 반환합니다.
    ///
    /// 파일이면 그 파일 하나, 디렉토리면 `.yml`/`.yaml` 파일을 파일명 순서로 반환합니다.
    pub async fn rule_files(path: impl AsRef<Path>) -> Result<Vec<PathBuf>, EventPipelineError> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| EventPipelineError::RuleLoad {
                path: path.display().to_string(),
                reason: format!("failed to read metadata: {e}"),
            })?;

        if metadata.is_dir() {
            Self::yaml_files(path).await
        } else {
            Ok(vec![path.to_path_buf()])
        }
    }

    /// 디렉토리의 `.yml`/`.yaml` 파일을 파일명 순서로 나열합니다.
    async fn yaml_files(dir: &Path) -> Result<Vec<PathBuf>, EventPipelineError> {
        let mut entries =
            tokio::fs::read_dir(dir)
                .await
                .map_err(|e| EventPipelineError::RuleLoad {
                    path: dir.display().to_string(),
                    reason: format!("failed to read directory: {e}"),
                })?;

        let mut paths: Vec<PathBuf> = Vec::new();
        while let Some(entry) =
            entries
                .next_entry()
                .await
                .map_err(|e| EventPipelineError::RuleLoad {
                    path: dir.display().to_string(),
                    reason: format!("failed to read directory entry: {e}"),
                })?
        {
            let path = entry.path();

            // .yml / .yaml 확장자만 처리
            let is_yaml = path
                .extension()
                .is_some_and(|ext| ext == "yml" || ext == "yaml");

            if is_yaml {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// 단일 YAML 파일에서 규칙 목록을 로드합니다.
    pub async fn load_file(
        path: impl AsRef<Path>,
    ) -> Result<Vec<ClassificationRule>, EventPipelineError> {
        let path = path.as_ref();

        // 파일 크기 검증
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| EventPipelineError::RuleLoad {
                path: path.display().to_string(),
                reason: format!("failed to read file metadata: {e}"),
            })?;

        if metadata.len() > MAX_RULE_FILE_SIZE {
            return Err(EventPipelineError::RuleLoad {
                path: path.display().to_string(),
                reason: format!(
                    "file too large: {} bytes (max: {MAX_RULE_FILE_SIZE})",
                    metadata.len()
                ),
            });
        }

        let content =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|e| EventPipelineError::RuleLoad {
                    path: path.display().to_string(),
                    reason: format!("failed to read file: {e}"),
                })?;

        let rules = Self::parse_yaml(&content, &path.display().to_string())?;
        tracing::debug!(path = %path.display(), count = rules.len(), "parsed rule file");
        Ok(rules)
    }

    /// YAML 문자열을 파싱하여 규칙 목록을 생성합니다.
    ///
    /// 각 규칙의 기본 검증과 파일 내 중복 ID 검사를 수행합니다.
    pub fn parse_yaml(
        yaml_str: &str,
        source: &str,
    ) -> Result<Vec<ClassificationRule>, EventPipelineError> {
        let doc: RuleDocument =
            serde_yaml::from_str(yaml_str).map_err(|e| EventPipelineError::RuleLoad {
                path: source.to_owned(),
                reason: format!("YAML parse error: {e}"),
            })?;

        if doc.rules.len() > MAX_RULES_COUNT {
            return Err(EventPipelineError::RuleLoad {
                path: source.to_owned(),
                reason: format!("too many rules: max {MAX_RULES_COUNT}"),
            });
        }

        let mut seen_ids = HashSet::new();
        for rule in &doc.rules {
            rule.validate()?;
            if !seen_ids.insert(rule.id.as_str()) {
                return Err(EventPipelineError::RuleLoad {
                    path: source.to_owned(),
                    reason: format!("duplicate rule id '{}'", rule.id),
                });
            }
        }

        Ok(doc.rules)
    }
}
