//! `zdstats rules` command handler

use std::collections::HashSet;
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use zdstats_core::config::ZdstatsConfig;
use zdstats_core::types::CandidateEvent;
use zdstats_event_pipeline::filter;
use zdstats_event_pipeline::rule::{
    ClassificationRule, RuleLoader, RuleMatcher, RuleSet, RuleStatus,
};

use crate::cli::{RulesAction, RulesArgs};
use crate::commands::rules_path;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Label used in reports for the embedded rule set.
const BUILTIN_LABEL: &str = "<builtin>";

/// Execute the `rules` command.
pub async fn execute(
    args: RulesArgs,
    config: &ZdstatsConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        RulesAction::Validate { path } => {
            let report = validate(rules_path(path, config).as_deref()).await?;
            writer.render(&report)?;
            if report.invalid > 0 {
                return Err(CliError::Rule(format!(
                    "{} invalid rule file(s)",
                    report.invalid
                )));
            }
            Ok(())
        }
        RulesAction::List { path, status } => {
            let report = list(rules_path(path, config).as_deref(), status.as_deref()).await?;
            writer.render(&report)?;
            Ok(())
        }
        RulesAction::Test { line, rules } => {
            let report = test_line(rules_path(rules, config).as_deref(), &line).await?;
            writer.render(&report)?;
            Ok(())
        }
    }
}

fn status_label(status: RuleStatus) -> &'static str {
    match status {
        RuleStatus::Enabled => "enabled",
        RuleStatus::Disabled => "disabled",
    }
}

fn source_label(path: Option<&Path>) -> String {
    path.map_or_else(|| BUILTIN_LABEL.to_owned(), |p| p.display().to_string())
}

// ---- validate ----

/// Check every rule file under `path` independently.
///
/// Unlike loading for a run, which skips broken files, every problem is reported.
async fn validate(path: Option<&Path>) -> Result<RuleValidationReport, CliError> {
    info!(path = %source_label(path), "validating classification rules");

    let files = match path {
        Some(path) => RuleLoader::rule_files(path).await?,
        None => Vec::new(),
    };

    let mut report = RuleValidationReport {
        path: source_label(path),
        total_files: 0,
        valid: 0,
        invalid: 0,
        rules: 0,
        errors: Vec::new(),
        shadowed: Vec::new(),
    };

    let mut accepted = Vec::new();
    let mut seen_ids = HashSet::new();

    if path.is_none() {
        report.total_files = 1;
        let rules = RuleLoader::parse_yaml(
            zdstats_event_pipeline::rule::BUILTIN_RULES_YAML,
            BUILTIN_LABEL,
        )?;
        check_file(BUILTIN_LABEL, rules, &mut seen_ids, &mut accepted, &mut report);
    }

    for file in &files {
        report.total_files += 1;
        let label = file.display().to_string();
        match RuleLoader::load_file(file).await {
            Ok(rules) => check_file(&label, rules, &mut seen_ids, &mut accepted, &mut report),
            Err(e) => {
                report.invalid += 1;
                report.errors.push(RuleError {
                    file: label,
                    error: e.to_string(),
                });
            }
        }
    }

    report.rules = accepted.len();
    if let Ok(set) = RuleSet::from_rules(accepted) {
        report.shadowed = set.shadowed_rules().into_iter().map(str::to_owned).collect();
    }

    Ok(report)
}

/// Compile each rule of one file; the file counts as invalid if any rule fails.
fn check_file(
    label: &str,
    rules: Vec<ClassificationRule>,
    seen_ids: &mut HashSet<String>,
    accepted: &mut Vec<ClassificationRule>,
    report: &mut RuleValidationReport,
) {
    let mut file_ok = true;
    for rule in rules {
        if seen_ids.contains(&rule.id) {
            file_ok = false;
            report.errors.push(RuleError {
                file: label.to_owned(),
                error: format!("rule '{}' duplicates an id from an earlier file", rule.id),
            });
            continue;
        }
        match RuleMatcher::compile(rule.clone()) {
            Ok(_) => {
                seen_ids.insert(rule.id.clone());
                accepted.push(rule);
            }
            Err(e) => {
                file_ok = false;
                report.errors.push(RuleError {
                    file: label.to_owned(),
                    error: e.to_string(),
                });
            }
        }
    }

    if file_ok {
        report.valid += 1;
    } else {
        report.invalid += 1;
    }
}

#[derive(Serialize)]
pub struct RuleValidationReport {
    pub path: String,
    pub total_files: usize,
    pub valid: usize,
    pub invalid: usize,
    pub rules: usize,
    pub errors: Vec<RuleError>,
    /// Enabled rules whose pattern repeats an earlier rule and can never match.
    pub shadowed: Vec<String>,
}

#[derive(Serialize)]
pub struct RuleError {
    pub file: String,
    pub error: String,
}

impl Render for RuleValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Rule Validation: {}", self.path.bold())?;
        writeln!(
            w,
            "  Files: {} total, {} valid, {} invalid",
            self.total_files,
            self.valid.to_string().green(),
            if self.invalid > 0 {
                self.invalid.to_string().red()
            } else {
                self.invalid.to_string().normal()
            }
        )?;
        writeln!(w, "  Rules: {}", self.rules)?;

        if !self.shadowed.is_empty() {
            writeln!(
                w,
                "  {} {}",
                "Shadowed:".yellow(),
                self.shadowed.join(", ")
            )?;
        }

        if !self.errors.is_empty() {
            writeln!(w)?;
            writeln!(w, "Errors:")?;
            for e in &self.errors {
                writeln!(w, "  {}: {}", e.file.red(), e.error)?;
            }
        }

        Ok(())
    }
}

// ---- list ----

async fn list(path: Option<&Path>, status_filter: Option<&str>) -> Result<RuleListReport, CliError> {
    if let Some(filter) = status_filter {
        if filter != "enabled" && filter != "disabled" {
            return Err(CliError::Command(format!(
                "unknown status filter: {filter} (expected: enabled, disabled)"
            )));
        }
    }

    let set = RuleSet::load_or_builtin(path).await?;
    let rules: Vec<RuleEntry> = set
        .rules()
        .enumerate()
        .filter(|(_, r)| status_filter.is_none_or(|f| status_label(r.status) == f))
        .map(|(idx, r)| RuleEntry {
            priority: idx + 1,
            id: r.id.clone(),
            category: r.category.as_str().to_owned(),
            event_type: r.event_type.clone(),
            status: status_label(r.status).to_owned(),
            description: r.description.clone(),
        })
        .collect();

    Ok(RuleListReport {
        source: source_label(path),
        total: rules.len(),
        rules,
    })
}

#[derive(Serialize)]
pub struct RuleListReport {
    pub source: String,
    pub total: usize,
    pub rules: Vec<RuleEntry>,
}

#[derive(Serialize)]
pub struct RuleEntry {
    pub priority: usize,
    pub id: String,
    pub category: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub status: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl Render for RuleListReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(
            w,
            "Classification Rules ({} total, source: {})",
            self.total.to_string().bold(),
            self.source
        )?;
        writeln!(w)?;
        writeln!(
            w,
            "{:<4} {:<24} {:<12} {:<18} Status",
            "#", "ID", "Category", "Type"
        )?;
        writeln!(w, "{}", "-".repeat(70))?;

        for r in &self.rules {
            let status_colored = match r.status.as_str() {
                "enabled" => r.status.green(),
                "disabled" => r.status.yellow(),
                _ => r.status.normal(),
            };

            writeln!(
                w,
                "{:<4} {:<24} {:<12} {:<18} {}",
                r.priority, r.id, r.category, r.event_type, status_colored
            )?;
        }

        Ok(())
    }
}

// ---- test ----

async fn test_line(path: Option<&Path>, line: &str) -> Result<RuleTestReport, CliError> {
    let set = RuleSet::load_or_builtin(path).await?;
    Ok(RuleTestReport::from_match(line, set.classify_with_rule(line)))
}

#[derive(Serialize)]
pub struct RuleTestReport {
    pub line: String,
    pub matched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<CandidateView>,
    /// Whether the event would be written to the stream.
    pub retained: bool,
}

/// A classified line before it receives a timestamp.
#[derive(Serialize)]
pub struct CandidateView {
    #[serde(rename = "type")]
    pub event_type: String,
    pub category: String,
    pub data: std::collections::BTreeMap<String, String>,
}

impl RuleTestReport {
    fn from_match(line: &str, matched: Option<(&str, CandidateEvent)>) -> Self {
        match matched {
            Some((rule_id, candidate)) => Self {
                line: line.to_owned(),
                matched: true,
                rule_id: Some(rule_id.to_owned()),
                retained: filter::retain(&candidate),
                event: Some(CandidateView {
                    event_type: candidate.event_type,
                    category: candidate.category.as_str().to_owned(),
                    data: candidate.data,
                }),
            },
            None => Self {
                line: line.to_owned(),
                matched: false,
                rule_id: None,
                event: None,
                retained: false,
            },
        }
    }
}

impl Render for RuleTestReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Line: {}", self.line)?;
        let (Some(rule_id), Some(event)) = (&self.rule_id, &self.event) else {
            writeln!(w, "  {}", "no rule matched".yellow())?;
            return Ok(());
        };

        writeln!(w, "  Rule:     {}", rule_id.bold())?;
        writeln!(w, "  Event:    {}/{}", event.category, event.event_type)?;
        for (key, value) in &event.data {
            writeln!(w, "    {key} = {value}")?;
        }
        let verdict = if self.retained {
            "retained".green()
        } else {
            "dropped".red()
        };
        writeln!(w, "  Filter:   {verdict}")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render_text(report: &impl Render) -> String {
        let mut buffer = Vec::new();
        report.render_text(&mut buffer).expect("render");
        String::from_utf8(buffer).expect("valid UTF-8")
    }

    #[tokio::test]
    async fn test_map_change_is_retained() {
        let report = test_line(None, "MAP: CHANGED to MAP02").await.expect("test");
        assert!(report.matched);
        assert!(report.retained);
        assert_eq!(report.rule_id.as_deref(), Some("map_change"));
        let event = report.event.as_ref().expect("event");
        assert_eq!(event.category, "command");
        assert_eq!(event.data["map"], "MAP02");
    }

    #[tokio::test]
    async fn test_say_echo_is_dropped() {
        let report = test_line(None, "CMD: say hello").await.expect("test");
        assert!(report.matched);
        assert!(!report.retained);
        assert!(render_text(&report).contains("dropped"));
    }

    #[tokio::test]
    async fn test_unmatched_line() {
        let report = test_line(None, "R_Init: video mode set").await.expect("test");
        assert!(!report.matched);
        assert!(!report.retained);

        let json = serde_json::to_value(&report).expect("serialize");
        assert!(json.get("event").is_none());
        assert!(render_text(&report).contains("no rule matched"));
    }

    #[tokio::test]
    async fn test_builtin_rules_validate_cleanly() {
        let report = validate(None).await.expect("validate");
        assert_eq!(report.path, BUILTIN_LABEL);
        assert_eq!(report.invalid, 0);
        assert!(report.rules > 30);
        assert!(report.errors.is_empty());
    }

    #[tokio::test]
    async fn test_validate_reports_each_broken_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("01-good.yml"),
            "rules:\n  - id: vote\n    category: game\n    type: vote\n    pattern: '^(?P<player>\\S+) called a vote$'\n",
        )
        .expect("write");
        std::fs::write(
            dir.path().join("02-regex.yml"),
            "rules:\n  - id: broken\n    category: game\n    type: x\n    pattern: '(unclosed'\n",
        )
        .expect("write");
        std::fs::write(
            dir.path().join("03-dup.yaml"),
            "rules:\n  - id: vote\n    category: game\n    type: vote\n    pattern: '^vote$'\n",
        )
        .expect("write");
        std::fs::write(dir.path().join("04-yaml.yml"), "rules: [").expect("write");
        std::fs::write(dir.path().join("notes.txt"), "ignored").expect("write");

        let report = validate(Some(dir.path())).await.expect("validate");
        assert_eq!(report.total_files, 4);
        assert_eq!(report.valid, 1);
        assert_eq!(report.invalid, 3);
        assert_eq!(report.rules, 1);
        assert_eq!(report.errors.len(), 3);
        assert!(report.errors[1].error.contains("earlier file"));
    }

    #[tokio::test]
    async fn test_validate_flags_shadowed_rules() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("rules.yml");
        std::fs::write(
            &path,
            "rules:\n  - id: a\n    category: game\n    type: x\n    pattern: '^x$'\n  - id: b\n    category: game\n    type: y\n    pattern: '^x$'\n",
        )
        .expect("write");

        let report = validate(Some(&path)).await.expect("validate");
        assert_eq!(report.invalid, 0);
        assert_eq!(report.shadowed, vec!["b".to_owned()]);
    }

    #[tokio::test]
    async fn test_list_builtin_in_priority_order() {
        let report = list(None, None).await.expect("list");
        assert_eq!(report.source, BUILTIN_LABEL);
        assert_eq!(report.rules[0].priority, 1);
        assert_eq!(report.rules[0].id, "map_change");
        assert_eq!(report.total, report.rules.len());

        let text = render_text(&report);
        assert!(text.contains("Classification Rules"));
        assert!(text.contains("frag_bfg"));
    }

    #[tokio::test]
    async fn test_list_status_filter() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("rules.yml");
        std::fs::write(
            &path,
            "rules:\n  - id: on\n    category: game\n    type: x\n    pattern: '^x$'\n  - id: off\n    category: game\n    type: y\n    pattern: '^y$'\n    status: disabled\n",
        )
        .expect("write");

        let report = list(Some(&path), Some("disabled")).await.expect("list");
        assert_eq!(report.total, 1);
        assert_eq!(report.rules[0].id, "off");
        assert_eq!(report.rules[0].priority, 2);

        assert!(list(Some(&path), Some("test")).await.is_err());
    }
}
