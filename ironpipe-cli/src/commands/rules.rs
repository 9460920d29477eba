//! `ironpipe rules` command handler

use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use ironpipe_core::config::IronpipeConfig;
use ironpipe_processor::{RecordLoader, RuleParser, YamlRuleParser};

use crate::cli::{RulesAction, RulesArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `rules` command.
pub async fn execute(
    args: RulesArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        RulesAction::List { rules_dir } => {
            let rules_dir = match rules_dir {
                Some(dir) => dir,
                None => PathBuf::from(IronpipeConfig::load(config_path).await?.sources.rules_dir),
            };
            let report = list_rules(&rules_dir).await?;
            writer.render(&report)
        }
        RulesAction::Validate {
            path,
            pipelines_dir,
        } => {
            let (rules_dir, pipelines_dir) = match path {
                Some(dir) => (dir, pipelines_dir),
                None => {
                    let config = IronpipeConfig::load(config_path).await?;
                    let pipelines_dir = pipelines_dir
                        .unwrap_or_else(|| PathBuf::from(&config.sources.pipelines_dir));
                    (PathBuf::from(config.sources.rules_dir), Some(pipelines_dir))
                }
            };

            let report = validate_sources(&rules_dir, pipelines_dir.as_deref()).await?;
            writer.render(&report)?;

            let invalid = report.rules.invalid + report.pipelines.invalid;
            if invalid > 0 {
                return Err(CliError::Rule(format!("{invalid} invalid sources")));
            }
            Ok(())
        }
    }
}

/// Load every rule file in `rules_dir` and report whether it parses.
pub async fn list_rules(rules_dir: &Path) -> Result<RuleListReport, CliError> {
    info!(rules_dir = %rules_dir.display(), "listing rules");

    let parser = YamlRuleParser::new();
    let records = RecordLoader::load_rules(rules_dir).await?;

    let rules: Vec<RuleEntry> = records
        .into_iter()
        .map(|record| {
            let parsed = parser.parse_rule(&record.id, &record.source);
            RuleEntry {
                name: parsed.as_ref().ok().map(|rule| rule.name().to_owned()),
                status: if parsed.is_ok() { "valid" } else { "invalid" }.to_owned(),
                modified_at: record.modified_at.map(|t| t.to_rfc3339()),
                id: record.id,
            }
        })
        .collect();

    Ok(RuleListReport {
        rules_dir: rules_dir.display().to_string(),
        total: rules.len(),
        rules,
    })
}

/// Parse every rule (and optionally pipeline) source and collect diagnostics.
///
/// Pipelines referencing a rule name that no valid rule declares produce a
/// warning, since the engine replaces such references with a rule that never
/// matches.
pub async fn validate_sources(
    rules_dir: &Path,
    pipelines_dir: Option<&Path>,
) -> Result<RuleValidationReport, CliError> {
    info!(rules_dir = %rules_dir.display(), "validating rule sources");

    let parser = YamlRuleParser::new();
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let rule_records = RecordLoader::load_rules(rules_dir).await?;
    let mut rule_names = BTreeSet::new();
    let mut rules = SourceSummary::default();
    for record in &rule_records {
        rules.total += 1;
        match parser.parse_rule(&record.id, &record.source) {
            Ok(rule) => {
                rules.valid += 1;
                if !rule_names.insert(rule.name().to_owned()) {
                    warnings.push(format!(
                        "rule '{}' declares a name already used by another rule",
                        record.id
                    ));
                }
            }
            Err(e) => {
                rules.invalid += 1;
                errors.extend(e.errors.into_iter().map(|error| SourceError {
                    kind: "rule".to_owned(),
                    id: record.id.clone(),
                    error,
                }));
            }
        }
    }

    let mut pipelines = SourceSummary::default();
    if let Some(dir) = pipelines_dir {
        info!(pipelines_dir = %dir.display(), "validating pipeline sources");
        for record in RecordLoader::load_pipelines(dir).await? {
            pipelines.total += 1;
            match parser.parse_pipeline(&record.id, &record.source) {
                Ok(pipeline) => {
                    pipelines.valid += 1;
                    for stage in pipeline.stages() {
                        for reference in stage.rule_references() {
                            if !rule_names.contains(reference) {
                                warnings.push(format!(
                                    "pipeline '{}' stage {} references unknown rule '{}'",
                                    record.id,
                                    stage.stage(),
                                    reference
                                ));
                            }
                        }
                    }
                }
                Err(e) => {
                    pipelines.invalid += 1;
                    errors.extend(e.errors.into_iter().map(|error| SourceError {
                        kind: "pipeline".to_owned(),
                        id: record.id.clone(),
                        error,
                    }));
                }
            }
        }
    }

    Ok(RuleValidationReport {
        rules_dir: rules_dir.display().to_string(),
        pipelines_dir: pipelines_dir.map(|dir| dir.display().to_string()),
        rules,
        pipelines,
        errors,
        warnings,
    })
}

#[derive(Serialize)]
pub struct RuleListReport {
    pub rules_dir: String,
    pub total: usize,
    pub rules: Vec<RuleEntry>,
}

#[derive(Serialize)]
pub struct RuleEntry {
    pub id: String,
    pub name: Option<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<String>,
}

impl Render for RuleListReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(
            w,
            "Rules in {} ({} total)",
            self.rules_dir.bold(),
            self.total.to_string().bold()
        )?;
        writeln!(w)?;
        writeln!(w, "{:<25} {:<40} Status", "ID", "Name")?;
        writeln!(w, "{}", "-".repeat(75))?;

        for r in &self.rules {
            let status = match r.status.as_str() {
                "valid" => r.status.green(),
                _ => r.status.red(),
            };
            writeln!(
                w,
                "{:<25} {:<40} {}",
                r.id,
                r.name.as_deref().unwrap_or("-"),
                status
            )?;
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct SourceSummary {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
}

#[derive(Serialize)]
pub struct RuleValidationReport {
    pub rules_dir: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipelines_dir: Option<String>,
    pub rules: SourceSummary,
    pub pipelines: SourceSummary,
    pub errors: Vec<SourceError>,
    pub warnings: Vec<String>,
}

#[derive(Serialize)]
pub struct SourceError {
    /// `rule` or `pipeline`
    pub kind: String,
    pub id: String,
    pub error: String,
}

fn render_summary(w: &mut dyn Write, label: &str, summary: &SourceSummary) -> std::io::Result<()> {
    use colored::Colorize;

    writeln!(
        w,
        "  {label}: {} total, {} valid, {} invalid",
        summary.total,
        summary.valid.to_string().green(),
        if summary.invalid > 0 {
            summary.invalid.to_string().red()
        } else {
            summary.invalid.to_string().normal()
        }
    )
}

impl Render for RuleValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Rule Validation: {}", self.rules_dir.bold())?;
        render_summary(w, "Rules", &self.rules)?;
        if let Some(ref dir) = self.pipelines_dir {
            writeln!(w, "Pipeline Validation: {}", dir.bold())?;
            render_summary(w, "Pipelines", &self.pipelines)?;
        }

        if !self.errors.is_empty() {
            writeln!(w)?;
            writeln!(w, "Errors:")?;
            for e in &self.errors {
                writeln!(w, "  {} {}: {}", e.kind, e.id.red(), e.error)?;
            }
        }

        if !self.warnings.is_empty() {
            writeln!(w)?;
            writeln!(w, "Warnings:")?;
            for warning in &self.warnings {
                writeln!(w, "  {}", warning.yellow())?;
            }
        }

        Ok(())
    }
}
