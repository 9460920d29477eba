//! `ironpipe config` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use ironpipe_core::config::IronpipeConfig;

use crate::cli::{ConfigAction, ConfigArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `config` command.
pub async fn execute(
    args: ConfigArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        ConfigAction::Validate => {
            let report = validate_config(config_path).await;
            writer.render(&report)?;
            if !report.valid {
                return Err(CliError::Config("configuration is invalid".to_owned()));
            }
            Ok(())
        }
        ConfigAction::Show { section } => {
            let report = show_config(config_path, section.as_deref()).await?;
            writer.render(&report)
        }
    }
}

/// Load and validate the configuration file, capturing the error if any.
pub async fn validate_config(config_path: &Path) -> ConfigValidationReport {
    info!(path = %config_path.display(), "validating configuration");

    let errors = match IronpipeConfig::load(config_path).await {
        Ok(_) => Vec::new(),
        Err(e) => vec![e.to_string()],
    };

    ConfigValidationReport {
        source: config_path.display().to_string(),
        valid: errors.is_empty(),
        errors,
    }
}

/// Render the effective configuration (file, env overrides and defaults) as TOML.
///
/// # Errors
///
/// Returns `CliError::Command` for an unknown section name.
pub async fn show_config(
    config_path: &Path,
    section: Option<&str>,
) -> Result<ConfigReport, CliError> {
    info!(path = %config_path.display(), "loading configuration");

    let config = IronpipeConfig::load(config_path).await?;

    let config_toml = match section {
        None => to_toml(&config),
        Some("general") => to_toml(&config.general),
        Some("processor") => to_toml(&config.processor),
        Some("sources") => to_toml(&config.sources),
        Some(other) => {
            return Err(CliError::Command(format!(
                "unknown section: {other} (expected: general, processor, sources)"
            )));
        }
    };

    Ok(ConfigReport {
        source: config_path.display().to_string(),
        section: section.map(str::to_owned),
        config_toml,
    })
}

fn to_toml<T: Serialize>(value: &T) -> String {
    toml::to_string_pretty(value).unwrap_or_else(|e| format!("(serialization error: {e})"))
}

/// Effective configuration display.
///
/// `config_toml` is only used for text rendering.
#[derive(Debug, Serialize)]
pub struct ConfigReport {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(skip)]
    pub config_toml: String,
}

impl Render for ConfigReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        if let Some(ref section) = self.section {
            let section_label = format!("[{section}]");
            writeln!(
                w,
                "Configuration {} (source: {})",
                section_label.bold(),
                self.source
            )?;
        } else {
            writeln!(w, "Configuration (source: {})", self.source.bold())?;
        }

        writeln!(w)?;
        write!(w, "{}", self.config_toml)
    }
}

#[derive(Serialize)]
pub struct ConfigValidationReport {
    pub source: String,
    pub valid: bool,
    pub errors: Vec<String>,
}

impl Render for ConfigValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Config Validation: {}", self.source.bold())?;

        if self.valid {
            writeln!(w, "  Result: {}", "VALID".green().bold())?;
        } else {
            writeln!(w, "  Result: {}", "INVALID".red().bold())?;
            for err in &self.errors {
                writeln!(w, "  Error: {}", err.red())?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_report_render_text_section() {
        let report = ConfigReport {
            source: "/etc/ironpipe.toml".to_owned(),
            section: Some("processor".to_owned()),
            config_toml: "max_passes = 8\n".to_owned(),
        };

        let mut buffer = Vec::new();
        report.render_text(&mut buffer).expect("render");
        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(output.contains("[processor]"));
        assert!(output.contains("max_passes = 8"));
    }

    #[test]
    fn test_config_report_json_skips_toml_body() {
        let report = ConfigReport {
            source: "ironpipe.toml".to_owned(),
            section: None,
            config_toml: "[general]".to_owned(),
        };

        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["source"].as_str(), Some("ironpipe.toml"));
        assert!(json.get("section").is_none());
        assert!(json.get("config_toml").is_none());
    }

    #[test]
    fn test_config_validation_report_invalid() {
        let report = ConfigValidationReport {
            source: "bad.toml".to_owned(),
            valid: false,
            errors: vec!["invalid config value for 'general.log_format'".to_owned()],
        };

        let mut buffer = Vec::new();
        report.render_text(&mut buffer).expect("render");
        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(output.contains("INVALID"));
        assert!(output.contains("general.log_format"));
    }

    #[test]
    fn test_to_toml_renders_processor_section() {
        let rendered = to_toml(&IronpipeConfig::default().processor);
        assert!(rendered.contains("cached_stage_iterators = true"));
        assert!(rendered.contains("max_passes = 0"));
    }
}
