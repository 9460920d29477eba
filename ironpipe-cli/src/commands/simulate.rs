//! `ironpipe simulate` command handler
//!
//! Builds the processing state from the configured sources and runs one
//! message through it, either following stream connections or against an
//! explicit list of pipelines.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::info;

use ironpipe_core::config::IronpipeConfig;
use ironpipe_core::types::{DEFAULT_STREAM_ID, Message};
use ironpipe_processor::{
    ConfigurationStateUpdater, ListenerEvent, MetricRegistry, PipelineInterpreter,
    PipelineResolver, RecordLoader, RecordingListener, YamlRuleParser,
};

use crate::cli::SimulateArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `simulate` command.
pub async fn execute(
    args: SimulateArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let config = IronpipeConfig::load(config_path).await?;
    let report = simulate(&config, &args).await?;
    writer.render(&report)
}

/// Parse the message argument into a [`Message`] placed on `streams`.
///
/// With no streams the message starts on the default stream.
pub fn build_message(json: &str, streams: &[String]) -> Result<Message, CliError> {
    let value: Value =
        serde_json::from_str(json).map_err(|e| CliError::InvalidMessage(e.to_string()))?;
    let Value::Object(object) = value else {
        return Err(CliError::InvalidMessage(
            "expected a JSON object of message fields".to_owned(),
        ));
    };

    let fields: BTreeMap<String, Value> = object.into_iter().collect();
    let mut message = Message::from_fields(fields);
    if streams.is_empty() {
        message.add_stream(DEFAULT_STREAM_ID);
    } else {
        for stream in streams {
            message.add_stream(stream.as_str());
        }
    }
    Ok(message)
}

/// Load sources, build the state and process the message.
pub async fn simulate(
    config: &IronpipeConfig,
    args: &SimulateArgs,
) -> Result<SimulationReport, CliError> {
    let message = build_message(&args.message, &args.streams)?;

    let records = RecordLoader::load(&config.sources).await?;
    let resolver = PipelineResolver::new(
        Arc::new(YamlRuleParser::new()),
        records.into_resolver_config(),
    );
    let registry = Arc::new(MetricRegistry::new());
    let updater =
        ConfigurationStateUpdater::from_config(resolver, Arc::clone(&registry), &config.processor)?;
    let interpreter = PipelineInterpreter::new(Arc::clone(&updater))
        .with_max_passes(config.processor.max_passes);

    let state = updater.latest_state();
    let listener = RecordingListener::new();

    let messages = if args.pipelines.is_empty() {
        info!(message_id = %message.id(), "simulating stream routing");
        interpreter.process(vec![message], &listener, &state)
    } else {
        info!(
            message_id = %message.id(),
            pipelines = ?args.pipelines,
            "simulating explicit pipelines"
        );
        let mut message = message;
        let created = interpreter.process_for_pipelines(
            &mut message,
            args.pipelines.as_slice(),
            &listener,
            &state,
        );
        let mut messages = Vec::with_capacity(created.len() + 1);
        messages.push(message);
        messages.extend(created);
        messages
    };

    let counters: BTreeMap<String, u64> = registry
        .names()
        .into_iter()
        .filter_map(|name| {
            let value = registry.count(&name)?;
            (value > 0).then_some((name, value))
        })
        .collect();

    Ok(SimulationReport {
        messages,
        counters,
        trace: if args.trace {
            listener.events()
        } else {
            Vec::new()
        },
    })
}

#[derive(Serialize)]
pub struct SimulationReport {
    /// Output messages, including any created during processing.
    pub messages: Vec<Message>,
    /// Non-zero pipeline, stage and rule counters.
    pub counters: BTreeMap<String, u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub trace: Vec<ListenerEvent>,
}

impl Render for SimulationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(
            w,
            "Simulation ({} output messages)",
            self.messages.len().to_string().bold()
        )?;

        for message in &self.messages {
            writeln!(w)?;
            let header = format!("Message {}", message.id());
            if message.filter_out() {
                writeln!(w, "{} {}", header.bold(), "(dropped)".yellow())?;
            } else {
                writeln!(w, "{}", header.bold())?;
            }
            let streams: Vec<&str> = message.streams().iter().map(String::as_str).collect();
            writeln!(w, "  streams: [{}]", streams.join(", "))?;
            for (name, value) in message.fields() {
                writeln!(w, "  {name} = {value}")?;
            }
            if let Some(error) = message.processing_error() {
                writeln!(w, "  {}", format!("processing error: {error}").red())?;
            }
        }

        if !self.counters.is_empty() {
            writeln!(w)?;
            writeln!(w, "Counters:")?;
            for (name, value) in &self.counters {
                writeln!(w, "  {name:<60} {value}")?;
            }
        }

        if !self.trace.is_empty() {
            writeln!(w)?;
            writeln!(w, "Trace:")?;
            for (i, event) in self.trace.iter().enumerate() {
                writeln!(w, "  {:>3}. {event}", i + 1)?;
            }
        }

        Ok(())
    }
}
