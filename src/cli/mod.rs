//! SK-040: CLI subcommands: check, fire, syntax.

use crate::core::engine::{Engine, HostEvent};
use crate::core::loader::LoadOptions;
use crate::core::parser::{self, EngineConfig};
use crate::core::registry::{Registry, SyntaxKind};
use crate::core::types::{Datum, Diagnostic, Severity, Value};
use crate::lang;
use crate::logging::{self, LogConfig};
use clap::{Subcommand, ValueEnum};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load every trigger of a script and report problems without running it
    Check {
        /// Script file
        script: PathBuf,

        /// Engine config (host events, logging)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Load a script, fire one event and print what it broadcasts
    Fire {
        /// Script file
        script: PathBuf,

        /// Event name
        #[arg(short, long)]
        event: String,

        /// Event value as key=text, parsed with the event's declared type
        #[arg(long = "value", value_name = "KEY=TEXT")]
        values: Vec<String>,

        /// Engine config (host events, logging)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// List registered syntax patterns in match order
    Syntax {
        /// Only this kind of syntax
        #[arg(short, long)]
        kind: Option<KindArg>,

        /// Engine config (host events, logging)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    Event,
    Condition,
    Effect,
    Expression,
}

impl KindArg {
    fn matches(self, kind: SyntaxKind) -> bool {
        matches!(
            (self, kind),
            (Self::Event, SyntaxKind::Event)
                | (Self::Condition, SyntaxKind::Condition)
                | (Self::Effect, SyntaxKind::Effect)
                | (Self::Expression, SyntaxKind::Expression)
        )
    }
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands, verbose: bool) -> Result<(), String> {
    match cmd {
        Commands::Check {
            script,
            config,
            json,
        } => cmd_check(&script, config.as_deref(), json, verbose),
        Commands::Fire {
            script,
            event,
            values,
            config,
        } => cmd_fire(&script, &event, &values, config.as_deref(), verbose),
        Commands::Syntax { kind, config } => cmd_syntax(kind, config.as_deref(), verbose),
    }
}

// ============================================================================
// Setup
// ============================================================================

/// Parsed config plus the registry built from it.
struct Setup {
    config: EngineConfig,
    registry: Arc<Registry>,
}

impl Setup {
    fn load(config_file: Option<&Path>, verbose: bool) -> Result<Self, String> {
        let config = match config_file {
            Some(path) => parser::parse_config_file(path)?,
            None => EngineConfig::default(),
        };
        let mut log = LogConfig::from_config(&config);
        if verbose {
            log = log.verbose();
        }
        logging::init(&log);
        Self::from_config(config)
    }

    fn from_config(config: EngineConfig) -> Result<Self, String> {
        let builder = lang::builder().map_err(|e| e.to_string())?;
        let errors = parser::validate_config(&config, builder.types());
        if !errors.is_empty() {
            for e in &errors {
                eprintln!("  ERROR: {}", e);
            }
            return Err(format!("{} config error(s)", errors.len()));
        }
        let registry = lang::registry(&config).map_err(|e| e.to_string())?;
        Ok(Self {
            config,
            registry: Arc::new(registry),
        })
    }

    fn engine(&self) -> Engine {
        Engine::new(Arc::clone(&self.registry)).with_options(LoadOptions {
            report_warnings: self.config.warnings,
        })
    }
}

fn read_source(script: &Path) -> Result<String, String> {
    std::fs::read_to_string(script)
        .map_err(|e| format!("failed to read {}: {}", script.display(), e))
}

// ============================================================================
// check
// ============================================================================

#[derive(Debug, Serialize)]
pub struct CheckReport {
    pub script: String,
    pub ok: bool,
    pub triggers: usize,
    pub diagnostics: Vec<Diagnostic>,
}

fn check(setup: &Setup, script: &Path, source: &str) -> CheckReport {
    let (ok, triggers, diagnostics) = match setup.engine().compile(source) {
        Ok((triggers, warnings)) => (true, triggers.len(), warnings),
        Err(problems) => (false, 0, problems.0),
    };
    CheckReport {
        script: script.display().to_string(),
        ok,
        triggers,
        diagnostics,
    }
}

fn cmd_check(
    script: &Path,
    config: Option<&Path>,
    json: bool,
    verbose: bool,
) -> Result<(), String> {
    let setup = Setup::load(config, verbose)?;
    let source = read_source(script)?;
    let report = check(&setup, script, &source);

    if json {
        let out = serde_json::to_string_pretty(&report)
            .map_err(|e| format!("JSON serialization error: {}", e))?;
        println!("{}", out);
    } else {
        for d in &report.diagnostics {
            match d.severity {
                Severity::Error => eprintln!("  ERROR: {}", describe_line(d)),
                Severity::Warning => eprintln!("  WARNING: {}", describe_line(d)),
            }
        }
        if report.ok {
            println!("OK: {} ({} triggers)", report.script, report.triggers);
        }
    }

    if report.ok {
        Ok(())
    } else {
        let errors = report
            .diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count();
        Err(format!("{} error(s) in {}", errors, report.script))
    }
}

fn describe_line(d: &Diagnostic) -> String {
    match d.line {
        Some(line) => format!("line {}: {}", line, d.message),
        None => d.message.clone(),
    }
}

// ============================================================================
// fire
// ============================================================================

/// Build a host event from `key=text` pairs, parsing each text as the type
/// the event declares for its key.
pub fn host_event(registry: &Registry, name: &str, pairs: &[String]) -> Result<HostEvent, String> {
    let syntax = registry
        .event(name)
        .ok_or_else(|| format!("unknown event '{}'", name))?;
    let mut event = HostEvent::new(syntax.entry.name());
    for pair in pairs {
        let (key, text) = pair
            .split_once('=')
            .ok_or_else(|| format!("'{}' is not key=text", pair))?;
        let key = key.trim().to_lowercase();
        let ty = syntax
            .values
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, t)| *t)
            .ok_or_else(|| format!("event '{}' has no value '{}'", name, key))?;
        let value = registry
            .parse_text(text, ty)
            .or_else(|| {
                registry
                    .text()
                    .filter(|t| registry.is_assignable(*t, ty))
                    .map(|t| Value::new(t, Datum::Text(text.to_string())))
            })
            .ok_or_else(|| {
                format!(
                    "'{}' is not a valid {} for event-{}",
                    text,
                    registry.type_name(ty),
                    key
                )
            })?;
        event = event.with_value(&key, value);
    }
    Ok(event)
}

/// Load, fire once, unload. Returns every broadcast in order.
fn fire(setup: &Setup, source: &str, event: &str, pairs: &[String]) -> Result<Vec<String>, String> {
    let mut ctx = host_event(&setup.registry, event, pairs)?;
    let mut engine = setup.engine();
    let report = engine.load_script(source).map_err(|problems| {
        for d in problems.errors() {
            eprintln!("  ERROR: {}", describe_line(d));
        }
        format!("{} error(s) in script", problems.errors().count())
    })?;

    let mut output = report.output;
    let ran = engine.fire(&mut ctx);
    tracing::info!(event, ran, "event fired");
    output.extend(ctx.into_output());
    output.extend(engine.unload_all());
    Ok(output)
}

fn cmd_fire(
    script: &Path,
    event: &str,
    pairs: &[String],
    config: Option<&Path>,
    verbose: bool,
) -> Result<(), String> {
    let setup = Setup::load(config, verbose)?;
    let source = read_source(script)?;
    for line in fire(&setup, &source, event, pairs)? {
        println!("{}", line);
    }
    Ok(())
}

// ============================================================================
// syntax
// ============================================================================

fn cmd_syntax(kind: Option<KindArg>, config: Option<&Path>, verbose: bool) -> Result<(), String> {
    let setup = Setup::load(config, verbose)?;
    let mut current = String::new();
    for (k, name, pattern) in setup.registry.syntax_listing() {
        if kind.is_some_and(|want| !want.matches(k)) {
            continue;
        }
        let heading = format!("{} {}", k, name);
        if heading != current {
            println!("{}:", heading);
            current = heading;
        }
        println!("  {}", pattern);
    }
    Ok(())
}
