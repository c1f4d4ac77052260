use std::io::Read;
use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use serde_json::Value;

use flowexpr::config::Config;
use flowexpr::expression::{ExpressionContext, Resolver, Sandbox};
use flowexpr::schedule::{
    self, cache, describe_cron_expression, forecast_executions_in, parse_zone,
    validate_cron_expression, ScheduleSettings, Zone,
};
use flowexpr::telemetry;

#[derive(Parser)]
#[command(name = "flowexpr")]
#[command(about = "Expression and schedule engine for workflow automation", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to ~/.config/flowexpr/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print failures as a JSON error envelope
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve {{...}} placeholders in a string
    Resolve {
        /// Template text
        template: String,
        /// Current item as JSON (inline, @file or - for stdin)
        #[arg(short, long)]
        item: Option<String>,
        /// Full context as JSON with $json/$node/$vars/$workflow/$execution keys
        #[arg(short, long)]
        context: Option<String>,
        /// Override the evaluator timeout (milliseconds)
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Evaluate one expression strictly, reporting why it failed
    Eval {
        /// Expression text without the surrounding {{ }}
        expression: String,
        /// Current item as JSON (inline, @file or - for stdin)
        #[arg(short, long)]
        item: Option<String>,
        /// Full context as JSON with $json/$node/$vars/$workflow/$execution keys
        #[arg(short, long)]
        context: Option<String>,
    },
    /// Inspect cron expressions
    Cron {
        #[command(subcommand)]
        action: CronActions,
    },
    /// Work with trigger schedule settings
    Schedule {
        #[command(subcommand)]
        action: ScheduleActions,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[derive(Subcommand)]
enum CronActions {
    /// Validate an expression and list every field error
    Validate {
        expression: String,
    },
    /// Describe an expression in English
    Describe {
        expression: String,
    },
    /// List upcoming execution times
    Next {
        expression: String,
        /// Number of executions (defaults to schedule.default_count)
        #[arg(short = 'n', long)]
        count: Option<usize>,
        /// RFC3339 start instant (defaults to now)
        #[arg(long)]
        from: Option<String>,
        /// Zone to read the cron fields in (IANA name or offset)
        #[arg(long)]
        tz: Option<String>,
    },
    /// Check whether an instant matches an expression
    Matches {
        expression: String,
        /// RFC3339 instant
        #[arg(long)]
        at: String,
        /// Zone to read the cron fields in (IANA name or offset)
        #[arg(long)]
        tz: Option<String>,
    },
}

#[derive(Subcommand)]
enum ScheduleActions {
    /// Recompute cronExpression for persisted settings
    Convert {
        /// Settings JSON (inline, @file or - for stdin)
        settings: String,
    },
}

fn main() -> anyhow::Result<()> {
    telemetry::init_tracing(telemetry::DEFAULT_FILTER).map_err(|e| anyhow::anyhow!(e))?;

    let cli = Cli::parse();
    let json = cli.json;
    match run(cli) {
        Ok(()) => Ok(()),
        Err(err) if json => {
            let envelope = match err.downcast_ref::<flowexpr::Error>() {
                Some(e) => e.to_json(),
                None => flowexpr::Error::Internal(format!("{:#}", err)).to_json(),
            };
            println!("{}", serde_json::to_string_pretty(&envelope)?);
            std::process::exit(1);
        }
        Err(err) => Err(err),
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => Config::from_path(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load(),
    };
    cache::configure_global(config.schedule.cache_capacity);

    match cli.command {
        Commands::Resolve {
            template,
            item,
            context,
            timeout_ms,
        } => cmd_resolve(
            &config,
            &template,
            item.as_deref(),
            context.as_deref(),
            timeout_ms,
        )?,
        Commands::Eval {
            expression,
            item,
            context,
        } => cmd_eval(&config, &expression, item.as_deref(), context.as_deref())?,
        Commands::Cron { action } => match action {
            CronActions::Validate { expression } => cmd_cron_validate(&expression)?,
            CronActions::Describe { expression } => {
                println!("{}", describe_cron_expression(&expression))
            }
            CronActions::Next {
                expression,
                count,
                from,
                tz,
            } => cmd_cron_next(&config, &expression, count, from.as_deref(), tz.as_deref())?,
            CronActions::Matches { expression, at, tz } => {
                cmd_cron_matches(&expression, &at, tz.as_deref())?
            }
        },
        Commands::Schedule { action } => match action {
            ScheduleActions::Convert { settings } => cmd_schedule_convert(&config, &settings)?,
        },
        Commands::Completions { shell } => {
            cmd_completions(shell)?;
        }
    }

    Ok(())
}

/// Shell completion variants
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum CompletionShell {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    /// PowerShell
    PowerShell,
    /// Elvish shell
    Elvish,
}

impl From<CompletionShell> for Shell {
    fn from(shell: CompletionShell) -> Self {
        match shell {
            CompletionShell::Bash => Shell::Bash,
            CompletionShell::Zsh => Shell::Zsh,
            CompletionShell::Fish => Shell::Fish,
            CompletionShell::PowerShell => Shell::PowerShell,
            CompletionShell::Elvish => Shell::Elvish,
        }
    }
}

/// Generate shell completions
fn cmd_completions(shell: CompletionShell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    let shell: Shell = shell.into();
    generate(shell, &mut cmd, name, &mut std::io::stdout());
    Ok(())
}

// ============================================================================
// Expression Commands
// ============================================================================

fn cmd_resolve(
    config: &Config,
    template: &str,
    item: Option<&str>,
    context: Option<&str>,
    timeout_ms: Option<u64>,
) -> anyhow::Result<()> {
    let item = item.map(read_json).transpose()?.unwrap_or(Value::Null);
    let context = context.map(read_context).transpose()?;

    let mut evaluator = config.evaluator.clone();
    if let Some(ms) = timeout_ms {
        evaluator = evaluator.with_timeout_ms(ms);
    }
    let resolver = Resolver::new(Sandbox::new(evaluator));

    let resolved = resolver.resolve_value(template, &item, context.as_ref());
    match resolved {
        Value::String(s) => println!("{}", s),
        other => println!("{}", serde_json::to_string_pretty(&other)?),
    }
    Ok(())
}

fn cmd_eval(
    config: &Config,
    expression: &str,
    item: Option<&str>,
    context: Option<&str>,
) -> anyhow::Result<()> {
    let mut ctx = context.map(read_context).transpose()?.unwrap_or_default();
    if let Some(item) = item {
        ctx = ctx.with_json(read_json(item)?);
    }

    let output = Sandbox::new(config.evaluator.clone())
        .evaluate(expression, &ctx)
        .map_err(flowexpr::Error::from)?;
    println!("{}", serde_json::to_string_pretty(&output.into_value())?);
    Ok(())
}

// ============================================================================
// Cron Commands
// ============================================================================

fn cmd_cron_validate(expression: &str) -> anyhow::Result<()> {
    let result = validate_cron_expression(expression);
    if result.valid {
        println!("✓ Valid: {}", describe_cron_expression(expression));
        return Ok(());
    }

    println!("✗ Invalid cron expression '{}'", expression);
    for error in &result.errors {
        println!("  - {} [{}]: {}", error.field, error.code, error.message);
    }
    std::process::exit(1);
}

fn cmd_cron_next(
    config: &Config,
    expression: &str,
    count: Option<usize>,
    from: Option<&str>,
    tz: Option<&str>,
) -> anyhow::Result<()> {
    ensure_valid(expression)?;
    let zone = tz.map(parse_zone).transpose()?.unwrap_or(Zone::Utc);
    let from = from.map(parse_instant).transpose()?.unwrap_or_else(Utc::now);
    let count = count.unwrap_or(config.schedule.default_count);

    let forecast = forecast_executions_in(
        &zone,
        expression,
        count,
        from,
        config.schedule.iteration_factor,
    );

    println!("{} ({})", describe_cron_expression(expression), zone.name());
    println!();
    for run in &forecast.executions {
        let shown = run
            .instant()
            .map(|instant| zone.convert(&instant).to_rfc3339())
            .unwrap_or_else(|| run.iso.clone());
        println!("  {:<26} {}", shown, run.relative);
    }
    if forecast.horizon_reached {
        println!();
        println!(
            "Only {} of {} executions found within the search horizon.",
            forecast.executions.len(),
            count
        );
    }
    Ok(())
}

fn cmd_cron_matches(expression: &str, at: &str, tz: Option<&str>) -> anyhow::Result<()> {
    ensure_valid(expression)?;
    let zone = tz.map(parse_zone).transpose()?.unwrap_or(Zone::Utc);
    let instant = zone.convert(&parse_instant(at)?);

    if schedule::matches_cron_expression(&instant, expression) {
        println!("✓ {} matches '{}'", instant.to_rfc3339(), expression);
        Ok(())
    } else {
        println!("✗ {} does not match '{}'", instant.to_rfc3339(), expression);
        std::process::exit(1);
    }
}

// ============================================================================
// Schedule Commands
// ============================================================================

fn cmd_schedule_convert(config: &Config, raw: &str) -> anyhow::Result<()> {
    let settings: ScheduleSettings =
        serde_json::from_value(read_json(raw)?).context("Invalid schedule settings")?;
    let converted =
        schedule::convert_schedule_settings_with(&settings, &config.schedule.default_cron);

    if let Some(cron) = converted.cron_expression.as_deref() {
        let validation = validate_cron_expression(cron);
        if !validation.valid {
            eprintln!("Warning: resulting cron '{}' is invalid", cron);
            for error in &validation.errors {
                eprintln!("  - {} [{}]: {}", error.field, error.code, error.message);
            }
        }
    }

    println!("{}", serde_json::to_string_pretty(&converted)?);
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

fn ensure_valid(expression: &str) -> anyhow::Result<()> {
    let result = validate_cron_expression(expression);
    if !result.valid {
        return Err(flowexpr::Error::from(result.errors).into());
    }
    Ok(())
}

fn parse_instant(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Invalid RFC3339 timestamp '{}'", raw))
}

fn read_context(raw: &str) -> anyhow::Result<ExpressionContext> {
    let value = read_json(raw)?;
    Ok(serde_json::from_value(value).map_err(flowexpr::Error::from)?)
}

/// Inline JSON, `@path` to read a file, or `-` for stdin.
fn read_json(raw: &str) -> anyhow::Result<Value> {
    let text = if raw == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else if let Some(path) = raw.strip_prefix('@') {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?
    } else {
        raw.to_string()
    };
    serde_json::from_str(&text).context("Invalid JSON")
}
