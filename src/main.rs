use anyhow::{Context, Result};
use chrono::Local;
use indicatif::ProgressDrawTarget;
use remote_pipeline::cli::commands::{RunCommand, ValidateCommand};
use remote_pipeline::cli::output::*;
use remote_pipeline::cli::{Cli, Command};
use remote_pipeline::core::config::PipelineConfig;
use remote_pipeline::{
    ConnectionSpec, PipelineRunner, ProgressEvent, Secret, SessionConfig, SshConnector, StageKind,
};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging; RUST_LOG takes precedence
    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("remote_pipeline={}", default_level)));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd).await?,
        Command::Validate(cmd) => validate_pipeline(cmd)?,
    }

    Ok(())
}

fn connection_spec(cmd: &RunCommand, config: &PipelineConfig) -> Result<ConnectionSpec> {
    let host = cmd
        .host
        .clone()
        .or_else(|| config.connection.host.clone())
        .context("No host given; pass --host or set connection.host in the pipeline file")?;
    let port = cmd.port.unwrap_or_else(|| config.connection.port_or_default());
    let username = cmd
        .user
        .clone()
        .unwrap_or_else(|| config.connection.username_or_default().to_string());
    let password = cmd.password.clone().with_context(|| {
        format!(
            "No password given; pass --password or set {}",
            remote_pipeline::cli::commands::PASSWORD_ENV
        )
    })?;

    Ok(ConnectionSpec::new(host, port, username, Secret::new(password)))
}

async fn run_pipeline(cmd: &RunCommand) -> Result<()> {
    let config = PipelineConfig::from_file(&cmd.file).context("Failed to load pipeline config")?;
    let pipeline = config
        .to_pipeline(&cmd.overrides())
        .context("Failed to resolve pipeline")?;
    let connection = connection_spec(cmd, &config)?;

    let connect_timeout = match cmd.connect_timeout {
        Some(0) => anyhow::bail!("--connect-timeout must be greater than zero"),
        Some(secs) => Duration::from_secs(secs),
        None => pipeline
            .connect_timeout
            .unwrap_or(remote_pipeline::execution::DEFAULT_CONNECT_TIMEOUT),
    };

    let mut session_config = SessionConfig::new().with_host_key_policy(cmd.host_key_policy.into());
    if let Some(path) = &cmd.known_hosts {
        session_config = session_config.with_known_hosts(path.clone());
    }

    if !cmd.json {
        println!("{} Loaded pipeline: {}", INFO, style(&pipeline.name).bold());
        for (key, value) in &cmd.variable {
            println!(
                "{} Variable override: {} = {}",
                INFO,
                style(key).cyan(),
                style(value).dim()
            );
        }
        println!(
            "  {} stages, {} remote command(s), {} download(s)",
            style(pipeline.stages.len()).cyan(),
            pipeline.count(StageKind::RemoteExec),
            pipeline.count(StageKind::Download)
        );
        println!();
    }

    let runner =
        PipelineRunner::new(SshConnector::new(session_config)).with_connect_timeout(connect_timeout);
    let mut handle = runner.spawn(connection, pipeline.stages.clone())?;
    info!("Run {} started", handle.run_id());

    let progress = create_progress_bar(pipeline.stages.len());
    if cmd.json {
        progress.set_draw_target(ProgressDrawTarget::hidden());
    }

    let cancel = handle.cancel_token();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        tokio::select! {
            event = handle.next_event() => {
                let Some(event) = event else { break };
                match &event {
                    ProgressEvent::StageStarted { message, .. } => progress.set_message(message.clone()),
                    ProgressEvent::StageCompleted { .. } => progress.inc(1),
                    _ => {}
                }
                if !cmd.json {
                    progress.println(format_progress_event(&event, Local::now()));
                }
            }
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                warn!("Interrupted, cancelling run");
                if !cmd.json {
                    progress.println(format!("{} Cancelling...", WARN));
                }
                cancel.cancel();
            }
        }
    }
    progress.finish_and_clear();

    let run_id = handle.run_id();
    let result = handle.wait().await;

    if cmd.json {
        let data = serde_json::json!({
            "pipeline": &pipeline.name,
            "run_id": run_id,
            "result": &result,
        });
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else {
        println!();
        for line in format_result(&pipeline.name, &result) {
            println!("{}", line);
        }
    }

    if !result.is_success() {
        std::process::exit(1);
    }

    Ok(())
}

fn validate_pipeline(cmd: &ValidateCommand) -> Result<()> {
    if !cmd.json {
        println!("{} Validating pipeline...", INFO);
    }

    let config = match PipelineConfig::from_file(&cmd.file) {
        Ok(config) => config,
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    };

    let overrides = cmd.overrides();
    let missing = config.missing_variables(&overrides)?;

    // Unresolved placeholders may still be supplied with --var at run time
    if missing.is_empty() {
        if let Err(e) = config.to_pipeline(&overrides) {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    }

    if cmd.json {
        let data = serde_json::json!({
            "valid": true,
            "missing_variables": missing,
            "pipeline": config,
        });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    println!("{} Pipeline configuration is valid!", CHECK);
    println!("  Name: {}", style(&config.name).bold());
    println!("  Stages: {}", style(config.stages.len()).cyan());
    println!("  Variables: {}", style(config.variables.len()).cyan());
    for (index, stage) in config.stages.iter().enumerate() {
        println!("    {} {}", style(format!("#{}", index)).dim(), stage.describe());
    }
    if !missing.is_empty() {
        println!(
            "{} Variables without a value (pass with --var): {}",
            WARN,
            style(missing.join(", ")).yellow()
        );
    }

    Ok(())
}
