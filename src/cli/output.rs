//! CLI output formatting

use crate::{
    core::{FailureCause, FailureReport, PipelineResult, StageKind},
    execution::ProgressEvent,
};
use chrono::{DateTime, Local};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static PACKAGE: Emoji<'_, '_> = Emoji("📦 ", "* ");

/// Create a progress bar with one tick per stage
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    progress.set_style(style);
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// `[HH:MM:SS]` prefix for log lines
pub fn timestamp(at: DateTime<Local>) -> String {
    format!("[{}]", at.format("%H:%M:%S"))
}

fn kind_label(kind: StageKind) -> String {
    match kind {
        StageKind::ClearDir => style("clear").dim().to_string(),
        StageKind::Upload => style("upload").cyan().to_string(),
        StageKind::RemoteExec => style("exec").yellow().to_string(),
        StageKind::Download => style("download").cyan().to_string(),
    }
}

/// Format a progress event for display
pub fn format_progress_event(event: &ProgressEvent, at: DateTime<Local>) -> String {
    let body = match event {
        ProgressEvent::RunStarted { .. } => format!("{} {}", ROCKET, event.message()),
        ProgressEvent::Connected { .. } => format!("{} {}", INFO, event.message()),
        ProgressEvent::StageStarted {
            index,
            kind,
            message,
        } => format!(
            "{} {} {} {}",
            SPINNER,
            style(format!("#{}", index)).dim(),
            kind_label(*kind),
            message
        ),
        ProgressEvent::StageCompleted { index, message } => format!(
            "{} {} {}",
            CHECK,
            style(format!("#{}", index)).dim(),
            style(message).green()
        ),
        ProgressEvent::ArtifactReady { artifact, .. } => format!(
            "{} {} {}",
            PACKAGE,
            style(&artifact.kind).bold(),
            artifact.path.display()
        ),
        ProgressEvent::RunCompleted { .. } => {
            format!("{} {}", CHECK, style(event.message()).green())
        }
        ProgressEvent::RunFailed { report } if report.is_cancelled() => {
            format!("{} {}", WARN, style(event.message()).yellow())
        }
        ProgressEvent::RunFailed { .. } => format!("{} {}", CROSS, style(event.message()).red()),
    };

    format!("{} {}", style(timestamp(at)).dim(), body)
}

/// Short name for a failure cause
pub fn format_cause(cause: &FailureCause) -> String {
    match cause {
        FailureCause::Connection => "connection error".to_string(),
        FailureCause::Execution => "execution error".to_string(),
        FailureCause::Transfer => "transfer error".to_string(),
        FailureCause::StageExit { code } => format!("exit status {}", code),
        FailureCause::Cancelled => "cancelled".to_string(),
    }
}

/// Stage index and message, shown verbatim
pub fn format_failure(report: &FailureReport) -> String {
    let stage = match report.stage {
        Some(index) => format!("stage {}", index),
        None => "connect".to_string(),
    };
    format!(
        "{} ({}): {}",
        style(stage).bold(),
        format_cause(&report.cause),
        report.message
    )
}

/// Summary lines for a finished run
pub fn format_result(name: &str, result: &PipelineResult) -> Vec<String> {
    match result {
        PipelineResult::Completed { artifacts } => {
            let mut lines = vec![format!(
                "{} {} completed {}",
                CHECK,
                style(name).bold(),
                style("successfully").green()
            )];
            lines.extend(artifacts.iter().map(|artifact| {
                format!(
                    "  {} {}",
                    style(format!("{}:", artifact.kind)).cyan(),
                    artifact.path.display()
                )
            }));
            lines
        }
        PipelineResult::Failed(report) if report.is_cancelled() => vec![format!(
            "{} {} {} at {}",
            WARN,
            style(name).bold(),
            style("cancelled").yellow(),
            format_failure(report)
        )],
        PipelineResult::Failed(report) => vec![format!(
            "{} {} {} at {}",
            CROSS,
            style(name).bold(),
            style("failed").red(),
            format_failure(report)
        )],
    }
}
