use std::io::IsTerminal;

use anstyle::{AnsiColor, Effects, Style};
use nodepack_core::{PackError, PackInstance};
use nodepack_installer::{
    Action, Outcome, OutcomeStatus, PackSummary, PostInstallReport, RecoveryReport,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

pub(crate) fn current_output_style() -> OutputStyle {
    if std::env::var_os("NO_COLOR").is_some() || !std::io::stdout().is_terminal() {
        OutputStyle::Plain
    } else {
        OutputStyle::Rich
    }
}

/// One rendered line: a status keyword (`ok`, `skip`, `step`, `warn`,
/// `defer`) and its message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct StatusLine {
    pub(crate) status: &'static str,
    pub(crate) message: String,
}

impl StatusLine {
    fn new(status: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub(crate) fn render(&self, style: OutputStyle) -> String {
        render_status_line(style, self.status, &self.message)
    }
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct TerminalRenderer {
    style: OutputStyle,
}

impl TerminalRenderer {
    pub(crate) fn from_style(style: OutputStyle) -> Self {
        Self { style }
    }

    pub(crate) fn print_status_lines(self, lines: &[StatusLine]) {
        for line in lines {
            match self.style {
                OutputStyle::Plain => println!("{}", line.message),
                OutputStyle::Rich => println!(
                    "{} {}",
                    colorize(badge_style(line.status), &status_badge(line.status)),
                    line.message
                ),
            }
        }
    }

    pub(crate) fn print_lines(self, lines: &[String]) {
        for line in lines {
            println!("{line}");
        }
    }
}

pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => format!("{} {message}", status_badge(status)),
    }
}

fn status_badge(status: &str) -> String {
    format!("[{}]", status.to_ascii_uppercase())
}

fn badge_style(status: &str) -> Style {
    let color = match status {
        "ok" => AnsiColor::BrightGreen,
        "skip" => AnsiColor::BrightBlack,
        "warn" | "defer" => AnsiColor::BrightYellow,
        "error" => AnsiColor::BrightRed,
        _ => AnsiColor::BrightBlue,
    };
    Style::new().fg_color(Some(color.into())).effects(Effects::BOLD)
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}

fn past_tense(action: Action) -> &'static str {
    match action {
        Action::Enable => "enabled",
        Action::Disable => "disabled",
        Action::Install => "installed",
        Action::Uninstall => "uninstalled",
        Action::Update => "updated",
        Action::Switch => "switched",
        Action::Fix => "fixed",
    }
}

pub(crate) fn format_outcome_lines(outcome: &Outcome) -> Vec<StatusLine> {
    let version = outcome
        .version
        .as_ref()
        .map(|version| format!(" {version}"))
        .unwrap_or_default();
    let location = outcome
        .path
        .as_ref()
        .map(|path| format!(" at {}", path.display()))
        .unwrap_or_default();

    let mut lines = vec![match outcome.status {
        OutcomeStatus::Applied => StatusLine::new(
            "ok",
            format!(
                "{} {}{version}{location}",
                past_tense(outcome.action),
                outcome.id
            ),
        ),
        OutcomeStatus::Skipped(reason) => StatusLine::new(
            "skip",
            format!(
                "{} {}{version}: {}",
                outcome.action,
                outcome.id,
                reason.as_str().replace('-', " ")
            ),
        ),
        OutcomeStatus::Deferred => StatusLine::new(
            "defer",
            format!(
                "{} {} is incomplete; pending actions run on next start",
                outcome.action, outcome.id
            ),
        ),
    }];

    for moved in &outcome.moves {
        lines.push(StatusLine::new(
            "step",
            format!("moved {} -> {}", moved.from.display(), moved.to.display()),
        ));
    }
    for removed in &outcome.removed {
        lines.push(StatusLine::new(
            "step",
            format!("removed {}", removed.display()),
        ));
    }
    if !outcome.collected.is_empty() {
        lines.push(StatusLine::new(
            "step",
            format!(
                "removed {} stale release entr{}",
                outcome.collected.len(),
                if outcome.collected.len() == 1 { "y" } else { "ies" }
            ),
        ));
    }
    for deferred in &outcome.deferred {
        lines.push(StatusLine::new("defer", deferred.describe()));
    }
    if let Some(PostInstallReport::Failed(message)) = &outcome.post_install {
        lines.push(StatusLine::new(
            "warn",
            format!("post-install failed: {message}"),
        ));
    }
    for warning in &outcome.warnings {
        lines.push(StatusLine::new("warn", warning.clone()));
    }
    lines
}

pub(crate) fn format_recovery_lines(report: &RecoveryReport) -> Vec<StatusLine> {
    report
        .completed
        .iter()
        .map(|action| StatusLine::new("ok", format!("recovered: {}", action.describe())))
        .chain(
            report
                .remaining
                .iter()
                .map(|action| StatusLine::new("warn", format!("still pending: {}", action.describe()))),
        )
        .collect()
}

pub(crate) fn format_summary_lines(packs: &[PackSummary]) -> Vec<String> {
    if packs.is_empty() {
        return vec!["No packs installed".to_string()];
    }
    packs
        .iter()
        .map(|pack| {
            let state = if pack.active { "enabled" } else { "disabled" };
            let variants = if pack.variants > 1 {
                format!(" (+{} more)", pack.variants - 1)
            } else {
                String::new()
            };
            format!("{} {} {state}{variants}", pack.id, pack.version)
        })
        .collect()
}

pub(crate) fn format_instance_lines(instances: &[PackInstance]) -> Vec<String> {
    instances
        .iter()
        .map(|instance| {
            let state = if instance.active { "enabled" } else { "disabled" };
            format!(
                "{} {} {state} {}",
                instance.id,
                instance.version,
                instance.path.display()
            )
        })
        .collect()
}

pub(crate) fn render_error(err: &anyhow::Error) -> String {
    let Some(pack_error) = err.downcast_ref::<PackError>() else {
        return format!("error: {err:#}");
    };
    let detail = match pack_error {
        PackError::NotFound(message) | PackError::Conflict(message) => message.clone(),
        other => other.to_string(),
    };
    format!("error[{}]: {detail}", pack_error.kind())
}
