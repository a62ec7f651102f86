//! Command implementations, one `impl App` block per command.

pub mod add_app;
pub mod create_regex;
pub mod labels;

use std::io::Write;

use colored::Colorize as _;

use crate::provider::PullRequestHandle;

/// Print the outcome of an orchestrator run.
fn report(
    handle: Option<&PullRequestHandle>,
    stdout: &mut impl Write,
) -> std::io::Result<()> {
    match handle {
        Some(handle) => writeln!(stdout, "Pull request: {}", handle.url.cyan()),
        None => writeln!(stdout, "{}", "No changes".dimmed()),
    }
}
