//! Colored console output for the runner.

use std::io::{self, Write};

use chrono::Utc;
use owo_colors::OwoColorize;

/// Get current timestamp in the same format as tracing.
fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Print a line of server output, dimmed to keep it distinct from
/// runner output.
pub fn print_server_line(line: &str) {
    println!(
        "{} {} {}",
        timestamp().dimmed(),
        "[SERVER]".blue().bold(),
        line.dimmed()
    );
    let _ = io::stdout().flush();
}

/// Print the authorization URL the operator must visit.
pub fn print_authorization_url(url: &str) {
    println!(
        "{} {} visit this url to get a verification code: {}",
        timestamp().dimmed(),
        "[AUTH]".yellow().bold(),
        url.cyan().underline()
    );
    let _ = io::stdout().flush();
}

/// Print the verification-code prompt without a trailing newline.
pub fn print_code_prompt() {
    print!("{} ", "Enter verification code:".yellow().bold());
    let _ = io::stdout().flush();
}

/// Print an error message to stderr.
pub fn print_error(msg: &str) {
    eprintln!("{} {}", "[ERROR]".red().bold(), msg);
    let _ = io::stderr().flush();
}
