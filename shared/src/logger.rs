use chrono::Local;
use colored::Colorize;

fn get_timestamp() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

pub fn log_info(message: &str) {
    println!(
        "{} {} {}",
        format!("[{}]", get_timestamp()).dimmed(),
        "[INFO]".cyan().bold(),
        message
    );
}

pub fn log_success(message: &str) {
    println!(
        "{} {} {}",
        format!("[{}]", get_timestamp()).dimmed(),
        "[OK]".green().bold(),
        message
    );
}

pub fn log_error(message: &str) {
    eprintln!(
        "{} {} {}",
        format!("[{}]", get_timestamp()).dimmed(),
        "[ERROR]".red().bold(),
        message
    );
}

pub fn log_warning(message: &str) {
    println!(
        "{} {} {}",
        format!("[{}]", get_timestamp()).dimmed(),
        "[WARN]".yellow().bold(),
        message
    );
}

pub fn log_system(message: &str) {
    println!(
        "{} {} {}",
        format!("[{}]", get_timestamp()).dimmed(),
        "[SYSTEM]".magenta().bold(),
        message
    );
}

/// Protocol line received from a client. The username is unknown until the
/// handshake completes.
pub fn log_incoming(username: Option<&str>, line: &str) {
    println!(
        "{} {} {}",
        format!("[{}]", get_timestamp()).dimmed(),
        "<<".green().bold(),
        tag_line(username, line)
    );
}

/// Protocol line written to a client, as it went out on the wire.
pub fn log_outgoing(username: Option<&str>, line: &str) {
    println!(
        "{} {} {}",
        format!("[{}]", get_timestamp()).dimmed(),
        ">>".blue().bold(),
        tag_line(username, line)
    );
}

fn tag_line(username: Option<&str>, line: &str) -> String {
    match username {
        Some(name) => format!("{} {}", format!("[{}]", name).bold(), line),
        None => line.to_string(),
    }
}
