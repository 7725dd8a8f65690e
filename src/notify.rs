use crossterm::style::Stylize;

/// One-line messages shown to the user, separate from the diagnostic log.
pub trait Notifier: Send + Sync {
    fn error(&self, message: &str);
    fn info(&self, message: &str);
}

/// Writes notifications to stderr so stdout stays free for launch output.
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn error(&self, message: &str) {
        eprintln!("{} {}", "error:".red().bold(), first_line(message));
    }

    fn info(&self, message: &str) {
        eprintln!("{} {}", "info:".cyan(), first_line(message));
    }
}

/// Notifications are single-line; multi-line error streams are cut at the first line.
pub fn first_line(message: &str) -> &str {
    message.trim().lines().next().unwrap_or_default()
}
