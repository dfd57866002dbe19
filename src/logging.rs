//! Pretty-printing messages to the console

use colored::Colorize;

/// Pretty-print an error message to the console
pub fn error(message: impl AsRef<str>) {
    let title = "error:".red().bold();
    eprintln!("{} {}", title, message.as_ref());
}

/// Pretty-print a warning message, tagged with the source line it refers to
pub fn warning(message: impl AsRef<str>, line_number: usize) {
    let title = "warning:".yellow().bold();
    eprintln!("{} line {}: {}", title, line_number, message.as_ref());
}

/// Print a per-unit progress message
pub fn status(message: impl AsRef<str>) {
    println!("{}", message.as_ref());
}
