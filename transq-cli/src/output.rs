// transq-cli/src/output.rs
//
// Terminal presentation helpers: headings, labelled values, status lines and
// the per-job progress bars.

use std::fmt::Display;

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Print a heading with colored styling and clear separation
pub fn print_heading(text: &str) {
    let line = style("=".repeat(50)).blue().bright();
    println!("\n{}", line);
    println!("{}", style(format!(" {} ", text)).bold().white().bright());
    println!("{}\n", line);
}

/// Print an info line with label and value, with the label colored
pub fn print_info<T: Display>(label: &str, value: T) {
    println!("{}: {}", style(label).cyan().bright(), value);
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", style("✗").red().bold(), style(message).red());
}

pub fn print_success(message: &str) {
    println!("{} {}", style("✓").green().bold(), message);
}

pub fn print_warning(message: &str) {
    println!("{} {}", style("!").yellow().bold(), style(message).yellow());
}

/// One bar per running job, scaled to 0..=100.
pub fn create_job_bar(multi: &MultiProgress, message: &str) -> ProgressBar {
    let pb = multi.add(ProgressBar::new(100));
    // The template is a literal; fall back to the default style if it is ever rejected.
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {percent}% ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓▒░ ");
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb
}

/// Writes a line above the bars without tearing them.
pub fn println_above(multi: &MultiProgress, line: impl AsRef<str>) {
    if multi.println(line.as_ref()).is_err() {
        println!("{}", line.as_ref());
    }
}
