// Output formatting and display for CLI

use crate::daemon::DaemonStatus;
use crate::service::{ServiceRecord, ServiceStatus, StatusColor};
use crate::supervisor::{ServiceStatusReport, ServiceSummary};
use chrono::{DateTime, Local, Utc};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

/// Print an error message to stderr
pub fn print_error(error: &str) {
    eprintln!("{} {}", "✗ Error:".red().bold(), error);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Print a success message
pub fn print_success_msg(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

pub fn print_added(record: &ServiceRecord) {
    println!("{}", "✓ Service added".green().bold());
    println!("  {}: {}", "ID".bold(), record.id);
    println!("  {}: {}", "Name".bold(), record.name.cyan());
    println!("  {}: {}", "Command".bold(), record.command);
    println!(
        "  {}: {}",
        "Auto-restart".bold(),
        if record.auto_restart { "on" } else { "off" }
    );
}

#[derive(Tabled)]
struct ServiceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "PID")]
    pid: String,
    #[tabled(rename = "Restarts")]
    restarts: String,
    #[tabled(rename = "Auto")]
    auto_restart: String,
    #[tabled(rename = "Command")]
    command: String,
}

impl ServiceRow {
    fn from_record(record: &ServiceRecord) -> Self {
        Self {
            id: record.id.to_string(),
            name: truncate(&record.name, 20),
            status: format_status_colored(record.status),
            pid: format_pid(record.pid),
            restarts: format!("{}/{}", record.restart_count, record.max_restart_attempts),
            auto_restart: if record.auto_restart { "yes" } else { "no" }.to_string(),
            command: truncate(&record.command, 40),
        }
    }
}

/// Print a formatted table of services
pub fn print_service_table(services: &[ServiceRecord]) {
    if services.is_empty() {
        println!("{}", "No services registered".yellow());
        return;
    }

    let rows: Vec<ServiceRow> = services.iter().map(ServiceRow::from_record).collect();
    print_table(Table::new(rows));
}

/// Print services together with live resource usage
pub fn print_status_table(reports: &[ServiceStatusReport]) {
    #[derive(Tabled)]
    struct StatusRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Status")]
        status: String,
        #[tabled(rename = "PID")]
        pid: String,
        #[tabled(rename = "CPU")]
        cpu: String,
        #[tabled(rename = "Memory")]
        memory: String,
        #[tabled(rename = "Uptime")]
        uptime: String,
        #[tabled(rename = "Restarts")]
        restarts: String,
    }

    if reports.is_empty() {
        println!("{}", "No services registered".yellow());
        return;
    }

    let rows: Vec<StatusRow> = reports
        .iter()
        .map(|report| StatusRow {
            id: report.record.id.to_string(),
            name: truncate(&report.record.name, 20),
            status: format_status_colored(report.record.status),
            pid: format_pid(report.record.pid),
            cpu: report
                .metrics
                .as_ref()
                .map(|m| format!("{:.1}%", m.cpu_percent))
                .unwrap_or_else(|| "-".to_string()),
            memory: report
                .metrics
                .as_ref()
                .map(|m| format_memory(m.memory_rss))
                .unwrap_or_else(|| "-".to_string()),
            uptime: report
                .uptime
                .as_ref()
                .map(format_duration)
                .unwrap_or_else(|| "-".to_string()),
            restarts: report.record.restart_count.to_string(),
        })
        .collect();

    print_table(Table::new(rows));
}

fn print_table(mut table: Table) {
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()));
    println!("\n{}\n", table);
}

pub fn print_summary(summary: &ServiceSummary) {
    println!(
        "{}",
        format!(
            "Total: {} service(s), {} running, {} paused, {} failed, {} with auto-restart",
            summary.total, summary.running, summary.paused, summary.failed, summary.auto_restart
        )
        .dimmed()
        .italic()
    );
}

/// Print detailed status view for a single service
pub fn print_detailed_status(report: &ServiceStatusReport, log_path: &Path) {
    let record = &report.record;

    println!("\n{}", "Service Details".bold().underline());
    println!();
    println!("  {:<15} {}", "ID:".bold(), record.id);
    println!("  {:<15} {}", "Name:".bold(), record.name.cyan());
    println!("  {:<15} {}", "Status:".bold(), format_status_colored(record.status));
    println!("  {:<15} {}", "Command:".bold(), record.command);
    println!(
        "  {:<15} {}",
        "Directory:".bold(),
        record.working_directory.display()
    );
    println!("  {:<15} {}", "PID:".bold(), format_pid(record.pid));
    println!(
        "  {:<15} {} (every {}s, at most {})",
        "Auto-restart:".bold(),
        if record.auto_restart { "on" } else { "off" },
        record.restart_delay,
        record.max_restart_attempts
    );
    println!("  {:<15} {}", "Restarts:".bold(), record.restart_count);

    if let Some(metrics) = &report.metrics {
        println!("  {:<15} {}", "State:".bold(), metrics.status);
        println!("  {:<15} {:.1}%", "CPU Usage:".bold(), metrics.cpu_percent);
        println!(
            "  {:<15} {} (virtual {})",
            "Memory:".bold(),
            format_memory(metrics.memory_rss),
            format_memory(metrics.memory_virtual)
        );
    }
    if let Some(uptime) = &report.uptime {
        println!("  {:<15} {}", "Uptime:".bold(), format_duration(uptime));
    }

    if !record.environment.is_empty() {
        println!("  {}", "Environment:".bold());
        for (key, value) in &record.environment {
            println!("    {}={}", key, value);
        }
    }

    println!("  {:<15} {}", "Created:".bold(), format_timestamp(record.created_at));
    println!("  {:<15} {}", "Updated:".bold(), format_timestamp(record.updated_at));
    println!("  {:<15} {}", "Log file:".bold(), log_path.display());
    println!();
}

pub fn print_logs(lines: &[String]) {
    if lines.is_empty() {
        println!("{}", "No logs available".yellow());
        return;
    }

    for line in lines {
        if line.starts_with("=== ") {
            println!("{}", line.dimmed());
        } else {
            println!("{}", line);
        }
    }
}

pub fn print_daemon_status(status: &DaemonStatus) {
    match status.pid {
        Some(pid) if status.running => {
            println!("{}", "✓ Daemon is running".green().bold());
            println!("  {}: {}", "PID".bold(), pid);
        }
        _ => println!("{}", "✗ Daemon is not running".red().bold()),
    }
    println!("  {}: {}", "PID file".bold(), status.pid_file.display());
}

/// Format a service status with its symbol and colour
fn format_status_colored(status: ServiceStatus) -> String {
    let style = status.style();
    let color = match style.color {
        StatusColor::Green => Color::Green,
        StatusColor::Cyan => Color::Cyan,
        StatusColor::Yellow => Color::Yellow,
        StatusColor::Red => Color::Red,
        StatusColor::BrightRed => Color::BrightRed,
    };

    let text = format!("{} {}", style.symbol, status).color(color);
    if style.bold {
        text.bold().to_string()
    } else {
        text.to_string()
    }
}

fn format_pid(pid: Option<u32>) -> String {
    pid.map(|pid| pid.to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    let local: DateTime<Local> = timestamp.into();
    local.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Format a duration in human-readable format
fn format_duration(duration: &Duration) -> String {
    let secs = duration.as_secs();

    let (major, major_unit, minor, minor_unit) = match secs {
        0..=59 => return format!("{}s", secs),
        60..=3599 => (secs / 60, "m", secs % 60, "s"),
        3600..=86399 => (secs / 3600, "h", (secs % 3600) / 60, "m"),
        _ => (secs / 86400, "d", (secs % 86400) / 3600, "h"),
    };

    if minor > 0 {
        format!("{}{} {}{}", major, major_unit, minor, minor_unit)
    } else {
        format!("{}{}", major, major_unit)
    }
}

/// Format memory usage in human-readable format
fn format_memory(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes < KB {
        format!("{}B", bytes)
    } else if bytes < MB {
        format!("{:.1}KB", bytes as f64 / KB as f64)
    } else if bytes < GB {
        format!("{:.1}MB", bytes as f64 / MB as f64)
    } else {
        format!("{:.2}GB", bytes as f64 / GB as f64)
    }
}

/// Truncate to `max_len` characters, marking the cut with an ellipsis
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Create a spinner for long operations
pub fn create_progress_bar(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Finish a progress bar with success
pub fn finish_progress_success(pb: ProgressBar, message: &str) {
    pb.finish_with_message(format!("{} {}", "✓".green(), message));
}

/// Finish a progress bar with error
pub fn finish_progress_error(pb: ProgressBar, message: &str) {
    pb.finish_with_message(format!("{} {}", "✗".red(), message));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(&Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(&Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(&Duration::from_secs(120)), "2m");
        assert_eq!(format_duration(&Duration::from_secs(3700)), "1h 1m");
        assert_eq!(format_duration(&Duration::from_secs(90000)), "1d 1h");
    }

    #[test]
    fn test_format_memory() {
        assert_eq!(format_memory(512), "512B");
        assert_eq!(format_memory(2048), "2.0KB");
        assert_eq!(format_memory(2 * 1024 * 1024), "2.0MB");
        assert_eq!(format_memory(3 * 1024 * 1024 * 1024), "3.00GB");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a very long string", 10), "this is...");
        assert_eq!(truncate("ünïcödé-nämé", 8), "ünïcö...");
    }

    #[test]
    fn test_status_text_contains_name() {
        colored::control::set_override(false);
        assert_eq!(format_status_colored(ServiceStatus::Running), "● running");
        assert_eq!(format_status_colored(ServiceStatus::Failed), "✗ failed");
    }
}
