//! Human-readable `--once` output.

use colored::Colorize;

use dirmirror_core::SyncSettings;
use dirmirror_sync::PassReport;

pub fn print_report(settings: &SyncSettings, report: &PassReport) {
    let source = settings.roots.source.display();
    let replica = settings.roots.replica.display();

    if let Some(reason) = &report.aborted {
        println!("{} {source} → {replica}: {reason}", "✗".red().bold());
        return;
    }

    let mark = if report.is_clean() {
        "✓".green().bold()
    } else {
        "!".yellow().bold()
    };
    if report.changes() == 0 && report.is_clean() {
        println!("{mark} {source} → {replica} already in sync ({} files)", report.unchanged);
        return;
    }

    println!(
        "{mark} {source} → {replica} synced in {} ms ({} copied, {} unchanged)",
        report.duration_ms, report.copied, report.unchanged
    );
    let lines = [
        ("copied", report.copied, format!("{} bytes", report.bytes_copied)),
        ("created dirs", report.created_dirs, String::new()),
        ("deleted files", report.deleted_files, String::new()),
        ("deleted dirs", report.deleted_dirs, String::new()),
        ("failed", report.failed, "retried next pass".to_string()),
        ("errors", report.errors, "see log".to_string()),
    ];
    for (label, count, note) in lines {
        if count == 0 {
            continue;
        }
        if note.is_empty() {
            println!("  {label:<14}{count}");
        } else {
            println!("  {label:<14}{count}  {}", note.dimmed());
        }
    }
}
