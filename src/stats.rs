//! Store statistics, scan diagnostics and cache overview.
//!
//! Used by `scout stats`, `scout diagnostics` and `scout cache show` to
//! give confidence that scans are reaching the repository and that the
//! cache is doing its job.

use repo_scout_core::models::{EntryType, KnowledgeStats, ScanDiagnostics};

use crate::cache::ScanCacheRecord;
use crate::engine::InitializationState;
use crate::progress::format_number;

pub fn print_stats(stats: &KnowledgeStats, state: &InitializationState) {
    println!("Repo Scout — Knowledge Stats");
    println!("============================");
    println!();
    println!(
        "  Repository:  {}",
        state
            .last_repository_fingerprint
            .as_deref()
            .unwrap_or("(none)")
    );
    println!(
        "  Data:        {}",
        if state.using_mock_data {
            "synthetic (mock)"
        } else {
            "repository"
        }
    );
    println!("  Entries:     {}", format_number(stats.total_entries as u64));
    println!(
        "  Files:       {}",
        format_number(stats.processed_file_count as u64)
    );

    if !stats.by_type.is_empty() {
        println!();
        println!("  By type:");
        println!("  {:<18} {:>8}", "TYPE", "ENTRIES");
        println!("  {}", "-".repeat(27));
        for entry_type in EntryType::ALL {
            if let Some(count) = stats.by_type.get(&entry_type) {
                println!(
                    "  {:<18} {:>8}",
                    entry_type.as_str(),
                    format_number(*count as u64)
                );
            }
        }
    }
    println!();
}

pub fn print_diagnostics(diagnostics: &ScanDiagnostics) {
    if diagnostics.repository.is_empty() {
        println!("No scan has run (synthetic data or empty store).");
        return;
    }

    println!("Scan of {}", diagnostics.repository);
    if let (Some(start), Some(end)) = (diagnostics.started_at, diagnostics.finished_at) {
        let secs = (end - start).num_milliseconds() as f64 / 1000.0;
        println!(
            "  finished {} ({:.1}s)",
            format_ts_relative(end.timestamp()),
            secs
        );
    }
    println!("  scale:      {:?}", diagnostics.scale);
    println!("  attempted:  {}", diagnostics.attempted_paths.len());
    println!("  successful: {}", diagnostics.successful_paths.len());
    println!(
        "  processed:  {} files ({} distinct)",
        diagnostics.processed_files.len(),
        diagnostics.unique_processed_files().len()
    );
    println!("  skipped:    {} files", diagnostics.skipped_files);

    if !diagnostics.successful_paths.is_empty() {
        println!();
        println!("  Successful paths:");
        for path in &diagnostics.successful_paths {
            println!("    {}", display_path(path));
        }
    }

    if !diagnostics.failures.is_empty() {
        println!();
        println!("  Failures:");
        for (kind, count) in diagnostics.failure_counts() {
            println!("    {:<14} {}", kind.to_string(), count);
        }
        println!();
        for failure in &diagnostics.failures {
            println!(
                "    {:<40} {}",
                display_path(&failure.path),
                failure.message
            );
        }
    }
    println!();
}

pub fn print_cache_record(record: Option<&ScanCacheRecord>, bytes: Option<usize>) {
    let Some(record) = record else {
        println!("Cache is empty.");
        return;
    };
    println!("Cached scan");
    println!("  repository: {}", record.repository_id);
    println!("  version:    {}", record.cache_version);
    println!(
        "  scanned:    {}",
        format_ts_relative(record.last_scan_time / 1000)
    );
    println!("  entries:    {}", record.knowledge_snapshot.len());
    println!(
        "  files:      {}",
        record.diagnostics.unique_processed_files().len()
    );
    println!("  confirmed:  {}", record.fetch_confirmed);
    if let Some(bytes) = bytes {
        println!("  size:       {}", format_bytes(bytes as u64));
    }
}

fn display_path(path: &str) -> &str {
    if path.is_empty() {
        "/"
    } else {
        path
    }
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_are_humanized() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn relative_times() {
        let now = chrono::Utc::now().timestamp();
        assert_eq!(format_ts_relative(now), "just now");
        assert_eq!(format_ts_relative(now - 2 * 3600), "2 hours ago");
        assert_eq!(format_ts_relative(now - 86400), "1 day ago");
    }
}
