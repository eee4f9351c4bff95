//! Plain-text rendering for CLI output. `--json` output goes through serde
//! instead.

use chrono::{Local, TimeZone};
use soundtag_core::catalog::TagBatchReport;
use soundtag_core::models::{FileView, Stats, Tag};
use soundtag_core::scanner::ScanSummary;
use soundtag_core::watcher::WatchNotice;
use soundtag_core::IngestOutcome;

/// Formats a millisecond mtime in local time, or `-` when out of range.
pub fn format_mtime(mtime_ms: i64) -> String {
    match Local.timestamp_millis_opt(mtime_ms).single() {
        Some(ts) => ts.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => "-".to_string(),
    }
}

pub fn format_duration(secs: f64) -> String {
    let total = secs.max(0.0);
    let minutes = (total / 60.0).floor() as u64;
    let rest = total - (minutes as f64) * 60.0;
    format!("{minutes}:{rest:06.3}")
}

/// One line per file: duration, mtime, path and tags.
pub fn file_line(view: &FileView) -> String {
    let tags = if view.tags.is_empty() {
        String::new()
    } else {
        format!("  [{}]", view.tags.join(", "))
    };
    format!(
        "{:>10}  {}  {}{}",
        format_duration(view.duration()),
        format_mtime(view.file.mtime),
        view.file.path,
        tags
    )
}

pub fn file_detail(view: &FileView) -> String {
    let mut out = vec![
        format!("path:        {}", view.file.path),
        format!("id:          {}", view.file.id),
        format!("hash:        {}", view.file.hash),
        format!("modified:    {}", format_mtime(view.file.mtime)),
    ];
    match &view.metadata {
        Some(meta) => {
            out.push(format!("duration:    {}", format_duration(meta.duration)));
            out.push(format!("format:      {}", opt(meta.format.as_deref())));
            out.push(format!("sample rate: {}", opt(meta.sample_rate)));
            out.push(format!("channels:    {}", opt(meta.channels)));
            out.push(format!("bitrate:     {}", opt(meta.bitrate)));
        }
        None => out.push("metadata:    none".to_string()),
    }
    out.push(format!("tags:        {}", view.tags.join(", ")));
    out.join("\n")
}

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".into())
}

pub fn tag_list(tags: &[Tag]) -> String {
    tags.iter()
        .map(|t| t.name.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn stats_table(stats: &Stats) -> String {
    let mut out = vec![
        format!("files: {}", stats.total_files),
        format!("tags:  {}", stats.total_tags),
    ];
    let width = stats.per_tag.keys().map(|k| k.len()).max().unwrap_or(0);
    for (name, count) in &stats.per_tag {
        out.push(format!("  {name:<width$}  {count}"));
    }
    out.join("\n")
}

pub fn scan_line(summary: &ScanSummary) -> String {
    format!(
        "scan: discovered {}, indexed {}, degraded {}, failed {}",
        summary.discovered, summary.indexed, summary.degraded, summary.failed
    )
}

pub fn batch_line(verb: &str, tag: &str, report: &TagBatchReport) -> String {
    let mut line = format!("{verb} {} file(s) with '{tag}'", report.applied.len());
    if !report.missing.is_empty() {
        line.push_str(&format!(
            "; not in catalog: {}",
            report.missing.join(", ")
        ));
    }
    line
}

pub fn notice_line(notice: &WatchNotice) -> String {
    match notice {
        WatchNotice::ScanQueued { root, files } => {
            format!("queued {files} existing file(s) under {}", root.display())
        }
        WatchNotice::Indexed { path, outcome } => match outcome {
            IngestOutcome::Indexed { degraded: true, .. } => {
                format!("indexed {} (metadata unknown)", path.display())
            }
            IngestOutcome::Indexed { .. } => format!("indexed {}", path.display()),
            IngestOutcome::Vanished => format!("skipped {} (vanished)", path.display()),
            IngestOutcome::NotAFile => format!("skipped {} (not a file)", path.display()),
        },
        WatchNotice::Removed { path, rows } => {
            format!("removed {} ({rows} row(s))", path.display())
        }
        WatchNotice::Failed { path, error } => format!("failed {}: {error}", path.display()),
    }
}
