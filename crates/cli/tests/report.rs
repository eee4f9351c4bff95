use cli::report;
use soundtag_core::catalog::TagBatchReport;
use soundtag_core::models::{AudioMetadata, FileRecord, FileView, Stats};
use soundtag_core::watcher::WatchNotice;
use soundtag_core::IngestOutcome;
use std::collections::BTreeMap;
use std::path::PathBuf;

fn view(tags: &[&str], metadata: Option<AudioMetadata>) -> FileView {
    FileView {
        file: FileRecord {
            id: 7,
            path: "/lib/kick.wav".into(),
            hash: "ab".repeat(32),
            mtime: 0,
        },
        metadata,
        tags: tags.iter().map(|t| t.to_string()).collect(),
    }
}

#[test]
fn file_line_shows_duration_path_and_tags() {
    let meta = AudioMetadata {
        duration: 90.25,
        ..AudioMetadata::unknown()
    };
    let line = report::file_line(&view(&["drum", "loop"], Some(meta)));
    assert!(line.contains("1:30.250"), "{line}");
    assert!(line.contains("/lib/kick.wav"));
    assert!(line.ends_with("[drum, loop]"));

    let bare = report::file_line(&view(&[], None));
    assert!(bare.trim_start().starts_with("0:00.000"));
    assert!(bare.ends_with("/lib/kick.wav"));
}

#[test]
fn detail_marks_missing_fields() {
    let text = report::file_detail(&view(&[], Some(AudioMetadata::unknown())));
    assert!(text.contains("sample rate: -"));
    assert!(text.contains("format:      -"));

    let text = report::file_detail(&view(&["fx"], None));
    assert!(text.contains("metadata:    none"));
    assert!(text.contains("tags:        fx"));
}

#[test]
fn stats_table_lists_every_tag() {
    let mut per_tag = BTreeMap::new();
    per_tag.insert("bass".to_string(), 0);
    per_tag.insert("favorite".to_string(), 3);
    let stats = Stats {
        total_files: 3,
        total_tags: 2,
        per_tag,
    };
    let table = report::stats_table(&stats);
    let lines: Vec<&str> = table.lines().collect();
    assert_eq!(lines[0], "files: 3");
    assert_eq!(lines[2], "  bass      0");
    assert_eq!(lines[3], "  favorite  3");
}

#[test]
fn batch_line_names_uncataloged_paths() {
    let report = TagBatchReport {
        applied: vec!["/lib/a.wav".into()],
        missing: vec!["/lib/ghost.wav".into()],
    };
    assert_eq!(
        report::batch_line("tagged", "loop", &report),
        "tagged 1 file(s) with 'loop'; not in catalog: /lib/ghost.wav"
    );
}

#[test]
fn notices_render_one_line_each() {
    let degraded = WatchNotice::Indexed {
        path: PathBuf::from("/lib/a.mp3"),
        outcome: IngestOutcome::Indexed {
            file_id: 1,
            hash: "00".into(),
            degraded: true,
        },
    };
    assert_eq!(
        report::notice_line(&degraded),
        "indexed /lib/a.mp3 (metadata unknown)"
    );
    let removed = WatchNotice::Removed {
        path: PathBuf::from("/lib/a.mp3"),
        rows: 1,
    };
    assert_eq!(report::notice_line(&removed), "removed /lib/a.mp3 (1 row(s))");
}
