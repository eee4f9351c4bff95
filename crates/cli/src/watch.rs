use crate::report;
use anyhow::Result;
use soundtag_core::config::AppConfig;
use soundtag_core::watcher::{WatchController, WatchNotice};
use soundtag_core::Ingestor;
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

/// Roots given on the command line win over `watch.roots`; with neither,
/// the current directory is watched.
pub fn resolve_roots(cfg: &AppConfig, args: Vec<String>) -> Vec<PathBuf> {
    let mut roots: Vec<PathBuf> = if args.is_empty() {
        cfg.watch.roots.iter().map(PathBuf::from).collect()
    } else {
        args.into_iter().map(PathBuf::from).collect()
    };
    if roots.is_empty() {
        roots.push(PathBuf::from("."));
    }
    roots
}

pub fn render_notice(notice: &WatchNotice, json: bool) -> Result<String> {
    if json {
        Ok(serde_json::to_string(notice)?)
    } else {
        Ok(report::notice_line(notice))
    }
}

/// Watches `roots` and prints notices until Ctrl-C, then drains the queue.
pub async fn watch_paths(
    ingestor: Ingestor,
    cfg: &AppConfig,
    roots: Vec<PathBuf>,
    json: bool,
) -> Result<()> {
    let controller = WatchController::start(ingestor, cfg.watch.clone());
    let mut notices = controller.subscribe();
    for root in &roots {
        controller.watch(root)?;
    }
    if !json {
        println!("Watching {} path(s)...", controller.roots().len());
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            notice = notices.recv() => match notice {
                Ok(notice) => println!("{}", render_notice(&notice, json)?),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "dropped watch notices"),
                Err(RecvError::Closed) => break,
            },
        }
    }
    controller.shutdown().await;
    Ok(())
}
