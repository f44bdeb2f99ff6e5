//! File system watcher for live documents.
//!
//! Monitors the vault and applies edits to the open pages: frontmatter edits
//! re-render the affected live blocks through reconciliation, structural edits
//! remount them.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Event Loop                              │
//! │                                                              │
//! │  ┌──────────┐    ┌──────────┐    ┌────────────────────────┐  │
//! │  │ notify   │───▶│ Debouncer│───▶│    handle_changes()    │  │
//! │  │ events   │    │          │    │                        │  │
//! │  └──────────┘    └──────────┘    │  Session::reload()     │  │
//! │                                  │   ├ metadata: reconcile│  │
//! │  ┌──────────┐                    │   └ layout: remount    │  │
//! │  │ Ctrl+C   │──► stop, flush     │  print page            │  │
//! │  └──────────┘                    └────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use crate::{
    blocks::DocPath,
    config::SheetConfig,
    host::Change,
    log,
    logger::WatchStatus,
    session::{Reload, Session},
};
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use rustc_hash::FxHashSet;
use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc::RecvTimeoutError,
    },
    time::{Duration, Instant},
};

// =============================================================================
// Constants
// =============================================================================

/// Longest wait between checks of the Ctrl+C flag
const TICK_MS: u64 = 250;

// =============================================================================
// Path Utilities
// =============================================================================

/// Check if path is a temp/backup file (editor artifacts).
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}

/// Format path as relative for log display.
///
/// `/vault/sheets/hero.md` → `sheets/hero.md`
fn rel_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}

// =============================================================================
// Debounce State
// =============================================================================

/// Batches rapid file events.
struct Debouncer {
    delay: Duration,
    pending: FxHashSet<PathBuf>,
    last_event: Option<Instant>,
}

impl Debouncer {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: FxHashSet::default(),
            last_event: None,
        }
    }

    fn add(&mut self, event: Event) {
        for path in event.paths {
            if !is_temp_file(&path) {
                self.pending.insert(path);
            }
        }
        self.last_event = Some(Instant::now());
    }

    fn ready(&self) -> bool {
        !self.pending.is_empty() && self.last_event.is_some_and(|t| t.elapsed() >= self.delay)
    }

    fn take(&mut self) -> Vec<PathBuf> {
        self.last_event = None;
        let mut paths: Vec<_> = self.pending.drain().collect();
        paths.sort();
        paths
    }

    fn timeout(&self) -> Duration {
        let tick = Duration::from_millis(TICK_MS);
        if self.pending.is_empty() {
            tick
        } else {
            self.delay.min(tick)
        }
    }
}

// =============================================================================
// Event Handler
// =============================================================================

/// Which documents the watch session prints.
enum Focus {
    All,
    One(DocPath),
}

impl Focus {
    fn includes(&self, document: &DocPath) -> bool {
        match self {
            Self::All => true,
            Self::One(focus) => focus == document,
        }
    }
}

fn handle_changes(paths: &[PathBuf], session: &Session, focus: &Focus, status: &mut WatchStatus) {
    let root = session.vault().root().to_path_buf();

    for path in paths {
        let rel = rel_path(path, &root);
        let reload = match session.reload(path) {
            Ok(reload) => reload,
            Err(e) => {
                status.error(&format!("failed: {rel}"), &format!("{e:#}"));
                continue;
            }
        };

        match reload {
            Reload::Ignored => {}
            Reload::Removed(document) => {
                if focus.includes(&document) {
                    status.success(&format!("removed: {document}"));
                }
            }
            Reload::Updated { document, .. } if !focus.includes(&document) => {}
            Reload::Updated {
                change: Change::Unchanged,
                document,
                ..
            } => status.unchanged(document.as_str()),
            Reload::Updated {
                document,
                change,
                layout,
            } => {
                let what = match (change, layout) {
                    (_, Some(layout)) if layout.changed() => "remounted",
                    (_, Some(layout)) if layout.rerendered > 0 => "reconciled",
                    (Change::Metadata, Some(_)) => "reconciled",
                    (Change::Created, _) | (_, None) => "opened",
                    _ => "updated",
                };
                match session.render(&document) {
                    Ok(page) => {
                        status.success(&format!("{what}: {document}"));
                        status.persist(&page);
                    }
                    Err(e) => status.error(&format!("failed: {document}"), &format!("{e:#}")),
                }
            }
        }
    }
}

// =============================================================================
// Public API
// =============================================================================

/// Open the vault, print the watched pages, and follow edits until Ctrl+C.
pub fn watch_vault(config: &SheetConfig, target: Option<&Path>) -> Result<()> {
    let session = Session::open(config.clone())?;
    let focus = match target {
        Some(file) => Focus::One(session.document(file)?),
        None => Focus::All,
    };

    let initial = match &focus {
        Focus::All => session.vault().documents(),
        Focus::One(document) => vec![document.clone()],
    };
    let mut status = WatchStatus::new();
    for document in &initial {
        status.persist(&format!("── {document}\n{}", session.render(document)?));
    }

    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst))
        .context("Failed to set Ctrl+C handler")?;

    let (tx, rx) = std::sync::mpsc::channel();
    let mut watcher = notify::recommended_watcher(tx).context("Failed to create file watcher")?;
    let root = session.vault().root().to_path_buf();
    watcher
        .watch(&root, RecursiveMode::Recursive)
        .with_context(|| format!("Failed to watch {}", root.display()))?;
    log!("watch"; "watching {} ({} live blocks)", root.display(), live_blocks(&session, &initial));

    let mut debouncer = Debouncer::new(config.watch.debounce());
    while running.load(Ordering::SeqCst) {
        match rx.recv_timeout(debouncer.timeout()) {
            Ok(Ok(event)) if is_relevant(&event) => debouncer.add(event),
            Ok(Err(e)) => log!("watch"; "error: {e}"),
            Err(RecvTimeoutError::Disconnected) => break,
            // Irrelevant events, timeouts
            _ => {}
        }
        if debouncer.ready() {
            handle_changes(&debouncer.take(), &session, &focus, &mut status);
        }
    }

    log!("watch"; "stopping, saving state to {}", config.store.path.display());
    session.close()
}

fn live_blocks(session: &Session, documents: &[DocPath]) -> usize {
    documents.iter().map(|d| session.blocks().live_count(d)).sum()
}

const fn is_relevant(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
    )
}
