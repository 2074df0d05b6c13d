//! Filesystem watching (spec §4.7), backed by `notify`'s recommended
//! watcher running on its own background thread. Events are forwarded as
//! plain `(full_path, kind)` pairs through the same completion channel the
//! rest of the reactor uses.

use super::PendingCompletion;
use crossbeam_channel::Sender;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Modified,
    Renamed,
    Deleted,
}

fn classify(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Modify(notify::event::ModifyKind::Name(_)) => Some(ChangeKind::Renamed),
        EventKind::Modify(_) | EventKind::Create(_) => Some(ChangeKind::Modified),
        EventKind::Remove(_) => Some(ChangeKind::Deleted),
        _ => None,
    }
}

/// Keeps the underlying `notify` watcher alive; dropping it stops the watch.
pub struct WatchHandle {
    _inner: RecommendedWatcher,
}

pub fn start(path: String, watch_id: u64, sender: Sender<PendingCompletion>) -> Result<WatchHandle, String> {
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        let Ok(event) = res else { return };
        let Some(kind) = classify(&event.kind) else { return };
        for p in event.paths {
            let _ = sender.send(PendingCompletion::FsEvent {
                watch_id,
                path: p.to_string_lossy().into_owned(),
                kind,
            });
        }
    })
    .map_err(|e| e.to_string())?;

    watcher.watch(Path::new(&path), RecursiveMode::Recursive).map_err(|e| e.to_string())?;

    Ok(WatchHandle { _inner: watcher })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_modify_events_classify_as_modified() {
        assert_eq!(classify(&EventKind::Create(notify::event::CreateKind::File)), Some(ChangeKind::Modified));
        assert_eq!(classify(&EventKind::Modify(notify::event::ModifyKind::Any)), Some(ChangeKind::Modified));
    }

    #[test]
    fn remove_events_classify_as_deleted() {
        assert_eq!(classify(&EventKind::Remove(notify::event::RemoveKind::File)), Some(ChangeKind::Deleted));
    }

    #[test]
    fn name_modifications_classify_as_renamed() {
        assert_eq!(
            classify(&EventKind::Modify(notify::event::ModifyKind::Name(notify::event::RenameMode::Any))),
            Some(ChangeKind::Renamed)
        );
    }
}
