//! Watch mode.
//!
//! After an initial `styles` run, the static roots of the configured watch
//! globs are observed with a debounced recursive watcher. Every debounced
//! batch that creates, modifies or removes a path matching one of the globs
//! triggers exactly one new `styles` run. Access events are ignored, since
//! every run reads the sources it watches.
//!
//! Runs happen on the watching thread, one at a time. Batches that arrive
//! while a run is in progress queue up in the channel and are merged into a
//! single follow-up run, so a burst of saves never stacks up rebuilds. A
//! failing run is logged (the notifier has already been told by the runner)
//! and the loop keeps going.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::mpsc::{Receiver, channel};
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use glob::Pattern;
use notify::{EventKind, RecursiveMode};
use notify_debouncer_full::{DebounceEventResult, new_debouncer};

use crate::Pipeline;
use crate::core::as_overhead;
use crate::error::WatchError;
use crate::tasks::STYLES;

pub(crate) fn watch(pipeline: &Pipeline) -> Result<(), WatchError> {
    let config = pipeline.config();

    tracing::info!("running initial build...");
    rebuild(pipeline);

    let mut watched = HashSet::new();
    let mut filters = Vec::new();
    for glob in &config.watch {
        match resolve_watch_path(&config.root, glob) {
            Ok((path, pattern)) => {
                watched.insert(path);
                filters.push(pattern);
            }
            Err(e) => tracing::error!("failed to resolve watch path {}: {}", glob, e),
        }
    }

    let (tx, rx) = channel::<DebounceEventResult>();
    let mut debouncer = new_debouncer(config.debounce(), None, tx)?;

    for path in collapse_watch_paths(watched) {
        tracing::info!("watching {}", path);
        debouncer.watch(&path, RecursiveMode::Recursive)?;
    }

    tracing::info!("now watching for changes...");

    loop {
        let first = rx.recv()?;

        let mut changed = BTreeSet::new();
        for batch in collect_batch(first, &rx) {
            match batch {
                Ok(events) => {
                    for de in events.iter().filter(|de| is_content_change(&de.event.kind)) {
                        for path in &de.event.paths {
                            if matches_any(&filters, path) {
                                changed.insert(path.clone());
                            }
                        }
                    }
                }
                Err(errors) => {
                    for e in errors {
                        tracing::error!("watch error: {:?}", e);
                    }
                }
            }
        }

        if changed.is_empty() {
            continue;
        }

        for path in &changed {
            tracing::debug!("changed {}", path.display());
        }
        tracing::info!("{} file(s) changed, re-running {}...", changed.len(), STYLES);
        rebuild(pipeline);
    }
}

fn rebuild(pipeline: &Pipeline) {
    let started = Instant::now();
    match pipeline.run(STYLES) {
        Ok(_) => tracing::info!("rebuild complete {}", as_overhead(started)),
        Err(e) => tracing::error!("rebuild failed, waiting for changes.\n{}", e),
    }
}

/// Takes the batch that woke the loop together with everything queued behind
/// it, without blocking.
fn collect_batch<T>(first: T, rx: &Receiver<T>) -> Vec<T> {
    let mut batch = vec![first];
    batch.extend(rx.try_iter());
    batch
}

fn is_content_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(..) | EventKind::Modify(..) | EventKind::Remove(..)
    )
}

fn matches_any(filters: &[Pattern], path: &Path) -> bool {
    filters.iter().any(|filter| filter.matches_path(path))
}

/// Splits a glob relative to `root` into a canonicalized static directory to
/// watch and an absolute pattern for matching event paths.
fn resolve_watch_path(root: &Utf8Path, glob: &str) -> Result<(Utf8PathBuf, Pattern), WatchError> {
    let path = root.join(glob);

    let components: Vec<_> = path.components().collect();
    let split = components
        .iter()
        .position(|c| c.as_str().contains(['*', '?', '[']))
        .unwrap_or(components.len());

    let static_part: Utf8PathBuf = components[..split].iter().collect();
    let dynamic_part: Utf8PathBuf = components[split..].iter().collect();

    let absolute = static_part.canonicalize_utf8()?;
    let escaped = Pattern::escape(absolute.as_str());

    if !dynamic_part.as_str().is_empty() {
        let pattern = Pattern::new(&format!("{escaped}/{dynamic_part}"))?;
        return Ok((absolute, pattern));
    }

    if absolute.is_file() {
        // editors replace files, so the parent is watched
        let parent = absolute.parent().unwrap_or(&absolute).to_path_buf();
        return Ok((parent, Pattern::new(&escaped)?));
    }

    let pattern = Pattern::new(&format!("{escaped}/**/*"))?;
    Ok((absolute, pattern))
}

/// Reduces a set of paths to the minimal set of recursive watch roots.
fn collapse_watch_paths(paths: HashSet<Utf8PathBuf>) -> Vec<Utf8PathBuf> {
    let mut paths: Vec<_> = paths.into_iter().collect();
    paths.sort();

    let mut filtered: Vec<Utf8PathBuf> = Vec::new();
    for path in paths {
        if let Some(last) = filtered.last()
            && path.starts_with(last)
        {
            continue;
        }
        filtered.push(path);
    }

    filtered
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn project() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap().to_path_buf();

        fs::create_dir_all(root.join("assets/sass/partials")).unwrap();
        fs::write(root.join("assets/sass/style.scss"), "").unwrap();
        fs::write(root.join("assets/sass/partials/_buttons.scss"), "").unwrap();
        fs::write(root.join("camber.toml"), "").unwrap();

        (dir, root)
    }

    #[test]
    fn test_wildcard_watches_static_root() {
        let (_dir, root) = project();
        let canonical = root.canonicalize_utf8().unwrap();

        let (watch, pattern) = resolve_watch_path(&root, "assets/sass/**/*.scss").unwrap();

        assert_eq!(watch, canonical.join("assets/sass"));
        assert!(pattern.matches_path(canonical.join("assets/sass/partials/_buttons.scss").as_std_path()));
        assert!(pattern.matches_path(canonical.join("assets/sass/style.scss").as_std_path()));
        assert!(!pattern.matches_path(canonical.join("assets/sass/style.css").as_std_path()));
        assert!(!pattern.matches_path(canonical.join("style.scss").as_std_path()));
    }

    #[test]
    fn test_concrete_file_watches_parent() {
        let (_dir, root) = project();
        let canonical = root.canonicalize_utf8().unwrap();

        let (watch, pattern) = resolve_watch_path(&root, "camber.toml").unwrap();

        assert_eq!(watch, canonical);
        assert!(pattern.matches_path(canonical.join("camber.toml").as_std_path()));
        assert!(!pattern.matches_path(canonical.join("style.css").as_std_path()));
    }

    #[test]
    fn test_concrete_directory_matches_contents() {
        let (_dir, root) = project();
        let canonical = root.canonicalize_utf8().unwrap();

        let (watch, pattern) = resolve_watch_path(&root, "assets").unwrap();

        assert_eq!(watch, canonical.join("assets"));
        assert!(pattern.matches_path(canonical.join("assets/sass/style.scss").as_std_path()));
    }

    #[test]
    fn test_missing_static_root() {
        let (_dir, root) = project();
        assert!(matches!(
            resolve_watch_path(&root, "nope/**/*.scss"),
            Err(WatchError::Io(_))
        ));
    }

    #[test]
    fn test_matches_any() {
        let filters = vec![
            Pattern::new("/theme/assets/sass/**/*.scss").unwrap(),
            Pattern::new("/theme/camber.toml").unwrap(),
        ];

        assert!(matches_any(&filters, Path::new("/theme/assets/sass/a/_b.scss")));
        assert!(matches_any(&filters, Path::new("/theme/camber.toml")));
        assert!(!matches_any(&filters, Path::new("/theme/style.css")));
        assert!(!matches_any(&[], Path::new("/theme/camber.toml")));
    }

    #[test]
    fn test_reads_are_not_changes() {
        use notify::event::{AccessKind, AccessMode, CreateKind, DataChange, ModifyKind, RemoveKind};

        assert!(is_content_change(&EventKind::Create(CreateKind::File)));
        assert!(is_content_change(&EventKind::Modify(ModifyKind::Data(DataChange::Any))));
        assert!(is_content_change(&EventKind::Remove(RemoveKind::File)));

        assert!(!is_content_change(&EventKind::Access(AccessKind::Read)));
        assert!(!is_content_change(&EventKind::Access(AccessKind::Open(AccessMode::Any))));
        assert!(!is_content_change(&EventKind::Access(AccessKind::Close(AccessMode::Read))));
        assert!(!is_content_change(&EventKind::Any));
    }

    #[test]
    fn test_collect_batch_drains_queued_events() {
        let (tx, rx) = channel();
        tx.send(2).unwrap();
        tx.send(3).unwrap();

        assert_eq!(collect_batch(1, &rx), vec![1, 2, 3]);
        assert_eq!(collect_batch(4, &rx), vec![4]);
    }

    #[test]
    fn test_collapse_watch_paths() {
        let paths = HashSet::from([
            Utf8PathBuf::from("/a"),
            Utf8PathBuf::from("/a/b"),
            Utf8PathBuf::from("/a/b/c"),
            Utf8PathBuf::from("/b"),
            Utf8PathBuf::from("/c/d"),
        ]);

        assert_eq!(
            collapse_watch_paths(paths),
            vec![
                Utf8PathBuf::from("/a"),
                Utf8PathBuf::from("/b"),
                Utf8PathBuf::from("/c/d")
            ]
        );
    }

    #[test]
    fn test_collapse_watch_paths_keeps_siblings() {
        let paths = HashSet::from([
            Utf8PathBuf::from("/a/x"),
            Utf8PathBuf::from("/a/y"),
            Utf8PathBuf::from("/foo"),
            Utf8PathBuf::from("/foo-bar"),
        ]);

        assert_eq!(
            collapse_watch_paths(paths),
            vec![
                Utf8PathBuf::from("/a/x"),
                Utf8PathBuf::from("/a/y"),
                Utf8PathBuf::from("/foo"),
                Utf8PathBuf::from("/foo-bar"),
            ]
        );
    }
}
