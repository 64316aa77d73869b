//! Watch mode: a debounced `notify` watcher over the source tree, the
//! packages tree and the two project files, feeding [`Xcx::handle_event`].

use std::sync::LazyLock;
use std::sync::mpsc::{Receiver, channel};
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use notify::event::{EventKind, ModifyKind};
use notify::{Event, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{DebounceEventResult, Debouncer, RecommendedCache, new_debouncer};
use regex::Regex;

use crate::config::{CONFIG_FILENAME, Config, PROJECT_FILENAME};
use crate::error::WatchError;
use crate::io::as_overhead;
use crate::xcx::{WatchEvent, Xcx};

static RE_IGNORED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)node_modules|\.git|\.txt|\.log|\.DS_Store|\.npmignore|package\.json")
        .expect("Error compiling ignore pattern")
});

/// Runs a full build, then rebuilds incrementally on every change until
/// the watcher shuts down.
pub fn watch(xcx: &mut Xcx) -> anyhow::Result<()> {
    tracing::info!("running initial build...");
    xcx.compile()?;

    let watcher = Watcher::new(xcx.config())?;
    tracing::info!("initial build completed, now watching for changes...");

    loop {
        let events = match watcher.recv() {
            Ok(events) => events,
            Err(WatchError::Recv(e)) => return Err(e.into()),
            Err(e) => {
                tracing::error!("watch error: {}", e);
                continue;
            }
        };

        for event in events {
            let s = Instant::now();
            tracing::debug!("{:?}", event);
            match xcx.handle_event(event) {
                Ok(()) => tracing::info!("rebuild complete {}", as_overhead(s)),
                Err(e) => tracing::error!("Error while rebuilding: {}", e),
            }
        }
    }
}

/// A debounced file system watcher classifying raw events into
/// [`WatchEvent`]s relative to the project root.
pub struct Watcher {
    cwd: Utf8PathBuf,
    /// Recursively watched roots.
    roots: Vec<Utf8PathBuf>,
    /// Single files watched through their directory.
    files: Vec<Utf8PathBuf>,
    rx: Receiver<DebounceEventResult>,
    _debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
}

impl Watcher {
    pub fn new(config: &Config) -> Result<Self, WatchError> {
        let (tx, rx) = channel();
        let mut debouncer = new_debouncer(Duration::from_millis(250), None, tx)?;

        let roots = watch_roots([config.src_dir(), config.packages_dir()]);
        for root in &roots {
            tracing::info!("watching {}", root);
            debouncer.watch(root, RecursiveMode::Recursive)?;
        }
        debouncer.watch(&config.cwd, RecursiveMode::NonRecursive)?;

        Ok(Self {
            cwd: config.cwd.clone(),
            roots,
            files: vec![config.cwd.join(CONFIG_FILENAME), config.cwd.join(PROJECT_FILENAME)],
            rx,
            _debouncer: debouncer,
        })
    }

    /// Blocks until the next batch of events.
    pub fn recv(&self) -> Result<Vec<WatchEvent>, WatchError> {
        let events = match self.rx.recv()? {
            Ok(events) => events,
            Err(mut errors) => {
                let Some(e) = errors.pop() else {
                    return Ok(Vec::new());
                };
                return Err(e.into());
            }
        };

        let mut out = vec![];
        for de in &events {
            for event in classify(&de.event) {
                let path = match &event {
                    WatchEvent::Add(p) | WatchEvent::Change(p) | WatchEvent::Unlink(p) => p,
                };
                if self.is_watched(path) && !out.contains(&event) {
                    out.push(event);
                }
            }
        }

        Ok(out
            .into_iter()
            .filter_map(|event| relative_event(event, &self.cwd))
            .collect())
    }

    fn is_watched(&self, path: &Utf8Path) -> bool {
        if RE_IGNORED.is_match(path.as_str()) {
            return false;
        }
        self.files.iter().any(|file| file == path) || self.roots.iter().any(|root| path.starts_with(root))
    }
}

/// Maps a raw event to add, change or unlink events with absolute paths.
/// A path that no longer exists is always reported as unlinked.
fn classify(event: &Event) -> Vec<WatchEvent> {
    let paths = event
        .paths
        .iter()
        .filter_map(|p| Utf8PathBuf::try_from(p.clone()).ok());

    match event.kind {
        EventKind::Create(_) => paths.map(|p| existing(p, WatchEvent::Add)).collect(),
        EventKind::Modify(ModifyKind::Name(_)) => paths.map(|p| existing(p, WatchEvent::Add)).collect(),
        EventKind::Modify(ModifyKind::Metadata(_)) => vec![],
        EventKind::Modify(_) => paths.map(|p| existing(p, WatchEvent::Change)).collect(),
        EventKind::Remove(_) => paths.map(WatchEvent::Unlink).collect(),
        _ => vec![],
    }
}

fn existing(path: Utf8PathBuf, event: fn(Utf8PathBuf) -> WatchEvent) -> WatchEvent {
    if path.is_file() {
        event(path)
    } else {
        WatchEvent::Unlink(path)
    }
}

fn relative_event(event: WatchEvent, cwd: &Utf8Path) -> Option<WatchEvent> {
    let rel = |p: Utf8PathBuf| p.strip_prefix(cwd).ok().map(Utf8Path::to_path_buf);
    Some(match event {
        WatchEvent::Add(p) => WatchEvent::Add(rel(p)?),
        WatchEvent::Change(p) => WatchEvent::Change(rel(p)?),
        WatchEvent::Unlink(p) => WatchEvent::Unlink(rel(p)?),
    })
}

/// Existing directories among `dirs`, without those nested in another one.
fn watch_roots(dirs: impl IntoIterator<Item = Utf8PathBuf>) -> Vec<Utf8PathBuf> {
    let mut dirs: Vec<_> = dirs.into_iter().filter(|dir| dir.is_dir()).collect();
    dirs.sort();
    dirs.dedup();

    let nested = |dir: &Utf8PathBuf| dirs.iter().any(|other| other != dir && dir.starts_with(other));
    dirs.iter().filter(|dir| !nested(*dir)).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind, RenameMode};

    #[test]
    fn test_watch_roots() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        for sub in ["src/packages", "lib", "src-old"] {
            std::fs::create_dir_all(root.join(sub)).unwrap();
        }

        let roots = watch_roots([
            root.join("src/packages"),
            root.join("src"),
            root.join("src-old"),
            root.join("lib"),
            root.join("src"),
            root.join("missing"),
        ]);
        assert_eq!(roots, vec![root.join("lib"), root.join("src"), root.join("src-old")]);
    }

    #[test]
    fn test_classify() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let file = root.join("a.js");
        std::fs::write(&file, "").unwrap();
        let gone = root.join("b.js");

        let event = |kind| Event::new(kind).add_path(file.clone().into());
        assert_eq!(
            classify(&event(EventKind::Create(CreateKind::File))),
            vec![WatchEvent::Add(file.clone())]
        );
        assert_eq!(
            classify(&event(EventKind::Modify(ModifyKind::Data(DataChange::Content)))),
            vec![WatchEvent::Change(file.clone())]
        );
        assert!(classify(&event(EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any)))).is_empty());

        let renamed = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(gone.clone().into())
            .add_path(file.clone().into());
        assert_eq!(
            classify(&renamed),
            vec![WatchEvent::Unlink(gone.clone()), WatchEvent::Add(file.clone())]
        );

        let removed = Event::new(EventKind::Remove(RemoveKind::File)).add_path(gone.clone().into());
        assert_eq!(classify(&removed), vec![WatchEvent::Unlink(gone)]);
    }

    #[test]
    fn test_relative_event() {
        let cwd = Utf8Path::new("/p");
        assert_eq!(
            relative_event(WatchEvent::Change("/p/src/a.js".into()), cwd),
            Some(WatchEvent::Change("src/a.js".into()))
        );
        assert_eq!(relative_event(WatchEvent::Add("/q/a.js".into()), cwd), None);
    }

    #[test]
    fn test_ignored_paths() {
        assert!(RE_IGNORED.is_match("/p/src/node_modules/x.js"));
        assert!(RE_IGNORED.is_match("/p/src/packages/bee-a/package.json"));
        assert!(RE_IGNORED.is_match("/p/src/.DS_Store"));
        assert!(!RE_IGNORED.is_match("/p/src/pages/home/index.wxp"));
    }
}
