//! Files waiting for the next incremental pass.

use std::collections::BTreeSet;

use camino::{Utf8Path, Utf8PathBuf};

use crate::config::Config;
use crate::resolve::path::is_package_name;

/// Project-relative source paths to rebuild.
///
/// `lack` holds files with unresolved references and survives passes until
/// the reference resolves; `buffer` holds files touched by watch events and
/// is emptied after every pass.
#[derive(Debug, Default, Clone)]
pub struct PendingQueue {
    lack: BTreeSet<Utf8PathBuf>,
    buffer: BTreeSet<Utf8PathBuf>,
}

impl PendingQueue {
    pub fn add_lack(&mut self, path: impl Into<Utf8PathBuf>) {
        self.lack.insert(path.into());
    }

    pub fn remove_lack(&mut self, path: &Utf8Path) {
        self.lack.remove(path);
    }

    pub fn has_lack(&self, path: &Utf8Path) -> bool {
        self.lack.contains(path)
    }

    pub fn add(&mut self, path: impl Into<Utf8PathBuf>) {
        self.buffer.insert(path.into());
    }

    /// Everything to rebuild, missing references first.
    pub fn get(&self) -> Vec<Utf8PathBuf> {
        let mut out: Vec<_> = self.lack.iter().cloned().collect();
        out.extend(self.buffer.iter().filter(|p| !self.lack.contains(*p)).cloned());
        out
    }

    pub fn is_empty(&self) -> bool {
        self.lack.is_empty() && self.buffer.is_empty()
    }

    /// Empties the buffer, keeping missing references.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    pub fn clear(&mut self) {
        self.lack.clear();
        self.buffer.clear();
    }
}

/// The documentation page rendering a demo, a doc or a package readme.
///
/// * `<dir>/demos/*.wxc` and `<dir>/docs/*.md` belong to `<dir>/index.wxp`;
/// * `<packages>/<prefix><name>/README.md` belongs to `<pages>/<name>/index.wxp`.
///
/// Returns the project-relative page path when the page exists.
pub fn doc_root_page(config: &Config, path: &Utf8Path) -> Option<Utf8PathBuf> {
    let dir = path.parent()?;
    let dir_name = dir.file_name()?;
    let ext = path.extension().unwrap_or_default();

    let page = if (ext == "wxc" && dir_name == "demos") || (ext == "md" && dir_name == "docs") {
        dir.parent()?.join("index.wxp")
    } else if path.file_name()?.eq_ignore_ascii_case("readme.md")
        && dir.parent() == Some(config.packages.as_path())
        && is_package_name(dir_name, &config.prefix_str)
    {
        let name = &dir_name[config.prefix_str.len()..];
        config.pages.join(name).join("index.wxp")
    } else {
        return None;
    };

    config.cwd.join(&page).is_file().then_some(page)
}
