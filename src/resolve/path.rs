//! Pure path helpers: source to destination mapping and relative references.

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};

use crate::config::Config;

/// Maps a project-relative source path to its project-relative destination.
///
/// Rules are applied in order, each matching whole segments only:
/// 1. the source root is replaced with the dest root (unless publishing);
/// 2. the packages root is replaced with the npm destination;
/// 3. every package store segment is replaced with the npm destination,
///    minus its first segment when the store is not at the root;
/// 4. the first `src` folder directly inside a component package is renamed
///    to the package's `dest` folder.
///
/// The mapping is idempotent on destination paths.
pub fn src_to_dest_relative(config: &Config, src_relative: &Utf8Path, is_publish: bool) -> Utf8PathBuf {
    let mut segs = segments(src_relative);

    let src = segments(&config.src);
    if !is_publish && starts_with(&segs, &src) {
        segs = replace_prefix(segs, src.len(), &config.dest);
    }

    let packages = segments(&config.packages);
    if starts_with(&segs, &packages) {
        segs = replace_prefix(segs, packages.len(), &config.npm.dest);
    }

    let npm_dest = segments(&config.npm.dest);
    let mut out = Vec::with_capacity(segs.len() + npm_dest.len());
    for (i, seg) in segs.into_iter().enumerate() {
        if seg != config.npm.src {
            out.push(seg);
        } else if i == 0 {
            out.extend(npm_dest.iter().cloned());
        } else {
            out.extend(npm_dest.iter().skip(1).cloned());
        }
    }

    if let Some(i) = (1..out.len()).find(|&i| is_package_name(&out[i], &config.prefix_str))
        && let Some(next) = out.get_mut(i + 1)
        && *next == config.package.src
    {
        *next = config.package.dest.clone();
    }

    out.iter().collect()
}

/// Whether a path segment names a component package, e.g. `bee-button`.
pub fn is_package_name(seg: &str, prefix_str: &str) -> bool {
    seg.strip_prefix(prefix_str)
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_lowercase() || c == '-'))
}

/// Reference from the file `from` to the file `to`, relative to the
/// directory of `from`, with forward slashes and a leading `./` unless it
/// already starts with `.`.
pub fn relative_reference(from: &Utf8Path, to: &Utf8Path) -> String {
    let from_dir = normalize_path(from.parent().unwrap_or(Utf8Path::new("")));
    let to = normalize_path(to);

    let from_segs = segments(&from_dir);
    let to_segs = segments(&to);
    let common = from_segs
        .iter()
        .zip(&to_segs)
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<&str> = Vec::new();
    parts.extend(std::iter::repeat_n("..", from_segs.len() - common));
    parts.extend(to_segs[common..].iter().map(String::as_str));

    let rel = parts.join("/");
    if rel.starts_with('.') {
        rel
    } else {
        format!("./{rel}")
    }
}

fn segments(path: &Utf8Path) -> Vec<String> {
    path.components()
        .filter(|c| !matches!(c, Utf8Component::CurDir))
        .map(|c| match c {
            Utf8Component::RootDir => "/".to_string(),
            c => c.as_str().to_string(),
        })
        .collect()
}

fn replace_prefix(segs: Vec<String>, len: usize, with: &Utf8Path) -> Vec<String> {
    let mut out = segments(with);
    out.extend(segs.into_iter().skip(len));
    out
}

fn starts_with(segs: &[String], prefix: &[String]) -> bool {
    !prefix.is_empty() && segs.len() >= prefix.len() && segs[..prefix.len()] == *prefix
}

/// Normalize a path, removing things like `.` and `..`.
///
/// CAUTION: This does not resolve symlinks (unlike [`std::fs::canonicalize`]).
///
/// Adapted from
/// <https://github.com/rust-lang/cargo/blob/f7acf448fc127df9a77c52cc2bba027790ac4931/crates/cargo-util/src/paths.rs#L76-L116>
pub fn normalize_path(path: &Utf8Path) -> Utf8PathBuf {
    let mut components = path.components().peekable();
    let mut ret = if let Some(c @ Utf8Component::Prefix(..)) = components.peek().cloned() {
        components.next();
        Utf8PathBuf::from(c.as_str())
    } else {
        Utf8PathBuf::new()
    };

    for component in components {
        match component {
            Utf8Component::Prefix(..) => unreachable!(),
            Utf8Component::RootDir => {
                ret.push(Utf8Component::RootDir);
            }
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir => {
                if ret.ends_with(Utf8Component::ParentDir) {
                    ret.push(Utf8Component::ParentDir);
                } else {
                    let popped = ret.pop();
                    if !popped && !ret.has_root() {
                        ret.push(Utf8Component::ParentDir);
                    }
                }
            }
            Utf8Component::Normal(c) => {
                ret.push(c);
            }
        }
    }
    ret
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config::new("/project")
    }

    #[test]
    fn test_src_to_dest() {
        let config = config();
        let cases = [
            ("src/pages/home/index.wxp", false, "dist/pages/home/index.wxp"),
            ("src/packages/bee-button/src/index.wxc", false, "dist/packages/bee-button/dist/index.wxc"),
            ("src/packages/bee-button/src/index.wxc", true, "dist/src/packages/bee-button/dist/index.wxc"),
            ("node_modules/lodash/index.js", false, "dist/src/packages/lodash/index.js"),
            ("node_modules/a/node_modules/b/x.js", false, "dist/src/packages/a/src/packages/b/x.js"),
            ("srcs/a.js", false, "srcs/a.js"),
        ];

        for (src, is_publish, dest) in cases {
            assert_eq!(
                src_to_dest_relative(&config, Utf8Path::new(src), is_publish),
                dest,
                "{src}"
            );
        }
    }

    #[test]
    fn test_src_to_dest_idempotent() {
        let config = config();
        for src in [
            "src/pages/home/index.wxp",
            "src/packages/bee-button/src/index.wxc",
            "node_modules/@scope/pkg/lib/index.js",
            "src/common/node_modules/x/index.js",
        ] {
            let once = src_to_dest_relative(&config, Utf8Path::new(src), false);
            let twice = src_to_dest_relative(&config, &once, false);
            assert_eq!(once, twice, "{src}");
        }
    }

    #[test]
    fn test_is_package_name() {
        assert!(is_package_name("bee-button", "bee-"));
        assert!(is_package_name("bee-tab-bar", "bee-"));
        assert!(!is_package_name("bee-", "bee-"));
        assert!(!is_package_name("bee-Button", "bee-"));
        assert!(!is_package_name("button", "bee-"));
    }

    #[test]
    fn test_relative_reference() {
        let from = Utf8Path::new("/p/dist/pages/home/index.js");
        assert_eq!(
            relative_reference(from, Utf8Path::new("/p/dist/pages/home/util.js")),
            "./util.js"
        );
        assert_eq!(
            relative_reference(from, Utf8Path::new("/p/dist/common/a.png")),
            "../../common/a.png"
        );
        assert_eq!(
            relative_reference(from, Utf8Path::new("/p/dist/pages/home/sub/./b.wxss")),
            "./sub/b.wxss"
        );
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(Utf8Path::new("/a/./b/../c")), "/a/c");
        assert_eq!(normalize_path(Utf8Path::new("../a")), "../a");
    }
}
