use std::fmt::Display;
use std::fs;
use std::io;
use std::sync::LazyLock;
use std::time::Instant;

use camino::Utf8Path;
use console::Style;
use indicatif::ProgressStyle;

const ANSI_BLUE: Style = Style::new().blue();

/// Style of the bar following a full build, one tick per compiled node.
pub(crate) static PROGRESS_STYLE: LazyLock<ProgressStyle> = LazyLock::new(|| {
    ProgressStyle::default_bar()
        .template("{spinner:.green} compiling [{bar:32.cyan/blue}] {pos}/{len} {wide_msg:.dim}")
        .expect("Error setting progress bar template")
        .progress_chars("=> ")
});

/// Blue `(+12ms)` label with the time spent since `start`, switching to
/// seconds past the first one.
pub fn as_overhead(start: Instant) -> impl Display {
    let elapsed = start.elapsed();
    let label = match elapsed.as_millis() {
        ms @ 0..1000 => format!("(+{ms}ms)"),
        _ => format!("(+{:.2}s)", elapsed.as_secs_f64()),
    };
    ANSI_BLUE.apply_to(label)
}

/// Empties the destination directory, creating it if needed.
pub fn clear_dir(dir: &Utf8Path) -> io::Result<()> {
    let s = Instant::now();

    if fs::metadata(dir).is_ok() {
        fs::remove_dir_all(dir)?;
    }
    fs::create_dir_all(dir)?;

    tracing::info!("cleaned {} {}", dir, as_overhead(s));
    Ok(())
}

/// Writes `data` to `path`, creating parent directories.
pub fn write(path: &Utf8Path, data: impl AsRef<[u8]>) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, data)
}

/// Copies a single file, creating parent directories.
pub fn copy(from: &Utf8Path, to: &Utf8Path) -> io::Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(from, to).map(|_| ())
}

/// Removes a file; a file that is already gone is not an error.
pub fn remove(path: &Utf8Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        res => res,
    }
}
