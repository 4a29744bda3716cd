//! Output Path Resolution
//!
//! Derives every output file name from the raw input path. The default layout
//! mirrors the input tree, swapping a `data/raw` directory segment for
//! `data/final`, and appends a metric-specific suffix to the file name.
//!
//! # Examples
//!
//! ```ignore
//! let layout = OutputLayout::default();
//! let out = layout.resolve(Path::new("data/raw/run1.log"), ".gpu.csv");
//! assert_eq!(out, PathBuf::from("data/final/run1.log.gpu.csv"));
//! ```

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

pub const DEFAULT_RAW_SEGMENT: &str = "data/raw";
pub const DEFAULT_FINAL_SEGMENT: &str = "data/final";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLayout {
    /// Replace the first occurrence of `source` in the input path with `target`
    Mirror { source: PathBuf, target: PathBuf },
    /// Write everything into one directory, keyed by the input file name
    Directory(PathBuf),
}

impl Default for OutputLayout {
    fn default() -> Self {
        Self::Mirror {
            source: PathBuf::from(DEFAULT_RAW_SEGMENT),
            target: PathBuf::from(DEFAULT_FINAL_SEGMENT),
        }
    }
}

impl OutputLayout {
    pub fn mirror(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self::Mirror {
            source: source.into(),
            target: target.into(),
        }
    }

    pub fn directory(dir: impl Into<PathBuf>) -> Self {
        Self::Directory(dir.into())
    }

    /// Resolve the output path for `input` with `suffix` appended to the file name.
    /// The suffix is appended verbatim, it is not treated as an extension.
    pub fn resolve(&self, input: &Path, suffix: &str) -> PathBuf {
        let base = match self {
            Self::Mirror { source, target } => substitute_segment(input, source, target),
            Self::Directory(dir) => {
                let name = input
                    .file_name()
                    .map(OsString::from)
                    .unwrap_or_else(|| OsString::from("trace"));
                dir.join(name)
            }
        };

        let mut name = base.into_os_string();
        name.push(suffix);
        PathBuf::from(name)
    }
}

/// Swap the first run of components equal to `source` for `target`.
/// Returns the input untouched when `source` does not occur.
fn substitute_segment(input: &Path, source: &Path, target: &Path) -> PathBuf {
    let components: Vec<Component> = input.components().collect();
    let needle: Vec<Component> = source.components().collect();

    if needle.is_empty() || needle.len() > components.len() {
        return input.to_path_buf();
    }

    let position = components
        .windows(needle.len())
        .position(|window| window == needle.as_slice());

    match position {
        Some(start) => {
            let mut out = PathBuf::new();
            out.extend(&components[..start]);
            out.push(target);
            out.extend(&components[start + needle.len()..]);
            out
        }
        None => input.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    // Default layout swaps data/raw for data/final and keeps the file name
    fn test_mirror_default_layout() {
        let layout = OutputLayout::default();
        let out = layout.resolve(Path::new("/srv/exp/data/raw/node1.log"), ".gpu.csv");
        assert_eq!(out, PathBuf::from("/srv/exp/data/final/node1.log.gpu.csv"));
    }

    #[test]
    // Suffixes without a leading dot are appended as-is
    fn test_suffix_appended_verbatim() {
        let layout = OutputLayout::default();
        let out = layout.resolve(Path::new("data/raw/node1.log"), "perf.json");
        assert_eq!(out, PathBuf::from("data/final/node1.logperf.json"));
    }

    #[test]
    // Without the raw segment the outputs land next to the input
    fn test_mirror_without_match() {
        let layout = OutputLayout::default();
        let out = layout.resolve(Path::new("logs/node1.log"), ".avg.csv");
        assert_eq!(out, PathBuf::from("logs/node1.log.avg.csv"));
    }

    #[test]
    // Only whole components match, not substrings of a directory name
    fn test_mirror_matches_whole_components() {
        let layout = OutputLayout::default();
        let out = layout.resolve(Path::new("mydata/raw/node1.log"), ".gpu.csv");
        assert_eq!(out, PathBuf::from("mydata/raw/node1.log.gpu.csv"));
    }

    #[test]
    // Only the first occurrence is substituted
    fn test_mirror_first_occurrence_only() {
        let layout = OutputLayout::mirror("raw", "final");
        let out = layout.resolve(Path::new("raw/raw/a.log"), ".mem.csv");
        assert_eq!(out, PathBuf::from("final/raw/a.log.mem.csv"));
    }

    #[test]
    // Directory layout collects all outputs under one root
    fn test_directory_layout() {
        let layout = OutputLayout::directory("/tmp/out");
        let out = layout.resolve(Path::new("data/raw/node1.log"), "temp.csv");
        assert_eq!(out, PathBuf::from("/tmp/out/node1.logtemp.csv"));
    }
}
