use ignore::WalkBuilder;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use crate::constants::inclusion::{KNOWN_FILES, MAX_FILE_BYTES, SEARCH_DIRS, SUPPORTED_EXTENSIONS};
use crate::error::ChatError;

/// `{name}` where name has no whitespace or braces.
fn marker_regex() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"\{([^{}\s]+)\}").unwrap())
}

/// What happened to one inclusion marker.
#[derive(Debug, Clone, PartialEq)]
pub enum InclusionOutcome {
    Resolved {
        name: String,
        path: PathBuf,
        chars: usize,
    },
    NotFound {
        name: String,
    },
    RejectedExtension {
        name: String,
        path: PathBuf,
    },
    Oversized {
        name: String,
        path: PathBuf,
        size: u64,
    },
    Unreadable {
        name: String,
        path: PathBuf,
        reason: String,
    },
    /// Absolute names and names escaping the search path with `..`.
    RejectedPath {
        name: String,
    },
}

impl InclusionOutcome {
    pub fn name(&self) -> &str {
        match self {
            Self::Resolved { name, .. }
            | Self::NotFound { name }
            | Self::RejectedExtension { name, .. }
            | Self::Oversized { name, .. }
            | Self::Unreadable { name, .. }
            | Self::RejectedPath { name } => name,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved { .. })
    }

    /// Inline text left in the message for an unresolved reference.
    pub fn marker(&self) -> Option<String> {
        let text = match self {
            Self::Resolved { .. } => return None,
            Self::NotFound { name } => format!("[ERROR: File {name} not found]"),
            Self::RejectedExtension { name, .. } => {
                format!("[WARNING: Unsupported file type {name}]")
            }
            Self::Oversized { name, .. } => format!(
                "[ERROR: File {name} too large (max {}MB)]",
                MAX_FILE_BYTES / (1024 * 1024)
            ),
            Self::Unreadable { name, reason, .. } => {
                format!("[ERROR: Unable to read {name}: {reason}]")
            }
            Self::RejectedPath { name } => format!("[ERROR: Invalid file reference {name}]"),
        };
        Some(text)
    }

    /// The diagnostic as an error value, for reporting. `None` when resolved.
    pub fn to_error(&self) -> Option<ChatError> {
        let message = match self {
            Self::Resolved { .. } => return None,
            Self::NotFound { .. } => "file not found".to_string(),
            Self::RejectedExtension { .. } => "unsupported file type".to_string(),
            Self::Oversized { size, .. } => format!("file too large ({size} bytes)"),
            Self::Unreadable { reason, .. } => reason.clone(),
            Self::RejectedPath { .. } => {
                "absolute or parent-relative names are not allowed".to_string()
            }
        };
        Some(ChatError::inclusion(self.name(), message))
    }
}

/// Resolved message text plus one outcome per marker, in text order.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub text: String,
    pub outcomes: Vec<InclusionOutcome>,
}

impl Resolution {
    pub fn failures(&self) -> impl Iterator<Item = &InclusionOutcome> {
        self.outcomes.iter().filter(|o| !o.is_resolved())
    }
}

/// A file that could be referenced from a message.
#[derive(Debug, Clone, PartialEq)]
pub struct AvailableFile {
    pub path: PathBuf,
    pub size: u64,
    pub extension: String,
}

impl AvailableFile {
    pub fn display_size(&self) -> String {
        if self.size < 1024 * 1024 {
            format!("{} bytes", self.size)
        } else {
            format!("{:.1} MB", self.size as f64 / (1024.0 * 1024.0))
        }
    }
}

/// Substitutes `{name}` markers in outgoing text with file contents.
#[derive(Debug, Clone)]
pub struct FileResolver {
    search_paths: Vec<PathBuf>,
    /// Listed paths under this directory are shown relative to it.
    base: Option<PathBuf>,
    max_bytes: u64,
}

impl FileResolver {
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        Self {
            search_paths,
            base: None,
            max_bytes: MAX_FILE_BYTES,
        }
    }

    /// Conventional directories under `workdir`, then the agent's uploads directory.
    pub fn standard(workdir: &Path, uploads: &Path) -> Self {
        let mut paths: Vec<PathBuf> = SEARCH_DIRS
            .iter()
            .map(|d| if *d == "." { workdir.to_path_buf() } else { workdir.join(d) })
            .collect();
        paths.push(uploads.to_path_buf());
        Self::new(paths).with_base(workdir)
    }

    pub fn with_base(mut self, base: impl Into<PathBuf>) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Replace every marker in `text`. Resolution is per marker and never
    /// fails as a whole; unresolved markers become explicit error markers.
    pub fn resolve(&self, text: &str) -> Resolution {
        let mut outcomes = Vec::new();
        let resolved = marker_regex().replace_all(text, |caps: &Captures<'_>| {
            let name = &caps[1];
            let (replacement, outcome) = self.resolve_one(name);
            outcomes.push(outcome);
            replacement
        });

        Resolution {
            text: resolved.into_owned(),
            outcomes,
        }
    }

    fn resolve_one(&self, name: &str) -> (String, InclusionOutcome) {
        let outcome_with = |outcome: InclusionOutcome| {
            let marker = outcome.marker().unwrap_or_default();
            (marker, outcome)
        };

        let relative = Path::new(name);
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
        {
            return outcome_with(InclusionOutcome::RejectedPath { name: name.to_string() });
        }

        let Some(path) = self
            .search_paths
            .iter()
            .map(|dir| dir.join(relative))
            .find(|p| p.is_file())
        else {
            return outcome_with(InclusionOutcome::NotFound { name: name.to_string() });
        };

        if !is_supported_file(&path) {
            return outcome_with(InclusionOutcome::RejectedExtension {
                name: name.to_string(),
                path,
            });
        }

        let size = match fs::metadata(&path) {
            Ok(meta) => meta.len(),
            Err(e) => {
                return outcome_with(InclusionOutcome::Unreadable {
                    name: name.to_string(),
                    path,
                    reason: e.to_string(),
                })
            }
        };
        if size > self.max_bytes {
            return outcome_with(InclusionOutcome::Oversized {
                name: name.to_string(),
                path,
                size,
            });
        }

        let content = match fs::read(&path) {
            Ok(bytes) => decode_text(bytes),
            Err(e) => {
                return outcome_with(InclusionOutcome::Unreadable {
                    name: name.to_string(),
                    path,
                    reason: e.to_string(),
                })
            }
        };

        let chars = content.chars().count();
        tracing::info!("File included: {name} ({chars} characters)");
        let replacement = format!("{}{content}", label_comment(name, &path));
        (
            replacement,
            InclusionOutcome::Resolved {
                name: name.to_string(),
                path,
                chars,
            },
        )
    }

    /// Every eligible, non-hidden file under the search paths, sorted by path.
    pub fn list_available_files(&self) -> Vec<AvailableFile> {
        let mut found = BTreeMap::new();

        for root in self.search_paths.iter().filter(|p| p.is_dir()) {
            let mut builder = WalkBuilder::new(root);
            builder.standard_filters(false).hidden(true);

            for entry in builder.build().flatten() {
                if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                    continue;
                }
                let path = entry.path();
                if !is_supported_file(path) {
                    continue;
                }
                let normalized = self
                    .base
                    .as_deref()
                    .and_then(|base| path.strip_prefix(base).ok())
                    .unwrap_or(path)
                    .to_path_buf();
                if found.contains_key(&normalized) {
                    continue;
                }
                let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                let extension = path
                    .extension()
                    .map(|e| format!(".{}", e.to_string_lossy()))
                    .unwrap_or_default();
                found.insert(
                    normalized.clone(),
                    AvailableFile {
                        path: normalized,
                        size,
                        extension,
                    },
                );
            }
        }

        found.into_values().collect()
    }
}

/// Allow-listed extension (case-insensitive) or a known extension-less name.
pub fn is_supported_file(path: &Path) -> bool {
    if let Some(ext) = path.extension() {
        let ext = ext.to_string_lossy().to_lowercase();
        if SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
            return true;
        }
    }
    path.file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .is_some_and(|n| KNOWN_FILES.contains(&n.as_str()))
}

/// UTF-8, falling back to Latin-1 (every byte maps to one char).
fn decode_text(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => e.into_bytes().into_iter().map(char::from).collect(),
    }
}

fn label_comment(name: &str, path: &Path) -> String {
    let suffix = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let label = format!("File: {name} ({suffix})");

    match suffix.to_lowercase().as_str() {
        ".py" | ".r" => format!("# {label}\n"),
        ".html" | ".xml" => format!("<!-- {label} -->\n"),
        ".css" | ".scss" | ".sass" => format!("/* {label} */\n"),
        ".sql" => format!("-- {label}\n"),
        _ => format!("// {label}\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn resolver(dirs: &[&Path]) -> FileResolver {
        FileResolver::new(dirs.iter().map(|d| d.to_path_buf()).collect())
    }

    #[test]
    fn test_resolves_marker_in_place() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.py"), "print(1)").unwrap();

        let res = resolver(&[dir.path()]).resolve("see {a.py} please");

        assert_eq!(res.text, "see # File: a.py (.py)\nprint(1) please");
        assert_eq!(res.outcomes.len(), 1);
        assert!(res.outcomes[0].is_resolved());
    }

    #[test]
    fn test_missing_file_leaves_explicit_marker() {
        let dir = TempDir::new().unwrap();
        let res = resolver(&[dir.path()]).resolve("look at {nope.rs}");

        assert_eq!(res.text, "look at [ERROR: File nope.rs not found]");
        assert!(matches!(res.outcomes[0], InclusionOutcome::NotFound { .. }));
        assert!(matches!(
            res.outcomes[0].to_error(),
            Some(ChatError::Inclusion { .. })
        ));
    }

    #[test]
    fn test_first_search_path_wins() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        fs::write(first.path().join("x.txt"), "first").unwrap();
        fs::write(second.path().join("x.txt"), "second").unwrap();

        let res = resolver(&[first.path(), second.path()]).resolve("{x.txt}");
        assert!(res.text.ends_with("first"));
    }

    #[test]
    fn test_later_search_path_used_when_earlier_missing() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        fs::write(second.path().join("notes.md"), "hello").unwrap();

        let res = resolver(&[first.path(), second.path()]).resolve("{notes.md}");
        assert_eq!(res.text, "// File: notes.md (.md)\nhello");
    }

    #[test]
    fn test_rejects_unsupported_extension() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("image.png"), [0u8, 1, 2]).unwrap();

        let res = resolver(&[dir.path()]).resolve("{image.png}");
        assert_eq!(res.text, "[WARNING: Unsupported file type image.png]");
    }

    #[test]
    fn test_rejects_oversized_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("big.txt"), "0123456789").unwrap();

        let res = resolver(&[dir.path()]).with_max_bytes(4).resolve("{big.txt}");
        assert!(matches!(
            res.outcomes[0],
            InclusionOutcome::Oversized { size: 10, .. }
        ));
        assert_eq!(res.text, "[ERROR: File big.txt too large (max 2MB)]");
    }

    #[test]
    fn test_rejects_parent_and_absolute_names() {
        let dir = TempDir::new().unwrap();
        let res = resolver(&[dir.path()]).resolve("{../secret.txt} {/etc/passwd}");

        assert_eq!(res.outcomes.len(), 2);
        assert!(res
            .outcomes
            .iter()
            .all(|o| matches!(o, InclusionOutcome::RejectedPath { .. })));
    }

    #[test]
    fn test_known_extensionless_names_and_case() {
        assert!(is_supported_file(Path::new("Makefile")));
        assert!(is_supported_file(Path::new("src/MAIN.RS")));
        assert!(!is_supported_file(Path::new("binary.exe")));
    }

    #[test]
    fn test_latin1_fallback() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("legacy.txt"), [b'c', b'a', b'f', 0xE9]).unwrap();

        let res = resolver(&[dir.path()]).resolve("{legacy.txt}");
        assert!(res.text.ends_with("café"));
    }

    #[test]
    fn test_label_comment_styles() {
        assert_eq!(label_comment("q.sql", Path::new("q.sql")), "-- File: q.sql (.sql)\n");
        assert_eq!(
            label_comment("p.html", Path::new("p.html")),
            "<!-- File: p.html (.html) -->\n"
        );
        assert_eq!(
            label_comment("s.scss", Path::new("s.scss")),
            "/* File: s.scss (.scss) */\n"
        );
    }

    #[test]
    fn test_text_without_markers_is_unchanged() {
        let dir = TempDir::new().unwrap();
        let res = resolver(&[dir.path()]).resolve("fn main() {} and { spaced }");

        assert_eq!(res.text, "fn main() {} and { spaced }");
        assert!(res.outcomes.is_empty());
    }

    #[test]
    fn test_list_available_files_skips_hidden_and_unsupported() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("a.rs"), "fn a() {}").unwrap();
        fs::write(dir.path().join("nested/b.json"), "{}").unwrap();
        fs::write(dir.path().join(".hidden.txt"), "x").unwrap();
        fs::write(dir.path().join("c.bin"), "x").unwrap();

        let files = resolver(&[dir.path()]).list_available_files();
        let names: Vec<_> = files
            .iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();

        assert_eq!(names, vec!["a.rs", "b.json"]);
        assert_eq!(files[0].extension, ".rs");
        assert_eq!(files[0].display_size(), "9 bytes");
    }

    #[test]
    fn test_standard_listing_is_relative_to_workdir() {
        let workdir = TempDir::new().unwrap();
        let uploads = TempDir::new().unwrap();
        fs::create_dir(workdir.path().join("src")).unwrap();
        fs::write(workdir.path().join("src/a.rs"), "fn a() {}").unwrap();
        fs::write(workdir.path().join("notes.md"), "hi").unwrap();
        fs::write(uploads.path().join("up.txt"), "x").unwrap();

        let files = FileResolver::standard(workdir.path(), uploads.path()).list_available_files();
        let paths: Vec<_> = files.iter().map(|f| f.path.clone()).collect();

        assert_eq!(paths.len(), 3);
        assert!(paths.contains(&PathBuf::from("src/a.rs")));
        assert!(paths.contains(&PathBuf::from("notes.md")));
        assert!(paths.contains(&uploads.path().join("up.txt")));
    }
}
