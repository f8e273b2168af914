use std::fs;
use std::path::{Path, PathBuf};

/// One registered project: a short alias mapped to a working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectEntry {
    pub alias: String,
    pub dir: PathBuf,
    pub display_name: String,
    pub auto_discovered: bool,
}

impl ProjectEntry {
    pub fn seed(alias: &str, dir: PathBuf, display_name: &str) -> Self {
        Self {
            alias: alias.to_string(),
            dir,
            display_name: display_name.to_string(),
            auto_discovered: false,
        }
    }
}

/// Colloquial and Cyrillic spellings that map onto registered aliases.
/// Applied by `resolve` before the exact-alias lookup.
const SYNONYMS: &[(&str, &str)] = &[
    ("байки", "bikes"),
    ("байкс", "bikes"),
    ("карма", "bikes"),
    ("карму", "bikes"),
    ("рент", "bikes"),
    ("тапю", "tapyou"),
    ("тапъю", "tapyou"),
    ("тап", "tapyou"),
    ("tap", "tapyou"),
    ("ios", "tapyou"),
    ("афлоат", "afloatx"),
    ("клипборд", "afloatx"),
    ("clipboard", "afloatx"),
    ("clipboardx", "afloatx"),
    ("буферфлай", "afloatx"),
    ("bufferfly", "afloatx"),
];

/// Alias -> working directory mapping, built once at startup from a fixed
/// seed table plus a filesystem scan, read-only afterwards.
pub struct ProjectRegistry {
    entries: Vec<ProjectEntry>,
}

impl ProjectRegistry {
    pub fn new(seeds: Vec<ProjectEntry>) -> Self {
        Self { entries: seeds }
    }

    /// The fixed seed table, rooted under the given home directory.
    pub fn with_defaults(home: &Path) -> Self {
        Self::new(vec![
            ProjectEntry::seed("bikes", home.join("bikes"), "Karma Rent (bikes)"),
            ProjectEntry::seed("tapyou", home.join("mobile_app_ios"), "TapYou iOS"),
            ProjectEntry::seed("afloatx", home.join("AfloatX"), "ClipboardX (AfloatX)"),
        ])
    }

    /// Merge in projects discovered by scanning `scan_dir`. Entry names
    /// encode absolute paths with `-` in place of `/` (for example
    /// `-Users-denis-bikes`). Only decoded paths that exist and lie under
    /// `home` are accepted; seed entries keep priority and the first
    /// discovery wins among duplicates.
    pub fn discover(&mut self, scan_dir: &Path, home: &Path) {
        let entries = match fs::read_dir(scan_dir) {
            Ok(entries) => entries,
            // The scan dir may simply not exist yet
            Err(_) => return,
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(dir) = decode_project_path(name) else {
                continue;
            };
            if !dir.starts_with(home) || !dir.exists() {
                continue;
            }
            let Some(alias) = derive_short_name(&dir) else {
                continue;
            };
            if self.get(&alias).is_some() {
                continue;
            }
            let display_name = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| alias.clone());
            self.entries.push(ProjectEntry {
                alias,
                dir,
                display_name,
                auto_discovered: true,
            });
        }
    }

    /// Exact alias lookup, no synonym handling.
    pub fn get(&self, alias: &str) -> Option<&ProjectEntry> {
        self.entries.iter().find(|e| e.alias == alias)
    }

    /// Resolve a user-supplied name: trim, lowercase, apply the synonym
    /// table, then exact alias match. Unknown names return `None`.
    pub fn resolve(&self, name: &str) -> Option<&ProjectEntry> {
        let name = name.trim().to_lowercase();
        if name.is_empty() {
            return None;
        }
        let alias = SYNONYMS
            .iter()
            .find(|(from, _)| *from == name)
            .map(|(_, to)| *to)
            .unwrap_or(&name);
        self.get(alias)
    }

    pub fn entries(&self) -> &[ProjectEntry] {
        &self.entries
    }

    /// Human-readable listing with the active project marked.
    pub fn format_listing(&self, active_alias: &str) -> String {
        self.entries
            .iter()
            .map(|e| {
                format!(
                    "{}{} — {}{}",
                    if e.alias == active_alias { "👉 " } else { "   " },
                    e.alias,
                    e.display_name,
                    if e.auto_discovered { " (auto)" } else { "" },
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Decode a scan-dir entry name back into an absolute path:
/// `-Users-denis-bikes` -> `/Users/denis/bikes`.
fn decode_project_path(entry_name: &str) -> Option<PathBuf> {
    if !entry_name.starts_with('-') {
        return None;
    }
    Some(PathBuf::from(format!("/{}", entry_name[1..].replace('-', "/"))))
}

/// Short name from the final path component: lowercased, with anything
/// outside [a-z0-9] stripped.
fn derive_short_name(dir: &Path) -> Option<String> {
    let base = dir.file_name()?.to_string_lossy().to_lowercase();
    let short: String = base.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    if short.is_empty() {
        None
    } else {
        Some(short)
    }
}
