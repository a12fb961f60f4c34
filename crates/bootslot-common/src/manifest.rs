//! Hand-rolled parser for the `overlay.ini` manifest shipped inside an
//! application image.
//!
//! The format is a narrow shape, not general-purpose INI: two section kinds
//! (`ApplicationFolder`, `PersistentMemory.<name>`), flat `key=value` entries, no
//! lists, no nesting. A purpose-built scanner is clearer here than pulling in a
//! full INI crate for a handful of lines per file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use reportify::Report;

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("manifest not found at {0}")]
    NotFound(PathBuf),
    #[error("unable to read manifest at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unknown section `{0}` in overlay.ini")]
    UnknownSection(String),
    #[error("unknown entry `{key}` in section `{section}`")]
    UnknownEntry { section: String, key: String },
    #[error("missing required field `{field}` in section `{section}`")]
    MissingField { section: String, field: String },
    #[error("malformed line `{0}` (expected `key=value` or `[section]`)")]
    MalformedLine(String),
}

pub type ManifestResult<T> = Result<T, Report<ManifestError>>;

/// One `PersistentMemory.<name>` record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PersistentMemoryEntry {
    pub lowerdir: String,
    pub upperdir: String,
    pub workdir: String,
    pub mergedir: String,
}

/// The parsed contents of `overlay.ini`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MountManifest {
    /// Ordered `ApplicationFolder` merge-directory paths, in file order.
    pub application_folders: Vec<String>,
    /// `PersistentMemory.<name>` records, keyed by `<name>`.
    pub persistent_memory: BTreeMap<String, PersistentMemoryEntry>,
}

impl MountManifest {
    /// The minimal fallback manifest used when parsing fails or stacking depth
    /// is exceeded: a single `/etc` application-folder entry.
    pub fn minimal() -> Self {
        MountManifest {
            application_folders: vec!["/etc".to_owned()],
            persistent_memory: BTreeMap::new(),
        }
    }

    pub fn parse_file(path: &Path) -> ManifestResult<Self> {
        if !path.exists() {
            return Err(Report::new(ManifestError::NotFound(path.to_path_buf())));
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|source| {
                Report::new(ManifestError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            })?;
        Self::parse_str(&contents)
    }

    pub fn parse_str(contents: &str) -> ManifestResult<Self> {
        let mut manifest = MountManifest::default();
        let mut current_section: Option<String> = None;

        for raw_line in contents.lines() {
            let line = strip_comment(raw_line).trim();
            if line.is_empty() {
                continue;
            }
            if let Some(name) = parse_section_header(line) {
                validate_section_name(&name)?;
                if is_persistent_memory_section(&name) {
                    manifest
                        .persistent_memory
                        .entry(persistent_memory_name(&name).to_owned())
                        .or_default();
                }
                current_section = Some(name);
                continue;
            }

            let Some(section) = current_section.clone() else {
                return Err(Report::new(ManifestError::MalformedLine(line.to_owned())));
            };
            let (key, value) = parse_key_value(line)
                .ok_or_else(|| Report::new(ManifestError::MalformedLine(line.to_owned())))?;

            if section == "ApplicationFolder" {
                manifest.application_folders.push(value.to_owned());
            } else if is_persistent_memory_section(&section) {
                let entry = manifest
                    .persistent_memory
                    .entry(persistent_memory_name(&section).to_owned())
                    .or_default();
                match key {
                    "lowerdir" => entry.lowerdir = value.to_owned(),
                    "upperdir" => entry.upperdir = value.to_owned(),
                    "workdir" => entry.workdir = value.to_owned(),
                    "mergedir" => entry.mergedir = value.to_owned(),
                    other => {
                        return Err(Report::new(ManifestError::UnknownEntry {
                            section: section.clone(),
                            key: other.to_owned(),
                        }))
                    }
                }
            } else {
                return Err(Report::new(ManifestError::UnknownSection(section)));
            }
        }

        for (name, entry) in &manifest.persistent_memory {
            for (field, value) in [
                ("lowerdir", &entry.lowerdir),
                ("upperdir", &entry.upperdir),
                ("workdir", &entry.workdir),
                ("mergedir", &entry.mergedir),
            ] {
                if value.is_empty() {
                    return Err(Report::new(ManifestError::MissingField {
                        section: format!("PersistentMemory.{name}"),
                        field: field.to_owned(),
                    }));
                }
            }
        }

        Ok(manifest)
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find(['#', ';']) {
        Some(idx) => &line[..idx],
        None => line,
    }
}

fn parse_section_header(line: &str) -> Option<String> {
    let line = line.trim();
    if line.starts_with('[') && line.ends_with(']') && line.len() >= 2 {
        Some(line[1..line.len() - 1].trim().to_owned())
    } else {
        None
    }
}

fn parse_key_value(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    let value = value.trim().trim_matches('"');
    if key.is_empty() {
        return None;
    }
    Some((key, value))
}

fn is_persistent_memory_section(name: &str) -> bool {
    name.starts_with("PersistentMemory.") && name.len() > "PersistentMemory.".len()
}

fn persistent_memory_name(section: &str) -> &str {
    section
        .strip_prefix("PersistentMemory.")
        .unwrap_or(section)
}

fn validate_section_name(name: &str) -> ManifestResult<()> {
    if name == "ApplicationFolder" || is_persistent_memory_section(name) {
        Ok(())
    } else {
        Err(Report::new(ManifestError::UnknownSection(name.to_owned())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn parses_application_folder_and_persistent_memory() {
        let ini = indoc! {r#"
            [ApplicationFolder]
            path=/etc
            path=/usr/bin

            [PersistentMemory.log]
            lowerdir=/rw_fs/root/application/current/log
            upperdir=/rw_fs/root/upperdir/log
            workdir=/rw_fs/root/workdir/log
            mergedir=/var/log
        "#};
        let manifest = MountManifest::parse_str(ini).unwrap();
        assert_eq!(manifest.application_folders, vec!["/etc", "/usr/bin"]);
        let log = manifest.persistent_memory.get("log").unwrap();
        assert_eq!(log.mergedir, "/var/log");
    }

    #[test]
    fn s4_unknown_entry_in_persistent_memory_section_is_fatal() {
        let ini = indoc! {r#"
            [PersistentMemory.foo]
            weirddir=/x
        "#};
        let err = MountManifest::parse_str(ini).unwrap_err();
        assert!(matches!(
            err.error(),
            ManifestError::UnknownEntry { section, key }
                if section == "PersistentMemory.foo" && key == "weirddir"
        ));
    }

    #[test]
    fn unknown_section_is_fatal() {
        let ini = "[Bogus]\nkey=value\n";
        let err = MountManifest::parse_str(ini).unwrap_err();
        assert!(matches!(err.error(), ManifestError::UnknownSection(name) if name == "Bogus"));
    }

    #[test]
    fn missing_required_field_is_fatal() {
        let ini = indoc! {r#"
            [PersistentMemory.data]
            lowerdir=/a
            upperdir=/b
            workdir=/c
        "#};
        let err = MountManifest::parse_str(ini).unwrap_err();
        assert!(matches!(
            err.error(),
            ManifestError::MissingField { field, .. } if field == "mergedir"
        ));
    }

    #[test]
    fn minimal_manifest_is_single_etc_entry() {
        let manifest = MountManifest::minimal();
        assert_eq!(manifest.application_folders, vec!["/etc"]);
        assert!(manifest.persistent_memory.is_empty());
    }

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let ini = indoc! {r#"
            ; leading comment
            [ApplicationFolder]
            # another comment
            path=/etc

        "#};
        let manifest = MountManifest::parse_str(ini).unwrap();
        assert_eq!(manifest.application_folders, vec!["/etc"]);
    }
}
