//! Expand the paths handed to a batch into individual source assets
//!
//! A path may name a container, a pack archive, or a directory holding
//! either. Identifiers are stable across runs:
//!
//! | Input                     | Identifier                         |
//! |---------------------------|------------------------------------|
//! | `rock.iwa`                | `rock`                             |
//! | `dir/` → `dir/props/a.iwa` | `props/a`                         |
//! | `level.iwpak` → `tex/a.iwa` | `level/tex/a`                    |

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};
use walkdir::WalkDir;

use iwbridge_core::{AssetId, Error, Result};
use iwbridge_parsers::{ContainerParser, PackArchive, PackParser, ParseOptions, Parser};

/// Where a source's bytes come from
#[derive(Debug, Clone)]
pub enum SourceOrigin {
    File(PathBuf),
    Pack {
        archive: Arc<PackArchive>,
        pack_path: PathBuf,
        entry: String,
    },
}

#[derive(Debug, Clone)]
pub struct DiscoveredSource {
    pub id: AssetId,
    pub origin: SourceOrigin,
}

impl DiscoveredSource {
    /// Read the raw container bytes
    pub fn load(&self, options: &ParseOptions) -> Result<Bytes> {
        match &self.origin {
            SourceOrigin::File(path) => {
                iwbridge_parsers::load_file(path, options).map_err(|e| match e {
                    iwbridge_parsers::ParseError::Io(io)
                        if io.kind() == std::io::ErrorKind::NotFound =>
                    {
                        Error::FileNotFound(path.clone())
                    }
                    other => Error::from(other),
                })
            }
            SourceOrigin::Pack { archive, entry, .. } => {
                archive.read(entry).map_err(Error::from)
            }
        }
    }

    /// Human-readable location for reports
    pub fn location(&self) -> String {
        match &self.origin {
            SourceOrigin::File(path) => path.display().to_string(),
            SourceOrigin::Pack {
                pack_path, entry, ..
            } => format!("{}:{}", pack_path.display(), entry),
        }
    }
}

/// A path that could not be expanded into a source
#[derive(Debug)]
pub struct DiscoveryFailure {
    pub id: AssetId,
    pub location: String,
    pub error: Error,
}

#[derive(Debug, Default)]
pub struct Discovery {
    pub sources: Vec<DiscoveredSource>,
    pub failures: Vec<DiscoveryFailure>,
}

impl Discovery {
    pub fn total(&self) -> usize {
        self.sources.len() + self.failures.len()
    }

    fn push(&mut self, source: DiscoveredSource, seen: &mut HashMap<AssetId, String>) {
        let location = source.location();
        if let Some(first) = seen.get(&source.id) {
            warn!(id = %source.id, %location, first = %first, "Duplicate source identifier");
            self.failures.push(DiscoveryFailure {
                error: Error::InvalidConfig {
                    message: format!("identifier '{}' is also provided by {}", source.id, first),
                },
                id: source.id,
                location,
            });
            return;
        }
        seen.insert(source.id.clone(), location);
        self.sources.push(source);
    }
}

/// Expand `paths` into sources
///
/// Problems with a single path (missing file, unreadable pack, duplicate
/// identifier) are collected as failures rather than aborting the batch.
pub fn discover(paths: &[PathBuf], options: &ParseOptions) -> Discovery {
    let containers = ContainerParser::new();
    let packs = PackParser::new();
    let mut discovery = Discovery::default();
    let mut seen = HashMap::new();

    for path in paths {
        if path.is_dir() {
            let walker = WalkDir::new(path)
                .follow_links(true)
                .sort_by_file_name()
                .into_iter()
                // Skip hidden directories such as the catalog's staging area
                .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));
            for entry in walker {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        let location = e
                            .path()
                            .map(|p| p.display().to_string())
                            .unwrap_or_else(|| path.display().to_string());
                        discovery.failures.push(DiscoveryFailure {
                            id: AssetId::new(&location),
                            location,
                            error: Error::Io(e.into()),
                        });
                        continue;
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }
                let file = entry.path();
                let id = AssetId::from_path(path, file);
                if packs.can_parse(file) {
                    expand_pack(&packs, file, id, options, &mut discovery, &mut seen);
                } else if containers.can_parse(file) {
                    discovery.push(
                        DiscoveredSource {
                            id,
                            origin: SourceOrigin::File(file.to_path_buf()),
                        },
                        &mut seen,
                    );
                }
            }
        } else if path.is_file() {
            let id = stem_id(path);
            if packs.can_parse(path) {
                expand_pack(&packs, path, id, options, &mut discovery, &mut seen);
            } else {
                // Named explicitly, so unknown files are still attempted and fail on their own
                discovery.push(
                    DiscoveredSource {
                        id,
                        origin: SourceOrigin::File(path.clone()),
                    },
                    &mut seen,
                );
            }
        } else {
            discovery.failures.push(DiscoveryFailure {
                id: stem_id(path),
                location: path.display().to_string(),
                error: Error::FileNotFound(path.clone()),
            });
        }
    }

    debug!(
        sources = discovery.sources.len(),
        failures = discovery.failures.len(),
        "Discovery complete"
    );
    discovery
}

fn stem_id(path: &Path) -> AssetId {
    AssetId::new(
        path.file_stem()
            .map(|s| s.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy()),
    )
}

fn expand_pack(
    parser: &PackParser,
    pack_path: &Path,
    prefix: AssetId,
    options: &ParseOptions,
    discovery: &mut Discovery,
    seen: &mut HashMap<AssetId, String>,
) {
    let archive = match parser.parse_file_with_options(pack_path, options) {
        Ok(archive) => Arc::new(archive),
        Err(e) => {
            iwbridge_parsers::log_parse_error!(parser.name(), e);
            discovery.failures.push(DiscoveryFailure {
                id: prefix,
                location: pack_path.display().to_string(),
                error: Error::from(e).with_context(format!("pack {}", pack_path.display())),
            });
            return;
        }
    };

    // Members are matched by extension first, then by the magic of their own bytes
    let containers = ContainerParser::new();
    let mut entries: Vec<(String, String)> = Vec::new();
    for entry in archive.files() {
        let by_extension = entry
            .extension()
            .is_some_and(|ext| containers.extensions().contains(&ext.as_str()));
        let is_container = by_extension
            || match archive.read_entry(entry) {
                Ok(data) => containers.sniff(&data),
                Err(e) => {
                    warn!(pack = %pack_path.display(), entry = %entry.path, error = %e, "Unreadable pack member");
                    discovery.failures.push(DiscoveryFailure {
                        id: prefix.join(entry.asset_path()),
                        location: format!("{}:{}", pack_path.display(), entry.path),
                        error: Error::from(e),
                    });
                    continue;
                }
            };
        if is_container {
            entries.push((entry.path.clone(), entry.asset_path().to_string()));
        }
    }
    entries.sort();

    for (entry, asset_path) in entries {
        let id = prefix.join(&asset_path);
        discovery.push(
            DiscoveredSource {
                id,
                origin: SourceOrigin::Pack {
                    archive: Arc::clone(&archive),
                    pack_path: pack_path.to_path_buf(),
                    entry,
                },
            },
            seen,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iwbridge_core::ErrorKind;
    use iwbridge_parsers::{Codec, PackWriter, PhysicsRecord};

    fn container_bytes() -> Vec<u8> {
        PhysicsRecord {
            name: "p".into(),
            shapes: Vec::new(),
        }
        .to_container()
        .unwrap()
    }

    #[test]
    fn test_directory_ids_are_relative() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("props/.hidden")).unwrap();
        std::fs::write(dir.path().join("props/rock.iwa"), container_bytes()).unwrap();
        std::fs::write(dir.path().join("props/.hidden/x.iwa"), container_bytes()).unwrap();
        std::fs::write(dir.path().join("props/readme.txt"), b"hi").unwrap();

        let found = discover(&[dir.path().to_path_buf()], &ParseOptions::default());
        let ids: Vec<_> = found.sources.iter().map(|s| s.id.as_str().to_string()).collect();
        assert_eq!(ids, ["props/rock"]);
        assert!(found.failures.is_empty());
    }

    #[test]
    fn test_pack_entries_are_prefixed() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = PackWriter::new();
        writer.add("tex/a.iwa", &container_bytes(), Codec::Deflate).unwrap();
        writer.add("notes.txt", b"skip me", Codec::Store).unwrap();
        let pack = dir.path().join("level.iwpak");
        std::fs::write(&pack, writer.finish()).unwrap();

        let found = discover(&[pack], &ParseOptions::default());
        assert_eq!(found.sources.len(), 1);
        assert_eq!(found.sources[0].id.as_str(), "level/tex/a");
        let bytes = found.sources[0].load(&ParseOptions::default()).unwrap();
        assert_eq!(bytes.as_ref(), container_bytes().as_slice());
    }

    #[test]
    fn test_pack_members_are_sniffed_when_extension_is_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = PackWriter::new();
        writer.add("props/a.bin", &container_bytes(), Codec::Deflate).unwrap();
        writer.add("props/b.bin", b"not a container", Codec::Store).unwrap();
        let pack = dir.path().join("level.iwpak");
        std::fs::write(&pack, writer.finish()).unwrap();

        let found = discover(&[pack], &ParseOptions::default());
        let ids: Vec<_> = found.sources.iter().map(|s| s.id.as_str().to_string()).collect();
        assert_eq!(ids, ["level/props/a"]);
        assert!(found.failures.is_empty());
    }

    #[test]
    fn test_missing_and_duplicate_paths() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("one/rock.iwa");
        let b = dir.path().join("two/rock.iwa");
        for p in [&a, &b] {
            std::fs::create_dir_all(p.parent().unwrap()).unwrap();
            std::fs::write(p, container_bytes()).unwrap();
        }

        let found = discover(
            &[a, b, dir.path().join("missing.iwa")],
            &ParseOptions::default(),
        );
        assert_eq!(found.sources.len(), 1);
        assert_eq!(found.failures.len(), 2);
        assert_eq!(found.failures[0].error.kind(), ErrorKind::InvalidConfig);
        assert_eq!(found.failures[1].error.kind(), ErrorKind::NotFound);
        assert_eq!(found.total(), 3);
    }
}
