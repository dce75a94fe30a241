// iwbridge-parsers/src/archive/entry.rs
//! Central directory records

use serde::Serialize;

use crate::compression::Codec;

/// One central directory record, with ZIP64 sizes already widened
#[derive(Debug, Clone)]
pub struct PackEntry {
    /// `/`-separated path inside the pack
    pub path: String,
    pub method: u16,
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub local_header_offset: u64,
    pub encrypted: bool,
    pub directory: bool,
}

impl PackEntry {
    pub fn codec(&self) -> Option<Codec> {
        Codec::from_zip_method(self.method)
    }

    /// Plain file entry that [`super::PackArchive::read_entry`] can extract
    pub fn is_readable(&self) -> bool {
        !self.directory && !self.encrypted
    }

    /// Lowercase extension of the last path segment
    pub fn extension(&self) -> Option<String> {
        if self.directory {
            return None;
        }
        let name = self.path.rsplit('/').next()?;
        let (stem, ext) = name.rsplit_once('.')?;
        (!stem.is_empty()).then(|| ext.to_ascii_lowercase())
    }

    /// Path with the extension of the last segment removed
    ///
    /// `props/crate.iwa` becomes `props/crate`. Used to derive asset
    /// identifiers for pack members.
    pub fn asset_path(&self) -> &str {
        let path = self.path.trim_end_matches('/');
        let name_start = path.rfind('/').map_or(0, |i| i + 1);
        match path[name_start..].rfind('.') {
            Some(dot) if dot > 0 => &path[..name_start + dot],
            _ => path,
        }
    }

    pub fn info(&self) -> PackEntryInfo {
        PackEntryInfo {
            path: self.path.clone(),
            compressed_size: self.compressed_size,
            uncompressed_size: self.uncompressed_size,
            method: self.codec().map_or("unknown", Codec::name),
            encrypted: self.encrypted,
        }
    }
}

/// Listing row for `inspect` on a pack
#[derive(Debug, Clone, Serialize)]
pub struct PackEntryInfo {
    pub path: String,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub method: &'static str,
    pub encrypted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str) -> PackEntry {
        PackEntry {
            path: path.to_string(),
            method: 8,
            crc32: 0,
            compressed_size: 50,
            uncompressed_size: 100,
            local_header_offset: 0,
            encrypted: false,
            directory: path.ends_with('/'),
        }
    }

    #[test]
    fn asset_path_drops_only_the_last_extension() {
        assert_eq!(entry("Meshes/props/crate.iwa").asset_path(), "Meshes/props/crate");
        assert_eq!(entry("audio/wind.loop.iwa").asset_path(), "audio/wind.loop");
        assert_eq!(entry("dir.v2/readme").asset_path(), "dir.v2/readme");
        assert_eq!(entry(".hidden").asset_path(), ".hidden");
    }

    #[test]
    fn extension_is_lowercased() {
        assert_eq!(entry("Textures/Rock.IWA").extension().as_deref(), Some("iwa"));
        assert_eq!(entry("Meshes/").extension(), None);
        assert_eq!(entry("Makefile").extension(), None);
    }

    #[test]
    fn readability_and_listing() {
        let mut e = entry("a.iwa");
        assert!(e.is_readable());
        assert_eq!(e.codec(), Some(Codec::Deflate));
        assert_eq!(e.info().method, "deflate");

        e.encrypted = true;
        assert!(!e.is_readable());
        assert!(!entry("Meshes/").is_readable());
    }
}
