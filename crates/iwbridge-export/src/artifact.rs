//! Conversion output: artifact files plus non-fatal warnings

use std::path::{Path, PathBuf};

use serde::Serialize;

/// Non-fatal conversion finding, attached to the asset report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum ConversionWarning {
    /// UV channels beyond the host maximum were dropped, highest index first
    ChannelTruncated { kept: Vec<u16>, dropped: Vec<u16> },
    /// An animation track named a bone the skeleton does not have
    TrackDropped { clip: String, bone: String },
}

impl std::fmt::Display for ConversionWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversionWarning::ChannelTruncated { kept, dropped } => {
                write!(f, "UV channels {dropped:?} dropped (kept {kept:?})")
            }
            ConversionWarning::TrackDropped { clip, bone } => {
                write!(f, "animation '{clip}' track for unknown bone '{bone}' dropped")
            }
        }
    }
}

/// One output file, relative to the output root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactFile {
    pub relative_path: PathBuf,
    pub bytes: Vec<u8>,
}

impl ArtifactFile {
    pub fn new(relative_path: impl Into<PathBuf>, bytes: Vec<u8>) -> Self {
        Self {
            relative_path: relative_path.into(),
            bytes,
        }
    }
}

/// Everything one conversion produced; the first file is the primary artifact
#[derive(Debug, Clone, Default)]
pub struct Converted {
    pub files: Vec<ArtifactFile>,
    pub warnings: Vec<ConversionWarning>,
}

impl Converted {
    pub fn primary(&self) -> Option<&Path> {
        self.files.first().map(|f| f.relative_path.as_path())
    }

    pub fn total_bytes(&self) -> usize {
        self.files.iter().map(|f| f.bytes.len()).sum()
    }
}
