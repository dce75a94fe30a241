//! iwbridge Export Pipeline
//!
//! Converters from parsed foreign records to host-native artifacts:
//! - DDS (block-compressed textures, optional PNG preview)
//! - glTF 2.0 (meshes, skeletons, materials, morph targets)
//! - ADPC (4-bit block ADPCM audio)
//! - JSON (physics body setups, reports)
//!
//! Converters return artifacts in memory; writing them to disk is the
//! catalog's job, so a failed conversion never leaves partial files behind.

pub mod artifact;
pub mod audio;
pub mod error;
pub mod gltf;
pub mod json;
pub mod mesh;
pub mod physics;
pub mod textures;

pub use artifact::{ArtifactFile, ConversionWarning, Converted};
pub use audio::{AdpcmQuality, AudioSettings, TranscodedAudio};
pub use error::{ExportError, ExportResult};
pub use gltf::{GltfExporter, GltfOutput};
pub use json::{JsonExportOptions, JsonExporter};
pub use mesh::{MeshRecord, MeshSettings};
pub use physics::{BodyElement, BodySetup, HostShape, PhysicsSettings};
pub use textures::{RecodedTexture, TargetFormat, TextureSettings};

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use iwbridge_core::{AssetId, AssetKind};
use iwbridge_parsers::{AssetRecord, SourceAsset, UpAxis};

/// Settings for every converter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    pub texture: TextureSettings,
    pub mesh: MeshSettings,
    pub audio: AudioSettings,
    pub physics: PhysicsSettings,
}

/// Artifact layout version recorded in the catalog for each kind
pub fn format_version(kind: AssetKind) -> u32 {
    match kind {
        AssetKind::Texture => 1,
        AssetKind::Mesh => 2,
        AssetKind::Audio => audio::ADPC_VERSION as u32,
        AssetKind::Physics => physics::BODY_SETUP_VERSION,
    }
}

/// Output path of the primary artifact, relative to the output root
pub fn artifact_path(id: &AssetId, kind: AssetKind) -> PathBuf {
    let mut path = PathBuf::from(kind.folder());
    path.push(format!("{}.{}", id.as_str(), kind.artifact_extension()));
    path
}

/// Dispatches parsed records to the converter of their kind
#[derive(Debug, Clone, Default)]
pub struct Converter {
    settings: ExportSettings,
}

impl Converter {
    pub fn new(settings: ExportSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ExportSettings {
        &self.settings
    }

    /// Parse and convert a whole source asset
    pub fn convert_source(&self, asset: &SourceAsset) -> ExportResult<Converted> {
        let record = asset.parse_record()?;
        let up_axis = asset.container.meta()?.up_axis;
        self.convert(&asset.id, record, up_axis)
    }

    /// Convert one record; `up_axis` is the source container's frame
    #[instrument(skip(self, record), fields(kind = %record.kind()))]
    pub fn convert(&self, id: &AssetId, record: AssetRecord, up_axis: UpAxis) -> ExportResult<Converted> {
        let kind = record.kind();
        let primary = artifact_path(id, kind);

        let converted = match record {
            AssetRecord::Texture(texture) => {
                let recoded = textures::recode(&texture, &self.settings.texture)
                    .map_err(|e| e.at_payload(texture.payload_offset))?;
                let mut files = vec![ArtifactFile::new(&primary, textures::encode_dds(&recoded)?)];
                if self.settings.texture.png_preview {
                    files.push(ArtifactFile::new(
                        primary.with_extension("png"),
                        textures::encode_png(&recoded)?,
                    ));
                }
                Converted {
                    files,
                    warnings: Vec::new(),
                }
            }
            AssetRecord::Mesh(raw) => {
                let (mesh, warnings) = mesh::reconstruct(raw, &self.settings.mesh)?;
                let bin_path = primary.with_extension("bin");
                let bin_uri = bin_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| format!("{}.bin", id.file_stem()));
                let output = GltfExporter::new(self.settings.mesh.pretty_json).export(&mesh, &bin_uri)?;
                Converted {
                    files: vec![
                        ArtifactFile::new(&primary, output.json),
                        ArtifactFile::new(bin_path, output.bin),
                    ],
                    warnings,
                }
            }
            AssetRecord::Audio(record) => {
                let transcoded = audio::transcode(&record, &self.settings.audio)
                    .map_err(|e| e.at_payload(record.payload_offset))?;
                Converted {
                    files: vec![ArtifactFile::new(&primary, transcoded.data)],
                    warnings: Vec::new(),
                }
            }
            AssetRecord::Physics(record) => {
                let body = physics::translate(&record, up_axis, &self.settings.physics)?;
                let exporter = JsonExporter::with_options(JsonExportOptions {
                    pretty: self.settings.physics.pretty_json,
                    include_metadata: true,
                });
                Converted {
                    files: vec![ArtifactFile::new(&primary, exporter.export_body(&body)?)],
                    warnings: Vec::new(),
                }
            }
        };

        debug!(
            files = converted.files.len(),
            bytes = converted.total_bytes(),
            warnings = converted.warnings.len(),
            "Converted asset"
        );
        Ok(converted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_paths() {
        let id = AssetId::new("props/rock");
        assert_eq!(
            artifact_path(&id, AssetKind::Texture),
            PathBuf::from("Textures/props/rock.dds")
        );
        assert_eq!(
            artifact_path(&id, AssetKind::Mesh),
            PathBuf::from("Meshes/props/rock.gltf")
        );
    }

    #[test]
    fn test_settings_deserialize_partially() {
        let settings: ExportSettings =
            serde_json::from_str(r#"{"audio": {"sample_rate": 22050}}"#).unwrap();
        assert_eq!(settings.audio.sample_rate, Some(22050));
        assert_eq!(settings.mesh, MeshSettings::default());
    }
}
