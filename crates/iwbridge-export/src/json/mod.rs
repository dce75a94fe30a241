//! JSON artifact and report export
//!
//! Physics body setups and batch reports are written through the same
//! exporter so pretty-printing and metadata wrapping behave alike.

use serde::Serialize;
use serde_json::json;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::ExportResult;
use crate::physics::{BodySetup, HostShape};

/// JSON export options
#[derive(Debug, Clone)]
pub struct JsonExportOptions {
    /// Use pretty-print formatting
    pub pretty: bool,

    /// Wrap documents in a `metadata` envelope (counts, format version)
    pub include_metadata: bool,
}

impl Default for JsonExportOptions {
    fn default() -> Self {
        Self {
            pretty: true,
            include_metadata: true,
        }
    }
}

/// JSON data exporter
pub struct JsonExporter {
    options: JsonExportOptions,
}

impl JsonExporter {
    /// Create new exporter with default options
    pub fn new() -> Self {
        Self {
            options: JsonExportOptions::default(),
        }
    }

    /// Create exporter with custom options
    pub fn with_options(options: JsonExportOptions) -> Self {
        Self { options }
    }

    /// Serialise a physics body setup
    pub fn export_body(&self, body: &BodySetup) -> ExportResult<Vec<u8>> {
        if !self.options.include_metadata {
            return self.to_vec(body);
        }

        let hull_points: usize = body
            .elements
            .iter()
            .map(|e| match &e.shape {
                HostShape::ConvexHull { points, .. } => points.len(),
                _ => 0,
            })
            .sum();
        let output = json!({
            "metadata": {
                "version": body.version,
                "element_count": body.elements.len(),
                "hull_point_count": hull_points,
            },
            "body": body,
        });
        self.to_vec(&output)
    }

    /// Serialise any value honouring the `pretty` option
    pub fn to_vec<T: Serialize + ?Sized>(&self, value: &T) -> ExportResult<Vec<u8>> {
        let mut out = if self.options.pretty {
            serde_json::to_vec_pretty(value)?
        } else {
            serde_json::to_vec(value)?
        };
        out.push(b'\n');
        Ok(out)
    }

    /// Write JSON to file
    pub fn write_json<T: Serialize + ?Sized>(
        &self,
        value: &T,
        output_path: impl AsRef<Path>,
    ) -> ExportResult<()> {
        let file = File::create(output_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&self.to_vec(value)?)?;
        writer.flush()?;
        Ok(())
    }
}

impl Default for JsonExporter {
    fn default() -> Self {
        Self::new()
    }
}
