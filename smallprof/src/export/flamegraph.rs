//! Flame graph export in d3-flame-graph format
//!
//! Two output formats:
//!
//! - **JSON**: the bare `{name, value, children}` tree
//! - **HTML**: a self-contained page that loads d3 and d3-flame-graph 4.1.3
//!   from a CDN and renders the embedded tree
//!
//! [`OutputFormat::for_path`] picks the format from the file extension.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::info;

use crate::analysis::FlameNode;
use crate::domain::ExportError;

const D3_FLAMEGRAPH_VERSION: &str = "4.1.3";

/// File format of an exported flame graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Html,
}

impl OutputFormat {
    /// `.json` (any case) means JSON, everything else HTML
    #[must_use]
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => OutputFormat::Json,
            _ => OutputFormat::Html,
        }
    }
}

/// Writes an exported call tree
#[derive(Debug)]
pub struct FlameGraphExporter<'a> {
    root: &'a FlameNode,
}

impl<'a> FlameGraphExporter<'a> {
    #[must_use]
    pub fn new(root: &'a FlameNode) -> Self {
        Self { root }
    }

    /// Write the tree as JSON
    ///
    /// # Errors
    /// Returns an error if serialization or the write fails.
    pub fn export_json<W: Write>(&self, mut writer: W) -> Result<(), ExportError> {
        serde_json::to_writer(&mut writer, self.root)?;
        writer.flush()?;
        Ok(())
    }

    /// Write a standalone HTML page rendering the tree
    ///
    /// # Errors
    /// Returns an error if serialization or the write fails.
    pub fn export_html<W: Write>(&self, mut writer: W) -> Result<(), ExportError> {
        let v = D3_FLAMEGRAPH_VERSION;
        write!(
            writer,
            r##"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <link rel="stylesheet" type="text/css" href="https://cdn.jsdelivr.net/npm/d3-flame-graph@{v}/dist/d3-flamegraph.css">
</head>
<body>
  <div id="chart"></div>
  <script type="text/javascript" src="https://d3js.org/d3.v7.js"></script>
  <script type="text/javascript" src="https://cdn.jsdelivr.net/npm/d3-flame-graph@{v}/dist/d3-flamegraph.min.js"></script>
  <script type="text/javascript">
  var chart = flamegraph().width(window.innerWidth);
  d3.select("#chart").datum("##
        )?;
        // JSON is valid JavaScript; escape "</" so a label cannot close the script
        let json = serde_json::to_string(self.root)?.replace("</", "<\\/");
        writer.write_all(json.as_bytes())?;
        write!(
            writer,
            r#").call(chart);
  window.onresize = () => chart.width(window.innerWidth);
  </script>
</body>
</html>
"#
        )?;
        writer.flush()?;
        Ok(())
    }

    /// Write to `path`, choosing the format from its extension
    ///
    /// # Errors
    /// Returns [`ExportError::WriteFailed`] naming the path on any I/O error.
    pub fn write_to_path(&self, path: &Path) -> Result<OutputFormat, ExportError> {
        let format = OutputFormat::for_path(path);
        let wrap = |source: std::io::Error| ExportError::WriteFailed { path: path.to_path_buf(), source };

        let file = File::create(path).map_err(wrap)?;
        let writer = BufWriter::new(file);
        let result = match format {
            OutputFormat::Json => self.export_json(writer),
            OutputFormat::Html => self.export_html(writer),
        };
        match result {
            Err(ExportError::Io(source)) => return Err(wrap(source)),
            other => other?,
        }

        info!("Wrote {format:?} flame graph ({} samples) to {}", self.root.value, path.display());
        Ok(format)
    }
}
