//! Line-delimited JSON benchmark records.

use crate::error::{DatasetError, Result};
use kernelmeter_ir::Graph;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Lines, Write};
use std::path::{Path, PathBuf};

/// One benchmarked model: its graph plus measured latencies keyed by
/// hardware name (`null` when not measured) and any other metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkRecord {
    pub graph: Graph,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BenchmarkRecord {
    pub fn new(graph: Graph) -> Self {
        Self {
            graph,
            extra: Map::new(),
        }
    }

    /// Measured latency on `hardware`; `None` when absent or `null`.
    pub fn measured_latency(&self, hardware: &str) -> Option<f64> {
        self.extra.get(hardware).and_then(Value::as_f64)
    }

    pub fn with_measured_latency(mut self, hardware: &str, latency_ms: Option<f64>) -> Self {
        let value = latency_ms.map(Value::from).unwrap_or(Value::Null);
        self.extra.insert(hardware.to_string(), value);
        self
    }
}

pub struct RecordReader {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    line: usize,
}

/// Records of `path` with their zero-based line index. Blank lines are
/// skipped; a malformed line yields an error and reading continues.
pub fn read_records(path: &Path) -> Result<RecordReader> {
    let file = File::open(path).map_err(|err| DatasetError::io(path, err))?;
    Ok(RecordReader {
        path: path.to_path_buf(),
        lines: BufReader::new(file).lines(),
        line: 0,
    })
}

impl Iterator for RecordReader {
    type Item = Result<(usize, BenchmarkRecord)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.line;
            let next = self.lines.next()?;
            self.line += 1;
            let text = match next {
                Ok(text) => text,
                Err(err) => return Some(Err(DatasetError::io(&self.path, err))),
            };
            if text.trim().is_empty() {
                continue;
            }
            return Some(
                serde_json::from_str(&text)
                    .map(|record| (line, record))
                    .map_err(|source| DatasetError::Decode {
                        path: self.path.clone(),
                        line,
                        source,
                    }),
            );
        }
    }
}

pub struct RecordWriter {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl RecordWriter {
    /// Open `path` for appending, creating it if needed.
    pub fn append(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|err| DatasetError::io(path, err))?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    pub fn write(&mut self, record: &BenchmarkRecord) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record).map_err(DatasetError::Encode)?;
        self.writer
            .write_all(b"\n")
            .map_err(|err| DatasetError::io(&self.path, err))
    }

    pub fn finish(mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|err| DatasetError::io(&self.path, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernelmeter_ir::GraphBuilder;
    use std::fs;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"{"graph": {"in": {"inbounds": [], "outbounds": [], "attr": {"name": "in", "type": "Placeholder", "output_shape": [[1, 8]]}}}, "gpu": 1.5, "cpu": null, "id": "m0"}

{"graph": {}, "gpu": 2}
not json
{"graph": {}}
"#;

    #[test]
    fn reads_records_with_line_indices() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("models.jsonl");
        fs::write(&path, SAMPLE).unwrap();

        let items: Vec<_> = read_records(&path).unwrap().collect();
        assert_eq!(items.len(), 4);

        let (line, first) = items[0].as_ref().unwrap();
        assert_eq!(*line, 0);
        assert_eq!(first.graph.len(), 1);
        assert_eq!(first.measured_latency("gpu"), Some(1.5));
        assert_eq!(first.measured_latency("cpu"), None);
        assert_eq!(first.extra["id"], "m0");

        let (line, second) = items[1].as_ref().unwrap();
        assert_eq!(*line, 2);
        assert_eq!(second.measured_latency("gpu"), Some(2.0));

        assert!(matches!(items[2], Err(DatasetError::Decode { line: 3, .. })));
        assert_eq!(items[3].as_ref().unwrap().0, 4);
    }

    #[test]
    fn writer_appends_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.jsonl");
        let graph = GraphBuilder::new().input("in", &[1, 4]).build();

        for latency in [Some(1.0), None] {
            let mut writer = RecordWriter::append(&path).unwrap();
            writer
                .write(&BenchmarkRecord::new(graph.clone()).with_measured_latency("gpu", latency))
                .unwrap();
            writer.finish().unwrap();
        }

        let records: Vec<_> = read_records(&path)
            .unwrap()
            .map(|item| item.unwrap().1)
            .collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].graph, graph);
        assert_eq!(records[0].measured_latency("gpu"), Some(1.0));
        assert_eq!(records[1].measured_latency("gpu"), None);
    }
}
