//! Training dataset output

use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use tracing::info;

use super::labels::TrainingRecord;
use crate::atomic::write_atomic_with;
use crate::error::{ConfigError, Result};

/// File layout of a written dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DatasetFormat {
    /// One JSON array
    #[default]
    Json,
    /// One JSON object per line
    JsonLines,
    /// Header row plus one row per record; the box is split into
    /// `x0,y0,x1,y1` and answer offsets are joined with `;`
    Csv,
}

impl DatasetFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            DatasetFormat::Json => "json",
            DatasetFormat::JsonLines => "jsonl",
            DatasetFormat::Csv => "csv",
        }
    }

    /// Format implied by a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()?.to_str()?.parse().ok()
    }
}

impl FromStr for DatasetFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(DatasetFormat::Json),
            "jsonl" | "ndjson" => Ok(DatasetFormat::JsonLines),
            "csv" => Ok(DatasetFormat::Csv),
            other => Err(format!("unknown dataset format: {other}")),
        }
    }
}

impl fmt::Display for DatasetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// A row type the dataset writer can emit in every [`DatasetFormat`].
///
/// JSON forms use the `Serialize` impl as is. CSV has no nested values, so
/// each record type writes its own flat row.
pub trait DatasetRecord: Serialize + Clone {
    fn write_csv<W: io::Write>(&self, writer: &mut csv::Writer<W>) -> csv::Result<()>;
}

impl DatasetRecord for TrainingRecord {
    fn write_csv<W: io::Write>(&self, writer: &mut csv::Writer<W>) -> csv::Result<()> {
        writer.serialize(CsvRow::from(self))
    }
}

/// Answer offsets as one CSV cell, `;`-separated
pub(crate) fn join_offsets(offsets: &[usize]) -> String {
    offsets.iter().map(|o| o.to_string()).collect::<Vec<_>>().join(";")
}

#[derive(Serialize)]
struct CsvRow<'a> {
    text: &'a str,
    question_id: &'a str,
    expected_answer: &'a str,
    label: &'static str,
    score: f64,
    source: &'a str,
    page: usize,
    x0: f64,
    y0: f64,
    x1: f64,
    y1: f64,
    answer_start: String,
}

impl<'a> From<&'a TrainingRecord> for CsvRow<'a> {
    fn from(record: &'a TrainingRecord) -> Self {
        Self {
            text: &record.text,
            question_id: &record.question_id,
            expected_answer: &record.expected_answer,
            label: record.label.as_str(),
            score: record.score,
            source: &record.source,
            page: record.page,
            x0: record.bbox.x0,
            y0: record.bbox.y0,
            x1: record.bbox.x1,
            y1: record.bbox.y1,
            answer_start: join_offsets(&record.answer_start),
        }
    }
}

/// Record counts of a train/validation split
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitCounts {
    pub train: usize,
    pub val: usize,
}

/// Writes dataset records atomically. One writer owns a destination;
/// concurrent writers to the same path are not supported.
#[derive(Debug, Clone, Copy, Default)]
pub struct DatasetWriter {
    format: DatasetFormat,
}

impl DatasetWriter {
    pub fn new(format: DatasetFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> DatasetFormat {
        self.format
    }

    /// Write all records to `destination` and return how many were written
    pub fn write<R: DatasetRecord>(&self, records: &[R], destination: &Path) -> Result<usize> {
        let format = self.format;
        write_atomic_with(destination, |writer| match format {
            DatasetFormat::Json => {
                serde_json::to_writer_pretty(&mut *writer, records)?;
                writeln!(writer)
            }
            DatasetFormat::JsonLines => {
                for record in records {
                    serde_json::to_writer(&mut *writer, record)?;
                    writeln!(writer)?;
                }
                Ok(())
            }
            DatasetFormat::Csv => {
                let mut csv_writer = csv::Writer::from_writer(&mut *writer);
                for record in records {
                    record.write_csv(&mut csv_writer)?;
                }
                csv_writer.flush()
            }
        })?;

        info!(
            path = %destination.display(),
            records = records.len(),
            format = %self.format,
            "wrote dataset"
        );
        Ok(records.len())
    }

    /// Shuffle with `seed`, hold out `val_ratio` of the records and write
    /// `train.<ext>` and `val.<ext>` into `dir`
    pub fn write_split<R: DatasetRecord>(
        &self,
        records: &[R],
        dir: &Path,
        val_ratio: f64,
        seed: u64,
    ) -> Result<SplitCounts> {
        if !(0.0..1.0).contains(&val_ratio) {
            return Err(ConfigError::InvalidValidationRatio(val_ratio).into());
        }

        let mut shuffled: Vec<&R> = records.iter().collect();
        shuffled.shuffle(&mut StdRng::seed_from_u64(seed));
        let val_len = (records.len() as f64 * val_ratio).round() as usize;
        let (val, train) = shuffled.split_at(val_len.min(records.len()));

        let train: Vec<R> = train.iter().map(|r| (*r).clone()).collect();
        let val: Vec<R> = val.iter().map(|r| (*r).clone()).collect();
        self.write(&train, &self.split_path(dir, "train"))?;
        self.write(&val, &self.split_path(dir, "val"))?;

        Ok(SplitCounts {
            train: train.len(),
            val: val.len(),
        })
    }

    pub fn split_path(&self, dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{name}.{}", self.format.extension()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curation::labels::Label;
    use crate::error::PrestepsError;
    use crate::geometry::BoundingBox;
    use std::fs;

    fn record(i: usize) -> TrainingRecord {
        TrainingRecord {
            text: format!("Emissions, \"scope {i}\": 120 tCO2e"),
            question_id: format!("Q{i}"),
            expected_answer: "120 tCO2e".to_string(),
            label: if i % 2 == 0 { Label::Positive } else { Label::Negative },
            score: 0.5 + i as f64 / 100.0,
            source: "acme.pdf".to_string(),
            page: i,
            bbox: BoundingBox::new(72.0, 700.0, 300.5, 712.0),
            answer_start: if i % 2 == 0 { vec![22] } else { vec![] },
        }
    }

    #[test]
    fn test_write_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.json");
        let records: Vec<TrainingRecord> = (0..3).map(record).collect();

        let written = DatasetWriter::default().write(&records, &path).unwrap();
        assert_eq!(written, 3);
        let parsed: Vec<TrainingRecord> = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed, records);
    }

    #[test]
    fn test_write_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.jsonl");
        let records: Vec<TrainingRecord> = (0..4).map(record).collect();
        DatasetWriter::new(DatasetFormat::JsonLines).write(&records, &path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 4);
        let first: TrainingRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first, records[0]);
    }

    #[test]
    fn test_write_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.csv");
        DatasetWriter::new(DatasetFormat::Csv)
            .write(&[record(0), record(1)], &path)
            .unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(
            headers.iter().collect::<Vec<_>>(),
            vec![
                "text", "question_id", "expected_answer", "label", "score", "source", "page", "x0", "y0",
                "x1", "y1", "answer_start"
            ]
        );
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][0], "Emissions, \"scope 0\": 120 tCO2e");
        assert_eq!(&rows[0][3], "positive");
        assert_eq!(&rows[0][10], "712.0");
        assert_eq!(&rows[0][11], "22");
        assert_eq!(&rows[1][11], "");
    }

    #[test]
    fn test_empty_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.json");
        assert_eq!(DatasetWriter::default().write::<TrainingRecord>(&[], &path).unwrap(), 0);
        let parsed: Vec<TrainingRecord> = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(parsed.is_empty());
    }

    #[test]
    fn test_unwritable_destination_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no_such_dir").join("train.json");
        let err = DatasetWriter::default().write(&[record(0)], &path).unwrap_err();
        assert!(matches!(err, PrestepsError::Write { .. }));
        assert!(!path.exists());
    }

    #[test]
    fn test_failed_write_keeps_prior_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.json");
        DatasetWriter::default().write(&[record(0)], &path).unwrap();
        let before = fs::read(&path).unwrap();

        // A directory at the destination makes the final rename fail
        let blocked = dir.path().join("blocked.json");
        fs::create_dir(&blocked).unwrap();
        fs::write(blocked.join("keep"), b"x").unwrap();
        assert!(DatasetWriter::default().write(&[record(1)], &blocked).is_err());
        assert!(blocked.join("keep").exists());

        assert_eq!(fs::read(&path).unwrap(), before);
        // Only the dataset and the blocking directory remain
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_write_split() {
        let dir = tempfile::tempdir().unwrap();
        let records: Vec<TrainingRecord> = (0..10).map(record).collect();
        let writer = DatasetWriter::new(DatasetFormat::JsonLines);

        let counts = writer.write_split(&records, dir.path(), 0.2, 42).unwrap();
        assert_eq!(counts, SplitCounts { train: 8, val: 2 });
        let train = fs::read_to_string(dir.path().join("train.jsonl")).unwrap();
        let val = fs::read_to_string(dir.path().join("val.jsonl")).unwrap();
        assert_eq!(train.lines().count(), 8);
        assert_eq!(val.lines().count(), 2);

        // Same seed, same split
        let again = tempfile::tempdir().unwrap();
        writer.write_split(&records, again.path(), 0.2, 42).unwrap();
        assert_eq!(fs::read_to_string(again.path().join("val.jsonl")).unwrap(), val);
    }

    #[test]
    fn test_write_split_rejects_bad_ratio() {
        let dir = tempfile::tempdir().unwrap();
        let err = DatasetWriter::default()
            .write_split(&[record(0)], dir.path(), 1.5, 1)
            .unwrap_err();
        assert!(matches!(err, PrestepsError::Config(ConfigError::InvalidValidationRatio(_))));
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("JSONL".parse::<DatasetFormat>(), Ok(DatasetFormat::JsonLines));
        assert_eq!(DatasetFormat::from_path(Path::new("out/train.csv")), Some(DatasetFormat::Csv));
        assert_eq!(DatasetFormat::from_path(Path::new("out/train")), None);
        assert!("xml".parse::<DatasetFormat>().is_err());
    }
}
