use log::warn;
use nalgebra as na;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use super::pose::RelativePose;
use super::schedule::FramePair;
use crate::error::Result;

const TITLE: &str = "Pose Estimations (Rotation R and Translation t between frames)";
const ROTATION_LABEL: &str = "Rotation Matrix R:";
const TRANSLATION_LABEL: &str = "Translation Vector t:";
const RULE_WIDTH: usize = 60;

/// One relative pose as persisted in the pose log
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseRecord {
    pub pair: FramePair,
    pub rotation: na::Matrix3<f64>,
    pub translation: na::Vector3<f64>,
}

impl PoseRecord {
    pub fn new(pair: FramePair, rotation: na::Matrix3<f64>, translation: na::Vector3<f64>) -> Self {
        Self {
            pair,
            rotation,
            translation,
        }
    }

    /// 4x4 homogeneous transform `[R | t; 0 0 0 1]`
    pub fn to_homogeneous(&self) -> na::Matrix4<f64> {
        let mut transform = na::Matrix4::identity();
        transform
            .fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&self.rotation);
        transform
            .fixed_view_mut::<3, 1>(0, 3)
            .copy_from(&self.translation);
        transform
    }
}

impl From<&RelativePose> for PoseRecord {
    fn from(pose: &RelativePose) -> Self {
        Self::new(pose.pair, pose.rotation, pose.translation)
    }
}

/// Appends pose records to a text log, in the order they are written.
///
/// The header goes out on construction, so a log created for a run
/// that produces no poses is still well formed.
pub struct PoseLogWriter<W: Write> {
    inner: W,
    written: usize,
}

impl PoseLogWriter<BufWriter<File>> {
    /// Create (or truncate) the log file at `path`
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        Self::new(BufWriter::new(file))
    }
}

impl<W: Write> PoseLogWriter<W> {
    pub fn new(mut inner: W) -> Result<Self> {
        writeln!(inner, "{TITLE}")?;
        writeln!(inner, "{}", "=".repeat(RULE_WIDTH))?;
        Ok(Self { inner, written: 0 })
    }

    pub fn write_record(&mut self, record: &PoseRecord) -> Result<()> {
        let r = &record.rotation;
        let t = &record.translation;
        let w = &mut self.inner;

        writeln!(w, "Frame {} to {}", record.pair.first, record.pair.second)?;
        writeln!(w, "{ROTATION_LABEL}")?;
        for row in 0..3 {
            let open = if row == 0 { "[[" } else { " [" };
            let close = if row == 2 { "]]" } else { "]," };
            writeln!(
                w,
                "{open}{:.4}, {:.4}, {:.4}{close}",
                r[(row, 0)],
                r[(row, 1)],
                r[(row, 2)]
            )?;
        }
        writeln!(w, "{TRANSLATION_LABEL}")?;
        writeln!(w, "[[{:.4}, {:.4}, {:.4}]]", t.x, t.y, t.z)?;
        writeln!(w, "{}", "-".repeat(RULE_WIDTH))?;

        self.written += 1;
        Ok(())
    }

    /// Number of records written so far
    pub fn written(&self) -> usize {
        self.written
    }

    /// Flush and hand back the sink
    pub fn finish(mut self) -> Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

/// Records recovered from a pose log, with counts of what had to be skipped
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoseLog {
    pub records: Vec<PoseRecord>,
    /// Blocks that started with a frame header but could not be parsed
    pub malformed: usize,
    /// Records whose source frame does not follow the previous record's
    pub out_of_order: usize,
}

impl PoseLog {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::read(BufReader::new(file))
    }

    /// Parse every record block of the log.
    ///
    /// A block runs from a `Frame i to j` line up to the next separator, the next
    /// frame header, or the end of input. Malformed blocks are skipped with a
    /// warning, only read errors are fatal.
    pub fn read<R: BufRead>(reader: R) -> Result<Self> {
        let mut log = PoseLog::default();
        let mut block: Option<Vec<String>> = None;

        for line in reader.lines() {
            let line = line?;
            let trimmed = line.trim();

            if trimmed.starts_with("Frame") {
                if let Some(lines) = block.take() {
                    log.push_block(&lines);
                }
                block = Some(vec![trimmed.to_string()]);
            } else if is_rule(trimmed) {
                if let Some(lines) = block.take() {
                    log.push_block(&lines);
                }
            } else if let Some(lines) = block.as_mut() {
                lines.push(trimmed.to_string());
            }
        }
        if let Some(lines) = block.take() {
            log.push_block(&lines);
        }

        Ok(log)
    }

    fn push_block(&mut self, lines: &[String]) {
        let Some(record) = parse_block(lines) else {
            warn!(
                "skipping malformed pose record `{}`",
                lines.first().map(String::as_str).unwrap_or_default()
            );
            self.malformed += 1;
            return;
        };

        if let Some(prev) = self.records.last() {
            if record.pair.first <= prev.pair.first {
                warn!(
                    "pose record {} does not follow {}, keeping file order",
                    record.pair, prev.pair
                );
                self.out_of_order += 1;
            }
        }
        self.records.push(record);
    }
}

fn is_rule(line: &str) -> bool {
    line.len() >= 3 && (line.chars().all(|c| c == '-') || line.chars().all(|c| c == '='))
}

fn parse_header(line: &str) -> Option<FramePair> {
    let mut tokens = line.split_whitespace();
    if tokens.next()? != "Frame" {
        return None;
    }
    let first = tokens.next()?.parse().ok()?;
    if tokens.next()? != "to" {
        return None;
    }
    let second = tokens.next()?.parse().ok()?;
    if tokens.next().is_some() || first >= second {
        return None;
    }
    Some(FramePair::new(first, second))
}

/// Numbers of a bracketed array literal such as `[[1., -0.5, 2e-3]]`
fn parse_array(text: &str) -> Option<Vec<f64>> {
    text.split(|c: char| c == '[' || c == ']' || c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .map(|token| token.parse::<f64>().ok().filter(|v| v.is_finite()))
        .collect()
}

fn parse_block(lines: &[String]) -> Option<PoseRecord> {
    let pair = parse_header(lines.first()?)?;
    let body = &lines[1..];

    let rot_at = body.iter().position(|l| l == ROTATION_LABEL)?;
    let trans_at = body.iter().position(|l| l == TRANSLATION_LABEL)?;
    if trans_at <= rot_at {
        return None;
    }

    let rotation = parse_array(&body[rot_at + 1..trans_at].join(" "))?;
    let translation = parse_array(&body[trans_at + 1..].join(" "))?;
    if rotation.len() != 9 || translation.len() != 3 {
        return None;
    }

    Some(PoseRecord::new(
        pair,
        na::Matrix3::from_row_slice(&rotation),
        na::Vector3::from_column_slice(&translation),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Cursor;

    fn sample_record(first: usize, second: usize) -> PoseRecord {
        let rotation = *na::Rotation3::from_euler_angles(0.01, -0.02, 0.03).matrix();
        let translation = na::Vector3::new(0.12, -0.05, 0.99).normalize();
        PoseRecord::new(FramePair::new(first, second), rotation, translation)
    }

    fn write_log(records: &[PoseRecord]) -> String {
        let mut writer = PoseLogWriter::new(Vec::new()).unwrap();
        for record in records {
            writer.write_record(record).unwrap();
        }
        assert_eq!(writer.written(), records.len());
        String::from_utf8(writer.finish().unwrap()).unwrap()
    }

    #[test]
    fn test_text_layout() {
        let record = PoseRecord::new(
            FramePair::new(0, 2),
            na::Matrix3::identity(),
            na::Vector3::new(0.0, 0.0, 1.0),
        );
        let text = write_log(&[record]);
        let expected = format!(
            "{TITLE}\n{}\nFrame 0 to 2\nRotation Matrix R:\n\
             [[1.0000, 0.0000, 0.0000],\n [0.0000, 1.0000, 0.0000],\n [0.0000, 0.0000, 1.0000]]\n\
             Translation Vector t:\n[[0.0000, 0.0000, 1.0000]]\n{}\n",
            "=".repeat(60),
            "-".repeat(60)
        );
        assert_eq!(text, expected);
    }

    #[test]
    fn test_empty_log_has_header_only() {
        let text = write_log(&[]);
        assert_eq!(text.lines().count(), 2);
        let log = PoseLog::read(Cursor::new(text)).unwrap();
        assert!(log.records.is_empty());
        assert_eq!(log.malformed, 0);
    }

    #[test]
    fn test_records_survive_at_four_decimals() {
        let records = [sample_record(0, 2), sample_record(2, 4), sample_record(4, 6)];
        let log = PoseLog::read(Cursor::new(write_log(&records))).unwrap();

        assert_eq!(log.records.len(), 3);
        assert_eq!(log.malformed, 0);
        assert_eq!(log.out_of_order, 0);
        for (parsed, original) in log.records.iter().zip(records.iter()) {
            assert_eq!(parsed.pair, original.pair);
            assert_relative_eq!(parsed.rotation, original.rotation, epsilon = 5e-5);
            assert_relative_eq!(parsed.translation, original.translation, epsilon = 5e-5);
        }
    }

    #[test]
    fn test_numpy_style_numbers() {
        let text = "Frame 3 to 5\n\
                    Rotation Matrix R:\n\
                    [[ 1.    , -0.    ,  0.0021],\n \
                    [ 0.    ,  1.    , -1.5e-03],\n \
                    [-0.0021,  0.    ,  1.    ]]\n\
                    Translation Vector t:\n\
                    [[-0.0123,  0.0456,  0.9988]]\n";
        let log = PoseLog::read(Cursor::new(text)).unwrap();
        assert_eq!(log.records.len(), 1);
        let record = &log.records[0];
        assert_eq!(record.pair, FramePair::new(3, 5));
        assert_eq!(record.rotation[(0, 2)], 0.0021);
        assert_eq!(record.rotation[(1, 2)], -0.0015);
        assert_eq!(record.translation.z, 0.9988);
    }

    #[test]
    fn test_malformed_block_is_skipped() {
        let mut text = write_log(&[sample_record(0, 2)]);
        text.push_str(
            "Frame 2 to 4\nRotation Matrix R:\n[[1.0, 0.0],\n [0.0, 1.0]]\n\
             Translation Vector t:\n[[0.0, 0.0, 1.0]]\n",
        );
        text.push_str(&"-".repeat(60));
        text.push('\n');
        text.push_str("Frame 4 to six\n");
        text.push_str(&write_log(&[sample_record(6, 8)]));

        let log = PoseLog::read(Cursor::new(text)).unwrap();
        assert_eq!(log.malformed, 2);
        let pairs: Vec<_> = log.records.iter().map(|r| r.pair).collect();
        assert_eq!(pairs, vec![FramePair::new(0, 2), FramePair::new(6, 8)]);
    }

    #[test]
    fn test_out_of_order_is_flagged_not_reordered() {
        let records = [sample_record(4, 6), sample_record(0, 2), sample_record(6, 8)];
        let log = PoseLog::read(Cursor::new(write_log(&records))).unwrap();
        assert_eq!(log.out_of_order, 1);
        let firsts: Vec<_> = log.records.iter().map(|r| r.pair.first).collect();
        assert_eq!(firsts, vec![4, 0, 6]);
    }

    #[test]
    fn test_file_is_truncated_on_create() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("poses.txt");

        let mut writer = PoseLogWriter::create(&path).unwrap();
        writer.write_record(&sample_record(0, 1)).unwrap();
        writer.write_record(&sample_record(1, 2)).unwrap();
        writer.finish().unwrap();

        let writer = PoseLogWriter::create(&path).unwrap();
        writer.finish().unwrap();

        let log = PoseLog::from_file(&path).unwrap();
        assert!(log.records.is_empty());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = PoseLog::from_file(dir.path().join("missing.txt"));
        assert!(matches!(result, Err(crate::error::VoError::Io(_))));
    }

    #[test]
    fn test_to_homogeneous() {
        let record = sample_record(0, 1);
        let t = record.to_homogeneous();
        assert_eq!(t.fixed_view::<3, 3>(0, 0), record.rotation);
        assert_eq!(t[(2, 3)], record.translation.z);
        assert_eq!(t[(3, 3)], 1.0);
    }
}
