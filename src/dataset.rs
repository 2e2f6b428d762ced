//! Test dataset list handling.
//!
//! Evaluation datasets are line-oriented text lists, one sample per line: first `2 * L` landmark
//! coordinates in normalized `[0.0, 1.0]` space, then optional auxiliary metadata columns
//! (attribute flags, pose angles), and the image path as the last whitespace-separated token.
//! Image paths are resolved relative to the directory containing the list file.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};

use crate::landmark::Landmarks;

/// One labeled sample of a test list: an image path plus its ground-truth landmarks.
#[derive(Debug, Clone)]
pub struct Record {
    pub image_path: PathBuf,
    pub landmarks: Landmarks,
}

/// A fully parsed test list.
pub struct ListDataset {
    records: Vec<Record>,
}

impl ListDataset {
    /// Reads and parses a test list from `path`, expecting `num_landmarks` points per line.
    ///
    /// Parsing is strict: a malformed line aborts with an error naming the line, rather than
    /// silently skewing the metrics by skipping samples.
    pub fn open(path: impl AsRef<Path>, num_landmarks: usize) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read test list '{}'", path.display()))?;
        let base_dir = path.parent().unwrap_or(Path::new("."));

        let mut records = Vec::new();
        for (index, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }

            let record = parse_line(line, num_landmarks, base_dir)
                .with_context(|| format!("{}:{}", path.display(), index + 1))?;
            records.push(record);
        }

        log::info!("loaded {} samples from '{}'", records.len(), path.display());
        Ok(Self { records })
    }

    /// Returns the number of samples in the list.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the parsed records in list order.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

fn parse_line(line: &str, num_landmarks: usize, base_dir: &Path) -> anyhow::Result<Record> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let coords = num_landmarks * 2;
    if tokens.len() < coords + 1 {
        bail!(
            "expected at least {} columns ({} coordinates + image path), got {}",
            coords + 1,
            coords,
            tokens.len()
        );
    }

    let mut positions = Vec::with_capacity(num_landmarks);
    for pair in tokens[..coords].chunks_exact(2) {
        let x: f32 = pair[0]
            .parse()
            .with_context(|| format!("invalid coordinate '{}'", pair[0]))?;
        let y: f32 = pair[1]
            .parse()
            .with_context(|| format!("invalid coordinate '{}'", pair[1]))?;
        positions.push([x, y]);
    }

    // Columns between the coordinates and the path hold attribute flags and pose angles, which
    // the metrics don't consume.
    let image_path = base_dir.join(tokens[tokens.len() - 1]);

    Ok(Record {
        image_path,
        landmarks: Landmarks::from_positions(positions),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_coordinates_metadata_and_path() {
        let line = "0.1 0.2 0.3 0.4 1 0 0 12.5 imgs/face_0.png";
        let record = parse_line(line, 2, Path::new("/data")).unwrap();

        assert_eq!(record.image_path, Path::new("/data/imgs/face_0.png"));
        assert_eq!(record.landmarks.len(), 2);
        assert_eq!(record.landmarks.position(0), [0.1, 0.2]);
        assert_eq!(record.landmarks.position(1), [0.3, 0.4]);
    }

    #[test]
    fn open_resolves_paths_relative_to_list() {
        let dir = std::env::temp_dir().join(format!("markeval-list-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let list = dir.join("list.txt");
        std::fs::write(
            &list,
            "0.1 0.2 0.3 0.4 imgs/a.png\n\n0.5 0.6 0.7 0.8 imgs/b.png\n",
        )
        .unwrap();

        let dataset = ListDataset::open(&list, 2).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.records()[0].image_path, dir.join("imgs/a.png"));
        assert_eq!(dataset.records()[1].image_path, dir.join("imgs/b.png"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn rejects_short_lines() {
        let err = parse_line("0.1 0.2 face.png", 2, Path::new(".")).unwrap_err();
        assert!(err.to_string().contains("expected at least 5 columns"));
    }

    #[test]
    fn rejects_non_numeric_coordinates() {
        let err = parse_line("0.1 oops 0.3 0.4 face.png", 2, Path::new(".")).unwrap_err();
        assert!(err.to_string().contains("invalid coordinate 'oops'"));
    }
}
