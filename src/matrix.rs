//! Dense feature-by-sample matrix with missing values.

use crate::error::{BubbleError, Result};
use rustc_hash::FxHashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Abundance values indexed by feature (rows) and sample (columns).
///
/// Cells are `None` where a value is missing: a tree leaf with no row in the
/// source table, or an empty cell. Storage is row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct AbundanceMatrix {
    feature_ids: Vec<String>,
    sample_ids: Vec<String>,
    values: Vec<Option<f64>>,
}

impl AbundanceMatrix {
    /// Create a matrix from identifiers and row-major values.
    ///
    /// Fails on an empty shape, a value count that does not match the shape,
    /// duplicated identifiers or non-finite values.
    pub fn new(
        feature_ids: Vec<String>,
        sample_ids: Vec<String>,
        values: Vec<Option<f64>>,
    ) -> Result<Self> {
        if feature_ids.is_empty() {
            return Err(BubbleError::InvalidInput("matrix has no features".to_string()));
        }
        if sample_ids.is_empty() {
            return Err(BubbleError::InvalidInput("matrix has no samples".to_string()));
        }
        let expected = feature_ids.len() * sample_ids.len();
        if values.len() != expected {
            return Err(BubbleError::InvalidInput(format!(
                "matrix of {} x {} needs {} values, got {}",
                feature_ids.len(),
                sample_ids.len(),
                expected,
                values.len()
            )));
        }
        check_unique(&feature_ids, "feature")?;
        check_unique(&sample_ids, "sample")?;
        if let Some(pos) = values.iter().position(|v| v.is_some_and(|x| !x.is_finite())) {
            let n = sample_ids.len();
            return Err(BubbleError::InvalidInput(format!(
                "non-finite value for feature '{}' in sample '{}'",
                feature_ids[pos / n],
                sample_ids[pos % n]
            )));
        }
        Ok(Self {
            feature_ids,
            sample_ids,
            values,
        })
    }

    /// Create a matrix from one vector per feature.
    pub fn from_rows(
        feature_ids: Vec<String>,
        sample_ids: Vec<String>,
        rows: Vec<Vec<Option<f64>>>,
    ) -> Result<Self> {
        if rows.len() != feature_ids.len() {
            return Err(BubbleError::InvalidInput(format!(
                "{} feature ids but {} rows",
                feature_ids.len(),
                rows.len()
            )));
        }
        let n_samples = sample_ids.len();
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != n_samples) {
            return Err(BubbleError::InvalidInput(format!(
                "row '{}' has {} values, expected {}",
                feature_ids[i],
                row.len(),
                n_samples
            )));
        }
        let values = rows.into_iter().flatten().collect();
        Self::new(feature_ids, sample_ids, values)
    }

    #[inline]
    pub fn n_features(&self) -> usize {
        self.feature_ids.len()
    }

    #[inline]
    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    #[inline]
    pub fn feature_ids(&self) -> &[String] {
        &self.feature_ids
    }

    #[inline]
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        self.values[row * self.n_samples() + col]
    }

    /// Values of one feature across all samples.
    #[inline]
    pub fn row(&self, row: usize) -> &[Option<f64>] {
        let n = self.n_samples();
        &self.values[row * n..(row + 1) * n]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Option<f64>]> + '_ {
        self.values.chunks(self.n_samples())
    }

    /// True if at least one feature has a value in this column.
    pub fn column_has_value(&self, col: usize) -> bool {
        self.rows().any(|row| row[col].is_some())
    }

    /// Smallest and largest present value, `None` if every cell is missing.
    pub fn value_range(&self) -> Option<(f64, f64)> {
        self.values.iter().flatten().fold(None, |acc, &x| match acc {
            None => Some((x, x)),
            Some((lo, hi)) => Some((lo.min(x), hi.max(x))),
        })
    }

    /// Write the matrix as TSV, missing cells as `NA`.
    pub fn write_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        write!(writer, "feature_id")?;
        for sample_id in &self.sample_ids {
            write!(writer, "\t{}", sample_id)?;
        }
        writeln!(writer)?;

        for (feature_id, row) in self.feature_ids.iter().zip(self.rows()) {
            write!(writer, "{}", feature_id)?;
            for value in row {
                match value {
                    Some(x) => write!(writer, "\t{}", x)?,
                    None => write!(writer, "\tNA")?,
                }
            }
            writeln!(writer)?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn check_unique(ids: &[String], kind: &str) -> Result<()> {
    let mut seen: FxHashSet<&str> = FxHashSet::default();
    for id in ids {
        if !seen.insert(id.as_str()) {
            return Err(BubbleError::InvalidInput(format!(
                "duplicate {} identifier '{}'",
                kind, id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_from_rows_shape() {
        let m = AbundanceMatrix::from_rows(
            ids(&["A", "B"]),
            ids(&["s1", "s2", "s3"]),
            vec![
                vec![Some(1.0), None, Some(3.0)],
                vec![Some(4.0), Some(5.0), Some(6.0)],
            ],
        )
        .unwrap();

        assert_eq!(m.n_features(), 2);
        assert_eq!(m.n_samples(), 3);
        assert_eq!(m.get(0, 1), None);
        assert_eq!(m.get(1, 2), Some(6.0));
        assert_eq!(m.row(1), &[Some(4.0), Some(5.0), Some(6.0)]);
        assert_eq!(m.value_range(), Some((1.0, 6.0)));
    }

    #[test]
    fn test_duplicate_feature_rejected() {
        let err = AbundanceMatrix::from_rows(
            ids(&["A", "A"]),
            ids(&["s1"]),
            vec![vec![Some(1.0)], vec![Some(2.0)]],
        )
        .unwrap_err();
        assert!(matches!(err, BubbleError::InvalidInput(msg) if msg.contains("'A'")));
    }

    #[test]
    fn test_duplicate_sample_rejected() {
        let err = AbundanceMatrix::new(ids(&["A"]), ids(&["s1", "s1"]), vec![Some(1.0), Some(2.0)])
            .unwrap_err();
        assert!(matches!(err, BubbleError::InvalidInput(_)));
    }

    #[test]
    fn test_empty_and_ragged_rejected() {
        assert!(AbundanceMatrix::new(vec![], ids(&["s1"]), vec![]).is_err());
        assert!(AbundanceMatrix::new(ids(&["A"]), vec![], vec![]).is_err());
        assert!(AbundanceMatrix::from_rows(
            ids(&["A", "B"]),
            ids(&["s1", "s2"]),
            vec![vec![Some(1.0), Some(2.0)], vec![Some(1.0)]],
        )
        .is_err());
    }

    #[test]
    fn test_non_finite_rejected() {
        let err = AbundanceMatrix::new(ids(&["A"]), ids(&["s1"]), vec![Some(f64::NAN)]).unwrap_err();
        assert!(matches!(err, BubbleError::InvalidInput(_)));
    }

    #[test]
    fn test_column_has_value() {
        let m = AbundanceMatrix::from_rows(
            ids(&["A", "B"]),
            ids(&["s1", "s2"]),
            vec![vec![Some(1.0), None], vec![None, None]],
        )
        .unwrap();
        assert!(m.column_has_value(0));
        assert!(!m.column_has_value(1));
    }

    #[test]
    fn test_write_tsv() {
        let m = AbundanceMatrix::from_rows(
            ids(&["A"]),
            ids(&["s1", "s2"]),
            vec![vec![Some(0.5), None]],
        )
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tsv");
        m.write_tsv(&path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "feature_id\ts1\ts2\nA\t0.5\tNA\n");
    }
}
