//! Abundance table (TSV) loading.

use crate::error::{BubbleError, Result};
use crate::matrix::AbundanceMatrix;
use log::{debug, info};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Default name of the feature identifier column in BIOM-derived tables.
pub const DEFAULT_FEATURE_COLUMN: &str = "#OTU ID";

/// Trailing annotation column written by BIOM converters; never a sample.
const TAXONOMY_COLUMN: &str = "taxonomy";

/// Load an abundance table from a TSV file.
///
/// Expected format:
/// - Optional leading comment lines starting with `# ` (e.g. `# Constructed from biom file`)
/// - Header row naming the feature column and the sample columns
/// - One row per feature: identifier followed by counts
///
/// Empty cells, `NA` and `NaN` become missing values.
pub fn read_abundance_table<P: AsRef<Path>>(path: P, feature_column: &str) -> Result<AbundanceMatrix> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(BubbleError::MissingInputFile(path.to_path_buf()));
    }
    info!("Reading {} as tsv formatted abundance table...", path.display());
    let reader = BufReader::new(File::open(path)?);
    let matrix = parse_abundance_table(reader, feature_column, &path.display().to_string())?;
    info!(
        "Found {} features across {} samples",
        matrix.n_features(),
        matrix.n_samples()
    );
    Ok(matrix)
}

/// Parse an abundance table from any buffered reader.
///
/// `source_name` only appears in error messages.
pub fn parse_abundance_table<R: BufRead>(
    reader: R,
    feature_column: &str,
    source_name: &str,
) -> Result<AbundanceMatrix> {
    let mut lines = reader.lines().enumerate();

    // Skip comment lines up to the header
    let (header_line_no, header_line) = loop {
        match lines.next() {
            Some((idx, line)) => {
                let line = line?;
                if line.starts_with("# ") || line.trim().is_empty() {
                    debug!("Skipping line {} of {}", idx + 1, source_name);
                    continue;
                }
                break (idx + 1, line);
            }
            None => {
                return Err(BubbleError::InvalidInput(format!(
                    "{} has no header row",
                    source_name
                )))
            }
        }
    };

    let header: Vec<&str> = header_line.split('\t').map(|h| h.trim()).collect();
    let feature_idx = header
        .iter()
        .position(|&h| h == feature_column)
        .ok_or_else(|| BubbleError::SchemaMismatch {
            column: feature_column.to_string(),
            source_name: source_name.to_string(),
        })?;

    let n_fields = header.len();
    let taxonomy_idx = (header.last() == Some(&TAXONOMY_COLUMN) && feature_idx != n_fields - 1)
        .then_some(n_fields - 1);
    let sample_cols: Vec<usize> = (0..n_fields)
        .filter(|&i| i != feature_idx && Some(i) != taxonomy_idx)
        .collect();
    let sample_ids: Vec<String> = sample_cols.iter().map(|&i| header[i].to_string()).collect();
    debug!(
        "Header at line {}: feature column {}, {} sample columns",
        header_line_no,
        feature_idx,
        sample_ids.len()
    );

    let mut feature_ids = Vec::new();
    let mut values = Vec::new();

    for (idx, line) in lines {
        let line = line?;
        let line_no = idx + 1;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != n_fields {
            return Err(BubbleError::InvalidInput(format!(
                "line {} of {} has {} fields, header has {}",
                line_no,
                source_name,
                fields.len(),
                n_fields
            )));
        }

        feature_ids.push(fields[feature_idx].trim().to_string());
        for (&col, sample_id) in sample_cols.iter().zip(&sample_ids) {
            values.push(parse_cell(fields[col], line_no, sample_id)?);
        }
    }

    if feature_ids.is_empty() {
        return Err(BubbleError::InvalidInput(format!(
            "{} contains no feature rows",
            source_name
        )));
    }

    AbundanceMatrix::new(feature_ids, sample_ids, values)
}

/// Parse one abundance cell; `row` is the 1-based line number.
fn parse_cell(raw: &str, row: usize, column: &str) -> Result<Option<f64>> {
    let s = raw.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("na") || s.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    let invalid = || BubbleError::InvalidValue {
        value: raw.to_string(),
        row,
        column: column.to_string(),
    };
    let value: f64 = s.parse().map_err(|_| invalid())?;
    if !value.is_finite() || value < 0.0 {
        return Err(invalid());
    }
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(text: &str) -> Result<AbundanceMatrix> {
        parse_abundance_table(Cursor::new(text), DEFAULT_FEATURE_COLUMN, "test.tsv")
    }

    #[test]
    fn test_biom_export_with_comment_line() {
        let text = "# Constructed from biom file\n\
                    #OTU ID\ts1\ts2\ts3\n\
                    otu1\t1\t0\t3\n\
                    otu2\t10.5\t20\t30\n";
        let m = parse(text).unwrap();
        assert_eq!(m.feature_ids(), &["otu1", "otu2"]);
        assert_eq!(m.sample_ids(), &["s1", "s2", "s3"]);
        assert_eq!(m.row(0), &[Some(1.0), Some(0.0), Some(3.0)]);
        assert_eq!(m.get(1, 0), Some(10.5));
    }

    #[test]
    fn test_missing_cells_and_taxonomy_column() {
        let text = "#OTU ID\ts1\ts2\ttaxonomy\n\
                    otu1\t\tNA\tk__Bacteria\n\
                    otu2\t4\t5\tk__Archaea\n";
        let m = parse(text).unwrap();
        assert_eq!(m.sample_ids(), &["s1", "s2"]);
        assert_eq!(m.row(0), &[None, None]);
        assert_eq!(m.row(1), &[Some(4.0), Some(5.0)]);
    }

    #[test]
    fn test_feature_column_not_first() {
        let text = "s1\tasv\ts2\n1\tA\t2\n3\tB\t4\n";
        let m = parse_abundance_table(Cursor::new(text), "asv", "t").unwrap();
        assert_eq!(m.feature_ids(), &["A", "B"]);
        assert_eq!(m.sample_ids(), &["s1", "s2"]);
        assert_eq!(m.row(1), &[Some(3.0), Some(4.0)]);
    }

    #[test]
    fn test_missing_feature_column() {
        let err = parse("id\ts1\nA\t1\n").unwrap_err();
        assert!(matches!(err, BubbleError::SchemaMismatch { column, .. } if column == "#OTU ID"));
    }

    #[test]
    fn test_invalid_values() {
        let err = parse("#OTU ID\ts1\ts2\nA\t1\tabc\n").unwrap_err();
        match err {
            BubbleError::InvalidValue { value, row, column } => {
                assert_eq!(value, "abc");
                assert_eq!(row, 2);
                assert_eq!(column, "s2");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(matches!(
            parse("#OTU ID\ts1\nA\t-1\n").unwrap_err(),
            BubbleError::InvalidValue { .. }
        ));
    }

    #[test]
    fn test_ragged_and_empty_tables() {
        assert!(matches!(
            parse("#OTU ID\ts1\ts2\nA\t1\n").unwrap_err(),
            BubbleError::InvalidInput(_)
        ));
        assert!(matches!(parse("#OTU ID\ts1\n").unwrap_err(), BubbleError::InvalidInput(_)));
        assert!(matches!(parse("").unwrap_err(), BubbleError::InvalidInput(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = read_abundance_table("/nonexistent/table.tsv", DEFAULT_FEATURE_COLUMN).unwrap_err();
        assert!(matches!(err, BubbleError::MissingInputFile(_)));
    }
}
