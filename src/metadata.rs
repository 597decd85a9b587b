//! Sample metadata: grouping samples by a mapping-file category.

use crate::error::{BubbleError, Result};
use log::{info, warn};
use rustc_hash::{FxHashMap, FxHashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Default name of the sample identifier column in QIIME mapping files.
pub const DEFAULT_SAMPLE_COLUMN: &str = "#SampleID";

/// Order in which groups are laid out (and colored).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupOrder {
    /// Labels in ascending order.
    #[default]
    Sorted,
    /// Labels in order of first appearance in the mapping.
    FirstSeen,
}

/// One category label and the samples carrying it, in mapping order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleGroup {
    pub label: String,
    pub members: Vec<String>,
}

/// Ordered sequence of sample groups.
///
/// Every sample belongs to exactly one group, labels are unique and no group
/// is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleGroups {
    groups: Vec<SampleGroup>,
}

impl SampleGroups {
    pub fn new(groups: Vec<SampleGroup>) -> Result<Self> {
        if groups.is_empty() {
            return Err(BubbleError::InvalidInput("no sample groups".to_string()));
        }
        let mut labels: FxHashSet<&str> = FxHashSet::default();
        let mut samples: FxHashSet<&str> = FxHashSet::default();
        for group in &groups {
            if !labels.insert(group.label.as_str()) {
                return Err(BubbleError::InvalidInput(format!(
                    "duplicate group label '{}'",
                    group.label
                )));
            }
            if group.members.is_empty() {
                return Err(BubbleError::InvalidInput(format!(
                    "group '{}' has no samples",
                    group.label
                )));
            }
            for sample in &group.members {
                if !samples.insert(sample.as_str()) {
                    return Err(BubbleError::InvalidInput(format!(
                        "sample '{}' is assigned to more than one group",
                        sample
                    )));
                }
            }
        }
        Ok(Self { groups })
    }

    /// Build groups from `(sample, label)` pairs in mapping order.
    pub fn from_assignments<I, S, L>(assignments: I, order: GroupOrder) -> Result<Self>
    where
        I: IntoIterator<Item = (S, L)>,
        S: Into<String>,
        L: Into<String>,
    {
        let mut groups: Vec<SampleGroup> = Vec::new();
        let mut index: FxHashMap<String, usize> = FxHashMap::default();
        for (sample, label) in assignments {
            let label = label.into();
            let slot = match index.get(&label) {
                Some(&i) => i,
                None => {
                    index.insert(label.clone(), groups.len());
                    groups.push(SampleGroup {
                        label,
                        members: Vec::new(),
                    });
                    groups.len() - 1
                }
            };
            groups[slot].members.push(sample.into());
        }
        if order == GroupOrder::Sorted {
            groups.sort_by(|a, b| a.label.cmp(&b.label));
        }
        Self::new(groups)
    }

    #[inline]
    pub fn groups(&self) -> &[SampleGroup] {
        &self.groups
    }

    pub fn iter(&self) -> impl Iterator<Item = &SampleGroup> + '_ {
        self.groups.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Total number of samples across all groups.
    pub fn n_samples(&self) -> usize {
        self.groups.iter().map(|g| g.members.len()).sum()
    }

    /// Index of the group containing `sample`.
    pub fn group_of(&self, sample: &str) -> Option<usize> {
        self.groups
            .iter()
            .position(|g| g.members.iter().any(|m| m == sample))
    }
}

/// Load sample groups for `category` from a TSV mapping file.
pub fn read_sample_groups<P: AsRef<Path>>(
    path: P,
    sample_column: &str,
    category: &str,
    order: GroupOrder,
) -> Result<SampleGroups> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(BubbleError::MissingInputFile(path.to_path_buf()));
    }
    info!("Reading in {} as mapping file...", path.display());
    let reader = BufReader::new(File::open(path)?);
    let groups = parse_sample_groups(
        reader,
        sample_column,
        category,
        order,
        &path.display().to_string(),
    )?;
    info!(
        "Found {} groups for category '{}' covering {} samples",
        groups.len(),
        category,
        groups.n_samples()
    );
    Ok(groups)
}

/// Parse sample groups from any buffered reader.
///
/// Rows with an empty sample id or category value are skipped with a warning;
/// other columns are ignored.
pub fn parse_sample_groups<R: BufRead>(
    reader: R,
    sample_column: &str,
    category: &str,
    order: GroupOrder,
    source_name: &str,
) -> Result<SampleGroups> {
    let mut lines = reader.lines();
    let header_line = lines
        .next()
        .ok_or_else(|| BubbleError::InvalidInput(format!("{} is empty", source_name)))??;
    let header: Vec<&str> = header_line.split('\t').map(|h| h.trim()).collect();

    let find = |column: &str| {
        header
            .iter()
            .position(|&h| h == column)
            .ok_or_else(|| BubbleError::SchemaMismatch {
                column: column.to_string(),
                source_name: source_name.to_string(),
            })
    };
    let sample_idx = find(sample_column)?;
    let category_idx = find(category)?;

    let mut assignments: Vec<(String, String)> = Vec::new();
    for (idx, line) in lines.enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        let sample = fields.get(sample_idx).map(|s| s.trim()).unwrap_or("");
        let label = fields.get(category_idx).map(|s| s.trim()).unwrap_or("");
        if sample.is_empty() || label.is_empty() {
            warn!(
                "Skipping line {} of {}: no sample id or '{}' value",
                idx + 2,
                source_name,
                category
            );
            continue;
        }
        assignments.push((sample.to_string(), label.to_string()));
    }

    if assignments.is_empty() {
        return Err(BubbleError::InvalidInput(format!(
            "{} assigns no sample to a '{}' group",
            source_name, category
        )));
    }

    SampleGroups::from_assignments(assignments, order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const MAPPING: &str = "#SampleID\tBarcode\tsite\tdepth\n\
                           s1\tAAA\tgut\t1\n\
                           s2\tCCC\tskin\t2\n\
                           s3\tGGG\tgut\t3\n\
                           s4\tTTT\tair\t4\n";

    fn labels(groups: &SampleGroups) -> Vec<&str> {
        groups.iter().map(|g| g.label.as_str()).collect()
    }

    #[test]
    fn test_sorted_group_order() {
        let groups = parse_sample_groups(
            Cursor::new(MAPPING),
            DEFAULT_SAMPLE_COLUMN,
            "site",
            GroupOrder::Sorted,
            "map.tsv",
        )
        .unwrap();
        assert_eq!(labels(&groups), vec!["air", "gut", "skin"]);
        assert_eq!(groups.groups()[1].members, vec!["s1", "s3"]);
        assert_eq!(groups.n_samples(), 4);
        assert_eq!(groups.group_of("s2"), Some(2));
        assert_eq!(groups.group_of("s9"), None);
    }

    #[test]
    fn test_first_seen_group_order() {
        let groups = parse_sample_groups(
            Cursor::new(MAPPING),
            DEFAULT_SAMPLE_COLUMN,
            "site",
            GroupOrder::FirstSeen,
            "map.tsv",
        )
        .unwrap();
        assert_eq!(labels(&groups), vec!["gut", "skin", "air"]);
    }

    #[test]
    fn test_missing_columns() {
        let err = parse_sample_groups(
            Cursor::new(MAPPING),
            DEFAULT_SAMPLE_COLUMN,
            "habitat",
            GroupOrder::Sorted,
            "map.tsv",
        )
        .unwrap_err();
        assert!(matches!(err, BubbleError::SchemaMismatch { column, .. } if column == "habitat"));

        let err = parse_sample_groups(
            Cursor::new(MAPPING),
            "sample",
            "site",
            GroupOrder::Sorted,
            "map.tsv",
        )
        .unwrap_err();
        assert!(matches!(err, BubbleError::SchemaMismatch { column, .. } if column == "sample"));
    }

    #[test]
    fn test_blank_category_skipped() {
        let text = "#SampleID\tsite\ns1\tgut\ns2\t\ns3\n";
        let groups = parse_sample_groups(
            Cursor::new(text),
            DEFAULT_SAMPLE_COLUMN,
            "site",
            GroupOrder::Sorted,
            "map.tsv",
        )
        .unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups.groups()[0].members, vec!["s1"]);
    }

    #[test]
    fn test_duplicate_sample_rejected() {
        let err = SampleGroups::from_assignments(
            vec![("s1", "X"), ("s1", "Y")],
            GroupOrder::Sorted,
        )
        .unwrap_err();
        assert!(matches!(err, BubbleError::InvalidInput(_)));
    }

    #[test]
    fn test_new_rejects_empty_group() {
        let err = SampleGroups::new(vec![SampleGroup {
            label: "X".to_string(),
            members: vec![],
        }])
        .unwrap_err();
        assert!(matches!(err, BubbleError::InvalidInput(_)));
        assert!(SampleGroups::new(vec![]).is_err());
    }
}
