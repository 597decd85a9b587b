//! Row normalization and tree/group driven reordering of an abundance matrix.
//!
//! The pipeline is:
//!
//! 1. optional pseudocount and removal of rows that cannot be normalized
//! 2. [`normalize`] every feature row
//! 3. [`reorder_by_leaves`] so rows follow the tree tips
//! 4. [`group_and_reorder_columns`] so samples are clustered by group
//!
//! Every step takes its input by reference and returns a new value.

use crate::error::{BubbleError, Result};
use crate::matrix::AbundanceMatrix;
use crate::metadata::{SampleGroup, SampleGroups};
use log::{debug, info, warn};
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};

/// How each feature row is rescaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Normalization {
    /// Min-max rescaling of each row to `[0, 1]`.
    #[default]
    RowScale,
    /// Base-10 logarithm of each value.
    Log,
}

/// Tree tip identifiers, left to right. Never empty, never duplicated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafOrder(Vec<String>);

impl LeafOrder {
    pub fn new(ids: Vec<String>) -> Result<Self> {
        if ids.is_empty() {
            return Err(BubbleError::InvalidInput("leaf order is empty".to_string()));
        }
        let mut seen: FxHashSet<&str> = FxHashSet::default();
        for id in &ids {
            if !seen.insert(id.as_str()) {
                return Err(BubbleError::InvalidInput(format!(
                    "leaf '{}' appears more than once",
                    id
                )));
            }
        }
        Ok(Self(ids))
    }

    #[inline]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> + '_ {
        self.0.iter()
    }
}

/// Normalize one feature row.
///
/// * `RowScale`: `(x - min) / (max - min) * multiplier` over the present
///   values; missing values become `0`. A row without values, or whose
///   values are all equal, is rejected.
/// * `Log`: `log10(x) * multiplier`; any value `<= 0` is rejected. Missing
///   values stay missing.
pub fn normalize_row(
    feature: &str,
    row: &[Option<f64>],
    mode: Normalization,
    multiplier: f64,
) -> Result<Vec<Option<f64>>> {
    let invalid = |reason: String| BubbleError::InvalidRow {
        feature: feature.to_string(),
        reason,
    };

    match mode {
        Normalization::RowScale => {
            let (rmin, rmax) = row
                .iter()
                .flatten()
                .fold(None, |acc: Option<(f64, f64)>, &x| match acc {
                    None => Some((x, x)),
                    Some((lo, hi)) => Some((lo.min(x), hi.max(x))),
                })
                .ok_or_else(|| invalid("row has no values".to_string()))?;
            if rmax <= rmin {
                return Err(invalid(format!(
                    "all values equal {}, min-max scaling is undefined",
                    rmin
                )));
            }
            let span = rmax - rmin;
            Ok(row
                .iter()
                .map(|v| Some(v.map_or(0.0, |x| (x - rmin) / span * multiplier)))
                .collect())
        }
        Normalization::Log => row
            .iter()
            .enumerate()
            .map(|(col, v)| match *v {
                Some(x) if x > 0.0 => Ok(Some(x.log10() * multiplier)),
                Some(x) => Err(invalid(format!(
                    "log10 is undefined for value {} in column {}",
                    x,
                    col + 1
                ))),
                None => Ok(None),
            })
            .collect(),
    }
}

fn check_multiplier(multiplier: f64) -> Result<()> {
    if !multiplier.is_finite() || multiplier <= 0.0 {
        return Err(BubbleError::InvalidInput(format!(
            "display multiplier must be a positive number, got {}",
            multiplier
        )));
    }
    Ok(())
}

/// Normalize every row of `matrix`.
///
/// Rows are processed in parallel; on failure the first offending row in
/// matrix order is reported.
pub fn normalize(
    matrix: &AbundanceMatrix,
    mode: Normalization,
    multiplier: f64,
) -> Result<AbundanceMatrix> {
    check_multiplier(multiplier)?;
    let feature_ids = matrix.feature_ids();

    let results: Vec<Result<Vec<Option<f64>>>> = (0..matrix.n_features())
        .into_par_iter()
        .map(|r| normalize_row(&feature_ids[r], matrix.row(r), mode, multiplier))
        .collect();
    let rows = results.into_iter().collect::<Result<Vec<_>>>()?;

    debug!(
        "Normalized {} rows ({:?}, x{})",
        rows.len(),
        mode,
        multiplier
    );
    AbundanceMatrix::from_rows(feature_ids.to_vec(), matrix.sample_ids().to_vec(), rows)
}

/// Add `pseudocount` to every present value.
pub fn add_pseudocount(matrix: &AbundanceMatrix, pseudocount: f64) -> Result<AbundanceMatrix> {
    if !pseudocount.is_finite() || pseudocount <= 0.0 {
        return Err(BubbleError::InvalidInput(
            "pseudocount must be positive".to_string(),
        ));
    }
    let rows = matrix
        .rows()
        .map(|row| row.iter().map(|v| v.map(|x| x + pseudocount)).collect())
        .collect();
    AbundanceMatrix::from_rows(
        matrix.feature_ids().to_vec(),
        matrix.sample_ids().to_vec(),
        rows,
    )
}

/// Remove the rows that `mode` cannot normalize.
///
/// Returns the remaining matrix and the ids of the dropped features.
pub fn drop_degenerate_rows(
    matrix: &AbundanceMatrix,
    mode: Normalization,
) -> Result<(AbundanceMatrix, Vec<String>)> {
    let mut kept_ids = Vec::new();
    let mut kept_rows = Vec::new();
    let mut dropped = Vec::new();

    for (id, row) in matrix.feature_ids().iter().zip(matrix.rows()) {
        if normalize_row(id, row, mode, 1.0).is_ok() {
            kept_ids.push(id.clone());
            kept_rows.push(row.to_vec());
        } else {
            dropped.push(id.clone());
        }
    }

    if kept_ids.is_empty() {
        return Err(BubbleError::InvalidInput(format!(
            "all {} rows are degenerate under {:?} normalization",
            dropped.len(),
            mode
        )));
    }

    let kept = AbundanceMatrix::from_rows(kept_ids, matrix.sample_ids().to_vec(), kept_rows)?;
    Ok((kept, dropped))
}

/// Reorder rows to follow the tree tips.
///
/// Features absent from the tree are dropped. A leaf without a row in
/// `matrix` yields an all-missing row so that every drawn tip keeps its row.
pub fn reorder_by_leaves(
    matrix: &AbundanceMatrix,
    leaf_order: &LeafOrder,
) -> Result<AbundanceMatrix> {
    let index: FxHashMap<&str, usize> = matrix
        .feature_ids()
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();

    let n_samples = matrix.n_samples();
    let mut values = Vec::with_capacity(leaf_order.len() * n_samples);
    let mut matched = 0usize;
    for leaf in leaf_order.iter() {
        match index.get(leaf.as_str()) {
            Some(&r) => {
                matched += 1;
                values.extend_from_slice(matrix.row(r));
            }
            None => values.extend(std::iter::repeat(None).take(n_samples)),
        }
    }

    if matched == 0 {
        return Err(BubbleError::InvalidInput(format!(
            "none of the {} tree leaves matches a feature of the abundance table",
            leaf_order.len()
        )));
    }
    let pruned = matrix.n_features() - matched;
    if pruned > 0 {
        info!("{} features are not in the tree and were dropped", pruned);
    }
    let absent = leaf_order.len() - matched;
    if absent > 0 {
        warn!("{} tree leaves have no row in the abundance table", absent);
    }

    AbundanceMatrix::new(
        leaf_order.as_slice().to_vec(),
        matrix.sample_ids().to_vec(),
        values,
    )
}

/// A matrix whose columns are clustered by group, with the membership that
/// produced the columns.
///
/// `groups` lists only samples that ended up as columns, in column order, so
/// colors and legends derived from it always line up with the columns.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupedMatrix {
    matrix: AbundanceMatrix,
    groups: SampleGroups,
}

impl GroupedMatrix {
    #[inline]
    pub fn matrix(&self) -> &AbundanceMatrix {
        &self.matrix
    }

    #[inline]
    pub fn groups(&self) -> &SampleGroups {
        &self.groups
    }

    /// Group index of every column.
    pub fn column_groups(&self) -> Vec<usize> {
        self.groups
            .iter()
            .enumerate()
            .flat_map(|(gi, g)| std::iter::repeat(gi).take(g.members.len()))
            .collect()
    }

    pub fn into_parts(self) -> (AbundanceMatrix, SampleGroups) {
        (self.matrix, self.groups)
    }
}

/// Cluster columns by group.
///
/// Group members missing from the matrix are skipped, as are columns with
/// no value left. Groups without any remaining member are dropped. Samples
/// of the matrix that belong to no group are excluded.
pub fn group_and_reorder_columns(
    matrix: &AbundanceMatrix,
    groups: &SampleGroups,
) -> Result<GroupedMatrix> {
    let col_index: FxHashMap<&str, usize> = matrix
        .sample_ids()
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();

    let mut kept_groups = Vec::new();
    let mut columns = Vec::new();
    let mut empty_columns = 0usize;
    for group in groups.iter() {
        let mut members = Vec::new();
        for sample in &group.members {
            let Some(&col) = col_index.get(sample.as_str()) else {
                continue;
            };
            if !matrix.column_has_value(col) {
                empty_columns += 1;
                continue;
            }
            members.push(sample.clone());
            columns.push(col);
        }
        if members.is_empty() {
            debug!("Group '{}' has no sample in the abundance table", group.label);
            continue;
        }
        kept_groups.push(SampleGroup {
            label: group.label.clone(),
            members,
        });
    }

    if columns.is_empty() {
        return Err(BubbleError::InvalidInput(
            "no grouped sample matches a column of the abundance table".to_string(),
        ));
    }
    if empty_columns > 0 {
        info!("Removed {} samples without any value", empty_columns);
    }
    let ungrouped = matrix.n_samples() - columns.len() - empty_columns;
    if ungrouped > 0 {
        info!("{} samples have no group and were excluded", ungrouped);
    }

    let mut values = Vec::with_capacity(matrix.n_features() * columns.len());
    for row in matrix.rows() {
        values.extend(columns.iter().map(|&c| row[c]));
    }
    let sample_ids = columns
        .iter()
        .map(|&c| matrix.sample_ids()[c].clone())
        .collect();

    Ok(GroupedMatrix {
        matrix: AbundanceMatrix::new(matrix.feature_ids().to_vec(), sample_ids, values)?,
        groups: SampleGroups::new(kept_groups)?,
    })
}

/// Settings for [`run`].
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    pub normalization: Normalization,
    /// Display scale applied after normalization (e.g. 100 for bubble sizes).
    pub multiplier: f64,
    /// Drop rows that cannot be normalized instead of failing.
    pub skip_degenerate: bool,
    /// Added to every present value before normalization.
    pub pseudocount: Option<f64>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            normalization: Normalization::RowScale,
            multiplier: 1.0,
            skip_degenerate: false,
            pseudocount: None,
        }
    }
}

/// Normalize, order rows by the tree and cluster columns by group.
pub fn run(
    matrix: &AbundanceMatrix,
    leaf_order: &LeafOrder,
    groups: &SampleGroups,
    options: &PipelineOptions,
) -> Result<GroupedMatrix> {
    let shifted;
    let matrix = match options.pseudocount {
        Some(pc) => {
            shifted = add_pseudocount(matrix, pc)?;
            &shifted
        }
        None => matrix,
    };

    let filtered;
    let matrix = if options.skip_degenerate {
        let (kept, dropped) = drop_degenerate_rows(matrix, options.normalization)?;
        for id in &dropped {
            warn!("Skipping feature '{}': cannot be normalized", id);
        }
        filtered = kept;
        &filtered
    } else {
        matrix
    };

    let normalized = normalize(matrix, options.normalization, options.multiplier)?;
    let ordered = reorder_by_leaves(&normalized, leaf_order)?;
    let grouped = group_and_reorder_columns(&ordered, groups)?;
    info!(
        "Final matrix: {} rows x {} samples in {} groups",
        grouped.matrix().n_features(),
        grouped.matrix().n_samples(),
        grouped.groups().len()
    );
    Ok(grouped)
}
