//! Bubble charts and heatmaps of per-sample feature abundances, with rows
//! ordered by the leaves of a phylogenetic tree and columns clustered by a
//! sample category.
//!
//! The pipeline is split in two halves:
//!
//! - [`engine`] turns an [`AbundanceMatrix`] into a [`GroupedMatrix`]:
//!   per-row normalization, row order taken from the tree, columns grouped.
//! - [`render`] lays the grouped matrix out next to the tree and writes PNG
//!   or SVG.
//!
//! Loaders for the three inputs live in [`table`], [`tree`] and [`metadata`].

pub mod engine;
pub mod error;
pub mod font;
pub mod matrix;
pub mod metadata;
pub mod palette;
pub mod render;
pub mod table;
pub mod tree;

pub use engine::{GroupedMatrix, LeafOrder, Normalization, PipelineOptions};
pub use error::{BubbleError, Result};
pub use matrix::AbundanceMatrix;
pub use metadata::{GroupOrder, SampleGroup, SampleGroups};
pub use tree::Phylogeny;

pub mod prelude {
    pub use crate::engine::{
        group_and_reorder_columns, normalize, normalize_row, reorder_by_leaves, run,
        GroupedMatrix, LeafOrder, Normalization, PipelineOptions,
    };
    pub use crate::error::{BubbleError, Result};
    pub use crate::matrix::AbundanceMatrix;
    pub use crate::metadata::{read_sample_groups, GroupOrder, SampleGroups};
    pub use crate::render::{build_scene, write_scene, Display, RenderOptions};
    pub use crate::table::read_abundance_table;
    pub use crate::tree::Phylogeny;
}
