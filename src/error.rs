//! Error types for bubbletree.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BubbleError {
    #[error("File does not exist: {}. Is the path correct?", .0.display())]
    MissingInputFile(PathBuf),

    #[error("Cannot normalize row '{feature}': {reason}")]
    InvalidRow { feature: String, reason: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Column '{column}' not found in {source_name}")]
    SchemaMismatch { column: String, source_name: String },

    #[error("Invalid abundance value '{value}' at row {row}, column '{column}'")]
    InvalidValue {
        value: String,
        row: usize,
        column: String,
    },

    #[error("Newick parse error at byte {position}: {message}")]
    TreeParse { position: usize, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("PDF error: {0}")]
    Pdf(String),
}

pub type Result<T> = std::result::Result<T, BubbleError>;
