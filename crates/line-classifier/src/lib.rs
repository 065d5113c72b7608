//! Hierarchical classification of free-text line items.
//!
//! A [`category::CategoryTree`] is walked from the top down by
//! [`traversal::classify_path`], which asks a [`classifier::Classifier`] to pick one child
//! per level until a leaf is reached.

pub mod category;
pub mod classifier;
pub mod config;
pub mod documents;
pub mod error;
pub mod index;
pub mod llm;
pub mod loader;
pub mod render;
pub mod sample;
pub mod traversal;
pub mod vector;
