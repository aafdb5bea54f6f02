//! Catalog index: immutable product records with precomputed embeddings
//!
//! The catalog is loaded once at startup from a JSON-lines file and treated
//! as read-only for the lifetime of the process. If the catalog changes the
//! index is rebuilt, never patched.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read catalog file {path}: {source}")]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed catalog record at line {line}: {source}")]
    MalformedRecord {
        line: usize,
        source: serde_json::Error,
    },

    #[error("Product {id} has no embedding vector")]
    MissingEmbedding { id: u32 },

    #[error("Embedding dimension mismatch for product {id}: expected {expected}, got {actual}")]
    DimensionMismatch {
        id: u32,
        expected: usize,
        actual: usize,
    },

    #[error("Duplicate product id {id}")]
    DuplicateId { id: u32 },

    #[error("Product not found: {id}")]
    ProductNotFound { id: u32 },
}

/// An immutable catalog record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: u32,
    pub name: String,
    pub gender: String,
    pub master_category: String,
    pub sub_category: String,
    pub article_type: String,
    pub base_colour: String,
    pub season: String,
    pub year: Option<u16>,
    pub usage: String,
    #[serde(default)]
    pub image: Option<String>,
    /// Precomputed dense embedding, same dimension across the whole catalog
    pub embedding: Vec<f32>,
}

impl Product {
    /// Flat text document describing the product, shared by the lexical
    /// scorer and the rerank provider.
    pub fn search_document(&self) -> String {
        let year_text = self
            .year
            .map(|y| y.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        format!(
            "{}. Gender: {}. Type: {}. Category: {}/{}. Color: {}. Usage: {}. Season: {}. Year: {}.",
            self.name,
            self.gender,
            self.article_type,
            self.master_category,
            self.sub_category,
            self.base_colour,
            self.usage,
            self.season,
            year_text,
        )
    }
}

/// Read-only product index with stable insertion order
#[derive(Debug)]
pub struct CatalogIndex {
    products: Vec<Product>,
    by_id: AHashMap<u32, usize>,
    embedding_dim: usize,
    article_type_counts: Vec<(String, usize)>,
    colours: Vec<String>,
}

impl CatalogIndex {
    /// Load the catalog from a JSON-lines file, one product per line.
    ///
    /// Fails if the file is unreadable, any record is malformed, any product
    /// lacks an embedding, or embedding dimensions differ across rows.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path).map_err(|e| CatalogError::Unreadable {
            path: path.to_path_buf(),
            source: e,
        })?;

        let mut products = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let product: Product = serde_json::from_str(line)
                .map_err(|e| CatalogError::MalformedRecord {
                    line: idx + 1,
                    source: e,
                })?;
            products.push(product);
        }

        Self::from_products(products)
    }

    /// Build an index from in-memory products (used by tests and callers
    /// that assemble the catalog themselves). Same validation as `load`.
    pub fn from_products(products: Vec<Product>) -> Result<Self, CatalogError> {
        let embedding_dim = products
            .first()
            .map(|p| p.embedding.len())
            .unwrap_or(0);

        let mut by_id = AHashMap::with_capacity(products.len());
        for (row, product) in products.iter().enumerate() {
            if product.embedding.is_empty() {
                return Err(CatalogError::MissingEmbedding { id: product.id });
            }
            if product.embedding.len() != embedding_dim {
                return Err(CatalogError::DimensionMismatch {
                    id: product.id,
                    expected: embedding_dim,
                    actual: product.embedding.len(),
                });
            }
            if by_id.insert(product.id, row).is_some() {
                return Err(CatalogError::DuplicateId { id: product.id });
            }
        }

        let article_type_counts = count_article_types(&products);
        let colours = distinct_colours(&products);

        tracing::debug!(
            products = products.len(),
            embedding_dim,
            article_types = article_type_counts.len(),
            "catalog index built"
        );

        Ok(Self {
            products,
            by_id,
            embedding_dim,
            article_type_counts,
            colours,
        })
    }

    pub fn get(&self, id: u32) -> Option<&Product> {
        self.by_id.get(&id).map(|&row| &self.products[row])
    }

    /// Lookup that surfaces absent ids as an error (for anchor resolution)
    pub fn product(&self, id: u32) -> Result<&Product, CatalogError> {
        self.get(id).ok_or(CatalogError::ProductNotFound { id })
    }

    /// All products in stable insertion order
    pub fn all(&self) -> &[Product] {
        &self.products
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    /// Distinct article types with catalog frequency, descending by count
    pub fn article_type_counts(&self) -> &[(String, usize)] {
        &self.article_type_counts
    }

    /// Distinct article type names, most frequent first
    pub fn article_types(&self) -> Vec<&str> {
        self.article_type_counts
            .iter()
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// How many catalog products carry the given article type
    pub fn article_type_frequency(&self, article_type: &str) -> usize {
        self.article_type_counts
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(article_type))
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }

    /// Distinct base colours, sorted
    pub fn colours(&self) -> &[String] {
        &self.colours
    }
}

fn count_article_types(products: &[Product]) -> Vec<(String, usize)> {
    let mut counts: AHashMap<String, usize> = AHashMap::new();
    for product in products {
        if product.article_type.is_empty() {
            continue;
        }
        *counts.entry(product.article_type.clone()).or_insert(0) += 1;
    }
    let mut out: Vec<(String, usize)> = counts.into_iter().collect();
    // Frequency descending, name ascending so the ordering is deterministic
    out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    out
}

fn distinct_colours(products: &[Product]) -> Vec<String> {
    let mut colours: Vec<String> = products
        .iter()
        .filter(|p| !p.base_colour.is_empty())
        .map(|p| p.base_colour.clone())
        .collect();
    colours.sort();
    colours.dedup();
    colours
}
