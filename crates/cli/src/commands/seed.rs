//! Seed a website and its catalog from YAML.
//!
//! # File Format
//!
//! ```yaml
//! website:
//!   id: 1
//!   name: Bazaar Demo
//! products:
//!   - name: Tea Mug
//!     price: "12.50"
//!     stock: 40
//!     image_url: https://cdn.example.com/mug.jpg
//! ```
//!
//! The website is created or renamed. Products are inserted unless the
//! website already has a product of the same name, so running the command
//! twice is harmless. Stock and prices of existing products are left alone.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use tracing::{error, info};

use bazaar_core::{Money, WebsiteId};

/// Longest accepted product name.
const MAX_NAME: usize = 255;

/// A catalog file.
#[derive(Debug, Deserialize)]
pub struct CatalogFile {
    pub website: SeedWebsite,
    #[serde(default)]
    pub products: Vec<SeedProduct>,
}

#[derive(Debug, Deserialize)]
pub struct SeedWebsite {
    pub id: WebsiteId,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct SeedProduct {
    pub name: String,
    pub price: Money,
    #[serde(default)]
    pub stock: i32,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// Counts reported after seeding.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedResult {
    pub inserted: u64,
    pub skipped: u64,
}

/// Check a catalog before touching the database.
///
/// Returns every problem found, empty if the file is usable.
#[must_use]
pub fn validate_catalog(catalog: &CatalogFile) -> Vec<String> {
    let mut errors = Vec::new();

    if !catalog.website.id.is_assigned() {
        errors.push("website.id must be a positive integer".to_string());
    }
    if catalog.website.name.trim().is_empty() {
        errors.push("website.name is required".to_string());
    }

    let mut seen = HashSet::new();
    for (index, product) in catalog.products.iter().enumerate() {
        let name = product.name.trim();
        if name.is_empty() {
            errors.push(format!("products[{index}]: name is required"));
        } else if name.len() > MAX_NAME {
            errors.push(format!(
                "products[{index}]: name must be at most {MAX_NAME} characters"
            ));
        } else if !seen.insert(name.to_lowercase()) {
            errors.push(format!("products[{index}]: duplicate name '{name}'"));
        }
        if product.stock < 0 {
            errors.push(format!("products[{index}]: stock cannot be negative"));
        }
    }

    errors
}

/// Seed a website and its products from a YAML file.
///
/// # Arguments
///
/// * `file_path` - Path to the YAML catalog
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, fails
/// validation, or a database operation fails. Nothing is written unless
/// every product is inserted.
pub async fn products(file_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(format!("File not found: {file_path}").into());
    }

    info!(path = %file_path, "Loading catalog from file");

    // Read and validate YAML before connecting to database
    let content = tokio::fs::read_to_string(path).await?;
    let catalog: CatalogFile = serde_yaml::from_str(&content)?;

    let errors = validate_catalog(&catalog);
    if !errors.is_empty() {
        error!("Catalog validation failed:");
        for err in &errors {
            error!("  - {err}");
        }
        return Err(format!("{} validation errors found", errors.len()).into());
    }

    info!(products = catalog.products.len(), "Catalog validated");

    let pool = super::connect().await?;
    let mut tx = pool.begin().await?;

    sqlx::query(
        r"
        INSERT INTO websites (id, name)
        VALUES ($1, $2)
        ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name
        ",
    )
    .bind(catalog.website.id)
    .bind(catalog.website.name.trim())
    .execute(&mut *tx)
    .await?;

    // Explicit ids bypass the sequence; move it past them.
    sqlx::query(
        "SELECT setval(pg_get_serial_sequence('websites', 'id'), (SELECT MAX(id) FROM websites))",
    )
    .execute(&mut *tx)
    .await?;

    let mut result = SeedResult::default();
    for product in &catalog.products {
        let inserted = sqlx::query(
            r"
            INSERT INTO products (website_id, name, image_url, price, stock)
            SELECT $1, $2, $3, $4, $5
            WHERE NOT EXISTS (
                SELECT 1 FROM products WHERE website_id = $1 AND lower(name) = lower($2)
            )
            ",
        )
        .bind(catalog.website.id)
        .bind(product.name.trim())
        .bind(&product.image_url)
        .bind(product.price)
        .bind(product.stock)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            result.skipped += 1;
        } else {
            result.inserted += inserted;
        }
    }

    tx.commit().await?;

    info!("Seeding complete!");
    info!("  Website: {} ({})", catalog.website.name, catalog.website.id);
    info!("  Products inserted: {}", result.inserted);
    info!("  Products skipped (already exist): {}", result.skipped);

    Ok(())
}
