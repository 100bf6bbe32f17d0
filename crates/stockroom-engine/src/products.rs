//! # Product Service
//!
//! Create, edit and remove priced products.
//!
//! ## Product Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  POST /products ──► create() ──► compute_pricing ──► tx: insert + log  │
//! │                                                                         │
//! │  PUT /products/:id ──► update() ──┐                                     │
//! │                                   ▼                                     │
//! │                  ┌─────────────────────────────────┐                    │
//! │                  │ transaction                      │                    │
//! │                  │  read product (NotFound)         │                    │
//! │                  │  apply patch, reprice if needed  │                    │
//! │                  │  write product + log entry       │                    │
//! │                  └─────────────────────────────────┘                    │
//! │                                                                         │
//! │  mark-paid (StockLedger) ──► stock_quantity -= qty                     │
//! │                                                                         │
//! │  DELETE /products/:id ──► delete() ──► tx: removed for good + log      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Products are not recycled. An edit runs in a transaction so it cannot
//! overwrite a stock decrement committed by a concurrent mark-paid.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::activity::Activity;
use crate::error::{EngineError, EngineResult};
use stockroom_core::pricing::{compute_pricing, reprice};
use stockroom_core::validation::{
    normalize_optional, sorting_code, validate_id, validate_segment, validate_stock,
    MAX_CUSTOMER_FIELD_LEN, MAX_SEGMENT_LEN,
};
use stockroom_core::{
    ActivityAction, CoreError, EntityType, Money, Product, ProductInput, ProductPatch, Rate,
};
use stockroom_db::{
    run_transaction, Collection, DbError, DocumentStore, ProductRepository, Transaction,
    TransactionWork,
};

#[derive(Clone)]
pub struct ProductService {
    store: Arc<dyn DocumentStore>,
    products: ProductRepository,
}

impl ProductService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        ProductService {
            products: ProductRepository::new(store.clone()),
            store,
        }
    }

    /// Products ordered by sorting code.
    pub async fn list(&self) -> EngineResult<Vec<Product>> {
        Ok(self.products.list().await?)
    }

    pub async fn get(&self, id: &str) -> EngineResult<Product> {
        validate_id("id", id)?;
        self.products
            .get(id)
            .await?
            .ok_or_else(|| CoreError::not_found("Product", id).into())
    }

    /// Creates a product.
    ///
    /// ## Errors
    /// - `Required` / `TooLong` for a blank or oversized brand or name
    /// - `MarkupRequired` when neither markup field is given
    /// - `MustBePositive` / `OutOfRange` for negative cost or stock
    pub async fn create(&self, input: ProductInput) -> EngineResult<Product> {
        let brand = validate_segment("brand", &input.brand)?;
        let name = validate_segment("name", &input.name)?;
        let volume = normalize_optional("volume", input.volume.as_deref(), MAX_SEGMENT_LEN)?;
        let description = normalize_optional(
            "description",
            input.description.as_deref(),
            MAX_CUSTOMER_FIELD_LEN,
        )?;
        validate_stock(input.stock_quantity)?;

        let pricing = compute_pricing(
            Money::from_cents(input.cost_cents),
            input.markup_bps.map(Rate::from_bps),
            input.markup_amount_cents.map(Money::from_cents),
        )?;

        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4().to_string(),
            sorting_code: sorting_code(&brand, &name, volume.as_deref()),
            brand,
            name,
            volume,
            description,
            stock_quantity: input.stock_quantity,
            pricing,
            created_at: now,
            updated_at: now,
        };

        let product = run_transaction(self.store.as_ref(), &InsertProduct { product }).await?;
        info!(
            id = %product.id,
            sorting_code = %product.sorting_code,
            sales_price = %product.sales_price(),
            "Product created"
        );
        Ok(product)
    }

    /// Applies a partial update.
    ///
    /// Pricing is recomputed whenever the cost or a markup field changes; a
    /// patch that names neither markup field keeps the current markup mode.
    pub async fn update(&self, id: &str, patch: ProductPatch) -> EngineResult<Product> {
        validate_id("id", id)?;
        let work = PatchProduct {
            id: id.to_string(),
            patch,
        };
        let product = run_transaction(self.store.as_ref(), &work).await?;
        debug!(id, sales_price = %product.sales_price(), "Product updated");
        Ok(product)
    }

    /// Removes a product for good. Existing orders keep their snapshots.
    pub async fn delete(&self, id: &str) -> EngineResult<Product> {
        validate_id("id", id)?;
        let work = RemoveProduct { id: id.to_string() };
        let product = run_transaction(self.store.as_ref(), &work).await?;
        info!(id, "Product deleted");
        Ok(product)
    }
}

// =============================================================================
// Transactions
// =============================================================================

struct InsertProduct {
    product: Product,
}

#[async_trait]
impl TransactionWork for InsertProduct {
    type Output = Product;
    type Error = EngineError;

    async fn run(&self, tx: &mut dyn Transaction) -> EngineResult<Product> {
        let product = &self.product;
        if tx.read(Collection::Products, &product.id).await?.is_some() {
            return Err(DbError::duplicate("products.id", product.id.as_str()).into());
        }

        tx.write_as(Collection::Products, &product.id, product)?;
        Activity::new(ActivityAction::Create, EntityType::Product)
            .entity(&product.id)
            .describe(format!("Created product {}", product.display_name()))
            .data(serde_json::to_value(product)?)
            .write_in(tx, product.created_at)?;

        Ok(product.clone())
    }
}

struct RemoveProduct {
    id: String,
}

#[async_trait]
impl TransactionWork for RemoveProduct {
    type Output = Product;
    type Error = EngineError;

    async fn run(&self, tx: &mut dyn Transaction) -> EngineResult<Product> {
        let product: Product = tx
            .read_as(Collection::Products, &self.id)
            .await?
            .ok_or_else(|| CoreError::not_found("Product", &self.id))?;

        tx.delete(Collection::Products, &product.id);
        Activity::new(ActivityAction::Delete, EntityType::Product)
            .entity(&product.id)
            .describe(format!("Deleted product {}", product.display_name()))
            .data(serde_json::to_value(&product)?)
            .write_in(tx, Utc::now())?;

        Ok(product)
    }
}

struct PatchProduct {
    id: String,
    patch: ProductPatch,
}

#[async_trait]
impl TransactionWork for PatchProduct {
    type Output = Product;
    type Error = EngineError;

    async fn run(&self, tx: &mut dyn Transaction) -> EngineResult<Product> {
        let mut product: Product = tx
            .read_as(Collection::Products, &self.id)
            .await?
            .ok_or_else(|| CoreError::not_found("Product", &self.id))?;
        let before = product.pricing;
        let patch = &self.patch;

        if let Some(brand) = &patch.brand {
            product.brand = validate_segment("brand", brand)?;
        }
        if let Some(name) = &patch.name {
            product.name = validate_segment("name", name)?;
        }
        if let Some(volume) = &patch.volume {
            product.volume = normalize_optional("volume", Some(volume.as_str()), MAX_SEGMENT_LEN)?;
        }
        if let Some(description) = &patch.description {
            product.description =
                normalize_optional("description", Some(description.as_str()), MAX_CUSTOMER_FIELD_LEN)?;
        }
        if let Some(stock) = patch.stock_quantity {
            validate_stock(stock)?;
            product.stock_quantity = stock;
        }
        if patch.touches_pricing() {
            product.pricing = reprice(
                &before,
                patch.cost_cents.map(Money::from_cents),
                patch.markup_bps.map(Rate::from_bps),
                patch.markup_amount_cents.map(Money::from_cents),
            )?;
        }

        product.sorting_code = sorting_code(&product.brand, &product.name, product.volume.as_deref());
        let now = Utc::now();
        product.updated_at = now;

        tx.write_as(Collection::Products, &product.id, &product)?;
        Activity::new(ActivityAction::Update, EntityType::Product)
            .entity(&product.id)
            .describe(format!("Updated product {}", product.display_name()))
            .data(json!({ "before": before, "after": product.pricing, "patch": patch }))
            .write_in(tx, now)?;

        Ok(product)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
