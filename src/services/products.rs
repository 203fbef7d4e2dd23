use crate::{
    entities::{category, product, Category, CategoryModel, Product, ProductModel},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Input for creating a catalog product.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateProductInput {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(min = 1, max = 255))]
    pub slug: String,
    pub description: String,
    pub short_description: String,
    pub base_price: Decimal,
    #[serde(default)]
    pub stock_quantity: i32,
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub has_color_finish: bool,
    #[serde(default)]
    pub has_engraving: bool,
    #[serde(default)]
    pub has_barrel_length: bool,
    #[serde(default)]
    pub has_barrel_material: bool,
    pub images: Option<serde_json::Value>,
}

/// Partial update for a catalog product. Absent fields are untouched.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateProductInput {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub short_description: Option<String>,
    pub base_price: Option<Decimal>,
    pub stock_quantity: Option<i32>,
    pub category_id: Option<Option<Uuid>>,
    pub is_active: Option<bool>,
    pub has_color_finish: Option<bool>,
    pub has_engraving: Option<bool>,
    pub has_barrel_length: Option<bool>,
    pub has_barrel_material: Option<bool>,
    pub images: Option<serde_json::Value>,
}

/// Catalog listing filters. All optional and combinable.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductFilters {
    pub category_id: Option<Uuid>,
    pub search: Option<String>,
    pub is_active: Option<bool>,
    pub has_color_finish: Option<bool>,
    pub has_engraving: Option<bool>,
    pub has_barrel_length: Option<bool>,
    pub has_barrel_material: Option<bool>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

/// One page of catalog results.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProductPage {
    pub products: Vec<ProductModel>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

const DEFAULT_PER_PAGE: u64 = 20;
const MAX_PER_PAGE: u64 = 100;

/// Catalog service: the read contract carts and checkout price
/// against, plus the admin back-office product CRUD.
#[derive(Clone)]
pub struct ProductCatalogService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl ProductCatalogService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self))]
    pub async fn get_product_by_id(&self, id: Uuid) -> Result<ProductModel, ServiceError> {
        Product::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))
    }

    #[instrument(skip(self))]
    pub async fn get_product_by_slug(&self, slug: &str) -> Result<ProductModel, ServiceError> {
        Product::find()
            .filter(product::Column::Slug.eq(slug))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))
    }

    /// Lists products matching the filters, newest first, paginated.
    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        filters: ProductFilters,
    ) -> Result<ProductPage, ServiceError> {
        let mut query = Product::find();

        if let Some(category_id) = filters.category_id {
            query = query.filter(product::Column::CategoryId.eq(category_id));
        }
        if let Some(is_active) = filters.is_active {
            query = query.filter(product::Column::IsActive.eq(is_active));
        }
        if let Some(flag) = filters.has_color_finish {
            query = query.filter(product::Column::HasColorFinish.eq(flag));
        }
        if let Some(flag) = filters.has_engraving {
            query = query.filter(product::Column::HasEngraving.eq(flag));
        }
        if let Some(flag) = filters.has_barrel_length {
            query = query.filter(product::Column::HasBarrelLength.eq(flag));
        }
        if let Some(flag) = filters.has_barrel_material {
            query = query.filter(product::Column::HasBarrelMaterial.eq(flag));
        }
        if let Some(min_price) = filters.min_price {
            query = query.filter(product::Column::BasePrice.gte(min_price));
        }
        if let Some(max_price) = filters.max_price {
            query = query.filter(product::Column::BasePrice.lte(max_price));
        }
        if let Some(search) = filters.search.as_deref().map(str::trim) {
            if !search.is_empty() {
                query = query.filter(
                    Condition::any()
                        .add(product::Column::Name.contains(search))
                        .add(product::Column::Slug.contains(search))
                        .add(product::Column::Description.contains(search)),
                );
            }
        }

        let page = filters.page.unwrap_or(1).max(1);
        let per_page = filters
            .per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE);

        let paginator = query
            .order_by_desc(product::Column::CreatedAt)
            .paginate(&*self.db, per_page);
        let total = paginator.num_items().await?;
        let products = paginator.fetch_page(page - 1).await?;

        Ok(ProductPage {
            products,
            total,
            page,
            per_page,
        })
    }

    async fn slug_taken(&self, slug: &str, exclude: Option<Uuid>) -> Result<bool, ServiceError> {
        let mut query = Product::find().filter(product::Column::Slug.eq(slug));
        if let Some(id) = exclude {
            query = query.filter(product::Column::Id.ne(id));
        }
        Ok(query.count(&*self.db).await? > 0)
    }

    /// Creates a product. The slug must be unique; a conflict either at
    /// the pre-check or at the storage layer comes back as 409.
    #[instrument(skip(self, input), fields(slug = %input.slug))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
    ) -> Result<ProductModel, ServiceError> {
        input.validate()?;

        if input.base_price < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Base price cannot be negative".to_string(),
            ));
        }
        if self.slug_taken(&input.slug, None).await? {
            return Err(ServiceError::Conflict(
                "Product slug already exists".to_string(),
            ));
        }

        let now = Utc::now();
        let new_product = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            category_id: Set(input.category_id),
            name: Set(input.name),
            slug: Set(input.slug),
            description: Set(input.description),
            short_description: Set(input.short_description),
            base_price: Set(input.base_price.round_dp(2)),
            stock_quantity: Set(input.stock_quantity),
            is_active: Set(true),
            has_color_finish: Set(input.has_color_finish),
            has_engraving: Set(input.has_engraving),
            has_barrel_length: Set(input.has_barrel_length),
            has_barrel_material: Set(input.has_barrel_material),
            images: Set(input.images),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = new_product
            .insert(&*self.db)
            .await
            .map_err(|e| ServiceError::from_db_conflict(e, "Product slug already exists"))?;

        self.event_sender
            .send_or_log(Event::ProductCreated(created.id))
            .await;

        Ok(created)
    }

    /// Applies a partial update. A slug change re-checks uniqueness
    /// against every other product.
    #[instrument(skip(self, input))]
    pub async fn update_product(
        &self,
        id: Uuid,
        input: UpdateProductInput,
    ) -> Result<ProductModel, ServiceError> {
        let existing = self.get_product_by_id(id).await?;

        if let Some(slug) = input.slug.as_deref() {
            if slug != existing.slug && self.slug_taken(slug, Some(id)).await? {
                return Err(ServiceError::Conflict(
                    "Product slug already exists".to_string(),
                ));
            }
        }
        if let Some(price) = input.base_price {
            if price < Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "Base price cannot be negative".to_string(),
                ));
            }
        }

        let mut active: product::ActiveModel = existing.into();
        if let Some(name) = input.name {
            active.name = Set(name);
        }
        if let Some(slug) = input.slug {
            active.slug = Set(slug);
        }
        if let Some(description) = input.description {
            active.description = Set(description);
        }
        if let Some(short_description) = input.short_description {
            active.short_description = Set(short_description);
        }
        if let Some(base_price) = input.base_price {
            active.base_price = Set(base_price.round_dp(2));
        }
        if let Some(stock_quantity) = input.stock_quantity {
            active.stock_quantity = Set(stock_quantity);
        }
        if let Some(category_id) = input.category_id {
            active.category_id = Set(category_id);
        }
        if let Some(is_active) = input.is_active {
            active.is_active = Set(is_active);
        }
        if let Some(flag) = input.has_color_finish {
            active.has_color_finish = Set(flag);
        }
        if let Some(flag) = input.has_engraving {
            active.has_engraving = Set(flag);
        }
        if let Some(flag) = input.has_barrel_length {
            active.has_barrel_length = Set(flag);
        }
        if let Some(flag) = input.has_barrel_material {
            active.has_barrel_material = Set(flag);
        }
        if let Some(images) = input.images {
            active.images = Set(Some(images));
        }
        active.updated_at = Set(Utc::now());

        let updated = active
            .update(&*self.db)
            .await
            .map_err(|e| ServiceError::from_db_conflict(e, "Product slug already exists"))?;

        self.event_sender
            .send_or_log(Event::ProductUpdated(updated.id))
            .await;

        Ok(updated)
    }

    /// Deactivates a product rather than deleting it. Cart lines keep
    /// resolving and historical orders keep their snapshots; the
    /// product just stops being sellable.
    #[instrument(skip(self))]
    pub async fn deactivate_product(&self, id: Uuid) -> Result<ProductModel, ServiceError> {
        let existing = self.get_product_by_id(id).await?;

        let mut active: product::ActiveModel = existing.into();
        active.is_active = Set(false);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::ProductDeactivated(updated.id))
            .await;

        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn list_categories(&self) -> Result<Vec<CategoryModel>, ServiceError> {
        Ok(Category::find()
            .order_by_asc(category::Column::Name)
            .all(&*self.db)
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn create_category(
        &self,
        name: String,
        slug: String,
        description: Option<String>,
    ) -> Result<CategoryModel, ServiceError> {
        if name.trim().is_empty() || slug.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Category name and slug are required".to_string(),
            ));
        }

        let now = Utc::now();
        let new_category = category::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name),
            slug: Set(slug),
            description: Set(description),
            created_at: Set(now),
            updated_at: Set(now),
        };

        new_category
            .insert(&*self.db)
            .await
            .map_err(|e| ServiceError::from_db_conflict(e, "Category slug already exists"))
    }
}
