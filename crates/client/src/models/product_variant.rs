//! Size/color variants of a product, each with its own stock.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use dropshop_core::{ProductId, ProductVariantId};

use super::{OrderItem, OrderItemWhereInput, Product, ProductWhereInput, to_many, to_one};
use crate::delegate::Delegate;
use crate::error::ClientError;
use crate::filter::{
    Condition, ConditionSet, Filter, ListRelationFilter, Relation, RelationFilter, StringFilter,
    UniqueWhere, WhereInput,
};
use crate::model::{
    Assignment, Assignments, CreateInput, FindManyArgs, Model, NestedCreate, NumericUpdate, Row,
    ScalarField, UpdateInput,
};
use crate::value::{FieldKind, IntoValue, Value};

const PRODUCT: Relation = to_one("products", "product_id");
const ORDER_ITEMS: Relation = to_many("order_items", "variant_id");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct ProductVariant {
    pub id: ProductVariantId,
    pub product_id: ProductId,
    pub size: String,
    pub color: String,
    pub sku: String,
    pub stock: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProductVariantField {
    Id,
    ProductId,
    Size,
    Color,
    Sku,
    Stock,
    CreatedAt,
    UpdatedAt,
}

impl ScalarField for ProductVariantField {
    const ALL: &'static [Self] = &[
        Self::Id,
        Self::ProductId,
        Self::Size,
        Self::Color,
        Self::Sku,
        Self::Stock,
        Self::CreatedAt,
        Self::UpdatedAt,
    ];

    fn column(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::ProductId => "product_id",
            Self::Size => "size",
            Self::Color => "color",
            Self::Sku => "sku",
            Self::Stock => "stock",
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
        }
    }

    fn kind(self) -> FieldKind {
        match self {
            Self::Id | Self::ProductId | Self::Stock => FieldKind::Int,
            Self::Size | Self::Color | Self::Sku => FieldKind::Text,
            Self::CreatedAt | Self::UpdatedAt => FieldKind::Timestamp,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductVariantWhereInput {
    pub and: Vec<ProductVariantWhereInput>,
    pub or: Option<Vec<ProductVariantWhereInput>>,
    pub not: Vec<ProductVariantWhereInput>,
    pub id: Option<Filter<ProductVariantId>>,
    pub product_id: Option<Filter<ProductId>>,
    pub size: Option<StringFilter>,
    pub color: Option<StringFilter>,
    pub sku: Option<StringFilter>,
    pub stock: Option<Filter<i32>>,
    pub created_at: Option<Filter<DateTime<Utc>>>,
    pub updated_at: Option<Filter<DateTime<Utc>>>,
    pub product: Option<RelationFilter<ProductWhereInput>>,
    pub order_items: Option<ListRelationFilter<OrderItemWhereInput>>,
}

impl WhereInput for ProductVariantWhereInput {
    fn into_condition(self) -> Condition {
        let mut set = ConditionSet::default();
        set.field("id", self.id);
        set.field("product_id", self.product_id);
        set.field("size", self.size);
        set.field("color", self.color);
        set.field("sku", self.sku);
        set.field("stock", self.stock);
        set.field("created_at", self.created_at);
        set.field("updated_at", self.updated_at);
        if let Some(product) = self.product {
            set.push(product.into_condition(PRODUCT));
        }
        if let Some(order_items) = self.order_items {
            set.push(order_items.into_condition(ORDER_ITEMS));
        }
        set.combinators(self.and, self.or, self.not);
        set.build()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductVariantWhereUniqueInput {
    Id(ProductVariantId),
    Sku(String),
}

impl UniqueWhere for ProductVariantWhereUniqueInput {
    fn into_condition(self) -> Condition {
        match self {
            Self::Id(id) => Condition::eq("id", id),
            Self::Sku(sku) => Condition::eq("sku", sku),
        }
    }
}

fn check_stock(stock: Option<i32>) -> Result<(), ClientError> {
    match stock {
        Some(stock) if stock < 0 => Err(ClientError::Validation(format!(
            "variant stock cannot be negative (got {stock})"
        ))),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductVariantCreateInput {
    pub product_id: ProductId,
    pub size: String,
    pub color: String,
    pub sku: String,
    pub stock: Option<i32>,
}

impl CreateInput for ProductVariantCreateInput {
    fn into_row(self) -> Result<(Row, Vec<NestedCreate>), ClientError> {
        let mut row = ProductVariantCreateWithoutProductInput {
            size: self.size,
            color: self.color,
            sku: self.sku,
            stock: self.stock,
        }
        .into_row()?;
        row.set("product_id", self.product_id);
        Ok((row, Vec::new()))
    }
}

/// A variant created inside [`ProductCreateInput`](super::ProductCreateInput).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductVariantCreateWithoutProductInput {
    pub size: String,
    pub color: String,
    pub sku: String,
    pub stock: Option<i32>,
}

impl ProductVariantCreateWithoutProductInput {
    #[must_use]
    pub fn new(size: impl Into<String>, color: impl Into<String>, sku: impl Into<String>) -> Self {
        Self {
            size: size.into(),
            color: color.into(),
            sku: sku.into(),
            stock: None,
        }
    }

    #[must_use]
    pub const fn with_stock(mut self, stock: i32) -> Self {
        self.stock = Some(stock);
        self
    }

    /// Attach the owning product.
    #[must_use]
    pub fn for_product(self, product_id: ProductId) -> ProductVariantCreateInput {
        ProductVariantCreateInput {
            product_id,
            size: self.size,
            color: self.color,
            sku: self.sku,
            stock: self.stock,
        }
    }

    pub(crate) fn into_row(self) -> Result<Row, ClientError> {
        check_stock(self.stock)?;
        let mut row = Row::default();
        row.set("size", self.size);
        row.set("color", self.color);
        row.set("sku", self.sku);
        row.set_opt("stock", self.stock);
        Ok(row)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductVariantUpdateInput {
    pub product_id: Option<ProductId>,
    pub size: Option<String>,
    pub color: Option<String>,
    pub sku: Option<String>,
    pub stock: Option<NumericUpdate<i32>>,
}

impl UpdateInput for ProductVariantUpdateInput {
    fn into_assignments(self) -> Result<Vec<Assignment>, ClientError> {
        if let Some(NumericUpdate::Set(stock)) = self.stock {
            check_stock(Some(stock))?;
        }
        let mut set = Assignments::default();
        set.set("product_id", self.product_id);
        set.set("size", self.size);
        set.set("color", self.color);
        set.set("sku", self.sku);
        set.numeric("stock", self.stock);
        Ok(set.finish())
    }
}

impl Model for ProductVariant {
    const NAME: &'static str = "ProductVariant";
    const TABLE: &'static str = "product_variants";

    type Field = ProductVariantField;
    type Where = ProductVariantWhereInput;
    type Unique = ProductVariantWhereUniqueInput;
    type Create = ProductVariantCreateInput;
    type Update = ProductVariantUpdateInput;

    fn id(&self) -> i32 {
        self.id.as_i32()
    }

    fn value(&self, field: ProductVariantField) -> Value {
        match field {
            ProductVariantField::Id => self.id.into_value(),
            ProductVariantField::ProductId => self.product_id.into_value(),
            ProductVariantField::Size => self.size.clone().into_value(),
            ProductVariantField::Color => self.color.clone().into_value(),
            ProductVariantField::Sku => self.sku.clone().into_value(),
            ProductVariantField::Stock => self.stock.into_value(),
            ProductVariantField::CreatedAt => self.created_at.into_value(),
            ProductVariantField::UpdatedAt => self.updated_at.into_value(),
        }
    }
}

// =============================================================================
// Relations
// =============================================================================

#[derive(Default)]
pub struct ProductVariantInclude {
    pub product: bool,
    pub order_items: Option<FindManyArgs<OrderItem>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductVariantWithRelations {
    #[serde(flatten)]
    pub variant: ProductVariant,
    pub product: Option<Product>,
    pub order_items: Option<Vec<OrderItem>>,
}

impl Delegate<'_, ProductVariant> {
    /// `find_many` plus relations.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` for invalid arguments.
    pub async fn find_many_including(
        &mut self,
        args: FindManyArgs<ProductVariant>,
        include: ProductVariantInclude,
    ) -> Result<Vec<ProductVariantWithRelations>, ClientError> {
        let variants = self.find_many(args).await?;
        self.attach_relations(variants, include).await
    }

    /// `find_unique` plus relations.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Database` if a query fails.
    pub async fn find_unique_including(
        &mut self,
        unique: ProductVariantWhereUniqueInput,
        include: ProductVariantInclude,
    ) -> Result<Option<ProductVariantWithRelations>, ClientError> {
        let Some(variant) = self.find_unique(unique).await? else {
            return Ok(None);
        };
        Ok(self.attach_relations(vec![variant], include).await?.pop())
    }

    async fn attach_relations(
        &mut self,
        variants: Vec<ProductVariant>,
        include: ProductVariantInclude,
    ) -> Result<Vec<ProductVariantWithRelations>, ClientError> {
        let products = if include.product {
            Some(
                self.reborrow::<Product>()
                    .load_by_ids(variants.iter().map(|v| v.product_id.as_i32()))
                    .await?,
            )
        } else {
            None
        };
        let ids: Vec<i32> = variants.iter().map(Model::id).collect();
        let mut order_items = match include.order_items {
            Some(args) => Some(
                self.reborrow::<OrderItem>()
                    .load_children("variant_id", &ids, args, |i| {
                        i.variant_id.map(|id| id.as_i32())
                    })
                    .await?,
            ),
            None => None,
        };
        Ok(variants
            .into_iter()
            .map(|variant| {
                let id = variant.id.as_i32();
                ProductVariantWithRelations {
                    product: products
                        .as_ref()
                        .and_then(|m| m.get(&variant.product_id.as_i32()).cloned()),
                    order_items: order_items
                        .as_mut()
                        .map(|m| m.remove(&id).unwrap_or_default()),
                    variant,
                }
            })
            .collect())
    }
}
