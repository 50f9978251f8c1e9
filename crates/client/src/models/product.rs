//! Catalog products.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;

use dropshop_core::{DropId, ProductId};

use super::{
    DropWhereInput, OrderItem, OrderItemWhereInput, ProductDrop, ProductVariant,
    ProductVariantCreateWithoutProductInput, ProductVariantWhereInput, to_many, to_one,
};
use crate::delegate::Delegate;
use crate::error::ClientError;
use crate::filter::{
    Condition, ConditionSet, Filter, ListRelationFilter, Relation, RelationFilter, StringFilter,
    StringListFilter, UniqueWhere, WhereInput,
};
use crate::model::{
    Assignment, Assignments, CreateInput, FindManyArgs, ListUpdate, Model, NestedCreate,
    NumericUpdate, Row, ScalarField, UpdateInput,
};
use crate::value::{FieldKind, IntoValue, Value};

const DROP: Relation = to_one("drops", "drop_id");
const VARIANTS: Relation = to_many("product_variants", "product_id");
const ORDER_ITEMS: Relation = to_many("order_items", "product_id");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub images: Vec<String>,
    pub slug: String,
    pub category: String,
    pub in_stock: bool,
    pub drop_id: Option<DropId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProductField {
    Id,
    Name,
    Description,
    Price,
    Images,
    Slug,
    Category,
    InStock,
    DropId,
    CreatedAt,
    UpdatedAt,
}

impl ScalarField for ProductField {
    const ALL: &'static [Self] = &[
        Self::Id,
        Self::Name,
        Self::Description,
        Self::Price,
        Self::Images,
        Self::Slug,
        Self::Category,
        Self::InStock,
        Self::DropId,
        Self::CreatedAt,
        Self::UpdatedAt,
    ];

    fn column(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::Description => "description",
            Self::Price => "price",
            Self::Images => "images",
            Self::Slug => "slug",
            Self::Category => "category",
            Self::InStock => "in_stock",
            Self::DropId => "drop_id",
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
        }
    }

    fn kind(self) -> FieldKind {
        match self {
            Self::Id | Self::DropId => FieldKind::Int,
            Self::Name | Self::Description | Self::Slug | Self::Category => FieldKind::Text,
            Self::Price => FieldKind::Decimal,
            Self::Images => FieldKind::TextArray,
            Self::InStock => FieldKind::Bool,
            Self::CreatedAt | Self::UpdatedAt => FieldKind::Timestamp,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductWhereInput {
    pub and: Vec<ProductWhereInput>,
    pub or: Option<Vec<ProductWhereInput>>,
    pub not: Vec<ProductWhereInput>,
    pub id: Option<Filter<ProductId>>,
    pub name: Option<StringFilter>,
    pub description: Option<StringFilter>,
    pub price: Option<Filter<Decimal>>,
    pub images: Option<StringListFilter>,
    pub slug: Option<StringFilter>,
    pub category: Option<StringFilter>,
    pub in_stock: Option<Filter<bool>>,
    pub drop_id: Option<Filter<DropId>>,
    pub created_at: Option<Filter<DateTime<Utc>>>,
    pub updated_at: Option<Filter<DateTime<Utc>>>,
    pub drop: Option<RelationFilter<DropWhereInput>>,
    pub variants: Option<ListRelationFilter<ProductVariantWhereInput>>,
    pub order_items: Option<ListRelationFilter<OrderItemWhereInput>>,
}

impl WhereInput for ProductWhereInput {
    fn into_condition(self) -> Condition {
        let mut set = ConditionSet::default();
        set.field("id", self.id);
        set.field("name", self.name);
        set.field("description", self.description);
        set.field("price", self.price);
        set.field("images", self.images);
        set.field("slug", self.slug);
        set.field("category", self.category);
        set.field("in_stock", self.in_stock);
        set.field("drop_id", self.drop_id);
        set.field("created_at", self.created_at);
        set.field("updated_at", self.updated_at);
        if let Some(drop) = self.drop {
            set.push(drop.into_condition(DROP));
        }
        if let Some(variants) = self.variants {
            set.push(variants.into_condition(VARIANTS));
        }
        if let Some(order_items) = self.order_items {
            set.push(order_items.into_condition(ORDER_ITEMS));
        }
        set.combinators(self.and, self.or, self.not);
        set.build()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductWhereUniqueInput {
    Id(ProductId),
    Slug(String),
}

impl UniqueWhere for ProductWhereUniqueInput {
    fn into_condition(self) -> Condition {
        match self {
            Self::Id(id) => Condition::eq("id", id),
            Self::Slug(slug) => Condition::eq("slug", slug),
        }
    }
}

fn check_price(price: Decimal) -> Result<(), ClientError> {
    if price.is_sign_negative() && !price.is_zero() {
        return Err(ClientError::Validation(format!(
            "product price cannot be negative (got {price})"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductCreateInput {
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub images: Vec<String>,
    pub slug: String,
    pub category: String,
    pub in_stock: Option<bool>,
    pub drop_id: Option<DropId>,
    /// Variants created together with the product.
    pub variants: Vec<ProductVariantCreateWithoutProductInput>,
}

impl ProductCreateInput {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        slug: impl Into<String>,
        category: impl Into<String>,
        price: Decimal,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            price,
            images: Vec::new(),
            slug: slug.into(),
            category: category.into(),
            in_stock: None,
            drop_id: None,
            variants: Vec::new(),
        }
    }
}

impl CreateInput for ProductCreateInput {
    fn into_row(self) -> Result<(Row, Vec<NestedCreate>), ClientError> {
        check_price(self.price)?;
        let mut row = Row::default();
        row.set("name", self.name);
        row.set("description", self.description);
        row.set("price", self.price);
        row.set("images", self.images);
        row.set("slug", self.slug);
        row.set("category", self.category);
        row.set_opt("in_stock", self.in_stock);
        row.set_opt("drop_id", self.drop_id);
        let variants = NestedCreate {
            model: ProductVariant::NAME,
            table: ProductVariant::TABLE,
            foreign_key: "product_id",
            rows: self
                .variants
                .into_iter()
                .map(ProductVariantCreateWithoutProductInput::into_row)
                .collect::<Result<_, _>>()?,
        };
        Ok((row, vec![variants]))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductUpdateInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<NumericUpdate<Decimal>>,
    pub images: Option<ListUpdate>,
    pub slug: Option<String>,
    pub category: Option<String>,
    pub in_stock: Option<bool>,
    /// `Some(None)` detaches the product from its drop.
    pub drop_id: Option<Option<DropId>>,
}

impl UpdateInput for ProductUpdateInput {
    fn into_assignments(self) -> Result<Vec<Assignment>, ClientError> {
        if let Some(NumericUpdate::Set(price)) = self.price {
            check_price(price)?;
        }
        let mut set = Assignments::default();
        set.set("name", self.name);
        set.set("description", self.description);
        set.numeric("price", self.price);
        set.list("images", self.images);
        set.set("slug", self.slug);
        set.set("category", self.category);
        set.set("in_stock", self.in_stock);
        set.set_nullable("drop_id", self.drop_id);
        Ok(set.finish())
    }
}

impl Model for Product {
    const NAME: &'static str = "Product";
    const TABLE: &'static str = "products";

    type Field = ProductField;
    type Where = ProductWhereInput;
    type Unique = ProductWhereUniqueInput;
    type Create = ProductCreateInput;
    type Update = ProductUpdateInput;

    fn id(&self) -> i32 {
        self.id.as_i32()
    }

    fn value(&self, field: ProductField) -> Value {
        match field {
            ProductField::Id => self.id.into_value(),
            ProductField::Name => self.name.clone().into_value(),
            ProductField::Description => self.description.clone().into_value(),
            ProductField::Price => self.price.into_value(),
            ProductField::Images => self.images.clone().into_value(),
            ProductField::Slug => self.slug.clone().into_value(),
            ProductField::Category => self.category.clone().into_value(),
            ProductField::InStock => self.in_stock.into_value(),
            ProductField::DropId => self.drop_id.into_value(),
            ProductField::CreatedAt => self.created_at.into_value(),
            ProductField::UpdatedAt => self.updated_at.into_value(),
        }
    }
}

// =============================================================================
// Relations
// =============================================================================

#[derive(Default)]
pub struct ProductInclude {
    pub drop: bool,
    pub variants: Option<FindManyArgs<ProductVariant>>,
    pub order_items: Option<FindManyArgs<OrderItem>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductWithRelations {
    #[serde(flatten)]
    pub product: Product,
    pub drop: Option<ProductDrop>,
    pub variants: Option<Vec<ProductVariant>>,
    pub order_items: Option<Vec<OrderItem>>,
}

impl Delegate<'_, Product> {
    /// `find_many` plus relations, loaded with one query per relation.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` for invalid arguments.
    pub async fn find_many_including(
        &mut self,
        args: FindManyArgs<Product>,
        include: ProductInclude,
    ) -> Result<Vec<ProductWithRelations>, ClientError> {
        let products = self.find_many(args).await?;
        self.attach_relations(products, include).await
    }

    /// `find_unique` plus relations.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Database` if a query fails.
    pub async fn find_unique_including(
        &mut self,
        unique: ProductWhereUniqueInput,
        include: ProductInclude,
    ) -> Result<Option<ProductWithRelations>, ClientError> {
        let Some(product) = self.find_unique(unique).await? else {
            return Ok(None);
        };
        Ok(self.attach_relations(vec![product], include).await?.pop())
    }

    async fn attach_relations(
        &mut self,
        products: Vec<Product>,
        include: ProductInclude,
    ) -> Result<Vec<ProductWithRelations>, ClientError> {
        let drops = if include.drop {
            Some(
                self.reborrow::<ProductDrop>()
                    .load_by_ids(products.iter().filter_map(|p| p.drop_id.map(|id| id.as_i32())))
                    .await?,
            )
        } else {
            None
        };
        let ids: Vec<i32> = products.iter().map(Model::id).collect();
        let mut variants = match include.variants {
            Some(args) => Some(
                self.reborrow::<ProductVariant>()
                    .load_children("product_id", &ids, args, |v| Some(v.product_id.as_i32()))
                    .await?,
            ),
            None => None,
        };
        let mut order_items = match include.order_items {
            Some(args) => Some(
                self.reborrow::<OrderItem>()
                    .load_children("product_id", &ids, args, |i| Some(i.product_id.as_i32()))
                    .await?,
            ),
            None => None,
        };
        Ok(products
            .into_iter()
            .map(|product| {
                let id = product.id.as_i32();
                ProductWithRelations {
                    drop: product
                        .drop_id
                        .and_then(|d| drops.as_ref()?.get(&d.as_i32()).cloned()),
                    variants: variants.as_mut().map(|m| m.remove(&id).unwrap_or_default()),
                    order_items: order_items
                        .as_mut()
                        .map(|m| m.remove(&id).unwrap_or_default()),
                    product,
                }
            })
            .collect())
    }
}
