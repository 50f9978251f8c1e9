//! Order line items.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;

use dropshop_core::{MoneyError, OrderId, OrderItemId, ProductId, ProductVariantId, line_total};

use super::{
    Order, OrderWhereInput, Product, ProductVariant, ProductVariantWhereInput, ProductWhereInput,
    to_one,
};
use crate::delegate::Delegate;
use crate::error::ClientError;
use crate::filter::{
    Condition, ConditionSet, Filter, Relation, RelationFilter, UniqueWhere, WhereInput,
};
use crate::model::{
    Assignment, Assignments, CreateInput, FindManyArgs, Model, NestedCreate, NumericUpdate, Row,
    ScalarField, UpdateInput,
};
use crate::value::{FieldKind, IntoValue, Value};

const ORDER: Relation = to_one("orders", "order_id");
const PRODUCT: Relation = to_one("products", "product_id");
const VARIANT: Relation = to_one("product_variants", "variant_id");

/// One line of an order. `price` is the unit price at purchase time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub variant_id: Option<ProductVariantId>,
    pub quantity: i32,
    pub price: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderItem {
    /// `price * quantity`, rounded to cents.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError`] if the stored line is invalid.
    pub fn line_total(&self) -> Result<Decimal, MoneyError> {
        line_total(self.price, self.quantity)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderItemField {
    Id,
    OrderId,
    ProductId,
    VariantId,
    Quantity,
    Price,
    CreatedAt,
    UpdatedAt,
}

impl ScalarField for OrderItemField {
    const ALL: &'static [Self] = &[
        Self::Id,
        Self::OrderId,
        Self::ProductId,
        Self::VariantId,
        Self::Quantity,
        Self::Price,
        Self::CreatedAt,
        Self::UpdatedAt,
    ];

    fn column(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::OrderId => "order_id",
            Self::ProductId => "product_id",
            Self::VariantId => "variant_id",
            Self::Quantity => "quantity",
            Self::Price => "price",
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
        }
    }

    fn kind(self) -> FieldKind {
        match self {
            Self::Id | Self::OrderId | Self::ProductId | Self::VariantId | Self::Quantity => {
                FieldKind::Int
            }
            Self::Price => FieldKind::Decimal,
            Self::CreatedAt | Self::UpdatedAt => FieldKind::Timestamp,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderItemWhereInput {
    pub and: Vec<OrderItemWhereInput>,
    pub or: Option<Vec<OrderItemWhereInput>>,
    pub not: Vec<OrderItemWhereInput>,
    pub id: Option<Filter<OrderItemId>>,
    pub order_id: Option<Filter<OrderId>>,
    pub product_id: Option<Filter<ProductId>>,
    pub variant_id: Option<Filter<ProductVariantId>>,
    pub quantity: Option<Filter<i32>>,
    pub price: Option<Filter<Decimal>>,
    pub created_at: Option<Filter<DateTime<Utc>>>,
    pub updated_at: Option<Filter<DateTime<Utc>>>,
    pub order: Option<RelationFilter<OrderWhereInput>>,
    pub product: Option<RelationFilter<ProductWhereInput>>,
    pub variant: Option<RelationFilter<ProductVariantWhereInput>>,
}

impl WhereInput for OrderItemWhereInput {
    fn into_condition(self) -> Condition {
        let mut set = ConditionSet::default();
        set.field("id", self.id);
        set.field("order_id", self.order_id);
        set.field("product_id", self.product_id);
        set.field("variant_id", self.variant_id);
        set.field("quantity", self.quantity);
        set.field("price", self.price);
        set.field("created_at", self.created_at);
        set.field("updated_at", self.updated_at);
        if let Some(order) = self.order {
            set.push(order.into_condition(ORDER));
        }
        if let Some(product) = self.product {
            set.push(product.into_condition(PRODUCT));
        }
        if let Some(variant) = self.variant {
            set.push(variant.into_condition(VARIANT));
        }
        set.combinators(self.and, self.or, self.not);
        set.build()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderItemWhereUniqueInput {
    Id(OrderItemId),
}

impl UniqueWhere for OrderItemWhereUniqueInput {
    fn into_condition(self) -> Condition {
        match self {
            Self::Id(id) => Condition::eq("id", id),
        }
    }
}

fn check_line(quantity: Option<i32>, price: Option<Decimal>) -> Result<(), ClientError> {
    match quantity {
        Some(quantity) if quantity <= 0 => {
            return Err(ClientError::Validation(format!(
                "order item quantity must be positive (got {quantity})"
            )));
        }
        _ => {}
    }
    match price {
        Some(price) if price.is_sign_negative() && !price.is_zero() => {
            Err(ClientError::Validation(format!(
                "order item price cannot be negative (got {price})"
            )))
        }
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderItemCreateInput {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub variant_id: Option<ProductVariantId>,
    pub quantity: i32,
    pub price: Decimal,
}

impl CreateInput for OrderItemCreateInput {
    fn into_row(self) -> Result<(Row, Vec<NestedCreate>), ClientError> {
        let mut row = OrderItemCreateWithoutOrderInput {
            product_id: self.product_id,
            variant_id: self.variant_id,
            quantity: self.quantity,
            price: self.price,
        }
        .into_row()?;
        row.set("order_id", self.order_id);
        Ok((row, Vec::new()))
    }
}

/// A line item created inside [`OrderCreateInput`](super::OrderCreateInput).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderItemCreateWithoutOrderInput {
    pub product_id: ProductId,
    pub variant_id: Option<ProductVariantId>,
    pub quantity: i32,
    pub price: Decimal,
}

impl OrderItemCreateWithoutOrderInput {
    #[must_use]
    pub const fn new(product_id: ProductId, quantity: i32, price: Decimal) -> Self {
        Self {
            product_id,
            variant_id: None,
            quantity,
            price,
        }
    }

    #[must_use]
    pub const fn with_variant(mut self, variant_id: ProductVariantId) -> Self {
        self.variant_id = Some(variant_id);
        self
    }

    pub(crate) fn into_row(self) -> Result<Row, ClientError> {
        check_line(Some(self.quantity), Some(self.price))?;
        let mut row = Row::default();
        row.set("product_id", self.product_id);
        row.set_opt("variant_id", self.variant_id);
        row.set("quantity", self.quantity);
        row.set("price", self.price);
        Ok(row)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderItemUpdateInput {
    pub order_id: Option<OrderId>,
    pub product_id: Option<ProductId>,
    pub variant_id: Option<Option<ProductVariantId>>,
    pub quantity: Option<NumericUpdate<i32>>,
    pub price: Option<NumericUpdate<Decimal>>,
}

impl UpdateInput for OrderItemUpdateInput {
    fn into_assignments(self) -> Result<Vec<Assignment>, ClientError> {
        let quantity = match self.quantity {
            Some(NumericUpdate::Set(q)) => Some(q),
            _ => None,
        };
        let price = match self.price {
            Some(NumericUpdate::Set(p)) => Some(p),
            _ => None,
        };
        check_line(quantity, price)?;
        let mut set = Assignments::default();
        set.set("order_id", self.order_id);
        set.set("product_id", self.product_id);
        set.set_nullable("variant_id", self.variant_id);
        set.numeric("quantity", self.quantity);
        set.numeric("price", self.price);
        Ok(set.finish())
    }
}

impl Model for OrderItem {
    const NAME: &'static str = "OrderItem";
    const TABLE: &'static str = "order_items";

    type Field = OrderItemField;
    type Where = OrderItemWhereInput;
    type Unique = OrderItemWhereUniqueInput;
    type Create = OrderItemCreateInput;
    type Update = OrderItemUpdateInput;

    fn id(&self) -> i32 {
        self.id.as_i32()
    }

    fn value(&self, field: OrderItemField) -> Value {
        match field {
            OrderItemField::Id => self.id.into_value(),
            OrderItemField::OrderId => self.order_id.into_value(),
            OrderItemField::ProductId => self.product_id.into_value(),
            OrderItemField::VariantId => self.variant_id.into_value(),
            OrderItemField::Quantity => self.quantity.into_value(),
            OrderItemField::Price => self.price.into_value(),
            OrderItemField::CreatedAt => self.created_at.into_value(),
            OrderItemField::UpdatedAt => self.updated_at.into_value(),
        }
    }
}

// =============================================================================
// Relations
// =============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct OrderItemInclude {
    pub order: bool,
    pub product: bool,
    pub variant: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderItemWithRelations {
    #[serde(flatten)]
    pub item: OrderItem,
    pub order: Option<Order>,
    pub product: Option<Product>,
    pub variant: Option<ProductVariant>,
}

impl Delegate<'_, OrderItem> {
    /// `find_many` plus relations.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` for invalid arguments.
    pub async fn find_many_including(
        &mut self,
        args: FindManyArgs<OrderItem>,
        include: OrderItemInclude,
    ) -> Result<Vec<OrderItemWithRelations>, ClientError> {
        let items = self.find_many(args).await?;
        self.attach_relations(items, include).await
    }

    /// `find_unique` plus relations.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Database` if a query fails.
    pub async fn find_unique_including(
        &mut self,
        unique: OrderItemWhereUniqueInput,
        include: OrderItemInclude,
    ) -> Result<Option<OrderItemWithRelations>, ClientError> {
        let Some(item) = self.find_unique(unique).await? else {
            return Ok(None);
        };
        Ok(self.attach_relations(vec![item], include).await?.pop())
    }

    async fn attach_relations(
        &mut self,
        items: Vec<OrderItem>,
        include: OrderItemInclude,
    ) -> Result<Vec<OrderItemWithRelations>, ClientError> {
        let orders = if include.order {
            Some(
                self.reborrow::<Order>()
                    .load_by_ids(items.iter().map(|i| i.order_id.as_i32()))
                    .await?,
            )
        } else {
            None
        };
        let products = if include.product {
            Some(
                self.reborrow::<Product>()
                    .load_by_ids(items.iter().map(|i| i.product_id.as_i32()))
                    .await?,
            )
        } else {
            None
        };
        let variants = if include.variant {
            Some(
                self.reborrow::<ProductVariant>()
                    .load_by_ids(items.iter().filter_map(|i| i.variant_id.map(|id| id.as_i32())))
                    .await?,
            )
        } else {
            None
        };
        Ok(items
            .into_iter()
            .map(|item| OrderItemWithRelations {
                order: orders
                    .as_ref()
                    .and_then(|m| m.get(&item.order_id.as_i32()).cloned()),
                product: products
                    .as_ref()
                    .and_then(|m| m.get(&item.product_id.as_i32()).cloned()),
                variant: item
                    .variant_id
                    .and_then(|v| variants.as_ref()?.get(&v.as_i32()).cloned()),
                item,
            })
            .collect())
    }
}
