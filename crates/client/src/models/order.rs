//! Customer orders.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;

use dropshop_core::{AddressId, OrderId, OrderNumber, OrderStatus, UserId};

use super::{
    Address, AddressWhereInput, OrderItem, OrderItemCreateWithoutOrderInput, OrderItemWhereInput,
    User, UserWhereInput, to_many, to_one,
};
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

const USER: Relation = to_one("users", "user_id");
const SHIPPING_ADDRESS: Relation = to_one("addresses", "shipping_address_id");
const ITEMS: Relation = to_many("order_items", "order_id");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Order {
    pub id: OrderId,
    pub order_number: OrderNumber,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub total: Decimal,
    pub shipping_address_id: Option<AddressId>,
    /// Payment provider reference.
    pub payment_intent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderField {
    Id,
    OrderNumber,
    UserId,
    Status,
    Total,
    ShippingAddressId,
    PaymentIntentId,
    CreatedAt,
    UpdatedAt,
}

impl ScalarField for OrderField {
    const ALL: &'static [Self] = &[
        Self::Id,
        Self::OrderNumber,
        Self::UserId,
        Self::Status,
        Self::Total,
        Self::ShippingAddressId,
        Self::PaymentIntentId,
        Self::CreatedAt,
        Self::UpdatedAt,
    ];

    fn column(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::OrderNumber => "order_number",
            Self::UserId => "user_id",
            Self::Status => "status",
            Self::Total => "total",
            Self::ShippingAddressId => "shipping_address_id",
            Self::PaymentIntentId => "payment_intent_id",
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
        }
    }

    fn kind(self) -> FieldKind {
        match self {
            Self::Id | Self::UserId | Self::ShippingAddressId => FieldKind::Int,
            Self::OrderNumber | Self::PaymentIntentId => FieldKind::Text,
            Self::Status => FieldKind::Status,
            Self::Total => FieldKind::Decimal,
            Self::CreatedAt | Self::UpdatedAt => FieldKind::Timestamp,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderWhereInput {
    pub and: Vec<OrderWhereInput>,
    pub or: Option<Vec<OrderWhereInput>>,
    pub not: Vec<OrderWhereInput>,
    pub id: Option<Filter<OrderId>>,
    pub order_number: Option<StringFilter>,
    pub user_id: Option<Filter<UserId>>,
    pub status: Option<Filter<OrderStatus>>,
    pub total: Option<Filter<Decimal>>,
    pub shipping_address_id: Option<Filter<AddressId>>,
    pub payment_intent_id: Option<StringFilter>,
    pub created_at: Option<Filter<DateTime<Utc>>>,
    pub updated_at: Option<Filter<DateTime<Utc>>>,
    pub user: Option<RelationFilter<UserWhereInput>>,
    pub shipping_address: Option<RelationFilter<AddressWhereInput>>,
    pub items: Option<ListRelationFilter<OrderItemWhereInput>>,
}

impl WhereInput for OrderWhereInput {
    fn into_condition(self) -> Condition {
        let mut set = ConditionSet::default();
        set.field("id", self.id);
        set.field("order_number", self.order_number);
        set.field("user_id", self.user_id);
        set.field("status", self.status);
        set.field("total", self.total);
        set.field("shipping_address_id", self.shipping_address_id);
        set.field("payment_intent_id", self.payment_intent_id);
        set.field("created_at", self.created_at);
        set.field("updated_at", self.updated_at);
        if let Some(user) = self.user {
            set.push(user.into_condition(USER));
        }
        if let Some(address) = self.shipping_address {
            set.push(address.into_condition(SHIPPING_ADDRESS));
        }
        if let Some(items) = self.items {
            set.push(items.into_condition(ITEMS));
        }
        set.combinators(self.and, self.or, self.not);
        set.build()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderWhereUniqueInput {
    Id(OrderId),
    OrderNumber(OrderNumber),
}

impl UniqueWhere for OrderWhereUniqueInput {
    fn into_condition(self) -> Condition {
        match self {
            Self::Id(id) => Condition::eq("id", id),
            Self::OrderNumber(number) => Condition::eq("order_number", number),
        }
    }
}

fn check_total(total: Decimal) -> Result<(), ClientError> {
    if total.is_sign_negative() && !total.is_zero() {
        return Err(ClientError::Validation(format!(
            "order total cannot be negative (got {total})"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderCreateInput {
    /// Generated when `None`.
    pub order_number: Option<OrderNumber>,
    pub user_id: UserId,
    pub status: Option<OrderStatus>,
    pub total: Decimal,
    pub shipping_address_id: Option<AddressId>,
    pub payment_intent_id: Option<String>,
    /// Line items created together with the order.
    pub items: Vec<OrderItemCreateWithoutOrderInput>,
}

impl OrderCreateInput {
    #[must_use]
    pub const fn new(user_id: UserId, total: Decimal) -> Self {
        Self {
            order_number: None,
            user_id,
            status: None,
            total,
            shipping_address_id: None,
            payment_intent_id: None,
            items: Vec::new(),
        }
    }
}

impl CreateInput for OrderCreateInput {
    fn into_row(self) -> Result<(Row, Vec<NestedCreate>), ClientError> {
        check_total(self.total)?;
        let mut row = Row::default();
        row.set(
            "order_number",
            self.order_number.unwrap_or_else(OrderNumber::generate),
        );
        row.set("user_id", self.user_id);
        row.set_opt("status", self.status);
        row.set("total", self.total);
        row.set_opt("shipping_address_id", self.shipping_address_id);
        row.set_opt("payment_intent_id", self.payment_intent_id);
        let items = NestedCreate {
            model: OrderItem::NAME,
            table: OrderItem::TABLE,
            foreign_key: "order_id",
            rows: self
                .items
                .into_iter()
                .map(OrderItemCreateWithoutOrderInput::into_row)
                .collect::<Result<_, _>>()?,
        };
        Ok((row, vec![items]))
    }
}

/// Direct status writes bypass transition rules; use
/// [`advance_order_status`](crate::services::advance_order_status) for
/// lifecycle changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderUpdateInput {
    pub order_number: Option<OrderNumber>,
    pub user_id: Option<UserId>,
    pub status: Option<OrderStatus>,
    pub total: Option<NumericUpdate<Decimal>>,
    pub shipping_address_id: Option<Option<AddressId>>,
    pub payment_intent_id: Option<Option<String>>,
}

impl UpdateInput for OrderUpdateInput {
    fn into_assignments(self) -> Result<Vec<Assignment>, ClientError> {
        if let Some(NumericUpdate::Set(total)) = self.total {
            check_total(total)?;
        }
        let mut set = Assignments::default();
        set.set("order_number", self.order_number);
        set.set("user_id", self.user_id);
        set.set("status", self.status);
        set.numeric("total", self.total);
        set.set_nullable("shipping_address_id", self.shipping_address_id);
        set.set_nullable("payment_intent_id", self.payment_intent_id);
        Ok(set.finish())
    }
}

impl Model for Order {
    const NAME: &'static str = "Order";
    const TABLE: &'static str = "orders";

    type Field = OrderField;
    type Where = OrderWhereInput;
    type Unique = OrderWhereUniqueInput;
    type Create = OrderCreateInput;
    type Update = OrderUpdateInput;

    fn id(&self) -> i32 {
        self.id.as_i32()
    }

    fn value(&self, field: OrderField) -> Value {
        match field {
            OrderField::Id => self.id.into_value(),
            OrderField::OrderNumber => self.order_number.clone().into_value(),
            OrderField::UserId => self.user_id.into_value(),
            OrderField::Status => self.status.into_value(),
            OrderField::Total => self.total.into_value(),
            OrderField::ShippingAddressId => self.shipping_address_id.into_value(),
            OrderField::PaymentIntentId => self.payment_intent_id.clone().into_value(),
            OrderField::CreatedAt => self.created_at.into_value(),
            OrderField::UpdatedAt => self.updated_at.into_value(),
        }
    }
}

// =============================================================================
// Relations
// =============================================================================

#[derive(Default)]
pub struct OrderInclude {
    pub user: bool,
    pub shipping_address: bool,
    pub items: Option<FindManyArgs<OrderItem>>,
}

impl OrderInclude {
    /// User, shipping address and every line item.
    #[must_use]
    pub fn all() -> Self {
        Self {
            user: true,
            shipping_address: true,
            items: Some(FindManyArgs::default()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderWithRelations {
    #[serde(flatten)]
    pub order: Order,
    pub user: Option<User>,
    pub shipping_address: Option<Address>,
    pub items: Option<Vec<OrderItem>>,
}

impl Delegate<'_, Order> {
    /// `find_many` plus relations, loaded with one query per relation.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` for invalid arguments.
    pub async fn find_many_including(
        &mut self,
        args: FindManyArgs<Order>,
        include: OrderInclude,
    ) -> Result<Vec<OrderWithRelations>, ClientError> {
        let orders = self.find_many(args).await?;
        self.attach_relations(orders, include).await
    }

    /// `find_unique` plus relations.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Database` if a query fails.
    pub async fn find_unique_including(
        &mut self,
        unique: OrderWhereUniqueInput,
        include: OrderInclude,
    ) -> Result<Option<OrderWithRelations>, ClientError> {
        let Some(order) = self.find_unique(unique).await? else {
            return Ok(None);
        };
        Ok(self.attach_relations(vec![order], include).await?.pop())
    }

    async fn attach_relations(
        &mut self,
        orders: Vec<Order>,
        include: OrderInclude,
    ) -> Result<Vec<OrderWithRelations>, ClientError> {
        let users = if include.user {
            Some(
                self.reborrow::<User>()
                    .load_by_ids(orders.iter().map(|o| o.user_id.as_i32()))
                    .await?,
            )
        } else {
            None
        };
        let addresses = if include.shipping_address {
            Some(
                self.reborrow::<Address>()
                    .load_by_ids(
                        orders
                            .iter()
                            .filter_map(|o| o.shipping_address_id.map(|id| id.as_i32())),
                    )
                    .await?,
            )
        } else {
            None
        };
        let ids: Vec<i32> = orders.iter().map(Model::id).collect();
        let mut items = match include.items {
            Some(args) => Some(
                self.reborrow::<OrderItem>()
                    .load_children("order_id", &ids, args, |i| Some(i.order_id.as_i32()))
                    .await?,
            ),
            None => None,
        };
        Ok(orders
            .into_iter()
            .map(|order| {
                let id = order.id.as_i32();
                OrderWithRelations {
                    user: users
                        .as_ref()
                        .and_then(|m| m.get(&order.user_id.as_i32()).cloned()),
                    shipping_address: order
                        .shipping_address_id
                        .and_then(|a| addresses.as_ref()?.get(&a.as_i32()).cloned()),
                    items: items.as_mut().map(|m| m.remove(&id).unwrap_or_default()),
                    order,
                }
            })
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::SetExpr;
    use crate::value::Sql;

    #[test]
    fn test_create_generates_order_number() {
        let (mut row, nested) = OrderCreateInput::new(UserId::new(1), Decimal::new(5000, 2))
            .into_row()
            .unwrap();
        let Some(Value::Text(Some(number))) = row.take("order_number") else {
            panic!("order_number missing");
        };
        assert!(OrderNumber::parse(&number).is_ok());
        assert!(nested[0].rows.is_empty());
    }

    #[test]
    fn test_create_keeps_given_order_number() {
        let number = OrderNumber::parse("ORD-ABCDEF1234").unwrap();
        let mut input = OrderCreateInput::new(UserId::new(1), Decimal::ZERO);
        input.order_number = Some(number);
        let (mut row, _) = input.into_row().unwrap();
        assert_eq!(
            row.take("order_number"),
            Some(Value::Text(Some("ORD-ABCDEF1234".to_owned())))
        );
    }

    #[test]
    fn test_create_with_items() {
        let mut input = OrderCreateInput::new(UserId::new(1), Decimal::new(5000, 2));
        input.items.push(OrderItemCreateWithoutOrderInput::new(
            dropshop_core::ProductId::new(3),
            2,
            Decimal::new(2500, 2),
        ));
        let (_, nested) = input.into_row().unwrap();
        assert_eq!(nested[0].foreign_key, "order_id");
        assert_eq!(nested[0].rows.len(), 1);
    }

    #[test]
    fn test_negative_total_rejected() {
        let input = OrderCreateInput::new(UserId::new(1), Decimal::new(-1, 0));
        assert!(matches!(input.into_row(), Err(ClientError::Validation(_))));
    }

    #[test]
    fn test_status_filter_and_address_relation() {
        let mut sql = Sql::new("");
        OrderWhereInput {
            status: Some(Filter::in_list(vec![
                OrderStatus::Pending,
                OrderStatus::Processing,
            ])),
            shipping_address: Some(RelationFilter::is(AddressWhereInput {
                country: Some(StringFilter::equals("us").insensitive()),
                ..AddressWhereInput::default()
            })),
            ..OrderWhereInput::default()
        }
        .into_condition()
        .render(&mut sql);
        assert_eq!(
            sql.sql(),
            "(t0.status IN ($1, $2) AND EXISTS (SELECT 1 FROM addresses AS t1 \
             WHERE t1.id = t0.shipping_address_id AND (LOWER(t1.country) = LOWER($3))))"
        );
    }

    #[test]
    fn test_update_status_and_clear_payment() {
        let update = OrderUpdateInput {
            status: Some(OrderStatus::Shipped),
            payment_intent_id: Some(None),
            ..OrderUpdateInput::default()
        };
        assert_eq!(
            update.into_assignments().unwrap(),
            vec![
                ("status", SetExpr::Set(Value::Status(Some(OrderStatus::Shipped)))),
                ("payment_intent_id", SetExpr::Set(Value::Text(None))),
            ]
        );
    }
}
