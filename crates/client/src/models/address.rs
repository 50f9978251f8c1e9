//! Shipping addresses.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use dropshop_core::{AddressId, UserId};

use super::{Order, OrderWhereInput, User, UserWhereInput, to_many, to_one};
use crate::delegate::Delegate;
use crate::error::ClientError;
use crate::filter::{
    Condition, ConditionSet, Filter, ListRelationFilter, Relation, RelationFilter, StringFilter,
    UniqueWhere, WhereInput,
};
use crate::model::{
    Assignment, Assignments, CreateInput, FindManyArgs, Model, NestedCreate, Row, ScalarField,
    UpdateInput,
};
use crate::value::{FieldKind, IntoValue, Value};

const USER: Relation = to_one("users", "user_id");
const ORDERS: Relation = to_many("orders", "shipping_address_id");

/// A postal address owned by a user.
///
/// At most one address per user has `is_default` set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Address {
    pub id: AddressId,
    pub user_id: UserId,
    pub street: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressField {
    Id,
    UserId,
    Street,
    City,
    State,
    PostalCode,
    Country,
    IsDefault,
    CreatedAt,
    UpdatedAt,
}

impl ScalarField for AddressField {
    const ALL: &'static [Self] = &[
        Self::Id,
        Self::UserId,
        Self::Street,
        Self::City,
        Self::State,
        Self::PostalCode,
        Self::Country,
        Self::IsDefault,
        Self::CreatedAt,
        Self::UpdatedAt,
    ];

    fn column(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::UserId => "user_id",
            Self::Street => "street",
            Self::City => "city",
            Self::State => "state",
            Self::PostalCode => "postal_code",
            Self::Country => "country",
            Self::IsDefault => "is_default",
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
        }
    }

    fn kind(self) -> FieldKind {
        match self {
            Self::Id | Self::UserId => FieldKind::Int,
            Self::Street | Self::City | Self::State | Self::PostalCode | Self::Country => {
                FieldKind::Text
            }
            Self::IsDefault => FieldKind::Bool,
            Self::CreatedAt | Self::UpdatedAt => FieldKind::Timestamp,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AddressWhereInput {
    pub and: Vec<AddressWhereInput>,
    pub or: Option<Vec<AddressWhereInput>>,
    pub not: Vec<AddressWhereInput>,
    pub id: Option<Filter<AddressId>>,
    pub user_id: Option<Filter<UserId>>,
    pub street: Option<StringFilter>,
    pub city: Option<StringFilter>,
    pub state: Option<StringFilter>,
    pub postal_code: Option<StringFilter>,
    pub country: Option<StringFilter>,
    pub is_default: Option<Filter<bool>>,
    pub created_at: Option<Filter<DateTime<Utc>>>,
    pub updated_at: Option<Filter<DateTime<Utc>>>,
    pub user: Option<RelationFilter<UserWhereInput>>,
    /// Orders shipped to this address.
    pub orders: Option<ListRelationFilter<OrderWhereInput>>,
}

impl WhereInput for AddressWhereInput {
    fn into_condition(self) -> Condition {
        let mut set = ConditionSet::default();
        set.field("id", self.id);
        set.field("user_id", self.user_id);
        set.field("street", self.street);
        set.field("city", self.city);
        set.field("state", self.state);
        set.field("postal_code", self.postal_code);
        set.field("country", self.country);
        set.field("is_default", self.is_default);
        set.field("created_at", self.created_at);
        set.field("updated_at", self.updated_at);
        if let Some(user) = self.user {
            set.push(user.into_condition(USER));
        }
        if let Some(orders) = self.orders {
            set.push(orders.into_condition(ORDERS));
        }
        set.combinators(self.and, self.or, self.not);
        set.build()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressWhereUniqueInput {
    Id(AddressId),
}

impl UniqueWhere for AddressWhereUniqueInput {
    fn into_condition(self) -> Condition {
        match self {
            Self::Id(id) => Condition::eq("id", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressCreateInput {
    pub user_id: UserId,
    pub street: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    pub is_default: Option<bool>,
}

impl CreateInput for AddressCreateInput {
    fn into_row(self) -> Result<(Row, Vec<NestedCreate>), ClientError> {
        let mut row = AddressCreateWithoutUserInput {
            street: self.street,
            city: self.city,
            state: self.state,
            postal_code: self.postal_code,
            country: self.country,
            is_default: self.is_default,
        }
        .into_row();
        row.set("user_id", self.user_id);
        Ok((row, Vec::new()))
    }
}

/// An address created inside [`UserCreateInput`](super::UserCreateInput).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressCreateWithoutUserInput {
    pub street: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    pub is_default: Option<bool>,
}

impl AddressCreateWithoutUserInput {
    #[must_use]
    pub fn new(
        street: impl Into<String>,
        city: impl Into<String>,
        state: impl Into<String>,
        postal_code: impl Into<String>,
        country: impl Into<String>,
    ) -> Self {
        Self {
            street: street.into(),
            city: city.into(),
            state: state.into(),
            postal_code: postal_code.into(),
            country: country.into(),
            is_default: None,
        }
    }

    /// Attach the owning user.
    #[must_use]
    pub fn for_user(self, user_id: UserId) -> AddressCreateInput {
        AddressCreateInput {
            user_id,
            street: self.street,
            city: self.city,
            state: self.state,
            postal_code: self.postal_code,
            country: self.country,
            is_default: self.is_default,
        }
    }

    pub(crate) fn into_row(self) -> Row {
        let mut row = Row::default();
        row.set("street", self.street);
        row.set("city", self.city);
        row.set("state", self.state);
        row.set("postal_code", self.postal_code);
        row.set("country", self.country);
        row.set_opt("is_default", self.is_default);
        row
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressUpdateInput {
    pub user_id: Option<UserId>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub is_default: Option<bool>,
}

impl UpdateInput for AddressUpdateInput {
    fn into_assignments(self) -> Result<Vec<Assignment>, ClientError> {
        let mut set = Assignments::default();
        set.set("user_id", self.user_id);
        set.set("street", self.street);
        set.set("city", self.city);
        set.set("state", self.state);
        set.set("postal_code", self.postal_code);
        set.set("country", self.country);
        set.set("is_default", self.is_default);
        Ok(set.finish())
    }
}

impl Model for Address {
    const NAME: &'static str = "Address";
    const TABLE: &'static str = "addresses";

    type Field = AddressField;
    type Where = AddressWhereInput;
    type Unique = AddressWhereUniqueInput;
    type Create = AddressCreateInput;
    type Update = AddressUpdateInput;

    fn id(&self) -> i32 {
        self.id.as_i32()
    }

    fn value(&self, field: AddressField) -> Value {
        match field {
            AddressField::Id => self.id.into_value(),
            AddressField::UserId => self.user_id.into_value(),
            AddressField::Street => self.street.clone().into_value(),
            AddressField::City => self.city.clone().into_value(),
            AddressField::State => self.state.clone().into_value(),
            AddressField::PostalCode => self.postal_code.clone().into_value(),
            AddressField::Country => self.country.clone().into_value(),
            AddressField::IsDefault => self.is_default.into_value(),
            AddressField::CreatedAt => self.created_at.into_value(),
            AddressField::UpdatedAt => self.updated_at.into_value(),
        }
    }
}

// =============================================================================
// Relations
// =============================================================================

#[derive(Default)]
pub struct AddressInclude {
    pub user: bool,
    pub orders: Option<FindManyArgs<Order>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddressWithRelations {
    #[serde(flatten)]
    pub address: Address,
    pub user: Option<User>,
    pub orders: Option<Vec<Order>>,
}

impl Delegate<'_, Address> {
    /// `find_many` plus relations.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` for invalid arguments.
    pub async fn find_many_including(
        &mut self,
        args: FindManyArgs<Address>,
        include: AddressInclude,
    ) -> Result<Vec<AddressWithRelations>, ClientError> {
        let addresses = self.find_many(args).await?;
        self.attach_relations(addresses, include).await
    }

    /// `find_unique` plus relations.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Database` if a query fails.
    pub async fn find_unique_including(
        &mut self,
        unique: AddressWhereUniqueInput,
        include: AddressInclude,
    ) -> Result<Option<AddressWithRelations>, ClientError> {
        let Some(address) = self.find_unique(unique).await? else {
            return Ok(None);
        };
        Ok(self.attach_relations(vec![address], include).await?.pop())
    }

    async fn attach_relations(
        &mut self,
        addresses: Vec<Address>,
        include: AddressInclude,
    ) -> Result<Vec<AddressWithRelations>, ClientError> {
        let users = if include.user {
            Some(
                self.reborrow::<User>()
                    .load_by_ids(addresses.iter().map(|a| a.user_id.as_i32()))
                    .await?,
            )
        } else {
            None
        };
        let ids: Vec<i32> = addresses.iter().map(Model::id).collect();
        let mut orders = match include.orders {
            Some(args) => Some(
                self.reborrow::<Order>()
                    .load_children("shipping_address_id", &ids, args, |o| {
                        o.shipping_address_id.map(|id| id.as_i32())
                    })
                    .await?,
            ),
            None => None,
        };
        Ok(addresses
            .into_iter()
            .map(|address| {
                let id = address.id.as_i32();
                AddressWithRelations {
                    user: users
                        .as_ref()
                        .and_then(|m| m.get(&address.user_id.as_i32()).cloned()),
                    orders: orders.as_mut().map(|m| m.remove(&id).unwrap_or_default()),
                    address,
                }
            })
            .collect())
    }
}
