//! Shop customers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use dropshop_core::{Email, UserId};

use super::{Address, AddressCreateWithoutUserInput, AddressWhereInput, Order, OrderWhereInput, to_many};
use crate::delegate::Delegate;
use crate::error::ClientError;
use crate::filter::{
    Condition, ConditionSet, Filter, ListRelationFilter, Relation, StringFilter, UniqueWhere,
    WhereInput,
};
use crate::model::{
    Assignment, Assignments, CreateInput, FindManyArgs, Model, NestedCreate, Row, ScalarField,
    UpdateInput,
};
use crate::value::{FieldKind, IntoValue, Value};

const ORDERS: Relation = to_many("orders", "user_id");
const ADDRESSES: Relation = to_many("addresses", "user_id");

/// A registered customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct User {
    pub id: UserId,
    pub email: Email,
    pub name: Option<String>,
    /// Identity provider subject.
    pub firebase_uid: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserField {
    Id,
    Email,
    Name,
    FirebaseUid,
    CreatedAt,
    UpdatedAt,
}

impl ScalarField for UserField {
    const ALL: &'static [Self] = &[
        Self::Id,
        Self::Email,
        Self::Name,
        Self::FirebaseUid,
        Self::CreatedAt,
        Self::UpdatedAt,
    ];

    fn column(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Email => "email",
            Self::Name => "name",
            Self::FirebaseUid => "firebase_uid",
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
        }
    }

    fn kind(self) -> FieldKind {
        match self {
            Self::Id => FieldKind::Int,
            Self::Email | Self::Name | Self::FirebaseUid => FieldKind::Text,
            Self::CreatedAt | Self::UpdatedAt => FieldKind::Timestamp,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserWhereInput {
    pub and: Vec<UserWhereInput>,
    pub or: Option<Vec<UserWhereInput>>,
    pub not: Vec<UserWhereInput>,
    pub id: Option<Filter<UserId>>,
    pub email: Option<StringFilter>,
    pub name: Option<StringFilter>,
    pub firebase_uid: Option<StringFilter>,
    pub created_at: Option<Filter<DateTime<Utc>>>,
    pub updated_at: Option<Filter<DateTime<Utc>>>,
    pub orders: Option<ListRelationFilter<OrderWhereInput>>,
    pub addresses: Option<ListRelationFilter<AddressWhereInput>>,
}

impl WhereInput for UserWhereInput {
    fn into_condition(self) -> Condition {
        let mut set = ConditionSet::default();
        set.field("id", self.id);
        set.field("email", self.email);
        set.field("name", self.name);
        set.field("firebase_uid", self.firebase_uid);
        set.field("created_at", self.created_at);
        set.field("updated_at", self.updated_at);
        if let Some(orders) = self.orders {
            set.push(orders.into_condition(ORDERS));
        }
        if let Some(addresses) = self.addresses {
            set.push(addresses.into_condition(ADDRESSES));
        }
        set.combinators(self.and, self.or, self.not);
        set.build()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserWhereUniqueInput {
    Id(UserId),
    Email(Email),
    FirebaseUid(String),
}

impl UniqueWhere for UserWhereUniqueInput {
    fn into_condition(self) -> Condition {
        match self {
            Self::Id(id) => Condition::eq("id", id),
            Self::Email(email) => Condition::eq("email", email),
            Self::FirebaseUid(uid) => Condition::eq("firebase_uid", uid),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserCreateInput {
    pub email: Email,
    pub name: Option<String>,
    pub firebase_uid: String,
    /// Addresses created together with the user.
    pub addresses: Vec<AddressCreateWithoutUserInput>,
}

impl UserCreateInput {
    #[must_use]
    pub fn new(email: Email, firebase_uid: impl Into<String>) -> Self {
        Self {
            email,
            name: None,
            firebase_uid: firebase_uid.into(),
            addresses: Vec::new(),
        }
    }
}

impl CreateInput for UserCreateInput {
    fn into_row(self) -> Result<(Row, Vec<NestedCreate>), ClientError> {
        if self.firebase_uid.trim().is_empty() {
            return Err(ClientError::Validation(
                "firebase_uid cannot be empty".to_owned(),
            ));
        }
        let mut row = Row::default();
        row.set("email", self.email);
        row.set_opt("name", self.name);
        row.set("firebase_uid", self.firebase_uid);
        let addresses = NestedCreate {
            model: Address::NAME,
            table: Address::TABLE,
            foreign_key: "user_id",
            rows: self
                .addresses
                .into_iter()
                .map(AddressCreateWithoutUserInput::into_row)
                .collect(),
        };
        Ok((row, vec![addresses]))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserUpdateInput {
    pub email: Option<Email>,
    /// `Some(None)` clears the name.
    pub name: Option<Option<String>>,
    pub firebase_uid: Option<String>,
}

impl UpdateInput for UserUpdateInput {
    fn into_assignments(self) -> Result<Vec<Assignment>, ClientError> {
        let mut set = Assignments::default();
        set.set("email", self.email);
        set.set_nullable("name", self.name);
        set.set("firebase_uid", self.firebase_uid);
        Ok(set.finish())
    }
}

impl Model for User {
    const NAME: &'static str = "User";
    const TABLE: &'static str = "users";

    type Field = UserField;
    type Where = UserWhereInput;
    type Unique = UserWhereUniqueInput;
    type Create = UserCreateInput;
    type Update = UserUpdateInput;

    fn id(&self) -> i32 {
        self.id.as_i32()
    }

    fn value(&self, field: UserField) -> Value {
        match field {
            UserField::Id => self.id.into_value(),
            UserField::Email => self.email.clone().into_value(),
            UserField::Name => self.name.clone().into_value(),
            UserField::FirebaseUid => self.firebase_uid.clone().into_value(),
            UserField::CreatedAt => self.created_at.into_value(),
            UserField::UpdatedAt => self.updated_at.into_value(),
        }
    }
}

// =============================================================================
// Relations
// =============================================================================

/// Relations to load with a user.
#[derive(Default)]
pub struct UserInclude {
    pub orders: Option<FindManyArgs<Order>>,
    pub addresses: Option<FindManyArgs<Address>>,
}

/// A user with the relations requested in [`UserInclude`].
///
/// Relations that were not requested are `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserWithRelations {
    #[serde(flatten)]
    pub user: User,
    pub orders: Option<Vec<Order>>,
    pub addresses: Option<Vec<Address>>,
}

impl Delegate<'_, User> {
    /// `find_many` plus relations, loaded with one query per relation.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` for invalid arguments.
    pub async fn find_many_including(
        &mut self,
        args: FindManyArgs<User>,
        include: UserInclude,
    ) -> Result<Vec<UserWithRelations>, ClientError> {
        let users = self.find_many(args).await?;
        self.attach_relations(users, include).await
    }

    /// `find_unique` plus relations.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Database` if a query fails.
    pub async fn find_unique_including(
        &mut self,
        unique: UserWhereUniqueInput,
        include: UserInclude,
    ) -> Result<Option<UserWithRelations>, ClientError> {
        let Some(user) = self.find_unique(unique).await? else {
            return Ok(None);
        };
        Ok(self.attach_relations(vec![user], include).await?.pop())
    }

    async fn attach_relations(
        &mut self,
        users: Vec<User>,
        include: UserInclude,
    ) -> Result<Vec<UserWithRelations>, ClientError> {
        let ids: Vec<i32> = users.iter().map(Model::id).collect();
        let mut orders = match include.orders {
            Some(args) => Some(
                self.reborrow::<Order>()
                    .load_children("user_id", &ids, args, |o| Some(o.user_id.as_i32()))
                    .await?,
            ),
            None => None,
        };
        let mut addresses = match include.addresses {
            Some(args) => Some(
                self.reborrow::<Address>()
                    .load_children("user_id", &ids, args, |a| Some(a.user_id.as_i32()))
                    .await?,
            ),
            None => None,
        };
        Ok(users
            .into_iter()
            .map(|user| {
                let id = user.id.as_i32();
                UserWithRelations {
                    orders: orders.as_mut().map(|m| m.remove(&id).unwrap_or_default()),
                    addresses: addresses.as_mut().map(|m| m.remove(&id).unwrap_or_default()),
                    user,
                }
            })
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use dropshop_core::OrderStatus;

    use super::*;
    use crate::value::Sql;

    fn render(condition: Condition) -> String {
        let mut sql = Sql::new("");
        condition.render(&mut sql);
        sql.sql().to_owned()
    }

    #[test]
    fn test_where_with_relation_filter() {
        let filter = UserWhereInput {
            email: Some(StringFilter::ends_with("@example.com")),
            orders: Some(ListRelationFilter::some(OrderWhereInput {
                status: Some(Filter::equals(OrderStatus::Pending)),
                ..OrderWhereInput::default()
            })),
            ..UserWhereInput::default()
        };
        assert_eq!(
            render(filter.into_condition()),
            "(t0.email LIKE $1 AND EXISTS (SELECT 1 FROM orders AS t1 \
             WHERE t1.user_id = t0.id AND (t1.status = $2)))"
        );
    }

    #[test]
    fn test_unique_by_email() {
        let email = Email::parse("fan@example.com").unwrap();
        assert_eq!(
            UserWhereUniqueInput::Email(email).into_condition(),
            Condition::eq("email", "fan@example.com")
        );
    }

    #[test]
    fn test_create_row_and_nested_addresses() {
        let mut input = UserCreateInput::new(Email::parse("fan@example.com").unwrap(), "uid-1");
        input.addresses.push(AddressCreateWithoutUserInput::new(
            "1 Main St", "Springfield", "IL", "62701", "US",
        ));
        let (row, nested) = input.into_row().unwrap();
        assert_eq!(row.columns().collect::<Vec<_>>(), vec!["email", "firebase_uid"]);
        assert_eq!(nested.len(), 1);
        assert_eq!(nested[0].foreign_key, "user_id");
        assert_eq!(nested[0].rows.len(), 1);
    }

    #[test]
    fn test_create_rejects_blank_uid() {
        let input = UserCreateInput::new(Email::parse("fan@example.com").unwrap(), "  ");
        assert!(matches!(input.into_row(), Err(ClientError::Validation(_))));
    }

    #[test]
    fn test_update_can_clear_name() {
        let update = UserUpdateInput {
            name: Some(None),
            ..UserUpdateInput::default()
        };
        assert_eq!(
            update.into_assignments().unwrap(),
            vec![("name", crate::model::SetExpr::Set(Value::Text(None)))]
        );
    }

    #[test]
    fn test_field_kinds() {
        assert_eq!(UserField::ALL.len(), 6);
        assert!(!UserField::Email.kind().is_numeric());
        assert_eq!(UserField::FirebaseUid.column(), "firebase_uid");
    }
}
