//! Limited-time product drops.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use dropshop_core::DropId;

use super::{Product, ProductWhereInput, to_many};
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
use crate::password;
use crate::value::{FieldKind, IntoValue, Value};

const PRODUCTS: Relation = to_many("products", "drop_id");

/// A release window for a set of products, optionally password protected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct ProductDrop {
    pub id: DropId,
    pub name: String,
    pub description: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_active: bool,
    /// Argon2 PHC string.
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProductDrop {
    /// Active, started, and not yet ended.
    #[must_use]
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.start_date <= now && now < self.end_date
    }

    #[must_use]
    pub const fn is_password_protected(&self) -> bool {
        self.password.is_some()
    }

    /// Check a visitor's password. Drops without a password are open.
    #[must_use]
    pub fn verify_password(&self, candidate: &str) -> bool {
        self.password
            .as_deref()
            .is_none_or(|hash| password::verify_password(candidate, hash))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropField {
    Id,
    Name,
    Description,
    StartDate,
    EndDate,
    IsActive,
    Password,
    CreatedAt,
    UpdatedAt,
}

impl ScalarField for DropField {
    const ALL: &'static [Self] = &[
        Self::Id,
        Self::Name,
        Self::Description,
        Self::StartDate,
        Self::EndDate,
        Self::IsActive,
        Self::Password,
        Self::CreatedAt,
        Self::UpdatedAt,
    ];

    fn column(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::Description => "description",
            Self::StartDate => "start_date",
            Self::EndDate => "end_date",
            Self::IsActive => "is_active",
            Self::Password => "password",
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
        }
    }

    fn kind(self) -> FieldKind {
        match self {
            Self::Id => FieldKind::Int,
            Self::Name | Self::Description | Self::Password => FieldKind::Text,
            Self::IsActive => FieldKind::Bool,
            Self::StartDate | Self::EndDate | Self::CreatedAt | Self::UpdatedAt => {
                FieldKind::Timestamp
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DropWhereInput {
    pub and: Vec<DropWhereInput>,
    pub or: Option<Vec<DropWhereInput>>,
    pub not: Vec<DropWhereInput>,
    pub id: Option<Filter<DropId>>,
    pub name: Option<StringFilter>,
    pub description: Option<StringFilter>,
    pub start_date: Option<Filter<DateTime<Utc>>>,
    pub end_date: Option<Filter<DateTime<Utc>>>,
    pub is_active: Option<Filter<bool>>,
    /// Only `is_null` is meaningful on the stored hash.
    pub password: Option<StringFilter>,
    pub created_at: Option<Filter<DateTime<Utc>>>,
    pub updated_at: Option<Filter<DateTime<Utc>>>,
    pub products: Option<ListRelationFilter<ProductWhereInput>>,
}

impl DropWhereInput {
    /// Drops live at `now`.
    #[must_use]
    pub fn live_at(now: DateTime<Utc>) -> Self {
        Self {
            is_active: Some(Filter::equals(true)),
            start_date: Some(Filter::lte(now)),
            end_date: Some(Filter::gt(now)),
            ..Self::default()
        }
    }
}

impl WhereInput for DropWhereInput {
    fn into_condition(self) -> Condition {
        let mut set = ConditionSet::default();
        set.field("id", self.id);
        set.field("name", self.name);
        set.field("description", self.description);
        set.field("start_date", self.start_date);
        set.field("end_date", self.end_date);
        set.field("is_active", self.is_active);
        set.field("password", self.password);
        set.field("created_at", self.created_at);
        set.field("updated_at", self.updated_at);
        if let Some(products) = self.products {
            set.push(products.into_condition(PRODUCTS));
        }
        set.combinators(self.and, self.or, self.not);
        set.build()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropWhereUniqueInput {
    Id(DropId),
}

impl UniqueWhere for DropWhereUniqueInput {
    fn into_condition(self) -> Condition {
        match self {
            Self::Id(id) => Condition::eq("id", id),
        }
    }
}

/// `password` is plaintext here and hashed before it is stored.
#[derive(Clone, PartialEq, Eq)]
pub struct DropCreateInput {
    pub name: String,
    pub description: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_active: Option<bool>,
    pub password: Option<String>,
}

impl std::fmt::Debug for DropCreateInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DropCreateInput")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("start_date", &self.start_date)
            .field("end_date", &self.end_date)
            .field("is_active", &self.is_active)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl DropCreateInput {
    #[must_use]
    pub fn new(name: impl Into<String>, start_date: DateTime<Utc>, end_date: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            description: None,
            start_date,
            end_date,
            is_active: None,
            password: None,
        }
    }
}

impl CreateInput for DropCreateInput {
    fn into_row(self) -> Result<(Row, Vec<NestedCreate>), ClientError> {
        if self.end_date <= self.start_date {
            return Err(ClientError::Validation(
                "drop end_date must be after start_date".to_owned(),
            ));
        }
        let mut row = Row::default();
        row.set("name", self.name);
        row.set_opt("description", self.description);
        row.set("start_date", self.start_date);
        row.set("end_date", self.end_date);
        row.set_opt("is_active", self.is_active);
        row.set_opt(
            "password",
            self.password
                .as_deref()
                .map(password::hash_password)
                .transpose()?,
        );
        Ok((row, Vec::new()))
    }
}

#[derive(Clone, Default, PartialEq, Eq)]
pub struct DropUpdateInput {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub is_active: Option<bool>,
    /// `Some(None)` removes the password; `Some(Some(pw))` sets a new one.
    pub password: Option<Option<String>>,
}

impl std::fmt::Debug for DropUpdateInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DropUpdateInput")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("start_date", &self.start_date)
            .field("end_date", &self.end_date)
            .field("is_active", &self.is_active)
            .field(
                "password",
                &self.password.as_ref().map(|p| p.as_ref().map(|_| "[REDACTED]")),
            )
            .finish()
    }
}

impl UpdateInput for DropUpdateInput {
    fn into_assignments(self) -> Result<Vec<Assignment>, ClientError> {
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if end <= start {
                return Err(ClientError::Validation(
                    "drop end_date must be after start_date".to_owned(),
                ));
            }
        }
        let password = match self.password {
            Some(Some(plain)) => Some(Some(password::hash_password(&plain)?)),
            Some(None) => Some(None),
            None => None,
        };
        let mut set = Assignments::default();
        set.set("name", self.name);
        set.set_nullable("description", self.description);
        set.set("start_date", self.start_date);
        set.set("end_date", self.end_date);
        set.set("is_active", self.is_active);
        set.set_nullable("password", password);
        Ok(set.finish())
    }
}

impl Model for ProductDrop {
    const NAME: &'static str = "Drop";
    const TABLE: &'static str = "drops";

    type Field = DropField;
    type Where = DropWhereInput;
    type Unique = DropWhereUniqueInput;
    type Create = DropCreateInput;
    type Update = DropUpdateInput;

    fn id(&self) -> i32 {
        self.id.as_i32()
    }

    fn value(&self, field: DropField) -> Value {
        match field {
            DropField::Id => self.id.into_value(),
            DropField::Name => self.name.clone().into_value(),
            DropField::Description => self.description.clone().into_value(),
            DropField::StartDate => self.start_date.into_value(),
            DropField::EndDate => self.end_date.into_value(),
            DropField::IsActive => self.is_active.into_value(),
            DropField::Password => self.password.clone().into_value(),
            DropField::CreatedAt => self.created_at.into_value(),
            DropField::UpdatedAt => self.updated_at.into_value(),
        }
    }
}

// =============================================================================
// Relations
// =============================================================================

#[derive(Default)]
pub struct DropInclude {
    pub products: Option<FindManyArgs<Product>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DropWithRelations {
    #[serde(flatten)]
    pub drop: ProductDrop,
    pub products: Option<Vec<Product>>,
}

impl Delegate<'_, ProductDrop> {
    /// `find_many` plus the drop's products.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` for invalid arguments.
    pub async fn find_many_including(
        &mut self,
        args: FindManyArgs<ProductDrop>,
        include: DropInclude,
    ) -> Result<Vec<DropWithRelations>, ClientError> {
        let drops = self.find_many(args).await?;
        self.attach_relations(drops, include).await
    }

    /// `find_unique` plus the drop's products.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Database` if a query fails.
    pub async fn find_unique_including(
        &mut self,
        unique: DropWhereUniqueInput,
        include: DropInclude,
    ) -> Result<Option<DropWithRelations>, ClientError> {
        let Some(drop) = self.find_unique(unique).await? else {
            return Ok(None);
        };
        Ok(self.attach_relations(vec![drop], include).await?.pop())
    }

    async fn attach_relations(
        &mut self,
        drops: Vec<ProductDrop>,
        include: DropInclude,
    ) -> Result<Vec<DropWithRelations>, ClientError> {
        let ids: Vec<i32> = drops.iter().map(Model::id).collect();
        let mut products = match include.products {
            Some(args) => Some(
                self.reborrow::<Product>()
                    .load_children("drop_id", &ids, args, |p| p.drop_id.map(|id| id.as_i32()))
                    .await?,
            ),
            None => None,
        };
        Ok(drops
            .into_iter()
            .map(|drop| {
                let id = drop.id.as_i32();
                DropWithRelations {
                    products: products.as_mut().map(|m| m.remove(&id).unwrap_or_default()),
                    drop,
                }
            })
            .collect())
    }
}
