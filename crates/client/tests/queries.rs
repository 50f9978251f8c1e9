//! Filtering, pagination, includes and aggregation against a live database.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

mod common;

use sqlx::PgPool;

use dropshop_client::prelude::*;

use common::{live_drop, price, product, product_with_variant, upcoming_drop, user};

async fn catalog(client: &Client) -> Vec<Product> {
    let mut products = Vec::new();
    for (slug, cents) in [
        ("logo-hoodie", 6500),
        ("zip-hoodie", 7500),
        ("basic-tee", 2500),
        ("long-sleeve-tee", 3500),
        ("beanie", 1800),
    ] {
        products.push(product(client, slug, cents).await);
    }
    products
}

fn slugs(products: &[Product]) -> Vec<&str> {
    products.iter().map(|p| p.slug.as_str()).collect()
}

// =============================================================================
// Scalar filters
// =============================================================================

#[sqlx::test(migrations = "./migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_string_and_numeric_filters(pool: PgPool) {
    let client = common::client(pool);
    catalog(&client).await;

    let hoodies = client
        .product()
        .find_many(
            FindManyArgs::new()
                .filter(ProductWhereInput {
                    name: Some(StringFilter::contains("HOODIE").insensitive()),
                    price: Some(Filter::lt(price(7000))),
                    ..ProductWhereInput::default()
                })
                .order_by(OrderBy::asc(ProductField::Slug)),
        )
        .await
        .unwrap();
    assert_eq!(slugs(&hoodies), vec!["logo-hoodie"]);

    let tees = client
        .product()
        .find_many(
            FindManyArgs::new()
                .filter(ProductWhereInput {
                    slug: Some(StringFilter::ends_with("-tee")),
                    ..ProductWhereInput::default()
                })
                .order_by(OrderBy::desc(ProductField::Price)),
        )
        .await
        .unwrap();
    assert_eq!(slugs(&tees), vec!["long-sleeve-tee", "basic-tee"]);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_like_wildcards_are_literal(pool: PgPool) {
    let client = common::client(pool);
    product(&client, "tee_100", 100).await;
    product(&client, "tee-100", 100).await;

    let found = client
        .product()
        .find_many(FindManyArgs::new().filter(ProductWhereInput {
            slug: Some(StringFilter::contains("_1")),
            ..ProductWhereInput::default()
        }))
        .await
        .unwrap();
    assert_eq!(slugs(&found), vec!["tee_100"]);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_logical_combinators(pool: PgPool) {
    let client = common::client(pool);
    catalog(&client).await;

    let found = client
        .product()
        .find_many(
            FindManyArgs::new()
                .filter(ProductWhereInput {
                    or: Some(vec![
                        ProductWhereInput {
                            slug: Some(StringFilter::equals("beanie")),
                            ..ProductWhereInput::default()
                        },
                        ProductWhereInput {
                            price: Some(Filter::gte(price(7000))),
                            ..ProductWhereInput::default()
                        },
                    ]),
                    not: vec![ProductWhereInput {
                        slug: Some(StringFilter::starts_with("zip")),
                        ..ProductWhereInput::default()
                    }],
                    ..ProductWhereInput::default()
                })
                .order_by(OrderBy::asc(ProductField::Slug)),
        )
        .await
        .unwrap();
    assert_eq!(slugs(&found), vec!["beanie"]);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_empty_or_matches_nothing(pool: PgPool) {
    let client = common::client(pool);
    catalog(&client).await;

    let count = client
        .product()
        .count(ProductWhereInput {
            or: Some(Vec::new()),
            ..ProductWhereInput::default()
        })
        .await
        .unwrap();
    assert_eq!(count, 0);

    let in_nothing = client
        .product()
        .count(ProductWhereInput {
            id: Some(Filter::in_list(Vec::new())),
            ..ProductWhereInput::default()
        })
        .await
        .unwrap();
    assert_eq!(in_nothing, 0);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_null_filters(pool: PgPool) {
    let client = common::client(pool);
    let drop = live_drop(&client, "Summer", None).await;
    let in_drop = product(&client, "drop-tee", 2000).await;
    product(&client, "core-tee", 2000).await;
    client
        .product()
        .update(
            ProductWhereUniqueInput::Id(in_drop.id),
            ProductUpdateInput {
                drop_id: Some(Some(drop.id)),
                ..ProductUpdateInput::default()
            },
        )
        .await
        .unwrap();

    let without_drop = client
        .product()
        .find_many(FindManyArgs::new().filter(ProductWhereInput {
            drop_id: Some(Filter::is_null(true)),
            ..ProductWhereInput::default()
        }))
        .await
        .unwrap();
    assert_eq!(slugs(&without_drop), vec!["core-tee"]);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_list_filter_has(pool: PgPool) {
    let client = common::client(pool);
    client
        .product()
        .create(ProductCreateInput {
            images: vec!["front.jpg".to_owned(), "back.jpg".to_owned()],
            ..ProductCreateInput::new("Pictured", "pictured", "apparel", price(100))
        })
        .await
        .unwrap();
    product(&client, "bare", 100).await;

    let with_back = client
        .product()
        .count(ProductWhereInput {
            images: Some(StringListFilter::has("back.jpg")),
            ..ProductWhereInput::default()
        })
        .await
        .unwrap();
    let empty = client
        .product()
        .count(ProductWhereInput {
            images: Some(StringListFilter::is_empty(true)),
            ..ProductWhereInput::default()
        })
        .await
        .unwrap();
    assert_eq!((with_back, empty), (1, 1));
}

// =============================================================================
// Relation filters
// =============================================================================

#[sqlx::test(migrations = "./migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_list_relation_filters(pool: PgPool) {
    let client = common::client(pool);
    let (stocked, _) = product_with_variant(&client, "stocked", 1000, 5).await;
    let (sold_out, _) = product_with_variant(&client, "sold-out", 1000, 0).await;
    product(&client, "no-variants", 1000).await;

    let with_stock = client
        .product()
        .find_many(FindManyArgs::new().filter(ProductWhereInput {
            variants: Some(ListRelationFilter::some(ProductVariantWhereInput {
                stock: Some(Filter::gt(0)),
                ..ProductVariantWhereInput::default()
            })),
            ..ProductWhereInput::default()
        }))
        .await
        .unwrap();
    assert_eq!(slugs(&with_stock), vec![stocked.slug.as_str()]);

    // `every` holds vacuously for products without variants.
    let mut all_empty = client
        .product()
        .find_many(FindManyArgs::new().filter(ProductWhereInput {
            variants: Some(ListRelationFilter::every(ProductVariantWhereInput {
                stock: Some(Filter::equals(0)),
                ..ProductVariantWhereInput::default()
            })),
            ..ProductWhereInput::default()
        }))
        .await
        .unwrap();
    all_empty.sort_by_key(|p| p.id);
    assert_eq!(slugs(&all_empty), vec![sold_out.slug.as_str(), "no-variants"]);

    let without_variants = client
        .product()
        .count(ProductWhereInput {
            variants: Some(ListRelationFilter::none(ProductVariantWhereInput::default())),
            ..ProductWhereInput::default()
        })
        .await
        .unwrap();
    assert_eq!(without_variants, 1);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_every_rejects_children_with_null_columns(pool: PgPool) {
    let client = common::client(pool);
    let ann = user(&client, "ann@example.com").await;
    let sticker = product(&client, "sticker", 199).await;
    client
        .order()
        .create(OrderCreateInput {
            items: vec![OrderItemCreateWithoutOrderInput::new(sticker.id, 1, price(199))],
            ..OrderCreateInput::new(ann.id, price(199))
        })
        .await
        .unwrap();

    // The only item has no variant, so it cannot satisfy `variant_id = 999`.
    let matched = client
        .product()
        .count(ProductWhereInput {
            order_items: Some(ListRelationFilter::every(OrderItemWhereInput {
                variant_id: Some(Filter::equals(ProductVariantId::new(999))),
                ..OrderItemWhereInput::default()
            })),
            ..ProductWhereInput::default()
        })
        .await
        .unwrap();
    assert_eq!(matched, 0);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_to_one_relation_filter(pool: PgPool) {
    let client = common::client(pool);
    let live = live_drop(&client, "Live", None).await;
    let later = upcoming_drop(&client, "Later").await;
    for (slug, drop_id) in [("live-tee", live.id), ("later-tee", later.id)] {
        client
            .product()
            .create(ProductCreateInput {
                drop_id: Some(drop_id),
                ..ProductCreateInput::new(slug, slug, "apparel", price(100))
            })
            .await
            .unwrap();
    }

    let available = client
        .product()
        .find_many(FindManyArgs::new().filter(ProductWhereInput {
            drop: Some(RelationFilter::is(DropWhereInput::live_at(chrono::Utc::now()))),
            ..ProductWhereInput::default()
        }))
        .await
        .unwrap();
    assert_eq!(slugs(&available), vec!["live-tee"]);
}

// =============================================================================
// Pagination
// =============================================================================

#[sqlx::test(migrations = "./migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_skip_take_and_cursor(pool: PgPool) {
    let client = common::client(pool);
    let products = catalog(&client).await;

    let page = client
        .product()
        .find_many(
            FindManyArgs::new()
                .order_by(OrderBy::asc(ProductField::Id))
                .skip(1)
                .take(2),
        )
        .await
        .unwrap();
    assert_eq!(page, products[1..3].to_vec());

    let after_cursor = client
        .product()
        .find_many(
            FindManyArgs::new()
                .order_by(OrderBy::asc(ProductField::Id))
                .cursor(ProductWhereUniqueInput::Id(products[2].id))
                .skip(1)
                .take(10),
        )
        .await
        .unwrap();
    assert_eq!(after_cursor, products[3..].to_vec());

    let backwards = client
        .product()
        .find_many(
            FindManyArgs::new()
                .order_by(OrderBy::asc(ProductField::Id))
                .cursor(ProductWhereUniqueInput::Id(products[2].id))
                .take(-2),
        )
        .await
        .unwrap();
    assert_eq!(backwards, products[1..3].to_vec());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_cursor_over_nullable_column(pool: PgPool) {
    let client = common::client(pool);
    let mut people = Vec::new();
    for (email, name) in [
        ("ann@example.com", None),
        ("bo@example.com", Some("Bo")),
        ("cy@example.com", None),
    ] {
        let created = client
            .user()
            .create(UserCreateInput {
                name: name.map(str::to_owned),
                ..UserCreateInput::new(Email::parse(email).unwrap(), format!("uid-{email}"))
            })
            .await
            .unwrap();
        people.push(created.id);
    }
    let (ann, bo, cy) = (people[0], people[1], people[2]);

    let page = |order: OrderBy<UserField>, cursor: UserId| {
        let client = &client;
        async move {
            client
                .user()
                .find_many(
                    FindManyArgs::new()
                        .order_by(order)
                        .cursor(UserWhereUniqueInput::Id(cursor)),
                )
                .await
                .unwrap()
                .into_iter()
                .map(|u| u.id)
                .collect::<Vec<_>>()
        }
    };

    // Ascending puts NULLs last.
    assert_eq!(page(OrderBy::asc(UserField::Name), ann).await, vec![ann, cy]);
    assert_eq!(page(OrderBy::asc(UserField::Name), bo).await, vec![bo, ann, cy]);
    // Descending puts NULLs first.
    assert_eq!(page(OrderBy::desc(UserField::Name), cy).await, vec![cy, bo]);
    assert_eq!(
        page(OrderBy::asc(UserField::Name).nulls(NullsOrder::First), cy).await,
        vec![cy, bo]
    );
    // A cursor that matches no row yields an empty page.
    assert!(page(OrderBy::desc(UserField::Name), UserId::new(9999)).await.is_empty());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_distinct(pool: PgPool) {
    let client = common::client(pool);
    catalog(&client).await;
    client
        .product()
        .create(ProductCreateInput::new("Mug", "mug", "homeware", price(1200)))
        .await
        .unwrap();

    let categories = client
        .product()
        .find_many(
            FindManyArgs::new()
                .distinct(vec![ProductField::Category])
                .order_by(OrderBy::asc(ProductField::Category)),
        )
        .await
        .unwrap();
    let names: Vec<_> = categories.iter().map(|p| p.category.as_str()).collect();
    assert_eq!(names, vec!["apparel", "homeware"]);
}

// =============================================================================
// Includes
// =============================================================================

#[sqlx::test(migrations = "./migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_include_to_many_with_take_per_parent(pool: PgPool) {
    let client = common::client(pool);
    let ann = user(&client, "ann@example.com").await;
    let bo = user(&client, "bo@example.com").await;
    for (user_id, cents) in [(ann.id, 100), (ann.id, 300), (ann.id, 200), (bo.id, 50)] {
        client
            .order()
            .create(OrderCreateInput::new(user_id, price(cents)))
            .await
            .unwrap();
    }

    let users = client
        .user()
        .find_many_including(
            FindManyArgs::new().order_by(OrderBy::asc(UserField::Id)),
            UserInclude {
                orders: Some(
                    FindManyArgs::new()
                        .order_by(OrderBy::desc(OrderField::Total))
                        .take(2),
                ),
                ..UserInclude::default()
            },
        )
        .await
        .unwrap();

    let totals: Vec<Vec<_>> = users
        .iter()
        .map(|u| u.orders.as_ref().unwrap().iter().map(|o| o.total).collect())
        .collect();
    assert_eq!(totals, vec![vec![price(300), price(200)], vec![price(50)]]);
    assert!(users[0].addresses.is_none());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_include_to_one(pool: PgPool) {
    let client = common::client(pool);
    let drop = live_drop(&client, "Capsule", None).await;
    client
        .product()
        .create(ProductCreateInput {
            drop_id: Some(drop.id),
            ..ProductCreateInput::new("Capsule Tee", "capsule-tee", "apparel", price(100))
        })
        .await
        .unwrap();
    product(&client, "core-tee", 100).await;

    let products = client
        .product()
        .find_many_including(
            FindManyArgs::new().order_by(OrderBy::asc(ProductField::Id)),
            ProductInclude {
                drop: true,
                ..ProductInclude::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(products[0].drop.as_ref().map(|d| d.id), Some(drop.id));
    assert!(products[1].drop.is_none());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_include_rejects_cursor(pool: PgPool) {
    let client = common::client(pool);
    user(&client, "ann@example.com").await;

    let err = client
        .user()
        .find_many_including(
            FindManyArgs::new(),
            UserInclude {
                orders: Some(FindManyArgs::new().cursor(OrderWhereUniqueInput::Id(OrderId::new(1)))),
                ..UserInclude::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Validation(_)));
}

// =============================================================================
// Aggregation
// =============================================================================

#[sqlx::test(migrations = "./migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_aggregate(pool: PgPool) {
    let client = common::client(pool);
    catalog(&client).await;

    let result = client
        .product()
        .aggregate(AggregateArgs {
            rows: FindManyArgs::new().filter(ProductWhereInput {
                slug: Some(StringFilter::ends_with("hoodie")),
                ..ProductWhereInput::default()
            }),
            select: AggregateSelection {
                count_all: true,
                sum: vec![ProductField::Price],
                avg: vec![ProductField::Price],
                max: vec![ProductField::Slug],
                ..AggregateSelection::default()
            },
        })
        .await
        .unwrap();

    assert_eq!(result.count_all, Some(2));
    assert_eq!(result.sum[&ProductField::Price], Some(price(14000)));
    assert_eq!(result.avg[&ProductField::Price], Some(price(7000)));
    assert_eq!(
        result.max[&ProductField::Slug],
        Value::Text(Some("zip-hoodie".to_owned()))
    );
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_aggregate_over_no_rows(pool: PgPool) {
    let client = common::client(pool);
    let result = client
        .order()
        .aggregate(AggregateArgs {
            rows: FindManyArgs::new(),
            select: AggregateSelection {
                count_all: true,
                sum: vec![OrderField::Total],
                ..AggregateSelection::default()
            },
        })
        .await
        .unwrap();
    assert_eq!(result.count_all, Some(0));
    assert_eq!(result.sum[&OrderField::Total], None);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_group_by_with_having(pool: PgPool) {
    let client = common::client(pool);
    let ann = user(&client, "ann@example.com").await;
    for (status, cents) in [
        (OrderStatus::Pending, 1000),
        (OrderStatus::Pending, 500),
        (OrderStatus::Shipped, 2000),
        (OrderStatus::Cancelled, 700),
    ] {
        client
            .order()
            .create(OrderCreateInput {
                status: Some(status),
                ..OrderCreateInput::new(ann.id, price(cents))
            })
            .await
            .unwrap();
    }

    let groups = client
        .order()
        .group_by(GroupByArgs {
            having: Some(Having::Aggregate {
                function: AggregateFn::Sum,
                field: Some(OrderField::Total),
                op: CompareOp::Gte,
                value: Value::Decimal(Some(price(1000))),
            }),
            order_by: vec![GroupOrderBy::Aggregate {
                function: AggregateFn::Sum,
                field: Some(OrderField::Total),
                direction: SortOrder::Desc,
            }],
            select: AggregateSelection {
                count_all: true,
                sum: vec![OrderField::Total],
                ..AggregateSelection::default()
            },
            ..GroupByArgs::new(vec![OrderField::Status])
        })
        .await
        .unwrap();

    let summary: Vec<_> = groups
        .iter()
        .map(|g| {
            (
                g.key(OrderField::Status).cloned(),
                g.aggregates.count_all,
                g.aggregates.sum[&OrderField::Total],
            )
        })
        .collect();
    assert_eq!(
        summary,
        vec![
            (
                Some(Value::Status(Some(OrderStatus::Shipped))),
                Some(1),
                Some(price(2000))
            ),
            (
                Some(Value::Status(Some(OrderStatus::Pending))),
                Some(2),
                Some(price(1500))
            ),
        ]
    );
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_group_by_requires_grouped_order_field(pool: PgPool) {
    let client = common::client(pool);
    let err = client
        .order()
        .group_by(GroupByArgs {
            order_by: vec![GroupOrderBy::Field(OrderBy::asc(OrderField::Total))],
            ..GroupByArgs::new(vec![OrderField::Status])
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Validation(_)));
}
