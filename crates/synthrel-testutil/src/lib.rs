//! Shared schema and dataset builders for SynthRel tests.

use chrono::NaiveDateTime;
use indexmap::IndexMap;
use synthrel_core::data::{Row, TableData, Tables, Value};
use synthrel_core::schema::{Field, FieldRef, IdSubtype, NumericalSubtype, Schema, TableSchema};

/// A three-level schema for testing: users -> orders -> payments.
pub fn users_orders_schema() -> Schema {
    let mut schema = Schema::new();

    let mut users = TableSchema::new();
    users.primary_key = Some("id".to_string());
    users.fields.insert(
        "id".to_string(),
        Field::Id {
            subtype: IdSubtype::Integer,
            reference: None,
        },
    );
    users.fields.insert(
        "age".to_string(),
        Field::Numerical {
            subtype: NumericalSubtype::Integer,
        },
    );
    users.fields.insert("plan".to_string(), Field::Categorical);
    users.fields.insert("active".to_string(), Field::Boolean);
    users
        .fields
        .insert("signup_at".to_string(), Field::Datetime);
    schema.tables.insert("users".to_string(), users);

    let mut orders = TableSchema::new();
    orders.primary_key = Some("id".to_string());
    orders.fields.insert(
        "id".to_string(),
        Field::Id {
            subtype: IdSubtype::Integer,
            reference: None,
        },
    );
    orders.fields.insert(
        "user_id".to_string(),
        Field::Id {
            subtype: IdSubtype::Integer,
            reference: Some(FieldRef {
                table: "users".to_string(),
                field: "id".to_string(),
            }),
        },
    );
    orders.fields.insert(
        "amount".to_string(),
        Field::Numerical {
            subtype: NumericalSubtype::Float,
        },
    );
    schema.tables.insert("orders".to_string(), orders);

    let mut payments = TableSchema::new();
    payments.primary_key = Some("id".to_string());
    payments.fields.insert(
        "id".to_string(),
        Field::Id {
            subtype: IdSubtype::Integer,
            reference: None,
        },
    );
    payments.fields.insert(
        "order_id".to_string(),
        Field::Id {
            subtype: IdSubtype::Integer,
            reference: Some(FieldRef {
                table: "orders".to_string(),
                field: "id".to_string(),
            }),
        },
    );
    payments.fields.insert(
        "paid".to_string(),
        Field::Numerical {
            subtype: NumericalSubtype::Float,
        },
    );
    schema.tables.insert("payments".to_string(), payments);

    schema
}

/// The users/orders subset of [`users_orders_schema`], without payments.
pub fn users_orders_schema_flat() -> Schema {
    let mut schema = users_orders_schema();
    schema.tables.shift_remove("payments");
    schema
}

/// A parseable timestamp for test rows.
pub fn ts(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
}

/// `n` deterministic user rows with varied ages, plans, and flags.
pub fn users_table(n: usize) -> TableData {
    (0..n)
        .map(|i| {
            let mut row: Row = IndexMap::new();
            row.insert("id".to_string(), Value::Int(i as i64));
            row.insert("age".to_string(), Value::Int(20 + (i as i64 % 40)));
            let plan = if i % 3 == 0 { "free" } else { "pro" };
            row.insert("plan".to_string(), Value::String(plan.to_string()));
            row.insert("active".to_string(), Value::Bool(i % 4 != 0));
            row.insert(
                "signup_at".to_string(),
                Value::Timestamp(ts("2024-01-01 00:00:00") + chrono::Duration::days(i as i64)),
            );
            row
        })
        .collect()
}

/// Order rows with `per_user` children for each of `num_users` users.
pub fn orders_table(num_users: usize, per_user: usize) -> TableData {
    let mut rows = Vec::new();
    let mut next_id = 0i64;
    for user in 0..num_users {
        for k in 0..per_user {
            let mut row: Row = IndexMap::new();
            row.insert("id".to_string(), Value::Int(next_id));
            row.insert("user_id".to_string(), Value::Int(user as i64));
            row.insert(
                "amount".to_string(),
                Value::Float(10.0 + user as f64 * 5.0 + k as f64),
            );
            rows.push(row);
            next_id += 1;
        }
    }
    rows
}

/// Payment rows, one per order.
pub fn payments_table(num_orders: usize) -> TableData {
    (0..num_orders)
        .map(|i| {
            let mut row: Row = IndexMap::new();
            row.insert("id".to_string(), Value::Int(i as i64));
            row.insert("order_id".to_string(), Value::Int(i as i64));
            row.insert("paid".to_string(), Value::Float(9.99 + i as f64));
            row
        })
        .collect()
}

/// Complete three-table dataset matching [`users_orders_schema`].
pub fn users_orders_dataset(num_users: usize, orders_per_user: usize) -> Tables {
    let mut tables = Tables::new();
    tables.insert("users".to_string(), users_table(num_users));
    tables.insert(
        "orders".to_string(),
        orders_table(num_users, orders_per_user),
    );
    tables.insert(
        "payments".to_string(),
        payments_table(num_users * orders_per_user),
    );
    tables
}
