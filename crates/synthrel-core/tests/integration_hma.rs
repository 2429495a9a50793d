//! End-to-end fit and sample runs over small relational datasets.

use indexmap::IndexMap;
use synthrel_core::data::{Row, Tables, Value};
use synthrel_core::{Hma, SampleOptions, SynthError};
use synthrel_testutil::{
    users_orders_dataset, users_orders_schema, users_orders_schema_flat, users_table,
};

fn opts(num_rows: Option<usize>, seed: u64) -> SampleOptions {
    SampleOptions { num_rows, seed }
}

#[test]
fn sample_before_fit_fails() {
    let hma = Hma::new(users_orders_schema());
    let err = hma.sample(&SampleOptions::default()).unwrap_err();
    assert!(matches!(err, SynthError::NotFitted));
}

#[test]
fn fit_and_sample_full_dataset() {
    let mut hma = Hma::new(users_orders_schema());
    hma.fit(users_orders_dataset(12, 3)).unwrap();

    let sampled = hma.sample(&SampleOptions::default()).unwrap();
    assert_eq!(
        sampled.keys().collect::<Vec<_>>(),
        vec!["users", "orders", "payments"]
    );
    // Root size defaults to the fit-time size; no declared column is null
    // after finalization, so no user row is dropped.
    assert_eq!(sampled["users"].len(), 12);
    assert!(!sampled["orders"].is_empty());
}

#[test]
fn root_num_rows_is_exact() {
    let mut hma = Hma::new(users_orders_schema_flat());
    hma.fit(flat_dataset(10, 2)).unwrap();

    let sampled = hma
        .sample_table("users", false, &opts(Some(7), 42))
        .unwrap();
    assert_eq!(sampled["users"].len(), 7);

    let ids: Vec<&Value> = sampled["users"].iter().map(|r| &r["id"]).collect();
    let expected: Vec<Value> = (0..7).map(Value::Int).collect();
    assert_eq!(ids, expected.iter().collect::<Vec<_>>());
}

#[test]
fn sampling_is_deterministic_per_seed() {
    let mut hma = Hma::new(users_orders_schema());
    hma.fit(users_orders_dataset(8, 2)).unwrap();

    let a = hma.sample(&opts(None, 7)).unwrap();
    let b = hma.sample(&opts(None, 7)).unwrap();
    let c = hma.sample(&opts(None, 8)).unwrap();
    assert_eq!(a, b);
    assert_ne!(a, c);
}

#[test]
fn child_foreign_keys_point_at_sampled_parents() {
    let mut hma = Hma::new(users_orders_schema());
    hma.fit(users_orders_dataset(10, 2)).unwrap();

    let sampled = hma.sample(&opts(Some(10), 42)).unwrap();
    let user_ids: Vec<Value> = sampled["users"].iter().map(|r| r["id"].clone()).collect();
    for order in &sampled["orders"] {
        assert!(user_ids.contains(&order["user_id"]));
    }
    let order_ids: Vec<Value> = sampled["orders"].iter().map(|r| r["id"].clone()).collect();
    for payment in &sampled["payments"] {
        assert!(order_ids.contains(&payment["order_id"]));
    }
}

#[test]
fn child_counts_respect_fit_time_maximum() {
    // 2, 1, and 0 orders across three users; the largest fit-time group
    // caps how many child rows any one sampled parent can produce.
    let mut hma = Hma::new(users_orders_schema_flat());
    hma.fit(uneven_dataset()).unwrap();

    let sampled = hma.sample(&opts(None, 3)).unwrap();
    let mut per_user: IndexMap<String, usize> = IndexMap::new();
    for order in &sampled["orders"] {
        *per_user.entry(order["user_id"].group_key()).or_insert(0) += 1;
    }
    for (_, count) in per_user {
        assert!(count <= 2, "no sampled user may exceed the fit-time max");
    }
}

#[test]
fn declared_columns_round_trip_with_types() {
    let mut hma = Hma::new(users_orders_schema());
    hma.fit(users_orders_dataset(10, 2)).unwrap();

    let sampled = hma.sample(&opts(None, 42)).unwrap();
    for user in &sampled["users"] {
        assert_eq!(
            user.keys().collect::<Vec<_>>(),
            vec!["id", "age", "plan", "active", "signup_at"]
        );
        assert!(matches!(user["id"], Value::Int(_)));
        assert!(matches!(user["age"], Value::Int(_)));
        assert!(matches!(user["plan"], Value::String(_)));
        assert!(matches!(user["active"], Value::Bool(_)));
        assert!(matches!(user["signup_at"], Value::Timestamp(_)));
    }
    for order in &sampled["orders"] {
        assert_eq!(
            order.keys().collect::<Vec<_>>(),
            vec!["id", "user_id", "amount"]
        );
        assert!(matches!(order["amount"], Value::Float(_)));
    }
}

#[test]
fn sampled_categories_come_from_fit_data() {
    let mut hma = Hma::new(users_orders_schema());
    hma.fit(users_orders_dataset(20, 1)).unwrap();

    let sampled = hma.sample(&opts(Some(50), 42)).unwrap();
    for user in &sampled["users"] {
        match &user["plan"] {
            Value::String(plan) => assert!(plan == "free" || plan == "pro"),
            other => panic!("unexpected plan value {:?}", other),
        }
    }
}

#[test]
fn lone_child_sample_reconstructs_foreign_key() {
    let mut hma = Hma::new(users_orders_schema_flat());
    hma.fit(flat_dataset(10, 2)).unwrap();

    // No users are sampled, so the user_id column has to be rebuilt from
    // synthesized parent candidates.
    let sampled = hma.sample_table("orders", false, &opts(None, 42)).unwrap();
    assert!(!sampled.contains_key("users"));
    for order in &sampled["orders"] {
        assert!(matches!(order["user_id"], Value::Int(_)));
    }
}

#[test]
fn refit_replaces_previous_state() {
    let mut hma = Hma::new(users_orders_schema_flat());
    hma.fit(flat_dataset(5, 1)).unwrap();
    hma.fit(flat_dataset(9, 1)).unwrap();

    let sampled = hma.sample(&opts(None, 42)).unwrap();
    assert_eq!(sampled["users"].len(), 9);
}

#[test]
fn fit_rejects_cyclic_schema() {
    use synthrel_core::schema::{Field, FieldRef, IdSubtype, Schema, TableSchema};

    let mut schema = Schema::new();
    for (name, other) in [("a", "b"), ("b", "a")] {
        let mut table = TableSchema::new();
        table.primary_key = Some("id".to_string());
        table.fields.insert(
            "id".to_string(),
            Field::Id {
                subtype: IdSubtype::Integer,
                reference: None,
            },
        );
        table.fields.insert(
            format!("{}_id", other),
            Field::Id {
                subtype: IdSubtype::Integer,
                reference: Some(FieldRef {
                    table: other.to_string(),
                    field: "id".to_string(),
                }),
            },
        );
        schema.tables.insert(name.to_string(), table);
    }

    let mut hma = Hma::new(schema);
    let err = hma.fit(Tables::new()).unwrap_err();
    assert!(matches!(err, SynthError::CyclicSchema { .. }));
}

/// users + orders only, matching [`users_orders_schema_flat`].
fn flat_dataset(num_users: usize, orders_per_user: usize) -> Tables {
    let mut tables = users_orders_dataset(num_users, orders_per_user);
    tables.shift_remove("payments");
    tables
}

/// Three users with 2, 1, and 0 orders respectively.
fn uneven_dataset() -> Tables {
    let mut tables = Tables::new();
    tables.insert("users".to_string(), users_table(3));

    let mut orders = Vec::new();
    for (id, user) in [(0i64, 0i64), (1, 0), (2, 1)] {
        let mut row: Row = IndexMap::new();
        row.insert("id".to_string(), Value::Int(id));
        row.insert("user_id".to_string(), Value::Int(user));
        row.insert("amount".to_string(), Value::Float(5.0 + id as f64));
        orders.push(row);
    }
    tables.insert("orders".to_string(), orders);
    tables
}
