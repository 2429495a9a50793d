//! Structural validation of a schema and a dataset against it.
//!
//! Runs before any fitting. Checks reference integrity, primary-key
//! declarations, and acyclicity of the foreign-key graph (tables must form
//! a forest). Cycle detection builds a petgraph `DiGraph` with one edge per
//! foreign key, child pointing at parent, and topologically sorts it.

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

use crate::data::Tables;
use crate::error::{Result, SynthError};
use crate::schema::Schema;

pub fn validate(schema: &Schema, tables: &Tables) -> Result<()> {
    validate_structure(schema)?;
    validate_acyclic(schema)?;
    validate_data(schema, tables)
}

fn invalid(table: &str, message: impl Into<String>) -> SynthError {
    SynthError::SchemaValidation {
        table: table.to_string(),
        message: message.into(),
    }
}

fn validate_structure(schema: &Schema) -> Result<()> {
    for (name, decl) in &schema.tables {
        if decl.fields.is_empty() {
            return Err(invalid(name, "table declares no fields"));
        }

        if let Some(pk) = &decl.primary_key {
            let field = decl
                .fields
                .get(pk)
                .ok_or_else(|| invalid(name, format!("primary key '{}' is not a field", pk)))?;
            if !field.is_id() {
                return Err(invalid(
                    name,
                    format!("primary key '{}' must be an id field", pk),
                ));
            }
        }

        for (field_name, field) in &decl.fields {
            if let Some(r) = field.reference() {
                let parent = schema.tables.get(&r.table).ok_or_else(|| {
                    invalid(
                        name,
                        format!(
                            "foreign key '{}' references unknown table '{}'",
                            field_name, r.table
                        ),
                    )
                })?;
                match &parent.primary_key {
                    Some(pk) if *pk == r.field => {}
                    _ => {
                        return Err(invalid(
                            name,
                            format!(
                                "foreign key '{}' must reference the primary key of '{}'",
                                field_name, r.table
                            ),
                        ));
                    }
                }
            }
        }
    }

    // A table with children needs a primary key to join extensions on.
    for name in schema.tables.keys() {
        if !schema.children(name).is_empty() && schema.primary_key(name)?.is_none() {
            return Err(invalid(
                name,
                "table has child tables but declares no primary key",
            ));
        }
    }

    Ok(())
}

fn validate_acyclic(schema: &Schema) -> Result<()> {
    let mut graph: DiGraph<&str, ()> = DiGraph::new();
    let mut nodes: HashMap<&str, NodeIndex> = HashMap::new();

    for name in schema.tables.keys() {
        nodes.insert(name.as_str(), graph.add_node(name.as_str()));
    }

    for (name, decl) in &schema.tables {
        for field in decl.fields.values() {
            if let Some(r) = field.reference() {
                // child -> parent
                graph.add_edge(nodes[name.as_str()], nodes[r.table.as_str()], ());
            }
        }
    }

    match toposort(&graph, None) {
        Ok(_) => Ok(()),
        Err(cycle) => Err(SynthError::CyclicSchema {
            table: graph[cycle.node_id()].to_string(),
        }),
    }
}

fn validate_data(schema: &Schema, tables: &Tables) -> Result<()> {
    for (name, rows) in tables {
        let decl = schema
            .tables
            .get(name)
            .ok_or_else(|| invalid(name, "table data provided but not declared"))?;

        if let Some(first) = rows.first() {
            for field_name in decl.fields.keys() {
                if !first.contains_key(field_name) {
                    return Err(invalid(
                        name,
                        format!("declared field '{}' missing from table data", field_name),
                    ));
                }
            }
        }
    }
    Ok(())
}
