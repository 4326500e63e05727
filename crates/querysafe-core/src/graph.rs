use std::collections::{BTreeMap, BTreeSet, VecDeque};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::catalog::SchemaCatalog;

/// One foreign-key hop between two tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct JoinStep {
    pub from_table: String,
    pub from_columns: Vec<String>,
    pub to_table: String,
    pub to_columns: Vec<String>,
}

/// Shortest foreign-key path connecting two tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct JoinPath {
    pub from: String,
    pub to: String,
    pub steps: Vec<JoinStep>,
}

/// Edge in the undirected FK graph: (neighbor, owning table, fk index on owner).
type Edge = (usize, usize, usize);

/// Build join paths between every pair of the given tables.
///
/// Paths follow foreign keys in either direction and are the shortest
/// available; among equally short paths the one visiting earlier-declared
/// tables wins, so the result is deterministic for a snapshot. Unknown table
/// references and unconnected pairs are skipped.
pub fn join_paths(catalog: &SchemaCatalog, tables: &[String]) -> Vec<JoinPath> {
    let graph = build_adjacency(catalog);
    let mut indexes: Vec<usize> = Vec::new();
    for reference in tables {
        if let Some(idx) = catalog.position(reference) {
            if !indexes.contains(&idx) {
                indexes.push(idx);
            }
        }
    }

    let mut paths = Vec::new();
    for (i, &from) in indexes.iter().enumerate() {
        for &to in &indexes[i + 1..] {
            if let Some(edges) = shortest_path(&graph, from, to) {
                paths.push(JoinPath {
                    from: catalog.tables[from].qualified_name(),
                    to: catalog.tables[to].qualified_name(),
                    steps: edges
                        .into_iter()
                        .map(|(current, edge)| join_step(catalog, current, edge))
                        .collect(),
                });
            }
        }
    }

    paths
}

fn build_adjacency(catalog: &SchemaCatalog) -> BTreeMap<usize, BTreeSet<Edge>> {
    let mut graph: BTreeMap<usize, BTreeSet<Edge>> = BTreeMap::new();

    for (owner, table) in catalog.tables.iter().enumerate() {
        graph.entry(owner).or_default();

        for (fk_idx, fk) in table.foreign_keys.iter().enumerate() {
            let reference = format!("{}.{}", fk.referenced_schema, fk.referenced_table);
            let Some(target) = catalog.position(&reference) else {
                continue;
            };
            graph.entry(owner).or_default().insert((target, owner, fk_idx));
            graph.entry(target).or_default().insert((owner, owner, fk_idx));
        }
    }

    graph
}

fn shortest_path(
    graph: &BTreeMap<usize, BTreeSet<Edge>>,
    from: usize,
    to: usize,
) -> Option<Vec<(usize, Edge)>> {
    let mut previous: BTreeMap<usize, (usize, Edge)> = BTreeMap::new();
    let mut visited = BTreeSet::from([from]);
    let mut queue = VecDeque::from([from]);

    while let Some(node) = queue.pop_front() {
        if node == to {
            break;
        }
        for &edge in graph.get(&node).into_iter().flatten() {
            let neighbor = edge.0;
            if visited.insert(neighbor) {
                previous.insert(neighbor, (node, edge));
                queue.push_back(neighbor);
            }
        }
    }

    if !visited.contains(&to) {
        return None;
    }

    let mut hops = Vec::new();
    let mut cursor = to;
    while cursor != from {
        let (parent, edge) = previous.get(&cursor).copied()?;
        hops.push((parent, edge));
        cursor = parent;
    }
    hops.reverse();
    Some(hops)
}

fn join_step(catalog: &SchemaCatalog, current: usize, edge: Edge) -> JoinStep {
    let (neighbor, owner, fk_idx) = edge;
    let fk = &catalog.tables[owner].foreign_keys[fk_idx];
    let owner_name = catalog.tables[owner].qualified_name();
    let referenced_name = format!("{}.{}", fk.referenced_schema, fk.referenced_table);

    // Orient the hop in walking direction.
    if current == owner && neighbor != owner {
        JoinStep {
            from_table: owner_name,
            from_columns: fk.columns.clone(),
            to_table: referenced_name,
            to_columns: fk.referenced_columns.clone(),
        }
    } else {
        JoinStep {
            from_table: referenced_name,
            from_columns: fk.referenced_columns.clone(),
            to_table: owner_name,
            to_columns: fk.columns.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnDescriptor, ForeignKey, TableDescriptor, TableKind};

    fn table(name: &str, foreign_keys: Vec<ForeignKey>) -> TableDescriptor {
        TableDescriptor {
            schema: "public".to_string(),
            name: name.to_string(),
            kind: TableKind::Table,
            columns: vec![ColumnDescriptor {
                name: "id".to_string(),
                data_type: "integer".to_string(),
                is_nullable: false,
            }],
            foreign_keys,
        }
    }

    fn fk(column: &str, target: &str) -> ForeignKey {
        ForeignKey {
            name: None,
            columns: vec![column.to_string()],
            referenced_schema: "public".to_string(),
            referenced_table: target.to_string(),
            referenced_columns: vec!["id".to_string()],
        }
    }

    fn shop() -> SchemaCatalog {
        let mut catalog = SchemaCatalog::new("postgres", None);
        catalog.tables = vec![
            table("customers", Vec::new()),
            table("orders", vec![fk("customer_id", "customers")]),
            table(
                "order_details",
                vec![fk("order_id", "orders"), fk("product_id", "products")],
            ),
            table("products", vec![fk("category_id", "categories")]),
            table("categories", Vec::new()),
            table("suppliers", Vec::new()),
        ];
        catalog
    }

    #[test]
    fn direct_foreign_key_yields_single_step() {
        let paths = join_paths(&shop(), &["orders".to_string(), "customers".to_string()]);
        assert_eq!(paths.len(), 1);
        assert_eq!(
            paths[0].steps,
            vec![JoinStep {
                from_table: "public.orders".to_string(),
                from_columns: vec!["customer_id".to_string()],
                to_table: "public.customers".to_string(),
                to_columns: vec!["id".to_string()],
            }]
        );
    }

    #[test]
    fn multi_hop_path_walks_through_bridge_tables() {
        let paths = join_paths(&shop(), &["orders".to_string(), "categories".to_string()]);
        let tables: Vec<&str> = paths[0]
            .steps
            .iter()
            .map(|step| step.to_table.as_str())
            .collect();
        assert_eq!(
            tables,
            vec![
                "public.order_details",
                "public.products",
                "public.categories"
            ]
        );
        assert_eq!(paths[0].steps[0].from_columns, vec!["id".to_string()]);
        assert_eq!(paths[0].steps[0].to_columns, vec!["order_id".to_string()]);
    }

    #[test]
    fn unconnected_tables_are_skipped() {
        let paths = join_paths(&shop(), &["suppliers".to_string(), "customers".to_string()]);
        assert!(paths.is_empty());
    }
}
