//! In-memory catalog

use std::collections::HashMap;
use std::sync::RwLock;

use super::desc::{signature, FunctionDesc, IndexDesc, TableDesc, TableStats};
use super::errors::{CatalogError, CatalogResult};
use super::Catalog;
use crate::tuple::DataType;

const ALL_TYPES: [DataType; 5] = [
    DataType::Bool,
    DataType::Int4,
    DataType::Int8,
    DataType::Float8,
    DataType::Text,
];
const NUMERIC_TYPES: [DataType; 3] = [DataType::Int4, DataType::Int8, DataType::Float8];

fn poisoned<T>(_: T) -> CatalogError {
    CatalogError::Internal("Lock poisoned".into())
}

/// Thread-safe catalog kept in memory
#[derive(Debug, Default)]
pub struct MemCatalog {
    tables: RwLock<HashMap<String, TableDesc>>,
    /// Indexes by index name
    indexes: RwLock<HashMap<String, IndexDesc>>,
    /// Overloads by upper-cased function name
    functions: RwLock<HashMap<String, Vec<FunctionDesc>>>,
}

impl MemCatalog {
    /// Catalog with the built-in aggregates registered
    pub fn new() -> Self {
        let mut functions: HashMap<String, Vec<FunctionDesc>> = HashMap::new();
        for desc in builtin_aggregates() {
            functions.entry(function_key(&desc.name)).or_default().push(desc);
        }
        Self {
            functions: RwLock::new(functions),
            ..Self::default()
        }
    }

    /// Catalog with no tables, indexes or functions
    pub fn empty() -> Self {
        Self::default()
    }
}

fn function_key(name: &str) -> String {
    name.trim().to_ascii_uppercase()
}

/// COUNT, SUM, MIN, MAX and AVG over every argument type they accept
fn builtin_aggregates() -> Vec<FunctionDesc> {
    let mut out = vec![FunctionDesc::aggregate("count", DataType::Int8, Vec::new())];
    for t in ALL_TYPES {
        out.push(FunctionDesc::aggregate("count", DataType::Int8, vec![t]));
        out.push(FunctionDesc::aggregate("min", t, vec![t]));
        out.push(FunctionDesc::aggregate("max", t, vec![t]));
    }
    for t in NUMERIC_TYPES {
        let sum_type = if t == DataType::Float8 { DataType::Float8 } else { DataType::Int8 };
        out.push(FunctionDesc::aggregate("sum", sum_type, vec![t]));
        out.push(FunctionDesc::aggregate("avg", DataType::Float8, vec![t]));
    }
    out
}

impl Catalog for MemCatalog {
    fn add_table(&self, desc: TableDesc) -> CatalogResult<()> {
        if desc.name.trim().is_empty() {
            return Err(CatalogError::EmptyTableName);
        }
        let mut tables = self.tables.write().map_err(poisoned)?;
        if tables.contains_key(&desc.name) {
            return Err(CatalogError::TableExists(desc.name));
        }
        tables.insert(desc.name.clone(), desc);
        Ok(())
    }

    fn get_table(&self, name: &str) -> CatalogResult<TableDesc> {
        let tables = self.tables.read().map_err(poisoned)?;
        tables
            .get(name)
            .cloned()
            .ok_or_else(|| CatalogError::NoSuchTable(name.to_string()))
    }

    fn exists_table(&self, name: &str) -> bool {
        self.tables
            .read()
            .map(|tables| tables.contains_key(name))
            .unwrap_or(false)
    }

    fn delete_table(&self, name: &str) -> CatalogResult<()> {
        {
            let mut tables = self.tables.write().map_err(poisoned)?;
            if tables.remove(name).is_none() {
                return Err(CatalogError::NoSuchTable(name.to_string()));
            }
        }
        let mut indexes = self.indexes.write().map_err(poisoned)?;
        indexes.retain(|_, idx| idx.table != name);
        Ok(())
    }

    fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tables
            .read()
            .map(|tables| tables.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    fn update_stats(&self, table: &str, stats: TableStats) -> CatalogResult<()> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        let desc = tables
            .get_mut(table)
            .ok_or_else(|| CatalogError::NoSuchTable(table.to_string()))?;
        desc.meta.stats = Some(stats);
        Ok(())
    }

    fn add_index(&self, desc: IndexDesc) -> CatalogResult<()> {
        if desc.name.trim().is_empty() {
            return Err(CatalogError::EmptyIndexName);
        }
        let table = self.get_table(&desc.table)?;
        if !table.meta.schema.contains(&desc.column) {
            return Err(CatalogError::NoSuchColumn {
                table: desc.table,
                column: desc.column,
            });
        }

        let mut indexes = self.indexes.write().map_err(poisoned)?;
        if indexes.contains_key(&desc.name) {
            return Err(CatalogError::IndexExists(desc.name));
        }
        indexes.insert(desc.name.clone(), desc);
        Ok(())
    }

    fn get_index(&self, name: &str) -> CatalogResult<IndexDesc> {
        let indexes = self.indexes.read().map_err(poisoned)?;
        indexes
            .get(name)
            .cloned()
            .ok_or_else(|| CatalogError::NoSuchIndex(name.to_string()))
    }

    fn exists_index(&self, name: &str) -> bool {
        self.indexes
            .read()
            .map(|indexes| indexes.contains_key(name))
            .unwrap_or(false)
    }

    fn exists_index_on(&self, table: &str, column: &str) -> bool {
        self.indexes
            .read()
            .map(|indexes| {
                indexes
                    .values()
                    .any(|idx| idx.table == table && idx.column == column)
            })
            .unwrap_or(false)
    }

    fn delete_index(&self, name: &str) -> CatalogResult<()> {
        let mut indexes = self.indexes.write().map_err(poisoned)?;
        indexes
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| CatalogError::NoSuchIndex(name.to_string()))
    }

    fn indexes_of(&self, table: &str) -> Vec<IndexDesc> {
        let mut found: Vec<IndexDesc> = self
            .indexes
            .read()
            .map(|indexes| {
                indexes
                    .values()
                    .filter(|idx| idx.table == table)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        found.sort_by(|a, b| a.column.cmp(&b.column).then_with(|| a.name.cmp(&b.name)));
        found
    }

    fn register_function(&self, desc: FunctionDesc) -> CatalogResult<()> {
        if desc.name.trim().is_empty() {
            return Err(CatalogError::EmptyFunctionName);
        }
        let mut functions = self.functions.write().map_err(poisoned)?;
        let overloads = functions.entry(function_key(&desc.name)).or_default();
        if overloads.iter().any(|f| f.arg_types == desc.arg_types) {
            return Err(CatalogError::FunctionExists(desc.signature()));
        }
        overloads.push(desc);
        Ok(())
    }

    fn unregister_function(&self, name: &str, arg_types: &[DataType]) -> CatalogResult<()> {
        let key = function_key(name);
        let mut functions = self.functions.write().map_err(poisoned)?;
        let overloads = functions
            .get_mut(&key)
            .ok_or_else(|| CatalogError::NoSuchFunction(signature(name, arg_types)))?;
        let before = overloads.len();
        overloads.retain(|f| f.arg_types != arg_types);
        if overloads.len() == before {
            return Err(CatalogError::NoSuchFunction(signature(name, arg_types)));
        }
        if overloads.is_empty() {
            functions.remove(&key);
        }
        Ok(())
    }

    fn contains_function(&self, name: &str, arg_types: &[DataType]) -> bool {
        self.get_function(name, arg_types).is_ok()
    }

    fn get_function(&self, name: &str, arg_types: &[DataType]) -> CatalogResult<FunctionDesc> {
        let functions = self.functions.read().map_err(poisoned)?;
        functions
            .get(&function_key(name))
            .and_then(|overloads| overloads.iter().find(|f| f.arg_types == arg_types))
            .cloned()
            .ok_or_else(|| CatalogError::NoSuchFunction(signature(name, arg_types)))
    }
}
