//! Catalog contract
//!
//! The planners read table schemas, statistics, index registrations and
//! function signatures through the `Catalog` trait; `MemCatalog` is the in-process
//! implementation used by the coordinator and tests.

mod desc;
mod errors;
mod mem;

pub use desc::{
    FunctionDesc, FunctionKind, IndexDesc, IndexMethod, StoreType, TableDesc, TableMeta, TableStats,
};
pub use errors::{CatalogError, CatalogResult};
pub use mem::MemCatalog;

use crate::tuple::DataType;

/// Table, index and function registry.
///
/// Implementations must be safe to share between the coordinator and
/// worker threads.
pub trait Catalog: Send + Sync {
    /// Registers a table; fails on an empty or duplicate name
    fn add_table(&self, desc: TableDesc) -> CatalogResult<()>;

    fn get_table(&self, name: &str) -> CatalogResult<TableDesc>;

    fn exists_table(&self, name: &str) -> bool;

    /// Removes a table together with its indexes
    fn delete_table(&self, name: &str) -> CatalogResult<()>;

    /// Registered table names, sorted
    fn table_names(&self) -> Vec<String>;

    fn update_stats(&self, table: &str, stats: TableStats) -> CatalogResult<()>;

    /// Registers an index; the table and column must exist
    fn add_index(&self, desc: IndexDesc) -> CatalogResult<()>;

    fn get_index(&self, name: &str) -> CatalogResult<IndexDesc>;

    fn exists_index(&self, name: &str) -> bool;

    /// Whether any index covers `table.column`
    fn exists_index_on(&self, table: &str, column: &str) -> bool;

    fn delete_index(&self, name: &str) -> CatalogResult<()>;

    /// Indexes of a table, ordered by column then index name
    fn indexes_of(&self, table: &str) -> Vec<IndexDesc>;

    /// Registers a function overload; fails when the same name and
    /// argument types are already registered
    fn register_function(&self, desc: FunctionDesc) -> CatalogResult<()>;

    fn unregister_function(&self, name: &str, arg_types: &[DataType]) -> CatalogResult<()>;

    fn contains_function(&self, name: &str, arg_types: &[DataType]) -> bool;

    /// The overload of `name` taking exactly `arg_types`
    fn get_function(&self, name: &str, arg_types: &[DataType]) -> CatalogResult<FunctionDesc>;
}
