//! Coordinator facade
//!
//! Owns the catalog, configuration and counters, and drives a query from
//! logical plan to result:
//!
//! 1. Global planning into execution blocks
//! 2. Rule-based global optimization
//! 3. Dispatch in dependency order
//! 4. Execution of each block on the in-process worker
//! 5. Reading back the terminal block's output

use std::fs;
use std::path::Path;
use std::sync::Arc;

use super::dispatch::ChannelDispatcher;
use super::errors::{CoordinatorError, CoordinatorResult};
use super::scheduler::QueryScheduler;
use super::worker::LocalWorker;
use crate::catalog::{Catalog, CatalogError, IndexDesc, MemCatalog, TableDesc, TableMeta, TableStats};
use crate::config::EngineConfig;
use crate::executor::{CancelSignal, IndexBinding, TaskContext};
use crate::index::{IndexSummary, TwoLevelIndexReader, TwoLevelIndexWriter};
use crate::logical::LogicalNode;
use crate::observability::{log_event_with_fields, Event, MetricsRegistry, ObservationScope};
use crate::planner::{
    ExplainPlan, GlobalOptimizer, GlobalPlanner, MasterPlan, PlannerResult, QueryId,
};
use crate::storage::{Fragment, RowAppender, RowReader};
use crate::tuple::{Schema, Tuple, TupleComparator};

/// Rows of a finished query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub query_id: QueryId,
    pub schema: Schema,
    pub rows: Vec<Tuple>,
}

pub struct QueryEngine {
    config: EngineConfig,
    catalog: Arc<dyn Catalog>,
    metrics: Arc<MetricsRegistry>,
}

impl QueryEngine {
    /// Engine over an empty in-memory catalog
    pub fn new(config: EngineConfig) -> Self {
        Self::with_catalog(config, Arc::new(MemCatalog::new()))
    }

    pub fn with_catalog(config: EngineConfig, catalog: Arc<dyn Catalog>) -> Self {
        Self {
            config,
            catalog,
            metrics: Arc::new(MetricsRegistry::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &dyn Catalog {
        self.catalog.as_ref()
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Executes a CREATE TABLE plan: registers the table and creates its
    /// (empty) data file when missing
    pub fn create_table(&self, plan: &LogicalNode) -> CoordinatorResult<TableDesc> {
        let create = match plan {
            LogicalNode::Root(root) => return self.create_table(&root.child),
            LogicalNode::CreateTable(create) => create,
            other => {
                return Err(CoordinatorError::InvalidRequest(format!(
                    "Expected CREATE TABLE, got {}",
                    other.kind_name()
                )))
            }
        };

        check_object_name("table", &create.table)?;
        let path = create
            .path
            .clone()
            .unwrap_or_else(|| self.config.table_path(&create.table));
        let desc = TableDesc::new(
            create.table.clone(),
            TableMeta::new(create.schema.clone(), create.store_type),
            path,
        );
        self.catalog.add_table(desc.clone())?;
        if !desc.path.exists() {
            RowAppender::create(&desc.path)?.close()?;
        }

        log_event_with_fields(
            Event::TableCreated,
            &[
                ("table", &desc.name),
                ("columns", &desc.meta.schema.len().to_string()),
                ("path", &desc.path.display().to_string()),
            ],
        );
        Ok(desc)
    }

    /// Replaces the rows of a table and refreshes its statistics.
    ///
    /// Rejected while the table has indexes, since their offsets would no
    /// longer point at the new rows.
    pub fn load_rows(&self, table: &str, rows: &[Tuple]) -> CoordinatorResult<u64> {
        let desc = self.catalog.get_table(table)?;
        if !self.catalog.indexes_of(table).is_empty() {
            return Err(CoordinatorError::InvalidRequest(format!(
                "Table {} has indexes; load rows before creating them",
                table
            )));
        }
        let width = desc.meta.schema.len();
        if let Some(bad) = rows.iter().find(|r| r.len() != width) {
            return Err(CoordinatorError::InvalidRequest(format!(
                "Row {} has {} values, table {} has {} columns",
                bad,
                bad.len(),
                table,
                width
            )));
        }

        let mut out = RowAppender::create(&desc.path)?;
        for row in rows {
            out.append(row)?;
        }
        let num_bytes = out.close()?;
        let num_rows = rows.len() as u64;
        self.catalog
            .update_stats(table, TableStats { num_rows, num_bytes })?;
        Ok(num_rows)
    }

    /// Builds a two-level index over one column of a table and registers it
    pub fn create_index(
        &self,
        name: &str,
        table: &str,
        column: &str,
        ascending: bool,
    ) -> CoordinatorResult<IndexSummary> {
        check_object_name("index", name)?;
        let table_desc = self.catalog.get_table(table)?;
        let mut desc = IndexDesc::new(name, table, column, self.config.index_path(name));
        if !ascending {
            desc = desc.descending();
        }
        if self.catalog.exists_index(name) {
            return Err(CatalogError::IndexExists(name.to_string()).into());
        }

        let schema = &table_desc.meta.schema;
        let position = schema.index_of(column).map_err(|_| {
            CatalogError::NoSuchColumn {
                table: table.to_string(),
                column: column.to_string(),
            }
        })?;
        let data_type = schema
            .column(position)
            .map(|c| c.data_type)
            .ok_or_else(|| CoordinatorError::InvalidRequest(format!("No column {}", column)))?;

        let key_schema = Schema::empty().with_column(column, data_type);
        let specs = vec![desc.sort_spec()];
        let comparator = TupleComparator::new(&key_schema, &specs)
            .map_err(|e| CoordinatorError::InvalidRequest(e.to_string()))?;

        let mut entries = Vec::new();
        let mut reader = RowReader::open(&table_desc.path)?;
        loop {
            let offset = reader.current_offset();
            match reader.read_next()? {
                Some(row) => entries.push((row.project(&[position]), offset)),
                None => break,
            }
        }
        entries.sort_by(|a, b| comparator.compare(&a.0, &b.0));

        let mut writer = TwoLevelIndexWriter::create(
            &desc.path,
            key_schema,
            specs,
            self.config.index_load_factor,
        )?
        .with_order_verification(self.config.verify_index_order);
        for (key, offset) in &entries {
            writer.write(key, *offset)?;
        }
        let summary = writer.close()?;

        self.catalog.add_index(desc)?;
        self.metrics.add_index_entries(summary.entry_count);
        log_event_with_fields(
            Event::IndexRegistered,
            &[("index", name), ("table", table), ("column", column)],
        );
        Ok(summary)
    }

    /// Global planning and optimization; a rejection is counted and logged
    pub fn plan_query(&self, root: &LogicalNode) -> CoordinatorResult<MasterPlan> {
        let query_id = QueryId::new();
        log_event_with_fields(Event::QueryReceived, &[("query_id", &query_id.to_string())]);

        match self.plan(query_id, root) {
            Ok(plan) => Ok(plan),
            Err(err) => {
                self.metrics.increment_queries_rejected();
                log_event_with_fields(
                    Event::QueryRejected,
                    &[
                        ("query_id", &query_id.to_string()),
                        ("code", err.code().code()),
                        ("reason", err.message()),
                    ],
                );
                Err(err.into())
            }
        }
    }

    /// Explain for the optimized plan, or for the rejection
    pub fn explain(&self, root: &LogicalNode) -> ExplainPlan {
        self.explain_with(GlobalPlanner::with_catalog(self.catalog.as_ref()), root)
    }

    /// Explain without consulting the catalog: scans are planned from the
    /// schemas and row hints carried in the plan itself
    pub fn explain_standalone(&self, root: &LogicalNode) -> ExplainPlan {
        self.explain_with(GlobalPlanner::new(), root)
    }

    fn explain_with(&self, planner: GlobalPlanner<'_>, root: &LogicalNode) -> ExplainPlan {
        log_event_with_fields(Event::ExplainBegin, &[]);
        let explain = match self.plan_with(&planner, QueryId::new(), root) {
            Ok(plan) => ExplainPlan::from_plan(&plan),
            Err(err) => ExplainPlan::from_error(&err),
        };
        log_event_with_fields(
            Event::ExplainComplete,
            &[("accepted", if explain.accepted { "true" } else { "false" })],
        );
        explain
    }

    /// Plans and runs a query on the in-process worker
    pub fn execute(&self, root: &LogicalNode) -> CoordinatorResult<QueryResult> {
        self.execute_with_cancel(root, CancelSignal::new())
    }

    /// Like `execute`, but every operator of every block watches `cancel`;
    /// cancelling it from another thread fails the running block with
    /// `TESSERA_EXEC_CANCELLED`
    pub fn execute_with_cancel(
        &self,
        root: &LogicalNode,
        cancel: CancelSignal,
    ) -> CoordinatorResult<QueryResult> {
        let plan = self.plan_query(root)?;
        let query_id = plan.query_id().to_string();
        let scope = ObservationScope::with_fields("QUERY_EXEC", &[("query_id", &query_id)]);

        match self.run_plan(&plan, cancel) {
            Ok(rows) => {
                scope.complete_with_fields(&[("rows", &rows.len().to_string())]);
                log_event_with_fields(
                    Event::QueryCompleted,
                    &[("query_id", &query_id), ("blocks", &plan.len().to_string())],
                );
                Ok(QueryResult {
                    query_id: plan.query_id(),
                    schema: plan.terminal().schema().clone(),
                    rows,
                })
            }
            Err(err) => {
                if err.is_fatal() {
                    scope.fail_fatal(&err.to_string());
                } else {
                    scope.fail(&err.to_string());
                }
                Err(err)
            }
        }
    }

    fn plan(&self, query_id: QueryId, root: &LogicalNode) -> PlannerResult<MasterPlan> {
        self.plan_with(&GlobalPlanner::with_catalog(self.catalog.as_ref()), query_id, root)
    }

    fn plan_with(
        &self,
        planner: &GlobalPlanner<'_>,
        query_id: QueryId,
        root: &LogicalNode,
    ) -> PlannerResult<MasterPlan> {
        let optimizer = GlobalOptimizer::new(
            self.config.optimizer_max_rewrites,
            self.config.broadcast_threshold_rows,
        );
        let (plan, rewrites) = optimizer.optimize_counted(planner.build(query_id, root)?)?;
        self.metrics.increment_plans_built();
        self.metrics.add_rewrites(rewrites as u64);
        Ok(plan)
    }

    /// Block outputs live under the query's work directory, which is removed
    /// whether or not the query succeeds
    fn run_plan(&self, plan: &MasterPlan, cancel: CancelSignal) -> CoordinatorResult<Vec<Tuple>> {
        let work_dir = self.config.query_dir(&plan.query_id().to_string());
        let rows = self.run_blocks(plan, &work_dir, cancel);
        let cleanup = if work_dir.exists() {
            fs::remove_dir_all(&work_dir)
        } else {
            Ok(())
        };
        let rows = rows?;
        cleanup?;
        Ok(rows)
    }

    fn run_blocks(
        &self,
        plan: &MasterPlan,
        work_dir: &Path,
        cancel: CancelSignal,
    ) -> CoordinatorResult<Vec<Tuple>> {
        let (dispatcher, queue) = ChannelDispatcher::new();
        let ctx = self.task_context(plan)?.with_cancel_signal(cancel);
        let mut worker = LocalWorker::new(queue, ctx, work_dir);
        let mut scheduler = QueryScheduler::new(plan, &dispatcher, Arc::clone(&self.metrics));

        while scheduler.submit_next()?.is_some() {
            worker.run_next()?;
        }

        let terminal = plan.terminal_id();
        let output = worker
            .output(terminal.seq)
            .ok_or_else(|| CoordinatorError::NotDispatched(terminal.clone()))?;
        Ok(RowReader::open(&output.fragment.path)?.read_all()?)
    }

    /// Data fragments and opened indexes of every table the plan scans
    fn task_context(&self, plan: &MasterPlan) -> CoordinatorResult<TaskContext> {
        let mut ctx = TaskContext::new(Arc::clone(&self.metrics));
        let mut tables: Vec<&str> = plan.blocks().flat_map(|b| b.scanned_tables()).collect();
        tables.sort_unstable();
        tables.dedup();

        for table in tables {
            let desc = self.catalog.get_table(table)?;
            let data = Fragment::new(table, &desc.path);
            ctx.add_table_fragment(table, data.clone());
            for index in self.catalog.indexes_of(table) {
                ctx.add_index(IndexBinding {
                    table: table.to_string(),
                    column: index.column.clone(),
                    data: data.clone(),
                    reader: Arc::new(TwoLevelIndexReader::open(&index.path)?),
                });
            }
        }
        Ok(ctx)
    }
}

/// Table and index names become file names under the data directory
fn check_object_name(kind: &str, name: &str) -> CoordinatorResult<()> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.chars().any(|c| c == '/' || c == '\\' || c == '\0');
    if bad {
        return Err(CoordinatorError::InvalidRequest(format!(
            "Invalid {} name: {:?}",
            kind, name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical::{Expr, JoinType};
    use crate::tuple::{DataType, Datum};
    use tempfile::TempDir;

    fn engine(dir: &TempDir) -> QueryEngine {
        QueryEngine::new(EngineConfig::new(dir.path()))
    }

    fn emp_schema() -> Schema {
        Schema::empty()
            .with_column("id", DataType::Int4)
            .with_column("dept_id", DataType::Int4)
    }

    #[test]
    fn test_create_table_registers_and_creates_file() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        let desc = engine
            .create_table(&LogicalNode::create_table("emp", emp_schema()))
            .unwrap();

        assert!(desc.path.exists());
        assert!(engine.catalog().exists_table("emp"));
        assert!(engine
            .create_table(&LogicalNode::create_table("emp", emp_schema()))
            .is_err());
        assert!(engine.create_table(&LogicalNode::scan_table("emp", &emp_schema())).is_err());
    }

    #[test]
    fn test_load_rows_updates_stats() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        engine
            .create_table(&LogicalNode::create_table("emp", emp_schema()))
            .unwrap();

        let rows: Vec<Tuple> = (0..5)
            .map(|i| Tuple::new(vec![Datum::Int4(i), Datum::Int4(i % 2)]))
            .collect();
        assert_eq!(engine.load_rows("emp", &rows).unwrap(), 5);
        assert_eq!(engine.catalog().get_table("emp").unwrap().row_count(), Some(5));

        let bad = vec![Tuple::new(vec![Datum::Int4(1)])];
        assert!(matches!(
            engine.load_rows("emp", &bad),
            Err(CoordinatorError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_rejected_query_counted() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        let err = engine
            .plan_query(&LogicalNode::create_table("emp", emp_schema()))
            .unwrap_err();

        assert!(matches!(err, CoordinatorError::Planning(_)));
        assert_eq!(engine.metrics().snapshot().queries_rejected, 1);
        assert!(!engine.explain(&LogicalNode::create_table("emp", emp_schema())).accepted);
    }

    #[test]
    fn test_unsafe_names_rejected() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        for name in ["../x", "a/b", "a\\b", "..", ""] {
            assert!(
                matches!(
                    engine.create_table(&LogicalNode::create_table(name, emp_schema())),
                    Err(CoordinatorError::InvalidRequest(_))
                ),
                "table {:?}",
                name
            );
        }
        assert!(!dir.path().parent().unwrap().join("x.rows").exists());

        engine
            .create_table(&LogicalNode::create_table("emp", emp_schema()))
            .unwrap();
        assert!(matches!(
            engine.create_index("../emp_id", "emp", "id", true),
            Err(CoordinatorError::InvalidRequest(_))
        ));
        assert!(!engine.catalog().exists_index("../emp_id"));
    }

    #[test]
    fn test_cancelled_query_fails() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        engine
            .create_table(&LogicalNode::create_table("emp", emp_schema()))
            .unwrap();
        let rows: Vec<Tuple> = (0..5)
            .map(|i| Tuple::new(vec![Datum::Int4(i), Datum::Int4(i % 2)]))
            .collect();
        engine.load_rows("emp", &rows).unwrap();
        let emp = LogicalNode::scan(&engine.catalog().get_table("emp").unwrap());
        let root = LogicalNode::root(emp.sort(vec![crate::tuple::SortSpec::desc("emp.id")]).unwrap());

        let cancel = CancelSignal::new();
        cancel.cancel();
        match engine.execute_with_cancel(&root, cancel) {
            Err(CoordinatorError::Execution { source, .. }) => {
                assert_eq!(source.code(), crate::executor::ExecutorErrorCode::TesseraExecCancelled)
            }
            other => panic!("expected cancellation, got ok={}", other.is_ok()),
        }
        assert_eq!(engine.metrics().snapshot().blocks_failed, 1);
        assert_eq!(engine.execute_with_cancel(&root, CancelSignal::new()).unwrap().rows.len(), 5);
    }

    #[test]
    fn test_explain_standalone_skips_catalog() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        let root = LogicalNode::root(LogicalNode::scan_table("emp", &emp_schema()));

        assert!(!engine.explain(&root).accepted);
        let explain = engine.explain_standalone(&root);
        assert!(explain.accepted, "{:?}", explain.rejection_reason);
    }

    #[test]
    fn test_execute_left_outer_join() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        engine
            .create_table(&LogicalNode::create_table("emp", emp_schema()))
            .unwrap();
        let dept_schema = Schema::empty()
            .with_column("id", DataType::Int4)
            .with_column("title", DataType::Text);
        engine
            .create_table(&LogicalNode::create_table("dept", dept_schema.clone()))
            .unwrap();
        engine
            .load_rows(
                "emp",
                &[
                    Tuple::new(vec![Datum::Int4(1), Datum::Int4(10)]),
                    Tuple::new(vec![Datum::Int4(2), Datum::Int4(99)]),
                ],
            )
            .unwrap();
        engine
            .load_rows("dept", &[Tuple::new(vec![Datum::Int4(10), Datum::text("eng")])])
            .unwrap();

        let emp = LogicalNode::scan(&engine.catalog().get_table("emp").unwrap());
        let dept = LogicalNode::scan(&engine.catalog().get_table("dept").unwrap());
        let root = LogicalNode::root(
            emp.join(
                dept,
                JoinType::LeftOuter,
                Some(Expr::col("emp.dept_id").eq(Expr::col("dept.id"))),
            )
            .project_columns(&["emp.id", "dept.title"])
            .unwrap(),
        );

        let result = engine.execute(&root).unwrap();
        assert_eq!(result.schema.len(), 2);
        assert_eq!(
            result.rows,
            vec![
                Tuple::new(vec![Datum::Int4(1), Datum::text("eng")]),
                Tuple::new(vec![Datum::Int4(2), Datum::Null]),
            ]
        );
        let snapshot = engine.metrics().snapshot();
        assert_eq!(snapshot.plans_built, 1);
        assert_eq!(snapshot.blocks_completed, snapshot.blocks_dispatched);
    }
}
