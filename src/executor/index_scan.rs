//! Index-accelerated scan
//!
//! Resolves data offsets through a two-level index when initialized, then
//! reads each row with a seek into the indexed row file.

use std::ops::Bound;
use std::sync::Arc;

use super::context::{CancelSignal, TaskContext};
use super::errors::{ExecutorError, ExecutorResult};
use super::exec::{PhysicalExec, Scanner};
use crate::index::TwoLevelIndexReader;
use crate::logical::Expr;
use crate::observability::MetricsRegistry;
use crate::storage::{Fragment, RowReader};
use crate::tuple::{Schema, Tuple};

/// Which index entries a scan visits
#[derive(Debug, Clone, PartialEq)]
pub enum IndexLookup {
    Eq(Tuple),
    /// Bounds in index order
    Range {
        lower: Bound<Tuple>,
        upper: Bound<Tuple>,
    },
}

/// Reads the rows an index lookup points at, in index order.
///
/// Neither projectable nor selectable: the physical planner wraps it with
/// filter and project operators, and the full scan predicate is re-checked
/// above it.
pub struct IndexScanExec {
    schema: Schema,
    data: Fragment,
    index: Arc<TwoLevelIndexReader>,
    lookup: IndexLookup,
    offsets: Vec<u64>,
    position: usize,
    rows: Option<RowReader>,
    cancel: CancelSignal,
    metrics: Arc<MetricsRegistry>,
}

impl IndexScanExec {
    pub fn new(
        schema: Schema,
        data: Fragment,
        index: Arc<TwoLevelIndexReader>,
        lookup: IndexLookup,
        ctx: &TaskContext,
    ) -> Self {
        Self {
            schema,
            data,
            index,
            lookup,
            offsets: Vec::new(),
            position: 0,
            rows: None,
            cancel: ctx.cancel_signal().clone(),
            metrics: Arc::clone(ctx.metrics()),
        }
    }

    pub fn lookup(&self) -> &IndexLookup {
        &self.lookup
    }

    /// Offsets resolved by `init`
    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }
}

impl PhysicalExec for IndexScanExec {
    fn name(&self) -> &'static str {
        "IndexScan"
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn init(&mut self) -> ExecutorResult<()> {
        let scan = match &self.lookup {
            IndexLookup::Eq(key) => self.index.scan_eq(key)?,
            IndexLookup::Range { lower, upper } => {
                self.index.scan_bounds(lower.as_ref(), upper.as_ref())?
            }
        };
        self.offsets = scan.collect_offsets()?;
        self.metrics.increment_index_lookups();
        self.position = 0;
        self.rows = Some(RowReader::open(&self.data.path)?);
        Ok(())
    }

    fn next(&mut self) -> ExecutorResult<Option<Tuple>> {
        self.cancel.check()?;

        let offset = match self.offsets.get(self.position) {
            Some(offset) => *offset,
            None => return Ok(None),
        };
        let rows = self
            .rows
            .as_mut()
            .ok_or_else(|| ExecutorError::invalid_plan("Index scan used before init"))?;
        let row = rows.read_at(offset)?;
        self.position += 1;
        self.metrics.increment_tuples_scanned();
        Ok(Some(row))
    }

    fn reset(&mut self) -> ExecutorResult<()> {
        self.position = 0;
        Ok(())
    }

    fn close(&mut self) -> ExecutorResult<()> {
        self.rows = None;
        Ok(())
    }
}

impl Scanner for IndexScanExec {
    fn is_projectable(&self) -> bool {
        false
    }

    fn set_target(&mut self, _columns: &[String]) -> ExecutorResult<()> {
        Err(ExecutorError::invalid_plan("Index scan does not project"))
    }

    fn is_selectable(&self) -> bool {
        false
    }

    fn set_search_condition(&mut self, _predicate: &Expr) -> ExecutorResult<()> {
        Err(ExecutorError::invalid_plan("Index scan does not filter"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::collect_rows;
    use crate::index::TwoLevelIndexWriter;
    use crate::storage::RowAppender;
    use crate::tuple::{DataType, Datum, SortSpec};
    use tempfile::TempDir;

    fn key(v: i32) -> Tuple {
        Tuple::new(vec![Datum::Int4(v)])
    }

    /// 40 rows with `dept = id % 4`, indexed on dept
    fn setup(dir: &TempDir) -> (Fragment, Arc<TwoLevelIndexReader>) {
        let data_path = dir.path().join("emp.rows");
        let mut out = RowAppender::create(&data_path).unwrap();
        let mut entries = Vec::new();
        for id in 0..40 {
            let row = Tuple::new(vec![Datum::Int4(id), Datum::Int4(id % 4)]);
            let offset = out.append(&row).unwrap();
            entries.push((id % 4, offset));
        }
        out.close().unwrap();
        entries.sort_by_key(|(dept, _)| *dept);

        let index_path = dir.path().join("emp_dept.idx");
        let mut writer = TwoLevelIndexWriter::create(
            &index_path,
            Schema::empty().with_column("dept", DataType::Int4),
            vec![SortSpec::asc("dept")],
            8,
        )
        .unwrap();
        for (dept, offset) in entries {
            writer.write(&key(dept), offset).unwrap();
        }
        writer.close().unwrap();

        (
            Fragment::new("emp", data_path),
            Arc::new(TwoLevelIndexReader::open(&index_path).unwrap()),
        )
    }

    fn schema() -> Schema {
        Schema::empty()
            .with_column("emp.id", DataType::Int4)
            .with_column("emp.dept", DataType::Int4)
    }

    #[test]
    fn test_equality_lookup_reads_matching_rows() {
        let dir = TempDir::new().unwrap();
        let (data, index) = setup(&dir);
        let ctx = TaskContext::new(Arc::new(MetricsRegistry::new()));

        let mut scan = IndexScanExec::new(schema(), data, index, IndexLookup::Eq(key(3)), &ctx);
        let rows = collect_rows(&mut scan).unwrap();

        assert_eq!(rows.len(), 10);
        assert!(rows.iter().all(|r| r.get(1) == Some(&Datum::Int4(3))));
        assert_eq!(ctx.metrics().snapshot().index_lookups, 1);
    }

    #[test]
    fn test_range_lookup_in_key_order() {
        let dir = TempDir::new().unwrap();
        let (data, index) = setup(&dir);
        let ctx = TaskContext::new(Arc::new(MetricsRegistry::new()));

        let lookup = IndexLookup::Range {
            lower: Bound::Excluded(key(0)),
            upper: Bound::Included(key(2)),
        };
        let mut scan = IndexScanExec::new(schema(), data, index, lookup, &ctx);
        let depts: Vec<i64> = collect_rows(&mut scan)
            .unwrap()
            .iter()
            .map(|r| r.get(1).unwrap().as_i64().unwrap())
            .collect();

        assert_eq!(depts.len(), 20);
        assert!(depts.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(depts[0], 1);
    }

    #[test]
    fn test_rejects_target_and_condition() {
        let dir = TempDir::new().unwrap();
        let (data, index) = setup(&dir);
        let ctx = TaskContext::new(Arc::new(MetricsRegistry::new()));
        let mut scan = IndexScanExec::new(schema(), data, index, IndexLookup::Eq(key(1)), &ctx);

        assert!(!scan.is_projectable());
        assert!(!scan.is_selectable());
        assert!(scan.set_target(&["emp.id".to_string()]).is_err());
        assert!(scan.set_search_condition(&Expr::lit(true)).is_err());
    }
}
