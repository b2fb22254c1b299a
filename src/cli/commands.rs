//! CLI command implementations

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use serde_json::json;

use crate::config::EngineConfig;
use crate::coordinator::QueryEngine;
use crate::index::TwoLevelIndexReader;
use crate::logical::decode_plan;
use crate::planner::ExplainPlan;

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::{write_response, write_text};

/// Main CLI entry point; the only function main.rs calls
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Explain { config, plan, json } => explain(&config, &plan, json),
        Command::IndexInfo { index, json } => index_info(&index, json),
    }
}

/// Plans and optimizes the plan file, then prints its blocks in dispatch
/// order. No catalog is loaded, so scans are taken at the schemas the file
/// declares.
///
/// A rejected plan is still printed; the command then fails with the
/// rejection code.
pub fn explain(config_path: &Path, plan_path: &Path, as_json: bool) -> CliResult<()> {
    let config = EngineConfig::load(config_path)?;
    let root = decode_plan(&fs::read_to_string(plan_path)?)?;

    let engine = QueryEngine::new(config);
    let explain = engine.explain_standalone(&root);

    if as_json {
        write_response(serde_json::to_value(&explain)?)?;
    } else {
        write_text(&explain.to_string())?;
    }

    rejection(&explain)
}

fn rejection(explain: &ExplainPlan) -> CliResult<()> {
    if explain.accepted {
        return Ok(());
    }
    Err(CliError::rejected(format!(
        "{}: {}",
        explain.rejection_code.as_deref().unwrap_or("UNKNOWN"),
        explain.rejection_reason.as_deref().unwrap_or("")
    )))
}

pub fn index_info(index_path: &Path, as_json: bool) -> CliResult<()> {
    let reader = TwoLevelIndexReader::open(index_path)?;
    if as_json {
        write_response(index_info_json(&reader))
    } else {
        write_text(&render_index_info(&reader))
    }
}

/// Text form of an index header
pub fn render_index_info(reader: &TwoLevelIndexReader) -> String {
    let header = reader.header();
    let mut out = String::new();
    let _ = writeln!(out, "index:        {}", reader.path().display());
    let _ = writeln!(out, "entries:      {}", header.entry_count);
    let _ = writeln!(out, "load factor:  {}", header.load_factor);
    let _ = writeln!(out, "top entries:  {}", header.top_count);
    let _ = writeln!(out, "top bytes:    {}", header.top_len);
    let _ = writeln!(out, "bottom bytes: {}", header.bottom_len);
    let _ = writeln!(out, "key schema:   {}", header.key_schema);
    for spec in &header.sort_specs {
        let _ = writeln!(
            out,
            "sort:         {} {} nulls {}",
            spec.column,
            if spec.ascending { "ASC" } else { "DESC" },
            if spec.nulls_first { "first" } else { "last" }
        );
    }
    out
}

/// JSON form of an index header
pub fn index_info_json(reader: &TwoLevelIndexReader) -> serde_json::Value {
    let header = reader.header();
    json!({
        "path": reader.path().display().to_string(),
        "entry_count": header.entry_count,
        "load_factor": header.load_factor,
        "top_count": header.top_count,
        "key_schema": header.key_schema.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::TwoLevelIndexWriter;
    use crate::logical::{encode_plan, LogicalNode};
    use crate::tuple::{DataType, Datum, Schema, SortSpec, Tuple};
    use tempfile::TempDir;

    fn write_config(dir: &TempDir) -> std::path::PathBuf {
        let path = dir.path().join("tessera.json");
        let body = json!({ "data_dir": dir.path().join("data") });
        fs::write(&path, body.to_string()).unwrap();
        path
    }

    #[test]
    fn test_explain_accepts_plan_file() {
        let dir = TempDir::new().unwrap();
        let config = write_config(&dir);
        let schema = Schema::empty().with_column("id", DataType::Int4);
        let root = LogicalNode::root(LogicalNode::scan_table("t", &schema));
        let plan = dir.path().join("plan.json");
        fs::write(&plan, encode_plan(&root).unwrap()).unwrap();

        explain(&config, &plan, true).unwrap();
    }

    #[test]
    fn test_explain_accepts_join_plan() {
        let dir = TempDir::new().unwrap();
        let config = write_config(&dir);
        let emp = LogicalNode::scan_table("emp", &Schema::empty().with_column("dept_id", DataType::Int4));
        let dept = LogicalNode::scan_table("dept", &Schema::empty().with_column("id", DataType::Int4));
        let root = LogicalNode::root(
            emp.inner_join(dept, crate::logical::Expr::col("emp.dept_id").eq(crate::logical::Expr::col("dept.id"))),
        );
        let plan = dir.path().join("plan.json");
        fs::write(&plan, encode_plan(&root).unwrap()).unwrap();

        explain(&config, &plan, false).unwrap();
    }

    #[test]
    fn test_explain_rejects_missing_root() {
        let dir = TempDir::new().unwrap();
        let config = write_config(&dir);
        let schema = Schema::empty().with_column("id", DataType::Int4);
        let plan = dir.path().join("plan.json");
        fs::write(&plan, encode_plan(&LogicalNode::scan_table("t", &schema)).unwrap()).unwrap();

        let err = explain(&config, &plan, false).unwrap_err();
        assert_eq!(err.code_str(), "TESSERA_CLI_REJECTED");
    }

    #[test]
    fn test_explain_bad_plan_file() {
        let dir = TempDir::new().unwrap();
        let config = write_config(&dir);
        let plan = dir.path().join("plan.json");
        fs::write(&plan, "{ not json").unwrap();

        let err = explain(&config, &plan, false).unwrap_err();
        assert_eq!(err.code_str(), "TESSERA_CLI_PLAN_ERROR");
    }

    #[test]
    fn test_index_info_renders_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("k.idx");
        let key_schema = Schema::empty().with_column("k", DataType::Int8);
        let specs = vec![SortSpec::new("k", true, false)];
        let mut writer = TwoLevelIndexWriter::create(&path, key_schema, specs, 4).unwrap();
        for (offset, k) in (0..10i64).enumerate() {
            writer
                .write(&Tuple::new(vec![Datum::Int8(k)]), offset as u64 * 16)
                .unwrap();
        }
        writer.close().unwrap();

        let reader = TwoLevelIndexReader::open(&path).unwrap();
        let text = render_index_info(&reader);
        assert!(text.contains("entries:      10"));
        assert!(text.contains("top entries:  3"));
        assert!(text.contains("sort:         k ASC nulls last"));
        assert_eq!(index_info_json(&reader)["entry_count"], 10);
        index_info(&path, true).unwrap();
    }

    #[test]
    fn test_index_info_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = index_info(&dir.path().join("none.idx"), false).unwrap_err();
        assert_eq!(err.code_str(), "TESSERA_CLI_INDEX_ERROR");
    }
}
