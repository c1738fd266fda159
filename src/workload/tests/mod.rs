//! Workload 单元测试

use crate::runtime::error::RuntimeError;
use crate::util::config::RuntimeConfig;
use crate::workload::{run_chain, run_tree};

#[test]
fn test_chain_counts_every_step() {
    let report = run_chain(&RuntimeConfig::with_workers(2), 50).unwrap();
    assert_eq!(report.workload, "chain");
    assert_eq!(report.result, 50);
    assert!(report.is_correct());
    assert_eq!(report.tasks, 51);
    assert_eq!(report.stats.executed, 51);
}

#[test]
fn test_empty_chain() {
    let report = run_chain(&RuntimeConfig::with_workers(1), 0).unwrap();
    assert_eq!(report.result, 0);
    assert_eq!(report.stats.executed, 1);
}

#[test]
fn test_tree_counts_leaves() {
    let report = run_tree(&RuntimeConfig::with_workers(3), 3, 3).unwrap();
    assert_eq!(report.expected, 27);
    assert_eq!(report.result, 27);
    // 1 + 3 + 9 + 27 nodes plus the final task
    assert_eq!(report.tasks, 41);
    assert_eq!(report.stats.executed, 41);
}

#[test]
fn test_tree_too_large() {
    assert!(matches!(
        run_tree(&RuntimeConfig::with_workers(1), 64, 4),
        Err(RuntimeError::InvalidArgument(_))
    ));
}

#[test]
fn test_report_serializes() {
    let report = run_tree(&RuntimeConfig::with_workers(1), 1, 2).unwrap();
    let json = serde_json::to_string(&report).unwrap();
    assert!(json.contains("\"workload\":\"tree\""));
}
