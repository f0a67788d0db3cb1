//! Integration tests for the Matrix model
//!
//! Shape invariants under random instance churn, record/read symmetry,
//! selective cloning and derivation against a previous poll.

use approx::assert_relative_eq;
use gleaner::{DataType, Matrix, Metric, Node, Property, Value, With};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

fn volumes(n: usize) -> Matrix {
    let mut m = Matrix::new("ZapiPerf", "volume", "volume");
    m.new_metric_f64("read_ops").unwrap();
    m.new_metric_i64("size").unwrap();
    m.new_metric_u8("state").unwrap();
    for i in 0..n {
        let key = format!("vol{}", i);
        m.new_instance(key.as_str()).unwrap().set_label("node", format!("n{}", i % 3));
        m.lazy_set_value("read_ops", &key, i as f64).unwrap();
        m.lazy_set_value("size", &key, (i * 1000) as i64).unwrap();
    }
    m
}

// ============================================================================
// Shape invariants
// ============================================================================

#[test]
fn test_random_churn_keeps_shape() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut m = volumes(20);
    let mut expected: HashMap<String, f64> = (0..20)
        .map(|i| (format!("vol{}", i), i as f64))
        .collect();
    let mut next = 20;

    for _ in 0..500 {
        if rng.gen_bool(0.5) && m.instance_count() > 0 {
            let keys = m.instance_keys();
            let victim = &keys[rng.gen_range(0..keys.len())];
            m.remove_instance(victim).unwrap();
            expected.remove(victim);
        } else {
            let key = format!("vol{}", next);
            next += 1;
            let value: f64 = rng.gen_range(0.0..1000.0);
            m.new_instance(key.as_str()).unwrap();
            m.lazy_set_value("read_ops", &key, value).unwrap();
            expected.insert(key, value);
        }
        assert!(m.is_consistent());
    }

    // survivors kept their values through every compaction
    for (key, value) in &expected {
        assert_eq!(m.lazy_value_f64("read_ops", key), Some(*value));
    }
    for metric in m.metrics().values() {
        assert_eq!(metric.len(), m.instance_count());
    }
}

#[test]
fn test_remove_metric_leaves_instances() {
    let mut m = volumes(5);
    m.remove_metric("size");
    assert_eq!(m.instance_count(), 5);
    assert!(m.is_consistent());

    m.remove_except_metric("read_ops");
    assert_eq!(m.metric_keys(), vec!["read_ops".to_string()]);
    assert_eq!(m.lazy_value_f64("read_ops", "vol4"), Some(4.0));
}

#[test]
fn test_purge_and_reset() {
    let mut m = volumes(4);
    m.reset_instance("vol1");
    assert_eq!(m.lazy_value_f64("read_ops", "vol1"), None);
    assert_eq!(m.lazy_value_f64("read_ops", "vol2"), Some(2.0));

    m.reset();
    assert!(m.metrics().values().all(|metric| metric.records().iter().all(|r| !r)));
    assert_eq!(m.instance_count(), 4);

    m.purge_instances();
    assert_eq!(m.instance_count(), 0);
    assert!(m.is_consistent());
}

// ============================================================================
// Record/read symmetry
// ============================================================================

#[test]
fn test_unrecorded_cells_read_as_none() {
    let mut m = volumes(3);
    // state was never written
    for key in m.instance_keys() {
        assert_eq!(m.lazy_value_i64("state", &key), None);
    }
    assert_eq!(m.lazy_value_i64("size", "vol2"), Some(2000));
    assert!(m.lazy_value_f64("missing", "vol0").is_none());
    assert!(m.lazy_set_value("read_ops", "nope", 1.0).is_err());
}

#[test]
fn test_set_then_read_per_type() {
    let mut m = Matrix::new("Rest", "disk", "disk");
    for (key, data_type) in [
        ("i32", DataType::Int32),
        ("i64", DataType::Int64),
        ("u8", DataType::Uint8),
        ("u32", DataType::Uint32),
        ("u64", DataType::Uint64),
        ("f32", DataType::Float32),
        ("f64", DataType::Float64),
    ] {
        m.new_metric(key, data_type).unwrap();
    }
    m.new_instance("d0").unwrap();
    for key in m.metric_keys() {
        m.lazy_set_value(&key, "d0", 42.0).unwrap();
        assert_eq!(m.lazy_value_i64(&key, "d0"), Some(42), "{}", key);
        assert!(m.metric(&key).unwrap().is_recorded(0usize));
    }

    let metric = m.metric_mut("u64").unwrap();
    metric.set_value_str(0usize, "17").unwrap();
    assert_eq!(metric.value(0usize), Some(Value::from(17u64)));
    assert!(metric.set_value_str(0usize, "x17").is_err());
}

#[test]
fn test_add_value_accumulates() {
    let mut m = volumes(2);
    m.lazy_add_value("read_ops", "vol1", 2.5).unwrap();
    m.lazy_add_value("read_ops", "vol1", 2.5).unwrap();
    assert_eq!(m.lazy_value_f64("read_ops", "vol1"), Some(6.0));

    // adding to an unrecorded cell starts from zero
    m.lazy_add_value("state", "vol0", 3u8).unwrap();
    assert_eq!(m.lazy_value_i64("state", "vol0"), Some(3));
}

// ============================================================================
// Cloning
// ============================================================================

#[test]
fn test_clone_all_is_idempotent() {
    let mut m = volumes(6);
    m.set_global_label("cluster", "c1");
    let once = m.clone_with(&With::all());
    let twice = once.clone_with(&With::all());
    assert_eq!(once, m);
    assert_eq!(twice, once);
}

#[test]
fn test_clone_without_data() {
    let m = volumes(3);
    let with = With {
        data: false,
        ..With::all()
    };
    let empty = m.clone_with(&with);
    assert_eq!(empty.instance_count(), 3);
    assert!(empty.is_consistent());
    assert_eq!(empty.lazy_value_f64("read_ops", "vol2"), None);
    assert_eq!(empty.instance("vol2").unwrap().label("node"), Some("n2"));
}

#[test]
fn test_clone_selected_metrics_and_labels() {
    let mut m = volumes(3);
    m.instance_mut("vol0").unwrap().set_label("svm", "vs0");
    let with = With {
        labels: Some(vec!["svm".to_string()]),
        metrics_names: Some(["size".to_string()].into_iter().collect()),
        export_instances: false,
        ..With::all()
    };
    let c = m.clone_with(&with);
    assert_eq!(c.metric_keys(), vec!["size".to_string()]);
    let vol0 = c.instance("vol0").unwrap();
    assert_eq!(vol0.label("svm"), Some("vs0"));
    assert_eq!(vol0.label("node"), None);
    assert!(!vol0.is_exportable());
    assert_eq!(c.lazy_value_i64("size", "vol1"), Some(1000));
}

#[test]
fn test_metrics_only_clone() {
    let m = volumes(3);
    let c = m.clone_with(&With::metrics_only());
    assert_eq!(c.instance_count(), 0);
    assert_eq!(c.metrics().len(), 3);
    assert!(c.is_consistent());
}

// ============================================================================
// Derivation against a previous poll
// ============================================================================

#[test]
fn test_delta_follows_instance_keys() {
    let prev = volumes(4);
    // same keys, different insertion order, one new instance
    let mut cur = Matrix::new("ZapiPerf", "volume", "volume");
    cur.new_metric_f64("read_ops").unwrap();
    for (key, value) in [("vol3", 10.0), ("new", 5.0), ("vol0", 1.0), ("vol1", 11.0)] {
        cur.new_instance(key).unwrap();
        cur.lazy_set_value("read_ops", key, value).unwrap();
    }

    let map = cur.index_map(&prev);
    assert_eq!(map.len(), 4);
    let (instances, ops) = cur.metric_with_instances("read_ops").unwrap();
    let skips = ops.delta(prev.metric("read_ops").unwrap(), &map).unwrap();
    assert_eq!(skips, 1);
    assert_eq!(ops.value_f64(&instances["vol3"]), Some(7.0));
    assert_eq!(ops.value_f64(&instances["vol1"]), Some(10.0));
    assert_eq!(ops.value_f64(&instances["vol0"]), Some(1.0));
    assert_eq!(ops.value_f64(&instances["new"]), None);
}

fn u64_counter(value: u64) -> Metric {
    let mut m = Metric::new("read_ops", DataType::Uint64, 1);
    m.set_value_u64(0usize, value).unwrap();
    m
}

#[test]
fn test_unsigned_counter_reset_stays_negative() {
    let prev = u64_counter(8);
    let mut cur = u64_counter(5);
    assert_eq!(cur.delta(&prev, &[Some(0)]).unwrap(), 0);
    assert!(cur.is_recorded(0usize));
    assert_eq!(cur.value_i64(0usize), Some(-3));
    assert_eq!(cur.value_f64(0usize), Some(-3.0));
    assert_eq!(cur.data_type(), DataType::Int64);
}

#[test]
fn test_unsigned_delta_is_exact_above_f64_precision() {
    let base = 1u64 << 53;
    let prev = u64_counter(base + 1);
    let mut cur = u64_counter(base + 3);
    cur.delta(&prev, &[Some(0)]).unwrap();
    assert_eq!(cur.value_u64(0usize), Some(2));
    assert_eq!(cur.data_type(), DataType::Uint64);

    let prev = u64_counter(u64::MAX - 10);
    let mut cur = u64_counter(u64::MAX);
    cur.delta(&prev, &[Some(0)]).unwrap();
    assert_eq!(cur.value_u64(0usize), Some(10));
}

#[test]
fn test_matrix_column_swap_is_checked() {
    let mut m = volumes(3);
    let ops = m.remove_metric("read_ops").unwrap();
    assert!(m.put_metric("short", Metric::new("short", DataType::Float64, 2)).is_err());
    m.put_metric("read_ops", ops).unwrap();
    assert_eq!(m.lazy_value_f64("read_ops", "vol2"), Some(2.0));

    m.retain_metrics(|key, _| key != "size");
    assert!(m.metric("size").is_none());
    assert!(m.is_consistent());
}

#[test]
fn test_divide_variants() {
    let mut m = Matrix::new("ZapiPerf", "volume", "volume");
    m.new_metric_f64("latency").unwrap();
    m.new_metric_f64("ops").unwrap();
    for (key, lat, ops) in [("a", 100.0, 20.0), ("b", 100.0, 5.0), ("c", 100.0, 0.0)] {
        m.new_instance(key).unwrap();
        m.lazy_set_value("latency", key, lat).unwrap();
        m.lazy_set_value("ops", key, ops).unwrap();
    }

    let ops = m.metric("ops").unwrap().clone();
    let mut plain = m.metric("latency").unwrap().clone();
    assert_eq!(plain.divide(&ops).unwrap(), 0);
    let mut gated = m.metric("latency").unwrap().clone();
    assert_eq!(gated.divide_with_threshold(&ops, 10.0).unwrap(), 2);

    let a = m.instance("a").unwrap();
    let c = m.instance("c").unwrap();
    assert_relative_eq!(plain.value_f64(a).unwrap(), 5.0);
    assert_eq!(plain.value_f64(c), Some(0.0));
    assert_relative_eq!(gated.value_f64(a).unwrap(), 5.0);
    assert_eq!(gated.value_f64(m.instance("b").unwrap()), None);
    assert_eq!(gated.value_f64(c), None);

    plain.set_property(Property::Percent);
    assert_eq!(plain.multiply_by_scalar(100.0), 0);
    assert_relative_eq!(plain.value_f64(a).unwrap(), 500.0);
}

// ============================================================================
// Parameter tree
// ============================================================================

#[test]
fn test_node_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("volume.yaml");
    std::fs::write(
        &path,
        "name: Volume\nobject: volume\nschedule:\n  - data: 3m\nplugins:\n  - MetricAgent:\n      compute_metric:\n        - a ADD b c\n",
    )
    .unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    let root = Node::from_yaml_str("template", &text).unwrap();
    assert_eq!(root.child_content("object"), Some("volume"));
    assert_eq!(root.path(&["schedule", "data"]).unwrap().content(), "3m");
    let agent = root.path(&["plugins", "MetricAgent", "compute_metric"]).unwrap();
    assert_eq!(agent.all_child_contents(), vec!["a ADD b c"]);
}
