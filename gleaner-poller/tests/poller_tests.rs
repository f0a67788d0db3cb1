// Gleaner Poller - Integration Tests
//
// Full poll cycles:
// 1. Replay through perf engine and plugin chain
// 2. Timeouts and cache retention
// 3. Runtime with file output

use gleaner::{Matrix, Node, Property, TIMESTAMP_METRIC};
use gleaner_perf::{CounterMeta, CounterSchema, PerfConfig, PerfEngine};
use gleaner_plugins::{PluginChain, Registry, Remote};
use gleaner_poller::{
    build_task, run, Collector, FetchFuture, JsonLinesExporter, ObjectConfig, Output,
    PollTask, PollerConfig, PollerError,
};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const DATASET: &str = "\
poll,timestamp,instance,metric,value,labels
1,0,vol0,total_ops,1000,node=n1
1,0,vol1,total_ops,2000,node=n1
1,0,vol2,total_ops,500,node=n2
2,60,vol0,total_ops,4000,
2,60,vol1,total_ops,8000,
2,60,vol2,total_ops,500,
3,120,vol0,total_ops,4600,
3,120,vol1,total_ops,8000,
3,120,vol2,total_ops,1100,
";

const COUNTERS: &str = "- name: total_ops\n  type: rate\n  unit: per_sec\n";

fn write(dir: &Path, name: &str, content: &str) {
    let mut f = std::fs::File::create(dir.join(name)).unwrap();
    f.write_all(content.as_bytes()).unwrap();
}

fn volume_object(dir: &Path) -> ObjectConfig {
    write(dir, "volume.csv", DATASET);
    write(dir, "counters.yaml", COUNTERS);
    let plugins = Node::from_yaml_str("plugins", "- Aggregator:\n    - node\n").unwrap();
    ObjectConfig::new("volume")
        .with_csv(dir.join("volume.csv"))
        .with_counters(dir.join("counters.yaml"))
        .with_plugins(plugins)
}

fn find<'a>(matrices: &'a [Matrix], object: &str) -> &'a Matrix {
    matrices.iter().find(|m| m.object == object).unwrap()
}

// ============================================================================
// Replay through perf engine and plugin chain
// ============================================================================

#[tokio::test]
async fn test_replay_perf_and_aggregation() {
    let dir = tempfile::tempdir().unwrap();
    let poller = PollerConfig::default();
    let object = volume_object(dir.path());
    let mut task = build_task(&poller, &object, Registry::global(), &Output::Log).unwrap();

    // first poll only primes the perf cache
    let first = task.poll_once().await.unwrap();
    assert!(first.matrices.is_empty());
    assert_eq!(first.exported, 0);

    let second = task.poll_once().await.unwrap();
    let volume = find(&second.matrices, "volume");
    assert_eq!(volume.lazy_value_f64("total_ops", "vol0"), Some(50.0));
    assert_eq!(volume.lazy_value_f64("total_ops", "vol1"), Some(100.0));
    assert_eq!(volume.lazy_value_f64("total_ops", "vol2"), Some(0.0));
    assert_eq!(volume.global_labels().get("datacenter").map(String::as_str), Some("gleaner"));

    let node = find(&second.matrices, "node_volume");
    assert_eq!(node.lazy_value_f64("total_ops", "n1"), Some(150.0));
    assert_eq!(node.lazy_value_f64("total_ops", "n2"), Some(0.0));

    // 3 volumes + 2 nodes
    assert_eq!(second.exported, 5);

    let third = task.poll_once().await.unwrap();
    let node = find(&third.matrices, "node_volume");
    assert_eq!(node.lazy_value_f64("total_ops", "n1"), Some(10.0));
    assert_eq!(node.lazy_value_f64("total_ops", "n2"), Some(10.0));
    assert_eq!(task.stats().polls, 3);
}

// ============================================================================
// Timeouts and cache retention
// ============================================================================

/// Serves `ops = 100 * poll` at `timestamp = 10 * poll`; sleeps while `slow` is set
struct Counting {
    polls: u32,
    slow: Arc<AtomicBool>,
}

impl Collector for Counting {
    fn name(&self) -> &str {
        "Counting"
    }

    fn object(&self) -> &str {
        "volume"
    }

    fn fetch(&mut self) -> FetchFuture<'_> {
        Box::pin(async move {
            self.polls += 1;
            if self.slow.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            let mut m = Matrix::new("Counting", "volume", "volume");
            m.new_metric_f64("ops")?.set_property(Property::Delta);
            let ts = m.new_metric_f64(TIMESTAMP_METRIC)?;
            ts.set_property(Property::Raw);
            ts.set_exportable(false);
            m.new_instance("v1")?;
            m.lazy_set_value("ops", "v1", 100.0 * self.polls as f64)?;
            m.lazy_set_value(TIMESTAMP_METRIC, "v1", 10.0 * self.polls as f64)?;
            Ok::<_, PollerError>(m)
        })
    }
}

fn counting_task(slow: Arc<AtomicBool>) -> PollTask {
    let mut schema = CounterSchema::new();
    schema.insert(CounterMeta::new("ops", Property::Delta));
    let engine = PerfEngine::new("volume", schema, PerfConfig::default());
    PollTask::new(Box::new(Counting { polls: 0, slow }), Duration::from_millis(50))
        .with_perf(engine)
        .with_exporter(Box::new(JsonLinesExporter::new(Vec::new())))
}

#[tokio::test]
async fn test_timeout_keeps_perf_cache() {
    let slow = Arc::new(AtomicBool::new(false));
    let mut task = counting_task(slow.clone());

    task.poll_once().await.unwrap();
    assert!(task.perf().unwrap().has_previous());

    slow.store(true, Ordering::SeqCst);
    let err = task.poll_once().await.unwrap_err();
    assert!(matches!(err, PollerError::Timeout { .. }));
    assert!(task.perf().unwrap().has_previous());

    // the third fetch serves 300; diffed against the first poll's 100
    slow.store(false, Ordering::SeqCst);
    let out = task.poll_once().await.unwrap();
    assert_eq!(find(&out.matrices, "volume").lazy_value_f64("ops", "v1"), Some(200.0));

    let stats = task.stats();
    assert_eq!(stats.polls, 3);
    assert_eq!(stats.timeouts, 1);
    assert_eq!(stats.exported, 1);
}

#[tokio::test]
async fn test_failing_plugin_still_publishes() {
    let slow = Arc::new(AtomicBool::new(false));
    // bound to an object the poll does not produce, so every run fails
    let plugins = Node::from_yaml_str(
        "plugins",
        "- MetricAgent:\n    compute_metric:\n      - double MULTIPLY ops 2\n",
    )
    .unwrap();
    let chain = PluginChain::build(
        Registry::global(),
        "Counting",
        "qtree",
        &plugins,
        &Node::new("qtree"),
        &Remote::default(),
    );
    assert_eq!(chain.len(), 1);

    let mut task = counting_task(slow).with_chain(chain);
    task.poll_once().await.unwrap();
    let out = task.poll_once().await.unwrap();
    assert_eq!(out.exported, 1);
    assert_eq!(task.stats().plugin_errors, 1);
}

// ============================================================================
// Runtime with file output
// ============================================================================

#[tokio::test]
async fn test_run_writes_json_lines() {
    let dir = tempfile::tempdir().unwrap();
    let out_dir = dir.path().join("out");
    let config = PollerConfig::default()
        .with_poll_interval(Duration::from_millis(10))
        .with_object(volume_object(dir.path()));

    let finished = run(config, Output::Directory(out_dir.clone()), Some(2))
        .await
        .unwrap();
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].0, "volume");
    assert_eq!(finished[0].1.polls, 2);

    let text = std::fs::read_to_string(out_dir.join("volume.jsonl")).unwrap();
    let points: Vec<serde_json::Value> = text
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(points.len(), 5);
    assert!(points
        .iter()
        .any(|p| p["object"] == "node_volume" && p["value"] == 150.0));
    assert!(points.iter().all(|p| p["labels"]["datacenter"] == "gleaner"));
}

#[tokio::test]
async fn test_run_without_startable_objects() {
    let config = PollerConfig::default().with_object(ObjectConfig::new("volume"));
    let err = run(config, Output::Log, Some(1)).await.unwrap_err();
    assert!(matches!(err, PollerError::Config(_)));
}
