//! End-to-end tests: rotated log directory → drain pass → sink + checkpoint.
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use gkle::aggregate::Sample;
use gkle::config::MissingWatermarkStrategy;
use gkle::export::{ExportError, Exporter, ExporterFactory};
use gkle::pipeline::{DrainReport, Dispatcher};
use gkle::source::LineParser;
use gkle::storage::Checkpoint;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

#[derive(Clone, Default)]
struct RecordingSink {
    samples: Arc<Mutex<Vec<Sample>>>,
}

struct RecordingExporter(RecordingSink);

#[async_trait]
impl Exporter for RecordingExporter {
    async fn export(&mut self, sample: &Sample) -> Result<(), ExportError> {
        self.0.samples.lock().unwrap().push(sample.clone());
        Ok(())
    }

    async fn close(&mut self) {}
}

impl ExporterFactory for RecordingSink {
    fn connect(&self) -> Result<Box<dyn Exporter>, ExportError> {
        Ok(Box::new(RecordingExporter(self.clone())))
    }
}

fn measurement(lcore: u32, ts: &str, pkts: u64, bytes: u64, flows: u64) -> String {
    format!(
        "GK/{lcore} {ts} NOTICE Basic measurements [tot_pkts_num = {pkts}, tot_pkts_size = {bytes}, \
         pkts_num_granted = {pkts}, pkts_size_granted = {bytes}, pkts_num_request = 0, \
         pkts_size_request = 0, pkts_num_declined = 0, pkts_size_declined = 0, \
         tot_pkts_num_dropped = 0, tot_pkts_size_dropped = 0, tot_pkts_num_distributed = 0, \
         tot_pkts_size_distributed = 0, flow_table_occupancy = {flows}/1000=0.5%]\n"
    )
}

fn dispatcher(log_dir: &Path, checkpoint: &Path, sink: &RecordingSink) -> Dispatcher {
    Dispatcher::new(
        log_dir.to_path_buf(),
        Checkpoint::new(checkpoint),
        LineParser::new(None).unwrap(),
        Arc::new(sink.clone()),
        MissingWatermarkStrategy::ResumeAfter,
    )
}

#[tokio::test]
async fn test_two_lcores_repeat_starts_second_bucket() {
    let temp = TempDir::new().unwrap();
    let log_dir = temp.path().join("gatekeeper");
    std::fs::create_dir(&log_dir).unwrap();
    let checkpoint_path = temp.path().join("state/last");

    let log = log_dir.join("gatekeeper_2024_01_01_00_00.log");
    let mut text = String::from("GK/0 2024-01-01 00:00:00 NOTICE GK block started\n");
    text.push_str(&measurement(0, "2024-01-01 00:00:00", 100, 6400, 5));
    text.push_str(&measurement(1, "2024-01-01 00:00:00", 50, 3200, 3));
    text.push_str(&measurement(0, "2024-01-01 00:01:00", 7, 448, 6));
    std::fs::write(&log, text).unwrap();

    // The file gatekeeper currently writes to.
    std::fs::write(
        log_dir.join("gatekeeper_2024_01_01_00_02.log"),
        measurement(0, "2024-01-01 00:02:00", 1, 1, 1),
    )
    .unwrap();

    let sink = RecordingSink::default();
    let report = dispatcher(&log_dir, &checkpoint_path, &sink)
        .drain()
        .await
        .unwrap();
    assert_eq!(report, DrainReport { files: 1, samples: 2 });

    let samples = sink.samples.lock().unwrap().clone();
    assert_eq!(samples.len(), 2);

    let first = &samples[0];
    assert_eq!(first.timestamp, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    assert_eq!(first.sources, 2);
    assert_eq!(first.counters.get("tot_pkts_num"), Some(150));
    assert_eq!(first.counters.get("tot_pkts_size"), Some(9600));
    assert_eq!(first.counters.get("flow_table_occupancy_current"), Some(8));
    assert_eq!(first.counters.get("flow_table_occupancy_max"), Some(2000));

    let second = &samples[1];
    assert_eq!(second.timestamp, Utc.with_ymd_and_hms(2024, 1, 1, 0, 1, 0).unwrap());
    assert_eq!(second.sources, 1);
    assert_eq!(second.counters.get("tot_pkts_num"), Some(7));

    assert_eq!(Checkpoint::new(&checkpoint_path).load().unwrap(), Some(log));
}

#[tokio::test]
async fn test_restart_does_not_reexport() {
    let temp = TempDir::new().unwrap();
    let log_dir = temp.path().to_path_buf();
    let checkpoint_path = temp.path().join("state").join("last");

    let names = [
        "gatekeeper_2024_01_01_00_00.log",
        "gatekeeper_2024_01_01_00_01.log",
        "gatekeeper_2024_01_01_00_02.log",
    ];
    for (i, name) in names.iter().enumerate() {
        let ts = format!("2024-01-01 00:0{}:00", i);
        std::fs::write(log_dir.join(name), measurement(0, &ts, 1, 1, 1)).unwrap();
    }

    let sink = RecordingSink::default();
    dispatcher(&log_dir, &checkpoint_path, &sink).drain().await.unwrap();
    assert_eq!(sink.samples.lock().unwrap().len(), 2);

    // A fresh process sees the same directory and the persisted checkpoint.
    let restarted = RecordingSink::default();
    let report = dispatcher(&log_dir, &checkpoint_path, &restarted)
        .drain()
        .await
        .unwrap();
    assert_eq!(report, DrainReport::default());
    assert!(restarted.samples.lock().unwrap().is_empty());

    // Gatekeeper rotates: the previously open file becomes eligible.
    std::fs::write(
        log_dir.join("gatekeeper_2024_01_01_00_03.log"),
        measurement(0, "2024-01-01 00:03:00", 1, 1, 1),
    )
    .unwrap();
    let report = dispatcher(&log_dir, &checkpoint_path, &restarted)
        .drain()
        .await
        .unwrap();
    assert_eq!(report, DrainReport { files: 1, samples: 1 });
    assert_eq!(
        Checkpoint::new(&checkpoint_path).load().unwrap(),
        Some(log_dir.join(names[2]))
    );
}

#[tokio::test]
async fn test_same_file_twice_gives_identical_samples() {
    let temp = TempDir::new().unwrap();
    let log = temp.path().join("gatekeeper_2024_01_01_00_00.log");
    let mut text = String::new();
    for minute in 0..4 {
        let ts = format!("2024-01-01 00:0{}:00", minute);
        for lcore in [2, 0, 3, 1] {
            text.push_str(&measurement(lcore, &ts, minute * 10 + lcore as u64, 64, lcore as u64));
        }
    }
    std::fs::write(&log, text).unwrap();

    let mut runs = Vec::new();
    for _ in 0..2 {
        let sink = RecordingSink::default();
        let dispatcher = dispatcher(temp.path(), &temp.path().join("last"), &sink);
        let mut exporter = sink.connect().unwrap();
        let count = dispatcher.process_file(&log, exporter.as_mut()).await.unwrap();
        assert_eq!(count, 4);
        runs.push(sink.samples.lock().unwrap().clone());
    }

    assert_eq!(runs[0], runs[1]);
    assert_eq!(runs[0][3].counters.get("tot_pkts_num"), Some(30 * 4 + 6));
}
