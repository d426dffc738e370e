//! Worker Lifecycle Tests
//!
//! Runs real `sh` workers to check process-tree teardown and output
//! forwarding. Liveness is read from `/proc`, so these only run on Linux.

#![cfg(target_os = "linux")]

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{sleep, timeout, Instant};

use vanity_rotor::config::{RotorConfig, WorkerConfig};
use vanity_rotor::orchestrator::{ChannelSink, ControlSurface, Stats, WorkerSupervisor};
use vanity_rotor::targets::MemoryTermStore;

/// `$2` is the first target; `$0` is the placeholder after the script.
const TREE_SCRIPT: &str = r#"
echo "BrokenPipeError: [Errno 32] Broken pipe" >&2
echo "Traceback (most recent call last):" >&2
echo "   "
echo "searching $2"
sleep 30 &
echo "helper $!"
echo "ready" >&2
wait
"#;

fn supervisor(script: &str) -> (WorkerSupervisor, UnboundedReceiver<String>) {
    let config = WorkerConfig {
        program: "sh".to_string(),
        base_args: vec!["-c".to_string(), script.to_string(), "worker".to_string()],
        constraint_flag: "--starts-with".to_string(),
        ..WorkerConfig::default()
    };
    let (sink, rx) = ChannelSink::new();
    (WorkerSupervisor::new(config, Arc::new(sink)).unwrap(), rx)
}

fn targets(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// A pid counts as alive while it has a `/proc` entry that is not a zombie.
fn alive(pid: u32) -> bool {
    let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) else {
        return false;
    };
    let state = stat.rsplit_once(')').and_then(|(_, rest)| rest.trim_start().chars().next());
    !matches!(state, Some('Z') | Some('X') | None)
}

async fn wait_dead(pid: u32) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if !alive(pid) {
            return true;
        }
        sleep(Duration::from_millis(20)).await;
    }
    false
}

/// Collect forwarded lines until `done` matches one.
async fn collect_until(rx: &mut UnboundedReceiver<String>, done: impl Fn(&str) -> bool) -> Vec<String> {
    let mut lines = Vec::new();
    loop {
        let line = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("worker output timed out")
            .expect("sink closed");
        let finished = done(&line);
        lines.push(line);
        if finished {
            return lines;
        }
    }
}

/// Live processes whose command line carries `marker` as an argument.
fn live_with_argument(marker: &str) -> Vec<u32> {
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return Vec::new();
    };
    entries
        .filter_map(|e| e.ok()?.file_name().to_str()?.parse::<u32>().ok())
        .filter(|&pid| {
            std::fs::read(format!("/proc/{pid}/cmdline"))
                .map(|raw| raw.split(|&b| b == 0).any(|arg| arg == marker.as_bytes()))
                .unwrap_or(false)
        })
        .filter(|&pid| alive(pid))
        .collect()
}

fn helper_pid(lines: &[String]) -> u32 {
    lines
        .iter()
        .find_map(|l| l.strip_prefix("helper "))
        .and_then(|pid| pid.parse().ok())
        .expect("helper pid line")
}

#[tokio::test]
async fn test_output_is_forwarded_without_noise() {
    let (sup, mut rx) = supervisor(TREE_SCRIPT);
    sup.start(&targets(&["abc"])).await.unwrap();

    let mut lines = collect_until(&mut rx, |l| l == "ready").await;
    if !lines.iter().any(|l| l.starts_with("helper ")) {
        lines.extend(collect_until(&mut rx, |l| l.starts_with("helper ")).await);
    }

    assert!(lines.contains(&"searching abc".to_string()));
    assert!(lines.iter().all(|l| !l.is_empty()));
    assert!(lines.iter().all(|l| !l.contains("BrokenPipeError") && !l.contains("Traceback")));

    sup.stop().await;
}

#[tokio::test]
async fn test_stop_kills_the_whole_tree() {
    let (sup, mut rx) = supervisor(TREE_SCRIPT);
    sup.start(&targets(&["abc"])).await.unwrap();
    let worker = sup.current_pid().await.unwrap();

    let lines = collect_until(&mut rx, |l| l.starts_with("helper ")).await;
    let helper = helper_pid(&lines);
    assert!(alive(worker));
    assert!(alive(helper));

    sup.stop().await;
    assert!(!sup.is_running().await);
    assert_eq!(sup.current_pid().await, None);
    assert!(wait_dead(worker).await, "worker {worker} survived stop");
    assert!(wait_dead(helper).await, "helper {helper} survived stop");
}

#[tokio::test]
async fn test_restart_leaves_exactly_one_worker() {
    let (sup, mut rx) = supervisor(TREE_SCRIPT);

    sup.start(&targets(&["aaa"])).await.unwrap();
    let first = sup.current_pid().await.unwrap();
    let first_helper = helper_pid(&collect_until(&mut rx, |l| l.starts_with("helper ")).await);

    sup.start(&targets(&["bbb"])).await.unwrap();
    let second = sup.current_pid().await.unwrap();
    assert_ne!(first, second);

    assert!(wait_dead(first).await);
    assert!(wait_dead(first_helper).await);
    assert!(sup.is_running().await);
    assert!(alive(second));

    collect_until(&mut rx, |l| l == "searching bbb").await;

    sup.stop().await;
    assert!(wait_dead(second).await);
}

#[tokio::test]
async fn test_self_exited_worker_is_forgotten() {
    let (sup, mut rx) = supervisor(r#"echo "done $2""#);
    sup.start(&targets(&["xyz"])).await.unwrap();
    collect_until(&mut rx, |l| l == "done xyz").await;

    let deadline = Instant::now() + Duration::from_secs(5);
    while sup.is_running().await {
        assert!(Instant::now() < deadline, "worker never exited");
        sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(sup.current_pid().await, None);

    // stopping an already-gone worker is harmless
    sup.stop().await;
}

#[tokio::test]
async fn test_self_exited_worker_takes_its_helpers_along() {
    let (sup, mut rx) = supervisor(r#"sleep 30 &
echo "helper $!""#);
    sup.start(&targets(&["xyz"])).await.unwrap();
    let helper = helper_pid(&collect_until(&mut rx, |l| l.starts_with("helper ")).await);

    let deadline = Instant::now() + Duration::from_secs(5);
    while sup.is_running().await {
        assert!(Instant::now() < deadline, "worker never exited");
        sleep(Duration::from_millis(20)).await;
    }
    assert!(wait_dead(helper).await, "helper {helper} outlived its worker");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_stop_and_start_never_overlap() {
    let (sup, _rx) = supervisor("sleep 30 & wait");
    let sup = Arc::new(sup);
    let marker = format!("race-{}", std::process::id());
    let batch = targets(&[marker.as_str()]);

    for _ in 0..30 {
        let stopper = {
            let sup = sup.clone();
            tokio::spawn(async move { sup.stop().await })
        };
        let starter = {
            let sup = sup.clone();
            let batch = batch.clone();
            tokio::spawn(async move { sup.start(&batch).await })
        };
        stopper.await.unwrap();
        starter.await.unwrap().unwrap();

        let live = live_with_argument(&marker);
        assert!(live.len() <= 1, "overlapping workers: {live:?}");
        match sup.current_pid().await {
            Some(pid) => assert_eq!(live, vec![pid]),
            None => assert!(live.is_empty(), "untracked workers: {live:?}"),
        }
    }

    sup.stop().await;
    let deadline = Instant::now() + Duration::from_secs(5);
    while !live_with_argument(&marker).is_empty() {
        assert!(Instant::now() < deadline, "worker survived final stop");
        sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_clear_all_stops_the_running_worker() {
    let config = RotorConfig {
        worker: WorkerConfig {
            program: "sh".to_string(),
            base_args: vec!["-c".to_string(), "sleep 30 & wait".to_string(), "worker".to_string()],
            ..WorkerConfig::default()
        },
        ..RotorConfig::default()
    };
    let (sink, _rx) = ChannelSink::new();
    let control = ControlSurface::new(&config, Arc::new(MemoryTermStore::new()), Arc::new(sink)).unwrap();
    control.restore(&["!abc", "!abd"]).await;
    assert!(control.start());

    let deadline = Instant::now() + Duration::from_secs(5);
    while !control.supervisor().is_running().await {
        assert!(Instant::now() < deadline, "worker never started");
        sleep(Duration::from_millis(20)).await;
    }
    let worker = control.supervisor().current_pid().await.unwrap();

    control.clear_all().await;
    assert!(!control.supervisor().is_running().await);
    assert!(wait_dead(worker).await, "worker {worker} survived clear");
    let Stats { base_terms, variants, .. } = control.stats().await;
    assert_eq!((base_terms, variants), (0, 0));

    control.shutdown().await;
}
