use chrono::Utc;
use pareto_store::{dominates, ConflictPolicy, ParetoFrontStore, StoreConfig};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, Barrier};
use std::thread;

fn temp_root(tag: &str) -> PathBuf {
    let root = std::env::temp_dir().join(format!(
        "pareto_it_{}_{}_{}",
        tag,
        std::process::id(),
        Utc::now().timestamp_micros()
    ));
    std::fs::create_dir_all(&root).expect("temp dir");
    root
}

/// Points on the line size + error = 100 never dominate each other.
fn trade_off_records(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| format!("{};{};{};sol_{}", i, i, 100 - i, i))
        .collect()
}

fn run_writers(policy: ConflictPolicy, tag: &str) {
    let root = temp_root(tag);
    let front = root.join("pareto.txt");
    let records = trade_off_records(24);
    let barrier = Arc::new(Barrier::new(records.len()));

    let handles: Vec<_> = records
        .iter()
        .cloned()
        .map(|record| {
            let front = front.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let store = ParetoFrontStore::open(
                    front,
                    StoreConfig {
                        conflict_policy: policy,
                        ..StoreConfig::default()
                    },
                )
                .expect("open store");
                barrier.wait();
                store.submit_raw(&record).expect("submit")
            })
        })
        .collect();
    for h in handles {
        let report = h.join().expect("writer thread");
        assert!(report.changed());
    }

    let store = ParetoFrontStore::open(&front, StoreConfig::default()).expect("open");
    let snapshot = store.snapshot().expect("snapshot");
    assert_eq!(snapshot.dropped, 0);
    let stored: BTreeSet<&str> = snapshot.members.iter().map(|m| m.raw()).collect();
    let expected: BTreeSet<&str> = records.iter().map(String::as_str).collect();
    assert_eq!(stored, expected, "every non-conflicting candidate survives");
    assert!(store.audit().expect("audit").is_clean());
    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn non_conflicting_writers_all_land_with_reconcile() {
    run_writers(ConflictPolicy::Reconcile, "reconcile");
}

#[test]
fn non_conflicting_writers_all_land_with_converge() {
    run_writers(ConflictPolicy::Converge, "converge");
}

#[test]
fn contended_dominance_chain_ends_with_the_best() {
    let root = temp_root("chain");
    let front = root.join("pareto.txt");
    let records: Vec<String> = (0..16)
        .map(|i| format!("{};{};{};chain_{}", i, 50 - i, 1.0 - f64::from(i) / 32.0, i))
        .collect();
    let barrier = Arc::new(Barrier::new(records.len()));
    let handles: Vec<_> = records
        .iter()
        .cloned()
        .map(|record| {
            let front = front.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let store =
                    ParetoFrontStore::open(front, StoreConfig::default()).expect("open store");
                barrier.wait();
                store.submit_raw(&record).expect("submit");
            })
        })
        .collect();
    for h in handles {
        h.join().expect("writer thread");
    }

    let store = ParetoFrontStore::open(&front, StoreConfig::default()).expect("open");
    let snapshot = store.snapshot().expect("snapshot");
    assert_eq!(snapshot.members.len(), 1);
    assert_eq!(snapshot.members[0].raw(), records[15]);
    for other in &records[..15] {
        let c = store.parse_candidate(other).expect("candidate");
        assert!(dominates(snapshot.members[0].objectives(), c.objectives()).expect("verdict"));
    }
    let _ = std::fs::remove_dir_all(root);
}
