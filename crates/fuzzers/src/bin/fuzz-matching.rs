use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use arbitrary::{Arbitrary, Unstructured};
use clap::Parser;
use fuzzers::{edit_distance, Workload};
use fuzzy_trie::{Alphabet, PivotalActiveNode, PrefixActiveNodeSet, Trie};

#[derive(Debug, Clone, Parser)]
struct Opt {
    /// The number of fuzzer threads to run in parallel.
    #[clap(long)]
    par: Option<NonZeroUsize>,
}

fn main() {
    let opt = Opt::parse();
    let progression: &'static AtomicUsize = Box::leak(Box::new(AtomicUsize::new(0)));
    let stop: &'static AtomicBool = Box::leak(Box::new(AtomicBool::new(false)));

    let par = opt.par.unwrap_or_else(|| std::thread::available_parallelism().unwrap()).get();
    let mut handles = Vec::with_capacity(par);

    for _ in 0..par {
        let handle = std::thread::spawn(move || {
            std::thread::scope(|s| {
                loop {
                    if stop.load(Ordering::Relaxed) {
                        return;
                    }
                    let v: Vec<u8> =
                        std::iter::repeat_with(|| fastrand::u8(..)).take(2000).collect();

                    let mut data = Unstructured::new(&v);
                    let workload = match Workload::arbitrary(&mut data) {
                        Ok(workload) => workload,
                        Err(_) => continue,
                    };
                    // will be used to display the error once a thread crashes
                    let dbg_input = format!("{:#?}", workload);

                    let handle = s.spawn(move || {
                        check(&workload);
                        progression.fetch_add(1, Ordering::Relaxed);
                    });
                    if let err @ Err(_) = handle.join() {
                        stop.store(true, Ordering::Relaxed);
                        err.expect(&dbg_input);
                    }
                }
            });
        });
        handles.push(handle);
    }

    std::thread::spawn(|| {
        let mut last_value = 0;
        let start = std::time::Instant::now();
        loop {
            let total = progression.load(Ordering::Relaxed);
            let elapsed = start.elapsed().as_secs();
            if elapsed > 3600 {
                // after 1 hour, stop the fuzzer, success
                std::process::exit(0);
            }
            println!(
                "Has been running for {:?} seconds. Tested {} new values for a total of {}.",
                elapsed,
                total - last_value,
                total
            );
            last_value = total;
            std::thread::sleep(Duration::from_secs(1));
        }
    });

    for handle in handles {
        handle.join().unwrap();
    }
}

/// Builds a trie out of the workload and walks every query through an
/// extension chain, holding each intermediate set against the invariants the
/// engine promises.
fn check(workload: &Workload) {
    let keywords: Vec<String> =
        workload.keywords.iter().map(|keyword| keyword.to_s()).filter(|s| !s.is_empty()).collect();
    if keywords.is_empty() {
        return;
    }

    let trie = Trie::new(Alphabet::default());
    let snapshot = trie.commit(&keywords).unwrap();
    let threshold = workload.threshold.to_u8();

    for query in &workload.queries {
        let query = query.to_s();
        let mut set = if workload.transpositions {
            PrefixActiveNodeSet::with_transpositions(snapshot.clone(), threshold)
        } else {
            PrefixActiveNodeSet::new(snapshot.clone(), threshold)
        };

        let mut prefix = String::new();
        for c in query.chars() {
            let next = set.extend(c);
            prefix.push(c);

            // an empty set can only stay empty
            assert!(!set.is_empty() || next.is_empty());

            for (node, pan) in next.iter() {
                assert!(pan.transformation_distance <= threshold);
                assert!(pan.edit_distance_of_prefix <= pan.transformation_distance);

                // every stored cost is the cost of a real edit script, the
                // optimal script can only be cheaper
                if !workload.transpositions {
                    let path = snapshot.prefix_string(node).unwrap();
                    let optimum = edit_distance(&prefix, &path, false);
                    assert!(
                        optimum <= pan.transformation_distance as u32,
                        "prefix {prefix:?} reached {path:?} at cost {} but the optimum is {optimum}",
                        pan.transformation_distance,
                    );
                }
            }

            // the exactly-matching path is always kept, at cost zero
            if let Some(node) = snapshot.node_for(&prefix) {
                assert_eq!(next.get(node), Some(PivotalActiveNode::origin()));
            }

            // with a zero threshold the chain is a plain trie descent
            if threshold == 0 {
                match snapshot.node_for(&prefix) {
                    Some(node) => {
                        assert_eq!(next.len(), 1);
                        assert!(next.get(node).is_some());
                    }
                    None => assert!(next.is_empty()),
                }
            }

            set = next;
        }
    }
}
