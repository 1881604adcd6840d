// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use workpool::{Batch, Dispatcher, DispatcherConfig, Job, MutexFunction, NoopSink};
use workpool_tests::{init_log, CollectingSink, GroupRecorder};

#[test]
fn test_batch_feeds_dispatcher() {
    init_log();

    let summed = Arc::new(AtomicUsize::new(0));
    let s = summed.clone();
    let dispatcher = Arc::new(
        Dispatcher::new(
            2,
            3,
            move |job: Job<Vec<usize>>| {
                s.fetch_add(job.context().iter().sum::<usize>(), Ordering::SeqCst);
                Ok(())
            },
            NoopSink,
        )
        .unwrap(),
    );
    dispatcher.run().unwrap();

    let d = dispatcher.clone();
    let batch = Batch::new(10, move |group: Vec<usize>| {
        d.enqueue_job_allow_wait(Job::new(group))?;
        Ok(())
    });

    for i in 1..=1005 {
        batch.push(i).unwrap();
    }
    batch.flush().unwrap();
    dispatcher.wait_until_idle();

    assert_eq!(summed.load(Ordering::SeqCst), 1005 * 1006 / 2);
    dispatcher.wait_until_finished();
}

#[test]
fn test_mutex_function_as_batch_target() {
    init_log();

    let file = Arc::new(Mutex::new(Vec::<String>::new()));
    let f = file.clone();
    let writer = Arc::new(
        MutexFunction::new(
            1,
            move |job: Job<Vec<String>>| {
                // slow enough to make overlapping writes visible
                thread::sleep(Duration::from_millis(1));
                let mut file = f.lock().unwrap();
                let block = job.into_context();
                file.push(format!("begin {}", block.len()));
                file.extend(block);
                file.push("end".to_string());
                Ok(())
            },
            NoopSink,
        )
        .unwrap(),
    );

    let w = writer.clone();
    let batch = Arc::new(Batch::new(4, move |group: Vec<String>| {
        w.call(group)?;
        Ok(())
    }));

    let producers: Vec<_> = (0..4)
        .map(|p| {
            let batch = batch.clone();
            thread::spawn(move || {
                for i in 0..25 {
                    batch.push(format!("{p}-{i}")).unwrap();
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }
    batch.flush().unwrap();
    writer.wait_until_idle();

    let file = file.lock().unwrap();
    // every block is written as a whole
    let mut open = false;
    let mut lines = 0;
    for line in file.iter() {
        if line.starts_with("begin") {
            assert!(!open);
            open = true;
        } else if line == "end" {
            assert!(open);
            open = false;
        } else {
            lines += 1;
        }
    }
    assert!(!open);
    assert_eq!(lines, 100);
}

#[test]
fn test_backoff_loop_around_full_queue() {
    init_log();

    let count = Arc::new(AtomicUsize::new(0));
    let c = count.clone();
    let dispatcher = Dispatcher::from_config(
        &DispatcherConfig::new(2, 2).with_thread_name("backoff"),
        move |_job: Job<usize>| {
            thread::sleep(Duration::from_millis(1));
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
        NoopSink,
    )
    .unwrap();
    dispatcher.run().unwrap();

    let mut retries = 0;
    for i in 0..50 {
        while dispatcher.is_job_queue_full() {
            retries += 1;
            thread::sleep(Duration::from_millis(1));
        }
        // single producer, so the queue cannot fill up in between
        assert!(dispatcher.enqueue_job_allow_drop(Job::new(i)));
    }
    dispatcher.wait_until_idle();

    assert_eq!(count.load(Ordering::SeqCst), 50);
    assert!(retries > 0);
    dispatcher.wait_until_finished();
}

#[test]
fn test_failures_reach_the_sink_only() {
    init_log();

    let sink = CollectingSink::new();
    let dispatcher = Dispatcher::new(
        8,
        2,
        |job: Job<u32>| {
            if job.context() % 2 == 1 {
                anyhow::bail!("odd job {}", job.context());
            }
            Ok(())
        },
        sink.clone(),
    )
    .unwrap();
    dispatcher.run().unwrap();

    for i in 0..10 {
        // enqueue never sees the failure
        dispatcher.enqueue_job_allow_wait(Job::new(i)).unwrap();
    }
    dispatcher.wait_until_idle();

    let messages = sink.messages();
    assert_eq!(messages.len(), 5);
    assert!(messages.iter().all(|m| m.contains("job failed: odd job")));
    dispatcher.wait_until_finished();
}

#[test]
fn test_recorder_sees_full_then_flushed_groups() {
    let recorder = GroupRecorder::new();
    let mut batch = Batch::default();
    batch.init(3, recorder.handler(), None);

    for c in ['A', 'B', 'C', 'D', 'E', 'F', 'G'] {
        batch.push(c).unwrap();
    }
    batch.flush().unwrap();

    assert_eq!(
        recorder.groups(),
        vec![vec!['A', 'B', 'C'], vec!['D', 'E', 'F'], vec!['G']]
    );
}

#[cfg(feature = "stress")]
#[test]
fn test_stress_many_producers() {
    init_log();

    let recorder = GroupRecorder::new();
    let count = Arc::new(AtomicUsize::new(0));
    let c = count.clone();
    let dispatcher = Arc::new(
        Dispatcher::new(
            64,
            8,
            move |job: Job<Vec<u64>>| {
                c.fetch_add(job.context().len(), Ordering::SeqCst);
                Ok(())
            },
            NoopSink,
        )
        .unwrap(),
    );
    dispatcher.run().unwrap();

    let d = dispatcher.clone();
    let handler = recorder.handler();
    let batch = Arc::new(Batch::new(97, move |group: Vec<u64>| {
        handler(group.clone())?;
        d.enqueue_job_allow_wait(Job::new(group))?;
        Ok(())
    }));

    let producers: Vec<_> = (0..16u64)
        .map(|p| {
            let batch = batch.clone();
            thread::spawn(move || {
                for i in 0..100_000u64 {
                    batch.push(p * 100_000 + i).unwrap();
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }
    batch.flush().unwrap();
    dispatcher.wait_until_idle();

    assert_eq!(count.load(Ordering::SeqCst), 1_600_000);
    let mut records = recorder.records();
    records.sort_unstable();
    records.dedup();
    assert_eq!(records.len(), 1_600_000);
    dispatcher.wait_until_finished();
}
