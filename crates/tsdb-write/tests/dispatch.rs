// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com
//
// Endpoint rotation, failover and record dispatch through the public client.

#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unwrap_used)]

mod common;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use common::RecordingTransport;
use tsdb_write::{
    ClientConfig, Compression, Compressor, EndpointSelector, Point, Precision, Protocol, Record,
    WriteClient, WriteError,
};

fn point(i: i64) -> Point {
    Point::builder("req")
        .tag("svc", "api")
        .field("latency", 0.25)
        .field("n", i)
        .time(i + 1, Precision::Millisecond)
        .build()
}

#[test]
fn test_selector_round_robin_under_concurrency() {
    let urls: Vec<String> = (0..5).map(|i| format!("http://n{}:8086", i)).collect();
    let selector = Arc::new(EndpointSelector::new(urls.clone()).unwrap());
    let k = 200;
    let threads = 8;

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let selector = Arc::clone(&selector);
            thread::spawn(move || {
                (0..k * 5 / threads)
                    .map(|_| selector.next().to_string())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut counts: HashMap<String, usize> = HashMap::new();
    for h in handles {
        for url in h.join().unwrap() {
            *counts.entry(url).or_default() += 1;
        }
    }

    assert_eq!(counts.len(), 5);
    for url in &urls {
        assert_eq!(counts[url], k, "{}", url);
    }
}

#[test]
fn test_client_spreads_sends_evenly() {
    let transport = Arc::new(RecordingTransport::new());
    let urls = ["http://a:8086", "http://b:8086", "http://c:8086"];
    let client = Arc::new(
        WriteClient::builder(transport.clone())
            .endpoints(urls)
            .build()
            .unwrap(),
    );

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let client = Arc::clone(&client);
            thread::spawn(move || {
                for i in 0..30 {
                    client.write("db", "rp", point(t * 100 + i)).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    client.close();

    let mut counts: HashMap<String, usize> = HashMap::new();
    for url in transport.endpoints_used() {
        *counts.entry(url).or_default() += 1;
    }
    for url in urls {
        assert_eq!(counts[url], 40, "{}", url);
    }
}

#[test]
fn test_failover_and_recovery() {
    let transport = Arc::new(RecordingTransport::new());
    transport
        .unreachable
        .lock()
        .insert("http://b:8086".to_string());

    let client = WriteClient::builder(transport.clone())
        .endpoints(["http://a:8086", "http://b:8086"])
        .build()
        .unwrap();

    // first send goes to a, second hits b and marks it down
    client.write("db", "rp", point(1)).unwrap();
    assert!(client.write("db", "rp", point(2)).is_err());
    assert!(client.endpoints().is_down("http://b:8086"));

    for i in 3..7 {
        client.write("db", "rp", point(i)).unwrap();
    }
    assert!(transport
        .endpoints_used()
        .iter()
        .all(|e| e == "http://a:8086"));

    // ping keeps b down while it is unreachable
    assert_eq!(client.check_endpoints(), 1);
    assert!(client.endpoints().is_down("http://b:8086"));

    transport.unreachable.lock().clear();
    assert_eq!(client.check_endpoints(), 2);
    client.write("db", "rp", point(7)).unwrap();
    client.write("db", "rp", point(8)).unwrap();
    assert!(transport
        .endpoints_used()
        .iter()
        .any(|e| e == "http://b:8086"));
    client.close();
}

#[test]
fn test_status_error_does_not_mark_down() {
    let transport = Arc::new(RecordingTransport::new());
    transport
        .fail_status
        .store(true, Ordering::SeqCst);
    let client = WriteClient::builder(transport.clone())
        .endpoint("http://a:8086")
        .build()
        .unwrap();
    assert!(matches!(
        client.write("db", "rp", point(1)),
        Err(WriteError::Transport(_))
    ));
    assert!(!client.endpoints().is_down("http://a:8086"));
    client.close();
}

#[test]
fn test_grpc_records_from_config() {
    let config = ClientConfig::from_yaml(
        r#"
endpoints: ["grpc://a:8305"]
protocol: grpc
compression: gzip
"#,
    )
    .unwrap();
    let transport = Arc::new(RecordingTransport::new());
    let client = WriteClient::from_config(&config, transport.clone()).unwrap();
    assert_eq!(client.protocol(), Protocol::Grpc);
    assert!(!client.is_batching());

    let points = vec![
        point(1),
        Point::builder("req").tag("svc", "web").field("latency", "n/a").build(),
    ];
    client.write_points("db", "rp", points).unwrap();
    client.close();

    let records = transport.records.lock();
    assert_eq!(records.len(), 1);
    let req = &records[0].1;
    assert_eq!(req.compression, Compression::Gzip);

    let block = Compressor::new(Compression::Gzip)
        .decompress(&req.payload[0])
        .unwrap();
    let record = Record::unmarshal("req", &block).unwrap();
    assert_eq!(record.row_count(), 2);
    // first-seen type wins, the string value becomes null
    assert_eq!(
        record.column("latency").unwrap().float_values(),
        vec![Some(0.25), None]
    );
    assert_eq!(
        record.column("svc").unwrap().str_values(),
        vec![Some("api"), Some("web")]
    );
    assert_eq!(record.min_time(), 2_000_000);
}

#[test]
fn test_batched_grpc_write() {
    let transport = Arc::new(RecordingTransport::new());
    let client = WriteClient::builder(transport.clone())
        .endpoint("grpc://a:8305")
        .protocol(Protocol::Grpc)
        .batch(tsdb_write::BatchOptions::default())
        .build()
        .unwrap();
    for i in 0..5 {
        client.write("db", "rp", point(i)).unwrap();
    }
    client.close();

    let records = transport.records.lock();
    let rows: usize = records
        .iter()
        .flat_map(|(_, r)| r.records.iter())
        .map(Record::row_count)
        .sum();
    assert_eq!(rows, 5);
}

#[test]
fn test_batched_grpc_bad_point_does_not_block_others() {
    let transport = Arc::new(RecordingTransport::new());
    let failures = Arc::new(AtomicUsize::new(0));
    let client = {
        let failures = Arc::clone(&failures);
        WriteClient::builder(transport.clone())
            .endpoint("grpc://a:8305")
            .protocol(Protocol::Grpc)
            .batch(tsdb_write::BatchOptions::default())
            .exception_handler(move |_, _| {
                failures.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .unwrap()
    };

    let at = |v: i64, secs: i64| {
        Point::builder("m")
            .field("v", v)
            .time(secs, Precision::Second)
            .build()
    };
    client.write("db1", "rp", at(1, 1)).unwrap();
    assert!(matches!(
        client.write("db1", "rp", at(2, i64::MAX)),
        Err(WriteError::Encoding(_))
    ));
    client.write("db2", "rp", at(3, 3)).unwrap();
    client.flush();

    let records = transport.records.lock();
    let delivered: Vec<(String, Vec<Option<i64>>)> = records
        .iter()
        .map(|(_, r)| {
            (
                r.database.clone(),
                r.records[0].column("v").unwrap().int_values(),
            )
        })
        .collect();
    drop(records);
    assert_eq!(
        delivered,
        vec![
            ("db1".to_string(), vec![Some(1)]),
            ("db2".to_string(), vec![Some(3)]),
        ]
    );
    assert_eq!(failures.load(Ordering::SeqCst), 0);
    client.close();
}
