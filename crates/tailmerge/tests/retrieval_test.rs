//! End-to-end retrieval tests against the in-memory cluster.

use std::sync::Arc;

use chrono::{TimeDelta, TimeZone, Utc};
use tailmerge::{
    InMemoryCluster, LogTail, MemoryInstance, MemoryWorkload, RecordBody, ResourceKind,
    RetrievalOptions, TailConfig, TailError, TailLogs,
};

const T1: &str = "2019-04-08T12:25:45.100000000Z";
const T2: &str = "2019-04-08T12:25:45.200000000Z";
const T3: &str = "2019-04-08T12:25:45.300000000Z";

// ==================== Helper Functions ====================

fn web_instance(name: &str) -> MemoryInstance {
    MemoryInstance::new(name)
        .with_label("app", "web")
        .with_label("tier", "frontend")
        .with_channel("nginx")
}

fn web_cluster() -> InMemoryCluster {
    let cluster = InMemoryCluster::new();
    cluster.add_instance(
        "default",
        web_instance("web-0").with_lines("nginx", [format!("{T1} GET /"), format!("{T3} GET /health")]),
    );
    cluster.add_instance(
        "default",
        web_instance("web-1").with_lines("nginx", [format!("{T2} POST /login")]),
    );
    cluster.add_instance("default", web_instance("web-2"));
    cluster.add_instance(
        "default",
        MemoryInstance::new("db-0")
            .with_label("app", "db")
            .with_lines("postgres", [format!("{T1} checkpoint complete")]),
    );
    cluster.add_workload(
        "default",
        MemoryWorkload::with_match_labels("web", [("app", "web"), ("tier", "frontend")]),
    );
    cluster
}

fn engine(cluster: &Arc<InMemoryCluster>) -> LogTail<InMemoryCluster> {
    LogTail::new(Arc::clone(cluster), TailConfig::default()).expect("default config is valid")
}

// ==================== Workload Merge Tests ====================

#[tokio::test]
async fn test_workload_merges_sources_by_time() {
    let cluster = Arc::new(web_cluster());
    let records = engine(&cluster)
        .workload_logs("web", &RetrievalOptions::new())
        .await
        .expect("workload retrieval should succeed");

    let timestamps: Vec<_> = records.iter().map(|r| r.timestamp.as_str()).collect();
    assert_eq!(timestamps, vec![T1, T2, T3]);
    assert_eq!(records.error_count(), 0);

    let contacted: Vec<_> = cluster
        .stream_requests()
        .into_iter()
        .map(|r| r.instance)
        .collect();
    assert_eq!(contacted.len(), 3);
    assert!(!contacted.contains(&"db-0".to_string()));
}

#[tokio::test]
async fn test_workload_partial_failure_is_contained() {
    let cluster = Arc::new(web_cluster());
    cluster.add_instance(
        "default",
        web_instance("web-3").with_stream_error("pod is being terminated"),
    );
    cluster.add_instance(
        "default",
        web_instance("web-4")
            .with_lines("nginx", [format!("{T2} partial")])
            .with_read_error("unexpected EOF"),
    );

    let records = engine(&cluster)
        .workload_logs("web", &RetrievalOptions::new())
        .await
        .expect("workload retrieval should succeed");

    assert_eq!(records.error_count(), 2);
    assert_eq!(records.len(), 5);
    for record in records.iter().filter(|r| r.is_error()) {
        assert!(matches!(record.body, RecordBody::SourceError(_)));
        assert!(record.source_id == "web-3" || record.source_id == "web-4");
    }
}

#[tokio::test]
async fn test_missing_workload_is_fatal_and_fetches_nothing() {
    let cluster = Arc::new(web_cluster());
    let result = engine(&cluster)
        .workload_logs("checkout", &RetrievalOptions::new())
        .await;

    assert!(matches!(
        result,
        Err(TailError::NotFound {
            kind: ResourceKind::Workload,
            ..
        })
    ));
    assert!(cluster.stream_requests().is_empty());
}

// ==================== Instance Tests ====================

#[tokio::test]
async fn test_instance_without_channels_fails() {
    let cluster = Arc::new(web_cluster());
    cluster.add_instance("default", MemoryInstance::new("init-0"));

    let result = engine(&cluster)
        .instance_logs("init-0", &RetrievalOptions::new())
        .await;
    assert!(matches!(result, Err(TailError::NoChannel { .. })));
}

#[tokio::test]
async fn test_instance_read_error_is_returned() {
    let cluster = Arc::new(web_cluster());
    cluster.add_instance(
        "default",
        web_instance("web-9")
            .with_lines("nginx", [format!("{T1} partial")])
            .with_read_error("unexpected EOF"),
    );

    let result = engine(&cluster)
        .instance_logs("web-9", &RetrievalOptions::new())
        .await;
    assert!(matches!(result, Err(TailError::Stream { .. })));
}

#[tokio::test]
async fn test_instance_normalizes_mixed_lines() {
    let cluster = Arc::new(InMemoryCluster::new());
    cluster.add_instance(
        "default",
        MemoryInstance::new("api-0").with_lines(
            "app",
            ["2019-04-08T12:25:45.321Z hello", "", "not-a-timestamp line"],
        ),
    );

    let records = engine(&cluster)
        .instance_logs("api-0", &RetrievalOptions::new())
        .await
        .expect("instance retrieval should succeed");

    assert_eq!(records.len(), 2);
    let first = &records.as_slice()[0];
    assert_eq!(first.timestamp.as_str(), "2019-04-08T12:25:45.321Z");
    assert_eq!(first.content(), "hello");
    let second = &records.as_slice()[1];
    assert!(second.timestamp.is_sentinel());
    assert_eq!(second.content(), "not-a-timestamp line");
    assert_eq!(second.source_id, "api-0");
}

// ==================== Selection Mode Tests ====================

#[tokio::test]
async fn test_from_time_replaces_tail() {
    let cluster = Arc::new(web_cluster());
    let from = Utc
        .with_ymd_and_hms(2019, 4, 8, 12, 25, 45)
        .single()
        .expect("valid date");

    let records = engine(&cluster)
        .instance_logs("web-0", &RetrievalOptions::new().since(from).tail(1))
        .await
        .expect("instance retrieval should succeed");
    assert_eq!(records.len(), 2);

    let requests = cluster.stream_requests();
    assert_eq!(requests.len(), 1);
    let params = &requests[0].params;
    assert_eq!(params.since_time, Some(from + TimeDelta::nanoseconds(1)));
    assert_eq!(params.tail_lines, None);
    assert_eq!(params.limit_bytes, Some(5_000_000));
    assert_eq!(params.channel, "nginx");
}

#[tokio::test]
async fn test_from_time_excludes_entry_at_boundary() {
    let cluster = Arc::new(web_cluster());
    let boundary = chrono::DateTime::parse_from_rfc3339(T1)
        .expect("valid timestamp")
        .with_timezone(&Utc);

    let records = engine(&cluster)
        .instance_logs("web-0", &RetrievalOptions::new().since(boundary))
        .await
        .expect("instance retrieval should succeed");

    let timestamps: Vec<_> = records.iter().map(|r| r.timestamp.as_str()).collect();
    assert_eq!(timestamps, vec![T3]);
}

#[tokio::test]
async fn test_non_positive_tail_uses_default() {
    let cluster = Arc::new(web_cluster());
    engine(&cluster)
        .instance_logs("web-1", &RetrievalOptions::new().tail(0))
        .await
        .expect("instance retrieval should succeed");

    let requests = cluster.stream_requests();
    assert_eq!(requests[0].params.tail_lines, Some(200));
    assert_eq!(requests[0].params.since_time, None);
}

#[tokio::test]
async fn test_tail_and_byte_cap_reach_every_source() {
    let cluster = Arc::new(web_cluster());
    engine(&cluster)
        .workload_logs(
            "web",
            &RetrievalOptions::new().tail(1).with_limit_bytes(1024),
        )
        .await
        .expect("workload retrieval should succeed");

    let requests = cluster.stream_requests();
    assert_eq!(requests.len(), 3);
    for request in requests {
        assert_eq!(request.params.tail_lines, Some(1));
        assert_eq!(request.params.limit_bytes, Some(1024));
        assert!(request.params.timestamps);
        assert!(!request.params.follow);
    }
}

// ==================== Capability Tests ====================

#[tokio::test]
async fn test_capabilities_share_one_contract() {
    let cluster = Arc::new(web_cluster());
    let tail = engine(&cluster);
    let targets: Vec<(Box<dyn TailLogs>, &str, usize)> = vec![
        (Box::new(tail.instances()) as Box<dyn TailLogs>, "db-0", 1),
        (Box::new(tail.workloads()) as Box<dyn TailLogs>, "web", 3),
    ];

    let options = RetrievalOptions::new();
    for (retriever, id, expected) in &targets {
        let records = retriever
            .tail(id, &options)
            .await
            .expect("retrieval should succeed");
        assert_eq!(records.len(), *expected, "{} {id}", retriever.scope());
    }
}

#[tokio::test]
async fn test_fixture_cluster_round_trip() {
    let json = format!(
        r#"{{
            "namespaces": {{
                "staging": {{
                    "instances": [
                        {{ "name": "worker-0", "labels": {{ "app": "worker" }},
                           "channels": [ {{ "name": "main", "lines": ["{T2} job 2", "{T1} job 1"] }} ] }},
                        {{ "name": "worker-1", "labels": {{ "app": "worker" }},
                           "channels": [ {{ "name": "main", "lines": ["{T3} job 3"] }} ] }}
                    ],
                    "workloads": [
                        {{ "name": "worker", "selector": {{ "requirements": [
                            {{ "key": "app", "operator": "in", "values": ["worker"] }} ] }} }}
                    ]
                }}
            }}
        }}"#
    );
    let cluster = InMemoryCluster::from_json(&json).expect("fixture should parse");
    let tail = LogTail::new(Arc::new(cluster), TailConfig::for_namespace("staging"))
        .expect("config is valid");

    let records = tail
        .workload_logs("worker", &RetrievalOptions::new())
        .await
        .expect("workload retrieval should succeed");
    let contents: Vec<_> = records.iter().map(|r| r.content()).collect();
    assert_eq!(contents, vec!["job 1", "job 2", "job 3"]);
}
