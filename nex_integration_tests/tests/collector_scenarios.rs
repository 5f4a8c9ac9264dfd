use std::time::Instant;

use nex_collector::{CollectError, CollectedServer, ScrapeCollector};
use nex_integration_tests::common::{
    collector, fixtures, scrape, value_of, MockBroker, TEST_TIMEOUT,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[tokio::test]
async fn test_varz_end_to_end() -> anyhow::Result<()> {
    init_tracing();
    let broker = MockBroker::with_documents(vec![("varz", fixtures::varz())]).await?;
    let coll = collector("varz", vec![CollectedServer::new("id", broker.url())]);

    let (result, samples) = scrape(&coll).await;
    let outcome = result?;
    assert_eq!(outcome.failed, 0);
    assert_eq!(outcome.samples, samples.len());

    assert_eq!(value_of(&samples, "gnatsd_varz_connections"), Some(1.0));
    assert_eq!(value_of(&samples, "gnatsd_varz_subscriptions"), Some(61.0));
    assert_eq!(value_of(&samples, "gnatsd_varz_in_bytes"), Some(5.0));
    assert_eq!(value_of(&samples, "gnatsd_varz_out_bytes"), Some(5.0));
    assert_eq!(value_of(&samples, "gnatsd_varz_start"), Some(1_714_557_600_123.0));
    assert_eq!(value_of(&samples, "gnatsd_varz_http_req_stats_varz"), Some(2.0));

    assert!(value_of(&samples, "gnatsd_varz_now").is_none());
    assert!(value_of(&samples, "gnatsd_varz_port").is_none());
    assert!(samples.iter().all(|s| s.label("server_id") == Some("id")));

    assert_eq!(coll.stats().get("id"), Some(&samples.len()));
    Ok(())
}

#[tokio::test]
async fn test_all_core_endpoints() -> anyhow::Result<()> {
    let broker = MockBroker::with_documents(fixtures::all_endpoints()).await?;
    let servers = vec![CollectedServer::new("id", broker.url())];

    let cases = [
        ("routez", "gnatsd_routez_num_routes", 1.0),
        ("subsz", "gnatsd_subsz_num_subscriptions", 61.0),
        ("connz", "gnatsd_connz_total_connections", 1.0),
        ("connz", "gnatsd_connz_pending_bytes", 0.0),
        ("healthz", "gnatsd_healthz_status", 0.0),
        ("gatewayz", "gnatsd_gatewayz_outbound_connection_out_msgs", 8.0),
        ("accstatz", "gnatsd_accstatz_num_subscriptions", 3.0),
    ];

    for (endpoint, metric, expected) in cases {
        let (result, samples) = scrape(&collector(endpoint, servers.clone())).await;
        assert!(result.is_ok(), "{} scrape failed", endpoint);
        assert_eq!(value_of(&samples, metric), Some(expected), "{}", metric);
    }
    Ok(())
}

#[tokio::test]
async fn test_jetstream_server_metrics() -> anyhow::Result<()> {
    let broker = MockBroker::with_documents(vec![("jsz", fixtures::jsz())]).await?;
    let coll = collector("jsz", vec![CollectedServer::new("id", broker.url())]);

    let (_, samples) = scrape(&coll).await;
    assert_eq!(value_of(&samples, "jetstream_server_total_streams"), Some(1.0));
    assert_eq!(value_of(&samples, "jetstream_server_total_consumers"), Some(1.0));
    assert_eq!(value_of(&samples, "jetstream_server_total_messages"), Some(3.0));
    assert_eq!(value_of(&samples, "jetstream_server_config_max_memory"), Some(1073741824.0));

    let streams = samples
        .iter()
        .find(|s| s.name() == "jetstream_server_total_streams")
        .unwrap();
    assert_eq!(streams.label("cluster"), Some("east"));
    assert_eq!(streams.label("domain"), Some("hub"));
    assert_eq!(streams.label("meta_leader"), Some("nats-east-1"));
    Ok(())
}

#[tokio::test]
async fn test_unreachable_server_is_skipped() -> anyhow::Result<()> {
    init_tracing();
    let mut gone = MockBroker::start().await?;
    let gone_url = gone.url();
    gone.shutdown().await;

    let up = MockBroker::with_documents(vec![("varz", fixtures::varz())]).await?;
    let coll = collector(
        "varz",
        vec![
            CollectedServer::new("gone", gone_url),
            CollectedServer::new("up", up.url()),
        ],
    );

    let (result, samples) = scrape(&coll).await;
    let outcome = result?;
    assert_eq!(outcome.servers, 2);
    assert_eq!(outcome.failed, 1);
    assert!(samples.iter().all(|s| s.label("server_id") == Some("up")));
    assert_eq!(value_of(&samples, "gnatsd_varz_connections"), Some(1.0));

    let stats = coll.stats();
    assert!(stats.contains_key("up"));
    assert!(!stats.contains_key("gone"));
    Ok(())
}

#[tokio::test]
async fn test_no_server_yields_no_samples() -> anyhow::Result<()> {
    let mut gone = MockBroker::start().await?;
    let url = gone.url();
    gone.shutdown().await;

    let coll = collector("varz", vec![CollectedServer::new("id", url)]);
    let (result, samples) = scrape(&coll).await;

    assert!(samples.is_empty());
    assert!(matches!(result, Err(CollectError::AllServersFailed { servers: 1, .. })));
    assert!(coll.stats().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_healthz_before_and_after_shutdown() -> anyhow::Result<()> {
    let mut broker = MockBroker::with_documents(vec![("healthz", fixtures::healthz_ok())]).await?;
    let coll = collector("healthz", vec![CollectedServer::new("id", broker.url())]);

    let (result, samples) = scrape(&coll).await;
    assert!(result.is_ok());
    assert_eq!(value_of(&samples, "gnatsd_healthz_status"), Some(0.0));
    assert_eq!(value_of(&samples, "gnatsd_healthz_status_value"), Some(1.0));

    broker.shutdown().await;

    let (_, samples) = scrape(&coll).await;
    assert_ne!(value_of(&samples, "gnatsd_healthz_status_value"), Some(1.0));
    assert!(samples.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_unhealthy_status() -> anyhow::Result<()> {
    let broker =
        MockBroker::with_documents(vec![("healthz", fixtures::healthz_unavailable())]).await?;
    let coll = collector("healthz", vec![CollectedServer::new("id", broker.url())]);

    let (_, samples) = scrape(&coll).await;
    assert_eq!(value_of(&samples, "gnatsd_healthz_status"), Some(1.0));
    assert_eq!(value_of(&samples, "gnatsd_healthz_status_value"), Some(0.0));

    let status = samples
        .iter()
        .find(|s| s.name() == "gnatsd_healthz_status_value")
        .unwrap();
    assert_eq!(status.label("status"), Some("unavailable"));
    Ok(())
}

#[tokio::test]
async fn test_malformed_json_is_a_fetch_failure() -> anyhow::Result<()> {
    let bad = MockBroker::start().await?;
    bad.serve_raw("varz", "{\"connections\": 1,");
    let good = MockBroker::with_documents(vec![("varz", fixtures::varz())]).await?;

    let coll = collector(
        "varz",
        vec![
            CollectedServer::new("bad", bad.url()),
            CollectedServer::new("good", good.url()),
        ],
    );

    let (result, samples) = scrape(&coll).await;
    assert_eq!(result?.failed, 1);
    assert!(samples.iter().all(|s| s.label("server_id") == Some("good")));
    Ok(())
}

#[tokio::test]
async fn test_slow_server_times_out_without_blocking_siblings() -> anyhow::Result<()> {
    let slow = MockBroker::with_documents(vec![("varz", fixtures::varz())]).await?;
    slow.set_delay(TEST_TIMEOUT * 4);
    let fast = MockBroker::with_documents(vec![("varz", fixtures::varz())]).await?;

    let coll = collector(
        "varz",
        vec![
            CollectedServer::new("slow", slow.url()),
            CollectedServer::new("fast", fast.url()),
        ],
    );

    let started = Instant::now();
    let (result, samples) = scrape(&coll).await;
    assert!(started.elapsed() < TEST_TIMEOUT * 3);

    assert_eq!(result?.failed, 1);
    assert!(!samples.is_empty());
    assert!(samples.iter().all(|s| s.label("server_id") == Some("fast")));
    Ok(())
}

#[tokio::test]
async fn test_unknown_endpoint_is_legal() -> anyhow::Result<()> {
    let broker = MockBroker::with_documents(vec![("varz", fixtures::varz())]).await?;
    let coll = collector("GARBAGE", vec![CollectedServer::new("myid", broker.url())]);
    assert_eq!(coll.endpoint(), "GARBAGE");

    let (result, samples) = scrape(&coll).await;
    assert!(result.is_err());
    assert!(samples.is_empty());
    assert!(coll.stats().is_empty());
    assert_eq!(broker.requests(), 1);
    Ok(())
}

#[tokio::test]
async fn test_stats_track_latest_scrape() -> anyhow::Result<()> {
    let mut broker = MockBroker::with_documents(vec![("varz", fixtures::varz())]).await?;
    let server = CollectedServer::new("myid", broker.url());

    // Duplicate servers are tolerated
    let coll = collector("varz", vec![server.clone(), server]);
    assert!(coll.stats().is_empty());

    scrape(&coll).await.0?;
    assert!(coll.stats()["myid"] > 0);

    broker.shutdown().await;
    let _ = scrape(&coll).await;
    assert!(coll.stats().is_empty());
    Ok(())
}
