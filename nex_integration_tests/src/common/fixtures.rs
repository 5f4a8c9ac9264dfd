//! Canned monitoring documents, trimmed from real server output

use serde_json::{json, Value};

pub const SERVER_ID: &str = "NACDVKFBUW4C4XA24OOT6L4MDP56MW76J5RJDFXG7HLABSB46DCMWCOW";

/// A server with one client connected, 61 subscriptions and 5 bytes each way
pub fn varz() -> Value {
    json!({
        "server_id": SERVER_ID,
        "server_name": "nats-east-1",
        "version": "2.10.18",
        "proto": 1,
        "go": "go1.22.5",
        "host": "0.0.0.0",
        "port": 4222,
        "auth_required": false,
        "max_connections": 65536,
        "ping_interval": 120000000000_u64,
        "ping_max": 2,
        "http_port": 8222,
        "max_payload": 1048576,
        "start": "2024-05-01T10:00:00.123456789Z",
        "now": "2024-05-01T10:05:00.000000000Z",
        "uptime": "5m0s",
        "mem": 15958016,
        "cores": 8,
        "gomaxprocs": 8,
        "cpu": 0.5,
        "connections": 1,
        "total_connections": 3,
        "routes": 0,
        "remotes": 0,
        "leafnodes": 0,
        "in_msgs": 1,
        "out_msgs": 1,
        "in_bytes": 5,
        "out_bytes": 5,
        "slow_consumers": 0,
        "subscriptions": 61,
        "http_req_stats": {"/": 0, "/varz": 2, "/connz": 1},
        "config_load_time": "2024-05-01T10:00:00.123456789Z",
        "cluster": {"addr": "0.0.0.0", "cluster_port": 0, "auth_timeout": 0},
        "gateway": {"name": "", "port": 0, "auth_timeout": 0},
        "leaf": {"port": 0, "auth_timeout": 0}
    })
}

pub fn connz() -> Value {
    json!({
        "server_id": SERVER_ID,
        "now": "2024-05-01T10:05:00.000000000Z",
        "num_connections": 1,
        "total": 1,
        "offset": 0,
        "limit": 1024,
        "connections": [{
            "cid": 3,
            "kind": "Client",
            "type": "nats",
            "ip": "127.0.0.1",
            "port": 52344,
            "start": "2024-05-01T10:04:59.000000000Z",
            "last_activity": "2024-05-01T10:04:59.500000000Z",
            "rtt": "120µs",
            "uptime": "1s",
            "idle": "0s",
            "pending_bytes": 0,
            "in_msgs": 1,
            "out_msgs": 1,
            "in_bytes": 5,
            "out_bytes": 5,
            "subscriptions": 1,
            "name": "publisher",
            "lang": "go",
            "version": "1.31.0"
        }]
    })
}

pub fn subsz() -> Value {
    json!({
        "server_id": SERVER_ID,
        "now": "2024-05-01T10:05:00.000000000Z",
        "num_subscriptions": 61,
        "num_cache": 2,
        "num_inserts": 61,
        "num_removes": 0,
        "num_matches": 4,
        "cache_hit_rate": 0.5,
        "max_fanout": 1,
        "avg_fanout": 1.0,
        "total": 0,
        "offset": 0,
        "limit": 1024
    })
}

pub fn routez() -> Value {
    json!({
        "server_id": SERVER_ID,
        "now": "2024-05-01T10:05:00.000000000Z",
        "num_routes": 1,
        "routes": [{
            "rid": 1,
            "remote_id": "NBROUTE",
            "did_solicit": true,
            "is_configured": true,
            "ip": "10.0.0.2",
            "port": 6222,
            "pending_size": 0,
            "rtt": "300µs",
            "in_msgs": 7,
            "out_msgs": 9,
            "in_bytes": 70,
            "out_bytes": 90,
            "subscriptions": 4
        }]
    })
}

pub fn healthz_ok() -> Value {
    json!({"status": "ok"})
}

pub fn healthz_unavailable() -> Value {
    json!({"status": "unavailable", "error": "JetStream has not established contact with a meta leader"})
}

/// Two leaf links, the second without a name
pub fn leafz() -> Value {
    json!({
        "server_id": SERVER_ID,
        "now": "2024-05-01T10:05:00.000000000Z",
        "leafnodes": 2,
        "leafs": [
            {
                "name": "leafz_server",
                "is_spoke": false,
                "account": "$G",
                "ip": "127.0.0.1",
                "port": 6223,
                "rtt": "200µs",
                "in_msgs": 0,
                "out_msgs": 10000,
                "in_bytes": 0,
                "out_bytes": 1000000,
                "subscriptions": 1,
                "subscriptions_list": ["foo"]
            },
            {
                "account": "$G",
                "is_spoke": false,
                "ip": "127.0.0.2",
                "port": 6224,
                "rtt": "200µs",
                "in_msgs": 0,
                "out_msgs": 10000,
                "in_bytes": 0,
                "out_bytes": 1000000,
                "subscriptions": 1
            }
        ]
    })
}

pub fn jsz() -> Value {
    json!({
        "server_id": SERVER_ID,
        "now": "2024-05-01T10:05:00.000000000Z",
        "config": {"max_memory": 1073741824, "max_storage": 10737418240_u64, "store_dir": "/data", "domain": "hub"},
        "memory": 0,
        "storage": 66,
        "reserved_memory": 0,
        "reserved_storage": 0,
        "accounts": 1,
        "ha_assets": 0,
        "api": {"total": 6, "errors": 0},
        "streams": 1,
        "consumers": 1,
        "messages": 3,
        "bytes": 66,
        "meta_cluster": {"name": "east", "leader": "nats-east-1", "cluster_size": 3}
    })
}

/// Two accounts; the first owns one stream with one consumer
pub fn jsz_accounts() -> Value {
    json!({
        "server_id": "SERVER_ID",
        "now": "2024-05-01T10:05:00.000000000Z",
        "streams": 1,
        "consumers": 1,
        "account_details": [
            {
                "name": "account1",
                "id": "account1",
                "memory": 234567890,
                "storage": 3456789012_u64,
                "reserved_memory": 1073741824,
                "reserved_storage": 10737418240_u64,
                "accounts": 1,
                "api": {"total": 12, "errors": 1},
                "stream_detail": [{
                    "name": "ORDERS",
                    "created": "2024-05-01T10:00:00Z",
                    "cluster": {"leader": "nats-east-1"},
                    "config": {"subjects": ["orders.>"], "replicas": 1},
                    "state": {"messages": 3, "bytes": 120, "first_seq": 1, "last_seq": 3, "consumer_count": 1},
                    "consumer_detail": [{
                        "name": "worker",
                        "config": {"description": "order worker", "durable_name": "worker"},
                        "delivered": {"consumer_seq": 3, "stream_seq": 3},
                        "num_ack_pending": 1,
                        "num_redelivered": 0,
                        "num_waiting": 0,
                        "num_pending": 0
                    }]
                }]
            },
            {
                "name": "account2",
                "id": "account2",
                "memory": 123456789,
                "storage": 1356789012_u64,
                "reserved_memory": 536870912,
                "reserved_storage": 5368709120_u64
            }
        ]
    })
}

pub fn gatewayz() -> Value {
    json!({
        "server_id": SERVER_ID,
        "now": "2024-05-01T10:05:00.000000000Z",
        "name": "east",
        "host": "0.0.0.0",
        "port": 7222,
        "outbound_gateways": {
            "west": {
                "configured": true,
                "connection": {
                    "cid": 7, "ip": "10.1.0.2", "port": 7222,
                    "start": "2024-05-01T10:00:00Z", "last_activity": "2024-05-01T10:04:00Z",
                    "rtt": "1ms", "pending_bytes": 0,
                    "in_msgs": 4, "out_msgs": 8, "in_bytes": 40, "out_bytes": 80, "subscriptions": 0
                }
            }
        },
        "inbound_gateways": {
            "west": [{"configured": false, "connection": {"cid": 8, "ip": "10.1.0.2", "port": 50412, "in_msgs": 2}}]
        }
    })
}

pub fn accstatz() -> Value {
    json!({
        "server_id": SERVER_ID,
        "now": "2024-05-01T10:05:00.000000000Z",
        "account_statz": [
            {
                "acc": "$G",
                "name": "global",
                "conns": 1,
                "leafnodes": 0,
                "total_conns": 1,
                "num_subscriptions": 3,
                "sent": {"msgs": 10, "bytes": 100},
                "received": {"msgs": 20, "bytes": 200},
                "slow_consumers": 0
            },
            {
                "acc": "$SYS",
                "conns": 0,
                "leafnodes": 0,
                "total_conns": 0,
                "num_subscriptions": 58,
                "sent": {"msgs": 0, "bytes": 0},
                "received": {"msgs": 0, "bytes": 0},
                "slow_consumers": 0
            }
        ]
    })
}

/// Every canned document keyed by the path the exporter requests
pub fn all_endpoints() -> Vec<(&'static str, Value)> {
    vec![
        ("varz", varz()),
        ("connz", connz()),
        ("subsz", subsz()),
        ("routez", routez()),
        ("healthz", healthz_ok()),
        ("leafz", leafz()),
        ("gatewayz", gatewayz()),
        ("accstatz?unused=1", accstatz()),
        ("jsz", jsz()),
        (
            "jsz?accounts=true&streams=true&consumers=true&config=true",
            jsz_accounts(),
        ),
    ]
}
