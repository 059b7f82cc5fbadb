//! End-to-end enrollment flow against in-memory stores

use std::sync::Arc;

use gatehouse::db::schemas::MemorySnapshot;
use gatehouse::keys::{decode_public, unwrap_key, wrap_key, RSA_KEY_BITS};
use gatehouse::ledger::{InMemoryKeyLedger, KeyExchangeLedger};
use gatehouse::protocol::{DeviceId, ProtocolConfig, ProtocolHandlers, SubmissionMeta};
use gatehouse::registry::{DeviceRegistry, InMemoryDeviceRegistry};
use gatehouse::GatehouseError;
use rsa::traits::PublicKeyParts;

struct Harness {
    protocol: ProtocolHandlers,
    registry: Arc<InMemoryDeviceRegistry>,
    ledger: Arc<InMemoryKeyLedger>,
}

fn harness() -> Harness {
    let registry = Arc::new(InMemoryDeviceRegistry::new());
    let ledger = Arc::new(InMemoryKeyLedger::new());
    let protocol = ProtocolHandlers::new(
        registry.clone(),
        ledger.clone(),
        ProtocolConfig::default(),
    );
    Harness {
        protocol,
        registry,
        ledger,
    }
}

fn device(id: &str) -> DeviceId {
    DeviceId::parse(id).expect("valid device id")
}

#[tokio::test]
async fn test_full_enrollment_recovers_symmetric_key() {
    let h = harness();
    let id = device("abc123");

    let registered = h
        .protocol
        .register(&id, br#"{"hostname": "host1", "os": "linux", "numCpu": 4}"#)
        .await
        .expect("register");
    assert_eq!(registered.config.policy.heartbeat_interval, 300);
    assert_eq!(registered.config.policy.retry_policy.max_retries, 5);

    let public_pem = h.protocol.provision_keys(&id).await.expect("provision");
    let public_key = decode_public(&public_pem).expect("valid PEM");
    assert_eq!(public_key.size() * 8, RSA_KEY_BITS);

    let symmetric_key = [0x5a_u8; 32];
    let wrapped = wrap_key(&public_key, &symmetric_key).expect("wrap");
    let body = serde_json::json!({ "data": { "wrappedKey": wrapped } }).to_string();

    let submitted = h
        .protocol
        .submit_wrapped_key(
            &id,
            body.as_bytes(),
            SubmissionMeta {
                client_version: "1.4.2".into(),
                request_type: "initial".into(),
            },
        )
        .await
        .expect("submit");
    assert!(submitted.next > registered.config.next_checkin);

    let record = h.registry.get("abc123").await.unwrap().expect("device record");
    assert_eq!(record.hostname, "host1");
    assert_eq!(record.public_key, public_pem);
    assert_eq!(record.wrapped_aes.as_deref(), Some(wrapped.as_str()));

    let history = h.ledger.history("abc123").await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(Some(history[0].associated_to), record.id);
    assert_eq!(history[0].client_version, "1.4.2");

    let recovered = unwrap_key(record.private_key.expose(), &history[0].wrapped_key).unwrap();
    assert_eq!(recovered.as_slice(), &symmetric_key);
}

#[tokio::test]
async fn test_double_registration_keeps_one_record() {
    let h = harness();
    let id = device("abc123");

    h.protocol.register(&id, br#"{"hostname": "host1"}"#).await.unwrap();
    let first = h.registry.get("abc123").await.unwrap().unwrap();

    h.protocol.heartbeat(&id, b"{}").await.unwrap();
    h.protocol.register(&id, br#"{"hostname": "host1"}"#).await.unwrap();
    let second = h.registry.get("abc123").await.unwrap().unwrap();

    assert_eq!(h.registry.len(), 1);
    assert_eq!(second.connection_count, 2);
    assert_eq!(second.created_at, first.created_at);
    assert_eq!(second.id, first.id);
    assert_eq!(second.heartbeat_count, 1);
}

#[tokio::test]
async fn test_heartbeats_overwrite_latest_report() {
    let h = harness();
    let id = device("abc123");
    h.protocol.register(&id, b"{}").await.unwrap();

    for n in 1..=4u64 {
        let body = serde_json::json!({
            "geo": { "ip": "198.51.100.7", "city": "Lyon", "region": "ARA", "country": "FR" },
            "uptime": format!("{n}m"),
            "mem": { "total": 16_000, "used": 1_000 * n, "proc": 40 },
            "nonce": format!("nonce-{n}"),
        });
        h.protocol
            .heartbeat(&id, body.to_string().as_bytes())
            .await
            .unwrap();
    }

    let record = h.registry.get("abc123").await.unwrap().unwrap();
    assert_eq!(record.heartbeat_count, 4);
    assert_eq!(record.uptime.as_deref(), Some("4m"));
    assert_eq!(record.last_nonce.as_deref(), Some("nonce-4"));
    assert_eq!(record.geo.city, "Lyon");
    assert_eq!(
        record.memory,
        Some(MemorySnapshot {
            total: 16_000,
            used: 4_000,
            proc: 40
        })
    );
}

#[tokio::test]
async fn test_submission_before_registration_is_rejected() {
    let h = harness();

    let err = h
        .protocol
        .submit_wrapped_key(
            &device("never-seen"),
            br#"{"data": {"wrappedKey": "AAAA"}}"#,
            SubmissionMeta::default(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, GatehouseError::NotFound(_)));
    assert!(h.ledger.is_empty());
    assert!(h.registry.is_empty());
}

#[tokio::test]
async fn test_invalid_wrapped_key_leaves_no_ledger_entry() {
    let h = harness();
    let id = device("abc123");
    h.protocol.register(&id, b"{}").await.unwrap();

    for body in [
        r#"{"data": {"wrappedKey": ""}}"#,
        r#"{"data": {"wrappedKey": ["AAAA"]}}"#,
        r#"{"data": {"other": "AAAA"}}"#,
    ] {
        let err = h
            .protocol
            .submit_wrapped_key(&id, body.as_bytes(), SubmissionMeta::default())
            .await
            .unwrap_err();
        assert!(err.is_client_error(), "{body} should be a client error");
    }

    assert!(h.ledger.is_empty());
    let record = h.registry.get("abc123").await.unwrap().unwrap();
    assert!(record.wrapped_aes.is_none());
}

#[tokio::test]
async fn test_every_submission_is_kept_in_order() {
    let h = harness();
    let id = device("abc123");
    h.protocol.register(&id, b"{}").await.unwrap();

    for key in ["W1", "W2", "W3"] {
        let body = serde_json::json!({ "data": { "wrappedKey": key } }).to_string();
        h.protocol
            .submit_wrapped_key(&id, body.as_bytes(), SubmissionMeta::default())
            .await
            .unwrap();
    }

    let history: Vec<String> = h
        .ledger
        .history("abc123")
        .await
        .unwrap()
        .into_iter()
        .map(|entry| entry.wrapped_key)
        .collect();
    assert_eq!(history, ["W1", "W2", "W3"]);

    let record = h.registry.get("abc123").await.unwrap().unwrap();
    assert_eq!(record.wrapped_aes.as_deref(), Some("W3"));
}

#[tokio::test]
async fn test_reprovisioning_replaces_retained_pair() {
    let h = harness();
    let id = device("abc123");
    h.protocol.register(&id, b"{}").await.unwrap();

    let first = h.protocol.provision_keys(&id).await.unwrap();
    let second = h.protocol.provision_keys(&id).await.unwrap();
    assert_ne!(first, second);

    let record = h.registry.get("abc123").await.unwrap().unwrap();
    assert_eq!(record.public_key, second);

    // A key wrapped under the superseded public key no longer unwraps
    let stale = wrap_key(&decode_public(&first).unwrap(), b"k").unwrap();
    assert!(unwrap_key(record.private_key.expose(), &stale).is_err());
}

#[tokio::test]
async fn test_reregistration_resets_enrollment_keys() {
    let h = harness();
    let id = device("abc123");

    h.protocol.register(&id, br#"{"hostname": "host1"}"#).await.unwrap();
    h.protocol.provision_keys(&id).await.unwrap();
    h.protocol
        .submit_wrapped_key(
            &id,
            br#"{"data": {"wrappedKey": "W"}}"#,
            SubmissionMeta::default(),
        )
        .await
        .unwrap();

    h.protocol
        .register(&id, br#"{"hostname": "host1", "goVersion": "go1.22.4"}"#)
        .await
        .unwrap();

    let record = h.registry.get("abc123").await.unwrap().unwrap();
    assert!(record.public_key.is_empty());
    assert!(record.private_key.is_empty());
    assert!(record.wrapped_aes.is_none());
    assert_eq!(record.go_version, "go1.22.4");
    assert_eq!(record.connection_count, 2);

    // The ledger keeps the submission made under the previous keypair
    assert_eq!(h.ledger.history("abc123").await.unwrap().len(), 1);
}
