//! Integration tests for the snapshot storage pass

use crate::integration::test_utils::{cim_response, Fixture, PassThrough, Scripted};
use std::sync::Arc;
use wbem_export::client::{response_channel, QueryToken, RawResponse};
use wbem_export::error::ExportError;
use wbem_export::export::PendingJob;
use wbem_export::session::{ExportSession, SessionOptions};
use wbem_export::storage::{FileMessageStore, MessageDiff, MessageStore, SnapshotMessage};

const INDEX: &str = r#"<objects>
  <object path="root/cimv2:CIM_OperatingSystem" id="OS" title="OS"/>
  <object path="root/suse:SUSE_Package" id="pkgs" title="Packages" type="instance"/>
</objects>"#;

#[tokio::test]
async fn test_snapshot_stores_every_provider() {
    let fx = Fixture::new();
    let manifest = fx.manifest(INDEX, "<map/>");
    let (tx, rx) = response_channel();
    let client = Arc::new(crate::integration::test_utils::ScriptedClient::new("hostA", tx));
    client.on("SUSE_Package", Scripted::Respond(cim_response("pkg\nlist")));

    let store_root = fx.path().join("store");
    let store = FileMessageStore::new(&store_root, true).unwrap();
    let correlator = fx
        .correlator("hostA", Arc::new(PassThrough))
        .with_stores(vec![Box::new(store)]);
    let mut session = ExportSession::new(
        client.clone(),
        rx,
        correlator,
        manifest,
        SessionOptions {
            namespace: "root/cimv2".to_string(),
            response_timeout: std::time::Duration::from_millis(200),
        },
    );

    let report = session.snapshot().await.unwrap();
    assert_eq!(report.queries, 2);
    assert_eq!(report.delivered, 2);
    assert!(store_root.join("hostA").join("os.lmx").exists());
    assert!(store_root.join("hostA").join("pkgs.lmx").exists());

    // stored payloads are single-line
    let reader = FileMessageStore::new(&store_root, true).unwrap();
    let probe = SnapshotMessage::new("hostA", "pkgs", None, "");
    let stored = reader.load(&probe).unwrap().unwrap();
    assert!(!stored.contains('\n'));
    assert!(stored.contains("pkglist"));

    let same = SnapshotMessage::new("hostA", "pkgs", None, stored);
    assert_eq!(reader.diff_message(&same).unwrap(), MessageDiff::Unchanged);
}

#[test]
fn test_second_pending_job_is_rejected() {
    let fx = Fixture::new();
    let mut correlator = fx.correlator("hostA", Arc::new(PassThrough));
    let first = QueryToken::next();
    correlator
        .submit(
            first,
            PendingJob::Store {
                provider_id: "OS".to_string(),
                object_class: None,
            },
        )
        .unwrap();

    let err = correlator
        .submit(
            QueryToken::next(),
            PendingJob::Store {
                provider_id: "pkgs".to_string(),
                object_class: None,
            },
        )
        .unwrap_err();
    assert!(matches!(err, ExportError::CorrelatorBusy { .. }));
    assert!(err.is_fatal());

    // the first job is still the one consumed
    let outcome = correlator.on_raw_response(RawResponse::new(Some(first), cim_response("x")));
    assert_eq!(outcome.provider_id.as_deref(), Some("OS"));
}
