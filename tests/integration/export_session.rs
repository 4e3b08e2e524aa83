//! Integration tests for the export session: end-to-end export, merges,
//! timeouts and per-provider failure containment.

use crate::integration::test_utils::{cim_response, Fixture, PassThrough, Scripted, Tagging};
use std::sync::Arc;
use wbem_export::client::QueryRequest;
use wbem_export::error::ExportError;

const INDEX: &str = r#"<?xml version="1.0"?>
<objects>
  <object path="root/cimv2" id="p1" title="Foo">
    <query>SELECT * FROM Foo</query>
  </object>
  <object path="root/cimv2:A" id="a" title="A"/>
  <object path="root/cimv2:B" id="b" title="B"/>
  <object path="root/cimv2:C" id="c" title="C"/>
</objects>"#;

const MAP: &str = r#"<?xml version="1.0"?>
<map>
  <destination name="d1" title="Single">
    <ref id="p1"><render id="r1" out="file:out.txt"/></ref>
  </destination>
  <destination name="inv" title="Inventory">
    <merge id="inventory" out="file:inventory.xml">
      <ref id="a"/><ref id="b"/><ref id="c"/>
    </merge>
  </destination>
  <destination name="both" title="Two refs">
    <ref id="a"><render id="r1" out="file:a.txt"/></ref>
    <ref id="b"><render id="r1" out="file:b.txt"/></ref>
  </destination>
</map>"#;

#[tokio::test]
async fn test_export_single_ref_end_to_end() {
    let fx = Fixture::new();
    fx.stylesheet("r1");
    let (mut session, client) = fx.session(fx.manifest(INDEX, MAP), Arc::new(Tagging));
    client.on("SELECT * FROM Foo", Scripted::Respond(cim_response("foo")));

    let report = session.export(&["d1".to_string()]).await.unwrap();

    assert_eq!(
        client.submitted(),
        vec![QueryRequest::ExecQuery {
            namespace: "root/cimv2".to_string(),
            query: "SELECT * FROM Foo".to_string(),
        }]
    );
    assert_eq!(report.queries, 1);
    assert_eq!(report.delivered, 1);
    assert!(report.is_clean());

    let written = std::fs::read_to_string(fx.export_root().join("hostA").join("out.txt")).unwrap();
    assert_eq!(
        written,
        "[r1]<?xml version=\"1.0\" encoding=\"utf-8\"?><CIM CIMVERSION=\"2.0\"><VALUE>foo</VALUE></CIM>"
    );
    let entries: Vec<_> = std::fs::read_dir(fx.export_root().join("hostA"))
        .unwrap()
        .collect();
    assert_eq!(entries.len(), 1);
}

#[tokio::test]
async fn test_merge_of_three_refs_yields_one_artifact_in_ref_order() {
    let fx = Fixture::new();
    fx.stylesheet("inventory");
    let (mut session, client) = fx.session(fx.manifest(INDEX, MAP), Arc::new(PassThrough));
    client
        .on("SELECT * FROM A", Scripted::Respond(cim_response("a")))
        .on("SELECT * FROM B", Scripted::RespondUntagged(cim_response("b")))
        .on("SELECT * FROM C", Scripted::Respond(cim_response("c")));

    let report = session.export(&["inv".to_string()]).await.unwrap();
    assert_eq!(report.queries, 3);
    assert_eq!(report.delivered, 1);
    assert!(report.dropped_merges.is_empty());

    let merged =
        std::fs::read_to_string(fx.export_root().join("hostA").join("inventory.xml")).unwrap();
    let a = merged.find("<VALUE>a</VALUE>").unwrap();
    let b = merged.find("<VALUE>b</VALUE>").unwrap();
    let c = merged.find("<VALUE>c</VALUE>").unwrap();
    assert!(a < b && b < c);
    assert!(merged.starts_with("<MERGED>"));
    assert!(!merged.contains("<?xml"));
}

#[tokio::test]
async fn test_merge_with_missing_member_writes_nothing() {
    let fx = Fixture::new();
    fx.stylesheet("inventory");
    let (mut session, client) = fx.session(fx.manifest(INDEX, MAP), Arc::new(PassThrough));
    client.on("SELECT * FROM C", Scripted::Silent);

    let report = session.export(&["inv".to_string()]).await.unwrap();
    assert_eq!(report.delivered, 0);
    assert_eq!(report.dropped_merges.len(), 1);
    assert!(report.dropped_merges[0].contains('c'));
    assert!(report
        .failures
        .iter()
        .any(|f| f.subject == "c" && f.message.contains("Timed out")));
    assert!(!fx.export_root().join("hostA").join("inventory.xml").exists());
}

#[tokio::test]
async fn test_failing_provider_does_not_stop_export() {
    let fx = Fixture::new();
    fx.stylesheet("r1");
    let (mut session, client) = fx.session(fx.manifest(INDEX, MAP), Arc::new(PassThrough));
    client.on("SELECT * FROM A", Scripted::Fail("connection refused".to_string()));

    let report = session.export(&["both".to_string()]).await.unwrap();
    assert_eq!(report.queries, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].subject, "a");
    assert!(!fx.export_root().join("hostA").join("a.txt").exists());
    assert!(fx.export_root().join("hostA").join("b.txt").exists());
}

#[tokio::test]
async fn test_timeout_clears_pending_job_and_continues() {
    let fx = Fixture::new();
    fx.stylesheet("r1");
    let (mut session, client) = fx.session(fx.manifest(INDEX, MAP), Arc::new(PassThrough));
    client.on("SELECT * FROM A", Scripted::Silent);

    let report = session.export(&["both".to_string()]).await.unwrap();
    assert_eq!(report.delivered, 1);
    assert!(report.failures[0].message.contains("Timed out"));
    assert!(fx.export_root().join("hostA").join("b.txt").exists());
}

#[tokio::test]
async fn test_missing_stylesheet_skips_only_that_job() {
    let fx = Fixture::new();
    let (mut session, _client) = fx.session(fx.manifest(INDEX, MAP), Arc::new(PassThrough));

    let report = session.export(&["d1".to_string()]).await.unwrap();
    assert_eq!(report.delivered, 0);
    assert!(report.failures[0].message.contains("r1"));
}

#[tokio::test]
async fn test_unknown_destination_fails_before_any_query() {
    let fx = Fixture::new();
    fx.stylesheet("r1");
    let (mut session, client) = fx.session(fx.manifest(INDEX, MAP), Arc::new(PassThrough));

    let err = session
        .export(&["d1".to_string(), "nope".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, ExportError::NotFound(_)));
    assert!(err.to_string().contains("nope"));
    assert!(client.submitted().is_empty());
}

#[tokio::test]
async fn test_classes_come_from_client() {
    let fx = Fixture::new();
    let (session, _client) = fx.session(fx.manifest(INDEX, MAP), Arc::new(PassThrough));
    let classes = session.classes().await.unwrap();
    assert!(classes.contains(&"CIM_OperatingSystem".to_string()));
}

#[tokio::test]
async fn test_describe_issues_one_query_per_class() {
    let fx = Fixture::new();
    let (mut session, client) = fx.session(fx.manifest(INDEX, MAP), Arc::new(PassThrough));
    let report = session
        .describe(&["CIM_Process".to_string(), "CIM_Service".to_string()])
        .await
        .unwrap();
    assert_eq!(report.queries, 2);
    assert!(report.failures.is_empty());
    assert_eq!(client.submitted().len(), 2);
}

#[tokio::test]
async fn test_timeout_covers_submit_that_never_returns() {
    let fx = Fixture::new();
    fx.stylesheet("r1");
    let (mut session, client) = fx.session(fx.manifest(INDEX, MAP), Arc::new(PassThrough));
    client
        .on("SELECT * FROM A", Scripted::Stall)
        .on("SELECT * FROM B", Scripted::Respond(cim_response("b")));

    let report = tokio::time::timeout(
        std::time::Duration::from_secs(3),
        session.export(&["both".to_string()]),
    )
    .await
    .expect("export outlived the response timeout")
    .unwrap();

    assert_eq!(report.queries, 2);
    assert_eq!(report.delivered, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].subject, "a");
    assert!(report.failures[0].message.contains("Timed out"));
    assert!(fx.export_root().join("hostA").join("b.txt").exists());
    assert!(!fx.export_root().join("hostA").join("a.txt").exists());
}
