//! Integration tests for artifact dispatch to the export tree

use crate::integration::test_utils::Fixture;
use wbem_export::export::Dispatcher;
use wbem_export::error::ExportError;

#[test]
fn test_file_dispatch_overwrites_existing_artifact() {
    let fx = Fixture::new();
    fx.write("export/hostA/report.xml", "stale content that is longer");

    let dispatcher = Dispatcher::with_writers(
        fx.export_root(),
        Box::new(std::io::sink()),
        Box::new(std::io::sink()),
    );
    let path = dispatcher
        .dispatch("<report/>", "hostA", "file:report.xml")
        .unwrap()
        .unwrap();

    assert_eq!(path, fx.export_root().join("hostA").join("report.xml"));
    assert_eq!(std::fs::read_to_string(path).unwrap(), "<report/>");
}

#[test]
fn test_hosts_get_separate_directories() {
    let fx = Fixture::new();
    let dispatcher = Dispatcher::new(fx.export_root());
    dispatcher.dispatch("one", "web01", "file:r.txt").unwrap();
    dispatcher.dispatch("two", "db01", "file:r.txt").unwrap();
    assert_eq!(
        std::fs::read_to_string(fx.export_root().join("web01/r.txt")).unwrap(),
        "one"
    );
    assert_eq!(
        std::fs::read_to_string(fx.export_root().join("db01/r.txt")).unwrap(),
        "two"
    );
}

#[test]
fn test_malformed_descriptors_are_rejected() {
    let fx = Fixture::new();
    let dispatcher = Dispatcher::new(fx.export_root());
    for descriptor in ["", "report.xml", "smtp:ops@example.com"] {
        let err = dispatcher.dispatch("x", "hostA", descriptor).unwrap_err();
        assert!(matches!(err, ExportError::BadDescriptor { .. }), "{:?}", descriptor);
    }
    assert!(!fx.export_root().exists());
}
