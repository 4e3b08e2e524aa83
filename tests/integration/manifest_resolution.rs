//! Integration tests for provider index resolution and destination loading

use crate::integration::test_utils::Fixture;
use wbem_export::error::ExportError;
use wbem_export::manifest::{DestinationMap, ManifestResolver};

#[test]
fn test_included_document_redefinition_wins() {
    let fx = Fixture::new();
    fx.write(
        "info/b.xml",
        r#"<objects>
  <object path="root/suse:SUSE_OperatingSystem" id="os" title="From B"/>
</objects>"#,
    );
    let root = fx.write(
        "info/a.xml",
        r#"<objects>
  <object path="root/cimv2:CIM_OperatingSystem" id="os" title="From A"/>
  <object path="root/cimv2:CIM_Process" id="proc" title="Processes"/>
  <include url="b.xml"/>
</objects>"#,
    );

    let index = ManifestResolver::new().resolve(&root).unwrap();
    let os = index.get("os").unwrap();
    assert_eq!(os.title, "From B");
    assert_eq!(os.namespace, "root/suse");
    assert_eq!(os.query, "SELECT * FROM SUSE_OperatingSystem");
    assert!(index.contains("proc"));
}

#[test]
fn test_definition_after_include_wins_over_included() {
    let fx = Fixture::new();
    fx.write(
        "b.xml",
        r#"<objects><object path="ns:FromB" id="x" title="B"/></objects>"#,
    );
    let root = fx.write(
        "a.xml",
        r#"<objects><include url="b.xml"/><object path="ns:FromA" id="x" title="A"/></objects>"#,
    );
    let index = ManifestResolver::new().resolve(&root).unwrap();
    assert_eq!(index.get("x").unwrap().title, "A");
}

#[test]
fn test_nested_includes_resolve_relative_to_including_document() {
    let fx = Fixture::new();
    fx.write(
        "info/extra/deep.xml",
        r#"<objects><object path="root/cimv2:Deep" id="deep"/></objects>"#,
    );
    fx.write(
        "info/extra/mid.xml",
        r#"<objects><include url="deep.xml"/></objects>"#,
    );
    let root = fx.write(
        "info/index.xml",
        r#"<objects><include url="extra/mid.xml"/></objects>"#,
    );
    let index = ManifestResolver::new().resolve(&root).unwrap();
    assert!(index.contains("deep"));
}

#[test]
fn test_include_cycle_is_config_error() {
    let fx = Fixture::new();
    fx.write("a.xml", r#"<objects><include url="b.xml"/></objects>"#);
    fx.write("b.xml", r#"<objects><include url="c.xml"/></objects>"#);
    fx.write("c.xml", r#"<objects><include url="a.xml"/></objects>"#);
    let err = ManifestResolver::new()
        .resolve(&fx.path().join("a.xml"))
        .unwrap_err();
    assert!(matches!(err, ExportError::ConfigError(_)));
}

#[test]
fn test_destination_with_unknown_provider_names_destination() {
    let fx = Fixture::new();
    let root = fx.write(
        "index.xml",
        r#"<objects><object path="root/cimv2:Foo" id="p1"/></objects>"#,
    );
    let index = ManifestResolver::new().resolve(&root).unwrap();
    let map = fx.write(
        "map.xml",
        r#"<map>
  <destination name="good" title="Good"><ref id="p1"/></destination>
  <destination name="broken" title="Broken"><merge id="m" out="file:m.xml"><ref id="p1"/><ref id="p9"/></merge></destination>
</map>"#,
    );
    let err = DestinationMap::load(&map, &index).unwrap_err();
    assert!(matches!(err, ExportError::ConfigError(_)));
    assert!(err.to_string().contains("broken"));
}

#[test]
fn test_unregistered_destination_is_not_found_with_name() {
    let fx = Fixture::new();
    let manifest = fx.manifest(
        r#"<objects><object path="root/cimv2:Foo" id="p1"/></objects>"#,
        r#"<map><destination name="d1" title="D1"><ref id="p1"/></destination></map>"#,
    );
    let err = manifest
        .destinations
        .get_destination_by_name("cmdb-unknown")
        .unwrap_err();
    assert!(matches!(err, ExportError::NotFound(_)));
    assert!(err.to_string().contains("cmdb-unknown"));
}
