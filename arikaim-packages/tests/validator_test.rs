//! Requirement validation against installed packages

mod common;

use arikaim_packages::{DependencyToken, PackageType, Requirements};
use common::{write_package, Sandbox};
use std::fs;

#[test]
fn test_token_forms() {
    let full = DependencyToken::parse("foo:1.2:optional");
    assert_eq!(full.name, "foo");
    assert_eq!(full.version.as_deref(), Some("1.2"));
    assert!(full.optional);

    let optional = DependencyToken::parse("foo:optional");
    assert_eq!(optional.version, None);
    assert!(optional.optional);

    let bare = DependencyToken::parse("foo");
    assert_eq!(bare.version, None);
    assert!(!bare.optional);
}

#[test]
fn test_report_across_categories() {
    let sandbox = Sandbox::new();
    let factory = sandbox.factory(None);

    let libraries = factory.package_path(PackageType::Library).unwrap().clone();
    write_package(&libraries, "semantic", r#"{ "version": "1.0.0" }"#);
    let themes = factory.package_path(PackageType::Template).unwrap().clone();
    write_package(&themes, "blue", r#"{ "version": "2.1" }"#);

    let composer_dir = sandbox.root().join("vendor/composer");
    fs::create_dir_all(&composer_dir).unwrap();
    fs::write(
        composer_dir.join("installed.json"),
        r#"{ "packages": [ { "name": "monolog/monolog", "version": "2.9.1" } ] }"#,
    )
    .unwrap();

    let mut requires = Requirements::default();
    requires.add("library", "semantic:1.5.0");
    requires.add("extensions", "blog");
    requires.add("modules", "cache:optional");
    requires.add("themes", "blue:2.0");
    requires.add("composer", "monolog/monolog:3.0");
    requires.add("composer", "guzzlehttp/guzzle");

    let report = factory.create_validator(requires).validate();
    assert_eq!(report.count, 6);

    let semantic = &report.library[0];
    assert!(semantic.valid);
    assert!(semantic.warning);
    assert_eq!(semantic.package_version.as_deref(), Some("1.0.0"));

    let blog = &report.extensions[0];
    assert!(!blog.valid);
    assert!(!blog.warning);

    assert!(!report.modules[0].valid);
    assert!(report.modules[0].optional);

    assert!(report.themes[0].valid);
    assert!(!report.themes[0].warning);

    assert!(report.composer[0].valid);
    assert!(report.composer[0].warning);
    assert!(!report.composer[1].valid);

    let missing: Vec<&str> = report.missing().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(missing, vec!["blog", "guzzlehttp/guzzle"]);
}
