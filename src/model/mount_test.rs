//! Tests for mount validation.

use super::mount::{MountError, MountSpec, RawMount, VolumeDriver};

fn raw(kind: Option<&str>, source: Option<&str>, target: Option<&str>) -> RawMount {
    RawMount {
        kind: kind.map(str::to_string),
        source: source.map(str::to_string),
        target: target.map(str::to_string),
        ..Default::default()
    }
}

#[test]
fn test_untyped_mount_with_source_is_named_volume() {
    let m = MountSpec::from_raw(&raw(None, Some("data-{username}"), Some("/home/jovyan/work"))).unwrap();
    assert!(matches!(m, MountSpec::NamedVolume { .. }));
    assert_eq!(m.source(), Some("data-{username}"));
    assert_eq!(m.container_path(), "/home/jovyan/work");
}

#[test]
fn test_untyped_mount_without_source_is_anonymous() {
    let m = MountSpec::from_raw(&raw(None, None, Some("/tmp/scratch"))).unwrap();
    assert_eq!(
        m,
        MountSpec::AnonymousVolume {
            container_path: "/tmp/scratch".to_string(),
            read_only: false,
        }
    );
    assert_eq!(m.source(), None);
}

#[test]
fn test_bind_mount_requires_source() {
    let err = MountSpec::from_raw(&raw(Some("bind"), None, Some("/data"))).unwrap_err();
    assert_eq!(err, MountError::BindWithoutSource("/data".to_string()));
}

#[test]
fn test_mount_requires_target() {
    assert_eq!(
        MountSpec::from_raw(&raw(None, None, None)).unwrap_err(),
        MountError::MissingTarget
    );
    assert_eq!(
        MountSpec::from_raw(&raw(Some("volume"), Some("v"), Some(""))).unwrap_err(),
        MountError::MissingTarget
    );
}

#[test]
fn test_unknown_mount_type_rejected() {
    let err = MountSpec::from_raw(&raw(Some("tmpfs"), None, Some("/tmp"))).unwrap_err();
    assert_eq!(err, MountError::UnknownType("tmpfs".to_string()));
}

#[test]
fn test_map_source_rewrites_driver_options_not_target() {
    let mut options = std::collections::BTreeMap::new();
    options.insert("device".to_string(), ":/export/{username}".to_string());
    let m = MountSpec::NamedVolume {
        volume_name: "nfs-{username}".to_string(),
        container_path: "/home/{username}".to_string(),
        read_only: true,
        driver: Some(VolumeDriver {
            name: "local".to_string(),
            options,
        }),
    };

    let mapped = m.map_source(|s| s.replace("{username}", "abc"));
    match mapped {
        MountSpec::NamedVolume {
            volume_name,
            container_path,
            read_only,
            driver,
        } => {
            assert_eq!(volume_name, "nfs-abc");
            assert_eq!(container_path, "/home/{username}");
            assert!(read_only);
            assert_eq!(driver.unwrap().options["device"], ":/export/abc");
        }
        other => panic!("unexpected mount {:?}", other),
    }
}

#[test]
fn test_raw_mount_from_yaml() {
    let yaml = "type: bind\nsource: /srv/{username}\ncontainer_path: /home/jovyan\nread_only: true\n";
    let m: RawMount = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(m.kind.as_deref(), Some("bind"));
    assert_eq!(m.target.as_deref(), Some("/home/jovyan"));
    assert!(m.read_only);
}
