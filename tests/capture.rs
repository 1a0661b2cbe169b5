// ABOUTME: Integration tests for bundle capture.
// ABOUTME: Tests complete and partial bundles, preflight refusal, filtering and cancellation.

mod support;

use bulwark::snapshot::{
    ArtifactKind, BundleStatus, DataSource, METADATA_FILE, SnapshotError, SnapshotErrorKind, Validation,
};
use support::fakes::{FakeKv, name};
use support::fixtures::Deployment;
use tokio_util::sync::CancellationToken;

fn catalog_entries(deployment: &Deployment) -> Vec<String> {
    match std::fs::read_dir(deployment.catalog_dir()) {
        Ok(entries) => entries
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    }
}

#[tokio::test]
async fn captures_every_source_into_a_complete_bundle() {
    support::init_tracing();
    let deployment = Deployment::new();

    let report = deployment
        .capture()
        .capture(&name("nightly"), None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.status, BundleStatus::Complete);
    assert_eq!(report.id.name(), &name("nightly"));
    let kinds: Vec<ArtifactKind> = report.artifacts.iter().map(|a| a.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ArtifactKind::FilesystemArchive,
            ArtifactKind::RelationalDump,
            ArtifactKind::KvSnapshot,
            ArtifactKind::ConfigCopy,
        ]
    );
    assert!(report.artifacts.iter().all(|a| a.size > 0 && a.checksum.is_some()));

    assert!(report.dir.join("uploads.tar.gz").is_file());
    assert!(report.dir.join("db.sql.gz").is_file());
    assert!(report.dir.join("cache.kv.tar.gz").is_file());
    assert!(report.dir.join("settings/app.env").is_file());
    assert!(report.dir.join(METADATA_FILE).is_file());
    assert_eq!(deployment.kv.saves(), 1);

    // Nothing left behind in staging
    assert!(catalog_entries(&deployment).iter().all(|e| !e.starts_with('.')));

    let catalog = deployment.catalog();
    assert_eq!(catalog.list().unwrap(), vec![report.id.clone()]);
    assert_eq!(catalog.validate(&report.id), Validation::Valid);
    assert_eq!(catalog.verify_checksums(&report.id), Validation::Valid);

    let bundle = catalog.load(&report.id).unwrap();
    assert_eq!(bundle.metadata.versions.get(&name("app")).map(String::as_str), Some("sha256:app-v1"));
}

#[tokio::test]
async fn unreachable_source_refuses_before_writing() {
    let deployment = Deployment::new();
    deployment.db.go_down();

    let err = deployment
        .capture()
        .capture(&name("nightly"), None, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), SnapshotErrorKind::ServiceUnavailable);
    assert!(catalog_entries(&deployment).is_empty(), "no bundle or staging dir may exist");
    assert_eq!(deployment.kv.saves(), 0);
}

#[tokio::test]
async fn empty_dump_makes_bundle_partial() {
    let deployment = Deployment::new();
    deployment.db.produce_empty_dumps();

    let report = deployment
        .capture()
        .capture(&name("nightly"), None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.status, BundleStatus::Partial);
    let failures = report.failures();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].starts_with("db:"), "{failures:?}");

    let failed = report.artifacts.iter().find(|a| a.source == name("db")).unwrap();
    assert!(failed.path.is_none());
    assert!(!failed.is_captured());

    assert!(matches!(deployment.catalog().validate(&report.id), Validation::Invalid(_)));
}

#[tokio::test]
async fn kv_save_that_never_finishes_times_out() {
    let deployment = Deployment::new();
    let mut sources = deployment.sources();
    sources.retain(|s| !matches!(s, DataSource::Kv { .. }));
    sources.push(DataSource::Kv {
        name: name("cache"),
        container: name("cache"),
        store: FakeKv::stuck(),
        data_dir: deployment.path("kv"),
    });

    let report = deployment
        .capture_from(sources)
        .capture(&name("nightly"), None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.status, BundleStatus::Partial);
    let failures = report.failures();
    assert!(failures.iter().any(|f| f.starts_with("cache:") && f.contains("did not finish")), "{failures:?}");
}

#[tokio::test]
async fn filter_limits_captured_sources() {
    let deployment = Deployment::new();

    let report = deployment
        .capture()
        .capture(&name("uploads-only"), Some(&[name("uploads")]), &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.is_complete());
    assert_eq!(report.artifacts.len(), 1);
    assert_eq!(report.artifacts[0].source, name("uploads"));
    assert_eq!(deployment.kv.saves(), 0);
}

#[tokio::test]
async fn unknown_filter_source_is_rejected() {
    let deployment = Deployment::new();

    let err = deployment
        .capture()
        .capture(&name("nightly"), Some(&[name("mailbox")]), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, SnapshotError::UnknownSource(ref s) if s == "mailbox"));
}

#[tokio::test]
async fn cancelled_capture_leaves_nothing_behind() {
    let deployment = Deployment::new();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = deployment
        .capture()
        .capture(&name("nightly"), None, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, SnapshotError::Cancelled));
    assert!(catalog_entries(&deployment).is_empty());
}

#[tokio::test]
async fn captures_in_the_same_second_get_distinct_ids() {
    let deployment = Deployment::new();
    let capture = deployment.capture();
    let cancel = CancellationToken::new();
    let only = [name("uploads")];

    let first = capture.capture(&name("burst"), Some(&only), &cancel).await.unwrap();
    let second = capture.capture(&name("burst"), Some(&only), &cancel).await.unwrap();

    assert_ne!(first.id, second.id);
    assert!(second.id > first.id);
    assert_eq!(deployment.catalog().list().unwrap(), vec![second.id, first.id]);
}
