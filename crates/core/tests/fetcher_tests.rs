//! Fetching packages from the in-memory registry.

mod common;

use common::{MockRegistry, package_bytes};
use futures::StreamExt;
use provider_mirror_core::{DependencyId, Error, Fetcher, Platform};
use semver::Version;

fn foo() -> DependencyId {
    DependencyId::parse("registry.example.com/ns/foo").unwrap()
}

fn linux() -> Platform {
    Platform::parse("linux_amd64").unwrap()
}

#[tokio::test]
async fn test_fetch_streams_package() {
    let registry = MockRegistry::new().with_package(&foo(), "1.2.0", linux());
    let fetcher = Fetcher::new(&registry);

    let fetched = fetcher
        .fetch(&foo(), &Version::new(1, 2, 0), &linux())
        .await
        .unwrap();

    assert!(fetched.located.url.starts_with("https://"));
    let bytes: Vec<u8> = fetched
        .stream
        .map(|chunk| chunk.unwrap().to_vec())
        .concat()
        .await;
    assert_eq!(bytes, package_bytes(&foo(), "1.2.0", &linux()));
    assert_eq!(registry.meta_calls(), 1);
    assert_eq!(registry.download_calls(), 1);
}

#[tokio::test]
async fn test_fetch_missing_platform_is_package_unavailable() {
    let registry = MockRegistry::new().with_package(&foo(), "1.2.0", linux());
    let fetcher = Fetcher::new(&registry);
    let windows = Platform::parse("windows_amd64").unwrap();

    let err = fetcher
        .fetch(&foo(), &Version::new(1, 2, 0), &windows)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::PackageUnavailable { platform, .. } if platform == windows
    ));
    assert_eq!(registry.download_calls(), 0);
}

#[tokio::test]
async fn test_fetch_local_archive_is_unsupported() {
    let registry = MockRegistry::new().with_local_package(&foo(), "1.2.0", linux());
    let fetcher = Fetcher::new(&registry);

    let err = fetcher
        .fetch(&foo(), &Version::new(1, 2, 0), &linux())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::UnsupportedLocationKind {
            kind: "local archive",
            ..
        }
    ));
    assert_eq!(registry.download_calls(), 0);
}
