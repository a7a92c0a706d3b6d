use anyhow::{bail, Result};

use crate::catalog::{Catalog, CatalogState};

use super::render::render_images;
use super::OutputFormat;

/// List local images, verifying their signatures unless `skip_verify` is set
pub async fn list_images(
    catalog: &mut Catalog,
    skip_verify: bool,
    format: OutputFormat,
) -> Result<()> {
    let mut snapshot = catalog.load().await?;

    if snapshot.images.is_empty() {
        if format == OutputFormat::Json {
            println!("[]");
        } else {
            println!("No tagged images with digests found");
        }
        return Ok(());
    }

    if !skip_verify {
        catalog.verify_all().await?;
        snapshot = catalog.snapshot();
    }

    println!(
        "{}",
        render_images(&snapshot.images, snapshot.state, format)?
    );

    Ok(())
}

/// Verify every local image and print the ones with a valid signature
///
/// With `require_all`, any unverified image makes the command fail.
pub async fn verify_images(
    catalog: &mut Catalog,
    require_all: bool,
    format: OutputFormat,
) -> Result<()> {
    catalog.load().await?;
    let report = catalog.verify_all().await?;

    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                render_images(&report.verified, CatalogState::Loaded, format)?
            );
        }
        OutputFormat::Table => {
            if !report.verified.is_empty() {
                println!(
                    "{}",
                    render_images(&report.verified, CatalogState::Loaded, format)?
                );
            }
            println!(
                "✓ {}/{} images verified in {:.1}s",
                report.verified.len(),
                report.total,
                report.elapsed.as_secs_f64()
            );
        }
    }

    if require_all && report.verified.len() < report.total {
        bail!(
            "{} of {} images could not be verified",
            report.total - report.verified.len(),
            report.total
        );
    }

    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::cli::{build_catalog, VerifyArgs};
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    /// Fake cosign that accepts only images whose reference contains "signed/"
    fn write_fake_cosign(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("cosign");
        std::fs::write(
            &path,
            "#!/bin/sh\n\
             [ \"$1\" = verify ] || exit 2\n\
             [ \"$2\" = --key ] || exit 2\n\
             case \"$4\" in *signed/*) exit 0 ;; *) echo 'no signatures found' >&2; exit 1 ;; esac\n",
        )
        .unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn setup(dir: &Path) -> VerifyArgs {
        let images = dir.join("images.json");
        std::fs::write(
            &images,
            r#"[
                {"Id": "sha256:1", "RepoTags": ["myregistry.io/signed/app:2.3"], "RepoDigests": ["myregistry.io/signed/app@sha256:aa"]},
                {"Id": "sha256:2", "RepoTags": ["alpinelinux/base:1.0"], "RepoDigests": ["alpinelinux/base@sha256:bb"]},
                {"Id": "sha256:3", "RepoTags": [], "RepoDigests": []}
            ]"#,
        )
        .unwrap();

        VerifyArgs {
            cosign: Some(write_fake_cosign(dir)),
            key: Some(dir.join("cosign.pub")),
            concurrency: Some(2),
            timeout: Some("10s".to_string()),
            config: Some(dir.join("missing-config.json")),
            images_from: Some(images),
        }
    }

    #[tokio::test]
    async fn test_verify_with_fake_cosign() {
        let temp_dir = tempfile::tempdir().unwrap();
        let args = setup(temp_dir.path());
        let mut catalog = build_catalog(&args).unwrap();

        let snapshot = catalog.load().await.unwrap();
        assert_eq!(snapshot.images.len(), 2);

        let report = catalog.verify_all().await.unwrap();
        assert_eq!(report.total, 2);
        assert_eq!(report.verified.len(), 1);
        assert_eq!(report.verified[0].repo_tag, "myregistry.io/signed/app:2.3");
    }

    #[tokio::test]
    async fn test_verify_images_require_all() {
        let temp_dir = tempfile::tempdir().unwrap();
        let args = setup(temp_dir.path());

        let mut catalog = build_catalog(&args).unwrap();
        assert!(verify_images(&mut catalog, false, OutputFormat::Table)
            .await
            .is_ok());

        let mut catalog = build_catalog(&args).unwrap();
        let err = verify_images(&mut catalog, true, OutputFormat::Json)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("1 of 2 images"));
    }

    #[tokio::test]
    async fn test_list_images_skip_verify() {
        let temp_dir = tempfile::tempdir().unwrap();
        let args = setup(temp_dir.path());
        let mut catalog = build_catalog(&args).unwrap();

        list_images(&mut catalog, true, OutputFormat::Table)
            .await
            .unwrap();
        assert!(catalog.snapshot().images.iter().all(|i| !i.verified));
    }
}
