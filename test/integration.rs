// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{RecordingHost, TreeFixture};

use anyhow::Result;
use indoc::formatdoc;
use oxidrop::{
    config::{Manifest, UploadFile},
    event::NullObserver,
    fleet::{self, Cancellation},
    host::{Host, LocalHost},
    perm::PermMode,
    upload::upload_files,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

#[cfg(unix)]
#[tokio::test]
async fn single_file_keeps_local_mode() -> Result<()> {
    let tree = TreeFixture::new()?;
    let source = tree.write_with_mode("f", "data", 0o640)?;
    let host = RecordingHost::default();

    let file = UploadFile::new(source.to_string_lossy()).with_destination_dir("/etc/app");
    upload_files(&host, vec![file], &NullObserver).await?;

    let expect = vec![
        "mkdir /etc/app".to_string(),
        "chmod 0755 /etc/app".to_string(),
        format!("upload {} /etc/app/f", source.display()),
        "chmod 0640 /etc/app/f".to_string(),
    ];
    assert_eq!(host.calls(), expect);

    Ok(())
}

#[tokio::test]
async fn url_downloads_then_applies_declared_mode() -> Result<()> {
    let host = RecordingHost::with_existing(&["/opt"]);
    let file = UploadFile::new("https://example.com/tool")
        .with_destination_dir("/opt")
        .with_perm(PermMode::Str("0755".into()));

    upload_files(&host, vec![file], &NullObserver).await?;

    let expect = vec![
        "download https://example.com/tool /opt/tool",
        "chmod 0755 /opt/tool",
    ];
    assert_eq!(host.calls(), expect);

    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn glob_creates_shared_directory_once() -> Result<()> {
    let tree = TreeFixture::new()?;
    let a = tree.write_with_mode("conf/a.conf", "a", 0o600)?;
    let b = tree.write_with_mode("conf/b.conf", "b", 0o640)?;
    let c = tree.write_with_mode("conf/c.conf", "c", 0o644)?;
    tree.write("conf/readme.txt", "skip")?;
    let host = RecordingHost::default();

    let pattern = tree.path().join("conf").join("*.conf");
    let file = UploadFile::new(pattern.to_string_lossy()).with_destination_dir("/etc/app");
    upload_files(&host, vec![file], &NullObserver).await?;

    let expect = vec![
        "mkdir /etc/app".to_string(),
        "chmod 0755 /etc/app".to_string(),
        format!("upload {} /etc/app/a.conf", a.display()),
        "chmod 0600 /etc/app/a.conf".to_string(),
        format!("upload {} /etc/app/b.conf", b.display()),
        "chmod 0640 /etc/app/b.conf".to_string(),
        format!("upload {} /etc/app/c.conf", c.display()),
        "chmod 0644 /etc/app/c.conf".to_string(),
    ];
    assert_eq!(host.calls(), expect);

    Ok(())
}

#[tokio::test]
async fn ambiguous_destination_touches_nothing() -> Result<()> {
    let tree = TreeFixture::new()?;
    tree.write("conf/a.conf", "a")?;
    tree.write("conf/b.conf", "b")?;
    let host = RecordingHost::default();

    let pattern = tree.path().join("conf").join("*.conf");
    let file = UploadFile::new(pattern.to_string_lossy()).with_destination_file("/etc/app.conf");
    let result = upload_files(&host, vec![file], &NullObserver).await;

    assert!(result.is_err());
    assert!(host.calls().is_empty());

    Ok(())
}

#[tokio::test]
async fn empty_directory_without_destination_fails() -> Result<()> {
    let tree = TreeFixture::new()?;
    let host = RecordingHost::default();

    let file = UploadFile::new(tree.path().to_string_lossy());
    let result = upload_files(&host, vec![file], &NullObserver).await;

    assert!(result.is_err());
    assert!(host.calls().is_empty());

    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn deploy_fleet_onto_local_hosts() -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let tree = TreeFixture::new()?;
    tree.write_with_mode("src/app.toml", "[app]", 0o640)?;
    tree.write("src/site/index.html", "<html>")?;
    tree.write("src/site/css/main.css", "body {}")?;

    let src = tree.path().join("src");
    let manifest: Manifest = formatdoc! {r#"
        [[host]]
        name = "web-1"
        root = '{root1}'

        [[host.file]]
        name = "app config"
        src = '{src}/app.toml'
        dstDir = "/etc/app"

        [[host.file]]
        src = '{src}/site'
        dstDir = "/var/www"
        perm = 0o600

        [[host]]
        name = "web-2"
        root = '{root2}'

        [[host.file]]
        src = '{src}/missing.toml'
        dstDir = "/etc/app"

        [[host]]
        name = "idle"
    "#,
        root1 = tree.path().join("web-1").display(),
        root2 = tree.path().join("web-2").display(),
        src = src.display(),
    }
    .parse()?;

    let connect = |spec: &oxidrop::HostSpec| -> Arc<dyn Host> {
        match &spec.root {
            Some(root) => Arc::new(LocalHost::with_root(&spec.name, root)),
            None => Arc::new(LocalHost::new(&spec.name)),
        }
    };
    let result = fleet::upload_files(
        &manifest,
        connect,
        Arc::new(NullObserver),
        &Cancellation::never(),
    )
    .await;

    let error = result.unwrap_err();
    assert_eq!(error.hosts().collect::<Vec<_>>(), vec!["web-2"]);

    let web = tree.path().join("web-1");
    let mode = |path: &str| -> Result<u32> {
        Ok(std::fs::metadata(web.join(path))?.permissions().mode() & 0o7777)
    };
    assert_eq!(std::fs::read_to_string(web.join("etc/app/app.toml"))?, "[app]");
    assert_eq!(std::fs::read_to_string(web.join("var/www/css/main.css"))?, "body {}");
    assert_eq!(mode("etc/app")?, 0o755);
    assert_eq!(mode("etc/app/app.toml")?, 0o640);
    assert_eq!(mode("var/www/index.html")?, 0o600);
    assert_eq!(mode("var/www/css/main.css")?, 0o600);
    assert!(!tree.path().join("web-2").join("etc/app").exists());

    Ok(())
}
