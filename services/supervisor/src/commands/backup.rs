//! Backup command (copy the node's data directory).

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;
use tracing::info;

use supervysor::backup::{create_backup, BackupReport};
use supervysor::config::{backups_dir, ensure_app_dirs, SupervisorConfig};
use supervysor::node::NodeStatusClient;

use super::config_path;

const STATUS_TIMEOUT: Duration = Duration::from_secs(10);

/// Backup command - copy `{home}/data` into `backups/{height}/data`.
#[derive(Debug, Args)]
pub struct BackupCommand {
    /// Config file. Defaults to ~/.supervysor/config.toml.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Height to label the backup with. Queried from the node if omitted.
    #[arg(long)]
    height: Option<i64>,

    /// Directory to hold backups. Defaults to ~/.supervysor/backups.
    #[arg(long)]
    dest_path: Option<PathBuf>,
}

impl BackupCommand {
    pub async fn run(self) -> Result<()> {
        let path = config_path(self.config.clone())?;
        let config = SupervisorConfig::load(&path)
            .context("Could not load config, run `supervysor init` first")?;

        let backups = match &self.dest_path {
            Some(dir) => dir.clone(),
            None => {
                let root = path.parent().unwrap_or_else(|| Path::new("."));
                ensure_app_dirs(root)?;
                backups_dir(root)
            }
        };
        let height = self.height(&config).await?;
        let src = config.home_path.join("data");

        info!(height, "Stop the node before backing up, the copy is not coordinated with it");
        let report = tokio::task::spawn_blocking(move || create_backup(&src, &backups, height))
            .await
            .context("Backup task panicked")??;

        print_report(&report);
        Ok(())
    }

    async fn height(&self, config: &SupervisorConfig) -> Result<i64> {
        let height = match self.height {
            Some(height) => height,
            None => NodeStatusClient::new(&config.abci_endpoint, STATUS_TIMEOUT)?
                .node_height()
                .await
                .context("Could not query node height, pass --height instead")?,
        };
        if height <= 0 {
            bail!("invalid backup height {height}");
        }
        Ok(height)
    }
}

fn print_report(report: &BackupReport) {
    println!(
        "Backed up {} files ({} bytes) to {}",
        report.files,
        report.bytes,
        report.dest.display()
    );
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use clap::Parser;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Parser)]
    struct Harness {
        #[command(flatten)]
        backup: BackupCommand,
    }

    fn parse(args: &[&str]) -> BackupCommand {
        let mut all = vec!["backup"];
        all.extend_from_slice(args);
        Harness::try_parse_from(all).unwrap().backup
    }

    fn write_config(dir: &Path, abci_endpoint: &str) -> PathBuf {
        let home = dir.join("node");
        fs::create_dir_all(home.join("data")).unwrap();
        fs::write(home.join("data").join("blockstore.db"), "blocks").unwrap();

        let path = dir.join("supervysor").join("config.toml");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            &path,
            format!(
                r#"
chain_id = "kyve-1"
binary_path = "/usr/bin/noded"
home_path = "{}"
pool_id = 1
abci_endpoint = "{abci_endpoint}"
height_difference_max = 1000
height_difference_min = 500
keep_recent = 1400
"#,
                home.display()
            ),
        )
        .unwrap();
        path
    }

    #[tokio::test]
    async fn test_backup_with_explicit_height() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_config(dir.path(), "http://127.0.0.1:1");

        parse(&["--config", config.to_str().unwrap(), "--height", "42"])
            .run()
            .await
            .unwrap();

        let copied = dir
            .path()
            .join("supervysor")
            .join("backups")
            .join("42")
            .join("data")
            .join("blockstore.db");
        assert_eq!(fs::read_to_string(copied).unwrap(), "blocks");
    }

    #[tokio::test]
    async fn test_backup_height_from_node() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/abci_info"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "result": {"response": {"last_block_height": "1234"}}
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let config = write_config(dir.path(), &server.uri());
        let dest = dir.path().join("elsewhere");

        parse(&[
            "--config",
            config.to_str().unwrap(),
            "--dest-path",
            dest.to_str().unwrap(),
        ])
        .run()
        .await
        .unwrap();

        assert!(dest.join("1234").join("data").join("blockstore.db").is_file());
    }

    #[tokio::test]
    async fn test_backup_rejects_zero_height() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_config(dir.path(), "http://127.0.0.1:1");

        let result = parse(&["--config", config.to_str().unwrap(), "--height", "0"])
            .run()
            .await;
        assert!(result.is_err());
    }
}
