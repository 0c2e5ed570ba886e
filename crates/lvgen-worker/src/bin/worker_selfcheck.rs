use std::path::Path;
use std::process::Command;

use lvgen_media::MediaConfig;
use lvgen_storage::BlobStore;
use lvgen_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = WorkerConfig::from_env();
    let media = MediaConfig::from_env();

    println!(
        "worker-selfcheck: starting with cache_dir={} lanes={:?}",
        media.cache_dir.display(),
        config.lanes
    );
    ensure_cache_dir(&media.cache_dir).await?;
    ensure_ffmpeg()?;
    ensure_env_present(&["REDIS_URL"])?;
    report_providers();
    ensure_blob_mirror().await?;

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_cache_dir<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    tokio::fs::create_dir_all(path).await?;
    let probe = path.join(".selfcheck");
    tokio::fs::write(&probe, b"ok").await?;
    tokio::fs::remove_file(&probe).await?;
    Ok(())
}

fn ensure_ffmpeg() -> anyhow::Result<()> {
    let path = lvgen_media::check_ffmpeg().map_err(|e| anyhow::anyhow!("ffmpeg not available: {}", e))?;

    let output = Command::new(&path)
        .arg("-version")
        .output()
        .map_err(|e| anyhow::anyhow!("ffmpeg not runnable: {}", e))?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("ffmpeg -version failed: {:?}", output.status));
    }
    Ok(())
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    for var in vars {
        if std::env::var(var).is_err() {
            return Err(anyhow::anyhow!("missing required env var {}", var));
        }
    }
    Ok(())
}

/// An unconfigured mirror is fine; a configured one has to be reachable.
async fn ensure_blob_mirror() -> anyhow::Result<()> {
    let Some(blobs) = BlobStore::from_env() else {
        println!("worker-selfcheck: blob mirror disabled");
        return Ok(());
    };
    blobs
        .check_connectivity()
        .await
        .map_err(|e| anyhow::anyhow!("blob mirror unreachable: {}", e))?;
    println!("worker-selfcheck: blob mirror reachable");
    Ok(())
}

/// Missing provider credentials only disable that provider's lane.
fn report_providers() {
    for (provider, var) in [
        ("replicate", "REPLICATE_API_TOKEN"),
        ("runway", "RUNWAY_API_KEY"),
        ("luma", "LUMA_API_KEY"),
    ] {
        let state = if std::env::var(var).is_ok() { "configured" } else { "disabled" };
        println!("worker-selfcheck: provider {provider} {state}");
    }
}
