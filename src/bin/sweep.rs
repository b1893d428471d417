use blob_exerciser::scenario::container_prefixes;
use blob_exerciser::{catalog, connect, sweep_leaked, ExerciserConfig};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt::init();

    println!("\n🧹 LEAK SWEEPER 🧹");
    println!("==================");

    let config = ExerciserConfig::from_env()?;
    let prefixes = container_prefixes(&catalog(&config.settings()));

    println!("▶ Connecting ({:?})...", config.backend);
    let gateway = connect(&config)?;
    println!("✓ Connected.\n");

    println!("▶ Sweeping prefixes: {}", prefixes.join(", "));
    let report = sweep_leaked(gateway.as_ref(), &prefixes).await?;

    for container in &report.deleted {
        println!("  ✓ Deleted {}", container);
    }
    for (container, error) in &report.failed {
        println!("  ✗ {}: {}", container, error);
    }

    println!(
        "\n📊 {} deleted, {} failed",
        report.deleted.len(),
        report.failed.len()
    );

    Ok(if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
