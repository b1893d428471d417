use blob_exerciser::{catalog, connect, select, ExerciserConfig, ScenarioRunner};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    println!("\n╔════════════════════════════════════════════════════╗");
    println!("║  BLOB EXERCISER - Storage Lifecycle Walkthrough    ║");
    println!("╚════════════════════════════════════════════════════╝\n");

    let config = ExerciserConfig::from_env()?;
    println!("▶ Backend: {:?}", config.backend);
    println!(
        "  • Block size: {} bytes | Copy poll: {}ms | Copy timeout: {}ms",
        config.block_size, config.copy_poll_interval_ms, config.copy_timeout_ms
    );

    let scenarios = select(catalog(&config.settings()), &config.scenarios)?;
    println!("  • Scenarios: {}\n", scenarios.len());

    println!("▶ Connecting...");
    let gateway = connect(&config)?;
    println!("✓ Connected.\n");

    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    let run = ScenarioRunner::new().run_all(&scenarios, gateway.as_ref()).await;
    println!("{}", run);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let leaked = run.cleanup_failures();
    if leaked > 0 {
        println!("\n⚠️  {} resource(s) could not be cleaned up. Run the `sweep` binary to remove them.", leaked);
    }

    if let Some(path) = &config.report_path {
        std::fs::write(path, run.to_json()?)?;
        println!("\n📄 Report written to {}", path.display());
    }

    if run.is_success() {
        println!("\n✅ All scenarios passed!");
    } else {
        println!("\n❌ {} scenario(s) failed.", run.failed_count());
    }
    println!();

    Ok(run.exit_code())
}
