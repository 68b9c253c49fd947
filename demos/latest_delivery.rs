use anyhow::{Context, Result};
use bdds::{CallContext, Client, progress_bar};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Set RUST_LOG=bdds=debug to follow token refreshes and retries.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Credentials come from BDDS_USERNAME / BDDS_PASSWORD or a `.bddsrc` file.
    let client = Client::from_env()?;
    let ctx = CallContext::new().with_timeout(Duration::from_secs(30 * 60));

    let products = client.list_products(&ctx)?;
    println!("{} products available", products.len());
    for p in products.iter().take(5) {
        println!("  [{}] {}", p.id, p.name);
    }

    let name = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "EP DocDB front file".to_string());
    let product = client.find_product_by_name(&ctx, &name)?;
    let delivery = client.get_latest_delivery(&ctx, product.id)?;
    println!(
        "latest delivery of {:?}: {} ({}), {} files",
        product.name,
        delivery.name,
        delivery.published_at.to_rfc3339(),
        delivery.files.len()
    );

    let Some(file) = delivery.files.first() else {
        println!("nothing to download");
        return Ok(());
    };
    println!("downloading {} ({})", file.name, file.size);

    let out = File::create(&file.name).with_context(|| format!("cannot create {}", file.name))?;
    let mut out = BufWriter::new(out);
    let bytes = client.download_file_with_progress(
        &ctx,
        product.id,
        delivery.id,
        file.id,
        &mut out,
        progress_bar(),
    )?;
    out.flush()?;
    println!("saved {} bytes to {}", bytes, file.name);
    Ok(())
}
