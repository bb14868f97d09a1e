#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = peer_review_rust::run().await {
        eprintln!("peer-review-rust fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
