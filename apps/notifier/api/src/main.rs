//! Notifier API
//!
//! Binary entry point for the event ingestion API.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    notifier_api::run().await
}
