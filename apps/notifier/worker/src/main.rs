//! Notifier Worker
//!
//! Binary entry point for the queue-to-HTTP relay.

#[tokio::main]
async fn main() {
    if let Err(e) = notifier_worker::run().await {
        eprintln!("Fatal error: {:?}", e);
        std::process::exit(1);
    }
}
