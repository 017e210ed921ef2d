#[tokio::main]
async fn main() {
    photo_vault_lib::logging::init_logging();

    if let Err(e) = photo_vault_lib::run().await {
        tracing::error!("photo server failed: {}", e);
        std::process::exit(1);
    }
}
