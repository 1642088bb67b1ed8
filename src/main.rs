#[tokio::main]
async fn main() {
    if let Err(e) = caredocs_lib::run().await {
        eprintln!("{}: {e}", caredocs_lib::config::APP_NAME);
        std::process::exit(1);
    }
}
