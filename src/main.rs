#[tokio::main]
async fn main() {
    if let Err(e) = screenparse::run().await {
        eprintln!("screenparse: {e}");
        std::process::exit(1);
    }
}
