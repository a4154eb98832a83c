use overseer::cli::{self, Cli};

#[tokio::main]
async fn main() {
    if let Err(e) = Cli::run().await {
        cli::print_error(&e.to_string());
        std::process::exit(1);
    }
}
