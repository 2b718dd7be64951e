//! Entry point for the doctor ranking service.

use docrank::{config, http, logging};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::load_or_default()?;
    if let Err(err) = logging::init(&config.logging) {
        eprintln!("Logging disabled: {err}");
    }
    http::serve(config).await?;
    Ok(())
}
