#[macro_use]
extern crate log;

mod cli;

use event_warden::{Result, logger};

#[tokio::main]
async fn main() -> Result<()> {
    logger::init();
    cli::run().await
}
