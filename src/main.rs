use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    dbcatalog::app::run().await
}
