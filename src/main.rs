#[tokio::main]
async fn main() -> anyhow::Result<()> {
    formcoach_lib::run().await
}
