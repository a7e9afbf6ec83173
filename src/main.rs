use anyhow::Result;
use tf_provider::serve;

use terraform_provider_google::GoogleProvider;

#[tokio::main]
async fn main() -> Result<()> {
    serve("google", GoogleProvider::default()).await
}
