use chatkit_client::prelude::*;
use serde_json::Value;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), RequestError> {
    let base = std::env::var("CHATKIT_API_BASE")
        .unwrap_or_else(|_| "http://localhost:5001/console/api".to_string());
    let client = ApiClient::new(ClientConfig::new(base.clone(), base))?;

    let apps: Value = client.get_json("/apps", &[("page", "1")]).await?;
    println!("{apps:#}");
    Ok(())
}
