use toolgate_client::{ClientConfig, McpClient};

/// Print every tool the server publishes, one block per tool.
pub async fn run(config: ClientConfig) -> anyhow::Result<()> {
    let client = McpClient::new(config)?;
    let listed = client.list_tools().await;
    client.close().await;

    let descriptors = listed?;
    if descriptors.is_empty() {
        println!("No tools published at {}", client.base_url());
        return Ok(());
    }

    for descriptor in descriptors {
        println!("{}", descriptor.name);
        if !descriptor.description.is_empty() {
            println!("    {}", descriptor.description);
        }
        for param in descriptor.contract().params() {
            let marker = if param.required { "required" } else { "optional" };
            match &param.description {
                Some(description) => {
                    println!("    - {}: {} ({marker}) {description}", param.name, param.kind);
                }
                None => println!("    - {}: {} ({marker})", param.name, param.kind),
            }
        }
    }

    Ok(())
}
