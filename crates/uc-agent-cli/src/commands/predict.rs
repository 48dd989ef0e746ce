use anyhow::Result;
use cliclack::spinner;
use std::path::Path;
use uc_agent::{
    agent::Agent,
    config::Settings,
    models::{message::Message, responses::ResponsesRequest},
};

pub async fn execute(config: Option<&Path>, text: String) -> Result<()> {
    let settings = Settings::new(config)?;
    let agent = Agent::from_settings(&settings).await?;

    let spin = spinner();
    spin.start("awaiting reply");
    let response = agent
        .predict(ResponsesRequest::new(vec![Message::user(text)]))
        .await;
    spin.stop("");

    let response = response?;
    tracing::debug!(items = response.output.len(), "predict finished");
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
