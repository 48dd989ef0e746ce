use anyhow::Result;
use futures::StreamExt;
use std::path::Path;
use uc_agent::{
    agent::Agent,
    config::Settings,
    models::{message::Message, responses::ResponsesRequest},
};

pub async fn execute(config: Option<&Path>, text: String) -> Result<()> {
    let settings = Settings::new(config)?;
    let agent = Agent::from_settings(&settings).await?;

    let mut stream = agent.predict_stream(ResponsesRequest::new(vec![Message::user(text)]));
    let mut events = 0;
    while let Some(event) = stream.next().await {
        println!("{}", serde_json::to_string(&event?)?);
        events += 1;
    }
    tracing::debug!(events, "stream finished");
    Ok(())
}
