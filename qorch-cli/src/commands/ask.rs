use std::path::PathBuf;

use anyhow::Result;
use futures::StreamExt;
use qorch_core::model::Request;
use serde_json::json;
use uuid::Uuid;

use crate::cli::{ModeArg, OutputFormat};
use crate::output::print_event;
use crate::runtime::Runtime;

pub async fn run(
    config: Option<PathBuf>,
    output: OutputFormat,
    query: String,
    mode: ModeArg,
    session: Option<String>,
    docs: Vec<String>,
) -> Result<()> {
    let runtime = Runtime::build(config.as_deref()).await?;

    let session_id = session.unwrap_or_else(|| Uuid::new_v4().to_string());
    let mut request = Request::new(query, session_id).with_mode(mode.into());
    if !docs.is_empty() {
        request.options.insert("selected_docs".to_string(), json!(docs));
    }

    let mut stream = runtime.orchestrator.clone().process_intent(request);
    while let Some(event) = stream.next().await {
        print_event(&event, output);
    }

    Ok(())
}
