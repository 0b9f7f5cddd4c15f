use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use qorch_core::model::ResearchStatus;

use crate::cli::OutputFormat;
use crate::output::{print_research_progress, print_research_task};
use crate::runtime::Runtime;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

pub async fn run(config: Option<PathBuf>, output: OutputFormat, topic: String, docs: Vec<String>) -> Result<()> {
    let runtime = Runtime::build(config.as_deref()).await?;

    let documents = if docs.is_empty() { None } else { Some(docs) };
    let task_id = runtime.research.start_research(topic, documents);

    loop {
        let Some(task) = runtime.research.get_task(task_id) else {
            anyhow::bail!("research task {task_id} vanished from the workflow's task table");
        };

        if output == OutputFormat::Text {
            print_research_progress(&task);
        }

        match task.status {
            ResearchStatus::Completed | ResearchStatus::Failed => {
                print_research_task(&task, output);
                return Ok(());
            }
            ResearchStatus::Pending | ResearchStatus::Running => {
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }
    }
}
