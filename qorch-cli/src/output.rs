//! Output formatting for the event stream and research reports.

use qorch_core::model::{Event, EventData, ResearchTask};

use crate::cli::OutputFormat;

/// Renders one `Event` as it arrives. In `Text` mode this mirrors a
/// streaming chat transcript; in `Json` mode each event is printed as one
/// JSON object per line (JSON Lines), so output stays machine-parseable
/// without buffering the whole stream.
pub fn print_event(event: &Event, format: OutputFormat) {
    match format {
        OutputFormat::Json => match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(e) => eprintln!("failed to serialize event: {e}"),
        },
        OutputFormat::Text => println!("{}", format_event_text(event)),
    }
}

fn format_event_text(event: &Event) -> String {
    let label = event.kind.as_str();
    match &event.payload.data {
        Some(EventData::Source { sources }) if !sources.is_empty() => {
            let files: Vec<&str> = sources.iter().map(|s| s.file_name.as_str()).collect();
            format!("[{label}] {} (sources: {})", event.payload.content, files.join(", "))
        }
        _ => format!("[{label}] {}", event.payload.content),
    }
}

/// Renders a `ResearchTask`'s terminal state: the report if completed, or
/// the error if it failed.
pub fn print_research_task(task: &ResearchTask, format: OutputFormat) {
    match format {
        OutputFormat::Json => match serde_json::to_string_pretty(task) {
            Ok(text) => println!("{text}"),
            Err(e) => eprintln!("failed to serialize research task: {e}"),
        },
        OutputFormat::Text => {
            println!("status: {:?} (progress {}%)", task.status, task.progress);
            for finding in &task.findings {
                println!("\n## {}\n{}", finding.question, finding.answer);
            }
            if let Some(report) = &task.report {
                println!("\n=== Report ===\n{report}");
            }
            if !task.sources.is_empty() {
                println!("\nSources:");
                for source in &task.sources {
                    println!("  - {}", source.file_name);
                }
            }
            if let Some(error) = &task.error {
                eprintln!("\nerror: {error}");
            }
        }
    }
}

/// Renders a research progress tick (used while polling).
pub fn print_research_progress(task: &ResearchTask) {
    if let Some(step) = task.steps.last() {
        eprintln!("... {}% {}", task.progress, step.step);
    }
}
