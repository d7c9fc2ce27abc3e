use dotenv::dotenv;
use price_history::data::{DocumentFetcher, IngestResult};
use price_history::output::{JsonFileSink, OutputSink};
use price_history::pipeline::{AssumeAnswer, Confirmation, StdinPrompt};
use price_history::{Config, Pipeline, RunOutcome};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Prints the outcome of a completed run.
///
/// # Arguments
/// * `result`: The assembled histories of the run
///
/// # Output
/// - Number of instruments written
/// - Instruments that had identity but no usable rows
/// - Total price points
/// - Most recent date seen across all instruments
fn print_summary(result: &IngestResult) {
    let points: usize = result.histories.iter().map(|h| h.points.len()).sum();

    println!("\nRun Summary:");
    println!("Instruments processed: {}", result.histories.len());
    if !result.without_data.is_empty() {
        println!(
            "Instruments without data: {} ({})",
            result.without_data.len(),
            result.without_data.join(", ")
        );
    }
    println!("Price points: {}", points);
    println!("Most recent date: {}", result.most_recent_display());
}

/// Entry point: download the history workbook, ask the operator before
/// processing it, and write the per-instrument histories as JSON.
///
/// # Workflow Steps
/// - Load `.env` and read the configuration
/// - Fetch the document through the host's interstitial page
/// - Pause for confirmation (or assume it with `HISTORY_ASSUME_YES`)
/// - Decode, demultiplex and assemble the histories
/// - Persist them and print a summary
///
/// # Returns
/// `Ok(())` when the run completes or the operator cancels it; an error for
/// configuration, fetch, decode or write failures
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let fetcher = DocumentFetcher::new(config.host_url.as_str())
        .with_temp_dir(config.temp_dir.clone())
        .with_policy(config.fetch_policy);
    let mut pipeline = Pipeline::new(config.document_id.as_str(), fetcher);

    let confirmation: Box<dyn Confirmation> = if config.assume_yes {
        Box::new(AssumeAnswer(true))
    } else {
        Box::new(StdinPrompt::new(config.affirmative.as_str()))
    };

    let outcome = match pipeline.run(confirmation.as_ref()).await {
        Ok(outcome) => outcome,
        Err(err) => {
            error!(state = ?pipeline.state(), "{}", err);
            return Err(err.into());
        }
    };

    match outcome {
        RunOutcome::Cancelled => {
            info!("processing cancelled by user");
        }
        RunOutcome::Completed(result) => {
            let sink = JsonFileSink::new(config.output_path.clone());
            sink.persist(&result)?;
            print_summary(&result);
        }
    }

    Ok(())
}
