use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use snapgram_diagram::{generate_diagram, Outcome};
use snapgram_store::config::Settings;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Snapgram diagram generator
///
/// Renders the entity-relationship diagram of the database named by
/// DATABASE_URL, falling back to the declared model when the database
/// cannot be read.
#[derive(Parser, Debug)]
#[command(name = "generate-diagram")]
#[command(about = "Render the Snapgram data model as an SVG diagram", long_about = None)]
struct Args {
    /// Where to write the diagram (defaults to DIAGRAM_OUTPUT or diagram.svg)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> ExitCode {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Logs go to stderr so stdout only carries the status lines
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "snapgram_diagram=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let args = Args::parse();

    let settings = match Settings::new() {
        Ok(settings) => settings,
        Err(e) => {
            println!("Error: failed to load settings: {e}");
            return ExitCode::FAILURE;
        }
    };

    let url = settings.database.connection_url();
    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(&settings.diagram.output));

    let mut stdout = io::stdout().lock();
    match generate_diagram(url.as_deref(), output, &mut stdout) {
        Ok(Outcome::Rendered(stage)) => {
            tracing::debug!(?stage, "Diagram generation finished");
            ExitCode::SUCCESS
        }
        // Reported on stdout already; the exit status stays zero
        Ok(Outcome::Failed) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Diagram generation aborted");
            ExitCode::FAILURE
        }
    }
}
