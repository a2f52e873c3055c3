//! Consumer binary
//!
//! Connects to a relay as a consumer and writes the received stream to
//! stdout (or `CONSUMER_OUTPUT`), reconnecting with backoff until stopped.
//!
//! ```text
//! RELAY_URL=ws://localhost:8080/ voice-consumer | ffplay -i -
//! ```
//!
//! Logs go to stderr so they never mix with the audio on stdout.

use tokio::io::AsyncWrite;
use voice_relay::client::ConnectorExit;
use voice_relay::{shutdown_signal, PipelineConfig, VoicePipeline, WriterSink};

type Output = Box<dyn AsyncWrite + Unpin + Send>;

async fn open_output() -> std::io::Result<Output> {
    match std::env::var("CONSUMER_OUTPUT") {
        Ok(path) if path != "-" => {
            let file = tokio::fs::File::create(&path).await?;
            tracing::info!(path = %path, "Writing stream to file");
            Ok(Box::new(file))
        }
        _ => Ok(Box::new(tokio::io::stdout())),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("voice_relay=info".parse()?),
        )
        .init();

    let config = match PipelineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!(
        url = %config.connector.url,
        container = %config.encoding.container,
        "Starting consumer"
    );

    let sink = WriterSink::new(open_output().await?);
    let pipeline = VoicePipeline::start(config, sink)?;

    let stop = pipeline.stop_handle();
    tokio::spawn(async move {
        shutdown_signal().await;
        stop.stop();
    });

    match pipeline.join().await? {
        ConnectorExit::AttemptsExhausted => {
            eprintln!("Gave up reconnecting to relay");
            std::process::exit(1);
        }
        exit => tracing::info!(exit = ?exit, "Consumer finished"),
    }

    Ok(())
}
