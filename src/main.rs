use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::{Receiver, Sender};
use owo_colors::OwoColorize;
use std::path::Path;
use std::sync::Arc;
use streamgate::cli::{Cli, Commands};
use streamgate::client::{AudioFormat, ClientEndpoints, ResultListener, StreamingClient};
use streamgate::config::Overrides;
use streamgate::defaults;
use streamgate::endpoint::EndpointRegistry;
use streamgate::exchange::Session;
use streamgate::message::{Matrix, Message, MessageKind, NbestEntry, Vector};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose)?;

    let overrides = Overrides::from_args(&cli.overrides)?;

    match cli.command {
        Commands::Check => {
            handle_check(&cli.config, &overrides, cli.quiet)?;
        }
        Commands::Selftest { ref kinds } => {
            let kinds = Commands::selftest_kinds(kinds);
            let failures = handle_selftest(&cli.config, &overrides, cli.quiet, &kinds)?;
            if failures > 0 {
                eprintln!("{}", format!("{} of {} kinds failed", failures, kinds.len()).red());
                std::process::exit(1);
            }
        }
        Commands::Transcribe {
            ref wavs,
            chunk_frames,
            tentative,
        } => {
            handle_transcribe(
                &cli.config,
                &overrides,
                cli.quiet,
                wavs,
                chunk_frames,
                tentative,
            )?;
        }
    }

    Ok(())
}

fn init_logging(quiet: bool, verbose: u8) -> Result<()> {
    let level = match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(format!("streamgate={}", level).parse()?),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

/// Start the engine with no endpoints and shut it down again.
fn handle_check(config: &Path, overrides: &Overrides, quiet: bool) -> Result<()> {
    let session = Session::open(config, overrides, EndpointRegistry::new(), quiet)
        .with_context(|| format!("engine failed to start from {}", config.display()))?;
    let engine = session.engine_name().to_string();
    session.close()?;
    println!("{} {} started and shut down cleanly", "✓".green(), engine);
    Ok(())
}

/// Pushes one sample per kind through `<kind>_in` and pulls it back from
/// `<kind>_out`. Returns the number of kinds whose message came back changed.
fn handle_selftest(
    config: &Path,
    overrides: &Overrides,
    quiet: bool,
    kinds: &[MessageKind],
) -> Result<usize> {
    let mut registry = EndpointRegistry::new();
    for kind in kinds {
        let input = format!("{}_in", kind);
        registry.add_push_endpoint(input.as_str())?;
        registry.add_pull_endpoint(format!("{}_out", kind).as_str(), [input.as_str()])?;
    }
    let session = Session::open(config, overrides, registry, quiet)?;

    let mut failures = 0;
    for kind in kinds {
        let input = format!("{}_in", kind);
        let output = format!("{}_out", kind);
        let sample = sample_message(*kind)?;

        session.push(&input, sample.clone())?;
        let block = session.pull_one(&output, defaults::PULL_TIMEOUT)?;
        match block.as_ref().and_then(|b| b.get(&input)) {
            Some(received) if *received == sample => {
                println!("  {} {}", "✓".green(), kind);
            }
            Some(received) => {
                failures += 1;
                println!("  {} {} (came back as {})", "✗".red(), kind, received.kind());
                tracing::debug!(
                    sent = %String::from_utf8_lossy(&sample.describe_self()),
                    received = %String::from_utf8_lossy(&received.describe_self()),
                    "Selftest mismatch"
                );
            }
            None => {
                failures += 1;
                println!("  {} {} (nothing on {})", "✗".red(), kind, output);
            }
        }
    }

    session.close()?;
    Ok(failures)
}

/// A representative message of `kind`, with a descriptor attached.
fn sample_message(kind: MessageKind) -> Result<Message> {
    let tag = defaults::CLIENT_TAG;
    let message = match kind {
        MessageKind::Audio => Message::audio(tag, 1, &[0.25, -0.5, 0.125, 1.0], 16000.0, 1.0)?,
        MessageKind::Binary => {
            Message::binary(tag, 2, &[0, 1, 2, 127, 128, 255], "pcm_16000_16_1")
        }
        MessageKind::ConversationState => {
            Message::conversation_state(tag, 100, "utt_id", true, "convo_id", true)?
        }
        MessageKind::Features => Message::features(
            tag,
            3,
            "utt_id",
            Matrix::from_columns(vec![
                Vector::from_slice(&[1.5, -2.0]),
                Vector::from_slice(&[0.0, 3.25]),
                Vector::from_slice(&[-0.75, 8.0]),
            ])?,
            vec![0, 10, 20],
            "mfcc",
        )?,
        MessageKind::Nbest => Message::nbest(
            tag,
            4,
            vec![
                NbestEntry::new(
                    vec![7, 11],
                    vec![0, 12],
                    vec!["hello".to_string(), "world".to_string()],
                    vec![0.875, 0.5],
                )?,
                NbestEntry::from_tokens(["yellow", "word"]),
            ],
        ),
        MessageKind::Json => Message::json(tag, 5, r#"{"hello":"123"}"#)?,
    };
    Ok(message.with_descriptor("source", "selftest")?)
}

/// Prints results and reports committed end-of-utterance results on a channel.
struct TranscribeListener {
    show_tentative: bool,
    finished: Sender<String>,
}

impl ResultListener for TranscribeListener {
    fn committed(&self, utterance_id: &str, text: &str, end_of_utterance: bool) {
        if !text.is_empty() {
            println!("{} {}", format!("[{}]", utterance_id).dimmed(), text);
        }
        if end_of_utterance {
            // Receiver is gone once the last utterance was confirmed
            self.finished.send(utterance_id.to_string()).ok();
        }
    }

    fn tentative(&self, utterance_id: &str, text: &str, _end_of_utterance: bool) {
        if self.show_tentative && !text.is_empty() {
            println!(
                "{} {}",
                format!("[{}]", utterance_id).dimmed(),
                text.yellow()
            );
        }
    }

    fn name(&self) -> &'static str {
        "transcribe"
    }
}

/// Stream each WAV file as one utterance of a single conversation.
fn handle_transcribe(
    config: &Path,
    overrides: &Overrides,
    quiet: bool,
    wavs: &[std::path::PathBuf],
    chunk_frames: usize,
    show_tentative: bool,
) -> Result<()> {
    let endpoints = ClientEndpoints::default();
    let session = Arc::new(Session::open(
        config,
        overrides,
        endpoints.registry()?,
        quiet,
    )?);

    let (finished_tx, finished_rx) = crossbeam_channel::unbounded();
    let listener = Arc::new(TranscribeListener {
        show_tentative,
        finished: finished_tx,
    });
    let mut client =
        StreamingClient::start(session, &endpoints, AudioFormat::default(), listener)?;

    let mut last_utterance = None;
    for (index, wav) in wavs.iter().enumerate() {
        let utterance_id = format!("utt_{}", index);
        let end_conversation = index + 1 == wavs.len();
        let pushed = client.producer().push_wav_file(
            wav,
            &utterance_id,
            "streamgate",
            end_conversation,
            chunk_frames,
        );
        match pushed {
            Ok(chunks) => {
                tracing::info!(file = %wav.display(), chunks, "Streamed file");
                last_utterance = Some(utterance_id);
            }
            Err(e) => {
                if let Err(close_err) = client.shutdown() {
                    tracing::warn!(error = %close_err, "Shutdown after failed push also failed");
                }
                return Err(e).with_context(|| format!("failed to stream {}", wav.display()));
            }
        }
    }

    if let Some(utterance_id) = last_utterance {
        wait_for_utterance(&finished_rx, &utterance_id);
    }
    client.shutdown()?;
    Ok(())
}

fn wait_for_utterance(finished: &Receiver<String>, utterance_id: &str) {
    loop {
        match finished.recv_timeout(defaults::PULL_TIMEOUT) {
            Ok(done) if done == utterance_id => return,
            Ok(_) => continue,
            Err(_) => {
                tracing::warn!(
                    utterance = utterance_id,
                    "No final result before timeout, shutting down"
                );
                return;
            }
        }
    }
}
