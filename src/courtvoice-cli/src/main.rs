//! Courtvoice CLI - Debate opponent speech player
//!
//! Speaks a counter-argument out loud (remote synthesis with local and
//! silent fallbacks) while highlighting each word in the terminal as it is
//! spoken, the same way the game highlights the opponent's transcript.

use clap::Parser;
use colored::Colorize;
use courtvoice_core::{
    Config, CpalPlayer, DebateSide, Difficulty, ElevenLabsClient, KokoroNative, OpponentClient,
    SessionCallbacks, SpeakerRole, SpeechEngine, Utterance, VoiceIdentity,
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Canned rebuttal used when the backend cannot produce one, so the turn
/// still plays out.
const FALLBACK_ARGUMENT: &str = "I understand your points, but I have a different perspective \
on this topic. There are important considerations we should examine. The evidence suggests we \
need to look at this from multiple angles.";

#[derive(Parser)]
#[command(
    name = "courtvoice",
    version,
    about = "Debate opponent speech player with live word highlighting",
    long_about = "Plays a debate counter-argument through the remote synthesis backend, \
falling back to local synthesis or a silent timer, while highlighting each word as it is spoken."
)]
struct Cli {
    /// Text to speak. Omit when using --respond-to.
    #[arg(value_name = "TEXT", required_unless_present = "respond_to")]
    text: Option<String>,

    /// Opponent voice (berta, andrew, or sophia)
    #[arg(short, long, default_value = "andrew", value_name = "VOICE")]
    voice: String,

    /// Path to a TOML config file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Generate the counter-argument from this player transcript first
    #[arg(long, value_name = "TRANSCRIPT")]
    respond_to: Option<String>,

    /// Debate topic, used with --respond-to
    #[arg(long, default_value = "this topic", value_name = "TOPIC")]
    topic: String,

    /// Opponent difficulty (easy, medium, hard)
    #[arg(long, default_value = "medium", value_name = "LEVEL")]
    difficulty: String,

    /// Which side the player argues (proponent or opponent)
    #[arg(long, default_value = "proponent", value_name = "SIDE")]
    side: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("courtvoice=info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Ok(endpoint) = std::env::var("COURTVOICE_BACKEND_URL") {
        config.synthesis.endpoint = endpoint;
    }

    let voice: VoiceIdentity = cli.voice.parse()?;
    let difficulty: Difficulty = cli.difficulty.parse()?;
    let side: DebateSide = cli.side.parse()?;

    // Resolve the text to speak, asking the backend for a rebuttal if needed.
    let text = match (&cli.text, &cli.respond_to) {
        (Some(text), _) => text.clone(),
        (None, Some(transcript)) => {
            println!("{}", "Generating counter-argument...".dimmed());
            let opponent = OpponentClient::new(&config.synthesis);
            match opponent.generate(&cli.topic, difficulty, transcript, side).await {
                Ok(argument) => argument,
                Err(e) => {
                    tracing::warn!(error = %e, "counter-argument backend unavailable");
                    eprintln!(
                        "{}",
                        "Backend unavailable, using fallback rebuttal.".yellow()
                    );
                    FALLBACK_ARGUMENT.to_string()
                }
            }
        }
        (None, None) => unreachable!("clap enforces TEXT or --respond-to"),
    };

    let utterance = Utterance::new(text.clone(), voice)?;
    let words: Vec<String> = utterance.words().iter().map(|w| w.to_string()).collect();

    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!(
        "{}",
        format!("  Courtvoice - {} speaks", voice).bright_blue().bold()
    );
    println!("{}", "═".repeat(70).bright_blue());
    println!();

    // Local fallback voice: kick off model loading before we need it.
    let native = KokoroNative::spawn(config.native_voices.clone())?;
    if !native.ready().await {
        tracing::warn!("local synthesis unavailable, relying on remote or silent playback");
    }

    let engine = SpeechEngine::new(
        Arc::new(ElevenLabsClient::new(&config.synthesis)),
        Arc::new(native),
        Arc::new(CpalPlayer::new()),
        &config,
    );

    let (done_tx, mut done_rx) = tokio::sync::mpsc::unbounded_channel::<Result<(), String>>();
    let end_tx = done_tx.clone();
    let callbacks = SessionCallbacks::new()
        .on_word_highlight(move |index| {
            if index >= 0 {
                if let Some(word) = words.get(index as usize) {
                    print!("{} ", word.bright_cyan().bold());
                    let _ = std::io::stdout().flush();
                }
            } else {
                println!();
            }
        })
        .on_end(move || {
            let _ = end_tx.send(Ok(()));
        })
        .on_error(move |e| {
            let _ = done_tx.send(Err(e.to_string()));
        });

    let handle = engine.speak(SpeakerRole::Opponent, utterance, callbacks);

    match done_rx.recv().await {
        Some(Ok(())) => {
            println!();
            if let Some(backend) = handle.backend() {
                println!(
                    "{} {}",
                    "Speech finished via".bright_green(),
                    format!("{:?}", backend).bright_green().bold()
                );
            }
        }
        Some(Err(reason)) => {
            eprintln!();
            eprintln!(
                "{} {}",
                "Playback failed:".red().bold(),
                reason.red()
            );
            // The game proceeds to scoring after a short grace period even
            // when speech fails; do the same here.
            tokio::time::sleep(Duration::from_secs(1)).await;
            println!("{}", "Proceeding anyway.".dimmed());
        }
        None => {}
    }

    Ok(())
}
