//! parlante — command-line front end for the tutor backend.
//!
//! Speaks a sentence through the speech fallback chain, or holds a short
//! conversation with the tutor. Configuration and secrets are read from
//! the standard locations (see `parlante::config`).

use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;

use parlante::{Config, Gender, Level, Secrets, SpeechDirective, Tutor, TutorBuilder, VoiceOptions};

/// Parlante tutor backend CLI
#[derive(Parser)]
#[command(name = "parlante")]
#[command(version)]
#[command(about = "Speech synthesis and tutor replies for Spanish learners")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long, env = "PARLANTE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Synthesize a sentence
    Speak {
        /// Text to speak
        text: String,
        /// Language tag
        #[arg(short, long, default_value = "es")]
        lang: String,
        /// Voice gender: female or male
        #[arg(short, long, default_value = "female")]
        gender: Gender,
        /// Vendor-specific voice id
        #[arg(long)]
        voice: Option<String>,
        /// Preferred vendor, tried first
        #[arg(long)]
        provider: Option<String>,
        /// Where to write the audio (default: stdout summary only)
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Fail instead of falling back to the browser directive
        #[arg(long)]
        strict: bool,
    },

    /// Talk to the tutor
    Chat {
        /// Session id
        session: String,
        /// Learner message (omit for an interactive session on stdin)
        message: Option<String>,
        /// Conversation topic
        #[arg(short, long, default_value = "")]
        topic: String,
        /// Learner level: beginner, intermediate, advanced (or A1..C2)
        #[arg(short, long, default_value = "beginner")]
        level: Level,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let config = Config::load(args.config.as_deref())?;
    let secrets = Secrets::load()?;
    let tutor = TutorBuilder::from_config(&config, &secrets).build().await?;
    info!(?tutor, "tutor ready");

    match args.command {
        Command::Speak {
            text,
            lang,
            gender,
            voice,
            provider,
            out,
            strict,
        } => {
            let mut options = VoiceOptions::new().gender(gender);
            if let Some(voice) = voice {
                options = options.voice(voice);
            }
            if let Some(provider) = provider {
                options = options.provider(provider);
            }

            let synthesis = if strict {
                tutor.synthesize(&text, &lang, options).await?
            } else {
                tutor.synthesize_or_degrade(&text, &lang, options).await?
            };

            println!("served by:    {}", synthesis.served_by);
            println!("content type: {}", synthesis.content_type());
            if synthesis.artifact.is_directive() {
                let directive = SpeechDirective::from_artifact(&synthesis.artifact)?;
                println!("directive:    {}", serde_json::to_string(&directive)?);
            } else {
                println!("bytes:        {}", synthesis.bytes().len());
            }
            if let Some(path) = out {
                tokio::fs::write(&path, synthesis.bytes()).await?;
                println!("written to {}", path.display());
            }
        }

        Command::Chat {
            session,
            message,
            topic,
            level,
        } => match message {
            Some(message) => chat_turn(&tutor, &session, &message, &topic, level).await?,
            None => chat_loop(&tutor, &session, &topic, level).await?,
        },
    }

    Ok(())
}

async fn chat_turn(
    tutor: &Tutor,
    session: &str,
    message: &str,
    topic: &str,
    level: Level,
) -> Result<(), Box<dyn std::error::Error>> {
    let reply = tutor.reply(session, message, topic, level).await?;
    println!("tutor ({}): {}", reply.served_by, reply.text);
    if let Some(correction) = &reply.correction {
        println!("  corrección: {correction}");
    }
    for suggestion in &reply.suggestions {
        println!("  sugerencia: {suggestion}");
    }
    Ok(())
}

/// Read learner lines from stdin until EOF. Failed turns are reported and
/// the conversation continues.
async fn chat_loop(
    tutor: &Tutor,
    session: &str,
    topic: &str,
    level: Level,
) -> Result<(), Box<dyn std::error::Error>> {
    let interactive = io::stdin().is_terminal();
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        if interactive {
            print!("tú: ");
            io::stdout().flush()?;
        }
        let Some(line) = lines.next() else { break };
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if let Err(e) = chat_turn(tutor, session, &line, topic, level).await {
            eprintln!("error: {e}");
        }
    }
    Ok(())
}
