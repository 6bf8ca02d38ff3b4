//! lektor: read markdown guide articles aloud, one highlighted sentence at a time.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use lektor::api::{self, ApiState, Narrator};
use lektor::config::Config;
use lektor::library::Library;
use lektor::narration::{
    choose_default_voice, filter_voices, CommandSpeechEngine, NarrationChannel, Sequencer, SettingsStore,
    SpeechEngine, VoiceSettings,
};
use lektor::reader::{align, segment, NarrationScript};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "lektor", about = "Sentence-aligned read-aloud engine")]
struct Args {
    /// Path to config.yaml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Run the HTTP API
    Serve,
    /// Print the sentences of a text file with their byte offsets
    Segment { file: PathBuf },
    /// Render a markdown file with sentence indices
    Render {
        file: PathBuf,
        /// Sentence to mark as highlighted
        #[arg(long)]
        highlight: Option<usize>,
        /// Print HTML instead of the narration script
        #[arg(long)]
        html: bool,
    },
    /// Read a markdown file aloud
    Speak {
        file: PathBuf,
        /// Global sentence index to start from
        #[arg(long, default_value_t = 0)]
        from: usize,
    },
    /// List the voices the speech program offers
    Voices,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug,hyper=info,tower=info")
    } else {
        EnvFilter::new("info,hyper=warn,tower=warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let config = Config::load(args.config.as_deref());
    debug!("Config loaded: {config:?}");

    match args.command {
        Cmd::Serve => serve(&config).await?,
        Cmd::Segment { file } => {
            let text = std::fs::read_to_string(&file)?;
            for sentence in segment(&text) {
                println!("{}\t{}..{}\t{}", sentence.index, sentence.start, sentence.end, sentence.text);
            }
        }
        Cmd::Render { file, highlight, html } => {
            let markdown = std::fs::read_to_string(&file)?;
            let document = align(&markdown, highlight);
            if html {
                print!("{}", document.to_html());
            } else {
                for entry in &document.script.entries {
                    let marker = if highlight == Some(entry.index) { "*" } else { " " };
                    println!("{marker}{}\t{}", entry.index, entry.text);
                }
                info!(
                    "{} sentences in {} slots",
                    document.script.len(),
                    document.script.slots
                );
            }
        }
        Cmd::Speak { file, from } => speak(&config, &file, from).await?,
        Cmd::Voices => {
            let engine = CommandSpeechEngine::new(&config.speech);
            let voices = filter_voices(&engine.list_voices().await?);
            let default = choose_default_voice(&voices, config.voice.voice.as_deref());
            for voice in voices {
                let marker = if default.as_deref() == Some(voice.id.as_str()) { "*" } else { " " };
                println!("{marker}{}\t{}\t{}", voice.id, voice.language, voice.name);
            }
        }
    }

    Ok(())
}

/// Build the settings store, filling in the default voice when none is saved.
async fn settings_store(config: &Config, engine: &CommandSpeechEngine) -> (SettingsStore, Vec<lektor::narration::Voice>) {
    let store = SettingsStore::open(config.settings_path(), VoiceSettings::from_config(&config.voice));

    let voices = match engine.list_voices().await {
        Ok(voices) => filter_voices(&voices),
        Err(e) => {
            warn!("Could not list voices: {e}");
            Vec::new()
        }
    };
    let saved = store.get().voice;
    if let Some(voice) = choose_default_voice(&voices, saved.as_deref()) {
        if saved.as_deref() != Some(voice.as_str()) {
            info!("Default voice: {voice}");
            store.set_voice(&voice);
        }
    }
    (store, voices)
}

async fn serve(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let engine = Arc::new(CommandSpeechEngine::new(&config.speech));
    let available = engine.is_available();
    let (settings, voices) = if available {
        settings_store(config, &engine).await
    } else {
        warn!("Speech unavailable, read-aloud disabled");
        let store = SettingsStore::open(config.settings_path(), VoiceSettings::from_config(&config.voice));
        (store, Vec::new())
    };
    let settings = Arc::new(settings);

    let channel = Arc::new(NarrationChannel::new(engine));
    let (sequencer, mut sentences) = Sequencer::spawn(channel, settings.subscribe(), &config.narration);
    tokio::spawn(async move {
        while let Some(index) = sentences.recv().await {
            debug!("Now reading: {index:?}");
        }
    });

    let state = ApiState {
        library: Arc::new(Library::new(&config.library.data_dir)),
        settings,
        narrator: Arc::new(Narrator::new(sequencer, available)),
        voices: Arc::new(voices),
    };

    info!("lektor ready");
    api::serve(state, &config.api.host, config.api.port).await?;
    Ok(())
}

async fn speak(config: &Config, file: &Path, from: usize) -> Result<(), Box<dyn std::error::Error>> {
    let engine = Arc::new(CommandSpeechEngine::new(&config.speech));
    if !engine.is_available() {
        return Err(format!("{} is not available", config.speech.program).into());
    }
    let (settings, _) = settings_store(config, &engine).await;

    let markdown = std::fs::read_to_string(file)?;
    let script = NarrationScript::from_markdown(&markdown);
    let texts: Vec<(usize, String)> = script.entries.iter().map(|e| (e.index, e.text.clone())).collect();

    let channel = Arc::new(NarrationChannel::new(engine));
    let (sequencer, mut sentences) = Sequencer::spawn(channel, settings.subscribe(), &config.narration);
    sequencer.load(script)?;
    sequencer.play_from_sentence(from)?;

    loop {
        tokio::select! {
            index = sentences.recv() => match index.flatten() {
                Some(index) => {
                    if let Some((_, text)) = texts.iter().find(|(i, _)| *i == index) {
                        println!("[{index}] {text}");
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                sequencer.stop()?;
                break;
            }
        }
    }

    // Dropping the handle ends the task and silences the engine.
    drop(sequencer);
    tokio::task::yield_now().await;
    Ok(())
}
