//! agent-chime: audible notifications for agentic CLI workflows.

mod adapters;
mod audio;
mod config;
mod events;
mod history;
mod notify;
mod system;
mod transcript;
mod tts;

use std::fs;
use std::io::{IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::adapters::RawInput;
use crate::audio::cache::{AudioCache, CacheEntry};
use crate::audio::earcons::{self, Earcon};
use crate::audio::renderer::AudioRenderer;
use crate::config::Config;
use crate::events::Source;
use crate::history::DeliveryRecord;
use crate::notify::Orchestrator;
use crate::system::{SystemDetector, SystemProbe};
use crate::tts::models::QUALITY_ORDER;
use crate::tts::selector::{ModelSelector, SelectionMode};

const TEST_TEXT: &str = "Hello! Agent chime is working correctly.";

#[derive(Parser, Debug)]
#[command(name = "agent-chime", about = "Audible notifications for agentic CLI workflows")]
struct Args {
    /// Path to config.yaml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug)]
struct TestTtsArgs {
    /// Text to synthesize
    #[arg(long)]
    text: Option<String>,

    /// TTS model to use
    #[arg(long)]
    model: Option<String>,

    /// Voice to use
    #[arg(long)]
    voice: Option<String>,

    /// Playback volume (0.0 - 1.0)
    #[arg(long)]
    volume: Option<f32>,

    /// Stop playback after this many seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Synthesize sentence by sentence, starting playback after the first
    #[arg(long)]
    stream: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process a notification event from an agent CLI
    Notify {
        /// Source CLI tool
        #[arg(long, value_enum)]
        source: Source,

        /// Explicit event type (required for opencode)
        #[arg(long)]
        event: Option<String>,

        /// Override TTS model
        #[arg(long)]
        model: Option<String>,

        /// Extra arguments passed by the tool (Codex sends its JSON payload here)
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Show system information and the recommended model
    SystemInfo {
        #[arg(long)]
        json: bool,
    },

    /// Test speech synthesis and playback
    TestTts(TestTtsArgs),

    /// List available TTS models and their download status
    Models {
        #[arg(long)]
        json: bool,
    },

    /// Manage configuration
    Config {
        /// Validate the configuration
        #[arg(long)]
        validate: bool,

        /// Print the effective configuration
        #[arg(long)]
        show: bool,

        /// Write a default configuration file
        #[arg(long)]
        init: bool,

        /// Overwrite an existing file with --init
        #[arg(long)]
        force: bool,
    },

    /// Show or clear the speech cache
    Cache {
        /// Delete every cached file
        #[arg(long)]
        clear: bool,

        /// List cached entries, most recently used first
        #[arg(long)]
        list: bool,

        #[arg(long)]
        json: bool,
    },

    /// Show or generate earcon files
    Earcons {
        /// Write the default earcons
        #[arg(long)]
        init: bool,

        /// Target directory (defaults to the configured earcons directory)
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Overwrite existing files with --init
        #[arg(long)]
        force: bool,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Logs go to stderr so hook stdout stays clean
    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load(args.config.as_deref());

    match args.command {
        Command::Notify {
            source,
            event,
            model,
            args,
        } => cmd_notify(config, source, event.as_deref(), model, &args),
        Command::SystemInfo { json } => cmd_system_info(&config, json),
        Command::TestTts(tts) => cmd_test_tts(config, tts),
        Command::Models { json } => cmd_models(&config, json),
        Command::Config {
            validate,
            show,
            init,
            force,
        } => cmd_config(&config, args.config.as_deref(), validate, show, init, force),
        Command::Cache { clear, list, json } => cmd_cache(&config, clear, list, json),
        Command::Earcons { init, dir, force } => cmd_earcons(&config, init, dir, force),
    }
}

fn cmd_notify(
    config: Config,
    source: Source,
    event: Option<&str>,
    model: Option<String>,
    args: &[String],
) -> ExitCode {
    let started = Instant::now();

    // Read stdin only when data is piped
    let mut stdin = String::new();
    let stdin = if source == Source::Claude && !std::io::stdin().is_terminal() {
        match std::io::stdin().read_to_string(&mut stdin) {
            Ok(_) => Some(stdin.as_str()),
            Err(e) => {
                warn!("Failed to read stdin: {e}");
                None
            }
        }
    } else {
        None
    };

    let (event, payload) = adapters::parse(source, RawInput { stdin, args, event });
    let Some(event) = event else {
        debug!("No event to process");
        return ExitCode::SUCCESS;
    };
    info!("Event: {} from {}", event.kind, event.source);

    let record_history = config.history;
    let mut orchestrator = Orchestrator::new(config, model, None);
    let outcome = orchestrator.deliver(&event, &payload);

    if record_history {
        history::save_record(&DeliveryRecord::new(&event, &outcome, started.elapsed()));
    }

    match outcome {
        Ok(delivery) => {
            debug!("Delivered: {delivery:?}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Notification failed: {e}");
            ExitCode::FAILURE
        }
    }
}

fn cmd_system_info(config: &Config, as_json: bool) -> ExitCode {
    let detector = Arc::new(SystemDetector::new(config.tts.python.clone()));
    let info = detector.detect();

    if as_json {
        let data = json!({
            "total_memory_gb": round2(info.total_memory_gb),
            "available_memory_gb": round2(info.available_memory_gb),
            "accelerator_available": info.accelerator_available,
            "chip_name": info.chip_name,
        });
        return print_json(&data);
    }

    println!("Total Memory:     {:.1} GB", info.total_memory_gb);
    println!("Available Memory: {:.1} GB", info.available_memory_gb);
    println!(
        "Accelerator:      {}",
        if info.accelerator_available { "Yes" } else { "No" }
    );
    if let Some(chip) = &info.chip_name {
        println!("Chip:             {chip}");
    }

    let result = ModelSelector::new(detector).select(None, SelectionMode::Auto);
    println!("\nRecommended Model: {}", result.model.model_id);
    println!("  Tier: {}", result.tier);
    println!("  Reason: {}", result.reason);
    ExitCode::SUCCESS
}

fn cmd_test_tts(config: Config, args: TestTtsArgs) -> ExitCode {
    let text = args.text.unwrap_or_else(|| TEST_TEXT.to_string());
    println!("Testing TTS with text: '{text}'");
    match &args.model {
        Some(id) => println!("Using model: {id}"),
        None => println!("Using auto-selected model"),
    }

    let mut orchestrator = Orchestrator::new(config, args.model, args.voice);
    if let Some(volume) = args.volume {
        orchestrator.renderer().set_volume(volume);
    }
    let timeout = args.timeout.map(Duration::from_secs);

    if args.stream {
        match orchestrator.speak_streaming(&text) {
            Ok(count) => println!("Streamed {count} sentence(s)"),
            Err(e) => {
                eprintln!("TTS error: {}", error_chain(&e));
                return ExitCode::FAILURE;
            }
        }
        finish_playback(orchestrator.renderer(), timeout);
        return ExitCode::SUCCESS;
    }

    let audio = match orchestrator.provider_mut().synthesize(&text) {
        Ok(audio) => audio,
        Err(e) => {
            eprintln!("TTS error: {}", error_chain(&e));
            return ExitCode::FAILURE;
        }
    };
    if let Some(selection) = orchestrator.provider_mut().selection() {
        println!("Selected: {} ({})", selection.model.model_id, selection.reason);
    }
    if let Some(spec) = orchestrator.provider_mut().current_model() {
        println!("Model used: {}", spec.model_id);
    }
    println!("Audio size: {} bytes", audio.len());

    let renderer = orchestrator.renderer();
    println!("Playing audio at volume {:.2}...", renderer.volume());

    // Without a timeout, block so a failing player is reported.
    let blocking = timeout.is_none();
    if let Err(e) = renderer.play(&audio, blocking) {
        eprintln!("Playback error: {e}");
        return ExitCode::FAILURE;
    }
    finish_playback(renderer, timeout);
    ExitCode::SUCCESS
}

fn finish_playback(renderer: &AudioRenderer, timeout: Option<Duration>) {
    if !renderer.wait(timeout) && renderer.is_playing() {
        println!("Timed out, stopping playback");
        renderer.stop();
    }
    println!("Done!");
}

fn cmd_models(config: &Config, as_json: bool) -> ExitCode {
    let selector = ModelSelector::new(Arc::new(SystemDetector::new(config.tts.python.clone())));
    let recommended = selector.select(None, SelectionMode::Auto).tier;

    if as_json {
        let models: Vec<_> = QUALITY_ORDER
            .into_iter()
            .map(|tier| {
                let spec = tier.spec();
                let cache_size = model_cache_size(spec.model_id);
                json!({
                    "tier": tier,
                    "model_id": spec.model_id,
                    "memory_gb": spec.estimated_memory_gb,
                    "realtime_factor": spec.realtime_factor,
                    "requires_accelerator": spec.requires_accelerator,
                    "description": spec.description,
                    "cached": cache_size.is_some(),
                    "cache_size_bytes": cache_size,
                    "recommended": tier == recommended,
                })
            })
            .collect();
        return print_json(&json!(models));
    }

    println!("Available TTS Models");
    println!("{}", "=".repeat(60));
    println!();

    let mut total = 0;
    for tier in QUALITY_ORDER {
        let spec = tier.spec();
        let marker = if tier == recommended { " ★ RECOMMENDED" } else { "" };
        println!("[{}]{marker}", tier.as_str().to_uppercase());
        println!("  Model:   {}", spec.model_id);
        println!("  Memory:  {} GB", spec.estimated_memory_gb);
        println!("  Speed:   {}x realtime", spec.realtime_factor);
        println!(
            "  Accel:   {}",
            if spec.requires_accelerator { "Required" } else { "Not required" }
        );
        println!("  Info:    {}", spec.description);
        match model_cache_size(spec.model_id) {
            Some(size) => {
                println!("  Cached:  ✓ ({})", format_size(size));
                total += size;
            }
            None => println!("  Cached:  ✗ (not downloaded)"),
        }
        println!();
    }

    println!("{}", "-".repeat(60));
    println!("Total cache size: {}", format_size(total));
    println!("Cache location:   {}", hf_hub_dir().display());
    ExitCode::SUCCESS
}

fn cmd_config(
    config: &Config,
    explicit: Option<&Path>,
    validate: bool,
    show: bool,
    init: bool,
    force: bool,
) -> ExitCode {
    if validate {
        let issues = config.validate();
        if issues.is_empty() {
            println!("Configuration is valid");
            return ExitCode::SUCCESS;
        }
        println!("Configuration issues:");
        for issue in issues {
            println!("  - {issue}");
        }
        return ExitCode::FAILURE;
    }

    if show {
        return match config.to_yaml() {
            Ok(yaml) => {
                print!("{yaml}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Failed to render config: {e}");
                ExitCode::FAILURE
            }
        };
    }

    if init {
        let path = explicit.map(PathBuf::from).unwrap_or_else(Config::default_path);
        if path.exists() && !force {
            println!("Config already exists at {}", path.display());
            println!("Use --force to overwrite");
            return ExitCode::FAILURE;
        }
        return match Config::default().save(&path) {
            Ok(()) => {
                println!("Config initialized at {}", path.display());
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Failed to write {}: {e}", path.display());
                ExitCode::FAILURE
            }
        };
    }

    let found = explicit
        .map(PathBuf::from)
        .into_iter()
        .chain(Config::candidate_paths())
        .find(|p| p.exists());
    match found {
        Some(path) => println!("Config loaded from: {}", path.display()),
        None => {
            println!("No config file found, using defaults");
            println!("Create one at: {}", Config::default_path().display());
        }
    }

    println!("\nEvents:");
    for (kind, event) in config.events.iter() {
        let state = if event.enabled { "enabled" } else { "disabled" };
        println!("  {:<18} {:?} ({state})", kind.as_str(), event.mode);
    }
    ExitCode::SUCCESS
}

fn cmd_cache(config: &Config, clear: bool, list: bool, as_json: bool) -> ExitCode {
    let mut cache = AudioCache::from_config(&config.cache);
    if clear {
        let count = cache.entry_count();
        let size = cache.size_bytes();
        cache.clear();
        println!(
            "Removed {count} cached files ({}) from {}",
            format_size(size),
            cache.dir().display()
        );
        return ExitCode::SUCCESS;
    }

    if list {
        let entries = cache.entries();
        if as_json {
            let rows: Vec<_> = entries.iter().map(|e| cache_entry_json(e)).collect();
            return print_json(&rows);
        }
        for entry in entries {
            println!(
                "{}  {:>9}  {}  {}",
                entry.key,
                format_size(entry.size_bytes),
                local_time(entry.last_accessed),
                describe_entry(entry)
            );
        }
        return ExitCode::SUCCESS;
    }

    let stats = cache.stats();
    if as_json {
        return print_json(&stats);
    }
    println!("Cache directory: {}", stats.dir.display());
    println!("Entries:         {} / {}", stats.entries, stats.max_entries);
    println!(
        "Size:            {} / {}",
        format_size(stats.size_bytes),
        format_size(stats.max_size_bytes)
    );
    ExitCode::SUCCESS
}

fn cmd_earcons(config: &Config, init: bool, dir: Option<PathBuf>, force: bool) -> ExitCode {
    let dir = dir.unwrap_or_else(|| config.playback.earcons_dir());

    if init {
        return match earcons::write_default_earcons(&dir, force) {
            Ok(written) => {
                for path in &written {
                    println!("Wrote {}", path.display());
                }
                if written.is_empty() {
                    println!(
                        "Earcons already present in {} (use --force to overwrite)",
                        dir.display()
                    );
                }
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Failed to write earcons to {}: {e}", dir.display());
                ExitCode::FAILURE
            }
        };
    }

    println!("Earcons directory: {}", dir.display());
    for earcon in Earcon::ALL {
        let present = dir.join(earcon.file_name()).is_file();
        println!(
            "  {:<18} {}",
            earcon.file_name(),
            if present { "✓" } else { "✗ (missing)" }
        );
    }
    ExitCode::SUCCESS
}

/// Text, voice and model are unknown for entries restored from disk.
fn describe_entry(entry: &CacheEntry) -> String {
    if entry.text.is_empty() {
        return "(restored, text unknown)".to_string();
    }
    let text: String = entry.text.chars().take(40).collect();
    let ellipsis = if entry.text.chars().count() > 40 { "..." } else { "" };
    format!(
        "{} [{}] created {} \"{text}{ellipsis}\"",
        entry.model,
        entry.voice,
        local_time(entry.created_at)
    )
}

fn cache_entry_json(entry: &CacheEntry) -> serde_json::Value {
    let known = |s: &str| (!s.is_empty()).then(|| s.to_string());
    json!({
        "key": entry.key,
        "file": entry.file_path,
        "size_bytes": entry.size_bytes,
        "text": known(&entry.text),
        "voice": known(&entry.voice),
        "model": known(&entry.model),
        "created_at": DateTime::<Local>::from(entry.created_at).to_rfc3339(),
        "last_accessed": DateTime::<Local>::from(entry.last_accessed).to_rfc3339(),
    })
}

fn local_time(time: SystemTime) -> String {
    DateTime::<Local>::from(time).format("%Y-%m-%d %H:%M:%S").to_string()
}

fn print_json<T: serde::Serialize>(value: &T) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(s) => {
            println!("{s}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Failed to serialize output: {e}");
            ExitCode::FAILURE
        }
    }
}

fn error_chain(e: &dyn std::error::Error) -> String {
    let mut msg = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        msg.push_str(&format!(": {cause}"));
        source = cause.source();
    }
    msg
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn hf_hub_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".cache/huggingface/hub")
}

/// Disk size of a downloaded model, `None` if it is not in the HF cache.
fn model_cache_size(model_id: &str) -> Option<u64> {
    let dir = hf_hub_dir().join(format!("models--{}", model_id.replace('/', "--")));
    dir.is_dir().then(|| dir_size(&dir))
}

fn dir_size(dir: &Path) -> u64 {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    entries
        .flatten()
        .map(|entry| match entry.file_type() {
            Ok(t) if t.is_dir() => dir_size(&entry.path()),
            Ok(t) if t.is_file() => entry.metadata().map(|m| m.len()).unwrap_or(0),
            _ => 0,
        })
        .sum()
}

fn format_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if size < 1024.0 {
            return format!("{size:.1} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.1} TB")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(format_size(512), "512.0 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(100 * 1024 * 1024), "100.0 MB");
    }

    #[test]
    fn dir_size_sums_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("snapshots/abc")).unwrap();
        fs::write(dir.path().join("a.bin"), [0u8; 10]).unwrap();
        fs::write(dir.path().join("snapshots/abc/b.bin"), [0u8; 5]).unwrap();
        assert_eq!(dir_size(dir.path()), 15);
    }

    #[test]
    fn codex_payload_is_collected_as_trailing_arg() {
        let args = Args::try_parse_from([
            "agent-chime",
            "notify",
            "--source",
            "codex",
            r#"{"type":"agent-turn-complete"}"#,
        ])
        .unwrap();
        let Command::Notify { source, args, .. } = args.command else {
            panic!("expected notify");
        };
        assert_eq!(source, Source::Codex);
        assert_eq!(args, vec![r#"{"type":"agent-turn-complete"}"#.to_string()]);
    }

    #[test]
    fn opencode_source_and_event_parse() {
        let args = Args::try_parse_from([
            "agent-chime",
            "-v",
            "notify",
            "--source",
            "opencode",
            "--event",
            "ERROR_RETRY",
        ])
        .unwrap();
        assert!(args.verbose);
        let Command::Notify { source, event, .. } = args.command else {
            panic!("expected notify");
        };
        assert_eq!(source, Source::OpenCode);
        assert_eq!(event.as_deref(), Some("ERROR_RETRY"));
    }

    #[test]
    fn test_tts_accepts_playback_flags() {
        let args = Args::try_parse_from([
            "agent-chime",
            "test-tts",
            "--volume",
            "0.3",
            "--timeout",
            "5",
            "--stream",
        ])
        .unwrap();
        let Command::TestTts(tts) = args.command else {
            panic!("expected test-tts");
        };
        assert_eq!(tts.volume, Some(0.3));
        assert_eq!(tts.timeout, Some(5));
        assert!(tts.stream);
        assert!(tts.text.is_none());
    }
}
