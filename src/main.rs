use std::error::Error;
use std::io::Write;
use std::path::PathBuf;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use voxmemo::{
    config, format_elapsed, upload_record, AudioDeviceManager, ContainerFormat, CpalBackend,
    FileProber, RecorderConfig, SessionController, TickOutcome, Transition, UploadConfig,
    TICK_PERIOD,
};

/// Record, list, play back, rename and share voice memos.
#[derive(Parser, Debug)]
#[command(name = "voxmemo", version)]
struct Args {
    /// Directory holding the clips (overrides the config file).
    #[arg(long)]
    dir: Option<PathBuf>,
    /// Input device name (overrides the config file).
    #[arg(long)]
    device: Option<String>,
    /// Container for new clips: mp3 or wav.
    #[arg(long)]
    format: Option<ContainerFormat>,
    /// Alternative config file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// More log output (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Print the available input devices and exit.
    #[arg(long)]
    list_devices: bool,
    /// Write the effective directory, device and format to the config file.
    #[arg(long)]
    save_config: bool,
    /// Delete the config file and exit.
    #[arg(long, conflicts_with = "save_config")]
    reset_config: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Record,
    Play(usize),
    Delete(usize),
    Rename(usize),
    Upload(usize),
    List,
    Devices,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

/// Parse one input line. Record numbers are shown 1-based and returned 0-based.
fn parse_command(line: &str) -> Command {
    let mut parts = line.split_whitespace();
    let Some(word) = parts.next() else {
        return Command::Empty;
    };
    let index = parts
        .next()
        .and_then(|n| n.parse::<usize>().ok())
        .filter(|&n| n > 0)
        .map(|n| n - 1);

    match (word.to_ascii_lowercase().as_str(), index) {
        ("r" | "rec" | "record", _) => Command::Record,
        ("p" | "play", Some(i)) => Command::Play(i),
        ("d" | "del" | "delete", Some(i)) => Command::Delete(i),
        ("n" | "rename", Some(i)) => Command::Rename(i),
        ("u" | "upload", Some(i)) => Command::Upload(i),
        ("l" | "ls" | "list", _) => Command::List,
        ("devices", _) => Command::Devices,
        ("h" | "help" | "?", _) => Command::Help,
        ("q" | "quit" | "exit", _) => Command::Quit,
        _ => Command::Unknown(line.trim().to_string()),
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "voxmemo=info",
        1 => "voxmemo=debug",
        _ => "voxmemo=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing(args.verbose);

    if args.list_devices {
        print_devices();
        return Ok(());
    }

    let config_file = match &args.config {
        Some(path) => path.clone(),
        None => config::config_path()?,
    };
    if args.reset_config {
        config::clear_config_at(&config_file)?;
        println!("removed {}", config_file.display());
        return Ok(());
    }

    let mut cfg = config::load_config_from(&config_file)?;
    let output_dir = args
        .dir
        .clone()
        .unwrap_or_else(|| config::resolve_recordings_dir(&cfg));
    std::fs::create_dir_all(&output_dir)?;

    let recorder_config = RecorderConfig {
        output_dir,
        input_device: args.device.clone().or_else(|| cfg.input_device.clone()),
        container: args.format.unwrap_or(cfg.container),
    };
    info!("storage root: {}", recorder_config.output_dir.display());

    if args.save_config {
        cfg.recordings_dir = Some(recorder_config.output_dir.clone());
        cfg.input_device = recorder_config.input_device.clone();
        cfg.container = recorder_config.container;
        config::save_config_to(&config_file, &cfg)?;
        info!("saved settings to {}", config_file.display());
    }

    let controller = SessionController::new(
        recorder_config,
        Box::new(CpalBackend),
        Box::new(FileProber),
    )?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(controller, cfg.upload))
}

/// Drive the controller from stdin and the 1 s ticker, all on one thread.
async fn run(mut controller: SessionController, upload: UploadConfig) -> Result<(), Box<dyn Error>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(TICK_PERIOD);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut renaming: Option<usize> = None;
    let mut uploads: JoinSet<()> = JoinSet::new();

    print_help();
    print_list(&controller);

    loop {
        tokio::select! {
            _ = ticker.tick() => on_tick(&mut controller),
            Some(joined) = uploads.join_next(), if !uploads.is_empty() => {
                if let Err(e) = joined {
                    error!("upload task failed: {e}");
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };

                if let Some(index) = renaming.take() {
                    finish_rename(&mut controller, index, line.trim());
                    continue;
                }

                match parse_command(&line) {
                    Command::Record => {
                        if report(controller.toggle_record()) {
                            ticker.reset();
                        }
                    }
                    Command::Play(i) => {
                        if report(controller.toggle_or_switch_play(i)) {
                            ticker.reset();
                        }
                        print_list(&controller);
                    }
                    Command::Delete(i) => {
                        let result = controller
                            .path_at(i)
                            .and_then(|path| controller.delete(&path));
                        match result {
                            Ok(()) => print_list(&controller),
                            Err(e) => println!("! {e}"),
                        }
                    }
                    Command::Rename(i) => match controller.open_rename_dialog(i) {
                        Ok(()) => {
                            let name = &controller.entries()[i].record.name;
                            print!("new name for '{name}' (empty to cancel): ");
                            let _ = std::io::stdout().flush();
                            renaming = Some(i);
                        }
                        Err(e) => println!("! {e}"),
                    },
                    Command::Upload(i) => spawn_upload(&mut uploads, &controller, i, &upload),
                    Command::List => print_list(&controller),
                    Command::Devices => print_devices(),
                    Command::Help => print_help(),
                    Command::Quit => break,
                    Command::Empty => {}
                    Command::Unknown(cmd) => println!("unknown command: {cmd} (try 'help')"),
                }
            }
        }
    }

    controller.shutdown();
    if !uploads.is_empty() {
        println!("waiting for {} upload(s) to finish...", uploads.len());
        drain_uploads(&mut uploads).await;
    }
    Ok(())
}

/// Wait for every upload still in flight. Returns how many completed.
async fn drain_uploads(uploads: &mut JoinSet<()>) -> usize {
    let mut completed = 0;
    while let Some(joined) = uploads.join_next().await {
        match joined {
            Ok(()) => completed += 1,
            Err(e) => error!("upload task failed: {e}"),
        }
    }
    completed
}

/// Print a transition; true when a session just started.
fn report(result: Result<Transition, voxmemo::VoiceError>) -> bool {
    match result {
        Ok(Transition::RecordingStarted(path)) => {
            println!("● recording to {}", path.display());
            true
        }
        Ok(Transition::RecordingStopped(path)) => {
            println!("■ saved {}", path.display());
            false
        }
        Ok(Transition::PlaybackStarted(_)) | Ok(Transition::PlaybackSwitched { .. }) => true,
        Ok(Transition::PlaybackStopped(_)) => false,
        Ok(Transition::Ignored(reason)) => {
            println!("ignored: {reason}");
            false
        }
        Err(e) => {
            println!("! {e}");
            false
        }
    }
}

fn on_tick(controller: &mut SessionController) {
    match controller.tick() {
        TickOutcome::Idle => {}
        TickOutcome::Elapsed(secs) => {
            let marker = match controller.playing_index() {
                Some(i) => format!("▶ {}", i + 1),
                None => "● REC".to_string(),
            };
            print!("\r{marker} {}  ", format_elapsed(secs));
            let _ = std::io::stdout().flush();
        }
        TickOutcome::PlaybackFinished(path) => {
            println!("\rfinished {}", path.display());
            print_list(controller);
        }
        TickOutcome::TimedOut { elapsed } => {
            println!("\rstopped after {}", format_elapsed(elapsed));
            print_list(controller);
        }
    }
}

fn finish_rename(controller: &mut SessionController, index: usize, new_name: &str) {
    if new_name.is_empty() {
        if let Err(e) = controller.dismiss_rename_dialog(index) {
            println!("! {e}");
        }
        return;
    }
    match controller.rename(index, new_name) {
        Ok(path) => {
            println!("renamed to {}", path.display());
            print_list(controller);
        }
        Err(e) => println!("! {e}"),
    }
}

fn spawn_upload(
    uploads: &mut JoinSet<()>,
    controller: &SessionController,
    index: usize,
    upload: &UploadConfig,
) {
    let Some(entry) = controller.entries().get(index) else {
        println!("! no record at index {}", index + 1);
        return;
    };
    let path = entry.record.path.clone();
    let title = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| entry.record.name.clone());
    let duration = entry.record.duration;
    let upload = upload.clone();

    println!("uploading {}...", entry.record.name);
    uploads.spawn(async move {
        match upload_record(&path, &title, duration, &upload).await {
            Ok(result) => println!("uploaded '{title}' as {}", result.document_id),
            Err(e) => {
                error!("upload of {} failed: {e}", path.display());
                println!("! upload failed: {e}");
            }
        }
    });
}

fn print_list(controller: &SessionController) {
    let entries = controller.entries();
    if entries.is_empty() {
        println!("no recordings in {}", controller.storage_root().display());
        return;
    }
    for (i, entry) in entries.iter().enumerate() {
        let marker = if entry.is_playing() { "▶" } else { " " };
        println!(
            "{marker} {:>3}  {:<32} {}  {:>8}",
            i + 1,
            entry.record.name,
            entry.record.timestamp_display,
            entry.record.duration_display
        );
    }
}

fn print_devices() {
    let devices = AudioDeviceManager::new().list_input_devices();
    if devices.is_empty() {
        println!("no input devices found");
    }
    for dev in devices {
        let default = if dev.is_default { " (default)" } else { "" };
        println!("  {}{default}", dev.name);
    }
}

fn print_help() {
    println!(
        "commands: record | play N | delete N | rename N | upload N | list | devices | help | quit"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("r"), Command::Record);
        assert_eq!(parse_command("record"), Command::Record);
        assert_eq!(parse_command("play 1"), Command::Play(0));
        assert_eq!(parse_command("P 3"), Command::Play(2));
        assert_eq!(parse_command("delete 2"), Command::Delete(1));
        assert_eq!(parse_command("rename 4"), Command::Rename(3));
        assert_eq!(parse_command("upload 1"), Command::Upload(0));
        assert_eq!(parse_command("  "), Command::Empty);
        assert_eq!(parse_command("q"), Command::Quit);
    }

    #[test]
    fn test_parse_command_rejects_bad_index() {
        assert_eq!(parse_command("play"), Command::Unknown("play".into()));
        assert_eq!(parse_command("play 0"), Command::Unknown("play 0".into()));
        assert_eq!(parse_command("play x"), Command::Unknown("play x".into()));
    }

    #[test]
    fn test_args_parse() {
        let args = Args::parse_from(["voxmemo", "--dir", "/tmp/clips", "--format", "wav", "-vv"]);
        assert_eq!(args.dir, Some(PathBuf::from("/tmp/clips")));
        assert_eq!(args.format, Some(ContainerFormat::Wav));
        assert_eq!(args.verbose, 2);
        assert!(!args.list_devices);
        assert!(!args.save_config);
    }

    #[test]
    fn test_args_reset_conflicts_with_save() {
        assert!(Args::try_parse_from(["voxmemo", "--reset-config"]).is_ok());
        assert!(Args::try_parse_from(["voxmemo", "--reset-config", "--save-config"]).is_err());
    }

    #[tokio::test]
    async fn test_drain_uploads_waits_for_pending_tasks() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;
        use std::time::Duration;

        let done = Arc::new(AtomicUsize::new(0));
        let mut uploads = JoinSet::new();
        for delay in [30u64, 10, 20] {
            let done = done.clone();
            uploads.spawn(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                done.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert_eq!(drain_uploads(&mut uploads).await, 3);
        assert_eq!(done.load(Ordering::SeqCst), 3);
        assert!(uploads.is_empty());
    }
}
