use std::env;
use std::fs;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, Command};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};

use groove_engine::clock::{ManualClock, SystemClock, TimeSource};
use groove_engine::console::{self, Level};
use groove_engine::engine::sink::JsonLinesSink;
use groove_engine::model::song::Song;
use groove_engine::{storage, Sequencer};

/// Scheduling loop period in real-time play.
const POLL_MS: f64 = 5.0;
/// Scheduling loop period for offline renders.
const RENDER_POLL_MS: f64 = 1.0;

fn cli() -> Command {
    Command::new("groove-engine")
        .about("Step-sequencer engine: plays a YAML song as timed note events (JSON lines on stdout)")
        .arg(
            Arg::new("open")
                .short('o')
                .long("open")
                .value_name("FILE")
                .required(true)
                .help("YAML song to play"),
        )
        .arg(
            Arg::new("render")
                .short('r')
                .long("render")
                .value_name("MS")
                .value_parser(value_parser!(f64))
                .help("Render MS milliseconds offline with a simulated clock and exit"),
        )
        .arg(
            Arg::new("duration")
                .short('d')
                .long("duration")
                .value_name("MS")
                .value_parser(value_parser!(f64))
                .help("Stop real-time play after MS milliseconds"),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .value_name("N")
                .value_parser(value_parser!(u64))
                .help("Seed for probability, pitch span and random arpeggios"),
        )
        .arg(
            Arg::new("clock")
                .long("clock")
                .action(ArgAction::SetTrue)
                .help("Emit MIDI clock pulses"),
        )
        .arg(
            Arg::new("no-watch")
                .long("no-watch")
                .action(ArgAction::SetTrue)
                .help("Do not reload the song when the file changes"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .conflicts_with("quiet")
                .help("Log resyncs, bar changes and clock drift"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .action(ArgAction::SetTrue)
                .help("Only log errors"),
        )
}

fn main() -> Result<()> {
    let matches = cli().get_matches();

    if matches.get_flag("verbose") {
        console::set_level(Level::Debug);
    } else if matches.get_flag("quiet") {
        console::set_level(Level::Error);
    }

    let path = matches
        .get_one::<String>("open")
        .map(PathBuf::from)
        .context("no song given (--open FILE)")?;
    let mut song = storage::song::open(&path)?;
    console::info(format!("{}:\n{}", path.display(), song.list().trim_end()));
    if let Some(seed) = matches.get_one::<u64>("seed") {
        song.settings.seed = *seed;
    }
    if matches.get_flag("clock") {
        song.settings.send_clock = true;
    }

    if let Some(ms) = matches.get_one::<f64>("render") {
        render(&song, *ms);
        return Ok(());
    }

    let duration = matches.get_one::<f64>("duration").copied();
    let reloads = (!matches.get_flag("no-watch")).then(|| watch(path));
    play(&song, duration, reloads);
    Ok(())
}

/// Offline render: the manual clock jumps from one loop iteration to the
/// next, so output is identical run to run.
fn render(song: &Song, duration_ms: f64) {
    let clock = ManualClock::new();
    let sink = JsonLinesSink::new(BufWriter::new(io::stdout().lock()), clock.clone());
    let mut seq = Sequencer::from_song(song, Box::new(clock), Box::new(sink));
    seq.start();
    seq.run_for(duration_ms, RENDER_POLL_MS);
    seq.stop();
}

fn play(song: &Song, duration_ms: Option<f64>, reloads: Option<Receiver<Song>>) {
    let clock = SystemClock::new();
    let sink = JsonLinesSink::new(io::stdout(), clock);
    let mut seq = Sequencer::from_song(song, Box::new(clock), Box::new(sink));
    let end = duration_ms.map(|d| clock.now() + d);

    seq.start();
    loop {
        if end.is_some_and(|end| clock.now() >= end) {
            break;
        }
        if let Some(rx) = &reloads {
            while let Ok(next) = rx.try_recv() {
                seq.apply_song(&next);
            }
        }
        seq.tick();
        clock.yield_until(clock.now() + POLL_MS);
    }
    seq.stop();
}

/// Watches the song file and sends every successfully parsed version.
fn watch(path: PathBuf) -> Receiver<Song> {
    let (tx, rx) = mpsc::channel();
    console::info(format!("watching: {}", path.display()));
    start_watcher(path.clone(), tx.clone());
    // Polling fallback for editors that use atomic rename or missed events
    start_polling(path, tx);
    rx
}

fn reload(path: &Path, tx: &Sender<Song>, via: &str) -> bool {
    match storage::song::open(path) {
        Ok(song) => {
            console::info(format!("reloaded: {} ({})", path.display(), via));
            tx.send(song).is_ok()
        }
        Err(e) => {
            console::warn(format!("reload failed: {:#}", e));
            true
        }
    }
}

fn start_watcher(path: PathBuf, tx: Sender<Song>) {
    // Resolve a reliable directory to watch (handle bare filenames and missing parents)
    let parent = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(p) => p.to_path_buf(),
        None => env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    };
    let file_name = path.file_name().map(|s| s.to_os_string());
    thread::spawn(move || {
        let (events_tx, events_rx) = mpsc::channel();
        let mut watcher: RecommendedWatcher = match Watcher::new(events_tx, notify::Config::default()) {
            Ok(w) => w,
            Err(e) => {
                console::warn(format!("file watch disabled (create watcher failed): {}", e));
                return;
            }
        };
        if let Err(e) = watcher.watch(parent.as_path(), RecursiveMode::NonRecursive) {
            console::warn(format!(
                "file watch disabled (cannot watch parent dir '{}'): {}",
                parent.display(),
                e
            ));
            return;
        }
        while let Ok(event) = events_rx.recv() {
            let Ok(event) = event else { continue };
            let relevant = event
                .paths
                .iter()
                .any(|p| file_name.as_deref().is_some_and(|f| p.file_name() == Some(f)));
            if !relevant {
                continue;
            }
            // Debounce
            thread::sleep(Duration::from_millis(50));
            if !reload(&path, &tx, "event") {
                break;
            }
        }
    });
}

fn start_polling(path: PathBuf, tx: Sender<Song>) {
    thread::spawn(move || {
        let mut last: Option<(SystemTime, u64)> = fs::metadata(&path)
            .ok()
            .and_then(|m| m.modified().ok().map(|t| (t, m.len())));
        loop {
            thread::sleep(Duration::from_millis(500));
            let Ok(meta) = fs::metadata(&path) else { continue };
            let Ok(mtime) = meta.modified() else { continue };
            let changed = match last {
                Some((t, len)) => mtime > t || meta.len() != len,
                None => true,
            };
            if changed {
                last = Some((mtime, meta.len()));
                thread::sleep(Duration::from_millis(50));
                if !reload(&path, &tx, "poll") {
                    break;
                }
            }
        }
    });
}
