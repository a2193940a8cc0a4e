use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info, warn};

use inkplay::cli::{Args, Command};
use inkplay::config::{PlaybackSpeed, Settings};
use inkplay::core::driver::RenderDriver;
use inkplay::core::events::PlaybackState;
use inkplay::core::player::Player;
use inkplay::core::timed_index::TimedIndex;
use inkplay::core::timer::ThreadScheduler;
use inkplay::entities::document::Document;
use inkplay::paths::PathConfig;

fn main() -> Result<()> {
    let args = Args::parse();

    // Create path configuration from CLI args and environment
    let path_config = PathConfig::from_env_and_cli(args.config_dir.clone());
    if let Err(e) = path_config.ensure_dirs() {
        eprintln!("Warning: Failed to create application directories: {:#}", e);
    }

    init_logging(&args, &path_config)?;
    debug!("Command-line args: {:?}", args);

    let settings_path = path_config.settings_file();
    info!("Config path: {}", settings_path.display());
    let settings = Settings::load(&settings_path);

    match &args.command {
        Command::Render { document, output } => render(document, output, &settings),
        Command::Play {
            document,
            speed,
            out_dir,
        } => {
            let speed = speed.map(PlaybackSpeed::from).unwrap_or(settings.default_speed);
            play(document, speed, out_dir, &settings)
        }
        Command::Order { document } => order(document, &settings),
        Command::Demo { output } => Document::demo().save(output),
    }
}

/// 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
fn init_logging(args: &Args, path_config: &PathConfig) -> Result<()> {
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt.clone().unwrap_or_else(|| path_config.log_file());
        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Console logging (respects RUST_LOG if set)
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

fn render(document: &Path, output: &Path, settings: &Settings) -> Result<()> {
    let doc = Document::load(document)?;
    let mut driver = RenderDriver::for_document(settings, &doc)?;
    let stats = driver.render_live(&doc.layers);
    info!(
        "Rendered {} elements ({} layers drawn, {} groups, {} fallbacks)",
        stats.elements_drawn, stats.layers_drawn, stats.groups_opened, stats.fallbacks
    );
    driver.save_png(output)?;
    println!("{}", output.display());
    Ok(())
}

/// Run a real playback session and write a frame for every cursor change
fn play(document: &Path, speed: PlaybackSpeed, out_dir: &Path, settings: &Settings) -> Result<()> {
    let doc = Document::load(document)?;
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create output directory: {}", out_dir.display()))?;

    let player = Player::new(settings, Arc::new(ThreadScheduler::new()));
    player.load(&doc.layers);
    let index = player.index();
    let mut driver = RenderDriver::for_document(settings, &doc)?;

    let updates = player.subscribe();
    player.play(speed);
    info!("Playing {} elements at {} speed", index.len(), speed.name());

    let mut started = false;
    let mut last_cursor = None;
    let mut frames = 0usize;
    for snapshot in updates.iter() {
        started |= snapshot.state == PlaybackState::Playing;
        if !started {
            continue;
        }
        if last_cursor != Some(snapshot.cursor) {
            driver.render_reveal(&doc.layers, &index.reveal_set(snapshot.cursor));
            let path = out_dir.join(format!("frame_{:05}.png", frames));
            driver.save_png(&path)?;
            frames += 1;
            last_cursor = Some(snapshot.cursor);
        }
        if snapshot.state == PlaybackState::Stopped {
            break;
        }
    }

    let diagnostics = player.diagnostics();
    if diagnostics.stale_ticks > 0 {
        debug!("Dropped {} stale ticks", diagnostics.stale_ticks);
    }
    if frames == 0 {
        warn!("No frames written");
    }
    println!("{} frames written to {}", frames, out_dir.display());
    Ok(())
}

fn order(document: &Path, settings: &Settings) -> Result<()> {
    let doc = Document::load(document)?;
    let index = TimedIndex::build_with_threshold(&doc.layers, settings.parallel_sort_threshold);

    for (position, entry) in index.entries().iter().enumerate() {
        let layer = &doc.layers[entry.layer_index];
        let kind = layer.find(entry.element_id).map_or("?", |e| e.kind_name());
        println!(
            "{:5}  {:>16}  {:<12} {:<8} {}",
            position,
            entry.created.as_micros(),
            layer.name,
            kind,
            entry.element_id
        );
    }
    Ok(())
}
