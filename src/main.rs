use judgeline::config;
use judgeline::game::chart::frame_times;
use judgeline::game::note::NoteState;
use judgeline::game::parsing::load_chart;
use log::{info, warn};
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install logger immediately, then set runtime max level from config after loading it.
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Trace)
        .try_init();
    // Startup default when config is missing or malformed.
    log::set_max_level(log::LevelFilter::Warn);

    let mut args = std::env::args().skip(1);
    let Some(chart_path) = args.next().map(PathBuf::from) else {
        eprintln!("usage: judgeline <chart.json> [config.ini]");
        std::process::exit(2);
    };
    config::load(args.next().unwrap_or_else(|| config::CONFIG_PATH.to_string()));
    let cfg = config::get();
    log::set_max_level(cfg.log_level.as_level_filter());

    let mut chart = load_chart(&chart_path, cfg.dummy_notes)?;
    let playfield = cfg.playfield();
    let mut frames = chart.frame_cache();

    let end = chart.end_time_ms() + 1000.0;
    let start = chart.host_time(0.0).min(0.0);
    let mut frames_run = 0u64;
    let mut edges = 0usize;
    let mut late = 0usize;
    for host_time in frame_times(start, end, cfg.frame_step_ms) {
        let report = chart.update(host_time, &mut frames, &playfield);
        edges += report.edges.len();
        late += report.edges.iter().filter(|e| !e.fresh).count();
        frames_run += 1;
    }

    let mut missed = 0usize;
    for (id, note) in chart.notes() {
        let Some(line) = chart.line(id.line) else { continue };
        if note.state(line, end) == NoteState::Missed {
            missed += 1;
        }
    }
    if late > 0 {
        warn!("{late} crossings landed more than a few units late; consider a smaller FrameStepMs.");
    }

    let siblings = chart.notes().filter(|(_, n)| n.has_sibling()).count();
    info!(
        "Simulated {frames_run} frames to {end:.0}ms: {} lines, {} notes, {edges} crossings, {siblings} siblings, {missed} missed, {} timeline lookups.",
        chart.lines().len(),
        chart.note_count(),
        frames.total_lookups()
    );
    Ok(())
}
