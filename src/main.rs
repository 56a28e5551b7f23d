use pushstation::midi::device::MidiDeviceManager;
use pushstation::{ClipState, Workstation, WorkstationConfig};
use std::io::{self, BufRead, Write};

const DEFAULT_CONFIG_PATH: &str = "workstation.json";

fn print_help() {
    println!("Commands:");
    println!("  start | stop             transport");
    println!("  tempo <bpm>              20..300");
    println!("  res <1|2|4|8>            steps per beat");
    println!("  step <pad> <step>        toggle a grid cell");
    println!("  clip <scene> <track>     press a session pad");
    println!("  relaunch <scene> <track> restart a clip at the next measure");
    println!("  delete <scene> <track>   clear a clip");
    println!("  quantize <scene> <track> snap a clip to the grid");
    println!("  status                   current step and clip states");
    println!("  q                        quit");
}

fn parse_pair(args: &[&str]) -> Option<(usize, usize)> {
    match args {
        [a, b] => Some((a.parse().ok()?, b.parse().ok()?)),
        _ => None,
    }
}

fn print_status(ws: &Workstation) {
    let seq = ws.sequencer_snapshot();
    println!(
        "{} | {} | step {:?} | pad {}",
        ws.tempo(),
        seq.resolution,
        seq.current_step,
        seq.selected_pad
    );
    for clip in ws
        .clip_snapshots()
        .iter()
        .filter(|c| c.has_events || c.state != ClipState::Empty)
    {
        println!(
            "  clip {}/{}: {:?} {}/{}{}",
            clip.slot.scene,
            clip.slot.track,
            clip.state,
            clip.playhead_step,
            clip.length,
            if clip.stop_after_end { " (stopping)" } else { "" }
        );
    }
}

/// Returns false when the runner should exit
fn run_command(ws: &Workstation, line: &str) -> bool {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((command, args)) = words.split_first() else {
        return true;
    };

    match *command {
        "q" | "quit" => return false,
        "help" => print_help(),
        "start" => {
            if let Err(e) = ws.start() {
                eprintln!("ERROR: {}", e);
            }
        }
        "stop" => ws.stop(),
        "tempo" => match args.first().and_then(|v| v.parse::<f64>().ok()) {
            Some(bpm) => println!("{}", ws.set_tempo(bpm)),
            None => println!("usage: tempo <bpm>"),
        },
        "res" => match args.first().and_then(|v| v.parse::<u8>().ok()) {
            Some(steps) if ws.set_resolution(steps) => println!("Resolution {}", ws.resolution()),
            _ => println!("usage: res <1|2|4|8>"),
        },
        "step" => match parse_pair(args).and_then(|(pad, step)| ws.toggle_step(pad, step)) {
            Some(on) => println!("{}", if on { "on" } else { "off" }),
            None => println!("usage: step <pad 0-15> <step 0-31>"),
        },
        "clip" | "relaunch" | "delete" | "quantize" => {
            let Some((scene, track)) = parse_pair(args) else {
                println!("usage: {} <scene 0-7> <track 0-7>", command);
                return true;
            };
            let result = match *command {
                "clip" => ws.press_pad(scene, track).map(|state| format!("{:?}", state)),
                "relaunch" => ws.relaunch_clip(scene, track).map(|state| format!("{:?}", state)),
                "delete" => ws.delete_clip(scene, track).map(|_| "deleted".to_string()),
                _ => ws
                    .quantize_clip(scene, track)
                    .map(|done| {
                        let message = if done { "quantized" } else { "nothing to quantize" };
                        message.to_string()
                    }),
            };
            match result {
                Ok(message) => println!("{}", message),
                Err(e) => eprintln!("ERROR: {}", e),
            }
        }
        "status" => print_status(ws),
        other => println!("Unknown command '{}', try 'help'", other),
    }
    true
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("=== Pushstation ===");
    println!("Version {}\n", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = WorkstationConfig::load_or_default(&config_path);

    let ports = MidiDeviceManager::new().scan();
    for port in &ports.inputs {
        log::info!("MIDI IN  {}", port.name);
    }
    for port in &ports.outputs {
        log::info!("MIDI OUT {}", port.name);
    }

    let ws = Workstation::from_config(&config);
    if let Err(e) = ws.connect_input(config.recording_input.as_deref()) {
        log::warn!("Recording input unavailable: {}", e);
    }

    if let Err(e) = ws.start() {
        eprintln!("ERROR: {}", e);
        return;
    }

    print_help();
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        if !run_command(&ws, &line) {
            break;
        }
        let _ = io::stdout().flush();
    }

    ws.stop();
    println!("Bye.");
}
