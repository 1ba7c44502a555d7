//! Coach server: receives pose landmark frames over TCP, evaluates posture and
//! exercise form against the session state, and streams per-frame reports back.

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use posture_coach::config::Config;
use posture_coach::exercise::ExerciseMode;
use posture_coach::landmark::LandmarkFrame;
use posture_coach::protocol::{self, ClientMessage, ServerMessage};
use posture_coach::recording::{RecordedFrame, RecordingWriter};
use posture_coach::session::{CoachSession, FrameReport, PostureStatus, SessionEvent};

const CONFIG_PATH: &str = "config.toml";

// ===========================================================================
// Logging
// ===========================================================================

type LogFile = Arc<Mutex<std::io::BufWriter<std::fs::File>>>;

fn open_log_file() -> Result<LogFile> {
    std::fs::create_dir_all("logs")?;
    let ts = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let path = format!("logs/coach_{}.log", ts);
    let file = std::fs::File::create(&path)?;
    eprintln!("Log: {}", path);
    Ok(Arc::new(Mutex::new(std::io::BufWriter::new(file))))
}

macro_rules! log {
    ($logfile:expr, $($arg:tt)*) => {{
        let msg = format!($($arg)*);
        eprintln!("{}", msg);
        if let Ok(mut f) = $logfile.lock() {
            let _ = writeln!(f, "{}", msg);
            let _ = f.flush();
        }
    }};
}

// ===========================================================================
// TCP types + receive loop
// ===========================================================================

enum NetEvent {
    Frame {
        timestamp_ms: u64,
        frame: LandmarkFrame,
    },
    NoDetection {
        timestamp_ms: u64,
    },
    Calibrate,
    SetMode(ExerciseMode),
}

async fn tcp_receive_loop(
    stream: tokio::net::TcpStream,
    tx: mpsc::SyncSender<NetEvent>,
    mut out_rx: tokio::sync::mpsc::Receiver<ServerMessage>,
    frame_drop_count: Arc<AtomicU32>,
) -> Result<()> {
    use futures::StreamExt as _;

    let framed = protocol::message_stream(stream);
    let (mut sink, mut reader) = framed.split();

    loop {
        tokio::select! {
            result = reader.next() => {
                let bytes = match result {
                    Some(Ok(b)) => b,
                    Some(Err(e)) => return Err(e.into()),
                    None => return Err(anyhow::anyhow!("connection closed")),
                };
                let msg: ClientMessage = bincode::deserialize(&bytes)?;
                match msg {
                    ClientMessage::Frame { timestamp_ms, landmarks } => {
                        // 33ランドマーク未満はクライアント側の契約違反なので接続ごと落とす
                        let frame = LandmarkFrame::from_slice(&landmarks)?;
                        if tx.try_send(NetEvent::Frame { timestamp_ms, frame }).is_err() {
                            frame_drop_count.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    ClientMessage::NoDetection { timestamp_ms } => {
                        if tx.try_send(NetEvent::NoDetection { timestamp_ms }).is_err() {
                            frame_drop_count.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    ClientMessage::Calibrate => {
                        let _ = tx.send(NetEvent::Calibrate);
                    }
                    ClientMessage::SetMode(mode) => {
                        let _ = tx.send(NetEvent::SetMode(mode));
                    }
                    ClientMessage::GetGuide(mode) => {
                        // Pure lookup, answered without touching session state
                        let reply = match mode.guide() {
                            Some(guide) => ServerMessage::Guide {
                                title: guide.title.to_string(),
                                description: guide.description.to_string(),
                                steps: guide.steps.iter().map(|s| s.to_string()).collect(),
                                tips: guide.tips.iter().map(|s| s.to_string()).collect(),
                            },
                            None => ServerMessage::NoGuide,
                        };
                        protocol::send_to_sink(&mut sink, &reply).await?;
                    }
                    ClientMessage::Bye => return Ok(()),
                }
            }
            Some(out_msg) = out_rx.recv() => {
                protocol::send_to_sink(&mut sink, &out_msg).await?;
            }
        }
    }
}

// ===========================================================================
// Session loop (sync, blocking)
// ===========================================================================

fn record(
    recorder: &mut Option<RecordingWriter>,
    logfile: &LogFile,
    timestamp_ms: u64,
    frame: Option<&LandmarkFrame>,
) {
    if let Some(mut rec) = recorder.take() {
        let recorded = RecordedFrame {
            timestamp_ms,
            landmarks: frame.map(|f| f.landmarks.to_vec()),
        };
        match rec.write_frame(&recorded) {
            Ok(()) => *recorder = Some(rec),
            Err(e) => log!(logfile, "Recording write failed, stopping: {:#}", e),
        }
    }
}

fn publish_report(
    timestamp_ms: u64,
    report: FrameReport,
    out_tx: &tokio::sync::mpsc::Sender<ServerMessage>,
    logfile: &LogFile,
) {
    for event in &report.events {
        match event {
            SessionEvent::Calibrated => log!(logfile, "Calibrated"),
            SessionEvent::RepCompleted(reps) => log!(logfile, "Rep {} completed", reps),
            SessionEvent::Notify(text) => log!(logfile, "[notify] {}", text),
            SessionEvent::Speak(text) => log!(logfile, "[speak] {}", text),
        }
    }
    let msg = ServerMessage::Report {
        timestamp_ms,
        status: report.status,
        stroke_color: report.status.stroke_color().map(|c| c.to_string()),
        feedback: report.feedback,
        rep_count: report.rep_count,
        events: report.events,
    };
    let _ = out_tx.blocking_send(msg);
}

fn run_session_loop(
    rx: &mpsc::Receiver<NetEvent>,
    config: &Config,
    logfile: &LogFile,
    out_tx: &tokio::sync::mpsc::Sender<ServerMessage>,
    trigger_calibration: &AtomicBool,
    trigger_mode_cycle: &AtomicBool,
    stats_enabled: &AtomicBool,
    frame_drop_count: &AtomicU32,
) {
    let mut session = CoachSession::from_config(config);

    let mut recorder = if config.server.record {
        match RecordingWriter::create(&config.server.recording_dir) {
            Ok(rec) => {
                log!(logfile, "Recording to {}", rec.path().display());
                Some(rec)
            }
            Err(e) => {
                log!(logfile, "Recording disabled: {:#}", e);
                None
            }
        }
    } else {
        None
    };

    // 1秒ごとの統計
    let mut stat_frames: u32 = 0;
    let mut stat_detected: u32 = 0;
    let mut stat_bad: u32 = 0;
    let mut stats_timer = Instant::now();

    loop {
        if trigger_calibration.swap(false, Ordering::Relaxed) {
            session.request_calibration();
            log!(logfile, "Calibration armed (console)");
        }

        if trigger_mode_cycle.swap(false, Ordering::Relaxed) {
            let mode = match session.mode() {
                ExerciseMode::Posture => ExerciseMode::PressUp,
                ExerciseMode::PressUp => ExerciseMode::Bridging,
                ExerciseMode::Bridging => ExerciseMode::Posture,
            };
            session.set_mode(mode);
            log!(logfile, "Mode: {} (console)", mode);
            let _ = out_tx.blocking_send(ServerMessage::ModeChanged(mode));
        }

        let event = match rx.recv_timeout(Duration::from_millis(1)) {
            Ok(ev) => Some(ev),
            Err(mpsc::RecvTimeoutError::Timeout) => None,
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                log!(logfile, "TCP channel disconnected");
                break;
            }
        };

        if let Some(ev) = event {
            match ev {
                NetEvent::Frame {
                    timestamp_ms,
                    frame,
                } => {
                    record(&mut recorder, logfile, timestamp_ms, Some(&frame));
                    let report = session.process_frame(Some(&frame), Instant::now());
                    if report.status == PostureStatus::NeedsWork {
                        stat_bad += 1;
                    }
                    publish_report(timestamp_ms, report, out_tx, logfile);
                    stat_frames += 1;
                    stat_detected += 1;
                }
                NetEvent::NoDetection { timestamp_ms } => {
                    record(&mut recorder, logfile, timestamp_ms, None);
                    let report = session.process_frame(None, Instant::now());
                    publish_report(timestamp_ms, report, out_tx, logfile);
                    stat_frames += 1;
                }
                NetEvent::Calibrate => {
                    session.request_calibration();
                    log!(logfile, "Calibration armed (client)");
                }
                NetEvent::SetMode(mode) => {
                    session.set_mode(mode);
                    log!(logfile, "Mode: {}", mode);
                    let _ = out_tx.blocking_send(ServerMessage::ModeChanged(mode));
                }
            }
        }

        let elapsed = stats_timer.elapsed().as_secs_f32();
        if elapsed >= 1.0 {
            if stats_enabled.load(Ordering::Relaxed) && stat_frames > 0 {
                let drops = frame_drop_count.swap(0, Ordering::Relaxed);
                log!(
                    logfile,
                    "FPS: {:.1} (detected: {} drop: {}) bad: {} mode: {} reps: {} hold: {}",
                    stat_frames as f32 / elapsed,
                    stat_detected,
                    drops,
                    stat_bad,
                    session.mode(),
                    session.rep_count(),
                    session.hold_frames(),
                );
            }
            stat_frames = 0;
            stat_detected = 0;
            stat_bad = 0;
            stats_timer = Instant::now();
        }
    }

    if let Some(mut rec) = recorder {
        let _ = rec.flush();
        log!(logfile, "Recording closed: {} frames", rec.frames());
    }
}

// ===========================================================================
// Main
// ===========================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load_or_default(CONFIG_PATH);
    let logfile = open_log_file()?;

    log!(logfile, "Coach Server ({})", env!("GIT_VERSION"));
    log!(logfile, "Listen: {}", config.server.listen_addr);
    log!(
        logfile,
        "Timing: {}fps debounce={}frames cooldown={}s",
        config.timing.frame_rate,
        config.timing.debounce_frames,
        config.timing.speech_cooldown_secs
    );
    if config.server.record {
        log!(logfile, "Recording dir: {}", config.server.recording_dir);
    }
    log!(logfile, "Console: 'c' arm calibration, 'm' cycle mode, 's' toggle stats");

    // Console input, one command per line
    let trigger_calibration = Arc::new(AtomicBool::new(false));
    let trigger_mode_cycle = Arc::new(AtomicBool::new(false));
    let stats_enabled = Arc::new(AtomicBool::new(true));
    {
        let cal_flag = Arc::clone(&trigger_calibration);
        let mode_flag = Arc::clone(&trigger_mode_cycle);
        let stats_flag = Arc::clone(&stats_enabled);
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            let mut line = String::new();
            loop {
                line.clear();
                if stdin.read_line(&mut line).is_ok() {
                    match line.trim() {
                        "c" => {
                            eprintln!("[input] calibration armed");
                            cal_flag.store(true, Ordering::Relaxed);
                        }
                        "m" => {
                            eprintln!("[input] mode cycle");
                            mode_flag.store(true, Ordering::Relaxed);
                        }
                        "s" => {
                            let enabled = !stats_flag.fetch_xor(true, Ordering::Relaxed);
                            eprintln!("[input] stats {}", if enabled { "on" } else { "off" });
                        }
                        _ => {}
                    }
                }
            }
        });
    }

    let bind_addr: std::net::SocketAddr = config
        .server
        .listen_addr
        .parse()
        .context("invalid listen_addr")?;
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    log!(logfile, "Listening on {}", bind_addr);
    log!(logfile, "");

    loop {
        let (tcp_stream, addr) = listener.accept().await?;
        tcp_stream.set_nodelay(true)?;
        log!(logfile, "Client connected: {}", addr);

        let (tx, rx) = mpsc::sync_channel::<NetEvent>(16);
        let (out_tx, out_rx) = tokio::sync::mpsc::channel::<ServerMessage>(4);
        let frame_drop_count = Arc::new(AtomicU32::new(0));
        let frame_drop_count2 = Arc::clone(&frame_drop_count);

        let tcp_task = tokio::spawn(async move {
            if let Err(e) = tcp_receive_loop(tcp_stream, tx, out_rx, frame_drop_count2).await {
                eprintln!("TCP error: {:#}", e);
            }
        });

        tokio::task::block_in_place(|| {
            run_session_loop(
                &rx,
                &config,
                &logfile,
                &out_tx,
                &trigger_calibration,
                &trigger_mode_cycle,
                &stats_enabled,
                &frame_drop_count,
            );
        });

        tcp_task.abort();
        log!(logfile, "Client disconnected, waiting for next connection...");
    }
}
