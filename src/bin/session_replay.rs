//! Replay a recorded session (JSONL) through the evaluation core offline.
//!
//! The clock is driven by the recorded timestamps, so debounce and speech
//! cooldown behave exactly as they did live, regardless of replay speed.

use anyhow::{bail, Result};
use std::time::{Duration, Instant};

use posture_coach::config::Config;
use posture_coach::landmark::LandmarkFrame;
use posture_coach::recording::read_recording;
use posture_coach::session::{CoachSession, SessionEvent};

const CONFIG_PATH: &str = "config.toml";

fn main() -> Result<()> {
    let path = match std::env::args().nth(1) {
        Some(p) => p,
        None => bail!("usage: session_replay <recording.jsonl>"),
    };

    let config = Config::load_or_default(CONFIG_PATH);
    let frames = read_recording(&path)?;
    if frames.is_empty() {
        bail!("recording is empty: {}", path);
    }

    println!("Replaying {} ({} frames)", path, frames.len());
    println!("Calibration: first detected frame");
    println!();

    let mut session = CoachSession::from_config(&config);
    session.request_calibration();

    let base_ts = frames[0].timestamp_ms;
    let start = Instant::now();
    let mut last_feedback = String::new();
    let mut detections: u32 = 0;
    let mut notifications: u32 = 0;
    let mut speeches: u32 = 0;

    for recorded in &frames {
        let offset_ms = recorded.timestamp_ms.saturating_sub(base_ts);
        let now = start + Duration::from_millis(offset_ms);
        let frame = match &recorded.landmarks {
            Some(landmarks) => Some(LandmarkFrame::from_slice(landmarks)?),
            None => None,
        };
        if frame.is_some() {
            detections += 1;
        }

        let report = session.process_frame(frame.as_ref(), now);

        let t = offset_ms as f64 / 1000.0;
        for event in &report.events {
            match event {
                SessionEvent::Calibrated => println!("[{:7.2}s] calibrated", t),
                SessionEvent::RepCompleted(reps) => println!("[{:7.2}s] rep {}", t, reps),
                SessionEvent::Notify(text) => {
                    notifications += 1;
                    println!("[{:7.2}s] notify: {}", t, text);
                }
                SessionEvent::Speak(text) => {
                    speeches += 1;
                    println!("[{:7.2}s] speak: {}", t, text);
                }
            }
        }
        if report.feedback != last_feedback {
            if !report.feedback.is_empty() {
                println!("[{:7.2}s] {}", t, report.feedback);
            }
            last_feedback = report.feedback;
        }
    }

    println!();
    println!("Frames: {} (detected: {})", frames.len(), detections);
    println!(
        "Reps: {}  Notifications: {}  Speeches: {}",
        session.rep_count(),
        notifications,
        speeches
    );

    Ok(())
}
