use anyhow::Result;
use std::io::{self, Write};
use std::str::FromStr;
use std::time::{Duration, Instant};

use posture_coach::config::Config;
use posture_coach::exercise::ExerciseMode;
use posture_coach::landmark::{Landmark, LandmarkFrame, LandmarkIndex};
use posture_coach::session::{CoachSession, SessionEvent};

const CONFIG_PATH: &str = "config.toml";

fn main() -> Result<()> {
    let config = Config::load_or_default(CONFIG_PATH);

    println!("=== Posture Coach - Session Console ===");
    println!(
        "frame_rate: {}fps  debounce: {}frames  speech cooldown: {}s",
        config.timing.frame_rate, config.timing.debounce_frames, config.timing.speech_cooldown_secs
    );
    println!();
    println!("コマンド:");
    println!("  calibrate     - 次の検出フレームを基準姿勢として取り込む");
    println!("  mode <m>      - 種目切替 (posture / press_up / bridging)");
    println!("  good [n]      - 良い姿勢フレームを n 枚流す (既定 1)");
    println!("  slouch [n]    - 頭が下がったフレームを n 枚流す");
    println!("  lean [n]      - 前傾フレームを n 枚流す");
    println!("  absent [n]    - 未検出フレームを n 枚流す");
    println!("  hold [n]      - 現在の種目のホールド姿勢を n 枚流す (press_up は常に不合格)");
    println!("  guide         - 現在の種目の手順を表示");
    println!("  status        - セッション状態を表示");
    println!("  quit          - 終了");
    println!();

    let mut session = CoachSession::from_config(&config);
    let frame_interval = Duration::from_millis(1000 / config.timing.frame_rate.max(1) as u64);
    // 読み上げクールダウンが実時間待ちにならないよう、時計はフレーム間隔で進める
    let mut clock = Instant::now();

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let parts: Vec<&str> = input.trim().split_whitespace().collect();

        if parts.is_empty() {
            continue;
        }

        match parts[0] {
            "calibrate" | "c" => {
                session.request_calibration();
                println!("次の検出フレームで基準姿勢を取り込みます");
            }
            "mode" | "m" if parts.len() == 2 => match ExerciseMode::from_str(parts[1]) {
                Ok(mode) => {
                    session.set_mode(mode);
                    println!("種目: {}", mode);
                }
                Err(e) => println!("{}", e),
            },
            "good" | "g" => {
                feed(&mut session, Some(&seated_good()), count(&parts), frame_interval, &mut clock);
            }
            "slouch" => {
                feed(&mut session, Some(&seated_slouched()), count(&parts), frame_interval, &mut clock);
            }
            "lean" => {
                feed(&mut session, Some(&seated_leaning()), count(&parts), frame_interval, &mut clock);
            }
            "absent" | "a" => {
                feed(&mut session, None, count(&parts), frame_interval, &mut clock);
            }
            "hold" | "h" => {
                let frame = match session.mode() {
                    ExerciseMode::Posture => seated_good(),
                    // 体勢の前提と持ち上げ判定は両立しないため、プレスアップの
                    // ホールドは進まずフォーム指摘だけが出る
                    ExerciseMode::PressUp => prone_flat(),
                    ExerciseMode::Bridging => bridge_up(),
                };
                feed(&mut session, Some(&frame), count(&parts), frame_interval, &mut clock);
            }
            "guide" => match session.mode().guide() {
                Some(guide) => {
                    println!("{}", guide.title);
                    println!("{}", guide.description);
                    for (i, step) in guide.steps.iter().enumerate() {
                        println!("  {}. {}", i + 1, step);
                    }
                    println!("ポイント:");
                    for tip in guide.tips {
                        println!("  - {}", tip);
                    }
                }
                None => println!("この種目に手順はありません"),
            },
            "status" | "s" => {
                println!("種目: {}", session.mode());
                println!(
                    "キャリブレーション: {}",
                    if session.is_calibrated() { "済" } else { "未" }
                );
                println!("レップ: {}/{}", session.rep_count(), config.exercise.rep_goal);
                println!("ホールド: {} フレーム", session.hold_frames());
            }
            "quit" | "q" => {
                println!("終了します");
                break;
            }
            _ => {
                println!("不明なコマンド: {}", parts[0]);
            }
        }
    }

    Ok(())
}

/// フレームを n 枚流し、イベントとフィードバックの変化だけを表示する。
fn feed(
    session: &mut CoachSession,
    frame: Option<&LandmarkFrame>,
    n: u32,
    frame_interval: Duration,
    clock: &mut Instant,
) {
    let mut last_feedback: Option<String> = None;
    for _ in 0..n {
        *clock += frame_interval;
        let report = session.process_frame(frame, *clock);

        for event in &report.events {
            match event {
                SessionEvent::Calibrated => println!("  [event] 基準姿勢を取り込みました"),
                SessionEvent::RepCompleted(reps) => println!("  [event] レップ成立: {}", reps),
                SessionEvent::Notify(text) => println!("  [notify] {}", text),
                SessionEvent::Speak(text) => println!("  [speak] {}", text),
            }
        }

        if last_feedback.as_deref() != Some(report.feedback.as_str()) {
            if !report.feedback.is_empty() {
                println!("  [{:?}] {}", report.status, report.feedback);
            }
            last_feedback = Some(report.feedback);
        }
    }
}

fn count(parts: &[&str]) -> u32 {
    parts
        .get(1)
        .and_then(|s| s.parse().ok())
        .filter(|&n| n > 0)
        .unwrap_or(1)
}

// ---------------------------------------------------------------------------
// 台本用のフレーム
// ---------------------------------------------------------------------------

fn make_frame(
    nose: (f32, f32),
    left_shoulder: (f32, f32),
    right_shoulder: (f32, f32),
    left_hip: (f32, f32),
    right_hip: (f32, f32),
) -> LandmarkFrame {
    let mut frame = LandmarkFrame::default();
    frame.landmarks[LandmarkIndex::Nose as usize] = Landmark::at(nose.0, nose.1);
    frame.landmarks[LandmarkIndex::LeftShoulder as usize] =
        Landmark::at(left_shoulder.0, left_shoulder.1);
    frame.landmarks[LandmarkIndex::RightShoulder as usize] =
        Landmark::at(right_shoulder.0, right_shoulder.1);
    frame.landmarks[LandmarkIndex::LeftHip as usize] = Landmark::at(left_hip.0, left_hip.1);
    frame.landmarks[LandmarkIndex::RightHip as usize] = Landmark::at(right_hip.0, right_hip.1);
    frame
}

/// 正面を向いて座った基準姿勢
fn seated_good() -> LandmarkFrame {
    make_frame(
        (0.50, 0.30),
        (0.42, 0.40),
        (0.58, 0.40),
        (0.44, 0.62),
        (0.56, 0.62),
    )
}

/// 頭が落ちた姿勢（頭の高さと首の縮みが反応する）
fn seated_slouched() -> LandmarkFrame {
    let mut frame = seated_good();
    frame.landmarks[LandmarkIndex::Nose as usize].y += 0.05;
    frame
}

/// 肩が前に出た前傾姿勢
fn seated_leaning() -> LandmarkFrame {
    let mut frame = seated_good();
    frame.landmarks[LandmarkIndex::LeftShoulder as usize].x += 0.06;
    frame.landmarks[LandmarkIndex::RightShoulder as usize].x += 0.06;
    frame
}

/// うつ伏せで床に伏せた姿勢（プレスアップの開始姿勢）
fn prone_flat() -> LandmarkFrame {
    let mut frame = make_frame(
        (0.62, 0.71),
        (0.52, 0.72),
        (0.56, 0.72),
        (0.28, 0.70),
        (0.32, 0.70),
    );
    frame.landmarks[LandmarkIndex::RightElbow as usize] = Landmark::at(0.66, 0.725);
    frame
}

/// 腰を持ち上げたブリッジ姿勢（合格フレーム）
fn bridge_up() -> LandmarkFrame {
    make_frame(
        (0.24, 0.72),
        (0.30, 0.70),
        (0.34, 0.70),
        (0.48, 0.55),
        (0.52, 0.55),
    )
}
