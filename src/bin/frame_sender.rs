//! Frame sender: drives the coach server with a scripted landmark sequence,
//! paced like a live pose estimator, and prints what the server sends back.

use anyhow::Result;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures::StreamExt as _;

use posture_coach::config::Config;
use posture_coach::exercise::ExerciseMode;
use posture_coach::landmark::{Landmark, LandmarkFrame, LandmarkIndex};
use posture_coach::protocol::{self, ClientMessage, MessageStream, ServerMessage};
use posture_coach::session::SessionEvent;

const CONFIG_PATH: &str = "config.toml";

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

type FrameSink = futures::stream::SplitSink<MessageStream, bytes::Bytes>;

async fn send_frames(
    sink: &mut FrameSink,
    frame: Option<&LandmarkFrame>,
    count: u32,
    ticker: &mut tokio::time::Interval,
) -> Result<()> {
    for _ in 0..count {
        ticker.tick().await;
        let msg = match frame {
            Some(frame) => ClientMessage::Frame {
                timestamp_ms: now_ms(),
                landmarks: frame.landmarks.to_vec(),
            },
            None => ClientMessage::NoDetection {
                timestamp_ms: now_ms(),
            },
        };
        protocol::send_to_sink(sink, &msg).await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load_or_default(CONFIG_PATH);
    let addr = config.server.listen_addr.clone();

    println!("Frame Sender ({})", env!("GIT_VERSION"));
    println!("Server: {}", addr);
    println!("Frame rate: {}fps", config.timing.frame_rate);
    println!();

    let stream = tokio::net::TcpStream::connect(&addr).await?;
    stream.set_nodelay(true)?;
    let mut framed = protocol::message_stream(stream);

    // Guide fetch is a plain request/reply, done before the stream is split
    println!(">> guide bridging");
    protocol::send_message(&mut framed, &ClientMessage::GetGuide(ExerciseMode::Bridging)).await?;
    match protocol::recv_message::<ServerMessage>(&mut framed).await? {
        ServerMessage::Guide {
            title,
            description,
            steps,
            tips,
        } => print_guide(&title, &description, &steps, &tips),
        ServerMessage::NoGuide => println!("<< no guide for this mode"),
        other => eprintln!("unexpected reply: {:?}", other),
    }

    let (mut sink, mut reader) = framed.split();

    // Reader task: print server reports, collapsing repeated feedback
    let reader_task = tokio::spawn(async move {
        let mut last_feedback = String::new();
        loop {
            match reader.next().await {
                Some(Ok(bytes)) => match bincode::deserialize::<ServerMessage>(&bytes) {
                    Ok(ServerMessage::Report {
                        status,
                        feedback,
                        rep_count,
                        events,
                        ..
                    }) => {
                        for event in &events {
                            match event {
                                SessionEvent::Calibrated => println!("<< calibrated"),
                                SessionEvent::RepCompleted(reps) => println!("<< rep {}", reps),
                                SessionEvent::Notify(text) => println!("<< notify: {}", text),
                                SessionEvent::Speak(text) => println!("<< speak: {}", text),
                            }
                        }
                        if feedback != last_feedback {
                            if !feedback.is_empty() {
                                println!("<< [{:?}] {} (reps: {})", status, feedback, rep_count);
                            }
                            last_feedback = feedback;
                        }
                    }
                    Ok(ServerMessage::Guide {
                        title,
                        description,
                        steps,
                        tips,
                    }) => print_guide(&title, &description, &steps, &tips),
                    Ok(ServerMessage::NoGuide) => println!("<< no guide for this mode"),
                    Ok(ServerMessage::ModeChanged(mode)) => println!("<< mode changed: {}", mode),
                    Err(e) => eprintln!("deserialize error: {}", e),
                },
                Some(Err(e)) => {
                    eprintln!("reader error: {}", e);
                    break;
                }
                None => break,
            }
        }
    });

    let frame_interval = Duration::from_millis(1000 / config.timing.frame_rate.max(1) as u64);
    let mut ticker = tokio::time::interval(frame_interval);

    println!(">> calibrate");
    protocol::send_to_sink(&mut sink, &ClientMessage::Calibrate).await?;

    let seated_phases: Vec<(&str, Option<LandmarkFrame>, u32)> = vec![
        ("good posture", Some(seated_good()), 90),
        ("slouched", Some(seated_slouched()), 75),
        ("good posture", Some(seated_good()), 30),
        ("no detection", None, 30),
        ("leaning forward", Some(seated_leaning()), 75),
    ];
    for (label, frame, count) in &seated_phases {
        println!(">> {} x{}", label, count);
        send_frames(&mut sink, frame.as_ref(), *count, &mut ticker).await?;
    }

    println!(">> mode bridging");
    protocol::send_to_sink(&mut sink, &ClientMessage::SetMode(ExerciseMode::Bridging)).await?;

    let bridge_phases: Vec<(&str, Option<LandmarkFrame>, u32)> = vec![
        ("bridge too low", Some(bridge_low()), 30),
        ("bridge hold", Some(bridge_up()), 185),
    ];
    for (label, frame, count) in &bridge_phases {
        println!(">> {} x{}", label, count);
        send_frames(&mut sink, frame.as_ref(), *count, &mut ticker).await?;
    }

    println!(">> bye");
    protocol::send_to_sink(&mut sink, &ClientMessage::Bye).await?;

    // Let the tail of the report stream arrive before closing
    tokio::time::sleep(Duration::from_millis(300)).await;
    reader_task.abort();
    println!("Done");
    Ok(())
}

fn print_guide(title: &str, description: &str, steps: &[String], tips: &[String]) {
    println!("<< guide: {}", title);
    println!("   {}", description);
    for (i, step) in steps.iter().enumerate() {
        println!("   {}. {}", i + 1, step);
    }
    for tip in tips {
        println!("   - {}", tip);
    }
}

// ---------------------------------------------------------------------------
// Scripted frames
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

fn seated_good() -> LandmarkFrame {
    make_frame(
        (0.50, 0.30),
        (0.42, 0.40),
        (0.58, 0.40),
        (0.44, 0.62),
        (0.56, 0.62),
    )
}

fn seated_slouched() -> LandmarkFrame {
    let mut frame = seated_good();
    frame.landmarks[LandmarkIndex::Nose as usize].y += 0.05;
    frame
}

fn seated_leaning() -> LandmarkFrame {
    let mut frame = seated_good();
    frame.landmarks[LandmarkIndex::LeftShoulder as usize].x += 0.06;
    frame.landmarks[LandmarkIndex::RightShoulder as usize].x += 0.06;
    frame
}

fn bridge_up() -> LandmarkFrame {
    make_frame(
        (0.24, 0.72),
        (0.30, 0.70),
        (0.34, 0.70),
        (0.48, 0.55),
        (0.52, 0.55),
    )
}

fn bridge_low() -> LandmarkFrame {
    let mut frame = bridge_up();
    frame.landmarks[LandmarkIndex::LeftHip as usize].y = 0.65;
    frame.landmarks[LandmarkIndex::RightHip as usize].y = 0.65;
    frame
}
