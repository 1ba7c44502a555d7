//! TCP protocol for landmark-producer ↔ coach-server communication.
//!
//! Messages are bincode bodies inside length-delimited frames.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::exercise::ExerciseMode;
use crate::landmark::Landmark;
use crate::session::{PostureStatus, SessionEvent};

// --- Message types ---

/// Producer → server
#[derive(Serialize, Deserialize, Debug)]
pub enum ClientMessage {
    /// One detected frame: 33 landmarks in MediaPipe Pose order.
    Frame {
        timestamp_ms: u64,
        landmarks: Vec<Landmark>,
    },
    /// The estimator found no pose in this video frame.
    NoDetection { timestamp_ms: u64 },
    /// Snapshot the next detected frame as the posture reference.
    Calibrate,
    SetMode(ExerciseMode),
    GetGuide(ExerciseMode),
    Bye,
}

/// Server → producer
#[derive(Serialize, Deserialize, Debug)]
pub enum ServerMessage {
    /// Per-frame evaluation result.
    Report {
        timestamp_ms: u64,
        status: PostureStatus,
        /// Skeleton overlay stroke color; None when no pose was detected.
        stroke_color: Option<String>,
        feedback: String,
        rep_count: u32,
        events: Vec<SessionEvent>,
    },
    Guide {
        title: String,
        description: String,
        steps: Vec<String>,
        tips: Vec<String>,
    },
    /// Requested mode has no guide text (plain posture monitoring).
    NoGuide,
    ModeChanged(ExerciseMode),
}

// --- TCP codec helpers ---

pub type MessageStream = Framed<TcpStream, LengthDelimitedCodec>;

/// Create a framed message stream with length-delimited framing.
pub fn message_stream(stream: TcpStream) -> MessageStream {
    let codec = LengthDelimitedCodec::builder()
        .max_frame_length(16 * 1024 * 1024) // 16MB
        .new_codec();
    Framed::new(stream, codec)
}

/// Send a serializable message (bincode + length prefix).
pub async fn send_message<T: Serialize>(
    stream: &mut MessageStream,
    msg: &T,
) -> anyhow::Result<()> {
    let data = bincode::serialize(msg)?;
    stream.send(Bytes::from(data)).await?;
    Ok(())
}

/// Send on a split sink (used when the stream is split for select loops).
pub async fn send_to_sink<T: Serialize>(
    sink: &mut futures::stream::SplitSink<MessageStream, Bytes>,
    msg: &T,
) -> anyhow::Result<()> {
    let data = bincode::serialize(msg)?;
    sink.send(Bytes::from(data)).await?;
    Ok(())
}

/// Receive and deserialize a message.
pub async fn recv_message<T: DeserializeOwned>(
    stream: &mut MessageStream,
) -> anyhow::Result<T> {
    match stream.next().await {
        Some(Ok(bytes)) => Ok(bincode::deserialize(&bytes)?),
        Some(Err(e)) => Err(e.into()),
        None => Err(anyhow::anyhow!("connection closed")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmark::LandmarkIndex;

    #[test]
    fn test_client_frame_round_trip() {
        let landmarks = vec![Landmark::new(0.5, 0.4, -0.1, 0.9); LandmarkIndex::COUNT];
        let msg = ClientMessage::Frame {
            timestamp_ms: 1234,
            landmarks,
        };

        let bytes = bincode::serialize(&msg).unwrap();
        match bincode::deserialize::<ClientMessage>(&bytes).unwrap() {
            ClientMessage::Frame {
                timestamp_ms,
                landmarks,
            } => {
                assert_eq!(timestamp_ms, 1234);
                assert_eq!(landmarks.len(), LandmarkIndex::COUNT);
                assert_eq!(landmarks[0].visibility, 0.9);
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn test_server_report_round_trip() {
        let msg = ServerMessage::Report {
            timestamp_ms: 99,
            status: PostureStatus::NeedsWork,
            stroke_color: Some("#FF0000".to_string()),
            feedback: "Lift your head slightly".to_string(),
            rep_count: 3,
            events: vec![SessionEvent::Notify("Correct your posture!".to_string())],
        };

        let bytes = bincode::serialize(&msg).unwrap();
        match bincode::deserialize::<ServerMessage>(&bytes).unwrap() {
            ServerMessage::Report {
                status,
                stroke_color,
                feedback,
                events,
                ..
            } => {
                assert_eq!(status, PostureStatus::NeedsWork);
                assert_eq!(stroke_color.as_deref(), Some("#FF0000"));
                assert_eq!(feedback, "Lift your head slightly");
                assert_eq!(events.len(), 1);
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_recv_over_loopback() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut stream = message_stream(stream);
            match recv_message::<ClientMessage>(&mut stream).await.unwrap() {
                ClientMessage::GetGuide(mode) => {
                    send_message(&mut stream, &ServerMessage::ModeChanged(mode))
                        .await
                        .unwrap();
                }
                other => panic!("wrong variant: {:?}", other),
            }
        });

        let stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let mut stream = message_stream(stream);
        send_message(&mut stream, &ClientMessage::GetGuide(ExerciseMode::Bridging))
            .await
            .unwrap();
        match recv_message::<ServerMessage>(&mut stream).await.unwrap() {
            ServerMessage::ModeChanged(mode) => assert_eq!(mode, ExerciseMode::Bridging),
            other => panic!("wrong variant: {:?}", other),
        }
        server.await.unwrap();
    }
}
