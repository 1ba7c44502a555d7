use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// MediaPipe Pose の 33 ランドマークインデックス
///
/// 並び順は姿勢推定側の規約で固定されており、本リポジトリ側で選べない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum LandmarkIndex {
    Nose = 0,
    LeftEyeInner = 1,
    LeftEye = 2,
    LeftEyeOuter = 3,
    RightEyeInner = 4,
    RightEye = 5,
    RightEyeOuter = 6,
    LeftEar = 7,
    RightEar = 8,
    MouthLeft = 9,
    MouthRight = 10,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftPinky = 17,
    RightPinky = 18,
    LeftIndex = 19,
    RightIndex = 20,
    LeftThumb = 21,
    RightThumb = 22,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
    LeftHeel = 29,
    RightHeel = 30,
    LeftFootIndex = 31,
    RightFootIndex = 32,
}

impl LandmarkIndex {
    pub const COUNT: usize = 33;

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Nose),
            1 => Some(Self::LeftEyeInner),
            2 => Some(Self::LeftEye),
            3 => Some(Self::LeftEyeOuter),
            4 => Some(Self::RightEyeInner),
            5 => Some(Self::RightEye),
            6 => Some(Self::RightEyeOuter),
            7 => Some(Self::LeftEar),
            8 => Some(Self::RightEar),
            9 => Some(Self::MouthLeft),
            10 => Some(Self::MouthRight),
            11 => Some(Self::LeftShoulder),
            12 => Some(Self::RightShoulder),
            13 => Some(Self::LeftElbow),
            14 => Some(Self::RightElbow),
            15 => Some(Self::LeftWrist),
            16 => Some(Self::RightWrist),
            17 => Some(Self::LeftPinky),
            18 => Some(Self::RightPinky),
            19 => Some(Self::LeftIndex),
            20 => Some(Self::RightIndex),
            21 => Some(Self::LeftThumb),
            22 => Some(Self::RightThumb),
            23 => Some(Self::LeftHip),
            24 => Some(Self::RightHip),
            25 => Some(Self::LeftKnee),
            26 => Some(Self::RightKnee),
            27 => Some(Self::LeftAnkle),
            28 => Some(Self::RightAnkle),
            29 => Some(Self::LeftHeel),
            30 => Some(Self::RightHeel),
            31 => Some(Self::LeftFootIndex),
            32 => Some(Self::RightFootIndex),
            _ => None,
        }
    }
}

/// 単一ランドマーク
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    /// 正規化されたX座標 (0.0〜1.0)
    pub x: f32,
    /// 正規化されたY座標 (0.0〜1.0、下向きが正)
    pub y: f32,
    /// 奥行き（腰中心からの相対値、推定側依存）
    pub z: f32,
    /// 可視信頼度 (0.0〜1.0)
    pub visibility: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32, visibility: f32) -> Self {
        Self {
            x,
            y,
            z,
            visibility,
        }
    }

    /// 深度なし・完全可視のランドマーク（テストや合成フレーム用）
    pub fn at(x: f32, y: f32) -> Self {
        Self::new(x, y, 0.0, 1.0)
    }

    /// 可視信頼度が閾値以上か
    pub fn is_visible(&self, threshold: f32) -> bool {
        self.visibility >= threshold
    }
}

impl Default for Landmark {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            visibility: 0.0,
        }
    }
}

/// 33ランドマークからなる1フレーム分の姿勢
#[derive(Debug, Clone)]
pub struct LandmarkFrame {
    pub landmarks: [Landmark; LandmarkIndex::COUNT],
}

impl LandmarkFrame {
    pub fn new(landmarks: [Landmark; LandmarkIndex::COUNT]) -> Self {
        Self { landmarks }
    }

    /// 外部から受け取ったランドマーク列を検証して取り込む。
    /// 33個以外は姿勢推定側との契約違反なのでエラー。
    pub fn from_slice(landmarks: &[Landmark]) -> Result<Self> {
        if landmarks.len() != LandmarkIndex::COUNT {
            bail!(
                "landmark frame has {} entries, expected {}",
                landmarks.len(),
                LandmarkIndex::COUNT
            );
        }
        let mut frame = Self::default();
        frame.landmarks.copy_from_slice(landmarks);
        Ok(frame)
    }

    /// インデックスでランドマークを取得
    pub fn get(&self, index: LandmarkIndex) -> &Landmark {
        &self.landmarks[index as usize]
    }

    /// 2つのランドマークの中点 (x, y)
    pub fn midpoint(&self, a: LandmarkIndex, b: LandmarkIndex) -> (f32, f32) {
        let a = self.get(a);
        let b = self.get(b);
        ((a.x + b.x) / 2.0, (a.y + b.y) / 2.0)
    }
}

impl Default for LandmarkFrame {
    fn default() -> Self {
        Self {
            landmarks: [Landmark::default(); LandmarkIndex::COUNT],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_landmark_index_count() {
        assert_eq!(LandmarkIndex::COUNT, 33);
    }

    #[test]
    fn test_landmark_index_from_index() {
        assert_eq!(LandmarkIndex::from_index(0), Some(LandmarkIndex::Nose));
        assert_eq!(
            LandmarkIndex::from_index(14),
            Some(LandmarkIndex::RightElbow)
        );
        assert_eq!(
            LandmarkIndex::from_index(32),
            Some(LandmarkIndex::RightFootIndex)
        );
        assert_eq!(LandmarkIndex::from_index(33), None);
    }

    #[test]
    fn test_landmark_is_visible() {
        let lm = Landmark::new(0.5, 0.5, 0.0, 0.7);
        assert!(lm.is_visible(0.5));
        assert!(!lm.is_visible(0.8));
    }

    #[test]
    fn test_frame_get() {
        let mut landmarks = [Landmark::default(); LandmarkIndex::COUNT];
        landmarks[LandmarkIndex::Nose as usize] = Landmark::new(0.5, 0.3, -0.1, 0.9);

        let frame = LandmarkFrame::new(landmarks);
        let nose = frame.get(LandmarkIndex::Nose);
        assert_eq!(nose.x, 0.5);
        assert_eq!(nose.y, 0.3);
        assert_eq!(nose.visibility, 0.9);
    }

    #[test]
    fn test_frame_midpoint() {
        let mut frame = LandmarkFrame::default();
        frame.landmarks[LandmarkIndex::LeftShoulder as usize] = Landmark::at(0.4, 0.4);
        frame.landmarks[LandmarkIndex::RightShoulder as usize] = Landmark::at(0.6, 0.5);

        let (mx, my) = frame.midpoint(LandmarkIndex::LeftShoulder, LandmarkIndex::RightShoulder);
        assert!((mx - 0.5).abs() < 1e-6);
        assert!((my - 0.45).abs() < 1e-6);
    }

    #[test]
    fn test_from_slice_valid() {
        let landmarks = vec![Landmark::at(0.5, 0.5); LandmarkIndex::COUNT];
        let frame = LandmarkFrame::from_slice(&landmarks).unwrap();
        assert_eq!(frame.get(LandmarkIndex::LeftHip).x, 0.5);
    }

    #[test]
    fn test_from_slice_wrong_length() {
        let landmarks = vec![Landmark::at(0.5, 0.5); 17];
        let err = LandmarkFrame::from_slice(&landmarks).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("17"), "error should name actual count: {}", msg);
        assert!(
            msg.contains("expected 33"),
            "error should name expected count: {}",
            msg
        );
    }
}
