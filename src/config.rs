use anyhow::Result;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub posture: PostureConfig,
    #[serde(default)]
    pub exercise: ExerciseConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// 座り姿勢評価の閾値
#[derive(Debug, Deserialize, Clone)]
pub struct PostureConfig {
    /// 頭の高さの許容差（正規化座標）
    #[serde(default = "default_head_y_diff")]
    pub head_y_diff: f32,
    /// 肩の左右差の許容値
    #[serde(default = "default_posture_shoulder_level")]
    pub shoulder_level: f32,
    /// 背中の角度の許容偏差（ラジアン）
    #[serde(default = "default_back_angle")]
    pub back_angle: f32,
    /// 前後の傾きの許容値（ラジアン、方向つき）
    #[serde(default = "default_lean")]
    pub lean: f32,
    /// 首の長さの下限（基準に対する比率）
    #[serde(default = "default_neck_ratio")]
    pub neck_ratio: f32,
}

fn default_head_y_diff() -> f32 { 0.03 }
fn default_posture_shoulder_level() -> f32 { 0.02 }
fn default_back_angle() -> f32 { 0.1 }
fn default_lean() -> f32 { 0.1 }
fn default_neck_ratio() -> f32 { 0.95 }

impl Default for PostureConfig {
    fn default() -> Self {
        Self {
            head_y_diff: default_head_y_diff(),
            shoulder_level: default_posture_shoulder_level(),
            back_angle: default_back_angle(),
            lean: default_lean(),
            neck_ratio: default_neck_ratio(),
        }
    }
}

/// エクササイズ評価の閾値とレップ設定
#[derive(Debug, Deserialize, Clone)]
pub struct ExerciseConfig {
    /// 肘の角度の上限（ラジアン）
    #[serde(default = "default_elbow_angle")]
    pub elbow_angle: f32,
    /// 上体の持ち上がりの上限（肩y - 腰y、負で上）
    #[serde(default = "default_elevation")]
    pub elevation: f32,
    /// 腰の左右差の上限
    #[serde(default = "default_hip_level")]
    pub hip_level: f32,
    /// 首の角度の上限（ラジアン）
    #[serde(default = "default_neck_angle")]
    pub neck_angle: f32,
    /// ブリッジで必要な腰と肩の高低差
    #[serde(default = "default_bridge_gap")]
    pub bridge_gap: f32,
    /// 肩の左右差の上限（ブリッジ）
    #[serde(default = "default_exercise_shoulder_level")]
    pub shoulder_level: f32,
    /// レップ成立に必要な連続合格フレーム数
    #[serde(default = "default_hold_frames")]
    pub hold_frames: u32,
    /// 1セッションの目標レップ数
    #[serde(default = "default_rep_goal")]
    pub rep_goal: u32,
}

fn default_elbow_angle() -> f32 { 0.3 }
fn default_elevation() -> f32 { -0.2 }
fn default_hip_level() -> f32 { 0.05 }
fn default_neck_angle() -> f32 { 0.3 }
fn default_bridge_gap() -> f32 { 0.1 }
fn default_exercise_shoulder_level() -> f32 { 0.05 }
fn default_hold_frames() -> u32 { 90 }
fn default_rep_goal() -> u32 { 10 }

impl Default for ExerciseConfig {
    fn default() -> Self {
        Self {
            elbow_angle: default_elbow_angle(),
            elevation: default_elevation(),
            hip_level: default_hip_level(),
            neck_angle: default_neck_angle(),
            bridge_gap: default_bridge_gap(),
            shoulder_level: default_exercise_shoulder_level(),
            hold_frames: default_hold_frames(),
            rep_goal: default_rep_goal(),
        }
    }
}

/// フレームレートと通知まわりのタイミング
#[derive(Debug, Deserialize, Clone)]
pub struct TimingConfig {
    /// 想定入力フレームレート（ホールド秒数表示の分母）
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
    /// 通知を出すまでの連続悪姿勢フレーム数
    #[serde(default = "default_debounce_frames")]
    pub debounce_frames: u32,
    /// 読み上げの最小間隔（秒）
    #[serde(default = "default_speech_cooldown_secs")]
    pub speech_cooldown_secs: u64,
}

fn default_frame_rate() -> u32 { 30 }
fn default_debounce_frames() -> u32 { 60 }
fn default_speech_cooldown_secs() -> u64 { 30 }

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            frame_rate: default_frame_rate(),
            debounce_frames: default_debounce_frames(),
            speech_cooldown_secs: default_speech_cooldown_secs(),
        }
    }
}

/// コーチサーバの設定
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// 待ち受けアドレス
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// セッション記録(JSONL)の保存先ディレクトリ
    #[serde(default = "default_recording_dir")]
    pub recording_dir: String,
    /// 受信フレームを記録するか
    #[serde(default)]
    pub record: bool,
}

fn default_listen_addr() -> String { "127.0.0.1:46100".to_string() }
fn default_recording_dir() -> String { "recordings".to_string() }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            recording_dir: default_recording_dir(),
            record: false,
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// 設定ファイルがなければデフォルト。壊れていたら警告してデフォルト。
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("設定 {} を読めません ({}), デフォルトを使います", path.display(), e);
                Self::default()
            }
        }
    }
}
