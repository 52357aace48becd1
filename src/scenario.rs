//! # Scenario モジュール
//!
//! シミュレーション実行に必要な設定（時間刻み、エージェント数、脅威ポリシー、
//! 操舵パラメータ、可視判定パラメータ）とサイト記述を YAML から読み込みます。
//!
//! サイト記述（建物・階・部屋・道路・カメラ）は外部の編集/永続化レイヤーから
//! 供給される入力であり、ここではドライバ用のシナリオファイルの一部として扱います。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// シナリオメタデータ
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScenarioMeta {
    pub version: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// シミュレーション設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulationConfig {
    pub dt_s: f64,
    pub t_max_s: f64,
    pub seed: u64,
    pub agent_count: usize,
    /// 道路1本あたりの有効地点数（両端を含む）
    #[serde(default = "default_road_points")]
    pub road_points_per_segment: usize,
}

fn default_road_points() -> usize {
    5
}

/// 脅威割り当てポリシー設定
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ThreatPolicyConfig {
    /// 脅威ゼロ時の強制割り当てが有効になるまでの時間（秒）
    pub warmup_s: f64,
    /// 強制的に脅威化するエージェントID（存在しなければ先頭のエージェント）
    pub forced_agent_id: Option<String>,
    /// 非脅威エージェントが1 tick あたりに脅威化する確率
    pub escalation_probability: f64,
    /// 同時に存在できる脅威の最大数
    pub max_concurrent_threats: usize,
}

impl Default for ThreatPolicyConfig {
    fn default() -> Self {
        Self {
            warmup_s: 5.0,
            forced_agent_id: Some("01".to_string()),
            escalation_probability: 0.0005,
            max_concurrent_threats: 3,
        }
    }
}

/// 操舵パラメータ
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SteeringConfig {
    pub arrival_threshold: f64,
    pub near_radius: f64,
    pub near_flee_weight: f64,
    pub panic_speed_factor: f64,
    pub caution_radius: f64,
    pub caution_dwell_s: f64,
    pub caution_max_weight: f64,
    pub separation_radius: f64,
    pub wall_probe_distance: f64,
    pub boundary_half_extent: f64,
    pub speed_min: f64,
    pub speed_max: f64,
}

impl Default for SteeringConfig {
    fn default() -> Self {
        Self {
            arrival_threshold: 0.4,
            near_radius: 15.0,
            near_flee_weight: 0.98,
            panic_speed_factor: 1.25,
            caution_radius: 22.5,
            caution_dwell_s: 1.5,
            caution_max_weight: 0.8,
            separation_radius: 2.0,
            wall_probe_distance: 0.8,
            boundary_half_extent: 50.0,
            speed_min: 1.0,
            speed_max: 2.0,
        }
    }
}

/// 可視判定パラメータ
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VisibilityConfig {
    /// 視錐台の遠方クリップ距離
    pub far_plane: f64,
    /// 判定点を地面から持ち上げる高さ（胴体の高さ）
    pub torso_height: f64,
    /// 自己交差を避けるための距離バッファ
    pub occlusion_buffer: f64,
    /// 水平/垂直のアスペクト比
    pub aspect: f64,
}

impl Default for VisibilityConfig {
    fn default() -> Self {
        Self {
            far_plane: 80.0,
            torso_height: 1.0,
            occlusion_buffer: 0.2,
            aspect: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// 家具の種類（装飾のみ、シミュレーションでは無視）
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub enum FurnitureKind {
    Bed,
    Sofa,
    Table,
    Chair,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FurnitureConfig {
    pub kind: FurnitureKind,
    pub position: Point2D,
    #[serde(default)]
    pub rotation_deg: Option<f64>,
    #[serde(default)]
    pub scale: Option<f64>,
}

/// カメラ設定（部屋カメラ・タワーカメラ共通）
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CameraConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub fov_deg: f64,
    pub position: Point2D,
    /// 床（タワーの場合はタワー頂部）からの高さ
    pub height: f64,
    #[serde(default)]
    pub yaw_deg: f64,
    #[serde(default)]
    pub pitch_deg: f64,
}

/// 部屋の外に立つタワーカメラ
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TowerCameraConfig {
    #[serde(flatten)]
    pub camera: CameraConfig,
    pub tower_height: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoomConfig {
    pub id: String,
    pub name: String,
    /// 建物原点からの相対位置
    pub position: Point2D,
    pub dimensions: Point2D,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub furniture: Vec<FurnitureConfig>,
    #[serde(default)]
    pub cameras: Vec<CameraConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FloorConfig {
    #[serde(default)]
    pub id: String,
    pub level: i32,
    pub height: f64,
    pub dimensions: Point2D,
    #[serde(default)]
    pub rooms: Vec<RoomConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BuildingConfig {
    pub id: String,
    pub name: String,
    pub position: Point2D,
    #[serde(default)]
    pub floors: Vec<FloorConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoadConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub start: Point2D,
    pub end: Point2D,
    pub width: f64,
}

/// サイト記述
///
/// 1回のシミュレーション実行に対して不変の入力です。
/// 新しいサイトが与えられるとジオメトリは全て再構築されます。
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SiteConfig {
    pub name: String,
    #[serde(default)]
    pub buildings: Vec<BuildingConfig>,
    #[serde(default)]
    pub roads: Vec<RoadConfig>,
    #[serde(default)]
    pub tower_cameras: Vec<TowerCameraConfig>,
}

impl SiteConfig {
    /// サイト内の全カメラ数（部屋カメラ + タワーカメラ）
    pub fn camera_count(&self) -> usize {
        let room_cameras: usize = self
            .buildings
            .iter()
            .flat_map(|b| &b.floors)
            .flat_map(|f| &f.rooms)
            .map(|r| r.cameras.len())
            .sum();
        room_cameras + self.tower_cameras.len()
    }

    pub fn room_count(&self) -> usize {
        self.buildings
            .iter()
            .flat_map(|b| &b.floors)
            .map(|f| f.rooms.len())
            .sum()
    }
}

/// 完全なシナリオ設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScenarioConfig {
    pub meta: ScenarioMeta,
    pub sim: SimulationConfig,
    #[serde(default)]
    pub policy: ThreatPolicyConfig,
    #[serde(default)]
    pub steering: SteeringConfig,
    #[serde(default)]
    pub visibility: VisibilityConfig,
    pub site: SiteConfig,
}

impl ScenarioConfig {
    /// YAMLファイルからシナリオ設定を読み込み
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.to_path_buf()));
        }

        let contents = fs::read_to_string(path).map_err(|source| ScenarioError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config: ScenarioConfig =
            serde_yaml::from_str(&contents).map_err(|source| ScenarioError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        config.validate()?;

        Ok(config)
    }

    /// YAML文字列からシナリオ設定を読み込み
    pub fn from_yaml_str(contents: &str) -> Result<Self, ScenarioError> {
        let config: ScenarioConfig =
            serde_yaml::from_str(contents).map_err(|source| ScenarioError::Parse {
                path: PathBuf::from("<inline>"),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// 設定の基本的な検証
    ///
    /// サイト記述の不整合はここでは扱わず、ジオメトリ構築時に局所的に除外されます。
    pub fn validate(&self) -> Result<(), ScenarioError> {
        let invalid = |msg: &str| Err(ScenarioError::Validation(msg.to_string()));

        if !(self.sim.dt_s > 0.0) {
            return invalid("dt_s must be positive");
        }
        if !(self.sim.t_max_s > 0.0) {
            return invalid("t_max_s must be positive");
        }
        if self.sim.road_points_per_segment < 2 {
            return invalid("road_points_per_segment must be at least 2");
        }

        let p = &self.policy;
        if !(0.0..=1.0).contains(&p.escalation_probability) {
            return invalid("escalation_probability must be within [0, 1]");
        }
        if p.max_concurrent_threats == 0 {
            return invalid("max_concurrent_threats must be at least 1");
        }
        if p.warmup_s < 0.0 {
            return invalid("warmup_s must not be negative");
        }

        let s = &self.steering;
        let radii = [
            s.arrival_threshold,
            s.near_radius,
            s.caution_radius,
            s.separation_radius,
            s.wall_probe_distance,
            s.boundary_half_extent,
        ];
        if radii.iter().any(|r| !(*r > 0.0)) {
            return invalid("steering distances must be positive");
        }
        if s.caution_radius < s.near_radius {
            return invalid("caution_radius must not be smaller than near_radius");
        }
        let unit = 0.0..=1.0;
        if !unit.contains(&s.near_flee_weight) || !unit.contains(&s.caution_max_weight) {
            return invalid("flee weights must be within [0, 1]");
        }
        if !(s.speed_min > 0.0) || s.speed_min > s.speed_max {
            return invalid("speed range must satisfy 0 < speed_min <= speed_max");
        }

        let v = &self.visibility;
        if !(v.far_plane > 0.0) || !(v.aspect > 0.0) || v.occlusion_buffer < 0.0 {
            return invalid("invalid visibility parameters");
        }

        Ok(())
    }

    /// シナリオの概要を表示
    pub fn print_summary(&self) {
        println!("=== シナリオ情報 ===");
        println!("名前: {}", self.meta.name);
        println!("説明: {}", self.meta.description);
        println!("バージョン: {}", self.meta.version);
        println!();

        println!("=== シミュレーション設定 ===");
        println!("時間刻み: {:.3}秒", self.sim.dt_s);
        println!("最大時間: {:.1}秒", self.sim.t_max_s);
        println!("シード値: {}", self.sim.seed);
        println!("エージェント数: {}", self.sim.agent_count);
        println!();

        println!("=== サイト: {} ===", self.site.name);
        println!("建物: {}棟", self.site.buildings.len());
        for building in &self.site.buildings {
            println!("  {} ({}): {}階", building.id, building.name, building.floors.len());
        }
        println!("部屋: {}室", self.site.room_count());
        println!("道路: {}本", self.site.roads.len());
        println!(
            "カメラ: {}台 (タワー: {}台)",
            self.site.camera_count(),
            self.site.tower_cameras.len()
        );
    }
}

/// シナリオ読み込みエラー
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("シナリオファイルが見つかりません: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("ファイル読み込みエラー {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML解析エラー {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("設定検証エラー: {0}")]
    Validation(String),
}
