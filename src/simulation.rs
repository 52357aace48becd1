//! # Simulation モジュール
//!
//! サイト監視シミュレーションの中核となるエンジンを提供します。
//!
//! エンジンはシミュレーション状態（時刻、エージェント、検知ログ、一時停止フラグ、
//! 選択中カメラ）を明示的に所有し、固定時間刻み（Δt）で各コンポーネントを
//! 決まった順序で呼び出します。
//!
//! ## シミュレーション処理順序
//!
//! 各時間刻みにおいて、以下の順序で処理が実行されます：
//!
//! 1. **可視判定**: 全エージェント × 全カメラの視錐台・視線判定
//! 2. **エージェント更新**: 可視区間の更新、目標再選択、脅威ポリシー、操舵と移動
//! 3. **検知ログ**: 新しい可視区間の開始をイベントとして記録
//!
//! 一時停止中は3つとも凍結され、途中まで進んだ tick は存在しません。
//!
//! ## 使用例
//!
//! ```no_run
//! use sitewatch::scenario::ScenarioConfig;
//! use sitewatch::simulation::SimulationEngine;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ScenarioConfig::from_file("scenarios/sunset_valley.yaml")?;
//! let mut engine = SimulationEngine::new(config, 1);
//! engine.initialize()?;
//! engine.run();
//! # Ok(())
//! # }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::models::camera::CameraPose;
use crate::models::detection::{DetectionEvent, DetectionLogger, DetectionStats};
use crate::models::geometry::SceneGeometry;
use crate::models::person::Person;
use crate::models::simulator::{
    StepContext, advance_agents, reconcile_agents, spawn_agents, update_visibility,
};
use crate::models::threat::threat_count;
use crate::models::traits::VisibilityParams;
use crate::models::visibility::visibility_flags;
use crate::models::waypoints::ValidPoints;
use crate::scenario::{ScenarioConfig, ScenarioError, SiteConfig};

/// 終了時刻判定の許容誤差
const TIME_EPSILON: f64 = 1e-9;

/// 1つのサイトから構築されたワールド
///
/// ジオメトリと有効地点は常に一緒に作り直され、エンジンへは丸ごと差し替えられます。
#[derive(Debug, Clone)]
pub struct SiteWorld {
    pub site: SiteConfig,
    pub scene: SceneGeometry,
    pub points: ValidPoints,
}

impl SiteWorld {
    pub fn build(
        site: SiteConfig,
        road_points_per_segment: usize,
        boundary_half_extent: f64,
    ) -> Self {
        let scene = SceneGeometry::build(&site);
        let mut points = ValidPoints::from_scene(&scene, road_points_per_segment);

        let removed = points.retain_within(boundary_half_extent);
        if removed > 0 {
            warn!(
                "移動領域（±{:.1}）外の有効地点を{}点除外しました",
                boundary_half_extent, removed
            );
        }

        debug!(
            "ワールド構築: {} (有効地点: {}点, カメラ: {}台)",
            site.name,
            points.len(),
            scene.cameras.len()
        );

        Self { site, scene, points }
    }
}

/// シミュレーション状態
#[derive(Debug, Clone, Default, Serialize)]
pub struct SimulationState {
    pub time: f64,
    pub step_count: u64,
    pub agents: Vec<Person>,
    #[serde(skip)]
    pub detection_log: DetectionLogger,
    pub paused: bool,
    pub active_camera: Option<String>,
}

/// 1 tick の結果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// tick 開始時刻
    pub time: f64,
    pub step: u64,
    /// 一時停止中で何も進まなかったか
    pub skipped: bool,
    pub visible: usize,
    pub threats: usize,
    pub panicking: usize,
    pub new_events: Vec<DetectionEvent>,
    pub escalated: Vec<String>,
}

/// 最終レポート
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub scenario: String,
    pub site: String,
    pub seed: u64,
    pub time: f64,
    pub step_count: u64,
    pub agents: Vec<Person>,
    pub detections: Vec<DetectionEvent>,
    pub stats: DetectionStats,
}

/// レポート出力エラー
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("レポートのシリアライズに失敗: {0}")]
    Serialize(#[from] serde_yaml::Error),

    #[error("レポート書き込みエラー {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub struct SimulationEngine {
    pub config: ScenarioConfig,
    pub state: SimulationState,
    world: SiteWorld,
    params: VisibilityParams,
    rng: ChaCha8Rng,
    pub verbose_level: u8,
}

impl SimulationEngine {
    pub fn new(config: ScenarioConfig, verbose_level: u8) -> Self {
        let world = SiteWorld::build(
            config.site.clone(),
            config.sim.road_points_per_segment,
            config.steering.boundary_half_extent,
        );
        let params = VisibilityParams::from(&config.visibility);
        let rng = ChaCha8Rng::seed_from_u64(config.sim.seed);

        Self {
            config,
            state: SimulationState::default(),
            world,
            params,
            rng,
            verbose_level,
        }
    }

    /// 設定を検証してエージェントを生成
    pub fn initialize(&mut self) -> Result<(), ScenarioError> {
        if self.verbose_level > 0 {
            info!("シミュレーションエンジンを初期化中...");
        }

        self.config.validate()?;
        self.spawn();

        if self.verbose_level > 0 {
            info!("初期化完了:");
            info!("  サイト: {}", self.world.site.name);
            info!("  部屋: {}室", self.world.scene.rooms.len());
            info!("  カメラ: {}台", self.world.scene.cameras.len());
            info!("  有効地点: {}点", self.world.points.len());
            info!("  エージェント: {}人", self.state.agents.len());
        }
        if !self.world.scene.skipped.is_empty() {
            warn!("構築時に除外されたサイト要素: {}件", self.world.scene.skipped.len());
        }

        Ok(())
    }

    fn spawn(&mut self) {
        self.state.agents = spawn_agents(
            self.config.sim.agent_count,
            &self.world.points,
            &self.config.steering,
            &mut self.rng,
        );
    }

    /// 最大時間まで一括実行
    pub fn run(&mut self) {
        info!("=== シミュレーション実行開始 ===");

        if self.state.paused {
            warn!("一時停止中のため実行しません");
            return;
        }

        while !self.is_finished() {
            self.step();

            if self.state.step_count % 100 == 0 && self.verbose_level > 0 {
                let progress = (self.state.time / self.config.sim.t_max_s) * 100.0;
                info!(
                    "進行状況: {:.1}% ({:.1}/{:.1}秒, 検知: {}件, 脅威: {}人)",
                    progress,
                    self.state.time,
                    self.config.sim.t_max_s,
                    self.state.detection_log.len(),
                    threat_count(&self.state.agents)
                );
            }
        }

        info!("=== シミュレーション完了 ===");
        info!("実行時間: {:.1}秒", self.state.time);
        info!("総ステップ数: {}", self.state.step_count);
        info!("検知イベント: {}件", self.state.detection_log.len());
    }

    /// 1 tick 進める
    ///
    /// 一時停止中は状態を一切変更せず `skipped` を立てた結果を返します。
    pub fn step(&mut self) -> TickReport {
        let now = self.state.time;
        if self.state.paused {
            return TickReport {
                time: now,
                step: self.state.step_count,
                skipped: true,
                ..TickReport::default()
            };
        }

        let dt = self.config.sim.dt_s;
        let scene = &self.world.scene;

        let visible = visibility_flags(&self.state.agents, &scene.cameras, scene, &self.params);
        update_visibility(&mut self.state.agents, &visible, now);

        let ctx = StepContext {
            occluder: scene,
            points: &self.world.points,
            steering: &self.config.steering,
            policy: &self.config.policy,
            probe_height: self.params.torso_height,
            now,
            dt,
        };
        let advance = advance_agents(&mut self.state.agents, &ctx, &mut self.rng);

        let new_events = self.state.detection_log.observe(&self.state.agents);

        let report = TickReport {
            time: now,
            step: self.state.step_count,
            skipped: false,
            visible: visible.iter().filter(|v| **v).count(),
            threats: threat_count(&self.state.agents),
            panicking: self.state.agents.iter().filter(|p| p.is_panicking).count(),
            new_events,
            escalated: advance.escalated,
        };

        if self.verbose_level > 2 {
            trace!(
                "時刻: {:.2}秒 (ステップ: {}, 可視: {}, 移動: {}, 停止: {})",
                now, report.step, report.visible, advance.moved, advance.held
            );
        }

        self.state.step_count += 1;
        self.state.time = self.state.step_count as f64 * dt;
        report
    }

    pub fn pause(&mut self) {
        if !self.state.paused {
            info!("シミュレーション一時停止 (時刻: {:.2}秒)", self.state.time);
        }
        self.state.paused = true;
    }

    pub fn resume(&mut self) {
        if self.state.paused {
            info!("シミュレーション再開 (時刻: {:.2}秒)", self.state.time);
        }
        self.state.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.state.paused
    }

    /// 最大時間に達したか（一括実行と実時間実行で共通の終了判定）
    pub fn is_finished(&self) -> bool {
        self.state.time >= self.config.sim.t_max_s - TIME_EPSILON
    }

    /// サイトを差し替える
    ///
    /// 新しいワールドを完全に構築してから入れ替えるため、tick が半端な
    /// ジオメトリを参照することはありません。入れ替え後、エージェントの目標は
    /// 新しい有効地点に合わせ直し、自分の区分の地点が無いエージェントは除去します。
    /// 有効地点が空なら全員除去、エージェントが1人もいなければ生成し直します。
    pub fn replace_site(&mut self, site: SiteConfig) {
        let world = SiteWorld::build(
            site,
            self.config.sim.road_points_per_segment,
            self.config.steering.boundary_half_extent,
        );
        info!(
            "サイト差し替え: {} -> {} (カメラ: {}台)",
            self.world.site.name,
            world.site.name,
            world.scene.cameras.len()
        );

        self.config.site = world.site.clone();
        self.world = world;

        if let Some(id) = self.state.active_camera.as_deref() {
            if self.world.scene.camera(id).is_none() {
                warn!("選択中のカメラ {} は新しいサイトに存在しません", id);
                self.state.active_camera = None;
            }
        }

        let (retargeted, dropped) =
            reconcile_agents(&mut self.state.agents, &self.world.points, &mut self.rng);
        if dropped > 0 {
            warn!("新しいサイトに有効地点が無いエージェントを{}人除去しました", dropped);
        }
        if retargeted > 0 {
            debug!("新しいサイトに合わせて{}人の目標を再選択しました", retargeted);
        }

        if self.state.agents.is_empty() {
            self.spawn();
        }
    }

    /// 表示用カメラを選択
    ///
    /// 存在しないIDは警告を出して未選択として扱い、false を返します。
    pub fn select_camera(&mut self, id: Option<String>) -> bool {
        match id {
            Some(id) if self.world.scene.camera(&id).is_some() => {
                info!("カメラ選択: {}", id);
                self.state.active_camera = Some(id);
                true
            }
            Some(id) => {
                warn!("不明なカメラID: {}", id);
                self.state.active_camera = None;
                false
            }
            None => {
                self.state.active_camera = None;
                true
            }
        }
    }

    pub fn active_camera_pose(&self) -> Option<&CameraPose> {
        self.state
            .active_camera
            .as_deref()
            .and_then(|id| self.world.scene.camera(id))
    }

    pub fn camera_poses(&self) -> &[CameraPose] {
        &self.world.scene.cameras
    }

    pub fn world(&self) -> &SiteWorld {
        &self.world
    }

    pub fn agents(&self) -> &[Person] {
        &self.state.agents
    }

    pub fn detection_log(&self) -> &DetectionLogger {
        &self.state.detection_log
    }

    pub fn visibility_params(&self) -> &VisibilityParams {
        &self.params
    }

    pub fn report(&self) -> SimulationReport {
        SimulationReport {
            scenario: self.config.meta.name.clone(),
            site: self.world.site.name.clone(),
            seed: self.config.sim.seed,
            time: self.state.time,
            step_count: self.state.step_count,
            agents: self.state.agents.clone(),
            detections: self.state.detection_log.events().cloned().collect(),
            stats: self.state.detection_log.stats(),
        }
    }

    /// レポートをYAMLで書き出す
    pub fn write_report<P: AsRef<Path>>(&self, path: P) -> Result<(), ReportError> {
        let path = path.as_ref();
        let yaml = serde_yaml::to_string(&self.report())?;
        fs::write(path, yaml).map_err(|source| ReportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!("レポートを書き出しました: {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::common::LocomotionClass;
    use crate::scenario::{
        BuildingConfig, CameraConfig, FloorConfig, Point2D, RoadConfig, RoomConfig,
        TowerCameraConfig,
    };

    const YAML: &str = r#"
meta:
  version: "1.0"
  name: engine-test
sim:
  dt_s: 0.1
  t_max_s: 2.0
  seed: 42
  agent_count: 4
site:
  name: strip
  roads:
    - id: r1
      start: { x: -20.0, y: 0.0 }
      end: { x: 20.0, y: 0.0 }
      width: 4.0
  tower_cameras:
    - id: t1
      fov_deg: 90.0
      position: { x: 0.0, y: -30.0 }
      height: 0.5
      tower_height: 1.5
"#;

    fn engine() -> SimulationEngine {
        let config = ScenarioConfig::from_yaml_str(YAML).unwrap();
        let mut engine = SimulationEngine::new(config, 0);
        engine.initialize().unwrap();
        engine
    }

    #[test]
    fn test_initialize_spawns_agents() {
        let engine = engine();
        assert_eq!(engine.agents().len(), 4);
        assert_eq!(engine.camera_poses().len(), 1);
    }

    #[test]
    fn test_run_reaches_max_time() {
        let mut engine = engine();
        engine.run();
        assert!((engine.state.time - 2.0).abs() < 1e-9);
        assert_eq!(engine.state.step_count, 20);
    }

    #[test]
    fn test_paused_step_changes_nothing() {
        let mut engine = engine();
        engine.step();
        let before = engine.agents().to_vec();
        let time = engine.state.time;

        engine.pause();
        let report = engine.step();
        assert!(report.skipped);
        assert_eq!(engine.agents(), before.as_slice());
        assert_eq!(engine.state.time, time);

        engine.resume();
        let report = engine.step();
        assert!(!report.skipped);
        assert_eq!(report.time, time);
    }

    #[test]
    fn test_same_seed_same_trajectory() {
        let mut a = engine();
        let mut b = engine();
        for _ in 0..15 {
            a.step();
            b.step();
        }
        assert_eq!(a.agents(), b.agents());
    }

    #[test]
    fn test_select_unknown_camera_resolves_to_none() {
        let mut engine = engine();
        assert!(engine.select_camera(Some("t1".into())));
        assert_eq!(engine.active_camera_pose().map(|c| c.id.as_str()), Some("t1"));
        assert!(!engine.select_camera(Some("nope".into())));
        assert!(engine.active_camera_pose().is_none());
    }

    #[test]
    fn test_replace_site_drops_missing_active_camera() {
        let mut engine = engine();
        engine.select_camera(Some("t1".into()));

        let site = SiteConfig {
            name: "other".into(),
            roads: vec![RoadConfig {
                id: "r2".into(),
                name: None,
                start: Point2D::new(0.0, -10.0),
                end: Point2D::new(0.0, 10.0),
                width: 4.0,
            }],
            tower_cameras: vec![TowerCameraConfig {
                camera: CameraConfig {
                    id: "t2".into(),
                    name: None,
                    fov_deg: 60.0,
                    position: Point2D::new(0.0, 0.0),
                    height: 0.5,
                    yaw_deg: 0.0,
                    pitch_deg: 0.0,
                },
                tower_height: 4.0,
            }],
            ..SiteConfig::default()
        };
        engine.replace_site(site);

        assert!(engine.state.active_camera.is_none());
        assert_eq!(engine.world().site.name, "other");
        assert_eq!(engine.config.site.name, "other");
        assert_eq!(engine.agents().len(), 4);
    }

    fn cross_road_site() -> SiteConfig {
        SiteConfig {
            name: "cross".into(),
            roads: vec![RoadConfig {
                id: "r3".into(),
                name: None,
                start: Point2D::new(0.0, -15.0),
                end: Point2D::new(0.0, 15.0),
                width: 4.0,
            }],
            ..SiteConfig::default()
        }
    }

    #[test]
    fn test_replace_site_without_points_clears_agents() {
        let mut engine = engine();
        engine.step();
        assert_eq!(engine.agents().len(), 4);

        engine.replace_site(SiteConfig::default());
        assert!(engine.world().points.is_empty());
        assert!(engine.agents().is_empty());

        for _ in 0..5 {
            let report = engine.step();
            assert_eq!(report.visible, 0);
        }
        assert!(engine.agents().is_empty());
    }

    #[test]
    fn test_replace_site_retargets_onto_new_points() {
        let mut engine = engine();
        for _ in 0..3 {
            engine.step();
        }

        engine.replace_site(cross_road_site());
        assert_eq!(engine.agents().len(), 4);

        for _ in 0..50 {
            let points = &engine.world().points;
            for agent in engine.agents() {
                assert!(
                    points
                        .of_class(agent.locomotion_class)
                        .any(|p| p.position == agent.target),
                    "{} targets {:?}",
                    agent.id,
                    agent.target
                );
            }
            engine.step();
        }
    }

    #[test]
    fn test_replace_site_drops_agents_of_missing_class() {
        let mut engine = engine();
        let mut site = cross_road_site();
        site.roads.clear();
        site.buildings = vec![BuildingConfig {
            id: "b".into(),
            name: "b".into(),
            position: Point2D::new(0.0, 0.0),
            floors: vec![FloorConfig {
                id: "g".into(),
                level: 0,
                height: 3.0,
                dimensions: Point2D::new(4.0, 4.0),
                rooms: vec![RoomConfig {
                    id: "r".into(),
                    name: "r".into(),
                    position: Point2D::new(0.0, 0.0),
                    dimensions: Point2D::new(4.0, 4.0),
                    color: None,
                    furniture: Vec::new(),
                    cameras: Vec::new(),
                }],
            }],
        }];

        engine.replace_site(site);

        // 道路区分の地点が無いので全員除去され、部屋区分で生成し直される
        assert_eq!(engine.agents().len(), 4);
        let agents = engine.agents();
        assert!(agents.iter().all(|a| a.locomotion_class == LocomotionClass::Room));
    }

    #[test]
    fn test_replace_site_respawns_when_empty() {
        let config = ScenarioConfig::from_yaml_str(YAML).unwrap();
        let mut engine = SimulationEngine::new(config.clone(), 0);
        engine.replace_site(SiteConfig::default());
        engine.initialize().unwrap();
        assert!(engine.agents().is_empty());

        engine.replace_site(config.site);
        assert_eq!(engine.agents().len(), 4);
    }

    #[test]
    fn test_report_serializes_to_yaml() {
        let mut engine = engine();
        for _ in 0..5 {
            engine.step();
        }
        let report = engine.report();
        assert_eq!(report.step_count, 5);
        assert_eq!(report.agents.len(), 4);
        let yaml = serde_yaml::to_string(&report).unwrap();
        assert!(yaml.contains("engine-test"));
    }
}
