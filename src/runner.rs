//! # Runner モジュール
//!
//! シミュレーションエンジンを tokio タスク内で実時間ペースで駆動します。
//!
//! - tick は `tokio::time::interval` で一定間隔に刻まれ、遅れた tick は追いつかずに捨てられます
//! - 制御コマンドは `mpsc` チャネルで受け取り、必ず tick と tick の間に適用されます
//! - 各 tick 後のスナップショットは `watch` チャネルで購読者へ公開されます

use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use crate::models::detection::DetectionEvent;
use crate::models::person::Person;
use crate::scenario::SiteConfig;
use crate::simulation::SimulationEngine;

/// 実行中のエンジンへの制御コマンド
#[derive(Debug, Clone)]
pub enum ControlCommand {
    Pause,
    Resume,
    /// サイトを差し替えてジオメトリを再構築
    ReplaceSite(SiteConfig),
    /// 表示用カメラの選択（None で解除）
    SelectCamera(Option<String>),
    Stop,
}

/// 購読者へ公開する状態
#[derive(Debug, Clone, Default, Serialize)]
pub struct SimulationSnapshot {
    pub time: f64,
    pub step_count: u64,
    pub paused: bool,
    pub active_camera: Option<String>,
    pub agents: Vec<Person>,
    /// 新しい順
    pub recent_detections: Vec<DetectionEvent>,
}

/// スナップショットに含める直近の検知件数
const RECENT_DETECTIONS: usize = 20;

impl SimulationSnapshot {
    pub fn capture(engine: &SimulationEngine) -> Self {
        Self {
            time: engine.state.time,
            step_count: engine.state.step_count,
            paused: engine.state.paused,
            active_camera: engine.state.active_camera.clone(),
            agents: engine.state.agents.clone(),
            recent_detections: engine
                .detection_log()
                .latest(RECENT_DETECTIONS)
                .into_iter()
                .cloned()
                .collect(),
        }
    }
}

fn apply_command(engine: &mut SimulationEngine, command: ControlCommand) -> bool {
    debug!("制御コマンド受信: {:?}", command);
    match command {
        ControlCommand::Pause => engine.pause(),
        ControlCommand::Resume => engine.resume(),
        ControlCommand::ReplaceSite(site) => engine.replace_site(site),
        ControlCommand::SelectCamera(id) => {
            engine.select_camera(id);
        }
        ControlCommand::Stop => return false,
    }
    true
}

/// エンジンを実時間で駆動
///
/// `Stop` を受け取る、コマンド送信側がすべて閉じられる、最大時間に達する、
/// または `max_steps` 回 tick を進めると終了し、エンジンを返します。
pub async fn run_realtime(
    mut engine: SimulationEngine,
    mut commands: mpsc::Receiver<ControlCommand>,
    snapshots: watch::Sender<SimulationSnapshot>,
    tick_interval: Duration,
    max_steps: Option<u64>,
) -> SimulationEngine {
    let mut ticker = time::interval(tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let start_step = engine.state.step_count;

    info!("=== 実時間実行開始 (間隔: {}ms) ===", tick_interval.as_millis());
    snapshots.send_replace(SimulationSnapshot::capture(&engine));

    loop {
        tokio::select! {
            biased;

            command = commands.recv() => {
                let keep_running = match command {
                    Some(command) => apply_command(&mut engine, command),
                    None => false,
                };
                snapshots.send_replace(SimulationSnapshot::capture(&engine));
                if !keep_running {
                    break;
                }
            }

            _ = ticker.tick() => {
                if engine.is_paused() {
                    continue;
                }
                let report = engine.step();
                if !report.new_events.is_empty() {
                    debug!(
                        "新しい検知: {}件 (時刻: {:.2}秒)",
                        report.new_events.len(),
                        report.time
                    );
                }
                snapshots.send_replace(SimulationSnapshot::capture(&engine));

                let stepped = engine.state.step_count - start_step;
                if engine.is_finished() || max_steps.is_some_and(|limit| stepped >= limit) {
                    break;
                }
            }
        }
    }

    info!(
        "=== 実時間実行終了 (時刻: {:.2}秒, ステップ: {}) ===",
        engine.state.time, engine.state.step_count
    );
    engine
}
