use glam::DVec3;

use crate::models::common::LocomotionClass;
use crate::models::geometry::{RayHit, SurfaceFilter};

/// 移動する全エージェントが実装する基本インターフェース
pub trait IAgent {
    /// エージェントIDの取得
    fn get_id(&self) -> &str;

    /// 現在位置の取得
    fn get_position(&self) -> DVec3;

    /// 移動区分の取得
    fn get_locomotion_class(&self) -> LocomotionClass;
}

/// センサー（カメラ）のインターフェース
pub trait ISensor {
    /// センサーIDの取得
    fn get_sensor_id(&self) -> &str;

    /// センサー位置の取得
    fn get_sensor_position(&self) -> DVec3;

    /// 指定点が視野内にあり、遮蔽物なしで見通せるか
    fn can_see<O: IOccluder + ?Sized>(
        &self,
        point: DVec3,
        occluder: &O,
        params: &VisibilityParams,
    ) -> bool;
}

/// 遮蔽物（レイキャスト対象）のインターフェース
pub trait IOccluder {
    /// `max_distance` より手前で最も近い交差を返す
    ///
    /// `direction` は正規化済みであること。
    fn first_hit(
        &self,
        origin: DVec3,
        direction: DVec3,
        max_distance: f64,
        filter: SurfaceFilter,
    ) -> Option<RayHit>;

    /// 指定距離内に遮蔽物があるか
    fn is_blocked(
        &self,
        origin: DVec3,
        direction: DVec3,
        max_distance: f64,
        filter: SurfaceFilter,
    ) -> bool {
        self.first_hit(origin, direction, max_distance, filter).is_some()
    }
}

/// 可視判定パラメータ
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibilityParams {
    pub far_plane: f64,
    pub torso_height: f64,
    pub occlusion_buffer: f64,
    pub aspect: f64,
}

impl From<&crate::scenario::VisibilityConfig> for VisibilityParams {
    fn from(config: &crate::scenario::VisibilityConfig) -> Self {
        Self {
            far_plane: config.far_plane,
            torso_height: config.torso_height,
            occlusion_buffer: config.occlusion_buffer,
            aspect: config.aspect,
        }
    }
}

impl Default for VisibilityParams {
    fn default() -> Self {
        Self::from(&crate::scenario::VisibilityConfig::default())
    }
}
