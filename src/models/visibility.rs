use glam::DVec3;

use crate::models::camera::CameraPose;
use crate::models::common::safe_normalize;
use crate::models::geometry::SurfaceFilter;
use crate::models::traits::{IAgent, IOccluder, ISensor, VisibilityParams};

impl ISensor for CameraPose {
    fn get_sensor_id(&self) -> &str {
        &self.id
    }

    fn get_sensor_position(&self) -> DVec3 {
        self.position
    }

    /// 視錐台判定と視線判定の両方を満たすか
    fn can_see<O: IOccluder + ?Sized>(
        &self,
        point: DVec3,
        occluder: &O,
        params: &VisibilityParams,
    ) -> bool {
        if !self.frustum_contains(point, params.far_plane, params.aspect) {
            return false;
        }
        let origin = self.get_sensor_position();
        has_line_of_sight(origin, point, occluder, params.occlusion_buffer)
    }
}

/// 2点間に遮蔽物がないか
///
/// `target` の手前 `buffer` までに壁または床との交差があれば遮蔽とみなします。
pub fn has_line_of_sight<O: IOccluder + ?Sized>(
    origin: DVec3,
    target: DVec3,
    occluder: &O,
    buffer: f64,
) -> bool {
    let delta = target - origin;
    let Some(direction) = safe_normalize(delta) else {
        return false;
    };
    let reach = delta.length() - buffer;
    if reach <= 0.0 {
        return true;
    }
    !occluder.is_blocked(origin, direction, reach, SurfaceFilter::All)
}

/// エージェントの判定点（胴体の高さ）
pub fn torso_point(position: DVec3, params: &VisibilityParams) -> DVec3 {
    position + DVec3::Y * params.torso_height
}

/// エージェントがいずれかのカメラから見えるか
///
/// カメラは互いに独立に評価し、結果は論理和です。
pub fn is_visible<S: ISensor, O: IOccluder + ?Sized>(
    position: DVec3,
    cameras: &[S],
    occluder: &O,
    params: &VisibilityParams,
) -> bool {
    let point = torso_point(position, params);
    cameras.iter().any(|camera| camera.can_see(point, occluder, params))
}

/// 全エージェントの可視フラグ（入力と同じ順序）
pub fn visibility_flags<A: IAgent, S: ISensor, O: IOccluder + ?Sized>(
    agents: &[A],
    cameras: &[S],
    occluder: &O,
    params: &VisibilityParams,
) -> Vec<bool> {
    agents
        .iter()
        .map(|agent| is_visible(agent.get_position(), cameras, occluder, params))
        .collect()
}

/// エージェントを見ているカメラIDの一覧
pub fn visible_cameras<'a, S: ISensor, O: IOccluder + ?Sized>(
    position: DVec3,
    cameras: &'a [S],
    occluder: &O,
    params: &VisibilityParams,
) -> Vec<&'a str> {
    let point = torso_point(position, params);
    cameras
        .iter()
        .filter(|camera| camera.can_see(point, occluder, params))
        .map(|camera| camera.get_sensor_id())
        .collect()
}
