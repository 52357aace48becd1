//! # Geometry モジュール
//!
//! 宣言的なサイト記述をワールド座標のプリミティブへ変換します。
//!
//! - 部屋ごとの4枚の壁ボックス
//! - 階ごとの床スラブ
//! - 部屋のワールド境界（部屋カメラのクリップ境界として使用）
//! - 全カメラのワールド姿勢
//! - 道路セグメント
//!
//! 構築は純粋関数で、同じサイトからは常に同じジオメトリが得られます。
//! ジオメトリはサイト変更時にのみ再構築し、tick ごとには作り直しません。

use glam::DVec3;
use serde::Serialize;
use tracing::{debug, warn};

use crate::models::camera::CameraPose;
use crate::models::common::{Aabb, FLOOR_THICKNESS, WALL_THICKNESS};
use crate::models::traits::IOccluder;
use crate::scenario::{
    BuildingConfig, CameraConfig, FloorConfig, RoadConfig, RoomConfig, SiteConfig,
};

/// 衝突面の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SurfaceKind {
    Wall,
    Floor,
}

/// レイキャスト対象の絞り込み
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceFilter {
    /// 壁と床すべて（視線判定用）
    All,
    /// 壁のみ（移動時の障害物判定用）
    WallsOnly,
}

impl SurfaceFilter {
    fn accepts(self, kind: SurfaceKind) -> bool {
        match self {
            SurfaceFilter::All => true,
            SurfaceFilter::WallsOnly => kind == SurfaceKind::Wall,
        }
    }
}

/// 衝突可能な面（薄いボックス）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Surface {
    pub kind: SurfaceKind,
    pub bounds: Aabb,
    /// 所属する部屋IDまたは階ID
    pub owner: String,
}

/// レイキャストの結果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub distance: f64,
    pub kind: SurfaceKind,
    pub surface_index: usize,
}

/// 部屋のワールド空間ボリューム
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomVolume {
    pub building_id: String,
    pub room_id: String,
    pub name: String,
    pub level: i32,
    pub bounds: Aabb,
    pub color: Option<String>,
}

impl RoomVolume {
    /// 床面上の部屋中心
    pub fn floor_center(&self) -> DVec3 {
        let c = self.bounds.center();
        DVec3::new(c.x, self.bounds.min.y, c.z)
    }
}

/// 道路セグメント
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoadSegment {
    pub id: String,
    pub start: DVec3,
    pub end: DVec3,
    pub width: f64,
    pub midpoint: DVec3,
    pub length: f64,
    /// Y軸まわりの向き（ラジアン）
    pub heading: f64,
}

impl RoadSegment {
    fn from_config(road: &RoadConfig) -> Self {
        let start = DVec3::new(road.start.x, 0.0, road.start.y);
        let end = DVec3::new(road.end.x, 0.0, road.end.y);
        let delta = end - start;
        Self {
            id: road.id.clone(),
            start,
            end,
            width: road.width,
            midpoint: (start + end) * 0.5,
            length: delta.length(),
            heading: delta.x.atan2(delta.z),
        }
    }

    /// 両端を含む等間隔の点
    pub fn sample_points(&self, count: usize) -> Vec<DVec3> {
        match count {
            0 => Vec::new(),
            1 => vec![self.midpoint],
            n => (0..n)
                .map(|i| self.start.lerp(self.end, i as f64 / (n - 1) as f64))
                .collect(),
        }
    }
}

/// 建物の外形
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildingEnvelope {
    pub id: String,
    pub name: String,
    pub origin: DVec3,
    /// 最大の階寸法 × 総高さ
    pub extent: DVec3,
}

/// サイト全体のワールドジオメトリ
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SceneGeometry {
    pub surfaces: Vec<Surface>,
    pub rooms: Vec<RoomVolume>,
    pub cameras: Vec<CameraPose>,
    pub roads: Vec<RoadSegment>,
    pub buildings: Vec<BuildingEnvelope>,
    /// 構築時に除外された要素の説明
    pub skipped: Vec<String>,
}

impl SceneGeometry {
    /// サイト記述からジオメトリを構築
    pub fn build(site: &SiteConfig) -> Self {
        let mut scene = SceneGeometry::default();

        for building in &site.buildings {
            scene.add_building(building);
        }

        for tower in &site.tower_cameras {
            let cam = &tower.camera;
            if let Some(reason) = camera_defect(cam) {
                scene.skip(format!("tower camera {}: {}", cam.id, reason));
                continue;
            }
            let position = DVec3::new(
                cam.position.x,
                tower.tower_height + cam.height,
                cam.position.y,
            );
            if !position.is_finite() {
                scene.skip(format!("tower camera {}: non-finite position", cam.id));
                continue;
            }
            scene.cameras.push(CameraPose::tower(
                cam.id.clone(),
                cam.name.clone(),
                position,
                cam.yaw_deg,
                cam.pitch_deg,
                cam.fov_deg,
            ));
        }

        for road in &site.roads {
            let segment = RoadSegment::from_config(road);
            if !segment.start.is_finite() || !segment.end.is_finite() {
                scene.skip(format!("road {}: non-finite endpoints", road.id));
                continue;
            }
            scene.roads.push(segment);
        }

        debug!(
            "ジオメトリ構築完了: 面 {}枚, 部屋 {}室, カメラ {}台, 道路 {}本, 除外 {}件",
            scene.surfaces.len(),
            scene.rooms.len(),
            scene.cameras.len(),
            scene.roads.len(),
            scene.skipped.len()
        );

        scene
    }

    fn skip(&mut self, reason: String) {
        warn!("サイト要素を除外: {}", reason);
        self.skipped.push(reason);
    }

    fn add_building(&mut self, building: &BuildingConfig) {
        let origin = DVec3::new(building.position.x, 0.0, building.position.y);
        if !origin.is_finite() {
            self.skip(format!("building {}: non-finite position", building.id));
            return;
        }

        let mut floors: Vec<&FloorConfig> = building.floors.iter().collect();
        floors.sort_by_key(|f| f.level);

        let mut current_y = 0.0;
        let mut max_dims = (0.0_f64, 0.0_f64);

        for floor in floors {
            if !(floor.height > 0.0) || !floor.height.is_finite() {
                self.skip(format!(
                    "building {} floor {}: non-positive height",
                    building.id, floor.level
                ));
                continue;
            }

            self.surfaces.push(Surface {
                kind: SurfaceKind::Floor,
                bounds: Aabb::from_center_size(
                    origin + DVec3::new(0.0, current_y, 0.0),
                    DVec3::new(floor.dimensions.x, FLOOR_THICKNESS, floor.dimensions.y),
                ),
                owner: floor.id.clone(),
            });

            for room in &floor.rooms {
                self.add_room(building, origin, floor, room, current_y);
            }

            max_dims.0 = max_dims.0.max(floor.dimensions.x);
            max_dims.1 = max_dims.1.max(floor.dimensions.y);
            current_y += floor.height;
        }

        self.buildings.push(BuildingEnvelope {
            id: building.id.clone(),
            name: building.name.clone(),
            origin,
            extent: DVec3::new(max_dims.0, current_y, max_dims.1),
        });
    }

    fn add_room(
        &mut self,
        building: &BuildingConfig,
        origin: DVec3,
        floor: &FloorConfig,
        room: &RoomConfig,
        current_y: f64,
    ) {
        let dims = room.dimensions;
        if !(dims.x > 0.0 && dims.y > 0.0) || !dims.x.is_finite() || !dims.y.is_finite() {
            self.skip(format!("room {}: invalid dimensions", room.id));
            return;
        }

        let min = origin + DVec3::new(room.position.x, current_y, room.position.y);
        let bounds = Aabb::new(min, min + DVec3::new(dims.x, floor.height, dims.y));

        for wall in room_walls(min, dims.x, dims.y, floor.height) {
            self.surfaces.push(Surface {
                kind: SurfaceKind::Wall,
                bounds: wall,
                owner: room.id.clone(),
            });
        }

        for cam in &room.cameras {
            if let Some(reason) = camera_defect(cam) {
                self.skip(format!("room camera {}: {}", cam.id, reason));
                continue;
            }
            let position = DVec3::new(
                min.x + cam.position.x,
                current_y + cam.height,
                min.z + cam.position.y,
            );
            self.cameras.push(CameraPose::room(
                cam.id.clone(),
                cam.name.clone(),
                position,
                cam.yaw_deg,
                cam.pitch_deg,
                cam.fov_deg,
                room.id.clone(),
                bounds,
            ));
        }

        self.rooms.push(RoomVolume {
            building_id: building.id.clone(),
            room_id: room.id.clone(),
            name: room.name.clone(),
            level: floor.level,
            bounds,
            color: room.color.clone(),
        });
    }

    /// 地上階（level 0）の部屋
    pub fn ground_floor_rooms(&self) -> impl Iterator<Item = &RoomVolume> {
        self.rooms.iter().filter(|r| r.level == 0)
    }

    pub fn camera(&self, id: &str) -> Option<&CameraPose> {
        self.cameras.iter().find(|c| c.id == id)
    }
}

impl IOccluder for SceneGeometry {
    fn first_hit(
        &self,
        origin: DVec3,
        direction: DVec3,
        max_distance: f64,
        filter: SurfaceFilter,
    ) -> Option<RayHit> {
        if !origin.is_finite() || !direction.is_finite() || !(max_distance > 0.0) {
            return None;
        }

        self.surfaces
            .iter()
            .enumerate()
            .filter(|(_, s)| filter.accepts(s.kind))
            .filter_map(|(index, s)| {
                s.bounds.ray_intersection(origin, direction).map(|distance| RayHit {
                    distance,
                    kind: s.kind,
                    surface_index: index,
                })
            })
            .filter(|hit| hit.distance < max_distance)
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }
}

/// 部屋の4枚の壁（左・右・手前・奥）
fn room_walls(min: DVec3, width: f64, depth: f64, floor_height: f64) -> [Aabb; 4] {
    let wall_height = floor_height - FLOOR_THICKNESS;
    let wall_y = min.y + wall_height / 2.0;

    let along_z = DVec3::new(WALL_THICKNESS, wall_height, depth);
    let along_x = DVec3::new(width, wall_height, WALL_THICKNESS);

    [
        Aabb::from_center_size(DVec3::new(min.x, wall_y, min.z + depth / 2.0), along_z),
        Aabb::from_center_size(DVec3::new(min.x + width, wall_y, min.z + depth / 2.0), along_z),
        Aabb::from_center_size(DVec3::new(min.x + width / 2.0, wall_y, min.z), along_x),
        Aabb::from_center_size(DVec3::new(min.x + width / 2.0, wall_y, min.z + depth), along_x),
    ]
}

fn camera_defect(cam: &CameraConfig) -> Option<&'static str> {
    if !(cam.fov_deg > 0.0 && cam.fov_deg < 180.0) {
        return Some("fov must be within (0, 180)");
    }
    let values = [cam.position.x, cam.position.y, cam.height, cam.yaw_deg, cam.pitch_deg];
    if values.iter().any(|v| !v.is_finite()) {
        return Some("non-finite pose");
    }
    None
}
