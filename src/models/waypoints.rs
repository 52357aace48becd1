use glam::DVec3;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;

use crate::models::common::LocomotionClass;
use crate::models::geometry::SceneGeometry;

/// 出現・目標地点の候補
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidPoint {
    pub position: DVec3,
    pub locomotion_class: LocomotionClass,
    /// 由来となった部屋IDまたは道路ID
    pub source_id: String,
}

/// 有効地点の集合
///
/// 地上階の各部屋中心（room 区分）と、各道路上の等間隔点（road 区分）から成ります。
/// サイトが変わるたびに作り直します。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidPoints {
    points: Vec<ValidPoint>,
}

impl ValidPoints {
    pub fn from_scene(scene: &SceneGeometry, road_points_per_segment: usize) -> Self {
        let rooms = scene.ground_floor_rooms().map(|room| ValidPoint {
            position: room.floor_center(),
            locomotion_class: LocomotionClass::Room,
            source_id: room.room_id.clone(),
        });

        let roads = scene.roads.iter().flat_map(|road| {
            road.sample_points(road_points_per_segment)
                .into_iter()
                .map(move |position| ValidPoint {
                    position,
                    locomotion_class: LocomotionClass::Road,
                    source_id: road.id.clone(),
                })
        });

        Self {
            points: rooms.chain(roads).collect(),
        }
    }

    /// 正方形領域（±half_extent）の外にある地点を除外し、除外数を返す
    pub fn retain_within(&mut self, half_extent: f64) -> usize {
        let before = self.points.len();
        self.points
            .retain(|p| p.position.x.abs() <= half_extent && p.position.z.abs() <= half_extent);
        before - self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidPoint> {
        self.points.iter()
    }

    pub fn of_class(&self, class: LocomotionClass) -> impl Iterator<Item = &ValidPoint> {
        self.points.iter().filter(move |p| p.locomotion_class == class)
    }

    /// 区分を問わず1点を選ぶ（出現地点用）
    pub fn choose_any<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&ValidPoint> {
        self.points.choose(rng)
    }

    /// 同じ区分から1点を一様に選ぶ
    pub fn choose<R: Rng + ?Sized>(&self, class: LocomotionClass, rng: &mut R) -> Option<DVec3> {
        let candidates: Vec<&ValidPoint> = self.of_class(class).collect();
        candidates.choose(rng).map(|p| p.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{BuildingConfig, FloorConfig, Point2D, RoadConfig, RoomConfig, SiteConfig};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn site() -> SiteConfig {
        let room = |id: &str, x: f64| RoomConfig {
            id: id.into(),
            name: id.into(),
            position: Point2D::new(x, 0.0),
            dimensions: Point2D::new(4.0, 4.0),
            color: None,
            furniture: Vec::new(),
            cameras: Vec::new(),
        };
        SiteConfig {
            name: "wp".into(),
            buildings: vec![BuildingConfig {
                id: "b".into(),
                name: "b".into(),
                position: Point2D::new(10.0, 10.0),
                floors: vec![
                    FloorConfig {
                        id: "g".into(),
                        level: 0,
                        height: 3.0,
                        dimensions: Point2D::new(8.0, 4.0),
                        rooms: vec![room("g1", 0.0), room("g2", 4.0)],
                    },
                    FloorConfig {
                        id: "u".into(),
                        level: 1,
                        height: 3.0,
                        dimensions: Point2D::new(8.0, 4.0),
                        rooms: vec![room("u1", 0.0)],
                    },
                ],
            }],
            roads: vec![RoadConfig {
                id: "r".into(),
                name: None,
                start: Point2D::new(0.0, -20.0),
                end: Point2D::new(0.0, 20.0),
                width: 4.0,
            }],
            tower_cameras: Vec::new(),
        }
    }

    #[test]
    fn test_room_centers_only_on_ground_floor() {
        let scene = SceneGeometry::build(&site());
        let points = ValidPoints::from_scene(&scene, 5);
        let rooms: Vec<_> = points.of_class(LocomotionClass::Room).collect();
        assert_eq!(rooms.len(), 2);
        assert_eq!(rooms[0].position, DVec3::new(12.0, 0.0, 12.0));
        assert!(rooms.iter().all(|p| p.source_id != "u1"));
        assert_eq!(points.of_class(LocomotionClass::Road).count(), 5);
        assert_eq!(points.len(), 7);
    }

    #[test]
    fn test_choose_stays_in_class() {
        let scene = SceneGeometry::build(&site());
        let points = ValidPoints::from_scene(&scene, 5);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..50 {
            let p = points.choose(LocomotionClass::Road, &mut rng).unwrap();
            assert_eq!(p.x, 0.0);
        }
    }

    #[test]
    fn test_retain_within_drops_outside_points() {
        let scene = SceneGeometry::build(&site());
        let mut points = ValidPoints::from_scene(&scene, 5);
        let removed = points.retain_within(17.0);
        // 道路両端 (z = ±20) が領域外
        assert_eq!(removed, 2);
        assert_eq!(points.len(), 5);
    }

    #[test]
    fn test_empty_site_has_no_points() {
        let scene = SceneGeometry::build(&SiteConfig::default());
        let points = ValidPoints::from_scene(&scene, 5);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        assert!(points.is_empty());
        assert!(points.choose_any(&mut rng).is_none());
        assert!(points.choose(LocomotionClass::Room, &mut rng).is_none());
    }
}
