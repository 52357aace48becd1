use glam::DVec3;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use sitewatch::models::simulator::advance_agents;
use sitewatch::models::threat::threat_count;
use sitewatch::models::{
    LocomotionClass, Person, SceneGeometry, StepContext, ValidPoints, horizontal_distance,
};
use sitewatch::scenario::{
    BuildingConfig, FloorConfig, Point2D, RoomConfig, ScenarioConfig, SiteConfig, SteeringConfig,
    ThreatPolicyConfig,
};
use sitewatch::simulation::SimulationEngine;

/// x: -3..3, z: 0..4 の閉じた部屋1つ
fn closed_room() -> SceneGeometry {
    SceneGeometry::build(&SiteConfig {
        name: "room".into(),
        buildings: vec![BuildingConfig {
            id: "b".into(),
            name: "b".into(),
            position: Point2D::new(0.0, 0.0),
            floors: vec![FloorConfig {
                id: "g".into(),
                level: 0,
                height: 3.0,
                dimensions: Point2D::new(6.0, 4.0),
                rooms: vec![RoomConfig {
                    id: "r".into(),
                    name: "r".into(),
                    position: Point2D::new(-3.0, 0.0),
                    dimensions: Point2D::new(6.0, 4.0),
                    color: None,
                    furniture: Vec::new(),
                    cameras: Vec::new(),
                }],
            }],
        }],
        ..SiteConfig::default()
    })
}

fn inside_room(p: DVec3) -> bool {
    p.x > -2.95 && p.x < 2.95 && p.z > 0.05 && p.z < 3.95
}

fn quiet_policy() -> ThreatPolicyConfig {
    ThreatPolicyConfig {
        escalation_probability: 0.0,
        warmup_s: 1.0e9,
        ..ThreatPolicyConfig::default()
    }
}

#[test]
fn walker_never_passes_through_walls() {
    let scene = closed_room();
    let points = ValidPoints::default();
    let steering = SteeringConfig::default();
    let policy = quiet_policy();
    let mut rng = ChaCha8Rng::seed_from_u64(1);

    let mut agents = vec![Person::new(
        "01".into(),
        DVec3::new(0.0, 0.0, -3.0),
        DVec3::new(0.0, 0.0, 2.0),
        LocomotionClass::Room,
        1.0,
    )];

    let mut closest = f64::MIN;
    for step in 0..300 {
        let ctx = StepContext {
            occluder: &scene,
            points: &points,
            steering: &steering,
            policy: &policy,
            probe_height: 1.0,
            now: step as f64 * 0.1,
            dt: 0.1,
        };
        advance_agents(&mut agents, &ctx, &mut rng);
        let p = agents[0].position;
        assert!(!inside_room(p), "step {} entered the room at {:?}", step, p);
        closest = closest.max(p.z);
    }
    assert!(closest > -1.0);
}

#[test]
fn threat_heads_straight_but_stops_at_wall() {
    let scene = closed_room();
    let points = ValidPoints::default();
    let steering = SteeringConfig::default();
    let policy = quiet_policy();
    let mut rng = ChaCha8Rng::seed_from_u64(2);

    let mut threat = Person::new(
        "01".into(),
        DVec3::new(0.0, 0.0, -2.0),
        DVec3::new(0.0, 0.0, 2.0),
        LocomotionClass::Room,
        1.0,
    );
    threat.is_threat = true;
    let mut agents = vec![threat];

    for step in 0..50 {
        let ctx = StepContext {
            occluder: &scene,
            points: &points,
            steering: &steering,
            policy: &policy,
            probe_height: 1.0,
            now: step as f64 * 0.1,
            dt: 0.1,
        };
        advance_agents(&mut agents, &ctx, &mut rng);
        let p = agents[0].position;
        assert_eq!(p.x, 0.0);
        assert!(p.z < -0.05);
    }
    assert!(agents[0].position.z > -0.2);
}

#[test]
fn crowded_agents_spread_apart() {
    let scene = SceneGeometry::default();
    let points = ValidPoints::default();
    let steering = SteeringConfig::default();
    let policy = quiet_policy();
    let mut rng = ChaCha8Rng::seed_from_u64(3);

    let mut agents = vec![
        Person::new(
            "01".into(),
            DVec3::ZERO,
            DVec3::new(0.0, 0.0, 40.0),
            LocomotionClass::Road,
            1.0,
        ),
        Person::new(
            "02".into(),
            DVec3::new(0.5, 0.0, 0.0),
            DVec3::new(0.5, 0.0, 40.0),
            LocomotionClass::Road,
            1.0,
        ),
    ];

    for step in 0..20 {
        let ctx = StepContext {
            occluder: &scene,
            points: &points,
            steering: &steering,
            policy: &policy,
            probe_height: 1.0,
            now: step as f64 * 0.1,
            dt: 0.1,
        };
        advance_agents(&mut agents, &ctx, &mut rng);
    }

    assert!(horizontal_distance(agents[0].position, agents[1].position) > 1.0);
    assert!(agents[0].position.x < 0.0);
    assert!(agents[1].position.x > 0.5);
    assert!(agents.iter().all(|a| a.position.z > 0.5));
}

const STRIP: &str = r#"
meta:
  version: "1.0"
  name: strip
sim:
  dt_s: 0.1
  t_max_s: 30.0
  seed: 11
  agent_count: 5
policy:
  escalation_probability: 0.0
site:
  name: strip
  roads:
    - id: r1
      start: { x: -20.0, y: 0.0 }
      end: { x: 20.0, y: 0.0 }
      width: 4.0
"#;

#[test]
fn designated_agent_becomes_threat_after_warmup() {
    let mut engine = SimulationEngine::new(ScenarioConfig::from_yaml_str(STRIP).unwrap(), 0);
    engine.initialize().unwrap();

    for _ in 0..50 {
        let report = engine.step();
        assert!(report.escalated.is_empty());
    }
    assert_eq!(threat_count(engine.agents()), 0);

    let mut escalated = Vec::new();
    for _ in 0..10 {
        escalated.extend(engine.step().escalated);
    }
    assert_eq!(escalated, vec!["01".to_string()]);
    assert_eq!(threat_count(engine.agents()), 1);
    assert!(engine.agents().iter().find(|a| a.id == "01").unwrap().is_threat);
}

#[test]
fn agents_stay_on_their_class_points() {
    let mut engine = SimulationEngine::new(ScenarioConfig::from_yaml_str(STRIP).unwrap(), 0);
    engine.initialize().unwrap();

    for _ in 0..200 {
        engine.step();
        for agent in engine.agents() {
            assert_eq!(agent.locomotion_class, LocomotionClass::Road);
            assert!(
                engine
                    .world()
                    .points
                    .of_class(agent.locomotion_class)
                    .any(|p| p.position == agent.target)
            );
        }
    }
}
