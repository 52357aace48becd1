use proptest::prelude::*;

use sitewatch::models::threat::threat_count;
use sitewatch::scenario::ScenarioConfig;
use sitewatch::simulation::SimulationEngine;

const SITE: &str = include_str!("../scenarios/sunset_valley.yaml");

fn engine(seed: u64, agents: usize, escalation: f64) -> SimulationEngine {
    let mut config = ScenarioConfig::from_yaml_str(SITE).unwrap();
    config.sim.seed = seed;
    config.sim.agent_count = agents;
    config.policy.escalation_probability = escalation;
    config.policy.warmup_s = 1.0;
    let mut engine = SimulationEngine::new(config, 0);
    engine.initialize().unwrap();
    engine
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn agents_never_leave_the_site(seed in any::<u64>(), agents in 1usize..12) {
        let mut engine = engine(seed, agents, 0.01);
        let limit = engine.config.steering.boundary_half_extent;
        for _ in 0..150 {
            engine.step();
            for agent in engine.agents() {
                prop_assert!(agent.position.x.abs() <= limit && agent.position.z.abs() <= limit,
                    "{} left the site at {:?}", agent.id, agent.position);
            }
        }
    }

    #[test]
    fn targets_keep_the_agent_class(seed in any::<u64>(), agents in 1usize..12) {
        let mut engine = engine(seed, agents, 0.0);
        for _ in 0..150 {
            engine.step();
            let points = &engine.world().points;
            for agent in engine.agents() {
                prop_assert!(points
                    .of_class(agent.locomotion_class)
                    .any(|p| p.position == agent.target));
            }
        }
    }

    #[test]
    fn threat_count_is_capped(seed in any::<u64>(), escalation in 0.05f64..1.0) {
        let mut engine = engine(seed, 10, escalation);
        let cap = engine.config.policy.max_concurrent_threats;
        for _ in 0..100 {
            engine.step();
            prop_assert!(threat_count(engine.agents()) <= cap);
        }
    }

    #[test]
    fn detection_log_has_one_event_per_window(seed in any::<u64>()) {
        let mut engine = engine(seed, 8, 0.0);
        let mut windows = 0;
        for _ in 0..150 {
            let before: Vec<_> = engine.agents().iter().map(|a| a.threat_detected_at).collect();
            engine.step();
            windows += engine
                .agents()
                .iter()
                .zip(&before)
                .filter(|(a, prev)| {
                    a.threat_detected_at.is_some() && a.threat_detected_at != **prev
                })
                .count();
        }
        prop_assert_eq!(engine.detection_log().len(), windows);
    }
}
