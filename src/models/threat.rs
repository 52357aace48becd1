use rand::Rng;
use tracing::{info, warn};

use crate::models::person::Person;
use crate::scenario::ThreatPolicyConfig;

/// 現在の脅威数
pub fn threat_count(agents: &[Person]) -> usize {
    agents.iter().filter(|p| p.is_threat).count()
}

/// 脅威割り当てポリシーを1 tick 分適用
///
/// - 脅威がゼロかつウォームアップ経過後: 指定エージェント（なければ先頭）を強制的に脅威化
/// - それ以外: 非脅威エージェントが確率的に脅威化（同時最大数まで）
///
/// 新たに脅威化したエージェントIDを返します。
pub fn apply_threat_policy<R: Rng + ?Sized>(
    agents: &mut [Person],
    now: f64,
    policy: &ThreatPolicyConfig,
    rng: &mut R,
) -> Vec<String> {
    let mut escalated = Vec::new();
    if agents.is_empty() {
        return escalated;
    }

    let mut active = threat_count(agents);

    if active == 0 && now > policy.warmup_s {
        let index = policy
            .forced_agent_id
            .as_deref()
            .and_then(|id| agents.iter().position(|p| p.id == id))
            .unwrap_or(0);
        let forced = &mut agents[index];
        forced.is_threat = true;
        warn!(agent = %forced.id, time = now, "脅威不在のため強制的に脅威化");
        escalated.push(forced.id.clone());
        return escalated;
    }

    if policy.escalation_probability <= 0.0 {
        return escalated;
    }

    for agent in agents.iter_mut().filter(|p| !p.is_threat) {
        if active >= policy.max_concurrent_threats {
            break;
        }
        if rng.gen_bool(policy.escalation_probability) {
            agent.is_threat = true;
            active += 1;
            info!(agent = %agent.id, time = now, "エージェントが脅威化");
            escalated.push(agent.id.clone());
        }
    }

    escalated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::common::LocomotionClass;
    use glam::DVec3;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn crowd(n: usize) -> Vec<Person> {
        (1..=n)
            .map(|i| {
                let id = format!("{:02}", i);
                Person::new(id, DVec3::ZERO, DVec3::ZERO, LocomotionClass::Road, 1.0)
            })
            .collect()
    }

    fn quiet_policy() -> ThreatPolicyConfig {
        ThreatPolicyConfig {
            escalation_probability: 0.0,
            ..ThreatPolicyConfig::default()
        }
    }

    #[test]
    fn test_no_forcing_during_warmup() {
        let mut agents = crowd(4);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let out = apply_threat_policy(&mut agents, 4.9, &quiet_policy(), &mut rng);
        assert!(out.is_empty());
        assert_eq!(threat_count(&agents), 0);
    }

    #[test]
    fn test_forces_designated_agent_after_warmup() {
        let mut agents = crowd(4);
        agents.swap(0, 2);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let out = apply_threat_policy(&mut agents, 5.1, &quiet_policy(), &mut rng);
        assert_eq!(out, vec!["01".to_string()]);
        assert_eq!(threat_count(&agents), 1);
        assert!(agents.iter().find(|p| p.id == "01").unwrap().is_threat);
    }

    #[test]
    fn test_forcing_falls_back_to_first_agent() {
        let mut agents = crowd(3);
        let policy = ThreatPolicyConfig {
            forced_agent_id: Some("99".into()),
            ..quiet_policy()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let out = apply_threat_policy(&mut agents, 6.0, &policy, &mut rng);
        assert_eq!(out, vec!["01".to_string()]);
    }

    #[test]
    fn test_random_escalation_is_capped() {
        let mut agents = crowd(20);
        let policy = ThreatPolicyConfig {
            escalation_probability: 1.0,
            ..ThreatPolicyConfig::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        for step in 0..10 {
            apply_threat_policy(&mut agents, step as f64, &policy, &mut rng);
            assert!(threat_count(&agents) <= 3);
        }
        assert_eq!(threat_count(&agents), 3);
    }

    #[test]
    fn test_empty_crowd_is_noop() {
        let mut agents: Vec<Person> = Vec::new();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let policy = ThreatPolicyConfig::default();
        assert!(apply_threat_policy(&mut agents, 100.0, &policy, &mut rng).is_empty());
    }
}
