use rand::Rng;
use serde::{
    Deserialize,
    Serialize,
};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnimationKey {
    Attack1,
    Attack2,
    Attack3,
    HitByBeast,
    Dead,
    Flee,
    Ambush,
    DiscoverBeast,
    HitByObstacle,
    AvoidObstacle1,
    AvoidObstacle2,
    DiscoverItem,
    IdleDamagePenalty,
    IdleDamagePenaltyDead,
    Multicall,
    Upgrade,
    PurchaseItem,
    Damage,
}

const ATTACKS: [AnimationKey; 3] = [
    AnimationKey::Attack1,
    AnimationKey::Attack2,
    AnimationKey::Attack3,
];

const AVOID_OBSTACLE: [AnimationKey; 2] = [
    AnimationKey::AvoidObstacle1,
    AnimationKey::AvoidObstacle2,
];

impl AnimationKey {
    pub fn as_str(self) -> &'static str {
        match self {
            AnimationKey::Attack1 => "attack1",
            AnimationKey::Attack2 => "attack2",
            AnimationKey::Attack3 => "attack3",
            AnimationKey::HitByBeast => "hitByBeast",
            AnimationKey::Dead => "dead",
            AnimationKey::Flee => "flee",
            AnimationKey::Ambush => "ambush",
            AnimationKey::DiscoverBeast => "discoverBeast",
            AnimationKey::HitByObstacle => "hitByObstacle",
            AnimationKey::AvoidObstacle1 => "avoidObstacle1",
            AnimationKey::AvoidObstacle2 => "avoidObstacle2",
            AnimationKey::DiscoverItem => "discoverItem",
            AnimationKey::IdleDamagePenalty => "idleDamagePenalty",
            AnimationKey::IdleDamagePenaltyDead => "idleDamagePenaltyDead",
            AnimationKey::Multicall => "multicall",
            AnimationKey::Upgrade => "upgrade",
            AnimationKey::PurchaseItem => "purchaseItem",
            AnimationKey::Damage => "damage",
        }
    }

    pub fn random_attack(rng: &mut impl Rng) -> Self {
        ATTACKS[rng.random_range(0..ATTACKS.len())]
    }

    pub fn random_avoid_obstacle(rng: &mut impl Rng) -> Self {
        AVOID_OBSTACLE[rng.random_range(0..AVOID_OBSTACLE.len())]
    }

    pub fn is_attack(self) -> bool {
        ATTACKS.contains(&self)
    }
}

impl fmt::Display for AnimationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
