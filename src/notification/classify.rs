use super::{
    AnimationKey,
    NotificationEvent,
    NotificationTimings,
    outcome::{
        BattleOutcome,
        ExploreOutcome,
        MulticallOutcome,
        Outcome,
        SubOutcome,
        UpgradeSummary,
    },
};
use crate::{
    error::ChainError,
    records::{
        Attacker,
        Battle,
        Discovery,
        DiscoveryKind,
        ItemFind,
    },
};
use itertools::Itertools;
use rand::Rng;

pub const REJECTED_MESSAGE: &str =
    "OH NO! The transaction was rejected! Please refresh and try again incase of wallet issues.";
pub const RATE_LIMITED_MESSAGE: &str =
    "Too many requests! Please wait a moment before trying again.";
pub const BLOCK_DELAY_MESSAGE: &str =
    "The network is catching up with a new block. Please wait a few seconds and try again.";
pub const INSUFFICIENT_FUNDS_MESSAGE: &str =
    "Not enough funds to pay the transaction fee. Top up your account and try again.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BattleAction {
    Attack,
    Flee,
}

struct Notice {
    message: String,
    animation: Option<AnimationKey>,
    is_error: bool,
}

impl Notice {
    fn new(message: impl Into<String>, animation: AnimationKey) -> Self {
        Self {
            message: message.into(),
            animation: Some(animation),
            is_error: false,
        }
    }

    fn plain(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            animation: None,
            is_error: false,
        }
    }

    fn error(message: impl Into<String>, animation: Option<AnimationKey>) -> Self {
        Self {
            message: message.into(),
            animation,
            is_error: true,
        }
    }

    fn into_event(self, timings: &NotificationTimings) -> NotificationEvent {
        let duration = if self.is_error {
            timings.error
        } else {
            timings.standard
        };
        NotificationEvent {
            message: self.message,
            animation: self.animation,
            duration,
            is_error: self.is_error,
        }
    }
}

/// Maps an outcome to the events to play, in order.
///
/// Always returns at least one event: anything that matches no rule is shown
/// as its raw payload with no animation.
pub fn classify(
    outcome: &Outcome,
    timings: &NotificationTimings,
    rng: &mut impl Rng,
) -> Vec<NotificationEvent> {
    let mut notices = match outcome {
        Outcome::Explore(explore) => explore_notices(explore, rng),
        Outcome::Attack(battle) => battle_notices(BattleAction::Attack, battle, rng),
        Outcome::Flee(battle) => battle_notices(BattleAction::Flee, battle, rng),
        Outcome::Multicall(multicall) => multicall_notices(multicall),
        Outcome::Upgrade(summary) => upgrade_notice(summary).into_iter().collect(),
        Outcome::Failed(err) => vec![failure_notice(err)],
        Outcome::Message(text) => vec![Notice::plain(text.clone())],
    };
    if notices.is_empty() {
        notices.push(Notice::plain(outcome.raw_text()));
    }
    notices
        .into_iter()
        .map(|notice| notice.into_event(timings))
        .collect()
}

fn explore_notices(explore: &ExploreOutcome, rng: &mut impl Rng) -> Vec<Notice> {
    explore
        .discoveries
        .iter()
        .map(|discovery| discovery_notice(discovery, rng))
        .collect()
}

fn obstacle_subject(obstacle: &str) -> String {
    if obstacle.ends_with('s') {
        obstacle.to_string()
    } else {
        format!("A {obstacle}")
    }
}

fn discovery_notice(discovery: &Discovery, rng: &mut impl Rng) -> Notice {
    let alive = discovery.adventurer_alive();
    match &discovery.kind {
        DiscoveryKind::Beast {
            entity, ambushed, ..
        } => match (ambushed, alive) {
            (true, true) => Notice::new(
                format!("YIKES! You were ambushed by a {entity}!"),
                AnimationKey::Ambush,
            ),
            (true, false) => Notice::new(
                format!("YIKES! You were killed from an ambush by a {entity}!"),
                AnimationKey::Dead,
            ),
            (false, _) => Notice::new(
                format!("OH NO! You discovered a {entity}!"),
                AnimationKey::DiscoverBeast,
            ),
        },
        DiscoveryKind::Obstacle {
            obstacle,
            dodged_obstacle,
            damage_taken,
            ..
        } => {
            if *dodged_obstacle {
                Notice::new(
                    format!("PHEW! You avoided the {obstacle} obstacle!"),
                    AnimationKey::random_avoid_obstacle(rng),
                )
            } else if alive {
                Notice::new(
                    format!(
                        "OUCH! {} inflicted {damage_taken} damage!",
                        obstacle_subject(obstacle)
                    ),
                    AnimationKey::HitByObstacle,
                )
            } else {
                Notice::new(
                    format!(
                        "OUCH! {} killed you with {damage_taken} damage!",
                        obstacle_subject(obstacle)
                    ),
                    AnimationKey::Dead,
                )
            }
        }
        DiscoveryKind::Item {
            sub_discovery_type,
            output_amount,
        } => {
            let message = match sub_discovery_type {
                ItemFind::Gold => format!("NICE! You discovered {output_amount} gold!"),
                ItemFind::Health => format!("GREAT! You discovered {output_amount} health!"),
                ItemFind::Xp => format!("NICE! You discovered {output_amount} XP!"),
            };
            Notice::new(message, AnimationKey::DiscoverItem)
        }
        DiscoveryKind::Nothing if alive => Notice::new(
            "OOPS! You were hit by the idle penalty for taking too long!",
            AnimationKey::IdleDamagePenalty,
        ),
        DiscoveryKind::Nothing => Notice::new(
            "OOPS! You were killed by the idle death penalty!",
            AnimationKey::IdleDamagePenaltyDead,
        ),
    }
}

fn battle_notices(
    action: BattleAction,
    outcome: &BattleOutcome,
    rng: &mut impl Rng,
) -> Vec<Notice> {
    outcome
        .battles
        .chunks(2)
        .map(|pair| {
            let beast = outcome
                .beast_name
                .clone()
                .or_else(|| pair.first().map(Battle::beast_name))
                .unwrap_or_default();
            match battle_pair_message(action, pair, &beast) {
                Some(message) => Notice::new(
                    annotate_critical(message, pair),
                    battle_animation(action, pair, rng),
                ),
                None => Notice::plain(
                    serde_json::to_string(pair).unwrap_or_else(|_| format!("{pair:?}")),
                ),
            }
        })
        .collect()
}

fn battle_pair_message(action: BattleAction, pair: &[Battle], beast: &str) -> Option<String> {
    let (first, counter) = match pair {
        [first] => (first, None),
        [first, counter] => (first, Some(counter)),
        _ => return None,
    };

    if pair.iter().any(|battle| battle.fled) {
        return Some(format!("You fled the {beast}!"));
    }

    if first.ambushed && first.attacker == Attacker::Beast {
        let message = if first.target_health() == 0 {
            format!(
                "You were killed by the {beast}, from an ambush taking {} damage!",
                first.damage()
            )
        } else if first.damage() > 0 {
            format!("You were ambushed by the {beast}, taking {} damage!", first.damage())
        } else {
            format!("You were ambushed by the {beast}, but avoided it!")
        };
        return Some(message);
    }

    if action == BattleAction::Flee {
        return pair
            .iter()
            .find(|battle| battle.attacker == Attacker::Beast)
            .map(|hit| {
                if hit.target_health() > 0 {
                    format!(
                        "You failed to flee the {beast} and were attacked taking {} damage!",
                        hit.damage()
                    )
                } else {
                    format!(
                        "You were killed trying to flee the {beast} taking {} damage!",
                        hit.damage()
                    )
                }
            });
    }

    match (first.attacker, counter) {
        (Attacker::Adventurer, _) if first.slayed_beast() => Some(format!(
            "You slayed the {beast} after inflicting {} damage!",
            first.damage()
        )),
        (Attacker::Adventurer, None) => Some(format!(
            "You attacked the {beast} with a mighty strike and dealt {} damage!",
            first.damage()
        )),
        (Attacker::Adventurer, Some(counter)) if counter.attacker == Attacker::Beast => {
            if counter.target_health() == 0 {
                Some(format!(
                    "You were killed by the {beast} taking {} damage!",
                    counter.damage()
                ))
            } else if counter.damage() > 0 {
                Some(format!(
                    "You attacked the {beast} with a mighty strike and dealt {} damage! They counterattacked for {} damage!",
                    first.damage(), counter.damage()
                ))
            } else {
                Some(format!(
                    "You attacked the {beast} with a mighty strike and dealt {} damage! You defended their counterattack!",
                    first.damage()
                ))
            }
        }
        _ => None,
    }
}

fn annotate_critical(message: String, pair: &[Battle]) -> String {
    let critical = pair
        .iter()
        .any(|battle| battle.attacker == Attacker::Adventurer && battle.critical_hit);
    if critical {
        format!("CRITICAL HIT! {message}")
    } else {
        message
    }
}

fn battle_animation(action: BattleAction, pair: &[Battle], rng: &mut impl Rng) -> AnimationKey {
    if pair.iter().any(Battle::killed_adventurer) {
        AnimationKey::Dead
    } else if pair.iter().any(|battle| battle.fled) {
        AnimationKey::Flee
    } else if pair
        .first()
        .is_some_and(|battle| battle.ambushed && battle.attacker == Attacker::Beast)
    {
        AnimationKey::Ambush
    } else {
        match action {
            BattleAction::Flee => AnimationKey::HitByBeast,
            BattleAction::Attack => AnimationKey::random_attack(rng),
        }
    }
}

fn multicall_notices(multicall: &MulticallOutcome) -> Vec<Notice> {
    let animation = if multicall.beast_alive {
        AnimationKey::HitByBeast
    } else {
        AnimationKey::Multicall
    };
    let counter = multicall
        .last_battle
        .as_ref()
        .filter(|battle| multicall.beast_alive && battle.attacker == Attacker::Beast);

    multicall
        .actions
        .iter()
        .map(|action| match (action, counter) {
            (SubOutcome::Equipped { .. }, Some(counter)) => equip_counter_notice(counter),
            _ => Notice::new(action.describe(), animation),
        })
        .collect()
}

fn equip_counter_notice(counter: &Battle) -> Notice {
    let beast = counter.beast_name();
    if counter.target_health() == 0 {
        Notice::new(
            "You were slaughtered by the beast after trying to equip an item!",
            AnimationKey::Dead,
        )
    } else if counter.damage() > 0 {
        Notice::new(
            format!(
                "OUCH! You were attacked by the {beast} after equipping an item taking {} damage!",
                counter.damage()
            ),
            AnimationKey::HitByBeast,
        )
    } else {
        Notice::new(
            format!("You were attacked by the {beast} after equipping an item but defended it!"),
            AnimationKey::HitByBeast,
        )
    }
}

fn upgrade_notice(summary: &UpgradeSummary) -> Option<Notice> {
    let stats = summary
        .stats
        .entries()
        .into_iter()
        .filter(|(_, amount)| *amount > 0)
        .map(|(name, amount)| format!("{name} x {amount}"))
        .join(", ");
    let mut purchases: Vec<String> = summary
        .items
        .iter()
        .map(|purchase| {
            if purchase.equip {
                format!("{} (equipped)", purchase.item)
            } else {
                purchase.item.clone()
            }
        })
        .collect();
    if summary.potions > 0 {
        purchases.push(format!("Health Potions x {}", summary.potions));
    }

    let mut parts = Vec::new();
    if !stats.is_empty() {
        parts.push(format!("Upgraded: {stats}"));
    }
    if !purchases.is_empty() {
        parts.push(format!("Purchased: {}", purchases.join(", ")));
    }
    if parts.is_empty() {
        return None;
    }
    let animation = if stats.is_empty() {
        AnimationKey::PurchaseItem
    } else {
        AnimationKey::Upgrade
    };
    Some(Notice::new(parts.join(" | "), animation))
}

fn failure_notice(err: &ChainError) -> Notice {
    match err {
        ChainError::UserRejected(_) => Notice::error(REJECTED_MESSAGE, Some(AnimationKey::Damage)),
        ChainError::RateLimited(_) => Notice::error(RATE_LIMITED_MESSAGE, None),
        ChainError::BlockDelay(_) => Notice::error(BLOCK_DELAY_MESSAGE, None),
        ChainError::InsufficientFunds(_) => Notice::error(INSUFFICIENT_FUNDS_MESSAGE, None),
        ChainError::Unknown(message) => Notice::error(message.clone(), None),
    }
}
