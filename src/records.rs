//! Typed indexer records carried by `QueryData`.

use crate::ledger::TxHash;
use chrono::{
    DateTime,
    Utc,
};
use serde::{
    Deserialize,
    Deserializer,
    Serialize,
};

/// GraphQL leaves fields that do not apply to a record as `null`.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Attacker {
    Adventurer,
    Beast,
}

/// One strike in a fight, as stored by the indexer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Battle {
    pub adventurer_id: u64,
    pub beast: String,
    /// Health left on whichever side was struck. The indexer keeps it in this
    /// column for beast strikes too.
    #[serde(default, deserialize_with = "null_as_default")]
    pub beast_health: u16,
    #[serde(default, deserialize_with = "null_as_default")]
    pub beast_level: u16,
    #[serde(default)]
    pub beast_name_prefix: Option<String>,
    #[serde(default)]
    pub beast_name_suffix: Option<String>,
    pub attacker: Attacker,
    #[serde(default, deserialize_with = "null_as_default")]
    pub fled: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub damage_dealt: u16,
    #[serde(default, deserialize_with = "null_as_default")]
    pub damage_taken: u16,
    #[serde(default)]
    pub damage_location: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub xp_earned_adventurer: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub xp_earned_items: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub gold_earned: u32,
    // Only present when the record was built from a contract event.
    #[serde(default, deserialize_with = "null_as_default")]
    pub critical_hit: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ambushed: bool,
    #[serde(default)]
    pub tx_hash: Option<TxHash>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Battle {
    /// Beast name with its name prefixes, e.g. `Agony Bane Troll`.
    pub fn beast_name(&self) -> String {
        match (&self.beast_name_prefix, &self.beast_name_suffix) {
            (Some(prefix), Some(suffix)) => {
                format!("{prefix} {suffix} {}", self.beast)
            }
            _ => self.beast.clone(),
        }
    }

    /// Damage done by this strike's attacker.
    pub fn damage(&self) -> u16 {
        match self.attacker {
            Attacker::Adventurer => self.damage_dealt,
            Attacker::Beast => self.damage_taken,
        }
    }

    pub fn target_health(&self) -> u16 {
        self.beast_health
    }

    pub fn killed_adventurer(&self) -> bool {
        self.attacker == Attacker::Beast && self.target_health() == 0
    }

    pub fn slayed_beast(&self) -> bool {
        self.attacker == Attacker::Adventurer && self.target_health() == 0 && !self.fled
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemFind {
    Gold,
    Health,
    #[serde(rename = "XP")]
    Xp,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "discoveryType", rename_all_fields = "camelCase")]
pub enum DiscoveryKind {
    Nothing,
    Beast {
        #[serde(default, deserialize_with = "null_as_default")]
        entity: String,
        #[serde(default)]
        entity_id: Option<u64>,
        #[serde(default, deserialize_with = "null_as_default")]
        entity_level: u16,
        #[serde(default, deserialize_with = "null_as_default")]
        entity_health: u16,
        #[serde(default, deserialize_with = "null_as_default")]
        ambushed: bool,
    },
    Obstacle {
        obstacle: String,
        #[serde(default, deserialize_with = "null_as_default")]
        obstacle_level: u16,
        #[serde(default, deserialize_with = "null_as_default")]
        dodged_obstacle: bool,
        #[serde(default, deserialize_with = "null_as_default")]
        damage_taken: u16,
        #[serde(default)]
        damage_location: Option<String>,
    },
    Item {
        sub_discovery_type: ItemFind,
        #[serde(default, deserialize_with = "null_as_default")]
        output_amount: u32,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Discovery {
    pub adventurer_id: u64,
    /// Filled in when the record was joined with the adventurer's state.
    #[serde(default)]
    pub adventurer_health: Option<u16>,
    #[serde(flatten)]
    pub kind: DiscoveryKind,
    #[serde(default, deserialize_with = "null_as_default")]
    pub xp_earned_adventurer: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub xp_earned_items: u32,
    #[serde(default)]
    pub tx_hash: Option<TxHash>,
    #[serde(default)]
    pub discovery_time: Option<DateTime<Utc>>,
}

impl Discovery {
    /// Unknown health counts as alive.
    pub fn adventurer_alive(&self) -> bool {
        self.adventurer_health.is_none_or(|health| health > 0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Adventurer {
    pub id: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub owner: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub health: u16,
    #[serde(default, deserialize_with = "null_as_default")]
    pub xp: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub gold: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub level: u8,
    #[serde(default, deserialize_with = "null_as_default")]
    pub beast_health: u16,
    #[serde(default, deserialize_with = "null_as_default")]
    pub stat_upgrades: u8,
}

impl Adventurer {
    pub fn in_battle(&self) -> bool {
        self.beast_health > 0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Beast {
    pub id: u64,
    pub beast: String,
    #[serde(default)]
    pub beast_name_prefix: Option<String>,
    #[serde(default)]
    pub beast_name_suffix: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub level: u16,
    #[serde(default, deserialize_with = "null_as_default")]
    pub health: u16,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tier: u8,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub item: String,
    pub adventurer_id: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cost: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub owner: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub equipped: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub xp: u32,
    #[serde(default)]
    pub purchased_time: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Score {
    pub adventurer_id: u64,
    pub score: u64,
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn battle__decodes_indexer_rows_with_null_columns() {
        // given
        let json = r#"{
            "adventurerId": 1,
            "beast": "Troll",
            "beastHealth": 12,
            "beastLevel": 4,
            "beastNamePrefix": null,
            "beastNameSuffix": null,
            "attacker": "Adventurer",
            "fled": false,
            "damageDealt": 9,
            "damageTaken": null,
            "damageLocation": null,
            "xpEarnedAdventurer": null,
            "xpEarnedItems": null,
            "goldEarned": null,
            "txHash": "0x0abc",
            "timestamp": "2023-10-01T12:00:00Z"
        }"#;

        // when
        let battle: Battle = serde_json::from_str(json).unwrap();

        // then
        assert_eq!(battle.damage(), 9);
        assert_eq!(battle.target_health(), 12);
        assert_eq!(battle.damage_taken, 0);
        assert!(!battle.slayed_beast());
        assert_eq!(battle.tx_hash, Some("0xabc".parse().unwrap()));
    }

    #[test]
    fn battle__beast_strike_reports_damage_taken() {
        // given
        let battle: Battle = serde_json::from_str(
            r#"{"adventurerId":1,"beast":"Troll","beastHealth":0,"attacker":"Beast","damageDealt":0,"damageTaken":14}"#,
        )
        .unwrap();

        // then
        assert_eq!(battle.damage(), 14);
        assert!(battle.killed_adventurer());
    }

    #[test]
    fn discovery__decodes_flattened_discovery_type() {
        // given
        let json = r#"{
            "adventurerId": 7,
            "discoveryType": "Obstacle",
            "subDiscoveryType": null,
            "outputAmount": null,
            "obstacle": "Hidden Arrow",
            "obstacleLevel": 2,
            "dodgedObstacle": false,
            "damageTaken": 12,
            "damageLocation": "Chest",
            "entityId": null,
            "ambushed": null,
            "txHash": "0x0abc"
        }"#;

        // when
        let discovery: Discovery = serde_json::from_str(json).unwrap();

        // then
        assert_eq!(
            discovery.kind,
            DiscoveryKind::Obstacle {
                obstacle: "Hidden Arrow".to_string(),
                obstacle_level: 2,
                dodged_obstacle: false,
                damage_taken: 12,
                damage_location: Some("Chest".to_string()),
            }
        );
        assert!(discovery.adventurer_alive());
        assert_eq!(discovery.tx_hash, Some("0xabc".parse().unwrap()));
    }

    #[test]
    fn discovery__decodes_item_find_amounts() {
        // given
        let json = r#"{
            "adventurerId": 7,
            "adventurerHealth": 0,
            "discoveryType": "Item",
            "subDiscoveryType": "XP",
            "outputAmount": 3
        }"#;

        // when
        let discovery: Discovery = serde_json::from_str(json).unwrap();

        // then
        assert_eq!(
            discovery.kind,
            DiscoveryKind::Item {
                sub_discovery_type: ItemFind::Xp,
                output_amount: 3,
            }
        );
        assert!(!discovery.adventurer_alive());
    }

    #[test]
    fn beast_name__includes_prefixes_only_when_both_present() {
        // given
        let mut battle: Battle = serde_json::from_str(
            r#"{"adventurerId":1,"beast":"Troll","attacker":"Beast","damageTaken":3,"beastHealth":10}"#,
        )
        .unwrap();

        // then
        assert_eq!(battle.beast_name(), "Troll");
        battle.beast_name_prefix = Some("Agony".to_string());
        battle.beast_name_suffix = Some("Bane".to_string());
        assert_eq!(battle.beast_name(), "Agony Bane Troll");
    }
}
