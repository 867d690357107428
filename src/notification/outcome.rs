use crate::{
    error::ChainError,
    records::{
        Battle,
        Discovery,
    },
};
use serde::{
    Deserialize,
    Serialize,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExploreOutcome {
    pub discoveries: Vec<Discovery>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleOutcome {
    pub battles: Vec<Battle>,
    /// Name shown in messages; falls back to the name on the battle records.
    #[serde(default)]
    pub beast_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubOutcome {
    Equipped { item: String },
    Dropped { item: String },
    Purchased { item: String },
    Slayed { beast: String },
    Text(String),
}

impl SubOutcome {
    pub fn describe(&self) -> String {
        match self {
            SubOutcome::Equipped { item } => format!("You equipped {item}!"),
            SubOutcome::Dropped { item } => format!("You dropped {item}!"),
            SubOutcome::Purchased { item } => format!("You purchased {item}!"),
            SubOutcome::Slayed { beast } => format!("You slayed the {beast}!"),
            SubOutcome::Text(text) => text.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MulticallOutcome {
    pub actions: Vec<SubOutcome>,
    pub beast_alive: bool,
    pub last_battle: Option<Battle>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatUpgrades {
    pub strength: u8,
    pub dexterity: u8,
    pub vitality: u8,
    pub intelligence: u8,
    pub wisdom: u8,
    pub charisma: u8,
}

impl StatUpgrades {
    pub fn entries(&self) -> [(&'static str, u8); 6] {
        [
            ("Strength", self.strength),
            ("Dexterity", self.dexterity),
            ("Vitality", self.vitality),
            ("Intelligence", self.intelligence),
            ("Wisdom", self.wisdom),
            ("Charisma", self.charisma),
        ]
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPurchase {
    pub item: String,
    pub equip: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeSummary {
    pub stats: StatUpgrades,
    pub items: Vec<ItemPurchase>,
    pub potions: u8,
}

/// Result of a resolved transaction, ready to be turned into notifications.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Explore(ExploreOutcome),
    Attack(BattleOutcome),
    Flee(BattleOutcome),
    Multicall(MulticallOutcome),
    Upgrade(UpgradeSummary),
    Failed(ChainError),
    Message(String),
}

impl Outcome {
    /// Payload text used when nothing more specific can be said.
    pub fn raw_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"))
    }
}
