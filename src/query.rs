use crate::records::{
    Adventurer,
    Battle,
    Beast,
    Discovery,
    Item,
    Score,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    collections::BTreeMap,
    fmt,
    str::FromStr,
};

/// Named indexer queries known to the client.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum QueryKey {
    AdventurerById,
    AdventurersByOwner,
    AdventurersByXp,
    AdventurerRank,
    BattlesByAdventurer,
    BattlesByTxHash,
    BattlesByBeast,
    LastBattle,
    LastBeastBattle,
    Beast,
    KilledBeasts,
    Discoveries,
    LatestDiscoveries,
    DiscoveryByTxHash,
    ItemsByAdventurer,
    LatestMarketItems,
    TopScores,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueryShape {
    Adventurers,
    Battles,
    Beasts,
    Discoveries,
    Items,
    Scores,
    Rank,
}

impl QueryKey {
    pub const COUNT: usize = 17;

    pub const ALL: [QueryKey; Self::COUNT] = [
        QueryKey::AdventurerById,
        QueryKey::AdventurersByOwner,
        QueryKey::AdventurersByXp,
        QueryKey::AdventurerRank,
        QueryKey::BattlesByAdventurer,
        QueryKey::BattlesByTxHash,
        QueryKey::BattlesByBeast,
        QueryKey::LastBattle,
        QueryKey::LastBeastBattle,
        QueryKey::Beast,
        QueryKey::KilledBeasts,
        QueryKey::Discoveries,
        QueryKey::LatestDiscoveries,
        QueryKey::DiscoveryByTxHash,
        QueryKey::ItemsByAdventurer,
        QueryKey::LatestMarketItems,
        QueryKey::TopScores,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn wire_name(self) -> &'static str {
        match self {
            QueryKey::AdventurerById => "adventurerById",
            QueryKey::AdventurersByOwner => "adventurersByOwner",
            QueryKey::AdventurersByXp => "adventurersByXp",
            QueryKey::AdventurerRank => "adventurerRank",
            QueryKey::BattlesByAdventurer => "battlesByAdventurer",
            QueryKey::BattlesByTxHash => "battlesByTxHash",
            QueryKey::BattlesByBeast => "battlesByBeast",
            QueryKey::LastBattle => "lastBattle",
            QueryKey::LastBeastBattle => "lastBeastBattle",
            QueryKey::Beast => "beast",
            QueryKey::KilledBeasts => "killedBeasts",
            QueryKey::Discoveries => "discoveries",
            QueryKey::LatestDiscoveries => "latestDiscoveries",
            QueryKey::DiscoveryByTxHash => "discoveryByTxHash",
            QueryKey::ItemsByAdventurer => "itemsByAdventurer",
            QueryKey::LatestMarketItems => "latestMarketItems",
            QueryKey::TopScores => "topScores",
        }
    }

    pub fn shape(self) -> QueryShape {
        match self {
            QueryKey::AdventurerById
            | QueryKey::AdventurersByOwner
            | QueryKey::AdventurersByXp => QueryShape::Adventurers,
            QueryKey::AdventurerRank => QueryShape::Rank,
            QueryKey::BattlesByAdventurer
            | QueryKey::BattlesByTxHash
            | QueryKey::BattlesByBeast
            | QueryKey::LastBattle
            | QueryKey::LastBeastBattle => QueryShape::Battles,
            QueryKey::Beast | QueryKey::KilledBeasts => QueryShape::Beasts,
            QueryKey::Discoveries
            | QueryKey::LatestDiscoveries
            | QueryKey::DiscoveryByTxHash => QueryShape::Discoveries,
            QueryKey::ItemsByAdventurer | QueryKey::LatestMarketItems => {
                QueryShape::Items
            }
            QueryKey::TopScores => QueryShape::Scores,
        }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for QueryKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QueryKey::ALL
            .into_iter()
            .find(|key| key.wire_name() == s)
            .ok_or_else(|| format!("unknown query key '{s}'"))
    }
}

/// Latest result of one query, typed by the key's shape.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "shape", content = "records", rename_all = "camelCase")]
pub enum QueryData {
    Adventurers(Vec<Adventurer>),
    Battles(Vec<Battle>),
    Beasts(Vec<Beast>),
    Discoveries(Vec<Discovery>),
    Items(Vec<Item>),
    Scores(Vec<Score>),
    Rank(Option<u32>),
}

impl QueryData {
    pub fn empty(shape: QueryShape) -> Self {
        match shape {
            QueryShape::Adventurers => QueryData::Adventurers(Vec::new()),
            QueryShape::Battles => QueryData::Battles(Vec::new()),
            QueryShape::Beasts => QueryData::Beasts(Vec::new()),
            QueryShape::Discoveries => QueryData::Discoveries(Vec::new()),
            QueryShape::Items => QueryData::Items(Vec::new()),
            QueryShape::Scores => QueryData::Scores(Vec::new()),
            QueryShape::Rank => QueryData::Rank(None),
        }
    }

    pub fn shape(&self) -> QueryShape {
        match self {
            QueryData::Adventurers(_) => QueryShape::Adventurers,
            QueryData::Battles(_) => QueryShape::Battles,
            QueryData::Beasts(_) => QueryShape::Beasts,
            QueryData::Discoveries(_) => QueryShape::Discoveries,
            QueryData::Items(_) => QueryShape::Items,
            QueryData::Scores(_) => QueryShape::Scores,
            QueryData::Rank(_) => QueryShape::Rank,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            QueryData::Adventurers(records) => records.len(),
            QueryData::Battles(records) => records.len(),
            QueryData::Beasts(records) => records.len(),
            QueryData::Discoveries(records) => records.len(),
            QueryData::Items(records) => records.len(),
            QueryData::Scores(records) => records.len(),
            QueryData::Rank(rank) => usize::from(rank.is_some()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn adventurers(&self) -> Option<&[Adventurer]> {
        match self {
            QueryData::Adventurers(records) => Some(records),
            _ => None,
        }
    }

    pub fn battles(&self) -> Option<&[Battle]> {
        match self {
            QueryData::Battles(records) => Some(records),
            _ => None,
        }
    }

    pub fn discoveries(&self) -> Option<&[Discovery]> {
        match self {
            QueryData::Discoveries(records) => Some(records),
            _ => None,
        }
    }
}

/// Variables sent alongside a query, e.g. `{"id": 12}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryVariables(BTreeMap<String, serde_json::Value>);

impl QueryVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: serde_json::Value) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.0.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
