use chrono::{
    DateTime,
    Utc,
};
use serde::{
    Deserialize,
    Deserializer,
    Serialize,
    Serializer,
    de,
};
use std::{
    collections::HashMap,
    fmt,
    str::FromStr,
};
use thiserror::Error;

/// 32-byte transaction hash, displayed as `0x`-prefixed lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TxHash([u8; 32]);

#[derive(Debug, Error, PartialEq)]
pub enum TxHashError {
    #[error("transaction hash has {0} hex digits, at most 64 are allowed")]
    TooLong(usize),
    #[error("transaction hash is empty")]
    Empty,
    #[error("invalid hex in transaction hash: {0}")]
    Hex(#[from] hex::FromHexError),
}

impl TxHash {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for TxHash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({self})")
    }
}

impl FromStr for TxHash {
    type Err = TxHashError;

    // Node responses drop leading zeros, so short hashes are left-padded.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        if digits.is_empty() {
            return Err(TxHashError::Empty);
        }
        if digits.len() > 64 {
            return Err(TxHashError::TooLong(digits.len()));
        }
        let padded = format!("{digits:0>64}");
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(padded, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl Serialize for TxHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TxHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxStatus {
    Received,
    Pending,
    AcceptedL2,
    AcceptedL1,
    Rejected,
}

impl TxStatus {
    pub fn is_accepted(self) -> bool {
        matches!(self, TxStatus::AcceptedL2 | TxStatus::AcceptedL1)
    }

    pub fn is_final(self) -> bool {
        self.is_accepted() || self == TxStatus::Rejected
    }
}

/// Caller-supplied description of a submitted transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub method: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl Metadata {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            description: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub hash: TxHash,
    pub metadata: Metadata,
    pub submitted_at: DateTime<Utc>,
}

/// Append-only list of submitted transactions.
///
/// Appending the same hash twice keeps both records; lookups by hash return
/// the first one unless `find_all_by_hash` is used.
#[derive(Debug, Default)]
pub struct TransactionLedger {
    records: Vec<TransactionRecord>,
    by_hash: HashMap<TxHash, Vec<usize>>,
}

impl TransactionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, hash: TxHash, metadata: Metadata) -> &TransactionRecord {
        self.append_at(hash, metadata, Utc::now())
    }

    pub fn append_at(
        &mut self,
        hash: TxHash,
        metadata: Metadata,
        submitted_at: DateTime<Utc>,
    ) -> &TransactionRecord {
        let position = self.records.len();
        self.by_hash.entry(hash).or_default().push(position);
        self.records.push(TransactionRecord {
            hash,
            metadata,
            submitted_at,
        });
        &self.records[position]
    }

    pub fn find_by_hash(&self, hash: &TxHash) -> Option<&TransactionRecord> {
        self.find_all_by_hash(hash).next()
    }

    pub fn find_all_by_hash<'a>(
        &'a self,
        hash: &TxHash,
    ) -> impl Iterator<Item = &'a TransactionRecord> + 'a {
        self.by_hash
            .get(hash)
            .into_iter()
            .flatten()
            .filter_map(|position| self.records.get(*position))
    }

    pub fn latest(&self) -> Option<&TransactionRecord> {
        self.records.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TransactionRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    fn hash(byte: u8) -> TxHash {
        TxHash::new([byte; 32])
    }

    #[test]
    fn from_str__left_pads_short_hashes() {
        // when
        let parsed: TxHash = "0x1ab".parse().unwrap();

        // then
        let mut expected = [0u8; 32];
        expected[30] = 0x01;
        expected[31] = 0xab;
        assert_eq!(parsed, TxHash::new(expected));
        assert_eq!(
            parsed.to_string(),
            "0x00000000000000000000000000000000000000000000000000000000000001ab"
        );
    }

    #[test]
    fn from_str__rejects_oversized_and_non_hex_input() {
        assert_eq!("0x".parse::<TxHash>(), Err(TxHashError::Empty));
        assert_eq!(
            "f".repeat(65).parse::<TxHash>(),
            Err(TxHashError::TooLong(65))
        );
        assert!(matches!("0xzz".parse::<TxHash>(), Err(TxHashError::Hex(_))));
    }

    #[test]
    fn append__keeps_duplicate_hashes_as_separate_records() {
        // given
        let mut ledger = TransactionLedger::new();
        ledger.append(hash(1), Metadata::new("Explore"));
        ledger.append(hash(2), Metadata::new("Attack"));

        // when
        ledger.append(hash(1), Metadata::new("Explore again"));

        // then
        assert_eq!(ledger.len(), 3);
        let methods: Vec<_> = ledger
            .find_all_by_hash(&hash(1))
            .map(|record| record.metadata.method.as_str())
            .collect();
        assert_eq!(methods, vec!["Explore", "Explore again"]);
        assert_eq!(
            ledger.find_by_hash(&hash(1)).unwrap().metadata.method,
            "Explore"
        );
    }

    #[test]
    fn find_by_hash__returns_none_for_unknown_hash() {
        // given
        let mut ledger = TransactionLedger::new();
        ledger.append(hash(1), Metadata::new("Explore"));

        // then
        assert!(ledger.find_by_hash(&hash(9)).is_none());
        assert_eq!(ledger.find_all_by_hash(&hash(9)).count(), 0);
    }

    #[test]
    fn latest__tracks_insertion_order() {
        // given
        let mut ledger = TransactionLedger::new();
        assert!(ledger.latest().is_none());

        // when
        ledger.append(hash(1), Metadata::new("Explore"));
        ledger.append(hash(2), Metadata::new("Flee"));

        // then
        assert_eq!(ledger.latest().unwrap().hash, hash(2));
        let order: Vec<_> = ledger.iter().map(|record| record.hash).collect();
        assert_eq!(order, vec![hash(1), hash(2)]);
    }

    #[test]
    fn status__is_accepted_only_for_l1_and_l2() {
        assert!(TxStatus::AcceptedL2.is_accepted());
        assert!(TxStatus::AcceptedL1.is_accepted());
        assert!(!TxStatus::Pending.is_accepted());
        assert!(TxStatus::Rejected.is_final());
        assert!(!TxStatus::Received.is_final());
        assert_eq!(
            serde_json::to_string(&TxStatus::AcceptedL2).unwrap(),
            "\"ACCEPTED_L2\""
        );
    }
}
