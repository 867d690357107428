use crate::{
    boundary::IndexerQuery,
    error::IndexerError,
    query::{
        QueryData,
        QueryKey,
        QueryShape,
        QueryVariables,
    },
    records::{
        Adventurer,
        Battle,
        Beast,
        Discovery,
        Item,
        Score,
    },
};
use color_eyre::eyre::{
    Result,
    WrapErr,
};
use reqwest::StatusCode;
use serde::{
    Deserialize,
    de::DeserializeOwned,
};

/// Indexer reached over HTTP: `POST {base}/query/{wireName}` with the query
/// variables as the JSON body.
#[derive(Clone)]
pub struct HttpIndexer {
    base_url: String,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct RankResponse {
    rank: Option<u32>,
}

impl HttpIndexer {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .build()
            .wrap_err("failed to build HTTP client for indexer")?;
        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn query_url(&self, key: QueryKey) -> String {
        format!("{}/query/{}", self.base_url, key.wire_name())
    }

    async fn fetch(
        &self,
        key: QueryKey,
        variables: &QueryVariables,
    ) -> Result<QueryData, IndexerError> {
        let res = self
            .http
            .post(self.query_url(key))
            .json(variables)
            .send()
            .await
            .map_err(|err| IndexerError::Transport(err.to_string()))?;
        let status = res.status();
        let bytes = res
            .bytes()
            .await
            .map_err(|err| IndexerError::Transport(err.to_string()))?;
        if status == StatusCode::NOT_FOUND {
            return Ok(QueryData::empty(key.shape()));
        }
        if !status.is_success() {
            return Err(IndexerError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        decode_query_data(key, &bytes)
    }
}

fn decode<T: DeserializeOwned>(key: QueryKey, bytes: &[u8]) -> Result<T, IndexerError> {
    serde_json::from_slice(bytes).map_err(|err| IndexerError::Decode {
        key,
        reason: err.to_string(),
    })
}

/// Decodes a response body into the shape registered for `key`.
pub fn decode_query_data(key: QueryKey, bytes: &[u8]) -> Result<QueryData, IndexerError> {
    let data = match key.shape() {
        QueryShape::Adventurers => QueryData::Adventurers(decode::<Vec<Adventurer>>(key, bytes)?),
        QueryShape::Battles => QueryData::Battles(decode::<Vec<Battle>>(key, bytes)?),
        QueryShape::Beasts => QueryData::Beasts(decode::<Vec<Beast>>(key, bytes)?),
        QueryShape::Discoveries => QueryData::Discoveries(decode::<Vec<Discovery>>(key, bytes)?),
        QueryShape::Items => QueryData::Items(decode::<Vec<Item>>(key, bytes)?),
        QueryShape::Scores => QueryData::Scores(decode::<Vec<Score>>(key, bytes)?),
        QueryShape::Rank => QueryData::Rank(decode::<RankResponse>(key, bytes)?.rank),
    };
    Ok(data)
}

impl IndexerQuery for HttpIndexer {
    async fn query(
        &self,
        key: QueryKey,
        variables: &QueryVariables,
    ) -> Result<QueryData, IndexerError> {
        self.fetch(key, variables).await
    }
}
