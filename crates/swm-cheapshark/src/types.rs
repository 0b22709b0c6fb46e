//! Response shapes for the `CheapShark` `games` endpoint.
//!
//! Only the fields the mapper reads are modelled; everything else is ignored.
//! `CheapShark` returns most numbers as strings, so prices stay `String` here
//! and are parsed by the client.

use serde::{Deserialize, Deserializer};

/// One candidate from `GET /games?steamAppID={id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct GameSearchEntry {
    #[serde(rename = "gameID", deserialize_with = "string_or_number")]
    pub game_id: String,
    #[serde(rename = "steamAppID", default)]
    pub steam_app_id: Option<String>,
    #[serde(default)]
    pub external: Option<String>,
    #[serde(default)]
    pub thumb: Option<String>,
}

/// Body of `GET /games?id={gameID}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameDetails {
    #[serde(default)]
    pub info: Option<GameInfo>,
    #[serde(default)]
    pub cheapest_price_ever: Option<CheapestPrice>,
    #[serde(default)]
    pub deals: Vec<Deal>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GameInfo {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub thumb: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheapestPrice {
    #[serde(default)]
    pub price: Option<String>,
    /// Unix seconds.
    #[serde(default)]
    pub date: Option<i64>,
    #[serde(default)]
    pub store: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Deal {
    #[serde(rename = "storeID", default)]
    pub store_id: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_entry_accepts_string_and_numeric_ids() {
        let entries: Vec<GameSearchEntry> = serde_json::from_str(
            r#"[
                {"gameID":"612","steamAppID":"21000","cheapest":"3.99","external":"LEGO Batman","thumb":"https://img/612.jpg"},
                {"gameID":613,"steamAppID":null}
            ]"#,
        )
        .expect("search body should parse");

        assert_eq!(entries[0].game_id, "612");
        assert_eq!(entries[0].thumb.as_deref(), Some("https://img/612.jpg"));
        assert_eq!(entries[1].game_id, "613");
        assert!(entries[1].steam_app_id.is_none());
    }

    #[test]
    fn details_tolerate_missing_sections() {
        let details: GameDetails = serde_json::from_str("{}").expect("empty object should parse");
        assert!(details.info.is_none());
        assert!(details.cheapest_price_ever.is_none());
        assert!(details.deals.is_empty());
    }
}
