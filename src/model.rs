use serde::{Deserialize, Serialize};

/// A listed product as the store returns it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Product {
    pub id: String,
    pub name: String,
    /// Short public code, matched exactly (upper-case) by search
    pub shortcode: String,
    pub url: String,
    pub merchant_id: String,
    /// Serialized JSON array of tag ids, e.g. `["t1","t2"]`
    pub tags: String,
    pub interactions: f64,
    pub interactions_weekly: f64,
    pub interactions_daily: f64,
    pub created: String,
    pub updated: String,
}

impl Product {
    /// Tag ids in list order. An unparsable list means no tags.
    pub fn tag_ids(&self) -> Vec<String> {
        serde_json::from_str(&self.tags).unwrap_or_default()
    }
}

/// The three counter horizons of one product.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CounterRow {
    pub id: String,
    pub interactions: f64,
    pub interactions_weekly: f64,
    pub interactions_daily: f64,
}

/// Absolute overwrite of some counters. `None` leaves the column alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CounterUpdate {
    pub interactions: Option<f64>,
    pub interactions_weekly: Option<f64>,
    pub interactions_daily: Option<f64>,
}

impl CounterUpdate {
    pub fn is_empty(&self) -> bool {
        self.interactions.is_none()
            && self.interactions_weekly.is_none()
            && self.interactions_daily.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: String,
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Merchant {
    pub id: String,
    pub name: String,
    pub affiliate: bool,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderField {
    // Store contract; no listing orders by lifetime yet
    #[allow(dead_code)]
    Interactions,
    InteractionsDaily,
    Created,
}

impl OrderField {
    pub fn column(self) -> &'static str {
        match self {
            OrderField::Interactions => "interactions",
            OrderField::InteractionsDaily => "interactions_daily",
            OrderField::Created => "created",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    // Store contract; every current listing is newest/highest first
    #[allow(dead_code)]
    Asc,
    Desc,
}

impl Direction {
    pub fn keyword(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// Ranking views offered to the listing pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RankCriteria {
    Top,
    New,
    Default,
}

impl RankCriteria {
    pub fn parse(s: &str) -> Self {
        match s {
            "top" => RankCriteria::Top,
            "new" => RankCriteria::New,
            _ => RankCriteria::Default,
        }
    }

    pub fn ordering(self) -> (OrderField, Direction) {
        match self {
            RankCriteria::Top | RankCriteria::Default => {
                (OrderField::InteractionsDaily, Direction::Desc)
            }
            RankCriteria::New => (OrderField::Created, Direction::Desc),
        }
    }
}

/// Round half away from zero to `decimals` places.
pub fn round_to(n: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    (n * scale).round() / scale
}
