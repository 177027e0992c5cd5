use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: String,
    pub timestamp: String,
    pub agent: String,
    pub action: String,
    pub detail: String,
    pub model: Option<String>,
    /// GBP, 4 decimal places.
    pub cost: f64,
    pub tier: Option<String>,
    pub approved: bool,
    pub duration_ms: Option<u64>,
    pub channel: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostSummary {
    pub today: f64,
    pub week: f64,
    pub month: f64,
    pub today_msgs: u64,
    pub week_msgs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelCost {
    pub channel: String,
    pub cost: f64,
    pub messages: u64,
}
