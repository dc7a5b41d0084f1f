use serde::{Deserialize, Serialize};

use crate::error::{DataError, Result};

/// Dashboard parameters. Every field has a default, so a config file only
/// needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub days: i64,
    pub traffic_days: i64,
    /// Analytics period (last N days of the traffic table).
    pub period_days: i64,
    pub sales_goal: f64,
    pub revenue_goal: f64,
    pub top_n: usize,
    pub rolling_window: usize,
    pub recent_days: usize,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            days: 30,
            traffic_days: 90,
            period_days: 30,
            sales_goal: 2000.0,
            revenue_goal: 80000.0,
            top_n: 5,
            rolling_window: 7,
            recent_days: 7,
        }
    }
}

impl DashboardConfig {
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.days < 0 || self.traffic_days < 0 || self.period_days < 0 {
            return Err(DataError::InvalidParameter(
                "day counts must be >= 0".to_string(),
            ));
        }
        if self.period_days > self.traffic_days {
            return Err(DataError::InvalidParameter(format!(
                "period of {} days exceeds the {} days of traffic",
                self.period_days, self.traffic_days
            )));
        }
        if self.rolling_window == 0 {
            return Err(DataError::InvalidParameter(
                "rolling_window must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = DashboardConfig::from_json(r#"{ "days": 14, "top_n": 3 }"#).unwrap();
        assert_eq!(config.days, 14);
        assert_eq!(config.top_n, 3);
        assert_eq!(config.traffic_days, 90);
        assert_eq!(config.sales_goal, 2000.0);
    }

    #[test]
    fn defaults_validate() {
        assert!(DashboardConfig::default().validate().is_ok());
    }

    #[test]
    fn period_must_fit_in_traffic() {
        let config = DashboardConfig {
            period_days: 120,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(DataError::InvalidParameter(_))
        ));
    }
}
