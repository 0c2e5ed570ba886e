//! Closed sets of providers and queue lanes.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Backend that performs the actual generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Replicate,
    Runway,
    Luma,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::Replicate, Provider::Runway, Provider::Luma];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Replicate => "replicate",
            Provider::Runway => "runway",
            Provider::Luma => "luma",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown provider: {0}")]
pub struct UnknownProvider(pub String);

impl FromStr for Provider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "replicate" => Ok(Provider::Replicate),
            "runway" | "runwayml" => Ok(Provider::Runway),
            "luma" | "lumaai" => Ok(Provider::Luma),
            _ => Err(UnknownProvider(s.to_string())),
        }
    }
}

/// Named queue a job is placed on.
///
/// Each lane has a fixed priority in 0..=9; workers serving several lanes
/// always drain the higher priority lane first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    Replicate,
    Runway,
    Luma,
    Default,
}

impl Lane {
    pub const ALL: [Lane; 4] = [Lane::Replicate, Lane::Runway, Lane::Luma, Lane::Default];

    pub fn as_str(&self) -> &'static str {
        match self {
            Lane::Replicate => "replicate",
            Lane::Runway => "runway",
            Lane::Luma => "luma",
            Lane::Default => "default",
        }
    }

    pub fn priority(&self) -> u8 {
        match self {
            Lane::Runway => 8,
            Lane::Luma => 7,
            Lane::Replicate => 5,
            Lane::Default => 0,
        }
    }

    /// Sort lanes so the highest priority comes first.
    pub fn by_priority(lanes: &[Lane]) -> Vec<Lane> {
        let mut sorted = lanes.to_vec();
        sorted.sort_by(|a, b| b.priority().cmp(&a.priority()));
        sorted.dedup();
        sorted
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Lane {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "replicate" => Ok(Lane::Replicate),
            "runway" => Ok(Lane::Runway),
            "luma" => Ok(Lane::Luma),
            "default" => Ok(Lane::Default),
            other => Err(format!("unknown lane: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parse() {
        assert_eq!("Replicate".parse::<Provider>().unwrap(), Provider::Replicate);
        assert_eq!("runwayml".parse::<Provider>().unwrap(), Provider::Runway);
        let err = "midjourney".parse::<Provider>().unwrap_err();
        assert!(err.to_string().contains("midjourney"));
    }

    #[test]
    fn test_lane_priority_order() {
        let lanes = Lane::by_priority(&[Lane::Default, Lane::Replicate, Lane::Runway, Lane::Luma]);
        assert_eq!(lanes, vec![Lane::Runway, Lane::Luma, Lane::Replicate, Lane::Default]);
        assert!(Lane::ALL.iter().all(|l| l.priority() <= 9));
    }
}
