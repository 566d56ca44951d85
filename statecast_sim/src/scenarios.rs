//! Fault scenarios for replication testing.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// SIM-001: Clean network with a small fixed latency
    Steady,

    /// SIM-002: 50% frame loss on every link
    Lossy,

    /// SIM-003: Latency jitter well above the tick period (reordering)
    Jitter,

    /// SIM-004: Half the consumers cut off for the middle third of the run
    Partition,

    /// SIM-005: Producer resets the simulation halfway through
    Reset,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Steady,
            ScenarioId::Lossy,
            ScenarioId::Jitter,
            ScenarioId::Partition,
            ScenarioId::Reset,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Steady => "steady",
            ScenarioId::Lossy => "lossy",
            ScenarioId::Jitter => "jitter",
            ScenarioId::Partition => "partition",
            ScenarioId::Reset => "reset",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Steady => "5ms latency, no loss: consumers trail by at most one frame",
            ScenarioId::Lossy => "50% frame loss: later frames supersede lost ones",
            ScenarioId::Jitter => {
                "20ms latency + 40ms jitter: reordered frames are dropped as stale"
            }
            ScenarioId::Partition => "half the consumers partitioned, then healed: they catch up",
            ScenarioId::Reset => "simulation reset mid-run: consumers follow the lower tick",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "steady" | "sim-001" => Ok(ScenarioId::Steady),
            "lossy" | "loss" | "sim-002" => Ok(ScenarioId::Lossy),
            "jitter" | "reorder" | "sim-003" => Ok(ScenarioId::Jitter),
            "partition" | "split" | "sim-004" => Ok(ScenarioId::Partition),
            "reset" | "sim-005" => Ok(ScenarioId::Reset),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>(), Ok(scenario));
        }
        assert_eq!("SIM-003".parse::<ScenarioId>(), Ok(ScenarioId::Jitter));
        assert!("chaos".parse::<ScenarioId>().is_err());
    }
}
