//! Tunable constants the spec calls out as "configured" rather than fixed
//! protocol values (§3, §4.4). Grouped into one struct rather than the
//! teacher's free-standing `pub const`s because these genuinely vary by
//! deployment (a verifier embedded with a smaller trusted-period budget,
//! or a shorter weak-subjectivity window for a test network).

/// Runtime configuration for the sync-committee manager and executor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoreConfig {
    /// Maximum number of trusted sync-committee periods retained per chain
    /// before the oldest (excluding the very first and the latest) is
    /// evicted (§4.4 step 2).
    pub max_sync_states: usize,

    /// The weak-subjectivity period, in epochs (§4.4, GLOSSARY).
    pub weak_subjectivity_epochs: u64,

    /// Epochs per sync-committee period (protocol constant on mainnet:
    /// 256), kept configurable for test networks with shorter periods.
    pub epochs_per_sync_committee_period: u64,

    /// Slots per epoch (protocol constant on mainnet: 32).
    pub slots_per_epoch: u64,

    /// Maximum number of times a stage may mark a transient `Upstream`
    /// failure for retry before the request is abandoned (§4.6).
    pub retry_cap: u8,
}

impl CoreConfig {
    /// Sync-committee period length in slots.
    pub fn slots_per_sync_committee_period(&self) -> u64 {
        self.epochs_per_sync_committee_period * self.slots_per_epoch
    }

    /// The weak-subjectivity period expressed in sync-committee periods,
    /// rounding down (§4.4: "`target_period - highest_trusted_period`
    /// exceeds `weak_subjectivity_epochs / epochs_per_period`").
    pub fn weak_subjectivity_periods(&self) -> u64 {
        self.weak_subjectivity_epochs / self.epochs_per_sync_committee_period
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            max_sync_states: 16,
            // Mainnet weak-subjectivity period is on the order of ~256-512
            // epochs depending on validator set size; this is a conservative
            // default a deployment is expected to override from chain
            // config.
            weak_subjectivity_epochs: 256 * 8,
            epochs_per_sync_committee_period: 256,
            slots_per_epoch: 32,
            retry_cap: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_per_period_matches_mainnet() {
        let cfg = CoreConfig::default();
        assert_eq!(cfg.slots_per_sync_committee_period(), 8192);
    }

    #[test]
    fn weak_subjectivity_periods_rounds_down() {
        let mut cfg = CoreConfig::default();
        cfg.weak_subjectivity_epochs = 300;
        cfg.epochs_per_sync_committee_period = 256;
        assert_eq!(cfg.weak_subjectivity_periods(), 1);
    }
}
