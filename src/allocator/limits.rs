//! Share limits enforcement.
//!
//! Applies the configured per-channel share bounds to a class's
//! normalized weights: channels below the minimum share are dropped
//! (their mass redistributed), channels above the maximum share are
//! pinned at the cap with the excess redistributed. When every
//! remaining channel is capped, the residual share stays unallocated
//! and is surfaced to the caller.

use rust_decimal::Decimal;
use std::fmt;
use tracing::debug;

use super::weights::ChannelWeight;
use crate::types::Channel;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LimitsConfig {
    /// Channels whose share falls below this are dropped.
    pub min_share: f64,
    /// No channel may receive more than this fraction of its class budget.
    pub max_share: f64,
    /// Allocations below this amount are dropped by the planner.
    pub min_allocation: Decimal,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            min_share: 0.05,
            max_share: 0.60,
            min_allocation: Decimal::TEN,
        }
    }
}

// ---------------------------------------------------------------------------
// Rejection reasons
// ---------------------------------------------------------------------------

/// Why a channel was excluded from funding.
#[derive(Debug, Clone, PartialEq)]
pub enum DropReason {
    /// Share fell below the configured minimum.
    BelowMinShare { share: f64 },
    /// Rounded amount fell below the minimum allocation.
    BelowMinAllocation { amount: Decimal },
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::BelowMinShare { share } => {
                write!(f, "share {:.1}% below minimum", share * 100.0)
            }
            DropReason::BelowMinAllocation { amount } => {
                write!(f, "amount ${amount} below minimum allocation")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Resolved shares
// ---------------------------------------------------------------------------

/// A channel's final share after limit enforcement.
#[derive(Debug, Clone)]
pub struct ResolvedShare {
    pub channel: Channel,
    pub share: f64,
    pub predicted_revenue: f64,
    /// Whether the max-share cap bound this channel.
    pub capped: bool,
}

/// Outcome of a limits pass over one spend class.
#[derive(Debug, Clone, Default)]
pub struct SharesOutcome {
    pub shares: Vec<ResolvedShare>,
    pub dropped: Vec<(Channel, DropReason)>,
    /// Share of the class budget left unallocated because every funded
    /// channel hit the cap. Zero in the common case.
    pub unallocated_share: f64,
}

// ---------------------------------------------------------------------------
// Guard
// ---------------------------------------------------------------------------

pub struct BudgetGuard {
    config: LimitsConfig,
}

impl BudgetGuard {
    pub fn new(config: LimitsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LimitsConfig {
        &self.config
    }

    /// Enforce share bounds on a class's normalized weights.
    ///
    /// Weights are assumed to sum to 1 (the `weights` module guarantees
    /// this). The returned shares sum to `1 - unallocated_share`.
    pub fn resolve_shares(&self, weights: &[ChannelWeight]) -> SharesOutcome {
        let mut outcome = SharesOutcome::default();
        if weights.is_empty() {
            return outcome;
        }

        // Drop below-minimum channels and renormalize the survivors.
        // Dropping can only raise the remaining shares, so one pass over
        // weights sorted ascending suffices.
        let mut working: Vec<ChannelWeight> = weights.to_vec();
        working.sort_by(|a, b| a.weight.partial_cmp(&b.weight).unwrap_or(std::cmp::Ordering::Equal));

        loop {
            let total: f64 = working.iter().map(|w| w.weight).sum();
            if total <= 0.0 {
                break;
            }
            let smallest = working[0].weight / total;
            if working.len() > 1 && smallest < self.config.min_share {
                let dropped = working.remove(0);
                debug!(
                    channel = %dropped.channel,
                    share = format!("{:.1}%", smallest * 100.0),
                    "Channel below minimum share — dropped"
                );
                outcome
                    .dropped
                    .push((dropped.channel, DropReason::BelowMinShare { share: smallest }));
            } else {
                break;
            }
        }

        let total: f64 = working.iter().map(|w| w.weight).sum();
        if total <= 0.0 {
            outcome.unallocated_share = 1.0;
            return outcome;
        }

        // Cap pass: pin offenders at max_share, redistribute the rest
        // proportionally. Each iteration pins at least one channel, so
        // the loop is bounded by the channel count.
        let mut pinned: Vec<(usize, f64)> = Vec::new(); // (index into working, share)
        loop {
            let pinned_mass: f64 = pinned.iter().map(|(_, s)| s).sum();
            let free: Vec<usize> = (0..working.len())
                .filter(|i| pinned.iter().all(|(p, _)| p != i))
                .collect();
            let free_weight: f64 = free.iter().map(|&i| working[i].weight).sum();
            let remaining_mass = 1.0 - pinned_mass;

            if free.is_empty() || free_weight <= 0.0 {
                break;
            }

            let mut worst: Option<(usize, f64)> = None;
            for &i in &free {
                let share = working[i].weight / free_weight * remaining_mass;
                if share > self.config.max_share {
                    match worst {
                        Some((_, s)) if s >= share => {}
                        _ => worst = Some((i, share)),
                    }
                }
            }

            match worst {
                Some((i, share)) => {
                    debug!(
                        channel = %working[i].channel,
                        share = format!("{:.1}%", share * 100.0),
                        cap = format!("{:.1}%", self.config.max_share * 100.0),
                        "Channel capped at maximum share"
                    );
                    pinned.push((i, self.config.max_share));
                }
                None => break,
            }
        }

        // Materialize final shares.
        let pinned_mass: f64 = pinned.iter().map(|(_, s)| s).sum();
        let free: Vec<usize> = (0..working.len())
            .filter(|i| pinned.iter().all(|(p, _)| p != i))
            .collect();
        let free_weight: f64 = free.iter().map(|&i| working[i].weight).sum();
        let remaining_mass = 1.0 - pinned_mass;

        for (i, w) in working.iter().enumerate() {
            let (share, capped) = match pinned.iter().find(|(p, _)| *p == i) {
                Some((_, s)) => (*s, true),
                None if free_weight > 0.0 => (w.weight / free_weight * remaining_mass, false),
                None => (0.0, false),
            };
            outcome.shares.push(ResolvedShare {
                channel: w.channel,
                share,
                predicted_revenue: w.predicted_revenue,
                capped,
            });
        }

        let allocated: f64 = outcome.shares.iter().map(|s| s.share).sum();
        outcome.unallocated_share = (1.0 - allocated).max(0.0);

        outcome.shares.sort_by_key(|s| s.channel.index());
        outcome
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn weight(channel: Channel, weight: f64) -> ChannelWeight {
        ChannelWeight {
            channel,
            weight,
            predicted_revenue: weight * 1000.0,
        }
    }

    fn guard(min_share: f64, max_share: f64) -> BudgetGuard {
        BudgetGuard::new(LimitsConfig {
            min_share,
            max_share,
            min_allocation: Decimal::ZERO,
        })
    }

    #[test]
    fn test_shares_pass_through_within_bounds() {
        let g = guard(0.05, 0.60);
        let outcome = g.resolve_shares(&[
            weight(Channel::Search, 0.55),
            weight(Channel::Social, 0.45),
        ]);
        assert!(outcome.dropped.is_empty());
        assert!(outcome.unallocated_share < 1e-12);
        let sum: f64 = outcome.shares.iter().map(|s| s.share).sum();
        assert!((sum - 1.0).abs() < 1e-10);
        assert!(outcome.shares.iter().all(|s| !s.capped));
    }

    #[test]
    fn test_below_min_share_dropped_and_redistributed() {
        let g = guard(0.10, 1.0);
        let outcome = g.resolve_shares(&[
            weight(Channel::Search, 0.95),
            weight(Channel::Social, 0.05),
        ]);
        assert_eq!(outcome.dropped.len(), 1);
        assert_eq!(outcome.dropped[0].0, Channel::Social);
        assert!(matches!(outcome.dropped[0].1, DropReason::BelowMinShare { .. }));
        assert_eq!(outcome.shares.len(), 1);
        assert!((outcome.shares[0].share - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_cap_redistributes_excess() {
        let g = guard(0.0, 0.50);
        let outcome = g.resolve_shares(&[
            weight(Channel::Search, 0.80),
            weight(Channel::Social, 0.15),
            weight(Channel::Display, 0.05),
        ]);

        let search = outcome.shares.iter().find(|s| s.channel == Channel::Search).unwrap();
        assert!((search.share - 0.50).abs() < 1e-10);
        assert!(search.capped);

        // Excess flows to the others proportionally (0.15:0.05 = 3:1)
        let social = outcome.shares.iter().find(|s| s.channel == Channel::Social).unwrap();
        let display = outcome.shares.iter().find(|s| s.channel == Channel::Display).unwrap();
        assert!((social.share - 0.375).abs() < 1e-10);
        assert!((display.share - 0.125).abs() < 1e-10);

        let sum: f64 = outcome.shares.iter().map(|s| s.share).sum();
        assert!((sum - 1.0).abs() < 1e-10);
        assert!(outcome.unallocated_share < 1e-12);
    }

    #[test]
    fn test_all_capped_leaves_unallocated_share() {
        let g = guard(0.0, 0.40);
        let outcome = g.resolve_shares(&[
            weight(Channel::Search, 0.50),
            weight(Channel::Social, 0.50),
        ]);
        assert!(outcome.shares.iter().all(|s| s.capped));
        let sum: f64 = outcome.shares.iter().map(|s| s.share).sum();
        assert!((sum - 0.80).abs() < 1e-10);
        assert!((outcome.unallocated_share - 0.20).abs() < 1e-10);
    }

    #[test]
    fn test_single_channel_capped() {
        let g = guard(0.0, 0.60);
        let outcome = g.resolve_shares(&[weight(Channel::Search, 1.0)]);
        assert_eq!(outcome.shares.len(), 1);
        assert!((outcome.shares[0].share - 0.60).abs() < 1e-10);
        assert!((outcome.unallocated_share - 0.40).abs() < 1e-10);
    }

    #[test]
    fn test_last_channel_never_dropped_by_min_share() {
        // Even a 100% share channel "below" an absurd min_share survives:
        // the drop rule only applies while siblings remain.
        let g = guard(0.99, 1.0);
        let outcome = g.resolve_shares(&[
            weight(Channel::Search, 0.5),
            weight(Channel::Social, 0.5),
        ]);
        assert_eq!(outcome.shares.len(), 1);
        assert_eq!(outcome.dropped.len(), 1);
    }

    #[test]
    fn test_empty_weights() {
        let g = guard(0.05, 0.60);
        let outcome = g.resolve_shares(&[]);
        assert!(outcome.shares.is_empty());
        assert!(outcome.dropped.is_empty());
    }

    #[test]
    fn test_drop_reason_display() {
        let r = DropReason::BelowMinShare { share: 0.031 };
        assert!(format!("{r}").contains("3.1%"));
    }
}
