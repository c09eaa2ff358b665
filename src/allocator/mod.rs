//! Budget allocation — weights, share limits, and the planning pipeline.
//!
//! Pipelines forecast weighting → share limit enforcement → cent-exact
//! amount rounding, per spend class, and keeps a complete decision log
//! including every channel that was capped or dropped and why.

pub mod limits;
pub mod weights;

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::config::BudgetConfig;
use crate::types::{Allocation, Channel, ChannelForecast, SpendClass};
use limits::{BudgetGuard, DropReason, LimitsConfig};
use weights::{class_weights, ChannelWeight};

// ---------------------------------------------------------------------------
// Class budgets
// ---------------------------------------------------------------------------

/// Configured budget limit per spend class.
#[derive(Debug, Clone)]
pub struct ClassBudgets {
    pub advertising: Decimal,
    pub organic: Decimal,
}

impl ClassBudgets {
    pub fn for_class(&self, class: SpendClass) -> Decimal {
        match class {
            SpendClass::Advertising => self.advertising,
            SpendClass::Organic => self.organic,
        }
    }
}

// ---------------------------------------------------------------------------
// Decision log
// ---------------------------------------------------------------------------

/// Record of every allocation decision made (or declined) during a
/// planning pass. Kept for analysis and transparency — including the
/// channels that were passed over and the reason why.
#[derive(Debug, Clone)]
pub enum PlanRecord {
    /// Channel funded.
    Allocated {
        allocation: Allocation,
        /// Whether the max-share cap bound this channel.
        capped: bool,
    },
    /// Channel excluded from funding.
    Dropped {
        channel: Channel,
        class: SpendClass,
        reason: DropReason,
    },
}

/// Complete output of a planning pass.
#[derive(Debug, Clone, Default)]
pub struct AllocationPlan {
    pub allocations: Vec<Allocation>,
    pub records: Vec<PlanRecord>,
    /// Budget left unspent per class (cap-bound or no fundable channels).
    pub unspent: Vec<(SpendClass, Decimal)>,
}

impl AllocationPlan {
    /// Total allocated across all classes.
    pub fn total(&self) -> Decimal {
        self.allocations.iter().map(|a| a.amount).sum()
    }

    /// Total allocated within one class.
    pub fn class_total(&self, class: SpendClass) -> Decimal {
        self.allocations
            .iter()
            .filter(|a| a.class == class)
            .map(|a| a.amount)
            .sum()
    }

    /// Unspent budget for one class (zero if fully spent).
    pub fn class_unspent(&self, class: SpendClass) -> Decimal {
        self.unspent
            .iter()
            .find(|(c, _)| *c == class)
            .map(|(_, d)| *d)
            .unwrap_or(Decimal::ZERO)
    }
}

// ---------------------------------------------------------------------------
// Planner
// ---------------------------------------------------------------------------

/// Plans per-channel budgets from model forecasts.
pub struct AllocationPlanner {
    guard: BudgetGuard,
    budgets: ClassBudgets,
}

impl AllocationPlanner {
    pub fn new(limits: LimitsConfig, budgets: ClassBudgets) -> Self {
        Self {
            guard: BudgetGuard::new(limits),
            budgets,
        }
    }

    /// Build a planner from the budget section of the app config.
    pub fn from_config(cfg: &BudgetConfig) -> anyhow::Result<Self> {
        let to_decimal = |v: f64, name: &str| {
            Decimal::from_f64(v).ok_or_else(|| anyhow::anyhow!("budget.{name} is not representable"))
        };
        Ok(Self::new(
            LimitsConfig {
                min_share: cfg.min_share,
                max_share: cfg.max_share,
                min_allocation: to_decimal(cfg.min_allocation, "min_allocation")?,
            },
            ClassBudgets {
                advertising: to_decimal(cfg.advertising_limit, "advertising_limit")?,
                organic: to_decimal(cfg.organic_limit, "organic_limit")?,
            },
        ))
    }

    /// Run the full planning pipeline over all spend classes.
    pub fn plan(&self, forecasts: &[ChannelForecast]) -> AllocationPlan {
        let mut plan = AllocationPlan::default();

        for &class in SpendClass::ALL {
            self.plan_class(class, forecasts, &mut plan);
        }

        info!(
            allocations = plan.allocations.len(),
            total = %plan.total(),
            dropped = plan
                .records
                .iter()
                .filter(|r| matches!(r, PlanRecord::Dropped { .. }))
                .count(),
            "Allocation plan complete"
        );

        plan
    }

    fn plan_class(&self, class: SpendClass, forecasts: &[ChannelForecast], plan: &mut AllocationPlan) {
        let budget = self.budgets.for_class(class);
        let mut working: Vec<ChannelWeight> = class_weights(forecasts, class);

        if working.is_empty() {
            if budget > Decimal::ZERO {
                debug!(%class, %budget, "No forecast channels in class — budget unspent");
                plan.unspent.push((class, budget));
            }
            return;
        }

        if budget <= Decimal::ZERO {
            debug!(%class, "Class budget is zero — nothing to allocate");
            return;
        }

        // Re-resolve shares whenever a channel falls below the minimum
        // allocation; each pass removes at least one channel, so the loop
        // is bounded by the channel count.
        let max_passes = working.len() + 1;
        for _ in 0..max_passes {
            let outcome = self.guard.resolve_shares(&working);

            if outcome.shares.is_empty() {
                warn!(%class, %budget, "No fundable channels remain — budget unspent");
                for (channel, reason) in outcome.dropped {
                    plan.records.push(PlanRecord::Dropped { channel, class, reason });
                }
                plan.unspent.push((class, budget));
                return;
            }

            let amounts: Vec<Decimal> = outcome
                .shares
                .iter()
                .map(|s| {
                    (budget * Decimal::from_f64(s.share).unwrap_or(Decimal::ZERO)).round_dp(2)
                })
                .collect();

            // A rounded amount below the floor sends that channel out of
            // the working set and restarts share resolution.
            let min_allocation = self.guard.config().min_allocation;
            if let Some(pos) = amounts.iter().position(|a| *a < min_allocation) {
                let victim = outcome.shares[pos].channel;
                debug!(
                    channel = %victim,
                    amount = %amounts[pos],
                    floor = %min_allocation,
                    "Allocation below floor — dropping channel"
                );
                plan.records.push(PlanRecord::Dropped {
                    channel: victim,
                    class,
                    reason: DropReason::BelowMinAllocation { amount: amounts[pos] },
                });
                working.retain(|w| w.channel != victim);
                if working.is_empty() {
                    plan.unspent.push((class, budget));
                    return;
                }
                continue;
            }

            // Shares settled — record drops, fix rounding drift, emit.
            for (channel, reason) in outcome.dropped {
                plan.records.push(PlanRecord::Dropped { channel, class, reason });
            }

            let unspent = (budget
                * Decimal::from_f64(outcome.unallocated_share).unwrap_or(Decimal::ZERO))
            .round_dp(2);
            let target = budget - unspent;

            let mut amounts = amounts;
            let drift = target - amounts.iter().copied().sum::<Decimal>();
            if drift != Decimal::ZERO {
                // Largest-remainder correction: the biggest allocation
                // absorbs the cent drift so the class sums exactly.
                if let Some(largest) = (0..amounts.len()).max_by_key(|&i| amounts[i]) {
                    amounts[largest] += drift;
                }
            }

            for (share, amount) in outcome.shares.iter().zip(amounts) {
                let allocation = Allocation {
                    channel: share.channel,
                    class,
                    amount,
                    share: share.share,
                    predicted_revenue: share.predicted_revenue,
                };
                debug!(%allocation, "Channel funded");
                plan.records.push(PlanRecord::Allocated {
                    allocation: allocation.clone(),
                    capped: share.capped,
                });
                plan.allocations.push(allocation);
            }

            if unspent > Decimal::ZERO {
                warn!(%class, %unspent, "Share caps left part of the class budget unspent");
                plan.unspent.push((class, unspent));
            }
            return;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn forecast(channel: Channel, predicted: f64) -> ChannelForecast {
        ChannelForecast {
            channel,
            predicted_revenue: predicted,
            observed_clicks: 100,
            observed_revenue: predicted,
            samples: 1,
        }
    }

    fn planner(advertising: Decimal, organic: Decimal) -> AllocationPlanner {
        AllocationPlanner::new(
            LimitsConfig {
                min_share: 0.0,
                max_share: 1.0,
                min_allocation: Decimal::ZERO,
            },
            ClassBudgets {
                advertising,
                organic,
            },
        )
    }

    #[test]
    fn test_plan_spends_both_class_budgets_exactly() {
        let p = planner(dec!(1000), dec!(500));
        let plan = p.plan(&[
            forecast(Channel::Search, 500.0),
            forecast(Channel::Social, 700.0),
            forecast(Channel::Email, 400.0),
            forecast(Channel::Referral, 600.0),
        ]);

        assert_eq!(plan.class_total(SpendClass::Advertising), dec!(1000));
        assert_eq!(plan.class_total(SpendClass::Organic), dec!(500));
        assert_eq!(plan.total(), dec!(1500));
        assert!(plan.unspent.is_empty());
    }

    #[test]
    fn test_plan_allocates_proportionally() {
        let p = planner(dec!(1000), dec!(0));
        let plan = p.plan(&[
            forecast(Channel::Search, 300.0),
            forecast(Channel::Social, 100.0),
        ]);

        let search = plan
            .allocations
            .iter()
            .find(|a| a.channel == Channel::Search)
            .unwrap();
        assert_eq!(search.amount, dec!(750));
        assert!((search.share - 0.75).abs() < 1e-10);
    }

    #[test]
    fn test_rounding_drift_absorbed_by_largest() {
        // Three equal channels × $100 → 33.33 + 33.33 + 33.34
        let p = planner(dec!(100), dec!(0));
        let plan = p.plan(&[
            forecast(Channel::Search, 10.0),
            forecast(Channel::Social, 10.0),
            forecast(Channel::Display, 10.0),
        ]);
        assert_eq!(plan.class_total(SpendClass::Advertising), dec!(100));
        let mut amounts: Vec<Decimal> = plan.allocations.iter().map(|a| a.amount).collect();
        amounts.sort();
        assert_eq!(amounts, vec![dec!(33.33), dec!(33.33), dec!(33.34)]);
    }

    #[test]
    fn test_min_allocation_drops_and_redistributes() {
        let p = AllocationPlanner::new(
            LimitsConfig {
                min_share: 0.0,
                max_share: 1.0,
                min_allocation: dec!(50),
            },
            ClassBudgets {
                advertising: dec!(1000),
                organic: Decimal::ZERO,
            },
        );
        // Display gets 2% → $20 < $50 floor → dropped, budget redistributed.
        let plan = p.plan(&[
            forecast(Channel::Search, 490.0),
            forecast(Channel::Social, 490.0),
            forecast(Channel::Display, 20.0),
        ]);

        assert_eq!(plan.allocations.len(), 2);
        assert!(plan
            .records
            .iter()
            .any(|r| matches!(r, PlanRecord::Dropped { channel: Channel::Display, .. })));
        assert_eq!(plan.class_total(SpendClass::Advertising), dec!(1000));
    }

    #[test]
    fn test_caps_leave_unspent_budget() {
        let p = AllocationPlanner::new(
            LimitsConfig {
                min_share: 0.0,
                max_share: 0.40,
                min_allocation: Decimal::ZERO,
            },
            ClassBudgets {
                advertising: dec!(1000),
                organic: Decimal::ZERO,
            },
        );
        let plan = p.plan(&[
            forecast(Channel::Search, 500.0),
            forecast(Channel::Social, 500.0),
        ]);

        assert_eq!(plan.class_total(SpendClass::Advertising), dec!(800));
        assert_eq!(plan.class_unspent(SpendClass::Advertising), dec!(200));
        assert!(plan
            .records
            .iter()
            .all(|r| matches!(r, PlanRecord::Allocated { capped: true, .. })));
    }

    #[test]
    fn test_empty_class_budget_goes_unspent() {
        let p = planner(dec!(1000), dec!(500));
        // Only advertising channels forecast — organic budget unspent.
        let plan = p.plan(&[forecast(Channel::Search, 100.0)]);
        assert_eq!(plan.class_unspent(SpendClass::Organic), dec!(500));
        assert_eq!(plan.class_total(SpendClass::Advertising), dec!(1000));
    }

    #[test]
    fn test_no_forecasts_all_unspent() {
        let p = planner(dec!(1000), dec!(500));
        let plan = p.plan(&[]);
        assert!(plan.allocations.is_empty());
        assert_eq!(plan.class_unspent(SpendClass::Advertising), dec!(1000));
        assert_eq!(plan.class_unspent(SpendClass::Organic), dec!(500));
    }

    #[test]
    fn test_every_channel_appears_in_decision_log() {
        let p = AllocationPlanner::new(
            LimitsConfig {
                min_share: 0.10,
                max_share: 0.60,
                min_allocation: dec!(10),
            },
            ClassBudgets {
                advertising: dec!(1000),
                organic: dec!(500),
            },
        );
        let forecasts = vec![
            forecast(Channel::Search, 900.0),
            forecast(Channel::Social, 50.0),
            forecast(Channel::Email, 400.0),
            forecast(Channel::Referral, 600.0),
        ];
        let plan = p.plan(&forecasts);

        for f in &forecasts {
            let mentions = plan
                .records
                .iter()
                .filter(|r| match r {
                    PlanRecord::Allocated { allocation, .. } => allocation.channel == f.channel,
                    PlanRecord::Dropped { channel, .. } => *channel == f.channel,
                })
                .count();
            assert_eq!(mentions, 1, "channel {} should appear exactly once", f.channel);
        }
    }

    #[test]
    fn test_from_config() {
        let cfg = BudgetConfig {
            advertising_limit: 1000.0,
            organic_limit: 500.0,
            min_share: 0.05,
            max_share: 0.60,
            min_allocation: 10.0,
        };
        let p = AllocationPlanner::from_config(&cfg).unwrap();
        assert_eq!(p.budgets.advertising, dec!(1000));
        assert_eq!(p.budgets.organic, dec!(500));
        assert_eq!(p.guard.config().min_allocation, dec!(10));
    }
}
