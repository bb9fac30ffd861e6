use crate::aggregation::exposure::{AggregatedPortfolio, ExposureVector, PositionExposure};
use crate::core::error::Result;
use crate::core::position::{PositionId, TradeGroupId};
use crate::core::sources::Memberships;
use crate::var::{DataQualityFlag, VarResult};
use std::cell::RefCell;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Risk of one trade group, before and after netting its legs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRisk {
    /// `None` for an ungrouped position (a group of one).
    pub group: Option<TradeGroupId>,
    pub positions: Vec<PositionId>,
    /// Sum of the legs' standalone VaR.
    pub gross_var: f64,
    /// VaR of the legs' netted exposure.
    pub net_var: f64,
}

impl GroupRisk {
    pub fn hedge_effectiveness(&self) -> f64 {
        hedge_effectiveness(self.gross_var, self.net_var)
    }
}

/// Gross and net VaR of a book, with the hedge effectiveness between them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeGroupRisk {
    /// Sum of every position's standalone VaR, ignoring all netting.
    pub gross_var: f64,
    /// Sum over trade groups of the VaR of each group's netted exposure.
    pub net_var: f64,
    /// `1 − net / gross`, clamped to `[0, 1]`.
    pub hedge_effectiveness: f64,
    pub groups: Vec<GroupRisk>,
    /// Data-quality flags raised by any of the underlying VaR calculations.
    #[serde(default)]
    pub flags: Vec<DataQualityFlag>,
}

impl TradeGroupRisk {
    /// Absolute risk removed by netting inside trade groups.
    pub fn risk_reduction(&self) -> f64 {
        self.gross_var - self.net_var
    }

    pub fn group(&self, id: &TradeGroupId) -> Option<&GroupRisk> {
        self.groups.iter().find(|g| g.group.as_ref() == Some(id))
    }

    pub fn is_degraded(&self) -> bool {
        !self.flags.is_empty()
    }
}

impl fmt::Display for TradeGroupRisk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Trade Group Risk ===")?;
        writeln!(f, "Gross VaR:          {:.2}", self.gross_var)?;
        writeln!(f, "Net VaR:            {:.2}", self.net_var)?;
        writeln!(f, "Hedge effectiveness: {:.1}%", self.hedge_effectiveness * 100.0)?;
        writeln!(f, "\nGroups:")?;
        for group in &self.groups {
            let name = group
                .group
                .as_ref()
                .map(|g| g.to_string())
                .unwrap_or_else(|| "(ungrouped)".to_string());
            writeln!(
                f,
                "  {:<20} legs={:<3} gross={:>14.2} net={:>14.2} eff={:>5.1}%",
                name,
                group.positions.len(),
                group.gross_var,
                group.net_var,
                group.hedge_effectiveness() * 100.0
            )?;
        }
        if !self.flags.is_empty() {
            writeln!(f, "\nDegraded data:")?;
            for flag in &self.flags {
                writeln!(f, "  {:?}", flag)?;
            }
        }
        Ok(())
    }
}

/// `1 − net / gross` clamped to `[0, 1]`; zero when there is no gross risk.
pub fn hedge_effectiveness(gross_var: f64, net_var: f64) -> f64 {
    if !(gross_var > 0.0) {
        return 0.0;
    }
    (1.0 - net_var / gross_var).clamp(0.0, 1.0)
}

/// Computes gross and net VaR across trade groups.
pub struct TradeGroupRiskAggregator;

impl TradeGroupRiskAggregator {
    /// Evaluate `portfolio` under the given memberships.
    ///
    /// `var_of` prices one exposure vector; it is called once per position
    /// (standalone risk) and once per trade group (netted risk). A position
    /// absent from `memberships` falls back to the group declared on the
    /// position, and otherwise forms a group of one. Flags of every
    /// underlying result are collected once each.
    pub fn aggregate<F>(
        portfolio: &AggregatedPortfolio,
        memberships: &Memberships,
        var_of: F,
    ) -> Result<TradeGroupRisk>
    where
        F: Fn(&ExposureVector) -> Result<VarResult>,
    {
        let currency = portfolio.exposures.currency().clone();

        let mut grouped: BTreeMap<TradeGroupId, Vec<&PositionExposure>> = BTreeMap::new();
        let mut singletons: Vec<&PositionExposure> = Vec::new();
        for exposure in &portfolio.positions {
            let group = memberships
                .get(&exposure.position_id)
                .or(exposure.trade_group.as_ref());
            match group {
                Some(g) => grouped.entry(g.clone()).or_default().push(exposure),
                None => singletons.push(exposure),
            }
        }

        let flags: RefCell<Vec<DataQualityFlag>> = RefCell::new(Vec::new());
        let priced = |vector: &ExposureVector| -> Result<f64> {
            let result = var_of(vector)?;
            let mut seen = flags.borrow_mut();
            for flag in result.flags {
                if !seen.contains(&flag) {
                    seen.push(flag);
                }
            }
            Ok(result.var)
        };
        let standalone = |exposure: &PositionExposure| -> Result<f64> {
            let vector = ExposureVector::from_position_exposures(currency.clone(), [exposure]);
            priced(&vector)
        };

        let mut groups = Vec::with_capacity(grouped.len() + singletons.len());
        for (id, legs) in grouped {
            let gross_var = legs
                .iter()
                .map(|leg| standalone(*leg))
                .sum::<Result<f64>>()?;
            let netted = ExposureVector::from_position_exposures(currency.clone(), legs.iter().copied());
            let net_var = priced(&netted)?;
            debug!(
                "trade group {}: {} legs, gross {:.2}, net {:.2}",
                id,
                legs.len(),
                gross_var,
                net_var
            );
            groups.push(GroupRisk {
                group: Some(id),
                positions: legs.iter().map(|l| l.position_id).collect(),
                gross_var,
                net_var,
            });
        }
        for exposure in singletons {
            let var = standalone(exposure)?;
            groups.push(GroupRisk {
                group: None,
                positions: vec![exposure.position_id],
                gross_var: var,
                net_var: var,
            });
        }

        let gross_var: f64 = groups.iter().map(|g| g.gross_var).sum();
        let net_var: f64 = groups.iter().map(|g| g.net_var).sum();

        Ok(TradeGroupRisk {
            gross_var,
            net_var,
            hedge_effectiveness: hedge_effectiveness(gross_var, net_var),
            groups,
            flags: flags.into_inner(),
        })
    }
}
