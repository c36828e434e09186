//! Access-path selection.
//!
//! The selector sees the constraints a caller offers at plan time and decides
//! between a full scan and a scan restricted to one entity kind. The decision
//! is encoded as an opaque `idx_num` so it survives the trip through SQLite's
//! `xBestIndex`/`xFilter` pair unchanged.
//!
//! Unsupported or ambiguous constraint sets degrade to a full scan. A full scan
//! may return more rows than a filter asks for, never fewer; SQLite re-checks
//! every constraint the plan did not consume.

use tracing::debug;

use crate::cursor::GraphColumn;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConstraintOp {
    Eq,
    Other,
}

/// One constraint as offered by the caller, in the order it was offered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OfferedConstraint {
    pub column: i32,
    pub op: ConstraintOp,
    pub usable: bool,
}

impl OfferedConstraint {
    pub fn type_eq() -> Self {
        Self {
            column: GraphColumn::Type.index(),
            op: ConstraintOp::Eq,
            usable: true,
        }
    }

    fn is_type_equality(&self) -> bool {
        self.usable && self.op == ConstraintOp::Eq && self.column == GraphColumn::Type.index()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TableStats {
    pub nodes: i64,
    pub edges: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanPlan {
    FullScan,
    TypeFiltered,
}

impl ScanPlan {
    pub fn idx_num(&self) -> i32 {
        match self {
            ScanPlan::FullScan => 0,
            ScanPlan::TypeFiltered => 1,
        }
    }

    pub fn from_idx_num(idx_num: i32) -> Self {
        match idx_num {
            1 => ScanPlan::TypeFiltered,
            _ => ScanPlan::FullScan,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlanChoice {
    pub plan: ScanPlan,
    /// Index of the offered constraint the plan consumes; its value becomes
    /// the first filter argument and the caller need not re-check it.
    pub consumed: Option<usize>,
    pub estimated_cost: f64,
}

pub fn select_plan(constraints: &[OfferedConstraint], stats: &TableStats) -> PlanChoice {
    let mut candidates = constraints
        .iter()
        .enumerate()
        .filter(|(_, constraint)| constraint.is_type_equality())
        .map(|(index, _)| index);
    let first = candidates.next();
    let choice = match (first, candidates.next()) {
        (Some(index), None) => PlanChoice {
            plan: ScanPlan::TypeFiltered,
            consumed: Some(index),
            estimated_cost: (stats.nodes.max(stats.edges) + 1) as f64,
        },
        _ => PlanChoice {
            plan: ScanPlan::FullScan,
            consumed: None,
            estimated_cost: (stats.nodes + stats.edges + 1) as f64,
        },
    };
    debug!(
        plan = ?choice.plan,
        offered = constraints.len(),
        cost = choice.estimated_cost,
        "plan.select"
    );
    choice
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats() -> TableStats {
        TableStats {
            nodes: 10,
            edges: 4,
        }
    }

    #[test]
    fn test_no_constraints_is_full_scan() {
        let choice = select_plan(&[], &stats());
        assert_eq!(choice.plan, ScanPlan::FullScan);
        assert_eq!(choice.consumed, None);
        assert_eq!(choice.estimated_cost, 15.0);
    }

    #[test]
    fn test_single_type_equality_is_consumed() {
        let offered = [
            OfferedConstraint {
                column: GraphColumn::Id.index(),
                op: ConstraintOp::Other,
                usable: true,
            },
            OfferedConstraint::type_eq(),
        ];
        let choice = select_plan(&offered, &stats());
        assert_eq!(choice.plan, ScanPlan::TypeFiltered);
        assert_eq!(choice.consumed, Some(1));
        assert!(choice.estimated_cost < 15.0);
    }

    #[test]
    fn test_unusable_type_equality_is_ignored() {
        let mut offered = OfferedConstraint::type_eq();
        offered.usable = false;
        let choice = select_plan(&[offered], &stats());
        assert_eq!(choice.plan, ScanPlan::FullScan);
    }

    #[test]
    fn test_two_type_equalities_degrade_to_full_scan() {
        let offered = [OfferedConstraint::type_eq(), OfferedConstraint::type_eq()];
        let choice = select_plan(&offered, &stats());
        assert_eq!(choice.plan, ScanPlan::FullScan);
        assert_eq!(choice.consumed, None);
    }

    #[test]
    fn test_idx_num_round_trip_and_unknown_numbers() {
        for plan in [ScanPlan::FullScan, ScanPlan::TypeFiltered] {
            assert_eq!(ScanPlan::from_idx_num(plan.idx_num()), plan);
        }
        assert_eq!(ScanPlan::from_idx_num(42), ScanPlan::FullScan);
    }
}
