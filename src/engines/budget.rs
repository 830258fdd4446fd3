//! Monthly budget deviation analysis

use crate::models::Transaction;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CategoryDeviation {
    pub spent: f64,
    pub budgeted: f64,
    /// spent - budgeted; positive means overspent
    pub deviation: f64,
}

/// Month (`YYYY-MM`) → budget category → deviation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(transparent)]
pub struct BudgetReport {
    pub months: BTreeMap<String, BTreeMap<String, CategoryDeviation>>,
}

impl BudgetReport {
    pub fn get(&self, month: &str, category: &str) -> Option<&CategoryDeviation> {
        self.months.get(month)?.get(category)
    }

    /// Categories over budget, as (month, category, deviation)
    pub fn overspent(&self) -> Vec<(&str, &str, f64)> {
        self.months
            .iter()
            .flat_map(|(month, cats)| {
                cats.iter()
                    .filter(|(_, d)| d.deviation > 0.0)
                    .map(move |(cat, d)| (month.as_str(), cat.as_str(), d.deviation))
            })
            .collect()
    }
}

pub struct BudgetAnalyzer;

impl BudgetAnalyzer {
    /// Only categories named in `budget` are reported; months come from
    /// the transactions.
    pub fn analyze(transactions: &[Transaction], budget: &BTreeMap<String, f64>) -> BudgetReport {
        let mut spent: BTreeMap<String, BTreeMap<&str, f64>> = BTreeMap::new();

        for tx in transactions {
            *spent
                .entry(tx.month())
                .or_default()
                .entry(tx.category.as_str())
                .or_insert(0.0) += tx.amount;
        }

        let months = spent
            .into_iter()
            .map(|(month, by_category)| {
                let deviations = budget
                    .iter()
                    .map(|(category, budgeted)| {
                        let spent = by_category.get(category.as_str()).copied().unwrap_or(0.0);
                        (
                            category.clone(),
                            CategoryDeviation {
                                spent,
                                budgeted: *budgeted,
                                deviation: spent - budgeted,
                            },
                        )
                    })
                    .collect();
                (month, deviations)
            })
            .collect();

        BudgetReport { months }
    }
}
