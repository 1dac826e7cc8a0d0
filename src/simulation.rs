use std::fmt;

use crate::models::{InventoryDay, ScenarioImpact, SimulationResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Scenario {
    #[default]
    Baseline,
    Promotion,
    Seasonal,
    Disruption,
}

impl Scenario {
    pub fn multiplier(self) -> f64 {
        match self {
            Scenario::Baseline => 1.0,
            Scenario::Promotion => 1.3,
            Scenario::Seasonal => 1.5,
            Scenario::Disruption => 0.7,
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Scenario::Baseline => "baseline",
            Scenario::Promotion => "promotion",
            Scenario::Seasonal => "seasonal",
            Scenario::Disruption => "disruption",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct SimulationParams {
    pub scenario: Scenario,
    pub stock: i64,
    pub lead_time: u32,
    pub days: u32,
    /// Flat daily demand. When set it takes priority over any forecast.
    pub mean_demand: Option<f64>,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            scenario: Scenario::Baseline,
            stock: 1000,
            lead_time: 2,
            days: 30,
            mean_demand: None,
        }
    }
}

const DEFAULT_MEAN_DEMAND: f64 = 500.0;
const ORDER_UP_TO_MARGIN: i64 = 500;

pub fn demand_series(params: &SimulationParams, forecast: Option<&[f64]>) -> Vec<i64> {
    let multiplier = params.scenario.multiplier();
    match (params.mean_demand, forecast) {
        (None, Some(values)) if !values.is_empty() => values
            .iter()
            .take(params.days as usize)
            .map(|value| ((value * multiplier) as i64).max(0))
            .collect(),
        (mean, _) => {
            let mean = mean.unwrap_or(DEFAULT_MEAN_DEMAND);
            let daily = (mean * multiplier).round().max(0.0) as i64;
            vec![daily; params.days as usize]
        }
    }
}

struct PendingOrder {
    qty: i64,
    arrival: u32,
}

/// Serves each day's demand from stock, reordering up to a fixed margin above
/// the reorder point whenever stock falls to it and nothing is in flight.
pub fn simulate(params: &SimulationParams, forecast: Option<&[f64]>) -> SimulationResult {
    let demand = demand_series(params, forecast);
    let mean = if demand.is_empty() {
        0.0
    } else {
        demand.iter().sum::<i64>() as f64 / demand.len() as f64
    };
    let reorder_point = (0.8 * mean) as i64;
    let order_up_to = reorder_point + ORDER_UP_TO_MARGIN;

    let mut stock = params.stock;
    let mut shortages = 0;
    let mut orders: Vec<PendingOrder> = Vec::new();
    let mut history = Vec::with_capacity(demand.len());

    for (day, &wanted) in demand.iter().enumerate() {
        let day = day as u32;
        let unmet = if stock >= wanted {
            stock -= wanted;
            0
        } else {
            let unmet = wanted - stock;
            stock = 0;
            unmet
        };
        shortages += unmet;

        let pending = orders.iter().any(|order| order.arrival > day);
        if stock <= reorder_point && !pending {
            let qty = order_up_to - stock;
            tracing::debug!(day, qty, "placing replenishment order");
            orders.push(PendingOrder {
                qty,
                arrival: day + params.lead_time,
            });
        }

        orders.retain(|order| {
            if order.arrival <= day {
                stock += order.qty;
                false
            } else {
                true
            }
        });

        history.push(InventoryDay {
            day,
            stock,
            demand: wanted,
            unmet,
            pending_orders: orders.len(),
        });
    }

    let total_demand: i64 = demand.iter().sum();
    let service_level = if total_demand > 0 {
        (total_demand - shortages) as f64 / total_demand as f64
    } else {
        1.0
    };
    let multiplier = params.scenario.multiplier();

    tracing::info!(
        scenario = %params.scenario,
        days = history.len(),
        shortages,
        service_level,
        "simulation finished"
    );

    SimulationResult {
        scenario: params.scenario.to_string(),
        final_stock: stock,
        shortages,
        service_level: (service_level * 10_000.0).round() / 10_000.0,
        history,
        impact: ScenarioImpact {
            demand: (multiplier * 100.0).round() as i64,
            cost: ((2.0 - multiplier) * 100.0).round() as i64,
            efficiency: (service_level * 100.0) as i64,
        },
    }
}
