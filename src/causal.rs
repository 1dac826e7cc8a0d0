use std::io::Read;
use std::path::Path;

use anyhow::Context;
use serde::Serialize;

/// Columns checked for a relationship with sales, in reporting order.
pub const FACTOR_COLUMNS: [&str; 6] = [
    "price",
    "marketing",
    "promo",
    "holiday",
    "weather",
    "competitor",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactorCorrelation {
    pub factor: String,
    /// Absolute Pearson correlation with sales, in `[0, 1]`.
    pub correlation: f64,
}

fn factor_label(column: &str) -> String {
    column
        .split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn numeric(cell: Option<&str>) -> Option<f64> {
    cell.and_then(|value| value.parse::<f64>().ok())
        .filter(|value| value.is_finite())
}

/// Pearson correlation over paired samples; 0.0 when undefined.
pub fn pearson(pairs: &[(f64, f64)]) -> f64 {
    if pairs.len() < 2 {
        return 0.0;
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;

    let mut covariance = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        covariance += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denominator = (var_x * var_y).sqrt();
    if denominator == 0.0 || !denominator.is_finite() {
        return 0.0;
    }
    covariance / denominator
}

/// Correlates each known factor column with the `y` (or `sales`) column.
///
/// Headers match case-insensitively after trimming. A row only counts toward
/// a factor when both its factor cell and its sales cell are numbers.
pub fn read_factor_correlations<R: Read>(reader: R) -> anyhow::Result<Vec<FactorCorrelation>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);
    let headers: Vec<String> = reader
        .headers()
        .context("csv has no header row")?
        .iter()
        .map(|header| header.to_ascii_lowercase())
        .collect();

    let position = |name: &str| headers.iter().position(|header| header == name);
    let sales_index = position("y")
        .or_else(|| position("sales"))
        .context("csv needs a 'y' or 'sales' column to correlate against")?;
    let factors: Vec<(&str, usize)> = FACTOR_COLUMNS
        .iter()
        .filter_map(|name| position(name).map(|index| (*name, index)))
        .collect();

    let mut samples: Vec<Vec<(f64, f64)>> = vec![Vec::new(); factors.len()];
    for (row_index, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("csv row {row_index} is malformed"))?;
        let Some(sales) = numeric(record.get(sales_index)) else {
            continue;
        };
        for ((_, column), pairs) in factors.iter().zip(samples.iter_mut()) {
            if let Some(value) = numeric(record.get(*column)) {
                pairs.push((value, sales));
            }
        }
    }

    let mut correlations: Vec<FactorCorrelation> = factors
        .iter()
        .zip(samples.iter())
        .map(|((name, _), pairs)| FactorCorrelation {
            factor: factor_label(name),
            correlation: pearson(pairs).abs(),
        })
        .collect();
    correlations.sort_by(|a, b| b.correlation.total_cmp(&a.correlation));

    tracing::debug!(factors = correlations.len(), "computed factor correlations");
    Ok(correlations)
}

pub fn load_factor_correlations(path: &Path) -> anyhow::Result<Vec<FactorCorrelation>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open csv {}", path.display()))?;
    read_factor_correlations(file)
}
