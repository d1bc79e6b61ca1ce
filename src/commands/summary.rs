use anyhow::{anyhow, Result};
use std::path::Path;

use crate::models::StrawTable;
use crate::storage::load_straw_info;
use crate::utils::{format_coefficients, truncate_string};

pub fn summarize(straw_info: &str, format: &str, failed_only: bool) -> Result<()> {
    let table = load_straw_info(Path::new(straw_info))?;

    match format {
        "json" => output_json(&table, failed_only)?,
        "table" => output_table(&table, failed_only),
        other => return Err(anyhow!("Invalid format: {}. Use table or json", other)),
    }

    Ok(())
}

fn output_table(table: &StrawTable, failed_only: bool) {
    println!(
        "{:<8} {:<6} {:<8} {:<7} {:<60} {:<30}",
        "Straw", "Good", "Hits", "Peaks", "Coefficients (c0..c4)", "Failure"
    );
    println!("{:-<124}", "");

    for (i, straw) in table.iter() {
        if failed_only && straw.good_straw {
            continue;
        }
        let failure = straw
            .failure
            .as_ref()
            .map(|f| f.describe())
            .unwrap_or_default();
        println!(
            "{:<8} {:<6} {:<8} {:<7} {:<60} {:<30}",
            i,
            if straw.good_straw { "Yes" } else { "No" },
            straw.measured_hits_count,
            straw.measured_peaks.len(),
            truncate_string(&format_coefficients(&straw.calibration_parameters), 60),
            truncate_string(&failure, 30)
        );
    }

    println!(
        "\nTotal: {} straws, {} good",
        table.len(),
        table.good_count()
    );
    for (category, count) in table.failure_counts() {
        println!("  {:<20} {}", category.display_name(), count);
    }
    let fallbacks = table.refinement_fallback_count();
    if fallbacks > 0 {
        println!("Gaussian refinement fell back to raw peaks on {} straws", fallbacks);
    }
}

fn output_json(table: &StrawTable, failed_only: bool) -> Result<()> {
    let straws: Vec<serde_json::Value> = table
        .iter()
        .filter(|(_, s)| !(failed_only && s.good_straw))
        .map(|(i, s)| {
            serde_json::json!({
                "straw": i,
                "goodStraw": s.good_straw,
                "measuredHitsCount": s.measured_hits_count,
                "peaks": s.measured_peaks.len(),
                "calibrationParameters": s.calibration_parameters,
                "failure": s.failure.as_ref().map(|f| f.describe()),
                "category": s.failure.as_ref().map(|f| f.category().display_name()),
                "refinementFallbacks": s.refinement_fallbacks,
            })
        })
        .collect();

    let totals: serde_json::Map<String, serde_json::Value> = table
        .failure_counts()
        .into_iter()
        .map(|(category, count)| (category.display_name().to_string(), count.into()))
        .collect();

    let summary = serde_json::json!({
        "total": table.len(),
        "good": table.good_count(),
        "failures": totals,
        "refinementFallbacks": table.refinement_fallback_count(),
        "straws": straws,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
