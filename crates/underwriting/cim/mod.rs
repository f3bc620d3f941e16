//! CIM analysis: figure extraction, heuristic rating, memo parsing and projections.

pub mod extract;
pub mod projection;
pub mod prompt;
pub mod rating;
pub mod sections;

use serde::Serialize;

use self::{
    extract::{CimFigures, combine, extract_figures},
    projection::{CimProjection, ProjectionAssumptions, build_projection},
    rating::{CimRating, rate_cim},
    sections::{MemoSection, parse_sections, strip_rating_json},
};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CimReport {
    pub rating: CimRating,
    pub figures: CimFigures,
    pub sections: Vec<MemoSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projection: Option<CimProjection>,
}

/// Rates the CIM, pulls headline figures and splits the memo. A projection is
/// only produced when a price can be found.
pub fn build_report(
    input_text: &str,
    model_output: Option<&str>,
    assumptions: &ProjectionAssumptions,
) -> CimReport {
    let memo = model_output.map(strip_rating_json);
    let combined = combine(input_text, memo.as_deref());

    let figures = extract_figures(&combined);
    let projection = figures
        .price
        .map(|price| build_projection(price, figures.revenue, figures.sde, assumptions));

    CimReport {
        rating: rate_cim(input_text, memo.as_deref()),
        sections: memo.as_deref().map(parse_sections).unwrap_or_default(),
        figures,
        projection,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_includes_projection_when_price_found() {
        let report = build_report(
            "Asking price: $1,200,000. TTM revenue $2.4M. SDE: $400,000.",
            Some("## Executive Summary\nStable route business."),
            &ProjectionAssumptions::default(),
        );

        assert_eq!(report.figures.price, Some(1_200_000.0));
        assert_eq!(report.figures.sde, Some(400_000.0));
        assert_eq!(report.sections[0].title, "Executive Summary");
        assert_eq!(report.projection.map(|p| p.rows.len()), Some(5));
    }

    #[test]
    fn report_without_price_skips_projection() {
        let assumptions = ProjectionAssumptions::default();
        let report = build_report("A bakery with loyal customers.", None, &assumptions);
        assert!(report.projection.is_none());
        assert!(report.sections.is_empty());
    }
}
