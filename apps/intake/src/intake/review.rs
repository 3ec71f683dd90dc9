use serde::Serialize;

use crate::normalize::{AnnotatedField, RecordSet};

/// Values longer than this are edited in a multi-line box.
const MULTILINE_THRESHOLD: usize = 60;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewRow {
    pub path: String,
    pub label: String,
    pub value: String,
    pub confidence: f64,
    pub low_confidence: bool,
    pub multiline: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewView {
    pub rows: Vec<ReviewRow>,
    pub low_confidence_count: usize,
}

/// Builds the rows an operator walks through. Identifier fields are hidden.
pub fn build_review(records: &RecordSet) -> ReviewView {
    let rows: Vec<ReviewRow> = records
        .iter()
        .filter(|field| !field.path.eq_ignore_ascii_case("id"))
        .map(review_row)
        .collect();
    let low_confidence_count = rows.iter().filter(|r| r.low_confidence).count();

    ReviewView {
        rows,
        low_confidence_count,
    }
}

fn review_row(field: &AnnotatedField) -> ReviewRow {
    ReviewRow {
        path: field.path.clone(),
        label: field_label(&field.path),
        value: field.value.clone(),
        confidence: field.confidence,
        low_confidence: field.is_low_confidence(),
        multiline: field.value.chars().count() > MULTILINE_THRESHOLD,
    }
}

/// `work_experience.company_name` → `work experience > company name`
pub fn field_label(path: &str) -> String {
    path.replace('_', " ").replace('.', " > ")
}
