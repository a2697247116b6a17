use crate::audit::AuditRecord;
use crate::sections::{RATIONALE, RECOMMENDATION};

const CSV_HEADER: &str =
    "Case ID,Timestamp,Clinical Context,Clinical Question,Recommendation,Rationale,Created At\n";

/// Render audit records as CSV, one quoted row per record in the given order.
pub fn audit_csv(records: &[AuditRecord]) -> String {
    let mut out = String::from(CSV_HEADER);
    for record in records {
        let created_at = record.created_at.to_rfc3339();
        let fields = [
            record.case_id.as_str(),
            record.timestamp.as_str(),
            record.clinical_context.as_str(),
            record.clinical_question.as_str(),
            section(record, RECOMMENDATION),
            section(record, RATIONALE),
            created_at.as_str(),
        ];
        let row: Vec<String> = fields.iter().map(|f| quote(f)).collect();
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

fn section<'a>(record: &'a AuditRecord, name: &str) -> &'a str {
    record.sections.get(name).map(String::as_str).unwrap_or("")
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}
