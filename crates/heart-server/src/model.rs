use heart_common::sections::SectionMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessRequest {
    #[serde(default)]
    pub clinical_context: String,
    #[serde(default)]
    pub clinical_question: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AssessResponse {
    pub case_id: String,
    pub response: String,
    pub sections: SectionMap,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogAssessmentRequest {
    #[serde(default)]
    pub clinical_context: String,
    #[serde(default)]
    pub clinical_question: String,
    #[serde(default)]
    pub ai_response: serde_json::Value,
    pub timestamp: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogAssessmentResponse {
    pub success: bool,
    pub case_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}
