use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use heart_common::audit::{new_case_id, AuditRecord, AuditStore, NewAuditRecord};
use heart_common::export::audit_csv;
use heart_common::openai::{AssistantClient, OpenAiClientError};
use heart_common::polling::{poll_run, Clock, PollPolicy, RunState, TokioClock};

use crate::assess::{assess_reply, assessment_prompt, chat_reply, logged_response};
use crate::error::AppError;
use crate::model::{
    AssessRequest, AssessResponse, ChatRequest, ChatResponse, HealthResponse,
    LogAssessmentRequest, LogAssessmentResponse,
};

const NO_STORE: &str = "no-store, no-cache, must-revalidate, proxy-revalidate";

/// Request-handling context shared by every route.
pub struct HeartServer<C = TokioClock> {
    assistant: Arc<AssistantClient>,
    assistant_id: Arc<str>,
    audit: Arc<AuditStore>,
    poll: PollPolicy,
    clock: Arc<C>,
}

impl<C> Clone for HeartServer<C> {
    fn clone(&self) -> Self {
        Self {
            assistant: Arc::clone(&self.assistant),
            assistant_id: Arc::clone(&self.assistant_id),
            audit: Arc::clone(&self.audit),
            poll: self.poll,
            clock: Arc::clone(&self.clock),
        }
    }
}

impl HeartServer<TokioClock> {
    pub fn new(
        assistant: Arc<AssistantClient>,
        assistant_id: &str,
        audit: Arc<AuditStore>,
        poll: PollPolicy,
    ) -> Self {
        Self::with_clock(assistant, assistant_id, audit, poll, TokioClock)
    }
}

impl<C: Clock + 'static> HeartServer<C> {
    pub fn with_clock(
        assistant: Arc<AssistantClient>,
        assistant_id: &str,
        audit: Arc<AuditStore>,
        poll: PollPolicy,
        clock: C,
    ) -> Self {
        Self {
            assistant,
            assistant_id: Arc::from(assistant_id),
            audit,
            poll,
            clock: Arc::new(clock),
        }
    }

    pub fn router(self) -> Router {
        Router::new()
            .route("/health", get(health))
            .route("/chat", post(chat::<C>))
            .route("/api/assess-echo", post(assess_echo::<C>))
            .route("/api/log-assessment", post(log_assessment::<C>))
            .route("/api/audit-logs", get(audit_logs::<C>))
            .route("/api/audit-logs/csv", get(audit_logs_csv::<C>))
            .layer(TraceLayer::new_for_http())
            .with_state(self)
    }

    /// Send one user message on a fresh thread and wait for the assistant's reply.
    async fn ask_assistant(&self, content: &str) -> Result<String, AppError> {
        let thread_id = self.assistant.create_thread().await?;
        self.assistant.add_user_message(&thread_id, content).await?;
        let run = self
            .assistant
            .create_run(&thread_id, &self.assistant_id)
            .await?;

        let outcome = poll_run(self.clock.as_ref(), self.poll, || async {
            let current = self.assistant.retrieve_run(&thread_id, &run.id).await?;
            Ok::<_, OpenAiClientError>(RunState::from_status(
                &current.status,
                current.failure_reason(),
            ))
        })
        .await?;

        if outcome != RunState::Completed {
            warn!(thread_id = %thread_id, run_id = %run.id, outcome = %outcome, "assistant run did not complete");
            return Err(AppError::Run(outcome));
        }

        let reply = self.assistant.latest_assistant_text(&thread_id).await?;
        info!(thread_id = %thread_id, run_id = %run.id, reply_len = reply.len(), "assistant replied");
        Ok(reply)
    }
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

async fn chat<C: Clock + 'static>(
    State(server): State<HeartServer<C>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let message = request.message.trim();
    if message.is_empty() {
        return Err(AppError::BadRequest("message must not be empty".to_string()));
    }
    let reply = server.ask_assistant(message).await?;
    Ok(Json(ChatResponse {
        response: chat_reply(&reply),
    }))
}

async fn assess_echo<C: Clock + 'static>(
    State(server): State<HeartServer<C>>,
    Json(request): Json<AssessRequest>,
) -> Result<impl IntoResponse, AppError> {
    let clinical_context = request.clinical_context.trim().to_string();
    let clinical_question = request.clinical_question.trim().to_string();
    if clinical_context.is_empty() || clinical_question.is_empty() {
        return Err(AppError::BadRequest(
            "clinicalContext and clinicalQuestion are required".to_string(),
        ));
    }

    let reply = server
        .ask_assistant(&assessment_prompt(&clinical_context, &clinical_question))
        .await?;
    let assessed = assess_reply(&reply);

    let new = NewAuditRecord {
        timestamp: None,
        clinical_context,
        clinical_question,
        response: assessed.text.clone(),
        sections: assessed.sections.clone(),
    };
    let case_id = match server.audit.record(new).await {
        Ok(record) => record.case_id,
        Err(e) => {
            warn!(error = %e, "failed to record assessment, issuing unrecorded case id");
            new_case_id()
        }
    };

    let body = AssessResponse {
        case_id,
        response: assessed.text,
        sections: assessed.sections,
    };
    Ok((
        [
            (header::CACHE_CONTROL, NO_STORE),
            (header::PRAGMA, "no-cache"),
            (header::EXPIRES, "0"),
        ],
        Json(body),
    ))
}

async fn log_assessment<C: Clock + 'static>(
    State(server): State<HeartServer<C>>,
    Json(request): Json<LogAssessmentRequest>,
) -> Result<Json<LogAssessmentResponse>, AppError> {
    let logged = logged_response(&request.ai_response);
    let record = server
        .audit
        .record(NewAuditRecord {
            timestamp: request.timestamp,
            clinical_context: request.clinical_context,
            clinical_question: request.clinical_question,
            response: logged.text,
            sections: logged.sections,
        })
        .await?;
    Ok(Json(LogAssessmentResponse {
        success: true,
        case_id: record.case_id,
    }))
}

async fn audit_logs<C: Clock + 'static>(
    State(server): State<HeartServer<C>>,
) -> Result<Json<Vec<AuditRecord>>, AppError> {
    Ok(Json(server.audit.list().await?))
}

async fn audit_logs_csv<C: Clock + 'static>(
    State(server): State<HeartServer<C>>,
) -> Result<impl IntoResponse, AppError> {
    let records = server.audit.list().await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=heart_audit_logs.csv",
            ),
        ],
        audit_csv(&records),
    ))
}
