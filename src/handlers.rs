use crate::engine::SyncStatus;
use crate::errors::AppError;
use crate::models::{DEFAULT_EMOJI, IndexQuery, Report, ReportDraft, StatsResponse};
use crate::state::AppState;
use crate::stats::build_stats;
use crate::submit::Rejection;
use crate::ui::{notice_for, render_index};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, Redirect},
    Form, Json,
};

pub async fn index(State(state): State<AppState>, Query(query): Query<IndexQuery>) -> Html<String> {
    let notice = query.notice.as_deref().and_then(notice_for);
    let reporter = query.reporter.unwrap_or_default();
    Html(render_index(
        &state.presenter.feed(),
        &state.sync.status(),
        notice.as_ref(),
        &reporter,
    ))
}

pub async fn feed(State(state): State<AppState>) -> Html<String> {
    Html(state.presenter.feed())
}

pub async fn list_reports(State(state): State<AppState>) -> Json<Vec<Report>> {
    Json(state.sync.snapshot().records().to_vec())
}

pub async fn get_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(build_stats(&state.sync.snapshot()))
}

pub async fn get_status(State(state): State<AppState>) -> Json<SyncStatus> {
    Json(state.sync.status())
}

pub async fn create_report(
    State(state): State<AppState>,
    Json(draft): Json<ReportDraft>,
) -> Result<(StatusCode, Json<Report>), AppError> {
    let report = state.submitter.submit(draft).await?;
    Ok((StatusCode::CREATED, Json(report)))
}

/// Plain form post; emoji buttons submit their emoji, the main button none.
pub async fn submit_form(
    State(state): State<AppState>,
    Form(mut draft): Form<ReportDraft>,
) -> Redirect {
    if draft.emoji.as_deref().is_none_or(|e| e.trim().is_empty()) {
        draft.emoji = Some(DEFAULT_EMOJI.to_string());
    }
    let reporter = draft.reporter.trim().to_string();

    let notice = match state.submitter.submit(draft).await {
        Ok(_) => "saved",
        Err(Rejection::MissingRequiredField(_)) => "missing",
        Err(Rejection::DuplicateDetected) => "duplicate",
        Err(Rejection::DuplicateCheckFailed(_)) => "check_failed",
        Err(Rejection::RemoteInsertFailed(_)) => "insert_failed",
    };
    Redirect::to(&notice_location(notice, &reporter))
}

fn notice_location(notice: &str, reporter: &str) -> String {
    format!(
        "/?notice={notice}&reporter={}",
        urlencoding::encode(reporter)
    )
}

pub async fn reload(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    if state.sync.reload() {
        Ok(StatusCode::ACCEPTED)
    } else {
        Err(AppError::new(StatusCode::SERVICE_UNAVAILABLE, "sync engine stopped"))
    }
}
