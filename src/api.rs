use axum::{
    extract::{Json, Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    app_state::AppState,
    crm::{CrmError, CrmSummary, NewLead, NewTechnician, NewWorkReport, OrderFilter, OrderUpdate},
    diagnosis::{AnswerOutcome, Answers, DiagnosisError, DiagnosisReport, DiagnosisSession, Question},
    gatekeeper,
    interpreter::{self, InterpretOptions, Interpretation},
    models::{Affiliate, Backlink, Lead, Order, Payout, Technician, WorkReport},
    services::{self, LeadRef, ServiceConfig},
    ticket::{self, ExportFormat, ServiceTicket},
};

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "success": false, "error": message.into() })))
}

/// `None` para campos ausentes o en blanco.
fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

// --- Payloads y Respuestas de la API ---

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct InterpretPayload {
    text: Option<String>,
    use_nmx: Option<bool>,
    format: Option<ExportFormat>,
}

#[derive(Serialize)]
pub struct InterpretResponse {
    result: Interpretation,
    ticket: ServiceTicket,
    links: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    session_id: Uuid,
    step: String,
    question: Option<&'static Question>,
    answers: Answers,
    complete: bool,
}

#[derive(Deserialize)]
pub struct AnswerPayload {
    answer: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResponse {
    status: AnswerOutcome,
    step: String,
    recognized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    question: Option<&'static Question>,
    #[serde(skip_serializing_if = "Option::is_none")]
    diagnosis: Option<DiagnosisReport>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LeadPayload {
    name: Option<String>,
    phone: Option<String>,
    email: Option<String>,
    service: Option<String>,
    address: Option<String>,
    street: Option<String>,
    colonia: Option<String>,
    postal_code: Option<String>,
    supermanzana: Option<String>,
    description: Option<String>,
    appointment_date: Option<String>,
    appointment_time: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadResponse {
    success: bool,
    message: String,
    lead_id: Uuid,
    order_id: u64,
    urgency: String,
    next_steps: String,
    service_page: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AffiliatePayload {
    name: Option<String>,
    whatsapp: Option<String>,
    client_area: Option<String>,
    email: Option<String>,
}

#[derive(Deserialize)]
pub struct CodeQuery {
    code: Option<String>,
}

#[derive(Deserialize)]
pub struct ConversionPayload {
    code: String,
    amount: f64,
}

#[derive(Deserialize, Default)]
pub struct BacklinkPayload {
    name: Option<String>,
    website: Option<String>,
    whatsapp: Option<String>,
    email: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct NotePayload {
    note: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct ClosePayload {
    resolution: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct TechnicianPayload {
    name: Option<String>,
    phone: Option<String>,
    #[serde(default)]
    specialties: Vec<String>,
}

#[derive(Deserialize)]
pub struct AlertPayload {
    message: String,
    urgency: String,
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/interpret", post(interpret_handler))
        .route("/api/interpret/export", post(export_handler))
        .route("/api/diagnosis", post(start_diagnosis_handler))
        .route(
            "/api/diagnosis/:id",
            get(diagnosis_status_handler).delete(close_diagnosis_handler),
        )
        .route("/api/diagnosis/:id/answer", post(answer_handler))
        .route("/api/diagnosis/:id/reset", post(reset_diagnosis_handler))
        .route("/api/leads", post(submit_lead_handler).get(list_leads_handler))
        .route("/api/leads/:id/notes", post(lead_note_handler))
        .route("/api/leads/:id/close", post(close_lead_handler))
        .route("/api/orders", get(list_orders_handler))
        .route("/api/orders/:id", get(get_order_handler).put(update_order_handler))
        .route("/api/orders/:id/speech", get(order_speech_handler))
        .route(
            "/api/orders/:id/report",
            post(submit_report_handler).get(get_report_handler),
        )
        .route(
            "/api/technicians",
            post(register_technician_handler).get(list_technicians_handler),
        )
        .route("/api/voice/alert", post(alert_handler))
        .route(
            "/api/affiliates",
            post(register_affiliate_handler).get(get_affiliate_handler),
        )
        .route("/api/affiliates/conversions", post(conversion_handler))
        .route("/api/affiliates/:code/payout", post(payout_handler))
        .route("/api/backlinks", post(register_backlink_handler))
        .route("/api/backlinks/click", get(backlink_click_handler))
        .route("/api/backlinks/:code/verify", post(verify_backlink_handler))
        .route("/api/glossary", get(glossary_handler))
        .route("/api/services", get(services_handler))
        .route("/api/reports/summary", get(summary_handler))
        .route("/api/shutdown", post(shutdown_handler))
        .with_state(app_state)
}

// --- Handlers ---

#[axum::debug_handler]
async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "Su Servilleta CRM en línea",
        "addr": state.config.server_addr,
        "glossaryEntries": state.glossary.len(),
    }))
}

fn interpret(state: &AppState, payload: &InterpretPayload) -> Interpretation {
    let options = InterpretOptions {
        use_nmx: payload.use_nmx.unwrap_or(state.config.use_nmx),
    };
    interpreter::translate_to_technician(
        &state.glossary,
        payload.text.as_deref().unwrap_or_default(),
        options,
    )
}

#[axum::debug_handler]
async fn interpret_handler(
    State(state): State<AppState>,
    Json(payload): Json<InterpretPayload>,
) -> Json<InterpretResponse> {
    let result = interpret(&state, &payload);
    let links = interpreter::extract_links(payload.text.as_deref().unwrap_or_default());
    let ticket = ServiceTicket::from_interpretation(&result);
    Json(InterpretResponse {
        result,
        ticket,
        links,
    })
}

#[axum::debug_handler]
async fn export_handler(
    State(state): State<AppState>,
    Json(payload): Json<InterpretPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let format = payload.format.unwrap_or_default();
    let ticket = ServiceTicket::from_interpretation(&interpret(&state, &payload));
    let body = match format {
        ExportFormat::Json => ticket.to_json().map_err(|e| {
            error!("Error serializando el ticket: {}", e);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "No se pudo exportar el ticket.")
        })?,
        ExportFormat::Csv => ticket.to_csv(),
    };
    let disposition = format!("attachment; filename=\"{}\"", ticket.file_name(format));
    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}

fn session_response(id: Uuid, session: &DiagnosisSession) -> SessionResponse {
    SessionResponse {
        session_id: id,
        step: session.current_step().to_string(),
        question: session.question(),
        answers: session.answers().clone(),
        complete: session.is_complete(),
    }
}

fn session_not_found() -> ApiError {
    api_error(StatusCode::NOT_FOUND, "Sesión de diagnóstico no encontrada.")
}

#[axum::debug_handler]
async fn start_diagnosis_handler(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let id = Uuid::new_v4();
    let session = DiagnosisSession::new();
    let response = session_response(id, &session);
    let mut sessions = state.sessions();
    if sessions.insert(id, session, Utc::now()).is_err() {
        warn!("Límite de sesiones de diagnóstico alcanzado ({})", sessions.len());
        return Err(api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Demasiadas sesiones de diagnóstico activas. Intente más tarde.",
        ));
    }
    info!("Sesión de diagnóstico {} iniciada ({} activas)", id, sessions.len());
    Ok((StatusCode::CREATED, Json(response)))
}

#[axum::debug_handler]
async fn diagnosis_status_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionResponse>, ApiError> {
    let mut sessions = state.sessions();
    let session = sessions
        .touch(&id, Utc::now())
        .ok_or_else(session_not_found)?;
    Ok(Json(session_response(id, session)))
}

#[axum::debug_handler]
async fn answer_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AnswerPayload>,
) -> Result<Json<AnswerResponse>, ApiError> {
    let mut sessions = state.sessions();
    let session = sessions
        .touch(&id, Utc::now())
        .ok_or_else(session_not_found)?;

    let status = session.answer(&payload.answer).map_err(|e| match e {
        DiagnosisError::AlreadyComplete => api_error(StatusCode::CONFLICT, e.to_string()),
    })?;

    let diagnosis = session.report();
    if let (Some(report), Some(result)) = (&diagnosis, session.diagnosis()) {
        info!(
            "Diagnóstico {} completo: {} ({})",
            report.order_id, result.service, result.urgency
        );
    }
    Ok(Json(AnswerResponse {
        status,
        step: session.current_step().to_string(),
        recognized: session.last_answer_recognized(),
        question: if diagnosis.is_none() {
            session.question()
        } else {
            None
        },
        diagnosis,
    }))
}

#[axum::debug_handler]
async fn reset_diagnosis_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionResponse>, ApiError> {
    let mut sessions = state.sessions();
    let session = sessions
        .touch(&id, Utc::now())
        .ok_or_else(session_not_found)?;
    session.reset();
    Ok(Json(session_response(id, session)))
}

#[axum::debug_handler]
async fn close_diagnosis_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let removed = state.sessions().remove(&id);
    removed
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or_else(session_not_found)
}

#[axum::debug_handler]
async fn submit_lead_handler(
    State(state): State<AppState>,
    Json(payload): Json<LeadPayload>,
) -> Result<(StatusCode, Json<LeadResponse>), ApiError> {
    if gatekeeper::rejects([payload.description.as_deref(), payload.name.as_deref()]) {
        info!("Lead rechazado por el filtro: señales de bajo valor.");
        return Err((
            StatusCode::FORBIDDEN,
            Json(json!({
                "success": false,
                "error": gatekeeper::REJECTION_CODE,
                "message": gatekeeper::REJECTION_MESSAGE,
            })),
        ));
    }

    let (Some(name), Some(phone), Some(service), Some(street)) = (
        non_blank(&payload.name),
        non_blank(&payload.phone),
        non_blank(&payload.service),
        non_blank(&payload.street),
    ) else {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Faltan campos obligatorios (name, phone, service, street).",
        ));
    };

    let description = payload.description.clone().unwrap_or_default();
    let interpretation = interpreter::translate_to_technician(
        &state.glossary,
        &description,
        state.config.interpret_options(),
    );

    let new_lead = NewLead {
        name: name.to_string(),
        phone: phone.to_string(),
        email: payload.email.clone(),
        service: service.to_string(),
        street: street.to_string(),
        colonia: payload.colonia.clone(),
        postal_code: payload.postal_code.clone(),
        address: payload.address.clone(),
        supermanzana: payload.supermanzana.clone(),
        description,
        appointment_date: payload.appointment_date.clone(),
        appointment_time: payload.appointment_time.clone(),
    };
    let (lead, order) = state.crm().create_lead(new_lead, &interpretation);

    let lead_id = lead.id.to_string();
    let service_page = services::build_service_page_url(&LeadRef {
        id: Some(&lead_id),
        service: &lead.service,
        name: &lead.name,
        phone: &lead.phone,
    });

    Ok((
        StatusCode::CREATED,
        Json(LeadResponse {
            success: true,
            message: "Lead registrado correctamente".to_string(),
            lead_id: lead.id,
            order_id: order.id,
            urgency: order.urgency,
            next_steps: "Un técnico se comunicará con usted en menos de 2 horas".to_string(),
            service_page,
        }),
    ))
}

#[axum::debug_handler]
async fn list_leads_handler(State(state): State<AppState>) -> Json<Vec<Lead>> {
    let leads = state.crm().leads();
    Json(leads)
}

#[axum::debug_handler]
async fn list_orders_handler(
    State(state): State<AppState>,
    Query(filter): Query<OrderFilter>,
) -> Json<Vec<Order>> {
    let orders = state.crm().orders(&filter);
    Json(orders)
}

fn lead_not_found() -> ApiError {
    api_error(StatusCode::NOT_FOUND, "Lead no encontrado.")
}

#[axum::debug_handler]
async fn lead_note_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<NotePayload>,
) -> Result<Json<Lead>, ApiError> {
    let note = non_blank(&payload.note)
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "La nota está vacía."))?;
    let lead = state.crm().add_lead_note(id, note.to_string());
    lead.map(Json).ok_or_else(lead_not_found)
}

#[axum::debug_handler]
async fn close_lead_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ClosePayload>,
) -> Result<Json<Lead>, ApiError> {
    let resolution = non_blank(&payload.resolution).ok_or_else(|| {
        api_error(StatusCode::BAD_REQUEST, "Indique la resolución del lead.")
    })?;
    let lead = state.crm().close_lead(id, resolution.to_string());
    lead.map(Json).ok_or_else(lead_not_found)
}

fn crm_error(e: CrmError) -> ApiError {
    let status = match e {
        CrmError::OrderNotFound(_) | CrmError::TechnicianNotFound(_) => StatusCode::NOT_FOUND,
        CrmError::DuplicatePhone(_) => StatusCode::CONFLICT,
    };
    api_error(status, e.to_string())
}

#[axum::debug_handler]
async fn register_technician_handler(
    State(state): State<AppState>,
    Json(payload): Json<TechnicianPayload>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let (Some(name), Some(phone)) = (non_blank(&payload.name), non_blank(&payload.phone)) else {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Nombre y teléfono son obligatorios.",
        ));
    };
    let technician = state
        .crm()
        .register_technician(NewTechnician {
            name: name.to_string(),
            phone: phone.to_string(),
            specialties: payload.specialties,
        })
        .map_err(crm_error)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "id": technician.id, "status": "created" })),
    ))
}

#[axum::debug_handler]
async fn list_technicians_handler(State(state): State<AppState>) -> Json<Vec<Technician>> {
    let technicians = state.crm().available_technicians();
    Json(technicians)
}

#[axum::debug_handler]
async fn submit_report_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(report): Json<NewWorkReport>,
) -> Result<(StatusCode, Json<WorkReport>), ApiError> {
    let report = state
        .crm()
        .submit_work_report(id, report)
        .map_err(crm_error)?;
    Ok((StatusCode::CREATED, Json(report)))
}

#[axum::debug_handler]
async fn get_report_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<WorkReport>, ApiError> {
    let report = state.crm().work_report(id).cloned();
    report
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "La orden no tiene reporte."))
}

fn order_not_found() -> ApiError {
    api_error(StatusCode::NOT_FOUND, "Orden no encontrada.")
}

#[axum::debug_handler]
async fn get_order_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Order>, ApiError> {
    let order = state.crm().order(id).cloned();
    order.map(Json).ok_or_else(order_not_found)
}

#[axum::debug_handler]
async fn update_order_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(update): Json<OrderUpdate>,
) -> Result<Json<Order>, ApiError> {
    let order = state
        .crm()
        .update_order(id, update)
        .ok_or_else(order_not_found)?;
    info!("Orden {} actualizada: {}", order.id, order.status.as_str());
    Ok(Json(order))
}

#[axum::debug_handler]
async fn order_speech_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let crm = state.crm();
    let order = crm.order(id).ok_or_else(order_not_found)?;
    Ok(Json(json!({ "orderId": order.id, "text": ticket::order_speech(order) })))
}

#[axum::debug_handler]
async fn alert_handler(Json(payload): Json<AlertPayload>) -> Json<serde_json::Value> {
    warn!("Alerta: {} ({})", payload.message, payload.urgency);
    Json(json!({ "text": ticket::alert_speech(&payload.message, &payload.urgency) }))
}

#[axum::debug_handler]
async fn register_affiliate_handler(
    State(state): State<AppState>,
    Json(payload): Json<AffiliatePayload>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let (Some(name), Some(whatsapp)) = (non_blank(&payload.name), non_blank(&payload.whatsapp))
    else {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Nombre y WhatsApp son obligatorios.",
        ));
    };

    let affiliate = state.crm().register_affiliate(
        name.to_string(),
        whatsapp.to_string(),
        non_blank(&payload.client_area).map(str::to_string),
        non_blank(&payload.email).map(str::to_string),
    );
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Afiliado registrado correctamente",
            "code": affiliate.affiliate_code,
            "earnings": affiliate.earnings,
        })),
    ))
}

#[axum::debug_handler]
async fn get_affiliate_handler(
    State(state): State<AppState>,
    Query(query): Query<CodeQuery>,
) -> Result<Json<Affiliate>, ApiError> {
    let code = non_blank(&query.code).ok_or_else(|| {
        api_error(StatusCode::BAD_REQUEST, "Se requiere el código de afiliado.")
    })?;
    let affiliate = state.crm().affiliate(code).cloned();
    affiliate
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Afiliado no encontrado."))
}

#[axum::debug_handler]
async fn conversion_handler(
    State(state): State<AppState>,
    Json(payload): Json<ConversionPayload>,
) -> Result<Json<Affiliate>, ApiError> {
    if !payload.amount.is_finite() || payload.amount < 0.0 {
        return Err(api_error(StatusCode::BAD_REQUEST, "Monto inválido."));
    }
    let affiliate = state.crm().track_conversion(&payload.code, payload.amount);
    affiliate
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Afiliado no encontrado."))
}

#[axum::debug_handler]
async fn payout_handler(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<Payout>, ApiError> {
    let payout = state.crm().process_payout(&code);
    payout
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Afiliado no encontrado."))
}

#[axum::debug_handler]
async fn register_backlink_handler(
    State(state): State<AppState>,
    Json(payload): Json<BacklinkPayload>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let (Some(name), Some(website)) = (non_blank(&payload.name), non_blank(&payload.website))
    else {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Nombre y URL del sitio son obligatorios.",
        ));
    };
    if !services::is_valid_website(website) {
        return Err(api_error(StatusCode::BAD_REQUEST, "URL del sitio inválida."));
    }

    let backlink = state.crm().register_backlink(
        name.to_string(),
        website.to_string(),
        non_blank(&payload.whatsapp).map(str::to_string),
        non_blank(&payload.email).map(str::to_string),
    );
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Backlink registrado correctamente",
            "code": backlink.backlink_code,
            "htmlCode": backlink_html(&backlink.backlink_code),
            "instructions": "Copie el código HTML y péguelo en su sitio. Avísenos cuando esté publicado.",
        })),
    ))
}

fn backlink_html(code: &str) -> String {
    format!(
        r#"<!-- @PLOMEROCANCUN Backlink | Code: {code} -->
<div style="border: 2px solid #d4d4d4; border-radius: 8px; padding: 1.5rem; text-align: center; margin: 2rem 0; font-family: Arial, sans-serif;">
  <a href="https://plomerocancun.com.mx?from={code}&affiliate=true" style="text-decoration: none; color: inherit;">
    <p style="font-weight: bold;">🔧 PLOMERÍA PREMIUM CANCÚN</p>
    <div style="padding: 0.8rem 1.5rem; font-weight: 700;">Ver Servicios →</div>
  </a>
</div>"#
    )
}

#[axum::debug_handler]
async fn backlink_click_handler(
    State(state): State<AppState>,
    Query(query): Query<CodeQuery>,
) -> StatusCode {
    let tracked = match non_blank(&query.code) {
        Some(code) => state.crm().track_backlink_click(code),
        None => false,
    };
    if tracked {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

#[axum::debug_handler]
async fn verify_backlink_handler(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<Backlink>, ApiError> {
    let backlink = state.crm().verify_backlink(&code);
    backlink
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Backlink no encontrado."))
}

#[axum::debug_handler]
async fn glossary_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let entries: serde_json::Map<String, serde_json::Value> = state
        .glossary
        .iter()
        .map(|(key, entry)| (key.to_string(), json!(entry)))
        .collect();
    Json(serde_json::Value::Object(entries))
}

#[axum::debug_handler]
async fn services_handler() -> Json<&'static [ServiceConfig]> {
    Json(services::CATALOG)
}

#[axum::debug_handler]
async fn summary_handler(State(state): State<AppState>) -> Json<CrmSummary> {
    let summary = state.crm().summary();
    Json(summary)
}

// --- Handler de Apagado ---

#[axum::debug_handler]
async fn shutdown_handler(State(state): State<AppState>) -> impl IntoResponse {
    info!("Petición de apagado recibida.");
    if let Some(sender) = crate::app_state::lock(&state.shutdown_sender).take() {
        let _ = sender.send(());
    }
    StatusCode::OK
}
