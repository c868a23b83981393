use std::sync::{Arc, Mutex};

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::Local;
use clap::ValueEnum;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::blob::BlobStore;
use crate::db::{self, InsertOutcome, TransactionUpdate};
use crate::dedupe::dedupe_hash;
use crate::error::{BurnrateError, ErrorClass, Result};
use crate::importer::{ImportPayload, Importer};
use crate::llm::{CompletionError, HttpCompletionClient};
use crate::models::{CashSnapshot, Direction, NewTransaction, Transaction, Upload, DEFAULT_CATEGORY};
use crate::normalize::parse_date;
use crate::pdf::{AiExtractor, DirectionKeywords, PdfStrategy};
use crate::settings::Settings;
use crate::snapshot::{build_dashboard, Dashboard};

const USER_HEADER: &str = "x-user-id";
const LIST_LIMIT: usize = 100;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    db: Arc<Mutex<Connection>>,
    blobs: Arc<BlobStore>,
    /// The extractor, or the error that kept it from being built.
    ai: Arc<std::result::Result<AiExtractor<HttpCompletionClient>, CompletionError>>,
    keywords: Arc<DirectionKeywords>,
    strategy: PdfStrategy,
    max_upload_bytes: usize,
}

impl AppState {
    pub fn new(
        conn: Connection,
        blobs: BlobStore,
        ai: std::result::Result<AiExtractor<HttpCompletionClient>, CompletionError>,
        keywords: DirectionKeywords,
        strategy: PdfStrategy,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
            blobs: Arc::new(blobs),
            ai: Arc::new(ai),
            keywords: Arc::new(keywords),
            strategy,
            max_upload_bytes,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        std::fs::create_dir_all(settings.data_path())?;
        let conn = db::get_connection(&settings.db_path())?;
        db::init_db(&conn)?;
        let ai = HttpCompletionClient::from_settings(&settings.ai)
            .map(|client| AiExtractor::new(client, &settings.ai));
        if let Err(reason) = &ai {
            info!(%reason, "AI PDF extraction unavailable");
        }
        Ok(Self::new(
            conn,
            BlobStore::new(settings.uploads_dir()),
            ai,
            settings.keywords.clone(),
            settings.pdf_strategy,
            settings.server.max_upload_bytes,
        ))
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = db::lock(&self.db)?;
        f(&conn)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

pub struct ApiError(BurnrateError);

impl From<BurnrateError> for ApiError {
    fn from(e: BurnrateError) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn bad_request(message: &str) -> Self {
        Self(BurnrateError::InvalidInput(message.to_string()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.class() {
            ErrorClass::BadRequest => StatusCode::BAD_REQUEST,
            ErrorClass::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorClass::NotFound => StatusCode::NOT_FOUND,
            ErrorClass::Conflict => StatusCode::CONFLICT,
            ErrorClass::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = match &self.0 {
            BurnrateError::Storage(m) => m.clone(),
            e if status == StatusCode::INTERNAL_SERVER_ERROR => {
                error!(error = %e, "request failed");
                "Internal server error".to_string()
            }
            e => e.to_string(),
        };
        let mut body = json!({ "error": message });
        if status == StatusCode::CONFLICT {
            body["duplicate"] = Value::Bool(true);
        }
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

/// Identity is set by the fronting auth proxy.
fn user_id(headers: &HeaderMap) -> std::result::Result<String, ApiError> {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(ApiError(BurnrateError::Unauthorized))
}

fn parse_body<T: for<'de> Deserialize<'de>>(body: &Bytes) -> std::result::Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|_| ApiError::bad_request("Invalid request body"))
}

// ---------------------------------------------------------------------------
// Import
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct ImportResponse {
    success: bool,
    imported: usize,
    skipped: usize,
    total: usize,
    format: &'static str,
}

/// Multipart form with either `file` (.csv or .pdf), or `csvText` +
/// `originalFilename` from a client-side PDF conversion. `strategy` picks the
/// PDF extractor for this upload.
async fn import_bank_statement(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> ApiResult<ImportResponse> {
    let user = user_id(&headers)?;

    let mut file: Option<(String, Vec<u8>)> = None;
    let mut csv_text: Option<String> = None;
    let mut original_filename: Option<String> = None;
    let mut strategy = state.strategy;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(&format!("Failed to read form field: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or("upload.csv").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|_| ApiError::bad_request("Failed to read file data"))?;
                if bytes.len() > state.max_upload_bytes {
                    return Err(ApiError::bad_request(&format!(
                        "File too large. Maximum size is {} MB",
                        state.max_upload_bytes / 1024 / 1024
                    )));
                }
                file = Some((filename, bytes.to_vec()));
            }
            "csvText" | "originalFilename" | "strategy" => {
                let value = field
                    .text()
                    .await
                    .map_err(|_| ApiError::bad_request(&format!("Failed to read {name}")))?;
                if value.is_empty() {
                    continue;
                }
                match name.as_str() {
                    "csvText" => csv_text = Some(value),
                    "originalFilename" => original_filename = Some(value),
                    _ => {
                        strategy = PdfStrategy::from_str(&value, true)
                            .map_err(|_| ApiError::bad_request("Invalid strategy. Use ai or local"))?;
                    }
                }
            }
            _ => {}
        }
    }

    let (filename, payload) = match (csv_text, original_filename, file) {
        (Some(text), Some(name), _) => (name, ImportPayload::ConvertedCsv { text }),
        (_, _, Some((name, bytes))) => {
            let payload = ImportPayload::from_file(&name, bytes)?;
            (name, payload)
        }
        _ => return Err(ApiError::bad_request("No file provided")),
    };

    let ai = state.ai.as_ref().as_ref();
    let importer = Importer::new(&state.db, &state.blobs, ai, &state.keywords, strategy);
    let summary = importer.import(&user, &filename, payload).await?;

    Ok(Json(ImportResponse {
        success: true,
        imported: summary.imported,
        skipped: summary.skipped,
        total: summary.total,
        format: summary.format.as_str(),
    }))
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionBody {
    date: Option<String>,
    description: Option<String>,
    amount_paise: Option<i64>,
    direction: Option<String>,
    category: Option<String>,
}

fn parse_body_date(raw: &str) -> std::result::Result<chrono::NaiveDate, ApiError> {
    parse_date(raw).ok_or_else(|| ApiError::bad_request("Invalid date"))
}

fn parse_body_direction(raw: &str) -> std::result::Result<Direction, ApiError> {
    raw.parse().map_err(|e: String| ApiError::bad_request(&e))
}

async fn list_transactions(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Vec<Transaction>> {
    let user = user_id(&headers)?;
    Ok(Json(state.with_conn(|conn| db::list_transactions(conn, &user, LIST_LIMIT))?))
}

async fn create_transaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Transaction> {
    let user = user_id(&headers)?;
    let body: TransactionBody = parse_body(&body)?;
    let (Some(date), Some(description), Some(amount_paise), Some(direction)) = (
        body.date.as_deref(),
        body.description.as_deref().filter(|d| !d.trim().is_empty()),
        body.amount_paise.filter(|a| *a != 0),
        body.direction.as_deref(),
    ) else {
        return Err(ApiError::bad_request(
            "Missing required fields: date, description, amountPaise, direction",
        ));
    };
    let date = parse_body_date(date)?;
    let direction = parse_body_direction(direction)?;
    let description = description.trim().to_string();
    let category = body
        .category
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());

    let tx = NewTransaction {
        dedupe_hash: dedupe_hash(date, &description, amount_paise, direction),
        date,
        description,
        amount_paise,
        direction,
        category,
        raw_row_json: None,
        upload_id: None,
    };
    let created = state.with_conn(|conn| match db::insert_transaction(conn, &user, &tx)? {
        InsertOutcome::Inserted(id) => db::get_transaction(conn, &user, id),
        InsertOutcome::Duplicate => Err(BurnrateError::Duplicate(
            "A transaction with these details already exists".to_string(),
        )),
    })?;
    Ok(Json(created))
}

async fn clear_transactions(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Value> {
    let user = user_id(&headers)?;
    let deleted = state.with_conn(|conn| db::clear_transactions(conn, &user))?;
    info!(user = %user, deleted, "cleared transactions");
    Ok(Json(json!({ "success": true, "deleted": deleted })))
}

async fn get_transaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Transaction> {
    let user = user_id(&headers)?;
    Ok(Json(state.with_conn(|conn| db::get_transaction(conn, &user, id))?))
}

async fn update_transaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    body: Bytes,
) -> ApiResult<Transaction> {
    let user = user_id(&headers)?;
    let body: TransactionBody = parse_body(&body)?;
    let update = TransactionUpdate {
        date: body.date.as_deref().map(parse_body_date).transpose()?,
        description: body.description,
        amount_paise: body.amount_paise,
        direction: body.direction.as_deref().map(parse_body_direction).transpose()?,
        category: body.category,
    };
    Ok(Json(state.with_conn(|conn| db::update_transaction(conn, &user, id, &update))?))
}

async fn delete_transaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Value> {
    let user = user_id(&headers)?;
    state.with_conn(|conn| db::delete_transaction(conn, &user, id))?;
    Ok(Json(json!({ "success": true })))
}

// ---------------------------------------------------------------------------
// Cash, snapshot, uploads
// ---------------------------------------------------------------------------

async fn record_cash(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<CashSnapshot> {
    let user = user_id(&headers)?;
    let body: Value = parse_body(&body)?;
    let amount = body
        .get("cashOnHandPaise")
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite() && *v >= 0.0)
        .ok_or_else(|| ApiError::bad_request("Invalid amount"))?;
    let today = Local::now().date_naive();
    let snapshot = state.with_conn(|conn| {
        db::add_cash_snapshot(conn, &user, today, amount.round() as i64, "MANUAL")
    })?;
    Ok(Json(snapshot))
}

async fn snapshot(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Dashboard> {
    let user = user_id(&headers)?;
    let today = Local::now().date_naive();
    Ok(Json(state.with_conn(|conn| build_dashboard(conn, &user, today))?))
}

async fn list_uploads(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Vec<Upload>> {
    let user = user_id(&headers)?;
    Ok(Json(state.with_conn(|conn| db::list_uploads(conn, &user, LIST_LIMIT))?))
}

async fn get_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Upload> {
    let user = user_id(&headers)?;
    Ok(Json(state.with_conn(|conn| db::get_upload(conn, &user, id))?))
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes;
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/import/bank-statement", post(import_bank_statement))
        .route(
            "/transactions",
            get(list_transactions)
                .post(create_transaction)
                .delete(clear_transactions),
        )
        .route(
            "/transactions/:id",
            get(get_transaction)
                .put(update_transaction)
                .delete(delete_transaction),
        )
        .route("/cash", post(record_cash))
        .route("/snapshot", get(snapshot))
        .route("/uploads", get(list_uploads))
        .route("/uploads/:id", get(get_upload));

    Router::new()
        .nest("/api", api_routes)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: AppState, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = %listener.local_addr()?, "burnrate server listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    const CSV: &str = "date,description,debit,credit\n\
                       15-12-2024,UPI-SWIGGY-123456,450.00,\n\
                       14-12-2024,SALARY DECEMBER,,50000.00\n";

    fn test_state() -> (tempfile::TempDir, AppState) {
        let dir = tempfile::tempdir().unwrap();
        let conn = db::get_connection(&dir.path().join("test.db")).unwrap();
        db::init_db(&conn).unwrap();
        let state = AppState::new(
            conn,
            BlobStore::new(dir.path().join("uploads")),
            Err(CompletionError::MissingApiKey("PDF parsing requires an API key.".to_string())),
            DirectionKeywords::default(),
            PdfStrategy::Ai,
            10 * 1024 * 1024,
        );
        (dir, state)
    }

    fn multipart_body(parts: &[(&str, Option<&str>, &str)]) -> (String, String) {
        let boundary = "burnrate-test-boundary";
        let mut body = String::new();
        for (name, filename, content) in parts {
            body.push_str(&format!("--{boundary}\r\n"));
            match filename {
                Some(f) => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{f}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n"
                )),
                None => body.push_str(&format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n")),
            }
            body.push_str(content);
            body.push_str("\r\n");
        }
        body.push_str(&format!("--{boundary}--\r\n"));
        (format!("multipart/form-data; boundary={boundary}"), body)
    }

    fn upload_request(user: Option<&str>, parts: &[(&str, Option<&str>, &str)]) -> Request<Body> {
        let (content_type, body) = multipart_body(parts);
        let mut req = Request::post("/api/import/bank-statement").header("content-type", content_type);
        if let Some(u) = user {
            req = req.header(USER_HEADER, u);
        }
        req.body(Body::from(body)).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(USER_HEADER, "u1")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::get(uri).header(USER_HEADER, "u1").body(Body::empty()).unwrap()
    }

    async fn send(state: &AppState, req: Request<Body>) -> (StatusCode, Value) {
        let resp = router(state.clone()).oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let (_dir, state) = test_state();
        let (status, body) = send(&state, Request::get("/api/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_missing_identity_is_unauthorized() {
        let (_dir, state) = test_state();
        let (status, body) = send(&state, upload_request(None, &[("file", Some("s.csv"), CSV)])).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Unauthorized");
    }

    #[tokio::test]
    async fn test_csv_upload_then_reupload() {
        let (_dir, state) = test_state();
        let (status, body) = send(&state, upload_request(Some("u1"), &[("file", Some("s.csv"), CSV)])).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"success": true, "imported": 2, "skipped": 0, "total": 2, "format": "csv"}));

        let (_, body) = send(&state, upload_request(Some("u1"), &[("file", Some("s.csv"), CSV)])).await;
        assert_eq!(body["imported"], 0);
        assert_eq!(body["skipped"], 2);

        let (_, list) = send(&state, get_request("/api/transactions")).await;
        let list = list.as_array().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0]["amountPaise"], 45000);
        assert_eq!(list[0]["direction"], "OUTFLOW");
        assert!(list[0]["dedupeHash"].is_string());

        let (_, uploads) = send(&state, get_request("/api/uploads")).await;
        assert_eq!(uploads.as_array().unwrap().len(), 2);
        assert_eq!(uploads[0]["status"], "IMPORTED");
    }

    #[tokio::test]
    async fn test_converted_csv_text_upload() {
        let (_dir, state) = test_state();
        let (status, body) = send(
            &state,
            upload_request(Some("u1"), &[("csvText", None, CSV), ("originalFilename", None, "statement.pdf")]),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["format"], "csv");
        assert_eq!(body["imported"], 2);
    }

    #[tokio::test]
    async fn test_upload_errors() {
        let (_dir, state) = test_state();
        let (status, body) = send(&state, upload_request(Some("u1"), &[("other", None, "x")])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No file provided");

        let (status, body) = send(&state, upload_request(Some("u1"), &[("file", Some("s.xlsx"), "x")])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Please upload a CSV or PDF file");

        let (status, body) =
            send(&state, upload_request(Some("u1"), &[("file", Some("s.csv"), "foo,bar\n1,2\n")])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("date"));

        let (status, _) = send(
            &state,
            upload_request(Some("u1"), &[("file", Some("s.csv"), CSV), ("strategy", None, "magic")]),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_zero_valid_rows_is_400_and_failed_upload() {
        let (_dir, state) = test_state();
        let csv = "date,description,debit,credit\n15-12-2024,NOTHING,,\n";
        let (status, body) = send(&state, upload_request(Some("u1"), &[("file", Some("s.csv"), csv)])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No valid transactions found");
        let (_, uploads) = send(&state, get_request("/api/uploads")).await;
        assert_eq!(uploads[0]["status"], "FAILED");
        let id = uploads[0]["id"].as_i64().unwrap();
        let (status, upload) = send(&state, get_request(&format!("/api/uploads/{id}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(upload["error"], "No valid transactions found");
        let (status, _) = send(&state, get_request("/api/uploads/9999")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (_, list) = send(&state, get_request("/api/transactions")).await;
        assert!(list.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_manual_transaction_lifecycle() {
        let (_dir, state) = test_state();
        let tx = json!({"date": "2024-12-15", "description": "COFFEE", "amountPaise": 25000, "direction": "OUTFLOW"});
        let (status, created) = send(&state, json_request("POST", "/api/transactions", tx.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(created["category"], "Uncategorized");
        let id = created["id"].as_i64().unwrap();

        let (status, body) = send(&state, json_request("POST", "/api/transactions", tx)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["duplicate"], true);

        let (status, updated) = send(
            &state,
            json_request("PUT", &format!("/api/transactions/{id}"), json!({"category": "Food", "amountPaise": 30000})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["category"], "Food");
        assert_ne!(updated["dedupeHash"], created["dedupeHash"]);

        let (status, _) = send(&state, json_request("DELETE", &format!("/api/transactions/{id}"), json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = send(&state, get_request(&format!("/api/transactions/{id}"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Transaction not found");
    }

    #[tokio::test]
    async fn test_manual_transaction_validation() {
        let (_dir, state) = test_state();
        let (status, body) =
            send(&state, json_request("POST", "/api/transactions", json!({"description": "X"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("Missing required fields"));

        let bad_direction = json!({"date": "2024-12-15", "description": "X", "amountPaise": 1, "direction": "UP"});
        let (status, _) = send(&state, json_request("POST", "/api/transactions", bad_direction)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_bulk_clear() {
        let (_dir, state) = test_state();
        send(&state, upload_request(Some("u1"), &[("file", Some("s.csv"), CSV)])).await;
        let (status, body) = send(&state, json_request("DELETE", "/api/transactions", json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"success": true, "deleted": 2}));
    }

    #[tokio::test]
    async fn test_cash_and_snapshot() {
        let (_dir, state) = test_state();
        let (status, body) = send(&state, json_request("POST", "/api/cash", json!({"cashOnHandPaise": "lots"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid amount");
        let (status, _) = send(&state, json_request("POST", "/api/cash", json!({"cashOnHandPaise": -5}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, cash) = send(&state, json_request("POST", "/api/cash", json!({"cashOnHandPaise": 1_000_000}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cash["source"], "MANUAL");

        let (status, dash) = send(&state, get_request("/api/snapshot")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(dash["cashOnHand"]["cashOnHandPaise"], 1_000_000);
        assert_eq!(dash["monthlyTrend"].as_array().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_users_are_isolated() {
        let (_dir, state) = test_state();
        send(&state, upload_request(Some("u2"), &[("file", Some("s.csv"), CSV)])).await;
        let (_, list) = send(&state, get_request("/api/transactions")).await;
        assert!(list.as_array().unwrap().is_empty());
    }
}
