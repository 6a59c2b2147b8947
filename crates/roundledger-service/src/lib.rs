#![deny(unsafe_code)]

pub mod settler;
pub mod storage;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use roundledger_core::{
    AccountId, AccountView, Amount, BurnReceipt, ClaimReceipt, ClaimRecord, ContentFilter,
    ContentId, ContentRecord, EngineConfig, EngineError, ErrorKind, JournalEntry,
    LedgerParameter, LedgerSummary, LikeReceipt, PauseScope, PermitGrant, ProtocolStats, Round,
    RoundEngine, RoundId, RoundPhase, SettlementReceipt, Timestamp, TransferReceipt,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use storage::{JournalMirror, JournalStorageConfig, JournalStore, StorageError};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info};

/// Header carrying the caller identity set by the authentication layer.
pub const ACCOUNT_HEADER: &str = "x-account";

/// Wall-clock source. Handlers never read the system time directly.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        u64::try_from(Utc::now().timestamp()).unwrap_or(0)
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(now: Timestamp) -> Self {
        Self {
            now: AtomicU64::new(now),
        }
    }

    pub fn set(&self, now: Timestamp) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) -> Timestamp {
        self.now.fetch_add(secs, Ordering::SeqCst) + secs
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    pub engine: EngineConfig,
    pub journal_storage: JournalStorageConfig,
}

#[derive(Clone)]
pub struct ServiceState {
    pub engine: Arc<RoundEngine>,
    pub journal: Arc<Mutex<JournalMirror>>,
    pub clock: Arc<dyn Clock>,
}

impl ServiceState {
    pub async fn bootstrap(config: ServiceConfig) -> Result<Self, ServiceError> {
        Self::bootstrap_with_clock(config, Arc::new(SystemClock)).await
    }

    pub async fn bootstrap_with_clock(
        config: ServiceConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ServiceError> {
        let store = config.journal_storage.open().await?;
        Self::bootstrap_with_store(config.engine, store, clock).await
    }

    /// Restore the engine from the entries `store` holds, or start at genesis when
    /// it holds none.
    pub async fn bootstrap_with_store(
        engine: EngineConfig,
        store: Arc<dyn JournalStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ServiceError> {
        let (mut journal, stored) = JournalMirror::bootstrap(store).await?;
        let engine = if stored.is_empty() {
            RoundEngine::new(engine, clock.now())?
        } else {
            RoundEngine::restore(engine, stored)?
        };
        journal.sync(&engine).await?;
        info!(
            backend = journal.backend_label(),
            recovered_entries = journal.recovered_entries(),
            current_round_id = engine.current_round_id()?,
            "service state ready"
        );

        Ok(Self {
            engine: Arc::new(engine),
            journal: Arc::new(Mutex::new(journal)),
            clock,
        })
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Ship journal entries produced by the latest mutation.
    pub async fn persist_journal(&self) -> Result<usize, StorageError> {
        self.journal.lock().await.sync(&self.engine).await
    }

    /// Surface an applied mutation as success even when shipping its journal
    /// entries fails; they stay pending and go out with the next sync.
    async fn commit<T>(&self, result: Result<T, EngineError>) -> Result<T, ApiError> {
        let value = result?;
        if let Err(err) = self.persist_journal().await {
            error!(error = %err, "journal persistence failed, entries left pending");
        }
        Ok(value)
    }
}

pub fn build_router(state: ServiceState) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/ledger", get(ledger_summary))
        .route("/v1/accounts/:account", get(get_account))
        .route("/v1/accounts/:account/claims", get(account_claims))
        .route("/v1/transfers", post(transfer))
        .route("/v1/burns", post(burn_for_upload))
        .route("/v1/permits", post(register_permit))
        .route("/v1/contents", get(list_contents).post(register_content))
        .route("/v1/contents/:content_id", get(get_content))
        .route("/v1/contents/:content_id/likes", post(like_content))
        .route("/v1/rounds/current", get(current_round))
        .route("/v1/rounds/settle", post(settle_round))
        .route("/v1/rounds/:round_id", get(get_round))
        .route("/v1/rounds/:round_id/contents", get(round_contents))
        .route("/v1/rounds/:round_id/participants", get(round_participants))
        .route("/v1/rounds/:round_id/claims", get(round_claims).post(claim_reward))
        .route("/v1/rounds/:round_id/claims/:account", get(get_claimable))
        .route("/v1/claims/sweep", post(sweep_claims))
        .route("/v1/admin/blacklist", post(set_blacklist))
        .route("/v1/admin/fee-exemptions", post(set_fee_exempt))
        .route("/v1/admin/pause", post(set_pause))
        .route("/v1/admin/parameters", post(set_parameter))
        .route("/v1/stats", get(protocol_stats))
        .route("/v1/journal", get(list_journal))
        .with_state(state)
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Http { status: StatusCode, message: String },
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self::Http {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn unauthorized(message: impl Into<String>) -> Self {
        Self::Http {
            status: StatusCode::UNAUTHORIZED,
            message: message.into(),
        }
    }
}

fn engine_status(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::PreconditionFailed => StatusCode::CONFLICT,
        ErrorKind::AccessDenied => StatusCode::FORBIDDEN,
        ErrorKind::Expired => StatusCode::GONE,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Http { status, message } => {
                (status, Json(serde_json::json!({ "error": message }))).into_response()
            }
            ApiError::Engine(err) => (
                engine_status(err.kind()),
                Json(serde_json::json!({ "error": err.to_string() })),
            )
                .into_response(),
        }
    }
}

fn caller(headers: &HeaderMap) -> Result<AccountId, ApiError> {
    let raw = headers
        .get(ACCOUNT_HEADER)
        .ok_or_else(|| ApiError::unauthorized(format!("missing {ACCOUNT_HEADER} header")))?
        .to_str()
        .map_err(|_| ApiError::unauthorized(format!("{ACCOUNT_HEADER} is not valid ascii")))?;
    let account = AccountId::new(raw);
    if account.is_empty() {
        return Err(ApiError::unauthorized(format!("{ACCOUNT_HEADER} is empty")));
    }
    Ok(account)
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    journal_backend: &'static str,
    journal_session: String,
    journal_entries: usize,
    journal_pending: u64,
    journal_recovered: usize,
    current_round_id: RoundId,
}

async fn health(State(state): State<ServiceState>) -> Result<Json<HealthResponse>, ApiError> {
    let journal = state.journal.lock().await;
    let journal_entries = state.engine.journal_len()?;
    Ok(Json(HealthResponse {
        status: "ok",
        service: "roundledger-service",
        journal_backend: journal.backend_label(),
        journal_session: journal.session_id().to_string(),
        journal_entries,
        journal_pending: (journal_entries as u64).saturating_sub(journal.shipped()),
        journal_recovered: journal.recovered_entries(),
        current_round_id: state.engine.current_round_id()?,
    }))
}

async fn ledger_summary(
    State(state): State<ServiceState>,
) -> Result<Json<LedgerSummary>, ApiError> {
    Ok(Json(state.engine.ledger_summary()?))
}

async fn get_account(
    Path(account): Path<String>,
    State(state): State<ServiceState>,
) -> Result<Json<AccountView>, ApiError> {
    Ok(Json(
        state
            .engine
            .account(&AccountId::new(account), state.now())?,
    ))
}

#[derive(Debug, Clone, Serialize)]
struct ClaimListResponse {
    items: Vec<ClaimRecord>,
}

async fn account_claims(
    Path(account): Path<String>,
    State(state): State<ServiceState>,
) -> Result<Json<ClaimListResponse>, ApiError> {
    Ok(Json(ClaimListResponse {
        items: state.engine.account_claims(&AccountId::new(account))?,
    }))
}

#[derive(Debug, Clone, Deserialize)]
struct TransferRequest {
    to: AccountId,
    #[serde(with = "roundledger_core::types::amount_serde")]
    amount: Amount,
}

async fn transfer(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(request): Json<TransferRequest>,
) -> Result<Json<TransferReceipt>, ApiError> {
    let from = caller(&headers)?;
    let result = state
        .engine
        .transfer(&from, &request.to, request.amount, state.now());
    Ok(Json(state.commit(result).await?))
}

async fn burn_for_upload(
    State(state): State<ServiceState>,
    headers: HeaderMap,
) -> Result<Json<BurnReceipt>, ApiError> {
    let account = caller(&headers)?;
    let result = state.engine.burn_for_upload(&account, state.now());
    Ok(Json(state.commit(result).await?))
}

#[derive(Debug, Clone, Deserialize)]
struct PermitRequest {
    proof_id: String,
}

/// Burn proofs are journal entry ids of transfers to the burn sink.
async fn register_permit(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(request): Json<PermitRequest>,
) -> Result<Json<PermitGrant>, ApiError> {
    let account = caller(&headers)?;
    if request.proof_id.trim().is_empty() {
        return Err(ApiError::bad_request("proof_id is required"));
    }
    let engine = state.engine.as_ref();
    let result = engine.register_burn_permit(&account, &request.proof_id, engine, state.now());
    Ok(Json(state.commit(result).await?))
}

#[derive(Debug, Clone, Deserialize)]
struct ContentsQuery {
    round_id: Option<RoundId>,
    uploader: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
    order: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct ContentListResponse {
    total: usize,
    returned: usize,
    items: Vec<ContentRecord>,
}

async fn list_contents(
    State(state): State<ServiceState>,
    Query(query): Query<ContentsQuery>,
) -> Result<Json<ContentListResponse>, ApiError> {
    let filter = ContentFilter {
        round_id: query.round_id,
        uploader: query.uploader.map(AccountId::new),
    };
    let mut items = state.engine.list_contents(&filter)?;
    apply_order(&mut items, query.order.as_deref())?;
    let (total, items) = paginate(items, query.offset, query.limit);
    Ok(Json(ContentListResponse {
        total,
        returned: items.len(),
        items,
    }))
}

#[derive(Debug, Clone, Deserialize)]
struct RegisterContentRequest {
    cid: String,
    title: String,
    #[serde(default)]
    cover_cid: String,
}

async fn register_content(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(request): Json<RegisterContentRequest>,
) -> Result<(StatusCode, Json<ContentRecord>), ApiError> {
    let uploader = caller(&headers)?;
    let result = state.engine.register_content(
        &uploader,
        &request.cid,
        &request.title,
        &request.cover_cid,
        state.now(),
    );
    Ok((StatusCode::CREATED, Json(state.commit(result).await?)))
}

async fn get_content(
    Path(content_id): Path<String>,
    State(state): State<ServiceState>,
) -> Result<Json<ContentRecord>, ApiError> {
    Ok(Json(state.engine.get_content(&ContentId::from_hex(content_id))?))
}

async fn like_content(
    Path(content_id): Path<String>,
    State(state): State<ServiceState>,
    headers: HeaderMap,
) -> Result<Json<LikeReceipt>, ApiError> {
    let liker = caller(&headers)?;
    let result = state
        .engine
        .like_content(&liker, &ContentId::from_hex(content_id), state.now());
    Ok(Json(state.commit(result).await?))
}

#[derive(Debug, Clone, Serialize)]
struct RoundStatus {
    #[serde(flatten)]
    round: Round,
    phase: RoundPhase,
    settleable: bool,
    seconds_until_end: u64,
}

async fn current_round(State(state): State<ServiceState>) -> Result<Json<RoundStatus>, ApiError> {
    let now = state.now();
    let round = state.engine.current_round()?;
    Ok(Json(RoundStatus {
        phase: round.phase(now),
        settleable: state.engine.is_settleable(now)?,
        seconds_until_end: state.engine.time_until_round_end(now)?,
        round,
    }))
}

async fn get_round(
    Path(round_id): Path<RoundId>,
    State(state): State<ServiceState>,
) -> Result<Json<Round>, ApiError> {
    Ok(Json(state.engine.get_round(round_id)?))
}

async fn round_contents(
    Path(round_id): Path<RoundId>,
    State(state): State<ServiceState>,
) -> Result<Json<ContentListResponse>, ApiError> {
    let items = state.engine.round_contents(round_id)?;
    Ok(Json(ContentListResponse {
        total: items.len(),
        returned: items.len(),
        items,
    }))
}

#[derive(Debug, Clone, Serialize)]
struct ParticipantsResponse {
    round_id: RoundId,
    participants: Vec<AccountId>,
}

async fn round_participants(
    Path(round_id): Path<RoundId>,
    State(state): State<ServiceState>,
) -> Result<Json<ParticipantsResponse>, ApiError> {
    Ok(Json(ParticipantsResponse {
        round_id,
        participants: state.engine.round_participants(round_id)?,
    }))
}

async fn settle_round(
    State(state): State<ServiceState>,
    headers: HeaderMap,
) -> Result<Json<SettlementReceipt>, ApiError> {
    let settler = caller(&headers)?;
    let result = state.engine.try_settle(&settler, state.now());
    Ok(Json(state.commit(result).await?))
}

async fn round_claims(
    Path(round_id): Path<RoundId>,
    State(state): State<ServiceState>,
) -> Result<Json<ClaimListResponse>, ApiError> {
    state.engine.get_round(round_id)?;
    Ok(Json(ClaimListResponse {
        items: state.engine.round_claims(round_id)?,
    }))
}

#[derive(Debug, Clone, Serialize)]
struct ClaimableResponse {
    round_id: RoundId,
    account: AccountId,
    #[serde(with = "roundledger_core::types::amount_serde")]
    claimable: Amount,
    claim: Option<ClaimRecord>,
}

async fn get_claimable(
    Path((round_id, account)): Path<(RoundId, String)>,
    State(state): State<ServiceState>,
) -> Result<Json<ClaimableResponse>, ApiError> {
    let account = AccountId::new(account);
    Ok(Json(ClaimableResponse {
        round_id,
        claimable: state
            .engine
            .get_claimable(round_id, &account, state.now())?,
        claim: state.engine.get_claim(round_id, &account)?,
        account,
    }))
}

async fn claim_reward(
    Path(round_id): Path<RoundId>,
    State(state): State<ServiceState>,
    headers: HeaderMap,
) -> Result<Json<ClaimReceipt>, ApiError> {
    let account = caller(&headers)?;
    let result = state.engine.claim(round_id, &account, state.now());
    Ok(Json(state.commit(result).await?))
}

async fn sweep_claims(
    State(state): State<ServiceState>,
) -> Result<Json<ClaimListResponse>, ApiError> {
    let result = state.engine.sweep_expired_claims(state.now());
    Ok(Json(ClaimListResponse {
        items: state.commit(result).await?,
    }))
}

#[derive(Debug, Clone, Serialize)]
struct AdminOutcome {
    status: &'static str,
}

const APPLIED: AdminOutcome = AdminOutcome { status: "applied" };

#[derive(Debug, Clone, Deserialize)]
struct BlacklistRequest {
    account: AccountId,
    blacklisted: bool,
}

async fn set_blacklist(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(request): Json<BlacklistRequest>,
) -> Result<Json<AdminOutcome>, ApiError> {
    let admin = caller(&headers)?;
    let result =
        state
            .engine
            .set_blacklist(&admin, &request.account, request.blacklisted, state.now());
    state.commit(result).await?;
    Ok(Json(APPLIED))
}

#[derive(Debug, Clone, Deserialize)]
struct FeeExemptRequest {
    account: AccountId,
    exempt: bool,
}

async fn set_fee_exempt(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(request): Json<FeeExemptRequest>,
) -> Result<Json<AdminOutcome>, ApiError> {
    let admin = caller(&headers)?;
    let result = state
        .engine
        .set_fee_exempt(&admin, &request.account, request.exempt, state.now());
    state.commit(result).await?;
    Ok(Json(APPLIED))
}

#[derive(Debug, Clone, Deserialize)]
struct PauseRequest {
    scope: PauseScope,
    paused: bool,
}

async fn set_pause(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(request): Json<PauseRequest>,
) -> Result<Json<AdminOutcome>, ApiError> {
    let admin = caller(&headers)?;
    let now = state.now();
    let result = match request.scope {
        PauseScope::Ledger => state.engine.set_ledger_paused(&admin, request.paused, now),
        PauseScope::Interactions => {
            state
                .engine
                .set_interactions_paused(&admin, request.paused, now)
        }
    };
    state.commit(result).await?;
    Ok(Json(APPLIED))
}

#[derive(Debug, Clone, Deserialize)]
struct ParameterRequest {
    parameter: LedgerParameter,
    #[serde(with = "roundledger_core::types::amount_serde")]
    value: Amount,
}

async fn set_parameter(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(request): Json<ParameterRequest>,
) -> Result<Json<AdminOutcome>, ApiError> {
    let admin = caller(&headers)?;
    let result =
        state
            .engine
            .set_parameter(&admin, request.parameter, request.value, state.now());
    state.commit(result).await?;
    Ok(Json(APPLIED))
}

async fn protocol_stats(
    State(state): State<ServiceState>,
) -> Result<Json<ProtocolStats>, ApiError> {
    Ok(Json(state.engine.protocol_stats()?))
}

#[derive(Debug, Clone, Deserialize)]
struct JournalQuery {
    from: Option<u64>,
    event: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
struct JournalResponse {
    backend: &'static str,
    verified: bool,
    total: usize,
    returned: usize,
    items: Vec<JournalEntry>,
}

async fn list_journal(
    State(state): State<ServiceState>,
    Query(query): Query<JournalQuery>,
) -> Result<Json<JournalResponse>, ApiError> {
    let mut entries = state
        .engine
        .journal_since(query.from.unwrap_or(0), usize::MAX)?;
    if let Some(event) = query.event.as_deref() {
        let event = event.to_ascii_lowercase();
        entries.retain(|entry| entry.event.name() == event);
    }
    let limit = query.limit.unwrap_or(100).min(1000);
    let total = entries.len();
    entries.truncate(limit);

    Ok(Json(JournalResponse {
        backend: state.journal.lock().await.backend_label(),
        verified: state.engine.verify_journal()?,
        total,
        returned: entries.len(),
        items: entries,
    }))
}

fn apply_order<T>(items: &mut [T], order: Option<&str>) -> Result<(), ApiError> {
    let order = order.unwrap_or("asc").to_ascii_lowercase();
    if order == "desc" {
        items.reverse();
    } else if order != "asc" {
        return Err(ApiError::bad_request(format!(
            "invalid order '{}'; expected asc or desc",
            order
        )));
    }
    Ok(())
}

fn paginate<T>(items: Vec<T>, offset: Option<usize>, limit: Option<usize>) -> (usize, Vec<T>) {
    let total = items.len();
    let offset = offset.unwrap_or(0);
    let limit = limit.unwrap_or(100).min(1000);
    let items = items.into_iter().skip(offset).take(limit).collect();
    (total, items)
}
