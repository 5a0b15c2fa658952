//! Route handlers. Each handler runs one session operation under the
//! session lock.

use super::{ApiError, AppState};
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use labres_core::{
    BorrowKind, BorrowOutcome, BorrowRecord, BorrowRequest, BorrowWindow, CalibrationInfo,
    CalibrationInput, ConfirmState, Currency, Equipment, EquipmentId, ExchangeRate, FeeFilter,
    FeeReport, FoundryAsset, FoundryAssetInput, FoundryTransfer, MaintainInfo, MaintainInput,
    MaintenanceRecord, MaintenanceReport, MaintenanceTimeReport, Money, Period, PeriodKind,
    RecordId, RedbStore, ReturnApplication, ReturnReminder, ReturnRequest, Session, Settlement,
    TransferOutcome, TransferRequest, UsageReport, UserId, WorkHours, foundry_total,
    natural_period,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;

type ApiResult<T> = Result<Json<T>, ApiError>;

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

// =============================================================================
// CALENDAR
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct HoursQuery {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

#[derive(Debug, Serialize)]
pub struct HoursResponse {
    start: NaiveDateTime,
    end: NaiveDateTime,
    hours: WorkHours,
}

pub async fn work_hours(
    State(state): State<AppState>,
    Query(q): Query<HoursQuery>,
) -> ApiResult<HoursResponse> {
    let session = state.session.read().await;
    let hours = session.calendar().work_hours_between(q.start, q.end)?;
    Ok(Json(HoursResponse {
        start: q.start,
        end: q.end,
        hours,
    }))
}

#[derive(Debug, Deserialize)]
pub struct EndTimeQuery {
    start: NaiveDateTime,
    hours: WorkHours,
}

pub async fn end_time(
    State(state): State<AppState>,
    Query(q): Query<EndTimeQuery>,
) -> ApiResult<HoursResponse> {
    let session = state.session.read().await;
    let end = session.calendar().end_time_for(q.start, q.hours)?;
    Ok(Json(HoursResponse {
        start: q.start,
        end,
        hours: q.hours,
    }))
}

#[derive(Debug, Deserialize)]
pub struct PeriodQuery {
    kind: PeriodKind,
    date: Option<NaiveDate>,
    #[serde(default)]
    natural: bool,
}

pub async fn period(
    State(state): State<AppState>,
    Query(q): Query<PeriodQuery>,
) -> ApiResult<Period> {
    let today = q.date.unwrap_or_else(|| state.now().date());
    let session = state.session.read().await;
    let period = if q.natural {
        natural_period(q.kind, today)?
    } else {
        session.calendar().working_period(q.kind, today)?
    };
    Ok(Json(period))
}

pub async fn holidays(
    State(state): State<AppState>,
    Path(year): Path<i32>,
) -> ApiResult<Vec<NaiveDate>> {
    let session = state.session.read().await;
    Ok(Json(session.calendar().holidays_in_year(year)?))
}

// =============================================================================
// EQUIPMENT
// =============================================================================

pub async fn list_equipment(State(state): State<AppState>) -> ApiResult<Vec<Equipment>> {
    let session = state.session.read().await;
    Ok(Json(session.all_equipment()?))
}

pub async fn register_equipment(
    State(state): State<AppState>,
    Json(equipment): Json<Equipment>,
) -> Result<(StatusCode, Json<Equipment>), ApiError> {
    let mut session = state.session.write().await;
    session.register_equipment(equipment.clone())?;
    tracing::info!(equipment = %equipment.id, "equipment registered");
    Ok((StatusCode::CREATED, Json(equipment)))
}

pub async fn get_equipment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Equipment> {
    let session = state.session.read().await;
    Ok(Json(session.equipment(&EquipmentId::new(id))?))
}

pub async fn equipment_borrows(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<BorrowRecord>> {
    let session = state.session.read().await;
    let id = EquipmentId::new(id);
    session.equipment(&id)?;
    Ok(Json(session.borrows_for(&id)?))
}

#[derive(Debug, Deserialize)]
pub struct WindowQuery {
    user: u64,
    kind: Option<BorrowKind>,
}

pub async fn allowed_window(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<WindowQuery>,
) -> ApiResult<BorrowWindow> {
    let now = state.now();
    let session = state.session.read().await;
    let window = session.allowed_window(
        &EquipmentId::new(id),
        UserId(q.user),
        q.kind.unwrap_or(BorrowKind::Normal),
        now,
    )?;
    Ok(Json(window))
}

// =============================================================================
// BORROWS
// =============================================================================

pub async fn apply_borrow(
    State(state): State<AppState>,
    Json(request): Json<BorrowRequest>,
) -> Result<(StatusCode, Json<BorrowOutcome>), ApiError> {
    let now = state.now();
    let mut session = state.session.write().await;
    let outcome = session.apply_borrow(request, now)?;
    tracing::info!(
        borrow = %outcome.record.id,
        equipment = %outcome.record.equipment_id,
        delays = outcome.delays.len(),
        "borrow applied"
    );
    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn get_borrow(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<BorrowRecord> {
    let session = state.session.read().await;
    Ok(Json(session.borrow(RecordId(id))?))
}

#[derive(Debug, Deserialize)]
pub struct ScheduleBody {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

pub async fn reschedule(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(body): Json<ScheduleBody>,
) -> ApiResult<BorrowRecord> {
    let mut session = state.session.write().await;
    Ok(Json(session.reschedule(RecordId(id), body.start, body.end)?))
}

pub async fn approve(State(state): State<AppState>, Path(id): Path<u64>) -> ApiResult<BorrowRecord> {
    let mut session = state.session.write().await;
    Ok(Json(session.approve(RecordId(id))?))
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectBody {
    #[serde(default)]
    reason: Option<String>,
}

pub async fn reject(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(body): Json<RejectBody>,
) -> ApiResult<BorrowRecord> {
    let mut session = state.session.write().await;
    Ok(Json(session.reject(RecordId(id), body.reason)?))
}

pub async fn check_out(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<BorrowRecord> {
    let mut session = state.session.write().await;
    let record = session.check_out(RecordId(id))?;
    tracing::info!(borrow = %record.id, equipment = %record.equipment_id, "equipment checked out");
    Ok(Json(record))
}

pub async fn cancel_borrow(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<BorrowRecord> {
    let mut session = state.session.write().await;
    Ok(Json(session.cancel(RecordId(id))?))
}

// =============================================================================
// RETURNS
// =============================================================================

pub async fn request_return(
    State(state): State<AppState>,
    Json(request): Json<ReturnRequest>,
) -> Result<(StatusCode, Json<ReturnApplication>), ApiError> {
    let now = state.now();
    let mut session = state.session.write().await;
    let application = session.request_return(request, now)?;
    Ok((StatusCode::CREATED, Json(application)))
}

#[derive(Debug, Deserialize)]
pub struct ConfirmBody {
    state: ConfirmState,
}

pub async fn confirm_return(
    State(state): State<AppState>,
    Path(borrow): Path<u64>,
    Json(body): Json<ConfirmBody>,
) -> ApiResult<Settlement> {
    let mut session = state.session.write().await;
    let settlement = session.confirm_return(RecordId(borrow), body.state)?;
    tracing::info!(
        borrow = %settlement.record,
        hours = %settlement.actual_hours,
        state = %settlement.equipment_state,
        "return confirmed"
    );
    Ok(Json(settlement))
}

// =============================================================================
// UPKEEP
// =============================================================================

pub async fn list_calibrations(State(state): State<AppState>) -> ApiResult<Vec<CalibrationInfo>> {
    let session = state.session.read().await;
    Ok(Json(session.calibrations()?))
}

pub async fn upsert_calibration(
    State(state): State<AppState>,
    Json(input): Json<CalibrationInput>,
) -> ApiResult<CalibrationInfo> {
    let today = state.now().date();
    let mut session = state.session.write().await;
    Ok(Json(session.upsert_calibration(input, today)?))
}

pub async fn refresh_calibrations(State(state): State<AppState>) -> ApiResult<Value> {
    let today = state.now().date();
    let mut session = state.session.write().await;
    let updated = session.refresh_calibrations(today)?;
    Ok(Json(json!({ "updated": updated })))
}

pub async fn upsert_maintain(
    State(state): State<AppState>,
    Json(input): Json<MaintainInput>,
) -> ApiResult<MaintainInfo> {
    let today = state.now().date();
    let mut session = state.session.write().await;
    Ok(Json(session.upsert_maintain(input, today)?))
}

pub async fn list_maintenance(State(state): State<AppState>) -> ApiResult<Vec<MaintenanceRecord>> {
    let session = state.session.read().await;
    Ok(Json(session.maintenance_records()?))
}

pub async fn complete_maintenance(
    State(state): State<AppState>,
    Json(report): Json<MaintenanceReport>,
) -> Result<(StatusCode, Json<MaintenanceRecord>), ApiError> {
    let mut session = state.session.write().await;
    let record = session.complete_maintenance(report)?;
    Ok((StatusCode::CREATED, Json(record)))
}

// =============================================================================
// REMINDERS AND REPORTS
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ReminderQuery {
    lead_hours: Option<u32>,
}

pub async fn run_reminders(
    State(state): State<AppState>,
    Query(q): Query<ReminderQuery>,
) -> ApiResult<Vec<ReturnReminder>> {
    let now = state.now();
    let lead = Duration::hours(i64::from(q.lead_hours.unwrap_or(24)));
    let mut session = state.session.write().await;
    Ok(Json(session.remind_returns(now, lead)?))
}

/// Report window: either `start` and `end`, or a period `kind` around
/// `date` (today by default).
#[derive(Debug, Deserialize)]
pub struct WindowParams {
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
    kind: Option<PeriodKind>,
    date: Option<NaiveDate>,
}

impl WindowParams {
    fn resolve(&self, session: &Session<RedbStore>, today: NaiveDate) -> Result<Period, ApiError> {
        match (self.start, self.end, self.kind) {
            (Some(start), Some(end), _) => Ok(Period::new(start, end)),
            (None, None, Some(kind)) => {
                Ok(session.calendar().working_period(kind, self.date.unwrap_or(today))?)
            }
            _ => Err(ApiError::BadRequest(
                "give either start and end, or a period kind".to_string(),
            )),
        }
    }
}

pub async fn usage_report(
    State(state): State<AppState>,
    Query(q): Query<WindowParams>,
) -> ApiResult<UsageReport> {
    let today = state.now().date();
    let session = state.session.read().await;
    let window = q.resolve(&session, today)?;
    Ok(Json(session.usage_report(window)?))
}

#[derive(Debug, Deserialize)]
pub struct MaintainerQuery {
    maintainer: Option<String>,
}

pub async fn maintenance_report(
    State(state): State<AppState>,
    Query(window): Query<WindowParams>,
    Query(q): Query<MaintainerQuery>,
) -> ApiResult<MaintenanceTimeReport> {
    let today = state.now().date();
    let session = state.session.read().await;
    let window = window.resolve(&session, today)?;
    Ok(Json(session.maintenance_time_report(window, q.maintainer.as_deref())?))
}

pub async fn fee_report(
    State(state): State<AppState>,
    Query(window): Query<WindowParams>,
    Query(filter): Query<FeeFilter>,
) -> ApiResult<FeeReport> {
    let today = state.now().date();
    let session = state.session.read().await;
    let window = window.resolve(&session, today)?;
    Ok(Json(session.fee_report(window, &filter)?))
}

// =============================================================================
// CURRENCIES AND FOUNDRY
// =============================================================================

pub async fn list_currencies(State(state): State<AppState>) -> ApiResult<Vec<Currency>> {
    let session = state.session.read().await;
    Ok(Json(session.currencies()?))
}

#[derive(Debug, Deserialize)]
pub struct CurrencyBody {
    name: String,
    short_name: String,
    #[serde(default)]
    rate: Option<ExchangeRate>,
}

pub async fn upsert_currency(
    State(state): State<AppState>,
    Json(body): Json<CurrencyBody>,
) -> ApiResult<Currency> {
    let now = state.now();
    let mut session = state.session.write().await;
    Ok(Json(session.upsert_currency(&body.name, &body.short_name, body.rate, now)?))
}

#[derive(Debug, Deserialize)]
pub struct RatesBody {
    rates: BTreeMap<String, ExchangeRate>,
}

pub async fn update_rates(
    State(state): State<AppState>,
    Json(body): Json<RatesBody>,
) -> ApiResult<Value> {
    let now = state.now();
    let mut session = state.session.write().await;
    let updated = session.update_currency_rates(&body.rates, now)?;
    tracing::info!(updated, "exchange rates applied");
    Ok(Json(json!({ "updated": updated })))
}

#[derive(Debug, Deserialize)]
pub struct QuoteBody {
    number: u32,
    unit_price: Money,
    currency: String,
}

#[derive(Debug, Serialize)]
pub struct QuoteResponse {
    currency: String,
    total: Money,
    /// Total in CNY, absent while the currency has no rate.
    base_total: Option<Money>,
}

pub async fn foundry_quote(
    State(state): State<AppState>,
    Json(body): Json<QuoteBody>,
) -> ApiResult<QuoteResponse> {
    let session = state.session.read().await;
    let currency = session.currency(&body.currency)?;
    let (total, base_total) = foundry_total(body.number, body.unit_price, currency.exchange_rate);
    Ok(Json(QuoteResponse {
        currency: currency.short_name,
        total,
        base_total,
    }))
}

pub async fn list_foundry_assets(State(state): State<AppState>) -> ApiResult<Vec<FoundryAsset>> {
    let session = state.session.read().await;
    Ok(Json(session.foundry_assets()?))
}

pub async fn register_foundry_asset(
    State(state): State<AppState>,
    Json(input): Json<FoundryAssetInput>,
) -> Result<(StatusCode, Json<FoundryAsset>), ApiError> {
    let mut session = state.session.write().await;
    let asset = session.register_foundry_asset(input)?;
    tracing::info!(asset = %asset.id, number = asset.number, "foundry asset registered");
    Ok((StatusCode::CREATED, Json(asset)))
}

pub async fn get_foundry_asset(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<FoundryAsset> {
    let session = state.session.read().await;
    Ok(Json(session.foundry_asset(RecordId(id))?))
}

pub async fn list_foundry_transfers(
    State(state): State<AppState>,
) -> ApiResult<Vec<FoundryTransfer>> {
    let session = state.session.read().await;
    Ok(Json(session.foundry_transfers()?))
}

pub async fn foundry_transfer(
    State(state): State<AppState>,
    Json(request): Json<TransferRequest>,
) -> Result<(StatusCode, Json<TransferOutcome>), ApiError> {
    let now = state.now();
    let mut session = state.session.write().await;
    let outcome = session.foundry_transfer(request, now)?;
    tracing::info!(
        asset = %outcome.transfer.asset,
        number = outcome.transfer.number,
        split = outcome.split.is_some(),
        "foundry stock transferred"
    );
    Ok((StatusCode::CREATED, Json(outcome)))
}
