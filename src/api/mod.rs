use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::{
    Router,
    extract::{Json, Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, put},
};
use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::info;

use crate::core::{Account, Profile, WithdrawalPlan, YearlyProjection, compound_growth, project};
use crate::store::{ScenarioStore, Snapshot, StoreError};

type SharedStore = Arc<Mutex<ScenarioStore>>;

/// Profile overrides and/or a replacement account list, merged over the
/// scenario snapshot the projection runs against. Every field is optional so
/// the same shape works for GET query strings and POST bodies.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ProjectPayload {
    scenario: Option<String>,
    start_year: Option<i32>,

    current_age: Option<u32>,
    retirement_age: Option<u32>,
    life_expectancy: Option<u32>,
    expected_return: Option<f64>,
    inflation_rate: Option<f64>,
    tax_rate: Option<f64>,
    capital_gains_rate: Option<f64>,
    #[serde(alias = "allowEarlyIRAWithdrawals")]
    allow_early_withdrawals: Option<bool>,
    current_monthly_spending: Option<f64>,
    withdrawal_plans: Option<Vec<WithdrawalPlan>>,
    accounts: Option<Vec<Account>>,
}

#[derive(Debug, Deserialize)]
struct CreateScenarioPayload {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RenameScenarioPayload {
    name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScenarioInfo {
    id: String,
    name: String,
    active: bool,
}

/// Headline numbers the original dashboard showed above the charts.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub current_total: f64,
    pub retirement_balance: f64,
    pub peak_balance: f64,
    pub final_balance: f64,
    pub years_to_retirement: u32,
    pub retirement_year: i32,
    pub total_contributions: f64,
    pub total_withdrawals: f64,
    pub total_taxes: f64,
    pub monthly_retirement_income: f64,
    /// Today's monthly spending restated in retirement-year dollars; the only
    /// consumer of the profile's inflation rate.
    pub monthly_spending_at_retirement: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectResponse {
    start_year: i32,
    profile: Profile,
    accounts: Vec<Account>,
    summary: Summary,
    projections: Vec<YearlyProjection>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

pub async fn run_http_server(port: u16, store_path: PathBuf) -> anyhow::Result<()> {
    let store = ScenarioStore::open(store_path)?;
    info!(path = %store.path().display(), "scenario store ready");
    let shared: SharedStore = Arc::new(Mutex::new(store));

    let app = Router::new()
        .route(
            "/api/project",
            get(project_get_handler).post(project_post_handler),
        )
        .route(
            "/api/scenario",
            get(active_scenario_handler).put(update_scenario_handler),
        )
        .route(
            "/api/scenarios",
            get(list_scenarios_handler).post(create_scenario_handler),
        )
        .route(
            "/api/scenarios/:id",
            put(rename_scenario_handler).delete(delete_scenario_handler),
        )
        .route("/api/scenarios/:id/activate", put(activate_scenario_handler))
        .fallback(not_found_handler)
        .with_state(shared);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "projection API listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn project_get_handler(
    State(store): State<SharedStore>,
    Query(payload): Query<ProjectPayload>,
) -> Response {
    project_handler_impl(&store, payload)
}

async fn project_post_handler(
    State(store): State<SharedStore>,
    Json(payload): Json<ProjectPayload>,
) -> Response {
    project_handler_impl(&store, payload)
}

fn project_handler_impl(store: &SharedStore, payload: ProjectPayload) -> Response {
    let snapshot = {
        let store = lock(store);
        match payload.scenario.as_deref() {
            Some(id) => match store.snapshot(id) {
                Ok(snapshot) => snapshot.clone(),
                Err(err) => return store_error_response(&err),
            },
            None => store.active_snapshot().clone(),
        }
    };

    let start_year = payload.start_year.unwrap_or_else(current_year);
    let (profile, accounts) = apply_overrides(snapshot, payload);
    if let Err(msg) = validate_inputs(&profile, &accounts) {
        return error_response(StatusCode::BAD_REQUEST, &msg);
    }

    let projections = project(&profile, &accounts, start_year);
    let summary = summarize(&profile, start_year, &projections);

    json_response(
        StatusCode::OK,
        ProjectResponse {
            start_year,
            profile,
            accounts,
            summary,
            projections,
        },
    )
}

async fn active_scenario_handler(State(store): State<SharedStore>) -> Response {
    let store = lock(&store);
    json_response(StatusCode::OK, store.active_snapshot().clone())
}

async fn update_scenario_handler(
    State(store): State<SharedStore>,
    Json(snapshot): Json<Snapshot>,
) -> Response {
    if let Err(msg) = validate_inputs(&snapshot.profile, &snapshot.accounts) {
        return error_response(StatusCode::BAD_REQUEST, &msg);
    }

    let mut store = lock(&store);
    match store.update_active(snapshot) {
        Ok(()) => json_response(StatusCode::OK, store.active_snapshot().clone()),
        Err(err) => store_error_response(&err),
    }
}

async fn list_scenarios_handler(State(store): State<SharedStore>) -> Response {
    let store = lock(&store);
    json_response(StatusCode::OK, scenario_infos(&store))
}

async fn create_scenario_handler(
    State(store): State<SharedStore>,
    Json(payload): Json<CreateScenarioPayload>,
) -> Response {
    let mut store = lock(&store);
    match store.create(&payload.name) {
        Ok(_) => json_response(StatusCode::CREATED, scenario_infos(&store)),
        Err(err) => store_error_response(&err),
    }
}

async fn rename_scenario_handler(
    State(store): State<SharedStore>,
    Path(id): Path<String>,
    Json(payload): Json<RenameScenarioPayload>,
) -> Response {
    let mut store = lock(&store);
    match store.rename(&id, &payload.name) {
        Ok(()) => json_response(StatusCode::OK, scenario_infos(&store)),
        Err(err) => store_error_response(&err),
    }
}

async fn delete_scenario_handler(
    State(store): State<SharedStore>,
    Path(id): Path<String>,
) -> Response {
    let mut store = lock(&store);
    match store.delete(&id) {
        Ok(()) => json_response(StatusCode::OK, scenario_infos(&store)),
        Err(err) => store_error_response(&err),
    }
}

async fn activate_scenario_handler(
    State(store): State<SharedStore>,
    Path(id): Path<String>,
) -> Response {
    let mut store = lock(&store);
    match store.set_active(&id) {
        Ok(()) => json_response(StatusCode::OK, scenario_infos(&store)),
        Err(err) => store_error_response(&err),
    }
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

fn scenario_infos(store: &ScenarioStore) -> Vec<ScenarioInfo> {
    store
        .list()
        .iter()
        .map(|scenario| ScenarioInfo {
            id: scenario.id.clone(),
            name: scenario.name.clone(),
            active: scenario.id == store.active_id(),
        })
        .collect()
}

fn lock(store: &SharedStore) -> MutexGuard<'_, ScenarioStore> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

fn current_year() -> i32 {
    Utc::now().year()
}

fn apply_overrides(snapshot: Snapshot, overrides: ProjectPayload) -> (Profile, Vec<Account>) {
    let mut profile = snapshot.profile;
    let mut accounts = snapshot.accounts;

    if let Some(v) = overrides.current_age {
        profile.current_age = v;
    }
    if let Some(v) = overrides.retirement_age {
        profile.retirement_age = v;
    }
    if let Some(v) = overrides.life_expectancy {
        profile.life_expectancy = v;
    }
    if let Some(v) = overrides.expected_return {
        profile.expected_return = v;
    }
    if let Some(v) = overrides.inflation_rate {
        profile.inflation_rate = v;
    }
    if let Some(v) = overrides.tax_rate {
        profile.tax_rate = v;
    }
    if let Some(v) = overrides.capital_gains_rate {
        profile.capital_gains_rate = v;
    }
    if let Some(v) = overrides.allow_early_withdrawals {
        profile.allow_early_withdrawals = v;
    }
    if let Some(v) = overrides.current_monthly_spending {
        profile.current_monthly_spending = v;
    }
    if let Some(v) = overrides.withdrawal_plans {
        profile.withdrawal_plans = v;
    }
    if let Some(v) = overrides.accounts {
        accounts = v;
    }

    (profile, accounts)
}

fn validate_inputs(profile: &Profile, accounts: &[Account]) -> Result<(), String> {
    if !(18..=100).contains(&profile.current_age) {
        return Err("currentAge must be between 18 and 100".to_string());
    }
    if profile.retirement_age < profile.current_age {
        return Err("retirementAge must be >= currentAge".to_string());
    }
    if profile.life_expectancy < profile.retirement_age {
        return Err("lifeExpectancy must be >= retirementAge".to_string());
    }
    if profile.life_expectancy > 120 {
        return Err("lifeExpectancy must be <= 120".to_string());
    }

    if !profile.expected_return.is_finite() || !(-100.0..=100.0).contains(&profile.expected_return)
    {
        return Err("expectedReturn must be between -100 and 100".to_string());
    }
    for (name, rate) in [
        ("inflationRate", profile.inflation_rate),
        ("taxRate", profile.tax_rate),
        ("capitalGainsRate", profile.capital_gains_rate),
    ] {
        if !rate.is_finite() || !(0.0..=100.0).contains(&rate) {
            return Err(format!("{name} must be between 0 and 100"));
        }
    }

    if !profile.current_monthly_spending.is_finite() || profile.current_monthly_spending < 0.0 {
        return Err("currentMonthlySpending must be >= 0".to_string());
    }

    for plan in &profile.withdrawal_plans {
        if !plan.percentage.is_finite() || !(0.0..=100.0).contains(&plan.percentage) {
            return Err("withdrawal plan percentage must be between 0 and 100".to_string());
        }
    }

    let mut seen = Vec::with_capacity(accounts.len());
    for account in accounts {
        if account.id.trim().is_empty() {
            return Err("account id cannot be empty".to_string());
        }
        if seen.contains(&account.id.as_str()) {
            return Err(format!("duplicate account id `{}`", account.id));
        }
        seen.push(account.id.as_str());

        if !account.starting_amount.is_finite() || account.starting_amount < 0.0 {
            return Err(format!(
                "account `{}` startingAmount must be >= 0",
                account.id
            ));
        }
        for plan in &account.contribution_plans {
            if !plan.yearly_amount.is_finite() || plan.yearly_amount < 0.0 {
                return Err(format!(
                    "account `{}` contribution plan yearlyAmount must be >= 0",
                    account.id
                ));
            }
        }
    }

    Ok(())
}

fn summarize(profile: &Profile, start_year: i32, projections: &[YearlyProjection]) -> Summary {
    let years_to_retirement = profile.retirement_age.saturating_sub(profile.current_age);
    let retirement_year = start_year + years_to_retirement as i32;
    let monthly_spending_at_retirement = compound_growth(
        profile.current_monthly_spending,
        profile.inflation_rate,
        years_to_retirement,
        0.0,
    );

    let current_total = projections.first().map_or(0.0, |row| row.total_balance);
    let retirement_balance = projections
        .iter()
        .find(|row| row.age == profile.retirement_age)
        .map_or(0.0, |row| row.total_balance);
    let peak_balance = projections
        .iter()
        .map(|row| row.total_balance)
        .fold(0.0, f64::max);
    let final_balance = projections.last().map_or(0.0, |row| row.total_balance);

    let total_contributions = projections
        .iter()
        .filter(|row| row.age < profile.retirement_age)
        .map(|row| row.contributions)
        .sum();
    let total_withdrawals = projections
        .iter()
        .filter(|row| row.age >= profile.retirement_age)
        .map(|row| row.withdrawals)
        .sum();
    let total_taxes = projections
        .iter()
        .filter(|row| row.age >= profile.retirement_age)
        .map(|row| row.taxes)
        .sum();

    let monthly_retirement_income = projections
        .iter()
        .find(|row| row.age >= profile.retirement_age)
        .map_or(0.0, |row| row.net_income / 12.0);

    Summary {
        current_total,
        retirement_balance,
        peak_balance,
        final_balance,
        years_to_retirement,
        retirement_year,
        total_contributions,
        total_withdrawals,
        total_taxes,
        monthly_retirement_income,
        monthly_spending_at_retirement,
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        "no-store".parse().expect("valid header"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

fn store_error_response(err: &StoreError) -> Response {
    let status = match err {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::LastScenario | StoreError::EmptyName => StatusCode::BAD_REQUEST,
        StoreError::Io(_) | StoreError::Corrupt(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, &err.to_string())
}
