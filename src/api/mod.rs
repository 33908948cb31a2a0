/*
 * REST API surface: thin handlers that parse, delegate and serialize
 */

use crate::models::{BuildRequest, EngineError, Position, Transaction};
use crate::service::PositionService;
use ethers::types::Address;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use rocket::{get, post, routes, State};
use std::sync::Arc;

pub struct ApiState {
    pub service: Arc<PositionService>,
}

fn to_http_error(error: &EngineError) -> Custom<String> {
    match error {
        EngineError::InvalidInput(_) | EngineError::ConfigError(_) => {
            Custom(Status::BadRequest, error.to_string())
        }
        _ => Custom(Status::InternalServerError, error.to_string()),
    }
}

#[get("/api/v1/positions/<wallet>?<include_closed>")]
pub async fn get_positions(
    wallet: String,
    include_closed: Option<bool>,
    state: &State<ApiState>,
) -> std::result::Result<Json<Vec<Position>>, Custom<String>> {
    let wallet: Address = wallet
        .parse()
        .map_err(|e| Custom(Status::BadRequest, format!("Invalid wallet address: {e}")))?;

    state
        .service
        .discover(wallet, include_closed.unwrap_or(false))
        .await
        .map(Json)
        .map_err(|e| to_http_error(&e))
}

#[post("/api/v1/transactions", data = "<request>")]
pub async fn build_transactions(
    request: Json<BuildRequest>,
    state: &State<ApiState>,
) -> std::result::Result<Json<Vec<Transaction>>, Custom<String>> {
    state
        .service
        .build_transactions(&request)
        .await
        .map(Json)
        .map_err(|e| to_http_error(&e))
}

#[get("/health")]
pub async fn health_check() -> &'static str {
    "OK"
}

#[must_use]
pub fn create_rocket(state: ApiState) -> rocket::Rocket<rocket::Build> {
    rocket::build()
        .manage(state)
        .mount("/", routes![get_positions, build_transactions, health_check])
}
