use anyhow::Result;
use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::error::Error;
use crate::person::{NewPerson, Person};
use crate::query::{DataTableParams, DataTableResponse, QueryEngine};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub queries: Arc<QueryEngine>,
}

impl AppState {
    pub fn new(queries: Arc<QueryEngine>) -> Self {
        Self { queries }
    }
}

/// Builds the HTTP routes.
///
/// Routes:
/// - `GET  /person` - Every person, insertion order
/// - `POST /person` - Insert a person, returns it with its id
/// - `GET  /person/eyes/{color}` - People with eye colour `color` (BLUE, GREEN, HAZEL, BROWN)
/// - `GET  /person/birth/before/{year}` - People born in `year` or earlier
/// - `GET  /person/datatable` - DataTables server-side processing endpoint
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/person", get(list_people).post(create_person))
        .route("/person/eyes/{color}", get(people_by_eyes))
        .route("/person/birth/before/{year}", get(people_born_before))
        .route("/person/datatable", get(datatable))
        .with_state(state)
}

/// Binds `addr` and serves until Ctrl-C.
///
/// ## Arguments
/// * `state` - Shared query engine
/// * `addr` - TCP bind address (e.g., "127.0.0.1:8080")
///
/// ## Returns
/// * `Ok(())` - Server shut down cleanly
/// * `Err(_)` - Bind failure or server I/O error
pub async fn serve(state: AppState, addr: &str) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown requested"),
        Err(e) => {
            error!(error = %e, "cannot listen for ctrl-c, running until killed");
            std::future::pending::<()>().await;
        }
    }
}

fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        Error::StoreUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn log_failure(err: &Error) {
    if err.is_client_error() {
        warn!(error = %err, "rejected request");
    } else {
        error!(error = %err, "request failed");
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        log_failure(&self);
        let body = Json(json!({ "error": self.to_string() }));
        (status_for(&self), body).into_response()
    }
}

async fn list_people(State(state): State<AppState>) -> Result<Json<Vec<Person>>, Error> {
    Ok(Json(state.queries.all_people().await?))
}

async fn create_person(
    State(state): State<AppState>,
    Json(person): Json<NewPerson>,
) -> Result<(StatusCode, Json<Person>), Error> {
    let stored = state.queries.store().insert(person).await?;
    info!(id = stored.id, "person created");
    Ok((StatusCode::CREATED, Json(stored)))
}

async fn people_by_eyes(
    State(state): State<AppState>,
    Path(color): Path<String>,
) -> Result<Json<Vec<Person>>, Error> {
    Ok(Json(state.queries.people_with_eyes(&color).await?))
}

async fn people_born_before(
    State(state): State<AppState>,
    Path(year): Path<String>,
) -> Result<Json<Vec<Person>>, Error> {
    let year: i32 = year
        .parse()
        .map_err(|_| Error::invalid(format!("year must be an integer, got '{year}'")))?;
    Ok(Json(state.queries.people_born_in_or_before(year).await?))
}

/// Always answers with a DataTables envelope, failures included. The status
/// code still tells client errors (400) from store failures (500).
async fn datatable(
    State(state): State<AppState>,
    params: Result<Query<DataTableParams>, QueryRejection>,
) -> Response {
    let params = match params {
        Ok(Query(params)) => params,
        Err(rejection) => {
            let err = Error::invalid(rejection.body_text());
            return envelope(0, Err(err));
        }
    };

    let draw = match params.draw() {
        Ok(draw) => draw,
        Err(err) => return envelope(0, Err(err)),
    };

    let result = match params.page_request() {
        Ok(request) => state.queries.table_page(&request).await,
        Err(err) => Err(err),
    };
    envelope(draw, result)
}

fn envelope(draw: i64, result: crate::error::Result<crate::query::TablePage>) -> Response {
    let status = match &result {
        Ok(page) => {
            debug!(draw, filtered = page.records_filtered, "datatable answered");
            StatusCode::OK
        }
        Err(err) => {
            log_failure(err);
            status_for(err)
        }
    };
    (status, Json(DataTableResponse::assemble(draw, &result))).into_response()
}
