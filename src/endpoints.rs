use rocket::{
    data::{self, ByteUnit, Data, FromData, Limits},
    fairing::AdHoc,
    http::{Method, Status},
    outcome::Outcome,
    response::{self, Responder},
    route::{self, Handler, Route},
    serde::json::Json,
    Build, Request, Rocket, State,
};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::{
    capture::{self, DisabledResponse},
    settings::{Settings, SettingsPatch, SettingsState},
    store::{CapturedRequest, Store},
};

pub const CAPTURE_PATH: &str = "/webhook";

const CAPTURE_METHODS: [Method; 8] = [
    Method::Get,
    Method::Put,
    Method::Post,
    Method::Delete,
    Method::Patch,
    Method::Options,
    Method::Head,
    Method::Trace,
];

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("storage failure: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl<'r> Responder<'r, 'static> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        error!(method = %req.method(), path = %req.uri().path(), error = %self, "request failed");
        Err(Status::InternalServerError)
    }
}

#[rocket::async_trait]
impl<'r> FromData<'r> for SettingsPatch {
    type Error = std::io::Error;

    async fn from_data(req: &'r Request<'_>, data: Data<'r>) -> data::Outcome<'r, Self> {
        let limit = req.limits().get("json").unwrap_or(Limits::JSON);
        match data.open(limit).into_bytes().await {
            Ok(bytes) => Outcome::Success(SettingsPatch::from_slice(&bytes)),
            Err(e) => Outcome::Error((Status::BadRequest, e)),
        }
    }
}

/// Serves every method on `/webhook`.
///
/// `CONNECT` is absent from [`CAPTURE_METHODS`]: its request target is an
/// authority (`host:port`), never a path, so it can't address `/webhook`.
#[derive(Clone)]
struct Capture {
    store: Store,
    settings: SettingsState,
    body_limit: ByteUnit,
}

#[rocket::async_trait]
impl Handler for Capture {
    async fn handle<'r>(&self, req: &'r Request<'_>, data: Data<'r>) -> route::Outcome<'r> {
        let settings = self.settings.get();
        if settings.active {
            return route::Outcome::from(req, self.capture(req, data).await);
        }

        if settings.simulate_downtime {
            // Falls through to the 404 catcher exactly like an unrouted path.
            debug!(method = %req.method(), "simulating downtime");
            return route::Outcome::forward(data, Status::NotFound);
        }

        debug!(method = %req.method(), status = settings.error_status_code, "webhook disabled");
        route::Outcome::from(req, DisabledResponse::from_settings(&settings))
    }
}

impl Capture {
    async fn capture(&self, req: &Request<'_>, data: Data<'_>) -> Result<&'static str, Error> {
        let body = match data.open(self.body_limit).into_bytes().await {
            Ok(capped) => {
                if !capped.is_complete() {
                    warn!(limit = %self.body_limit, "webhook body truncated");
                }
                capped.into_inner()
            }
            Err(e) => {
                warn!(error = %e, "failed to read webhook body; capturing it as empty");
                Vec::new()
            }
        };

        let record = capture::capture_record(req, &body);
        let method = record.method.clone();
        let id = self.store.insert(record).await?;
        info!(%method, id, "Received webhook");

        Ok("Webhook received")
    }
}

fn capture_routes(handler: Capture) -> Vec<Route> {
    CAPTURE_METHODS
        .into_iter()
        .map(|method| Route::new(method, CAPTURE_PATH, handler.clone()))
        .collect()
}

fn request_log() -> AdHoc {
    AdHoc::on_response("Request Log", |req, res| {
        Box::pin(async move {
            debug!(
                method = %req.method(),
                path = %req.uri().path(),
                status = res.status().code,
                "handled request"
            );
        })
    })
}

pub fn rocket_build(store: Store, settings: SettingsState, body_limit: ByteUnit) -> Rocket<Build> {
    let capture = Capture {
        store: store.clone(),
        settings: settings.clone(),
        body_limit,
    };

    rocket::build()
        .manage(store)
        .manage(settings)
        .attach(request_log())
        .mount("/", capture_routes(capture))
        .mount(
            "/api",
            rocket::routes![list_requests, get_settings, update_settings, clear],
        )
}

#[rocket::get("/requests")]
async fn list_requests(store: &State<Store>) -> Result<Json<Vec<CapturedRequest>>, Error> {
    Ok(Json(store.list_all().await?))
}

#[rocket::get("/settings")]
fn get_settings(settings: &State<SettingsState>) -> Json<Settings> {
    Json(settings.get())
}

#[rocket::post("/settings", data = "<patch>")]
fn update_settings(settings: &State<SettingsState>, patch: SettingsPatch) -> Json<Settings> {
    if !patch.ignored.is_empty() {
        warn!(fields = ?patch.ignored, "ignoring unrecognized or mistyped settings");
    }
    let updated = settings.update(&patch);
    info!(settings = ?updated, "settings updated");
    Json(updated)
}

#[rocket::post("/clear")]
async fn clear(store: &State<Store>) -> Result<Json<Value>, Error> {
    let removed = store.clear_all().await?;
    info!(removed, "cleared captured requests");
    Ok(Json(json!({ "success": true })))
}
