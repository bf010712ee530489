use actix_web::http::header::AUTHORIZATION;
use actix_web::web::{Data, Json, Path, Query};
use actix_web::{HttpRequest, HttpResponse};
use model::codec;
use model::domain::function::OffloadFunction;
use model::domain::requirements::SchedulingRequirements;
use model::dto::edge::{DeviceMetrics, ExecResponse, ExecReturnCode};
use model::dto::frontend::{UploadFunctionDaaS, EDGE_CLUSTER_FRONTEND};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::{Counters, EmulatorState, Faults};

#[derive(Debug, Deserialize)]
pub struct ExecuteQuery {
    app_req_id: u64,
    #[allow(dead_code)]
    mode:       String,
}

fn is_authorized(req: &HttpRequest, state: &EmulatorState) -> bool {
    req.headers()
        .get("token")
        .and_then(|value| value.to_str().ok())
        .map(|token| token == state.token)
        .unwrap_or(false)
}

fn basic_credentials(req: &HttpRequest) -> Option<(String, String)> {
    let header = req.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let encoded = header.strip_prefix("Basic ")?;
    let decoded = String::from_utf8(base64::decode(encoded).ok()?).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

pub async fn post_authenticate(
    req: HttpRequest,
    state: Data<EmulatorState>,
) -> HttpResponse {
    Counters::hit(&state.counters.authenticate);
    if Faults::take(&state.faults.authentications) {
        return HttpResponse::ServiceUnavailable().finish();
    }

    match basic_credentials(&req) {
        Some((username, password))
            if username == state.username && password == state.password =>
        {
            HttpResponse::Created().json(&state.token)
        }
        _ => HttpResponse::Unauthorized()
            .json(json!({"detail": "bad credentials"})),
    }
}

pub async fn post_requirements(
    req: HttpRequest,
    payload: Json<SchedulingRequirements>,
    state: Data<EmulatorState>,
) -> HttpResponse {
    Counters::hit(&state.counters.requirements_create);
    if !is_authorized(&req, &state) {
        return HttpResponse::Unauthorized().finish();
    }
    if Faults::take(&state.faults.requirement_submissions) {
        return HttpResponse::InternalServerError().finish();
    }
    if let Err(err) = payload.validate() {
        return HttpResponse::BadRequest()
            .json(json!({"detail": err.to_string()}));
    }

    let id = state.next_id();
    debug!("Created requirements document {}", id);
    state.documents.insert(id, payload.into_inner());
    HttpResponse::Ok().json(id)
}

pub async fn get_requirements(
    req: HttpRequest,
    id: Path<u64>,
    state: Data<EmulatorState>,
) -> HttpResponse {
    Counters::hit(&state.counters.requirements_read);
    if !is_authorized(&req, &state) {
        return HttpResponse::Unauthorized().finish();
    }

    match state.document(*id) {
        Some(document) => HttpResponse::Ok().json(document),
        None => HttpResponse::NotFound().finish(),
    }
}

pub async fn put_requirements(
    req: HttpRequest,
    id: Path<u64>,
    payload: Json<SchedulingRequirements>,
    state: Data<EmulatorState>,
) -> HttpResponse {
    Counters::hit(&state.counters.requirements_update);
    if !is_authorized(&req, &state) {
        return HttpResponse::Unauthorized().finish();
    }
    if Faults::take(&state.faults.requirement_submissions) {
        return HttpResponse::InternalServerError().finish();
    }
    if let Err(err) = payload.validate() {
        return HttpResponse::BadRequest()
            .json(json!({"detail": err.to_string()}));
    }

    match state.documents.get_mut(&*id) {
        Some(mut document) => {
            *document = payload.into_inner();
            HttpResponse::Ok().finish()
        }
        None => HttpResponse::NotFound().finish(),
    }
}

pub async fn delete_requirements(
    req: HttpRequest,
    id: Path<u64>,
    state: Data<EmulatorState>,
) -> HttpResponse {
    Counters::hit(&state.counters.requirements_delete);
    if !is_authorized(&req, &state) {
        return HttpResponse::Unauthorized().finish();
    }

    match state.documents.remove(&*id) {
        Some(_) => HttpResponse::NoContent().finish(),
        None => HttpResponse::NotFound().finish(),
    }
}

pub async fn get_edge_clusters(
    req: HttpRequest,
    id: Path<u64>,
    state: Data<EmulatorState>,
) -> HttpResponse {
    Counters::hit(&state.counters.ec_fe);
    if !is_authorized(&req, &state) {
        return HttpResponse::Unauthorized().finish();
    }
    if !state.documents.contains_key(&*id) {
        return HttpResponse::NotFound().finish();
    }
    if Faults::take(&state.faults.cluster_lookups) {
        return HttpResponse::Ok().json(Vec::<Value>::new());
    }

    HttpResponse::Ok().json(json!([{
        "ID": 0,
        "NAME": "emulated",
        "HOSTS": [0],
        "DATASTORES": [0, 1],
        "VNETS": [0],
        "TEMPLATE": { EDGE_CLUSTER_FRONTEND: state.base_url() },
    }]))
}

pub async fn post_upload(
    req: HttpRequest,
    payload: Json<UploadFunctionDaaS>,
    state: Data<EmulatorState>,
) -> HttpResponse {
    Counters::hit(&state.counters.upload);
    if !is_authorized(&req, &state) {
        return HttpResponse::Unauthorized().finish();
    }
    if codec::function_hash(&payload.fc) != payload.fc_hash {
        return HttpResponse::BadRequest()
            .json(json!({"detail": "FC_HASH does not match FC"}));
    }
    let function = match codec::deserialize::<OffloadFunction>(&payload.fc) {
        Ok(function) => function,
        Err(err) => {
            return HttpResponse::BadRequest()
                .json(json!({"detail": err.to_string()}))
        }
    };

    if let Some(id) = state.hashes.get(&payload.fc_hash) {
        return HttpResponse::Ok().json(*id);
    }
    let id = state.next_id();
    state.hashes.insert(payload.fc_hash.clone(), id);
    state.functions.insert(id, function);
    HttpResponse::Ok().json(id)
}

fn missing_arguments(function: &OffloadFunction, given: usize) -> String {
    let missing = function.params()[given..]
        .iter()
        .map(|param| format!("'{}'", param))
        .collect::<Vec<_>>();
    let plural = if missing.len() > 1 { "s" } else { "" };
    format!(
        "{}() missing {} required positional argument{}: {}",
        function.name(),
        missing.len(),
        plural,
        missing.join(" and ")
    )
}

fn run(
    state: &EmulatorState,
    function: &OffloadFunction,
    params: &[String],
) -> Result<Value, String> {
    let args = params
        .iter()
        .map(|param| codec::deserialize::<Value>(param))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| err.to_string())?;

    if args.len() < function.arity() {
        return Err(missing_arguments(function, args.len()));
    }
    if args.len() > function.arity() {
        return Err(format!(
            "{}() takes {} positional arguments but {} were given",
            function.name(),
            function.arity(),
            args.len()
        ));
    }

    let native = state
        .natives
        .get(function.name())
        .ok_or_else(|| format!("name '{}' is not defined", function.name()))?;
    native(&args)
}

pub async fn post_execute(
    req: HttpRequest,
    id: Path<u64>,
    query: Query<ExecuteQuery>,
    payload: Json<Vec<String>>,
    state: Data<EmulatorState>,
) -> HttpResponse {
    Counters::hit(&state.counters.execute);
    if !is_authorized(&req, &state) {
        return HttpResponse::Unauthorized().finish();
    }
    if Faults::take(&state.faults.executions) {
        return HttpResponse::Unauthorized().finish();
    }
    if !state.documents.contains_key(&query.app_req_id) {
        return HttpResponse::BadRequest()
            .json(json!({"detail": "unknown app_req_id"}));
    }
    let Some(function) = state.functions.get(&*id).map(|f| f.value().clone())
    else {
        return HttpResponse::NotFound().finish();
    };

    let response = match run(&state, &function, &payload) {
        Ok(value) => match codec::serialize(&value) {
            Ok(res) => ExecResponse {
                ret_code: ExecReturnCode::Success,
                res:      Some(res),
                err:      None,
            },
            Err(err) => ExecResponse {
                ret_code: ExecReturnCode::Error,
                res:      None,
                err:      Some(err.to_string()),
            },
        },
        Err(err) => {
            warn!("Execution of {} failed: {}", function.name(), err);
            ExecResponse {
                ret_code: ExecReturnCode::Error,
                res:      None,
                err:      Some(err),
            }
        }
    };
    HttpResponse::Ok().json(response)
}

pub async fn post_device_metrics(
    req: HttpRequest,
    payload: Json<DeviceMetrics>,
    state: Data<EmulatorState>,
) -> HttpResponse {
    Counters::hit(&state.counters.device_metrics);
    if !is_authorized(&req, &state) {
        return HttpResponse::Unauthorized().finish();
    }
    debug!("Device metrics: {:?}", payload.into_inner());
    HttpResponse::Ok().finish()
}
