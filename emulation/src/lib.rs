//! In-process stand-in for the frontend scheduling service and the edge
//! cluster it assigns.
//!
//! Both APIs are served by the same actix-web server: the edge cluster
//! address handed out by `/v1/app_requirements/{id}/ec_fe` is the emulator
//! itself. Functions cannot be run for real, so the emulator executes native
//! closures registered under the name of the uploaded function.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use actix_web::dev::ServerHandle;
use actix_web::web::{self, Data};
use actix_web::{App, HttpServer};
use dashmap::DashMap;
use model::domain::function::OffloadFunction;
use model::domain::requirements::SchedulingRequirements;
use serde_json::Value;
use tracing::info;

mod handler;

pub type NativeFunction =
    Arc<dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync>;

pub const DEFAULT_USERNAME: &str = "device";
pub const DEFAULT_PASSWORD: &str = "secret";

/// Number of requests received, per route.
#[derive(Debug, Default)]
pub struct Counters {
    pub authenticate:        AtomicUsize,
    pub requirements_create: AtomicUsize,
    pub requirements_read:   AtomicUsize,
    pub requirements_update: AtomicUsize,
    pub requirements_delete: AtomicUsize,
    pub ec_fe:               AtomicUsize,
    pub upload:              AtomicUsize,
    pub execute:             AtomicUsize,
    pub device_metrics:      AtomicUsize,
}

impl Counters {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub(crate) fn hit(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }

    /// Every request that reached the requirements document routes
    pub fn requirements_total(&self) -> usize {
        Self::get(&self.requirements_create)
            + Self::get(&self.requirements_read)
            + Self::get(&self.requirements_update)
            + Self::get(&self.requirements_delete)
    }
}

/// Failures to inject, each knob counts the upcoming requests to spoil.
#[derive(Debug, Default)]
pub struct Faults {
    pub authentications:         AtomicUsize,
    pub requirement_submissions: AtomicUsize,
    pub cluster_lookups:         AtomicUsize,
    pub executions:              AtomicUsize,
}

impl Faults {
    pub(crate) fn take(knob: &AtomicUsize) -> bool {
        knob.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
            n.checked_sub(1)
        })
        .is_ok()
    }
}

pub struct EmulatorState {
    pub(crate) username:  String,
    pub(crate) password:  String,
    pub(crate) token:     String,
    pub(crate) base_url:  OnceLock<String>,
    pub(crate) next_id:   AtomicU64,
    pub(crate) documents: DashMap<u64, SchedulingRequirements>,
    pub(crate) functions: DashMap<u64, OffloadFunction>,
    pub(crate) hashes:    DashMap<String, u64>,
    pub(crate) natives:   HashMap<String, NativeFunction>,
    pub counters:         Counters,
    pub faults:           Faults,
}

impl fmt::Debug for EmulatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmulatorState")
            .field("username", &self.username)
            .field("base_url", &self.base_url)
            .field("documents", &self.documents)
            .field("natives", &self.natives.keys().collect::<Vec<_>>())
            .field("counters", &self.counters)
            .finish()
    }
}

impl EmulatorState {
    pub(crate) fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn base_url(&self) -> &str {
        self.base_url.get().map(String::as_str).unwrap_or_default()
    }

    pub fn document(&self, id: u64) -> Option<SchedulingRequirements> {
        self.documents.get(&id).map(|doc| doc.value().clone())
    }

    pub fn document_count(&self) -> usize { self.documents.len() }
}

pub struct EmulatorBuilder {
    username: String,
    password: String,
    natives:  HashMap<String, NativeFunction>,
}

impl Default for EmulatorBuilder {
    fn default() -> Self {
        Self {
            username: DEFAULT_USERNAME.to_string(),
            password: DEFAULT_PASSWORD.to_string(),
            natives:  HashMap::new(),
        }
    }
}

impl EmulatorBuilder {
    pub fn credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Run `native` whenever a function uploaded under `name` is executed.
    pub fn with_function<F>(
        mut self,
        name: impl Into<String>,
        native: F,
    ) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.natives.insert(name.into(), Arc::new(native));
        self
    }

    /// Bind on a random local port and serve in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn start(self) -> std::io::Result<Emulator> {
        let state = Arc::new(EmulatorState {
            username:  self.username,
            password:  self.password,
            token:     format!("emulated-token-{}", std::process::id()),
            base_url:  OnceLock::new(),
            next_id:   AtomicU64::new(1),
            documents: DashMap::new(),
            functions: DashMap::new(),
            hashes:    DashMap::new(),
            natives:   self.natives,
            counters:  Counters::default(),
            faults:    Faults::default(),
        });

        let data = Data::from(state.clone());
        let server = HttpServer::new(move || {
            App::new().app_data(Data::clone(&data)).service(
                web::scope("/v1")
                    .route(
                        "/authenticate",
                        web::post().to(handler::post_authenticate),
                    )
                    .route(
                        "/app_requirements",
                        web::post().to(handler::post_requirements),
                    )
                    .route(
                        "/app_requirements/{id}",
                        web::get().to(handler::get_requirements),
                    )
                    .route(
                        "/app_requirements/{id}",
                        web::put().to(handler::put_requirements),
                    )
                    .route(
                        "/app_requirements/{id}",
                        web::delete().to(handler::delete_requirements),
                    )
                    .route(
                        "/app_requirements/{id}/ec_fe",
                        web::get().to(handler::get_edge_clusters),
                    )
                    .route("/daas/upload", web::post().to(handler::post_upload))
                    .route(
                        "/functions/{id}/execute",
                        web::post().to(handler::post_execute),
                    )
                    .route(
                        "/device_metrics",
                        web::post().to(handler::post_device_metrics),
                    ),
            )
        })
        .workers(1)
        .bind(("127.0.0.1", 0))?;

        let port = server
            .addrs()
            .first()
            .map(|addr| addr.port())
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::AddrNotAvailable,
                    "the emulator is not bound to any address",
                )
            })?;
        let base_url = format!("http://127.0.0.1:{}", port);
        let _ = state.base_url.set(base_url.clone());

        let server = server.run();
        let handle = server.handle();
        tokio::spawn(server);
        info!("Emulator listening on {}", base_url);

        Ok(Emulator { state, base_url, handle })
    }
}

pub struct Emulator {
    state:    Arc<EmulatorState>,
    base_url: String,
    handle:   ServerHandle,
}

impl Emulator {
    pub fn builder() -> EmulatorBuilder { EmulatorBuilder::default() }

    pub fn base_url(&self) -> &str { &self.base_url }

    pub fn state(&self) -> &EmulatorState { &self.state }

    pub fn counters(&self) -> &Counters { &self.state.counters }

    pub fn faults(&self) -> &Faults { &self.state.faults }

    pub fn username(&self) -> &str { &self.state.username }

    pub fn password(&self) -> &str { &self.state.password }

    /// The token handed out to authenticated devices.
    pub fn token(&self) -> &str { &self.state.token }

    pub async fn stop(self) { self.handle.stop(true).await; }
}
