//! # Application Lifecycle & Wiring
//!
//! [`AppSystem`] is the composition root: it creates the application context, binds
//! configuration, services, controllers, interceptors and life cycle observers, and
//! drives startup and shutdown.
//!
//! ## Context Layout
//!
//! ```text
//! app (Application scope)
//! ├── config                          AppConfig as JSON, read via `config#path`
//! ├── audit.log                       AuditLog
//! ├── lifeCycleObserver.options       from `config.lifeCycle`
//! ├── lifeCycleObserver.registry      LifeCycleObserverRegistry (singleton)
//! ├── lifeCycleObservers.datasource   DataSourceObserver (singleton)
//! ├── lifeCycleObservers.server       ServerObserver (singleton)
//! ├── services.greeting               GreetingService (singleton)
//! ├── providers.TimestampProvider     u64
//! ├── controllers.greeting            GreetingController (transient)
//! ├── interceptors.audit              AuditInterceptor
//! └── globalInterceptors.timing       TimingInterceptor
//!
//! request-N (Request scope, one per request)
//! └── request.user                    optional caller name
//! ```
//!
//! ## Startup and Shutdown
//!
//! 1. [`AppSystem::new`] binds everything; nothing is constructed yet except the registry.
//! 2. [`AppSystem::start`] starts observers group by group (`datasource`, then `server`).
//! 3. [`AppSystem::handle_request`] serves one request in its own child context.
//! 4. [`AppSystem::shutdown`] stops observers in reverse order and closes the context.

use crate::controllers::{AuditInterceptor, GreetingController, TimingInterceptor, AUDIT_INTERCEPTOR};
use crate::model::{AppConfig, AppError};
use crate::observers::{DataSourceObserver, ServerObserver};
use crate::services::{AuditLog, GreetingService, TimestampProvider};
use context_framework::interceptor::{as_global_interceptor, as_interceptor};
use context_framework::keys::core_bindings;
use context_framework::{
    create_binding_from_class, create_binding_from_provider, BindingScope, ClassBindingOptions, Context,
    ContextError, InterceptionProxy, LifeCycleObserverRegistry, ResolutionOptions,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, instrument, Instrument};

pub const GREETING_CONTROLLER: &str = "controllers.greeting";

pub struct AppSystem {
    pub context: Context,
    pub registry: Arc<LifeCycleObserverRegistry>,
    pub audit: AuditLog,
    running: AtomicBool,
    requests: AtomicU64,
}

impl AppSystem {
    pub fn new(config: AppConfig) -> Result<Self, AppError> {
        let context = Context::builder()
            .name(config.name.clone())
            .scope(BindingScope::Application)
            .build();
        let audit = AuditLog::new();

        context.bind("config")?.to(config.to_json()?);
        context.bind("audit.log")?.to(audit.clone());
        context
            .bind(core_bindings::LIFE_CYCLE_OBSERVER_OPTIONS)?
            .to(config.life_cycle.clone());
        context
            .bind(core_bindings::LIFE_CYCLE_OBSERVER_REGISTRY)?
            .to_class::<LifeCycleObserverRegistry>()
            .in_scope(BindingScope::Singleton);

        let defaults = ClassBindingOptions::default();
        context.add(create_binding_from_class::<GreetingService>(&defaults))?;
        context.add(create_binding_from_provider::<TimestampProvider>(&defaults))?;
        context.add(create_binding_from_class::<GreetingController>(&defaults))?;

        context
            .bind(AUDIT_INTERCEPTOR)?
            .to(AuditInterceptor::new(&audit))
            .apply(as_interceptor::<AuditInterceptor>());
        context
            .bind("globalInterceptors.timing")?
            .to(TimingInterceptor)
            .apply(as_global_interceptor::<TimingInterceptor>("timing"));

        let registry = context.get_sync::<LifeCycleObserverRegistry>(core_bindings::LIFE_CYCLE_OBSERVER_REGISTRY)?;
        registry.add_observer::<ServerObserver>("server")?;
        registry.add_observer::<DataSourceObserver>("datasource")?;

        info!(app = %context.name(), bindings = context.bindings().len(), "Application wired");
        Ok(Self {
            context,
            registry,
            audit,
            running: AtomicBool::new(false),
            requests: AtomicU64::new(0),
        })
    }

    #[instrument(skip(self), fields(app = %self.context.name()))]
    pub async fn start(&self) -> Result<(), AppError> {
        self.registry.start().await?;
        self.running.store(true, Ordering::SeqCst);
        info!("Application started");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Serves one greeting request in a fresh request context.
    pub async fn handle_request(&self, user: Option<&str>, name: Option<&str>) -> Result<Value, AppError> {
        if !self.is_running() {
            return Err(AppError::NotRunning);
        }
        let id = self.requests.fetch_add(1, Ordering::SeqCst) + 1;
        let request = Context::builder()
            .name(format!("request-{id}"))
            .parent(&self.context)
            .scope(BindingScope::Request)
            .build();
        if let Some(user) = user {
            request.bind("request.user")?.to(user.to_string());
        }

        let span = tracing::info_span!("request", id);
        let result = async {
            let controller = request
                .get_with::<InterceptionProxy>(GREETING_CONTROLLER, &ResolutionOptions::proxy())
                .await?
                .ok_or_else(|| ContextError::UndefinedValue(GREETING_CONTROLLER.to_string()))?;
            let args = name.map(|n| vec![json!(n)]).unwrap_or_default();
            controller.invoke("greet", args).await
        }
        .instrument(span)
        .await;

        request.close();
        Ok(result?)
    }

    #[instrument(skip(self), fields(app = %self.context.name()))]
    pub async fn shutdown(self) -> Result<(), AppError> {
        self.running.store(false, Ordering::SeqCst);
        self.registry.stop().await?;
        self.context.close();
        info!("Application stopped");
        Ok(())
    }
}
