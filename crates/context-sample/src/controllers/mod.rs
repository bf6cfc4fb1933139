//! # Controllers
//!
//! Request handlers. They are resolved per request, wrapped in an interception proxy
//! and invoked by method name, so the audit and timing interceptors see every call.
//!
//! | Interceptor | Level | Bound as |
//! |-------------|-------|----------|
//! | [`TimingInterceptor`] | global, group `timing` | `globalInterceptors.timing` |
//! | [`AuditInterceptor`] | class ([`GreetingController`]) | `interceptors.audit` |

use crate::services::{AuditLog, GreetingService};
use async_trait::async_trait;
use context_framework::injection::method_not_found;
use context_framework::{
    BindingSpec, ContextResult, Injectable, Injection, InterceptorRef, Interceptor, InvocationContext, Next,
    ResolvedArgs,
};
use futures::future::{BoxFuture, FutureExt};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

pub const AUDIT_INTERCEPTOR: &str = "interceptors.audit";

/// Greets the caller. Bound as `controllers.greeting`.
pub struct GreetingController {
    service: Arc<GreetingService>,
    user: Option<Arc<String>>,
    timestamp: Arc<u64>,
}

impl Injectable for GreetingController {
    fn injections() -> Vec<Injection> {
        vec![
            Injection::key("services.greeting"),
            Injection::key("request.user").optional(),
            Injection::key("providers.TimestampProvider"),
        ]
    }

    fn construct(args: ResolvedArgs) -> ContextResult<Self> {
        Ok(Self {
            service: args.value::<GreetingService>(0)?,
            user: args.optional::<String>(1)?,
            timestamp: args.value::<u64>(2)?,
        })
    }

    fn binding_spec() -> BindingSpec {
        BindingSpec::new()
            .tag(("namespace", "controllers"))
            .tag(("name", "greeting"))
    }

    fn class_interceptors() -> Vec<InterceptorRef> {
        vec![InterceptorRef::key(AUDIT_INTERCEPTOR)]
    }

    fn invoke_method(self: Arc<Self>, method: &str, args: Vec<Value>) -> BoxFuture<'static, ContextResult<Value>> {
        match method {
            "greet" => {
                let name = args.first().and_then(Value::as_str).map(str::to_string);
                async move { Ok(self.greet(name.as_deref())) }.boxed()
            }
            _ => method_not_found::<Self>(method),
        }
    }
}

impl GreetingController {
    /// Greets `name`, else the request user, else the world.
    pub fn greet(&self, name: Option<&str>) -> Value {
        let name = name
            .or(self.user.as_deref().map(String::as_str))
            .unwrap_or("world");
        json!({
            "message": self.service.greet(name),
            "at": *self.timestamp,
        })
    }
}

/// Records every call with the binding path that created the proxy.
pub struct AuditInterceptor {
    log: AuditLog,
}

impl AuditInterceptor {
    pub fn new(log: &AuditLog) -> Self {
        Self { log: log.clone() }
    }
}

#[async_trait]
impl Interceptor for AuditInterceptor {
    async fn intercept(&self, invocation: &mut InvocationContext, next: Next<'_>) -> ContextResult<Value> {
        let caller = invocation
            .source_description()
            .unwrap_or_else(|| "unknown".to_string());
        self.log
            .record(format!("audit: {} by {caller}", invocation.description()));
        let result = next.run(invocation).await;
        if let Err(e) = &result {
            self.log
                .record(format!("audit: {} failed: {e}", invocation.description()));
        }
        result
    }
}

/// Logs how long each call took.
pub struct TimingInterceptor;

#[async_trait]
impl Interceptor for TimingInterceptor {
    async fn intercept(&self, invocation: &mut InvocationContext, next: Next<'_>) -> ContextResult<Value> {
        debug!(method = %invocation.description(), args = ?invocation.args, "Invocation started");
        let started = Instant::now();
        let result = next.run(invocation).await;
        info!(
            method = %invocation.description(),
            elapsed_us = started.elapsed().as_micros() as u64,
            ok = result.is_ok(),
            "Invocation finished"
        );
        result
    }
}
