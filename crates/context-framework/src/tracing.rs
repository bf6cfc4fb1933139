//! # Observability & Tracing
//!
//! The framework logs through the `tracing` crate and never installs a subscriber on
//! its own. Binaries call [`setup_tracing`] once at startup.
//!
//! ## What Gets Traced
//!
//! | Level | Events |
//! |-------|--------|
//! | `info` | life cycle registry start/stop, group notifications |
//! | `warn` | failing life cycle observers (the error is still returned), invalid patterns |
//! | `debug` | bind, unbind, resolution, cache hits, constructions, interceptor chains |
//! | `trace` | glob-to-regex translation |
//!
//! Every [`Context`](crate::Context) owns a span `context{name=...}`, so nested
//! resolutions show up under the context that performed them:
//!
//! ```text
//! DEBUG context{name="app"}: Bind key=services.greeter
//! DEBUG context{name="request"}: Resolving key=services.greeter
//! DEBUG context{name="request"}: Constructing class="GreeterService"
//! ```
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=info cargo run
//! RUST_LOG=context_framework=debug cargo run
//! ```
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();
}
