use context_framework::keys::core_bindings;
use context_framework::{Context, InspectionOptions};
use context_sample::controllers::GreetingController;
use context_sample::lifecycle::AppSystem;
use context_sample::model::{AppConfig, AppError};
use context_sample::observers::{DataSourceObserver, ServerObserver};

/// Full run: start, serve requests, shut down.
#[tokio::test]
async fn test_application_lifecycle() {
    let system = AppSystem::new(AppConfig::default()).expect("Failed to wire application");
    system.start().await.expect("Failed to start");

    let datasource = system
        .context
        .get::<DataSourceObserver>("lifeCycleObservers.datasource")
        .await
        .unwrap();
    let server = system
        .context
        .get::<ServerObserver>("lifeCycleObservers.server")
        .await
        .unwrap();
    assert!(datasource.is_connected());
    assert!(server.is_listening());

    let response = system.handle_request(Some("alice"), None).await.unwrap();
    assert_eq!(response["message"], "Hello, alice!");
    assert!(response["at"].as_u64().is_some());

    let response = system.handle_request(None, Some("Bob")).await.unwrap();
    assert_eq!(response["message"], "Hello, Bob!");
    let response = system.handle_request(None, None).await.unwrap();
    assert_eq!(response["message"], "Hello, world!");

    let audit = system.audit.clone();
    system.shutdown().await.expect("Failed to shut down");
    assert!(!datasource.is_connected());
    assert!(!server.is_listening());

    assert_eq!(
        audit.entries(),
        vec![
            "datasource: connected to memory://greetings",
            "server: listening on 127.0.0.1:3000",
            "audit: GreetingController.greet by controllers.greeting",
            "audit: GreetingController.greet by controllers.greeting",
            "audit: GreetingController.greet by controllers.greeting",
            "server: stopped",
            "datasource: disconnected",
        ]
    );
}

#[tokio::test]
async fn test_requests_need_a_running_app() {
    let system = AppSystem::new(AppConfig::default()).unwrap();
    let err = system.handle_request(None, None).await.unwrap_err();
    assert!(matches!(err, AppError::NotRunning));
}

#[tokio::test]
async fn test_config_from_json() {
    let config = AppConfig::from_json(
        r#"{
            "greeting": "Hi",
            "server": {"port": 8080},
            "lifeCycle": {"orderedGroups": ["datasource", "server"], "parallel": true}
        }"#,
    )
    .unwrap();
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.datasource.pool_size, 4);
    assert!(config.life_cycle.parallel);

    let system = AppSystem::new(config).unwrap();
    assert_eq!(
        *system.context.get_sync::<serde_json::Value>("config#server.port").unwrap(),
        8080
    );
    system.start().await.unwrap();
    let response = system.handle_request(None, Some("Eve")).await.unwrap();
    assert_eq!(response["message"], "Hi, Eve!");
    system.shutdown().await.unwrap();
}

#[test]
fn test_invalid_config() {
    let err = AppConfig::from_json(r#"{"server": {"port": "not a number"}}"#).unwrap_err();
    assert!(err.to_string().starts_with("Invalid configuration"));
}

#[test]
fn test_wiring_is_inspectable() {
    let system = AppSystem::new(AppConfig::default()).unwrap();
    let json = system.context.inspect(InspectionOptions {
        include_injections: true,
        ..Default::default()
    });
    let bindings = &json["bindings"];
    assert_eq!(json["name"], "greeter");
    assert_eq!(bindings["services.greeting"]["scope"], "Singleton");
    assert_eq!(bindings["controllers.greeting"]["valueConstructor"], "GreetingController");
    assert_eq!(
        bindings["controllers.greeting"]["injections"]["constructorArguments"][1]["bindingKey"],
        "request.user"
    );
    assert_eq!(bindings["lifeCycleObservers.server"]["tags"]["server"], "server");
    assert!(system.context.is_bound(core_bindings::LIFE_CYCLE_OBSERVER_REGISTRY));

    let groups: Vec<String> = system
        .registry
        .observer_groups_by_order()
        .into_iter()
        .map(|g| g.group)
        .collect();
    assert_eq!(groups, vec!["datasource", "server"]);
}

#[tokio::test]
async fn test_controller_without_proxy() {
    let system = AppSystem::new(AppConfig::default()).unwrap();
    let request = Context::child_of(&system.context);
    request.bind("request.user").unwrap().to("carol".to_string());
    let controller = request.get::<GreetingController>("controllers.greeting").await.unwrap();
    assert_eq!(controller.greet(None)["message"], "Hello, carol!");
    assert!(system.audit.entries().is_empty());
}
