use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use indexmap::IndexMap;
use relay_engine::{
    ChainExecutor, ExecutionOptions, HttpExecutor, Plugin, PluginRegistrar, PluginRegistry, VariableContext,
    plugin::{CorePlugin, PostResponseHook, PreRequestHook},
};
use relay_types::{HttpRequest, HttpResponse, RelayConfig};

const CONFIG: &str = r#"
apis:
  users:
    baseUrl: "https://{{host}}"
    headers:
      Accept: application/json
      X-Format: "{{format?}}"
    variables:
      host: api.example.com
      region: api
    endpoints:
      create:
        method: post
        path: /users
        body:
          name: "{{name}}"
      get:
        path: "/users/{{userId}}"
      missing:
        path: /missing
      echo:
        path: /echo
      region:
        path: "/region/{{region}}"
        variables:
          region: endpoint
profiles:
  dev:
    region: profile
    name: dev-user
chains:
  onboard:
    vars:
      name: ada
    steps:
      - id: create
        call: users.create
      - id: fetch
        call: users.get
        with:
          pathParams:
            userId: "{{steps.create.response.body.id}}"
          headers:
            X-Created-Status: "{{steps.create.response.status}}"
  three:
    vars:
      userId: "1"
    steps:
      - id: first
        call: users.get
      - id: second
        call: users.missing
      - id: third
        call: users.get
  forward:
    vars:
      name: x
    steps:
      - id: early
        call: users.get
        with:
          pathParams:
            userId: "{{steps.late.response.body.id}}"
      - id: late
        call: users.create
  bad_call:
    steps:
      - id: broken
        call: users
  unknown_api:
    steps:
      - id: nowhere
        call: billing.list
  braces:
    steps:
      - id: one
        call: users.echo
      - id: two
        call: users.get
        with:
          pathParams:
            userId: "{{steps.one.response.body.id}}"
  dupes:
    vars:
      userId: "1"
      name: ada
    steps:
      - id: x
        call: users.get
      - id: x
        call: users.create
      - id: after
        call: users.get
  unresolved:
    steps:
      - id: needs
        call: users.get
"#;

#[derive(Default)]
struct RecordingExecutor {
    requests: Mutex<Vec<HttpRequest>>,
}

impl RecordingExecutor {
    fn urls(&self) -> Vec<String> {
        self.requests
            .lock()
            .expect("lock")
            .iter()
            .map(|request| request.url.clone())
            .collect()
    }
}

#[async_trait]
impl HttpExecutor for RecordingExecutor {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        self.requests.lock().expect("lock").push(request.clone());
        let response = if request.url.ends_with("/echo") {
            HttpResponse {
                status: 200,
                status_text: "OK".into(),
                body: r#"{"id": "{{oops}}"}"#.into(),
                ..HttpResponse::default()
            }
        } else if request.url.ends_with("/missing") {
            HttpResponse {
                status: 404,
                status_text: "Not Found".into(),
                body: r#"{"error":"missing"}"#.into(),
                ..HttpResponse::default()
            }
        } else if request.method == "POST" {
            HttpResponse {
                status: 201,
                status_text: "Created".into(),
                body: r#"{"id": 42}"#.into(),
                ..HttpResponse::default()
            }
        } else {
            HttpResponse {
                status: 200,
                status_text: "OK".into(),
                body: "fine".into(),
                ..HttpResponse::default()
            }
        };
        Ok(response)
    }
}

struct FailingExecutor;

#[async_trait]
impl HttpExecutor for FailingExecutor {
    async fn execute(&self, _request: &HttpRequest) -> Result<HttpResponse> {
        Err(anyhow!("connection refused"))
    }
}

fn config() -> RelayConfig {
    serde_yaml::from_str(CONFIG).expect("config parses")
}

fn executor_with(http: Arc<RecordingExecutor>, plugins: PluginRegistry, options: ExecutionOptions) -> ChainExecutor {
    ChainExecutor::new(http, Arc::new(plugins), options)
}

fn recording() -> (Arc<RecordingExecutor>, ChainExecutor) {
    let http = Arc::new(RecordingExecutor::default());
    let executor = executor_with(Arc::clone(&http), PluginRegistry::empty(), ExecutionOptions::default());
    (http, executor)
}

#[tokio::test]
async fn later_steps_read_earlier_responses() {
    let (http, executor) = recording();
    let result = executor
        .run(&config(), "onboard", VariableContext::new())
        .await
        .expect("chain exists");

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.steps.len(), 2);
    assert_eq!(http.urls(), vec!["https://api.example.com/users", "https://api.example.com/users/42"]);

    let create = result.step("create").expect("create step");
    assert_eq!(create.request.method, "POST");
    assert_eq!(create.request.body, Some(serde_json::json!({"name": "ada"})));
    assert!(!create.request.headers.contains_key("X-Format"));

    let fetch = result.step("fetch").expect("fetch step");
    assert_eq!(fetch.request.headers.get("X-Created-Status").map(String::as_str), Some("201"));
}

#[tokio::test]
async fn chain_stops_at_first_failure() {
    let (http, executor) = recording();
    let result = executor
        .run(&config(), "three", VariableContext::new())
        .await
        .expect("chain exists");

    assert!(!result.success);
    assert_eq!(result.steps.len(), 2);
    assert_eq!(result.steps[0].step_id, "first");
    assert_eq!(result.steps[1].step_id, "second");
    assert_eq!(result.steps[1].response.status, 404);
    assert_eq!(result.steps[1].error.as_deref(), Some("HTTP 404 Not Found"));
    assert_eq!(result.error.as_deref(), Some("Step 'second' failed: HTTP 404 Not Found"));
    assert_eq!(http.urls().len(), 2);
    assert!(result.step("third").is_none());
}

#[tokio::test]
async fn referencing_a_later_step_fails() {
    let (http, executor) = recording();
    let result = executor
        .run(&config(), "forward", VariableContext::new())
        .await
        .expect("chain exists");

    assert!(!result.success);
    assert_eq!(result.steps.len(), 1);
    let error = result.steps[0].error.as_deref().expect("error");
    assert!(error.starts_with("Variable resolution failed: "), "{error}");
    assert!(error.contains("steps.late.response.body.id"), "{error}");
    assert_eq!(result.steps[0].request, HttpRequest::default());
    assert!(http.urls().is_empty());
}

#[tokio::test]
async fn step_values_in_path_params_are_used_verbatim() {
    let (http, executor) = recording();
    let result = executor
        .run(&config(), "braces", VariableContext::new())
        .await
        .expect("chain exists");

    assert!(result.success, "{:?}", result.error);
    assert_eq!(
        http.urls(),
        vec!["https://api.example.com/echo", "https://api.example.com/users/{{oops}}"]
    );
}

#[tokio::test]
async fn duplicate_step_ids_fail_before_dispatch() {
    let (http, executor) = recording();
    let result = executor
        .run(&config(), "dupes", VariableContext::new())
        .await
        .expect("chain exists");

    assert!(!result.success);
    assert_eq!(result.steps.len(), 2);
    assert_eq!(result.steps[1].request, HttpRequest::default());
    assert_eq!(result.error.as_deref(), Some("Step 'x' failed: duplicate step id 'x'"));
    assert_eq!(http.urls(), vec!["https://api.example.com/users/1"]);
}

#[tokio::test]
async fn dry_runs_are_idempotent_and_silent() {
    let http = Arc::new(RecordingExecutor::default());
    let executor = executor_with(Arc::clone(&http), PluginRegistry::empty(), ExecutionOptions::dry_run());
    let config = config();

    let first = executor
        .run(&config, "three", VariableContext::new())
        .await
        .expect("first run");
    let second = executor
        .run(&config, "three", VariableContext::new())
        .await
        .expect("second run");

    assert!(first.success);
    assert_eq!(first.steps.len(), 3);
    assert!(first.steps.iter().all(|step| step.response.status == 200 && step.success));
    assert_eq!(first, second);
    assert!(http.urls().is_empty());
}

#[tokio::test]
async fn malformed_calls_and_unknown_apis_fail_the_step() {
    let (http, executor) = recording();
    let config = config();

    let bad_call = executor
        .run(&config, "bad_call", VariableContext::new())
        .await
        .expect("chain exists");
    assert_eq!(
        bad_call.error.as_deref(),
        Some("Step 'broken' failed: invalid call 'users': expected '<api>.<endpoint>'")
    );

    let unknown = executor
        .run(&config, "unknown_api", VariableContext::new())
        .await
        .expect("chain exists");
    assert_eq!(unknown.error.as_deref(), Some("Step 'nowhere' failed: unknown API 'billing'"));
    assert!(http.urls().is_empty());
}

#[tokio::test]
async fn unresolved_variables_carry_the_prefix() {
    let (_, executor) = recording();
    let result = executor
        .run(&config(), "unresolved", VariableContext::new())
        .await
        .expect("chain exists");
    assert_eq!(
        result.steps[0].error.as_deref(),
        Some("Variable resolution failed: variable 'userId' is not defined in any scope")
    );
}

#[tokio::test]
async fn transport_errors_are_step_failures() {
    let executor = ChainExecutor::new(Arc::new(FailingExecutor), Arc::new(PluginRegistry::empty()), ExecutionOptions::default());
    let result = executor
        .run(&config(), "three", VariableContext::new())
        .await
        .expect("chain exists");
    assert_eq!(result.steps.len(), 1);
    assert_eq!(result.steps[0].request.url, "https://api.example.com/users/1");
    assert_eq!(result.steps[0].error.as_deref(), Some("Transport error: connection refused"));
}

#[tokio::test]
async fn unqualified_names_follow_scope_precedence() {
    let (_, executor) = recording();
    let mut config = config();
    let mut base = VariableContext::new();
    base.apply_profiles(&config, &["dev".to_string()]).expect("profile exists");

    let with_cli = base.clone().with_cli_variables([("region", "cli")]);
    let cli_wins = executor.call_endpoint(&config, "users", "region", &with_cli).await;
    assert_eq!(cli_wins.request.url, "https://api.example.com/region/cli");
    assert_eq!(cli_wins.step_id, "users.region");

    let endpoint_wins = executor.call_endpoint(&config, "users", "region", &base).await;
    assert_eq!(endpoint_wins.request.url, "https://api.example.com/region/endpoint");

    let api = config.apis.get_mut("users").expect("api");
    api.endpoints
        .get_mut("region")
        .expect("endpoint")
        .variables
        .shift_remove("region");
    let api_wins = executor.call_endpoint(&config, "users", "region", &base).await;
    assert_eq!(api_wins.request.url, "https://api.example.com/region/api");

    config
        .apis
        .get_mut("users")
        .expect("api")
        .variables
        .shift_remove("region");
    let profile_wins = executor.call_endpoint(&config, "users", "region", &base).await;
    assert_eq!(profile_wins.request.url, "https://api.example.com/region/profile");
}

struct Hooks {
    seen: Arc<Mutex<Vec<String>>>,
    fail_after: bool,
}

struct StampHeader;

#[async_trait]
impl PreRequestHook for StampHeader {
    async fn before_request(&self, request: &mut HttpRequest) -> Result<()> {
        request.headers.insert("X-Stamp".into(), "1".into());
        Ok(())
    }
}

struct Observe {
    seen: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

#[async_trait]
impl PostResponseHook for Observe {
    async fn after_response(&self, request: &HttpRequest, response: &mut HttpResponse) -> Result<()> {
        self.seen.lock().expect("lock").push(format!("{} {}", response.status, request.url));
        if self.fail {
            return Err(anyhow!("schema mismatch"));
        }
        Ok(())
    }
}

impl Plugin for Hooks {
    fn name(&self) -> &str {
        "hooks"
    }

    fn setup(&self, registrar: &mut PluginRegistrar<'_>) -> Result<()> {
        registrar.register_pre_request_hook(StampHeader);
        registrar.register_post_response_hook(Observe {
            seen: Arc::clone(&self.seen),
            fail: self.fail_after,
        });
        Ok(())
    }
}

fn hooked(fail_after: bool, options: ExecutionOptions) -> (Arc<RecordingExecutor>, Arc<Mutex<Vec<String>>>, ChainExecutor) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let plugins = PluginRegistry::builder()
        .install(Hooks {
            seen: Arc::clone(&seen),
            fail_after,
        })
        .expect("install hooks")
        .build();
    let http = Arc::new(RecordingExecutor::default());
    let executor = executor_with(Arc::clone(&http), plugins, options);
    (http, seen, executor)
}

#[tokio::test]
async fn hooks_wrap_every_dispatch() {
    let (http, seen, executor) = hooked(false, ExecutionOptions::default());
    let result = executor
        .run(&config(), "onboard", VariableContext::new())
        .await
        .expect("chain exists");
    assert!(result.success);
    assert!(
        http.requests
            .lock()
            .expect("lock")
            .iter()
            .all(|request| request.headers.get("X-Stamp").map(String::as_str) == Some("1"))
    );
    assert_eq!(
        *seen.lock().expect("lock"),
        vec!["201 https://api.example.com/users", "200 https://api.example.com/users/42"]
    );
}

#[tokio::test]
async fn failing_post_response_hook_fails_the_step() {
    let (_, _, executor) = hooked(true, ExecutionOptions::default());
    let result = executor
        .run(&config(), "onboard", VariableContext::new())
        .await
        .expect("chain exists");
    assert_eq!(result.steps.len(), 1);
    assert_eq!(result.steps[0].response.status, 201);
    assert_eq!(
        result.error.as_deref(),
        Some("Step 'create' failed: post-response hook 'hooks' failed: schema mismatch")
    );
}

#[tokio::test]
async fn dry_runs_apply_pre_request_hooks_only() {
    let (http, seen, executor) = hooked(true, ExecutionOptions::dry_run());
    let result = executor
        .run(&config(), "three", VariableContext::new())
        .await
        .expect("chain exists");
    assert!(result.success);
    assert_eq!(result.steps[0].request.headers.get("X-Stamp").map(String::as_str), Some("1"));
    assert!(seen.lock().expect("lock").is_empty());
    assert!(http.urls().is_empty());
}

#[tokio::test]
async fn core_plugin_values_flow_into_requests() {
    let http = Arc::new(RecordingExecutor::default());
    let plugins = PluginRegistry::builder()
        .install(CorePlugin)
        .expect("install core")
        .build();
    let executor = executor_with(Arc::clone(&http), plugins, ExecutionOptions::default());
    let context = VariableContext::new().with_cli_variables([("userId", "{{plugins.core.upper('abc')}}")]);

    let result = executor
        .call_endpoint(&config(), "users", "get", &context)
        .await;
    assert!(result.success);
    assert_eq!(result.request.url, "https://api.example.com/users/ABC");

    let mut headers = IndexMap::new();
    headers.insert("Accept".to_string(), "application/json".to_string());
    assert_eq!(result.request.headers, headers);
}
