//! Routing and HTTP plumbing.
//!
//! Handlers are registered per method and path pattern (`/user/:id` captures
//! `id`). Global pre-middleware may answer a request before any handler runs;
//! post-middleware sees every response on its way out. The whole router is
//! mounted behind a single axum fallback, which converts the incoming request
//! into a [`Request`] and hands it to [`Router::dispatch`].
use crate::error::AppError;
use crate::orm::Db;
use crate::settings::Settings;
use crate::template::{TemplateValue, render_template};
use axum::Router as AxumRouter;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
pub use axum::http::Method;
use futures::future::BoxFuture;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;

/// Upper bound on buffered request bodies.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Db>,
    pub settings: Settings,
}

/// Represents the outcome of an HTTP handler.
/// Supports HTML, JSON, redirects and custom status/headers.
#[derive(Debug)]
pub struct Response {
    pub status_code: u16,
    pub body: String,
    pub headers: HashMap<String, String>,
}

/// The `{"data": ...}` wrapper every API response uses.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub data: T,
}

impl Response {
    /// Construct a new HTTP 200 response with HTML/text body.
    pub fn ok(body: impl Into<String>) -> Self {
        Response {
            status_code: 200,
            body: body.into(),
            headers: HashMap::new(),
        }
    }

    /// HTTP 200 with an explicit HTML content type.
    pub fn html(body: impl Into<String>) -> Self {
        let mut response = Response::ok(body);
        response.headers.insert(
            "Content-Type".to_string(),
            "text/html; charset=utf-8".to_string(),
        );
        response
    }

    /// HTTP 302 pointing the client at `location`.
    pub fn redirect(location: &str) -> Self {
        let mut headers = HashMap::new();
        headers.insert("Location".to_string(), location.to_string());
        Response {
            status_code: 302,
            body: String::new(),
            headers,
        }
    }

    /// Construct a new HTTP JSON response.
    /// Accepts any serde-serializable payload, status, and custom headers.
    pub fn json<T: Serialize>(
        data: T,
        status_code: u16,
        mut headers: HashMap<String, String>,
    ) -> Self {
        headers.insert(
            "Content-Type".to_string(),
            "application/json; charset=utf-8".to_string(),
        );
        match serde_json::to_string(&data) {
            Ok(body) => Response {
                status_code,
                body,
                headers,
            },
            Err(e) => {
                log::error!("JSON serialization failed: {}", e);
                Response {
                    status_code: 500,
                    body: "{\"error\": \"Serialization failed\"}".to_string(),
                    headers,
                }
            }
        }
    }

    /// HTTP 200 JSON response wrapping `data` in the API envelope.
    pub fn envelope<T: Serialize>(data: T) -> Self {
        Response::json(Envelope { data }, 200, HashMap::new())
    }
}

impl IntoResponse for Response {
    fn into_response(self) -> axum::response::Response {
        let status =
            StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut builder = axum::http::Response::builder().status(status);
        for (key, value) in &self.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        match builder.body(Body::from(self.body)) {
            Ok(response) => response,
            Err(e) => {
                log::error!("Invalid response header: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

/// An inbound request, decoupled from the HTTP server.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub path: String,
    /// Parameters captured by the matched route pattern.
    pub params: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Request {
    /// Build a request for `target`, which may carry a `?query` string.
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, parse_urlencoded(query)),
            None => (target, HashMap::new()),
        };
        Request {
            method,
            path: path.to_string(),
            params: HashMap::new(),
            query,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_body(mut self, content_type: &'static str, body: impl Into<Bytes>) -> Self {
        self.headers
            .insert(header::CONTENT_TYPE, header::HeaderValue::from_static(content_type));
        self.body = body.into();
        self
    }

    pub fn with_json(self, value: &serde_json::Value) -> Self {
        self.with_body("application/json", value.to_string())
    }

    pub fn with_form(self, fields: &[(&str, &str)]) -> Self {
        let encoded = fields
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        self.with_body("application/x-www-form-urlencoded", encoded)
    }

    pub fn content_type(&self) -> &str {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
    }

    /// The body decoded as a JSON object.
    ///
    /// The body must be declared `application/json` (or `application/*+json`).
    pub fn json(&self) -> Result<serde_json::Map<String, serde_json::Value>, AppError> {
        if !is_json_content_type(self.content_type()) {
            return Err(AppError::UnsupportedMediaType(self.content_type().to_string()));
        }
        let value = serde_json::from_slice::<serde_json::Value>(&self.body)
            .map_err(|e| AppError::BadRequest(format!("malformed JSON body: {}", e)))?;
        match value {
            serde_json::Value::Object(map) => Ok(map),
            _ => Err(AppError::NotAnObject),
        }
    }

    /// The body decoded as `application/x-www-form-urlencoded` fields.
    pub fn form(&self) -> HashMap<String, String> {
        parse_urlencoded(&String::from_utf8_lossy(&self.body))
    }

    pub fn query_param(&self, key: &str) -> Result<&str, AppError> {
        self.query
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| AppError::BadRequest(format!("missing query parameter `{}`", key)))
    }
}

/// True for `application/json` and `application/<subtype>+json`, parameters ignored.
pub fn is_json_content_type(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    mime == "application/json" || (mime.starts_with("application/") && mime.ends_with("+json"))
}

/// Decodes `a=1&b=two+words` pairs. The first occurrence of a key wins.
pub fn parse_urlencoded(input: &str) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    for pair in input.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        fields
            .entry(decode_component(key))
            .or_insert_with(|| decode_component(value));
    }
    fields
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

/// Holds metadata about the current HTTP request and its extracted path parameters.
/// Middleware can modify/read this context.
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    pub params: HashMap<String, String>,
    pub start_time: Option<Instant>,
}

pub type HandlerResult = Result<Response, AppError>;

/// Type alias for async handler functions for HTTP routes.
pub type Handler = Arc<dyn Fn(Request, AppState) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Type alias for synchronous, pre-processing middleware executed before the handler.
/// If a middleware returns Some(Response), request handling stops and this response is sent.
pub type Middleware = Arc<dyn Fn(&mut RequestContext) -> Option<Response> + Send + Sync>;

/// Type alias for post-processing middleware executed after the handler.
/// Post-middleware can inspect/modify the response before it is sent.
pub type PostMiddleware = Arc<dyn Fn(&RequestContext, Response) -> Response + Send + Sync>;

/// Wraps an async fn or closure as a [`Handler`].
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Request, AppState) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(
        move |request: Request, state: AppState| -> BoxFuture<'static, HandlerResult> {
            Box::pin(f(request, state))
        },
    )
}

/// Represents a registered HTTP route and its associated handler + middleware.
#[derive(Clone)]
pub struct Route {
    pub method: Method,
    pub path_pattern: String,
    pub handler: Handler,
    pub middlewares: Vec<Middleware>,
}

/// The application router.
/// Manages all HTTP routes and global middleware.
#[derive(Clone, Default)]
pub struct Router {
    pub routes: Vec<Route>,
    pub middlewares: Vec<Middleware>,
    pub post_middlewares: Vec<PostMiddleware>,
    pub app_state: Option<AppState>,
}

/// Maps status codes to HTTP status text.
pub fn status_text(code: u16) -> &'static str {
    match code {
        200 => "OK",
        302 => "Found",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        415 => "Unsupported Media Type",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

/// Renders `{status}.html` from the template directory with the given status.
/// Falls back to a one-line status body (still served as HTML) when the page
/// itself cannot be loaded.
pub fn error_page(settings: &Settings, status_code: u16, detail: Option<String>) -> Response {
    let mut context = HashMap::new();
    context.insert("debug".to_string(), TemplateValue::Bool(settings.debug));
    if let Some(detail) = detail {
        context.insert("error".to_string(), TemplateValue::String(detail));
    }
    let mut response = render_template(
        &settings.template.dir,
        &format!("{}.html", status_code),
        &context,
    );
    if response.status_code != 200 {
        response.body = format!("{} {}", status_code, status_text(status_code));
    }
    response.status_code = status_code;
    response
}

/// Pre-middleware stamping the request start time.
pub fn request_timer() -> Middleware {
    Arc::new(|ctx: &mut RequestContext| {
        ctx.start_time = Some(Instant::now());
        None
    })
}

/// Post-middleware writing one access log line per request.
pub fn access_log() -> PostMiddleware {
    Arc::new(|ctx: &RequestContext, response: Response| {
        let elapsed = ctx
            .start_time
            .map(|start| format!("{:?}", start.elapsed()))
            .unwrap_or_else(|| "-".to_string());
        log::info!(
            "{} {} -> {} ({})",
            ctx.method,
            ctx.path,
            response.status_code,
            elapsed
        );
        response
    })
}

impl Router {
    /// Create a new, empty application router.
    pub fn new() -> Self {
        Router::default()
    }

    /// Register an HTTP route with method, path pattern, handler, and any route-specific middleware.
    pub fn add_route(
        &mut self,
        method: Method,
        path_pattern: &str,
        handler: Handler,
        middlewares: Vec<Middleware>,
    ) {
        self.routes.push(Route {
            method,
            path_pattern: path_pattern.to_string(),
            handler,
            middlewares,
        });
    }

    /// Add a global pre-middleware to be run before all HTTP handlers.
    pub fn add_middleware(&mut self, middleware: Middleware) {
        self.middlewares.push(middleware);
    }

    /// Add a post-middleware to be run after each HTTP handler.
    pub fn add_post_middleware(&mut self, middleware: PostMiddleware) {
        self.post_middlewares.push(middleware);
    }

    pub fn set_app_state(&mut self, state: AppState) {
        self.app_state = Some(state);
    }

    fn finish(&self, ctx: &RequestContext, mut response: Response) -> Response {
        for post_middleware in &self.post_middlewares {
            response = (post_middleware)(ctx, response);
        }
        response
    }

    /// Route one request through middleware and the matching handler.
    ///
    /// Unknown paths render the 404 page, known paths under another method
    /// the 405 page, and handler errors the page for their status.
    pub async fn dispatch(&self, mut request: Request) -> Response {
        let mut ctx = RequestContext {
            method: request.method.clone(),
            path: request.path.clone(),
            params: HashMap::new(),
            start_time: None,
        };

        let Some(state) = self.app_state.clone() else {
            log::error!("App state not set in Router");
            let response = Response {
                status_code: 500,
                body: "500 Internal Server Error".to_string(),
                headers: HashMap::new(),
            };
            return self.finish(&ctx, response);
        };

        for middleware in &self.middlewares {
            if let Some(response) = (middleware)(&mut ctx) {
                return self.finish(&ctx, response);
            }
        }

        let mut path_known = false;
        let mut outcome = None;
        for route in &self.routes {
            let Some(params) = match_path(&route.path_pattern, &ctx.path) else {
                continue;
            };
            if route.method != ctx.method {
                path_known = true;
                continue;
            }
            ctx.params = params;
            for middleware in &route.middlewares {
                if let Some(response) = (middleware)(&mut ctx) {
                    return self.finish(&ctx, response);
                }
            }
            request.params = ctx.params.clone();
            outcome = Some((route.handler)(request, state.clone()).await);
            break;
        }

        let response = match outcome {
            Some(Ok(response)) => response,
            Some(Err(e)) => {
                let status_code = e.status_code();
                if status_code >= 500 {
                    log::error!("{} {} failed: {}", ctx.method, ctx.path, e);
                } else {
                    log::warn!("{} {} rejected: {}", ctx.method, ctx.path, e);
                }
                error_page(&state.settings, status_code, Some(e.to_string()))
            }
            None if path_known => error_page(&state.settings, 405, None),
            None => error_page(&state.settings, 404, None),
        };
        self.finish(&ctx, response)
    }

    /// Convert an axum request into a [`Request`] and dispatch it.
    async fn handle(&self, request: axum::extract::Request) -> Response {
        let (parts, body) = request.into_parts();
        let target = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let mut converted = Request::new(parts.method.clone(), target);
        converted.headers = parts.headers;
        converted.body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("Rejected request body for {}: {}", converted.path, e);
                return Response {
                    status_code: 400,
                    body: "400 Bad Request".to_string(),
                    headers: HashMap::new(),
                };
            }
        };
        self.dispatch(converted).await
    }

    /// Mount the router behind a single axum fallback service.
    pub fn into_axum(self) -> AxumRouter {
        let router = Arc::new(self);
        AxumRouter::new().fallback(move |request: axum::extract::Request| {
            let router = router.clone();
            async move { router.handle(request).await }
        })
    }

    /// Bind the configured address and serve until the process is stopped.
    pub async fn run(self, settings: Settings) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = settings.http_addr();
        let listener = TcpListener::bind(&addr).await?;
        log::info!("HTTP Server running on http://{}", addr);
        if settings.debug {
            log::warn!("Debug mode is on: error pages include internal error details");
        }
        axum::serve(listener, self.into_axum()).await?;
        Ok(())
    }
}

#[macro_export]
macro_rules! route {
    ($router:expr, $( $method:ident $path:expr => { $handler:expr $(, $middleware:expr )* } ),* $(,)?) => {
        $(
            $router.add_route(
                $crate::router::Method::$method,
                $path,
                $crate::router::handler($handler),
                vec![$($middleware),*]
            );
        )*
    };
}

/// Matches a path pattern (e.g. `/foo/:id`) against a real path,
/// extracting parameters into a HashMap if matched, or None if not.
pub fn match_path(pattern: &str, path: &str) -> Option<HashMap<String, String>> {
    let pattern_parts: Vec<&str> = pattern.trim_matches('/').split('/').collect();
    let path_parts: Vec<&str> = path.trim_matches('/').split('/').collect();

    if pattern_parts.len() != path_parts.len() {
        return None;
    }

    let mut params = HashMap::new();

    for (p, a) in pattern_parts.iter().zip(path_parts.iter()) {
        if let Some(name) = p.strip_prefix(':') {
            params.insert(name.to_string(), a.to_string());
        } else if p != a {
            return None;
        }
    }

    Some(params)
}
