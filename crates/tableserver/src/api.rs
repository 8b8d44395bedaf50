use crate::error::ApiError;
use actix_web::{delete, get, post, web, HttpResponse, Responder, Result as ActixResult};
use actix_ws::Message;
use serde::Deserialize;
use std::sync::Arc;
use tablecore::NodeSpec;
use tableruntime::PipelineRuntime;
use tracing::info;

/// Application state shared across handlers
pub struct AppState {
    pub runtime: Arc<PipelineRuntime>,
}

/// Request body for workflow creation
#[derive(Debug, Deserialize)]
struct CreateWorkflowRequest {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PreviewQuery {
    #[serde(default = "default_preview_limit")]
    limit: usize,
}

fn default_preview_limit() -> usize {
    5
}

#[derive(Debug, Deserialize)]
struct NodePath {
    workflow: String,
    node: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health_check)
        .service(list_workflows)
        .service(create_workflow)
        .service(delete_workflow)
        .service(list_nodes)
        .service(add_read_node)
        .service(add_join_node)
        .service(add_filter_node)
        .service(run_workflow)
        .service(run_node)
        .service(preview_node)
        .service(clear_node)
        .service(delete_node)
        .service(export_workflow)
        .service(list_node_types)
        .service(websocket_events);
}

/// Health check endpoint
#[get("/health")]
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "tableflow"
    }))
}

#[get("/workflows")]
async fn list_workflows(data: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(data.runtime.list_workflows().await)
}

#[post("/workflow")]
async fn create_workflow(
    data: web::Data<AppState>,
    req: web::Json<CreateWorkflowRequest>,
) -> Result<HttpResponse, ApiError> {
    let summary = data.runtime.create_workflow(&req.name).await?;
    Ok(HttpResponse::Created().json(summary))
}

#[delete("/workflow/{workflow}")]
async fn delete_workflow(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let name = path.into_inner();
    data.runtime.delete_workflow(&name).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": format!("Workflow '{}' deleted", name)
    })))
}

#[get("/workflow/{workflow}/nodes")]
async fn list_nodes(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let nodes = data.runtime.list_nodes(&path).await?;
    Ok(HttpResponse::Ok().json(nodes))
}

/// Node request bodies are the node parameters without the `type` tag.
async fn add_node(
    data: &AppState,
    workflow: &str,
    node_type: &str,
    body: serde_json::Value,
) -> Result<HttpResponse, ApiError> {
    let serde_json::Value::Object(mut fields) = body else {
        return Err(ApiError::bad_request("node parameters must be a JSON object"));
    };
    fields.insert("type".to_string(), node_type.into());

    let spec: NodeSpec = serde_json::from_value(serde_json::Value::Object(fields))
        .map_err(|e| ApiError::bad_request(format!("invalid {} node: {}", node_type, e)))?;

    let info = data.runtime.add_node(workflow, spec).await?;
    Ok(HttpResponse::Created().json(info))
}

#[post("/workflow/{workflow}/read_node")]
async fn add_read_node(
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<serde_json::Value>,
) -> Result<HttpResponse, ApiError> {
    add_node(&data, &path, "read", body.into_inner()).await
}

#[post("/workflow/{workflow}/join_node")]
async fn add_join_node(
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<serde_json::Value>,
) -> Result<HttpResponse, ApiError> {
    add_node(&data, &path, "join", body.into_inner()).await
}

#[post("/workflow/{workflow}/filter_node")]
async fn add_filter_node(
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<serde_json::Value>,
) -> Result<HttpResponse, ApiError> {
    add_node(&data, &path, "filter", body.into_inner()).await
}

/// Run every node; node failures are reported in the body, not as an error status
#[post("/workflow/{workflow}/run")]
async fn run_workflow(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let report = data.runtime.run_workflow(&path).await?;
    info!(
        "Workflow '{}' ran: {} nodes, {} failed",
        report.workflow,
        report.executed.len(),
        report.failed_nodes.len()
    );
    Ok(HttpResponse::Ok().json(report))
}

#[post("/workflow/{workflow}/nodes/{node}/run")]
async fn run_node(
    data: web::Data<AppState>,
    path: web::Path<NodePath>,
) -> Result<HttpResponse, ApiError> {
    let info = data.runtime.run_node(&path.workflow, &path.node).await?;
    Ok(HttpResponse::Ok().json(info))
}

#[get("/workflow/{workflow}/nodes/{node}/preview")]
async fn preview_node(
    data: web::Data<AppState>,
    path: web::Path<NodePath>,
    query: web::Query<PreviewQuery>,
) -> Result<HttpResponse, ApiError> {
    let table = data
        .runtime
        .preview(&path.workflow, &path.node, query.limit)
        .await?;

    let columns: Vec<_> = table
        .columns
        .iter()
        .map(|c| serde_json::json!({ "name": c.name, "dtype": c.dtype }))
        .collect();

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "columns": columns,
        "rows": table.to_records(),
    })))
}

#[delete("/workflow/{workflow}/nodes/{node}/clear")]
async fn clear_node(
    data: web::Data<AppState>,
    path: web::Path<NodePath>,
) -> Result<HttpResponse, ApiError> {
    let removed = data.runtime.clear_node(&path.workflow, &path.node).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "removed": removed })))
}

#[delete("/workflow/{workflow}/nodes/{node}")]
async fn delete_node(
    data: web::Data<AppState>,
    path: web::Path<NodePath>,
) -> Result<HttpResponse, ApiError> {
    data.runtime.delete_node(&path.workflow, &path.node).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": format!("Node '{}' deleted", path.node)
    })))
}

#[get("/workflow/{workflow}/export")]
async fn export_workflow(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let export = data.runtime.export(&path).await?;
    Ok(HttpResponse::Ok().json(export))
}

/// List available node types
#[get("/api/nodes")]
async fn list_node_types(data: web::Data<AppState>) -> impl Responder {
    let registry = data.runtime.registry();

    let nodes: Vec<_> = registry
        .list_node_types()
        .iter()
        .map(|node_type| {
            let metadata = registry.get_metadata(node_type).unwrap_or_default();
            let params: Vec<_> = metadata
                .params
                .iter()
                .map(|p| {
                    serde_json::json!({
                        "name": p.name,
                        "description": p.description,
                        "required": p.required,
                    })
                })
                .collect();
            serde_json::json!({
                "type": node_type,
                "description": metadata.description,
                "category": metadata.category,
                "params": params,
            })
        })
        .collect();

    HttpResponse::Ok().json(nodes)
}

/// WebSocket endpoint for real-time events
#[get("/api/events")]
async fn websocket_events(
    req: actix_web::HttpRequest,
    stream: web::Payload,
    data: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let (res, mut session, mut msg_stream) = actix_ws::handle(&req, stream)?;

    info!("WebSocket client connected");

    let mut events = data.runtime.subscribe_events();

    actix_web::rt::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Ok(event) => {
                            if let Ok(json) = serde_json::to_string(&event) {
                                if session.text(json).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!("WebSocket client lagged, {} events dropped", n);
                        }
                        Err(_) => break,
                    }
                }

                Some(Ok(msg)) = msg_stream.recv() => {
                    match msg {
                        Message::Ping(bytes) => {
                            if session.pong(&bytes).await.is_err() {
                                break;
                            }
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }

                else => break,
            }
        }

        info!("WebSocket client disconnected");
        let _ = session.close(None).await;
    });

    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};
    use pretty_assertions::assert_eq;
    use tableruntime::RuntimeConfig;

    fn state(dir: &tempfile::TempDir) -> web::Data<AppState> {
        std::fs::write(dir.path().join("a.csv"), "id,qty\n1,5\n2,15\n3,25\n").unwrap();
        std::fs::write(dir.path().join("b.csv"), "id,city\n2,Oslo\n3,Lima\n").unwrap();
        let runtime = tablenodes::standard_runtime(
            RuntimeConfig::default()
                .with_data_dir(dir.path().join("data"))
                .with_project_root(dir.path()),
        );
        web::Data::new(AppState {
            runtime: Arc::new(runtime),
        })
    }

    #[actix_web::test]
    async fn test_workflow_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let app = test::init_service(App::new().app_data(state(&dir)).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/workflow")
            .set_json(serde_json::json!({"name": "w"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status().as_u16(), 201);

        let req = test::TestRequest::post()
            .uri("/workflow")
            .set_json(serde_json::json!({"name": "w"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status().as_u16(), 409);

        for (route, body) in [
            ("read_node", serde_json::json!({"name": "a", "file_path": "a.csv"})),
            ("read_node", serde_json::json!({"name": "b", "file_path": "b.csv"})),
            (
                "join_node",
                serde_json::json!({"name": "c", "left_table": "a", "right_table": "b", "on": "id"}),
            ),
            (
                "filter_node",
                serde_json::json!({"name": "big", "input_table": "c", "filter_expr": "qty > 20"}),
            ),
        ] {
            let req = test::TestRequest::post()
                .uri(&format!("/workflow/w/{}", route))
                .set_json(body)
                .to_request();
            assert_eq!(test::call_service(&app, req).await.status().as_u16(), 201);
        }

        let req = test::TestRequest::post().uri("/workflow/w/run").to_request();
        let report: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(report["status"], "completed");
        assert_eq!(report["failed_nodes"], serde_json::json!([]));

        let req = test::TestRequest::get()
            .uri("/workflow/w/nodes/big/preview?limit=5")
            .to_request();
        let preview: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(
            preview["rows"],
            serde_json::json!([{"id": 3, "qty": 25, "city": "Lima"}])
        );

        let req = test::TestRequest::get().uri("/workflow/w/export").to_request();
        let export: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(export["nodes"].as_array().unwrap().len(), 4);
        assert_eq!(export["nodes"][2]["type"], "join");

        let req = test::TestRequest::delete()
            .uri("/workflow/w/nodes/big/clear")
            .to_request();
        let cleared: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(cleared["removed"], 1);

        let req = test::TestRequest::delete().uri("/workflow/w").to_request();
        assert!(test::call_service(&app, req).await.status().is_success());

        let req = test::TestRequest::get().uri("/workflow/w/nodes").to_request();
        assert_eq!(test::call_service(&app, req).await.status().as_u16(), 404);
    }

    #[actix_web::test]
    async fn test_bad_requests() {
        let dir = tempfile::tempdir().unwrap();
        let data = state(&dir);
        data.runtime.create_workflow("w").await.unwrap();
        let app = test::init_service(App::new().app_data(data).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/workflow/w/filter_node")
            .set_json(serde_json::json!({"input_table": "a", "filter_expr": "qty >"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status().as_u16(), 400);

        let req = test::TestRequest::post()
            .uri("/workflow/w/read_node")
            .set_json(serde_json::json!({"table_name": "missing file_path"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status().as_u16(), 400);

        let req = test::TestRequest::post()
            .uri("/workflow/w/join_node")
            .set_json(serde_json::json!({"name": "c", "left_table": "a", "right_table": "b", "on": ["id"]}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status().as_u16(), 201);

        let req = test::TestRequest::post()
            .uri("/workflow/w/nodes/c/run")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 500);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["kind"], "resolution");

        let req = test::TestRequest::get()
            .uri("/workflow/w/nodes/zzz/preview")
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status().as_u16(), 404);
    }
}
