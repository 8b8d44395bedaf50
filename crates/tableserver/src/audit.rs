use std::path::{Path, PathBuf};
use tablecore::ExecutionEvent;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast::{error::RecvError, Receiver};

pub const AUDIT_FILE: &str = "audit.jsonl";

/// Append every `Action` event as one JSON line until the bus closes.
///
/// Write failures are logged and the event is dropped; lagging drops the
/// events that were overwritten.
pub async fn run_audit_writer(mut events: Receiver<ExecutionEvent>, path: PathBuf) {
    if let Some(parent) = path.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            tracing::error!("Audit log disabled, cannot create {}: {}", parent.display(), e);
            return;
        }
    }

    tracing::info!("Writing audit log to {}", path.display());

    loop {
        match events.recv().await {
            Ok(event @ ExecutionEvent::Action { .. }) => {
                if let Err(e) = append(&path, &event).await {
                    tracing::warn!("Failed to write audit record: {}", e);
                }
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!("Audit writer lagged, {} events dropped", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
}

async fn append(path: &Path, event: &ExecutionEvent) -> std::io::Result<()> {
    let mut line = serde_json::to_vec(event)?;
    line.push(b'\n');

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(&line).await?;
    file.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tablecore::EventBus;

    #[tokio::test]
    async fn test_writes_only_actions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join(AUDIT_FILE);
        let bus = Arc::new(EventBus::new(16));

        let writer = tokio::spawn(run_audit_writer(bus.subscribe(), path.clone()));

        bus.record_action(Some("w"), "create_workflow", serde_json::json!({"name": "w"}));
        bus.record_action(None, "delete_workflow", serde_json::Value::Null);
        drop(bus);
        writer.await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["action"], "create_workflow");
        assert_eq!(lines[0]["workflow"], "w");
        assert!(lines[1]["timestamp"].is_string());
    }
}
