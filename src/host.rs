//! Route table handed to plugins on the host-integration channel.
//!
//! The core never serves HTTP itself. A host (web server, RPC layer, test
//! harness) creates a [`RouteTable`], passes it through
//! `Core::integrate_host`, and serves the routes plugins registered.

use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

type RouteHandler = Arc<dyn Fn(Value) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// Shared, cloneable table of `(method, path)` routes
#[derive(Clone, Default)]
pub struct RouteTable {
    routes: Arc<Mutex<BTreeMap<(String, String), RouteHandler>>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one for the same route
    pub fn add<F, Fut>(&self, method: &str, path: &str, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let handler: RouteHandler = Arc::new(move |body| Box::pin(handler(body)));
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((method.to_uppercase(), path.to_string()), handler);
    }

    /// Registered routes as `(METHOD, path)` pairs, sorted
    pub fn routes(&self) -> Vec<(String, String)> {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Invoke the handler for a route, `None` when no such route exists
    pub async fn call(&self, method: &str, path: &str, body: Value) -> Option<anyhow::Result<Value>> {
        let handler = self
            .routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(method.to_uppercase(), path.to_string()))
            .cloned()?;
        Some(handler(body).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_route_table_dispatches_by_method_and_path() {
        let table = RouteTable::new();
        table.add("get", "/queues", |_| async { Ok(json!({"widgets": "queue-url"})) });

        assert_eq!(table.routes(), vec![("GET".to_string(), "/queues".to_string())]);

        let response = table.call("GET", "/queues", Value::Null).await.unwrap().unwrap();
        assert_eq!(response["widgets"], "queue-url");
        assert!(table.call("POST", "/queues", Value::Null).await.is_none());
    }
}
