use thiserror::Error;

#[derive(Debug, Error)]
#[error("transform hook failed: {0}")]
pub struct HookError(pub String);

type TransformFn =
    dyn Fn(serde_json::Value) -> Result<serde_json::Value, HookError> + Send + Sync;

/// Hooks run in registration order; `*` matches every event type. A hook
/// error aborts dispatch for that event.
#[derive(Default)]
pub struct TransformRegistry {
    hooks: Vec<(String, Box<TransformFn>)>,
}

impl TransformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, pattern: impl Into<String>, hook: F)
    where
        F: Fn(serde_json::Value) -> Result<serde_json::Value, HookError> + Send + Sync + 'static,
    {
        self.hooks.push((pattern.into(), Box::new(hook)));
    }

    pub fn apply(
        &self,
        event_type: &str,
        mut payload: serde_json::Value,
    ) -> Result<serde_json::Value, HookError> {
        for (pattern, hook) in &self.hooks {
            if pattern == "*" || pattern == event_type {
                payload = hook(payload)?;
            }
        }
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hooks_compose_in_registration_order() {
        let mut registry = TransformRegistry::new();
        registry.register("*", |mut payload| {
            payload["tag"] = json!("first");
            Ok(payload)
        });
        registry.register("lead.created", |mut payload| {
            payload["tag"] = json!(format!("{}+second", payload["tag"].as_str().unwrap_or("")));
            Ok(payload)
        });
        registry.register("other.event", |mut payload| {
            payload["tag"] = json!("never");
            Ok(payload)
        });

        let out = registry
            .apply("lead.created", json!({}))
            .expect("hooks apply");
        assert_eq!(out["tag"], json!("first+second"));
    }

    #[test]
    fn hook_error_aborts_pipeline() {
        let mut registry = TransformRegistry::new();
        registry.register("*", |_| Err(HookError("pii scrub failed".to_string())));
        registry.register("*", |mut payload| {
            payload["tag"] = json!("unreachable");
            Ok(payload)
        });

        let err = registry
            .apply("lead.created", json!({}))
            .expect_err("hook failure propagates");
        assert!(err.to_string().contains("pii scrub failed"));
    }
}
