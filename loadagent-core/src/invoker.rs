//! The action invoker capability and a name-keyed component repository

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use crate::action::ActionRequest;
use crate::error::{InvokeError, InvokeResult};

/// Resolves and executes action calls on behalf of load queue workers.
///
/// The execution engine only depends on this trait; how a name is mapped to
/// code is up to the implementation.
#[async_trait]
pub trait ActionInvoker: Send + Sync {
    /// Check that `request` can be dispatched, without running it.
    /// Called once per request before a queue is created.
    fn resolve(&self, request: &ActionRequest) -> InvokeResult<()>;

    /// Execute one action call with fully substituted arguments
    async fn invoke(
        &self,
        component: &str,
        action: &str,
        arguments: Vec<JsonValue>,
    ) -> InvokeResult<JsonValue>;
}

/// Type-erased async action body. An `Err` message becomes
/// [`InvokeError::InternalComponent`].
pub type ActionHandler =
    Arc<dyn Fn(Vec<JsonValue>) -> BoxFuture<'static, Result<JsonValue, String>> + Send + Sync>;

#[derive(Clone)]
struct RegisteredAction {
    handler: ActionHandler,
    arity: Option<usize>,
}

/// In-process [`ActionInvoker`] backed by registered components.
///
/// Each component owns a set of named actions; an action may declare a fixed
/// arity, in which case requests with a different argument count fail
/// resolution with [`InvokeError::NoCompatibleMethod`].
#[derive(Clone, Default)]
pub struct ComponentRepository {
    components: HashMap<String, HashMap<String, RegisteredAction>>,
}

impl ComponentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an empty component so that its actions can be added later
    pub fn register_component(&mut self, component: impl Into<String>) -> &mut Self {
        self.components.entry(component.into()).or_default();
        self
    }

    /// Register an async action. `arity` of `None` accepts any argument count.
    pub fn register_action<F, Fut>(
        &mut self,
        component: impl Into<String>,
        action: impl Into<String>,
        arity: Option<usize>,
        body: F,
    ) -> &mut Self
    where
        F: Fn(Vec<JsonValue>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<JsonValue, String>> + Send + 'static,
    {
        let component = component.into();
        let action = action.into();
        tracing::debug!(component = %component, action = %action, ?arity, "Registering action");

        let handler: ActionHandler = Arc::new(move |args| body(args).boxed());
        self.components
            .entry(component)
            .or_default()
            .insert(action, RegisteredAction { handler, arity });
        self
    }

    pub fn has_component(&self, component: &str) -> bool {
        self.components.contains_key(component)
    }

    /// Action names of a component, sorted
    pub fn actions(&self, component: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .components
            .get(component)
            .map(|actions| actions.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    fn lookup(&self, component: &str, action: &str) -> InvokeResult<&RegisteredAction> {
        let actions = self
            .components
            .get(component)
            .ok_or_else(|| InvokeError::NoSuchComponent(component.to_string()))?;
        actions.get(action).ok_or_else(|| InvokeError::NoSuchAction {
            component: component.to_string(),
            action: action.to_string(),
        })
    }

    fn check_arity(
        registered: &RegisteredAction,
        component: &str,
        action: &str,
        given: usize,
    ) -> InvokeResult<()> {
        match registered.arity {
            Some(expected) if expected != given => Err(InvokeError::NoCompatibleMethod {
                component: component.to_string(),
                action: action.to_string(),
                reason: format!("expected {} arguments, got {}", expected, given),
            }),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ActionInvoker for ComponentRepository {
    fn resolve(&self, request: &ActionRequest) -> InvokeResult<()> {
        let registered = self.lookup(&request.component, &request.action)?;
        Self::check_arity(
            registered,
            &request.component,
            &request.action,
            request.arguments.len(),
        )
    }

    async fn invoke(
        &self,
        component: &str,
        action: &str,
        arguments: Vec<JsonValue>,
    ) -> InvokeResult<JsonValue> {
        let registered = self.lookup(component, action)?;
        Self::check_arity(registered, component, action, arguments.len())?;

        let handler = registered.handler.clone();
        handler(arguments)
            .await
            .map_err(|message| InvokeError::InternalComponent {
                component: component.to_string(),
                action: action.to_string(),
                message,
            })
    }
}
