//! Parameter data supplier
//!
//! Named parameter providers feed values into the `{"param": name}` slots of
//! action requests. A per-invocation provider has one cursor shared by every
//! worker of a queue and wraps around when exhausted, so early values are
//! handed out again once the sequence runs out. A per-thread-static provider
//! binds one value to each worker, chosen by the worker's creation index.
//! User name providers are per-thread-static providers that also give the
//! worker its name.

use loadagent_core::{ActionRequest, ArgumentTemplate};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

use crate::error::DataConfigError;

/// Placeholder replaced by the range value in templated ranges
pub const RANGE_PLACEHOLDER: &str = "{0}";

/// Parameter filled by user name providers
pub const USERNAME_PARAMETER: &str = "username";

/// How often a provider produces a new value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterLevel {
    /// Every iteration of every worker draws the next value
    PerInvocation,
    /// Each worker keeps the value bound when it was created
    PerThreadStatic,
}

/// Where a provider's values come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataSource {
    /// A fixed list, cycled
    List { values: Vec<JsonValue> },
    /// Inclusive integer range, optionally formatted into a string template
    /// such as `"file{0}.txt"`. Without an end it runs up to `i32::MAX`.
    Range {
        start: i32,
        #[serde(default)]
        end: Option<i32>,
        #[serde(default)]
        template: Option<String>,
    },
}

/// One named parameter provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDataConfig {
    pub name: String,
    #[serde(flatten)]
    pub source: DataSource,
    /// Lists default to per-invocation, ranges to per-thread-static
    #[serde(default)]
    pub level: Option<ParameterLevel>,
    /// Workers are named after the value bound to them
    #[serde(default)]
    pub names_worker: bool,
}

impl ParameterDataConfig {
    pub fn list<I, V>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<JsonValue>,
    {
        Self {
            name: name.into(),
            source: DataSource::List {
                values: values.into_iter().map(Into::into).collect(),
            },
            level: None,
            names_worker: false,
        }
    }

    pub fn range(name: impl Into<String>, start: i32, end: Option<i32>) -> Self {
        Self {
            name: name.into(),
            source: DataSource::Range {
                start,
                end,
                template: None,
            },
            level: None,
            names_worker: false,
        }
    }

    pub fn templated_range(
        name: impl Into<String>,
        template: impl Into<String>,
        start: i32,
        end: Option<i32>,
    ) -> Self {
        Self {
            name: name.into(),
            source: DataSource::Range {
                start,
                end,
                template: Some(template.into()),
            },
            level: None,
            names_worker: false,
        }
    }

    /// One user name per worker, taken from `names` in creation order
    pub fn usernames<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        Self::list(USERNAME_PARAMETER, names).as_usernames()
    }

    /// One user name per worker, generated as in [`templated_range`](Self::templated_range)
    pub fn username_range(template: impl Into<String>, start: i32, end: i32) -> Self {
        Self::templated_range(USERNAME_PARAMETER, template, start, Some(end)).as_usernames()
    }

    fn as_usernames(mut self) -> Self {
        self.level = Some(ParameterLevel::PerThreadStatic);
        self.names_worker = true;
        self
    }

    pub fn with_level(mut self, level: ParameterLevel) -> Self {
        self.level = Some(level);
        self
    }

    pub fn effective_level(&self) -> ParameterLevel {
        self.level.unwrap_or(match self.source {
            DataSource::List { .. } => ParameterLevel::PerInvocation,
            DataSource::Range { .. } => ParameterLevel::PerThreadStatic,
        })
    }

    /// Number of distinct values before the sequence repeats
    pub fn value_count(&self) -> u64 {
        match &self.source {
            DataSource::List { values } => values.len() as u64,
            DataSource::Range { start, end, .. } => {
                let end = i64::from(end.unwrap_or(i32::MAX));
                (end - i64::from(*start) + 1).max(0) as u64
            }
        }
    }

    pub fn validate(&self) -> Result<(), DataConfigError> {
        if self.name.trim().is_empty() {
            return Err(DataConfigError::EmptyName);
        }
        if self.names_worker && self.effective_level() != ParameterLevel::PerThreadStatic {
            return Err(DataConfigError::UsernamesNotStatic(self.name.clone()));
        }
        match &self.source {
            DataSource::List { values } if values.is_empty() => {
                Err(DataConfigError::EmptyList(self.name.clone()))
            }
            DataSource::Range {
                start,
                end: Some(end),
                ..
            } if start > end => Err(DataConfigError::InvertedRange {
                name: self.name.clone(),
                start: *start,
                end: *end,
            }),
            _ => Ok(()),
        }
    }
}

/// Ordered parameter providers for one queue
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoaderDataConfig {
    pub parameters: Vec<ParameterDataConfig>,
}

impl LoaderDataConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parameter(mut self, parameter: ParameterDataConfig) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn validate(&self) -> Result<(), DataConfigError> {
        self.parameters.iter().try_for_each(ParameterDataConfig::validate)
    }

    /// User names must not repeat between the workers of a queue
    pub fn verify_usernames(&self, thread_count: usize) -> Result<(), DataConfigError> {
        for parameter in self.parameters.iter().filter(|p| p.names_worker) {
            let provided = parameter.value_count();
            if provided < thread_count as u64 {
                return Err(DataConfigError::NotEnoughUsernames {
                    provided,
                    required: thread_count,
                });
            }
        }
        Ok(())
    }

    /// Parameter names supplied by more providers than the requests consume.
    /// Returned once each, in declaration order.
    pub fn unused_parameters(&self, requests: &[ActionRequest]) -> Vec<String> {
        let mut used: HashMap<&str, usize> = HashMap::new();
        for name in requests.iter().flat_map(ActionRequest::parameter_names) {
            *used.entry(name).or_default() += 1;
        }

        let mut provided: HashMap<&str, usize> = HashMap::new();
        for parameter in &self.parameters {
            *provided.entry(parameter.name.as_str()).or_default() += 1;
        }

        let mut unused = Vec::new();
        for parameter in &self.parameters {
            let name = parameter.name.as_str();
            let surplus = provided[name] > used.get(name).copied().unwrap_or(0);
            if surplus && !unused.iter().any(|n: &String| n == name) {
                unused.push(name.to_string());
            }
        }
        unused
    }
}

#[derive(Debug)]
enum ValueSequence {
    List(Vec<JsonValue>),
    Range {
        start: i64,
        len: u64,
        template: Option<String>,
    },
}

impl ValueSequence {
    fn from_source(source: &DataSource) -> Self {
        match source {
            DataSource::List { values } => ValueSequence::List(values.clone()),
            DataSource::Range {
                start,
                end,
                template,
            } => {
                let end = i64::from(end.unwrap_or(i32::MAX));
                let start = i64::from(*start);
                ValueSequence::Range {
                    start,
                    len: (end - start + 1).max(1) as u64,
                    template: template.clone(),
                }
            }
        }
    }

    fn len(&self) -> u64 {
        match self {
            ValueSequence::List(values) => values.len() as u64,
            ValueSequence::Range { len, .. } => *len,
        }
    }

    fn value_at(&self, index: u64) -> JsonValue {
        match self {
            ValueSequence::List(values) => values[(index % values.len() as u64) as usize].clone(),
            ValueSequence::Range {
                start,
                len,
                template,
            } => {
                let value = start + (index % len) as i64;
                match template {
                    Some(template) => {
                        JsonValue::String(template.replace(RANGE_PLACEHOLDER, &value.to_string()))
                    }
                    None => JsonValue::from(value),
                }
            }
        }
    }
}

#[derive(Debug)]
struct ParameterProvider {
    name: String,
    level: ParameterLevel,
    names_worker: bool,
    values: ValueSequence,
}

/// Values bound to one worker by the per-thread-static providers,
/// indexed like the supplier's providers
#[derive(Debug, Clone, Default)]
pub struct StaticBindings {
    values: Vec<Option<JsonValue>>,
    worker_name: Option<String>,
}

impl StaticBindings {
    /// User name bound to the worker, if a user name provider is declared
    pub fn worker_name(&self) -> Option<&str> {
        self.worker_name.as_deref()
    }
}

/// Parameter values drawn for one iteration. Each request argument slot
/// consumes the first remaining value with a matching name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterValues {
    entries: Vec<(String, JsonValue)>,
}

impl ParameterValues {
    /// Remove and return the first value for `name`
    pub fn take(&mut self, name: &str) -> Option<JsonValue> {
        let position = self.entries.iter().position(|(n, _)| n == name)?;
        Some(self.entries.remove(position).1)
    }

    /// Build the concrete arguments of `request`. A slot with no remaining
    /// value receives its parameter name as a string.
    pub fn substitute(&mut self, request: &ActionRequest) -> Vec<JsonValue> {
        request
            .arguments
            .iter()
            .map(|argument| match argument {
                ArgumentTemplate::Literal(value) => value.clone(),
                ArgumentTemplate::Parameter { name } => self
                    .take(name)
                    .unwrap_or_else(|| JsonValue::String(name.clone())),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Shared supplier built from a [`LoaderDataConfig`], one per queue
#[derive(Debug)]
pub struct ParameterSupplier {
    providers: Vec<ParameterProvider>,
    cursors: Mutex<Vec<u64>>,
}

impl ParameterSupplier {
    pub fn new(config: &LoaderDataConfig) -> Result<Self, DataConfigError> {
        config.validate()?;
        let providers: Vec<ParameterProvider> = config
            .parameters
            .iter()
            .map(|parameter| ParameterProvider {
                name: parameter.name.clone(),
                level: parameter.effective_level(),
                names_worker: parameter.names_worker,
                values: ValueSequence::from_source(&parameter.source),
            })
            .collect();
        let cursors = Mutex::new(vec![0; providers.len()]);
        Ok(Self { providers, cursors })
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Bind the per-thread-static values of the worker created `worker_index`-th
    pub fn bind_static(&self, worker_index: usize) -> StaticBindings {
        let values: Vec<Option<JsonValue>> = self
            .providers
            .iter()
            .map(|provider| match provider.level {
                ParameterLevel::PerThreadStatic => {
                    Some(provider.values.value_at(worker_index as u64))
                }
                ParameterLevel::PerInvocation => None,
            })
            .collect();

        let worker_name = self
            .providers
            .iter()
            .zip(&values)
            .find(|(provider, _)| provider.names_worker)
            .and_then(|(_, value)| value.as_ref())
            .map(|value| match value {
                JsonValue::String(name) => name.clone(),
                other => other.to_string(),
            });
        StaticBindings {
            values,
            worker_name,
        }
    }

    /// Draw one value from every provider, in declaration order. All
    /// per-invocation cursors advance under a single lock.
    pub fn draw(&self, bindings: &StaticBindings) -> ParameterValues {
        if self.providers.is_empty() {
            return ParameterValues::default();
        }

        let mut cursors = self.cursors.lock();
        let entries = self
            .providers
            .iter()
            .enumerate()
            .map(|(index, provider)| {
                let value = match (provider.level, bindings.values.get(index)) {
                    (ParameterLevel::PerThreadStatic, Some(Some(bound))) => bound.clone(),
                    _ => {
                        let cursor = &mut cursors[index];
                        let value = provider.values.value_at(*cursor);
                        *cursor = (*cursor + 1) % provider.values.len();
                        value
                    }
                };
                (provider.name.clone(), value)
            })
            .collect();
        ParameterValues { entries }
    }
}
