//! Jobs: a callable plus its positional and keyword arguments.
//!
//! Jobs are either built directly from closures ([`Job::new`]) or resolved
//! from a declarative [`JobSpec`] against a [`Registry`] of named callables.
//! The declarative form is what JSON-lines sources produce.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::{PoolError, PoolResult};

/// Name used for callables created without one.
const ANONYMOUS: &str = "anonymous";

/// What a job hands back: the next job to forward downstream, if any.
pub type JobResult = Result<Option<Job>, JobError>;

type CallFn = dyn Fn(&Args) -> JobResult + Send + Sync;

/// Error returned by a job's callable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobError {
    message: String,
}

impl JobError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for JobError {}

impl From<String> for JobError {
    fn from(message: String) -> Self {
        JobError { message }
    }
}

impl From<&str> for JobError {
    fn from(message: &str) -> Self {
        JobError::new(message)
    }
}

/// A shareable, named function that jobs invoke.
#[derive(Clone)]
pub struct Callable {
    name: Arc<str>,
    func: Arc<CallFn>,
}

impl Callable {
    /// Wrap a function under the default name.
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&Args) -> JobResult + Send + Sync + 'static,
    {
        Self::named(ANONYMOUS, func)
    }

    /// Wrap a function under a name used in logs and metrics.
    pub fn named<F>(name: impl Into<Arc<str>>, func: F) -> Self
    where
        F: Fn(&Args) -> JobResult + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke the function.
    pub fn call(&self, args: &Args) -> JobResult {
        (self.func)(args)
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callable({})", self.name)
    }
}

/// Positional and keyword arguments of a job.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    positional: Vec<Value>,
    keyword: Map<String, Value>,
}

impl Args {
    /// No arguments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Positional arguments only.
    pub fn from_values<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            positional: values.into_iter().map(Into::into).collect(),
            keyword: Map::new(),
        }
    }

    pub fn from_parts(positional: Vec<Value>, keyword: Map<String, Value>) -> Self {
        Self {
            positional,
            keyword,
        }
    }

    /// Append a positional argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Set a keyword argument.
    pub fn kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.keyword.insert(key.into(), value.into());
        self
    }

    pub fn positional(&self) -> &[Value] {
        &self.positional
    }

    pub fn keyword(&self) -> &Map<String, Value> {
        &self.keyword
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    pub fn get_kwarg(&self, key: &str) -> Option<&Value> {
        self.keyword.get(key)
    }

    /// Positional argument that the callable cannot do without.
    pub fn require(&self, index: usize) -> Result<&Value, JobError> {
        self.get(index)
            .ok_or_else(|| JobError::new(format!("missing positional argument {}", index)))
    }

    /// Positional argument as an integer.
    pub fn require_i64(&self, index: usize) -> Result<i64, JobError> {
        self.require(index)?
            .as_i64()
            .ok_or_else(|| JobError::new(format!("argument {} is not an integer", index)))
    }

    /// Positional argument as a string.
    pub fn require_str(&self, index: usize) -> Result<&str, JobError> {
        self.require(index)?
            .as_str()
            .ok_or_else(|| JobError::new(format!("argument {} is not a string", index)))
    }

    pub fn len(&self) -> usize {
        self.positional.len() + self.keyword.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keyword.is_empty()
    }
}

impl From<Vec<Value>> for Args {
    fn from(positional: Vec<Value>) -> Self {
        Self {
            positional,
            keyword: Map::new(),
        }
    }
}

/// A unit of work: a callable with its arguments.
///
/// Immutable once built; a worker consumes it when executing it.
#[derive(Clone)]
pub struct Job {
    callable: Callable,
    args: Args,
}

impl Job {
    pub fn new(callable: Callable, args: Args) -> Self {
        Self { callable, args }
    }

    /// Build a job from an anonymous closure.
    pub fn from_fn<F>(func: F, args: Args) -> Self
    where
        F: Fn(&Args) -> JobResult + Send + Sync + 'static,
    {
        Self::new(Callable::new(func), args)
    }

    pub fn name(&self) -> &str {
        self.callable.name()
    }

    pub fn callable(&self) -> &Callable {
        &self.callable
    }

    pub fn args(&self) -> &Args {
        &self.args
    }

    /// Run the callable with this job's arguments.
    pub fn execute(&self) -> JobResult {
        self.callable.call(&self.args)
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("callable", &self.callable.name())
            .field("args", &self.args.positional)
            .field("kwargs", &self.args.keyword)
            .finish()
    }
}

/// Declarative job description, resolved against a [`Registry`].
///
/// Accepts either the object form
/// `{"call": "name", "args": [...], "kwargs": {...}}` or the triple form
/// `["name", [...], {...}]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub call: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

impl JobSpec {
    pub fn new(call: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            call: call.into(),
            args,
            kwargs: Map::new(),
        }
    }

    pub fn with_kwargs(mut self, kwargs: Map<String, Value>) -> Self {
        self.kwargs = kwargs;
        self
    }

    /// Parse a spec from one JSON document.
    pub fn from_json(line: &str) -> PoolResult<Self> {
        let value: Value = serde_json::from_str(line)
            .map_err(|e| PoolError::MalformedJob(format!("invalid JSON: {}", e)))?;
        Self::try_from(value)
    }
}

impl TryFrom<Value> for JobSpec {
    type Error = PoolError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Array(mut triple) => {
                if triple.len() != 3 {
                    return Err(PoolError::MalformedJob(format!(
                        "job must be a (callable, args, kwargs) triple, got {} elements",
                        triple.len()
                    )));
                }
                let kwargs = triple.pop();
                let args = triple.pop();
                let call = triple.pop();
                match (call, args, kwargs) {
                    (
                        Some(Value::String(call)),
                        Some(Value::Array(args)),
                        Some(Value::Object(kwargs)),
                    ) => Ok(JobSpec { call, args, kwargs }),
                    _ => Err(PoolError::MalformedJob(
                        "job triple must be [string, array, object]".to_string(),
                    )),
                }
            }
            object @ Value::Object(_) => serde_json::from_value(object)
                .map_err(|e| PoolError::MalformedJob(e.to_string())),
            other => Err(PoolError::MalformedJob(format!(
                "expected job object or triple, got {}",
                other
            ))),
        }
    }
}

/// Named callables that [`JobSpec`]s are resolved against.
#[derive(Clone, Default)]
pub struct Registry {
    callables: HashMap<String, Callable>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function under `name`, replacing any previous entry.
    pub fn register<F>(&mut self, name: &str, func: F) -> &mut Self
    where
        F: Fn(&Args) -> JobResult + Send + Sync + 'static,
    {
        self.callables
            .insert(name.to_string(), Callable::named(name, func));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Callable> {
        self.callables.get(name)
    }

    pub fn len(&self) -> usize {
        self.callables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callables.is_empty()
    }

    /// Turn a spec into a runnable job.
    pub fn resolve(&self, spec: JobSpec) -> PoolResult<Job> {
        if spec.call.is_empty() {
            return Err(PoolError::MalformedJob("empty callable name".to_string()));
        }
        let callable = self
            .callables
            .get(&spec.call)
            .cloned()
            .ok_or_else(|| PoolError::MalformedJob(format!("unknown callable '{}'", spec.call)))?;
        Ok(Job::new(callable, Args::from_parts(spec.args, spec.kwargs)))
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.callables.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("Registry").field("callables", &names).finish()
    }
}
