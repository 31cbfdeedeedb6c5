//! ABOUTME: Tree-walking evaluator for the constrained artifact AST
//! ABOUTME: The only environment an artifact sees: JSON values, the host-call surface, and a log sink

use automaton_core::error::{AgentError, Result};
use automaton_core::traits::{FetchOptions, HostCallSurface, HttpMethod};
use automaton_core::types::{ExecutionLogLine, LogLevel};
use automaton_security::{ArtifactProgram, BinOp, Expr, HostCall, Stmt};
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Coarse proxy for heap growth: sum of the serialized size of every
/// value ever bound to a variable. Real byte-accurate accounting isn't
/// meaningful for a tree-walking JSON interpreter; this still gives the
/// "memory_exhausted" outcome a real trigger instead of one that can never
/// fire.
struct MemoryMeter {
    used: u64,
    cap: u64,
}

impl MemoryMeter {
    fn charge(&mut self, value: &Value) -> Result<()> {
        let size = serde_json::to_vec(value).map(|v| v.len() as u64).unwrap_or(0);
        self.used += size;
        if self.used > self.cap {
            return Err(AgentError::SandboxMemory { used: self.used, cap: self.cap });
        }
        Ok(())
    }
}

enum Flow {
    Next,
    Returned(Option<Value>),
}

pub struct Vm<'a> {
    surface: &'a dyn HostCallSurface,
    vars: HashMap<String, Value>,
    logs: Arc<Mutex<Vec<ExecutionLogLine>>>,
    meter: MemoryMeter,
}

pub struct RunOutcome {
    pub value: Option<Value>,
}

impl<'a> Vm<'a> {
    /// Returns the `Vm` alongside a handle to its log sink. The handle
    /// stays valid even if the `Vm` itself is dropped mid-run (e.g. the
    /// caller's `tokio::time::timeout` elapses and drops the future): logs
    /// pushed before the drop are still readable through it, which is the
    /// only way a timed-out run can still report logs collected so far.
    #[must_use]
    pub fn new(surface: &'a dyn HostCallSurface, memory_cap_bytes: u64) -> (Self, Arc<Mutex<Vec<ExecutionLogLine>>>) {
        let logs = Arc::new(Mutex::new(Vec::new()));
        let vm = Self {
            surface,
            vars: HashMap::new(),
            logs: Arc::clone(&logs),
            meter: MemoryMeter { used: 0, cap: memory_cap_bytes },
        };
        (vm, logs)
    }

    pub async fn run(mut self, program: &ArtifactProgram) -> Result<RunOutcome> {
        match self.run_block(&program.statements).await? {
            Flow::Returned(value) => Ok(RunOutcome { value }),
            Flow::Next => Ok(RunOutcome { value: None }),
        }
    }

    fn push_log(&self, entry: ExecutionLogLine) {
        self.logs.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push(entry);
    }

    async fn run_block(&mut self, statements: &[Stmt]) -> Result<Flow> {
        for stmt in statements {
            match self.run_stmt(stmt).await? {
                Flow::Next => continue,
                returned @ Flow::Returned(_) => return Ok(returned),
            }
        }
        Ok(Flow::Next)
    }

    async fn run_stmt(&mut self, stmt: &Stmt) -> Result<Flow> {
        match stmt {
            Stmt::Let { name, value } | Stmt::Assign { name, value } => {
                let v = self.eval(value).await?;
                self.meter.charge(&v)?;
                self.vars.insert(name.clone(), v);
                Ok(Flow::Next)
            }
            Stmt::Expr(expr) => {
                self.eval(expr).await?;
                Ok(Flow::Next)
            }
            Stmt::If { cond, then_branch, else_branch } => {
                if truthy(&self.eval(cond).await?) {
                    self.run_block(then_branch).await
                } else {
                    self.run_block(else_branch).await
                }
            }
            Stmt::Return(expr) => {
                let v = match expr {
                    Some(e) => Some(self.eval(e).await?),
                    None => None,
                };
                Ok(Flow::Returned(v))
            }
            Stmt::Log(expr) => {
                let v = self.eval(expr).await?;
                self.push_log(ExecutionLogLine {
                    level: LogLevel::Info,
                    message: value_to_text(&v),
                    timestamp: Utc::now(),
                });
                Ok(Flow::Next)
            }
        }
    }

    fn eval<'b>(&'b mut self, expr: &'b Expr) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Value>> + 'b>> {
        Box::pin(async move {
            match expr {
                Expr::Literal(v) => Ok(v.clone()),
                Expr::Var(name) => Ok(self.vars.get(name).cloned().unwrap_or(Value::Null)),
                Expr::Not(inner) => {
                    let v = self.eval(inner).await?;
                    Ok(Value::Bool(!truthy(&v)))
                }
                Expr::FieldAccess { base, field } => {
                    let v = self.eval(base).await?;
                    Ok(v.get(field).cloned().unwrap_or(Value::Null))
                }
                Expr::BinOp { op, lhs, rhs } => {
                    let l = self.eval(lhs).await?;
                    let r = self.eval(rhs).await?;
                    Ok(eval_binop(*op, &l, &r))
                }
                Expr::HostCall { call, args } => {
                    let mut evaluated = Vec::with_capacity(args.len());
                    for a in args {
                        evaluated.push(self.eval(a).await?);
                    }
                    self.run_host_call(*call, evaluated).await
                }
            }
        })
    }

    async fn run_host_call(&mut self, call: HostCall, args: Vec<Value>) -> Result<Value> {
        match self.dispatch_host_call(call, args).await {
            Ok(v) => Ok(v),
            Err(e @ AgentError::SandboxRuntime { .. }) => {
                // a malformed call from the artifact itself (wrong argument
                // shape) — a genuine sandbox-runtime fault, not a
                // downstream integration failure, so it aborts the run and
                // stays eligible for auto-repair.
                self.push_log(ExecutionLogLine {
                    level: LogLevel::Error,
                    message: format!("host call {call:?} failed: {e}"),
                    timestamp: Utc::now(),
                });
                Err(e)
            }
            Err(e) => {
                // downstream integration failure (fetch/chain/plugin/state)
                // — one synthetic log entry, then a structured error value
                // handed back to the artifact; the run continues.
                self.push_log(ExecutionLogLine {
                    level: LogLevel::Error,
                    message: format!("host call {call:?} failed: {e}"),
                    timestamp: Utc::now(),
                });
                Ok(serde_json::json!({ "error": e.to_string() }))
            }
        }
    }

    async fn dispatch_host_call(&mut self, call: HostCall, mut args: Vec<Value>) -> Result<Value> {
        match call {
            HostCall::Notify => {
                let text = args.first().and_then(Value::as_str).unwrap_or_default().to_string();
                self.surface.notify(&text).await;
                Ok(Value::Null)
            }
            HostCall::GetState => {
                let key = arg_str(&args, 0)?;
                let v = self.surface.get_state(&key).await?;
                Ok(v.unwrap_or(Value::Null))
            }
            HostCall::SetState => {
                let key = arg_str(&args, 0)?;
                let value = args.get(1).cloned().unwrap_or(Value::Null);
                self.surface.set_state(&key, value).await?;
                Ok(Value::Null)
            }
            HostCall::Fetch => {
                let url = arg_str(&args, 0)?;
                let opts = args.get(1).cloned().map(parse_fetch_options).unwrap_or_default();
                let resp = self.surface.fetch(&url, opts).await?;
                Ok(serde_json::json!({
                    "status": resp.status,
                    "headers": resp.headers,
                    "body": resp.body,
                }))
            }
            HostCall::GetTonBalance => {
                let address = arg_str(&args, 0)?;
                let balance = self.surface.get_ton_balance(&address).await?;
                Ok(serde_json::json!(balance.to_string()))
            }
            HostCall::GetSecret => {
                let name = arg_str(&args, 0)?;
                let v = self.surface.get_secret(&name).await?;
                Ok(v.map(Value::String).unwrap_or(Value::Null))
            }
            HostCall::CallPlugin => {
                let plugin_id = arg_str(&args, 0)?;
                let op = arg_str(&args, 1)?;
                let call_args = args.drain(2..).next().unwrap_or(Value::Null);
                self.surface.call_plugin(&plugin_id, &op, call_args).await
            }
        }
    }
}

fn arg_str(args: &[Value], idx: usize) -> Result<String> {
    args.get(idx)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| AgentError::sandbox_runtime(format!("expected string argument at position {idx}")))
}

fn parse_fetch_options(v: Value) -> FetchOptions {
    let method = match v.get("method").and_then(Value::as_str) {
        Some("POST") | Some("post") => HttpMethod::Post,
        Some("PUT") | Some("put") => HttpMethod::Put,
        Some("DELETE") | Some("delete") => HttpMethod::Delete,
        _ => HttpMethod::Get,
    };
    let headers = v
        .get("headers")
        .and_then(Value::as_object)
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default();
    let body = v.get("body").and_then(Value::as_str).map(str::to_string);
    let timeout_ms = v.get("timeout_ms").and_then(Value::as_u64).unwrap_or(10_000);
    FetchOptions { method, headers, body, timeout_ms }
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn value_to_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn eval_binop(op: BinOp, l: &Value, r: &Value) -> Value {
    let lf = l.as_f64();
    let rf = r.as_f64();
    match op {
        BinOp::Add => match (lf, rf) {
            (Some(a), Some(b)) => serde_json::json!(a + b),
            _ => Value::String(format!("{}{}", value_to_text(l), value_to_text(r))),
        },
        BinOp::Sub => serde_json::json!(lf.unwrap_or(0.0) - rf.unwrap_or(0.0)),
        BinOp::Mul => serde_json::json!(lf.unwrap_or(0.0) * rf.unwrap_or(0.0)),
        BinOp::Div => serde_json::json!(lf.unwrap_or(0.0) / rf.unwrap_or(1.0)),
        BinOp::Eq => Value::Bool(l == r),
        BinOp::Neq => Value::Bool(l != r),
        BinOp::Gt => Value::Bool(lf.unwrap_or(0.0) > rf.unwrap_or(0.0)),
        BinOp::Gte => Value::Bool(lf.unwrap_or(0.0) >= rf.unwrap_or(0.0)),
        BinOp::Lt => Value::Bool(lf.unwrap_or(0.0) < rf.unwrap_or(0.0)),
        BinOp::Lte => Value::Bool(lf.unwrap_or(0.0) <= rf.unwrap_or(0.0)),
        BinOp::And => Value::Bool(truthy(l) && truthy(r)),
        BinOp::Or => Value::Bool(truthy(l) || truthy(r)),
    }
}
