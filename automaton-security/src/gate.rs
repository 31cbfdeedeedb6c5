//! ABOUTME: Static safety gate: a pure function of the artifact text
//! ABOUTME: Runs before every write to the artifact store's code field and before activation

use crate::artifact::{ArtifactProgram, Expr, Stmt};
use tracing::warn;

/// Forbidden tokens, scanned case-insensitively against the *raw* artifact
/// text (including inside string literals — false positives there are
/// acceptable per the gate's bias toward rejection). Grouped by the
/// category named in the host-call surface's forbidden list: file-system
/// access, process/environment escape, raw module loading, and
/// dynamic-code construction.
const FORBIDDEN_TOKENS: &[&str] = &[
    // file system
    "std::fs", "fs::", "readfile", "writefile", "openfile", "::file::",
    // process / environment escape
    "std::process", "process::command", "child_process", "os.system", "std::env::set_var",
    "spawn_process",
    // raw module loading
    "require(", "import(", "loadmodule", "dlopen", "std::dynamic_lib",
    // dynamic-code construction / untrusted eval
    "eval(", "function(\"", "new function", "compile_src", "unsafe_eval",
];

#[derive(Debug, Clone)]
pub struct SafetyGateRejection {
    pub reason: String,
}

impl std::fmt::Display for SafetyGateRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.reason)
    }
}

/// Pure function of the artifact text: parses the program and screens its
/// raw text for forbidden tokens. Returns the parsed program so callers
/// that accept it don't have to re-parse.
pub fn check(artifact_text: &str) -> Result<ArtifactProgram, SafetyGateRejection> {
    let lowered = artifact_text.to_ascii_lowercase();
    for token in FORBIDDEN_TOKENS {
        if lowered.contains(token) {
            warn!(token, "safety gate rejected artifact on forbidden token");
            return Err(SafetyGateRejection {
                reason: format!("artifact references forbidden primitive: {token}"),
            });
        }
    }

    let program = ArtifactProgram::from_text(artifact_text).map_err(|e| SafetyGateRejection {
        reason: format!("artifact is not a well-formed program: {e}"),
    })?;

    check_structure(&program.statements)?;
    Ok(program)
}

/// Walks the parsed AST looking for literal strings that spell out a
/// forbidden primitive under a different host-call argument — e.g. a
/// `call_plugin` invocation whose `op` argument is the literal string
/// `"fs::read"`. Defense in depth on top of the whole-text scan.
fn check_structure(statements: &[Stmt]) -> Result<(), SafetyGateRejection> {
    for stmt in statements {
        match stmt {
            Stmt::Let { value, .. } | Stmt::Assign { value, .. } | Stmt::Expr(value) => {
                check_expr(value)?;
            }
            Stmt::If { cond, then_branch, else_branch } => {
                check_expr(cond)?;
                check_structure(then_branch)?;
                check_structure(else_branch)?;
            }
            Stmt::Return(Some(expr)) => check_expr(expr)?,
            Stmt::Return(None) => {}
            Stmt::Log(expr) => check_expr(expr)?,
        }
    }
    Ok(())
}

fn check_expr(expr: &Expr) -> Result<(), SafetyGateRejection> {
    match expr {
        Expr::Literal(serde_json::Value::String(s)) => check_literal_string(s),
        Expr::Literal(_) | Expr::Var(_) => Ok(()),
        Expr::HostCall { args, .. } => {
            for arg in args {
                check_expr(arg)?;
            }
            Ok(())
        }
        Expr::BinOp { lhs, rhs, .. } => {
            check_expr(lhs)?;
            check_expr(rhs)
        }
        Expr::FieldAccess { base, .. } => check_expr(base),
        Expr::Not(inner) => check_expr(inner),
    }
}

fn check_literal_string(s: &str) -> Result<(), SafetyGateRejection> {
    let lowered = s.to_ascii_lowercase();
    for token in FORBIDDEN_TOKENS {
        if lowered.contains(token) {
            return Err(SafetyGateRejection {
                reason: format!("artifact literal references forbidden primitive: {token}"),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{BinOp, HostCall};

    fn program_text(statements: Vec<Stmt>) -> String {
        ArtifactProgram { statements }.to_text()
    }

    #[test]
    fn accepts_a_clean_program() {
        let text = program_text(vec![Stmt::Expr(Expr::HostCall {
            call: HostCall::Notify,
            args: vec![Expr::Literal(serde_json::json!("hello"))],
        })]);
        assert!(check(&text).is_ok());
    }

    #[test]
    fn rejects_filesystem_token_in_raw_text() {
        let text = format!(
            "{} // std::fs::read_to_string",
            program_text(vec![Stmt::Expr(Expr::Literal(serde_json::json!(1)))])
        );
        let err = check(&text).unwrap_err();
        assert!(err.reason.contains("forbidden"));
    }

    #[test]
    fn rejects_forbidden_token_smuggled_in_a_literal() {
        let text = program_text(vec![Stmt::Expr(Expr::HostCall {
            call: HostCall::CallPlugin,
            args: vec![Expr::Literal(serde_json::json!("require(\"child_process\")"))],
        })]);
        assert!(check(&text).is_err());
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(check("{not json").is_err());
    }

    #[test]
    fn accepts_conditional_with_comparison() {
        let text = program_text(vec![Stmt::If {
            cond: Expr::BinOp {
                op: BinOp::Gt,
                lhs: Box::new(Expr::Var("price".into())),
                rhs: Box::new(Expr::Literal(serde_json::json!(8))),
            },
            then_branch: vec![Stmt::Expr(Expr::HostCall {
                call: HostCall::Notify,
                args: vec![Expr::Literal(serde_json::json!("crossed"))],
            })],
            else_branch: vec![],
        }]);
        assert!(check(&text).is_ok());
    }
}
