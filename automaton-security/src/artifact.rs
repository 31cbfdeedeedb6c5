//! ABOUTME: The constrained artifact representation the synthesizer emits and the executor runs
//! ABOUTME: A small AST, not a general-purpose language — the Host-Call Surface is the only escape hatch

use serde::{Deserialize, Serialize};

/// The seven host calls a program may invoke. Because this is a closed
/// enum, an artifact simply cannot name an arbitrary host function —
/// deserializing JSON that references anything else fails before the
/// Safety Gate's lexical pass even runs. That is the "structural
/// guarantee" layered under the Safety Gate's textual scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostCall {
    Notify,
    GetState,
    SetState,
    Fetch,
    GetTonBalance,
    GetSecret,
    CallPlugin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    And,
    Or,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "expr", rename_all = "snake_case")]
pub enum Expr {
    Literal(serde_json::Value),
    Var(String),
    HostCall {
        call: HostCall,
        args: Vec<Expr>,
    },
    BinOp {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    FieldAccess {
        base: Box<Expr>,
        field: String,
    },
    Not(Box<Expr>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "stmt", rename_all = "snake_case")]
pub enum Stmt {
    Let { name: String, value: Expr },
    Assign { name: String, value: Expr },
    Expr(Expr),
    If {
        cond: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Vec<Stmt>,
    },
    Return(Option<Expr>),
    /// A console-like debug write, captured into the execution outcome's
    /// `logs` rather than sent anywhere — the only way an artifact emits
    /// diagnostic text that isn't a user-facing `notify`.
    Log(Expr),
}

/// The full artifact: a small sequence of statements. Serialized to JSON
/// text for storage in the Artifact Store's `code` field — from the
/// store's point of view the artifact is still opaque text, it just
/// happens to be a JSON encoding of this AST rather than free-form source.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ArtifactProgram {
    pub statements: Vec<Stmt>,
}

impl ArtifactProgram {
    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
