//! ABOUTME: Artifact representation and the static safety gate
//! ABOUTME: The gate is a pure function of artifact text; it never touches persistence or execution

pub mod artifact;
pub mod gate;

pub use artifact::{ArtifactProgram, BinOp, Expr, HostCall, Stmt};
pub use gate::{check, SafetyGateRejection};
