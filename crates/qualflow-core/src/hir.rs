//! Lowered program representation handed to the engine by an external
//! lowering stage.
//!
//! The representation is structured: branch conditions, loop headers and
//! protected regions are explicit, so the CFG builder can derive every edge
//! without re-parsing source text. Explicit qualifiers appear only as names;
//! they are resolved against the hierarchy when a unit is analyzed.

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Every unit the lowering stage produced for one input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HirProgram {
    pub units: Vec<AnalysisUnit>,
}

impl HirProgram {
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        serde_json::from_str(json).map_err(ConfigError::malformed)
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Malformed(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&content)
    }

    pub fn unit(&self, name: &str) -> Option<&AnalysisUnit> {
        self.units.iter().find(|unit| unit.name == name)
    }
}

/// One analyzed program unit, typically a method body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisUnit {
    pub name: String,
    #[serde(default)]
    pub params: Vec<HirParam>,
    #[serde(default)]
    pub return_qualifier: Option<String>,
    pub body: Vec<HirStmt>,
}

impl AnalysisUnit {
    pub fn new(name: impl Into<String>, body: Vec<HirStmt>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            return_qualifier: None,
            body,
        }
    }

    pub fn with_param(mut self, param: HirParam) -> Self {
        self.params.push(param);
        self
    }

    pub fn with_return_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.return_qualifier = Some(qualifier.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HirParam {
    pub name: String,
    #[serde(default)]
    pub qualifier: Option<String>,
}

impl HirParam {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            qualifier: None,
        }
    }

    pub fn qualified(name: impl Into<String>, qualifier: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            qualifier: Some(qualifier.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HirStmt {
    LocalDecl {
        name: String,
        #[serde(default)]
        qualifier: Option<String>,
        #[serde(default)]
        init: Option<HirExpr>,
    },
    Assign {
        target: AssignTarget,
        value: HirExpr,
    },
    Expr(HirExpr),
    If {
        condition: HirExpr,
        then_body: Vec<HirStmt>,
        #[serde(default)]
        else_body: Option<Vec<HirStmt>>,
    },
    While {
        #[serde(default)]
        label: Option<String>,
        condition: HirExpr,
        body: Vec<HirStmt>,
    },
    DoWhile {
        #[serde(default)]
        label: Option<String>,
        body: Vec<HirStmt>,
        condition: HirExpr,
    },
    For {
        #[serde(default)]
        label: Option<String>,
        #[serde(default)]
        init: Vec<HirStmt>,
        #[serde(default)]
        condition: Option<HirExpr>,
        #[serde(default)]
        update: Vec<HirStmt>,
        body: Vec<HirStmt>,
    },
    Break(Option<String>),
    Continue(Option<String>),
    Return(Option<HirExpr>),
    Throw {
        exception: String,
        #[serde(default)]
        value: Option<HirExpr>,
    },
    Try {
        body: Vec<HirStmt>,
        #[serde(default)]
        handlers: Vec<CatchHandler>,
        #[serde(default)]
        finally: Option<Vec<HirStmt>>,
    },
    Assert {
        condition: HirExpr,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchHandler {
    /// Exception category caught; `*` catches everything.
    pub exception: String,
    #[serde(default)]
    pub binding: Option<String>,
    pub body: Vec<HirStmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignTarget {
    Local(String),
    Field { receiver: Box<HirExpr>, field: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HirExpr {
    Literal(Literal),
    Var(String),
    This,
    Field {
        receiver: Box<HirExpr>,
        field: String,
    },
    Call {
        #[serde(default)]
        receiver: Option<Box<HirExpr>>,
        method: String,
        #[serde(default)]
        args: Vec<HirExpr>,
        /// Checked exception categories the callee declares.
        #[serde(default)]
        throws: Vec<String>,
    },
    New {
        class: String,
        #[serde(default)]
        args: Vec<HirExpr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<HirExpr>,
        rhs: Box<HirExpr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<HirExpr>,
    },
    Ternary {
        condition: Box<HirExpr>,
        then_value: Box<HirExpr>,
        else_value: Box<HirExpr>,
    },
    Cast {
        qualifier: String,
        operand: Box<HirExpr>,
    },
}

impl HirExpr {
    pub fn var(name: impl Into<String>) -> Self {
        HirExpr::Var(name.into())
    }

    pub fn string(text: impl Into<String>) -> Self {
        HirExpr::Literal(Literal::String(text.into()))
    }

    pub fn int(value: i64) -> Self {
        HirExpr::Literal(Literal::Int(value))
    }

    pub fn bool(value: bool) -> Self {
        HirExpr::Literal(Literal::Bool(value))
    }

    pub fn call(method: impl Into<String>, args: Vec<HirExpr>) -> Self {
        HirExpr::Call {
            receiver: None,
            method: method.into(),
            args,
            throws: Vec::new(),
        }
    }

    pub fn method_call(receiver: HirExpr, method: impl Into<String>, args: Vec<HirExpr>) -> Self {
        HirExpr::Call {
            receiver: Some(Box::new(receiver)),
            method: method.into(),
            args,
            throws: Vec::new(),
        }
    }

    pub fn field(receiver: HirExpr, field: impl Into<String>) -> Self {
        HirExpr::Field {
            receiver: Box::new(receiver),
            field: field.into(),
        }
    }

    pub fn binary(op: BinOp, lhs: HirExpr, rhs: HirExpr) -> Self {
        HirExpr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn not(operand: HirExpr) -> Self {
        HirExpr::Unary {
            op: UnaryOp::Not,
            operand: Box::new(operand),
        }
    }

    pub fn cast(qualifier: impl Into<String>, operand: HirExpr) -> Self {
        HirExpr::Cast {
            qualifier: qualifier.into(),
            operand: Box::new(operand),
        }
    }
}

impl HirStmt {
    pub fn assign(name: impl Into<String>, value: HirExpr) -> Self {
        HirStmt::Assign {
            target: AssignTarget::Local(name.into()),
            value,
        }
    }

    pub fn decl(name: impl Into<String>, qualifier: Option<&str>, init: Option<HirExpr>) -> Self {
        HirStmt::LocalDecl {
            name: name.into(),
            qualifier: qualifier.map(str::to_string),
            init,
        }
    }

    pub fn while_loop(condition: HirExpr, body: Vec<HirStmt>) -> Self {
        HirStmt::While {
            label: None,
            condition,
            body,
        }
    }

    pub fn if_else(condition: HirExpr, then_body: Vec<HirStmt>, else_body: Option<Vec<HirStmt>>) -> Self {
        HirStmt::If {
            condition,
            then_body,
            else_body,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    String(String),
    Char(char),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl Literal {
    pub fn kind(&self) -> LiteralKind {
        match self {
            Literal::String(_) => LiteralKind::String,
            Literal::Char(_) => LiteralKind::Char,
            Literal::Int(_) => LiteralKind::Int,
            Literal::Float(_) => LiteralKind::Float,
            Literal::Bool(_) => LiteralKind::Bool,
            Literal::Null => LiteralKind::Null,
        }
    }

    /// Canonical source text of the literal, without quotes.
    pub fn text(&self) -> String {
        match self {
            Literal::String(s) => s.clone(),
            Literal::Char(c) => c.to_string(),
            Literal::Int(n) => n.to_string(),
            Literal::Float(f) => f.to_string(),
            Literal::Bool(b) => b.to_string(),
            Literal::Null => "null".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiteralKind {
    String,
    Char,
    Int,
    Float,
    Bool,
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Concat,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

impl BinOp {
    pub fn is_short_circuit(self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }

    pub fn is_equality(self) -> bool {
        matches!(self, BinOp::Eq | BinOp::NotEq)
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::NotEq | BinOp::Lt | BinOp::LtEq | BinOp::Gt | BinOp::GtEq
        )
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Concat => "++",
            BinOp::Eq => "==",
            BinOp::NotEq => "!=",
            BinOp::Lt => "<",
            BinOp::LtEq => "<=",
            BinOp::Gt => ">",
            BinOp::GtEq => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Not,
    Neg,
}
