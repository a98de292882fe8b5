//! Serialized form of a processor description.
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Description {
    pub isa: IsaDef,
    #[serde(default)]
    pub mia: Option<MiaDef>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IsaDef {
    pub name: String,
    pub word_width: u32,
    #[serde(default)]
    pub pc: Option<String>,
    pub resources: Vec<ResourceDef>,
    pub instructions: Vec<InstructionDef>,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKindDef {
    Register,
    RegisterFile,
    Memory,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceDef {
    pub name: String,
    pub kind: ResourceKindDef,
    #[serde(default)]
    pub addr_width: Option<u32>,
    pub width: u32,
    #[serde(default)]
    pub constraints: Vec<ConstraintDef>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConstraintDef {
    pub address: u64,
    pub value: u64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldDef {
    pub name: String,
    /// `[hi, lo]` bit ranges, most significant first.
    pub slices: Vec<(u32, u32)>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstructionDef {
    pub name: String,
    pub fields: Vec<FieldDef>,
    pub behavior: Vec<StmtDef>,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TypeDef {
    Bool,
    Bits(u32),
    Uint(u32),
    Sint(u32),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StmtDef {
    Let {
        name: String,
        expr: ExprDef,
    },
    Write {
        resource: String,
        #[serde(default)]
        address: Option<ExprDef>,
        value: ExprDef,
        #[serde(default)]
        condition: Option<ExprDef>,
    },
    /// Stage output. Only in stage behaviors.
    Output {
        name: String,
        value: ExprDef,
        #[serde(default)]
        ty: Option<TypeDef>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExprDef {
    Const {
        value: u64,
        ty: TypeDef,
    },
    Bool(bool),
    Field(String),
    Var(String),
    Call {
        op: String,
        args: Vec<ExprDef>,
    },
    Select {
        cond: Box<ExprDef>,
        then: Box<ExprDef>,
        els: Box<ExprDef>,
    },
    Cast {
        op: String,
        arg: Box<ExprDef>,
        ty: TypeDef,
    },
    Read {
        resource: String,
        #[serde(default)]
        address: Option<Box<ExprDef>>,
    },
    /// Output of another stage. Only in stage behaviors.
    Input(String),
    /// Operation on instruction progress. Only in stage behaviors.
    Mia {
        op: String,
        #[serde(default)]
        args: Vec<ExprDef>,
        #[serde(default)]
        resource: Option<String>,
        #[serde(default)]
        logic: Option<String>,
    },
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogicKindDef {
    Forwarding,
    BranchPrediction,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogicDef {
    pub name: String,
    pub kind: LogicKindDef,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageDef {
    pub name: String,
    pub behavior: Vec<StmtDef>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MiaDef {
    pub name: String,
    pub stages: Vec<StageDef>,
    #[serde(default)]
    pub logic: Vec<LogicDef>,
}
