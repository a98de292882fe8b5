//! Frontend for processor descriptions.
//!
//! Descriptions are JSON documents holding an instruction set and,
//! optionally, a microarchitecture. Names are resolved while building the
//! IR and unknown names are reported with the unit and statement they
//! appear in.
pub mod ast;
mod resolve;

pub use resolve::build;

use mia_ir::{Isa, MicroArchitecture};
use mia_utils::{Error, MiaResult};
use std::path::Path;

/// Parse a description from a string.
pub fn parse_str(input: &str) -> MiaResult<ast::Description> {
    serde_json::from_str(input).map_err(|e| {
        Error::invalid_file(format!(
            "malformed description at line {}, column {}: {e}",
            e.line(),
            e.column()
        ))
    })
}

/// Load the description at `path` and build the IR.
pub fn load_file(path: &Path) -> MiaResult<(Isa, Option<MicroArchitecture>)> {
    let input = std::fs::read_to_string(path).map_err(|e| {
        Error::invalid_file(format!("failed to read {}: {e}", path.display()))
    })?;
    build(parse_str(&input)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mia_ir::{NodeKind, Type};
    use mia_utils::ErrorKind;

    const ADDI: &str = r#"{
        "isa": {
            "name": "tiny",
            "word_width": 32,
            "pc": "PC",
            "resources": [
                { "name": "X", "kind": "register_file", "addr_width": 5, "width": 32,
                  "constraints": [ { "address": 0, "value": 0 } ] },
                { "name": "PC", "kind": "register", "width": 32 }
            ],
            "instructions": [
                {
                    "name": "ADDI",
                    "fields": [
                        { "name": "rd", "slices": [[11, 7]] },
                        { "name": "rs1", "slices": [[19, 15]] },
                        { "name": "imm", "slices": [[31, 20]] }
                    ],
                    "behavior": [
                        { "let": { "name": "a", "expr": { "read": { "resource": "X", "address": { "field": "rs1" } } } } },
                        { "let": { "name": "i", "expr": { "cast": { "op": "sext", "arg": { "field": "imm" }, "ty": { "bits": 32 } } } } },
                        { "write": { "resource": "X", "address": { "field": "rd" },
                                     "value": { "call": { "op": "add", "args": [ { "var": "a" }, { "var": "i" } ] } } } }
                    ]
                }
            ]
        },
        "mia": {
            "name": "two",
            "stages": [
                { "name": "B", "behavior": [
                    { "let": { "name": "d", "expr": { "mia": { "op": "decode", "args": [ { "input": "A_fr" } ] } } } },
                    { "let": { "name": "r", "expr": { "mia": { "op": "read", "args": [ { "var": "d" } ], "resource": "X" } } } },
                    { "let": { "name": "w", "expr": { "mia": { "op": "write", "args": [ { "var": "r" } ], "resource": "X" } } } }
                ] },
                { "name": "A", "behavior": [
                    { "output": { "name": "fr", "value": { "mia": { "op": "fetch_next" } } } }
                ] }
            ],
            "logic": [ { "name": "bypass", "kind": "forwarding" } ]
        }
    }"#;

    #[test]
    fn builds_instructions_and_stages() {
        let (isa, mia) = build(parse_str(ADDI).unwrap()).unwrap();
        assert_eq!(isa.instructions.len(), 1);
        assert!(isa.pc.is_some());
        let addi = isa.instructions.values().next().unwrap();
        assert_eq!(addi.behavior.side_effects().len(), 1);
        let mia = mia.unwrap();
        let out = mia.find_output("A_fr".into()).unwrap();
        assert_eq!(mia.outputs[out].ty, Type::FetchResult);
        let b = mia.find_stage("B".into()).unwrap();
        assert_eq!(mia.stages[b].inputs(), vec![out]);
        let reads = mia.stages[b]
            .behavior
            .nodes_where(|k| matches!(k, NodeKind::MiaCall { .. }));
        assert_eq!(reads.len(), 3);
    }

    #[test]
    fn unknown_names_carry_location() {
        let input = ADDI.replace("\"rs1\" } } } }", "\"rs3\" } } } }");
        let err = build(parse_str(&input).unwrap()).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidFile(_)));
        assert_eq!(err.location().unwrap().to_string(), "ADDI[0]");
    }

    #[test]
    fn demo_description_loads() {
        let desc = parse_str(include_str!("../../../demos/rv.json")).unwrap();
        let (isa, mia) = build(desc).unwrap();
        assert!(mia.is_none());
        let names: Vec<_> = isa.instructions.values().map(|i| i.name.to_string()).collect();
        assert_eq!(names, ["ADD", "ADDI", "LW", "SW", "BEQ"]);
        let beq = isa.find_instruction("BEQ".into()).unwrap();
        let write = isa.instructions[beq].behavior.side_effects()[0];
        assert!(isa.instructions[beq].behavior.kind(write).condition().is_some());
    }

    #[test]
    fn malformed_json_is_reported() {
        let err = parse_str("{ \"isa\": ").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidFile(_)));
    }
}
