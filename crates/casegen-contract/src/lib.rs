//! casegen-contract - JSON contracts for model output
//!
//! Turns free text that is *supposed* to be one JSON object into a parsed
//! value, or fails. Recovery is layered:
//! - candidate extraction (raw, fenced, first balanced block)
//! - syntax repair (newline escaping, trailing commas, missing commas)
//!
//! # Example
//!
//! ```rust
//! use casegen_contract::parse_contract;
//!
//! let text = "Here you go:\n```json\n{\"a\": 1 \"b\": [1 2,]}\n```";
//! let value = parse_contract(text).unwrap();
//! assert_eq!(value["b"][1], 2);
//! ```

pub mod error;
pub mod parser;
pub mod repair;
pub mod scan;

pub use error::{ContractError, ContractResult};
pub use parser::{parse_contract, ContractParser, ParsedContract};
pub use repair::RepairSet;
pub use scan::CandidateKind;
