//! Analysis of decoded method bodies.
//!
//! This module turns decoded instruction streams into forms suited for static analysis:
//!
//! - [`cfg`] - Basic block partitioning and the block graph
//! - [`tac`] - Translation into three-address code
//!
//! Whole batches of methods are translated with [`translate_methods`], which isolates failures
//! per method and optionally fans out over a thread pool.
//!
//! # Usage
//!
//! ```rust
//! use ciltac::{
//!     analysis::{tac::TranslationConfig, translate_methods},
//!     metadata::{
//!         method::MethodDescriptor, resolver::MemoryResolver, token::Token,
//!         typesystem::{TacType, TypeHierarchy},
//!     },
//! };
//!
//! let methods = vec![MethodDescriptor::new("Identity", Token::new(0x0600_0001))
//!     .with_params(vec![TacType::I32])
//!     .with_return(TacType::I32)
//!     .with_code(vec![0x02, 0x2A])];
//!
//! let report = translate_methods(
//!     &methods,
//!     &MemoryResolver::new(),
//!     &TypeHierarchy::new(),
//!     &TranslationConfig::default(),
//! );
//! assert!(report.is_complete());
//! assert_eq!(report.translated[0].statements[0].to_string(), "return arg0");
//! ```

mod batch;
pub mod cfg;
pub mod tac;

pub use batch::{translate_methods, BatchReport};
pub use cfg::{BasicBlock, BlockEntry, ControlFlowGraph};
